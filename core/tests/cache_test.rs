use tachyon_core::cache::BlockCache;
use tachyon_core::config::CpuMode;
use tachyon_core::cpu::decode::InstructionDecoder;
use tachyon_core::cpu::ops::{Op, Operand8, Reg8};
use tachyon_core::mem::{MemoryBank, Mmu, WriteFaultMode};

fn setup(program: &[u8]) -> (Mmu, BlockCache, InstructionDecoder) {
    let bank = MemoryBank::ram(0x0000, 0x1_0000).expect("flat bank");
    let mut mmu = Mmu::new(vec![Box::new(bank)], WriteFaultMode::Throw).expect("flat map");
    mmu.write_bytes(0x0100, program).expect("program load");
    let cache = BlockCache::new(mmu.subscribe_writes());
    let decoder = InstructionDecoder::new(CpuMode::Z80, false, 64);
    (mmu, cache, decoder)
}

#[test]
fn hit_reuses_decoded_block() {
    // LD A,1; HALT
    let (mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes(); // discard the load notification
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("miss decodes");
    assert_eq!(cache.decode_count(), 1);
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("hit");
    assert_eq!(cache.decode_count(), 1, "second fetch reuses the block");
    assert_eq!(cache.len(), 1);
}

#[test]
fn intersecting_write_evicts_and_refetch_redecodes() {
    let (mut mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes();
    {
        let block = cache.get_or_decode(0x0100, &decoder, &mmu).expect("decodes");
        assert_eq!(
            block.ops()[0],
            Op::Load8(Operand8::Reg(Reg8::A), Operand8::Imm(0x01))
        );
    }

    // Self-modifying code: rewrite the immediate inside the cached range.
    mmu.write_byte(0x0101, 0x7F).expect("ram write");
    let block = cache.get_or_decode(0x0100, &decoder, &mmu).expect("redecode");
    assert_eq!(
        block.ops()[0],
        Op::Load8(Operand8::Reg(Reg8::A), Operand8::Imm(0x7F)),
        "refetched block reflects the new bytes"
    );
    assert_eq!(cache.decode_count(), 2);
}

#[test]
fn non_intersecting_write_preserves_entry() {
    let (mut mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes();
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("decodes");

    mmu.write_byte(0x0200, 0xAA).expect("unrelated write");
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("hit");
    assert_eq!(cache.decode_count(), 1, "unrelated write does not evict");
}

#[test]
fn write_one_past_block_end_preserves_entry() {
    // Block covers [0x0100, 0x0103).
    let (mut mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes();
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("decodes");

    mmu.write_byte(0x0103, 0xAA).expect("write past end");
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("hit");
    assert_eq!(cache.decode_count(), 1);

    mmu.write_byte(0x0102, 0xAA).expect("write on last byte");
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("redecode");
    assert_eq!(cache.decode_count(), 2, "last byte of range evicts");
}

#[test]
fn write_straddling_block_start_evicts() {
    let (mut mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes();
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("decodes");

    // Two-byte write beginning just before the block.
    mmu.write_word(0x00FF, 0x0000).expect("straddling write");
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("redecode");
    assert_eq!(cache.decode_count(), 2);
}

#[test]
fn distinct_addresses_cache_separately() {
    let (mut mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    mmu.write_bytes(0x0200, &[0x76]).expect("second program");
    cache.drain_writes();
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("first");
    cache.get_or_decode(0x0200, &decoder, &mmu).expect("second");
    assert_eq!(cache.len(), 2);
    assert!(cache.contains(0x0100) && cache.contains(0x0200));
}

#[test]
fn explicit_invalidation_matches_notification_path() {
    let (mmu, mut cache, decoder) = setup(&[0x3E, 0x01, 0x76]);
    cache.drain_writes();
    cache.get_or_decode(0x0100, &decoder, &mmu).expect("decodes");

    cache.invalidate_range(0x0101, 1);
    assert!(!cache.contains(0x0100), "direct invalidation evicts too");
}
