//! Generate randomized register-state round-trip vectors as gzip JSON.
//!
//! Usage: gen_state_tests [count] [output.json.gz]

use std::env;
use std::fs::File;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tachyon_core::prelude::*;
use tachyon_cpu_validation::StateCase;

fn random_state(rng: &mut StdRng) -> Z80RegisterState {
    Z80RegisterState {
        a: rng.r#gen(),
        f: rng.r#gen(),
        b: rng.r#gen(),
        c: rng.r#gen(),
        d: rng.r#gen(),
        e: rng.r#gen(),
        h: rng.r#gen(),
        l: rng.r#gen(),
        a_prime: rng.r#gen(),
        f_prime: rng.r#gen(),
        b_prime: rng.r#gen(),
        c_prime: rng.r#gen(),
        d_prime: rng.r#gen(),
        e_prime: rng.r#gen(),
        h_prime: rng.r#gen(),
        l_prime: rng.r#gen(),
        ix: rng.r#gen(),
        iy: rng.r#gen(),
        i: rng.r#gen(),
        r: rng.r#gen(),
        sp: rng.r#gen(),
        pc: rng.r#gen(),
        iff1: rng.r#gen(),
        iff2: rng.r#gen(),
        im: match rng.gen_range(0..3) {
            0 => InterruptMode::Im0,
            1 => InterruptMode::Im1,
            _ => InterruptMode::Im2,
        },
    }
}

fn main() -> std::io::Result<()> {
    let mut args = env::args().skip(1);
    let count: usize = args
        .next()
        .and_then(|value| value.parse().ok())
        .unwrap_or(1000);
    let path = args
        .next()
        .unwrap_or_else(|| "z80_state_tests.json.gz".to_string());

    // Fixed seed so regenerated vector sets are reproducible.
    let mut rng = StdRng::seed_from_u64(0x7AC4);
    let cases: Vec<StateCase> = (0..count)
        .map(|index| StateCase {
            name: format!("state_{index:04}"),
            state: random_state(&mut rng),
        })
        .collect();

    let json = serde_json::to_string_pretty(&cases)?;
    let file = File::create(&path)?;
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(json.as_bytes())?;
    encoder.finish()?;
    println!("wrote {count} cases to {path}");
    Ok(())
}
