use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tachyon_core::cpu::block::TimingResult;
use tachyon_core::cpu::CoreError;
use tachyon_core::runner::CancellationToken;
use tachyon_core::timer::{InstructionTimer, TimerMode};

fn cost(machine_cycles: u32, throttling_states: u32) -> TimingResult {
    TimingResult {
        machine_cycles,
        throttling_states,
    }
}

#[test]
fn null_mode_never_suspends() {
    let mut timer = InstructionTimer::new(TimerMode::Null);
    let token = CancellationToken::new();
    let started = Instant::now();
    for _ in 0..1000 {
        timer.sync(cost(1000, 4000), &token).expect("sync");
    }
    assert!(
        started.elapsed() < Duration::from_millis(100),
        "null pacing must not sleep"
    );
}

#[test]
fn machine_cycle_pacing_matches_configured_clock() {
    // 4000 machine cycles at 1 MHz is 4 ms of virtual time.
    let mut timer = InstructionTimer::new(TimerMode::MachineCycles { mhz: 1.0 });
    timer.restart();
    let token = CancellationToken::new();
    let started = Instant::now();
    timer.sync(cost(4000, 16000), &token).expect("sync");
    assert!(
        started.elapsed() >= Duration::from_millis(3),
        "pacing should suspend close to 4ms (scheduling tolerance)"
    );
}

#[test]
fn throttling_state_pacing_is_finer_grained() {
    // 16000 T-states at 4 MHz is also 4 ms.
    let mut timer = InstructionTimer::new(TimerMode::ThrottlingStates { mhz: 4.0 });
    timer.restart();
    let token = CancellationToken::new();
    let started = Instant::now();
    timer.sync(cost(4000, 16000), &token).expect("sync");
    assert!(started.elapsed() >= Duration::from_millis(3));
}

#[test]
fn short_costs_accumulate_instead_of_sleeping_each_time() {
    // Each sync is 4 virtual microseconds; the timer batches them and the
    // total wall time stays close to the virtual total (~4ms), not 1000
    // individual timer quanta.
    let mut timer = InstructionTimer::new(TimerMode::MachineCycles { mhz: 1.0 });
    timer.restart();
    let token = CancellationToken::new();
    let started = Instant::now();
    for _ in 0..1000 {
        timer.sync(cost(4, 16), &token).expect("sync");
    }
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(3), "virtual total enforced");
    assert!(
        elapsed < Duration::from_millis(500),
        "batched pacing, not per-sync sleeps"
    );
}

#[test]
fn sync_notifies_listeners_with_retired_cost() {
    let seen: Arc<Mutex<Vec<TimingResult>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut timer = InstructionTimer::new(TimerMode::Null);
    timer.add_sync_listener(Box::new(move |retired| {
        sink.lock().unwrap().push(retired);
    }));

    let token = CancellationToken::new();
    timer.sync(cost(3, 12), &token).expect("sync");
    timer.sync(cost(5, 21), &token).expect("sync");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2, "one event per sync, even unthrottled");
    assert_eq!(seen[0].throttling_states, 12);
    assert_eq!(seen[1].machine_cycles, 5);
}

#[test]
fn cancellation_aborts_pacing_wait() {
    // A second of virtual time, cancelled after ~30ms.
    let mut timer = InstructionTimer::new(TimerMode::MachineCycles { mhz: 1.0 });
    timer.restart();
    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            token.cancel();
        })
    };

    let started = Instant::now();
    let result = timer.sync(cost(1_000_000, 4_000_000), &token);
    assert_eq!(result, Err(CoreError::Cancelled));
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "wait aborted well before the full second"
    );
    canceller.join().expect("canceller thread");
}
