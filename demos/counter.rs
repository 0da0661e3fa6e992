//! Counter feature with a cancellable timer effect
//!
//! Run with `RUST_LOG=statebox=debug` to watch the store work.

use std::thread;
use std::time::Duration;

use statebox::{key_path, Effect, Store};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, PartialEq)]
struct Counter {
    count: i32,
    ticking: bool,
}

#[derive(Clone, Debug, PartialEq)]
enum Action {
    Increment,
    Decrement,
    StartTimer,
    StopTimer,
    Tick,
}

#[derive(Hash)]
struct TimerId;

fn counter(state: &mut Counter, action: Action) -> Effect<Action> {
    match action {
        Action::Increment | Action::Tick => state.count += 1,
        Action::Decrement => state.count -= 1,
        Action::StartTimer => {
            state.ticking = true;
            return Effect::run(|emitter| {
                while emitter.sleep(Duration::from_millis(100)) {
                    emitter.emit(Action::Tick);
                }
            })
            .cancellable(TimerId, true);
        }
        Action::StopTimer => {
            state.ticking = false;
            return Effect::cancel(TimerId);
        }
    }
    Effect::none()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Counter ===\n");

    let store = Store::new(Counter::default(), counter);
    let _count = store.observe(key_path!(Counter => count), |count| {
        println!("   [count] {count}");
    });

    println!("1. Sending actions");
    store.send(Action::Increment).wait();
    store.send(Action::Increment).wait();
    store.send(Action::Decrement).wait();

    println!("\n2. Starting the timer");
    let timer = store.send(Action::StartTimer);
    thread::sleep(Duration::from_millis(350));

    println!("\n3. Stopping the timer");
    store.send(Action::StopTimer).wait();
    timer.wait();

    let state = store.state();
    println!("\nFinal state: {state:?}");
    println!("Effects still running: {}", store.effects_in_flight());
}
