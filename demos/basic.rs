//! Two coroutines that each count up from their own start value, interleaved
//! by the host until both have finished.

use sharestack::{Handle, Scheduler};

fn counter(h: &Handle, start: u32) {
    for i in 0..5 {
        println!("[coroutine {}] {}", h.running().unwrap(), start + i);
        h.yield_now();
    }
}

fn main() {
    let scheduler = Scheduler::new();

    let a = scheduler.spawn(|h| counter(h, 0));
    let b = scheduler.spawn(|h| counter(h, 100));

    println!("[main] start");
    while scheduler.status(a).is_alive() && scheduler.status(b).is_alive() {
        scheduler.resume(a);
        scheduler.resume(b);
    }
    println!("[main] end");

    scheduler.close();
}
