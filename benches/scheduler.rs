use std::hint::black_box;

use criterion::measurement::Measurement;
use criterion::{criterion_group, criterion_main, Criterion};
use sharestack::{Handle, Scheduler};

// Parks a coroutine `depth` frames of 1 KiB below its entry point, so every
// switch copies at least that much stack in each direction.
fn park(h: &Handle, depth: usize) {
    let mut frame = [0u8; 1024];
    black_box(&mut frame);
    if depth > 0 {
        park(h, depth - 1);
    } else {
        loop {
            h.yield_now();
        }
    }
    black_box(&mut frame);
}

fn switch<M: Measurement + 'static>(name: &str, depth: usize, c: &mut Criterion<M>) {
    let scheduler = Scheduler::new();
    let id = scheduler.spawn(move |h| park(h, depth));

    c.bench_function(name, |b| b.iter(|| scheduler.resume(black_box(id))));

    // The parked coroutine never finishes; its frames hold nothing to drop.
    scheduler.close();
}

fn spawn_and_finish<M: Measurement + 'static>(name: &str, c: &mut Criterion<M>) {
    // Don't count time spent allocating the shared stack.
    let scheduler = Scheduler::new();

    c.bench_function(name, |b| {
        b.iter(|| {
            let id = scheduler.spawn(|h| {
                black_box(h);
            });
            scheduler.resume(id);
        })
    });
}

fn shallow_switch_time(c: &mut Criterion) {
    switch("shallow_switch_time", 0, c);
}
fn deep_switch_time(c: &mut Criterion) {
    switch("deep_switch_time", 16, c);
}
fn spawn_time(c: &mut Criterion) {
    spawn_and_finish("spawn_time", c);
}

criterion_group!(
    name = time;
    config = Criterion::default();
    targets = shallow_switch_time, deep_switch_time, spawn_time
);

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        use criterion_cycles_per_byte::CyclesPerByte;

        fn shallow_switch_cycles(c: &mut Criterion<CyclesPerByte>) {
            switch("shallow_switch_cycles", 0, c);
        }
        fn deep_switch_cycles(c: &mut Criterion<CyclesPerByte>) {
            switch("deep_switch_cycles", 16, c);
        }
        fn spawn_cycles(c: &mut Criterion<CyclesPerByte>) {
            spawn_and_finish("spawn_cycles", c);
        }

        criterion_group!(
            name = cycles;
            config = Criterion::default().with_measurement(CyclesPerByte);
            targets = shallow_switch_cycles, deep_switch_cycles, spawn_cycles
        );

        criterion_main!(cycles, time);
    } else {
        criterion_main!(time);
    }
}
