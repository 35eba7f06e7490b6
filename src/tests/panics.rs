use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::stack::MIN_STACK_SIZE;
use crate::{Config, Scheduler, Status};

struct SetOnDrop(Rc<Cell<bool>>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn panic_finishes_coroutine() {
    let scheduler = Scheduler::new();
    let dropped = Rc::new(Cell::new(false));

    let guard = SetOnDrop(dropped.clone());
    let id = scheduler.spawn(move |h| {
        let _guard = guard;
        h.yield_now();
        panic!("foobar");
    });
    scheduler.resume(id);
    assert!(!dropped.get());

    let result = panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(id)));
    let payload = result.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"foobar"));

    // Unwinding dropped everything on the coroutine's stack.
    assert!(dropped.get());
    assert_eq!(scheduler.status(id), Status::Dead);
    assert_eq!(scheduler.running(), None);
    assert_eq!(scheduler.active(), 0);

    // The scheduler is still usable.
    let ran = Rc::new(Cell::new(false));
    let ran2 = ran.clone();
    let id = scheduler.spawn(move |h| {
        h.yield_now();
        ran2.set(true);
    });
    scheduler.resume(id);
    scheduler.resume(id);
    assert!(ran.get());
    assert_eq!(scheduler.status(id), Status::Dead);
}

#[test]
#[should_panic = "foobar"]
fn panic_reaches_caller() {
    let scheduler = Scheduler::new();
    let id = scheduler.spawn(|_| panic!("foobar"));
    scheduler.resume(id);
}

#[test]
fn panic_on_first_resume() {
    let scheduler = Scheduler::new();
    let id = scheduler.spawn(|_| {
        let n = core::hint::black_box(42);
        panic!("formatted {}", n);
    });
    let payload = panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(id))).unwrap_err();
    assert_eq!(
        payload.downcast_ref::<String>().map(String::as_str),
        Some("formatted 42")
    );
    assert_eq!(scheduler.status(id), Status::Dead);
}

#[test]
fn panic_leaves_other_coroutines_alone() {
    let scheduler = Scheduler::new();
    let progress = Rc::new(Cell::new(0));

    let progress2 = progress.clone();
    let survivor = scheduler.spawn(move |h| {
        let mut local = [0u64; 32];
        for (i, x) in local.iter_mut().enumerate() {
            *x = i as u64;
        }
        h.yield_now();
        progress2.set(local.iter().sum::<u64>());
    });
    let doomed = scheduler.spawn(|h| {
        // Scribble over the region the survivor used before dying.
        let junk = [0xffu8; 4096];
        core::hint::black_box(&junk);
        h.yield_now();
        panic!("doomed");
    });

    scheduler.resume(survivor);
    scheduler.resume(doomed);
    assert!(panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(doomed))).is_err());
    assert_eq!(scheduler.status(survivor), Status::Suspended);

    scheduler.resume(survivor);
    assert_eq!(progress.get(), (0..32).sum::<u64>());
}

#[test]
fn nested_panic_propagates_through_outer_coroutine() {
    let outer = Scheduler::new();
    let id = outer.spawn(|h| {
        let inner = Scheduler::new();
        let inner_id = inner.spawn(|_| panic!("inner"));
        let caught = panic::catch_unwind(AssertUnwindSafe(|| inner.resume(inner_id)));
        assert!(caught.is_err());
        h.yield_now();
        panic!("outer");
    });
    outer.resume(id);
    assert_eq!(outer.status(id), Status::Suspended);
    let payload = panic::catch_unwind(AssertUnwindSafe(|| outer.resume(id))).unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"outer"));
}

#[test]
fn panic_on_minimum_stack() {
    let scheduler = Scheduler::with_config(Config::new().stack_size(0)).unwrap();
    assert!(scheduler.stack_size() >= MIN_STACK_SIZE);

    let dropped = Rc::new(Cell::new(false));
    let guard = SetOnDrop(dropped.clone());
    let id = scheduler.spawn(move |h| {
        let _guard = guard;
        h.yield_now();
        panic!("small stack");
    });
    scheduler.resume(id);

    let payload = panic::catch_unwind(AssertUnwindSafe(|| scheduler.resume(id))).unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"small stack"));
    assert!(dropped.get());
    assert_eq!(scheduler.status(id), Status::Dead);

    let id = scheduler.spawn(|h| h.yield_now());
    scheduler.resume(id);
    scheduler.resume(id);
    assert_eq!(scheduler.status(id), Status::Dead);
}
