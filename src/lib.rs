//! ## Overview
//!
//! This crate provides a cooperative, single-threaded coroutine scheduler in
//! which every coroutine executes on **one shared stack**.
//!
//! Instead of giving each coroutine a dedicated stack sized for its worst
//! case, the scheduler owns a single fixed-size stack region. The running
//! coroutine uses it as its own. When that coroutine yields, the part of the
//! region it was actually using is copied into a private buffer; when it is
//! resumed, the bytes are copied back to the exact same addresses and
//! execution continues where it left off. Memory held by an idle coroutine is
//! therefore proportional to how deep its stack really was, and each switch
//! costs a copy of that many bytes.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use sharestack::{Scheduler, Status};
//!
//! let scheduler = Scheduler::new();
//! let last = Rc::new(Cell::new(0));
//!
//! let out = last.clone();
//! let id = scheduler.spawn(move |handle| {
//!     for i in 1..=3 {
//!         out.set(i);
//!         handle.yield_now();
//!     }
//! });
//!
//! for expected in 1..=3 {
//!     scheduler.resume(id);
//!     assert_eq!(last.get(), expected);
//!     assert_eq!(scheduler.status(id), Status::Suspended);
//! }
//!
//! scheduler.resume(id);
//! assert_eq!(scheduler.status(id), Status::Dead);
//! assert_eq!(scheduler.running(), None);
//! ```
//!
//! ## Lifecycle
//!
//! A coroutine is [`Status::Ready`] when spawned, [`Status::Running`] while it
//! occupies the shared stack, [`Status::Suspended`] after it yields and
//! [`Status::Dead`] once its entry function returns. A finished coroutine
//! gives its slot back immediately, so its id may be handed out again. Ids
//! with no coroutine in them report `Dead`, and resuming them does nothing.
//!
//! ## Misuse
//!
//! Resuming while a coroutine is running, yielding when none is, and using an
//! id outside the slot table are programming errors and panic before any state
//! is modified. The `try_*` variants report the cheaply detectable ones as
//! [`Error`] values instead. Running deeper than the shared stack hits a guard
//! page and terminates the process.
//!
//! A panic inside a coroutine finishes that coroutine and is propagated to the
//! caller of [`Handle::resume`].
//!
//! ## Supported targets
//!
//! x86_64 and AArch64, on unix-like systems (ELF and Darwin).

#![warn(missing_docs)]

mod arch;
mod coroutine;
mod error;
mod scheduler;
mod slots;
mod snapshot;
pub mod stack;
mod unwind;

pub use coroutine::{CoroutineId, Status};
pub use error::{Error, Result};
pub use scheduler::{Config, Handle, Scheduler, DEFAULT_CAPACITY};

#[cfg(test)]
mod tests;
