use core::cell::{Cell, RefCell};
use core::hint::unreachable_unchecked;
use core::marker::PhantomData;
use core::mem::{self, ManuallyDrop};
use core::ops::Deref;
use std::io;

use log::{debug, trace};

use crate::arch;
use crate::coroutine::{Coroutine, CoroutineId, EntryFn, Status};
use crate::error::{Error, Result};
use crate::slots::SlotTable;
use crate::stack::{SharedStack, StackPointer, DEFAULT_STACK_SIZE};
use crate::unwind;

/// Number of coroutine slots a scheduler starts with.
pub const DEFAULT_CAPACITY: usize = 16;

/// Tunables of a [`Scheduler`], fixed when it is created.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    stack_size: usize,
    initial_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_size: DEFAULT_STACK_SIZE,
            initial_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl Config {
    /// Returns the default configuration: a 1 MiB shared stack and 16 slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the size of the shared stack. Values below
    /// [`MIN_STACK_SIZE`](crate::stack::MIN_STACK_SIZE) are raised to it, and
    /// the size is rounded up to a whole number of pages.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }

    /// Sets the number of slots the coroutine table starts with. At least one
    /// slot is always allocated.
    pub fn initial_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }
}

/// A cooperative scheduler whose coroutines all run on one shared stack.
///
/// A coroutine only occupies the shared stack while it is running. When it
/// calls [`Handle::yield_now`] the live part of the stack is copied into a
/// buffer owned by that coroutine, and copied back to the same addresses the
/// next time it is resumed. An idle coroutine therefore costs memory in
/// proportion to how deep its stack actually was when it yielded, at the price
/// of a copy on every switch.
///
/// `Scheduler` dereferences to [`Handle`], which carries all of the
/// scheduling operations. The same `Handle` is passed to every coroutine.
///
/// # Dropping a scheduler
///
/// Coroutines that never started have their closure dropped. Objects living on
/// the stack of a suspended coroutine are leaked: the coroutine is only a copy
/// of bytes at that point and cannot be unwound.
pub struct Scheduler {
    // Boxed so that the `&Handle` saved on coroutine stacks stays valid when
    // the scheduler is moved.
    handle: Box<Handle>,
}

impl Scheduler {
    /// Creates a scheduler with the default [`Config`].
    ///
    /// # Panics
    ///
    /// Panics if the shared stack could not be allocated.
    pub fn new() -> Self {
        Self::with_config(Config::default()).expect("failed to allocate shared stack")
    }

    /// Creates a scheduler with the given configuration.
    pub fn with_config(config: Config) -> io::Result<Self> {
        let stack = SharedStack::new(config.stack_size)?;
        let slots = SlotTable::with_capacity(config.initial_capacity);
        debug!(
            "opened scheduler with a {} byte shared stack and {} slots",
            stack.size(),
            slots.capacity()
        );

        Ok(Self {
            handle: Box::new(Handle {
                stack,
                slots: RefCell::new(slots),
                running: Cell::new(None),
                marker: PhantomData,
            }),
        })
    }

    /// Returns the handle shared with the coroutines of this scheduler.
    #[inline]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Releases every coroutine, the slot table and the shared stack.
    pub fn close(self) {
        drop(self);
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for Scheduler {
    type Target = Handle;

    #[inline]
    fn deref(&self) -> &Handle {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Closure destructors run without the table borrowed.
        let coroutines = self.handle.slots.borrow_mut().take_all();
        for (index, coroutine) in &coroutines {
            trace!(
                "releasing coroutine {} ({:?})",
                CoroutineId::new(*index),
                coroutine.status
            );
        }
        debug!(
            "closed scheduler with {} live coroutines",
            coroutines.len()
        );
    }
}

/// Scheduling operations of a [`Scheduler`].
///
/// The host reaches this through the scheduler, and every coroutine receives a
/// reference to it as the argument of its entry function. The address of a
/// `Handle` never changes for the life of its scheduler.
pub struct Handle {
    stack: SharedStack,
    slots: RefCell<SlotTable<Coroutine>>,
    running: Cell<Option<CoroutineId>>,

    // Coroutine state is tied to the thread that created it.
    /// ```compile_fail
    /// fn send<T: Send>() {}
    /// send::<sharestack::Scheduler>();
    /// ```
    marker: PhantomData<*mut ()>,
}

impl Handle {
    /// Registers a new coroutine and returns its id.
    ///
    /// The coroutine starts out [`Status::Ready`] and does not run until it is
    /// first resumed. The closure receives this handle, through which it can
    /// yield, inspect the scheduler and spawn further coroutines.
    pub fn spawn<F>(&self, f: F) -> CoroutineId
    where
        F: FnOnce(&Handle) + 'static,
    {
        let entry: EntryFn = Box::new(f);
        let id = CoroutineId::new(self.slots.borrow_mut().insert(Coroutine::new(entry)));
        trace!("spawned coroutine {}", id);
        id
    }

    /// Runs the given coroutine until it yields or returns.
    ///
    /// A coroutine that has never run starts at the top of its entry
    /// function. A suspended coroutine continues right after the
    /// [`yield_now`](Self::yield_now) call that suspended it. If the entry
    /// function returns, the coroutine is [`Status::Dead`] and its id may be
    /// reused by the time this returns.
    ///
    /// Resuming an id with no coroutine in it, including one that has already
    /// finished, does nothing.
    ///
    /// # Panics
    ///
    /// Panics if a coroutine is currently running (that is, if called from
    /// inside a coroutine) or if `id` is outside the slot table.
    ///
    /// If the coroutine itself panics, it is finished and the panic is
    /// propagated to this caller.
    pub fn resume(&self, id: CoroutineId) {
        if let Some(running) = self.running.get() {
            panic!(
                "cannot resume coroutine {} while coroutine {} is running",
                id, running
            );
        }
        self.check_id(id);
        self.resume_inner(id);
    }

    /// Variant of [`resume`](Self::resume) that reports a running coroutine or
    /// an out-of-range id as an error instead of panicking.
    pub fn try_resume(&self, id: CoroutineId) -> Result<()> {
        if let Some(running) = self.running.get() {
            return Err(Error::AlreadyRunning(running));
        }
        self.validate_id(id)?;
        self.resume_inner(id);
        Ok(())
    }

    /// Suspends the running coroutine and returns control to the caller of
    /// [`resume`](Self::resume). Returns once the coroutine is resumed again.
    ///
    /// # Panics
    ///
    /// Panics if no coroutine of this scheduler is running, or if the caller
    /// is not executing on this scheduler's shared stack.
    pub fn yield_now(&self) {
        match self.running.get() {
            Some(id) => self.suspend(id),
            None => panic!("yield_now called while no coroutine is running"),
        }
    }

    /// Variant of [`yield_now`](Self::yield_now) that returns an error when no
    /// coroutine is running.
    pub fn try_yield_now(&self) -> Result<()> {
        let id = self.running.get().ok_or(Error::NotRunning)?;
        self.suspend(id);
        Ok(())
    }

    /// Returns the state of the coroutine in slot `id`. Empty slots report
    /// [`Status::Dead`].
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the slot table.
    pub fn status(&self, id: CoroutineId) -> Status {
        self.check_id(id);
        self.status_inner(id)
    }

    /// Variant of [`status`](Self::status) that returns an error for an
    /// out-of-range id.
    pub fn try_status(&self, id: CoroutineId) -> Result<Status> {
        self.validate_id(id)?;
        Ok(self.status_inner(id))
    }

    /// Returns the id of the running coroutine, if any.
    #[inline]
    pub fn running(&self) -> Option<CoroutineId> {
        self.running.get()
    }

    /// Number of slots in the coroutine table. Valid ids are below this.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.borrow().capacity()
    }

    /// Number of coroutines that have not finished yet.
    #[inline]
    pub fn active(&self) -> usize {
        self.slots.borrow().len()
    }

    /// Usable size of the shared stack in bytes.
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack.size()
    }

    /// Number of stack bytes saved for the coroutine in slot `id`, or `None`
    /// if the slot is empty. A coroutine that hasn't yielded yet has nothing
    /// saved.
    ///
    /// # Panics
    ///
    /// Panics if `id` is outside the slot table.
    pub fn snapshot_len(&self, id: CoroutineId) -> Option<usize> {
        self.check_id(id);
        self.slots
            .borrow()
            .get(id.index())
            .map(|coroutine| coroutine.snapshot.len())
    }

    #[cfg(test)]
    pub(crate) fn snapshot_capacity(&self, id: CoroutineId) -> Option<usize> {
        self.slots
            .borrow()
            .get(id.index())
            .map(|coroutine| coroutine.snapshot.capacity())
    }

    fn validate_id(&self, id: CoroutineId) -> Result<()> {
        let capacity = self.capacity();
        if id.index() < capacity {
            Ok(())
        } else {
            Err(Error::InvalidId { id, capacity })
        }
    }

    fn check_id(&self, id: CoroutineId) {
        if let Err(e) = self.validate_id(id) {
            panic!("{}", e);
        }
    }

    fn status_inner(&self, id: CoroutineId) -> Status {
        self.slots
            .borrow()
            .get(id.index())
            .map_or(Status::Dead, |coroutine| coroutine.status)
    }

    /// Common code for resuming a coroutine once the preconditions have been
    /// checked: nothing is running and `id` is in range.
    fn resume_inner(&self, id: CoroutineId) {
        debug_assert!(self.running.get().is_none());
        let stack_base = self.stack.base();

        // The slot table must not stay borrowed across the switch.
        let stack_ptr = {
            let mut slots = self.slots.borrow_mut();
            let coroutine = match slots.get_mut(id.index()) {
                Some(coroutine) => coroutine,
                None => return,
            };

            let stack_ptr = match coroutine.status {
                // Build a fresh context on the shared stack. The trampoline
                // gets the handle and finds the coroutine through `running`.
                Status::Ready => unsafe {
                    arch::init_stack(stack_base, coroutine_main, self as *const Handle)
                },

                // Put the saved stack back exactly where it was taken from.
                Status::Suspended => {
                    let saved = coroutine.stack_ptr.take();
                    let stack_ptr = unsafe { coroutine.snapshot.restore(stack_base) };
                    debug_assert_eq!(saved, Some(stack_ptr));
                    stack_ptr
                }

                Status::Running | Status::Dead => unreachable!(
                    "coroutine {} found {:?} while nothing is running",
                    id, coroutine.status
                ),
            };
            coroutine.status = Status::Running;
            stack_ptr
        };

        self.running.set(Some(id));
        trace!("resuming coroutine {}", id);

        let (result, stack_ptr) = unsafe { arch::switch_and_link(stack_ptr, stack_base) };

        match stack_ptr {
            Some(stack_ptr) => self.save(id, stack_ptr),
            None => {
                // The trampoline already released the coroutine. The result
                // lives on the shared stack, so take it before anything else
                // runs there.
                let result = unsafe { unwind::take_result(result) };
                unwind::rethrow(result);
            }
        }
    }

    /// Switches from the running coroutine back to the host.
    fn suspend(&self, id: CoroutineId) {
        assert!(
            self.stack.contains(arch::current_stack_ptr()),
            "coroutine {} yielded from outside its shared stack",
            id
        );

        match self.slots.borrow_mut().get_mut(id.index()) {
            Some(coroutine) => coroutine.status = Status::Suspended,
            None => unreachable!("running coroutine {} has no slot", id),
        }
        self.running.set(None);

        unsafe {
            arch::switch_yield(arch::parent_link(self.stack.base()));
        }
    }

    /// Copies the live part of the shared stack of a coroutine that just
    /// yielded into its snapshot.
    ///
    /// This runs on the host stack after the switch, so the registers saved
    /// by `switch_yield` are part of the copy.
    fn save(&self, id: CoroutineId, stack_ptr: StackPointer) {
        let mut slots = self.slots.borrow_mut();

        let extent = match self.stack.extent(stack_ptr) {
            Some(extent) => extent,
            None => {
                // Nothing valid can be saved, so the coroutine is gone.
                let coroutine = slots.remove(id.index());
                drop(slots);
                drop(coroutine);
                panic!(
                    "coroutine {} overran its {} byte shared stack",
                    id,
                    self.stack.size()
                );
            }
        };

        let coroutine = match slots.get_mut(id.index()) {
            Some(coroutine) => coroutine,
            None => unreachable!("suspended coroutine {} has no slot", id),
        };
        unsafe {
            coroutine.snapshot.save(stack_ptr, extent);
        }
        coroutine.stack_ptr = Some(stack_ptr);
        trace!("coroutine {} suspended with {} bytes of stack", id, extent);
    }

    /// Removes a coroutine whose entry function has returned.
    fn release(&self, id: CoroutineId) {
        let coroutine = self.slots.borrow_mut().remove(id.index());
        self.running.set(None);
        drop(coroutine);
        debug!("coroutine {} finished", id);
    }
}

/// Root of every coroutine, entered from the trampoline on the first resume.
unsafe extern "C" fn coroutine_main(parent_link: &mut StackPointer, handle: *const Handle) -> ! {
    let handle = &*handle;

    // resume() always marks the coroutine as running before switching.
    let id = match handle.running.get() {
        Some(id) => id,
        None => unreachable_unchecked(),
    };

    // Run the entry function, catching any panics.
    let result = unwind::catch_at_root(|| {
        let entry = handle
            .slots
            .borrow_mut()
            .get_mut(id.index())
            .and_then(|coroutine| coroutine.entry.take());
        match entry {
            Some(entry) => entry(handle),
            None => unreachable!("coroutine {} started without an entry function", id),
        }
    });

    // Unwinding past this frame would run into the assembly trampoline.
    // Abort with a double panic instead.
    let guard = scopeguard::guard((), |()| {
        panic!("failed to release coroutine {}, aborting", id);
    });
    handle.release(id);
    mem::forget(guard);

    // The host moves the result out of this frame.
    let result = ManuallyDrop::new(result);
    arch::switch_and_reset(&*result, parent_link);
}
