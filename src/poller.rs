use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use log::trace;

use crate::sys::{self, FdEvent, Pollset};
use crate::{CoroId, Interest, Readiness, Schedule};

/// Slots pre-allocated eagerly when the descriptor limit is very large;
/// slots past the cap are grown on demand.
const MAX_PREALLOC: usize = 1 << 16;

/// Descriptor readiness poller for a cooperative, single-threaded runtime.
///
/// The `Poller` keeps a wait table with one slot per descriptor (at most
/// one coroutine waiting for readability and one waiting for writability)
/// and mirrors the union of those waits into a kernel pollset. The mirror
/// is maintained lazily: [`add`], [`rm`] and [`clean`] only edit the table
/// and enqueue the descriptor on an internal change list, and the next
/// [`wait`] reconciles the whole batch with at most one kernel operation
/// per descriptor. A coroutine that writes to and then reads from a socket
/// therefore costs one `MOD`, not two.
///
/// The scheduler owns the `Poller` the same way it owns its ready queue;
/// there is no global instance. All calls are expected to come from the
/// scheduler thread, between context switches.
///
/// See the [crate documentation](crate) for an example.
///
/// [`add`]: Poller::add
/// [`rm`]: Poller::rm
/// [`clean`]: Poller::clean
/// [`wait`]: Poller::wait
#[derive(Debug)]
pub struct Poller<P: Pollset = sys::Selector> {
    pollset: P,
    slots: Vec<WaitSlot>,
    /// Head of the change list threaded through the wait table.
    changes: ChangeLink,
    /// Event buffer reused across waits.
    events: Vec<FdEvent>,
}

/// One wait-table slot.
#[derive(Debug, Clone)]
struct WaitSlot {
    reader: Option<CoroId>,
    writer: Option<CoroId>,
    /// The mask currently registered with the kernel. The sole
    /// authoritative mirror of kernel state; `None` means no registration.
    installed: Option<Interest>,
    next_change: ChangeLink,
}

impl WaitSlot {
    const EMPTY: WaitSlot = WaitSlot {
        reader: None,
        writer: None,
        installed: None,
        next_change: ChangeLink::Nil,
    };

    /// The mask the kernel should hold: READABLE iff a reader waits,
    /// WRITABLE iff a writer waits.
    fn desired(&self) -> Option<Interest> {
        match (self.reader.is_some(), self.writer.is_some()) {
            (false, false) => None,
            (true, false) => Some(Interest::READABLE),
            (false, true) => Some(Interest::WRITABLE),
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
        }
    }
}

/// Link field of the intrusive change list.
///
/// `Nil` doubles as the "not enqueued" marker, which is what keeps a
/// descriptor from appearing on the list twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeLink {
    /// Not on the list.
    Nil,
    /// On the list, last element.
    End,
    /// On the list, followed by this descriptor.
    Next(RawFd),
}

impl Poller<sys::Selector> {
    /// Create a poller on the build's default kernel back-end.
    ///
    /// With the indexed (epoll) back-end the wait table is sized up front
    /// from the process descriptor limit; with the scanned back-end it
    /// starts empty and grows with the highest descriptor seen.
    ///
    /// # Errors
    ///
    /// Fails when the kernel pollset handle cannot be created, e.g. on
    /// descriptor or memory exhaustion. No partial state is left behind;
    /// simply retry or give up.
    pub fn new() -> io::Result<Poller> {
        Ok(Poller::with_pollset(sys::Selector::new()?))
    }
}

impl<P: Pollset> Poller<P> {
    /// Create a poller on an explicit back-end instance.
    ///
    /// This is how tests drive the core against a mock pollset, and how a
    /// build selects the non-default back-end at runtime:
    ///
    /// ```
    /// use copoll::sys;
    /// use copoll::Poller;
    ///
    /// # fn main() -> std::io::Result<()> {
    /// let poller = Poller::with_pollset(sys::poll::Selector::new()?);
    /// # drop(poller);
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_pollset(pollset: P) -> Poller<P> {
        let mut slots = Vec::new();
        if P::INDEXED {
            if let Some(limit) = sys::fd_limit() {
                slots.resize(limit.min(MAX_PREALLOC), WaitSlot::EMPTY);
            }
        }
        Poller {
            pollset,
            slots,
            changes: ChangeLink::Nil,
            events: Vec::with_capacity(128),
        }
    }

    /// Register the running coroutine as a waiter on `fd`.
    ///
    /// For each direction in `events`, `co` becomes the waiter for that
    /// direction. No kernel call is made; the registration reaches the
    /// kernel on the next [`wait`](Poller::wait). The caller is expected
    /// to suspend the coroutine right after this returns.
    ///
    /// # Panics
    ///
    /// Panics if a coroutine already waits for one of the named directions
    /// on this descriptor, or if `fd` is negative. Both are runtime bugs,
    /// not recoverable conditions.
    pub fn add(&mut self, fd: RawFd, events: Interest, co: CoroId) {
        trace!("add: fd={}, events={:?}, co={:?}", fd, events, co);
        let slot = self.slot_mut(fd);
        if events.is_readable() {
            assert!(
                slot.reader.is_none(),
                "multiple coroutines waiting for a single file descriptor"
            );
            slot.reader = Some(co);
        }
        if events.is_writable() {
            assert!(
                slot.writer.is_none(),
                "multiple coroutines waiting for a single file descriptor"
            );
            slot.writer = Some(co);
        }
        self.enqueue_change(fd);
    }

    /// Withdraw waiters from `fd` for the named directions.
    ///
    /// Called when a wait completes or is cancelled (timeout, explicit
    /// cancellation). Directions that have no waiter are left as they are.
    /// No kernel call is made; the shrunken mask reaches the kernel on the
    /// next [`wait`](Poller::wait).
    pub fn rm(&mut self, fd: RawFd, events: Interest) {
        trace!("rm: fd={}, events={:?}", fd, events);
        let slot = self.slot_mut(fd);
        if events.is_readable() {
            slot.reader = None;
        }
        if events.is_writable() {
            slot.writer = None;
        }
        self.enqueue_change(fd);
    }

    /// Forget everything about `fd` before the application closes it.
    ///
    /// If the descriptor is still registered with the kernel it is removed
    /// eagerly, so the registration cannot outlive the descriptor and leak
    /// onto whatever number the OS hands out next. A kernel report that
    /// the descriptor is already gone is tolerated.
    ///
    /// # Panics
    ///
    /// Panics if a coroutine still waits on the descriptor: the runtime
    /// must cancel waits (with [`rm`](Poller::rm)) before closing.
    pub fn clean(&mut self, fd: RawFd) {
        trace!("clean: fd={}", fd);
        let slot = self.slot_mut(fd);
        assert!(
            slot.reader.is_none() && slot.writer.is_none(),
            "file descriptor cleaned while a coroutine is waiting on it"
        );
        if slot.installed.take().is_some() {
            if let Err(err) = self.pollset.remove(fd) {
                if !removal_tolerable(&err) {
                    panic!("failed to remove fd {} from the pollset: {}", fd, err);
                }
            }
        }
        self.enqueue_change(fd);
    }

    /// Block until a registered descriptor is ready, and resume its
    /// waiters.
    ///
    /// First the accumulated table changes are reconciled into the kernel
    /// pollset, then the kernel is waited on for up to `timeout` (`None`
    /// blocks indefinitely, `Some(Duration::ZERO)` probes without
    /// blocking). Each reported descriptor resumes its waiters through
    /// `sched`, in the order the kernel reported the events:
    ///
    /// * the same coroutine waiting on both directions is resumed once,
    ///   with the union of its flags;
    /// * otherwise the reader and the writer are resumed independently,
    ///   each only if its own flags are non-empty;
    /// * an error or hang-up report sets [`Readiness::ERROR`] for both.
    ///
    /// Resumed waiters are withdrawn from the table before `sched` sees
    /// them; the kernel-side mask shrinks on the next call.
    ///
    /// Returns `true` if at least one coroutine was resumed, `false` on
    /// timeout. Interrupted kernel waits are retried against the original
    /// deadline and are never visible to the caller.
    ///
    /// # Panics
    ///
    /// Panics when the kernel rejects a registration it should hold (the
    /// wait table and the kernel have desynchronized, which is a bug, not
    /// a runtime condition) and on kernel wait failures other than
    /// interruption.
    pub fn wait<S: Schedule>(&mut self, timeout: Option<Duration>, sched: &mut S) -> bool {
        self.reconcile();

        let deadline = timeout.map(|to| Instant::now() + to);
        self.events.clear();
        let mut events = mem::take(&mut self.events);
        loop {
            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            match self.pollset.wait(&mut events, remaining) {
                Ok(()) => break,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => panic!("pollset wait failed: {}", err),
            }
        }

        let resumed = self.dispatch(&events, sched);
        events.clear();
        self.events = events;
        resumed
    }

    /// Fork the process, giving the child its own kernel pollset.
    ///
    /// Returns the child's pid in the parent and `0` in the child, like
    /// `fork(2)`. In the child, every descriptor the wait table holds a
    /// registration for is re-installed into a fresh kernel pollset, so
    /// registrations made by either process are invisible to the other.
    /// Pending change-list entries are not replayed; they reconcile on the
    /// next [`wait`](Poller::wait) in whichever process performs it.
    ///
    /// # Panics
    ///
    /// Panics in the child if the pollset cannot be rebuilt. A child
    /// without working I/O has nothing sensible left to do.
    pub fn fork(&mut self) -> io::Result<libc::pid_t> {
        let pid = sys::fork()?;
        if pid == 0 {
            let installed: Vec<(RawFd, Interest)> = self
                .slots
                .iter()
                .enumerate()
                .filter_map(|(fd, slot)| slot.installed.map(|mask| (fd as RawFd, mask)))
                .collect();
            trace!("fork child: rebuilding {} registrations", installed.len());
            if let Err(err) = self.pollset.rebuild(&installed) {
                panic!("failed to rebuild the pollset in the forked child: {}", err);
            }
        }
        Ok(pid)
    }

    /// The mask currently registered with the kernel for `fd`, if any.
    ///
    /// Reflects the state as of the last [`wait`](Poller::wait);
    /// registrations made since then are still pending reconciliation.
    pub fn installed(&self, fd: RawFd) -> Option<Interest> {
        self.slots.get(fd as usize).and_then(|slot| slot.installed)
    }

    fn slot_mut(&mut self, fd: RawFd) -> &mut WaitSlot {
        assert!(fd >= 0, "negative file descriptor");
        let idx = fd as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, WaitSlot::EMPTY);
        }
        &mut self.slots[idx]
    }

    /// Put `fd` on the change list unless it is already there.
    fn enqueue_change(&mut self, fd: RawFd) {
        let head = self.changes;
        let slot = &mut self.slots[fd as usize];
        if slot.next_change != ChangeLink::Nil {
            return;
        }
        slot.next_change = match head {
            ChangeLink::Nil => ChangeLink::End,
            head => head,
        };
        self.changes = ChangeLink::Next(fd);
    }

    /// Drain the change list into the kernel pollset.
    ///
    /// One minimal kernel operation per descriptor whose desired mask
    /// differs from the installed one; descriptors whose masks already
    /// agree (enqueued redundantly, e.g. an `add` immediately undone by an
    /// `rm`) are unlinked without kernel traffic.
    fn reconcile(&mut self) {
        let mut next = mem::replace(&mut self.changes, ChangeLink::Nil);
        while let ChangeLink::Next(fd) = next {
            let slot = &mut self.slots[fd as usize];
            next = mem::replace(&mut slot.next_change, ChangeLink::Nil);

            let desired = slot.desired();
            let installed = slot.installed;
            if desired == installed {
                continue;
            }
            slot.installed = desired;

            match (installed, desired) {
                (None, Some(mask)) => {
                    trace!("reconcile: install fd={}, mask={:?}", fd, mask);
                    if let Err(err) = self.pollset.install(fd, mask) {
                        panic!("failed to install fd {} in the pollset: {}", fd, err);
                    }
                }
                (Some(_), Some(mask)) => {
                    trace!("reconcile: modify fd={}, mask={:?}", fd, mask);
                    if let Err(err) = self.pollset.modify(fd, mask) {
                        panic!("failed to modify fd {} in the pollset: {}", fd, err);
                    }
                }
                (Some(_), None) => {
                    trace!("reconcile: remove fd={}", fd);
                    if let Err(err) = self.pollset.remove(fd) {
                        if !removal_tolerable(&err) {
                            panic!("failed to remove fd {} from the pollset: {}", fd, err);
                        }
                    }
                }
                (None, None) => unreachable!(),
            }
        }
    }

    /// Resume the waiters of every reported descriptor.
    fn dispatch<S: Schedule>(&mut self, events: &[FdEvent], sched: &mut S) -> bool {
        let mut resumed = false;
        for event in events {
            let Some(slot) = self.slots.get(event.fd as usize) else {
                continue;
            };
            let (reader, writer) = (slot.reader, slot.writer);

            let mut in_flags = Readiness::EMPTY;
            if event.readiness.is_readable() {
                in_flags |= Readiness::READABLE;
            }
            let mut out_flags = Readiness::EMPTY;
            if event.readiness.is_writable() {
                out_flags |= Readiness::WRITABLE;
            }
            // Errors and hang-ups concern both directions, whatever each
            // waiter subscribed to.
            if event.readiness.is_error() {
                in_flags |= Readiness::ERROR;
                out_flags |= Readiness::ERROR;
            }

            match (reader, writer) {
                (Some(co), Some(other)) if co == other => {
                    // One coroutine awaits both directions: a single,
                    // coalesced resumption with the union of the flags.
                    let flags = in_flags | out_flags;
                    if !flags.is_empty() {
                        trace!(
                            "dispatch: fd={}, co={:?}, flags={:?} (coalesced)",
                            event.fd,
                            co,
                            flags
                        );
                        self.rm(event.fd, Interest::READABLE | Interest::WRITABLE);
                        sched.resume(co, flags);
                        resumed = true;
                    }
                }
                (reader, writer) => {
                    if let Some(co) = reader {
                        if !in_flags.is_empty() {
                            trace!("dispatch: fd={}, co={:?}, flags={:?}", event.fd, co, in_flags);
                            self.rm(event.fd, Interest::READABLE);
                            sched.resume(co, in_flags);
                            resumed = true;
                        }
                    }
                    if let Some(co) = writer {
                        if !out_flags.is_empty() {
                            trace!("dispatch: fd={}, co={:?}, flags={:?}", event.fd, co, out_flags);
                            self.rm(event.fd, Interest::WRITABLE);
                            sched.resume(co, out_flags);
                            resumed = true;
                        }
                    }
                }
            }
        }
        resumed
    }
}

/// Kernel removal may race a descriptor being closed elsewhere; those
/// reports are fine, anything else is desynchronization.
fn removal_tolerable(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::EBADF)
}
