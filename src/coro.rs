use std::fmt;

use crate::Readiness;

/// Handle of a suspended coroutine, as known to the poller.
///
/// The poller does not own coroutines; the scheduler does. `CoroId` is an
/// opaque value the runtime picks when registering a wait and gets back,
/// unchanged, through [`Schedule::resume`] when the wait completes. A
/// runtime will usually use a slab index or an arena key here.
///
/// Two waits registered with the same `CoroId` on both directions of one
/// descriptor are treated as a single coroutine waiting for either
/// direction, and produce a single, coalesced resumption.
///
/// ```
/// use copoll::CoroId;
///
/// let id = CoroId(17);
/// assert_eq!(usize::from(id), 17);
/// ```
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoroId(pub usize);

impl From<CoroId> for usize {
    fn from(val: CoroId) -> usize {
        val.0
    }
}

impl From<usize> for CoroId {
    fn from(val: usize) -> CoroId {
        CoroId(val)
    }
}

impl fmt::Debug for CoroId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoroId({})", self.0)
    }
}

/// The poller's single callback into the surrounding runtime.
///
/// [`Poller::wait`] hands every coroutine whose descriptor became ready
/// back to the scheduler through this trait. The implementation is expected
/// to move the coroutine to the ready queue; it must not re-enter the
/// poller from inside `resume`.
///
/// The trait is implemented for any `FnMut(CoroId, Readiness)` closure, so
/// small runtimes and tests can pass a closure instead of a dedicated
/// scheduler type:
///
/// ```
/// use copoll::{CoroId, Readiness, Schedule};
///
/// let mut ready = Vec::new();
/// let mut sched = |co: CoroId, readiness: Readiness| ready.push((co, readiness));
/// sched.resume(CoroId(3), Readiness::READABLE);
/// assert_eq!(ready, vec![(CoroId(3), Readiness::READABLE)]);
/// ```
///
/// [`Poller::wait`]: crate::Poller::wait
pub trait Schedule {
    /// Hand a ready coroutine back to the scheduler.
    ///
    /// `readiness` names the directions that are ready, with
    /// [`Readiness::ERROR`] set when the kernel reported an error or
    /// hang-up on the descriptor.
    fn resume(&mut self, co: CoroId, readiness: Readiness);
}

impl<F: FnMut(CoroId, Readiness)> Schedule for F {
    fn resume(&mut self, co: CoroId, readiness: Readiness) {
        (self)(co, readiness)
    }
}
