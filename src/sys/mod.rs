//! Kernel pollset back-ends.
//!
//! A pollset is the kernel-side mirror of the poller's wait table. The
//! [`Pollset`] trait is the capability set the core needs from it (install,
//! modify, remove, wait) and nothing more. Two back-ends implement it:
//!
//! * [`epoll::Selector`]: indexed, on top of `epoll(7)`. Linux and Android
//!   only, and the default there.
//! * [`poll::Selector`]: scanned, on top of `poll(2)`. Available on every
//!   Unix target, the default where epoll is not, and selectable
//!   everywhere with `RUSTFLAGS="--cfg copoll_force_poll"`.
//!
//! [`Selector`] is the build-time default. Tests (and runtimes with
//! unusual needs) can bypass the default by handing any `Pollset`
//! implementation to [`Poller::with_pollset`].
//!
//! [`epoll::Selector`]: crate::sys::epoll::Selector
//! [`poll::Selector`]: crate::sys::poll::Selector
//! [`Poller::with_pollset`]: crate::Poller::with_pollset

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::{Interest, Readiness};

#[cfg(unix)]
mod unix;

#[cfg(all(unix, any(target_os = "linux", target_os = "android")))]
pub use self::unix::epoll;
#[cfg(unix)]
pub use self::unix::poll;
#[cfg(unix)]
pub use self::unix::Selector;

#[cfg(unix)]
pub(crate) use self::unix::{fd_limit, fork};

/// A kernel readiness report for one descriptor, normalized across
/// back-ends.
#[derive(Debug, Clone, Copy)]
pub struct FdEvent {
    /// The descriptor the kernel reported on.
    pub fd: RawFd,
    /// Which directions are ready, with [`Readiness::ERROR`] standing in
    /// for the back-end's error/hang-up/invalid conditions.
    pub readiness: Readiness,
}

/// Capability set of a kernel pollset back-end.
///
/// The poller core guarantees a strict discipline around these calls:
/// `install` is only issued for a descriptor the pollset does not hold,
/// `modify` and `remove` only for one it does. The core treats `install`
/// and `modify` failures as fatal desynchronization; `remove` may fail
/// with `NotFound`/`EBADF` when the descriptor was closed elsewhere, which
/// the core tolerates.
pub trait Pollset {
    /// True when the back-end looks descriptors up in O(1) and the wait
    /// table should be pre-sized to the process descriptor limit.
    const INDEXED: bool;

    /// Register `fd` with the given mask.
    fn install(&mut self, fd: RawFd, mask: Interest) -> io::Result<()>;

    /// Replace the mask registered for `fd`.
    fn modify(&mut self, fd: RawFd, mask: Interest) -> io::Result<()>;

    /// Drop the registration for `fd`.
    fn remove(&mut self, fd: RawFd) -> io::Result<()>;

    /// Block until at least one registered descriptor is ready or the
    /// timeout elapses, appending one normalized event per ready
    /// descriptor to `events`.
    ///
    /// `None` blocks indefinitely; `Some(Duration::ZERO)` is a
    /// non-blocking probe. A single kernel call: interruption surfaces as
    /// `ErrorKind::Interrupted` and the caller owns the retry.
    fn wait(&mut self, events: &mut Vec<FdEvent>, timeout: Option<Duration>) -> io::Result<()>;

    /// Recreate kernel-side state after a fork, in the child.
    ///
    /// `installed` holds every descriptor the wait table believes is
    /// registered, with its mask. Back-ends whose state is not shared with
    /// the parent through the kernel keep this default no-op.
    fn rebuild(&mut self, installed: &[(RawFd, Interest)]) -> io::Result<()> {
        let _ = installed;
        Ok(())
    }
}
