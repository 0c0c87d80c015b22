//! Indexed back-end on top of `epoll(7)`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLPRI};

use crate::sys::{FdEvent, Pollset};
use crate::{Interest, Readiness};

/// Events fetched per `epoll_wait` call. The primitive is level-triggered,
/// so anything that does not fit resurfaces on the next call.
const EVENTS_CAP: usize = 128;

/// Kernel pollset backed by an epoll instance.
///
/// Registrations are `epoll_ctl` calls, O(1) by descriptor, and the kernel
/// reports only ready descriptors. The epoll descriptor itself is shared
/// with the parent across `fork(2)`, which is why [`Pollset::rebuild`]
/// replaces it wholesale in the child.
#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    /// Create a new, empty pollset.
    pub fn new() -> io::Result<Selector> {
        // SAFETY: `epoll_create1(2)` ensures the fd is valid.
        let ep = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        Ok(Selector { ep })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, mask: Option<Interest>) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: mask.map(interest_to_epoll).unwrap_or(0),
            u64: fd as u64,
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), op, fd, &mut event)).map(|_| ())
    }
}

impl Pollset for Selector {
    const INDEXED: bool = true;

    fn install(&mut self, fd: RawFd, mask: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, Some(mask))
    }

    fn modify(&mut self, fd: RawFd, mask: Interest) -> io::Result<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, Some(mask))
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        // A zeroed event instead of NULL keeps pre-2.6.9 kernels happy.
        self.ctl(libc::EPOLL_CTL_DEL, fd, None)
    }

    fn wait(&mut self, events: &mut Vec<FdEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = super::millis(timeout);

        let mut buf = [libc::epoll_event { events: 0, u64: 0 }; EVENTS_CAP];
        let n = syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            buf.as_mut_ptr(),
            EVENTS_CAP as i32,
            timeout,
        ))?;

        for ev in &buf[..n as usize] {
            events.push(FdEvent {
                fd: ev.u64 as RawFd,
                readiness: epoll_to_readiness(ev.events),
            });
        }
        Ok(())
    }

    fn rebuild(&mut self, installed: &[(RawFd, Interest)]) -> io::Result<()> {
        // The inherited epoll descriptor still names the parent's interest
        // list; registrations through it would be visible to the parent.
        // Replace it and re-install from the wait table.
        // SAFETY: `epoll_create1(2)` ensures the fd is valid.
        self.ep = unsafe { OwnedFd::from_raw_fd(syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?) };
        for &(fd, mask) in installed {
            self.ctl(libc::EPOLL_CTL_ADD, fd, Some(mask))?;
        }
        Ok(())
    }
}

impl AsRawFd for Selector {
    fn as_raw_fd(&self) -> RawFd {
        self.ep.as_raw_fd()
    }
}

fn interest_to_epoll(mask: Interest) -> u32 {
    // Level-triggered: no EPOLLET.
    let mut kind = 0;

    if mask.is_readable() {
        kind |= EPOLLIN;
    }

    if mask.is_writable() {
        kind |= EPOLLOUT;
    }

    kind as u32
}

fn epoll_to_readiness(events: u32) -> Readiness {
    let events = events as libc::c_int;
    let mut readiness = Readiness::EMPTY;

    if events & (EPOLLIN | EPOLLPRI) != 0 {
        readiness |= Readiness::READABLE;
    }

    if events & EPOLLOUT != 0 {
        readiness |= Readiness::WRITABLE;
    }

    if events & (EPOLLERR | EPOLLHUP) != 0 {
        readiness |= Readiness::ERROR;
    }

    readiness
}
