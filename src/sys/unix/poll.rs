//! Scanned back-end on top of `poll(2)`.

use std::fmt::{self, Debug, Formatter};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::sys::{FdEvent, Pollset};
use crate::{Interest, Readiness};

const INITIAL_CAP: usize = 64;

/// Kernel pollset backed by a `pollfd` array.
///
/// There is no kernel-held registration set: the whole array is handed to
/// `poll(2)` on every wait and the kernel fills in `revents` for each
/// entry. Registration calls only edit the array: install appends, modify
/// rewrites in place, remove swaps the last entry in. Lookups scan.
///
/// Because nothing kernel-side outlives a single `poll(2)` call, a forked
/// child inherits a perfectly private copy and the fork rebuild is the
/// trait's default no-op.
#[derive(Debug)]
pub struct Selector {
    fds: Vec<PollFd>,
}

/// Transparent wrapper around `libc::pollfd`, used to support `Debug`
/// derives without adding the `extra_traits` feature of `libc`.
#[repr(transparent)]
#[derive(Clone)]
struct PollFd(libc::pollfd);

impl Debug for PollFd {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("pollfd")
            .field("fd", &self.0.fd)
            .field("events", &self.0.events)
            .field("revents", &self.0.revents)
            .finish()
    }
}

impl Selector {
    /// Create a new, empty pollset.
    pub fn new() -> io::Result<Selector> {
        Ok(Selector {
            fds: Vec::with_capacity(INITIAL_CAP),
        })
    }

    fn position(&self, fd: RawFd) -> Option<usize> {
        self.fds.iter().position(|pfd| pfd.0.fd == fd)
    }
}

impl Pollset for Selector {
    const INDEXED: bool = false;

    fn install(&mut self, fd: RawFd, mask: Interest) -> io::Result<()> {
        if self.position(fd).is_some() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "file descriptor already in the pollset",
            ));
        }
        self.fds.push(PollFd(libc::pollfd {
            fd,
            events: interest_to_poll(mask),
            revents: 0,
        }));
        Ok(())
    }

    fn modify(&mut self, fd: RawFd, mask: Interest) -> io::Result<()> {
        let idx = self.position(fd).ok_or(io::ErrorKind::NotFound)?;
        self.fds[idx].0.events = interest_to_poll(mask);
        Ok(())
    }

    fn remove(&mut self, fd: RawFd) -> io::Result<()> {
        let idx = self.position(fd).ok_or(io::ErrorKind::NotFound)?;
        self.fds.swap_remove(idx);
        Ok(())
    }

    fn wait(&mut self, events: &mut Vec<FdEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout = super::millis(timeout);

        log::trace!("polling on {:?}", self.fds);
        let n = syscall!(poll(
            self.fds.as_mut_ptr() as *mut libc::pollfd,
            self.fds.len() as libc::nfds_t,
            timeout,
        ))?;
        if n == 0 {
            return Ok(());
        }

        for pfd in &self.fds {
            if pfd.0.revents != 0 {
                events.push(FdEvent {
                    fd: pfd.0.fd,
                    readiness: poll_to_readiness(pfd.0.revents),
                });
                if events.len() == n as usize {
                    break;
                }
            }
        }
        Ok(())
    }
}

fn interest_to_poll(mask: Interest) -> libc::c_short {
    let mut kind = 0;

    if mask.is_readable() {
        kind |= libc::POLLIN;
    }

    if mask.is_writable() {
        kind |= libc::POLLOUT;
    }

    kind
}

fn poll_to_readiness(revents: libc::c_short) -> Readiness {
    let mut readiness = Readiness::EMPTY;

    if revents & (libc::POLLIN | libc::POLLPRI) != 0 {
        readiness |= Readiness::READABLE;
    }

    if revents & libc::POLLOUT != 0 {
        readiness |= Readiness::WRITABLE;
    }

    // POLLNVAL means the descriptor was closed behind our back; to the
    // waiter that is indistinguishable from any other dead descriptor.
    if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
        readiness |= Readiness::ERROR;
    }

    readiness
}
