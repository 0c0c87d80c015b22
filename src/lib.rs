//! Level-triggered descriptor readiness polling for cooperative coroutine
//! runtimes.
//!
//! copoll bridges an OS readiness primitive (`epoll(7)` on Linux/Android,
//! `poll(2)` elsewhere) to a single-threaded scheduler. A coroutine that
//! needs a descriptor to become readable or writable registers its intent
//! with [`Poller::add`] and suspends; when the scheduler runs out of ready
//! coroutines it calls [`Poller::wait`], which pushes pending registrations
//! to the kernel in one batch, blocks, and resumes exactly the coroutines
//! whose descriptors became ready.
//!
//! Resumption is delivered through the [`Schedule`] trait, the only upward
//! call copoll makes into the runtime. The [`Readiness`] flags handed to a
//! resumed coroutine say which directions are ready, with
//! [`Readiness::ERROR`] set for both the read and the write waiter when the
//! kernel reports an error or hang-up condition.
//!
//! # Guarantees
//!
//! * At most one coroutine may wait for each direction of a descriptor;
//!   registering a second waiter for an occupied direction panics.
//! * Kernel registrations are updated lazily: `add`, `rm` and `clean` make
//!   no kernel calls, `wait` reconciles the accumulated changes with at
//!   most one kernel operation per descriptor.
//! * A coroutine waiting on both directions of one descriptor is resumed
//!   once, with the union of its readiness flags.
//! * [`Poller::fork`] rebuilds kernel-side state in the child, so parent
//!   and child never share a registration set.
//!
//! All wait-table mutation is expected to happen on the scheduler thread;
//! the surrounding runtime owns the `Poller` the way it owns its ready
//! queue and timer wheel.
//!
//! # Examples
//!
//! ```
//! use std::net::TcpListener;
//! use std::os::unix::io::AsRawFd;
//! use std::time::Duration;
//!
//! use copoll::{CoroId, Interest, Poller, Readiness};
//!
//! # fn main() -> std::io::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:0")?;
//! let mut poller = Poller::new()?;
//!
//! // Coroutine 0 wants to know when the listener becomes readable.
//! poller.add(listener.as_raw_fd(), Interest::READABLE, CoroId(0));
//!
//! let mut woken = Vec::new();
//! let resumed = poller.wait(
//!     Some(Duration::from_millis(10)),
//!     &mut |co: CoroId, readiness: Readiness| woken.push((co, readiness)),
//! );
//!
//! // Nobody connected, so the wait timed out.
//! assert!(!resumed);
//! assert!(woken.is_empty());
//!
//! // Cancel the wait before closing the descriptor.
//! poller.rm(listener.as_raw_fd(), Interest::READABLE);
//! poller.clean(listener.as_raw_fd());
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs, missing_debug_implementations)]

mod coro;
mod interest;
mod poller;
mod readiness;
pub mod sys;

pub use coro::{CoroId, Schedule};
pub use interest::Interest;
pub use poller::Poller;
pub use readiness::Readiness;
