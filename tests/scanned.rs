//! The core scenarios driven through the scanned `poll(2)` back-end,
//! which stays available (and testable) on targets whose default is
//! epoll.

#![cfg(unix)]

use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use copoll::sys::poll::Selector;
use copoll::{CoroId, Interest, Poller, Readiness};

mod util;

use util::{init, Pipe, Recorder};

const A: CoroId = CoroId(1);
const B: CoroId = CoroId(2);

const LONG: Option<Duration> = Some(Duration::from_secs(5));
const PROBE: Option<Duration> = Some(Duration::ZERO);

fn scanned_poller() -> Poller<Selector> {
    Poller::with_pollset(Selector::new().unwrap())
}

#[test]
fn single_reader_readable() {
    init();

    let mut poller = scanned_poller();
    let mut sched = Recorder::new();
    let pipe = Pipe::new();

    poller.add(pipe.read_fd(), Interest::READABLE, A);
    pipe.put(b'x');

    assert!(poller.wait(LONG, &mut sched));
    assert_eq!(sched.take(), vec![(A, Readiness::READABLE)]);

    assert!(!poller.wait(PROBE, &mut sched));
    assert_eq!(poller.installed(pipe.read_fd()), None);
}

#[test]
fn reader_and_writer_split_resumption() {
    init();

    let mut poller = scanned_poller();
    let mut sched = Recorder::new();
    let (s1, mut s2) = UnixStream::pair().unwrap();
    let fd = s1.as_raw_fd();

    poller.add(fd, Interest::READABLE, A);
    poller.add(fd, Interest::WRITABLE, B);

    assert!(poller.wait(LONG, &mut sched));
    assert_eq!(sched.take(), vec![(B, Readiness::WRITABLE)]);

    assert!(!poller.wait(PROBE, &mut sched));
    assert_eq!(poller.installed(fd), Some(Interest::READABLE));

    s2.write_all(b"ping").unwrap();
    assert!(poller.wait(LONG, &mut sched));
    assert_eq!(sched.take(), vec![(A, Readiness::READABLE)]);
}

#[test]
fn both_directions_coalesce_into_one_resumption() {
    init();

    let mut poller = scanned_poller();
    let mut sched = Recorder::new();
    let (s1, mut s2) = UnixStream::pair().unwrap();
    let fd = s1.as_raw_fd();

    s2.write_all(b"ping").unwrap();
    poller.add(fd, Interest::READABLE | Interest::WRITABLE, A);

    assert!(poller.wait(LONG, &mut sched));
    assert_eq!(
        sched.take(),
        vec![(A, Readiness::READABLE | Readiness::WRITABLE)]
    );
}

#[test]
fn hangup_fans_out_to_both_waiters() {
    init();

    let mut poller = scanned_poller();
    let mut sched = Recorder::new();
    let (s1, s2) = UnixStream::pair().unwrap();
    let fd = s1.as_raw_fd();

    poller.add(fd, Interest::READABLE, A);
    poller.add(fd, Interest::WRITABLE, B);
    drop(s2);

    assert!(poller.wait(LONG, &mut sched));
    let resumed = sched.take();
    assert_eq!(resumed.len(), 2);
    assert!(resumed.iter().all(|(_, readiness)| readiness.is_error()));
}

#[test]
fn dead_descriptor_surfaces_as_error() {
    init();

    // A descriptor number nothing in this process has open. The scanned
    // back-end registers it without a kernel call, and `poll(2)` then
    // reports it invalid; to the waiter that is an error on the
    // descriptor, same as a close it missed.
    let fd = 900;

    let mut poller = scanned_poller();
    let mut sched = Recorder::new();

    poller.add(fd, Interest::READABLE, A);
    assert!(poller.wait(LONG, &mut sched));
    assert_eq!(sched.take(), vec![(A, Readiness::ERROR)]);

    poller.clean(fd);
    assert_eq!(poller.installed(fd), None);
    assert!(!poller.wait(PROBE, &mut sched));
}
