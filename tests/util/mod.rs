// Not all functions are used by all tests.
#![allow(dead_code)]

use std::os::unix::io::RawFd;
use std::sync::Once;

use copoll::{CoroId, Readiness, Schedule};

pub fn init() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        env_logger::try_init().expect("unable to initialise logger");
    });
}

/// Scheduler stand-in recording every resumption in order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub resumed: Vec<(CoroId, Readiness)>,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    pub fn take(&mut self) -> Vec<(CoroId, Readiness)> {
        std::mem::take(&mut self.resumed)
    }
}

impl Schedule for Recorder {
    fn resume(&mut self, co: CoroId, readiness: Readiness) {
        self.resumed.push((co, readiness));
    }
}

/// A non-blocking pipe pair.
#[derive(Debug)]
pub struct Pipe {
    read: RawFd,
    write: RawFd,
}

impl Pipe {
    pub fn new() -> Pipe {
        let mut fds = [0; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0, "pipe failed");
        for fd in fds {
            let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
            assert_ne!(flags, -1);
            assert_ne!(
                unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) },
                -1
            );
        }
        Pipe {
            read: fds[0],
            write: fds[1],
        }
    }

    pub fn read_fd(&self) -> RawFd {
        self.read
    }

    pub fn write_fd(&self) -> RawFd {
        self.write
    }

    /// Make the read end readable.
    pub fn put(&self, byte: u8) {
        let buf = [byte];
        let n = unsafe { libc::write(self.write, buf.as_ptr() as *const libc::c_void, 1) };
        assert_eq!(n, 1, "pipe write failed");
    }

    /// Close the write end, hanging up the read end.
    pub fn close_write(&mut self) {
        if self.write >= 0 {
            unsafe { libc::close(self.write) };
            self.write = -1;
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.read);
            if self.write >= 0 {
                libc::close(self.write);
            }
        }
    }
}
