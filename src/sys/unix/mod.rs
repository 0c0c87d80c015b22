use std::io;
use std::time::Duration;

/// Helper macro to execute a system call that returns an `io::Result`.
//
// Macro must be defined before any modules that uses them.
#[allow(unused_macros)]
macro_rules! syscall {
    ($fn: ident ( $($arg: expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

#[cfg(any(target_os = "linux", target_os = "android"))]
pub mod epoll;

pub mod poll;

#[cfg(all(
    not(copoll_force_poll),
    any(target_os = "linux", target_os = "android")
))]
pub use self::epoll::Selector;

#[cfg(any(
    copoll_force_poll,
    not(any(target_os = "linux", target_os = "android"))
))]
pub use self::poll::Selector;

/// Soft limit on open descriptors, used to size the indexed wait table.
///
/// `None` when the limit is unlimited or cannot be read; the table then
/// grows on demand instead.
pub(crate) fn fd_limit() -> Option<usize> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if syscall!(getrlimit(libc::RLIMIT_NOFILE, &mut limit)).is_err() {
        return None;
    }
    if limit.rlim_cur == libc::RLIM_INFINITY {
        return None;
    }
    Some(limit.rlim_cur as usize)
}

pub(crate) fn fork() -> io::Result<libc::pid_t> {
    syscall!(fork())
}

/// Convert the wait timeout to the millisecond form the kernel takes.
///
/// `Duration::as_millis` truncates, so round up. This avoids turning
/// sub-millisecond timeouts into a zero timeout, unless the caller
/// explicitly requests that by specifying a zero timeout.
pub(crate) fn millis(timeout: Option<Duration>) -> libc::c_int {
    timeout
        .map(|to| {
            to.checked_add(Duration::from_nanos(999_999))
                .unwrap_or(to)
                .as_millis()
                .min(libc::c_int::MAX as u128) as libc::c_int
        })
        .unwrap_or(-1)
}
