use std::{fmt, ops};

/// Readiness flags delivered to a resumed coroutine.
///
/// A coroutine suspended in a wait is handed a `Readiness` value when the
/// poller resumes it: [`READABLE`] and/or [`WRITABLE`] for the directions
/// the kernel reported ready, and [`ERROR`] when the kernel flagged an
/// error or hang-up condition on the descriptor.
///
/// `ERROR` is delivered to *both* the read and the write waiter of a
/// descriptor, regardless of which direction each subscribed to. What to do
/// about it is the coroutine's decision; typically the descriptor is no
/// longer usable.
///
/// Unlike [`Interest`], a `Readiness` value may be empty, which is how the
/// dispatch logic expresses "this event is not for you".
///
/// [`READABLE`]: Readiness::READABLE
/// [`WRITABLE`]: Readiness::WRITABLE
/// [`ERROR`]: Readiness::ERROR
/// [`Interest`]: crate::Interest
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Readiness(u8);

// These must be unique.
const READABLE: u8 = 0b001;
const WRITABLE: u8 = 0b010;
const ERROR: u8 = 0b100;

impl Readiness {
    /// The empty set of flags.
    pub const EMPTY: Readiness = Readiness(0);

    /// The descriptor is ready for a read-class operation.
    pub const READABLE: Readiness = Readiness(READABLE);

    /// The descriptor is ready for a write-class operation.
    pub const WRITABLE: Readiness = Readiness(WRITABLE);

    /// The kernel reported an error or hang-up on the descriptor.
    pub const ERROR: Readiness = Readiness(ERROR);

    /// Returns true if no flag is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if the readable flag is set.
    pub const fn is_readable(self) -> bool {
        (self.0 & READABLE) != 0
    }

    /// Returns true if the writable flag is set.
    pub const fn is_writable(self) -> bool {
        (self.0 & WRITABLE) != 0
    }

    /// Returns true if the error flag is set.
    pub const fn is_error(self) -> bool {
        (self.0 & ERROR) != 0
    }

    /// Returns true if every flag in `other` is also set in `self`.
    pub const fn contains(self, other: Readiness) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl ops::BitOr for Readiness {
    type Output = Self;

    #[inline]
    fn bitor(self, other: Self) -> Self {
        Readiness(self.0 | other.0)
    }
}

impl ops::BitOrAssign for Readiness {
    #[inline]
    fn bitor_assign(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl fmt::Debug for Readiness {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(fmt, "(empty)");
        }
        let mut one = false;
        if self.is_readable() {
            write!(fmt, "READABLE")?;
            one = true
        }
        if self.is_writable() {
            if one {
                write!(fmt, " | ")?
            }
            write!(fmt, "WRITABLE")?;
            one = true
        }
        if self.is_error() {
            if one {
                write!(fmt, " | ")?
            }
            write!(fmt, "ERROR")?;
        }
        Ok(())
    }
}
