//! File timestamps and the injectable clock they come from.

use std::convert::TryFrom;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;

/// An instant in time with nanosecond precision, stored as seconds since the
/// Unix epoch plus a nanosecond remainder.
///
/// Seconds may be negative for times before the epoch; `nanos` always counts
/// forward from the start of the second, so `-1s + 999_999_999ns` is one
/// nanosecond before the epoch.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct FileTime {
    seconds: i64,
    nanos: u32,
}

impl FileTime {
    /// The Unix epoch.
    pub const EPOCH: FileTime = FileTime {
        seconds: 0,
        nanos: 0,
    };

    /// Creates a time from seconds since the epoch and a nanosecond
    /// remainder.
    ///
    /// # Panics
    /// Panics if `nanos` is one second or more.
    pub fn new(seconds: i64, nanos: u32) -> FileTime {
        assert!(nanos < 1_000_000_000, "nanos out of range: {nanos}");
        FileTime { seconds, nanos }
    }

    /// Creates a time from whole seconds since the epoch.
    pub fn from_seconds(seconds: i64) -> FileTime {
        FileTime { seconds, nanos: 0 }
    }

    /// Seconds since the epoch, negative before it.
    pub fn seconds(self) -> i64 {
        self.seconds
    }

    /// Nanoseconds into the second, in `0..1_000_000_000`.
    pub fn nanos(self) -> u32 {
        self.nanos
    }

    /// This time advanced by `duration`, saturating at the representable
    /// maximum.
    pub fn plus(self, duration: Duration) -> FileTime {
        let mut seconds = self.seconds.saturating_add_unsigned(duration.as_secs());
        let mut nanos = self.nanos + duration.subsec_nanos();
        if nanos >= 1_000_000_000 {
            nanos -= 1_000_000_000;
            seconds = seconds.saturating_add(1);
        }
        FileTime { seconds, nanos }
    }

    /// Converts a `SystemTime`, saturating outside the `i64` second range.
    pub fn from_system_time(system_time: SystemTime) -> FileTime {
        match system_time.duration_since(UNIX_EPOCH) {
            Ok(after) => match i64::try_from(after.as_secs()) {
                Ok(seconds) => FileTime::new(seconds, after.subsec_nanos()),
                Err(_) => FileTime::new(i64::MAX, 999_999_999),
            },
            Err(err) => {
                // Before the epoch. `nanos` always counts forward from the
                // start of its second, so a fractional second borrows one
                // whole second and stores the complement.
                let before = err.duration();
                let (borrow, nanos) = match before.subsec_nanos() {
                    0 => (0, 0),
                    n => (1, 1_000_000_000 - n),
                };
                let seconds = -(i128::from(before.as_secs()) + borrow);
                match i64::try_from(seconds) {
                    Ok(seconds) => FileTime::new(seconds, nanos),
                    Err(_) => FileTime::new(i64::MIN, 0),
                }
            }
        }
    }

    /// Converts to a `SystemTime`. Times before the epoch map backwards from
    /// it.
    pub fn to_system_time(self) -> SystemTime {
        if self.seconds >= 0 {
            return UNIX_EPOCH + Duration::new(self.seconds as u64, self.nanos);
        }
        // Undo the forward-counting nanosecond convention: give the borrowed
        // second back before subtracting.
        let whole = self.seconds.unsigned_abs();
        match self.nanos {
            0 => UNIX_EPOCH - Duration::new(whole, 0),
            n => UNIX_EPOCH - Duration::new(whole - 1, 1_000_000_000 - n),
        }
    }
}

impl fmt::Display for FileTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.seconds, self.nanos)
    }
}

impl From<SystemTime> for FileTime {
    fn from(t: SystemTime) -> FileTime {
        FileTime::from_system_time(t)
    }
}

/// Source of file timestamps. Every timestamp a filesystem records funnels
/// through one of these, so tests can inject a deterministic clock.
pub trait FileTimeSource: Send + Sync {
    /// The current time.
    fn now(&self) -> FileTime;
}

/// The wall clock; the default time source.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl FileTimeSource for SystemTimeSource {
    fn now(&self) -> FileTime {
        FileTime::from_system_time(SystemTime::now())
    }
}

/// A time source that returns a fixed instant until it is advanced. Intended
/// for tests.
#[derive(Debug)]
pub struct FixedTimeSource {
    now: Mutex<FileTime>,
}

impl FixedTimeSource {
    /// Creates a source pinned to `start`.
    pub fn new(start: FileTime) -> FixedTimeSource {
        FixedTimeSource {
            now: Mutex::new(start),
        }
    }

    /// Creates a source pinned to the epoch.
    pub fn at_epoch() -> FixedTimeSource {
        FixedTimeSource::new(FileTime::EPOCH)
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock();
        *now = now.plus(duration);
    }

    /// Pins the clock to `time`.
    pub fn set(&self, time: FileTime) {
        *self.now.lock() = time;
    }
}

impl FileTimeSource for FixedTimeSource {
    fn now(&self) -> FileTime {
        *self.now.lock()
    }
}

impl<T: FileTimeSource + ?Sized> FileTimeSource for Arc<T> {
    fn now(&self) -> FileTime {
        self.as_ref().now()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;
    use std::time::UNIX_EPOCH;

    use crate::time::FileTime;
    use crate::time::FileTimeSource;
    use crate::time::FixedTimeSource;

    #[test]
    fn test_before_epoch_nanos_count_forward() {
        // Half a second before the epoch lands in second -1, half way in.
        let t = FileTime::from_system_time(UNIX_EPOCH - Duration::from_millis(500));
        assert_eq!((-1, 500_000_000), (t.seconds(), t.nanos()));

        // A whole number of seconds borrows nothing.
        let t = FileTime::from_system_time(UNIX_EPOCH - Duration::from_secs(30));
        assert_eq!((-30, 0), (t.seconds(), t.nanos()));
    }

    #[test]
    fn test_extreme_seconds_round_trip() {
        // Both ends of the representable second range survive conversion.
        for t in [
            FileTime::new(i64::MIN, 0),
            FileTime::new(i64::MAX, 999_999_999),
        ] {
            assert_eq!(t, FileTime::from_system_time(t.to_system_time()));
        }
    }

    #[test]
    fn test_system_time_round_trip() {
        for t in [
            FileTime::EPOCH,
            FileTime::new(1_700_000_000, 123_456_789),
            FileTime::new(-1, 1),
            FileTime::new(-7, 250_000_000),
            FileTime::new(-30, 0),
        ] {
            assert_eq!(t, FileTime::from_system_time(t.to_system_time()));
        }
    }

    #[test]
    fn test_plus_carries_nanos() {
        let t = FileTime::new(10, 900_000_000).plus(Duration::new(0, 200_000_000));
        assert_eq!(FileTime::new(11, 100_000_000), t);
    }

    #[test]
    fn test_fixed_source_advances() {
        let clock = FixedTimeSource::at_epoch();
        assert_eq!(FileTime::EPOCH, clock.now());
        clock.advance(Duration::from_secs(5));
        assert_eq!(FileTime::from_seconds(5), clock.now());
        // Never moves on its own.
        assert_eq!(FileTime::from_seconds(5), clock.now());
    }
}
