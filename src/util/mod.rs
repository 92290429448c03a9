//! Small time helpers used by the polling and resolution loops.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const NS_PER_S: u64 = 1_000_000_000;
pub const NS_PER_MS: u64 = 1_000_000;
pub const NS_PER_US: u64 = 1_000;

/// Nanoseconds since the Unix epoch.
pub fn now_ns() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() * NS_PER_S + d.subsec_nanos() as u64,
        Err(..) => 0,
    }
}

/// Sleep for `ns` nanoseconds.
pub fn nanosleep(ns: u64) {
    ::std::thread::sleep(Duration::new(ns / NS_PER_S, (ns % NS_PER_S) as u32));
}

/// A deadline `ns` nanoseconds from now; `ns < 0` means never.
pub struct Deadline {
    end: Option<Instant>,
}

impl Deadline {
    pub fn new(nsec: i64) -> Deadline {
        Deadline {
            end: if nsec < 0 {
                None
            } else {
                Some(Instant::now() + Duration::new(nsec as u64 / NS_PER_S,
                                                    (nsec as u64 % NS_PER_S) as u32))
            },
        }
    }

    pub fn expired(&self) -> bool {
        match self.end {
            Some(end) => Instant::now() >= end,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Deadline;

    #[test]
    fn deadline_zero_expires_immediately() {
        assert!(Deadline::new(0).expired());
    }

    #[test]
    fn deadline_negative_never_expires() {
        assert!(!Deadline::new(-1).expired());
    }
}
