//! Monotonic sequence counters for long-polling clients

/// Monotonic event counter.
///
/// Starts at 0 and only ever moves forward. The capture and relay channels
/// each own an independent instance; device and dashboard poll them
/// separately, so the two must never share one.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: u64,
}

impl SequenceCounter {
    /// Increment and return the post-increment value
    pub fn bump(&mut self) -> u64 {
        self.value += 1;
        self.value
    }

    /// Current value
    pub fn current(&self) -> u64 {
        self.value
    }

    /// Whether anything newer than `since` has happened
    pub fn has_newer(&self, since: u64) -> bool {
        self.value > since
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_returns_post_increment_value() {
        let mut seq = SequenceCounter::default();
        assert_eq!(seq.current(), 0);
        assert_eq!(seq.bump(), 1);
        assert_eq!(seq.bump(), 2);
        assert_eq!(seq.current(), 2);
    }

    #[test]
    fn has_newer_compares_strictly() {
        let mut seq = SequenceCounter::default();
        assert!(!seq.has_newer(0));
        seq.bump();
        assert!(seq.has_newer(0));
        assert!(!seq.has_newer(1));
        assert!(!seq.has_newer(5));
    }
}
