/// Optional track counter used to number output files.
///
/// The counter holds the number of the most recently started capture, so it
/// starts one below the configured first number. Bounds on file numbers apply
/// to [`peek_next`](Self::peek_next): it never drops below the first number
/// minus the count of captures that stopped short of the minimum.
#[derive(Debug, Clone)]
pub struct TrackSequencer {
    current: Option<u32>,
    min_duration_secs: u64,
}

impl TrackSequencer {
    pub fn new(start: Option<u32>, min_duration_secs: u64) -> Self {
        Self {
            current: start.map(|n| n.saturating_sub(1)),
            min_duration_secs,
        }
    }

    pub fn current(&self) -> Option<u32> {
        self.current
    }

    /// Number the next capture would receive.
    pub fn peek_next(&self) -> Option<u32> {
        self.current.map(|n| n + 1)
    }

    pub fn increment(&mut self) -> Option<u32> {
        let n = self.current.as_mut()?;
        *n += 1;
        Some(*n)
    }

    /// Gives back the number of a capture that stopped short of the minimum
    /// duration. Returns the new value only if it changed.
    pub fn decrement(&mut self, elapsed_secs: u64) -> Option<u32> {
        if elapsed_secs >= self.min_duration_secs {
            return None;
        }
        let n = self.current.as_mut()?;
        *n = n.saturating_sub(1);
        Some(*n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_is_inert() {
        let mut seq = TrackSequencer::new(None, 30);
        assert_eq!(seq.increment(), None);
        assert_eq!(seq.decrement(0), None);
        assert_eq!(seq.current(), None);
    }

    #[test]
    fn test_first_capture_gets_start_number() {
        let mut seq = TrackSequencer::new(Some(1), 30);
        assert_eq!(seq.peek_next(), Some(1));
        assert_eq!(seq.increment(), Some(1));
        assert_eq!(seq.peek_next(), Some(2));
    }

    #[test]
    fn test_decrement_respects_min_duration() {
        let mut seq = TrackSequencer::new(Some(5), 30);
        seq.increment();
        seq.increment();

        assert_eq!(seq.decrement(30), None);
        assert_eq!(seq.current(), Some(6));

        assert_eq!(seq.decrement(29), Some(5));
        assert_eq!(seq.current(), Some(5));
    }

    #[test]
    fn test_never_below_start_minus_short_stops() {
        let mut seq = TrackSequencer::new(Some(1), 30);
        assert_eq!(seq.peek_next(), Some(1));

        let mut short_stops = 0;
        for elapsed in [45, 10, 3, 60, 0] {
            seq.increment();
            if seq.decrement(elapsed).is_some() {
                short_stops += 1;
            }
            assert!(seq.peek_next().unwrap() as i64 >= 1 - short_stops);
        }
        assert_eq!(seq.current(), Some(2));
        assert_eq!(seq.peek_next(), Some(3));
    }
}
