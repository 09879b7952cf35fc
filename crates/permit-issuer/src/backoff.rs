use std::time::Duration;

/// Doubling poll interval, capped.
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = self.next.saturating_mul(2).min(self.max);
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn delays(initial_ms: u64, max_ms: u64, n: usize) -> Vec<u64> {
        let mut backoff = Backoff::new(
            Duration::from_millis(initial_ms),
            Duration::from_millis(max_ms),
        );
        (0..n)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect()
    }

    #[test_case(100, 1000, vec![100, 200, 400, 800, 1000, 1000]; "doubles up to the cap")]
    #[test_case(500, 500, vec![500, 500, 500]; "initial equals cap")]
    #[test_case(2000, 500, vec![500, 500]; "initial above cap is clamped")]
    fn schedule(initial: u64, max: u64, expected: Vec<u64>) {
        assert_eq!(delays(initial, max, expected.len()), expected);
    }
}
