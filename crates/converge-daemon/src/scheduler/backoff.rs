//! Per-topology retry delays

use converge_types::ObjectKey;
use dashmap::DashMap;
use std::time::Duration;

/// Exponential backoff: `base * 2^failures`, capped at `max`
pub struct Backoff {
    base: Duration,
    max: Duration,
    failures: DashMap<ObjectKey, u32>,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: DashMap::new(),
        }
    }

    /// Records a failure and returns the delay before the next attempt
    pub fn next_delay(&self, key: &ObjectKey) -> Duration {
        let mut failures = self.failures.entry(key.clone()).or_insert(0);
        let factor = 1u32.checked_shl(*failures).unwrap_or(u32::MAX);
        *failures = failures.saturating_add(1);
        self.base.saturating_mul(factor).min(self.max)
    }

    pub fn reset(&self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).map(|f| *f).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_doubles_until_capped() {
        let backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(4));
        let key = ObjectKey::new("openstack", "octavia");

        let delays: Vec<_> = (0..6).map(|_| backoff.next_delay(&key)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(500),
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(4),
                Duration::from_secs(4),
            ]
        );
        assert_eq!(backoff.failures(&key), 6);
    }

    #[test]
    fn test_reset_starts_over() {
        let backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(60));
        let key = ObjectKey::new("openstack", "octavia");
        let other = ObjectKey::new("openstack", "designate");

        backoff.next_delay(&key);
        backoff.next_delay(&key);
        backoff.next_delay(&other);
        backoff.reset(&key);

        assert_eq!(backoff.next_delay(&key), Duration::from_millis(100));
        assert_eq!(backoff.failures(&other), 1);
    }

    #[test]
    fn test_many_failures_do_not_overflow() {
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(300));
        let key = ObjectKey::new("openstack", "octavia");
        for _ in 0..40 {
            backoff.next_delay(&key);
        }
        assert_eq!(backoff.next_delay(&key), Duration::from_secs(300));
    }
}
