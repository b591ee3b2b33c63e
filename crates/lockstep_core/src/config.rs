//! Container configuration.

use crate::deadlock::DeadlockDetector;

/// Configuration for building a [`Container`](crate::container::Container).
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Number of records the container owns.
    pub records: usize,

    /// Initial value of every record.
    pub initial_value: i64,

    /// Strategy used to refuse cycle-closing lock requests.
    pub detector: DeadlockDetector,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            records: 16,
            initial_value: 100,
            detector: DeadlockDetector::default(),
        }
    }
}

impl ContainerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of records.
    #[must_use]
    pub const fn records(mut self, records: usize) -> Self {
        self.records = records;
        self
    }

    /// Sets the initial value of every record.
    #[must_use]
    pub const fn initial_value(mut self, value: i64) -> Self {
        self.initial_value = value;
        self
    }

    /// Sets the deadlock detection strategy.
    #[must_use]
    pub const fn detector(mut self, detector: DeadlockDetector) -> Self {
        self.detector = detector;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_driver() {
        let config = ContainerConfig::default();
        assert_eq!(config.initial_value, 100);
        assert_eq!(config.detector, DeadlockDetector::WaitGraph);
    }

    #[test]
    fn builder_setters_chain() {
        let config = ContainerConfig::new()
            .records(3)
            .initial_value(10)
            .detector(DeadlockDetector::ChainWalk);
        assert_eq!(config.records, 3);
        assert_eq!(config.initial_value, 10);
        assert_eq!(config.detector, DeadlockDetector::ChainWalk);
    }
}
