//! Orchestrator configuration loaded from environment variables.

/// Default bound on batch size, matching common scheme limits on bulk
/// quote/transfer calls.
pub const DEFAULT_MAX_ITEMS_PER_BATCH: usize = 1000;

/// Saga configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `MAX_ITEMS_PER_BATCH` — maximum individual transfers per agreement/
///   transfer batch (default: `1000`)
#[derive(Debug, Clone)]
pub struct SagaConfig {
    pub max_items_per_batch: usize,
}

impl SagaConfig {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            max_items_per_batch: std::env::var("MAX_ITEMS_PER_BATCH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_ITEMS_PER_BATCH),
        }
    }

    /// Creates a configuration with an explicit batch bound.
    pub fn with_max_items_per_batch(max_items_per_batch: usize) -> Self {
        Self {
            max_items_per_batch,
        }
    }
}

impl Default for SagaConfig {
    fn default() -> Self {
        Self {
            max_items_per_batch: DEFAULT_MAX_ITEMS_PER_BATCH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = SagaConfig::default();
        assert_eq!(config.max_items_per_batch, DEFAULT_MAX_ITEMS_PER_BATCH);
    }

    #[test]
    fn test_explicit_batch_bound() {
        let config = SagaConfig::with_max_items_per_batch(16);
        assert_eq!(config.max_items_per_batch, 16);
    }
}
