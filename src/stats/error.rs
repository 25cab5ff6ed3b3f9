//! Configuration errors for aggregation descriptors and views.
//!
//! These are raised when a descriptor or a view is built or registered,
//! never from the recording path.

/// Error returned when an aggregation descriptor or view definition is invalid.
#[derive(Debug, Clone, PartialEq)]
pub enum StatsError {
    /// Bucket boundaries are not finite and strictly increasing.
    InvalidBucketBoundaries {
        /// Position of the first offending boundary
        index: usize,
        reason: &'static str,
    },
    /// A view definition failed validation.
    InvalidView { view: String, reason: String },
    /// A different view is already registered under this name.
    ViewAlreadyExists { view: String },
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::InvalidBucketBoundaries { index, reason } => {
                write!(f, "invalid bucket boundary at index {}: {}", index, reason)
            }
            StatsError::InvalidView { view, reason } => {
                write!(f, "invalid view '{}': {}", view, reason)
            }
            StatsError::ViewAlreadyExists { view } => {
                write!(
                    f,
                    "a different view is already registered under the name '{}'",
                    view
                )
            }
        }
    }
}

impl std::error::Error for StatsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = StatsError::InvalidBucketBoundaries {
            index: 2,
            reason: "boundaries must be strictly increasing",
        };
        assert_eq!(
            err.to_string(),
            "invalid bucket boundary at index 2: boundaries must be strictly increasing"
        );

        let err = StatsError::ViewAlreadyExists {
            view: "rpc/latency".to_string(),
        };
        assert!(err.to_string().contains("rpc/latency"));
    }
}
