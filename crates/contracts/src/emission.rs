//! EmitResult - outcome of a single emit attempt
//!
//! Closed set of result codes shared by every sink flavor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of one `try_emit_*` call.
///
/// Exactly one value is produced per attempt. Only `Ok` means the signal was
/// applied; every other variant means nothing happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmitResult {
    /// Signal accepted
    Ok,
    /// Sink already completed or errored
    FailTerminated,
    /// Buffer full, or a subscriber could not accept the value right now
    FailOverflow,
    /// Sink was cancelled by its subscribers
    FailCancelled,
    /// Flavor requires a subscriber and none is attached
    FailZeroSubscriber,
    /// Another producer is inside a serialized sink
    FailNonSerialized,
}

impl EmitResult {
    /// All variants, in declaration order
    pub const ALL: [EmitResult; 6] = [
        EmitResult::Ok,
        EmitResult::FailTerminated,
        EmitResult::FailOverflow,
        EmitResult::FailCancelled,
        EmitResult::FailZeroSubscriber,
        EmitResult::FailNonSerialized,
    ];

    #[inline]
    pub fn is_success(self) -> bool {
        matches!(self, EmitResult::Ok)
    }

    #[inline]
    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Failures after which retrying can never succeed
    #[inline]
    pub fn is_terminal_failure(self) -> bool {
        matches!(self, EmitResult::FailTerminated | EmitResult::FailCancelled)
    }

    /// Stable label used in logs and metric labels
    pub fn as_str(self) -> &'static str {
        match self {
            EmitResult::Ok => "OK",
            EmitResult::FailTerminated => "FAIL_TERMINATED",
            EmitResult::FailOverflow => "FAIL_OVERFLOW",
            EmitResult::FailCancelled => "FAIL_CANCELLED",
            EmitResult::FailZeroSubscriber => "FAIL_ZERO_SUBSCRIBER",
            EmitResult::FailNonSerialized => "FAIL_NON_SERIALIZED",
        }
    }
}

impl fmt::Display for EmitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_ok_is_success() {
        for result in EmitResult::ALL {
            assert_eq!(result.is_success(), result == EmitResult::Ok);
            assert_eq!(result.is_failure(), result != EmitResult::Ok);
        }
    }

    #[test]
    fn test_terminal_failures() {
        assert!(EmitResult::FailTerminated.is_terminal_failure());
        assert!(EmitResult::FailCancelled.is_terminal_failure());
        assert!(!EmitResult::FailOverflow.is_terminal_failure());
        assert!(!EmitResult::FailNonSerialized.is_terminal_failure());
    }

    #[test]
    fn test_serde_labels_match_display() {
        for result in EmitResult::ALL {
            let json = serde_json::to_string(&result).unwrap();
            assert_eq!(json, format!("\"{}\"", result));
        }
    }
}
