//! Failure classification for ledger rejections.
//!
//! The ledger's only machine-readable recovery signal for a sequence mismatch
//! is free text such as `"account sequence mismatch, expected 7, got 5"`. The
//! number after `expected` is the next sequence the ledger will accept.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Ledger code for an account that cannot cover value plus fee.
pub const CODE_INSUFFICIENT_FUNDS: u32 = 5;
/// Ledger code for a fee below the node's minimum.
pub const CODE_INSUFFICIENT_FEE: u32 = 13;
/// Ledger code for a wrong account sequence.
pub const CODE_SEQUENCE_MISMATCH: u32 = 32;

static EXPECTED_SEQUENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"expected\s+(\d+)").expect("sequence regex is valid"));

/// Extract the ledger-suggested next sequence from an error text.
///
/// Returns the first integer following the token `expected`, or `None` when
/// the text carries no suggestion (or the number does not fit in a `u64`).
pub fn parse_expected_sequence(log: &str) -> Option<u64> {
    EXPECTED_SEQUENCE
        .captures(log)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Normalised reason for a failed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureReason {
    /// The local sequence disagrees with the ledger. `expected` is the
    /// ledger's suggestion when the text carried one.
    SequenceMismatch { expected: Option<u64> },
    /// The signer's account cannot pay for the transaction.
    InsufficientWorkerFunds,
    /// The attached fee or gas price is below the node's minimum.
    InsufficientFee,
    /// No usable outcome yet (timeout, node busy, no response body).
    TransientBroadcastFailure,
    /// Anything that does not match the above.
    UnknownFailure,
}

impl FailureReason {
    /// Classify a ledger rejection from its code and diagnostic text.
    pub fn classify(code: u32, log: &str) -> Self {
        match code {
            CODE_SEQUENCE_MISMATCH => FailureReason::SequenceMismatch {
                expected: parse_expected_sequence(log),
            },
            CODE_INSUFFICIENT_FUNDS => FailureReason::InsufficientWorkerFunds,
            CODE_INSUFFICIENT_FEE => FailureReason::InsufficientFee,
            _ => Self::classify_text(log).unwrap_or(FailureReason::UnknownFailure),
        }
    }

    /// Classify an outcome that carried no response body. Text that still
    /// names a known condition wins; otherwise the failure is transient.
    pub fn classify_unanswered(message: &str) -> Self {
        Self::classify_text(message).unwrap_or(FailureReason::TransientBroadcastFailure)
    }

    fn classify_text(log: &str) -> Option<Self> {
        let lower = log.to_ascii_lowercase();
        if lower.contains("insufficient funds") {
            Some(FailureReason::InsufficientWorkerFunds)
        } else if lower.contains("insufficient fee")
            || lower.contains("underpriced")
            || lower.contains("gas price too low")
        {
            Some(FailureReason::InsufficientFee)
        } else if lower.contains("sequence mismatch") || lower.contains("nonce") {
            Some(FailureReason::SequenceMismatch {
                expected: parse_expected_sequence(log),
            })
        } else {
            None
        }
    }

    /// Label used for the `reason` dimension of the failure counter.
    pub fn label(&self) -> &'static str {
        match self {
            FailureReason::SequenceMismatch { .. } => "SequenceMismatch",
            FailureReason::InsufficientWorkerFunds => "InsufficientWorkerFunds",
            FailureReason::InsufficientFee => "InsufficientFee",
            FailureReason::TransientBroadcastFailure => "TransientBroadcastFailure",
            FailureReason::UnknownFailure => "UnknownFailure",
        }
    }

    pub fn is_sequence_mismatch(&self) -> bool {
        matches!(self, FailureReason::SequenceMismatch { .. })
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_cosmos_sequence_mismatch() {
        let log = "account sequence mismatch, expected 42, got 40: incorrect account sequence";
        assert_eq!(parse_expected_sequence(log), Some(42));
    }

    #[test]
    fn parses_first_expected_only() {
        assert_eq!(parse_expected_sequence("expected 3, later expected 9"), Some(3));
    }

    #[test]
    fn no_token_means_no_suggestion() {
        assert_eq!(parse_expected_sequence("out of gas"), None);
        assert_eq!(parse_expected_sequence("expected nothing"), None);
        assert_eq!(parse_expected_sequence(""), None);
    }

    #[test]
    fn overflow_is_no_suggestion() {
        assert_eq!(parse_expected_sequence("expected 99999999999999999999999"), None);
    }

    #[test]
    fn classify_by_code() {
        assert_eq!(
            FailureReason::classify(32, "account sequence mismatch, expected 7, got 5"),
            FailureReason::SequenceMismatch { expected: Some(7) }
        );
        assert_eq!(
            FailureReason::classify(5, "spendable balance 0aevmos is smaller than 1aevmos"),
            FailureReason::InsufficientWorkerFunds
        );
        assert_eq!(FailureReason::classify(13, ""), FailureReason::InsufficientFee);
    }

    #[test]
    fn classify_by_text() {
        assert_eq!(
            FailureReason::classify(1, "insufficient funds for gas * price + value"),
            FailureReason::InsufficientWorkerFunds
        );
        assert_eq!(
            FailureReason::classify(1, "invalid nonce; got 3, expected 5"),
            FailureReason::SequenceMismatch { expected: Some(5) }
        );
        assert_eq!(
            FailureReason::classify(1, "transaction underpriced"),
            FailureReason::InsufficientFee
        );
        assert_eq!(
            FailureReason::classify(11, "out of gas"),
            FailureReason::UnknownFailure
        );
    }

    #[test]
    fn unanswered_defaults_to_transient() {
        assert_eq!(
            FailureReason::classify_unanswered("connection reset by peer"),
            FailureReason::TransientBroadcastFailure
        );
        assert_eq!(
            FailureReason::classify_unanswered("insufficient funds"),
            FailureReason::InsufficientWorkerFunds
        );
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            FailureReason::SequenceMismatch { expected: None }.label(),
            "SequenceMismatch"
        );
        assert_eq!(FailureReason::UnknownFailure.to_string(), "UnknownFailure");
    }

    proptest! {
        /// Any "expected <n>" embedded in arbitrary text yields exactly n.
        #[test]
        fn expected_n_always_parses(n in 0u64..u64::MAX, prefix in "[a-z ,:]{0,40}", suffix in "[a-z ,:]{0,40}") {
            let log = format!("{prefix} expected {n}{suffix}");
            prop_assume!(!prefix.contains("expected"));
            prop_assert_eq!(parse_expected_sequence(&log), Some(n));
        }

        /// Text without the token never yields a suggestion and never panics.
        #[test]
        fn text_without_token_yields_none(text in "[a-df-z0-9 ,:]{0,80}") {
            prop_assert_eq!(parse_expected_sequence(&text), None);
        }
    }
}
