//! Validator Classifier
//!
//! Merges the execution-side status code and the consensus-side lifecycle
//! record into one authoritative bucket. The rules form a ranked table that is
//! evaluated top to bottom; the first matching row wins. Execution status rows
//! come first because they describe protocol states the beacon chain cannot
//! express.
//!
//! Slashing is not a bucket. It is reported as an independent tag next to the
//! primary bucket, so a slashed active validator counts as both.

use crate::types::{ValidatorContractStatus, ValidatorPubkey, ValidatorStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Primary classification buckets, mutually exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorBucket {
    Initialized,
    InvalidSignature,
    FrontRun,
    FundsSettled,
    Exiting,
    Withdrawn,
    Queued,
    Active,
}

impl ValidatorBucket {
    /// Every bucket, in table order
    pub const ALL: [Self; 8] = [
        Self::Initialized,
        Self::InvalidSignature,
        Self::FrontRun,
        Self::FundsSettled,
        Self::Exiting,
        Self::Withdrawn,
        Self::Queued,
        Self::Active,
    ];

    /// Label used in logs and metrics
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::InvalidSignature => "invalid_signature",
            Self::FrontRun => "front_run",
            Self::FundsSettled => "funds_settled",
            Self::Exiting => "exiting",
            Self::Withdrawn => "withdrawn",
            Self::Queued => "queued",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for ValidatorBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub bucket: ValidatorBucket,
    /// Independent tag, never exclusive with `bucket`
    pub slashed: bool,
}

impl Classification {
    /// Whether the validator's withdraw vault balance counts toward unclaimed
    /// consensus rewards
    #[must_use]
    pub fn accrues_rewards(&self) -> bool {
        matches!(self.bucket, ValidatorBucket::Queued | ValidatorBucket::Active)
    }
}

/// Raised when no table row matches a validator that has a lifecycle record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    #[error("Validator {pubkey} matched no classification rule (contract status {contract_status:?}, phase {phase:?})")]
    Unclassified {
        pubkey: ValidatorPubkey,
        contract_status: ValidatorContractStatus,
        phase: crate::types::ValidatorState,
    },
}

type Rule = (fn(ValidatorContractStatus, &ValidatorStatus) -> bool, ValidatorBucket);

const RULES: [Rule; 8] = [
    (
        |code, _| code == ValidatorContractStatus::Initialized,
        ValidatorBucket::Initialized,
    ),
    (
        |code, _| code == ValidatorContractStatus::InvalidSignature,
        ValidatorBucket::InvalidSignature,
    ),
    (
        |code, _| code == ValidatorContractStatus::FrontRun,
        ValidatorBucket::FrontRun,
    ),
    (
        |code, _| code == ValidatorContractStatus::FundsSettled,
        ValidatorBucket::FundsSettled,
    ),
    (
        |_, status| status.is_exiting_but_not_withdrawn(),
        ValidatorBucket::Exiting,
    ),
    (|_, status| status.is_withdrawn(), ValidatorBucket::Withdrawn),
    (|_, status| status.is_queued(), ValidatorBucket::Queued),
    (|_, status| status.is_active(), ValidatorBucket::Active),
];

/// Classify one validator
///
/// # Errors
/// Returns [`ClassifyError::Unclassified`] when no row matches; callers treat
/// this as a data consistency fault
pub fn classify(
    contract_status: ValidatorContractStatus,
    status: &ValidatorStatus,
) -> Result<Classification, ClassifyError> {
    RULES
        .iter()
        .find(|(matches, _)| matches(contract_status, status))
        .map(|&(_, bucket)| Classification {
            bucket,
            slashed: status.is_slashed(),
        })
        .ok_or(ClassifyError::Unclassified {
            pubkey: status.pubkey,
            contract_status,
            phase: status.status,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ValidatorState, FAR_FUTURE_EPOCH, PUBKEY_LENGTH};
    use proptest::prelude::*;

    fn record(phase: ValidatorState, slashed: bool) -> ValidatorStatus {
        ValidatorStatus {
            pubkey: ValidatorPubkey([3u8; PUBKEY_LENGTH]),
            index: 42,
            withdrawal_credentials: [0u8; 32],
            balance: 32_000_000_000,
            status: phase,
            effective_balance: 32_000_000_000,
            slashed,
            activation_eligibility_epoch: 0,
            activation_epoch: 0,
            exit_epoch: FAR_FUTURE_EPOCH,
            withdrawable_epoch: FAR_FUTURE_EPOCH,
        }
    }

    #[test]
    fn test_decision_table() {
        let deposited = ValidatorContractStatus::Deposited;
        let cases = [
            (ValidatorContractStatus::Initialized, ValidatorState::ActiveOngoing, ValidatorBucket::Initialized),
            (ValidatorContractStatus::InvalidSignature, ValidatorState::PendingQueued, ValidatorBucket::InvalidSignature),
            (ValidatorContractStatus::FrontRun, ValidatorState::ActiveOngoing, ValidatorBucket::FrontRun),
            (ValidatorContractStatus::FundsSettled, ValidatorState::WithdrawalDone, ValidatorBucket::FundsSettled),
            (deposited, ValidatorState::ActiveExiting, ValidatorBucket::Exiting),
            (deposited, ValidatorState::ExitedUnslashed, ValidatorBucket::Exiting),
            (deposited, ValidatorState::WithdrawalPossible, ValidatorBucket::Exiting),
            (deposited, ValidatorState::WithdrawalDone, ValidatorBucket::Withdrawn),
            (deposited, ValidatorState::PendingInitialized, ValidatorBucket::Queued),
            (ValidatorContractStatus::PreDeposit, ValidatorState::PendingQueued, ValidatorBucket::Queued),
            (deposited, ValidatorState::ActiveOngoing, ValidatorBucket::Active),
            (deposited, ValidatorState::ActiveSlashed, ValidatorBucket::Active),
        ];

        for (code, phase, expected) in cases {
            let result = classify(code, &record(phase, false)).unwrap();
            assert_eq!(result.bucket, expected, "{code:?} / {phase:?}");
        }
    }

    #[test]
    fn test_initialized_wins_over_active_phase() {
        let result = classify(
            ValidatorContractStatus::Initialized,
            &record(ValidatorState::ActiveOngoing, false),
        )
        .unwrap();
        assert_eq!(result.bucket, ValidatorBucket::Initialized);
        assert!(!result.accrues_rewards());
    }

    #[test]
    fn test_slashed_is_counted_alongside_active() {
        let result = classify(
            ValidatorContractStatus::Deposited,
            &record(ValidatorState::ActiveSlashed, true),
        )
        .unwrap();
        assert_eq!(result.bucket, ValidatorBucket::Active);
        assert!(result.slashed);
        assert!(result.accrues_rewards());
    }

    #[test]
    fn test_slashed_tag_on_exited_validator() {
        let result = classify(
            ValidatorContractStatus::Deposited,
            &record(ValidatorState::ExitedSlashed, false),
        )
        .unwrap();
        assert_eq!(result.bucket, ValidatorBucket::Exiting);
        assert!(result.slashed);
    }

    #[test]
    fn test_unknown_phase_is_unclassified() {
        let err = classify(
            ValidatorContractStatus::Deposited,
            &record(ValidatorState::Unknown, false),
        )
        .unwrap_err();
        assert!(matches!(err, ClassifyError::Unclassified { .. }));
    }

    #[test]
    fn test_unknown_code_falls_through_to_lifecycle() {
        let result = classify(
            ValidatorContractStatus::Unknown(7),
            &record(ValidatorState::PendingQueued, false),
        )
        .unwrap();
        assert_eq!(result.bucket, ValidatorBucket::Queued);
    }

    fn any_phase() -> impl Strategy<Value = ValidatorState> {
        prop_oneof![
            Just(ValidatorState::PendingInitialized),
            Just(ValidatorState::PendingQueued),
            Just(ValidatorState::ActiveOngoing),
            Just(ValidatorState::ActiveExiting),
            Just(ValidatorState::ActiveSlashed),
            Just(ValidatorState::ExitedUnslashed),
            Just(ValidatorState::ExitedSlashed),
            Just(ValidatorState::WithdrawalPossible),
            Just(ValidatorState::WithdrawalDone),
        ]
    }

    proptest! {
        #[test]
        fn prop_every_known_phase_lands_in_exactly_one_bucket(
            code in any::<u8>(),
            phase in any_phase(),
            slashed in any::<bool>(),
        ) {
            let status = record(phase, slashed);
            let result = classify(code.into(), &status);
            prop_assert!(result.is_ok());
            let bucket = result.unwrap().bucket;
            prop_assert_eq!(
                ValidatorBucket::ALL.iter().filter(|b| **b == bucket).count(),
                1
            );
        }

        #[test]
        fn prop_classification_is_deterministic(
            code in any::<u8>(),
            phase in any_phase(),
            slashed in any::<bool>(),
        ) {
            let status = record(phase, slashed);
            let first = classify(code.into(), &status);
            let second = classify(code.into(), &status);
            prop_assert_eq!(first, second);
        }
    }
}
