// Exchange status machine - pure, no storage.
use serde::Serialize;

use crate::db::models::ExchangeStatus;
use crate::error::{AppError, AppResult};

/// Why a proposal ended up REJECTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    /// The seller turned it down.
    Declined,
    /// The listing sold its last unit.
    ListingExhausted,
    /// The listing was cancelled or stopped accepting trades.
    ListingWithdrawn,
    /// The offered card changed hands through another deal.
    OfferUnavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Accept,
    Reject,
    Cancel,
}

impl Decision {
    fn outcome(self) -> ExchangeStatus {
        match self {
            Decision::Accept => ExchangeStatus::Accepted,
            Decision::Reject => ExchangeStatus::Rejected,
            Decision::Cancel => ExchangeStatus::Cancelled,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            Decision::Accept => "accept",
            Decision::Reject => "reject",
            Decision::Cancel => "cancel",
        }
    }
}

/// REQUESTED is the only state that can be decided; everything else is terminal.
pub fn decide(current: ExchangeStatus, decision: Decision) -> AppResult<ExchangeStatus> {
    match current {
        ExchangeStatus::Requested => Ok(decision.outcome()),
        done => Err(AppError::BadRequest(format!(
            "Cannot {} exchange: it was already {}",
            decision.verb(),
            done.as_str().to_lowercase()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requested_can_move_to_every_terminal_state() {
        assert_eq!(
            decide(ExchangeStatus::Requested, Decision::Accept).unwrap(),
            ExchangeStatus::Accepted
        );
        assert_eq!(
            decide(ExchangeStatus::Requested, Decision::Reject).unwrap(),
            ExchangeStatus::Rejected
        );
        assert_eq!(
            decide(ExchangeStatus::Requested, Decision::Cancel).unwrap(),
            ExchangeStatus::Cancelled
        );
    }

    #[test]
    fn terminal_states_are_final() {
        for status in [
            ExchangeStatus::Accepted,
            ExchangeStatus::Rejected,
            ExchangeStatus::Cancelled,
        ] {
            for decision in [Decision::Accept, Decision::Reject, Decision::Cancel] {
                assert!(decide(status, decision).is_err());
            }
        }
    }

    #[test]
    fn error_names_the_prior_outcome() {
        let err = decide(ExchangeStatus::Rejected, Decision::Accept).unwrap_err();
        match err {
            AppError::BadRequest(msg) => {
                assert_eq!(msg, "Cannot accept exchange: it was already rejected")
            }
            other => panic!("expected BadRequest, got {:?}", other),
        }
    }
}
