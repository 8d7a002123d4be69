//! Mapping provider outcomes onto local payment transitions
//!
//! Webhooks, polling and the background sweep all funnel through
//! [`apply_outcome`]; the service then performs the chosen transition as a
//! conditional store update keyed by the status it was planned against.
//!
//! | local      | provider              | transition  |
//! |------------|-----------------------|-------------|
//! | processing | succeeded             | settle      |
//! | processing | failed / canceled     | release     |
//! | failed     | succeeded             | late settle |
//! | succeeded  | anything              | unchanged   |

use crate::entities::PaymentStatus;
use crate::gateway::IntentStatus;

/// What to do with a payment given a provider outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Processing -> Succeeded
    Settle,
    /// Processing -> Failed/Canceled, months become payable again
    Release {
        status: PaymentStatus,
        reason: Option<String>,
    },
    /// Failed -> Succeeded, only if the months can be claimed again
    LateSettle,
    /// Nothing to change
    Unchanged,
    /// The outcome contradicts a final local state; logged, never applied
    Ignored { note: &'static str },
}

/// Decide how `outcome` moves a payment currently in `current`
pub fn apply_outcome(current: PaymentStatus, outcome: &IntentStatus) -> Transition {
    use PaymentStatus as P;

    match (current, outcome) {
        (P::Processing, IntentStatus::Succeeded) => Transition::Settle,
        (P::Processing, IntentStatus::Failed { reason }) => Transition::Release {
            status: P::Failed,
            reason: Some(reason.clone()),
        },
        (P::Processing, IntentStatus::Canceled) => Transition::Release {
            status: P::Canceled,
            reason: None,
        },
        (P::Processing, IntentStatus::Processing | IntentStatus::RequiresAction) => {
            Transition::Unchanged
        }

        (P::Failed, IntentStatus::Succeeded) => Transition::LateSettle,
        (P::Failed, _) => Transition::Unchanged,

        (P::Succeeded, IntentStatus::Succeeded) => Transition::Unchanged,
        (P::Succeeded, IntentStatus::Processing | IntentStatus::RequiresAction) => {
            Transition::Unchanged
        }
        (P::Succeeded, IntentStatus::Failed { .. } | IntentStatus::Canceled) => {
            Transition::Ignored {
                note: "provider reports failure for a settled payment",
            }
        }

        (P::Canceled, IntentStatus::Succeeded) => Transition::Ignored {
            note: "provider reports success for a canceled payment",
        },
        (P::Canceled, _) => Transition::Unchanged,
    }
}
