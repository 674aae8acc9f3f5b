//! Allow-list of the status changes an agent may record.
//!
//! System transitions (`pending_email -> email_confirmed` on confirmation and
//! `email_confirmed -> pending_call` on assignment) are not reachable from here; they are
//! applied only by the lifecycle service itself.

use super::domain::LeadStatus;

const FROM_OPEN_CALL: &[LeadStatus] = &[
    LeadStatus::NoAnswer,
    LeadStatus::CallbackPending,
    LeadStatus::FollowUp,
    LeadStatus::Confirmed,
    LeadStatus::Rejected,
    LeadStatus::DoNotCall,
];

const FROM_SCHEDULED_CALL: &[LeadStatus] = &[
    LeadStatus::CallbackPending,
    LeadStatus::FollowUp,
    LeadStatus::NoAnswer,
    LeadStatus::Confirmed,
    LeadStatus::Rejected,
    LeadStatus::DoNotCall,
];

const FROM_CONFIRMED: &[LeadStatus] = &[
    LeadStatus::Converted,
    LeadStatus::Rejected,
    LeadStatus::DoNotCall,
];

/// Outcomes an agent can record for a lead currently in `from`.
pub fn agent_outcomes(from: LeadStatus) -> &'static [LeadStatus] {
    match from {
        LeadStatus::PendingCall | LeadStatus::NoAnswer => FROM_OPEN_CALL,
        LeadStatus::CallbackPending | LeadStatus::FollowUp => FROM_SCHEDULED_CALL,
        LeadStatus::Confirmed => FROM_CONFIRMED,
        LeadStatus::PendingEmail
        | LeadStatus::EmailConfirmed
        | LeadStatus::Rejected
        | LeadStatus::Converted
        | LeadStatus::DoNotCall => &[],
    }
}

pub fn check_agent_transition(from: LeadStatus, to: LeadStatus) -> Result<(), TransitionError> {
    if agent_outcomes(from).contains(&to) {
        return Ok(());
    }

    let reason = if from.is_final() {
        TransitionReason::FinalStatus
    } else if from == LeadStatus::PendingEmail {
        TransitionReason::EmailUnconfirmed
    } else if from == LeadStatus::EmailConfirmed {
        TransitionReason::AwaitingAssignment
    } else if !to.is_post_call() && !to.is_final() {
        TransitionReason::SystemOnly
    } else {
        TransitionReason::NotInAllowList
    };

    Err(TransitionError::NotAllowed { from, to, reason })
}

/// Why a requested status change was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionReason {
    FinalStatus,
    EmailUnconfirmed,
    AlreadyConfirmed,
    AwaitingAssignment,
    SystemOnly,
    NotInAllowList,
}

impl TransitionReason {
    pub fn describe(&self) -> &'static str {
        match self {
            TransitionReason::FinalStatus => "lead is closed",
            TransitionReason::EmailUnconfirmed => "email address has not been confirmed",
            TransitionReason::AlreadyConfirmed => "email address is already confirmed",
            TransitionReason::AwaitingAssignment => "lead has not been handed to an agent yet",
            TransitionReason::SystemOnly => "status is set by the system, not by agents",
            TransitionReason::NotInAllowList => "transition is not permitted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("cannot move lead from {from} to {to}: {}", .reason.describe())]
    NotAllowed {
        from: LeadStatus,
        to: LeadStatus,
        reason: TransitionReason,
    },
}
