use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for leads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeadId(pub String);

/// Identifier wrapper for agents (users acting in the agent role).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

/// Identifier wrapper for call centers, the routing and tenancy scope.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallCenterId(pub String);

/// Identifier wrapper for the public form a lead was submitted through.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormId(pub String);

macro_rules! display_id {
    ($($name:ident),*) => {
        $(impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        })*
    };
}

display_id!(LeadId, AgentId, CallCenterId, FormId);

/// Lifecycle states a lead moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    PendingEmail,
    EmailConfirmed,
    PendingCall,
    NoAnswer,
    CallbackPending,
    FollowUp,
    Confirmed,
    Rejected,
    Converted,
    DoNotCall,
}

/// Flags consumed by workload aggregates, dashboards, and alert evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags {
    /// Requires agent attention.
    pub active: bool,
    /// Closed; no further work expected.
    pub final_state: bool,
    /// Only settable once at least one call attempt has been recorded.
    pub post_call: bool,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 10] = [
        LeadStatus::PendingEmail,
        LeadStatus::EmailConfirmed,
        LeadStatus::PendingCall,
        LeadStatus::NoAnswer,
        LeadStatus::CallbackPending,
        LeadStatus::FollowUp,
        LeadStatus::Confirmed,
        LeadStatus::Rejected,
        LeadStatus::Converted,
        LeadStatus::DoNotCall,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            LeadStatus::PendingEmail => "pending_email",
            LeadStatus::EmailConfirmed => "email_confirmed",
            LeadStatus::PendingCall => "pending_call",
            LeadStatus::NoAnswer => "no_answer",
            LeadStatus::CallbackPending => "callback_pending",
            LeadStatus::FollowUp => "follow_up",
            LeadStatus::Confirmed => "confirmed",
            LeadStatus::Rejected => "rejected",
            LeadStatus::Converted => "converted",
            LeadStatus::DoNotCall => "do_not_call",
        }
    }

    pub fn flags(&self) -> StatusFlags {
        let (active, final_state, post_call) = match self {
            LeadStatus::PendingEmail => (false, false, false),
            LeadStatus::EmailConfirmed => (false, false, false),
            LeadStatus::PendingCall => (true, false, false),
            LeadStatus::NoAnswer => (true, false, true),
            LeadStatus::CallbackPending => (true, false, true),
            LeadStatus::FollowUp => (true, false, true),
            LeadStatus::Confirmed => (false, false, true),
            LeadStatus::Rejected => (false, true, true),
            LeadStatus::Converted => (false, true, false),
            LeadStatus::DoNotCall => (false, true, false),
        };
        StatusFlags {
            active,
            final_state,
            post_call,
        }
    }

    pub fn is_active(&self) -> bool {
        self.flags().active
    }

    pub fn is_final(&self) -> bool {
        self.flags().final_state
    }

    pub fn is_post_call(&self) -> bool {
        self.flags().post_call
    }

    /// Statuses in which the lead is waiting for an agent to be picked.
    pub fn is_routable(&self) -> bool {
        matches!(self, LeadStatus::EmailConfirmed | LeadStatus::PendingCall)
    }

    /// Statuses that count as a confirmed outcome in agent performance.
    pub fn counts_as_confirmed(&self) -> bool {
        matches!(self, LeadStatus::Confirmed | LeadStatus::Converted)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown lead status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for LeadStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        LeadStatus::ALL
            .into_iter()
            .find(|status| status.label() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

/// How a call center hands confirmed leads to its agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    Manual,
    RoundRobin,
    Weighted,
}

impl DistributionMethod {
    pub fn is_automatic(&self) -> bool {
        !matches!(self, DistributionMethod::Manual)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DistributionMethod::Manual => "manual",
            DistributionMethod::RoundRobin => "round_robin",
            DistributionMethod::Weighted => "weighted",
        }
    }
}

/// When automatic distribution fires for a call center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionTiming {
    /// Synchronously, inside the email confirmation transaction.
    #[default]
    OnConfirmation,
    /// Only by the periodic unassigned-lead sweep.
    Scheduled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCenter {
    pub id: CallCenterId,
    pub name: String,
    pub distribution_method: DistributionMethod,
    #[serde(default)]
    pub distribution_timing: DistributionTiming,
    pub is_active: bool,
}

impl CallCenter {
    /// True when confirmations should trigger an assignment attempt right away.
    pub fn distributes_on_confirmation(&self) -> bool {
        self.is_active
            && self.distribution_method.is_automatic()
            && self.distribution_timing == DistributionTiming::OnConfirmation
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub call_center_id: CallCenterId,
    pub name: String,
    pub is_active: bool,
}

/// Payload handed over by the form-submission flow.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NewLead {
    pub form_id: Option<FormId>,
    pub call_center_id: Option<CallCenterId>,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// The durable lead record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub form_id: Option<FormId>,
    pub call_center_id: Option<CallCenterId>,
    pub assigned_agent_id: Option<AgentId>,
    pub status: LeadStatus,
    pub email: String,
    pub phone: Option<String>,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub confirmation_token: Option<String>,
    pub confirmation_token_expires_at: Option<DateTime<Utc>>,
    pub call_attempts: u32,
    /// Accumulated talk time in seconds.
    pub call_duration: u32,
    pub last_call_at: Option<DateTime<Utc>>,
    pub next_call_at: Option<DateTime<Utc>>,
    pub status_changed_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub comment: Option<String>,
    pub score: u8,
    pub score_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub score_factors: BTreeMap<String, f64>,
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Fresh record in `pending_email`, as produced by form submission.
    pub fn pending(
        id: LeadId,
        submission: NewLead,
        token: String,
        token_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            form_id: submission.form_id,
            call_center_id: submission.call_center_id,
            assigned_agent_id: None,
            status: LeadStatus::PendingEmail,
            email: submission.email,
            phone: submission.phone,
            data: submission.data,
            email_confirmed_at: None,
            confirmation_token: Some(token),
            confirmation_token_expires_at: Some(token_expires_at),
            call_attempts: 0,
            call_duration: 0,
            last_call_at: None,
            next_call_at: None,
            status_changed_at: Some(now),
            assigned_at: None,
            comment: None,
            score: 0,
            score_updated_at: None,
            score_factors: BTreeMap::new(),
            created_at: now,
        }
    }

    pub fn is_email_confirmed(&self) -> bool {
        self.email_confirmed_at.is_some()
    }

    /// Routable and still waiting for an agent.
    pub fn awaiting_assignment(&self) -> bool {
        self.status.is_routable() && self.assigned_agent_id.is_none()
    }

    /// Whether `token` is the live confirmation token at `now`.
    pub fn token_matches(&self, token: &str, now: DateTime<Utc>) -> bool {
        match (&self.confirmation_token, self.confirmation_token_expires_at) {
            (Some(expected), Some(expires_at)) => {
                !token.is_empty() && expected == token && expires_at > now
            }
            _ => false,
        }
    }

    /// Moves the lead to `status`, stamping the change time.
    pub(crate) fn set_status(&mut self, status: LeadStatus, now: DateTime<Utc>) -> LeadStatus {
        let previous = self.status;
        self.status = status;
        self.status_changed_at = Some(now);
        previous
    }

    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.status == LeadStatus::PendingEmail && self.assigned_agent_id.is_some() {
            return Err(InvariantViolation::AssignedBeforeConfirmation);
        }
        if self.status == LeadStatus::PendingCall && self.assigned_agent_id.is_none() {
            return Err(InvariantViolation::PendingCallWithoutAgent);
        }
        if self.status.is_post_call() && self.call_attempts == 0 {
            return Err(InvariantViolation::PostCallWithoutAttempt(self.status));
        }
        if self.score > 100 {
            return Err(InvariantViolation::ScoreOutOfRange(self.score));
        }
        if self.email_confirmed_at.is_some() && self.confirmation_token.is_some() {
            return Err(InvariantViolation::TokenNotCleared);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("lead has an assigned agent before email confirmation")]
    AssignedBeforeConfirmation,
    #[error("lead is pending a call without an assigned agent")]
    PendingCallWithoutAgent,
    #[error("status {0} requires at least one call attempt")]
    PostCallWithoutAttempt(LeadStatus),
    #[error("score {0} outside 0..=100")]
    ScoreOutOfRange(u8),
    #[error("confirmation token still present after confirmation")]
    TokenNotCleared,
}

/// Result of a call recorded by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutcome {
    pub status: LeadStatus,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub call_duration_seconds: Option<u32>,
    #[serde(default)]
    pub callback_at: Option<DateTime<Utc>>,
}

impl AgentOutcome {
    pub fn new(status: LeadStatus) -> Self {
        Self {
            status,
            comment: None,
            call_duration_seconds: None,
            callback_at: None,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadNote {
    pub lead_id: LeadId,
    pub author: Option<AgentId>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackReminder {
    pub lead_id: LeadId,
    pub agent_id: Option<AgentId>,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
