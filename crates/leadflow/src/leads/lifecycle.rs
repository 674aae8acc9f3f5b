use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::LeadConfig;

use super::clock::Clock;
use super::distribution::{
    assign_within, DistributionEngine, DistributionError, DistributionOutcome,
};
use super::domain::{
    Agent, AgentId, AgentOutcome, CallbackReminder, Lead, LeadId, LeadNote, LeadStatus, NewLead,
};
use super::events::{LeadEvent, LeadEventKind, LifecycleEventSink};
use super::repository::{LeadActivity, LeadRepository, RepositoryError, UnitOfWork};
use super::scoring::{ScoringConfig, ScoringEngine};
use super::transitions::{check_agent_transition, TransitionError, TransitionReason};

/// Tunables for the lifecycle service.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleSettings {
    pub token_ttl: Duration,
    pub callback_delay: Duration,
    pub score_freshness: Duration,
    pub scoring: ScoringConfig,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self::from(&LeadConfig::default())
    }
}

impl From<&LeadConfig> for LifecycleSettings {
    fn from(config: &LeadConfig) -> Self {
        Self {
            token_ttl: Duration::hours(i64::from(config.token_ttl_hours)),
            callback_delay: Duration::hours(i64::from(config.callback_delay_hours)),
            score_freshness: Duration::hours(i64::from(config.score_stale_after_hours)),
            scoring: ScoringConfig::default(),
        }
    }
}

/// Result of an email confirmation request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationOutcome {
    pub lead: Lead,
    /// The lead was confirmed by an earlier request; nothing changed.
    pub already_confirmed: bool,
    /// Present when the call center distributes on confirmation.
    pub distribution: Option<DistributionOutcome>,
}

/// The lead status state machine.
///
/// Every mutation runs inside [`LeadRepository::transact`], so transitions on one lead
/// serialize on its row lock. Events are published after commit and scores are refreshed
/// in a follow-up transaction.
pub struct LeadLifecycleService<R, E> {
    repository: Arc<R>,
    events: Arc<E>,
    distribution: DistributionEngine<R>,
    scoring: ScoringEngine<R>,
    settings: LifecycleSettings,
    clock: Clock,
}

impl<R, E> LeadLifecycleService<R, E>
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    pub fn new(repository: Arc<R>, events: Arc<E>, settings: LifecycleSettings) -> Self {
        Self::with_clock(repository, events, settings, Clock::system())
    }

    pub fn with_clock(
        repository: Arc<R>,
        events: Arc<E>,
        settings: LifecycleSettings,
        clock: Clock,
    ) -> Self {
        let distribution = DistributionEngine::new(repository.clone());
        let scoring = ScoringEngine::new(
            repository.clone(),
            settings.scoring.clone(),
            settings.score_freshness,
            clock.clone(),
        );

        Self {
            repository,
            events,
            distribution,
            scoring,
            settings,
            clock,
        }
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    pub fn scoring(&self) -> &ScoringEngine<R> {
        &self.scoring
    }

    /// Store a freshly submitted lead in `pending_email` with a new confirmation token.
    pub fn create_lead(&self, submission: NewLead) -> Result<Lead, LifecycleError> {
        let now = self.clock.now();
        let id = LeadId(format!("lead-{}", Uuid::new_v4().simple()));
        let token = Uuid::new_v4().simple().to_string();
        let mut lead = Lead::pending(id, submission, token, now + self.settings.token_ttl, now);

        match self.scoring.calculate_score(&lead, &LeadActivity::default()) {
            Ok(card) => {
                lead.score = card.score;
                lead.score_factors = card.factors;
                lead.score_updated_at = Some(now);
            }
            Err(err) => warn!(lead_id = %lead.id, error = %err, "initial scoring failed"),
        }

        let stored = self.repository.insert_lead(lead)?;
        info!(lead_id = %stored.id, "lead created");
        self.publish(vec![LeadEvent::created(&stored)]);
        Ok(stored)
    }

    pub fn get(&self, lead_id: &LeadId) -> Result<Lead, LifecycleError> {
        self.repository
            .fetch_lead(lead_id)?
            .ok_or_else(|| LifecycleError::LeadNotFound(lead_id.clone()))
    }

    /// Confirm the lead's email address, distributing it right away when its call center
    /// is configured to.
    pub fn confirm_email(
        &self,
        lead_id: &LeadId,
        token: &str,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        let now = self.clock.now();
        let mut events = Vec::new();

        let outcome = self
            .repository
            .transact(lead_id, |unit| self.confirm_in(unit, token, now, &mut events))
            .map_err(scoped_to(lead_id))?;

        if outcome.already_confirmed {
            debug!(lead_id = %lead_id, "email already confirmed");
            return Ok(outcome);
        }

        let summary = outcome
            .distribution
            .as_ref()
            .map(DistributionOutcome::summary)
            .unwrap_or_else(|| "deferred".to_string());
        info!(lead_id = %lead_id, distribution = %summary, "email confirmed");
        self.publish(events);

        let ConfirmationOutcome {
            lead, distribution, ..
        } = outcome;
        Ok(ConfirmationOutcome {
            lead: self.refresh_score(lead),
            already_confirmed: false,
            distribution,
        })
    }

    /// Replace an unused or expired confirmation token with a fresh one.
    ///
    /// Only leads still in `pending_email` qualify; the previous token stops working as soon
    /// as this commits.
    pub fn reissue_confirmation_token(&self, lead_id: &LeadId) -> Result<Lead, LifecycleError> {
        let now = self.clock.now();
        let token = Uuid::new_v4().simple().to_string();
        let expires_at = now + self.settings.token_ttl;

        let lead = self
            .repository
            .transact(lead_id, |unit| -> Result<_, LifecycleError> {
                let lead = &mut unit.lead;
                if lead.status != LeadStatus::PendingEmail || lead.is_email_confirmed() {
                    return Err(TransitionError::NotAllowed {
                        from: lead.status,
                        to: LeadStatus::PendingEmail,
                        reason: TransitionReason::AlreadyConfirmed,
                    }
                    .into());
                }
                lead.confirmation_token = Some(token);
                lead.confirmation_token_expires_at = Some(expires_at);
                Ok(lead.clone())
            })
            .map_err(scoped_to(lead_id))?;

        info!(lead_id = %lead_id, expires_at = %expires_at, "confirmation token reissued");
        Ok(lead)
    }

    /// Record the result of an agent's call.
    pub fn apply_agent_outcome(
        &self,
        lead_id: &LeadId,
        outcome: AgentOutcome,
    ) -> Result<Lead, LifecycleError> {
        let now = self.clock.now();
        let mut events = Vec::new();

        let lead = self
            .repository
            .transact(lead_id, |unit| {
                self.record_outcome_in(unit, &outcome, now, &mut events)
            })
            .map_err(scoped_to(lead_id))?;

        info!(
            lead_id = %lead_id,
            status = lead.status.label(),
            attempts = lead.call_attempts,
            "agent outcome recorded"
        );
        self.publish(events);
        Ok(self.refresh_score(lead))
    }

    /// Owner-initiated assignment that bypasses automatic selection.
    pub fn assign_manually(
        &self,
        lead_id: &LeadId,
        agent_id: &AgentId,
    ) -> Result<Lead, LifecycleError> {
        let now = self.clock.now();
        let agent = self
            .repository
            .agent(agent_id)?
            .ok_or_else(|| LifecycleError::AgentNotEligible {
                agent_id: agent_id.clone(),
                reason: "unknown agent",
            })?;
        if !agent.is_active {
            return Err(LifecycleError::AgentNotEligible {
                agent_id: agent_id.clone(),
                reason: "agent is inactive",
            });
        }

        let mut events = Vec::new();
        let lead = self
            .repository
            .transact(lead_id, |unit| assign_agent_in(unit, &agent, now, &mut events))
            .map_err(scoped_to(lead_id))?;

        if events.is_empty() {
            return Ok(lead);
        }
        info!(lead_id = %lead_id, agent_id = %agent_id, "lead assigned manually");
        self.publish(events);
        Ok(self.refresh_score(lead))
    }

    /// Run automatic distribution for one lead in its own transaction.
    pub fn distribute(&self, lead_id: &LeadId) -> Result<DistributionOutcome, LifecycleError> {
        let now = self.clock.now();
        let mut events = Vec::new();

        let (outcome, lead) = self
            .repository
            .transact(lead_id, |unit| -> Result<_, LifecycleError> {
                let outcome = self.distribution.distribute_in(unit, &mut events, now)?;
                Ok((outcome, unit.lead.clone()))
            })
            .map_err(scoped_to(lead_id))?;

        if outcome.is_assigned() {
            info!(lead_id = %lead_id, result = %outcome.summary(), "lead distributed");
            self.publish(events);
            self.refresh_score(lead);
        }
        Ok(outcome)
    }

    fn confirm_in(
        &self,
        unit: &mut UnitOfWork,
        token: &str,
        now: DateTime<Utc>,
        events: &mut Vec<LeadEvent>,
    ) -> Result<ConfirmationOutcome, LifecycleError> {
        if unit.lead.is_email_confirmed() {
            return Ok(ConfirmationOutcome {
                lead: unit.lead.clone(),
                already_confirmed: true,
                distribution: None,
            });
        }
        if !unit.lead.token_matches(token, now) {
            return Err(LifecycleError::InvalidToken);
        }
        if unit.lead.status != LeadStatus::PendingEmail {
            return Err(TransitionError::NotAllowed {
                from: unit.lead.status,
                to: LeadStatus::EmailConfirmed,
                reason: TransitionReason::SystemOnly,
            }
            .into());
        }

        let lead = &mut unit.lead;
        lead.email_confirmed_at = Some(now);
        lead.confirmation_token = None;
        lead.confirmation_token_expires_at = None;
        let old_status = lead.set_status(LeadStatus::EmailConfirmed, now);
        events.push(LeadEvent::transition(
            LeadEventKind::EmailConfirmed,
            lead,
            old_status,
            now,
        ));

        let distributes = match &unit.lead.call_center_id {
            Some(id) => self
                .repository
                .call_center(id)?
                .map(|center| center.distributes_on_confirmation())
                .unwrap_or(false),
            None => false,
        };
        let distribution = if distributes {
            Some(self.distribution.distribute_in(unit, events, now)?)
        } else {
            None
        };

        Ok(ConfirmationOutcome {
            lead: unit.lead.clone(),
            already_confirmed: false,
            distribution,
        })
    }

    fn record_outcome_in(
        &self,
        unit: &mut UnitOfWork,
        outcome: &AgentOutcome,
        now: DateTime<Utc>,
        events: &mut Vec<LeadEvent>,
    ) -> Result<Lead, LifecycleError> {
        check_agent_transition(unit.lead.status, outcome.status)?;

        let agent_id = unit.lead.assigned_agent_id.clone();
        let comment = outcome
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|comment| !comment.is_empty());

        let lead = &mut unit.lead;
        let old_status = lead.set_status(outcome.status, now);
        lead.call_attempts = lead.call_attempts.saturating_add(1);
        lead.last_call_at = Some(now);
        if let Some(seconds) = outcome.call_duration_seconds {
            lead.call_duration = lead.call_duration.saturating_add(seconds);
        }
        if let Some(comment) = comment {
            lead.comment = Some(comment.to_string());
        }
        lead.next_call_at = if outcome.status == LeadStatus::CallbackPending {
            Some(callback_due(
                outcome.callback_at,
                now,
                self.settings.callback_delay,
            ))
        } else {
            None
        };
        events.push(LeadEvent::transition(
            LeadEventKind::StatusUpdated,
            lead,
            old_status,
            now,
        ));

        let lead_id = unit.lead.id.clone();
        let next_call_at = unit.lead.next_call_at;
        if let Some(comment) = comment {
            unit.add_note(LeadNote {
                lead_id: lead_id.clone(),
                author: agent_id.clone(),
                body: comment.to_string(),
                created_at: now,
            });
        }
        if let Some(due_at) = next_call_at {
            unit.add_reminder(CallbackReminder {
                lead_id,
                agent_id,
                due_at,
                created_at: now,
            });
        }

        Ok(unit.lead.clone())
    }

    fn publish(&self, events: Vec<LeadEvent>) {
        for event in events {
            let kind = event.kind;
            let lead_id = event.lead_id.clone();
            if let Err(err) = self.events.publish(event) {
                warn!(lead_id = %lead_id, ?kind, error = %err, "lifecycle event not delivered");
            }
        }
    }

    /// Best effort: a scoring failure never undoes the committed transition.
    fn refresh_score(&self, committed: Lead) -> Lead {
        match self.scoring.update_score(&committed.id) {
            Ok(lead) => lead,
            Err(err) => {
                warn!(lead_id = %committed.id, error = %err, "score refresh failed");
                committed
            }
        }
    }
}

fn callback_due(
    requested: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    default_delay: Duration,
) -> DateTime<Utc> {
    match requested {
        Some(at) if at > now => at,
        _ => now + default_delay,
    }
}

fn assign_agent_in(
    unit: &mut UnitOfWork,
    agent: &Agent,
    now: DateTime<Utc>,
    events: &mut Vec<LeadEvent>,
) -> Result<Lead, LifecycleError> {
    let status = unit.lead.status;
    if status == LeadStatus::PendingEmail || status.is_final() {
        let reason = if status.is_final() {
            TransitionReason::FinalStatus
        } else {
            TransitionReason::EmailUnconfirmed
        };
        return Err(TransitionError::NotAllowed {
            from: status,
            to: LeadStatus::PendingCall,
            reason,
        }
        .into());
    }
    if unit.lead.call_center_id.as_ref() != Some(&agent.call_center_id) {
        return Err(LifecycleError::AgentNotEligible {
            agent_id: agent.id.clone(),
            reason: "agent belongs to a different call center",
        });
    }
    if unit.lead.assigned_agent_id.as_ref() != Some(&agent.id) {
        assign_within(unit, agent.id.clone(), now, events);
    }
    Ok(unit.lead.clone())
}

/// Error raised by the lifecycle service.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("confirmation token is invalid or expired")]
    InvalidToken,
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("lead {0} not found")]
    LeadNotFound(LeadId),
    #[error("agent {agent_id} cannot take this lead: {reason}")]
    AgentNotEligible {
        agent_id: AgentId,
        reason: &'static str,
    },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Reports a missing row as the lead the caller asked for.
fn scoped_to(lead_id: &LeadId) -> impl Fn(LifecycleError) -> LifecycleError + '_ {
    move |err| match err {
        LifecycleError::Repository(RepositoryError::NotFound) => {
            LifecycleError::LeadNotFound(lead_id.clone())
        }
        other => other,
    }
}
