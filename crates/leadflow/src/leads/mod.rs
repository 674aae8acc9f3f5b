//! Lead lifecycle: confirmation, distribution to call center agents, call outcomes, and scoring.
//!
//! All mutations of a lead go through [`LeadLifecycleService`], which serializes them on the
//! lead's row lock via [`LeadRepository::transact`].

pub mod clock;
pub mod distribution;
pub mod domain;
pub mod events;
pub mod lifecycle;
pub mod memory;
pub mod repository;
pub mod router;
pub mod scheduler;
pub mod scoring;
pub mod transitions;

#[cfg(test)]
mod tests;

pub use clock::Clock;
pub use distribution::{DistributionEngine, DistributionError, DistributionOutcome, SkipReason};
pub use domain::{
    Agent, AgentId, AgentOutcome, CallCenter, CallCenterId, CallbackReminder, DistributionMethod,
    DistributionTiming, FormId, InvariantViolation, Lead, LeadId, LeadNote, LeadStatus, NewLead,
};
pub use events::{EventError, InMemoryEventSink, LeadEvent, LeadEventKind, LifecycleEventSink};
pub use lifecycle::{ConfirmationOutcome, LeadLifecycleService, LifecycleError, LifecycleSettings};
pub use memory::{InMemoryLeadStore, SnapshotError, StoreSnapshot};
pub use repository::{AgentStats, LeadActivity, LeadRepository, RepositoryError, UnitOfWork};
pub use router::{lead_router, LeadStatusView};
pub use scheduler::{DistributionScheduler, DistributionSweepReport, ScoreRecalculationSweep};
pub use scoring::{RecalculationReport, ScoreCard, ScoringConfig, ScoringEngine, ScoringError};
pub use transitions::{agent_outcomes, check_agent_transition, TransitionError};
