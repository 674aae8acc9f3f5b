use std::collections::HashMap;
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::leads::clock::Clock;
use crate::leads::domain::{
    Agent, AgentId, CallCenter, CallCenterId, DistributionMethod, DistributionTiming, Lead,
    LeadId, LeadStatus, NewLead,
};
use crate::leads::events::{
    EventError, InMemoryEventSink, LeadEvent, LeadEventKind, LifecycleEventSink,
};
use crate::leads::lifecycle::{LeadLifecycleService, LifecycleSettings};
use crate::leads::memory::InMemoryLeadStore;
use crate::leads::repository::{
    AgentStats, LeadActivity, LeadRepository, RepositoryError, UnitOfWork,
};

pub(super) type MemoryService = LeadLifecycleService<InMemoryLeadStore, InMemoryEventSink>;

pub(super) fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, 1, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryLeadStore>,
    pub(super) events: Arc<InMemoryEventSink>,
    pub(super) clock: Clock,
    pub(super) service: Arc<MemoryService>,
}

pub(super) fn harness() -> Harness {
    let store = Arc::new(InMemoryLeadStore::default());
    let events = Arc::new(InMemoryEventSink::default());
    let clock = Clock::manual(start());
    let service = Arc::new(LeadLifecycleService::with_clock(
        store.clone(),
        events.clone(),
        LifecycleSettings::default(),
        clock.clone(),
    ));

    Harness {
        store,
        events,
        clock,
        service,
    }
}

impl Harness {
    pub(super) fn center(
        &self,
        id: &str,
        method: DistributionMethod,
        timing: DistributionTiming,
        agents: &[&str],
    ) -> CallCenterId {
        let center_id = CallCenterId(id.to_string());
        self.store
            .upsert_call_center(CallCenter {
                id: center_id.clone(),
                name: format!("{id} floor"),
                distribution_method: method,
                distribution_timing: timing,
                is_active: true,
            })
            .expect("center stored");
        for agent in agents {
            self.store
                .upsert_agent(agent_in(&center_id, agent))
                .expect("agent stored");
        }
        center_id
    }

    /// Creates a lead for `center` and returns it with its confirmation token.
    pub(super) fn submit(&self, center: &CallCenterId) -> (Lead, String) {
        let lead = self
            .service
            .create_lead(submission(center))
            .expect("lead created");
        let token = lead
            .confirmation_token
            .clone()
            .expect("fresh lead has a token");
        (lead, token)
    }

    /// Creates and confirms a lead, returning the committed row.
    pub(super) fn confirmed(&self, center: &CallCenterId) -> Lead {
        let (lead, token) = self.submit(center);
        self.service
            .confirm_email(&lead.id, &token)
            .expect("confirmation succeeds")
            .lead
    }

    pub(super) fn stored(&self, id: &LeadId) -> Lead {
        self.store
            .fetch_lead(id)
            .expect("fetch succeeds")
            .expect("lead present")
    }

    pub(super) fn kinds_for(&self, id: &LeadId) -> Vec<LeadEventKind> {
        self.events
            .events_for(id)
            .into_iter()
            .map(|event| event.kind)
            .collect()
    }

    /// Inserts a closed-out lead straight into the store to give an agent history.
    pub(super) fn history(
        &self,
        id: &str,
        center: &CallCenterId,
        agent: &str,
        status: LeadStatus,
        assigned_at: DateTime<Utc>,
    ) {
        let mut lead = Lead::pending(
            LeadId(id.to_string()),
            submission(center),
            String::new(),
            assigned_at,
            assigned_at - Duration::days(1),
        );
        lead.email_confirmed_at = Some(assigned_at);
        lead.confirmation_token = None;
        lead.confirmation_token_expires_at = None;
        lead.assigned_agent_id = Some(AgentId(agent.to_string()));
        lead.assigned_at = Some(assigned_at);
        lead.status = status;
        lead.call_attempts = 1;
        self.store.insert_lead(lead).expect("history lead stored");
    }
}

pub(super) fn agent_in(center: &CallCenterId, id: &str) -> Agent {
    Agent {
        id: AgentId(id.to_string()),
        call_center_id: center.clone(),
        name: format!("Agent {id}"),
        is_active: true,
    }
}

pub(super) fn submission(center: &CallCenterId) -> NewLead {
    let mut data = std::collections::BTreeMap::new();
    data.insert("name".to_string(), "Grace Hopper".to_string());
    data.insert("product".to_string(), "solar".to_string());
    NewLead {
        form_id: None,
        call_center_id: Some(center.clone()),
        email: "grace@example.com".to_string(),
        phone: Some("+15155550142".to_string()),
        data,
    }
}

pub(super) fn count(kinds: &[LeadEventKind], kind: LeadEventKind) -> usize {
    kinds.iter().filter(|candidate| **candidate == kind).count()
}

pub(super) struct UnavailableStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("database offline".to_string())
}

impl LeadRepository for UnavailableStore {
    fn insert_lead(&self, _lead: Lead) -> Result<Lead, RepositoryError> {
        Err(offline())
    }

    fn fetch_lead(&self, _id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Err(offline())
    }

    fn transact<T, E, F>(&self, _id: &LeadId, _work: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        Err(offline().into())
    }

    fn upsert_call_center(&self, _call_center: CallCenter) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn call_center(&self, _id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError> {
        Err(offline())
    }

    fn upsert_agent(&self, _agent: Agent) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn agent(&self, _id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Err(offline())
    }

    fn agent_stats(&self, _call_center: &CallCenterId) -> Result<Vec<AgentStats>, RepositoryError> {
        Err(offline())
    }

    fn unassigned_routable(&self, _limit: Option<usize>) -> Result<Vec<LeadId>, RepositoryError> {
        Err(offline())
    }

    fn score_candidates(
        &self,
        _stale_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeadId>, RepositoryError> {
        Err(offline())
    }

    fn activity_counts(
        &self,
        _ids: &[LeadId],
        _now: DateTime<Utc>,
    ) -> Result<HashMap<LeadId, LeadActivity>, RepositoryError> {
        Err(offline())
    }
}

/// Sink whose transport is always down.
pub(super) struct DroppingEvents;

impl LifecycleEventSink for DroppingEvents {
    fn publish(&self, _event: LeadEvent) -> Result<(), EventError> {
        Err(EventError::Transport("broker unreachable".to_string()))
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
