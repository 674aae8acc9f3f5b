//! Process-local implementation of [`LeadRepository`].
//!
//! Committed rows live behind `RwLock`s; each lead row additionally owns a mutex that
//! `transact` holds for the whole read-modify-write. Readers only ever see committed rows,
//! so aggregates computed during another lead's transaction never observe its working copy.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{
    Agent, AgentId, CallCenter, CallCenterId, CallbackReminder, DistributionMethod, Lead, LeadId,
    LeadNote,
};
use super::repository::{AgentStats, LeadActivity, LeadRepository, RepositoryError, UnitOfWork};

#[derive(Debug, Default)]
pub struct InMemoryLeadStore {
    leads: RwLock<BTreeMap<LeadId, Lead>>,
    row_locks: Mutex<HashMap<LeadId, Arc<Mutex<()>>>>,
    call_centers: RwLock<BTreeMap<CallCenterId, CallCenter>>,
    agents: RwLock<BTreeMap<AgentId, Agent>>,
    notes: RwLock<Vec<LeadNote>>,
    reminders: RwLock<Vec<CallbackReminder>>,
}

/// Serializable image of the whole store, used by the CLI sweeps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub call_centers: Vec<CallCenter>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default)]
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub notes: Vec<LeadNote>,
    #[serde(default)]
    pub reminders: Vec<CallbackReminder>,
}

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("unable to access store snapshot: {0}")]
    Io(#[from] std::io::Error),
    #[error("store snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("store lock poisoned".to_string())
}

impl InMemoryLeadStore {
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let StoreSnapshot {
            call_centers,
            agents,
            leads,
            notes,
            reminders,
        } = snapshot;

        Self {
            leads: RwLock::new(leads.into_iter().map(|lead| (lead.id.clone(), lead)).collect()),
            row_locks: Mutex::new(HashMap::new()),
            call_centers: RwLock::new(
                call_centers
                    .into_iter()
                    .map(|center| (center.id.clone(), center))
                    .collect(),
            ),
            agents: RwLock::new(
                agents
                    .into_iter()
                    .map(|agent| (agent.id.clone(), agent))
                    .collect(),
            ),
            notes: RwLock::new(notes),
            reminders: RwLock::new(reminders),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        Ok(StoreSnapshot {
            call_centers: self.call_centers.read().map_err(poisoned)?.values().cloned().collect(),
            agents: self.agents.read().map_err(poisoned)?.values().cloned().collect(),
            leads: self.read_leads()?.values().cloned().collect(),
            notes: self.notes.read().map_err(poisoned)?.clone(),
            reminders: self.reminders.read().map_err(poisoned)?.clone(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        if !path.exists() {
            debug!(path = %path.display(), "no store snapshot yet, starting empty");
            return Ok(Self::default());
        }
        let raw = fs::read(path)?;
        let snapshot: StoreSnapshot = serde_json::from_slice(&raw)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let snapshot = self.snapshot()?;
        let raw = serde_json::to_vec_pretty(&snapshot)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn notes_for(&self, id: &LeadId) -> Result<Vec<LeadNote>, RepositoryError> {
        Ok(self
            .notes
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|note| &note.lead_id == id)
            .cloned()
            .collect())
    }

    pub fn reminders_for(&self, id: &LeadId) -> Result<Vec<CallbackReminder>, RepositoryError> {
        Ok(self
            .reminders
            .read()
            .map_err(poisoned)?
            .iter()
            .filter(|reminder| &reminder.lead_id == id)
            .cloned()
            .collect())
    }

    fn read_leads(&self) -> Result<RwLockReadGuard<'_, BTreeMap<LeadId, Lead>>, RepositoryError> {
        self.leads.read().map_err(poisoned)
    }

    fn write_leads(
        &self,
    ) -> Result<RwLockWriteGuard<'_, BTreeMap<LeadId, Lead>>, RepositoryError> {
        self.leads.write().map_err(poisoned)
    }

    fn row_lock(&self, id: &LeadId) -> Result<Arc<Mutex<()>>, RepositoryError> {
        let mut locks = self.row_locks.lock().map_err(poisoned)?;
        Ok(locks.entry(id.clone()).or_default().clone())
    }

    /// Drops the row mutex once no other transaction holds or waits on it.
    fn release_row_lock(&self, id: &LeadId) {
        let Ok(mut locks) = self.row_locks.lock() else {
            return;
        };
        if locks.get(id).is_some_and(|row| Arc::strong_count(row) == 1) {
            locks.remove(id);
        }
    }

    fn transact_locked<T, E, F>(&self, id: &LeadId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let current = self
            .read_leads()?
            .get(id)
            .cloned()
            .ok_or(RepositoryError::NotFound)?;

        let mut unit = UnitOfWork::new(current);
        let value = work(&mut unit)?;
        self.commit(unit)?;
        Ok(value)
    }

    fn commit(&self, unit: UnitOfWork) -> Result<(), RepositoryError> {
        unit.lead.check_invariants()?;
        let (lead, notes, reminders) = unit.into_parts();

        if !notes.is_empty() {
            self.notes.write().map_err(poisoned)?.extend(notes);
        }
        if !reminders.is_empty() {
            self.reminders.write().map_err(poisoned)?.extend(reminders);
        }
        self.write_leads()?.insert(lead.id.clone(), lead);
        Ok(())
    }
}

impl LeadRepository for InMemoryLeadStore {
    fn insert_lead(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        lead.check_invariants()?;
        let mut guard = self.write_leads()?;
        if guard.contains_key(&lead.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    fn fetch_lead(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.read_leads()?.get(id).cloned())
    }

    fn transact<T, E, F>(&self, id: &LeadId, work: F) -> Result<T, E>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T, E>,
        E: From<RepositoryError>,
    {
        let row = self.row_lock(id)?;
        let result = {
            // The row mutex guards no data, so a panic in an earlier holder leaves nothing torn.
            let _row_guard = row.lock().unwrap_or_else(PoisonError::into_inner);
            self.transact_locked(id, work)
        };
        drop(row);
        self.release_row_lock(id);
        result
    }

    fn upsert_call_center(&self, call_center: CallCenter) -> Result<(), RepositoryError> {
        self.call_centers
            .write()
            .map_err(poisoned)?
            .insert(call_center.id.clone(), call_center);
        Ok(())
    }

    fn call_center(&self, id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError> {
        Ok(self.call_centers.read().map_err(poisoned)?.get(id).cloned())
    }

    fn upsert_agent(&self, agent: Agent) -> Result<(), RepositoryError> {
        self.agents
            .write()
            .map_err(poisoned)?
            .insert(agent.id.clone(), agent);
        Ok(())
    }

    fn agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.agents.read().map_err(poisoned)?.get(id).cloned())
    }

    fn agent_stats(&self, call_center: &CallCenterId) -> Result<Vec<AgentStats>, RepositoryError> {
        let mut stats: BTreeMap<AgentId, AgentStats> = self
            .agents
            .read()
            .map_err(poisoned)?
            .values()
            .filter(|agent| &agent.call_center_id == call_center)
            .map(|agent| (agent.id.clone(), AgentStats::idle(agent.clone())))
            .collect();

        for lead in self.read_leads()?.values() {
            let Some(entry) = lead
                .assigned_agent_id
                .as_ref()
                .and_then(|agent_id| stats.get_mut(agent_id))
            else {
                continue;
            };

            entry.total_assigned += 1;
            if !lead.status.is_final() {
                entry.workload += 1;
            }
            if lead.status.counts_as_confirmed() {
                entry.confirmed += 1;
            }
            if lead.assigned_at > entry.last_assigned_at {
                entry.last_assigned_at = lead.assigned_at;
            }
        }

        Ok(stats.into_values().collect())
    }

    fn unassigned_routable(&self, limit: Option<usize>) -> Result<Vec<LeadId>, RepositoryError> {
        let centers = self.call_centers.read().map_err(poisoned)?;
        let is_manual = |lead: &Lead| {
            lead.call_center_id
                .as_ref()
                .and_then(|id| centers.get(id))
                .map(|center| center.distribution_method == DistributionMethod::Manual)
                .unwrap_or(false)
        };

        let leads = self.read_leads()?;
        let mut waiting: Vec<&Lead> = leads
            .values()
            .filter(|lead| lead.awaiting_assignment() && !is_manual(lead))
            .collect();
        waiting.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let limit = limit.unwrap_or(usize::MAX);
        Ok(waiting
            .into_iter()
            .take(limit)
            .map(|lead| lead.id.clone())
            .collect())
    }

    fn score_candidates(
        &self,
        stale_before: Option<DateTime<Utc>>,
    ) -> Result<Vec<LeadId>, RepositoryError> {
        let leads = self.read_leads()?;
        let mut candidates: Vec<&Lead> = leads
            .values()
            .filter(|lead| match stale_before {
                None => true,
                Some(cutoff) => lead
                    .score_updated_at
                    .map(|updated| updated < cutoff)
                    .unwrap_or(true),
            })
            .collect();
        candidates.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(candidates.into_iter().map(|lead| lead.id.clone()).collect())
    }

    fn activity_counts(
        &self,
        ids: &[LeadId],
        now: DateTime<Utc>,
    ) -> Result<HashMap<LeadId, LeadActivity>, RepositoryError> {
        let mut counts: HashMap<LeadId, LeadActivity> = ids
            .iter()
            .map(|id| (id.clone(), LeadActivity::default()))
            .collect();

        for note in self.notes.read().map_err(poisoned)?.iter() {
            if let Some(entry) = counts.get_mut(&note.lead_id) {
                entry.notes += 1;
            }
        }
        for reminder in self.reminders.read().map_err(poisoned)?.iter() {
            if let Some(entry) = counts.get_mut(&reminder.lead_id) {
                entry.reminders += 1;
                if reminder.due_at > now {
                    entry.open_reminders += 1;
                }
            }
        }

        Ok(counts)
    }
}
