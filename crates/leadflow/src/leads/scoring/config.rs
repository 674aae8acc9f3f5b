use serde::{Deserialize, Serialize};

/// Weights for the lead-quality rubric. Every factor is reported, even at zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub base: f64,
    pub email_confirmed: f64,
    pub phone_present: f64,
    /// Awarded in full once `expected_fields` submitted fields are non-empty.
    pub data_completeness: f64,
    pub expected_fields: u32,
    /// Talk-time credit per minute, capped at `max_call_minutes`.
    pub per_call_minute: f64,
    pub max_call_minutes: u32,
    /// Penalty per call attempt beyond `free_attempts`, capped at `max_attempt_penalty`.
    pub per_extra_attempt: f64,
    pub free_attempts: u32,
    pub max_attempt_penalty: f64,
    pub per_note: f64,
    pub max_notes: u32,
    pub open_reminder: f64,
    /// Full credit for brand-new leads, decaying linearly to zero at `recency_days`.
    pub recency: f64,
    pub recency_days: u32,
    /// Penalty per day an active lead sits in the same status beyond `stale_after_days`.
    pub per_stale_day: f64,
    pub stale_after_days: u32,
    pub max_stale_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base: 10.0,
            email_confirmed: 20.0,
            phone_present: 10.0,
            data_completeness: 15.0,
            expected_fields: 5,
            per_call_minute: 1.0,
            max_call_minutes: 10,
            per_extra_attempt: 2.0,
            free_attempts: 3,
            max_attempt_penalty: 10.0,
            per_note: 1.0,
            max_notes: 5,
            open_reminder: 5.0,
            recency: 10.0,
            recency_days: 30,
            per_stale_day: 1.0,
            stale_after_days: 7,
            max_stale_penalty: 10.0,
        }
    }
}
