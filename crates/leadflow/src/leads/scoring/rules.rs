use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::super::domain::{Lead, LeadStatus};
use super::super::repository::LeadActivity;
use super::config::ScoringConfig;
use super::{ScoreCard, ScoringError};

const SECONDS_PER_DAY: f64 = 86_400.0;

fn status_weight(status: LeadStatus) -> f64 {
    match status {
        LeadStatus::PendingEmail => 0.0,
        LeadStatus::EmailConfirmed => 5.0,
        LeadStatus::PendingCall => 5.0,
        LeadStatus::NoAnswer => -5.0,
        LeadStatus::CallbackPending => 10.0,
        LeadStatus::FollowUp => 8.0,
        LeadStatus::Confirmed => 25.0,
        LeadStatus::Converted => 30.0,
        LeadStatus::Rejected => -30.0,
        LeadStatus::DoNotCall => -40.0,
    }
}

fn days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds().max(0) as f64 / SECONDS_PER_DAY
}

pub(crate) fn score_lead(
    lead: &Lead,
    activity: &LeadActivity,
    config: &ScoringConfig,
    now: DateTime<Utc>,
) -> Result<ScoreCard, ScoringError> {
    if lead.created_at > now {
        return Err(ScoringError::CreatedInFuture {
            lead_id: lead.id.clone(),
            created_at: lead.created_at,
            now,
        });
    }

    let mut factors = BTreeMap::new();
    factors.insert("base".to_string(), config.base);

    let confirmed = if lead.is_email_confirmed() {
        config.email_confirmed
    } else {
        0.0
    };
    factors.insert("email_confirmed".to_string(), confirmed);

    let has_phone = lead
        .phone
        .as_deref()
        .map(|phone| !phone.trim().is_empty())
        .unwrap_or(false);
    factors.insert(
        "phone_present".to_string(),
        if has_phone { config.phone_present } else { 0.0 },
    );

    let filled = lead
        .data
        .values()
        .filter(|value| !value.trim().is_empty())
        .count() as f64;
    let completeness = if config.expected_fields == 0 {
        1.0
    } else {
        (filled / f64::from(config.expected_fields)).min(1.0)
    };
    factors.insert(
        "data_completeness".to_string(),
        completeness * config.data_completeness,
    );

    factors.insert("status".to_string(), status_weight(lead.status));

    let talk_minutes = (lead.call_duration / 60).min(config.max_call_minutes);
    let extra_attempts = lead.call_attempts.saturating_sub(config.free_attempts);
    let attempt_penalty =
        (f64::from(extra_attempts) * config.per_extra_attempt).min(config.max_attempt_penalty);
    factors.insert(
        "call_engagement".to_string(),
        f64::from(talk_minutes) * config.per_call_minute - attempt_penalty,
    );

    factors.insert(
        "notes".to_string(),
        f64::from(activity.notes.min(config.max_notes)) * config.per_note,
    );
    factors.insert(
        "reminders".to_string(),
        if activity.open_reminders > 0 {
            config.open_reminder
        } else {
            0.0
        },
    );

    let age_days = days_between(lead.created_at, now);
    let recency = if config.recency_days == 0 {
        0.0
    } else {
        let remaining = 1.0 - age_days / f64::from(config.recency_days);
        remaining.clamp(0.0, 1.0) * config.recency
    };
    factors.insert("recency".to_string(), recency);

    let stale_penalty = match lead.status_changed_at {
        Some(changed_at) if lead.status.is_active() => {
            let idle_days = days_between(changed_at, now).floor();
            let overdue = (idle_days - f64::from(config.stale_after_days)).max(0.0);
            (overdue * config.per_stale_day).min(config.max_stale_penalty)
        }
        _ => 0.0,
    };
    factors.insert("time_in_state".to_string(), -stale_penalty);

    if let Some((name, _)) = factors.iter().find(|(_, value)| !value.is_finite()) {
        return Err(ScoringError::NonFiniteFactor {
            lead_id: lead.id.clone(),
            factor: name.clone(),
        });
    }

    let total: f64 = factors.values().sum();
    let score = total.round().clamp(0.0, 100.0) as u8;

    Ok(ScoreCard { score, factors })
}
