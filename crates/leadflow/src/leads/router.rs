use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::distribution::DistributionOutcome;
use super::domain::{AgentId, AgentOutcome, Lead, LeadId, LeadStatus};
use super::events::LifecycleEventSink;
use super::lifecycle::{LeadLifecycleService, LifecycleError};
use super::repository::LeadRepository;
use super::transitions::agent_outcomes;

/// Shown for every failed confirmation so the response reveals nothing about the token.
pub const CONFIRMATION_FAILED: &str = "could not confirm email address";

/// Sanitized representation of a lead for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct LeadStatusView {
    pub lead_id: LeadId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_agent_id: Option<AgentId>,
    pub score: u8,
    pub score_factors: BTreeMap<String, f64>,
    pub call_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_call_at: Option<DateTime<Utc>>,
    /// Statuses an agent may record next.
    pub allowed_outcomes: Vec<&'static str>,
}

impl From<&Lead> for LeadStatusView {
    fn from(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            status: lead.status.label(),
            assigned_agent_id: lead.assigned_agent_id.clone(),
            score: lead.score,
            score_factors: lead.score_factors.clone(),
            call_attempts: lead.call_attempts,
            next_call_at: lead.next_call_at,
            allowed_outcomes: agent_outcomes(lead.status)
                .iter()
                .map(LeadStatus::label)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub agent_id: AgentId,
}

#[derive(Debug, Serialize)]
struct ConfirmResponse {
    lead: LeadStatusView,
    already_confirmed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    distribution: Option<DistributionOutcome>,
}

/// Router builder exposing the confirmation, agent, and owner endpoints.
pub fn lead_router<R, E>(service: Arc<LeadLifecycleService<R, E>>) -> Router
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    Router::new()
        .route("/api/v1/leads/:lead_id", get(status_handler::<R, E>))
        .route(
            "/api/v1/leads/:lead_id/confirm",
            post(confirm_handler::<R, E>),
        )
        .route(
            "/api/v1/leads/:lead_id/outcome",
            post(outcome_handler::<R, E>),
        )
        .route("/api/v1/leads/:lead_id/assign", post(assign_handler::<R, E>))
        .with_state(service)
}

pub(crate) async fn status_handler<R, E>(
    State(service): State<Arc<LeadLifecycleService<R, E>>>,
    Path(lead_id): Path<String>,
) -> Response
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    match service.get(&LeadId(lead_id)) {
        Ok(lead) => (StatusCode::OK, axum::Json(LeadStatusView::from(&lead))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn confirm_handler<R, E>(
    State(service): State<Arc<LeadLifecycleService<R, E>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<ConfirmRequest>,
) -> Response
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    match service.confirm_email(&LeadId(lead_id), &request.token) {
        Ok(outcome) => {
            let body = ConfirmResponse {
                lead: LeadStatusView::from(&outcome.lead),
                already_confirmed: outcome.already_confirmed,
                distribution: outcome.distribution,
            };
            (StatusCode::OK, axum::Json(body)).into_response()
        }
        Err(
            LifecycleError::InvalidToken
            | LifecycleError::LeadNotFound(_)
            | LifecycleError::InvalidTransition(_),
        ) => {
            let payload = json!({ "error": CONFIRMATION_FAILED });
            (StatusCode::BAD_REQUEST, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn outcome_handler<R, E>(
    State(service): State<Arc<LeadLifecycleService<R, E>>>,
    Path(lead_id): Path<String>,
    axum::Json(outcome): axum::Json<AgentOutcome>,
) -> Response
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    match service.apply_agent_outcome(&LeadId(lead_id), outcome) {
        Ok(lead) => (StatusCode::OK, axum::Json(LeadStatusView::from(&lead))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn assign_handler<R, E>(
    State(service): State<Arc<LeadLifecycleService<R, E>>>,
    Path(lead_id): Path<String>,
    axum::Json(request): axum::Json<AssignRequest>,
) -> Response
where
    R: LeadRepository + 'static,
    E: LifecycleEventSink + 'static,
{
    match service.assign_manually(&LeadId(lead_id), &request.agent_id) {
        Ok(lead) => (StatusCode::OK, axum::Json(LeadStatusView::from(&lead))).into_response(),
        Err(err) => error_response(err),
    }
}

fn error_response(err: LifecycleError) -> Response {
    let status = match &err {
        LifecycleError::LeadNotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::InvalidTransition(_) => StatusCode::CONFLICT,
        LifecycleError::AgentNotEligible { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        LifecycleError::InvalidToken => StatusCode::BAD_REQUEST,
        LifecycleError::Distribution(_) | LifecycleError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}
