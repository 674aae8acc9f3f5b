use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::leads::domain::{DistributionMethod, DistributionTiming};
use crate::leads::events::InMemoryEventSink;
use crate::leads::lifecycle::{LeadLifecycleService, LifecycleSettings};
use crate::leads::router::{lead_router, status_handler, CONFIRMATION_FAILED};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

#[tokio::test]
async fn confirm_route_assigns_and_reports_distribution() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let (lead, token) = h.submit(&center);

    let response = lead_router(h.service.clone())
        .oneshot(post_json(
            &format!("/api/v1/leads/{}/confirm", lead.id),
            json!({ "token": token }),
        ))
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["already_confirmed"], json!(false));
    assert_eq!(body["distribution"]["outcome"], json!("assigned"));
    assert_eq!(body["lead"]["status"], json!("pending_call"));
    assert!(body["lead"].get("email").is_none(), "contact data is not exposed");
}

#[tokio::test]
async fn confirm_route_hides_why_confirmation_failed() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let (lead, _) = h.submit(&center);

    let mut bodies = Vec::new();
    for uri in [
        format!("/api/v1/leads/{}/confirm", lead.id),
        "/api/v1/leads/lead-missing/confirm".to_string(),
    ] {
        let response = lead_router(h.service.clone())
            .oneshot(post_json(&uri, json!({ "token": "guess" })))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        bodies.push(read_json_body(response).await);
    }

    assert_eq!(bodies[0], json!({ "error": CONFIRMATION_FAILED }));
    assert_eq!(bodies[0], bodies[1]);
}

#[tokio::test]
async fn status_route_lists_allowed_outcomes() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);

    let response = lead_router(h.service.clone())
        .oneshot(
            Request::get(format!("/api/v1/leads/{}", lead.id))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["assigned_agent_id"], json!("a-1"));
    let outcomes = body["allowed_outcomes"]
        .as_array()
        .expect("outcome list")
        .clone();
    assert!(outcomes.contains(&json!("callback_pending")));
    assert!(!outcomes.contains(&json!("converted")));
}

#[tokio::test]
async fn status_route_returns_not_found_for_unknown_leads() {
    let h = harness();
    let response = lead_router(h.service.clone())
        .oneshot(
            Request::get("/api/v1/leads/lead-missing")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outcome_route_rejects_illegal_transitions_with_conflict() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);
    let uri = format!("/api/v1/leads/{}/outcome", lead.id);

    let response = lead_router(h.service.clone())
        .oneshot(post_json(&uri, json!({ "status": "converted" })))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = lead_router(h.service.clone())
        .oneshot(post_json(
            &uri,
            json!({ "status": "no_answer", "comment": "voicemail", "call_duration_seconds": 20 }),
        ))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("no_answer"));
    assert_eq!(body["call_attempts"], json!(1));
}

#[tokio::test]
async fn assign_route_rejects_unknown_agents() {
    let h = harness();
    let center = h.center(
        "cc-manual",
        DistributionMethod::Manual,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);
    let uri = format!("/api/v1/leads/{}/assign", lead.id);

    let response = lead_router(h.service.clone())
        .oneshot(post_json(&uri, json!({ "agent_id": "a-404" })))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let response = lead_router(h.service.clone())
        .oneshot(post_json(&uri, json!({ "agent_id": "a-1" })))
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], json!("pending_call"));
}

#[tokio::test]
async fn status_handler_returns_internal_error_on_repository_failure() {
    let service = Arc::new(LeadLifecycleService::new(
        Arc::new(UnavailableStore),
        Arc::new(InMemoryEventSink::default()),
        LifecycleSettings::default(),
    ));

    let response = status_handler::<UnavailableStore, InMemoryEventSink>(
        State(service),
        Path("lead-1".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
