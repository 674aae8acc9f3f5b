use super::common::*;
use chrono::Duration;

use crate::leads::domain::{
    AgentOutcome, DistributionMethod, DistributionTiming, LeadStatus,
};
use crate::leads::repository::LeadActivity;
use crate::leads::scoring::ScoringError;

#[test]
fn scores_stay_within_bounds_for_every_status() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let base = h.confirmed(&center);
    let engine = h.service.scoring();

    let activities = [
        LeadActivity::default(),
        LeadActivity {
            notes: 400,
            reminders: 90,
            open_reminders: 90,
        },
    ];
    for status in LeadStatus::ALL {
        for attempts in [0, 3, 50] {
            for age in [0, 7, 365] {
                for activity in &activities {
                    let mut lead = base.clone();
                    lead.status = status;
                    lead.call_attempts = attempts;
                    lead.call_duration = attempts * 600;
                    lead.created_at = h.clock.now() - Duration::days(age);
                    lead.status_changed_at = Some(lead.created_at);

                    let card = engine.calculate_score(&lead, activity).expect("scores");
                    assert!(card.score <= 100, "{status} scored {}", card.score);
                    assert!(card.factors.values().all(|value| value.is_finite()));
                }
            }
        }
    }
}

#[test]
fn update_score_persists_score_and_factors() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);
    h.clock.advance(Duration::days(3));

    let updated = h
        .service
        .scoring()
        .update_score(&lead.id)
        .expect("score updated");
    let stored = h.stored(&lead.id);

    assert_eq!(stored.score, updated.score);
    assert_eq!(stored.score_factors, updated.score_factors);
    assert_eq!(stored.score_updated_at, Some(h.clock.now()));
    assert!(stored.score_factors["recency"] < 10.0, "recency decays with age");
}

#[test]
fn agent_notes_and_open_callbacks_feed_the_score() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);

    let updated = h
        .service
        .apply_agent_outcome(
            &lead.id,
            AgentOutcome::new(LeadStatus::CallbackPending).with_comment("wants a quote"),
        )
        .expect("outcome recorded");

    assert_eq!(updated.score_factors["notes"], 1.0);
    assert_eq!(updated.score_factors["reminders"], 5.0);
    assert_eq!(updated.score_factors["status"], 10.0);
    assert!(updated.score > lead.score);
}

#[test]
fn scoring_an_unknown_lead_fails_without_side_effects() {
    let h = harness();
    let err = h
        .service
        .scoring()
        .update_score(&crate::leads::domain::LeadId("lead-missing".to_string()))
        .expect_err("no such lead");
    assert!(matches!(err, ScoringError::Repository(_)));
}
