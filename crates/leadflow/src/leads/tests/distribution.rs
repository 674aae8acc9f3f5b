use super::common::*;
use chrono::Duration;
use std::collections::BTreeMap;

use crate::leads::distribution::{DistributionOutcome, SkipReason};
use crate::leads::domain::{
    AgentId, CallCenter, CallCenterId, DistributionMethod, DistributionTiming, LeadStatus,
};
use crate::leads::repository::LeadRepository;

fn assigned_to(outcome: Option<DistributionOutcome>) -> AgentId {
    match outcome {
        Some(DistributionOutcome::Assigned { agent_id }) => agent_id,
        other => panic!("expected an assignment, got {other:?}"),
    }
}

fn confirm_for_agent(h: &Harness, center: &CallCenterId) -> AgentId {
    let (lead, token) = h.submit(center);
    let outcome = h
        .service
        .confirm_email(&lead.id, &token)
        .expect("confirmation succeeds");
    assigned_to(outcome.distribution)
}

#[test]
fn round_robin_spreads_leads_evenly() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1", "a-2", "a-3"],
    );

    let mut per_agent: BTreeMap<AgentId, usize> = BTreeMap::new();
    for _ in 0..6 {
        h.clock.advance(Duration::minutes(1));
        *per_agent.entry(confirm_for_agent(&h, &center)).or_default() += 1;
    }

    assert_eq!(per_agent.len(), 3);
    assert!(per_agent.values().all(|count| *count == 2), "{per_agent:?}");
}

#[test]
fn round_robin_stays_within_one_lead_when_counts_do_not_divide() {
    for (leads, agents) in [(7usize, 3usize), (5, 2), (10, 4), (2, 3)] {
        let h = harness();
        let names: Vec<String> = (1..=agents).map(|n| format!("a-{n}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let center = h.center(
            "cc-north",
            DistributionMethod::RoundRobin,
            DistributionTiming::OnConfirmation,
            &refs,
        );

        let mut per_agent: BTreeMap<AgentId, usize> = names
            .iter()
            .map(|name| (AgentId(name.clone()), 0))
            .collect();
        for _ in 0..leads {
            h.clock.advance(Duration::minutes(1));
            *per_agent.entry(confirm_for_agent(&h, &center)).or_default() += 1;
        }

        let floor = leads / agents;
        let ceil = leads.div_ceil(agents);
        assert_eq!(per_agent.len(), agents, "{leads}/{agents}: {per_agent:?}");
        assert_eq!(per_agent.values().sum::<usize>(), leads);
        assert!(
            per_agent
                .values()
                .all(|count| *count == floor || *count == ceil),
            "{leads}/{agents}: {per_agent:?}"
        );
    }
}

#[test]
fn round_robin_prefers_the_least_loaded_agent() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-busy", "a-idle"],
    );
    for index in 0..5 {
        h.history(
            &format!("busy-{index}"),
            &center,
            "a-busy",
            LeadStatus::NoAnswer,
            start() - Duration::days(3),
        );
    }

    assert_eq!(confirm_for_agent(&h, &center), AgentId("a-idle".to_string()));
}

#[test]
fn weighted_routes_to_the_lower_confirmation_ratio() {
    for (method, expected) in [
        (DistributionMethod::Weighted, "a-low"),
        (DistributionMethod::RoundRobin, "a-high"),
    ] {
        let h = harness();
        let center = h.center(
            "cc-north",
            method,
            DistributionTiming::OnConfirmation,
            &["a-high", "a-low"],
        );
        // Closed leads only, so both agents carry zero workload.
        for index in 0..10 {
            let status = if index < 8 {
                LeadStatus::Converted
            } else {
                LeadStatus::Rejected
            };
            h.history(
                &format!("high-{index}"),
                &center,
                "a-high",
                status,
                start() - Duration::days(10),
            );
        }
        for index in 0..10 {
            let status = if index < 2 {
                LeadStatus::Converted
            } else {
                LeadStatus::Rejected
            };
            h.history(
                &format!("low-{index}"),
                &center,
                "a-low",
                status,
                start() - Duration::days(1),
            );
        }

        assert_eq!(
            confirm_for_agent(&h, &center),
            AgentId(expected.to_string()),
            "method {}",
            method.label()
        );
    }
}

#[test]
fn manual_centers_are_never_auto_distributed() {
    let h = harness();
    let center = h.center(
        "cc-manual",
        DistributionMethod::Manual,
        DistributionTiming::OnConfirmation,
        &["a-1"],
    );
    let lead = h.confirmed(&center);
    assert!(lead.assigned_agent_id.is_none());
    assert_eq!(lead.status, LeadStatus::EmailConfirmed);

    let outcome = h.service.distribute(&lead.id).expect("distribution runs");
    assert_eq!(
        outcome,
        DistributionOutcome::Skipped {
            reason: SkipReason::ManualMethod
        }
    );
    assert!(h
        .store
        .unassigned_routable(None)
        .expect("scan")
        .is_empty());
}

#[test]
fn inactive_agents_are_never_selected() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1", "a-2"],
    );
    let mut away = agent_in(&center, "a-1");
    away.is_active = false;
    h.store.upsert_agent(away).expect("agent stored");

    for _ in 0..3 {
        assert_eq!(confirm_for_agent(&h, &center), AgentId("a-2".to_string()));
    }

    let mut gone = agent_in(&center, "a-2");
    gone.is_active = false;
    h.store.upsert_agent(gone).expect("agent stored");

    let (lead, token) = h.submit(&center);
    let outcome = h
        .service
        .confirm_email(&lead.id, &token)
        .expect("confirmation still succeeds");
    assert_eq!(outcome.distribution, Some(DistributionOutcome::NoEligibleAgent));
    let stored = h.stored(&lead.id);
    assert_eq!(stored.status, LeadStatus::EmailConfirmed);
    assert!(stored.assigned_agent_id.is_none());
}

#[test]
fn inactive_call_centers_hold_their_leads() {
    let h = harness();
    let center = CallCenterId("cc-closed".to_string());
    h.store
        .upsert_call_center(CallCenter {
            id: center.clone(),
            name: "closed floor".to_string(),
            distribution_method: DistributionMethod::RoundRobin,
            distribution_timing: DistributionTiming::OnConfirmation,
            is_active: false,
        })
        .expect("center stored");
    h.store
        .upsert_agent(agent_in(&center, "a-1"))
        .expect("agent stored");

    let lead = h.confirmed(&center);
    assert!(lead.assigned_agent_id.is_none());

    let outcome = h.service.distribute(&lead.id).expect("distribution runs");
    assert_eq!(
        outcome,
        DistributionOutcome::Skipped {
            reason: SkipReason::CallCenterInactive
        }
    );
}

#[test]
fn distributing_an_assigned_lead_is_skipped() {
    let h = harness();
    let center = h.center(
        "cc-north",
        DistributionMethod::RoundRobin,
        DistributionTiming::OnConfirmation,
        &["a-1", "a-2"],
    );
    let lead = h.confirmed(&center);
    let agent = lead.assigned_agent_id.clone();

    let outcome = h.service.distribute(&lead.id).expect("distribution runs");
    assert_eq!(
        outcome,
        DistributionOutcome::Skipped {
            reason: SkipReason::AlreadyAssigned
        }
    );
    assert_eq!(h.stored(&lead.id).assigned_agent_id, agent);
}
