use clap::{Args, ValueEnum};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use leadflow::config::LeadConfig;
use leadflow::error::AppError;
use leadflow::leads::{
    Agent, AgentId, AgentOutcome, CallCenter, CallCenterId, DistributionMethod,
    DistributionTiming, InMemoryEventSink, InMemoryLeadStore, Lead, LeadLifecycleService,
    LeadRepository, LeadStatus, LifecycleSettings, NewLead,
};

use crate::infra::{persist_store, StoreLease};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum DemoMethod {
    Manual,
    RoundRobin,
    Weighted,
}

impl From<DemoMethod> for DistributionMethod {
    fn from(value: DemoMethod) -> Self {
        match value {
            DemoMethod::Manual => DistributionMethod::Manual,
            DemoMethod::RoundRobin => DistributionMethod::RoundRobin,
            DemoMethod::Weighted => DistributionMethod::Weighted,
        }
    }
}

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Number of active agents in the demo call center
    #[arg(long, default_value_t = 3)]
    pub(crate) agents: usize,
    /// Number of web form submissions to simulate
    #[arg(long, default_value_t = 6)]
    pub(crate) leads: usize,
    /// Distribution method for the demo call center
    #[arg(long, value_enum, default_value_t = DemoMethod::RoundRobin)]
    pub(crate) method: DemoMethod,
    /// Save the resulting store so the sweep commands can pick it up
    #[arg(long)]
    pub(crate) store: Option<PathBuf>,
}

/// Outcomes handed out in turn to the simulated calls.
const CALL_SCRIPT: [LeadStatus; 4] = [
    LeadStatus::Confirmed,
    LeadStatus::CallbackPending,
    LeadStatus::NoAnswer,
    LeadStatus::Rejected,
];

type DemoService = LeadLifecycleService<InMemoryLeadStore, InMemoryEventSink>;

pub(crate) fn run_demo(args: DemoArgs, config: &LeadConfig) -> Result<(), AppError> {
    let _lease = args.store.as_deref().map(StoreLease::acquire).transpose()?;
    let store = Arc::new(InMemoryLeadStore::default());
    let events = Arc::new(InMemoryEventSink::default());
    let service = LeadLifecycleService::new(
        store.clone(),
        events.clone(),
        LifecycleSettings::from(config),
    );
    let method = DistributionMethod::from(args.method);
    let center = seed_call_center(&store, method, args.agents)?;

    println!("Lead lifecycle demo");
    println!(
        "Call center {center} with {} agents, {} distribution",
        args.agents,
        method.label()
    );

    let mut leads = Vec::with_capacity(args.leads);
    for index in 0..args.leads {
        leads.push(submit_and_confirm(&service, &center, index)?);
    }

    let mut scripted = 0;
    for lead in leads.iter_mut() {
        if lead.assigned_agent_id.is_none() {
            continue;
        }
        let status = CALL_SCRIPT[scripted % CALL_SCRIPT.len()];
        scripted += 1;
        let outcome = AgentOutcome::new(status).with_comment(format!("demo call {scripted}"));
        *lead = service.apply_agent_outcome(&lead.id, outcome)?;
    }

    println!("\nLeads");
    for lead in &leads {
        println!(
            "- {:<38} {:<16} agent={:<10} score={}",
            lead.id.0,
            lead.status.label(),
            lead.assigned_agent_id
                .as_ref()
                .map(|agent| agent.0.as_str())
                .unwrap_or("-"),
            lead.score
        );
    }

    println!("\nAgents");
    for stats in store.agent_stats(&center)? {
        println!(
            "- {:<10} workload={} confirmed={}/{}",
            stats.agent.id.0, stats.workload, stats.confirmed, stats.total_assigned
        );
    }

    let mut kinds: BTreeMap<String, usize> = BTreeMap::new();
    for event in events.events() {
        *kinds.entry(format!("{:?}", event.kind)).or_default() += 1;
    }
    println!("\nLifecycle events");
    for (kind, count) in kinds {
        println!("- {kind}: {count}");
    }

    if let Some(path) = args.store {
        persist_store(&store, &path)?;
        println!("\nStore written to {}", path.display());
    }
    Ok(())
}

fn seed_call_center(
    store: &InMemoryLeadStore,
    method: DistributionMethod,
    agents: usize,
) -> Result<CallCenterId, AppError> {
    let center = CallCenterId("demo-center".to_string());
    store
        .upsert_call_center(CallCenter {
            id: center.clone(),
            name: "Demo call center".to_string(),
            distribution_method: method,
            distribution_timing: DistributionTiming::OnConfirmation,
            is_active: true,
        })?;

    for index in 1..=agents {
        store
            .upsert_agent(Agent {
                id: AgentId(format!("agent-{index}")),
                call_center_id: center.clone(),
                name: format!("Demo agent {index}"),
                is_active: true,
            })?;
    }
    Ok(center)
}

fn submit_and_confirm(
    service: &DemoService,
    center: &CallCenterId,
    index: usize,
) -> Result<Lead, AppError> {
    let mut data = BTreeMap::new();
    data.insert("name".to_string(), format!("Prospect {}", index + 1));
    data.insert("interest".to_string(), "heat pump".to_string());
    if index % 2 == 0 {
        data.insert("zip".to_string(), "50309".to_string());
    }

    let lead = service.create_lead(NewLead {
        form_id: None,
        call_center_id: Some(center.clone()),
        email: format!("prospect{}@example.com", index + 1),
        phone: (index % 3 != 0).then(|| format!("+1515555{:04}", index)),
        data,
    })?;

    let Some(token) = lead.confirmation_token.clone() else {
        return Ok(lead);
    };
    Ok(service.confirm_email(&lead.id, &token)?.lead)
}
