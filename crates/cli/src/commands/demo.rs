//! accord demo command
//!
//! Onboards four users with scripted oracles, runs the matching fan-out,
//! confirms the mutually accepted pairs on the users' behalf and prints the
//! resulting ledger.

use agent::AgentHandle;
use clap::Args;
use events::ProfileStore;
use oracle::{OracleRef, ScriptedOracle};
use orchestrator::{RelationReport, Runtime};
use shared::{
    AccordConfig, AgentId, FeedbackMessage, InfoQuery, Profile, RelationQuery, SetupRequest,
    SpotlightMode, Status,
};
use std::path::PathBuf;
use std::sync::Arc;

const USERS: [(&str, &str); 4] = [
    (
        "Alice",
        "I am Alice, an ETH student. I study computer science and I want to \
         connect to other students from ETH or workers from Big tech companies.",
    ),
    (
        "Bob",
        "I am Bob, an ETH student. I study cyber security and I want to connect \
         to other students with similar interests or that study in my same \
         university.",
    ),
    (
        "Charlie",
        "I am Charlie, a software engineer at Apple in Zurich. I previously \
         studied at Politecnico di Milano and I enjoy running, competitive \
         programming and studying artificial intelligence. I want to connect to \
         people with my same interests or from my same organization.",
    ),
    (
        "David",
        "I am David, a UZH Finance student. I really like studying finance, \
         especially personal finance. I like hiking and running. I want to \
         connect to other people from Zurich or with similar interests.",
    ),
];

#[derive(Debug, Args)]
pub struct DemoCommand {
    /// Where to persist the extracted profiles
    #[arg(long, default_value = "accord-profiles.json")]
    pub store: PathBuf,
}

impl DemoCommand {
    pub async fn run(&self) -> anyhow::Result<()> {
        let config = AccordConfig {
            primary_oracles: vec!["scripted".to_string()],
            spotlight: SpotlightMode::Delimiting,
            injection_screen: true,
            verify_responses: true,
            oracle_timeout_secs: 5,
            ..Default::default()
        };
        let scripted: OracleRef = Arc::new(ScriptedOracle::new());
        let runtime = Runtime::new(
            config,
            vec![("scripted".to_string(), scripted.clone())],
            scripted.clone(),
            scripted,
        )?;
        let mut store = ProfileStore::open(&self.store)?;

        println!("=== Onboarding ===");
        let mut handles: Vec<(AgentId, AgentHandle)> = Vec::new();
        for (name, content) in USERS {
            let id = AgentId::new(name);
            let handle = runtime.spawn_agent(id.clone()).await;
            let status = handle
                .setup(SetupRequest {
                    user: id.clone(),
                    content: content.to_string(),
                    default_policy_hint: 0,
                })
                .await?;
            println!("  {name}: setup {status:?}");
            if status == Status::Completed {
                self.persist_profile(&mut store, &id, &handle).await?;
            }
            handles.push((id, handle));
        }

        runtime.orchestrator().wait_until_idle().await;
        let orchestrator = runtime.orchestrator();

        println!("\n=== Negotiated ledger ===");
        if let RelationReport::Entries(entries) =
            orchestrator.query(RelationQuery::FullLedger).await
        {
            for (key, entry) in entries {
                println!("  {key}: {}", entry.agent_decision());
            }
        }

        println!("\n=== Users confirm their pending pairs ===");
        for (id, _) in &handles {
            let RelationReport::Agents(pending) = orchestrator
                .query(RelationQuery::PendingHumanApproval(id.clone()))
                .await
            else {
                continue;
            };
            for other in pending {
                println!("  {id} accepts the pairing with {other}");
                orchestrator
                    .submit_feedback(FeedbackMessage {
                        sender: id.clone(),
                        receiver: other,
                        accepted: true,
                    })
                    .await?;
            }
        }

        println!("\n=== Established relations ===");
        for (id, _) in &handles {
            if let RelationReport::Agents(established) = orchestrator
                .query(RelationQuery::Established(id.clone()))
                .await
            {
                let names: Vec<String> =
                    established.iter().map(|other| other.to_string()).collect();
                println!("  {id}: [{}]", names.join(", "));
            }
        }

        let stats = orchestrator.event_stats().await;
        println!(
            "\n{} events recorded, {} defensive refusals; profiles stored in {}",
            stats.total_entries,
            stats.defensive_refusals,
            self.store.display()
        );

        runtime.shutdown().await;
        Ok(())
    }

    async fn persist_profile(
        &self,
        store: &mut ProfileStore,
        id: &AgentId,
        handle: &AgentHandle,
    ) -> anyhow::Result<()> {
        let info = handle.get_info(InfoQuery::All).await?;
        let profile = Profile::new(
            info.public_information.unwrap_or_default(),
            info.private_information.unwrap_or_default(),
            info.policies.unwrap_or_default(),
        );
        store.save(id.clone(), profile)?;
        Ok(())
    }
}
