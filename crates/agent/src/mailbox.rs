//! Agent mailbox - mpsc actor loop and the cloneable handle
//!
//! The handle is the only transport between the boundary, the orchestrator
//! and an agent. Dropping every handle closes the mailbox and ends the
//! agent task.

use crate::actor::PersonalAgent;
use shared::{
    AccordError, ActionKind, InfoQuery, PairingRequest, PairingResponse, Profile, Result,
    SetupRequest, Status, UserInformation,
};
use std::collections::BTreeMap;
use tokio::sync::{mpsc, oneshot};

const MAILBOX_CAPACITY: usize = 32;

/// Closed request enum; every variant carries its reply channel.
pub enum AgentMsg {
    Setup {
        request: SetupRequest,
        reply: oneshot::Sender<Status>,
    },
    EvaluatePairing {
        request: PairingRequest,
        reply: oneshot::Sender<PairingResponse>,
    },
    ChangeInformation {
        profile: Profile,
        reset_connections: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    Action {
        kind: ActionKind,
        reply: oneshot::Sender<Result<()>>,
    },
    GetInfo {
        kind: InfoQuery,
        reply: oneshot::Sender<UserInformation>,
    },
    UpdateOracles {
        updates: BTreeMap<String, bool>,
        reply: oneshot::Sender<Result<BTreeMap<String, bool>>>,
    },
}

/// Cloneable sender half of an agent's mailbox.
#[derive(Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentMsg>,
}

/// Spawns the actor loop for an agent and returns its handle.
pub fn spawn_agent_task(mut agent: PersonalAgent) -> AgentHandle {
    let (tx, mut rx) = mpsc::channel(MAILBOX_CAPACITY);
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            handle(&mut agent, msg).await;
        }
        tracing::debug!(agent = %agent.id(), "agent mailbox closed");
    });
    AgentHandle { tx }
}

async fn handle(agent: &mut PersonalAgent, msg: AgentMsg) {
    // A dropped reply receiver means the caller gave up; nothing to do.
    match msg {
        AgentMsg::Setup { request, reply } => {
            let _ = reply.send(agent.setup(request).await);
        }
        AgentMsg::EvaluatePairing { request, reply } => {
            let _ = reply.send(agent.evaluate_pairing(request).await);
        }
        AgentMsg::ChangeInformation {
            profile,
            reset_connections,
            reply,
        } => {
            let _ = reply.send(agent.change_information(profile, reset_connections).await);
        }
        AgentMsg::Action { kind, reply } => {
            let _ = reply.send(agent.apply_action(kind).await);
        }
        AgentMsg::GetInfo { kind, reply } => {
            let _ = reply.send(agent.get_info(kind));
        }
        AgentMsg::UpdateOracles { updates, reply } => {
            let _ = reply.send(agent.update_oracles(&updates));
        }
    }
}

impl AgentHandle {
    async fn request<T>(
        &self,
        msg: AgentMsg,
        rx: oneshot::Receiver<T>,
    ) -> Result<T> {
        self.tx
            .send(msg)
            .await
            .map_err(|_| AccordError::Transport("agent mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| AccordError::Transport("agent dropped the reply".to_string()))
    }

    pub async fn setup(&self, request: SetupRequest) -> Result<Status> {
        let (reply, rx) = oneshot::channel();
        self.request(AgentMsg::Setup { request, reply }, rx).await
    }

    pub async fn evaluate_pairing(&self, request: PairingRequest) -> Result<PairingResponse> {
        let (reply, rx) = oneshot::channel();
        self.request(AgentMsg::EvaluatePairing { request, reply }, rx)
            .await
    }

    pub async fn change_information(
        &self,
        profile: Profile,
        reset_connections: bool,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(
            AgentMsg::ChangeInformation {
                profile,
                reset_connections,
                reply,
            },
            rx,
        )
        .await?
    }

    pub async fn apply_action(&self, kind: ActionKind) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.request(AgentMsg::Action { kind, reply }, rx).await?
    }

    pub async fn get_info(&self, kind: InfoQuery) -> Result<UserInformation> {
        let (reply, rx) = oneshot::channel();
        self.request(AgentMsg::GetInfo { kind, reply }, rx).await
    }

    pub async fn update_oracles(
        &self,
        updates: BTreeMap<String, bool>,
    ) -> Result<BTreeMap<String, bool>> {
        let (reply, rx) = oneshot::channel();
        self.request(AgentMsg::UpdateOracles { updates, reply }, rx)
            .await?
    }
}
