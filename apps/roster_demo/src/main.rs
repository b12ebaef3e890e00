use std::{collections::HashMap, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use roster_core::{
    config::{load_settings, load_settings_from},
    OperationKind, OperationOutcome, RemoteClient, RosterCoordinator, RosterObserver,
    RosterSnapshot,
};
use shared::{
    domain::{ExternalUuid, GroupId, Member, MemberId},
    error::{ErrorCode, RemoteError},
    protocol::{CreateMemberRequest, RosterRequest, ServerMember},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    /// Settings file; defaults to ./roster.toml plus ROSTER__* overrides.
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON array of members to start from instead of the built-in roster.
    #[arg(long)]
    seed: Option<PathBuf>,
    #[arg(long, default_value_t = 150)]
    latency_ms: u64,
    #[arg(long, value_enum, default_value_t = FailureMode::None)]
    fail: FailureMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Delete {
        id: String,
    },
    Move {
        id: String,
        team: String,
    },
    Create {
        first_name: String,
        last_name: String,
        email: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long, default_value = "Engineering")]
        team: String,
    },
    /// Delete, move and create at once to show independent settlement.
    Burst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FailureMode {
    None,
    Network,
    Conflict,
    Reject,
}

struct SimulatedRemote {
    latency: Duration,
    fail: FailureMode,
}

impl SimulatedRemote {
    async fn settle(&self, request: RosterRequest) -> Result<(), RemoteError> {
        if let Ok(payload) = serde_json::to_string(&request) {
            debug!("remote: request payload={payload}");
        }
        tokio::time::sleep(self.latency).await;
        match self.fail {
            FailureMode::None => Ok(()),
            FailureMode::Network => Err(RemoteError::Network("connection reset by peer".into())),
            FailureMode::Conflict => Err(RemoteError::rejected(
                ErrorCode::Conflict,
                "a member with this email already exists",
            )),
            FailureMode::Reject => Err(RemoteError::rejected(
                ErrorCode::Forbidden,
                "you do not have permission to change this team",
            )),
        }
    }
}

#[async_trait]
impl RemoteClient for SimulatedRemote {
    async fn remove_member(&self, member_id: &MemberId) -> Result<(), RemoteError> {
        self.settle(RosterRequest::RemoveMember {
            member_id: member_id.clone(),
        })
        .await
    }

    async fn reassign_member(
        &self,
        external_uuid: &ExternalUuid,
        target_group_id: &GroupId,
    ) -> Result<(), RemoteError> {
        self.settle(RosterRequest::ReassignMember {
            external_uuid: external_uuid.clone(),
            target_group_id: target_group_id.clone(),
        })
        .await
    }

    async fn create_member(
        &self,
        request: &CreateMemberRequest,
    ) -> Result<ServerMember, RemoteError> {
        self.settle(RosterRequest::CreateMember(request.clone()))
            .await?;
        let uuid = uuid::Uuid::new_v4().to_string();
        let mut confirmed = ServerMember::confirmed(uuid.clone());
        confirmed.external_uuid = Some(ExternalUuid::new(uuid));
        Ok(confirmed)
    }
}

struct PrintingObserver;

impl RosterObserver for PrintingObserver {
    fn on_roster_changed(&self, snapshot: &RosterSnapshot) {
        match serde_json::to_string(&snapshot[..]) {
            Ok(json) => println!("roster {json}"),
            Err(err) => eprintln!("failed to encode roster snapshot: {err}"),
        }
    }

    fn on_operation_result(&self, kind: OperationKind, outcome: &OperationOutcome, message: &str) {
        let status = match outcome {
            OperationOutcome::Confirmed => "ok",
            OperationOutcome::RolledBack(_) => "rolled-back",
            OperationOutcome::Rejected(_) => "rejected",
        };
        println!("{kind} {status}: {message}");
    }

    fn on_member_moved(&self, member: &Member, target_group_id: &GroupId) {
        println!("moved {} -> {target_group_id}", member.id);
    }

    fn on_creation_dispatched(&self, temp_id: &MemberId) {
        println!("create dispatched as {temp_id}");
    }
}

fn seed_roster(path: Option<&PathBuf>) -> Result<Vec<Member>> {
    if let Some(path) = path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed roster '{}'", path.display()))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse seed roster '{}'", path.display()));
    }

    let seeded = [
        ("1", "Ada Lovelace", "ada@example.com", "admin", "Engineering", Some("u-ada")),
        ("2", "Grace Hopper", "grace@example.com", "member", "Engineering", Some("u-grace")),
        ("3", "Alan Kay", "alan@example.com", "member", "Design", None),
        ("4", "Barbara Liskov", "barbara@example.com", "member", "Engineering", Some("u-barbara")),
    ];
    Ok(seeded
        .into_iter()
        .map(|(id, name, email, role, team, uuid)| Member {
            id: MemberId::new(id),
            full_name: name.into(),
            email: email.into(),
            role: role.into(),
            team: team.into(),
            external_uuid: uuid.map(ExternalUuid::new),
        })
        .collect())
}

fn group_directory() -> HashMap<String, GroupId> {
    HashMap::from([
        ("Engineering".to_string(), GroupId::new("grp-eng")),
        ("Design".to_string(), GroupId::new("grp-design")),
        ("Platform".to_string(), GroupId::new("grp-platform")),
    ])
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => load_settings_from(path)?,
        None => load_settings(),
    };
    let remote = SimulatedRemote {
        latency: Duration::from_millis(cli.latency_ms),
        fail: cli.fail,
    };
    let coordinator = RosterCoordinator::new_with_settings(
        seed_roster(cli.seed.as_ref())?,
        Arc::new(remote),
        Arc::new(group_directory()),
        Arc::new(PrintingObserver),
        settings,
    )
    .context("seed roster contains duplicate member ids")?;

    match cli.command {
        Command::Delete { id } => {
            if let Err(err) = coordinator.delete_member(&MemberId::new(id)).await {
                println!("delete skipped: {err}");
            }
        }
        Command::Move { id, team } => {
            if let Err(err) = coordinator.move_member(&MemberId::new(id), &team).await {
                println!("move refused: {err}");
            }
        }
        Command::Create {
            first_name,
            last_name,
            email,
            role,
            team,
        } => {
            let request = CreateMemberRequest {
                first_name,
                last_name,
                email,
                role,
                team,
            };
            if let Err(err) = coordinator.create_member(request).await {
                println!("create refused: {err}");
            }
        }
        Command::Burst => {
            let grace = MemberId::new("2");
            let barbara = MemberId::new("4");
            let (deleted, moved, created) = futures::future::join3(
                coordinator.delete_member(&grace),
                coordinator.move_member(&barbara, "Platform"),
                coordinator.create_member(CreateMemberRequest {
                    first_name: "Edsger".into(),
                    last_name: "Dijkstra".into(),
                    email: "edsger@example.com".into(),
                    role: None,
                    team: "Engineering".into(),
                }),
            )
            .await;
            for result in [deleted, moved, created] {
                if let Err(err) = result {
                    println!("burst operation refused: {err}");
                }
            }
        }
    }

    let pending = coordinator.pending_operations().await;
    println!("pending operations: {pending}");
    Ok(())
}
