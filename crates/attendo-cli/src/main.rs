use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use attendo_core::case::{CaseDecision, CaseStatus};
use attendo_core::evidence::EvidenceDir;
use attendo_core::gate::OperatorToken;
use attendo_core::store::{AttendanceStore, NewIdentity};
use attendo_core::types::{Embedding, EventKind, Identity, ShiftWindow};
use attendo_core::{Config, Kiosk};
use attendo_store_sqlite::SqliteStore;
use chrono::{Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "attendo", about = "Attendo face-recognition attendance CLI")]
struct Cli {
    /// SQLite database (overrides ATTENDO_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage shift windows
    Shift {
        #[command(subcommand)]
        command: ShiftCommand,
    },
    /// Manage groups
    Group {
        #[command(subcommand)]
        command: GroupCommand,
    },
    /// Manage roster identities
    Identity {
        #[command(subcommand)]
        command: IdentityCommand,
    },
    /// Enroll a face from two captures (embedding JSON files)
    Enroll {
        /// Personnel code
        code: String,
        first: PathBuf,
        second: PathBuf,
    },
    /// Submit a kiosk capture
    Punch {
        /// Embedding JSON file; omit for a capture with no face
        #[arg(long)]
        probe: Option<PathBuf>,
        /// Captured frame, kept with suspicious cases
        #[arg(long)]
        evidence: Option<PathBuf>,
        /// Capture time (YYYY-MM-DDTHH:MM:SS); defaults to now
        #[arg(long)]
        at: Option<NaiveDateTime>,
    },
    /// Review suspicious cases
    Cases {
        #[command(subcommand)]
        command: CasesCommand,
    },
    /// Record an event at an explicit time
    Manual {
        /// Personnel code of the employee
        code: String,
        /// in | out
        kind: EventKind,
        /// YYYY-MM-DDTHH:MM:SS
        at: NaiveDateTime,
        #[command(flatten)]
        operator: OperatorArgs,
    },
    /// Day summary for one employee
    Timesheet {
        code: String,
        /// YYYY-MM-DD; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show daemon status
    Status {
        /// Use the session bus instead of the system bus
        #[arg(long)]
        session: bool,
    },
}

#[derive(Subcommand)]
enum ShiftCommand {
    /// Add a shift, e.g. `attendo shift add Day 09:00-17:00`
    Add { name: String, window: ShiftWindow },
}

#[derive(Subcommand)]
enum GroupCommand {
    Add {
        name: String,
        #[arg(long)]
        shift: Option<Uuid>,
    },
}

#[derive(Subcommand)]
enum IdentityCommand {
    Add {
        code: String,
        name: String,
        /// Staff or manager; cannot punch at the kiosk
        #[arg(long)]
        privileged: bool,
        #[arg(long)]
        shift: Option<Uuid>,
        #[arg(long)]
        group: Option<Uuid>,
        #[arg(long)]
        image_url: Option<String>,
    },
    List,
}

#[derive(Subcommand)]
enum CasesCommand {
    List {
        /// pending | confirmed | ignored | fraud
        #[arg(long)]
        status: Option<CaseStatus>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Resolve {
        case_id: Uuid,
        /// confirmed | ignored | fraud
        decision: CaseDecision,
        #[command(flatten)]
        operator: OperatorArgs,
    },
}

/// A privileged operator and a live capture of their face.
#[derive(clap::Args)]
struct OperatorArgs {
    #[arg(long = "operator")]
    code: String,
    #[arg(long = "operator-probe")]
    probe: PathBuf,
}

#[zbus::proxy(
    interface = "org.attendo.Attendance1",
    default_service = "org.attendo.Attendance1",
    default_path = "/org/attendo/Attendance1"
)]
trait Attendance {
    fn status(&self) -> zbus::Result<String>;
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Commands::Status { session } = cli.command {
        return status(session).await;
    }

    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    config.validate()?;
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let kiosk =
        Kiosk::new(store, &config).with_evidence(EvidenceDir::new(&config.evidence_dir));
    let store = kiosk.store();

    match cli.command {
        Commands::Shift {
            command: ShiftCommand::Add { name, window },
        } => print_json(&store.add_shift(name, window).await?)?,
        Commands::Group {
            command: GroupCommand::Add { name, shift },
        } => print_json(&store.add_group(name, shift).await?)?,
        Commands::Identity { command } => match command {
            IdentityCommand::Add {
                code,
                name,
                privileged,
                shift,
                group,
                image_url,
            } => {
                let identity = store
                    .add_identity(NewIdentity {
                        code,
                        display_name: name,
                        is_privileged: privileged,
                        shift_id: shift,
                        group_id: group,
                        image_url,
                    })
                    .await?;
                print_json(&identity)?;
            }
            IdentityCommand::List => print_json(&store.list_identities().await?)?,
        },
        Commands::Enroll {
            code,
            first,
            second,
        } => {
            let identity = identity_by_code(store, &code).await?;
            let (first, second) = (read_probe(&first)?, read_probe(&second)?);
            let reference = kiosk
                .enroll(identity.identity_id, first.as_ref(), second.as_ref())
                .await?;
            println!(
                "Enrolled {} ({}), {} dimensions",
                identity.display_name,
                identity.code,
                reference.dimension()
            );
        }
        Commands::Punch {
            probe,
            evidence,
            at,
        } => {
            let probe = match probe {
                Some(path) => read_probe(&path)?,
                None => None,
            };
            let evidence = evidence
                .map(|path| {
                    std::fs::read(&path).with_context(|| format!("reading {}", path.display()))
                })
                .transpose()?;
            let reply = kiosk
                .punch(probe.as_ref(), evidence.as_deref(), at.unwrap_or_else(now))
                .await?;
            print_json(&reply)?;
        }
        Commands::Cases { command } => match command {
            CasesCommand::List { status, limit } => {
                print_json(&store.list_cases(status, limit).await?)?
            }
            CasesCommand::Resolve {
                case_id,
                decision,
                operator,
            } => {
                let token = verify_operator(&kiosk, &operator).await?;
                let resolution = kiosk.resolve_case(case_id, decision, token, now()).await?;
                print_json(&resolution)?;
            }
        },
        Commands::Manual {
            code,
            kind,
            at,
            operator,
        } => {
            let token = verify_operator(&kiosk, &operator).await?;
            let identity = identity_by_code(store, &code).await?;
            let event = kiosk
                .record_manual(&token, identity.identity_id, at, kind)
                .await?;
            print_json(&event)?;
        }
        Commands::Timesheet { code, date } => {
            let identity = identity_by_code(store, &code).await?;
            let date = date.unwrap_or_else(|| now().date());
            print_json(&kiosk.timesheet(identity.identity_id, date).await?)?;
        }
        Commands::Status { .. } => {}
    }

    Ok(())
}

async fn status(session: bool) -> Result<()> {
    let conn = if session {
        zbus::Connection::session().await?
    } else {
        zbus::Connection::system().await?
    };
    let proxy = AttendanceProxy::new(&conn)
        .await
        .context("attendod not reachable")?;
    println!("{}", proxy.status().await?);
    Ok(())
}

async fn verify_operator(
    kiosk: &Kiosk<SqliteStore>,
    operator: &OperatorArgs,
) -> Result<OperatorToken> {
    let probe = read_probe(&operator.probe)?.context("no face in operator capture")?;
    Ok(kiosk.verify_operator(&operator.code, &probe).await?)
}

async fn identity_by_code(store: &SqliteStore, code: &str) -> Result<Identity> {
    store
        .find_identity_by_code(code.to_string())
        .await?
        .with_context(|| format!("no identity with code {code:?}"))
}

/// `null` in the file stands for a capture with no face.
fn read_probe(path: &Path) -> Result<Option<Embedding>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing embedding {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}
