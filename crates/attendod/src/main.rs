use anyhow::Result;
use attendo_core::evidence::EvidenceDir;
use attendo_core::{Config, Kiosk};
use attendo_store_sqlite::SqliteStore;
use tracing_subscriber::EnvFilter;

mod dbus_interface;

use dbus_interface::AttendanceService;

const BUS_NAME: &str = "org.attendo.Attendance1";
const OBJECT_PATH: &str = "/org/attendo/Attendance1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("attendod starting");

    let config = Config::from_env();
    config.validate()?;

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = SqliteStore::open(&config.db_path).await?;
    tracing::info!(path = %config.db_path.display(), "database opened");

    let kiosk =
        Kiosk::new(store, &config).with_evidence(EvidenceDir::new(&config.evidence_dir));
    let service = AttendanceService::new(kiosk, &config);

    // ATTENDO_SESSION_BUS=1 runs on the session bus for development.
    let builder = if std::env::var("ATTENDO_SESSION_BUS").is_ok_and(|v| v == "1") {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(
        bus = BUS_NAME,
        confident = config.confident_max_distance,
        suspicious = config.suspicious_max_distance,
        cooldown_secs = config.cooldown_secs,
        "attendod ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("attendod shutting down");

    Ok(())
}
