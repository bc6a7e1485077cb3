//! Vessel Daemon
//!
//! Provisions LXC containers on a Proxmox VE node in response to CI webhook
//! calls, tracks their lifecycle in local SQLite state, and brokers one-time
//! credential access to callers.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use vessel_crypto::{Vault, VaultConfig};
use vessel_daemon::provision::{Provisioner, ProvisionerConfig};
use vessel_daemon::proxmox::{CtDefaults, PollTimings, ProxmoxClient, ProxmoxConfig};
use vessel_daemon::server::{AppState, build_router};
use vessel_daemon::storage::{ContainerStore, Database};

#[derive(Parser, Debug)]
#[command(name = "vessel-daemon")]
#[command(version, about = "Vessel daemon - CI container provisioning on Proxmox VE")]
struct Args {
    /// TCP bind address
    #[arg(long, default_value = "127.0.0.1:8484", env = "VESSEL_ADDR")]
    addr: SocketAddr,

    /// Database file path
    #[arg(long, env = "VESSEL_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Proxmox API base URL (e.g. "<https://pve.internal:8006>")
    #[arg(long, env = "VESSEL_PVE_URL")]
    pve_url: String,

    /// Proxmox API token id (user@realm!tokenname)
    #[arg(long, env = "VESSEL_PVE_TOKEN_ID")]
    pve_token_id: String,

    /// Proxmox API token secret
    #[arg(long, env = "VESSEL_PVE_TOKEN_SECRET")]
    pve_token_secret: String,

    /// Proxmox node to provision containers on
    #[arg(long, default_value = "pve", env = "VESSEL_PVE_NODE")]
    pve_node: String,

    /// Accept the hypervisor's self-signed TLS certificate
    #[arg(long, env = "VESSEL_PVE_INSECURE_TLS")]
    pve_insecure_tls: bool,

    /// Per-request HTTP timeout against the hypervisor, in seconds
    #[arg(long, default_value_t = 30, env = "VESSEL_PVE_REQUEST_TIMEOUT")]
    pve_request_timeout: u64,

    /// Shared secret expected in the x-vessel-token webhook header
    #[arg(long, env = "VESSEL_WEBHOOK_TOKEN")]
    webhook_token: String,

    /// Key material for the credential vault
    #[arg(long, env = "VESSEL_VAULT_KEY")]
    vault_key: String,

    /// Default OS template for new containers
    #[arg(
        long,
        default_value = "local:vztmpl/debian-12-standard_12.7-1_amd64.tar.zst",
        env = "VESSEL_CT_TEMPLATE"
    )]
    ct_template: String,

    /// Default storage for container root volumes
    #[arg(long, default_value = "local-lvm", env = "VESSEL_CT_STORAGE")]
    ct_storage: String,

    /// Default network bridge
    #[arg(long, default_value = "vmbr0", env = "VESSEL_CT_BRIDGE")]
    ct_bridge: String,

    /// Default CPU cores
    #[arg(long, default_value_t = 2, env = "VESSEL_CT_CORES")]
    ct_cores: u32,

    /// Default memory in MiB
    #[arg(long, default_value_t = 2048, env = "VESSEL_CT_MEMORY_MB")]
    ct_memory_mb: u32,

    /// Default swap in MiB
    #[arg(long, default_value_t = 512, env = "VESSEL_CT_SWAP_MB")]
    ct_swap_mb: u32,

    /// Default root disk size in GiB
    #[arg(long, default_value_t = 8, env = "VESSEL_CT_DISK_GB")]
    ct_disk_gb: u32,

    /// Log level filter for the daemon (e.g. "info", "debug", "warn").
    #[arg(long, default_value = "info", env = "VESSEL_LOG_LEVEL")]
    log_level: String,

    /// Output logs as JSON (for structured log aggregation).
    #[arg(long, env = "VESSEL_LOG_JSON")]
    log_json: bool,

    /// Include full error text in HTTP error responses (development only)
    #[arg(long, env = "VESSEL_DEV_ERRORS")]
    dev_errors: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_filter = format!("vessel_daemon={}", args.log_level);
    vessel_core::tracing_init::init_tracing(&log_filter, args.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %args.addr,
        node = %args.pve_node,
        "Starting vessel-daemon"
    );

    anyhow::ensure!(
        !args.webhook_token.is_empty(),
        "webhook token must not be empty"
    );

    // Initialize database
    let db = if let Some(path) = &args.db_path {
        info!(path = %path.display(), "Opening database");
        Database::open(path).await?
    } else {
        let default_path = default_db_path()?;
        info!(path = %default_path.display(), "Opening database (default path)");
        Database::open(&default_path).await?
    };

    let vault = Arc::new(Vault::new(&VaultConfig {
        key_material: args.vault_key.clone(),
    })?);

    let client = Arc::new(ProxmoxClient::new(&ProxmoxConfig {
        base_url: args.pve_url.clone(),
        token_id: args.pve_token_id.clone(),
        token_secret: args.pve_token_secret.clone(),
        node: args.pve_node.clone(),
        insecure_tls: args.pve_insecure_tls,
        request_timeout: Duration::from_secs(args.pve_request_timeout),
        timings: PollTimings::default(),
        defaults: CtDefaults {
            ostemplate: args.ct_template.clone(),
            storage: args.ct_storage.clone(),
            bridge: args.ct_bridge.clone(),
            cores: args.ct_cores,
            memory_mb: args.ct_memory_mb,
            swap_mb: args.ct_swap_mb,
            disk_gb: args.ct_disk_gb,
            ..CtDefaults::default()
        },
    })?);

    let store = ContainerStore::new(db, vault);
    let provisioner = Arc::new(Provisioner::new(client, store, ProvisionerConfig::default()));

    let app = build_router(AppState {
        provisioner,
        webhook_token: args.webhook_token.clone(),
        dev_errors: args.dev_errors,
    });

    let listener = tokio::net::TcpListener::bind(args.addr).await?;

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    // Notify systemd that the daemon is ready to serve (unix only).
    #[cfg(unix)]
    sd_notify::notify(true, &[sd_notify::NotifyState::Ready])?;

    #[cfg(unix)]
    let sigterm_future = sigterm.recv();
    #[cfg(not(unix))]
    let sigterm_future = std::future::pending::<Option<()>>();

    info!(addr = %args.addr, "Webhook server ready");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C shutdown signal");
        }
        _ = sigterm_future => {
            info!("Received SIGTERM shutdown signal");
        }
    }

    info!("Daemon stopped");
    Ok(())
}

/// Default database path: ~/.vessel/vesseld.db
fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".vessel").join("vesseld.db"))
}
