//! Proxmox VE REST API client.
//!
//! Uses reqwest to drive the LXC container lifecycle: creation, asynchronous
//! task polling, runtime status polling, and two-strategy network address
//! resolution. The client is a stateless protocol adapter: it holds
//! connection configuration and nothing else, so concurrent provisioning
//! calls share one instance without contention.

use std::time::Duration;

use rand::Rng;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use vessel_core::poll::{PollConfig, PollError, PollStep, poll_until};

use super::types::{
    ApiResponse, CtConfig, CtStatus, GuestInterface, NetAddressing, TaskStatus,
    parse_net_addressing, pick_guest_ipv4,
};

/// vmid range used when the cluster id lookup fails.
const FALLBACK_VMID_RANGE: std::ops::RangeInclusive<u32> = 90_000..=99_999;

/// Proxmox API client errors.
#[derive(Debug, Error)]
pub enum HypervisorError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Proxmox API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Task {upid} failed with exit status {exit}")]
    TaskFailed { upid: String, exit: String },

    #[error("Task {upid} did not finish within {waited:?}")]
    TaskTimeout { upid: String, waited: Duration },

    #[error("Container {vmid} did not reach running within {waited:?}")]
    StartTimeout { vmid: u32, waited: Duration },

    #[error("Container creation failed: {0}")]
    Create(#[source] Box<HypervisorError>),
}

/// Polling cadences and deadlines for hypervisor operations.
#[derive(Debug, Clone, Copy)]
pub struct PollTimings {
    /// Sleep between task status probes.
    pub task_poll_interval: Duration,
    /// Ceiling on waiting for an asynchronous task to finish.
    pub task_deadline: Duration,
    /// Sleep between container status probes.
    pub status_poll_interval: Duration,
    /// Ceiling on waiting for a created container to reach running.
    pub status_deadline: Duration,
    /// Sleep after a transient polling error before retrying.
    pub transient_retry: Duration,
    /// Wait before the first address lookup, letting assignment propagate.
    pub address_grace: Duration,
}

impl Default for PollTimings {
    fn default() -> Self {
        Self {
            task_poll_interval: Duration::from_secs(2),
            task_deadline: Duration::from_secs(300),
            status_poll_interval: Duration::from_secs(3),
            status_deadline: Duration::from_secs(120),
            transient_retry: Duration::from_secs(5),
            address_grace: Duration::from_secs(5),
        }
    }
}

/// Daemon-level container defaults, merged under per-request values.
#[derive(Debug, Clone)]
pub struct CtDefaults {
    pub ostemplate: String,
    pub storage: String,
    pub bridge: String,
    pub cores: u32,
    pub memory_mb: u32,
    pub swap_mb: u32,
    pub disk_gb: u32,
    pub unprivileged: bool,
    pub start_on_create: bool,
    pub onboot: bool,
}

impl Default for CtDefaults {
    fn default() -> Self {
        Self {
            ostemplate: "local:vztmpl/debian-12-standard_12.7-1_amd64.tar.zst".into(),
            storage: "local-lvm".into(),
            bridge: "vmbr0".into(),
            cores: 2,
            memory_mb: 2048,
            swap_mb: 512,
            disk_gb: 8,
            unprivileged: true,
            start_on_create: true,
            onboot: false,
        }
    }
}

/// Caller-facing creation spec; unset fields fall back to [`CtDefaults`].
#[derive(Debug, Clone, Default)]
pub struct CtSpec {
    pub vmid: Option<u32>,
    pub hostname: String,
    pub password: String,
    pub ostemplate: Option<String>,
    pub cores: Option<u32>,
    pub memory_mb: Option<u32>,
    pub swap_mb: Option<u32>,
    pub disk_gb: Option<u32>,
    pub net_spec: Option<String>,
    pub unprivileged: Option<bool>,
    pub onboot: Option<bool>,
    /// Raw passthrough parameters for advanced hypervisor options; applied
    /// last, so they win over every resolved field.
    pub extra: Map<String, Value>,
}

/// Configuration for connecting to a Proxmox VE instance.
#[derive(Debug, Clone)]
pub struct ProxmoxConfig {
    /// API base URL (e.g. "<https://pve.internal:8006>").
    pub base_url: String,
    /// API token id (`user@realm!tokenname`).
    pub token_id: String,
    /// API token secret.
    pub token_secret: String,
    /// Node to provision containers on.
    pub node: String,
    /// Accept a self-signed hypervisor certificate.
    pub insecure_tls: bool,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub timings: PollTimings,
    pub defaults: CtDefaults,
}

/// Result of a successful container creation.
#[derive(Debug, Clone)]
pub struct CreatedContainer {
    pub vmid: u32,
    pub hostname: String,
    pub upid: String,
}

/// Proxmox VE REST API client.
#[derive(Debug)]
pub struct ProxmoxClient {
    http: reqwest::Client,
    base_url: String,
    node: String,
    timings: PollTimings,
    defaults: CtDefaults,
}

impl ProxmoxClient {
    /// Create a new Proxmox API client.
    pub fn new(config: &ProxmoxConfig) -> Result<Self, HypervisorError> {
        if config.base_url.is_empty() {
            return Err(HypervisorError::Config("base_url is empty".into()));
        }
        if config.token_id.is_empty() || config.token_secret.is_empty() {
            return Err(HypervisorError::Config("API token is empty".into()));
        }
        if config.node.is_empty() {
            return Err(HypervisorError::Config("node is empty".into()));
        }

        let mut headers = HeaderMap::new();
        let token_val = HeaderValue::from_str(&format!(
            "PVEAPIToken={}={}",
            config.token_id, config.token_secret
        ))
        .map_err(|_| HypervisorError::Config("Invalid token format".into()))?;
        headers.insert(AUTHORIZATION, token_val);

        // Ensure a TLS crypto provider is installed (reqwest uses rustls-no-provider).
        // The `Err` case just means it was already installed — safe to ignore.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.insecure_tls)
            .timeout(config.request_timeout)
            .build()?;

        let base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self {
            http,
            base_url,
            node: config.node.clone(),
            timings: config.timings,
            defaults: config.defaults.clone(),
        })
    }

    /// Build the `/api2/json` URL for a given path.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/api2/json{}", self.base_url, path)
    }

    /// Check HTTP response status, returning error for non-success codes.
    fn check_status(resp: &reqwest::Response) -> Result<(), HypervisorError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(HypervisorError::Api {
                status: status.as_u16(),
                message: status.canonical_reason().unwrap_or("Unknown").into(),
            });
        }
        Ok(())
    }

    /// GET a `data`-wrapped payload.
    async fn get_data<T: DeserializeOwned>(&self, url: &str) -> Result<T, HypervisorError> {
        let resp = self.http.get(url).send().await?;
        Self::check_status(&resp)?;
        let body: ApiResponse<T> = resp.json().await?;
        Ok(body.data)
    }

    /// POST a JSON body, returning the `data`-wrapped payload.
    async fn post_data<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &Map<String, Value>,
    ) -> Result<T, HypervisorError> {
        let resp = self.http.post(url).json(body).send().await?;
        Self::check_status(&resp)?;
        let body: ApiResponse<T> = resp.json().await?;
        Ok(body.data)
    }

    /// Ask the cluster for the next free vmid, falling back to a
    /// pseudo-random id in the reserved range on any failure.
    ///
    /// The fallback is best effort, not a uniqueness guarantee: a collision
    /// surfaces as a creation failure, not here.
    pub async fn next_available_id(&self) -> u32 {
        match self
            .get_data::<String>(&self.api_url("/cluster/nextid"))
            .await
        {
            Ok(raw) => raw.parse::<u32>().unwrap_or_else(|_| {
                warn!(raw = %raw, "Cluster returned unparseable vmid, generating local id");
                fallback_vmid()
            }),
            Err(e) => {
                warn!(error = %e, "Cluster vmid lookup failed, generating local id");
                fallback_vmid()
            }
        }
    }

    /// Create an LXC container and wait for it to be running.
    ///
    /// Submission returns an opaque task reference, not readiness: the call
    /// polls the task to completion, then polls the container status until
    /// it is running. Either the whole sequence succeeds or the call fails
    /// as a whole; there is no rollback, so a failed call may leave the
    /// container on the hypervisor in an undefined state.
    pub async fn create_container(
        &self,
        spec: CtSpec,
    ) -> Result<CreatedContainer, HypervisorError> {
        let vmid = match spec.vmid {
            Some(id) => id,
            None => self.next_available_id().await,
        };
        let hostname = spec.hostname.clone();
        let params = resolve_create_params(vmid, &spec, &self.defaults);

        let url = self.api_url(&format!("/nodes/{}/lxc", self.node));
        let upid: String = self
            .post_data(&url, &params)
            .await
            .map_err(|e| HypervisorError::Create(Box::new(e)))?;

        info!(vmid, upid = %upid, "Container creation submitted");

        self.wait_for_task(&upid, self.timings.task_deadline)
            .await
            .map_err(|e| HypervisorError::Create(Box::new(e)))?;
        self.wait_for_running(vmid, self.timings.status_deadline)
            .await
            .map_err(|e| HypervisorError::Create(Box::new(e)))?;

        Ok(CreatedContainer {
            vmid,
            hostname,
            upid,
        })
    }

    /// Poll an asynchronous task until it stops.
    ///
    /// A stopped task with exit status "0" is success; any other exit status
    /// is terminal failure, reported immediately. Transient polling errors
    /// are retried and only surface if `max_wait` elapses first.
    pub async fn wait_for_task(
        &self,
        upid: &str,
        max_wait: Duration,
    ) -> Result<(), HypervisorError> {
        let url = self.api_url(&format!("/nodes/{}/tasks/{}/status", self.node, upid));
        let config = PollConfig {
            interval: self.timings.task_poll_interval,
            retry_delay: self.timings.transient_retry,
            deadline: max_wait,
        };

        let result = poll_until(config, || {
            let url = url.clone();
            let upid = upid.to_string();
            async move {
                match self.get_data::<TaskStatus>(&url).await {
                    Ok(task) => classify_task(&upid, &task),
                    Err(e) => PollStep::Transient(e),
                }
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::Aborted(e)) => Err(e),
            Err(PollError::DeadlineExceeded { waited }) => Err(HypervisorError::TaskTimeout {
                upid: upid.to_string(),
                waited,
            }),
        }
    }

    /// Poll a container's runtime status until it is running.
    pub async fn wait_for_running(
        &self,
        vmid: u32,
        max_wait: Duration,
    ) -> Result<(), HypervisorError> {
        let url = self.api_url(&format!("/nodes/{}/lxc/{vmid}/status/current", self.node));
        let config = PollConfig {
            interval: self.timings.status_poll_interval,
            retry_delay: self.timings.transient_retry,
            deadline: max_wait,
        };

        let result = poll_until(config, || {
            let url = url.clone();
            async move {
                match self.get_data::<CtStatus>(&url).await {
                    Ok(ct) if ct.status == "running" => PollStep::Ready(()),
                    Ok(_) => PollStep::Pending,
                    Err(e) => PollStep::Transient(e),
                }
            }
        })
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::Aborted(e)) => Err(e),
            Err(PollError::DeadlineExceeded { waited }) => {
                Err(HypervisorError::StartTimeout { vmid, waited })
            }
        }
    }

    /// Best-effort network address resolution; `None` means "not yet known".
    ///
    /// Strategy one reads the declared `net0` config: a static address is
    /// returned directly, routing prefix stripped. Strategy two asks the
    /// in-guest agent for live interfaces and takes the primary interface's
    /// first non-loopback IPv4. Either strategy failing degrades to `None`,
    /// never to an error, and callers may retry later.
    pub async fn resolve_address(&self, vmid: u32) -> Option<String> {
        tokio::time::sleep(self.timings.address_grace).await;

        let config_url = self.api_url(&format!("/nodes/{}/lxc/{vmid}/config", self.node));
        let config = match self.get_data::<CtConfig>(&config_url).await {
            Ok(c) => c,
            Err(e) => {
                debug!(vmid, error = %e, "Container config lookup failed");
                return None;
            }
        };

        if let Some(net0) = config.net0.as_deref()
            && let NetAddressing::Static(addr) = parse_net_addressing(net0)
        {
            return Some(addr);
        }

        let agent_url = self.api_url(&format!("/nodes/{}/lxc/{vmid}/interfaces", self.node));
        match self.get_data::<Vec<GuestInterface>>(&agent_url).await {
            Ok(interfaces) => pick_guest_ipv4(&interfaces),
            Err(e) => {
                debug!(vmid, error = %e, "Guest interface query failed");
                None
            }
        }
    }

    /// Current runtime status of a container.
    ///
    /// Unlike address resolution this propagates lookup failures: an unknown
    /// container is actionable by the caller, a missing address is not.
    pub async fn container_status(&self, vmid: u32) -> Result<String, HypervisorError> {
        let url = self.api_url(&format!("/nodes/{}/lxc/{vmid}/status/current", self.node));
        Ok(self.get_data::<CtStatus>(&url).await?.status)
    }
}

/// Map a task status report onto a polling step.
pub(crate) fn classify_task(upid: &str, task: &TaskStatus) -> PollStep<(), HypervisorError> {
    if task.status != "stopped" {
        return PollStep::Pending;
    }
    match task.exitstatus.as_deref() {
        Some("0") => PollStep::Ready(()),
        exit => PollStep::Abort(HypervisorError::TaskFailed {
            upid: upid.to_string(),
            exit: exit.unwrap_or("unknown").to_string(),
        }),
    }
}

/// Merge one creation spec over the daemon defaults into the request body.
///
/// Precedence per field: caller value, then daemon default, then the
/// hardcoded fallback baked into `CtDefaults::default()`. `extra`
/// passthrough keys are applied last and win over everything.
pub(crate) fn resolve_create_params(
    vmid: u32,
    spec: &CtSpec,
    defaults: &CtDefaults,
) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("vmid".into(), vmid.into());
    params.insert("hostname".into(), spec.hostname.clone().into());
    params.insert("password".into(), spec.password.clone().into());
    params.insert(
        "ostemplate".into(),
        spec.ostemplate
            .clone()
            .unwrap_or_else(|| defaults.ostemplate.clone())
            .into(),
    );
    params.insert("cores".into(), spec.cores.unwrap_or(defaults.cores).into());
    params.insert(
        "memory".into(),
        spec.memory_mb.unwrap_or(defaults.memory_mb).into(),
    );
    params.insert("swap".into(), spec.swap_mb.unwrap_or(defaults.swap_mb).into());
    params.insert(
        "rootfs".into(),
        format!(
            "{}:{}",
            defaults.storage,
            spec.disk_gb.unwrap_or(defaults.disk_gb)
        )
        .into(),
    );
    params.insert(
        "net0".into(),
        spec.net_spec
            .clone()
            .unwrap_or_else(|| format!("name=eth0,bridge={},ip=dhcp", defaults.bridge))
            .into(),
    );
    // Proxmox encodes booleans as 0/1 integers.
    params.insert(
        "unprivileged".into(),
        u8::from(spec.unprivileged.unwrap_or(defaults.unprivileged)).into(),
    );
    params.insert(
        "onboot".into(),
        u8::from(spec.onboot.unwrap_or(defaults.onboot)).into(),
    );
    params.insert("start".into(), u8::from(defaults.start_on_create).into());

    for (key, value) in &spec.extra {
        params.insert(key.clone(), value.clone());
    }
    params
}

/// Locally generated vmid in the reserved fallback range.
pub(crate) fn fallback_vmid() -> u32 {
    rand::thread_rng().gen_range(FALLBACK_VMID_RANGE)
}
