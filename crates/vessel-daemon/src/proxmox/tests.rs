//! Tests for the Proxmox API client and types.

#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use vessel_core::poll::PollStep;

use super::client::{
    CtDefaults, CtSpec, HypervisorError, PollTimings, ProxmoxClient, ProxmoxConfig, classify_task,
    fallback_vmid, resolve_create_params,
};
use super::types::{
    CtConfig, CtStatus, GuestInterface, NetAddressing, TaskStatus, parse_net_addressing,
    pick_guest_ipv4,
};

fn test_config() -> ProxmoxConfig {
    ProxmoxConfig {
        base_url: "https://pve.internal:8006".into(),
        token_id: "ci@pam!vessel".into(),
        token_secret: "4f6c1f2a-test-token".into(),
        node: "pve".into(),
        insecure_tls: false,
        request_timeout: Duration::from_secs(30),
        timings: PollTimings::default(),
        defaults: CtDefaults::default(),
    }
}

// =============================================================================
// Client construction tests
// =============================================================================

#[test]
fn empty_base_url_returns_config_error() {
    let mut config = test_config();
    config.base_url = String::new();
    let err = ProxmoxClient::new(&config).unwrap_err();
    assert!(matches!(err, HypervisorError::Config(_)));
}

#[test]
fn empty_token_returns_config_error() {
    let mut config = test_config();
    config.token_secret = String::new();
    let err = ProxmoxClient::new(&config).unwrap_err();
    assert!(matches!(err, HypervisorError::Config(_)));
}

#[test]
fn empty_node_returns_config_error() {
    let mut config = test_config();
    config.node = String::new();
    let err = ProxmoxClient::new(&config).unwrap_err();
    assert!(matches!(err, HypervisorError::Config(_)));
}

#[test]
fn valid_config_creates_client() {
    assert!(ProxmoxClient::new(&test_config()).is_ok());
}

#[test]
fn trailing_slash_stripped_from_base_url() {
    let mut config = test_config();
    config.base_url = "https://pve.internal:8006/".into();
    let client = ProxmoxClient::new(&config).unwrap();
    let url = client.api_url("/cluster/nextid");
    assert_eq!(url, "https://pve.internal:8006/api2/json/cluster/nextid");
}

#[test]
fn api_url_constructed_correctly() {
    let client = ProxmoxClient::new(&test_config()).unwrap();
    assert_eq!(
        client.api_url("/nodes/pve/lxc/101/status/current"),
        "https://pve.internal:8006/api2/json/nodes/pve/lxc/101/status/current"
    );
}

// =============================================================================
// Default timings encode the polling protocol
// =============================================================================

#[test]
fn default_timings_match_protocol() {
    let timings = PollTimings::default();
    assert_eq!(timings.task_poll_interval, Duration::from_secs(2));
    assert_eq!(timings.task_deadline, Duration::from_secs(300));
    assert_eq!(timings.status_poll_interval, Duration::from_secs(3));
    assert_eq!(timings.status_deadline, Duration::from_secs(120));
    assert_eq!(timings.transient_retry, Duration::from_secs(5));
    assert_eq!(timings.address_grace, Duration::from_secs(5));
}

// =============================================================================
// Task classification
// =============================================================================

#[test]
fn running_task_is_pending() {
    let task = TaskStatus {
        status: "running".into(),
        exitstatus: None,
    };
    assert!(matches!(
        classify_task("UPID:pve:1", &task),
        PollStep::Pending
    ));
}

#[test]
fn stopped_task_with_zero_exit_is_ready() {
    let task = TaskStatus {
        status: "stopped".into(),
        exitstatus: Some("0".into()),
    };
    assert!(matches!(
        classify_task("UPID:pve:1", &task),
        PollStep::Ready(())
    ));
}

#[test]
fn stopped_task_with_nonzero_exit_aborts() {
    let task = TaskStatus {
        status: "stopped".into(),
        exitstatus: Some("1".into()),
    };
    match classify_task("UPID:pve:1", &task) {
        PollStep::Abort(HypervisorError::TaskFailed { upid, exit }) => {
            assert_eq!(upid, "UPID:pve:1");
            assert_eq!(exit, "1");
        }
        other => panic!("expected TaskFailed abort, got {other:?}"),
    }
}

#[test]
fn stopped_task_without_exit_status_aborts() {
    let task = TaskStatus {
        status: "stopped".into(),
        exitstatus: None,
    };
    match classify_task("UPID:pve:1", &task) {
        PollStep::Abort(HypervisorError::TaskFailed { exit, .. }) => {
            assert_eq!(exit, "unknown");
        }
        other => panic!("expected TaskFailed abort, got {other:?}"),
    }
}

// =============================================================================
// Creation parameter resolution
// =============================================================================

fn base_spec() -> CtSpec {
    CtSpec {
        hostname: "ci-01".into(),
        password: "generated-pw".into(),
        ..CtSpec::default()
    }
}

#[test]
fn defaults_fill_unset_fields() {
    let params = resolve_create_params(101, &base_spec(), &CtDefaults::default());
    assert_eq!(params["vmid"], 101);
    assert_eq!(params["hostname"], "ci-01");
    assert_eq!(params["password"], "generated-pw");
    assert_eq!(params["cores"], 2);
    assert_eq!(params["memory"], 2048);
    assert_eq!(params["swap"], 512);
    assert_eq!(params["rootfs"], "local-lvm:8");
    assert_eq!(params["net0"], "name=eth0,bridge=vmbr0,ip=dhcp");
    assert_eq!(params["unprivileged"], 1);
    assert_eq!(params["onboot"], 0);
    assert_eq!(params["start"], 1);
}

#[test]
fn caller_values_win_over_defaults() {
    let mut spec = base_spec();
    spec.cores = Some(8);
    spec.memory_mb = Some(8192);
    spec.disk_gb = Some(32);
    spec.net_spec = Some("name=eth0,bridge=vmbr1,ip=10.0.0.5/24".into());
    spec.unprivileged = Some(false);

    let params = resolve_create_params(101, &spec, &CtDefaults::default());
    assert_eq!(params["cores"], 8);
    assert_eq!(params["memory"], 8192);
    assert_eq!(params["rootfs"], "local-lvm:32");
    assert_eq!(params["net0"], "name=eth0,bridge=vmbr1,ip=10.0.0.5/24");
    assert_eq!(params["unprivileged"], 0);
    // Untouched fields still come from defaults.
    assert_eq!(params["swap"], 512);
}

#[test]
fn extra_passthrough_wins_over_everything() {
    let mut spec = base_spec();
    spec.cores = Some(4);
    spec.extra
        .insert("features".into(), "nesting=1".into());
    spec.extra.insert("cores".into(), 16.into());

    let params = resolve_create_params(101, &spec, &CtDefaults::default());
    assert_eq!(params["features"], "nesting=1");
    assert_eq!(params["cores"], 16);
}

#[test]
fn fallback_vmid_stays_in_reserved_range() {
    for _ in 0..100 {
        let id = fallback_vmid();
        assert!((90_000..=99_999).contains(&id), "out of range: {id}");
    }
}

// =============================================================================
// net0 parsing
// =============================================================================

#[test]
fn static_ip_is_parsed_and_prefix_stripped() {
    assert_eq!(
        parse_net_addressing("name=eth0,bridge=vmbr0,ip=10.0.0.5/24"),
        NetAddressing::Static("10.0.0.5".into())
    );
}

#[test]
fn static_ip_without_prefix_is_parsed() {
    assert_eq!(
        parse_net_addressing("ip=192.168.7.9,gw=192.168.7.1"),
        NetAddressing::Static("192.168.7.9".into())
    );
}

#[test]
fn dhcp_is_dynamic() {
    assert_eq!(
        parse_net_addressing("name=eth0,bridge=vmbr0,ip=dhcp"),
        NetAddressing::Dynamic
    );
}

#[test]
fn missing_ip_key_is_dynamic() {
    assert_eq!(
        parse_net_addressing("name=eth0,bridge=vmbr0"),
        NetAddressing::Dynamic
    );
}

// =============================================================================
// Guest interface scanning
// =============================================================================

fn iface(name: &str, addrs: &[(&str, &str)]) -> GuestInterface {
    serde_json::from_value(serde_json::json!({
        "name": name,
        "ip-addresses": addrs
            .iter()
            .map(|(ip, ty)| serde_json::json!({"ip-address": ip, "ip-address-type": ty}))
            .collect::<Vec<_>>(),
    }))
    .unwrap()
}

#[test]
fn primary_interface_first_ipv4_wins() {
    let interfaces = vec![
        iface("lo", &[("127.0.0.1", "ipv4")]),
        iface("eth0", &[("fe80::1", "ipv6"), ("192.168.1.50", "ipv4")]),
    ];
    assert_eq!(pick_guest_ipv4(&interfaces).as_deref(), Some("192.168.1.50"));
}

#[test]
fn loopback_addresses_are_skipped() {
    let interfaces = vec![iface("eth0", &[("127.0.0.1", "ipv4")])];
    assert_eq!(pick_guest_ipv4(&interfaces), None);
}

#[test]
fn falls_back_to_first_non_lo_interface() {
    let interfaces = vec![
        iface("lo", &[("127.0.0.1", "ipv4")]),
        iface("ens18", &[("10.1.2.3", "ipv4")]),
    ];
    assert_eq!(pick_guest_ipv4(&interfaces).as_deref(), Some("10.1.2.3"));
}

#[test]
fn no_interfaces_yields_none() {
    assert_eq!(pick_guest_ipv4(&[]), None);
    let only_lo = vec![iface("lo", &[("127.0.0.1", "ipv4")])];
    assert_eq!(pick_guest_ipv4(&only_lo), None);
}

// =============================================================================
// Deserialization tests
// =============================================================================

#[test]
fn deserialize_task_status_running() {
    let json = r#"{"status": "running", "type": "vzcreate", "node": "pve"}"#;
    let task: TaskStatus = serde_json::from_str(json).unwrap();
    assert_eq!(task.status, "running");
    assert!(task.exitstatus.is_none());
}

#[test]
fn deserialize_task_status_stopped() {
    let json = r#"{"status": "stopped", "exitstatus": "0"}"#;
    let task: TaskStatus = serde_json::from_str(json).unwrap();
    assert_eq!(task.status, "stopped");
    assert_eq!(task.exitstatus.as_deref(), Some("0"));
}

#[test]
fn deserialize_ct_status() {
    let json = r#"{"status": "running", "vmid": 101, "uptime": 42}"#;
    let ct: CtStatus = serde_json::from_str(json).unwrap();
    assert_eq!(ct.status, "running");
}

#[test]
fn deserialize_ct_config() {
    let json = r#"{
        "hostname": "ci-01",
        "net0": "name=eth0,bridge=vmbr0,ip=dhcp",
        "cores": 2,
        "memory": 2048
    }"#;
    let config: CtConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.hostname.as_deref(), Some("ci-01"));
    assert_eq!(
        config.net0.as_deref(),
        Some("name=eth0,bridge=vmbr0,ip=dhcp")
    );
}

#[test]
fn deserialize_ct_config_minimal() {
    let config: CtConfig = serde_json::from_str("{}").unwrap();
    assert!(config.hostname.is_none());
    assert!(config.net0.is_none());
}

#[test]
fn deserialize_guest_interfaces() {
    let json = r#"[
        {"name": "lo", "ip-addresses": [{"ip-address": "127.0.0.1", "ip-address-type": "ipv4"}]},
        {"name": "eth0", "ip-addresses": [{"ip-address": "192.168.1.50", "ip-address-type": "ipv4"}]},
        {"name": "dummy0"}
    ]"#;
    let interfaces: Vec<GuestInterface> = serde_json::from_str(json).unwrap();
    assert_eq!(interfaces.len(), 3);
    assert_eq!(interfaces[1].ip_addresses[0].ip_address, "192.168.1.50");
    assert!(interfaces[2].ip_addresses.is_empty());
}

// =============================================================================
// Error display tests
// =============================================================================

#[test]
fn hypervisor_error_display_api() {
    let err = HypervisorError::Api {
        status: 401,
        message: "Unauthorized".into(),
    };
    assert_eq!(err.to_string(), "Proxmox API error (401): Unauthorized");
}

#[test]
fn hypervisor_error_display_task_failed() {
    let err = HypervisorError::TaskFailed {
        upid: "UPID:pve:1".into(),
        exit: "1".into(),
    };
    assert_eq!(err.to_string(), "Task UPID:pve:1 failed with exit status 1");
}

#[test]
fn creation_error_wraps_cause() {
    let err = HypervisorError::Create(Box::new(HypervisorError::TaskFailed {
        upid: "UPID:pve:1".into(),
        exit: "255".into(),
    }));
    let text = err.to_string();
    assert!(text.starts_with("Container creation failed"));
    assert!(text.contains("exit status 255"));
}
