//! Integration tests for configuration synthesis and projection.

use std::collections::BTreeMap;
use std::path::PathBuf;

use keel::config::{EngineConfig, Synthesizer};
use keel::environment::HostEnv;
use keel::lookup::{ContainerRegistry, PeerContainer};
use keel::namespace::{NamespaceKind, NamespaceMode};
use keel::network::{PortKey, Protocol};
use keel::options::CreateOptions;
use keel::projection::project;
use keel::security::{self, SecurityRequest, SelinuxPolicy};
use keel_common::{ErrorKind, KeelPaths, KeelResult};
use keel_oci::ImageMetadata;
use proptest::prelude::*;
use tempfile::TempDir;

fn engine() -> EngineConfig {
    EngineConfig::default().with_paths(
        KeelPaths::new().with_seccomp("/nonexistent/keel/override.json", "/nonexistent/keel/default.json"),
    )
}

fn registry() -> ContainerRegistry {
    ContainerRegistry::from_peers([PeerContainer {
        id: "4f2a9c01".to_string(),
        name: "db".to_string(),
        process_label: "system_u:system_r:container_t:s0:c10,c20".to_string(),
        mount_label: "system_u:object_r:container_file_t:s0:c10,c20".to_string(),
        shm_dir: PathBuf::from("/var/lib/keel/4f2a9c01/shm"),
    }])
}

fn image() -> ImageMetadata {
    ImageMetadata::new("sha256:9f1c", "docker.io/library/nginx:latest")
        .with_entrypoint(["/docker-entrypoint.sh"])
        .with_cmd(["nginx", "-g", "daemon off;"])
        .with_exposed_port("80/tcp")
}

fn synthesize_with(engine: &EngineConfig, opts: &CreateOptions) -> KeelResult<keel::Synthesis> {
    let registry = registry();
    Synthesizer::new(engine, &registry)
        .with_host_env(HostEnv::Fixed(BTreeMap::new()))
        .synthesize(opts, &image())
}

fn synthesize(opts: &CreateOptions) -> KeelResult<keel::Synthesis> {
    synthesize_with(&engine(), opts)
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

#[test_log::test]
fn invalid_namespace_mode_is_syntax_error() {
    for (field, value) in [("pid", "bogus"), ("ipc", "container:"), ("uts", "ns:relative"), ("userns", "shareable")] {
        let mut opts = CreateOptions::default();
        match field {
            "pid" => opts.pid = value.to_string(),
            "ipc" => opts.ipc = value.to_string(),
            "uts" => opts.uts = value.to_string(),
            _ => opts.userns = value.to_string(),
        }
        let err = synthesize(&opts).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSyntax, "{field}={value}");
    }
}

#[test_log::test]
fn no_new_privileges_in_any_position() {
    let orders = [
        strings(&["no-new-privileges", "apparmor=unconfined", "label=disable"]),
        strings(&["apparmor=unconfined", "no-new-privileges", "label=disable"]),
        strings(&["apparmor=unconfined", "label=disable", "no-new-privileges"]),
    ];
    for security_opt in orders {
        let opts = CreateOptions {
            security_opt,
            ..CreateOptions::default()
        };
        let config = synthesize(&opts).unwrap().config;
        assert!(config.security.no_new_privileges);
        assert_eq!(config.security.apparmor_profile.as_deref(), Some("unconfined"));
    }
}

#[test_log::test]
fn privileged_overrides_security_options() {
    let opts = CreateOptions {
        privileged: true,
        security_opt: strings(&["label=type:spc_t", "seccomp=/tmp/profile.json", "no-new-privileges"]),
        cap_drop: strings(&["ALL"]),
        ..CreateOptions::default()
    };
    let config = synthesize(&opts).unwrap().config;
    assert_eq!(config.security, keel::security::SecurityConfig::privileged());
}

#[test_log::test]
fn memory_sizes() {
    let opts = CreateOptions {
        memory: "256MiB".to_string(),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&opts).unwrap().config.resources.memory, 268_435_456);
    assert_eq!(synthesize(&CreateOptions::default()).unwrap().config.resources.memory, 0);
}

#[test_log::test]
fn cpu_period_and_cpus_are_exclusive() {
    let both = CreateOptions {
        cpu_period: 100_000,
        cpus: 1.0,
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&both).unwrap_err().kind(), ErrorKind::ConflictingOptions);

    let period = CreateOptions {
        cpu_period: 100_000,
        ..CreateOptions::default()
    };
    assert!(synthesize(&period).is_ok());

    let cpus = CreateOptions {
        cpus: 1.0,
        ..CreateOptions::default()
    };
    assert!(synthesize(&cpus).is_ok());
}

#[test_log::test]
fn entrypoint_and_command() {
    let config = synthesize(&CreateOptions::default()).unwrap().config;
    assert_eq!(
        config.command.command,
        strings(&["/docker-entrypoint.sh", "nginx", "-g", "daemon off;"])
    );

    let opts = CreateOptions {
        entrypoint: Some(strings(&["/bin/sh"])),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&opts).unwrap().config.command.command, strings(&["/bin/sh"]));

    let opts = CreateOptions {
        entrypoint: Some(strings(&[""])),
        command: strings(&["ls", "-l"]),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&opts).unwrap().config.command.command, strings(&["ls", "-l"]));

    let opts = CreateOptions {
        entrypoint: Some(strings(&[""])),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&opts).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test_log::test]
fn published_image_port_has_one_entry() {
    let opts = CreateOptions {
        publish: strings(&["8080:80"]),
        ..CreateOptions::default()
    };
    let config = synthesize(&opts).unwrap().config;
    assert_eq!(config.network.ports.len(), 1);
    let bindings = config.network.ports.get(&PortKey::new(80, Protocol::Tcp)).unwrap();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].host_port, Some(8080));
}

#[test_log::test]
fn missing_peer_is_not_found() {
    let opts = CreateOptions {
        pid: "container:ghost".to_string(),
        ..CreateOptions::default()
    };
    let err = synthesize(&opts).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("ghost"));

    // The security resolver is never reached: a missing peer surfaces
    // before any label work, even with invalid security options.
    let opts = CreateOptions {
        pid: "container:ghost".to_string(),
        security_opt: strings(&["bogus"]),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&opts).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test_log::test]
fn shared_pid_duplicates_peer_label() {
    let engine = engine().with_selinux(true);
    let opts = CreateOptions {
        pid: "container:db".to_string(),
        ..CreateOptions::default()
    };
    let config = synthesize_with(&engine, &opts).unwrap().config;
    assert_eq!(
        config.security.process_label.as_deref(),
        Some("system_u:system_r:container_t:s0:c10,c20")
    );
    assert_eq!(config.namespaces.pid, NamespaceMode::Container("db".into()));
    assert_eq!(config.namespaces.peers[&NamespaceKind::Pid], "4f2a9c01");
}

#[test_log::test]
fn host_ipc_disables_labels_but_keeps_seccomp() {
    let dir = TempDir::new().unwrap();
    let profile = dir.path().join("seccomp.json");
    std::fs::write(&profile, "{}").unwrap();

    let engine = EngineConfig::default()
        .with_selinux(true)
        .with_paths(KeelPaths::new().with_seccomp(dir.path().join("missing.json"), &profile));
    let opts = CreateOptions {
        ipc: "host".to_string(),
        ..CreateOptions::default()
    };
    let config = synthesize_with(&engine, &opts).unwrap().config;
    assert!(config.security.process_label.is_none());
    assert_eq!(config.security.seccomp_profile, Some(profile));
    assert_eq!(config.namespaces.shm_dir, Some(PathBuf::from("/dev/shm")));
}

#[test_log::test]
fn seccomp_probe_errors_propagate() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, "x").unwrap();

    let host = keel::namespace::resolve(NamespaceKind::Pid, "", &registry()).unwrap();
    let paths = KeelPaths::new().with_seccomp(file.join("override.json"), file.join("default.json"));
    let err = security::resolve(&SecurityRequest {
        pid: &host,
        ipc: &host,
        security_opts: &[],
        cap_add: &[],
        cap_drop: &[],
        privileged: false,
        paths: &paths,
        selinux: &SelinuxPolicy::default(),
        seed: b"seed",
    })
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[test_log::test]
fn identical_inputs_give_identical_artifacts() {
    let engine = engine().with_selinux(true);
    let opts = CreateOptions {
        name: Some("web".to_string()),
        env: strings(&["B=2", "A=1"]),
        label: strings(&["tier=web", "app=shop"]),
        publish: strings(&["8443:443", "8080:80"]),
        sysctl: strings(&["net.ipv4.ip_forward=1"]),
        memory: "512m".to_string(),
        ..CreateOptions::default()
    };

    let first = synthesize_with(&engine, &opts).unwrap().config;
    let second = synthesize_with(&engine, &opts).unwrap().config;
    let artifact = first.to_artifact().unwrap();
    assert_eq!(artifact, second.to_artifact().unwrap());
    assert!(first.security.process_label.is_some());

    let restored = keel::CreateConfig::from_artifact(&artifact).unwrap();
    assert_eq!(restored, first);

    let spec = serde_json::to_vec(&project(&first).spec).unwrap();
    assert_eq!(spec, serde_json::to_vec(&project(&second).spec).unwrap());
}

#[test_log::test]
fn options_from_flat_json() {
    let opts = CreateOptions::from_json(
        r#"{
            "name": "api",
            "command": ["serve"],
            "pid": "host",
            "memory": "1g",
            "publish": ["127.0.0.1:9000:9000/udp"],
            "security-opt": ["no-new-privileges"]
        }"#,
    )
    .unwrap();
    let config = synthesize(&opts).unwrap().config;
    assert_eq!(config.namespaces.pid, NamespaceMode::Host);
    assert_eq!(config.resources.memory, 1_073_741_824);
    assert!(config.network.ports.get(&PortKey::new(9000, Protocol::Udp)).is_some());
    assert_eq!(config.command.command, strings(&["/docker-entrypoint.sh", "serve"]));
}

#[test_log::test]
fn assembler_checks_run_in_order() {
    // detach+rm comes before the stop signal, which comes before the name.
    let all_bad = CreateOptions {
        detach: true,
        rm: true,
        stop_signal: Some("SIGNOPE".to_string()),
        name: Some("-web".to_string()),
        ..CreateOptions::default()
    };
    assert_eq!(synthesize(&all_bad).unwrap_err().kind(), ErrorKind::ConflictingOptions);

    let signal_and_name = CreateOptions {
        detach: false,
        ..all_bad.clone()
    };
    assert!(matches!(
        synthesize(&signal_and_name),
        Err(keel_common::KeelError::InvalidSignal { .. })
    ));

    let name_only = CreateOptions {
        stop_signal: None,
        ..signal_and_name
    };
    let err = synthesize(&name_only).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSyntax);
    assert!(!matches!(err, keel_common::KeelError::InvalidSignal { .. }));
}

proptest! {
    #[test]
    fn unknown_pid_modes_are_rejected(value in "[a-z]{1,12}") {
        prop_assume!(!matches!(value.as_str(), "host" | "private" | "none"));
        let opts = CreateOptions { pid: value, ..CreateOptions::default() };
        let err = synthesize(&opts).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::InvalidSyntax);
    }

    #[test]
    fn malformed_network_modes_are_rejected(value in "[@/=][a-z0-9]{0,8}") {
        let opts = CreateOptions { network: Some(value), ..CreateOptions::default() };
        let err = synthesize(&opts).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::InvalidSyntax);
    }

    #[test]
    fn synthesis_is_idempotent(memory_mib in 4i64..4096, shares in 0u64..4096) {
        let opts = CreateOptions {
            memory: format!("{memory_mib}MiB"),
            cpu_shares: shares,
            ..CreateOptions::default()
        };
        let first = synthesize(&opts).unwrap().config.to_artifact().unwrap();
        let second = synthesize(&opts).unwrap().config.to_artifact().unwrap();
        prop_assert_eq!(first, second);
    }
}
