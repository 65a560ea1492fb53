//! Projection of a [`CreateConfig`] onto an OCI runtime spec and the engine's
//! construction options.
//!
//! Projection is a pure mapping: it reads only the configuration, performs no
//! I/O or lookups, and cannot fail.

mod mounts;
mod options;

use keel_oci::runtime::{
    BlockIoResources, Capabilities, CpuResources, Device, DeviceCgroup, IdMapping, Linux,
    MemoryResources, Namespace, NamespaceType, PidsResources, Process, Resources, Rlimit, Root,
    ThrottleDevice, User, WeightDevice,
};
use keel_oci::Spec;

use crate::config::CreateConfig;
use crate::devices::DeviceLimit;
use crate::namespace::{NamespaceKind, NamespaceMode};
use crate::resources::ResourceConfig;

pub use mounts::{MASKED_PATHS, READONLY_PATHS};
pub use options::CreateOption;

/// Annotation carrying the seccomp profile path.
pub const SECCOMP_ANNOTATION: &str = "io.keel.seccomp.profile";

/// Runtime spec plus construction options for one container.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// OCI runtime spec.
    pub spec: Spec,
    /// Engine construction options.
    pub options: Vec<CreateOption>,
}

/// Project a configuration.
#[must_use]
pub fn project(config: &CreateConfig) -> Projection {
    let projection = Projection {
        spec: runtime_spec(config),
        options: construction_options(config),
    };
    tracing::debug!(
        mounts = projection.spec.mounts.len(),
        options = projection.options.len(),
        "Projected runtime spec"
    );
    projection
}

fn runtime_spec(config: &CreateConfig) -> Spec {
    let security = &config.security;

    let process = Process {
        terminal: config.tty,
        user: User::default(),
        args: config.command.command.clone(),
        env: config.env.iter().map(|(k, v)| format!("{k}={v}")).collect(),
        cwd: config.workdir.clone().into(),
        capabilities: Some(Capabilities::uniform(security.capabilities())),
        rlimits: config
            .resources
            .ulimits
            .iter()
            .map(|u| Rlimit {
                limit_type: u.rlimit_type(),
                hard: u.hard,
                soft: u.soft,
            })
            .collect(),
        no_new_privileges: security.no_new_privileges,
        apparmor_profile: security.apparmor_profile.clone(),
        oom_score_adj: (config.resources.oom_score_adj != 0).then_some(config.resources.oom_score_adj),
        selinux_label: security.process_label.clone(),
    };

    let mut annotations = config.annotations.clone();
    if let Some(profile) = &security.seccomp_profile {
        annotations.insert(SECCOMP_ANNOTATION.to_string(), profile.display().to_string());
    }

    let to_oci = |m: &keel_common::IdMap| IdMapping {
        container_id: m.container_id,
        host_id: m.host_id,
        size: m.size,
    };

    let linux = Linux {
        uid_mappings: config.id_mappings.uid_map.iter().map(to_oci).collect(),
        gid_mappings: config.id_mappings.gid_map.iter().map(to_oci).collect(),
        sysctl: config.sysctls.clone(),
        namespaces: namespaces(config),
        devices: config
            .devices
            .iter()
            .map(|d| Device {
                path: d.container_path.clone(),
                device_type: d.number.kind.to_string(),
                major: d.number.major,
                minor: d.number.minor,
                file_mode: None,
                uid: None,
                gid: None,
            })
            .collect(),
        cgroups_path: config.cgroup_parent.clone(),
        resources: Some(resources(config)),
        mount_label: security.mount_label.clone(),
        masked_paths: if security.privileged {
            Vec::new()
        } else {
            MASKED_PATHS.iter().map(ToString::to_string).collect()
        },
        readonly_paths: if security.privileged {
            Vec::new()
        } else {
            READONLY_PATHS.iter().map(ToString::to_string).collect()
        },
    };

    Spec {
        root: Some(Root {
            path: "rootfs".into(),
            readonly: config.read_only,
        }),
        process: Some(process),
        hostname: config.network.hostname.clone(),
        mounts: mounts::mounts(config),
        annotations,
        linux: Some(linux),
        ..Spec::default()
    }
}

/// Namespaces the runtime creates or joins by path.
///
/// Host and container modes are omitted: the former shares the host's, the
/// latter is joined through [`CreateOption::NamespaceFrom`]. A user namespace
/// is only created when there are ID mappings to put in it.
fn namespaces(config: &CreateConfig) -> Vec<Namespace> {
    let mut namespaces = vec![Namespace {
        ns_type: NamespaceType::Mount,
        path: None,
    }];

    for kind in NamespaceKind::ALL {
        let mode = config.namespaces.mode(kind);
        let path = match mode {
            NamespaceMode::Path(path) => Some(path.clone()),
            NamespaceMode::Private | NamespaceMode::None => None,
            NamespaceMode::Host | NamespaceMode::Container(_) => continue,
        };
        if kind == NamespaceKind::User && path.is_none() && config.id_mappings.host_uid_mapping() {
            continue;
        }
        namespaces.push(Namespace {
            ns_type: kind.oci_type(),
            path,
        });
    }

    namespaces
}

fn resources(config: &CreateConfig) -> Resources {
    let res = &config.resources;
    let positive = |v: i64| (v > 0).then_some(v);

    let (quota, period) = res.cfs();
    let cpu = CpuResources {
        shares: (res.cpu_shares > 0).then_some(res.cpu_shares),
        quota: positive(quota),
        period: (period > 0).then_some(period),
        realtime_runtime: positive(res.cpu_rt_runtime),
        realtime_period: (res.cpu_rt_period > 0).then_some(res.cpu_rt_period),
        cpus: (!res.cpuset_cpus.is_empty()).then(|| res.cpuset_cpus.clone()),
        mems: (!res.cpuset_mems.is_empty()).then(|| res.cpuset_mems.clone()),
    };

    let memory = MemoryResources {
        limit: positive(res.memory),
        reservation: positive(res.memory_reservation),
        swap: (res.memory_swap != 0).then_some(res.memory_swap),
        kernel: positive(res.kernel_memory),
        swappiness: u64::try_from(res.memory_swappiness).ok(),
        disable_oom_killer: res.oom_kill_disable.then_some(true),
    };

    Resources {
        devices: device_rules(config),
        cpu: (cpu != CpuResources::default()).then_some(cpu),
        memory: (memory != MemoryResources::default()).then_some(memory),
        pids: (res.pids_limit != 0).then_some(PidsResources {
            limit: res.pids_limit,
        }),
        block_io: block_io(res),
    }
}

/// Deny everything, then allow the mapped devices. Privileged containers
/// get every device.
fn device_rules(config: &CreateConfig) -> Vec<DeviceCgroup> {
    let rule = |allow: bool, access: &str| DeviceCgroup {
        allow,
        device_type: None,
        major: None,
        minor: None,
        access: Some(access.to_string()),
    };

    if config.security.privileged {
        return vec![rule(true, "rwm")];
    }

    let mut rules = vec![rule(false, "rwm")];
    rules.extend(config.devices.iter().map(|d| DeviceCgroup {
        allow: true,
        device_type: Some(d.number.kind.to_string()),
        major: Some(d.number.major),
        minor: Some(d.number.minor),
        access: Some(d.permissions.clone()),
    }));
    rules
}

fn block_io(res: &ResourceConfig) -> Option<BlockIoResources> {
    let throttle = |limits: &[DeviceLimit]| -> Vec<ThrottleDevice> {
        limits
            .iter()
            .map(|l| ThrottleDevice {
                major: l.major,
                minor: l.minor,
                rate: l.value,
            })
            .collect()
    };

    let block_io = BlockIoResources {
        weight: (res.blkio_weight > 0).then_some(res.blkio_weight),
        weight_device: res
            .blkio_weight_device
            .iter()
            .map(|l| WeightDevice {
                major: l.major,
                minor: l.minor,
                weight: u16::try_from(l.value).unwrap_or(u16::MAX),
            })
            .collect(),
        throttle_read_bps_device: throttle(&res.throttles.read_bps),
        throttle_write_bps_device: throttle(&res.throttles.write_bps),
        throttle_read_iops_device: throttle(&res.throttles.read_iops),
        throttle_write_iops_device: throttle(&res.throttles.write_iops),
    };

    (block_io != BlockIoResources::default()).then_some(block_io)
}

fn construction_options(config: &CreateConfig) -> Vec<CreateOption> {
    let mut options = vec![CreateOption::RootfsFromImage {
        id: config.image_id.clone(),
        name: config.image_name.clone(),
        use_image_volumes: config.storage.uses_image_volumes(),
    }];

    if let (Some(process), Some(mount)) = (&config.security.process_label, &config.security.mount_label) {
        options.push(CreateOption::SelinuxLabels {
            process: process.clone(),
            mount: mount.clone(),
        });
    }
    if let Some(pidfile) = &config.conmon_pidfile {
        options.push(CreateOption::ConmonPidFile(pidfile.clone()));
    }
    options.push(CreateOption::Labels(config.labels.clone()));
    if let Some(user) = &config.user {
        options.push(CreateOption::User(user.clone()));
    }
    if let Some(dir) = &config.namespaces.shm_dir {
        options.push(CreateOption::ShmDir(dir.clone()));
    }
    options.push(CreateOption::ShmSize(config.resources.shm_size));
    if !config.group_add.is_empty() {
        options.push(CreateOption::Groups(config.group_add.clone()));
    }
    options.push(CreateOption::IdMappings(config.id_mappings.clone()));

    for kind in NamespaceKind::ALL {
        if let NamespaceMode::Container(reference) = config.namespaces.mode(kind) {
            let container = config
                .namespaces
                .peers
                .get(&kind)
                .unwrap_or(reference)
                .clone();
            options.push(CreateOption::NamespaceFrom { kind, container });
        }
    }

    let network = &config.network;
    if config.namespaces.network == NamespaceMode::Private {
        options.push(CreateOption::Network {
            network: network.network.clone(),
            ports: network.ports.mappings(),
            aliases: network.aliases.clone(),
            static_ip: network.static_ip,
            static_mac: network.static_mac.clone(),
            link_local_ips: network.link_local_ips.clone(),
        });
    }
    if !network.dns_servers.is_empty() || !network.dns_search.is_empty() || !network.dns_options.is_empty() {
        options.push(CreateOption::Dns {
            servers: network.dns_servers.clone(),
            search: network.dns_search.clone(),
            options: network.dns_options.clone(),
        });
    }
    if !network.extra_hosts.is_empty() {
        options.push(CreateOption::Hosts(network.extra_hosts.clone()));
    }

    options.push(CreateOption::StopSignal(config.stop_signal));
    options.push(CreateOption::StopTimeout(config.stop_timeout));
    if let Some(profile) = &config.security.seccomp_profile {
        options.push(CreateOption::SeccompProfile(profile.clone()));
    }
    if let Some(parent) = &config.cgroup_parent {
        options.push(CreateOption::CgroupParent(parent.clone()));
    }
    if let Some(name) = &config.name {
        options.push(CreateOption::Name(name.clone()));
    }
    if config.log_driver.is_some() || !config.log_options.is_empty() {
        options.push(CreateOption::Log {
            driver: config.log_driver.clone(),
            options: config.log_options.clone(),
        });
    }
    if let Some(pod) = &config.pod {
        options.push(CreateOption::Pod(pod.clone()));
    }
    if config.rm {
        options.push(CreateOption::AutoRemove);
    }

    options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineConfig, Synthesizer};
    use crate::environment::HostEnv;
    use crate::lookup::{ContainerRegistry, PeerContainer};
    use crate::options::CreateOptions;
    use keel_common::KeelPaths;
    use keel_oci::ImageMetadata;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn synthesize(opts: &CreateOptions) -> CreateConfig {
        let engine = EngineConfig::default()
            .with_paths(KeelPaths::new().with_seccomp("/nonexistent/a.json", "/nonexistent/b.json"));
        let registry = ContainerRegistry::from_peers([PeerContainer {
            id: "c0ffee".to_string(),
            name: "db".to_string(),
            process_label: String::new(),
            mount_label: String::new(),
            shm_dir: PathBuf::from("/run/keel/c0ffee/shm"),
        }]);
        let image = ImageMetadata::new("sha256:abc", "busybox")
            .with_cmd(["sh"])
            .with_volume("/data");
        Synthesizer::new(&engine, &registry)
            .with_host_env(HostEnv::Fixed(BTreeMap::new()))
            .synthesize(opts, &image)
            .unwrap()
            .config
    }

    fn ns_types(spec: &Spec) -> Vec<NamespaceType> {
        spec.linux
            .as_ref()
            .unwrap()
            .namespaces
            .iter()
            .map(|n| n.ns_type)
            .collect()
    }

    #[test]
    fn default_projection() {
        let projection = project(&synthesize(&CreateOptions::default()));
        let spec = &projection.spec;

        assert_eq!(spec.process.as_ref().unwrap().args, vec!["sh"]);
        assert_eq!(
            ns_types(spec),
            vec![
                NamespaceType::Mount,
                NamespaceType::Pid,
                NamespaceType::Ipc,
                NamespaceType::Uts,
                NamespaceType::Network
            ]
        );
        let shm = spec
            .mounts
            .iter()
            .find(|m| m.destination == PathBuf::from("/dev/shm"))
            .unwrap();
        assert!(shm.options.contains(&"size=65536000".to_string()));
        assert!(!spec.linux.as_ref().unwrap().masked_paths.is_empty());

        assert!(matches!(
            projection.options[0],
            CreateOption::RootfsFromImage {
                use_image_volumes: true,
                ..
            }
        ));
        assert!(projection.options.contains(&CreateOption::StopTimeout(10)));
    }

    #[test]
    fn host_and_container_namespaces_are_not_created() {
        let opts = CreateOptions {
            pid: "host".into(),
            ipc: "container:db".into(),
            network: Some("none".into()),
            ..CreateOptions::default()
        };
        let projection = project(&synthesize(&opts));
        let types = ns_types(&projection.spec);
        assert!(!types.contains(&NamespaceType::Pid));
        assert!(!types.contains(&NamespaceType::Ipc));
        assert!(types.contains(&NamespaceType::Network));

        assert!(projection.options.contains(&CreateOption::NamespaceFrom {
            kind: NamespaceKind::Ipc,
            container: "c0ffee".into(),
        }));
        assert!(
            projection
                .options
                .contains(&CreateOption::ShmDir(PathBuf::from("/run/keel/c0ffee/shm")))
        );
        assert!(
            !projection
                .options
                .iter()
                .any(|o| matches!(o, CreateOption::Network { .. }))
        );
    }

    #[test]
    fn log_and_pod_options() {
        let opts = CreateOptions {
            log_driver: Some("k8s-file".into()),
            log_opt: vec!["path=/var/log/web.log".into()],
            pod: Some("frontend".into()),
            link_local_ip: vec!["169.254.3.3".into()],
            ..CreateOptions::default()
        };
        let options = project(&synthesize(&opts)).options;

        assert!(options.contains(&CreateOption::Log {
            driver: Some("k8s-file".into()),
            options: BTreeMap::from([("path".to_string(), "/var/log/web.log".to_string())]),
        }));
        assert!(options.contains(&CreateOption::Pod("frontend".into())));
        assert!(options.iter().any(|o| matches!(
            o,
            CreateOption::Network { link_local_ips, .. } if link_local_ips.len() == 1
        )));

        let plain = project(&synthesize(&CreateOptions::default())).options;
        assert!(!plain.iter().any(|o| matches!(o, CreateOption::Log { .. } | CreateOption::Pod(_))));
    }

    #[test]
    fn user_namespace_needs_mappings() {
        let opts = CreateOptions {
            uidmap: vec!["0:100000:65536".into()],
            ..CreateOptions::default()
        };
        let spec = project(&synthesize(&opts)).spec;
        assert!(ns_types(&spec).contains(&NamespaceType::User));
        let linux = spec.linux.unwrap();
        assert_eq!(linux.uid_mappings.len(), 1);
        assert_eq!(linux.gid_mappings.len(), 1);
    }

    #[test]
    fn resources_are_mapped() {
        let opts = CreateOptions {
            memory: "64m".into(),
            cpus: 0.5,
            pids_limit: 100,
            blkio_weight: "300".into(),
            ..CreateOptions::default()
        };
        let spec = project(&synthesize(&opts)).spec;
        let resources = spec.linux.unwrap().resources.unwrap();
        assert_eq!(resources.memory.unwrap().limit, Some(67_108_864));
        let cpu = resources.cpu.unwrap();
        assert_eq!((cpu.quota, cpu.period), (Some(50_000), Some(100_000)));
        assert_eq!(resources.pids.unwrap().limit, 100);
        assert_eq!(resources.block_io.unwrap().weight, Some(300));
        assert!(!resources.devices[0].allow);
    }

    #[test]
    fn privileged_projection() {
        let opts = CreateOptions {
            privileged: true,
            ..CreateOptions::default()
        };
        let spec = project(&synthesize(&opts)).spec;
        let linux = spec.linux.as_ref().unwrap();
        assert!(linux.masked_paths.is_empty());
        assert!(linux.resources.as_ref().unwrap().devices[0].allow);
        let caps = spec.process.unwrap().capabilities.unwrap();
        assert!(caps.bounding.len() > 14);
    }

    #[test]
    fn volumes_and_seccomp() {
        let opts = CreateOptions {
            volume: vec!["/srv:/srv:ro,Z".into()],
            image_volume: "tmpfs".into(),
            security_opt: vec!["seccomp=/etc/keel/seccomp.json".into()],
            rm: true,
            ..CreateOptions::default()
        };
        let projection = project(&synthesize(&opts));
        let srv = projection
            .spec
            .mounts
            .iter()
            .find(|m| m.destination == PathBuf::from("/srv"))
            .unwrap();
        assert_eq!(srv.options, vec!["ro", "rbind"]);
        assert!(
            projection
                .spec
                .mounts
                .iter()
                .any(|m| m.destination == PathBuf::from("/data"))
        );
        assert_eq!(
            projection.spec.annotations[SECCOMP_ANNOTATION],
            "/etc/keel/seccomp.json"
        );
        assert!(projection.options.contains(&CreateOption::AutoRemove));
    }

    #[test]
    fn projection_is_deterministic() {
        let config = synthesize(&CreateOptions::default());
        assert_eq!(project(&config), project(&config));
    }
}
