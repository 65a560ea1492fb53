//! Request pipeline: resolvers, cross-field checks, final assembly.

use sha2::{Digest, Sha256};

use keel_common::idmap::{IdMappingRequest, parse_id_mappings};
use keel_common::sysctl::parse_sysctls;
use keel_common::{ContainerName, KeelError, KeelResult, Signal};
use keel_oci::ImageMetadata;

use crate::command;
use crate::devices;
use crate::environment::{self, HostEnv};
use crate::lookup::ContainerLookup;
use crate::namespace::{self, NamespaceConfig, NamespaceKind};
use crate::network;
use crate::options::CreateOptions;
use crate::resources;
use crate::security::{self, SecurityRequest};
use crate::storage;

use super::{CreateConfig, EngineConfig};

/// A synthesized configuration and the warnings raised while building it.
#[derive(Debug, Clone)]
pub struct Synthesis {
    /// The configuration.
    pub config: CreateConfig,
    /// Limits that were discarded because the host cannot enforce them.
    pub warnings: Vec<String>,
}

/// Turns create options and image metadata into a [`CreateConfig`].
///
/// The lookup is borrowed for the synthesizer's lifetime and consulted only
/// while resolving container-mode namespaces.
pub struct Synthesizer<'a> {
    engine: &'a EngineConfig,
    lookup: &'a dyn ContainerLookup,
    host_env: HostEnv,
}

impl<'a> Synthesizer<'a> {
    /// Create a synthesizer reading bare `--env` keys from this process.
    #[must_use]
    pub fn new(engine: &'a EngineConfig, lookup: &'a dyn ContainerLookup) -> Self {
        Self {
            engine,
            lookup,
            host_env: HostEnv::Process,
        }
    }

    /// Use a different source for bare `--env` keys.
    #[must_use]
    pub fn with_host_env(mut self, host_env: HostEnv) -> Self {
        self.host_env = host_env;
        self
    }

    /// Run the full pipeline for one request.
    ///
    /// Stages run in a fixed order and the first error aborts the request;
    /// no partial configuration is returned.
    pub fn synthesize(&self, opts: &CreateOptions, image: &ImageMetadata) -> KeelResult<Synthesis> {
        let paths = &self.engine.paths;

        let id_mappings = parse_id_mappings(&IdMappingRequest {
            uid_map: &opts.uidmap,
            gid_map: &opts.gidmap,
            subuid_name: &opts.subuidname,
            subgid_name: &opts.subgidname,
            subuid_file: &paths.subuid,
            subgid_file: &paths.subgid,
        })?;
        let sysctls = parse_sysctls(&opts.sysctl)?;

        let mut resources = resources::resolve(opts)?;

        let pid = namespace::resolve(NamespaceKind::Pid, &opts.pid, self.lookup)?;
        let user = namespace::resolve(NamespaceKind::User, &opts.userns, self.lookup)?;
        let uts = namespace::resolve(NamespaceKind::Uts, &opts.uts, self.lookup)?;
        let ipc = namespace::resolve(NamespaceKind::Ipc, &opts.ipc, self.lookup)?;
        let selected_network = network::select_network(opts)?;
        let net = namespace::resolve(NamespaceKind::Network, &selected_network, self.lookup)?;

        if user.mode.is_host() && !id_mappings.host_uid_mapping() {
            return Err(KeelError::conflict("--userns host", "--uidmap/--subuidname"));
        }
        if uts.mode.is_host() && opts.hostname.is_some() {
            return Err(KeelError::conflict("--uts host", "--hostname"));
        }

        let mut namespaces = NamespaceConfig::default();
        namespaces.set(NamespaceKind::Pid, &pid);
        namespaces.set(NamespaceKind::User, &user);
        namespaces.set(NamespaceKind::Uts, &uts);
        namespaces.set(NamespaceKind::Ipc, &ipc);
        namespaces.set(NamespaceKind::Network, &net);

        let seed = request_seed(opts, image)?;
        let security = security::resolve(&SecurityRequest {
            pid: &pid,
            ipc: &ipc,
            security_opts: &opts.security_opt,
            cap_add: &opts.cap_add,
            cap_drop: &opts.cap_drop,
            privileged: opts.privileged,
            paths,
            selinux: &self.engine.selinux,
            seed: &seed,
        })?;

        let network = network::resolve(opts, image, &net.mode, &selected_network)?;

        let command = command::resolve(opts.entrypoint.as_deref(), &opts.command, image)?;

        let env = environment::merge_environment(image, &opts.env_file, &opts.env, &self.host_env)?;
        let labels = environment::merge_labels(image, &opts.label_file, &opts.label)?;
        let annotations = environment::parse_annotations(&opts.annotation)?;
        let log_options = environment::parse_log_options(&opts.log_opt)?;
        let storage = storage::resolve(&opts.volume, &opts.tmpfs, &opts.image_volume, image)?;
        let devices = opts
            .device
            .iter()
            .map(|spec| devices::parse_device(spec))
            .collect::<KeelResult<Vec<_>>>()?;

        if opts.detach && opts.rm {
            return Err(KeelError::conflict("--detach", "--rm"));
        }
        let workdir = opts
            .workdir
            .clone()
            .filter(|dir| !dir.is_empty())
            .or_else(|| image.working_dir.clone().filter(|dir| !dir.is_empty()))
            .unwrap_or_else(|| "/".to_string());
        let user_spec = opts
            .user
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| image.user.clone().filter(|u| !u.is_empty()));
        let stop_signal = match opts
            .stop_signal
            .as_deref()
            .filter(|raw| !raw.is_empty())
            .or_else(|| image.stop_signal.as_deref().filter(|raw| !raw.is_empty()))
        {
            Some(raw) => Signal::parse(raw)?,
            None => self.engine.default_stop_signal,
        };
        let name = opts
            .name
            .as_deref()
            .map(ContainerName::new)
            .transpose()?
            .map(|name| name.as_str().to_string());

        let warnings = resources::verify(&mut resources, &self.engine.kernel)?;

        let config = CreateConfig {
            name,
            image_id: image.id.clone(),
            image_name: image.name.clone(),
            command,
            workdir,
            user: user_spec,
            group_add: opts.group_add.clone(),
            stop_signal,
            stop_timeout: opts.stop_timeout,
            detach: opts.detach,
            rm: opts.rm,
            tty: opts.tty,
            interactive: opts.interactive,
            read_only: opts.read_only,
            env,
            labels,
            annotations,
            namespaces,
            security,
            resources,
            network,
            storage,
            devices,
            id_mappings,
            sysctls,
            cgroup_parent: opts.cgroup_parent.clone(),
            conmon_pidfile: opts.conmon_pidfile.clone(),
            log_driver: opts.log_driver.clone().filter(|driver| !driver.is_empty()),
            log_options,
            pod: opts.pod.clone().filter(|pod| !pod.is_empty()),
        };

        tracing::info!(
            image = %config.image_name,
            name = config.name.as_deref().unwrap_or(""),
            warnings = warnings.len(),
            "Synthesized container configuration"
        );

        Ok(Synthesis { config, warnings })
    }
}

/// Deterministic per-request seed: the options and the image ID.
fn request_seed(opts: &CreateOptions, image: &ImageMetadata) -> KeelResult<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(opts)?);
    hasher.update(image.id.as_bytes());
    Ok(hasher.finalize().to_vec())
}
