//! CLI command definitions and handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use serde::Deserialize;

use keel_oci::ImageMetadata;

use crate::config::{EngineConfig, Synthesis, Synthesizer};
use crate::lookup::ContainerRegistry;
use crate::options::CreateOptions;
use crate::projection::project;

/// Keel - container create-configuration synthesis
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Engine configuration file (TOML); the host is probed when absent
    #[arg(long, global = true, env = "KEEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Synthesize one container configuration
    Create {
        /// Create options (JSON, or TOML with a .toml extension)
        #[arg(short, long)]
        options: PathBuf,

        /// Image metadata (JSON image config)
        #[arg(short, long)]
        image: PathBuf,

        /// Existing containers (JSON array) for container-mode namespaces
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Directory to write config.json, create-options.json and
        /// create-config.json into
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Synthesize many configurations concurrently against one registry
    Batch {
        /// Requests (JSON array of {"options": ..., "image": ...})
        requests: PathBuf,

        /// Existing containers (JSON array)
        #[arg(short, long)]
        registry: Option<PathBuf>,

        /// Directory receiving one sub-directory per request
        #[arg(long, default_value = ".")]
        output: PathBuf,
    },

    /// Print the effective engine configuration
    Engine,
}

/// One entry of a batch file.
#[derive(Debug, Deserialize)]
struct BatchRequest {
    #[serde(default)]
    options: CreateOptions,
    image: ImageMetadata,
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let engine = Arc::new(load_engine(self.config.as_deref())?);

        match self.command {
            Commands::Create {
                options,
                image,
                registry,
                output,
            } => {
                let opts = CreateOptions::load(&options)
                    .map_err(|e| eyre!("Failed to load options {}: {}", options.display(), e))?;
                let image = load_image(&image)?;
                let registry = load_registry(registry.as_deref())?;

                let synthesis = Synthesizer::new(&engine, &registry)
                    .synthesize(&opts, &image)
                    .map_err(|e| eyre!("Failed to synthesize configuration: {}", e))?;

                report_warnings(&synthesis);
                write_outputs(&output, &synthesis)?;
                println!("Configuration written to {}", output.display());
                Ok(())
            }

            Commands::Batch {
                requests,
                registry,
                output,
            } => {
                let content = std::fs::read_to_string(&requests)
                    .wrap_err_with(|| format!("Failed to read {}", requests.display()))?;
                let requests: Vec<BatchRequest> = serde_json::from_str(&content)?;
                let registry = Arc::new(load_registry(registry.as_deref())?);

                let handles: Vec<_> = requests
                    .into_iter()
                    .map(|request| {
                        let engine = Arc::clone(&engine);
                        let registry = Arc::clone(&registry);
                        tokio::task::spawn_blocking(move || {
                            Synthesizer::new(&engine, &*registry)
                                .synthesize(&request.options, &request.image)
                        })
                    })
                    .collect();

                let mut failed = 0usize;
                for (index, handle) in handles.into_iter().enumerate() {
                    match handle.await? {
                        Ok(synthesis) => {
                            report_warnings(&synthesis);
                            write_outputs(&output.join(index.to_string()), &synthesis)?;
                            println!("[{index}] ok");
                        }
                        Err(e) => {
                            failed += 1;
                            tracing::error!(request = index, error = %e, "Synthesis failed");
                            println!("[{index}] error: {e}");
                        }
                    }
                }

                if failed > 0 {
                    return Err(eyre!("{} request(s) failed", failed));
                }
                Ok(())
            }

            Commands::Engine => {
                let rendered = toml::to_string_pretty(&*engine)?;
                print!("{rendered}");
                Ok(())
            }
        }
    }
}

fn load_engine(path: Option<&Path>) -> Result<EngineConfig> {
    let default_path = EngineConfig::default_path();
    let path = match path {
        Some(path) => Some(path),
        None if default_path.exists() => Some(default_path.as_path()),
        None => None,
    };

    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading engine configuration");
            EngineConfig::load(path)
                .map_err(|e| eyre!("Failed to load engine configuration {}: {}", path.display(), e))
        }
        None => Ok(EngineConfig::detect()),
    }
}

fn load_image(path: &Path) -> Result<ImageMetadata> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read image metadata {}", path.display()))?;
    Ok(serde_json::from_str(&content)?)
}

fn load_registry(path: Option<&Path>) -> Result<ContainerRegistry> {
    match path {
        Some(path) => ContainerRegistry::load(path)
            .map_err(|e| eyre!("Failed to load registry {}: {}", path.display(), e)),
        None => Ok(ContainerRegistry::new()),
    }
}

fn report_warnings(synthesis: &Synthesis) {
    for warning in &synthesis.warnings {
        eprintln!("WARNING: {warning}");
    }
}

fn write_outputs(dir: &Path, synthesis: &Synthesis) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let projection = project(&synthesis.config);

    std::fs::write(
        dir.join("config.json"),
        serde_json::to_vec_pretty(&projection.spec)?,
    )?;
    std::fs::write(
        dir.join("create-options.json"),
        serde_json::to_vec_pretty(&projection.options)?,
    )?;
    let artifact = synthesis
        .config
        .to_artifact()
        .map_err(|e| eyre!("Failed to serialize configuration: {}", e))?;
    std::fs::write(dir.join("create-config.json"), artifact)?;
    Ok(())
}
