//! Application configuration for probs-runner.
//!
//! User config lives at `~/.probs-runner/probs-runner.toml`.
//! CLI flags (and their environment variables) override config file values,
//! which override built-in defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProbsError, Result};
use crate::types::PrefixMap;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "probs-runner.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".probs-runner";

/// Port the reasoning endpoint listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 12112;

// ---------------------------------------------------------------------------
// Config structs (matching probs-runner.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Engine (RDFox) settings.
    #[serde(default)]
    pub engine: EngineSection,

    /// Extra namespace prefixes, merged over the built-in set.
    #[serde(default)]
    pub namespaces: PrefixMap,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory holding the PRObs ontology and its RDFox scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts_dir: Option<String>,

    /// Working directory for engine runs; an ephemeral one is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,

    /// Endpoint listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            scripts_dir: None,
            working_dir: None,
            port: default_port(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// `[engine]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// RDFox executable (looked up on `PATH` when not absolute).
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Arguments placed before `sandbox <root> ...` on the command line.
    #[serde(default)]
    pub args: Vec<String>,

    /// Datastore queried through the SPARQL endpoint.
    #[serde(default = "default_datastore")]
    pub datastore: String,

    /// Host the local endpoint is reached on.
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            executable: default_executable(),
            args: Vec::new(),
            datastore: default_datastore(),
            host: default_host(),
        }
    }
}

fn default_executable() -> String {
    "RDFox".into()
}
fn default_datastore() -> String {
    "default".into()
}
fn default_host() -> String {
    "localhost".into()
}

// ---------------------------------------------------------------------------
// Runner config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime configuration handed to the pipeline runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Resolved scripts source directory.
    pub scripts_dir: PathBuf,
    /// Caller-chosen working directory, if any.
    pub working_dir: Option<PathBuf>,
    /// Endpoint listen port.
    pub port: u16,
    /// Built-in prefixes with config overrides applied.
    pub namespaces: PrefixMap,
    /// Engine settings.
    pub engine: EngineSection,
}

impl RunnerConfig {
    /// Resolve a runtime config. Explicit arguments win over the config file,
    /// which wins over built-in defaults.
    pub fn resolve(
        config: &AppConfig,
        scripts_dir: Option<&Path>,
        working_dir: Option<&Path>,
    ) -> Result<Self> {
        let scripts_dir = match (scripts_dir, config.defaults.scripts_dir.as_deref()) {
            (Some(explicit), _) => explicit.to_path_buf(),
            (None, Some(configured)) => expand_home(configured),
            (None, None) => bundled_scripts_dir()?,
        };

        let working_dir = working_dir
            .map(Path::to_path_buf)
            .or_else(|| config.defaults.working_dir.as_deref().map(expand_home));

        Ok(Self {
            scripts_dir,
            working_dir,
            port: config.defaults.port,
            namespaces: PrefixMap::defaults().merged(&config.namespaces),
            engine: config.engine.clone(),
        })
    }
}

/// Location of the ontology scripts installed alongside probs-runner
/// (`<data dir>/probs-runner/probs-ontology`).
pub fn bundled_scripts_dir() -> Result<PathBuf> {
    let data = dirs::data_dir()
        .ok_or_else(|| ProbsError::config("could not determine data directory"))?;
    Ok(data.join("probs-runner").join("probs-ontology"))
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.probs-runner/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProbsError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.probs-runner/probs-runner.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ProbsError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ProbsError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ProbsError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ProbsError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ProbsError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
