//! Shared types, error model, and configuration for probs-runner.
//!
//! This crate is the foundation depended on by all other probs-runner crates.
//! It provides:
//! - [`ProbsError`] — the unified error type
//! - RDF vocabulary types ([`Iri`], [`Namespace`], [`PrefixMap`])
//! - Configuration ([`AppConfig`], [`RunnerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_PORT, DefaultsConfig, EngineSection, RunnerConfig, bundled_scripts_dir,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{ProbsError, Result};
pub use types::{
    Iri, Namespace, PROBS, PROV, PrefixMap, QUANTITYKIND, RDF, RDFS, SYS, XSD,
};
