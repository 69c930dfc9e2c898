//! PRObs pipeline orchestration.
//!
//! Datasources and raw inputs are composed into per-stage file trees, run
//! through RDFox one stage at a time, and either copied out as artifacts or
//! served as a SPARQL endpoint.

mod datasource;
mod naming;
mod pipeline;
mod stages;

pub use datasource::{
    Datasource, FormatTag, InputFiles, LOAD_DATA_FILE, RULES_FILE, TextSource, TripleFormat,
    load_datasource,
};
pub use naming::{content_hash, datasource_name, facts_file_name, staged_input_name};
pub use pipeline::{EndpointSession, Runner, SilentProgress, StageProgress, answer_queries};
pub use stages::{
    ScriptSource, Stage, StagePlan, compose_conversion, compose_endpoint,
    compose_ontology_conversion, compose_raw,
};

pub use probs_runner_endpoint::{
    BoundKind, Endpoint, LiteralMode, Observation, ObservationQuery, Record, Value,
};
pub use probs_runner_engine::FileSource;
