//! Stage composition: which files a pipeline stage stages, the loader it
//! generates and the script it runs.

use std::path::{Path, PathBuf};

use tracing::debug;

use probs_runner_engine::{FileSource, Readiness, StagedTree, TreeBuilder};
use probs_runner_shared::{ProbsError, Result};

use crate::datasource::Datasource;
use crate::naming;

/// Imports placed ahead of the data in stages that reason over the ontology.
const ONTOLOGY_PREAMBLE: [&str; 2] = ["import \"probs.fss\"", "import \"additional_info.ttl\""];

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// A step of the PRObs pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Conversion,
    OntologyConversion,
    Validation,
    Enhancement,
    KbcHierarchy,
    Reasoning,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Self::Conversion,
        Self::OntologyConversion,
        Self::Validation,
        Self::Enhancement,
        Self::KbcHierarchy,
        Self::Reasoning,
    ];

    /// Directory under `scripts/` holding the stage's RDFox scripts.
    pub fn script_dir(self) -> &'static str {
        match self {
            Self::Conversion => "data-conversion",
            Self::OntologyConversion => "ontology-conversion",
            Self::Validation => "data-validation",
            Self::Enhancement => "data-enhancement",
            Self::KbcHierarchy => "kbc-hierarchy",
            Self::Reasoning => "reasoning",
        }
    }

    /// Artifact the stage writes, relative to the working root.
    pub fn output(self) -> Option<&'static str> {
        match self {
            Self::Conversion => Some("data/probs_original_data.nt.gz"),
            Self::OntologyConversion => Some("data/probs_ontology_rules.dlog"),
            Self::Validation => Some("data/valid.log"),
            Self::Enhancement => Some("data/probs_enhanced_data.nt.gz"),
            Self::KbcHierarchy => Some("data/probs_kbc_hierarchy.nt.gz"),
            Self::Reasoning => None,
        }
    }

    pub fn readiness(self) -> Readiness {
        match self {
            Self::Reasoning => Readiness::Endpoint,
            _ => Readiness::Exit,
        }
    }

    /// Human-readable label for progress output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Conversion => "Converting data",
            Self::OntologyConversion => "Converting ontology",
            Self::Validation => "Validating data",
            Self::Enhancement => "Enhancing data",
            Self::KbcHierarchy => "Building KBC hierarchy",
            Self::Reasoning => "Starting endpoint",
        }
    }

    fn loads_ontology(self) -> bool {
        matches!(self, Self::Validation | Self::Enhancement | Self::KbcHierarchy)
    }

    fn master_script(self) -> String {
        format!("exec scripts/{}/master", self.script_dir())
    }

    fn load_data_path(self) -> String {
        format!("scripts/{}/load_data.rdfox", self.script_dir())
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.script_dir())
    }
}

// ---------------------------------------------------------------------------
// ScriptSource
// ---------------------------------------------------------------------------

/// A PRObs ontology checkout: `probs.fss`, `additional_info.ttl` and
/// `scripts/<stage>/` directories.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    root: PathBuf,
}

impl ScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The files every run of `stage` needs from the scripts source.
    fn standard_files(&self, stage: Stage) -> Result<TreeBuilder> {
        let mut builder = TreeBuilder::new();
        for (dest, relative) in [
            ("data/probs.fss".to_string(), "probs.fss".to_string()),
            ("data/additional_info.ttl".into(), "additional_info.ttl".into()),
            ("scripts/shared".into(), "scripts/shared".into()),
            (
                format!("scripts/{}", stage.script_dir()),
                format!("scripts/{}", stage.script_dir()),
            ),
        ] {
            let source = self.root.join(relative);
            if !source.exists() {
                return Err(ProbsError::NotFound { path: source });
            }
            builder.insert(dest, FileSource::Path(source))?;
        }
        Ok(builder)
    }
}

// ---------------------------------------------------------------------------
// StagePlan
// ---------------------------------------------------------------------------

/// Everything needed to run one stage: staged files and script lines.
#[derive(Debug, Clone)]
pub struct StagePlan {
    /// The stage this plan runs.
    pub stage: Stage,
    /// Files to materialise in the workspace: ontology scripts, generated
    /// loaders and inputs, keyed by workspace-relative path.
    pub tree: StagedTree,
    /// Session commands run after the prefix declarations, ending with the
    /// stage's master script.
    pub script: Vec<String>,
}

/// Conversion: every datasource's loader and rules are concatenated in the
/// given order and its files are merged into the tree.
pub fn compose_conversion(
    scripts: &ScriptSource,
    datasources: &[Datasource],
    fact_domain: Option<&str>,
) -> Result<StagePlan> {
    let stage = Stage::Conversion;
    let mut builder = scripts.standard_files(stage)?;

    let loader: Vec<&str> = datasources.iter().map(Datasource::load_data_script).collect();
    let rules: Vec<&str> = datasources.iter().map(Datasource::rules).collect();
    builder.insert(
        stage.load_data_path(),
        FileSource::labelled("generated load_data.rdfox", loader.join("\n")),
    )?;
    builder.insert(
        format!("scripts/{}/map.dlog", stage.script_dir()),
        FileSource::labelled("generated map.dlog", rules.join("\n")),
    )?;
    for datasource in datasources {
        builder.merge(datasource.files().clone())?;
    }

    let mut script = Vec::new();
    if let Some(domain) = fact_domain {
        script.push(format!("set fact_domain \"{domain}\""));
    }
    script.push(stage.master_script());

    debug!(datasources = datasources.len(), "composed conversion");
    Ok(StagePlan {
        stage,
        tree: builder.build(),
        script,
    })
}

/// Ontology conversion: `ontology` replaces the bundled `probs.fss`.
pub fn compose_ontology_conversion(scripts: &ScriptSource, ontology: &Path) -> Result<StagePlan> {
    let stage = Stage::OntologyConversion;
    if !ontology.is_file() {
        return Err(ProbsError::NotFound {
            path: ontology.to_path_buf(),
        });
    }

    let mut builder = TreeBuilder::new();
    let standard = scripts.standard_files(stage)?.build();
    for (dest, source) in standard.iter() {
        let source = match dest {
            "data/probs.fss" => FileSource::path(ontology),
            _ => source.clone(),
        };
        builder.insert(dest, source)?;
    }

    Ok(StagePlan {
        stage,
        tree: builder.build(),
        script: vec![stage.master_script()],
    })
}

/// Stages reading raw artifacts: each input is staged as
/// `data/<path hash>_<base name>` and imported in the given order.
pub fn compose_raw(scripts: &ScriptSource, stage: Stage, inputs: &[PathBuf]) -> Result<StagePlan> {
    if matches!(stage, Stage::Conversion | Stage::OntologyConversion) {
        return Err(ProbsError::invalid_input(format!(
            "stage {stage} does not take raw inputs"
        )));
    }

    let mut builder = scripts.standard_files(stage)?;
    let mut loader: Vec<String> = Vec::new();
    if stage.loads_ontology() {
        loader.extend(ONTOLOGY_PREAMBLE.iter().map(|line| line.to_string()));
    }
    for input in inputs {
        if !input.exists() {
            return Err(ProbsError::NotFound {
                path: input.clone(),
            });
        }
        let staged = naming::staged_input_name(input)?;
        builder.insert(format!("data/{staged}"), FileSource::path(input))?;
        loader.push(format!("import \"{staged}\""));
    }
    builder.insert(
        stage.load_data_path(),
        FileSource::labelled(
            format!("generated {}", stage.load_data_path()),
            loader.join("\n") + "\n",
        ),
    )?;

    debug!(%stage, inputs = inputs.len(), "composed stage");
    Ok(StagePlan {
        stage,
        tree: builder.build(),
        script: vec![stage.master_script()],
    })
}

/// Reasoning: raw inputs plus the endpoint port.
pub fn compose_endpoint(scripts: &ScriptSource, inputs: &[PathBuf], port: u16) -> Result<StagePlan> {
    let mut plan = compose_raw(scripts, Stage::Reasoning, inputs)?;
    plan.script.insert(0, format!("set endpoint.port \"{port}\""));
    Ok(plan)
}
