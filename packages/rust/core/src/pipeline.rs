//! Stage runner and composite pipelines.
//!
//! Each stage is composed, staged into a workspace, run to readiness and,
//! for artifact-producing stages, copied out once the engine has exited.
//! Composite pipelines chain stages strictly one after another, passing
//! intermediate artifacts through an ephemeral scratch directory.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, instrument, warn};

use probs_runner_endpoint::{Endpoint, LiteralMode, Record};
use probs_runner_engine::{EngineConfig, EngineSession, RdfoxEngine, SessionScript, Workspace};
use probs_runner_shared::{PrefixMap, ProbsError, Result, RunnerConfig};

use crate::datasource::Datasource;
use crate::stages::{
    ScriptSource, Stage, StagePlan, compose_conversion, compose_endpoint,
    compose_ontology_conversion, compose_raw,
};

/// File the validation stage writes its verdict to.
const VALIDATION_LOG: &str = "data/valid.log";

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting stage status.
pub trait StageProgress: Send + Sync {
    /// Called when a stage is about to start.
    fn stage_started(&self, stage: Stage);
    /// Called once a stage has finished or its endpoint is up.
    fn stage_finished(&self, stage: Stage, elapsed: Duration);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl StageProgress for SilentProgress {
    fn stage_started(&self, _stage: Stage) {}
    fn stage_finished(&self, _stage: Stage, _elapsed: Duration) {}
}

// ---------------------------------------------------------------------------
// EndpointSession
// ---------------------------------------------------------------------------

/// A live reasoning endpoint. Dereferences to [`Endpoint`] for queries;
/// dropping it stops the engine.
#[derive(Debug)]
pub struct EndpointSession {
    endpoint: Endpoint,
    session: EngineSession,
}

impl EndpointSession {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Working directory of the engine serving this endpoint.
    pub fn root(&self) -> &Path {
        self.session.root()
    }

    /// Ask the engine to quit and wait for it.
    pub async fn close(self) -> Result<()> {
        self.session.shutdown().await
    }
}

impl Deref for EndpointSession {
    type Target = Endpoint;

    fn deref(&self) -> &Endpoint {
        &self.endpoint
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Runs pipeline stages against one scripts source.
#[derive(Clone)]
pub struct Runner {
    engine: RdfoxEngine,
    scripts: ScriptSource,
    working_dir: Option<PathBuf>,
    namespaces: PrefixMap,
    port: u16,
    host: String,
    datastore: String,
    progress: Arc<dyn StageProgress>,
}

impl Runner {
    pub fn new(config: &RunnerConfig) -> Self {
        Self {
            engine: RdfoxEngine::new(EngineConfig::from_section(&config.engine)),
            scripts: ScriptSource::new(&config.scripts_dir),
            working_dir: config.working_dir.clone(),
            namespaces: config.namespaces.clone(),
            port: config.port,
            host: config.engine.host.clone(),
            datastore: config.engine.datastore.clone(),
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn StageProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_working_dir(mut self, working_dir: Option<PathBuf>) -> Self {
        self.working_dir = working_dir;
        self
    }

    /// Use `overrides` on top of the default PRObs prefixes, replacing the
    /// configured ones.
    pub fn with_namespaces(mut self, overrides: &PrefixMap) -> Self {
        self.namespaces = PrefixMap::defaults().merged(overrides);
        self
    }

    pub fn namespaces(&self) -> &PrefixMap {
        &self.namespaces
    }

    pub fn scripts(&self) -> &ScriptSource {
        &self.scripts
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// A runner for one step of a composite pipeline, working in its own
    /// sub-directory of the caller's working directory.
    fn step(&self, name: &str) -> Self {
        let mut step = self.clone();
        step.working_dir = self.working_dir.as_ref().map(|dir| dir.join(name));
        step
    }

    // -- Single stages ------------------------------------------------------

    /// Convert datasources into PRObs RDF, written to `output`.
    #[instrument(skip_all, fields(datasources = datasources.len(), output = %output.display()))]
    pub async fn convert_data(
        &self,
        datasources: &[Datasource],
        output: &Path,
        fact_domain: Option<&str>,
    ) -> Result<()> {
        let plan = compose_conversion(&self.scripts, datasources, fact_domain)?;
        self.run_to_output(plan, output).await
    }

    /// Convert an OWL functional-syntax ontology into Datalog rules.
    #[instrument(skip_all, fields(ontology = %ontology.display(), output = %output.display()))]
    pub async fn convert_ontology(&self, ontology: &Path, output: &Path) -> Result<()> {
        let plan = compose_ontology_conversion(&self.scripts, ontology)?;
        self.run_to_output(plan, output).await
    }

    /// Check converted data. `Ok(false)` means the data is invalid.
    ///
    /// With `debug_files`, every log the validation scripts wrote is copied
    /// there.
    #[instrument(skip_all, fields(inputs = inputs.len()))]
    pub async fn validate_data(&self, inputs: &[PathBuf], debug_files: Option<&Path>) -> Result<bool> {
        let plan = compose_raw(&self.scripts, Stage::Validation, inputs)?;
        let session = self.start(plan).await?;

        if let Some(dir) = debug_files {
            copy_logs(&session, dir)?;
        }

        let log = session.output_path(VALIDATION_LOG);
        let verdict = std::fs::read_to_string(&log).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ProbsError::MissingOutput {
                path: log.clone(),
                diagnostics: session.diagnostics(),
            },
            _ => ProbsError::io(&log, e),
        })?;
        let valid = verdict.trim() == "true";
        info!(valid, "validation finished");
        Ok(valid)
    }

    /// Compute the KBC classification hierarchy of converted data.
    #[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
    pub async fn kbc_hierarchy(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let plan = compose_raw(&self.scripts, Stage::KbcHierarchy, inputs)?;
        self.run_to_output(plan, output).await
    }

    /// Apply the enhancement rules to converted data.
    #[instrument(skip_all, fields(inputs = inputs.len(), output = %output.display()))]
    pub async fn enhance_data(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let plan = compose_raw(&self.scripts, Stage::Enhancement, inputs)?;
        self.run_to_output(plan, output).await
    }

    /// Start a reasoning endpoint over enhanced data.
    #[instrument(skip_all, fields(inputs = inputs.len(), port = self.port))]
    pub async fn endpoint(&self, inputs: &[PathBuf]) -> Result<EndpointSession> {
        let plan = compose_endpoint(&self.scripts, inputs, self.port)?;
        let session = self.start(plan).await?;

        let port = session
            .endpoint()
            .and_then(|announced| announced.parse().ok())
            .unwrap_or(self.port);
        let endpoint = Endpoint::local(&self.host, port, &self.datastore, self.namespaces.clone())?;
        info!(url = %endpoint.base_url(), "endpoint ready");
        Ok(EndpointSession { endpoint, session })
    }

    // -- Composites ---------------------------------------------------------

    /// Convert then enhance.
    pub async fn convert_enhance_data(&self, datasources: &[Datasource], output: &Path) -> Result<()> {
        let scratch = Workspace::ephemeral()?;
        let original = scratch.path("probs_original_data.nt.gz");
        self.step("conversion")
            .convert_data(datasources, &original, None)
            .await?;
        self.step("enhancement").enhance_data(&[original], output).await
    }

    /// Convert, then serve the converted data without enhancement.
    pub async fn convert_endpoint(&self, datasources: &[Datasource]) -> Result<EndpointSession> {
        let scratch = Workspace::ephemeral()?;
        let original = scratch.path("probs_original_data.nt.gz");
        self.step("conversion")
            .convert_data(datasources, &original, None)
            .await?;
        self.step("reasoning").endpoint(&[original]).await
    }

    /// Enhance, then serve the enhanced data.
    pub async fn enhance_endpoint(&self, inputs: &[PathBuf]) -> Result<EndpointSession> {
        let scratch = Workspace::ephemeral()?;
        let enhanced = scratch.path("probs_enhanced_data.nt.gz");
        self.step("enhancement").enhance_data(inputs, &enhanced).await?;
        self.step("reasoning").endpoint(&[enhanced]).await
    }

    /// Convert, enhance, then serve.
    pub async fn convert_enhance_endpoint(&self, datasources: &[Datasource]) -> Result<EndpointSession> {
        let scratch = Workspace::ephemeral()?;
        let enhanced = scratch.path("probs_enhanced_data.nt.gz");
        self.convert_enhance_data(datasources, &enhanced).await?;
        self.step("reasoning").endpoint(&[enhanced]).await
    }

    /// Answer `queries` over literal fact text: convert, enhance, serve and
    /// query, then stop the endpoint.
    #[instrument(skip_all, fields(queries = queries.len()))]
    pub async fn query_facts(
        &self,
        facts: &str,
        queries: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, Vec<Record>>> {
        let session = self
            .convert_enhance_endpoint(&[Datasource::from_facts(facts)?])
            .await?;
        let answers = answer_queries(&session, queries).await;
        if let Err(e) = session.close().await {
            warn!("failed to stop endpoint: {e}");
        }
        answers
    }

    // -- Internals ----------------------------------------------------------

    /// Stage, start and wait for one stage.
    #[instrument(skip_all, fields(stage = %plan.stage))]
    async fn start(&self, plan: StagePlan) -> Result<EngineSession> {
        let started = Instant::now();
        let stage = plan.stage;
        self.progress.stage_started(stage);
        info!(entries = plan.tree.len(), "stage starting");

        let workspace = Workspace::stage(&plan.tree, self.working_dir.as_deref())?;
        // A reused working directory may still hold the previous run's results.
        for stale in stage.output().into_iter().chain([VALIDATION_LOG]) {
            workspace.remove(stale)?;
        }
        let script = SessionScript::new(plan.script, stage.readiness())
            .with_prefixes(self.namespaces.clone());
        let mut session = self.engine.run(workspace, &script).await?;
        session.await_ready().await?;

        let elapsed = started.elapsed();
        self.progress.stage_finished(stage, elapsed);
        info!(elapsed_ms = elapsed.as_millis() as u64, "stage finished");
        Ok(session)
    }

    async fn run_to_output(&self, plan: StagePlan, output: &Path) -> Result<()> {
        let artifact = plan.stage.output().ok_or_else(|| {
            ProbsError::invalid_input(format!("stage {} has no output artifact", plan.stage))
        })?;
        let session = self.start(plan).await?;
        copy_artifact(&session, artifact, output)
    }
}

/// Answer named queries in order against `endpoint`.
pub async fn answer_queries(
    endpoint: &Endpoint,
    queries: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, Vec<Record>>> {
    let mut answers = BTreeMap::new();
    for (name, query) in queries {
        let records = endpoint.query_records(query, &[], LiteralMode::Native).await?;
        info!(query = %name, rows = records.len(), "query answered");
        answers.insert(name.clone(), records);
    }
    Ok(answers)
}

/// Copy a finished stage's artifact to `output`.
fn copy_artifact(session: &EngineSession, artifact: &str, output: &Path) -> Result<()> {
    let produced = session.output_path(artifact);
    if !produced.is_file() {
        return Err(ProbsError::MissingOutput {
            path: produced,
            diagnostics: session.diagnostics(),
        });
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ProbsError::io(parent, e))?;
    }
    let bytes = std::fs::copy(&produced, output).map_err(|e| ProbsError::io(output, e))?;
    info!(output = %output.display(), bytes, "output written");
    Ok(())
}

/// Copy every `data/*.log` of a session into `dir`.
fn copy_logs(session: &EngineSession, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| ProbsError::io(dir, e))?;
    let data = session.output_path("data");
    let entries = std::fs::read_dir(&data).map_err(|e| ProbsError::io(&data, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ProbsError::io(&data, e))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
            if let Some(name) = path.file_name() {
                let target = dir.join(name);
                std::fs::copy(&path, &target).map_err(|e| ProbsError::io(&target, e))?;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::stages::tests::fake_scripts_dir;
    use probs_runner_endpoint::Value;
    use probs_runner_shared::EngineSection;

    /// Engine stand-in that imitates each stage by concatenating the files
    /// named in the generated loader.
    const FAKE_RDFOX: &str = r#"cd "$2" || exit 9
session=probs-runner-session.rdfox
imports() {
    sed -n 's/^import "\(.*\)"$/\1/p' "scripts/$1/load_data.rdfox" \
        | grep -v -e '^probs.fss$' -e '^additional_info.ttl$'
}
if grep -q 'exec scripts/data-conversion/master' $session; then
    imports data-conversion | while read -r f; do cat "data/$f"; done > data/probs_original_data.nt.gz
elif grep -q 'exec scripts/data-enhancement/master' $session; then
    imports data-enhancement | while read -r f; do cat "data/$f"; done > data/probs_enhanced_data.nt.gz
    echo '<urn:enhanced> <urn:by> <urn:fake> .' >> data/probs_enhanced_data.nt.gz
elif grep -q 'exec scripts/data-validation/master' $session; then
    echo 'checked' > data/report.log
    if grep -q invalid data/*_*; then echo false > data/valid.log; else echo true > data/valid.log; fi
elif grep -q 'exec scripts/reasoning/master' $session; then
    port=$(sed -n 's/^set endpoint.port "\([0-9]*\)"$/\1/p' $session)
    echo "The REST endpoint was successfully started at port number/service name $port with 1 threads."
    cat > /dev/null
elif grep -q 'exec scripts/kbc-hierarchy/master' $session; then
    echo 'Warning: nothing to do'
fi
"#;

    /// Engine stand-in that records its working directory and never becomes
    /// ready.
    const HANGING_RDFOX: &str = r#"echo "$2" > "$(dirname "$0")/started"
exec sleep 30
"#;

    struct Fixture {
        dir: PathBuf,
        config: RunnerConfig,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_engine(FAKE_RDFOX)
        }

        fn with_engine(script: &str) -> Self {
            let dir = fake_scripts_dir();
            let fake = dir.join("fake-rdfox.sh");
            std::fs::write(&fake, script).unwrap();
            let config = RunnerConfig {
                scripts_dir: dir.clone(),
                working_dir: None,
                port: 12112,
                namespaces: PrefixMap::defaults(),
                engine: EngineSection {
                    executable: "sh".into(),
                    args: vec![fake.display().to_string()],
                    datastore: "default".into(),
                    host: "127.0.0.1".into(),
                },
            };
            Self { dir, config }
        }

        fn runner(&self) -> Runner {
            Runner::new(&self.config)
        }

        fn write(&self, relative: &str, content: &str) -> PathBuf {
            let path = self.dir.join(relative);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, content).unwrap();
            path
        }
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    #[derive(Default)]
    struct RecordingProgress(Mutex<Vec<String>>);

    impl StageProgress for RecordingProgress {
        fn stage_started(&self, stage: Stage) {
            self.0.lock().unwrap().push(format!("start {stage}"));
        }
        fn stage_finished(&self, stage: Stage, _elapsed: Duration) {
            self.0.lock().unwrap().push(format!("finish {stage}"));
        }
    }

    #[tokio::test]
    async fn enhancement_keeps_inputs_with_the_same_base_name() {
        let fx = Fixture::new();
        let one = fx.write("one/data.nt", "<urn:a> <urn:p> \"one\" .\n");
        let two = fx.write("two/data.nt", "<urn:b> <urn:p> \"two\" .\n");
        let output = fx.dir.join("out/enhanced.nt.gz");

        fx.runner().enhance_data(&[one, two], &output).await.unwrap();

        let enhanced = std::fs::read_to_string(&output).unwrap();
        assert!(enhanced.contains("\"one\""));
        assert!(enhanced.contains("\"two\""));
        assert!(enhanced.lines().count() > 2);
    }

    #[tokio::test]
    async fn composite_runs_stages_in_order_in_step_dirs() {
        let fx = Fixture::new();
        let progress = Arc::new(RecordingProgress::default());
        let working = fx.dir.join("work");
        let output = fx.dir.join("enhanced.nt.gz");

        fx.runner()
            .with_working_dir(Some(working.clone()))
            .with_progress(progress.clone())
            .convert_enhance_data(
                &[Datasource::from_facts("<urn:bread> <urn:a> <urn:Object> .\n").unwrap()],
                &output,
            )
            .await
            .unwrap();

        let enhanced = std::fs::read_to_string(&output).unwrap();
        assert!(enhanced.starts_with("<urn:bread> <urn:a> <urn:Object> ."));
        assert!(enhanced.contains("<urn:enhanced>"));
        assert_eq!(
            *progress.0.lock().unwrap(),
            [
                "start data-conversion",
                "finish data-conversion",
                "start data-enhancement",
                "finish data-enhancement"
            ]
        );
        assert!(working.join("conversion/data/probs_original_data.nt.gz").is_file());
        assert!(working.join("enhancement/probs-runner-session.rdfox").is_file());
    }

    #[tokio::test]
    async fn validation_verdict_and_debug_logs() {
        let fx = Fixture::new();
        let good = fx.write("good.nt", "<urn:a> <urn:p> <urn:o> .\n");
        let bad = fx.write("bad.nt", "<urn:a> <urn:p> \"invalid\" .\n");
        let logs = fx.dir.join("logs");

        let runner = fx.runner();
        assert!(runner.validate_data(&[good], Some(&logs)).await.unwrap());
        assert!(logs.join("report.log").is_file());
        assert!(logs.join("valid.log").is_file());
        assert!(!runner.validate_data(&[bad], None).await.unwrap());
    }

    #[tokio::test]
    async fn missing_artifact_is_reported_with_diagnostics() {
        let fx = Fixture::new();
        let input = fx.write("data.nt", "");
        let err = fx
            .runner()
            .kbc_hierarchy(&[input], &fx.dir.join("kbc.nt.gz"))
            .await
            .unwrap_err();
        match &err {
            ProbsError::MissingOutput { path, .. } => {
                assert!(path.ends_with("data/probs_kbc_hierarchy.nt.gz"));
            }
            other => panic!("expected missing output, got {other:?}"),
        }
        assert!(err.diagnostics().iter().any(|l| l.contains("nothing to do")));
    }

    #[tokio::test]
    async fn reused_working_dir_never_returns_previous_results() {
        let fx = Fixture::new();
        let working = fx.dir.join("work");
        fx.write("work/data/probs_kbc_hierarchy.nt.gz", "<urn:first> <urn:run> <urn:o> .\n");
        fx.write("work/data/valid.log", "true\n");
        let input = fx.write("data.nt", "");
        let output = fx.dir.join("kbc.nt.gz");

        let err = fx
            .runner()
            .with_working_dir(Some(working.clone()))
            .kbc_hierarchy(&[input], &output)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbsError::MissingOutput { .. }), "{err:?}");
        assert!(!output.exists());
        assert!(!working.join("data/probs_kbc_hierarchy.nt.gz").exists());
        assert!(!working.join("data/valid.log").exists());
    }

    #[tokio::test]
    async fn construction_errors_precede_engine_start() {
        let fx = Fixture::new();
        let progress = Arc::new(RecordingProgress::default());
        let err = fx
            .runner()
            .with_progress(progress.clone())
            .enhance_data(&[fx.dir.join("missing.nt")], &fx.dir.join("out.nt.gz"))
            .await
            .unwrap_err();
        assert!(err.is_construction());
        assert!(progress.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn query_facts_through_endpoint() {
        use wiremock::matchers::{body_string_contains, method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/datastores/default/sparql"))
            .and(body_string_contains("?obj :hasValue ?value"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "head": {"vars": ["obj", "value"]},
                "results": {"bindings": [
                    {"obj": {"type": "uri", "value": "urn:bread"},
                     "value": {"type": "literal", "value": "6", "datatype": "http://www.w3.org/2001/XMLSchema#double"}},
                    {"obj": {"type": "uri", "value": "urn:cake"},
                     "value": {"type": "literal", "value": "3", "datatype": "http://www.w3.org/2001/XMLSchema#double"}},
                ]},
            })))
            .mount(&server)
            .await;

        let fx = Fixture::new();
        let runner = fx.runner().with_port(server.address().port());
        let queries = BTreeMap::from([(
            "q1".to_string(),
            "SELECT ?obj ?value WHERE { ?obj :hasValue ?value } ORDER BY ?obj".to_string(),
        )]);

        let answers = runner
            .query_facts("<urn:bread> <urn:hasValue> 6 .\n", &queries)
            .await
            .unwrap();
        let rows = &answers["q1"];
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["obj"], Some(Value::iri("urn:bread")));
        assert_eq!(rows[0]["value"], Some(Value::Float(6.0)));
        assert_eq!(rows[1]["value"], Some(Value::Float(3.0)));
    }

    #[tokio::test]
    async fn endpoint_session_stops_engine_on_close() {
        let fx = Fixture::new();
        let input = fx.write("enhanced.nt", "");
        let session = fx.runner().with_port(12177).endpoint(&[input]).await.unwrap();
        assert_eq!(
            session.sparql_url().as_str(),
            "http://127.0.0.1:12177/datastores/default/sparql"
        );
        let root = session.root().to_path_buf();
        assert!(root.join("scripts/reasoning/load_data.rdfox").is_file());
        session.close().await.unwrap();
        assert!(!root.exists());
    }

    #[tokio::test]
    async fn namespace_overrides_reach_script_and_endpoint() {
        let fx = Fixture::new();
        let input = fx.write("enhanced.nt", "");
        let mut overrides = PrefixMap::new();
        overrides.insert("ex", "http://example.org/");
        overrides.insert("probs", "http://example.org/probs#");

        let runner = fx.runner().with_port(12178).with_namespaces(&overrides);
        assert_eq!(runner.namespaces().get("rdf"), PrefixMap::defaults().get("rdf"));
        assert_eq!(runner.namespaces().get("probs"), Some("http://example.org/probs#"));

        let session = runner.endpoint(&[input]).await.unwrap();
        assert_eq!(session.prefixes().get("ex"), Some("http://example.org/"));
        let script = std::fs::read_to_string(session.root().join("probs-runner-session.rdfox")).unwrap();
        assert!(script.contains("prefix ex: <http://example.org/>"));
        assert!(script.contains("prefix probs: <http://example.org/probs#>"));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn abandoned_endpoint_start_stops_the_engine() {
        let fx = Fixture::with_engine(HANGING_RDFOX);
        let input = fx.write("enhanced.nt", "");
        let runner = fx.runner();

        let started = tokio::time::timeout(Duration::from_millis(500), runner.endpoint(&[input])).await;
        assert!(started.is_err());
        let root = std::fs::read_to_string(fx.dir.join("started")).unwrap();
        assert!(!Path::new(root.trim()).exists());
    }
}
