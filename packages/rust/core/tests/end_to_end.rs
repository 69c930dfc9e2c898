//! Scenarios against a real RDFox and PRObs ontology checkout.
//!
//! Run with `PROBS_SCRIPTS_DIR=<ontology> RDFOX_EXECUTABLE=<RDFox> cargo test -- --ignored`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use probs_runner_core::{
    BoundKind, Endpoint, LiteralMode, ObservationQuery, Runner, Value, answer_queries,
    load_datasource,
};
use probs_runner_shared::{AppConfig, PROBS, QUANTITYKIND, RunnerConfig};

const SIMPLE: &str = "https://ukfires.org/probs/ontology/data/simple/";

const VALUES: &str = "\
<https://ukfires.org/probs/ontology/data/simple/Object-Bread> <https://ukfires.org/probs/ontology/hasValue> \"6\"^^<http://www.w3.org/2001/XMLSchema#double> .
<https://ukfires.org/probs/ontology/data/simple/Object-Cake> <https://ukfires.org/probs/ontology/hasValue> \"3\"^^<http://www.w3.org/2001/XMLSchema#double> .
";

const OBSERVATION: &str = "\
<http://example.org/Obs> <https://ukfires.org/probs/ontology/measurement> \"8551330\"^^<http://www.w3.org/2001/XMLSchema#double> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/objectDefinedBy> <http://example.org/unfccc/N2O> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/processDefinedBy> <http://example.org/unfccc/1.> .
<http://example.org/Obs> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <https://ukfires.org/probs/ontology/DirectObservation> .
<http://example.org/Obs> <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> <https://ukfires.org/probs/ontology/Observation> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/metric> <http://qudt.org/vocab/quantitykind/Mass> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/bound> <https://ukfires.org/probs/ontology/ExactBound> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/hasRole> <https://ukfires.org/probs/ontology/ProcessOutput> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/hasTimePeriod> <https://ukfires.org/probs/ontology/TimePeriod_YearOf2018> .
<http://example.org/Obs> <https://ukfires.org/probs/ontology/hasRegion> <https://ukfires.org/probs/ontology/RegionGBR> .
";

struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("probs-e2e-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.0.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

fn runner(port: u16) -> Runner {
    let scripts = std::env::var("PROBS_SCRIPTS_DIR")
        .expect("PROBS_SCRIPTS_DIR must point at a PRObs ontology checkout");
    let mut config = AppConfig::default();
    if let Ok(rdfox) = std::env::var("RDFOX_EXECUTABLE") {
        config.engine.executable = rdfox;
    }
    let resolved = RunnerConfig::resolve(&config, Some(Path::new(&scripts)), None).unwrap();
    Runner::new(&resolved).with_port(port)
}

async fn triple_count(endpoint: &Endpoint) -> i64 {
    let rows = endpoint
        .query_records(
            "SELECT (COUNT(*) AS ?n) WHERE { ?s ?p ?o }",
            &[],
            LiteralMode::Native,
        )
        .await
        .unwrap();
    match rows[0]["n"] {
        Some(Value::Integer(n)) => n,
        ref other => panic!("unexpected count {other:?}"),
    }
}

#[tokio::test]
#[ignore = "needs RDFox and the PRObs ontology scripts"]
async fn convert_simple_datasource() {
    let scratch = Scratch::new();
    let fixture = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures/datasources/simple");
    let source = load_datasource(&fixture).unwrap();
    let output = scratch.0.join("output.nt.gz");

    let runner = runner(12150).with_working_dir(Some(scratch.0.join("working")));
    runner.convert_data(&[source], &output, None).await.unwrap();
    assert!(output.is_file());

    let session = runner.with_working_dir(None).endpoint(&[output]).await.unwrap();
    let rows = session
        .query_records(
            "SELECT ?value WHERE { ?obj :hasValue ?value }",
            &[("obj".into(), Value::iri(format!("{SIMPLE}Object-Bread")))],
            LiteralMode::Native,
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["value"], Some(Value::Float(6.0)));
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs RDFox and the PRObs ontology scripts"]
async fn enhancement_adds_triples() {
    let scratch = Scratch::new();
    let original = scratch.write(
        "original.nt",
        "<https://ukfires.org/probs/ontology/data/simple/Object-Bread> \
         <http://www.w3.org/1999/02/22-rdf-syntax-ns#type> \
         <https://ukfires.org/probs/ontology/Object> .\n",
    );
    let enhanced = scratch.0.join("enhanced.nt.gz");

    let runner = runner(12151);
    runner.enhance_data(&[original.clone()], &enhanced).await.unwrap();

    let before = runner.endpoint(&[original]).await.unwrap();
    let original_count = triple_count(&before).await;
    before.close().await.unwrap();

    let after = runner.endpoint(&[enhanced]).await.unwrap();
    let enhanced_count = triple_count(&after).await;
    after.close().await.unwrap();

    assert!(enhanced_count > original_count, "{enhanced_count} <= {original_count}");
}

#[tokio::test]
#[ignore = "needs RDFox and the PRObs ontology scripts"]
async fn endpoint_answers_queries_in_order() {
    let scratch = Scratch::new();
    let data = scratch.write("values.nt", VALUES);
    let query = "SELECT ?obj ?value WHERE { ?obj :hasValue ?value } ORDER BY ?obj";

    let session = runner(12152).endpoint(&[data]).await.unwrap();
    let rows = session.query_records(query, &[], LiteralMode::Native).await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["obj"], Some(Value::iri(format!("{SIMPLE}Object-Bread"))));
    assert_eq!(rows[0]["value"], Some(Value::Float(6.0)));
    assert_eq!(rows[1]["obj"], Some(Value::iri(format!("{SIMPLE}Object-Cake"))));
    assert_eq!(rows[1]["value"], Some(Value::Float(3.0)));

    let answers = answer_queries(&session, &BTreeMap::from([("q1".to_string(), query.to_string())]))
        .await
        .unwrap();
    assert_eq!(answers["q1"], rows);
    session.close().await.unwrap();
}

#[tokio::test]
#[ignore = "needs RDFox and the PRObs ontology scripts"]
async fn observations_match_every_dimension() {
    let scratch = Scratch::new();
    let data = scratch.write("observation.nt", OBSERVATION);
    let session = runner(12153).endpoint(&[data]).await.unwrap();

    let query = |year: &str| {
        ObservationQuery::new(
            PROBS.term(year),
            PROBS.term("RegionGBR"),
            QUANTITYKIND.term("Mass"),
            PROBS.term("ProcessOutput"),
        )
        .object("http://example.org/unfccc/N2O")
        .process("http://example.org/unfccc/1.")
    };

    let found = session
        .get_observations(&query("TimePeriod_YearOf2018"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    let obs = &found[0];
    assert_eq!(obs.uri.as_str(), "http://example.org/Obs");
    assert_eq!(obs.measurement, 8551330.0);
    assert_eq!(obs.bound, BoundKind::Exact);
    assert_eq!(
        obs.object.as_ref().map(|o| o.as_str()),
        Some("http://example.org/unfccc/N2O")
    );

    let none = session
        .get_observations(&query("TimePeriod_YearOf2019"))
        .await
        .unwrap();
    assert!(none.is_empty());
    session.close().await.unwrap();
}
