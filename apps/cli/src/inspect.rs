//! Plain-text inspection of PRObs data served by an endpoint.

use std::collections::{BTreeMap, BTreeSet};

use color_eyre::eyre::{Result, eyre};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use probs_runner_core::{Endpoint, LiteralMode, Record, Value};
use probs_runner_shared::{Iri, PrefixMap};

const SUBJECT_QUERY: &str = "
SELECT ?p ?o
WHERE {
    ?s ?p ?o .
}
ORDER BY ?p ?o
";

const OBSERVATIONS_COUNT: &str = "
SELECT (COUNT(DISTINCT ?Observation) AS ?count) (SUM(COALESCE(?DirectCounter, 0)) AS ?direct)
WHERE {
    ?Observation a :Observation .
    OPTIONAL { ?Observation a :DirectObservation . BIND(1 AS ?DirectCounter) }
}
";

const OBSERVATIONS_SUMMARY: &str = "
SELECT ?p (COUNT(DISTINCT ?o) AS ?count)
WHERE {
    ?Observation a :Observation ; ?p ?o .
    FILTER(?p IN (:processDefinedBy, :objectDefinedBy, :hasRegion, :hasTimePeriod, :hasRole, :metric, :bound))
}
GROUP BY ?p
ORDER BY ?p
";

/// Observation counts, then the number of distinct values per dimension.
pub(crate) async fn print_summary(endpoint: &Endpoint) -> Result<()> {
    let counts = endpoint
        .query_records(OBSERVATIONS_COUNT, &[], LiteralMode::Native)
        .await?;
    println!();
    for row in &counts {
        println!(
            "{:>3} Observations, of which {:>3} are Direct.",
            integer(row, "count"),
            integer(row, "direct")
        );
    }
    println!();

    let dimensions = endpoint
        .query_records(OBSERVATIONS_SUMMARY, &[], LiteralMode::N3)
        .await?;
    for row in &dimensions {
        let predicate = row
            .get("p")
            .and_then(Option::as_ref)
            .map(term_text)
            .unwrap_or_default();
        println!("{predicate:40} {:>3}", integer(row, "count"));
    }
    Ok(())
}

/// Describe each subject in turn.
pub(crate) async fn print_subjects(endpoint: &Endpoint, subjects: &[String]) -> Result<()> {
    for subject in subjects {
        print!("{}", describe(endpoint, subject).await?);
    }
    Ok(())
}

/// Prompt for subjects on stdin until an empty line or end of input.
pub(crate) async fn interactive(endpoint: &Endpoint) -> Result<()> {
    let mut lines = stdin_lines();
    let mut stderr = tokio::io::stderr();
    loop {
        stderr.write_all(b"Subject> ").await?;
        stderr.flush().await?;
        let Some(line) = lines.recv().await else {
            break;
        };
        let line = line?;
        let subject = line.trim();
        if subject.is_empty() {
            break;
        }
        print!("{}", describe(endpoint, subject).await?);
    }
    Ok(())
}

/// Lines of stdin, read on a detached thread so an abandoned prompt does not
/// hold up exit.
fn stdin_lines() -> mpsc::Receiver<std::io::Result<String>> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn describe(endpoint: &Endpoint, subject: &str) -> Result<String> {
    let iri = expand_subject(endpoint.prefixes(), subject)?;
    let records = endpoint
        .query_records(SUBJECT_QUERY, &[("s".to_string(), Value::Iri(iri))], LiteralMode::N3)
        .await?;
    Ok(format_subject(&records))
}

/// Accept either a full IRI or a `prefix:local` name.
fn expand_subject(prefixes: &PrefixMap, subject: &str) -> Result<Iri> {
    let subject = subject.trim_start_matches('<').trim_end_matches('>');
    if subject.contains("://") || subject.starts_with("urn:") {
        return Ok(Iri::new(subject));
    }
    let (prefix, local) = subject
        .split_once(':')
        .ok_or_else(|| eyre!("'{subject}' is neither an IRI nor a prefixed name"))?;
    let namespace = prefixes
        .get(prefix)
        .ok_or_else(|| eyre!("unknown prefix '{prefix}:'"))?;
    Ok(Iri::new(format!("{namespace}{local}")))
}

/// Predicates with their objects, one block per predicate.
fn format_subject(records: &[Record]) -> String {
    if records.is_empty() {
        return "** Nothing found!\n".to_string();
    }

    let mut grouped: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for record in records {
        let (Some(Some(p)), Some(Some(o))) = (record.get("p"), record.get("o")) else {
            continue;
        };
        grouped.entry(term_text(p)).or_default().insert(term_text(o));
    }

    let mut out = String::new();
    for (predicate, objects) in grouped {
        out.push_str(&predicate);
        out.push('\n');
        for object in objects {
            out.push_str("   ");
            out.push_str(&object);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Text of a term as returned in N3 mode.
fn term_text(value: &Value) -> String {
    value.as_str().map_or_else(|| value.to_string(), str::to_string)
}

fn integer(row: &Record, column: &str) -> i64 {
    match row.get(column).cloned().flatten() {
        Some(Value::Integer(n)) => n,
        Some(other) => other.as_f64().map_or(0, |f| f as i64),
        None => 0,
    }
}
