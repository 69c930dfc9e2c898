//! SPARQL query facade over a running RDFox endpoint.
//!
//! Queries are sent as `POST <base>/datastores/<datastore>/sparql` with an
//! `application/sparql-query` body. The endpoint's prefix map is turned into
//! a `PREFIX` prologue in front of every query, so callers can write
//! `:Observation` instead of full IRIs.

mod observations;
mod results;

use reqwest::{Client, Response, header};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};
use url::Url;

use probs_runner_shared::{PrefixMap, ProbsError, Result};

pub use observations::{BoundKind, Observation, ObservationQuery};
pub use results::{LiteralMode, Record, Value, parse_records};

/// User-Agent string for endpoint requests.
const USER_AGENT: &str = concat!("probs-runner/", env!("CARGO_PKG_VERSION"));

/// Datastore queried when none is configured.
pub const DEFAULT_DATASTORE: &str = "default";

const SPARQL_QUERY: &str = "application/sparql-query";
const SPARQL_RESULTS_JSON: &str = "application/sparql-results+json";

/// Resolve a short result format name (`ttl`, `nt`, `csv`, `tsv`, `json`,
/// `xml`) to its MIME type. Anything containing a `/` is taken as a MIME
/// type already.
pub fn format_mime(format: &str) -> Result<&str> {
    let mime = match format {
        "ttl" | "turtle" => "text/turtle",
        "nt" | "ntriples" => "application/n-triples",
        "csv" => "text/csv",
        "tsv" => "text/tab-separated-values",
        "json" => SPARQL_RESULTS_JSON,
        "xml" => "application/sparql-results+xml",
        mime if mime.contains('/') => mime,
        other => {
            return Err(ProbsError::invalid_input(format!(
                "unknown result format '{other}' (expected ttl, nt, csv, tsv, json, xml or a MIME type)"
            )));
        }
    };
    Ok(mime)
}

// ---------------------------------------------------------------------------
// Endpoint
// ---------------------------------------------------------------------------

/// A connection to a SPARQL endpoint.
#[derive(Debug, Clone)]
pub struct Endpoint {
    client: Client,
    base: Url,
    datastore: String,
    sparql: Url,
    prefixes: PrefixMap,
}

impl Endpoint {
    /// Attach to an endpoint at `base` (e.g. `http://localhost:12112`),
    /// querying the default datastore.
    pub fn connect(base: &Url, prefixes: PrefixMap) -> Result<Self> {
        Self::connect_datastore(base, DEFAULT_DATASTORE, prefixes)
    }

    /// Attach to a specific datastore of an endpoint.
    pub fn connect_datastore(base: &Url, datastore: &str, prefixes: PrefixMap) -> Result<Self> {
        let base = with_trailing_slash(base);
        let sparql = base
            .join(&format!("datastores/{datastore}/sparql"))
            .map_err(|e| ProbsError::invalid_input(format!("bad datastore '{datastore}': {e}")))?;
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ProbsError::Network(format!("failed to build HTTP client: {e}")))?;

        debug!(%sparql, "endpoint configured");
        Ok(Self {
            client,
            base,
            datastore: datastore.to_string(),
            sparql,
            prefixes,
        })
    }

    /// Endpoint served by a local engine on `port`.
    pub fn local(host: &str, port: u16, datastore: &str, prefixes: PrefixMap) -> Result<Self> {
        let base = Url::parse(&format!("http://{host}:{port}/"))
            .map_err(|e| ProbsError::invalid_input(format!("bad endpoint host '{host}': {e}")))?;
        Self::connect_datastore(&base, datastore, prefixes)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn sparql_url(&self) -> &Url {
        &self.sparql
    }

    pub fn prefixes(&self) -> &PrefixMap {
        &self.prefixes
    }

    /// URL of the engine's web console for this datastore, optionally
    /// pre-filled with `query`.
    pub fn console_url(&self, query: Option<&str>) -> Url {
        let mut url = self.base.clone();
        url.set_path(&format!("console/{}", self.datastore));
        if let Some(query) = query {
            url.query_pairs_mut().append_pair("query", query);
        }
        url
    }

    /// Run `query` and return the response in `format` (see [`format_mime`]).
    #[instrument(skip_all, fields(format = %format))]
    pub async fn query_raw(&self, query: &str, format: &str) -> Result<RawResponse> {
        let mime = format_mime(format)?;
        let response = self.post(query, mime).await?;
        Ok(RawResponse {
            content_type: mime.to_string(),
            response,
        })
    }

    /// Run a SELECT query and decode its rows.
    ///
    /// `bindings` are appended as a `VALUES` block, so each variable is
    /// fixed to the given value before projection.
    #[instrument(skip_all, fields(bindings = bindings.len(), mode = ?mode))]
    pub async fn query_records(
        &self,
        query: &str,
        bindings: &[(String, Value)],
        mode: LiteralMode,
    ) -> Result<Vec<Record>> {
        let query = with_values(query, bindings);
        let response = self.post(&query, SPARQL_RESULTS_JSON).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| ProbsError::Network(format!("failed to read query results: {e}")))?;
        let records = parse_records(&body, mode, &self.prefixes)?;
        debug!(rows = records.len(), "query answered");
        Ok(records)
    }

    /// Observations matching every dimension of `query`.
    #[instrument(skip_all, fields(time = %query.time, region = %query.region))]
    pub async fn get_observations(&self, query: &ObservationQuery) -> Result<Vec<Observation>> {
        let (text, bindings) = query.to_sparql();
        let records = self.query_records(&text, &bindings, LiteralMode::Native).await?;
        let observations = records
            .iter()
            .map(|record| query.decode(record))
            .collect::<Result<Vec<_>>>()?;
        info!(count = observations.len(), "observations found");
        Ok(observations)
    }

    async fn post(&self, query: &str, accept: &str) -> Result<Response> {
        let body = format!("{}{query}", self.prefixes.sparql_prologue());
        let response = self
            .client
            .post(self.sparql.clone())
            .header(header::CONTENT_TYPE, SPARQL_QUERY)
            .header(header::ACCEPT, accept)
            .body(body)
            .send()
            .await
            .map_err(|e| ProbsError::Network(format!("{}: {e}", self.sparql)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProbsError::Query {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// RawResponse
// ---------------------------------------------------------------------------

/// A streamed query response.
#[derive(Debug)]
pub struct RawResponse {
    content_type: String,
    response: Response,
}

impl RawResponse {
    /// MIME type that was requested.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Next chunk of the body, `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Vec<u8>>> {
        self.response
            .chunk()
            .await
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .map_err(|e| ProbsError::Network(format!("failed to read response: {e}")))
    }

    /// Stream the whole body into `writer`, returning the byte count.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0u64;
        while let Some(chunk) = self.chunk().await? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| ProbsError::io("<output>", e))?;
            written += chunk.len() as u64;
        }
        writer.flush().await.map_err(|e| ProbsError::io("<output>", e))?;
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Append a `VALUES` block binding each variable to one value.
fn with_values(query: &str, bindings: &[(String, Value)]) -> String {
    if bindings.is_empty() {
        return query.to_string();
    }
    let vars: Vec<String> = bindings.iter().map(|(var, _)| format!("?{var}")).collect();
    let values: Vec<String> = bindings.iter().map(|(_, value)| value.to_sparql()).collect();
    format!(
        "{}\nVALUES ({}) {{ ({}) }}\n",
        query.trim_end(),
        vars.join(" "),
        values.join(" ")
    )
}
