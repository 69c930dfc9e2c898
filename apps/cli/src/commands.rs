//! CLI command definitions, routing, and tracing setup.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Report, Result, eyre};
use color_eyre::{Section, SectionExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncReadExt;
use tracing::info;

use probs_runner_core::{
    Datasource, EndpointSession, Runner, Stage, StageProgress, load_datasource,
};
use probs_runner_shared::{
    AppConfig, ProbsError, RunnerConfig, init_config, load_config, load_config_from,
};

use crate::inspect;

/// Query pre-filled in the console when `endpoint` is given no query files.
const DEFAULT_QUERY: &str = "\
SELECT ?Observation ?p ?o
WHERE {
    ?Observation a :Observation; ?p ?o .
}
ORDER BY ?Observation ?p ?o
";

/// Exit status after Ctrl-C, as shells report SIGINT.
const INTERRUPTED: u8 = 130;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// probs-runner: run PRObs RDFox pipelines.
#[derive(Parser)]
#[command(
    name = "probs-runner",
    version,
    about = "Convert, validate, enhance and query PRObs data with RDFox.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// PRObs ontology folder holding probs.fss and scripts/.
    #[arg(short, long, env = "PROBS_SCRIPTS_DIR")]
    pub scripts: Option<PathBuf>,

    /// Working directory for engine runs (kept afterwards).
    #[arg(short, long, env = "PROBS_WORKING_DIR")]
    pub working_dir: Option<PathBuf>,

    /// RDFox executable.
    #[arg(long, env = "RDFOX_EXECUTABLE")]
    pub rdfox: Option<String>,

    /// Config file (defaults to ~/.probs-runner/probs-runner.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert datasources (directories or load scripts) into PRObs RDF.
    ConvertData {
        /// Datasource directories or `load_data.rdfox` files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output file for the converted data.
        output: PathBuf,

        /// RDFox fact domain to export.
        #[arg(long)]
        fact_domain: Option<String>,
    },

    /// Convert an OWL functional-syntax ontology into Datalog rules.
    ConvertOntology {
        ontology: PathBuf,
        output: PathBuf,
    },

    /// Validate converted PRObs RDF data.
    ValidateData {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Folder to copy the validation log files to.
        #[arg(long)]
        debug_files: Option<PathBuf>,
    },

    /// Compute the KBC classification hierarchy.
    KbcHierarchy {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        output: PathBuf,
    },

    /// Run the enhancement rules on converted data.
    EnhanceData {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        output: PathBuf,
    },

    /// Serve enhanced data as a SPARQL endpoint until Ctrl-C.
    Endpoint {
        inputs: Vec<PathBuf>,

        /// Endpoint port.
        #[arg(short, long)]
        port: Option<u16>,

        /// File(s) holding queries to pre-fill in the console.
        #[arg(short, long = "query")]
        query_files: Vec<PathBuf>,
    },

    /// Serve enhanced data and answer one SPARQL query on stdout.
    ///
    /// Without --query or --query-file the query is read from stdin.
    Query {
        inputs: Vec<PathBuf>,

        /// Endpoint port.
        #[arg(short, long)]
        port: Option<u16>,

        /// SPARQL query text.
        #[arg(short = 'q', long = "query", conflicts_with = "query_file")]
        query: Option<String>,

        /// File to load the query from.
        #[arg(short = 'Q', long)]
        query_file: Option<PathBuf>,

        /// Answer format: ttl, nt, csv, tsv, json, xml, or a MIME type.
        #[arg(short, long, default_value = "ttl")]
        format: String,
    },

    /// Load data and inspect PRObs subjects or observations.
    Inspect {
        inputs: Vec<PathBuf>,

        /// Subject IRI(s) to describe; read interactively when omitted.
        #[arg(short, long)]
        subject: Vec<String>,

        /// Print a summary of the observations found in the data.
        #[arg(long)]
        summary: bool,

        /// Endpoint port.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr so query
/// answers can be piped from stdout.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "probs_runner=info",
        1 => "probs_runner=debug",
        _ => "probs_runner=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<ExitCode> {
    if let Command::Config { action } = &cli.command {
        match action {
            ConfigAction::Init => cmd_config_init()?,
            ConfigAction::Show => cmd_config_show(cli.config.as_deref())?,
        }
        return Ok(ExitCode::SUCCESS);
    }

    let progress = Arc::new(CliProgress::new());
    let runner = build_runner(&cli)?.with_progress(progress.clone());

    let result = match cli.command {
        Command::ConvertData {
            inputs,
            output,
            fact_domain,
        } => cmd_convert_data(&runner, &inputs, &output, fact_domain.as_deref()).await,
        Command::ConvertOntology { ontology, output } => {
            cmd_convert_ontology(&runner, &ontology, &output).await
        }
        Command::ValidateData {
            inputs,
            debug_files,
        } => cmd_validate_data(&runner, &inputs, debug_files.as_deref()).await,
        Command::KbcHierarchy { inputs, output } => {
            cmd_kbc_hierarchy(&runner, &inputs, &output).await
        }
        Command::EnhanceData { inputs, output } => {
            cmd_enhance_data(&runner, &inputs, &output).await
        }
        Command::Endpoint {
            inputs,
            port,
            query_files,
        } => cmd_endpoint(&with_port(runner, port), &inputs, &query_files, &progress).await,
        Command::Query {
            inputs,
            port,
            query,
            query_file,
            format,
        } => {
            cmd_query(
                &with_port(runner, port),
                &inputs,
                query,
                query_file.as_deref(),
                &format,
                &progress,
            )
            .await
        }
        Command::Inspect {
            inputs,
            subject,
            summary,
            port,
        } => cmd_inspect(&with_port(runner, port), &inputs, &subject, summary, &progress).await,
        Command::Config { .. } => Ok(ExitCode::SUCCESS),
    };

    progress.finish();
    result
}

/// Merge the config file with CLI flags into a runner.
fn build_runner(cli: &Cli) -> Result<Runner> {
    let mut config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(executable) = &cli.rdfox {
        config.engine.executable = executable.clone();
    }

    let runner_config =
        RunnerConfig::resolve(&config, cli.scripts.as_deref(), cli.working_dir.as_deref())?;
    info!(
        scripts = %runner_config.scripts_dir.display(),
        rdfox = %runner_config.engine.executable,
        "runner configured"
    );
    Ok(Runner::new(&runner_config))
}

fn with_port(runner: Runner, port: Option<u16>) -> Runner {
    match port {
        Some(port) => runner.with_port(port),
        None => runner,
    }
}

/// Run `work` until it finishes or `cancel` fires. Cancelling drops `work`,
/// which stops any engine it started and removes its scratch directories.
async fn until_cancelled<T>(
    work: impl Future<Output = T>,
    cancel: impl Future<Output = std::io::Result<()>>,
) -> Result<Option<T>> {
    tokio::select! {
        done = work => Ok(Some(done)),
        signal = cancel => {
            signal.map_err(|e| eyre!("failed to listen for Ctrl-C: {e}"))?;
            eprintln!("Interrupted.");
            Ok(None)
        }
    }
}

async fn interruptible<T>(work: impl Future<Output = T>) -> Result<Option<T>> {
    until_cancelled(work, tokio::signal::ctrl_c()).await
}

/// Start the endpoint; `None` when start-up was interrupted.
async fn start_endpoint(
    runner: &Runner,
    inputs: &[PathBuf],
    progress: &CliProgress,
) -> Result<Option<EndpointSession>> {
    let started = interruptible(runner.endpoint(inputs)).await;
    progress.finish();
    started?.transpose().map_err(report)
}

/// Turn a library error into a report, attaching captured engine output.
fn report(err: ProbsError) -> Report {
    let diagnostics = err.diagnostics().join("\n");
    let report = Report::new(err);
    if diagnostics.is_empty() {
        report
    } else {
        report.with_section(move || diagnostics.header("Engine output:"))
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_convert_data(
    runner: &Runner,
    inputs: &[PathBuf],
    output: &Path,
    fact_domain: Option<&str>,
) -> Result<ExitCode> {
    let datasources = inputs
        .iter()
        .map(|path| load_datasource(path))
        .collect::<std::result::Result<Vec<Datasource>, _>>()
        .map_err(report)?;

    eprintln!("Converting {} datasources...", datasources.len());
    let Some(converted) = interruptible(runner.convert_data(&datasources, output, fact_domain)).await?
    else {
        return Ok(ExitCode::from(INTERRUPTED));
    };
    converted.map_err(report)?;
    eprintln!("Output written to {}.", output.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_convert_ontology(runner: &Runner, ontology: &Path, output: &Path) -> Result<ExitCode> {
    let Some(converted) = interruptible(runner.convert_ontology(ontology, output)).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };
    converted.map_err(report)?;
    eprintln!("Output written to {}.", output.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_validate_data(
    runner: &Runner,
    inputs: &[PathBuf],
    debug_files: Option<&Path>,
) -> Result<ExitCode> {
    eprintln!("Validating {} inputs...", inputs.len());
    let Some(verdict) = interruptible(runner.validate_data(inputs, debug_files)).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };
    let valid = verdict.map_err(report)?;

    if valid {
        eprintln!("Validation passed.");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("Validation failed.");
        if let Some(dir) = debug_files {
            eprintln!("Log files copied to {}.", dir.display());
        }
        Ok(ExitCode::FAILURE)
    }
}

async fn cmd_kbc_hierarchy(runner: &Runner, inputs: &[PathBuf], output: &Path) -> Result<ExitCode> {
    eprintln!("Building KBC hierarchy from {} inputs...", inputs.len());
    let Some(built) = interruptible(runner.kbc_hierarchy(inputs, output)).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };
    built.map_err(report)?;
    eprintln!("Output written to {}.", output.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_enhance_data(runner: &Runner, inputs: &[PathBuf], output: &Path) -> Result<ExitCode> {
    eprintln!("Enhancing {} inputs...", inputs.len());
    let Some(enhanced) = interruptible(runner.enhance_data(inputs, output)).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };
    enhanced.map_err(report)?;
    eprintln!("Output written to {}.", output.display());
    Ok(ExitCode::SUCCESS)
}

async fn cmd_endpoint(
    runner: &Runner,
    inputs: &[PathBuf],
    query_files: &[PathBuf],
    progress: &CliProgress,
) -> Result<ExitCode> {
    let mut queries = Vec::with_capacity(query_files.len());
    for path in query_files {
        queries.push(
            std::fs::read_to_string(path)
                .map_err(|e| eyre!("failed to read query file {}: {e}", path.display()))?,
        );
    }
    let Some(session) = start_endpoint(runner, inputs, progress).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };

    let query = if queries.is_empty() {
        format!("{}{DEFAULT_QUERY}", session.prefixes().sparql_prologue())
    } else {
        queries.join("\n")
    };

    eprintln!("Started endpoint.");
    eprintln!("Open {} in your browser.", session.console_url(Some(&query)));
    eprintln!("Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("failed to listen for Ctrl-C: {e}"))?;
    eprintln!("Stopping endpoint...");
    session.close().await.map_err(report)?;
    Ok(ExitCode::SUCCESS)
}

async fn cmd_query(
    runner: &Runner,
    inputs: &[PathBuf],
    query: Option<String>,
    query_file: Option<&Path>,
    format: &str,
    progress: &CliProgress,
) -> Result<ExitCode> {
    let query = match (query, query_file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read query file {}: {e}", path.display()))?,
        (None, None) => {
            let mut text = String::new();
            tokio::io::stdin()
                .read_to_string(&mut text)
                .await
                .map_err(|e| eyre!("failed to read query from stdin: {e}"))?;
            text
        }
    };

    let Some(session) = start_endpoint(runner, inputs, progress).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };

    let answer = interruptible(async {
        match session.query_raw(&query, format).await {
            Ok(response) => response.copy_to(&mut tokio::io::stdout()).await,
            Err(e) => Err(e),
        }
    })
    .await;
    session.close().await.map_err(report)?;

    match answer? {
        Some(written) => {
            let bytes = written.map_err(report)?;
            info!(bytes, "answer written");
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::from(INTERRUPTED)),
    }
}

async fn cmd_inspect(
    runner: &Runner,
    inputs: &[PathBuf],
    subjects: &[String],
    summary: bool,
    progress: &CliProgress,
) -> Result<ExitCode> {
    eprintln!("Loading data...");
    let Some(session) = start_endpoint(runner, inputs, progress).await? else {
        return Ok(ExitCode::from(INTERRUPTED));
    };

    let outcome = interruptible(async {
        if summary {
            inspect::print_summary(&session).await
        } else if !subjects.is_empty() {
            inspect::print_subjects(&session, subjects).await
        } else {
            inspect::interactive(&session).await
        }
    })
    .await;
    session.close().await.map_err(report)?;

    match outcome? {
        Some(inspected) => {
            inspected?;
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::from(INTERRUPTED)),
    }
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config: AppConfig = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
pub(crate) struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        Self { spinner }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

impl StageProgress for CliProgress {
    fn stage_started(&self, stage: Stage) {
        self.spinner.reset();
        self.spinner.enable_steady_tick(Duration::from_millis(80));
        self.spinner.set_message(format!("{}...", stage.label()));
    }

    fn stage_finished(&self, stage: Stage, elapsed: Duration) {
        self.spinner.disable_steady_tick();
        self.spinner
            .println(format!("  {} ({:.1}s)", stage.label(), elapsed.as_secs_f64()));
        self.spinner.set_message(String::new());
    }
}
