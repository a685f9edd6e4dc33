//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use scrapegraph_core::{Collaborators, ScraperGraph};
use scrapegraph_graph::{GraphObserver, GraphStatus, RunOptions};
use scrapegraph_shared::{
    AppConfig, SchemaDescriptor, SourceType, init_config, load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ScrapeGraph: ask questions about local data files.
#[derive(Parser)]
#[command(
    name = "scrapegraph",
    version,
    about = "Answer natural-language questions about JSON, CSV, XML and Markdown files.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Run a scraper graph over a file or directory and print the answer.
    Run {
        /// Question to answer.
        #[arg(short, long)]
        prompt: String,

        /// File or directory to read.
        #[arg(short, long)]
        source: String,

        /// Source type: json, csv, xml, or md.
        #[arg(short = 't', long = "type", default_value = "json")]
        source_type: SourceType,

        /// Config file (defaults to ~/.scrapegraph/scrapegraph.toml).
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the reasoning model (`provider/model`).
        #[arg(short, long)]
        model: Option<String>,

        /// JSON Schema file describing the expected answer.
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Print per-node timings and token usage after the answer.
        #[arg(long)]
        exec_info: bool,
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
    Show {
        /// Config file to show instead of the default location.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "scrapegraph=warn",
        1 => "scrapegraph=info",
        2 => "scrapegraph=debug",
        _ => "scrapegraph=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run {
            prompt,
            source,
            source_type,
            config,
            model,
            schema,
            exec_info,
        } => {
            let args = RunArgs {
                prompt,
                source,
                source_type,
                config,
                model,
                schema,
                exec_info,
            };
            cmd_run(args).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show { config } => cmd_config_show(config.as_deref()),
        },
    }
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

struct RunArgs {
    prompt: String,
    source: String,
    source_type: SourceType,
    config: Option<PathBuf>,
    model: Option<String>,
    schema: Option<PathBuf>,
    exec_info: bool,
}

/// Resolve config: explicit file, else the user config, then CLI overrides.
fn resolve_config(path: Option<&Path>, model: Option<&str>) -> Result<AppConfig> {
    let mut config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    if let Some(model) = model {
        config.llm.model = model.to_string();
    }
    Ok(config)
}

/// Read a JSON Schema file; its `title` (or the file stem) names the schema.
fn load_schema(path: &Path) -> Result<SchemaDescriptor> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read schema file {}", path.display()))?;
    let schema: serde_json::Value = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("schema file {} is not valid JSON", path.display()))?;

    let name = schema
        .get("title")
        .and_then(|t| t.as_str())
        .map(String::from)
        .or_else(|| {
            path.file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .ok_or_else(|| eyre!("cannot derive a schema name from {}", path.display()))?;

    Ok(SchemaDescriptor::new(name, schema))
}

async fn cmd_run(args: RunArgs) -> Result<()> {
    let config = resolve_config(args.config.as_deref(), args.model.as_deref())?;
    let schema = args.schema.as_deref().map(load_schema).transpose()?;

    let mut scraper = ScraperGraph::new(
        args.source_type,
        args.prompt,
        &args.source,
        &config,
        schema,
        Collaborators::local(),
    )?;

    info!(
        source = %args.source,
        input_key = %scraper.input_key(),
        model = %config.llm.model,
        "running scraper graph"
    );

    let progress = Arc::new(CliProgress::new());
    let options = RunOptions::default().with_observer(progress.clone());
    let result = scraper.run_with(&options).await;
    progress.clear();

    let answer = result?;
    println!("{answer}");

    if args.exec_info {
        if let Some(info) = scraper.execution_info() {
            println!();
            print!("{}", info.to_table());
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Graph observer that drives an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }

    fn clear(&self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

impl GraphObserver for CliProgress {
    fn node_started(&self, name: &str, index: usize, total: usize) {
        self.spinner
            .set_message(format!("[{}/{total}] {name}", index + 1));
    }

    fn node_finished(&self, name: &str, elapsed: Duration) {
        self.spinner
            .set_message(format!("{name} done in {:.1}s", elapsed.as_secs_f64()));
    }

    fn run_finished(&self, _status: GraphStatus) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path, None)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
