//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use kss_styleguide_core::{
    Artifact, BuildContext, Callbacks, ModelBuilder, ProgressReporter, RunReport, Sequencer,
    SourceFile, StyleguidePipeline,
};
use kss_styleguide_kss::KssParser;
use kss_styleguide_shared::{
    AppConfig, Phase, SectionRef, StyleguideOptions, init_config, load_config, load_config_from,
};

use crate::output::SectionWriter;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// kss-styleguide: build a living style guide from KSS comments.
#[derive(Parser)]
#[command(
    name = "kss-styleguide",
    version,
    about = "Parse KSS documentation out of stylesheets and build one output set per section.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Read configuration from this file instead of ~/.kss-styleguide.
    #[arg(long, global = true, env = "KSS_STYLEGUIDE_CONFIG")]
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
    /// Parse the inputs and write section output.
    Build {
        /// Source files or glob patterns, read in sorted order.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output directory (defaults to `build.output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Keep descriptions as plain text.
        #[arg(long)]
        no_markdown: bool,

        /// Bound on each phase's drain in seconds; 0 waits forever.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },

    /// Parse the inputs and print the documentation model as JSON.
    Inspect {
        /// Source files or glob patterns, read in sorted order.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Keep descriptions as plain text.
        #[arg(long)]
        no_markdown: bool,
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

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kss_styleguide=info",
        1 => "kss_styleguide=debug",
        _ => "kss_styleguide=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Command::Build {
            inputs,
            out,
            no_markdown,
            timeout_secs,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_build(&config, &inputs, out, no_markdown, timeout_secs).await
        }
        Command::Inspect {
            inputs,
            no_markdown,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_inspect(&config, &inputs, no_markdown).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path.as_deref()),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

/// Expand files and glob patterns into a sorted, de-duplicated list.
fn resolve_inputs(inputs: &[String]) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for input in inputs {
        let literal = PathBuf::from(input);
        if literal.is_file() {
            paths.push(literal);
            continue;
        }

        let matches = glob::glob(input).wrap_err_with(|| format!("invalid pattern '{input}'"))?;
        let before = paths.len();
        for entry in matches {
            let path = entry.wrap_err_with(|| format!("cannot read a match of '{input}'"))?;
            if path.is_file() {
                paths.push(path);
            }
        }
        if paths.len() == before {
            return Err(eyre!("no input files match '{input}'"));
        }
    }

    paths.sort();
    paths.dedup();
    Ok(paths)
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

async fn cmd_build(
    config: &AppConfig,
    inputs: &[String],
    out: Option<PathBuf>,
    no_markdown: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let paths = resolve_inputs(inputs)?;
    let out_dir = out.unwrap_or_else(|| PathBuf::from(&config.build.output_dir));

    let mut options = StyleguideOptions::from(config);
    if no_markdown {
        options.parse.markdown = false;
    }
    if let Some(secs) = timeout_secs {
        options.phase_timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }

    tokio::fs::create_dir_all(&out_dir)
        .await
        .wrap_err_with(|| format!("cannot create output directory {}", out_dir.display()))?;

    info!(
        inputs = paths.len(),
        out = %out_dir.display(),
        markdown = options.parse.markdown,
        "building style guide"
    );

    let writer = Arc::new(SectionWriter::new(&out_dir, options.parse.markdown));
    let index_writer = Arc::clone(&writer);
    let callbacks = Callbacks::new()
        .on_section(move |ctx: BuildContext| writer.section_producers(&ctx))
        .on_all_built(move |ctx: BuildContext| index_writer.index_producer(&ctx));

    let reporter = Arc::new(CliProgress::new());
    let sequencer = Sequencer::kss(options, callbacks).with_progress(reporter);
    let mut pipeline = StyleguidePipeline::new(sequencer);

    for path in &paths {
        let file = SourceFile::read(path).await?;
        pipeline.transform(file)?;
        debug!(path = %path.display(), "buffered");
    }

    let report = pipeline.end().await?;

    println!();
    println!("  Style guide built!");
    println!("  Run:       {}", report.run_id);
    println!("  Sections:  {}", report.section_count);
    println!("  Roots:     {}", report.sections_dispatched);
    println!(
        "  Files:     {}",
        report.section_artifacts + report.finalize_artifacts
    );
    println!("  Digest:    {}", report.source_digest);
    println!("  Path:      {}", out_dir.display());
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// inspect
// ---------------------------------------------------------------------------

async fn cmd_inspect(config: &AppConfig, inputs: &[String], no_markdown: bool) -> Result<()> {
    let paths = resolve_inputs(inputs)?;

    let mut options = StyleguideOptions::from(config).parse;
    if no_markdown {
        options.markdown = false;
    }

    let mut source = String::new();
    for path in &paths {
        let bytes = tokio::fs::read(path)
            .await
            .wrap_err_with(|| format!("cannot read {}", path.display()))?;
        source.push_str(&String::from_utf8_lossy(&bytes));
    }

    let model = KssParser::new().build(source, options).await?;
    info!(sections = model.len(), "parsed");

    println!("{}", serde_json::to_string_pretty(&model)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config written to {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let rendered = toml::to_string_pretty(&config)?;
    print!("{rendered}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
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
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: Phase) {
        if phase.is_terminal() {
            self.spinner.finish_and_clear();
        } else {
            self.spinner.set_message(phase.to_string());
        }
    }

    fn section_dispatched(&self, reference: &SectionRef, producers: usize) {
        self.spinner
            .set_message(format!("Building section {reference} ({producers} outputs)"));
    }

    fn artifact(&self, artifact: &Artifact) {
        self.spinner.set_message(format!("Wrote {}", artifact.name));
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}
