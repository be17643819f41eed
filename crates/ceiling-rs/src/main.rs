//! Probe an LLM endpoint for its real context-window and output-token limits.
//!
//! Reads the API key from the `OPENROUTER_KEY` environment variable (or the
//! variable named by `--api-key-env`).
//!
//! # Examples
//!
//! ```sh
//! # Context window
//! ceiling context --model openai/gpt-4o-mini
//!
//! # Usable context with a planted fact, at every needle position
//! ceiling needle --model openai/gpt-4o-mini
//!
//! # Only the middle position, custom fact
//! ceiling needle --model openai/gpt-4o-mini --position middle \
//!   --fact "The launch code is 7-ALPHA-9." --answer "7-ALPHA-9"
//!
//! # Max output tokens, JSON report, trial log
//! ceiling output --model openai/gpt-4o-mini --json --trial-log ./trials
//!
//! # Everything, against a self-hosted OpenAI-compatible server
//! ceiling all --model llama-3-70b --base-url http://localhost:8000/v1/chat/completions
//! ```

use ceiling_rs::config::ProbeConfig;
use ceiling_rs::data::{DEFAULT_NEEDLE_ANSWER, DEFAULT_NEEDLE_FACT, NeedlePosition};
use ceiling_rs::error::ProbeError;
use ceiling_rs::events::{CompositeEventHandler, LoggingHandler};
use ceiling_rs::probe::{
    ContextWindowProbe, ContextWindowResult, MaxOutputResult, MaxOutputTokensProbe,
};
use ceiling_rs::search::{ErrorPatternSet, SearchConfig};
use ceiling_rs::trial_log::{TrialLogHandler, TrialLogger};
use ceiling_rs::{OPENROUTER_URL, OpenRouterClient, ProviderPreferences};
use clap::{ArgAction, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Probe an LLM endpoint for its real context-window and output-token limits.
///
/// Reads the API key from the OPENROUTER_KEY environment variable.
#[derive(Parser)]
#[command(name = "ceiling", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    // ── Endpoint ───────────────────────────────────────────────
    /// Chat-completions URL of any OpenAI-compatible endpoint
    #[arg(long, global = true, default_value = OPENROUTER_URL)]
    base_url: String,

    /// Environment variable holding the API key
    #[arg(long, global = true, default_value = "OPENROUTER_KEY")]
    api_key_env: String,

    /// Pin OpenRouter requests to one provider (no fallbacks)
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, default_value_t = 300)]
    timeout: u64,

    // ── Search ─────────────────────────────────────────────────
    /// Maximum API calls per search
    #[arg(long, global = true, default_value_t = 40)]
    max_trials: u32,

    /// First candidate size of the exponential phase
    #[arg(long, global = true, default_value_t = 4096)]
    initial_value: u32,

    /// Largest candidate the exponential phase tries
    #[arg(long, global = true, default_value_t = 1 << 24)]
    max_value: u32,

    /// Stop refining when the bracket is this narrow
    #[arg(long, global = true, default_value_t = 128)]
    tolerance: u32,

    /// Delay between binary-phase calls, in milliseconds
    #[arg(long, global = true, default_value_t = 1000)]
    pacing_ms: u64,

    /// Characters of filler per token
    #[arg(long, global = true, default_value_t = 1.0)]
    chars_per_token: f64,

    /// Prompt size for output probes, in tokens
    #[arg(long, global = true, default_value_t = 1000)]
    output_prompt_tokens: u32,

    /// JSON file of extra error-extraction patterns, tried before the
    /// built-in ones
    #[arg(long, global = true)]
    patterns: Option<PathBuf>,

    // ── Output ─────────────────────────────────────────────────
    /// Append every trial to JSONL files under this directory
    #[arg(long, global = true)]
    trial_log: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Largest prompt the endpoint accepts
    Context {
        #[arg(long)]
        model: String,
    },
    /// Largest prompt at which the model still finds a planted fact
    Needle {
        #[arg(long)]
        model: String,
        /// end, middle or 80% (default: all three)
        #[arg(long)]
        position: Option<NeedlePosition>,
        /// Fact to plant in the filler
        #[arg(long, default_value = DEFAULT_NEEDLE_FACT)]
        fact: String,
        /// Text the answer must contain
        #[arg(long, default_value = DEFAULT_NEEDLE_ANSWER)]
        answer: String,
    },
    /// Largest completion the endpoint produces
    Output {
        #[arg(long)]
        model: String,
    },
    /// Context, needle (all positions) and output probes
    All {
        #[arg(long)]
        model: String,
    },
}

#[derive(Serialize, Default)]
struct Report {
    #[serde(skip_serializing_if = "Option::is_none")]
    context_window: Option<ContextWindowResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    needle: Option<ContextWindowResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output: Option<MaxOutputResult>,
}

impl Report {
    fn render_text(&self) -> String {
        let mut lines = Vec::new();
        if let Some(r) = &self.context_window {
            lines.push(r.to_string());
        }
        if let Some(r) = &self.needle {
            lines.push(r.to_string());
        }
        if let Some(r) = &self.max_output {
            lines.push(r.to_string());
        }
        lines.join("\n")
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,ceiling_rs={level},ceiling={level}")));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn probe_config(cli: &Cli) -> Result<ProbeConfig, ProbeError> {
    let mut patterns = ErrorPatternSet::builtin();
    if let Some(path) = &cli.patterns {
        patterns = patterns.overlay(ErrorPatternSet::load(path)?);
    }
    let search = SearchConfig::default()
        .with_max_trials(cli.max_trials)
        .with_initial_value(cli.initial_value)
        .with_max_value(cli.max_value)
        .with_tolerance(cli.tolerance)
        .with_pacing(Duration::from_millis(cli.pacing_ms));
    let config = ProbeConfig::default()
        .with_search(search)
        .with_chars_per_token(cli.chars_per_token)
        .with_patterns(patterns)
        .with_output_prompt_tokens(cli.output_prompt_tokens);
    config.validate()?;
    Ok(config)
}

fn client(cli: &Cli) -> Result<OpenRouterClient, ProbeError> {
    let api_key = std::env::var(&cli.api_key_env)
        .map_err(|_| ProbeError::Config(format!("{} not set", cli.api_key_env)))?;
    let mut client = OpenRouterClient::new(api_key)?
        .with_endpoint(&cli.base_url)
        .with_timeout(Duration::from_secs(cli.timeout))?;
    if let Some(provider) = &cli.provider {
        client = client.with_provider(ProviderPreferences::pinned(provider));
    }
    Ok(client)
}

async fn run(cli: &Cli) -> Result<String, ProbeError> {
    let config = probe_config(cli)?;
    let client = client(cli)?;
    let handler = CompositeEventHandler::new().with(LoggingHandler).with_opt(
        cli.trial_log
            .as_ref()
            .map(|dir| TrialLogHandler::new(TrialLogger::new(dir))),
    );

    let context = ContextWindowProbe::new(&client, config.clone()).with_event_handler(&handler);
    let output = MaxOutputTokensProbe::new(&client, config).with_event_handler(&handler);

    let mut report = Report::default();
    match &cli.command {
        Command::Context { model } => {
            report.context_window = Some(context.probe(model).await?);
        }
        Command::Needle {
            model,
            position,
            fact,
            answer,
        } => {
            let result = match position {
                Some(position) => {
                    context
                        .probe_with_needle(model, *position, fact, answer)
                        .await?
                }
                None => context.probe_all_needle_positions(model, fact, answer).await?,
            };
            report.needle = Some(result);
        }
        Command::Output { model } => {
            report.max_output = Some(output.probe(model).await?);
        }
        Command::All { model } => {
            report.context_window = Some(context.probe(model).await?);
            report.needle = Some(
                context
                    .probe_all_needle_positions(model, DEFAULT_NEEDLE_FACT, DEFAULT_NEEDLE_ANSWER)
                    .await?,
            );
            report.max_output = Some(output.probe(model).await?);
        }
    }

    if cli.json {
        serde_json::to_string_pretty(&report)
            .map_err(|e| ProbeError::Config(format!("failed to serialize report: {e}")))
    } else {
        Ok(report.render_text())
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(report) => println!("{report}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
