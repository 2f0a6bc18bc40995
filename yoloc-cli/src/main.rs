#![deny(missing_docs)]
//! yoloc command-line interface.
//!
//! Scores one repository and prints the scorecard, or starts the HTTP
//! server with `--serve`. The exit code is the compliance level.

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use yoloc_core::config::DEFAULT_BRANCH;
use yoloc_core::score::MAX_LEVEL;
use yoloc_core::{
    Check, CheckDeps, FingerprintCache, RenderOptions, RunConfig, Scorecard, Settings,
    YolocError, build_checks, cancel_pair, render_json, render_markdown, render_text,
    run_with_store,
};
use yoloc_server::{ServeOptions, build_state, serve};

/// Exit code for configuration errors, above the level range.
const CONFIG_ERROR_EXIT: u8 = 64;
/// Exit code for any other failure outside a run.
const FAILURE_EXIT: u8 = 70;

#[derive(Parser, Debug)]
#[command(name = "yoloc", version, about = "Score a repository's YOLO compliance")]
struct Cli {
    /// Repository to score, as owner/name or a GitHub URL.
    #[arg(long, default_value = "google/triage-party")]
    repo: String,
    /// Container image to check for signatures.
    #[arg(long)]
    image: Option<String>,
    /// Branch whose history is analyzed.
    #[arg(long, default_value = DEFAULT_BRANCH)]
    branch: String,
    /// Check IDs to run (repeatable or comma-separated).
    #[arg(long = "check", value_delimiter = ',')]
    checks: Vec<String>,
    /// Persistence backend: null, disk or postgres.
    #[arg(long, env = "YOLOC_PERSIST_BACKEND", default_value = "")]
    persist: String,
    /// Output format for the scorecard.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Disable colored text output.
    #[arg(long)]
    no_color: bool,
    /// Start the HTTP server instead of scoring once.
    #[arg(long)]
    serve: bool,
    /// Port for --serve.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("yoloc: {err}");
            ExitCode::from(failure_code(&err))
        }
    }
}

fn failure_code(err: &YolocError) -> u8 {
    if err.is_fatal() {
        CONFIG_ERROR_EXIT
    } else {
        FAILURE_EXIT
    }
}

fn run(cli: Cli) -> yoloc_core::Result<u8> {
    let mut settings = Settings::from_env();
    settings.persist_backend = cli.persist.trim().to_string();

    if cli.serve {
        let options = ServeOptions {
            host: std::env::var("YOLOC_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: cli.port,
            persist_backend: settings.persist_backend.clone(),
            checks: cli.checks,
        };
        let state = build_state(&settings, &options)?;
        serve(state, &options.host, options.port)?;
        return Ok(0);
    }

    let store = yoloc_server::open_store(&settings.persist_backend, &settings)?;
    let deps = CheckDeps::from_settings(&settings)?;
    let checks = build_checks(&cli.checks, &deps)?;
    let cache = Arc::new(FingerprintCache::new(settings.history_cache_size));
    let config =
        RunConfig::new(&cli.repo, cli.image.clone(), cache, store)?.with_branch(&cli.branch);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let card = runtime.block_on(score(checks, config));

    let options = RenderOptions {
        color: !cli.no_color && std::io::stdout().is_terminal(),
    };
    print!("{}", render(&card, cli.format, &options)?);
    Ok(exit_level(&card))
}

async fn score(checks: Vec<Arc<dyn Check>>, mut config: RunConfig) -> Scorecard {
    let (handle, token) = cancel_pair();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("interrupted; cancelling remaining checks");
            handle.cancel();
        }
    });
    let card = run_with_store(&checks, &mut config, &token).await;
    interrupt.abort();
    card
}

fn render(
    card: &Scorecard,
    format: OutputFormat,
    options: &RenderOptions,
) -> yoloc_core::Result<String> {
    match format {
        OutputFormat::Text => Ok(render_text(card, options)),
        OutputFormat::Markdown => Ok(render_markdown(card)),
        OutputFormat::Json => {
            let mut json = render_json(card)?;
            json.push('\n');
            Ok(json)
        }
    }
}

fn exit_level(card: &Scorecard) -> u8 {
    card.level.min(MAX_LEVEL) as u8
}
