use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use triage::FailureType;
use triage_agent::config::TriageConfig;
use triage_agent::{ollama, render, App};

#[derive(Parser, Debug)]
#[command(name = "triage-agent", about = "Triage CI test failures", version)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// History JSON file (overrides config and TRIAGE_HISTORY_PATH).
    #[arg(long, global = true)]
    history: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Triage a single CI log.
    Analyze {
        log: PathBuf,
        #[arg(long)]
        json: bool,
        /// Use the rule-based explainer instead of Ollama.
        #[arg(long)]
        no_llm: bool,
        #[arg(long, short)]
        verbose: bool,
    },
    /// Triage every .log file in a directory.
    Batch {
        dir: PathBuf,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        concurrency: Option<usize>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        no_llm: bool,
    },
    /// Record how a failure was fixed.
    Learn {
        log: PathBuf,
        #[arg(long)]
        fix: String,
        /// Failure category (defaults to the classifier's verdict).
        #[arg(long)]
        category: Option<FailureType>,
        /// The fix is known to have resolved the failure.
        #[arg(long)]
        confirmed: bool,
        #[arg(long)]
        root_cause: Option<String>,
    },
    /// Run golden cases from a JSON file and report per-check accuracy.
    Eval {
        cases: PathBuf,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        no_llm: bool,
    },
    /// Summarize the history store.
    Stats,
    /// List tests in history that look flaky.
    Flaky {
        #[arg(long, default_value_t = 0.7)]
        threshold: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = TriageConfig::load(cli.config.as_deref())?;
    if let Some(history) = cli.history {
        config.history_path = history;
    }
    info!(
        history = %config.history_path.display(),
        llm = %config.llm.base_url,
        "Triage agent starting"
    );

    match cli.command {
        Command::Analyze {
            log,
            json,
            no_llm,
            verbose,
        } => {
            let use_llm = llm_available(&config, no_llm).await;
            let app = App::new(config, use_llm)?;
            let report = app.analyze_file(&log).await?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&report).context("Failed to serialize report")?
                );
            } else {
                print!("{}", render::render_report(&log.display().to_string(), &report, verbose));
            }
        }
        Command::Batch {
            dir,
            limit,
            concurrency,
            json,
            no_llm,
        } => {
            let use_llm = llm_available(&config, no_llm).await;
            let limit = limit.or(config.batch_limit);
            let concurrency = concurrency.unwrap_or(config.concurrency);
            let app = App::new(config, use_llm)?;
            let (entries, summary) = app.batch_dir(&dir, limit, concurrency).await?;
            if json {
                let out = serde_json::json!({ "entries": entries, "summary": summary });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out).context("Failed to serialize batch")?
                );
            } else {
                print!("{}", render::render_batch(&entries, &summary));
            }
        }
        Command::Learn {
            log,
            fix,
            category,
            confirmed,
            root_cause,
        } => {
            let app = App::new(config, false)?;
            let record = app.learn(&log, &fix, category, confirmed, root_cause.as_deref())?;
            println!(
                "Recorded {} for {} in {}",
                record.id,
                record.failure.test_name,
                app.config().history_path.display()
            );
        }
        Command::Eval {
            cases,
            json,
            no_llm,
        } => {
            let use_llm = llm_available(&config, no_llm).await;
            let app = App::new(config, use_llm)?;
            let (results, summary) = app.evaluate(&cases).await?;
            if json {
                let out = serde_json::json!({ "results": results, "summary": summary });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&out).context("Failed to serialize eval")?
                );
            } else {
                print!("{}", render::render_eval(&results, &summary));
            }
            anyhow::ensure!(summary.failed == 0, "{} eval case(s) failed", summary.failed);
        }
        Command::Stats => {
            let app = App::new(config, false)?;
            let path = app.config().history_path.display().to_string();
            print!("{}", render::render_stats(&path, &app.stats()));
        }
        Command::Flaky { threshold } => {
            let app = App::new(config, false)?;
            print!("{}", render::render_flaky(&app.flaky(threshold), threshold));
        }
    }
    Ok(())
}

/// Whether to use Ollama: not disabled, and the server answers.
async fn llm_available(config: &TriageConfig, no_llm: bool) -> bool {
    if no_llm || !config.llm.enabled {
        return false;
    }
    if ollama::check_endpoint(&config.llm.base_url).await {
        true
    } else {
        tracing::warn!(
            url = %config.llm.base_url,
            "Ollama not reachable, using rule-based explanations"
        );
        false
    }
}
