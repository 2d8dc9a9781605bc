//! Single entry point for the pipeline: run it end to end, run one step at
//! a time, export the digest, or inspect run history (spec §6).

use anyhow::{Context, Result};
use chrono::Utc;
use chrono_tz::Tz;
use clap::{Parser, Subcommand, ValueEnum};
use newsgate_common::clock::today_in;
use newsgate_common::config::{load_feed_config, load_pipeline_config, load_topic_config, Config, TopicConfig};
use newsgate_common::types::StepName;
use newsgate_common::{CancellationToken, SystemClock};
use newsgate_fetch::HttpFetcher;
use newsgate_oracle::OpenAiOracle;
use newsgate_pipeline::run::{run_step, RunManager, RunOptions};
use newsgate_pipeline::steps::{classify, cluster, collect, cross_run_dedup, digest, extract, select, summarize};
use newsgate_store::{SqliteStore, Store};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Local wall-clock timezone every "today"/"max_article_age_days" window is
/// anchored to (spec §4.4 step 2).
fn pipeline_tz() -> Tz {
    "Europe/Zurich".parse().expect("Europe/Zurich is a valid IANA timezone")
}

#[derive(Parser)]
#[command(name = "newsgate")]
#[command(about = "Swiss business-credit-risk news intelligence pipeline")]
#[command(version)]
struct Cli {
    /// Override DB_PATH
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Directory containing feeds.yaml, topics.yaml, pipeline.yaml
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Enable debug logging regardless of RUST_LOG
    #[arg(long, global = true)]
    debug: bool,

    /// Cap the number of articles selected per run, overriding topic config
    #[arg(long, global = true)]
    max_articles_per_run: Option<u32>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: collect, filter, scrape, summarize, digest
    Run {
        /// Resume a specific interrupted run instead of starting a new one
        #[arg(long)]
        resume: Option<String>,
    },
    /// Run a single pipeline step
    Step {
        #[arg(value_enum)]
        step: StepArg,
        /// Run id to attach this step to; a new run is allocated if omitted
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Export the digest for a date (defaults to today, Europe/Zurich)
    Export {
        #[arg(value_enum, default_value = "json")]
        format: ExportFormat,
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
    /// Show step/run statistics for a date
    Stats {
        #[arg(long)]
        date: Option<chrono::NaiveDate>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum StepArg {
    Collect,
    Filter,
    Scrape,
    Summarize,
    Digest,
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Markdown,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("newsgate=debug,info")
    } else {
        EnvFilter::from_default_env().add_directive("newsgate=info".parse().unwrap())
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start async runtime: {e:#}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(run(cli)) {
        Ok(Outcome::Success) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => {
            warn!("interrupted, run paused for resume");
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(1)
        }
    }
}

enum Outcome {
    Success,
    Interrupted,
}

struct App {
    store: SqliteStore,
    oracle: OpenAiOracle,
    fetcher: HttpFetcher,
    topics: HashMap<String, TopicConfig>,
    feed_config: newsgate_common::config::FeedConfig,
    config: Config,
    max_articles_per_run: Option<u32>,
}

impl App {
    async fn bootstrap(cli: &Cli) -> Result<Self> {
        let mut config = Config::from_env().context("loading configuration from environment")?;
        if let Some(db_path) = &cli.db_path {
            config.db_path = db_path.clone();
        }
        config.log_redacted();

        let api_key = std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?;

        let feed_config = load_feed_config(&cli.config_dir.join("feeds.yaml"))
            .context("loading feeds.yaml")?;
        let topic_file = load_topic_config(&cli.config_dir.join("topics.yaml"))
            .context("loading topics.yaml")?;
        let _pipeline_file = load_pipeline_config(&cli.config_dir.join("pipeline.yaml"))
            .context("loading pipeline.yaml")?;

        let store = SqliteStore::connect(&config.db_path).await.context("opening store")?;
        let oracle = OpenAiOracle::new(
            api_key,
            config.model_nano.clone(),
            config.model_mini.clone(),
            config.model_analysis.clone(),
            Duration::from_secs(config.request_timeout_sec),
        );
        let fetcher = HttpFetcher::new(config.user_agent.clone(), Duration::from_secs(config.request_timeout_sec));

        Ok(Self {
            store,
            oracle,
            fetcher,
            topics: topic_file.topics,
            feed_config,
            config,
            max_articles_per_run: cli.max_articles_per_run,
        })
    }

    fn enabled_topics(&self) -> Vec<(String, TopicConfig)> {
        self.topics
            .iter()
            .filter(|(_, t)| t.enabled)
            .map(|(name, t)| (name.clone(), t.clone()))
            .collect()
    }
}

async fn run(cli: Cli) -> Result<Outcome> {
    let command = cli.command.unwrap_or(Commands::Run { resume: None });
    let app = App::bootstrap(&cli).await?;

    match command {
        Commands::Run { resume } => run_full_pipeline(&app, resume).await,
        Commands::Step { step, run_id } => run_single_step(&app, step, run_id).await,
        Commands::Export { format, date } => export_digest(&app, format, date).await,
        Commands::Stats { date } => show_stats(&app, date).await,
    }
}

fn install_cancellation() -> CancellationToken {
    let cancel = CancellationToken::new();
    let cancel_task = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("ctrl-c received, pausing after the current step");
            cancel_task.cancel();
        }
    });
    cancel
}

async fn run_full_pipeline(app: &App, resume: Option<String>) -> Result<Outcome> {
    let cancel = install_cancellation();
    let manager = match resume {
        Some(run_id) => RunManager::resume(&app.store, run_id, RunOptions::default()),
        None => RunManager::start(&app.store, RunOptions::default()).await?,
    };
    info!(run_id = manager.run_id(), "pipeline run beginning");

    loop {
        let Some(step) = manager.next_step_to_run().await? else {
            info!(run_id = manager.run_id(), "pipeline run complete");
            break;
        };
        if cancel.is_cancelled() {
            manager.pause_running_steps("interrupted before next step").await?;
            return Ok(Outcome::Interrupted);
        }

        let outcome = match step {
            StepName::Collection => {
                run_step(&manager, &cancel, step, || async {
                    let outcome = collect::collect(&app.store, &app.fetcher, &app.feed_config, app.config.max_items_per_feed).await?;
                    Ok((outcome.items_inserted, outcome.items_inserted as i32, 0))
                })
                .await?
            }
            StepName::Filtering => run_filtering(app, &manager, &cancel, step).await?,
            StepName::Scraping => run_scraping(app, &manager, &cancel, step).await?,
            StepName::Summarization => run_summarization(app, &manager, &cancel, step).await?,
            StepName::Analysis => run_analysis(app, &manager, &cancel, step).await?,
        };

        if outcome.is_none() {
            return Ok(Outcome::Interrupted);
        }
    }

    manager.purge_old_steps(Utc::now()).await.ok();
    Ok(Outcome::Success)
}

async fn run_filtering(app: &App, manager: &RunManager<'_>, cancel: &CancellationToken, step: StepName) -> Result<Option<usize>> {
    let result = run_step(manager, cancel, step, || async {
        let mut matched_total = 0i32;
        let mut classified_total = 0i32;
        for (name, topic_config) in app.enabled_topics() {
            let outcome = classify::classify(
                &app.store,
                &app.oracle,
                &SystemClock,
                pipeline_tz(),
                manager.run_id(),
                &name,
                &topic_config,
                classify::ClassifyOptions::default(),
            )
            .await?;
            classified_total += outcome.classified as i32;
            matched_total += outcome.matched as i32;
        }
        let cap = app.max_articles_per_run.unwrap_or(35) as usize;
        let select_outcome = select::select(&app.store, manager.run_id(), cap).await?;
        Ok((select_outcome.selected, classified_total, matched_total))
    })
    .await?;
    Ok(result)
}

async fn run_scraping(app: &App, manager: &RunManager<'_>, cancel: &CancellationToken, step: StepName) -> Result<Option<usize>> {
    let result = run_step(manager, cancel, step, || async {
        let extract_outcome =
            extract::extract_content(&app.store, &app.fetcher, manager.run_id(), app.config.skip_gnews_redirects).await?;
        let today = today_in(&SystemClock, pipeline_tz());
        cluster::cluster_titles(&app.store, &app.oracle, today).await?;
        Ok((extract_outcome.extracted, extract_outcome.attempted as i32, extract_outcome.extracted as i32))
    })
    .await?;
    Ok(result)
}

async fn run_summarization(app: &App, manager: &RunManager<'_>, cancel: &CancellationToken, step: StepName) -> Result<Option<usize>> {
    let result = run_step(manager, cancel, step, || async {
        let mut summarized_total = 0i32;
        let mut attempted_total = 0i32;
        for (_, _) in app.enabled_topics() {
            let outcome = summarize::summarize(&app.store, &app.oracle, manager.run_id(), &app.config.model_mini).await?;
            summarized_total += outcome.summarized as i32;
            attempted_total += outcome.attempted as i32;
        }
        Ok((summarized_total as usize, attempted_total, summarized_total))
    })
    .await?;
    Ok(result)
}

async fn run_analysis(app: &App, manager: &RunManager<'_>, cancel: &CancellationToken, step: StepName) -> Result<Option<usize>> {
    let result = run_step(manager, cancel, step, || async {
        let today = today_in(&SystemClock, pipeline_tz());
        let topic_names: Vec<String> = app.enabled_topics().into_iter().map(|(n, _)| n).collect();
        for name in &topic_names {
            cross_run_dedup::deduplicate_across_runs(&app.store, &app.oracle, today, name).await?;
        }
        let digest_outcome = digest::build_digests(&app.store, &app.oracle, today, &topic_names).await?;
        Ok((digest_outcome.topics_processed, digest_outcome.total_new_articles as i32, digest_outcome.topics_processed as i32))
    })
    .await?;
    Ok(result)
}

async fn run_single_step(app: &App, step: StepArg, run_id: Option<String>) -> Result<Outcome> {
    let cancel = install_cancellation();
    let manager = match run_id {
        Some(run_id) => RunManager::resume(&app.store, run_id, RunOptions::default()),
        None => RunManager::start(&app.store, RunOptions::default()).await?,
    };

    let step_name = match step {
        StepArg::Collect => StepName::Collection,
        StepArg::Filter => StepName::Filtering,
        StepArg::Scrape => StepName::Scraping,
        StepArg::Summarize => StepName::Summarization,
        StepArg::Digest => StepName::Analysis,
    };

    let outcome = match step_name {
        StepName::Collection => {
            run_step(&manager, &cancel, step_name, || async {
                let outcome = collect::collect(&app.store, &app.fetcher, &app.feed_config, app.config.max_items_per_feed).await?;
                Ok((outcome.items_inserted, outcome.items_inserted as i32, 0))
            })
            .await?
        }
        StepName::Filtering => run_filtering(app, &manager, &cancel, step_name).await?,
        StepName::Scraping => run_scraping(app, &manager, &cancel, step_name).await?,
        StepName::Summarization => run_summarization(app, &manager, &cancel, step_name).await?,
        StepName::Analysis => run_analysis(app, &manager, &cancel, step_name).await?,
    };

    info!(run_id = manager.run_id(), step = %step_name, "single step finished");
    Ok(if outcome.is_some() { Outcome::Success } else { Outcome::Interrupted })
}

async fn export_digest(app: &App, format: ExportFormat, date: Option<chrono::NaiveDate>) -> Result<Outcome> {
    let date = date.unwrap_or_else(|| today_in(&SystemClock, pipeline_tz()));
    let states = app.store.all_digest_states(date).await?;

    match format {
        ExportFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&states)?);
        }
        ExportFormat::Markdown => {
            println!("# Digest for {date}\n");
            for state in &states {
                println!("## {}\n", state.digest_content.headline);
                println!("{}\n", state.digest_content.why_it_matters);
                println!("*Topic: {} — {} articles*\n", state.topic, state.digest_content.article_count);
                for source in &state.digest_content.sources {
                    println!("- {source}");
                }
                println!();
            }
        }
    }
    Ok(Outcome::Success)
}

async fn show_stats(app: &App, date: Option<chrono::NaiveDate>) -> Result<Outcome> {
    let date = date.unwrap_or_else(|| today_in(&SystemClock, pipeline_tz()));
    let states = app.store.all_digest_states(date).await?;
    let total_articles: i32 = states.iter().map(|s| s.article_count).sum();
    println!("date: {date}");
    println!("topics with a digest: {}", states.len());
    println!("total digested articles: {total_articles}");
    for state in &states {
        println!(
            "  {:<28} articles={:<4} updated_at={}",
            state.topic, state.article_count, state.updated_at
        );
    }
    Ok(Outcome::Success)
}
