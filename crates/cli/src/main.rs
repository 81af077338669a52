use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use engine::api::{Directories, JobsConfig, WorkerApi};
use engine::{
    ClientConfig, EncodingRequest, Job, JobState, Notification, Notifier, Preset, Session,
    SubmissionOutcome,
};
use log::info;

/// Console client for the video compression worker
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (JSON or TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Worker base URL, overrides the configuration file
    #[arg(long)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show or update the worker's input/output directories
    Dirs {
        #[arg(long)]
        input: Option<String>,
        #[arg(long)]
        output: Option<String>,
    },
    /// Show or update the worker's concurrency limit
    Limits {
        #[arg(long)]
        max_concurrent: Option<u32>,
    },
    /// List input files available for submission
    Inputs,
    /// Submit a batch of inputs for compression
    Submit {
        /// Input filenames, as listed by `inputs`
        files: Vec<String>,
        /// Named preset (standard, h265_720, av1_720_extreme, vp9_720_web)
        #[arg(long, default_value = "standard")]
        preset: String,
        /// Manual codec, overrides the preset
        #[arg(long)]
        codec: Option<String>,
        /// Manual CRF, overrides the preset's
        #[arg(long)]
        crf: Option<u32>,
        /// Extra encoder argument, repeatable, passed through opaquely
        #[arg(long = "extra-arg")]
        extra_args: Vec<String>,
        /// Keep polling until every submitted job is terminal
        #[arg(long)]
        watch: bool,
    },
    /// Print the worker's current job list once
    Jobs,
    /// Poll until every tracked job reaches a terminal state
    Watch,
    /// Print the completed-job history
    History,
}

/// Notifier that prints straight to stdout for interactive use.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, note: Notification) {
        println!("{}", note.message());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    let mut cfg = ClientConfig::load_config(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(server) = args.server {
        cfg.server_url = server;
    }

    let client = reqwest::Client::builder()
        .timeout(cfg.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let api = WorkerApi::with_client(client, cfg.server_url.clone());
    info!("Using worker at {}", api.base_url());

    match args.command {
        Command::Dirs { input, output } => {
            let current = api
                .directories()
                .await
                .context("Failed to fetch directories")?;
            if input.is_none() && output.is_none() {
                print_dirs(&current);
            } else {
                let updated = Directories {
                    input_dir: input.unwrap_or(current.input_dir),
                    output_dir: output.unwrap_or(current.output_dir),
                };
                let saved = api
                    .set_directories(&updated)
                    .await
                    .context("Failed to update directories")?;
                print_dirs(&saved);
            }
        }
        Command::Limits { max_concurrent } => match max_concurrent {
            None => {
                let config = api
                    .jobs_config()
                    .await
                    .context("Failed to fetch jobs config")?;
                println!("max concurrent tasks: {}", config.max_concurrent_tasks);
            }
            Some(max_concurrent_tasks) => {
                let saved = api
                    .set_jobs_config(&JobsConfig {
                        max_concurrent_tasks,
                    })
                    .await
                    .context("Failed to update jobs config")?;
                println!("max concurrent tasks: {}", saved.max_concurrent_tasks);
            }
        },
        Command::Inputs => {
            let inputs = api.list_inputs().await.context("Failed to list inputs")?;
            if inputs.is_empty() {
                println!("no inputs available");
            }
            for filename in inputs {
                println!("{filename}");
            }
        }
        Command::Submit {
            files,
            preset,
            codec,
            crf,
            extra_args,
            watch,
        } => {
            let request = resolve_request(&preset, codec, crf, extra_args);
            let session = Arc::new(Session::new(api, Arc::new(ConsoleNotifier)));

            let outcomes = session.submit_batch(&files, &request).await;
            let submitted = outcomes
                .iter()
                .filter(|o| matches!(o, SubmissionOutcome::Submitted { .. }))
                .count();
            println!(
                "submitted {submitted} of {} job(s) [{} crf {}]",
                outcomes.len(),
                request.codec,
                request.crf
            );

            if watch && submitted > 0 {
                watch_session(&session, &cfg).await;
            }
            print_jobs(&session.snapshot().await);
        }
        Command::Jobs => {
            let session = Arc::new(Session::new(api, Arc::new(ConsoleNotifier)));
            session.poll_once().await;
            print_jobs(&session.snapshot().await);
        }
        Command::Watch => {
            let session = Arc::new(Session::new(api, Arc::new(ConsoleNotifier)));
            session.poll_once().await;
            watch_session(&session, &cfg).await;
            print_jobs(&session.snapshot().await);
        }
        Command::History => {
            let logs = api.job_logs().await.context("Failed to fetch job logs")?;
            if logs.is_empty() {
                println!("no completed jobs recorded");
                return Ok(());
            }
            println!(
                "{:<20} {:<32} {:<12} {:>4} {:>7} {:>8} {:>6}",
                "TIME", "FILE", "CODEC", "CRF", "RATIO", "ELAPSED", "RESULT"
            );
            // Newest first, the way the worker appends its log.
            for entry in logs.iter().rev() {
                let ratio = entry
                    .compression_ratio
                    .map(|r| format!("{:.0}%", r * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                let elapsed = entry
                    .elapsed_seconds
                    .map(|s| format!("{s:.0}s"))
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<20} {:<32} {:<12} {:>4} {:>7} {:>8} {:>6}",
                    entry.timestamp.as_deref().unwrap_or("-"),
                    entry.filename,
                    entry.codec,
                    entry.crf,
                    ratio,
                    elapsed,
                    if entry.succeeded() { "ok" } else { "fail" },
                );
            }
        }
    }

    Ok(())
}

/// The named preset resolves first (unknown names fall back to the
/// default preset); `--codec`, `--crf` and `--extra-arg` each override
/// their part of the resolved parameters independently.
fn resolve_request(
    preset: &str,
    codec: Option<String>,
    crf: Option<u32>,
    extra_args: Vec<String>,
) -> EncodingRequest {
    let mut request = match codec {
        Some(codec) => EncodingRequest::manual(codec, 23),
        None => Preset::parse(preset).request(),
    };
    if let Some(crf) = crf {
        request.crf = crf;
    }
    if !extra_args.is_empty() {
        request.extra_args = extra_args;
    }
    request
}

async fn watch_session(session: &Arc<Session<WorkerApi>>, cfg: &ClientConfig) {
    if session.snapshot().await.is_empty() {
        println!("no jobs tracked");
        return;
    }
    info!(
        "Watching jobs, polling every {}s until all are terminal",
        cfg.poll_interval_secs
    );
    loop {
        if session.is_settled().await {
            break;
        }
        tokio::time::sleep(cfg.poll_interval()).await;
        session.poll_once().await;
    }
}

fn print_dirs(dirs: &Directories) {
    println!("input dir:  {}", dirs.input_dir);
    println!("output dir: {}", dirs.output_dir);
}

fn print_jobs(jobs: &[Job]) {
    if jobs.is_empty() {
        println!("no jobs tracked");
        return;
    }
    println!(
        "{:<10} {:<6} {:<40} {:>6} {:>7}",
        "ID", "ST", "FILE", "PROG", "SPEED"
    );
    for job in jobs {
        let speed = job
            .speed
            .map(|s| format!("{s:.1}x"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<10} {:<6} {:<40} {:>5.0}% {:>7}",
            job.job_id.as_deref().unwrap_or("-"),
            state_label(job.state, job.placeholder),
            job.filename,
            job.progress,
            speed,
        );
        if let Some(error) = &job.error {
            println!("           {error}");
        }
    }
}

fn state_label(state: JobState, placeholder: bool) -> &'static str {
    match (state, placeholder) {
        (JobState::Pending, true) => "QUEUE",
        (JobState::Pending, false) => "PEND",
        (JobState::Running, _) => "RUN",
        (JobState::Success, _) => "OK",
        (JobState::Failure, true) => "REJ",
        (JobState::Failure, false) => "FAIL",
    }
}
