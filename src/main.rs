//! verify - drive a program through the verification backend

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use owo_colors::OwoColorize;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::EnvFilter;

use verification_runtime::pipeline::{command_preview, SymbolicExecutionFlags};
use verification_runtime::{
    HttpJobClient, JobStage, PipelineEvent, PipelineStage, RemoteJobClient, RuntimeConfig,
    StageOutcome, VerificationPipeline,
};

#[derive(Parser)]
#[command(
    name = "verify",
    version,
    about = "Run LLVM bitcode generation and symbolic execution on a remote backend"
)]
struct Cli {
    /// Configuration file (TOML). Defaults to ./verification.toml when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a source file and run both stages to completion
    Run(RunArgs),
    /// Print the symbolic execution command for a project
    Preview(PreviewArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Program source to verify
    source: PathBuf,

    /// Project name. Defaults to the file stem.
    #[arg(long)]
    name: Option<String>,

    /// Extra symbolic execution flags
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    flags: String,

    /// Give up on a stage after this many seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[derive(Args)]
struct PreviewArgs {
    /// Project id returned by the upload
    project_id: String,

    /// Extra symbolic execution flags
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    flags: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Preview(args) => {
            let flags = SymbolicExecutionFlags::new(&args.flags);
            println!("{}", command_preview(&args.project_id, &flags));
            ExitCode::SUCCESS
        }
        Commands::Run(args) => match run(cli.config.as_deref(), args).await {
            Ok(true) => ExitCode::SUCCESS,
            Ok(false) => ExitCode::FAILURE,
            Err(message) => {
                eprintln!("{} {}", "Error:".red().bold(), message);
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(config_path: Option<&Path>, args: RunArgs) -> Result<bool, String> {
    let config = RuntimeConfig::load(config_path).map_err(|e| e.to_string())?;
    let source = std::fs::read_to_string(&args.source)
        .map_err(|e| format!("cannot read {}: {}", args.source.display(), e))?;
    let name = args.name.unwrap_or_else(|| {
        args.source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let client = HttpJobClient::from_config(&config.api).map_err(|e| e.to_string())?;
    let client: Arc<dyn RemoteJobClient> = Arc::new(client);
    let pipeline = VerificationPipeline::from_config(client, &config);
    let printer = tokio::spawn(print_events(pipeline.subscribe()));

    let timeout = args.timeout.map(Duration::from_secs);
    let flags = SymbolicExecutionFlags::new(&args.flags);
    let result = drive(&pipeline, &name, &source, &flags, timeout).await;

    pipeline.shutdown().await;
    printer.abort();
    result
}

async fn drive(
    pipeline: &VerificationPipeline,
    name: &str,
    source: &str,
    flags: &SymbolicExecutionFlags,
    timeout: Option<Duration>,
) -> Result<bool, String> {
    let project = pipeline
        .upload_source(name, source)
        .await
        .map_err(|e| e.to_string())?;
    println!("{} project {}", "Uploaded:".green().bold(), project.id);

    for job in JobStage::ALL {
        let stage = PipelineStage::from(job);
        if job == JobStage::SymbolicExecution {
            println!("{} {}", "Command:".cyan(), pipeline.command_preview(flags));
        }

        let watch = pipeline.watch_stage(job);
        pipeline
            .start_stage(stage, Some(flags))
            .await
            .map_err(|e| e.to_string())?;

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, watch.outcome())
                .await
                .map_err(|_| format!("{} did not finish within {}s", job, limit.as_secs()))?,
            None => watch.outcome().await,
        };

        println!("\n{}", pipeline.report_title().bold());
        println!("{}\n", pipeline.stage_report());

        match outcome {
            StageOutcome::Succeeded => {
                println!("{} {}", "Success:".green().bold(), job);
            }
            StageOutcome::Failed { .. } => {
                println!("{} {}", "Failed:".red().bold(), job);
                return Ok(false);
            }
            StageOutcome::Faulted { message } => return Err(message),
            StageOutcome::Interrupted => return Err(format!("{} was interrupted", job)),
        }
    }

    Ok(true)
}

async fn print_events(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        };
        match event {
            PipelineEvent::StageStarted { stage, message, .. } => {
                println!("{} {}: {}", "Started:".blue().bold(), stage, message);
            }
            PipelineEvent::StageCompleted { stage, .. } => {
                println!("{} {}", "Completed:".blue().bold(), stage);
            }
            PipelineEvent::Warning { message } => {
                eprintln!("{} {}", "Warning:".yellow().bold(), message);
            }
            PipelineEvent::StageFailed { stage, reason, .. } => {
                eprintln!("{} {}: {}", "Failed:".red().bold(), stage, reason);
            }
            _ => {}
        }
    }
}
