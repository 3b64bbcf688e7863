use crate::commands::Commands;
use crate::error::CliError;
use crate::shutdown::{ExitCode, ShutdownCoordinator};
use clap::Parser;
use engine_core::config::RunConfig;
use engine_core::events::EventSink;
use engine_core::state::CheckpointStore;
use engine_core::state::json_store::JsonCheckpointStore;
use engine_core::state::models::Checkpoint;
use engine_runtime::execution::executor::{self, CopyRunParams};
use engine_runtime::resume::ResumeController;
use engine_runtime::simulation::SimulatedTransferClient;
use model::core::identifiers::SourceScanId;
use model::records::batch::plan_batches;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info};

mod commands;
mod error;
mod output;
mod settings;
mod shutdown;

#[derive(Parser)]
#[command(name = "scansync", version = "0.1.0", about = "Scan copy and audit tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    // Initialize logger
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();
    let code = match run_command(cli.command).await {
        Ok(code) => code,
        Err(err) => {
            error!("{err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

async fn run_command(command: Commands) -> Result<ExitCode, CliError> {
    match command {
        Commands::Simulate {
            scans,
            fail_every,
            latency_ms,
            config,
            checkpoint_dir,
            resume,
            restart,
            checkpoint,
            output,
        } => {
            let mut run_config = RunConfig {
                checkpoint_dir: PathBuf::from(&checkpoint_dir),
                ..RunConfig::default()
            };
            if let Some(path) = config {
                run_config = settings::load_overrides(&path).await?.apply(run_config);
            }

            simulate(SimulateArgs {
                scans,
                fail_every,
                latency: Duration::from_millis(latency_ms),
                config: run_config,
                checkpoint_dir,
                resume,
                restart,
                checkpoint,
                output,
            })
            .await
        }
        Commands::Checkpoints { dir } => {
            list_checkpoints(&dir).await?;
            Ok(ExitCode::Success)
        }
        Commands::Plan {
            scan_ids,
            batch_size,
        } => {
            print_plan(&scan_ids, batch_size)?;
            Ok(ExitCode::Success)
        }
    }
}

struct SimulateArgs {
    scans: usize,
    fail_every: Option<u64>,
    latency: Duration,
    config: RunConfig,
    checkpoint_dir: String,
    resume: bool,
    restart: bool,
    checkpoint: Option<String>,
    output: Option<String>,
}

async fn simulate(args: SimulateArgs) -> Result<ExitCode, CliError> {
    let cancel = CancellationToken::new();
    let shutdown = ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    let controller = ResumeController::new(&args.config.checkpoint_dir);
    let (checkpoint_path, checkpoint) = resolve_checkpoint(
        &controller,
        &args.checkpoint_dir,
        args.resume,
        args.restart,
        args.checkpoint,
    )
    .await?;
    info!(checkpoint = %checkpoint_path.display(), "Using checkpoint file");

    let store: Arc<dyn CheckpointStore> = Arc::new(JsonCheckpointStore::new(checkpoint_path));

    let mut client = SimulatedTransferClient::new().with_latency(args.latency);
    if let Some(n) = args.fail_every {
        client = client.with_fail_every(n);
    }

    // Progress events render through the logger until the engine drops
    // its side of the channel.
    let (tx, mut rx) = mpsc::channel(256);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            info!("{event}");
        }
    });

    let scan_ids: Vec<SourceScanId> = (1..=args.scans as i64).map(SourceScanId::new).collect();
    let summary = executor::run(CopyRunParams {
        scan_ids,
        target_store_id: 1,
        captured_at: chrono::Utc::now().timestamp(),
        config: args.config,
        checkpoint,
        client: Arc::new(client),
        store,
        cancel,
        events: EventSink::new(tx),
    })
    .await?;
    let _ = printer.await;

    output::print_summary(&summary);
    match args.output {
        Some(path) => output::write_report(&summary, path).await?,
        None => output::print_report(&summary)?,
    }

    if shutdown.is_shutdown_requested() {
        Ok(ExitCode::ShutdownRequested)
    } else {
        Ok(ExitCode::Success)
    }
}

/// Turns the resume/restart/checkpoint flags into the checkpoint a run
/// starts from. Leftover checkpoints without an explicit choice are an
/// error, never silently resumed or overwritten.
async fn resolve_checkpoint(
    controller: &ResumeController,
    dir: &str,
    resume: bool,
    restart: bool,
    explicit: Option<String>,
) -> Result<(PathBuf, Checkpoint), CliError> {
    if let Some(path) = explicit {
        let path = PathBuf::from(path);
        let checkpoint = controller.load(&path).await?;
        return Ok((path, checkpoint));
    }
    if resume {
        return Ok(controller.resume_latest().await?);
    }
    if restart {
        let checkpoint = controller.restart()?;
        return Ok((controller.new_checkpoint_path(), checkpoint));
    }

    let candidates = controller.discover()?;
    if !candidates.is_empty() {
        return Err(CliError::CheckpointChoiceRequired {
            count: candidates.len(),
            dir: dir.to_string(),
        });
    }
    Ok((controller.new_checkpoint_path(), Checkpoint::empty()))
}

async fn list_checkpoints(dir: &str) -> Result<(), CliError> {
    let controller = ResumeController::new(dir);
    let candidates = controller.discover()?;
    if candidates.is_empty() {
        println!("No checkpoint files found in {dir}");
        return Ok(());
    }

    for path in candidates {
        let store = JsonCheckpointStore::new(&path);
        match store.load().await {
            Ok(Some(cp)) => println!(
                "{}: {} batches completed, {} scans mapped, {} failed",
                path.display(),
                cp.completed_batches.len(),
                cp.mapped_count(),
                cp.failed_scans
            ),
            Ok(None) => println!("{}: unreadable (file vanished)", path.display()),
            Err(err) => println!("{}: corrupt ({err})", path.display()),
        }
    }
    Ok(())
}

fn print_plan(input: &str, batch_size: usize) -> Result<(), CliError> {
    let config = RunConfig {
        batch_size,
        ..RunConfig::default()
    };
    config
        .validate()
        .map_err(|err| CliError::Copy(err.into()))?;

    let scan_ids = parse_scan_ids(input)?;
    for batch in plan_batches(&scan_ids, batch_size) {
        let ids = batch
            .scan_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        println!(
            "batch {}/{} ({} scans): {}",
            batch.batch_number,
            batch.total_batches,
            batch.len(),
            ids
        );
    }
    Ok(())
}

fn parse_scan_ids(input: &str) -> Result<Vec<SourceScanId>, CliError> {
    let mut scan_ids = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let value: i64 = part
            .parse()
            .map_err(|_| CliError::InvalidScanIds(format!("'{part}' is not a number")))?;
        if value <= 0 {
            return Err(CliError::InvalidScanIds(format!(
                "scan id {value} must be positive"
            )));
        }
        scan_ids.push(SourceScanId::new(value));
    }

    if scan_ids.is_empty() {
        return Err(CliError::InvalidScanIds("no scan ids provided".to_string()));
    }
    Ok(scan_ids)
}
