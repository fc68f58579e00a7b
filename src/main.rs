use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use smbbk::core::notifications::create_notifier;
use smbbk::core::transfer_engine::{
    SimulatedEngine, TransferEngine, TransferEngineType, create_engine,
};
use smbbk::core::{
    BackupJob, InquirePrompter, JobReport, Orchestrator, RunMode, Verdict, invoking_user,
};
use smbbk::logging::{self, LogConfig};
use smbbk::{adapters, config, context, shutdown};

#[derive(Parser)]
#[command(name = "smbbk")]
#[command(about = "Back up a local directory to an SMB share", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: $XDG_CONFIG_HOME/smbbk/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use a local directory instead of a real share and copy nothing
    #[arg(long, global = true)]
    simulation: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup
    Run(RunArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args, Serialize)]
struct RunArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    source_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    server: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    share: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    credentials_file: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    transfer_engine: Option<TransferEngineType>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long)]
    verbose: Option<bool>,

    /// Behave as an unattended run even on a terminal
    #[serde(skip)]
    #[arg(long)]
    automated: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Run(args) => run_backup(&cli, args).await,
        Commands::Config => print_config(&cli),
    };

    match result {
        // Leave without waiting on a prompt thread that may still block on stdin
        Ok(code) => {
            let _ = std::io::stdout().flush();
            std::process::exit(code.into())
        }
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_backup(cli: &Cli, args: &RunArgs) -> Result<u8> {
    let config = config::AppConfig::new(cli.config.as_deref(), Some(args))?;

    let mode = if args.automated {
        RunMode::Automated
    } else {
        RunMode::detect()
    };

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        file: (!mode.is_interactive()).then(|| config.log_file.clone()),
    })
    .context("Failed to initialize logging")?;

    let mounter = adapters::get_mounter(cli.simulation, &config.mount_base)?;
    let engine: Arc<dyn TransferEngine> = if cli.simulation {
        Arc::new(SimulatedEngine::default())
    } else {
        create_engine(config.transfer_engine)
    };
    let notifier = create_notifier(&config.notifications);

    let job = BackupJob::new(&config, mode, chrono::Local::now(), invoking_user());
    let ctx = context::AppContext::new(config, mode);
    shutdown::listen(ctx.cancel.clone());

    let report = Orchestrator::new(ctx, mounter, engine, Arc::new(InquirePrompter))
        .with_notifier(notifier)
        .run(job)
        .await;

    if mode.is_interactive() {
        print_summary(&report);
    }

    Ok(report.exit_code())
}

fn print_config(cli: &Cli) -> Result<u8> {
    let config = config::AppConfig::load::<()>(cli.config.as_deref(), None)?;
    print!("{}", config.to_toml()?);
    Ok(0)
}

fn print_summary(report: &JobReport) {
    let destination = format!("{}/{}", report.job.endpoint, report.job.folder);

    match &report.verdict {
        Verdict::Succeeded(result) => {
            println!(
                "Backup complete: {} files, {} bytes → {}",
                result.files, result.bytes, destination
            );
        }
        Verdict::CopyFailed(result) => {
            println!(
                "Backup finished with errors (copy exit status {}): {} files, {} bytes → {}",
                result.exit_status, result.files, result.bytes, destination
            );
            println!("Some files were not copied; re-run or check the log above.");
        }
        Verdict::Cancelled => println!("Backup cancelled."),
        Verdict::Failed(e) => {
            eprintln!("Backup failed: {}", e);
            if let Some(hint) = e.hint() {
                eprintln!("Hint: {}", hint);
            }
        }
    }
}
