use anyhow::Result;
use clap::Parser;
use matchpull::{init_tracing, ExtractorConfig, Runner};

#[derive(Debug, Parser)]
#[command(
    name = "matchpull",
    version,
    about = "Extract ranked match history with a pool of rate-limited API keys"
)]
struct Cli {
    #[arg(
        value_name = "GAME_NAME#TAG",
        help = "Players to extract, e.g. \"Hide on bush#KR1\""
    )]
    subjects: Vec<String>,
    #[arg(
        long,
        value_name = "MATCHES",
        help = "Match ids to extract per player [default: MATCHPULL_HISTORY_DEPTH or 200]"
    )]
    depth: Option<u32>,
    #[arg(
        long,
        env = "MATCHPULL_FOLLOW",
        help = "Keep workers running after the queue drains until Ctrl-C"
    )]
    follow: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = ExtractorConfig::from_env()?;
    let depth = cli.depth.unwrap_or(config.history_depth());
    let mut runner = Runner::new(config)?;

    for riot_id in &cli.subjects {
        match runner.orchestrator().enqueue_extraction(riot_id, depth).await {
            Ok(receipt) => tracing::info!(
                subject = %receipt.subject,
                region = %receipt.region,
                batches = receipt.task_ids.len(),
                "subject queued"
            ),
            Err(err) => tracing::error!(subject = %riot_id, error = %err, "could not queue subject"),
        }
    }

    if cli.follow {
        runner.run_until_ctrl_c().await?;
    } else {
        let stats = runner.run_until_drained().await?;
        if stats.failed > 0 {
            for task in runner.queue().failed_tasks().await {
                tracing::error!(
                    task = %task.id,
                    subject = %task.subject,
                    offset = task.offset,
                    error = task.last_error.as_deref().unwrap_or("unknown"),
                    "task failed"
                );
            }
        }
    }

    let snapshot = runner.telemetry().snapshot();
    tracing::info!(
        inserted = snapshot.records_inserted,
        duplicates = snapshot.duplicates_skipped,
        done = snapshot.tasks_done,
        failed = snapshot.tasks_failed,
        rate_limited = snapshot.rate_limit_signals,
        "extraction finished"
    );
    Ok(())
}
