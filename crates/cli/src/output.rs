use crate::error::CliError;
use engine_core::state::models::ScanMapping;
use engine_runtime::execution::executor::RunSummary;
use serde::Serialize;

/// The mapping report persisted at run end: every accumulated
/// `(source, target)` pair plus the run totals.
#[derive(Serialize)]
struct MappingReport<'a> {
    run_id: &'a str,
    succeeded: usize,
    failed: u64,
    cancelled: bool,
    checkpoint: Option<String>,
    scan_mapping: &'a [ScanMapping],
}

fn report_json(summary: &RunSummary) -> Result<String, CliError> {
    let report = MappingReport {
        run_id: summary.run_id.as_str(),
        succeeded: summary.succeeded,
        failed: summary.failed,
        cancelled: summary.cancelled,
        checkpoint: summary
            .checkpoint_path
            .as_deref()
            .map(|p| p.display().to_string()),
        scan_mapping: &summary.mapping,
    };
    serde_json::to_string_pretty(&report).map_err(CliError::JsonSerialize)
}

pub async fn write_report(summary: &RunSummary, path: String) -> Result<(), CliError> {
    let json = report_json(summary)?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_report(summary: &RunSummary) -> Result<(), CliError> {
    let json = report_json(summary)?;
    println!("{json}");
    Ok(())
}

pub fn print_summary(summary: &RunSummary) {
    println!("Run {} finished", summary.run_id);
    println!("-----------------------------");
    println!("{:<16} {}", "Copied", summary.succeeded);
    println!("{:<16} {}", "Failed", summary.failed);
    println!(
        "{:<16} {}",
        "Checkpoint",
        summary
            .checkpoint_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "removed (clean run)".to_string())
    );
    if summary.cancelled {
        println!("{:<16} {}", "Status", "cancelled (resumable)");
    }
}
