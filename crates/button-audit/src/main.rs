mod arguments;

use std::process::ExitCode;

use anyhow::Context;
use arguments::Args;
use clap::Parser;
use services::services::button_scanner::ButtonScanner;
use tracing::info;
use utils::logging::{LogFormat, init_tracing};

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing("warn", LogFormat::from_env());

    let scanner = ButtonScanner::new()?;
    let report = scanner
        .scan_dir(&args.path)
        .with_context(|| format!("failed to scan {}", args.path.display()))?;
    info!(
        files = report.files_scanned,
        buttons = report.buttons_found,
        issues = report.total_issues(),
        "Scan finished"
    );

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_text());
    }

    if args.strict && report.has_issues() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
