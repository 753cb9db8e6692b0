//! 実行結果の表示

use colored::Colorize;
use landflow_cloud::{Outcome, ProvisionOutcome, ReportEntry, RunReport, RunState, TeardownOutcome};

fn mark(outcome: &Outcome) -> colored::ColoredString {
    match outcome {
        Outcome::Provision(ProvisionOutcome::Created) => "+".green(),
        Outcome::Provision(ProvisionOutcome::AlreadyExisted) => "=".dimmed(),
        Outcome::Teardown(TeardownOutcome::Deleted) => "-".green(),
        Outcome::Teardown(TeardownOutcome::AlreadyAbsent) => "·".dimmed(),
        Outcome::Provision(ProvisionOutcome::Skipped { .. })
        | Outcome::Provision(ProvisionOutcome::Cancelled) => "○".yellow(),
        Outcome::Provision(ProvisionOutcome::Failed { .. })
        | Outcome::Teardown(TeardownOutcome::Failed { .. }) => "✗".red(),
    }
}

fn print_entry(entry: &ReportEntry) {
    let text = entry.outcome.to_string();
    let text = if entry.outcome.is_failure() {
        text.red()
    } else {
        text.normal()
    };
    let id = entry
        .id
        .as_deref()
        .map(|id| format!(" [{}]", id))
        .unwrap_or_default();
    println!(
        "  {} {:<20} {}{}",
        mark(&entry.outcome),
        entry.resource.cyan(),
        text,
        id.dimmed()
    );
}

/// リソースごとの結果とサマリーを表示
pub fn print_report(report: &RunReport) {
    println!();
    for entry in &report.entries {
        print_entry(entry);
    }

    let state = match report.state {
        RunState::Converged | RunState::Removed => report.state.to_string().green().bold(),
        RunState::PartiallyFailed => report.state.to_string().red().bold(),
        RunState::Cancelled => report.state.to_string().yellow().bold(),
    };
    println!();
    println!(
        "{} ({}, {:.1}秒)",
        state,
        report.summary(),
        report.duration_ms as f64 / 1000.0
    );

    if let Some(rollback) = &report.rollback {
        println!();
        println!("{}", "ロールバック:".yellow().bold());
        print_report(rollback);
    }
}

/// 完全に収束していなければエラーにする
pub fn ensure_success(report: &RunReport) -> anyhow::Result<()> {
    if report.is_success() {
        return Ok(());
    }
    let failed: Vec<&str> = report.failures().map(|e| e.resource.as_str()).collect();
    anyhow::bail!(
        "{} 件のリソースが完了しませんでした: {}",
        failed.len(),
        failed.join(", ")
    )
}
