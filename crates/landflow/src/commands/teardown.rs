use super::Target;
use crate::output;
use colored::Colorize;
use landflow_cloud::{MemoryCloud, Orchestrator, OrchestratorSettings, ResourceSpec};
use landflow_core::{Blueprint, InfraConfig};
use std::io::Write;

pub async fn handle(config: &InfraConfig, yes: bool, dry_run: bool) -> anyhow::Result<()> {
    println!("{}", "リソースを削除中...".yellow());

    // 削除は論理名だけで足りるので、鍵やパスワードは不要
    let blueprint = Blueprint::for_teardown(config);
    let settings = landflow_core::settings(&config.run);

    if !yes && !dry_run && !confirm(blueprint.specs())? {
        println!("キャンセルしました");
        return Ok(());
    }

    let target = Target::connect(config, dry_run).await;
    println!("対象: {}", target.label(config).cyan());
    if let Target::Memory(cloud) = &target {
        seed(cloud, blueprint.specs(), settings.clone()).await?;
    }

    let mut orchestrator = Orchestrator::new(blueprint.into_specs(), &target.registry(), settings)?;
    let report = orchestrator.teardown().await;

    output::print_report(&report);
    output::ensure_success(&report)
}

fn confirm(specs: &[ResourceSpec]) -> anyhow::Result<bool> {
    println!();
    println!("{}", "以下のリソースを削除します:".bold());
    for spec in specs {
        println!("  • {} ({})", spec.name.cyan(), spec.kind);
    }
    println!();
    print!("よろしいですか？ [y/N]: ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim(), "y" | "Y" | "yes"))
}

/// dry-run では空のクラウドに一度作成してから削除順を見せる
async fn seed(
    cloud: &MemoryCloud,
    specs: &[ResourceSpec],
    settings: OrchestratorSettings,
) -> anyhow::Result<()> {
    let mut orchestrator = Orchestrator::new(specs.to_vec(), &cloud.registry(), settings)?;
    let report = orchestrator.provision().await;
    output::ensure_success(&report)
}
