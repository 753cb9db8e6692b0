use super::Target;
use crate::output;
use colored::Colorize;
use landflow_cloud::Orchestrator;
use landflow_core::{Blueprint, InfraConfig, names};

pub struct Options {
    pub no_rollback: bool,
    pub parallel: Option<usize>,
    pub dry_run: bool,
}

pub async fn handle(config: &InfraConfig, options: Options) -> anyhow::Result<()> {
    println!("{}", "リソースを構築中...".blue());
    println!("バケット: {}", config.bucket.cyan());

    // プロバイダーを呼ぶ前にドキュメントと鍵を全て解決する
    let blueprint = Blueprint::for_provision(config)?;

    let mut settings = landflow_core::settings(&config.run);
    if let Some(parallel) = options.parallel {
        settings.max_parallel = parallel;
    }
    settings.rollback_on_cancel = !options.no_rollback;

    let target = Target::connect(config, options.dry_run).await;
    println!("対象: {}", target.label(config).cyan());

    let mut orchestrator = Orchestrator::new(blueprint.into_specs(), &target.registry(), settings)?;

    // Ctrl-C で新しい作成を止め、実行中のものは完了を待つ
    let token = orchestrator.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!(
                "{}",
                "中断を受け付けました。実行中の処理の完了を待っています...".yellow()
            );
            token.cancel();
        }
    });

    let report = orchestrator.provision().await;
    interrupt.abort();

    output::print_report(&report);

    if report.is_success()
        && let Some(server_id) = orchestrator
            .handle(names::TRANSFER_ENDPOINT)
            .and_then(|handle| handle.id())
    {
        println!();
        println!(
            "SFTP エンドポイント: {}",
            config.sftp_hostname(server_id).cyan().bold()
        );
    }

    output::ensure_success(&report)
}
