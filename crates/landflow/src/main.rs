mod commands;
mod output;

use clap::{Parser, Subcommand};
use landflow_core::CONFIG_ENV;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "landflow")]
#[command(
    about = "SFTP で届いたファイルをウェアハウスへ。AWS の受け口を依存順に構築・撤去します。",
    long_about = None
)]
struct Cli {
    /// 設定ファイルのパス (LANDFLOW_CONFIG 環境変数でも指定可)
    #[arg(short, long, global = true, env = CONFIG_ENV)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// リソースを依存順に作成 (既存のものは再利用)
    Provision {
        /// 中断時に作成済みリソースを削除しない
        #[arg(long)]
        no_rollback: bool,
        /// 同時に処理するリソース数の上限
        #[arg(short, long)]
        parallel: Option<usize>,
        /// インメモリのクラウドに対して実行
        #[arg(long)]
        dry_run: bool,
    },
    /// リソースを依存の逆順に削除
    Teardown {
        /// 確認なしで実行
        #[arg(short, long)]
        yes: bool,
        /// インメモリのクラウドに対して実行
        #[arg(long)]
        dry_run: bool,
    },
    /// 作成順と削除順を表示
    Plan,
    /// 設定とポリシードキュメントを検証
    Validate,
    /// バケットの CSV をウェアハウスへロード
    Load,
    /// バージョン情報を表示
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ログは stderr、進捗表示は stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("landflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = landflow_core::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Provision {
            no_rollback,
            parallel,
            dry_run,
        } => {
            commands::provision::handle(
                &config,
                commands::provision::Options {
                    no_rollback,
                    parallel,
                    dry_run,
                },
            )
            .await
        }
        Commands::Teardown { yes, dry_run } => {
            commands::teardown::handle(&config, yes, dry_run).await
        }
        Commands::Plan => commands::plan::handle(&config),
        Commands::Validate => commands::validate::handle(&config),
        Commands::Load => commands::load::handle(&config).await,
        Commands::Version => unreachable!("Version is handled before config loading"),
    }
}
