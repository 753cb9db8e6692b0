use colored::Colorize;
use landflow_cloud::ProvisioningPlan;
use landflow_core::{Blueprint, InfraConfig, PolicyDocuments, Secrets};

pub fn handle(config: &InfraConfig) -> anyhow::Result<()> {
    println!("{}", "設定を検証中...".blue());
    println!("設定ディレクトリ: {}", config.base_dir.display().to_string().cyan());

    let checked = PolicyDocuments::load(config).and_then(|documents| {
        let secrets = Secrets::load(config)?;
        Ok((documents, secrets))
    });
    let (documents, secrets) = match checked {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ 設定エラー".red().bold());
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    };

    let blueprint = Blueprint::assemble(config, Some(&documents), Some(&secrets));
    let plan = ProvisioningPlan::build(blueprint.into_specs())?;

    println!("{}", "✓ 設定ファイルは正常です！".green().bold());
    println!();
    println!("サマリー:");
    println!("  アカウント: {} ({})", config.account.id, config.account.region);
    println!("  バケット: {}", config.bucket.cyan());
    println!("  ポリシー:");
    for document in [
        &documents.transfer_s3,
        &documents.warehouse_s3,
        &documents.transfer_trust,
        &documents.warehouse_trust,
    ] {
        println!("    - {}", document.name.cyan());
    }
    println!("  S3 ポリシー名:");
    println!("    - {}", config.transfer_policy_name());
    println!("    - {}", config.warehouse_policy_name());
    println!(
        "  SFTP ユーザー: {} (ホーム /{})",
        config.transfer.username.cyan(),
        config.bucket
    );
    println!(
        "  クラスタ: {} ({}, {})",
        config.warehouse.cluster.cyan(),
        config.warehouse.node_type,
        config.warehouse.cluster_type
    );
    println!("  リソース: {}個", plan.len());
    Ok(())
}
