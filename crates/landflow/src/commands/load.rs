use anyhow::Context;
use colored::Colorize;
use landflow_cloud::{Gateway, ResolvedDependencies, attr};
use landflow_cloud_aws::AwsGateways;
use landflow_core::{Blueprint, InfraConfig, master_password, names};
use landflow_warehouse::{ConnectionSettings, LoadPlan, LoadSource, PgWarehouse};
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn handle(config: &InfraConfig) -> anyhow::Result<()> {
    println!("{}", "ウェアハウスへロード中...".blue());

    let blueprint = Blueprint::for_teardown(config);
    let spec = blueprint
        .specs()
        .iter()
        .find(|spec| spec.name == names::WAREHOUSE_CLUSTER)
        .context("クラスタの定義がありません")?;

    let aws = AwsGateways::connect(&config.account.region).await;
    let gateway = aws
        .registry()
        .get(spec.kind)
        .context("クラスタのゲートウェイがありません")?;
    let facts = gateway
        .describe(spec, &ResolvedDependencies::new())
        .await?
        .with_context(|| {
            format!(
                "クラスタ '{}' が見つかりません。先に provision を実行してください",
                config.warehouse.cluster
            )
        })?;

    let status = facts.attribute(attr::STATUS).unwrap_or("unknown");
    if status != "available" {
        anyhow::bail!(
            "クラスタ '{}' はまだ利用できません (状態: {})",
            config.warehouse.cluster,
            status
        );
    }
    let host = facts
        .attribute(attr::ENDPOINT)
        .context("クラスタのエンドポイントがありません")?;
    let port = facts
        .attribute(attr::PORT)
        .and_then(|port| port.parse().ok())
        .unwrap_or(config.network.port);
    let role_arn = facts
        .attribute(attr::ROLE_ARN)
        .context("クラスタにロールが付与されていません")?;
    println!("クラスタ: {}:{}", host.cyan(), port);

    let settings = ConnectionSettings {
        host: host.to_string(),
        port,
        database: config.warehouse.database.clone(),
        username: config.warehouse.username.clone(),
        password: master_password(config)?,
        connect_timeout: CONNECT_TIMEOUT,
    };
    let warehouse = PgWarehouse::connect(&settings).await?;

    let plan = LoadPlan::new(
        &config.warehouse.schema,
        LoadSource {
            bucket: config.bucket.clone(),
            key_prefix: config.warehouse.key_prefix.clone(),
            role_arn: role_arn.to_string(),
            region: config.account.region.clone(),
        },
    );
    let result = landflow_warehouse::load(&warehouse, &plan).await;
    warehouse.close().await;
    let report = result?;

    println!();
    for table in plan.tables {
        let ddl = if report.created.contains(&table.name) {
            "作成".green()
        } else {
            "既存".dimmed()
        };
        println!(
            "  {} {:<12} [{}] ← {}",
            "✓".green(),
            table.name.cyan(),
            ddl,
            plan.source.object_url(table.name)
        );
    }
    println!();
    println!(
        "{}",
        format!(
            "✓ {} 個のテーブルを {}.{} にロードしました",
            report.loaded.len(),
            config.warehouse.database,
            plan.schema
        )
        .green()
        .bold()
    );
    Ok(())
}
