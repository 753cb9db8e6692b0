use colored::Colorize;
use landflow_cloud::{ProvisioningPlan, ResourceSpec};
use landflow_core::{Blueprint, InfraConfig};

fn print_spec(index: usize, spec: &ResourceSpec, arrow: &str, related: &[&str]) {
    let related = if related.is_empty() {
        String::new()
    } else {
        format!(" {} {}", arrow, related.join(", "))
    };
    println!(
        "  {:>2}. {:<20} {}{}",
        index + 1,
        spec.name.cyan(),
        spec.kind,
        related.dimmed()
    );
}

pub fn handle(config: &InfraConfig) -> anyhow::Result<()> {
    let plan = ProvisioningPlan::build(Blueprint::for_teardown(config).into_specs())?;

    println!("{}", format!("作成順 ({} 個):", plan.len()).bold());
    for (i, spec) in plan.forward_order().enumerate() {
        let deps: Vec<&str> = spec.depends_on.iter().map(String::as_str).collect();
        print_spec(i, spec, "←", &deps);
    }

    println!();
    println!("{}", "削除順:".bold());
    for (i, spec) in plan.teardown_order().enumerate() {
        print_spec(i, spec, "→", &plan.dependents_of(&spec.name));
    }
    Ok(())
}
