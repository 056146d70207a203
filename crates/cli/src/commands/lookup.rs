//! Inspect the statistics the backend holds for one workload

use anyhow::{anyhow, Result};
use colored::Colorize;
use rightsize_lib::{stats::find_stat, StatsClient, WorkloadIdentity};
use tabled::Tabled;

use crate::output::{format_stat, print_warning, OutputFormat};
use crate::StatsSource;

/// Row for the container statistics table
#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "CPU Max")]
    cpu_max: String,
    #[tabled(rename = "CPU Pred")]
    cpu_prediction: String,
    #[tabled(rename = "Mem Max (MB)")]
    memory_max: String,
    #[tabled(rename = "Mem Pred (MB)")]
    memory_prediction: String,
    #[tabled(rename = "Mem 7d (MB)")]
    memory_7day: String,
}

/// Fetch the snapshot and print the entry for `key`
pub fn lookup(source: &StatsSource, key: &str, format: OutputFormat) -> Result<()> {
    let identity = WorkloadIdentity::parse(key).ok_or_else(|| {
        anyhow!("Invalid workload '{}', expected <Deployment|StatefulSet|DaemonSet>/<namespace>/<name>", key)
    })?;

    let client = StatsClient::new(source.url.clone(), source.fetcher()?);
    let snapshot = client.try_fetch_snapshot()?;

    let Some(stat) = find_stat(&identity, &snapshot) else {
        print_warning(&format!("No statistics found for {}", identity));
        return Ok(());
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stat)?);
        }
        OutputFormat::Table => {
            println!("{}", "Workload Statistics".bold());
            println!("{}", "=".repeat(60));
            println!("Workload:       {}", stat.workload.cyan());
            let hpa = if stat.is_horizontally_autoscaled_on_cpu {
                "yes".yellow()
            } else {
                "no".normal()
            };
            println!("HPA on CPU:     {}", hpa);
            println!();

            if stat.container_stats.is_empty() {
                print_warning("Workload has no container statistics");
                return Ok(());
            }

            let rows: Vec<StatRow> = stat
                .container_stats
                .iter()
                .map(|c| StatRow {
                    container: c.container_name.clone(),
                    cpu_max: format_stat(c.cpu_stats.and_then(|s| s.max)),
                    cpu_prediction: format_stat(c.simple_predictions_cpu.and_then(|p| p.max_value)),
                    memory_max: format_stat(c.memory_stats.and_then(|s| s.max)),
                    memory_prediction: format_stat(
                        c.simple_predictions_memory.and_then(|p| p.max_value),
                    ),
                    memory_7day: format_stat(c.memory_7day.and_then(|s| s.max)),
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
