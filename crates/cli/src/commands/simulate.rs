//! Dry-run the admission mutator against a pod manifest

use anyhow::{bail, Context, Result};
use colored::Colorize;
use k8s_openapi::api::core::v1::{Container, Pod};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use rightsize_lib::{
    quantity::{CPU, MEMORY},
    workload, AdmissionDecision, MutatorConfig, PodAdmission, PodMutator, ShortCircuit,
    UnmodifiedReason,
};
use std::collections::BTreeMap;
use std::path::Path;
use tabled::Tabled;

use crate::output::{color_change, print_info, print_success, print_warning, OutputFormat};
use crate::StatsSource;

/// Row for the before/after table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "CPU Req")]
    cpu_request: String,
    #[tabled(rename = "CPU Lim")]
    cpu_limit: String,
    #[tabled(rename = "Mem Req")]
    memory_request: String,
    #[tabled(rename = "Mem Lim")]
    memory_limit: String,
}

/// Run the mutator on the pod in `manifest` and print the outcome
pub fn simulate(
    source: &StatsSource,
    manifest: &Path,
    namespace: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let content = std::fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read {}", manifest.display()))?;
    let pod: Pod = serde_json::from_str(&content).context("Manifest is not a valid Pod")?;

    let namespace = namespace
        .or_else(|| pod.metadata.namespace.clone())
        .unwrap_or_else(|| "default".to_string());

    let config = MutatorConfig::new(&source.url)?;
    let mutator = PodMutator::new(config, source.fetcher()?);
    let admission = PodAdmission::new(namespace.as_str(), pod.clone());
    let decision = mutator.process(&admission);

    if let AdmissionDecision::NoFurtherAction(ShortCircuit::StatsUnavailable) = decision {
        bail!("Statistics backend at {} is unavailable", source.url);
    }

    let result = decision.pod().unwrap_or(&pod);

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Table => {
            println!("{}", "Simulation".bold());
            println!("{}", "=".repeat(60));
            println!("Pod:       {}", admission.pod_name().cyan());
            println!("Namespace: {}", namespace.cyan());
            match workload::resolve(&pod, &namespace) {
                Some(identity) => println!("Workload:  {}", identity.to_string().cyan()),
                None => println!("Workload:  {}", "unresolved".yellow()),
            }
            println!();

            let rows = container_rows(&pod, result);
            if !rows.is_empty() {
                let table = tabled::Table::new(rows)
                    .with(tabled::settings::Style::rounded())
                    .to_string();
                println!("{}\n", table);
            }

            match &decision {
                AdmissionDecision::Mutated(_) => print_success("Pod would be mutated"),
                AdmissionDecision::Unmodified(UnmodifiedReason::HorizontallyAutoscaled) => {
                    print_warning("Workload autoscales on CPU, pod left unchanged")
                }
                AdmissionDecision::Unmodified(UnmodifiedReason::UnresolvedWorkload) => {
                    print_warning("No owning workload found, pod left unchanged")
                }
                other => print_info(&format!("Pod left unchanged ({})", other.outcome())),
            }
        }
    }

    Ok(())
}

fn container_rows(before: &Pod, after: &Pod) -> Vec<ContainerRow> {
    let (Some(before), Some(after)) = (before.spec.as_ref(), after.spec.as_ref()) else {
        return Vec::new();
    };

    let init_before = before.init_containers.as_deref().unwrap_or_default();
    let init_after = after.init_containers.as_deref().unwrap_or_default();

    let main = before.containers.iter().zip(&after.containers).map(|(b, a)| (b, a, false));
    let init = init_before.iter().zip(init_after).map(|(b, a)| (b, a, true));

    main.chain(init)
        .map(|(before, after, init)| {
            let name = if init {
                format!("{} (init)", before.name)
            } else {
                before.name.clone()
            };
            ContainerRow {
                name,
                cpu_request: change(requests(before), requests(after), CPU),
                cpu_limit: change(limits(before), limits(after), CPU),
                memory_request: change(requests(before), requests(after), MEMORY),
                memory_limit: change(limits(before), limits(after), MEMORY),
            }
        })
        .collect()
}

fn requests(container: &Container) -> Option<&BTreeMap<String, Quantity>> {
    container.resources.as_ref()?.requests.as_ref()
}

fn limits(container: &Container) -> Option<&BTreeMap<String, Quantity>> {
    container.resources.as_ref()?.limits.as_ref()
}

fn change(
    before: Option<&BTreeMap<String, Quantity>>,
    after: Option<&BTreeMap<String, Quantity>>,
    resource: &str,
) -> String {
    let value = |map: Option<&BTreeMap<String, Quantity>>| {
        map.and_then(|m| m.get(resource))
            .map(|q| q.0.clone())
            .unwrap_or_else(|| "-".to_string())
    };
    color_change(&value(before), &value(after))
}
