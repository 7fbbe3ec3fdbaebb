//! Output formatting for the CLI
//!
//! Tables and JSON/YAML go to stdout; status lines use colored markers.

use chrono::Utc;
use colored::Colorize;
use ocp_appsim::controlplane::inventory::format_age;
use ocp_appsim::{DeploymentSummary, Result};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

/// One inventory row as displayed
#[derive(Debug, Tabled, Serialize)]
pub struct InventoryRow {
    #[tabled(rename = "Namespace")]
    pub namespace: String,
    #[tabled(rename = "Owner")]
    pub owner: String,
    #[tabled(rename = "Pod count")]
    pub pods: String,
    #[tabled(rename = "PVC capacity")]
    pub pvc_capacity: String,
    #[tabled(rename = "PVC status")]
    pub pvc_status: String,
    #[tabled(rename = "Storage class")]
    pub storage_class: String,
    #[tabled(rename = "AppSim status")]
    pub status: String,
    #[tabled(rename = "Age")]
    pub age: String,
}

impl From<&DeploymentSummary> for InventoryRow {
    fn from(summary: &DeploymentSummary) -> Self {
        Self {
            namespace: summary.namespace.clone(),
            owner: summary.owner.clone(),
            pods: summary.pod_column(),
            pvc_capacity: summary.pvc_capacity.clone(),
            pvc_status: summary.pvc_phase.clone(),
            storage_class: summary.storage_class.clone(),
            status: summary.status.to_string(),
            age: summary
                .age(Utc::now())
                .map(format_age)
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print data in the requested format
pub fn print_output<T: Tabled + Serialize>(data: Vec<T>, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => print_table(data),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&data)?),
        OutputFormat::Yaml => println!("{}", serde_yaml::to_string(&data)?),
    }
    Ok(())
}

/// Print data as a table using the tabled crate
pub fn print_table<T: Tabled>(data: Vec<T>) {
    if data.is_empty() {
        println!("{}", "No deployments found".yellow());
        return;
    }
    println!("{}", Table::new(data));
}

/// Print a plain list, one item per line
pub fn print_list(items: &[String]) {
    for item in items {
        println!("{}", item);
    }
}

/// Print a success message with green checkmark
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message with red X
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print an info message with blue i
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message with yellow triangle
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocp_appsim::controlplane::inventory::{PodCounts, SimulatorStatus};

    #[test]
    fn test_row_from_summary() {
        let summary = DeploymentSummary {
            namespace: "sim-a".into(),
            owner: "alice".into(),
            pods: Some(PodCounts {
                running: 3,
                total: 4,
            }),
            pvc_capacity: "10Gi".into(),
            pvc_phase: "Bound".into(),
            storage_class: "gold".into(),
            status: SimulatorStatus::Verifying,
            created: None,
        };

        let row = InventoryRow::from(&summary);
        assert_eq!(row.pods, "3/4");
        assert_eq!(row.status, "VERIFYING");
        assert_eq!(row.age, "-");

        let table = Table::new(vec![row]).to_string();
        assert!(table.contains("AppSim status"));
        assert!(table.contains("sim-a"));
    }
}
