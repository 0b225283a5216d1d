//! Run summaries and status rendering.
//!
//! Every run ends with a structured summary: per-artifact status, per-wiring
//! action status and per-destination export status, so the exact remaining
//! work after a partial run is always explicit.

use comfy_table::Table;

use crate::artifact::ArtifactSpec;
use crate::config::NetworkConfig;
use crate::export::ExportReport;
use crate::state::{ArtifactStatus, DeploymentState};
use crate::wiring::WiringReport;

/// Overall outcome of an orchestration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RunStatus {
    /// Every creation deployed, every wiring action applied, every export
    /// destination written.
    Complete,
    /// Creations are all deployed but some wiring action or export
    /// destination is unresolved.
    Partial,
    /// At least one creation is missing.
    Failed,
}

/// One artifact's line in the summary.
#[derive(Debug, Clone)]
pub struct ArtifactLine {
    pub artifact: String,
    pub status: ArtifactStatus,
    pub explorer: Option<String>,
}

/// The end-of-run summary.
#[derive(Debug)]
pub struct RunSummary {
    pub network: String,
    pub chain_id: u64,
    pub status: RunStatus,
    pub artifacts: Vec<ArtifactLine>,
    pub wiring: Option<WiringReport>,
    pub export: Option<ExportReport>,
}

impl RunSummary {
    /// Assemble the summary for a registry against recorded state.
    pub fn build(
        state: &DeploymentState,
        specs: &[ArtifactSpec],
        network: &NetworkConfig,
        wiring: Option<WiringReport>,
        export: Option<ExportReport>,
    ) -> Self {
        let artifacts = specs
            .iter()
            .map(|spec| {
                let status = state.artifact_status(&spec.name);
                let explorer = match &status {
                    ArtifactStatus::Deployed(record) => {
                        network.explorer_address_url(record.address)
                    }
                    _ => None,
                };
                ArtifactLine {
                    artifact: spec.name.clone(),
                    status,
                    explorer,
                }
            })
            .collect::<Vec<_>>();

        let status = compute_status(&artifacts, wiring.as_ref(), export.as_ref());

        Self {
            network: state.network.clone(),
            chain_id: state.chain_id,
            status,
            artifacts,
            wiring,
            export,
        }
    }
}

fn compute_status(
    artifacts: &[ArtifactLine],
    wiring: Option<&WiringReport>,
    export: Option<&ExportReport>,
) -> RunStatus {
    let all_deployed = artifacts
        .iter()
        .all(|line| matches!(line.status, ArtifactStatus::Deployed(_)));
    if !all_deployed {
        return RunStatus::Failed;
    }

    let wiring_ok = wiring.is_none_or(WiringReport::is_complete);
    let export_ok = export.is_none_or(ExportReport::is_complete);
    if wiring_ok && export_ok {
        RunStatus::Complete
    } else {
        RunStatus::Partial
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Run status: {} (network {}, chain {})",
            self.status, self.network, self.chain_id
        )?;
        writeln!(f)?;

        writeln!(f, "=== Artifacts ===")?;
        for line in &self.artifacts {
            let icon = status_icon(matches!(line.status, ArtifactStatus::Deployed(_)));
            writeln!(f, "  {} {} {}", icon, line.artifact, line.status)?;
            if let Some(url) = &line.explorer {
                writeln!(f, "       {url}")?;
            }
        }

        if let Some(wiring) = &self.wiring {
            writeln!(f)?;
            writeln!(f, "=== Wiring ===")?;
            for action in &wiring.actions {
                let icon = status_icon(action.outcome.is_applied());
                writeln!(
                    f,
                    "  {} {} -> {}: {}",
                    icon, action.action, action.target, action.outcome
                )?;
            }
        }

        if let Some(export) = &self.export {
            writeln!(f)?;
            writeln!(f, "=== Export ===")?;
            for destination in &export.destinations {
                match &destination.result {
                    Ok(files) => writeln!(
                        f,
                        "  {} {} ({} files)",
                        status_icon(true),
                        destination.destination.display(),
                        files
                    )?,
                    Err(err) => writeln!(
                        f,
                        "  {} {} ({})",
                        status_icon(false),
                        destination.destination.display(),
                        err
                    )?,
                }
            }
        }

        Ok(())
    }
}

/// Tabular per-artifact status for the `status` command.
pub fn artifact_table(state: &DeploymentState, specs: &[ArtifactSpec]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Artifact", "Status", "Address", "Block", "Gas used"]);

    for spec in specs {
        match state.artifact_status(&spec.name) {
            ArtifactStatus::Deployed(record) => table.add_row(vec![
                spec.name.clone(),
                "deployed".to_string(),
                record.address.to_string(),
                record.block_number.to_string(),
                record.gas_used.to_string(),
            ]),
            status => table.add_row(vec![
                spec.name.clone(),
                status.to_string(),
                String::new(),
                String::new(),
                String::new(),
            ]),
        };
    }

    table
}

/// Tabular wiring status for the `status` command.
pub fn wiring_table(state: &DeploymentState, specs: &[ArtifactSpec]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Action", "Target", "Status"]);

    for spec in specs {
        for action in &spec.wiring {
            let status = if state.is_wiring_applied(&action.name) {
                "applied"
            } else {
                "not applied"
            };
            table.add_row(vec![
                action.name.clone(),
                action.target.clone(),
                status.to_string(),
            ]);
        }
    }

    table
}

fn status_icon(ok: bool) -> &'static str {
    if ok { "[ok]" } else { "[FAILED]" }
}
