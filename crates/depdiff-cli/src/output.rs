use color_eyre::Result;
use depdiff_core::{DiffStatus, FetchStatus, RunError, RunReport};
use serde_json::json;

use crate::style::Style;

pub fn emit_json(report: &RunReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

pub fn emit_error_json(err: &RunError) -> Result<()> {
    let payload = json!({ "error": err.to_string() });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

pub fn emit_human(style: &Style, report: &RunReport) {
    for line in summary_lines(style, report) {
        println!("{line}");
    }
}

fn summary_lines(style: &Style, report: &RunReport) -> Vec<String> {
    let mut lines = Vec::new();
    for (label, manifest) in [("old", &report.old), ("new", &report.new)] {
        if let Some(error) = &manifest.error {
            lines.push(style.warning(&format!(
                "{label} revision {} read as empty: {error}",
                manifest.revision
            )));
        }
    }
    for outcome in &report.outcomes {
        if let FetchStatus::Failed { reason } = &outcome.status {
            lines.push(style.warning(&format!(
                "{} ({}) was not fetched: {reason}",
                outcome.package, outcome.side
            )));
        }
    }

    match &report.diff {
        DiffStatus::Skipped => {
            lines.push(style.failure("Cancelled before the diff was written"));
            return lines;
        }
        DiffStatus::Failed { reason } => {
            lines.push(style.failure(&format!("Diff generation failed: {reason}")));
        }
        DiffStatus::NoDifferences => {
            lines.push(style.info("No dependency code changed between the two revisions"));
        }
        DiffStatus::DifferencesFound => {}
    }

    lines.push(style.success(&format!(
        "Dependency code diff process completed. Diff file saved to {}",
        report.output.display()
    )));
    lines
}
