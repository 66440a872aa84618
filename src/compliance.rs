//! Section checklist validation for procurement documents.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// Sections every solicitation must contain.
pub const REQUIRED_SECTIONS: &[&str] = &[
    "Introduction",
    "Scope of Work",
    "Eligibility Criteria",
    "Evaluation Criteria",
    "Submission Guidelines",
    "Contact Information",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    pub is_compliant: bool,
    pub missing_sections: Vec<String>,
    pub message: String,
}

/// Check `document_text` for each required section name, ignoring case.
pub fn validate(document_text: &str) -> ComplianceReport {
    let haystack = document_text.to_lowercase();
    let missing_sections: Vec<String> = REQUIRED_SECTIONS
        .iter()
        .filter(|s| !haystack.contains(&s.to_lowercase()))
        .map(|s| s.to_string())
        .collect();

    let message = if missing_sections.is_empty() {
        "Document is compliant.".to_string()
    } else {
        format!("Missing sections: {}", missing_sections.join(", "))
    };

    ComplianceReport {
        is_compliant: missing_sections.is_empty(),
        missing_sections,
        message,
    }
}

/// CLI entry point for `rfp validate`.
pub fn run_validate(path: &Path) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let report = validate(&text);
    println!("{}", report.message);
    for section in &report.missing_sections {
        println!("  missing: {}", section);
    }
    if !report.is_compliant {
        anyhow::bail!("{} is not compliant", path.display());
    }
    Ok(())
}
