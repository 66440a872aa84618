//! Metadata inference for source documents.
//!
//! Every ingested document needs a complete set of categorical attributes so
//! that search filters can match on exact values. Attributes come from an
//! optional sidecar descriptor (`<basename>_metadata.json`) and, for every
//! field the sidecar leaves out, from the file name itself.
//!
//! # File name convention
//!
//! ```text
//! rfp_001_chem_glenn_modernization.pdf
//!  │   │   │    │     └─ raw project type (remaining segments)
//!  │   │   │    └─ location
//!  │   │   └─ industry code
//!  │   └─ sequence number
//!  └─ document kind
//! ```
//!
//! Inference never fails: anything it cannot determine is `"Unknown"`.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::models::{dedup_set, DEFAULT_DOCUMENT_TYPE, TBD, UNKNOWN};

/// Suffix of the sidecar descriptor that accompanies a source file.
pub const SIDECAR_SUFFIX: &str = "_metadata.json";

/// Industry code lookup, matched against the third file-name segment.
const INDUSTRY_CODES: &[(&str, &str)] = &[
    ("chem", "Chemical Processing"),
    ("oil", "Oil & Gas"),
    ("gas", "Oil & Gas"),
    ("drill", "Oil & Gas"),
    ("refine", "Oil & Gas"),
    ("tech", "Manufacturing"),
    ("forge", "Manufacturing"),
    ("synth", "Chemical Processing"),
    ("react", "Chemical Processing"),
];

/// Project type keywords in priority order; the first match wins.
const PROJECT_TYPE_KEYWORDS: &[(&[&str], &str)] = &[
    (&["modernization"], "Modernization"),
    (&["upgrade"], "Facility Upgrade"),
    (&["expansion"], "Plant Expansion"),
    (&["safety", "compliance"], "Safety Compliance"),
    (&["decommissioning"], "Decommissioning"),
    (&["retrofit"], "Automation Retrofit"),
];

/// Structured fields read from a sidecar descriptor. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidecarMetadata {
    pub title: Option<String>,
    pub industry: Option<String>,
    pub project_type: Option<String>,
    pub disciplines: Option<Vec<String>>,
    pub regulations: Option<Vec<String>>,
    pub location: Option<String>,
    pub budget: Option<String>,
    pub timeline: Option<String>,
    pub document_type: Option<String>,
}

/// Fully resolved document attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentMetadata {
    pub title: String,
    pub industry: String,
    pub project_type: String,
    pub disciplines: Vec<String>,
    pub regulations: Vec<String>,
    pub location: String,
    pub budget: String,
    pub timeline: String,
    pub document_type: String,
}

/// Resolve metadata for `file_name`, preferring sidecar values field by field.
pub fn infer(file_name: &str, sidecar: Option<&SidecarMetadata>) -> DocumentMetadata {
    let inferred = infer_from_file_name(file_name);
    let Some(sc) = sidecar else {
        return inferred;
    };

    DocumentMetadata {
        title: pick(&sc.title, inferred.title),
        industry: pick(&sc.industry, inferred.industry),
        project_type: pick(&sc.project_type, inferred.project_type),
        disciplines: sc
            .disciplines
            .clone()
            .map(dedup_set)
            .unwrap_or(inferred.disciplines),
        regulations: sc
            .regulations
            .clone()
            .map(dedup_set)
            .unwrap_or(inferred.regulations),
        location: pick(&sc.location, inferred.location),
        budget: pick(&sc.budget, inferred.budget),
        timeline: pick(&sc.timeline, inferred.timeline),
        document_type: pick(&sc.document_type, inferred.document_type),
    }
}

fn pick(preferred: &Option<String>, fallback: String) -> String {
    match preferred.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback,
    }
}

/// Derive metadata purely from the file name.
pub fn infer_from_file_name(file_name: &str) -> DocumentMetadata {
    let stem = file_stem(file_name);
    let parts: Vec<&str> = stem.split('_').collect();
    let project_type = project_type_from_keywords(file_name);

    let (title, industry, location) = if parts.len() >= 4 {
        let industry = map_industry_code(parts[2]);
        let location = match parts[3].trim() {
            "" => UNKNOWN.to_string(),
            loc => loc.to_string(),
        };
        let raw_type = parts[4..].join(" ");
        let title = format!("{} {} {}", industry, location, raw_type)
            .trim()
            .to_string();
        (title, industry.to_string(), location)
    } else {
        (
            stem.to_string(),
            industry_from_keywords(file_name).to_string(),
            UNKNOWN.to_string(),
        )
    };

    DocumentMetadata {
        title,
        industry,
        project_type: project_type.to_string(),
        disciplines: Vec::new(),
        regulations: Vec::new(),
        location,
        budget: TBD.to_string(),
        timeline: TBD.to_string(),
        document_type: DEFAULT_DOCUMENT_TYPE.to_string(),
    }
}

/// Map an industry code segment through the fixed lookup table.
pub fn map_industry_code(code: &str) -> &'static str {
    let code = code.to_lowercase();
    INDUSTRY_CODES
        .iter()
        .find(|(k, _)| *k == code)
        .map(|(_, v)| *v)
        .unwrap_or(UNKNOWN)
}

/// Scan a whole file name for any known industry code.
fn industry_from_keywords(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    INDUSTRY_CODES
        .iter()
        .find(|(k, _)| lower.contains(k))
        .map(|(_, v)| *v)
        .unwrap_or(UNKNOWN)
}

/// Scan a file name for project type keywords in priority order.
pub fn project_type_from_keywords(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    PROJECT_TYPE_KEYWORDS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| lower.contains(k)))
        .map(|(_, label)| *label)
        .unwrap_or(UNKNOWN)
}

fn file_stem(file_name: &str) -> &str {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    }
}

/// Path of the sidecar descriptor for `file_name` inside `dir`.
pub fn sidecar_path_for(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!("{}{}", file_stem(file_name), SIDECAR_SUFFIX))
}

/// Read and parse a sidecar descriptor.
///
/// Returns `None` when the file is missing or is not a valid descriptor.
pub fn try_parse_sidecar(path: &Path) -> Option<SidecarMetadata> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str::<SidecarMetadata>(&content) {
        Ok(meta) => Some(meta),
        Err(e) => {
            tracing::warn!("ignoring unparsable sidecar {}: {}", path.display(), e);
            None
        }
    }
}
