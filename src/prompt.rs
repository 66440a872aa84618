//! Prompt composition.
//!
//! [`compose`] renders a [`GenerationRequest`] and its reference documents
//! into the text handed to a generation backend. It is pure: the same input
//! always produces the same prompt, and nothing is ever truncated.
//!
//! Section order:
//!
//! 1. role preamble
//! 2. project information and description
//! 3. disciplines and numbered requirements
//! 4. industry-specific context
//! 5. evaluation, submission, regulatory, custom clauses, contact
//! 6. generation instructions
//! 7. reference documents (only when there are any)
//! 8. RFI addendum (only for `documentType = "RFI"`)

use std::fmt::Write;

use crate::models::{GenerationRequest, SearchResult};

const TBD_TEXT: &str = "To be determined";

/// First words of a compliance review prompt.
pub const COMPLIANCE_REVIEW_OPENING: &str = "You are a compliance expert";
/// First words of a scope of work prompt.
pub const SCOPE_OF_WORK_OPENING: &str = "Generate a detailed Scope of Work";
const REFERENCE_DELIMITER: &str = "---";

struct IndustryTemplate {
    industry: &'static str,
    keywords: &'static [&'static str],
    regulations: &'static [&'static str],
    disciplines: &'static [&'static str],
}

const INDUSTRY_TEMPLATES: &[IndustryTemplate] = &[
    IndustryTemplate {
        industry: "Manufacturing",
        keywords: &[
            "production",
            "assembly",
            "quality control",
            "automation",
            "safety protocols",
        ],
        regulations: &["ISO 9001", "OSHA", "ASME Standards"],
        disciplines: &[
            "Mechanical Engineering",
            "Electrical Engineering",
            "Industrial Automation",
        ],
    },
    IndustryTemplate {
        industry: "Oil & Gas",
        keywords: &["drilling", "refining", "pipeline", "offshore", "petrochemical"],
        regulations: &["API Standards", "EPA Requirements", "OSHA"],
        disciplines: &[
            "Process Engineering",
            "Piping & Pipeline",
            "Instrumentation & Controls",
        ],
    },
    IndustryTemplate {
        industry: "Chemical Processing",
        keywords: &[
            "chemical reaction",
            "distillation",
            "synthesis",
            "batch processing",
        ],
        regulations: &["EPA Requirements", "NFPA Codes", "ISO 14001"],
        disciplines: &[
            "Process Engineering",
            "Environmental Engineering",
            "Chemical Engineering",
        ],
    },
];

const DEFAULT_REQUIREMENTS: &[&str] = &[
    "Detailed technical specifications to be defined",
    "Quality assurance requirements",
    "Safety and compliance standards",
];

const STANDARD_SECTIONS: &[&str] = &[
    "EXECUTIVE SUMMARY",
    "PROJECT OVERVIEW AND BACKGROUND",
    "SCOPE OF WORK (detailed technical requirements)",
    "TECHNICAL SPECIFICATIONS",
    "DELIVERABLES AND MILESTONES",
    "QUALIFICATION REQUIREMENTS",
    "EVALUATION CRITERIA AND PROCESS",
    "SUBMISSION REQUIREMENTS AND DEADLINES",
    "TERMS AND CONDITIONS",
    "APPENDICES (if applicable)",
];

const RFI_ADDENDUM: &str = "RFI-SPECIFIC INSTRUCTIONS:
=========================
This is a Request for Information (RFI), not a Request for Proposal (RFP). Therefore:

1. Focus on gathering information rather than requesting formal proposals
2. Ask open-ended questions about capabilities, approaches, and solutions
3. Request vendor qualifications and experience
4. Seek preliminary cost estimates and timeline information
5. Include questions about innovative approaches or alternatives
6. Request information about potential challenges and risk mitigation
7. Ask for case studies or examples of similar projects

The tone should be exploratory and information-gathering rather than prescriptive.";

fn or_default<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

fn heading(out: &mut String, title: &str) {
    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
}

/// Industry context paragraph for the prompt.
pub fn industry_context(industry: &str) -> String {
    match INDUSTRY_TEMPLATES.iter().find(|t| t.industry == industry) {
        Some(t) => format!(
            "This is a {industry} industry project. Key considerations include:\n\n\
             Key Industry Keywords: {}\n\
             Applicable Regulations: {}\n\
             Typical Engineering Disciplines: {}\n\n\
             Please ensure the document incorporates industry-specific terminology, \
             standards, and best practices relevant to {industry}.",
            t.keywords.join(", "),
            t.regulations.join(", "),
            t.disciplines.join(", "),
        ),
        None => "General industrial project requirements apply. Focus on safety, quality, \
                 and regulatory compliance."
            .to_string(),
    }
}

pub fn is_rfi(request: &GenerationRequest) -> bool {
    request.document_type.trim().eq_ignore_ascii_case("RFI")
}

/// Render the generation prompt for `request` with `references` as
/// supporting evidence, in the order supplied.
pub fn compose(request: &GenerationRequest, references: &[SearchResult]) -> String {
    let doc_type = or_default(&request.document_type, "RFP");
    let sector = or_default(&request.sector, "Government");
    let industry = request.industry.trim();
    let mut out = String::new();

    if industry.is_empty() {
        let _ = writeln!(
            out,
            "You are an expert in {} sector procurement. Generate a comprehensive, \
             professional {} document.",
            sector, doc_type
        );
    } else {
        let _ = writeln!(
            out,
            "You are an expert in {} sector procurement and {} industry requirements. \
             Generate a comprehensive, professional {} document.",
            sector, industry, doc_type
        );
    }
    out.push('\n');

    heading(&mut out, "PROJECT INFORMATION:");
    let _ = writeln!(
        out,
        "Project Name: {}",
        or_default(&request.project_name, "Industrial Project")
    );
    let _ = writeln!(out, "Sector: {}", sector);
    let _ = writeln!(out, "Industry: {}", or_default(industry, TBD_TEXT));
    let _ = writeln!(
        out,
        "Project Type: {}",
        or_default(&request.project_type, TBD_TEXT)
    );
    let _ = writeln!(out, "Location: {}", or_default(&request.location, TBD_TEXT));
    let _ = writeln!(out, "Budget Range: {}", or_default(&request.budget, TBD_TEXT));
    let _ = writeln!(out, "Timeline: {}", or_default(&request.timeline, TBD_TEXT));
    out.push('\n');

    heading(&mut out, "PROJECT DESCRIPTION:");
    let _ = writeln!(
        out,
        "{}",
        or_default(
            &request.project_description,
            "Detailed project description to be provided"
        )
    );
    out.push('\n');

    heading(&mut out, "TECHNICAL REQUIREMENTS:");
    let disciplines = if request.disciplines.is_empty() {
        TBD_TEXT.to_string()
    } else {
        request.disciplines.join(", ")
    };
    let _ = writeln!(out, "Engineering Disciplines Required: {}", disciplines);
    out.push('\n');
    let _ = writeln!(out, "Specific Requirements:");
    if request.requirements.is_empty() {
        for (i, r) in DEFAULT_REQUIREMENTS.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, r);
        }
    } else {
        for (i, r) in request.requirements.iter().enumerate() {
            let _ = writeln!(out, "{}. {}", i + 1, r);
        }
    }
    out.push('\n');

    heading(&mut out, "INDUSTRY-SPECIFIC CONTEXT:");
    let _ = writeln!(out, "{}", industry_context(industry));
    out.push('\n');

    heading(&mut out, "EVALUATION & SUBMISSION:");
    let _ = writeln!(
        out,
        "Evaluation Criteria: {}",
        or_default(
            &request.evaluation_criteria,
            "Technical capability, experience, cost-effectiveness, timeline"
        )
    );
    let _ = writeln!(
        out,
        "Submission Guidelines: {}",
        or_default(
            &request.submission_guidelines,
            "Standard procurement submission process"
        )
    );
    let _ = writeln!(
        out,
        "Regulatory/Compliance Requirements: {}",
        or_default(
            &request.regulatory,
            "All applicable industry standards and regulations"
        )
    );
    out.push('\n');

    heading(&mut out, "CONTACT & ADDITIONAL INFORMATION:");
    let _ = writeln!(
        out,
        "Custom Clauses: {}",
        or_default(&request.custom_clauses, "Standard terms and conditions apply")
    );
    let _ = writeln!(
        out,
        "Contact Information: {}",
        or_default(
            &request.contact_info,
            "Procurement department contact details"
        )
    );
    out.push('\n');

    heading(&mut out, "GENERATION INSTRUCTIONS:");
    let _ = writeln!(
        out,
        "Please generate a complete, professional {} document that includes:\n",
        doc_type
    );
    for (i, section) in STANDARD_SECTIONS.iter().enumerate() {
        let _ = writeln!(out, "{}. {}", i + 1, section);
    }
    out.push('\n');
    let _ = writeln!(out, "Ensure the document:");
    let _ = writeln!(out, "- Follows {} sector procurement conventions", sector);
    if !industry.is_empty() {
        let _ = writeln!(
            out,
            "- Incorporates {} industry standards and terminology",
            industry
        );
    }
    let _ = writeln!(out, "- Is clear, comprehensive, and professional");
    let _ = writeln!(
        out,
        "- Includes appropriate compliance and regulatory requirements"
    );
    let _ = writeln!(out, "- Contains realistic timelines and requirements");
    out.push('\n');
    let _ = write!(
        out,
        "Format the output in clean markdown with proper headers and sections."
    );

    if !references.is_empty() {
        out.push_str("\n\n");
        heading(&mut out, "REFERENCE DOCUMENTS:");
        for (i, r) in references.iter().enumerate() {
            let _ = writeln!(out, "Reference {}: {}", i + 1, r.title);
            let _ = writeln!(out, "Industry: {}", r.industry);
            let _ = writeln!(out, "Project Type: {}", r.project_type);
            let _ = writeln!(out, "Excerpt: {}", r.snippet);
            let _ = writeln!(out, "{}", REFERENCE_DELIMITER);
        }
        let _ = write!(
            out,
            "Use the reference documents above as structural and contextual guidance. \
             Adapt their organization and terminology to the specific project described, \
             and do not copy project-specific details from them."
        );
    }

    if is_rfi(request) {
        out.push_str("\n\n");
        out.push_str(RFI_ADDENDUM);
    }

    out
}

/// Prompt asking a backend to review `document_text` for compliance gaps.
pub fn compose_compliance_review(request: &GenerationRequest, document_text: &str) -> String {
    let industry = or_default(&request.industry, "general industrial");
    let sector = or_default(&request.sector, "Government");
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} for the {} industry in the {} sector.\n",
        COMPLIANCE_REVIEW_OPENING, industry, sector
    );
    let _ = writeln!(
        out,
        "Review the following document for compliance issues and provide recommendations:\n"
    );
    heading(&mut out, "DOCUMENT:");
    let _ = writeln!(out, "{}\n", document_text);
    heading(&mut out, "COMPLIANCE REQUIREMENTS:");
    let _ = writeln!(out, "Industry: {}", industry);
    let _ = writeln!(out, "Sector: {}", sector);
    let _ = writeln!(
        out,
        "Specific Regulations: {}\n",
        or_default(&request.regulatory, "None specified")
    );
    let _ = writeln!(out, "Please analyze the document and provide:");
    for (i, item) in [
        "Compliance gaps or issues identified",
        "Missing regulatory requirements",
        "Recommendations for improvement",
        "Risk assessment",
        "Suggested additional clauses or sections",
    ]
    .iter()
    .enumerate()
    {
        let _ = writeln!(out, "{}. {}", i + 1, item);
    }
    out.push('\n');
    out.push_str("Format your response as a structured compliance report.");
    out
}

/// Prompt for a standalone scope of work. `complexity` is clamped to 1..=5.
pub fn compose_scope_of_work(request: &GenerationRequest, complexity: u8) -> String {
    let industry = or_default(&request.industry, "industrial");
    let project_type = or_default(&request.project_type, "engineering");
    let complexity = complexity.clamp(1, 5);
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} for a {} {} project.\n",
        SCOPE_OF_WORK_OPENING, industry, project_type
    );
    heading(&mut out, "TECHNICAL PARAMETERS:");
    let _ = writeln!(out, "Industry: {}", industry);
    let _ = writeln!(out, "Project Type: {}", project_type);
    let _ = writeln!(
        out,
        "Engineering Disciplines: {}",
        if request.disciplines.is_empty() {
            TBD_TEXT.to_string()
        } else {
            request.disciplines.join(", ")
        }
    );
    let _ = writeln!(
        out,
        "Complexity Level: {}/5 (1=basic, 5=highly complex)",
        complexity
    );
    let _ = writeln!(
        out,
        "Applicable Regulations: {}\n",
        or_default(&request.regulatory, "None specified")
    );
    heading(&mut out, "SCOPE OF WORK REQUIREMENTS:");
    let _ = writeln!(out, "For each engineering discipline, provide:");
    for (i, item) in [
        "Specific technical tasks and deliverables",
        "Design standards and specifications",
        "Quality assurance requirements",
        "Documentation and reporting requirements",
        "Interface coordination requirements",
    ]
    .iter()
    .enumerate()
    {
        let _ = writeln!(out, "{}. {}", i + 1, item);
    }
    out.push('\n');
    out.push_str("Ensure all tasks are realistic, measurable, and industry-appropriate.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            project_name: "Glenn Reactor Upgrade".into(),
            project_description: "Replace reactor controls.".into(),
            industry: "Chemical Processing".into(),
            project_type: "Modernization".into(),
            requirements: vec!["SIL 2 interlocks".into(), "Hazop review".into()],
            ..GenerationRequest::default()
        }
    }

    fn reference(title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            id: "id".into(),
            title: title.into(),
            industry: "Chemical Processing".into(),
            project_type: "Modernization".into(),
            disciplines: vec![],
            regulations: vec![],
            location: "Unknown".into(),
            budget: "TBD".into(),
            timeline: "TBD".into(),
            document_type: "RFP".into(),
            file_name: format!("{}.pdf", title),
            relevance_score: 0.9,
            snippet: snippet.into(),
        }
    }

    #[test]
    fn compose_is_deterministic() {
        let refs = vec![reference("A", "alpha")];
        assert_eq!(compose(&request(), &refs), compose(&request(), &refs));
    }

    #[test]
    fn sections_appear_in_order() {
        let p = compose(&request(), &[reference("A", "alpha")]);
        let order = [
            "You are an expert",
            "PROJECT INFORMATION:",
            "PROJECT DESCRIPTION:",
            "TECHNICAL REQUIREMENTS:",
            "INDUSTRY-SPECIFIC CONTEXT:",
            "EVALUATION & SUBMISSION:",
            "GENERATION INSTRUCTIONS:",
            "REFERENCE DOCUMENTS:",
        ];
        let positions: Vec<usize> = order.iter().map(|s| p.find(s).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{:?}", positions);
    }

    #[test]
    fn requirements_are_numbered_from_one() {
        let p = compose(&request(), &[]);
        assert!(p.contains("1. SIL 2 interlocks\n2. Hazop review"));
    }

    #[test]
    fn defaults_fill_empty_fields() {
        let p = compose(&GenerationRequest::default(), &[]);
        assert!(p.contains("Project Name: Industrial Project"));
        assert!(p.contains("Budget Range: To be determined"));
        assert!(p.contains("1. Detailed technical specifications to be defined"));
        assert!(p.contains("General industrial project requirements apply."));
    }

    #[test]
    fn no_reference_block_without_references() {
        let p = compose(&request(), &[]);
        assert!(!p.contains("REFERENCE DOCUMENTS:"));
    }

    #[test]
    fn references_keep_supplied_order_and_are_not_truncated() {
        let long = "z".repeat(5000);
        let p = compose(&request(), &[reference("Second", "b"), reference("First", &long)]);
        assert!(p.find("Reference 1: Second").unwrap() < p.find("Reference 2: First").unwrap());
        assert!(p.contains(&long));
    }

    #[test]
    fn industry_context_uses_template() {
        let p = compose(&request(), &[]);
        assert!(p.contains("Applicable Regulations: EPA Requirements, NFPA Codes, ISO 14001"));
    }

    #[test]
    fn rfi_addendum_comes_last() {
        let req = GenerationRequest {
            document_type: "RFI".into(),
            ..request()
        };
        let p = compose(&req, &[reference("A", "alpha")]);
        assert!(p.ends_with(RFI_ADDENDUM));
        assert!(p.find("REFERENCE DOCUMENTS:").unwrap() < p.find("RFI-SPECIFIC").unwrap());
        assert!(!compose(&request(), &[]).contains("RFI-SPECIFIC"));
    }

    #[test]
    fn supplementary_prompts() {
        let review = compose_compliance_review(&request(), "Introduction\nScope of Work");
        assert!(review.contains("compliance expert for the Chemical Processing industry"));
        assert!(review.contains("Scope of Work"));

        let sow = compose_scope_of_work(&request(), 9);
        assert!(sow.contains("Complexity Level: 5/5"));
        assert!(sow.contains("Chemical Processing Modernization project"));
    }
}
