//! Text generation backends.
//!
//! A [`GenerationBackend`] turns a composed prompt into document text.
//! Backends are expected to be well behaved: when the remote service is
//! misconfigured or unreachable they return a deterministic document from
//! [`TemplateBackend`] instead of failing, so the orchestrator always
//! receives text.
//!
//! | Provider | Backend | Key |
//! |----------|---------|-----|
//! | `disabled` | [`TemplateBackend`] | none |
//! | `gemini` | [`GeminiBackend`] | `GEMINI_API_KEY` |
//! | `openai` | [`OpenAiBackend`] | `OPENAI_API_KEY` |
//!
//! # Retry Strategy
//!
//! Remote backends retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - Network errors → retry
//! - Other 4xx → no retry
//!
//! After the last attempt the failure is logged and the template document
//! is returned. API keys travel in request headers and transport errors are
//! stripped of their URL before they reach a log line.

use anyhow::{bail, Result};
use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::{json, Value};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::{compliance, prompt};

const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate_text(&self, prompt: &str) -> Result<String>;
}

/// Build the backend selected by `config`.
///
/// A disabled provider or a missing API key yields the template backend.
pub fn create_backend(config: &GenerationConfig) -> Result<Arc<dyn GenerationBackend>> {
    if !config.is_enabled() {
        return Ok(Arc::new(TemplateBackend));
    }
    if !matches!(config.provider.as_str(), "gemini" | "openai") {
        bail!("Unknown generation provider: '{}'", config.provider);
    }
    let Some(key) = config.api_key.clone().filter(|k| !k.trim().is_empty()) else {
        tracing::warn!(
            "{} generation selected but no API key set, using template output",
            config.provider
        );
        return Ok(Arc::new(TemplateBackend));
    };
    match config.provider.as_str() {
        "gemini" => Ok(Arc::new(GeminiBackend::new(config, key)?)),
        _ => Ok(Arc::new(OpenAiBackend::new(config, key)?)),
    }
}

// ============ Template ============

/// Deterministic offline backend.
///
/// Recovers project fields from the prompt by line prefix and renders a
/// complete markdown document with the standard sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateBackend;

#[derive(Debug, Default, PartialEq)]
struct PromptFields {
    project_name: Option<String>,
    industry: Option<String>,
    project_type: Option<String>,
    location: Option<String>,
    budget: Option<String>,
    timeline: Option<String>,
    description: Option<String>,
    is_rfi: bool,
}

fn recover_fields(prompt: &str) -> PromptFields {
    let mut fields = PromptFields {
        is_rfi: prompt.contains("RFI-SPECIFIC INSTRUCTIONS"),
        ..PromptFields::default()
    };
    let mut lines = prompt.lines().peekable();

    while let Some(line) = lines.next() {
        let line = line.trim();
        let value = |prefix: &str| {
            line.strip_prefix(prefix)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        // First occurrence wins; reference blocks repeat some prefixes.
        if fields.project_name.is_none() {
            fields.project_name = value("Project Name:");
        }
        if fields.industry.is_none() {
            fields.industry = value("Industry:");
        }
        if fields.project_type.is_none() {
            fields.project_type = value("Project Type:");
        }
        if fields.location.is_none() {
            fields.location = value("Location:");
        }
        if fields.budget.is_none() {
            fields.budget = value("Budget Range:");
        }
        if fields.timeline.is_none() {
            fields.timeline = value("Timeline:");
        }

        if line == "PROJECT DESCRIPTION:" && fields.description.is_none() {
            if lines.peek().is_some_and(|l| l.trim().starts_with('=')) {
                lines.next();
            }
            let mut block = Vec::new();
            while let Some(l) = lines.peek() {
                if l.trim().is_empty() {
                    break;
                }
                block.push(l.trim().to_string());
                lines.next();
            }
            if !block.is_empty() {
                fields.description = Some(block.join("\n"));
            }
        }
    }
    fields
}

impl TemplateBackend {
    /// Render the document the prompt asks for: a compliance review, a
    /// scope of work, or (by default) a full solicitation.
    pub fn render(prompt: &str) -> String {
        let opening = prompt.trim_start();
        if opening.starts_with(prompt::COMPLIANCE_REVIEW_OPENING) {
            render_compliance_review(prompt)
        } else if opening.starts_with(prompt::SCOPE_OF_WORK_OPENING) {
            render_scope_of_work(prompt)
        } else {
            render_solicitation(prompt)
        }
    }
}

/// Value of the first `prefix` line in `text`.
fn line_value(text: &str, prefix: &str) -> Option<String> {
    text.lines()
        .filter_map(|l| l.trim().strip_prefix(prefix))
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

/// Text between the `start` heading (and its underline) and the last
/// `end` heading.
fn block_between<'a>(text: &'a str, start: &str, end: &str) -> &'a str {
    let Some(begin) = text.find(start) else {
        return "";
    };
    let rest = &text[begin + start.len()..];
    let rest = rest.trim_start_matches(['\n', '=']);
    match rest.rfind(end) {
        Some(stop) => rest[..stop].trim(),
        None => rest.trim(),
    }
}

fn render_compliance_review(prompt: &str) -> String {
    const REQUIREMENTS: &str = "COMPLIANCE REQUIREMENTS:";
    let document = block_between(prompt, "DOCUMENT:", REQUIREMENTS);
    let tail = prompt.rfind(REQUIREMENTS).map_or("", |i| &prompt[i..]);
    let industry = line_value(tail, "Industry:").unwrap_or_else(|| "general industrial".into());
    let sector = line_value(tail, "Sector:").unwrap_or_else(|| "Government".into());
    let regulations =
        line_value(tail, "Specific Regulations:").unwrap_or_else(|| "None specified".into());
    let report = compliance::validate(document);
    let missing = &report.missing_sections;

    let mut out = String::new();
    let _ = writeln!(out, "# Compliance Review\n");
    let _ = writeln!(out, "- **Industry:** {}", industry);
    let _ = writeln!(out, "- **Sector:** {}", sector);
    let _ = writeln!(out, "- **Specific Regulations:** {}\n", regulations);

    let _ = writeln!(out, "## 1. Compliance Gaps\n");
    if missing.is_empty() {
        let _ = writeln!(out, "All required solicitation sections are present.\n");
    } else {
        for section in missing {
            let _ = writeln!(out, "- Missing section: {}", section);
        }
        out.push('\n');
    }

    let _ = writeln!(out, "## 2. Missing Regulatory Requirements\n");
    if regulations == "None specified" {
        let _ = writeln!(
            out,
            "No specific regulations were named. Confirm the applicable {} codes and \
             standards are cited.\n",
            industry
        );
    } else {
        let _ = writeln!(
            out,
            "Confirm the document cites each of: {}.\n",
            regulations
        );
    }

    let _ = writeln!(out, "## 3. Recommendations\n");
    for section in missing {
        let _ = writeln!(out, "- Add a {} section.", section);
    }
    let _ = writeln!(
        out,
        "- State {} sector procurement rules that govern the award.\n",
        sector
    );

    let risk = match missing.len() {
        0 => "Low",
        1 | 2 => "Medium",
        _ => "High",
    };
    let _ = writeln!(out, "## 4. Risk Assessment\n");
    let _ = writeln!(out, "Risk level: {}\n", risk);

    let _ = writeln!(out, "## 5. Suggested Additional Clauses\n");
    let _ = writeln!(out, "- Regulatory compliance certification");
    let _ = writeln!(out, "- Insurance and indemnification");
    let _ = write!(out, "- Safety program requirements");
    out
}

fn render_scope_of_work(prompt: &str) -> String {
    let tbd = "To be determined";
    let industry = line_value(prompt, "Industry:").unwrap_or_else(|| "industrial".into());
    let project_type = line_value(prompt, "Project Type:").unwrap_or_else(|| "engineering".into());
    let complexity = line_value(prompt, "Complexity Level:")
        .and_then(|v| v.split('/').next().map(str::to_string))
        .unwrap_or_else(|| "3".into());
    let regulations =
        line_value(prompt, "Applicable Regulations:").unwrap_or_else(|| "None specified".into());
    let disciplines: Vec<String> = match line_value(prompt, "Engineering Disciplines:") {
        Some(list) if list != tbd => list.split(',').map(|d| d.trim().to_string()).collect(),
        _ => vec!["General Engineering".to_string()],
    };

    let mut out = String::new();
    let _ = writeln!(out, "# Scope of Work: {} {}\n", industry, project_type);
    let _ = writeln!(out, "- **Complexity Level:** {}/5", complexity);
    let _ = writeln!(out, "- **Applicable Regulations:** {}", regulations);

    for (i, discipline) in disciplines.iter().enumerate() {
        let _ = writeln!(out, "\n## {}. {}\n", i + 1, discipline);
        let _ = writeln!(
            out,
            "- **Tasks and Deliverables:** {} design packages for the {} scope.",
            discipline, project_type
        );
        let _ = writeln!(
            out,
            "- **Design Standards:** Applicable {} codes and standards.",
            industry
        );
        let _ = writeln!(
            out,
            "- **Quality Assurance:** Independent review of each deliverable."
        );
        let _ = writeln!(
            out,
            "- **Documentation and Reporting:** Monthly progress reports."
        );
        let _ = write!(
            out,
            "- **Interface Coordination:** Coordinate interfaces with the other disciplines."
        );
    }
    out
}

fn render_solicitation(prompt: &str) -> String {
    let f = recover_fields(prompt);
    let tbd = "To be determined";
    let name = f.project_name.as_deref().unwrap_or("Industrial Project");
    let industry = f.industry.as_deref().unwrap_or(tbd);
    let project_type = f.project_type.as_deref().unwrap_or(tbd);
    let location = f.location.as_deref().unwrap_or(tbd);
    let budget = f.budget.as_deref().unwrap_or(tbd);
    let timeline = f.timeline.as_deref().unwrap_or(tbd);
    let description = f
        .description
        .as_deref()
        .unwrap_or("Detailed project description to be provided.");
    let kind = if f.is_rfi {
        "Request for Information"
    } else {
        "Request for Proposal"
    };

    let mut out = String::new();
    let _ = writeln!(out, "# {}: {}\n", kind, name);
    let _ = writeln!(out, "## PROJECT OVERVIEW\n");
    let _ = writeln!(out, "- **Industry:** {}", industry);
    let _ = writeln!(out, "- **Project Type:** {}", project_type);
    let _ = writeln!(out, "- **Location:** {}", location);
    let _ = writeln!(out, "- **Budget Range:** {}", budget);
    let _ = writeln!(out, "- **Timeline:** {}\n", timeline);

    let _ = writeln!(out, "## 1. Introduction\n");
    let _ = writeln!(
        out,
        "The issuing agency invites qualified firms to respond to this {} for the \
         {} project, a {} effort in the {} industry.\n",
        kind, name, project_type, industry
    );
    let _ = writeln!(out, "{}\n", description);

    let _ = writeln!(out, "## 2. Scope of Work\n");
    let _ = writeln!(
        out,
        "The selected firm shall provide engineering, procurement support, and \
         construction oversight for the {} at {}. Work includes detailed design, \
         technical specifications, deliverables and milestones, and commissioning \
         support.\n",
        project_type, location
    );

    let _ = writeln!(out, "## 3. Eligibility Criteria\n");
    let _ = writeln!(
        out,
        "Respondents must demonstrate relevant {} experience, hold applicable \
         licenses and insurance, and comply with all governing regulations.\n",
        industry
    );

    let _ = writeln!(out, "## 4. Evaluation Criteria\n");
    let _ = writeln!(
        out,
        "Responses will be evaluated on technical capability, relevant experience, \
         cost-effectiveness, and the ability to meet the {} timeline.\n",
        timeline
    );

    let _ = writeln!(out, "## 5. Submission Guidelines\n");
    let _ = writeln!(
        out,
        "Submit responses electronically by the published deadline. Late \
         submissions will not be considered.\n"
    );

    let _ = writeln!(out, "## 6. Terms and Conditions\n");
    let _ = writeln!(out, "Standard terms and conditions apply.\n");

    let _ = writeln!(out, "## 7. Contact Information\n");
    let _ = write!(
        out,
        "Direct all questions to the procurement department listed in the \
         solicitation notice."
    );
    out
}

#[async_trait]
impl GenerationBackend for TemplateBackend {
    fn name(&self) -> &str {
        "template"
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        Ok(Self::render(prompt))
    }
}

// ============ Remote backends ============

/// Send a JSON POST with retry/backoff and return the parsed body.
async fn post_with_retry<F>(label: &str, max_retries: u32, build: F) -> Result<Value>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| anyhow::Error::from(e.without_url()));
                }

                let body_text = response.text().await.unwrap_or_default();
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(anyhow::anyhow!("{} API error {}: {}", label, status, body_text));
                    continue;
                }
                bail!("{} API error {}: {}", label, status, body_text);
            }
            Err(e) => {
                // Request URLs can carry credentials; keep them out of logs.
                last_err = Some(e.without_url().into());
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("{} request failed after retries", label)))
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// Google Generative Language `generateContent`.
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    max_retries: u32,
}

impl GeminiBackend {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            api_key,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "maxOutputTokens": self.max_output_tokens },
        });
        let json = post_with_retry("Gemini", self.max_retries, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;
        parse_gemini_response(&json)
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        match self.call(prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!("Gemini generation failed, using template output: {:#}", e);
                Ok(TemplateBackend::render(prompt))
            }
        }
    }
}

/// Extract concatenated candidate text from a `generateContent` response.
pub fn parse_gemini_response(json: &Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid Gemini response: missing candidates"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        bail!("Gemini response contained no text");
    }
    Ok(text)
}

/// OpenAI-compatible `/v1/chat/completions`.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    max_output_tokens: u32,
    max_retries: u32,
}

impl OpenAiBackend {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
            api_key,
            max_output_tokens: config.max_output_tokens,
            max_retries: config.max_retries,
        })
    }

    async fn call(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.max_output_tokens,
        });
        let json = post_with_retry("OpenAI", self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate_text(&self, prompt: &str) -> Result<String> {
        match self.call(prompt).await {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::warn!("OpenAI generation failed, using template output: {:#}", e);
                Ok(TemplateBackend::render(prompt))
            }
        }
    }
}

pub fn parse_openai_response(json: &Value) -> Result<String> {
    match json
        .pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
    {
        Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
        Some(_) => bail!("OpenAI response contained no text"),
        None => bail!("Invalid OpenAI response: missing choices"),
    }
}
