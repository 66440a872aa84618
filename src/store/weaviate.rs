//! Weaviate [`VectorBackend`] over its REST and GraphQL APIs.
//!
//! The collection is vectorized server-side by the `text2vec-openai`
//! module; only `title`, `content`, `industry`, and `projectType` feed the
//! vector. Similarity queries use `nearText` and report Weaviate's
//! `certainty` (higher is closer) alongside `distance`.
//! Filterable properties use `field` tokenization so equality filters match
//! whole values rather than individual words.
//!
//! Query builders and response parsers are plain functions so they can be
//! unit tested without a running cluster.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::StoreConfig;
use crate::models::{DocumentRecord, DEFAULT_DOCUMENT_TYPE, TBD, UNKNOWN};

use super::{Filter, Hit, RecordField, StoredRecord, VectorBackend};

/// Properties selected on every `Get` query.
const RECORD_PROPERTIES: &str = "title content industry projectType disciplines regulations \
location budget timeline documentType fileName createdAt";

/// Exact-match filter fields; tokenized whole so `Equal` compares the full value.
const KEYWORD_FIELDS: &[&str] = &["industry", "projectType", "documentType", "fileName"];

/// Weaviate's default `QUERY_MAXIMUM_RESULTS`.
const MAX_QUERY_LIMIT: usize = 10_000;

pub struct WeaviateStore {
    client: Client,
    base_url: String,
    class: String,
    api_key: Option<String>,
    vectorizer_api_key: Option<String>,
}

impl WeaviateStore {
    /// Build a client from configuration. Fails only when no URL is set or
    /// the HTTP client cannot be constructed; reachability is checked by
    /// [`ping`](VectorBackend::ping).
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .context("no Weaviate URL configured (set WEAVIATE_URL)")?;

        let base_url = if url.starts_with("http://") || url.starts_with("https://") {
            url.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", url.trim_end_matches('/'))
        };

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url,
            class: config.collection.clone(),
            api_key: config.api_key.clone(),
            vectorizer_api_key: config.vectorizer_api_key.clone(),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(key) = &self.vectorizer_api_key {
            req = req.header("X-OpenAI-Api-Key", key);
        }
        req
    }

    async fn graphql(&self, query: String) -> Result<Value> {
        let resp = self
            .request(reqwest::Method::POST, "/v1/graphql")
            .json(&json!({ "query": query }))
            .send()
            .await
            .context("Weaviate GraphQL request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Weaviate GraphQL error ({}): {}", status, body);
        }

        let body: Value = resp.json().await?;
        if let Some(errors) = body.get("errors").and_then(|e| e.as_array()) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .filter_map(|e| e.get("message").and_then(|m| m.as_str()))
                    .collect();
                bail!("Weaviate GraphQL error: {}", messages.join("; "));
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl VectorBackend for WeaviateStore {
    fn name(&self) -> &str {
        "weaviate"
    }

    async fn ping(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, "/v1/.well-known/ready")
            .send()
            .await
            .context("Weaviate is unreachable")?;
        if !resp.status().is_success() {
            bail!("Weaviate readiness check returned {}", resp.status());
        }
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        let resp = self
            .request(reqwest::Method::GET, &format!("/v1/schema/{}", self.class))
            .send()
            .await?;
        if resp.status().is_success() {
            tracing::debug!("collection {} already exists", self.class);
            return Ok(());
        }

        tracing::info!("creating collection {}", self.class);
        let resp = self
            .request(reqwest::Method::POST, "/v1/schema")
            .json(&schema_definition(&self.class))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Weaviate schema creation failed ({}): {}", status, body);
        }
        Ok(())
    }

    async fn insert(&self, record: &DocumentRecord) -> Result<String> {
        let resp = self
            .request(reqwest::Method::POST, "/v1/objects")
            .json(&json!({
                "class": self.class,
                "properties": record_to_properties(record),
            }))
            .send()
            .await
            .context("Weaviate insert request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Weaviate insert error ({}): {}", status, body);
        }

        let body: Value = resp.json().await?;
        body.get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .context("Weaviate insert response has no id")
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        if uuid::Uuid::parse_str(id).is_err() {
            return Ok(());
        }
        let resp = self
            .request(
                reqwest::Method::DELETE,
                &format!("/v1/objects/{}/{}", self.class, id),
            )
            .send()
            .await
            .context("Weaviate delete request failed")?;

        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            s => {
                let body = resp.text().await.unwrap_or_default();
                bail!("Weaviate delete error ({}): {}", s, body)
            }
        }
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<StoredRecord>> {
        // Object ids are UUIDs; anything else cannot exist.
        if uuid::Uuid::parse_str(id).is_err() {
            return Ok(None);
        }
        let resp = self
            .request(
                reqwest::Method::GET,
                &format!("/v1/objects/{}/{}", self.class, id),
            )
            .send()
            .await
            .context("Weaviate get request failed")?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => {
                let body: Value = resp.json().await?;
                let props = body.get("properties").cloned().unwrap_or(Value::Null);
                Ok(Some(StoredRecord {
                    id: id.to_string(),
                    record: record_from_json(&props),
                }))
            }
            s => {
                let body = resp.text().await.unwrap_or_default();
                bail!("Weaviate get error ({}): {}", s, body)
            }
        }
    }

    async fn fetch_by_filter(&self, filter: &Filter, limit: usize) -> Result<Vec<StoredRecord>> {
        let body = self
            .graphql(build_get_query(&self.class, filter, None, limit))
            .await?;
        Ok(parse_get_response(&body, &self.class)?
            .into_iter()
            .map(|hit| hit.stored)
            .collect())
    }

    async fn nearest_neighbors(
        &self,
        query: &str,
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<Hit>> {
        let body = self
            .graphql(build_get_query(&self.class, filter, Some(query), limit))
            .await?;
        parse_get_response(&body, &self.class)
    }

    async fn aggregate_by_field(&self, field: RecordField) -> Result<Vec<(String, u64)>> {
        let body = self
            .graphql(build_aggregate_query(&self.class, field))
            .await?;
        parse_aggregate_response(&body, &self.class)
    }
}

/// Class definition for the document collection.
pub fn schema_definition(class: &str) -> Value {
    let text = |name: &str, vectorize: bool| {
        let tokenization = if KEYWORD_FIELDS.contains(&name) {
            "field"
        } else {
            "word"
        };
        json!({
            "name": name,
            "dataType": ["text"],
            "tokenization": tokenization,
            "moduleConfig": { "text2vec-openai": { "skip": !vectorize } },
        })
    };
    let text_array = |name: &str| {
        json!({
            "name": name,
            "dataType": ["text[]"],
            "moduleConfig": { "text2vec-openai": { "skip": true } },
        })
    };

    json!({
        "class": class,
        "description": "Procurement documents for retrieval-augmented RFP generation",
        "vectorizer": "text2vec-openai",
        "moduleConfig": {
            "text2vec-openai": { "model": "ada", "type": "text" }
        },
        "properties": [
            text("title", true),
            text("content", true),
            text("industry", true),
            text("projectType", true),
            text_array("disciplines"),
            text_array("regulations"),
            text("location", false),
            text("budget", false),
            text("timeline", false),
            text("documentType", false),
            text("fileName", false),
            { "name": "createdAt", "dataType": ["date"] },
        ],
    })
}

fn record_to_properties(record: &DocumentRecord) -> Value {
    json!({
        "title": record.title,
        "content": record.content,
        "industry": record.industry,
        "projectType": record.project_type,
        "disciplines": record.disciplines,
        "regulations": record.regulations,
        "location": record.location,
        "budget": record.budget,
        "timeline": record.timeline,
        "documentType": record.document_type,
        "fileName": record.file_name,
        "createdAt": record.created_at.to_rfc3339(),
    })
}

/// Quote a string as a GraphQL string literal.
fn quote(s: &str) -> String {
    // JSON string escaping is valid GraphQL string escaping.
    Value::String(s.to_string()).to_string()
}

/// Render a `where` argument, or `None` for an empty filter.
pub fn build_where(filter: &Filter) -> Option<String> {
    let operand = |(field, value): &(RecordField, String)| {
        format!(
            "{{path: [{}], operator: Equal, valueText: {}}}",
            quote(field.as_str()),
            quote(value)
        )
    };

    match filter.clauses() {
        [] => None,
        [single] => Some(operand(single)),
        many => Some(format!(
            "{{operator: And, operands: [{}]}}",
            many.iter().map(operand).collect::<Vec<_>>().join(", ")
        )),
    }
}

pub fn build_get_query(
    class: &str,
    filter: &Filter,
    near_text: Option<&str>,
    limit: usize,
) -> String {
    let mut args = vec![format!("limit: {}", limit.min(MAX_QUERY_LIMIT))];
    if let Some(w) = build_where(filter) {
        args.push(format!("where: {}", w));
    }
    if let Some(q) = near_text {
        args.push(format!("nearText: {{concepts: [{}]}}", quote(q)));
    }
    format!(
        "{{ Get {{ {}({}) {{ {} _additional {{ id certainty distance }} }} }} }}",
        class,
        args.join(", "),
        RECORD_PROPERTIES
    )
}

pub fn build_aggregate_query(class: &str, field: RecordField) -> String {
    format!(
        "{{ Aggregate {{ {}(groupBy: [{}]) {{ groupedBy {{ value }} meta {{ count }} }} }} }}",
        class,
        quote(field.as_str())
    )
}

fn str_or(value: &Value, key: &str, default: &str) -> String {
    match value.get(key).and_then(|v| v.as_str()) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => default.to_string(),
    }
}

fn str_list(value: &Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Decode stored properties, defaulting anything missing.
pub fn record_from_json(props: &Value) -> DocumentRecord {
    let created_at = props
        .get("createdAt")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default();

    DocumentRecord {
        title: str_or(props, "title", ""),
        content: str_or(props, "content", ""),
        industry: str_or(props, "industry", UNKNOWN),
        project_type: str_or(props, "projectType", UNKNOWN),
        disciplines: str_list(props, "disciplines"),
        regulations: str_list(props, "regulations"),
        location: str_or(props, "location", UNKNOWN),
        budget: str_or(props, "budget", TBD),
        timeline: str_or(props, "timeline", TBD),
        document_type: str_or(props, "documentType", DEFAULT_DOCUMENT_TYPE),
        file_name: str_or(props, "fileName", ""),
        created_at,
    }
}

pub fn parse_get_response(body: &Value, class: &str) -> Result<Vec<Hit>> {
    let items = body
        .pointer(&format!("/data/Get/{}", class))
        .and_then(|v| v.as_array())
        .with_context(|| format!("Weaviate response has no data.Get.{}", class))?;

    items
        .iter()
        .map(|item| {
            let additional = item.get("_additional").cloned().unwrap_or(Value::Null);
            let id = additional
                .get("id")
                .and_then(|v| v.as_str())
                .context("Weaviate result has no _additional.id")?
                .to_string();
            Ok(Hit {
                stored: StoredRecord {
                    id,
                    record: record_from_json(item),
                },
                certainty: additional.get("certainty").and_then(|v| v.as_f64()),
                distance: additional.get("distance").and_then(|v| v.as_f64()),
            })
        })
        .collect()
}

pub fn parse_aggregate_response(body: &Value, class: &str) -> Result<Vec<(String, u64)>> {
    let groups = body
        .pointer(&format!("/data/Aggregate/{}", class))
        .and_then(|v| v.as_array())
        .with_context(|| format!("Weaviate response has no data.Aggregate.{}", class))?;

    Ok(groups
        .iter()
        .filter_map(|g| {
            let value = g.pointer("/groupedBy/value")?.as_str()?.to_string();
            let count = g.pointer("/meta/count")?.as_u64()?;
            Some((value, count))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn where_clause_for_single_and_multiple_filters() {
        assert_eq!(build_where(&Filter::all()), None);

        let single = build_where(&Filter::eq(RecordField::Industry, "Oil & Gas")).unwrap();
        assert_eq!(
            single,
            r#"{path: ["industry"], operator: Equal, valueText: "Oil & Gas"}"#
        );

        let both = build_where(
            &Filter::eq(RecordField::Industry, "Manufacturing")
                .and(RecordField::ProjectType, "Modernization"),
        )
        .unwrap();
        assert!(both.starts_with("{operator: And, operands: ["));
        assert!(both.contains(r#"path: ["projectType"]"#));
    }

    #[test]
    fn values_are_escaped() {
        let w = build_where(&Filter::eq(RecordField::Title, "a \"quoted\" title")).unwrap();
        assert!(w.contains(r#"valueText: "a \"quoted\" title""#));
    }

    #[test]
    fn get_query_includes_near_text_and_additional() {
        let q = build_get_query(
            "RFPDocument",
            &Filter::eq(RecordField::Industry, "Manufacturing"),
            Some("conveyor upgrade"),
            5,
        );
        assert!(q.contains("RFPDocument(limit: 5, where:"));
        assert!(q.contains(r#"nearText: {concepts: ["conveyor upgrade"]}"#));
        assert!(q.contains("_additional { id certainty distance }"));
        assert!(q.contains("fileName"));
    }

    #[test]
    fn aggregate_query_groups_by_field() {
        let q = build_aggregate_query("RFPDocument", RecordField::Industry);
        assert!(q.contains(r#"RFPDocument(groupBy: ["industry"])"#));
        assert!(q.contains("meta { count }"));
    }

    #[test]
    fn parses_get_response() {
        let body = json!({
            "data": { "Get": { "RFPDocument": [
                {
                    "title": "Glenn Modernization",
                    "content": "Body",
                    "industry": "Chemical Processing",
                    "projectType": "Modernization",
                    "disciplines": ["Electrical"],
                    "fileName": "rfp_001_chem_glenn_modernization.pdf",
                    "createdAt": "2024-03-01T12:00:00Z",
                    "_additional": { "id": "abc", "certainty": 0.91, "distance": 0.18 }
                }
            ]}}
        });
        let hits = parse_get_response(&body, "RFPDocument").unwrap();
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert_eq!(hit.stored.id, "abc");
        assert_eq!(hit.certainty, Some(0.91));
        assert_eq!(hit.distance, Some(0.18));
        assert_eq!(hit.stored.record.location, "Unknown");
        assert_eq!(hit.stored.record.budget, "TBD");
        assert_eq!(hit.stored.record.document_type, "RFP");
        assert_eq!(hit.stored.record.disciplines, vec!["Electrical".to_string()]);
        assert_eq!(
            hit.stored.record.created_at.to_rfc3339(),
            "2024-03-01T12:00:00+00:00"
        );
    }

    #[test]
    fn graphql_shape_errors_are_reported() {
        let body = json!({ "data": { "Get": {} } });
        assert!(parse_get_response(&body, "RFPDocument").is_err());
    }

    #[test]
    fn parses_aggregate_response() {
        let body = json!({
            "data": { "Aggregate": { "RFPDocument": [
                { "groupedBy": { "value": "Manufacturing" }, "meta": { "count": 3 } },
                { "groupedBy": { "value": "Oil & Gas" }, "meta": { "count": 1 } }
            ]}}
        });
        let groups = parse_aggregate_response(&body, "RFPDocument").unwrap();
        assert_eq!(
            groups,
            vec![
                ("Manufacturing".to_string(), 3),
                ("Oil & Gas".to_string(), 1)
            ]
        );
    }

    #[test]
    fn schema_vectorizes_only_core_text_fields() {
        let schema = schema_definition("RFPDocument");
        let props = schema["properties"].as_array().unwrap();
        let vectorized: Vec<&str> = props
            .iter()
            .filter(|p| p.pointer("/moduleConfig/text2vec-openai/skip") == Some(&json!(false)))
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert_eq!(vectorized, vec!["title", "content", "industry", "projectType"]);
    }

    #[test]
    fn schema_tokenizes_filter_fields_whole() {
        let schema = schema_definition("RFPDocument");
        let tokenization = |name: &str| {
            schema["properties"]
                .as_array()
                .unwrap()
                .iter()
                .find(|p| p["name"] == name)
                .and_then(|p| p["tokenization"].as_str())
                .map(str::to_string)
        };
        for name in ["industry", "projectType", "documentType", "fileName"] {
            assert_eq!(tokenization(name).as_deref(), Some("field"), "{}", name);
        }
        assert_eq!(tokenization("content").as_deref(), Some("word"));
        assert_eq!(tokenization("createdAt"), None);
    }

    #[test]
    fn get_query_caps_limit() {
        let q = build_get_query("RFPDocument", &Filter::all(), None, usize::MAX);
        assert!(q.contains("RFPDocument(limit: 10000)"));
    }

    #[tokio::test]
    async fn non_uuid_ids_are_never_sent() {
        let config = StoreConfig {
            provider: "weaviate".into(),
            url: Some("http://127.0.0.1:9".into()),
            connect_timeout_secs: 1,
            ..StoreConfig::default()
        };
        let store = WeaviateStore::from_config(&config).unwrap();
        store.delete_by_id("../schema/RFPDocument").await.unwrap();
        assert!(store.get_by_id("rfp_001.pdf").await.unwrap().is_none());
        assert!(store
            .delete_by_id("6a1f3c5e-2b7d-4e8f-9a0b-1c2d3e4f5a6b")
            .await
            .is_err());
    }

    #[test]
    fn from_config_requires_url() {
        let config = StoreConfig {
            provider: "weaviate".into(),
            ..StoreConfig::default()
        };
        assert!(WeaviateStore::from_config(&config).is_err());

        let config = StoreConfig {
            provider: "weaviate".into(),
            url: Some("cluster.weaviate.network/".into()),
            ..StoreConfig::default()
        };
        let store = WeaviateStore::from_config(&config).unwrap();
        assert_eq!(store.base_url, "https://cluster.weaviate.network");
    }
}
