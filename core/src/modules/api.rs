use async_trait::async_trait;
use serde_json::json;

use crate::attack::{AttackCategory, AttackContext, AttackResult, AttackVector, CancelSignal, Severity};
use crate::http::{KeyRole, ProbeRequest, ProbeResponse};
use crate::modules::{probe_once, Verdict};

pub const ID: &str = "api-openapi-schema-exposed";

const SAMPLE_PATHS: usize = 10;

pub struct OpenApiSchemaExposed {
    tags: Vec<String>,
}

impl OpenApiSchemaExposed {
    pub fn new() -> Self {
        Self {
            tags: vec!["anon".to_string(), "recon".to_string()],
        }
    }
}

impl Default for OpenApiSchemaExposed {
    fn default() -> Self {
        Self::new()
    }
}

pub fn classify_schema_response(resp: &ProbeResponse) -> Result<Verdict, String> {
    match resp.status {
        401 | 403 | 404 => {
            return Ok(Verdict::Secure(format!(
                "Schema endpoint refused anonymous access ({})",
                resp.status
            )))
        }
        s if s >= 500 => return Err(format!("schema endpoint returned {}", s)),
        _ if !resp.is_success() => {
            return Ok(Verdict::Secure(format!("Schema endpoint returned {}", resp.status)))
        }
        _ => {}
    }

    let doc = match resp.json() {
        Some(doc) => doc,
        None => return Ok(Verdict::Secure("Schema endpoint did not return JSON".to_string())),
    };
    let paths: Vec<String> = doc
        .get("paths")
        .and_then(|p| p.as_object())
        .map(|p| p.keys().filter(|k| k.as_str() != "/").cloned().collect())
        .unwrap_or_default();

    if paths.is_empty() {
        return Ok(Verdict::Secure("OpenAPI document lists no tables".to_string()));
    }
    Ok(Verdict::Breached {
        summary: format!("OpenAPI schema exposes {} paths to the anon key", paths.len()),
        evidence: json!({
            "path_count": paths.len(),
            "sample": paths.iter().take(SAMPLE_PATHS).collect::<Vec<_>>(),
        }),
    })
}

#[async_trait]
impl AttackVector for OpenApiSchemaExposed {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "OpenAPI schema exposed"
    }

    fn description(&self) -> &str {
        "The REST root returns the generated OpenAPI document to anonymous callers, listing every exposed table, view and function."
    }

    fn category(&self) -> AttackCategory {
        AttackCategory::Api
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult {
        let req = ProbeRequest::get("/rest/v1/", KeyRole::Anon);
        probe_once(ctx, cancel, ID, req, classify_schema_response).await
    }
}
