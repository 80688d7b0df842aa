use async_trait::async_trait;
use serde_json::{json, Value};

use crate::attack::{AttackCategory, AttackContext, AttackResult, AttackVector, CancelSignal, Severity};
use crate::http::{KeyRole, ProbeRequest, ProbeResponse};
use crate::modules::{probe_once, Verdict};

pub const ID: &str = "storage-anon-bucket-listing";

pub struct AnonBucketListing {
    tags: Vec<String>,
}

impl AnonBucketListing {
    pub fn new() -> Self {
        Self {
            tags: vec!["anon".to_string()],
        }
    }
}

impl Default for AnonBucketListing {
    fn default() -> Self {
        Self::new()
    }
}

pub fn classify_bucket_listing(resp: &ProbeResponse) -> Result<Verdict, String> {
    if resp.status >= 500 {
        return Err(format!("storage endpoint returned {}", resp.status));
    }
    if !resp.is_success() {
        return Ok(Verdict::Secure(format!("Bucket listing refused ({})", resp.status)));
    }
    let buckets = match resp.json() {
        Some(Value::Array(items)) => items,
        _ => return Ok(Verdict::Secure("Bucket listing did not return an array".to_string())),
    };
    if buckets.is_empty() {
        return Ok(Verdict::Secure("No buckets visible to the anon key".to_string()));
    }

    let listed: Vec<Value> = buckets
        .iter()
        .map(|b| {
            json!({
                "name": b.get("name").or_else(|| b.get("id")),
                "public": b.get("public").and_then(Value::as_bool).unwrap_or(false),
            })
        })
        .collect();
    let public = listed.iter().filter(|b| b["public"] == true).count();

    Ok(Verdict::Breached {
        summary: format!(
            "Anon key lists {} storage buckets ({} public)",
            buckets.len(),
            public
        ),
        evidence: json!({ "buckets": listed }),
    })
}

#[async_trait]
impl AttackVector for AnonBucketListing {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Anonymous bucket listing"
    }

    fn description(&self) -> &str {
        "Storage bucket metadata is readable with the anon key, revealing bucket names and which of them serve files publicly."
    }

    fn category(&self) -> AttackCategory {
        AttackCategory::Storage
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult {
        let req = ProbeRequest::get("/storage/v1/bucket", KeyRole::Anon);
        probe_once(ctx, cancel, ID, req, classify_bucket_listing).await
    }
}
