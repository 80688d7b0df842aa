use async_trait::async_trait;
use serde_json::{json, Value};

use crate::attack::{
    AttackCategory, AttackContext, AttackResult, AttackVector, CancelSignal, ErrorKind, Severity,
};
use crate::http::{KeyRole, ProbeRequest, ProbeResponse};
use crate::modules::{probe_once, Verdict};

pub const ID: &str = "rls-anon-table-read";

/// Reads one row of the hinted table with the anon key.
pub struct AnonTableRead {
    tags: Vec<String>,
}

impl AnonTableRead {
    pub fn new() -> Self {
        Self {
            tags: vec!["anon".to_string(), "needs-resource".to_string()],
        }
    }
}

impl Default for AnonTableRead {
    fn default() -> Self {
        Self::new()
    }
}

/// Table names go into the URL path unescaped, so only plain identifiers
/// (optionally schema-qualified) are accepted.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 63 * 2 + 1
        && !name.starts_with('.')
        && !name.contains("..")
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
}

pub fn classify_table_read(table: &str, resp: &ProbeResponse) -> Result<Verdict, String> {
    match resp.status {
        401 | 403 => {
            return Ok(Verdict::Secure(format!("Anon read of '{}' refused", table)));
        }
        404 => {
            return Ok(Verdict::Secure(format!("Table '{}' is not exposed", table)));
        }
        s if !resp.is_success() => {
            return Err(format!("table read returned {}", s));
        }
        _ => {}
    }
    let rows = match resp.json() {
        Some(Value::Array(rows)) => rows,
        _ => return Err("table read did not return a row array".to_string()),
    };
    let first = match rows.first() {
        Some(row) => row,
        None => return Ok(Verdict::Secure(format!("No rows of '{}' visible to the anon key", table))),
    };
    let columns: Vec<&String> = first
        .as_object()
        .map(|o| o.keys().collect())
        .unwrap_or_default();

    Ok(Verdict::Breached {
        summary: format!("Anon key can read rows from '{}'", table),
        evidence: json!({
            "table": table,
            "rows_returned": rows.len(),
            "columns": columns,
        }),
    })
}

#[async_trait]
impl AttackVector for AnonTableRead {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Anonymous table read"
    }

    fn description(&self) -> &str {
        "Row level security is missing or permissive on the target table, so the anon key can select its rows."
    }

    fn category(&self) -> AttackCategory {
        AttackCategory::Rls
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult {
        let table = match ctx.resource() {
            Some(t) => t.to_string(),
            None => return AttackResult::skipped(ID, "No target table given"),
        };
        if !is_valid_table_name(&table) {
            return AttackResult::error(
                ID,
                ErrorKind::ProbeFailure,
                format!("'{}' is not a valid table name", table),
            );
        }
        let req = ProbeRequest::get(format!("/rest/v1/{}?select=*&limit=1", table), KeyRole::Anon);
        probe_once(ctx, cancel, ID, req, |resp| classify_table_read(&table, resp)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::{AttackStatus, TargetConfig};

    fn resp(status: u16, body: &str) -> ProbeResponse {
        ProbeResponse { status, body: body.to_string() }
    }

    fn ctx() -> AttackContext {
        AttackContext::new(TargetConfig {
            url: "https://demo.example.co".into(),
            anon_key: "anon".into(),
            service_key: None,
        })
        .unwrap()
    }

    #[test]
    fn test_rows_returned_is_breach() {
        let verdict = classify_table_read("profiles", &resp(200, r#"[{"id":1,"email":"a@b.c"}]"#)).unwrap();
        match verdict {
            Verdict::Breached { evidence, .. } => {
                assert_eq!(evidence["table"], "profiles");
                assert_eq!(evidence["columns"], json!(["email", "id"]));
            }
            other => panic!("expected breach, got {:?}", other),
        }
    }

    #[test]
    fn test_no_rows_or_refused_is_secure() {
        assert!(!classify_table_read("t", &resp(200, "[]")).unwrap().is_breach());
        assert!(!classify_table_read("t", &resp(401, "")).unwrap().is_breach());
        assert!(!classify_table_read("t", &resp(404, "")).unwrap().is_breach());
        assert!(classify_table_read("t", &resp(500, "")).is_err());
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_valid_table_name("profiles"));
        assert!(is_valid_table_name("private.orders"));
        assert!(!is_valid_table_name("x?select=secret"));
        assert!(!is_valid_table_name("../auth"));
        assert!(!is_valid_table_name(".."));
        assert!(!is_valid_table_name(""));
    }

    #[tokio::test]
    async fn test_without_hint_is_skipped() {
        let result = AnonTableRead::new().execute(&ctx(), &CancelSignal::new()).await;
        assert_eq!(result.status, AttackStatus::Skipped);
        assert!(!result.breached);
    }

    #[tokio::test]
    async fn test_bad_hint_is_probe_failure() {
        let ctx = ctx().target_resource("a/b");
        let result = AnonTableRead::new().execute(&ctx, &CancelSignal::new()).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::ProbeFailure));
    }
}
