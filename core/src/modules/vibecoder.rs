use async_trait::async_trait;
use serde_json::json;

use crate::attack::{AttackCategory, AttackContext, AttackResult, AttackVector, CancelSignal, Severity};
use crate::modules::Verdict;
use crate::utils::decode_jwt_claims;

pub const ID: &str = "vibecoder-service-key-as-anon";

const SECRET_KEY_PREFIX: &str = "sb_secret_";

/// Flags a privileged key configured where the public key belongs.
/// Runs offline: it only inspects the key itself.
pub struct ServiceKeyAsAnon {
    tags: Vec<String>,
}

impl ServiceKeyAsAnon {
    pub fn new() -> Self {
        Self {
            tags: vec!["offline".to_string(), "keys".to_string()],
        }
    }
}

impl Default for ServiceKeyAsAnon {
    fn default() -> Self {
        Self::new()
    }
}

pub fn classify_public_key(key: &str) -> Verdict {
    let key = key.trim();
    if key.starts_with(SECRET_KEY_PREFIX) {
        return Verdict::Breached {
            summary: "Public key is a secret API key".to_string(),
            evidence: json!({ "key_format": "secret" }),
        };
    }
    match decode_jwt_claims(key) {
        Some(claims) => {
            let role = claims.get("role").and_then(|r| r.as_str()).unwrap_or("");
            if role == "service_role" {
                Verdict::Breached {
                    summary: "Public key carries the service_role claim and bypasses row level security".to_string(),
                    evidence: json!({
                        "role": role,
                        "ref": claims.get("ref"),
                        "iss": claims.get("iss"),
                    }),
                }
            } else {
                Verdict::Secure(format!("Public key role is '{}'", role))
            }
        }
        None => Verdict::Secure("Public key is not a JWT; no role to inspect".to_string()),
    }
}

/// Like [`classify_public_key`], but also catches a public key that is the
/// very service key configured for the scan.
pub fn classify_key_pair(public: &str, service: Option<&str>) -> Verdict {
    match service.map(str::trim) {
        Some(service) if !service.is_empty() && service == public.trim() => Verdict::Breached {
            summary: "Public key is identical to the service role key".to_string(),
            evidence: json!({ "key_format": "service_key_reused" }),
        },
        _ => classify_public_key(public),
    }
}

#[async_trait]
impl AttackVector for ServiceKeyAsAnon {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Service role key used as public key"
    }

    fn description(&self) -> &str {
        "The key handed to browsers and mobile clients decodes to the service role, giving every visitor full database access."
    }

    fn category(&self) -> AttackCategory {
        AttackCategory::Vibecoder
    }

    fn severity(&self) -> Severity {
        Severity::Critical
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, ctx: &AttackContext, _cancel: &CancelSignal) -> AttackResult {
        let target = ctx.target();
        classify_key_pair(&target.anon_key, target.service_key.as_deref()).into_result(ID)
    }
}
