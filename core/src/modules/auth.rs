use async_trait::async_trait;
use serde_json::{json, Value};

use crate::attack::{AttackCategory, AttackContext, AttackResult, AttackVector, CancelSignal, Severity};
use crate::http::{KeyRole, ProbeRequest, ProbeResponse};
use crate::modules::{probe_once, Verdict};

pub const ID: &str = "auth-open-signup";

pub struct OpenSignup {
    tags: Vec<String>,
}

impl OpenSignup {
    pub fn new() -> Self {
        Self {
            tags: vec!["anon".to_string(), "recon".to_string()],
        }
    }
}

impl Default for OpenSignup {
    fn default() -> Self {
        Self::new()
    }
}

fn flag(settings: &Value, key: &str) -> Option<bool> {
    settings.get(key).and_then(Value::as_bool)
}

pub fn classify_auth_settings(resp: &ProbeResponse) -> Result<Verdict, String> {
    if !resp.is_success() {
        return Err(format!("auth settings endpoint returned {}", resp.status));
    }
    let settings = resp
        .json()
        .ok_or_else(|| "auth settings response is not JSON".to_string())?;

    if flag(&settings, "disable_signup").unwrap_or(false) {
        return Ok(Verdict::Secure("Signups are disabled".to_string()));
    }
    if !flag(&settings, "mailer_autoconfirm").unwrap_or(false) {
        return Ok(Verdict::Secure(
            "Signups are open but require email confirmation".to_string(),
        ));
    }
    Ok(Verdict::Breached {
        summary: "Anyone can register and is confirmed without verifying an email".to_string(),
        evidence: json!({
            "disable_signup": false,
            "mailer_autoconfirm": true,
            "phone_autoconfirm": flag(&settings, "phone_autoconfirm"),
        }),
    })
}

#[async_trait]
impl AttackVector for OpenSignup {
    fn id(&self) -> &str {
        ID
    }

    fn name(&self) -> &str {
        "Open signup without confirmation"
    }

    fn description(&self) -> &str {
        "The auth service accepts new accounts and confirms them immediately, so any visitor becomes an authenticated user."
    }

    fn category(&self) -> AttackCategory {
        AttackCategory::Auth
    }

    fn severity(&self) -> Severity {
        Severity::Medium
    }

    fn tags(&self) -> &[String] {
        &self.tags
    }

    async fn execute(&self, ctx: &AttackContext, cancel: &CancelSignal) -> AttackResult {
        let req = ProbeRequest::get("/auth/v1/settings", KeyRole::Anon);
        probe_once(ctx, cancel, ID, req, classify_auth_settings).await
    }
}
