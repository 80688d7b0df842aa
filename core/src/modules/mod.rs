//! Built-in probes against a hosted Postgres-backed BaaS project.
//!
//! Each probe sends at most one request, hands the response to a pure
//! classifier and attaches the redacted request/response to the result.

pub mod api;
pub mod auth;
pub mod rls;
pub mod storage;
pub mod vibecoder;

use std::sync::Arc;

use serde_json::Value;

use crate::attack::{AttackContext, AttackResult, AttackVector, CancelSignal, ErrorKind};
use crate::core::playbook::AttackPlaybook;
use crate::fixes::{FixRecommendation, StaticFixes};
use crate::http::{ProbeRequest, ProbeResponse};

/// Outcome of classifying one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Breached { summary: String, evidence: Value },
    Secure(String),
}

impl Verdict {
    pub fn into_result(self, attack_id: &str) -> AttackResult {
        match self {
            Verdict::Breached { summary, evidence } => {
                AttackResult::breached(attack_id, summary).with_evidence(evidence)
            }
            Verdict::Secure(summary) => AttackResult::secure(attack_id, summary),
        }
    }

    pub fn is_breach(&self) -> bool {
        matches!(self, Verdict::Breached { .. })
    }
}

/// Sends `req`, giving up as soon as `cancel` fires.
///
/// The `Err` side is already a finished result: cancelled once the request is
/// in flight, timeout when the client gives up, a probe failure otherwise.
pub(crate) async fn send_or_cancel(
    ctx: &AttackContext,
    cancel: &CancelSignal,
    attack_id: &str,
    req: &ProbeRequest,
) -> Result<ProbeResponse, AttackResult> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            Err(AttackResult::error(attack_id, ErrorKind::Cancelled, "Cancelled while the request was in flight")
                .with_request(req.describe()))
        }
        res = ctx.client().send(req) => res.map_err(|e| {
            log::debug!("{} transport failure: {:#}", attack_id, e);
            AttackResult::error(attack_id, transport_error_kind(&e), format!("{:#}", e))
                .with_request(req.describe())
        }),
    }
}

fn transport_error_kind(err: &anyhow::Error) -> ErrorKind {
    match err.downcast_ref::<reqwest::Error>() {
        Some(e) if e.is_timeout() => ErrorKind::Timeout,
        _ => ErrorKind::ProbeFailure,
    }
}

/// Runs the usual one-request probe shape: send, classify, record.
pub(crate) async fn probe_once<F>(
    ctx: &AttackContext,
    cancel: &CancelSignal,
    attack_id: &str,
    req: ProbeRequest,
    classify: F,
) -> AttackResult
where
    F: FnOnce(&ProbeResponse) -> Result<Verdict, String>,
{
    let resp = match send_or_cancel(ctx, cancel, attack_id, &req).await {
        Ok(resp) => resp,
        Err(result) => return result,
    };
    let result = match classify(&resp) {
        Ok(verdict) => verdict.into_result(attack_id),
        Err(msg) => AttackResult::error(attack_id, ErrorKind::ProbeFailure, msg),
    };
    result
        .with_request(req.describe())
        .with_response(resp.describe())
}

pub fn builtin_vectors() -> Vec<Arc<dyn AttackVector>> {
    vec![
        Arc::new(vibecoder::ServiceKeyAsAnon::new()),
        Arc::new(api::OpenApiSchemaExposed::new()),
        Arc::new(storage::AnonBucketListing::new()),
        Arc::new(auth::OpenSignup::new()),
        Arc::new(rls::AnonTableRead::new()),
    ]
}

pub fn default_playbook() -> AttackPlaybook {
    AttackPlaybook::new("baseline")
        .describe("Anonymous-key exposure checks for a hosted project")
        .with_vectors(builtin_vectors())
}

fn fix(summary: &str, steps: &[&str], code: Option<&str>) -> FixRecommendation {
    FixRecommendation {
        summary: summary.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        code: code.map(str::to_string),
    }
}

/// Remediation entries for every built-in probe.
pub fn builtin_fixes() -> StaticFixes {
    let mut fixes = StaticFixes::new();
    fixes.insert(
        vibecoder::ID,
        fix(
            "Replace the public key with the anon key and rotate the service role key",
            &[
                "Rotate the service role key in the project API settings",
                "Ship only the anon or publishable key to clients",
                "Keep the service role key in server-side secrets",
            ],
            None,
        ),
    );
    fixes.insert(
        api::ID,
        fix(
            "Stop exposing the REST schema to anonymous callers",
            &[
                "Revoke usage on exposed schemas from the anon role",
                "Move internal tables out of the exposed schema",
            ],
            Some("revoke usage on schema public from anon;"),
        ),
    );
    fixes.insert(
        storage::ID,
        fix(
            "Restrict bucket listing to authenticated users",
            &[
                "Drop select policies on storage.buckets that allow anon",
                "Mark buckets private unless they serve public assets",
            ],
            Some(
                "create policy \"authenticated can list buckets\" on storage.buckets\n  for select to authenticated using (true);",
            ),
        ),
    );
    fixes.insert(
        auth::ID,
        fix(
            "Require email confirmation or disable open signup",
            &[
                "Enable email confirmations in the auth provider settings",
                "Disable signups if accounts are provisioned by an admin",
            ],
            None,
        ),
    );
    fixes.insert(
        rls::ID,
        fix(
            "Enable row level security and add an explicit select policy",
            &[
                "Enable RLS on every table in an exposed schema",
                "Grant select only to the rows a caller owns",
            ],
            Some(
                "alter table <table> enable row level security;\ncreate policy \"owners read own rows\" on <table>\n  for select using (auth.uid() = user_id);",
            ),
        ),
    );
    fixes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixes::FixKnowledgeBase;
    use std::collections::HashSet;

    #[test]
    fn test_builtin_ids_unique_and_fixed() {
        let fixes = builtin_fixes();
        let mut seen = HashSet::new();
        for vector in builtin_vectors() {
            assert!(seen.insert(vector.id().to_string()), "duplicate {}", vector.id());
            assert!(fixes.lookup(vector.id()).is_some(), "no fix for {}", vector.id());
            assert!(vector.category().is_known());
        }
        assert_eq!(fixes.len(), seen.len());
    }

    #[test]
    fn test_default_playbook_selects_everything() {
        let playbook = default_playbook();
        assert_eq!(playbook.select().len(), builtin_vectors().len());
        assert_eq!(playbook.name(), "baseline");
    }

    mod wire {
        use super::super::*;
        use crate::attack::{AttackStatus, TargetConfig};
        use crate::http::{HttpOptions, KeyRole, MAX_BODY_BYTES};
        use std::time::{Duration, Instant};
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::sync::mpsc;

        async fn read_head(sock: &mut TcpStream) -> String {
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match sock.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            String::from_utf8_lossy(&head).to_lowercase()
        }

        /// Answers every connection with the same response and forwards each
        /// request head, lowercased.
        async fn serve(status: &'static str, body: String) -> (String, mpsc::UnboundedReceiver<String>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (tx, rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Ok((mut sock, _)) = listener.accept().await {
                    let tx = tx.clone();
                    let body = body.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(read_head(&mut sock).await);
                        let reply = format!(
                            "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                            status,
                            body.len()
                        );
                        let _ = sock.write_all(reply.as_bytes()).await;
                        let _ = sock.write_all(body.as_bytes()).await;
                        let _ = sock.shutdown().await;
                    });
                }
            });
            (format!("http://{}", addr), rx)
        }

        /// Accepts connections and never answers.
        async fn silent() -> String {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((sock, _)) = listener.accept().await {
                    held.push(sock);
                }
            });
            format!("http://{}", addr)
        }

        fn context(url: &str, service_key: Option<&str>, options: &HttpOptions) -> AttackContext {
            let target = TargetConfig {
                url: url.to_string(),
                anon_key: "anon-key-123".to_string(),
                service_key: service_key.map(str::to_string),
            };
            AttackContext::with_http_options(target, options).unwrap()
        }

        fn status_only(resp: &ProbeResponse) -> Result<Verdict, String> {
            Ok(Verdict::Secure(format!("status {}", resp.status)))
        }

        #[tokio::test]
        async fn test_send_attaches_key_headers() {
            let (url, mut heads) = serve("200 OK", "[]".to_string()).await;
            let ctx = context(&url, None, &HttpOptions::default());

            let resp = ctx
                .client()
                .send(&ProbeRequest::get("/storage/v1/bucket", KeyRole::Anon))
                .await
                .unwrap();
            assert_eq!(resp.status, 200);
            assert_eq!(resp.body, "[]");

            let head = heads.recv().await.unwrap();
            assert!(head.starts_with("get /storage/v1/bucket "), "{}", head);
            assert!(head.contains("apikey: anon-key-123"));
            assert!(head.contains("authorization: bearer anon-key-123"));
            assert!(head.contains("user-agent: breachkit/"));
        }

        #[tokio::test]
        async fn test_service_and_keyless_requests() {
            let (url, mut heads) = serve("200 OK", "{}".to_string()).await;

            let ctx = context(&url, None, &HttpOptions::default());
            let err = ctx
                .client()
                .send(&ProbeRequest::get("/rest/v1/", KeyRole::Service))
                .await
                .unwrap_err();
            assert!(err.to_string().contains("no Service key"), "{}", err);

            let ctx = context(&url, Some("svc-key"), &HttpOptions::default());
            ctx.client().send(&ProbeRequest::get("/rest/v1/", KeyRole::Service)).await.unwrap();
            let head = heads.recv().await.unwrap();
            assert!(head.contains("apikey: svc-key"));
            assert!(!head.contains("anon-key-123"));

            ctx.client().send(&ProbeRequest::get("/health", KeyRole::None)).await.unwrap();
            let head = heads.recv().await.unwrap();
            assert!(!head.contains("apikey"));
            assert!(!head.contains("authorization"));
        }

        #[tokio::test]
        async fn test_probe_once_records_request_and_response() {
            let (url, _heads) = serve("200 OK", r#"{"ok":true}"#.to_string()).await;
            let ctx = context(&url, None, &HttpOptions::default());
            let req = ProbeRequest::get("/auth/v1/settings", KeyRole::Anon);

            let result = probe_once(&ctx, &CancelSignal::new(), "wire", req, status_only).await;
            assert_eq!(result.status, AttackStatus::Secure);
            assert_eq!(result.summary, "status 200");
            assert_eq!(result.details.request.unwrap()["path"], "/auth/v1/settings");
            assert_eq!(result.details.response.unwrap()["status"], 200);
        }

        #[tokio::test]
        async fn test_cancel_mid_request_is_cancelled_error() {
            let url = silent().await;
            let ctx = context(&url, None, &HttpOptions::default());
            let cancel = CancelSignal::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let started = Instant::now();
            let result = api::OpenApiSchemaExposed::new().execute(&ctx, &cancel).await;
            assert!(started.elapsed() < Duration::from_secs(5));
            assert_eq!(result.status, AttackStatus::Error);
            assert_eq!(result.error_kind(), Some(ErrorKind::Cancelled));
            assert!(result.details.request.is_some());
        }

        #[tokio::test]
        async fn test_client_timeout_is_timeout_kind() {
            let url = silent().await;
            let options = HttpOptions { timeout_secs: 1, ..Default::default() };
            let ctx = context(&url, None, &options);
            let req = ProbeRequest::get("/rest/v1/", KeyRole::Anon);

            let result = probe_once(&ctx, &CancelSignal::new(), "slow", req, status_only).await;
            assert_eq!(result.status, AttackStatus::Error);
            assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
        }

        #[tokio::test]
        async fn test_refused_connection_is_probe_failure() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("http://{}", listener.local_addr().unwrap());
            drop(listener);
            let ctx = context(&url, None, &HttpOptions::default());
            let req = ProbeRequest::get("/rest/v1/", KeyRole::Anon);

            let result = probe_once(&ctx, &CancelSignal::new(), "down", req, status_only).await;
            assert_eq!(result.error_kind(), Some(ErrorKind::ProbeFailure));
        }

        #[tokio::test]
        async fn test_oversized_body_is_capped() {
            let (url, _heads) = serve("200 OK", "a".repeat(MAX_BODY_BYTES + 4096)).await;
            let ctx = context(&url, None, &HttpOptions::default());
            let resp = ctx
                .client()
                .send(&ProbeRequest::get("/rest/v1/", KeyRole::Anon))
                .await
                .unwrap();
            assert_eq!(resp.body.len(), MAX_BODY_BYTES);
        }
    }

    #[test]
    fn test_verdict_into_result() {
        let r = Verdict::Secure("fine".into()).into_result("x");
        assert!(!r.breached);
        let r = Verdict::Breached { summary: "bad".into(), evidence: serde_json::json!({"n": 1}) }
            .into_result("x");
        assert!(r.breached);
        assert_eq!(r.evidence.unwrap()["n"], 1);
    }
}
