use std::fmt::Write;

use crate::attack::{AttackCategory, Severity};
use crate::classify::Framework;
use crate::core::report::BreachReport;

/// Markdown pipes and newlines would break table rows.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

pub fn render(report: &BreachReport) -> String {
    let mut out = String::new();
    let s = &report.stats;

    let _ = writeln!(out, "# Breach Report: {}", report.project_name);
    let _ = writeln!(out);
    let _ = writeln!(out, "- Report: `{}`", report.id);
    let _ = writeln!(out, "- Project: `{}`", report.project_id);
    let _ = writeln!(out, "- Started: {}", report.started_at.to_rfc3339());
    let _ = writeln!(out, "- Completed: {}", report.completed_at.to_rfc3339());
    let _ = writeln!(out, "- Duration: {:.1}s", report.duration_ms as f64 / 1000.0);
    let _ = writeln!(
        out,
        "- Risk score: **{}/100** ({})",
        report.risk_score,
        report.risk_level.as_str()
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## Summary");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Total | Breached | Secure | Error | Skipped |");
    let _ = writeln!(out, "|---|---|---|---|---|");
    let _ = writeln!(
        out,
        "| {} | {} | {} | {} | {} |",
        s.total, s.breached, s.secure, s.error, s.skipped
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "## By category");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Category | Total | Breached | Secure |");
    let _ = writeln!(out, "|---|---|---|---|");
    for cat in AttackCategory::ALL {
        let c = report.by_category.get(&cat).copied().unwrap_or_default();
        let _ = writeln!(out, "| {} | {} | {} | {} |", cat, c.total, c.breached, c.secure);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## By severity");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Severity | Total | Breached |");
    let _ = writeln!(out, "|---|---|---|");
    for sev in Severity::ALL {
        let v = report.by_severity.get(&sev).copied().unwrap_or_default();
        let _ = writeln!(out, "| {} | {} | {} |", sev, v.total, v.breached);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Vulnerabilities");
    let _ = writeln!(out);
    if report.vulnerabilities.is_empty() {
        let _ = writeln!(out, "No vulnerabilities found.");
        let _ = writeln!(out);
    }
    for (i, v) in report.vulnerabilities_by_severity().iter().enumerate() {
        let _ = writeln!(
            out,
            "### {}. [{}] {}",
            i + 1,
            v.severity.as_str().to_uppercase(),
            v.title
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "- Attack: `{}` ({})", v.attack_id, v.category);
        let _ = writeln!(out, "- Status: {:?}", v.status);
        let _ = writeln!(out, "- Impact: {}", v.impact);
        let _ = writeln!(out);
        let _ = writeln!(out, "{}", v.description);
        let _ = writeln!(out);
        if !v.fix.is_empty() {
            let _ = writeln!(out, "**Fix:** {}", v.fix.summary);
            for step in &v.fix.steps {
                let _ = writeln!(out, "1. {}", step);
            }
            if let Some(code) = &v.fix.code {
                let _ = writeln!(out, "\n```sql\n{}\n```", code);
            }
            let _ = writeln!(out);
        }
        if let Some(evidence) = &v.evidence {
            let pretty = serde_json::to_string_pretty(evidence).unwrap_or_default();
            let _ = writeln!(out, "<details><summary>Evidence</summary>\n\n```json\n{}\n```\n</details>\n", pretty);
        }
    }

    if let Some(compliance) = &report.compliance {
        let _ = writeln!(out, "## Compliance");
        let _ = writeln!(out);
        for framework in Framework::ALL {
            let counts = compliance.for_framework(framework);
            let _ = writeln!(out, "### {}", framework.label());
            let _ = writeln!(out);
            if counts.is_empty() {
                let _ = writeln!(out, "No mapped findings.");
            }
            for (id, count) in counts {
                let _ = writeln!(out, "- {}: {}", id, count);
            }
            let _ = writeln!(out);
        }
    }

    let _ = writeln!(out, "## Attack results");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Attack | Status | Duration | Summary |");
    let _ = writeln!(out, "|---|---|---|---|");
    for r in &report.results {
        let _ = writeln!(
            out,
            "| {} | {} | {}ms | {} |",
            cell(&r.attack_id),
            r.status,
            r.duration_ms,
            cell(&r.summary)
        );
    }

    out
}
