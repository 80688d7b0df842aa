/// Self-contained HTML report.
///
/// Produces a single document with embedded CSS and JS and no external
/// assets: stat cards, category and severity tables, a findings list with
/// fixes, compliance counts and a filterable results table.
use crate::attack::{AttackCategory, AttackStatus, Severity};
use crate::classify::Framework;
use crate::core::report::BreachReport;

pub fn render(report: &BreachReport) -> String {
    let s = &report.stats;

    let mut category_rows = String::new();
    for cat in AttackCategory::ALL {
        let c = report.by_category.get(&cat).copied().unwrap_or_default();
        category_rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            cat, c.total, c.breached, c.secure
        ));
    }

    let mut severity_rows = String::new();
    for sev in Severity::ALL {
        let v = report.by_severity.get(&sev).copied().unwrap_or_default();
        severity_rows.push_str(&format!(
            r#"<tr><td><span class="sev-{sev}">{sev}</span></td><td>{}</td><td>{}</td></tr>"#,
            v.total,
            v.breached,
            sev = sev
        ));
    }

    let mut findings = String::new();
    for v in report.vulnerabilities_by_severity() {
        let mut fix = String::new();
        if !v.fix.is_empty() {
            fix.push_str(&format!("<p><strong>Fix:</strong> {}</p>", html_escape(&v.fix.summary)));
            if !v.fix.steps.is_empty() {
                fix.push_str("<ol>");
                for step in &v.fix.steps {
                    fix.push_str(&format!("<li>{}</li>", html_escape(step)));
                }
                fix.push_str("</ol>");
            }
            if let Some(code) = &v.fix.code {
                fix.push_str(&format!("<pre>{}</pre>", html_escape(code)));
            }
        }
        findings.push_str(&format!(
            r#"<div class="finding">
    <div class="finding-head"><span class="sev-{sev}">{sev}</span> <strong>{title}</strong> <span class="mono">{attack}</span> <span class="dim">{cat}</span></div>
    <p>{desc}</p>
    <p class="dim">{impact}</p>
    {fix}
</div>"#,
            sev = v.severity,
            title = html_escape(&v.title),
            attack = html_escape(&v.attack_id),
            cat = v.category,
            desc = html_escape(&v.description).replace('\n', "<br>"),
            impact = html_escape(&v.impact),
            fix = fix,
        ));
    }
    if findings.is_empty() {
        findings.push_str(r#"<div class="empty">No vulnerabilities found.</div>"#);
    }

    let mut compliance = String::new();
    if let Some(summary) = &report.compliance {
        compliance.push_str(r#"<div class="panel"><div class="panel-header">Compliance</div><div class="meta">"#);
        for framework in Framework::ALL {
            let counts = summary.for_framework(framework);
            let mut items = String::new();
            for (id, count) in counts {
                items.push_str(&format!("<li>{}: {}</li>", html_escape(id), count));
            }
            if items.is_empty() {
                items.push_str(r#"<li class="dim">No mapped findings</li>"#);
            }
            compliance.push_str(&format!(
                r#"<div class="meta-card"><div class="label">{}</div><ul>{}</ul></div>"#,
                framework.label(),
                items
            ));
        }
        compliance.push_str("</div></div>");
    }

    let mut result_rows = String::new();
    for r in &report.results {
        let class = match r.status {
            AttackStatus::Breached => "st-breached",
            AttackStatus::Secure => "st-secure",
            AttackStatus::Error => "st-error",
            _ => "st-skipped",
        };
        result_rows.push_str(&format!(
            r#"<tr><td class="mono">{}</td><td><span class="{}">{}</span></td><td>{}ms</td><td>{}</td></tr>"#,
            html_escape(&r.attack_id),
            class,
            r.status,
            r.duration_ms,
            html_escape(&r.summary),
        ));
    }

    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Breach Report - {project}</title>
<style>
* {{ margin: 0; padding: 0; box-sizing: border-box; }}
body {{ background: #0a0a0c; color: #e1e1e6; font-family: 'Inter', system-ui, sans-serif; padding: 2rem; }}
.header {{ display: flex; align-items: center; gap: 1rem; margin-bottom: 2rem; }}
.header h1 {{ font-size: 1.5rem; font-weight: 700; }}
.header .badge {{ background: rgba(0,213,190,0.1); color: #00d5be; padding: 0.25rem 0.75rem; border-radius: 6px; font-size: 0.75rem; font-weight: 600; }}
.meta {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(200px, 1fr)); gap: 1rem; margin-bottom: 2rem; padding: 1rem; }}
.meta-card {{ background: rgba(255,255,255,0.035); border: 1px solid rgba(255,255,255,0.08); border-radius: 12px; padding: 1.25rem; }}
.meta-card .label {{ font-size: 0.7rem; text-transform: uppercase; letter-spacing: 0.08em; color: #64647a; margin-bottom: 0.5rem; }}
.meta-card .value {{ font-size: 1.75rem; font-weight: 700; font-family: 'JetBrains Mono', monospace; }}
.meta-card ul {{ list-style: none; font-size: 0.85rem; }}
.value.critical {{ color: #f43f5e; }}
.value.success {{ color: #10b981; }}
.value.medium {{ color: #eab308; }}
.value.accent {{ color: #00d5be; }}
table {{ width: 100%; border-collapse: collapse; font-size: 0.85rem; }}
thead th {{ text-align: left; padding: 0.75rem 1rem; border-bottom: 1px solid rgba(255,255,255,0.08); color: #64647a; font-size: 0.7rem; text-transform: uppercase; letter-spacing: 0.08em; }}
tbody td {{ padding: 0.75rem 1rem; border-bottom: 1px solid rgba(255,255,255,0.04); }}
.mono {{ font-family: 'JetBrains Mono', monospace; font-size: 0.8rem; }}
.dim {{ color: #94949e; }}
pre {{ background: #151518; padding: 0.75rem; border-radius: 8px; margin-top: 0.5rem; overflow-x: auto; font-size: 0.8rem; }}
.sev-critical, .sev-high, .sev-medium, .sev-low, .sev-info {{ padding: 0.15rem 0.5rem; border-radius: 9999px; font-size: 0.7rem; font-weight: 700; text-transform: uppercase; }}
.sev-critical {{ background: rgba(244,63,94,0.1); color: #f43f5e; }}
.sev-high {{ background: rgba(249,115,22,0.1); color: #f97316; }}
.sev-medium {{ background: rgba(234,179,8,0.1); color: #eab308; }}
.sev-low {{ background: rgba(59,130,246,0.1); color: #3b82f6; }}
.sev-info {{ background: rgba(148,148,158,0.1); color: #94949e; }}
.st-breached {{ color: #f43f5e; font-weight: 700; }}
.st-secure {{ color: #10b981; }}
.st-error {{ color: #eab308; }}
.st-skipped {{ color: #64647a; }}
.panel {{ background: rgba(255,255,255,0.02); border: 1px solid rgba(255,255,255,0.08); border-radius: 12px; overflow: hidden; margin-bottom: 2rem; }}
.panel-header {{ padding: 1rem 1.25rem; border-bottom: 1px solid rgba(255,255,255,0.08); font-weight: 600; font-size: 0.85rem; }}
.finding {{ padding: 1rem 1.25rem; border-bottom: 1px solid rgba(255,255,255,0.04); }}
.finding p {{ margin-top: 0.5rem; }}
.finding ol {{ margin: 0.5rem 0 0 1.5rem; }}
.filter-bar {{ padding: 0.75rem 1.25rem; border-bottom: 1px solid rgba(255,255,255,0.04); }}
.filter-bar input {{ background: #151518; border: 1px solid rgba(255,255,255,0.08); border-radius: 8px; padding: 0.5rem 0.75rem; color: #e1e1e6; font-size: 0.85rem; width: 300px; outline: none; }}
.empty {{ padding: 3rem; text-align: center; color: #64647a; }}
</style>
</head>
<body>
<div class="header">
    <h1>Breach Report: {project}</h1>
    <span class="badge">{report_id}</span>
</div>

<div class="meta">
    <div class="meta-card"><div class="label">Risk Score</div><div class="value critical">{score}</div><div class="dim">{level}</div></div>
    <div class="meta-card"><div class="label">Attacks</div><div class="value">{total}</div></div>
    <div class="meta-card"><div class="label">Breached</div><div class="value critical">{breached}</div></div>
    <div class="meta-card"><div class="label">Secure</div><div class="value success">{secure}</div></div>
    <div class="meta-card"><div class="label">Errors</div><div class="value medium">{errors}</div></div>
    <div class="meta-card"><div class="label">Skipped</div><div class="value">{skipped}</div></div>
    <div class="meta-card"><div class="label">Duration</div><div class="value accent">{duration:.1}s</div></div>
</div>

<div class="panel">
    <div class="panel-header">Findings</div>
    {findings}
</div>

<div class="panel">
    <div class="panel-header">By Category</div>
    <table><thead><tr><th>Category</th><th>Total</th><th>Breached</th><th>Secure</th></tr></thead><tbody>{category_rows}</tbody></table>
</div>

<div class="panel">
    <div class="panel-header">By Severity</div>
    <table><thead><tr><th>Severity</th><th>Total</th><th>Breached</th></tr></thead><tbody>{severity_rows}</tbody></table>
</div>

{compliance}

<div class="panel">
    <div class="panel-header">Attack Results</div>
    <div class="filter-bar"><input type="text" id="filter" placeholder="Filter by attack, status or summary..." oninput="filterTable()"></div>
    <table id="results"><thead><tr><th>Attack</th><th>Status</th><th>Duration</th><th>Summary</th></tr></thead><tbody>{result_rows}</tbody></table>
</div>

<script>
function filterTable() {{
    const q = document.getElementById('filter').value.toLowerCase();
    document.querySelectorAll('#results tbody tr').forEach(r => {{
        r.style.display = r.textContent.toLowerCase().includes(q) ? '' : 'none';
    }});
}}
</script>
</body>
</html>"#,
        project = html_escape(&report.project_name),
        report_id = html_escape(&report.id),
        score = report.risk_score,
        level = report.risk_level.as_str(),
        total = s.total,
        breached = s.breached,
        secure = s.secure,
        errors = s.error,
        skipped = s.skipped,
        duration = report.duration_ms as f64 / 1000.0,
        findings = findings,
        category_rows = category_rows,
        severity_rows = severity_rows,
        compliance = compliance,
        result_rows = result_rows,
    )
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
