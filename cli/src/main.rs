mod progress;

use std::fs;
use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use colored::*;
use log::warn;

use breachkit_core::export::{self, ExportFormat};
use breachkit_core::modules::{builtin_fixes, default_playbook};
use breachkit_core::{
    AttackCategory, AttackContext, AttackPlaybook, CancelSignal, ConsoleSink, ProjectMeta,
    ResultAggregator, ScanConfig, ScanEngine, ScanEventSink, Severity, SinkRef, StaticFixes,
    TargetConfig,
};

use crate::progress::ProgressSink;

const EXIT_OK: i32 = 0;
const EXIT_CONFIG: i32 = 1;
const EXIT_BREACHED: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "breachkit",
    version,
    about = "Attack runner and breach reporter for hosted Postgres backends",
    override_usage = "breachkit <url> --anon-key <KEY> <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Quick scan:                     breachkit https://abc.supabase.co --anon-key $KEY
  Probe one table:                breachkit https://abc.supabase.co --resource profiles
  Only RLS and storage:           breachkit https://abc.supabase.co --category rls --category storage
  Markdown report + compliance:   breachkit https://abc.supabase.co -f markdown -o report.md --compliance
  List the selected attacks:      breachkit --list --severity critical
  CI gate:                        breachkit https://abc.supabase.co --fail-on-breach --deadline 120"
)]
pub struct Args {
    #[arg(required_unless_present = "list", help = "Project base URL")]
    pub url: Option<String>,

    #[arg(long, env = "BREACHKIT_ANON_KEY", hide_env_values = true, help = "Public (anon) API key")]
    pub anon_key: Option<String>,

    #[arg(long, env = "BREACHKIT_SERVICE_KEY", hide_env_values = true, help = "Service role key; the public key is checked against it")]
    pub service_key: Option<String>,

    #[arg(long, help = "Table or resource the probes should target")]
    pub resource: Option<String>,

    #[arg(long, default_value = "local", help = "Project identifier recorded in the report")]
    pub project_id: String,

    #[arg(long, help = "Project display name (defaults to the URL host)")]
    pub project_name: Option<String>,

    #[arg(short = 't', long, help = "Number of attacks run concurrently")]
    pub threads: Option<usize>,

    #[arg(long, help = "Per-attack timeout in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Grace period for in-flight attacks after cancellation, in milliseconds")]
    pub grace_ms: Option<u64>,

    #[arg(long, help = "Whole-scan deadline in seconds")]
    pub deadline: Option<u64>,

    #[arg(long, help = "Only run attacks in this category (repeatable)")]
    pub category: Vec<AttackCategory>,

    #[arg(long, help = "Only run attacks of this severity (repeatable)")]
    pub severity: Vec<Severity>,

    #[arg(long, help = "Only run attacks carrying this tag (repeatable)")]
    pub tag: Vec<String>,

    #[arg(long, default_value_t = false, help = "Include OWASP, SOC 2 and GDPR summaries")]
    pub compliance: bool,

    #[arg(long, help = "JSON file of extra fix recommendations keyed by attack id")]
    pub fixes: Option<PathBuf>,

    #[arg(long, help = "JSON scan configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"X-Tenant: acme\")")]
    pub headers: Vec<String>,

    #[arg(short = 'o', long, help = "Report output path")]
    pub output: Option<PathBuf>,

    #[arg(short = 'f', long, default_value = "json", help = "Report format: json, markdown or html")]
    pub format: ExportFormat,

    #[arg(long, default_value_t = false, help = "Print the selected attacks and exit")]
    pub list: bool,

    #[arg(long, help = "Validate the setup without sending requests")]
    pub dry_run: bool,

    #[arg(short = 'v', long, default_value_t = false, help = "Verbose output and debug logging")]
    pub verbose: bool,

    #[arg(long, default_value_t = false, help = "Exit with code 2 when any breach is found")]
    pub fail_on_breach: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e)
            if matches!(
                e.kind(),
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
            ) =>
        {
            e.exit()
        }
        Err(e) => {
            let _ = e.print();
            process::exit(EXIT_CONFIG);
        }
    };

    init_logging(args.verbose);
    print_banner();

    match run(args).await {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprint!("{}\r\n", format!("[!] {:#}", e).red());
            process::exit(EXIT_CONFIG);
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn print_banner() {
    let banner = r#"
   ___                  _    _   _ _
  | _ )_ _ ___ __ _ __| |_ | |_(_) |_
  | _ \ '_/ -_) _` / _| ' \| / / |  _|
  |___/_| \___\__,_\__|_||_|_\_\_|\__|
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Loads the config file, then lets flags override it.
fn build_config(args: &Args) -> anyhow::Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => ScanConfig::load(path)?,
        None => ScanConfig::default(),
    };

    if let Some(threads) = args.threads {
        config.engine.concurrency = threads;
    }
    if let Some(secs) = args.timeout {
        config.engine.probe_timeout_ms = secs.saturating_mul(1000);
        config.http.timeout_secs = secs;
    }
    if let Some(grace) = args.grace_ms {
        config.engine.grace_period_ms = grace;
    }
    if let Some(secs) = args.deadline {
        config.engine.scan_deadline_ms = Some(secs.saturating_mul(1000));
    }
    if args.compliance {
        config.engine.include_compliance = true;
    }
    if let Some(proxy) = &args.proxy {
        config.http.proxy = Some(proxy.clone());
    }
    config.http.headers.extend(parse_custom_headers(&args.headers));

    if !args.category.is_empty() {
        config.filter.categories = args.category.clone();
    }
    if !args.severity.is_empty() {
        config.filter.severities = args.severity.clone();
    }
    if !args.tag.is_empty() {
        config.filter.tags = args.tag.clone();
    }

    config.engine.validate()?;
    Ok(config)
}

/// Parses "Name: value" pairs; malformed entries are dropped with a warning.
fn parse_custom_headers(raw: &[String]) -> Vec<(String, String)> {
    raw.iter()
        .filter_map(|h| match h.split_once(':') {
            Some((k, v)) if !k.trim().is_empty() => Some((k.trim().to_string(), v.trim().to_string())),
            _ => {
                warn!("ignoring malformed header '{}'", h);
                None
            }
        })
        .collect()
}

fn print_playbook(playbook: &AttackPlaybook) {
    let selected = playbook.select();
    print!(
        "{}\r\n",
        format!("[+] Playbook '{}': {} attack(s) selected", playbook.name(), selected.len())
            .green()
            .bold()
    );
    for vector in selected {
        print!(
            "  {:<34} {:<10} {:<9} {}\r\n",
            vector.id().white().bold(),
            vector.category().to_string(),
            vector.severity().to_string(),
            vector.name()
        );
    }
    std::io::stdout().flush().ok();
}

async fn run(args: Args) -> anyhow::Result<i32> {
    let config = build_config(&args)?;
    let playbook = default_playbook().with_filter(config.filter.clone());

    if args.list {
        print_playbook(&playbook);
        return Ok(EXIT_OK);
    }

    let url = args
        .url
        .clone()
        .ok_or_else(|| anyhow!("a target URL is required"))?;

    if args.dry_run {
        let probe = TargetConfig {
            url: url.clone(),
            anon_key: String::new(),
            service_key: None,
        };
        probe.parsed_url()?;
        println!(
            "[DRY RUN] Would run {} attack(s) against: {}",
            playbook.select().len(),
            url
        );
        print_playbook(&playbook);
        return Ok(EXIT_OK);
    }

    let anon_key = args
        .anon_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| anyhow!("an anon key is required (--anon-key or BREACHKIT_ANON_KEY)"))?;

    let target = TargetConfig {
        url: url.clone(),
        anon_key,
        service_key: args.service_key.clone(),
    };
    let host = target
        .parsed_url()?
        .host_str()
        .unwrap_or("project")
        .to_string();

    let cancel = CancelSignal::new();
    let mut ctx = AttackContext::with_http_options(target, &config.http)?.cancel_signal(cancel.clone());
    if let Some(resource) = &args.resource {
        ctx = ctx.target_resource(resource.clone());
    }

    let fixes = match &args.fixes {
        Some(path) => builtin_fixes().merge(StaticFixes::load(path)?),
        None => builtin_fixes(),
    };

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprint!("{}\r\n", "[!] Interrupted, cancelling remaining attacks...".yellow());
                cancel.cancel();
            }
        });
    }

    print_scan_config(&url, &args, &config, &playbook);

    let meta = ProjectMeta::start(
        args.project_id.clone(),
        args.project_name.clone().unwrap_or(host),
    );

    let engine = ScanEngine::new(config.engine.clone())?;
    let stream = engine.run(&playbook, Arc::new(ctx))?;

    let aggregator = ResultAggregator::new(Arc::new(fixes))
        .with_compliance(config.engine.include_compliance);

    let interactive = std::io::stdout().is_terminal() && !args.verbose;
    let tally = if interactive {
        let bar = Arc::new(ProgressSink::new());
        let sink: SinkRef = bar.clone();
        let tally = aggregator.run(stream, sink).await;
        bar.finish();
        tally
    } else {
        aggregator.run(stream, ConsoleSink::new_ref(args.verbose)).await
    };

    let report = aggregator.finalize(tally, &meta.complete());

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("breach_report.{}", args.format.extension())));
    let rendered = export::render(&report, args.format)?;
    fs::write(&output, rendered).with_context(|| format!("writing report {}", output.display()))?;

    let console = ConsoleSink::new_ref(args.verbose);
    ResultAggregator::report_summary(&report, &console);
    console.on_log("success", &format!("[+] Report saved to {}", output.display()));

    if cancel.is_cancelled() {
        console.on_log("warn", "[!] Scan was cancelled; unstarted attacks are reported as skipped.");
    }

    if args.fail_on_breach && report.has_breaches() {
        return Ok(EXIT_BREACHED);
    }
    Ok(EXIT_OK)
}

fn print_scan_config(url: &str, args: &Args, config: &ScanConfig, playbook: &AttackPlaybook) {
    let engine = &config.engine;
    print!("{}\r\n", format!("[+] Target:      {}", url).green().bold());
    print!("{}\r\n", format!("[+] Attacks:     {}", playbook.select().len()).blue());
    print!("{}\r\n", format!("[+] Threads:     {}", engine.concurrency).blue());
    print!("{}\r\n", format!("[+] Timeout:     {}ms", engine.probe_timeout_ms).blue());
    if let Some(deadline) = engine.scan_deadline_ms {
        print!("{}\r\n", format!("[+] Deadline:    {}ms", deadline).blue());
    }
    print!("{}\r\n", format!("[+] Format:      {}", args.format).magenta());
    if let Some(resource) = &args.resource {
        print!("{}\r\n", format!("[+] Resource:    {}", resource).yellow());
    }
    if args.service_key.is_some() {
        print!("{}\r\n", "[+] Service key: provided".yellow());
    }
    if let Some(proxy) = &config.http.proxy {
        print!("{}\r\n", format!("[+] Proxy:       {}", proxy).yellow());
    }
    if engine.include_compliance {
        print!("{}\r\n", "[+] Compliance:  OWASP / SOC 2 / GDPR".yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}
