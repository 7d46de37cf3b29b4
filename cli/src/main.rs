//! grayroute CLI — driving adapter for the grayroute decision engine.
//!
//! Subcommands:
//! - `eval <rules> [key=value...] [--trace] [--timeout-ms N]` — decide one request, print JSON
//! - `eval --config <engine>` — same, with rules and deadline from an engine config
//! - `watch --config <engine> [key=value...]` — refresh rules periodically, print each new decision
//! - `check <rules>` — validate a rule file against the registered matchers
//! - `info` — print registered rule types
//!
//! Context keys for `eval`: `userId`, `tenantId`, `path`, `method`, `ip`,
//! and `header.<Name>`.

use std::path::Path;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use grayroute::prelude::*;
use grayroute::{
    spawn_refresher, DocumentFormat, EngineConfig, FileRuleSource, GrayContextBuilder,
    RulesDocument,
};
use tracing_subscriber::EnvFilter;

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "eval" => cmd_eval(&args[2..]),
        "watch" => cmd_watch(&args[2..]),
        "check" => cmd_check(&args[2..]),
        "info" => cmd_info(),
        "--help" | "-h" | "help" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("error: unknown command \"{other}\"");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

// ═══════════════════════════════════════════════════════════════════════════════
// Commands
// ═══════════════════════════════════════════════════════════════════════════════

fn cmd_eval(args: &[String]) -> Result<(), String> {
    let runtime = build_runtime()?;

    let (engine, rest) = match args {
        [flag, path, rest @ ..] if flag == "--config" => {
            let config = load_engine_config(path)?;
            let (engine, _) = runtime.block_on(configured_engine(config))?;
            (engine, rest)
        }
        [flag] if flag == "--config" => return Err("--config requires a file path".into()),
        [rules, rest @ ..] => (build_engine(load_rules(rules)?)?, rest),
        [] => return Err("eval requires a rules file path or --config <file>".into()),
    };
    let opts = parse_eval_args(rest)?;
    let timeout = opts.timeout.or_else(|| engine.config().decision_timeout());

    let json = if opts.trace {
        let trace = runtime.block_on(decide_traced(&engine, &opts.context, timeout))?;
        serde_json::to_string_pretty(&trace)
    } else {
        let decision = match opts.timeout {
            Some(timeout) => runtime.block_on(engine.decide_within(&opts.context, timeout)),
            None => runtime.block_on(engine.decide_configured(&opts.context)),
        };
        serde_json::to_string_pretty(&decision)
    }
    .map_err(|e| format!("failed to encode decision: {e}"))?;

    println!("{json}");
    Ok(())
}

fn cmd_watch(args: &[String]) -> Result<(), String> {
    let (config_path, rest) = match args {
        [flag, path, rest @ ..] if flag == "--config" => (path, rest),
        _ => return Err("watch requires --config <file>".into()),
    };
    let config = load_engine_config(config_path)?;
    let interval = config
        .refresh_interval()
        .ok_or("watch requires refreshIntervalSecs in the engine config")?;
    let opts = parse_eval_args(rest)?;
    if opts.trace {
        return Err("watch does not support --trace".into());
    }

    let runtime = build_runtime()?;
    runtime.block_on(async {
        let (engine, repo) = configured_engine(config).await?;
        let refresher = spawn_refresher(Arc::clone(&repo), interval);
        let result = watch_decisions(&engine, &repo, &opts, interval).await;
        refresher.abort();
        result
    })
}

/// Print the decision for `opts.context` now and after every refresh that
/// changes it. Returns only on an output error.
async fn watch_decisions(
    engine: &RuleEngine,
    repo: &InMemoryRuleRepository,
    opts: &EvalOptions,
    interval: Duration,
) -> Result<(), String> {
    let mut ticker = tokio::time::interval(interval);
    let mut last: Option<Decision> = None;
    loop {
        ticker.tick().await;
        let decision = match opts.timeout {
            Some(timeout) => engine.decide_within(&opts.context, timeout).await,
            None => engine.decide_configured(&opts.context).await,
        };
        if last.as_ref() == Some(&decision) {
            continue;
        }
        tracing::info!(
            generation = repo.snapshot().generation(),
            gray = decision.is_gray(),
            "decision changed"
        );
        let line = serde_json::to_string(&decision)
            .map_err(|e| format!("failed to encode decision: {e}"))?;
        println!("{line}");
        last = Some(decision);
    }
}

fn cmd_check(args: &[String]) -> Result<(), String> {
    if args.is_empty() {
        return Err("check requires a rules file path".into());
    }

    let rules = load_rules(&args[0])?;
    let registry = build_registry();
    let problems = check_rules(&registry, &rules);

    if problems.is_empty() {
        println!("Rules valid ({} rules)", rules.len());
        return Ok(());
    }
    for problem in &problems {
        eprintln!("warning: {problem}");
    }
    Err(format!("{} of {} rules have problems", problems.len(), rules.len()))
}

#[allow(clippy::unnecessary_wraps)] // Uniform return type for all commands
fn cmd_info() -> Result<(), String> {
    let registry = build_registry();

    println!("Registered rule types:");
    for rule_type in registry.rule_types() {
        println!("  {rule_type}");
    }

    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// Engine assembly (composition root)
// ═══════════════════════════════════════════════════════════════════════════════

fn build_registry() -> MatcherRegistry {
    MatcherRegistry::builtin()
}

fn build_runtime() -> Result<tokio::runtime::Runtime, String> {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))
}

fn build_engine(rules: Vec<GrayRule>) -> Result<RuleEngine, String> {
    let repo = InMemoryRuleRepository::from_rules(rules).map_err(|e| format!("rules invalid: {e}"))?;
    Ok(RuleEngine::new(Arc::new(repo), build_registry()))
}

/// Engine over a repository backed by the config's `rulesPath`, loaded once.
async fn configured_engine(
    config: EngineConfig,
) -> Result<(RuleEngine, Arc<InMemoryRuleRepository>), String> {
    let rules_path = config
        .rules_path
        .clone()
        .ok_or("engine config has no rulesPath")?;
    let repo = Arc::new(InMemoryRuleRepository::with_source(Arc::new(
        FileRuleSource::new(rules_path),
    )));
    repo.refresh()
        .await
        .map_err(|e| format!("failed to load rules: {e}"))?;

    let shared: Arc<dyn RuleRepository> = repo.clone();
    let engine = RuleEngine::new(shared, build_registry()).with_config(config);
    Ok((engine, repo))
}

/// Traced decision under the same deadline `decide_within` applies.
async fn decide_traced(
    engine: &RuleEngine,
    ctx: &GrayContext,
    timeout: Option<Duration>,
) -> Result<DecisionTrace, String> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, engine.decide_with_trace(ctx))
            .await
            .map_err(|_| format!("decision timed out after {}ms", timeout.as_millis())),
        None => Ok(engine.decide_with_trace(ctx).await),
    }
}

/// Rules the engine would skip at decision time, one message per rule.
fn check_rules(registry: &MatcherRegistry, rules: &[GrayRule]) -> Vec<String> {
    rules
        .iter()
        .filter_map(|rule| match registry.get(&rule.rule_type) {
            None => Some(format!(
                "rule {}: no matcher registered for type {}",
                rule.id, rule.rule_type
            )),
            Some(matcher) => matcher
                .check_config(rule)
                .err()
                .map(|e| format!("rule {}: {e}", rule.id)),
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rule loading
// ═══════════════════════════════════════════════════════════════════════════════

fn load_rules(path: &str) -> Result<Vec<GrayRule>, String> {
    let content =
        std::fs::read_to_string(path).map_err(|e| format!("failed to read \"{path}\": {e}"))?;
    let doc = RulesDocument::parse(&content, DocumentFormat::from_path(Path::new(path)))?;
    doc.validate().map_err(|e| format!("rules invalid: {e}"))?;
    tracing::debug!(path, rules = doc.rules.len(), "loaded rules");
    Ok(doc.rules)
}

/// Load an engine config. A relative `rulesPath` is resolved against the
/// config file's directory.
fn load_engine_config(path: &str) -> Result<EngineConfig, String> {
    let mut config = EngineConfig::from_path(path).map_err(|e| e.to_string())?;
    if let Some(dir) = Path::new(path).parent() {
        config.rules_path = config
            .rules_path
            .take()
            .map(|rules| if rules.is_relative() { dir.join(rules) } else { rules });
    }
    tracing::debug!(path, ?config, "loaded engine config");
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Argument parsing
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct EvalOptions {
    context: GrayContext,
    trace: bool,
    timeout: Option<Duration>,
}

fn parse_eval_args(args: &[String]) -> Result<EvalOptions, String> {
    let mut builder = GrayContext::builder();
    let mut trace = false;
    let mut timeout = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--trace" => trace = true,
            "--timeout-ms" => {
                i += 1;
                let raw = args.get(i).ok_or("--timeout-ms requires a value")?;
                let ms: u64 = raw
                    .parse()
                    .map_err(|_| format!("invalid timeout \"{raw}\""))?;
                timeout = Some(Duration::from_millis(ms));
            }
            pair => {
                let (key, value) = pair.split_once('=').ok_or_else(|| {
                    format!("invalid context pair \"{pair}\", expected key=value")
                })?;
                builder = apply_context_pair(builder, key, value)?;
            }
        }
        i += 1;
    }

    Ok(EvalOptions {
        context: builder.build(),
        trace,
        timeout,
    })
}

fn apply_context_pair(
    builder: GrayContextBuilder,
    key: &str,
    value: &str,
) -> Result<GrayContextBuilder, String> {
    let parse_id = |v: &str| {
        v.parse::<i64>()
            .map_err(|_| format!("{key} must be an integer, got \"{v}\""))
    };
    Ok(match key {
        "userId" => builder.user_id(parse_id(value)?),
        "tenantId" => builder.tenant_id(parse_id(value)?),
        "path" => builder.path(value),
        "method" => builder.method(value),
        "ip" => builder.client_ip(value),
        _ => match key.strip_prefix("header.") {
            Some(name) if !name.is_empty() => builder.header(name, value),
            _ => return Err(format!("unknown context key \"{key}\"")),
        },
    })
}

fn print_usage() {
    eprintln!(
        "Usage: grayroute <command> [options]

Commands:
  eval <rules> [key=value...] [--trace] [--timeout-ms N]   Decide one request
  eval --config <engine> [key=value...] [...]               Decide using an engine config
  watch --config <engine> [key=value...]                    Print the decision as rules refresh
  check <rules>                                             Validate rules
  info                                                      Print registered rule types
  help                                                      Show this help

Context keys: userId, tenantId, path, method, ip, header.<Name>"
    );
}
