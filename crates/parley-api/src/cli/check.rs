//! `parley check`: report configuration problems before starting the server.
//!
//! With `--ping` it also sends a minimal completion to the model provider and
//! opens a connection to the SMTP server.

use anyhow::Result;
use console::style;

use parley_infra::config::{has_errors, validate, ConfigIssue, Secrets, Severity};
use parley_infra::llm::{create_provider, test_provider_connection};
use parley_infra::notify::build_email_sink;
use parley_types::config::ServiceConfig;

/// Result of one connectivity check.
struct PingResult {
    target: &'static str,
    outcome: Result<(), String>,
}

/// Run the checks and print a report. Returns `true` when nothing is broken.
pub async fn run_check(config: &ServiceConfig, secrets: Secrets, ping: bool, json: bool) -> Result<bool> {
    let issues = validate(config, &secrets);

    let pings = if ping {
        ping_targets(config, secrets).await
    } else {
        Vec::new()
    };

    let ok = !has_errors(&issues) && pings.iter().all(|p| p.outcome.is_ok());

    if json {
        let report = serde_json::json!({
            "ok": ok,
            "issues": issues.iter().map(issue_json).collect::<Vec<_>>(),
            "pings": pings.iter().map(|p| serde_json::json!({
                "target": p.target,
                "ok": p.outcome.is_ok(),
                "error": p.outcome.as_ref().err(),
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(ok);
    }

    print_summary(config);

    if issues.is_empty() {
        println!("  {} Configuration looks good", style("✓").green().bold());
    }
    for issue in &issues {
        let mark = match issue.severity {
            Severity::Warning => style("⚠").yellow().bold(),
            Severity::Error => style("✗").red().bold(),
        };
        println!("  {mark} {issue}");
    }

    for ping in &pings {
        match &ping.outcome {
            Ok(()) => println!("  {} {} reachable", style("✓").green().bold(), ping.target),
            Err(e) => println!(
                "  {} {} unreachable: {}",
                style("✗").red().bold(),
                ping.target,
                style(e).dim()
            ),
        }
    }

    println!();
    if ok {
        println!("  {}", style("Ready to serve.").green());
    } else {
        println!("  {}", style("Fix the errors above before serving.").red());
    }

    Ok(ok)
}

fn print_summary(config: &ServiceConfig) {
    println!();
    println!("  {}", style("── Parley ──").dim());
    println!("  {:<14} {}", style("Version:").bold(), env!("CARGO_PKG_VERSION"));
    println!(
        "  {:<14} {}:{}",
        style("Listen:").bold(),
        config.server.host,
        config.server.port
    );
    println!("  {:<14} {}", style("Company:").bold(), style(&config.chat.company_name).cyan());
    println!("  {:<14} {}", style("Model:").bold(), config.model.model);
    println!("  {:<14} {}", style("FAQs:").bold(), config.chat.faqs.len());
    println!(
        "  {:<14} {}",
        style("Notifications:").bold(),
        if config.notifications.enabled {
            style("enabled").green()
        } else {
            style("disabled").dim()
        }
    );
    println!();
}

fn issue_json(issue: &ConfigIssue) -> serde_json::Value {
    serde_json::json!({
        "severity": match issue.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        },
        "message": issue.message,
    })
}

async fn ping_targets(config: &ServiceConfig, secrets: Secrets) -> Vec<PingResult> {
    let mut pings = Vec::new();

    if secrets.anthropic_api_key.is_some() {
        let outcome = match create_provider(&config.model, secrets.anthropic_api_key) {
            Ok(provider) => test_provider_connection(&provider, &config.model)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };
        pings.push(PingResult {
            target: "model provider",
            outcome,
        });
    }

    if config.notifications.enabled && config.notifications.email.is_some() {
        let outcome = match build_email_sink(&config.notifications, secrets.smtp_password) {
            Ok(sink) => match sink.verify().await {
                Ok(true) => Ok(()),
                Ok(false) => Err("server rejected the connection".to_string()),
                Err(e) => Err(e.to_string()),
            },
            Err(e) => Err(e.to_string()),
        };
        pings.push(PingResult {
            target: "SMTP server",
            outcome,
        });
    }

    pings
}
