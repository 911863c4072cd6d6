//! Command handlers for CLI operations
//!
//! Every handler takes the engine context, performs one operation and
//! prints the result as text or JSON. Errors get context here and nowhere
//! deeper; the engine itself returns typed `EngineError`s.

use anyhow::{anyhow, Context, Result};
use serde_json::json;
use std::io::Write;

use crate::context::EngineContext;
use crate::governance::{gated_promote, shield};
use crate::ledger::ChangeGraph;
use crate::pipeline::Component;
use crate::review::{ReviewReport, VerdictSource};
use sdk::types::{ChatEvent, Zone};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn resolve(ctx: &EngineContext, query: &str) -> Result<Component> {
    ctx.pipeline()
        .find(query)
        .await
        .ok_or_else(|| anyhow!("No component matches '{}'", query))
}

/// Show every component grouped by zone
pub async fn handle_status(ctx: &EngineContext, format: OutputFormat) -> Result<()> {
    let document = ctx.pipeline().snapshot().await;

    match format {
        OutputFormat::Text => {
            for zone in Zone::ACTIVE.into_iter().chain([Zone::SeedVault]) {
                let components = document.zone(zone);
                println!("{} ({})", zone, components.len());
                for c in components {
                    let shield = if c.shielded { " [shielded]" } else { "" };
                    println!("  #{:<4} {:<24} maturity {:>3}{}", c.id, c.name, c.maturity, shield);
                }
            }
        }
        OutputFormat::Json => print_json(&document)?,
    }
    Ok(())
}

pub async fn handle_create(
    ctx: &EngineContext,
    name: &str,
    category: &str,
    description: &str,
    format: OutputFormat,
) -> Result<()> {
    let component = ctx
        .pipeline()
        .create(name, category, description)
        .await
        .context("Failed to create component")?;

    match format {
        OutputFormat::Text => println!("Created '{}' (#{}) in nursery", component.name, component.id),
        OutputFormat::Json => print_json(&component)?,
    }
    Ok(())
}

/// Promote through the review gate
pub async fn handle_promote(ctx: &EngineContext, query: &str, format: OutputFormat) -> Result<()> {
    let component = resolve(ctx, query).await?;
    let outcome = gated_promote(ctx.pipeline(), ctx.ledgers(), component.id)
        .await
        .with_context(|| format!("Cannot promote '{}'", component.name))?;
    let (moved, from, to) = outcome.into_result()?;

    match format {
        OutputFormat::Text => println!("Promoted '{}' (#{}): {} -> {}", moved.name, moved.id, from, to),
        OutputFormat::Json => print_json(&json!({"component": moved, "from": from, "to": to}))?,
    }
    Ok(())
}

pub async fn handle_archive(
    ctx: &EngineContext,
    query: &str,
    reason: &str,
    format: OutputFormat,
) -> Result<()> {
    let component = resolve(ctx, query).await?;
    let (archived, from, _) = ctx
        .pipeline()
        .archive(component.id, reason)
        .await
        .context("Failed to archive component")?
        .into_result()?;

    match format {
        OutputFormat::Text => println!(
            "Archived '{}' (#{}) from {}: {}",
            archived.name, archived.id, from, reason
        ),
        OutputFormat::Json => print_json(&archived)?,
    }
    Ok(())
}

pub async fn handle_revive(ctx: &EngineContext, id: u64, format: OutputFormat) -> Result<()> {
    let revived = ctx
        .pipeline()
        .revive(id)
        .await
        .with_context(|| format!("Failed to revive #{}", id))?;

    match format {
        OutputFormat::Text => println!(
            "Revived #{} as '{}' (#{}) in nursery",
            id, revived.name, revived.id
        ),
        OutputFormat::Json => print_json(&revived)?,
    }
    Ok(())
}

pub async fn handle_shield(
    ctx: &EngineContext,
    query: &str,
    actor: &str,
    reason: &str,
    format: OutputFormat,
) -> Result<()> {
    let component = resolve(ctx, query).await?;
    let shielded = shield(ctx.pipeline(), ctx.ledgers(), component.id, actor, reason)
        .await
        .context("Failed to record override")?;

    match format {
        OutputFormat::Text => println!(
            "'{}' (#{}) shielded in {} by {}",
            shielded.name, shielded.id, shielded.current_zone, actor
        ),
        OutputFormat::Json => print_json(&shielded)?,
    }
    Ok(())
}

/// Run a full review, or one reviewer when `agent` is set
pub async fn handle_review(
    ctx: &EngineContext,
    query: &str,
    agent: Option<&str>,
    zone: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let zone = zone
        .map(|z| z.parse::<Zone>())
        .transpose()
        .map_err(|e| anyhow!(e))?;

    let report = match agent {
        Some(agent) => ctx.orchestrator().review_single(query, agent, zone).await,
        None => ctx.orchestrator().review(query, zone).await,
    }
    .with_context(|| format!("Review of '{}' failed", query))?;

    match format {
        OutputFormat::Text => print_report(&report),
        OutputFormat::Json => print_json(&report)?,
    }
    Ok(())
}

fn print_report(report: &ReviewReport) {
    println!(
        "Review of '{}' (#{}) in {}",
        report.component.name, report.component.id, report.zone
    );
    println!();

    if report.findings.is_clean() {
        println!("Static analysis: clean");
    } else {
        println!("Static analysis: {} issues", report.findings.issues.len());
        for issue in &report.findings.issues {
            match issue.line {
                Some(line) => println!("  [{}] line {}: {}", issue.rule, line, issue.message),
                None => println!("  [{}] {}", issue.rule, issue.message),
            }
        }
    }
    println!();

    for review in &report.reviews {
        let note = match review.source {
            VerdictSource::Parsed => "",
            VerdictSource::ParseFailure => " (unreadable reply)",
            VerdictSource::Unavailable => " (service unavailable)",
        };
        println!(
            "  {:<3} {:<12} {:>3}{}",
            review.agent_id, review.verdict, review.score, note
        );
        let summary = review.summary();
        if !summary.is_empty() {
            println!("      {}", summary);
        }
        if let Some(condition) = &review.conditional_approval {
            println!("      Would approve if: {}", condition);
        }
    }

    if let Some(approval) = &report.approval {
        println!();
        println!(
            "Result: {} ({})",
            if approval.passed { "PASSED" } else { "FAILED" },
            approval.reason
        );
    }
}

pub async fn handle_decisions(
    ctx: &EngineContext,
    component: Option<u64>,
    limit: usize,
    format: OutputFormat,
) -> Result<()> {
    let decisions = match component {
        Some(id) => ctx.ledgers().recent_decisions_for(id, limit).await,
        None => ctx.ledgers().decisions.tail(limit).await,
    }
    .context("Failed to read the decision ledger")?;

    match format {
        OutputFormat::Text => {
            if decisions.is_empty() {
                println!("No decisions recorded");
                return Ok(());
            }
            for d in &decisions {
                let subject = match (&d.component_name, d.component_id) {
                    (Some(name), Some(id)) => format!("{} (#{})", name, id),
                    _ => "-".to_string(),
                };
                println!(
                    "{}  {:<8} {:<9} {:<24} {}  {}",
                    d.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    format!("{:?}", d.kind).to_lowercase(),
                    d.zone,
                    subject,
                    if d.outcome.passed { "pass" } else { "fail" },
                    d.outcome.reason
                );
            }
        }
        OutputFormat::Json => print_json(&json!({
            "decisions": decisions,
            "count": decisions.len(),
            "limit": limit
        }))?,
    }
    Ok(())
}

pub async fn handle_trace(ctx: &EngineContext, file: &str, format: OutputFormat) -> Result<()> {
    let graph: ChangeGraph = ctx
        .ledgers()
        .changes
        .project()
        .await
        .context("Failed to read the change ledger")?;
    let chain = graph.chain_for(file);

    match format {
        OutputFormat::Text => {
            if chain.is_empty() {
                println!("No changes recorded for {}", file);
                return Ok(());
            }
            for change in &chain {
                let cause = change
                    .caused_by
                    .as_deref()
                    .map(|c| format!(" <- {}", c))
                    .unwrap_or_default();
                println!(
                    "{}  {}  {:?} {} ({:?} risk){}: {}",
                    change.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    change.id,
                    change.change_type,
                    change.file,
                    change.breakage_risk,
                    cause,
                    change.description
                );
            }
        }
        OutputFormat::Json => print_json(&json!({"file": file, "chain": chain}))?,
    }
    Ok(())
}

/// Send one chat message and print events as they stream in
pub async fn handle_chat(
    ctx: &EngineContext,
    message: &str,
    session: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let (events, mut incoming) = tokio::sync::mpsc::channel::<ChatEvent>(64);

    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = incoming.recv().await {
            match format {
                OutputFormat::Json => {
                    if let Ok(line) = serde_json::to_string(&event) {
                        println!("{}", line);
                    }
                }
                OutputFormat::Text => match event {
                    ChatEvent::Token { text } => {
                        print!("{}", text);
                        let _ = stdout.flush();
                    }
                    ChatEvent::ToolStart { name, .. } => println!("\n[tool] {} ...", name),
                    ChatEvent::ToolResult { name, ok, preview, .. } => {
                        println!("[tool] {} {}: {}", name, if ok { "ok" } else { "failed" }, preview)
                    }
                    ChatEvent::Done { session_id, .. } => println!("\n\n(session {})", session_id),
                    ChatEvent::Error { message } => eprintln!("\nError: {}", message),
                },
            }
        }
    });

    let outcome = ctx.chat().run(session, message, events).await;
    printer.await.context("Chat output task failed")?;
    outcome.context("Chat turn failed")?;
    Ok(())
}
