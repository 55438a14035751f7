//! Webhook summary notification: a single POST per run carrying a markdown
//! summary, with failures swallowed silently.

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

use crate::orchestrator::RunResult;
use crate::report::{Report, Status};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct MarkdownBody {
    title: String,
    text: String,
}

#[derive(Debug, Serialize)]
struct DingTalkPayload {
    msgtype: &'static str,
    markdown: MarkdownBody,
}

/// Derive a human label for a stack from its compose file's parent
/// directory, falling back to the path itself. Used only in the summary's
/// per-stack section headers.
pub fn stack_label(report: &Report) -> String {
    let path = std::path::Path::new(&report.compose_file);
    match path.parent().and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => report.compose_file.clone(),
    }
}

fn counts(reports: &[Report]) -> (usize, usize, usize, usize, usize) {
    let total = reports.len();
    let ok = reports.iter().filter(|r| r.status == Status::Success).count();
    let rollback = reports.iter().filter(|r| r.status == Status::Rollback).count();
    let failed = reports.iter().filter(|r| r.status == Status::Failed).count();
    let skipped = reports.iter().filter(|r| r.status == Status::Skipped).count();
    (total, ok, rollback, failed, skipped)
}

/// Build the markdown title and body for one run's summary: a totals line,
/// then one `####` section per stack.
pub fn render_summary(result: &RunResult, run_timestamp: &str) -> (String, String) {
    let (total, ok, rollback, failed, skipped) = counts(&result.reports);
    let title = format!(
        "Compose Guardian Run {} ({run_timestamp}) total={total} ok={ok} rollback={rollback} failed={failed} skipped={skipped}",
        result.overall.as_str()
    );

    let mut body = String::new();
    body.push_str(&format!(
        "**Overall: {}** — total={total} ok={ok} rollback={rollback} failed={failed} skipped={skipped}\n\n",
        result.overall.as_str()
    ));

    for report in &result.reports {
        body.push_str(&format!("#### {} — {}\n", stack_label(report), report.status.as_str()));
        body.push_str(&format!("- compose: `{}`\n", report.compose_file));
        if !report.changed_services.is_empty() {
            body.push_str(&format!("- changed: {}\n", report.changed_services.join(", ")));
        }
        body.push_str(&format!("- message: {}\n", report.message));
        if let Some(ok) = report.verify_ok {
            body.push_str(&format!(
                "- verify: {} ({})\n",
                ok,
                report.verify_message.as_deref().unwrap_or("")
            ));
        }
        if let Some(ok) = report.rollback_verify_ok {
            body.push_str(&format!(
                "- rollback verify: {} ({})\n",
                ok,
                report.rollback_verify_message.as_deref().unwrap_or("")
            ));
        }
        body.push('\n');
    }

    (title, body)
}

/// POST the run summary to the configured webhook. Any network failure is
/// swallowed — notification failure never affects the run's exit status,
/// and the caller never sees an error here.
pub async fn notify(webhook: &reqwest::Url, result: &RunResult, run_timestamp: &str) {
    let (title, text) = render_summary(result, run_timestamp);
    let payload = DingTalkPayload {
        msgtype: "markdown",
        markdown: MarkdownBody { title, text },
    };

    let client = match Client::builder().timeout(REQUEST_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("notifier: failed to build http client: {e}");
            return;
        }
    };

    match client.post(webhook.clone()).json(&payload).send().await {
        Ok(resp) if !resp.status().is_success() => {
            tracing::warn!("notifier: webhook returned status {}", resp.status());
        }
        Err(e) => {
            tracing::warn!("notifier: webhook post failed: {e}");
        }
        _ => {}
    }
}
