//! Replay a scripted sequence of snapshots through a live engine.
//!
//! The engine runs against the in-memory recording remote, so the command
//! shows exactly which deliveries, escalations and remote calls a given
//! sequence of snapshots produces.

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;

use crate::cli::output::{list_table, output, render_section, truncate, CommandOutput};
use crate::domain::models::{Config, EngineConfig, Snapshot};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::remote::{InMemoryWorkQueueRemote, RemoteCall};
use crate::services::delivery_sink::{FeedError, FeedPayload};
use crate::services::subscription::subscription_channel;
use crate::services::task_feed::{FeedStats, TaskFeed};

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// YAML or JSON replay script
    pub file: PathBuf,

    /// Tenant to reconcile (overrides config and script)
    #[arg(short, long)]
    pub tenant: Option<String>,
}

/// A replay script.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub tenant_id: Option<String>,

    /// Engine timing for this replay; the loaded configuration otherwise.
    #[serde(default)]
    pub engine: Option<EngineConfig>,

    pub steps: Vec<ReplayStep>,

    /// How long to keep the engine running after the last step.
    #[serde(default)]
    pub settle_ms: Option<u64>,
}

/// One step: wait, then optionally flip connection state and publish a snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplayStep {
    #[serde(default)]
    pub after_ms: u64,
    #[serde(default)]
    pub connected: Option<bool>,
    #[serde(default)]
    pub items: Option<Snapshot>,
}

impl ReplayScript {
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay script {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid replay script {}", path.display()))
    }

    /// Parse YAML (JSON is accepted as a YAML subset).
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryRow {
    pub sequence: u64,
    pub pass: u64,
    pub ids: Vec<String>,
    pub sub_kinds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct EscalationRow {
    pub sequence: u64,
    pub ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorRow {
    pub sequence: u64,
    #[serde(flatten)]
    pub error: FeedError,
}

#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub tenant_id: String,
    pub deliveries: Vec<DeliveryRow>,
    pub escalations: Vec<EscalationRow>,
    pub errors: Vec<ErrorRow>,
    pub remote_calls: Vec<RemoteCall>,
    pub stats: FeedStats,
}

impl CommandOutput for ReplayReport {
    fn to_human(&self) -> String {
        let mut sections = vec![format!("Replay for tenant {}", self.tenant_id)];

        let mut table = list_table(&["seq", "pass", "items"]);
        for row in &self.deliveries {
            let items: Vec<String> = row
                .ids
                .iter()
                .zip(&row.sub_kinds)
                .map(|(id, sub_kind)| format!("{id} ({sub_kind})"))
                .collect();
            table.add_row(vec![
                row.sequence.to_string(),
                row.pass.to_string(),
                truncate(&items.join(", "), 80),
            ]);
        }
        sections.push(render_section("Deliveries", &table, self.deliveries.len()));

        let mut table = list_table(&["seq", "evicted"]);
        for row in &self.escalations {
            table.add_row(vec![row.sequence.to_string(), row.ids.join(", ")]);
        }
        sections.push(render_section("Escalations", &table, self.escalations.len()));

        let mut table = list_table(&["seq", "operation", "ids", "message"]);
        for row in &self.errors {
            table.add_row(vec![
                row.sequence.to_string(),
                row.error.operation.to_string(),
                row.error.ids.join(", "),
                truncate(&row.error.message, 60),
            ]);
        }
        sections.push(render_section("Errors", &table, self.errors.len()));

        let mut table = list_table(&["operation", "ids"]);
        for call in &self.remote_calls {
            table.add_row(vec![call.operation().to_string(), call.ids().join(", ")]);
        }
        sections.push(render_section("Remote calls", &table, self.remote_calls.len()));

        let stats = &self.stats.reconciler;
        sections.push(format!(
            "Passes: {}  superseded: {}  delivered: {}  auto-confirmed: {}  auto-refused: {}  still cached: {}",
            stats.passes_run,
            stats.snapshots_superseded,
            stats.items_delivered,
            stats.auto_confirmed,
            stats.auto_refused,
            self.stats.cached_items,
        ));

        sections.join("\n\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ReplayArgs, config: Config, json_mode: bool) -> Result<()> {
    let script = ReplayScript::from_path(&args.file)?;
    let tenant_id = args
        .tenant
        .or_else(|| script.tenant_id.clone())
        .unwrap_or(config.tenant_id);
    let engine = script.engine.clone().unwrap_or(config.engine);

    let report = run(&tenant_id, &engine, &script).await?;
    output(&report, json_mode);
    Ok(())
}

/// Drive the script through a fresh engine and collect what it produced.
pub async fn run(tenant_id: &str, engine: &EngineConfig, script: &ReplayScript) -> Result<ReplayReport> {
    ConfigLoader::validate_engine(engine).context("Invalid engine settings for replay")?;

    let remote = Arc::new(InMemoryWorkQueueRemote::new());
    let (handle, feed) = subscription_channel();
    let task_feed = TaskFeed::start(tenant_id, engine, remote.clone(), feed);
    let mut events = task_feed.subscribe();

    for (index, step) in script.steps.iter().enumerate() {
        tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
        if let Some(connected) = step.connected {
            handle.set_connected(connected);
        }
        if let Some(ref items) = step.items {
            handle
                .publish(items.clone())
                .with_context(|| format!("Failed to publish step {index}"))?;
            handle.mark_ready();
        }
    }

    let settle = script
        .settle_ms
        .unwrap_or_else(|| engine.debounce_window_ms.saturating_mul(2) + 50);
    tokio::time::sleep(Duration::from_millis(settle)).await;
    task_feed.shutdown().await;

    let mut report = ReplayReport {
        tenant_id: tenant_id.to_string(),
        deliveries: Vec::new(),
        escalations: Vec::new(),
        errors: Vec::new(),
        remote_calls: Vec::new(),
        stats: task_feed.stats().await,
    };

    loop {
        let event = match events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Replay fell behind the delivery sink");
                continue;
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        };
        let sequence = event.sequence.0;
        match event.payload {
            FeedPayload::ItemsDelivered { pass, items } => report.deliveries.push(DeliveryRow {
                sequence,
                pass,
                ids: items.iter().map(|h| h.id().to_string()).collect(),
                sub_kinds: items.iter().map(|h| h.sub_kind().to_string()).collect(),
            }),
            FeedPayload::Escalation { items } => report.escalations.push(EscalationRow {
                sequence,
                ids: items.into_iter().map(|item| item.id).collect(),
            }),
            FeedPayload::ErrorReported(error) => report.errors.push(ErrorRow { sequence, error }),
        }
    }

    report.remote_calls = remote.calls();
    Ok(report)
}
