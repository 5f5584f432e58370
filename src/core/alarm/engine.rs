// src/core/alarm/engine.rs

//! Alarm evaluation: every cycle runs each enabled alarm's query over its
//! time window, compares the match count against the threshold, and pushes
//! triggered alarms through throttling and (optionally) grouping before
//! dispatch. A failing alarm never stops the others.

use super::notifier::Notifier;
use super::{Alarm, AlarmStore, NotificationChannel};
use crate::core::errors::LogLensError;
use crate::core::index::PartitionedIndex;
use crate::core::model::now_millis;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// How often enabled alarms are evaluated.
pub const EVALUATION_INTERVAL: Duration = Duration::from_secs(60);
/// How often pending grouped notifications are examined for delivery.
pub const GROUP_PROCESSING_INTERVAL: Duration = Duration::from_secs(30);
/// Grouping window applied when an alarm does not set its own.
const DEFAULT_GROUPING_WINDOW_MS: i64 = 5 * 60_000;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone)]
struct GroupedTrigger {
    alarm: Alarm,
    triggered_at: i64,
}

/// Outcome of a single alarm evaluation, mostly for tests and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationOutcome {
    NotTriggered,
    Delivered,
    Throttled,
    Grouped,
}

pub struct AlarmEngine {
    store: Arc<AlarmStore>,
    index: Arc<PartitionedIndex>,
    notifier: Arc<dyn Notifier>,
    /// Alarm id -> delivery timestamps within the throttle window. Per-key
    /// mutation happens under the map entry's lock.
    notification_history: DashMap<String, Vec<i64>>,
    /// Grouping key -> triggers waiting for the grouping window to close.
    pending_groups: DashMap<String, Vec<GroupedTrigger>>,
}

impl AlarmEngine {
    pub fn new(
        store: Arc<AlarmStore>,
        index: Arc<PartitionedIndex>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            index,
            notifier,
            notification_history: DashMap::new(),
            pending_groups: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<AlarmStore> {
        &self.store
    }

    /// Evaluates every enabled alarm, isolating per-alarm failures.
    pub async fn evaluate_all(&self) {
        for alarm in self.store.list_enabled() {
            let name = alarm.name.clone();
            if let Err(e) = self.evaluate(alarm).await {
                error!("Evaluation of alarm '{}' failed: {}. Continuing.", name, e);
            }
        }
    }

    /// Evaluates one alarm over `[now - window, now]`.
    pub async fn evaluate(&self, alarm: Alarm) -> Result<EvaluationOutcome, LogLensError> {
        let now = now_millis();
        let window_start = now - i64::from(alarm.time_window_minutes) * MINUTE_MS;
        let matches = self
            .index
            .search(&alarm.query, false, Some(window_start), Some(now));
        let count = matches.len() as u64;

        let Some(op) = parse_condition_operator(&alarm.condition) else {
            warn!(
                "Alarm '{}' has unrecognized condition '{}'; not triggering.",
                alarm.name, alarm.condition
            );
            return Ok(EvaluationOutcome::NotTriggered);
        };
        if !op.compare(count, alarm.threshold) {
            return Ok(EvaluationOutcome::NotTriggered);
        }

        debug!(
            "Alarm '{}' triggered: count {} {} threshold {}.",
            alarm.name,
            count,
            alarm.condition,
            alarm.threshold
        );
        Ok(self.handle_trigger(alarm, count, now).await)
    }

    async fn handle_trigger(&self, alarm: Alarm, count: u64, now: i64) -> EvaluationOutcome {
        if self.is_throttled(&alarm, now) {
            info!(
                "Alarm '{}' suppressed by throttle window ({} max per window).",
                alarm.name, alarm.max_notifications_per_window
            );
            return EvaluationOutcome::Throttled;
        }

        if alarm.grouping_key.as_deref().is_some_and(|k| !k.is_empty()) {
            let key = alarm.grouping_key.clone().unwrap_or_default();
            self.pending_groups
                .entry(key)
                .or_default()
                .push(GroupedTrigger {
                    alarm,
                    triggered_at: now,
                });
            return EvaluationOutcome::Grouped;
        }

        let subject = format!("Alarm triggered: {}", alarm.name);
        let body = render_single(&alarm, count);
        self.dispatch(&alarm.channels, &subject, &body).await;
        self.record_delivery(&alarm.id, now);
        EvaluationOutcome::Delivered
    }

    /// Prunes the alarm's delivery history to the rolling throttle window
    /// and reports whether the per-window budget is spent.
    fn is_throttled(&self, alarm: &Alarm, now: i64) -> bool {
        let Some(window_minutes) = alarm.throttle_window_minutes.filter(|w| *w > 0) else {
            return false;
        };
        let window_start = now - i64::from(window_minutes) * MINUTE_MS;
        let mut history = self.notification_history.entry(alarm.id.clone()).or_default();
        history.retain(|ts| *ts >= window_start);
        history.len() >= alarm.max_notifications_per_window as usize
    }

    fn record_delivery(&self, alarm_id: &str, now: i64) {
        self.notification_history
            .entry(alarm_id.to_string())
            .or_default()
            .push(now);
    }

    /// Delivers pending grouped notifications whose window has closed: one
    /// combined message per group, to the union of the members' channels,
    /// with one history entry per member alarm.
    pub async fn process_groups(&self) {
        let now = now_millis();
        let keys: Vec<String> = self.pending_groups.iter().map(|e| e.key().clone()).collect();

        for key in keys {
            let due = {
                let Some(bucket) = self.pending_groups.get(&key) else {
                    continue;
                };
                let Some(oldest) = bucket.iter().map(|t| t.triggered_at).min() else {
                    continue;
                };
                let window_ms = bucket
                    .iter()
                    .filter_map(|t| t.alarm.grouping_window_minutes)
                    .map(|m| i64::from(m) * MINUTE_MS)
                    .min()
                    .unwrap_or(DEFAULT_GROUPING_WINDOW_MS);
                now - oldest >= window_ms
            };
            if !due {
                continue;
            }

            let Some((_, triggers)) = self.pending_groups.remove(&key) else {
                continue;
            };
            if triggers.is_empty() {
                continue;
            }

            let subject = format!("Grouped alarms: {key}");
            let body = render_group(&key, &triggers);
            let channels: Vec<NotificationChannel> = triggers
                .iter()
                .flat_map(|t| t.alarm.channels.iter().cloned())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();

            self.dispatch(&channels, &subject, &body).await;
            for trigger in &triggers {
                self.record_delivery(&trigger.alarm.id, now);
            }
            info!(
                "Delivered grouped notification '{}' covering {} alarm(s).",
                key,
                triggers.len()
            );
        }
    }

    async fn dispatch(&self, channels: &[NotificationChannel], subject: &str, body: &str) {
        for channel in channels {
            if !self.notifier.send(channel, subject, body).await {
                warn!(
                    "Delivery to {:?} '{}' failed; not retrying.",
                    channel.channel_type, channel.destination
                );
            }
        }
    }

    /// Delivery timestamps currently recorded for an alarm.
    pub fn history_len(&self, alarm_id: &str) -> usize {
        self.notification_history
            .get(alarm_id)
            .map(|h| h.len())
            .unwrap_or(0)
    }

    pub fn pending_group_len(&self, key: &str) -> usize {
        self.pending_groups.get(key).map(|b| b.len()).unwrap_or(0)
    }
}

fn render_single(alarm: &Alarm, count: u64) -> String {
    format!(
        "Alarm '{}' fired: {} match(es) for query '{}' in the last {} minute(s). {}",
        alarm.name, count, alarm.query, alarm.time_window_minutes, alarm.description
    )
    .trim_end()
    .to_string()
}

fn render_group(key: &str, triggers: &[GroupedTrigger]) -> String {
    let mut lines = vec![format!(
        "{} alarm(s) in group '{}' fired:",
        triggers.len(),
        key
    )];
    for trigger in triggers {
        lines.push(format!(
            "- {} (query '{}', threshold {})",
            trigger.alarm.name, trigger.alarm.query, trigger.alarm.threshold
        ));
    }
    lines.join("\n")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConditionOp {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
}

impl ConditionOp {
    fn compare(self, count: u64, threshold: u64) -> bool {
        match self {
            ConditionOp::Gt => count > threshold,
            ConditionOp::Ge => count >= threshold,
            ConditionOp::Lt => count < threshold,
            ConditionOp::Le => count <= threshold,
            ConditionOp::Eq => count == threshold,
        }
    }
}

/// Parses the `count <op>` prefix of a condition string.
fn parse_condition_operator(condition: &str) -> Option<ConditionOp> {
    let mut tokens = condition.split_whitespace();
    if !tokens.next()?.eq_ignore_ascii_case("count") {
        return None;
    }
    match tokens.next()? {
        ">" => Some(ConditionOp::Gt),
        ">=" => Some(ConditionOp::Ge),
        "<" => Some(ConditionOp::Lt),
        "<=" => Some(ConditionOp::Le),
        "=" | "==" => Some(ConditionOp::Eq),
        _ => None,
    }
}

/// The periodic evaluation task.
pub struct AlarmEvaluatorTask {
    engine: Arc<AlarmEngine>,
    interval: Duration,
}

impl AlarmEvaluatorTask {
    pub fn new(engine: Arc<AlarmEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Alarm evaluator started (every {:?}).", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.engine.evaluate_all().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Alarm evaluator shutting down.");
                    return;
                }
            }
        }
    }
}

/// The periodic grouped-delivery task.
pub struct GroupProcessorTask {
    engine: Arc<AlarmEngine>,
    interval: Duration,
}

impl GroupProcessorTask {
    pub fn new(engine: Arc<AlarmEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("Alarm group processor started (every {:?}).", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.engine.process_groups().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("Alarm group processor shutting down.");
                    return;
                }
            }
        }
    }
}
