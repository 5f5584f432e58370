// src/core/alarm/mod.rs

//! Alarm definitions and the CRUD store. Evaluation, throttling, and
//! grouping live in `engine`; channel dispatch in `notifier`.

pub mod engine;
pub mod notifier;

use crate::core::errors::LogLensError;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    Email,
    Slack,
    Webhook,
    Pagerduty,
    Opsgenie,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationChannel {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alarm {
    /// Generated when absent so API clients can omit it on create.
    #[serde(default = "generate_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    /// `count <op>` where op is one of `> >= < <= = ==`; the match count is
    /// compared against `threshold`.
    pub condition: String,
    pub threshold: u64,
    pub time_window_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throttle_window_minutes: Option<u32>,
    #[serde(default = "default_max_notifications")]
    pub max_notifications_per_window: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_window_minutes: Option<u32>,
    #[serde(default)]
    pub channels: Vec<NotificationChannel>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn default_max_notifications() -> u32 {
    1
}

fn default_enabled() -> bool {
    true
}

impl Alarm {
    pub fn new(
        name: impl Into<String>,
        query: impl Into<String>,
        condition: impl Into<String>,
        threshold: u64,
        time_window_minutes: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: String::new(),
            query: query.into(),
            condition: condition.into(),
            threshold,
            time_window_minutes,
            throttle_window_minutes: None,
            max_notifications_per_window: default_max_notifications(),
            grouping_key: None,
            grouping_window_minutes: None,
            channels: Vec::new(),
            enabled: true,
        }
    }

    fn validate(&self) -> Result<(), LogLensError> {
        if self.name.trim().is_empty() {
            return Err(LogLensError::Validation("alarm name cannot be empty".into()));
        }
        if self.query.trim().is_empty() {
            return Err(LogLensError::Validation("alarm query cannot be empty".into()));
        }
        if self.condition.trim().is_empty() {
            return Err(LogLensError::Validation(
                "alarm condition cannot be empty".into(),
            ));
        }
        if self.time_window_minutes == 0 {
            return Err(LogLensError::Validation(
                "timeWindowMinutes must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/// In-memory alarm registry keyed by id, with unique names.
#[derive(Default)]
pub struct AlarmStore {
    alarms: DashMap<String, Alarm>,
}

impl AlarmStore {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn create(&self, alarm: Alarm) -> Result<Alarm, LogLensError> {
        alarm.validate()?;
        if self
            .alarms
            .iter()
            .any(|e| e.name == alarm.name && e.id != alarm.id)
        {
            return Err(LogLensError::Conflict(format!(
                "alarm '{}' already exists",
                alarm.name
            )));
        }
        self.alarms.insert(alarm.id.clone(), alarm.clone());
        Ok(alarm)
    }

    pub fn update(&self, alarm: Alarm) -> Result<Alarm, LogLensError> {
        alarm.validate()?;
        if !self.alarms.contains_key(&alarm.id) {
            return Err(LogLensError::NotFound(format!("alarm '{}'", alarm.id)));
        }
        if self
            .alarms
            .iter()
            .any(|e| e.name == alarm.name && e.id != alarm.id)
        {
            return Err(LogLensError::Conflict(format!(
                "alarm '{}' already exists",
                alarm.name
            )));
        }
        self.alarms.insert(alarm.id.clone(), alarm.clone());
        Ok(alarm)
    }

    pub fn delete(&self, id: &str) -> Result<(), LogLensError> {
        self.alarms
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| LogLensError::NotFound(format!("alarm '{id}'")))
    }

    pub fn get(&self, id: &str) -> Option<Alarm> {
        self.alarms.get(id).map(|a| a.clone())
    }

    pub fn find_by_name(&self, name: &str) -> Option<Alarm> {
        self.alarms.iter().find(|e| e.name == name).map(|e| e.clone())
    }

    pub fn list(&self) -> Vec<Alarm> {
        let mut all: Vec<Alarm> = self.alarms.iter().map(|e| e.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn list_enabled(&self) -> Vec<Alarm> {
        self.list().into_iter().filter(|a| a.enabled).collect()
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<(), LogLensError> {
        let mut alarm = self
            .alarms
            .get_mut(id)
            .ok_or_else(|| LogLensError::NotFound(format!("alarm '{id}'")))?;
        alarm.enabled = enabled;
        Ok(())
    }

    /// Creates the alarm if the name is unknown, otherwise updates the
    /// existing definition in place. Used by the system-health alarms.
    pub fn upsert_by_name(&self, mut alarm: Alarm) -> Result<Alarm, LogLensError> {
        if let Some(existing) = self.find_by_name(&alarm.name) {
            alarm.id = existing.id;
            self.update(alarm)
        } else {
            self.create(alarm)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_validates_fields() {
        let store = AlarmStore::new();
        assert!(store.create(Alarm::new("", "q", "count >", 0, 1)).is_err());
        assert!(store.create(Alarm::new("a", "", "count >", 0, 1)).is_err());
        assert!(store.create(Alarm::new("a", "q", "", 0, 1)).is_err());
        assert!(store.create(Alarm::new("a", "q", "count >", 0, 0)).is_err());
        assert!(store.create(Alarm::new("a", "q", "count >", 0, 1)).is_ok());
    }

    #[test]
    fn names_are_unique() {
        let store = AlarmStore::new();
        store.create(Alarm::new("dup", "q", "count >", 0, 1)).unwrap();
        assert!(matches!(
            store.create(Alarm::new("dup", "q2", "count >", 0, 1)),
            Err(LogLensError::Conflict(_))
        ));
    }

    #[test]
    fn upsert_by_name_replaces_existing() {
        let store = AlarmStore::new();
        let first = store
            .create(Alarm::new("cpu", "cpu", "count >", 0, 1))
            .unwrap();
        let mut replacement = Alarm::new("cpu", "cpu usage", "count >=", 5, 2);
        replacement = store.upsert_by_name(replacement).unwrap();
        assert_eq!(replacement.id, first.id);
        assert_eq!(store.list().len(), 1);
        assert_eq!(store.get(&first.id).unwrap().threshold, 5);
    }

    #[test]
    fn disabled_alarms_are_filtered() {
        let store = AlarmStore::new();
        let alarm = store.create(Alarm::new("a", "q", "count >", 0, 1)).unwrap();
        store.set_enabled(&alarm.id, false).unwrap();
        assert!(store.list_enabled().is_empty());
        assert_eq!(store.list().len(), 1);
    }
}
