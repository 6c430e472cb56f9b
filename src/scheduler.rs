//! Jittered rescheduling of the next run.
//!
//! After a successful publish the next invocation is pushed 1 to 6 hours
//! (uniformly) into the future so posts do not follow a fixed cadence. The
//! target time is written as a one-shot cron rule; the trigger backend either
//! stores it locally ([`FileTrigger`]) or updates an EventBridge rule
//! ([`EventBridgeTrigger`], `aws` feature).

use crate::config::ScheduleConfig;
use crate::error::ScheduleError;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, instrument};

/// A rule definition as handed to the trigger backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggerRule {
    pub name: String,
    pub schedule_expression: String,
    pub enabled: bool,
    pub next_run: DateTime<Utc>,
}

/// Where the next-run rule is stored.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    async fn put_rule(&self, rule: &TriggerRule) -> Result<(), ScheduleError>;
}

/// Cron expression firing once at `at` (minute, hour, day, month, year).
pub fn cron_expression(at: DateTime<Utc>) -> String {
    format!(
        "cron({} {} {} {} ? {})",
        at.minute(),
        at.hour(),
        at.day(),
        at.month(),
        at.year()
    )
}

/// Uniform jitter in `[min_hours, max_hours)`.
pub fn jitter<R: Rng + ?Sized>(rng: &mut R, min_hours: f64, max_hours: f64) -> Duration {
    let hours = if min_hours < max_hours {
        rng.random_range(min_hours..max_hours)
    } else {
        min_hours
    };
    Duration::milliseconds((hours * 3_600_000.0) as i64)
}

pub struct Scheduler {
    trigger: Box<dyn TriggerStore>,
    rule_name: String,
    min_hours: f64,
    max_hours: f64,
}

impl Scheduler {
    pub fn new(trigger: Box<dyn TriggerStore>, config: &ScheduleConfig) -> Self {
        Self {
            trigger,
            rule_name: config.rule_name.clone(),
            min_hours: config.min_hours,
            max_hours: config.max_hours,
        }
    }

    /// Build the rule for a run `now + jitter`.
    pub fn plan<R: Rng + ?Sized>(
        &self,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<TriggerRule, ScheduleError> {
        let delay = jitter(rng, self.min_hours, self.max_hours);
        let next_run = now
            .checked_add_signed(delay)
            .ok_or(ScheduleError::OutOfRange)?;
        Ok(TriggerRule {
            name: self.rule_name.clone(),
            schedule_expression: cron_expression(next_run),
            enabled: true,
            next_run,
        })
    }

    /// Pick the next run time and enable the trigger for it.
    #[instrument(level = "info", skip(self), fields(rule = %self.rule_name))]
    pub async fn reschedule(&self) -> Result<DateTime<Utc>, ScheduleError> {
        let now = Utc::now();
        let rule = self.plan(now, &mut rand::rng())?;
        self.trigger.put_rule(&rule).await?;
        let hours = (rule.next_run - now).num_minutes() as f64 / 60.0;
        info!(
            next_run = %rule.next_run,
            expression = %rule.schedule_expression,
            "Schedule updated. Next run in {hours:.2} hours"
        );
        Ok(rule.next_run)
    }
}

/// Keeps the rule as a JSON document on disk for an external cron shim.
#[derive(Debug, Clone)]
pub struct FileTrigger {
    path: PathBuf,
}

impl FileTrigger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl TriggerStore for FileTrigger {
    async fn put_rule(&self, rule: &TriggerRule) -> Result<(), ScheduleError> {
        let json = serde_json::to_string_pretty(rule)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, json).await?;
        Ok(())
    }
}

/// Updates an EventBridge scheduled rule.
#[cfg(feature = "aws")]
pub struct EventBridgeTrigger {
    client: aws_sdk_eventbridge::Client,
}

#[cfg(feature = "aws")]
impl EventBridgeTrigger {
    pub fn new(client: aws_sdk_eventbridge::Client) -> Self {
        Self { client }
    }
}

#[cfg(feature = "aws")]
#[async_trait]
impl TriggerStore for EventBridgeTrigger {
    async fn put_rule(&self, rule: &TriggerRule) -> Result<(), ScheduleError> {
        use aws_sdk_eventbridge::types::RuleState;

        let state = if rule.enabled {
            RuleState::Enabled
        } else {
            RuleState::Disabled
        };
        self.client
            .put_rule()
            .name(&rule.name)
            .schedule_expression(&rule.schedule_expression)
            .state(state)
            .send()
            .await
            .map_err(|e| ScheduleError::Service(e.into_service_error().to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::{Arc, Mutex};

    /// Captures rules instead of storing them.
    #[derive(Clone, Default)]
    pub struct RecordingTrigger {
        pub rules: Arc<Mutex<Vec<TriggerRule>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl TriggerStore for RecordingTrigger {
        async fn put_rule(&self, rule: &TriggerRule) -> Result<(), ScheduleError> {
            if self.fail {
                return Err(ScheduleError::Service("rule update refused".to_string()));
            }
            self.rules.lock().unwrap().push(rule.clone());
            Ok(())
        }
    }

    #[test]
    fn test_cron_expression_fields() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 14, 5, 0).unwrap();
        assert_eq!(cron_expression(at), "cron(5 14 7 3 ? 2026)");
    }

    #[test]
    fn test_jitter_within_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..500 {
            let d = jitter(&mut rng, 1.0, 6.0);
            assert!(d >= Duration::hours(1));
            assert!(d < Duration::hours(6));
        }
    }

    #[test]
    fn test_plan_targets_configured_rule() {
        let scheduler = Scheduler::new(Box::new(RecordingTrigger::default()), &ScheduleConfig::default());
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 22, 0, 0).unwrap();
        let rule = scheduler.plan(now, &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(rule.name, "random-poster");
        assert!(rule.enabled);
        assert!(rule.next_run > now);
        assert_eq!(rule.schedule_expression, cron_expression(rule.next_run));
    }

    #[tokio::test]
    async fn test_reschedule_puts_rule() {
        let trigger = RecordingTrigger::default();
        let scheduler = Scheduler::new(Box::new(trigger.clone()), &ScheduleConfig::default());

        let before = Utc::now();
        let next = scheduler.reschedule().await.unwrap();

        let rules = trigger.rules.lock().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].next_run, next);
        assert!(next >= before + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_file_trigger_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        let rule = TriggerRule {
            name: "random-poster".to_string(),
            schedule_expression: "cron(0 12 1 1 ? 2027)".to_string(),
            enabled: true,
            next_run: Utc.with_ymd_and_hms(2027, 1, 1, 12, 0, 0).unwrap(),
        };

        FileTrigger::new(&path).put_rule(&rule).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["name"], "random-poster");
        assert_eq!(written["schedule_expression"], "cron(0 12 1 1 ? 2027)");
        assert_eq!(written["enabled"], true);
    }
}
