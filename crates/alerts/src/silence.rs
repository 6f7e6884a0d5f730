use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use wattsync_core::config::Config;
use wattsync_core::error::{Result, WattError};
use wattsync_core::model::silence::{Matcher, PostableSilence, Silence};

use crate::client::AlertmanagerClient;

/// What a maintenance silence matches and how it is labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SilencePolicy {
    pub alertname_regex: String,
    /// Substring that identifies our silences when listing or removing.
    pub keyword: String,
    pub created_by: String,
}

impl SilencePolicy {
    pub fn new(alertname_regex: &str, keyword: &str, created_by: &str) -> Result<Self> {
        Regex::new(alertname_regex).map_err(|e| {
            WattError::Config(format!("silence_matcher is not a valid regex: {e}"))
        })?;
        if keyword.is_empty() {
            return Err(WattError::Config("silence_keyword must not be empty".to_string()));
        }
        Ok(Self {
            alertname_regex: alertname_regex.to_string(),
            keyword: keyword.to_string(),
            created_by: created_by.to_string(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(
            &cfg.silence_matcher,
            &cfg.silence_keyword,
            &cfg.silence_created_by,
        )
    }
}

pub fn build_silence(policy: &SilencePolicy, duration: Duration, now: DateTime<Utc>) -> Result<PostableSilence> {
    let span = chrono::Duration::from_std(duration)
        .map_err(|e| WattError::InvalidArgument(format!("silence duration out of range: {e}")))?;
    Ok(PostableSilence {
        matchers: vec![Matcher {
            name: "alertname".to_string(),
            value: policy.alertname_regex.clone(),
            is_regex: true,
            is_equal: true,
        }],
        starts_at: now,
        ends_at: now + span,
        created_by: policy.created_by.clone(),
        comment: format!(
            "Backup window silence for {} minutes",
            duration.as_secs().div_ceil(60)
        ),
    })
}

/// Silences with a matcher value containing `keyword`, ignoring case.
pub fn matching_silences<'a>(
    silences: &'a [Silence],
    keyword: &str,
    active_only: bool,
) -> Vec<&'a Silence> {
    let keyword = keyword.to_lowercase();
    silences
        .iter()
        .filter(|s| !active_only || s.is_active())
        .filter(|s| {
            s.matchers
                .iter()
                .any(|m| m.value.to_lowercase().contains(&keyword))
        })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemovalReport {
    pub matched: usize,
    pub removed: Vec<String>,
    pub failed: Vec<String>,
}

impl RemovalReport {
    /// True when nothing needed removing or at least one removal went through.
    pub fn succeeded(&self) -> bool {
        self.matched == 0 || !self.removed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonitorReport {
    pub silence_id: String,
    /// Shutdown arrived before the window elapsed.
    pub interrupted: bool,
    pub removal: RemovalReport,
}

pub struct SilenceManager {
    client: AlertmanagerClient,
    policy: SilencePolicy,
}

impl SilenceManager {
    pub fn new(client: AlertmanagerClient, policy: SilencePolicy) -> Self {
        Self { client, policy }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            AlertmanagerClient::from_config(cfg)?,
            SilencePolicy::from_config(cfg)?,
        ))
    }

    pub fn policy(&self) -> &SilencePolicy {
        &self.policy
    }

    pub async fn create(&self, duration: Duration) -> Result<String> {
        let silence = build_silence(&self.policy, duration, Utc::now())?;
        let id = self.client.create(&silence).await?;
        tracing::info!(silence_id = %id, ends_at = %silence.ends_at, "silence created");
        Ok(id)
    }

    /// Matching silences in any state.
    pub async fn status(&self) -> Result<Vec<Silence>> {
        self.matching(false).await
    }

    pub async fn active(&self) -> Result<Vec<Silence>> {
        self.matching(true).await
    }

    async fn matching(&self, active_only: bool) -> Result<Vec<Silence>> {
        let all = self.client.list().await?;
        Ok(matching_silences(&all, &self.policy.keyword, active_only)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Expires every active matching silence. Individual delete failures are
    /// collected rather than returned.
    pub async fn remove_matching(&self) -> Result<RemovalReport> {
        let targets = self.active().await?;
        let mut report = RemovalReport {
            matched: targets.len(),
            ..RemovalReport::default()
        };
        for silence in targets {
            match self.client.delete(&silence.id).await {
                Ok(()) => {
                    tracing::info!(silence_id = %silence.id, "silence removed");
                    report.removed.push(silence.id);
                }
                Err(e) => {
                    tracing::warn!(silence_id = %silence.id, error = %e, "failed to remove silence");
                    report.failed.push(silence.id);
                }
            }
        }
        if report.matched == 0 {
            tracing::info!(keyword = %self.policy.keyword, "no matching silences");
        }
        Ok(report)
    }

    /// Holds a silence for `duration` or until `shutdown`, then removes
    /// matching silences either way.
    pub async fn monitor<F>(&self, duration: Duration, shutdown: F) -> Result<MonitorReport>
    where
        F: Future<Output = ()>,
    {
        let silence_id = self.create(duration).await?;
        let interrupted = tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = shutdown => {
                tracing::info!("interrupted, removing silence early");
                true
            }
        };
        let removal = self.remove_matching().await?;
        Ok(MonitorReport {
            silence_id,
            interrupted,
            removal,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use testkit::alertmanager::FakeAlertmanager;
    use wattsync_core::model::silence::SilenceStatus;

    use super::*;

    fn policy() -> SilencePolicy {
        let cfg = Config::default();
        SilencePolicy::from_config(&cfg).unwrap()
    }

    fn silence(id: &str, value: &str, state: &str) -> Silence {
        Silence {
            id: id.to_string(),
            matchers: vec![Matcher {
                name: "alertname".to_string(),
                value: value.to_string(),
                is_regex: true,
                is_equal: true,
            }],
            status: SilenceStatus {
                state: state.to_string(),
            },
            comment: String::new(),
            created_by: String::new(),
            starts_at: None,
            ends_at: None,
            updated_at: None,
        }
    }

    fn manager(am: &FakeAlertmanager) -> SilenceManager {
        let client = AlertmanagerClient::new(&am.base_url(), Duration::from_secs(5)).unwrap();
        SilenceManager::new(client, policy())
    }

    #[test]
    fn policy_rejects_bad_regex() {
        let err = SilencePolicy::new("(cpu", "cpu", "me").unwrap_err();
        assert!(matches!(err, WattError::Config(_)));
    }

    #[test]
    fn builds_regex_matcher_for_window() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap();
        let s = build_silence(&policy(), Duration::from_secs(15 * 60), now).unwrap();

        assert_eq!(s.matchers.len(), 1);
        assert_eq!(s.matchers[0].name, "alertname");
        assert_eq!(s.matchers[0].value, ".*CPU.*|.*cpu.*|.*Cpu.*");
        assert!(s.matchers[0].is_regex && s.matchers[0].is_equal);
        assert_eq!(s.starts_at, now);
        assert_eq!(s.ends_at, Utc.with_ymd_and_hms(2025, 3, 1, 2, 15, 0).unwrap());
        assert!(s.comment.contains("15 minutes"));

        let body = serde_json::to_value(&s).unwrap();
        assert_eq!(body["matchers"][0]["isRegex"], true);
        assert_eq!(body["createdBy"], "wattsync backup window");
    }

    #[test]
    fn matching_is_case_insensitive_and_filters_state() {
        let all = vec![
            silence("a", ".*CPU.*", "active"),
            silence("b", "HighCpuLoad", "expired"),
            silence("c", "DiskFull", "active"),
        ];

        let any: Vec<_> = matching_silences(&all, "cpu", false).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(any, vec!["a", "b"]);
        let active: Vec<_> = matching_silences(&all, "CPU", true).iter().map(|s| s.id.as_str()).collect();
        assert_eq!(active, vec!["a"]);
    }

    #[test]
    fn removal_success_rules() {
        assert!(RemovalReport::default().succeeded());
        let partial = RemovalReport {
            matched: 2,
            removed: vec!["a".into()],
            failed: vec!["b".into()],
        };
        assert!(partial.succeeded());
        let none = RemovalReport {
            matched: 1,
            removed: vec![],
            failed: vec!["a".into()],
        };
        assert!(!none.succeeded());
    }

    #[tokio::test]
    async fn create_then_remove() -> anyhow::Result<()> {
        let am = FakeAlertmanager::start().await?;
        am.seed(silence("other", "DiskFull", "active"));
        let mgr = manager(&am);

        let id = mgr.create(Duration::from_secs(600)).await?;
        assert_eq!(mgr.active().await?.len(), 1);

        let report = mgr.remove_matching().await?;
        assert_eq!(report.matched, 1);
        assert_eq!(report.removed, vec![id.clone()]);
        assert!(report.succeeded());
        assert_eq!(am.deleted(), vec![id]);

        // expired silences still show in status
        assert_eq!(mgr.status().await?.len(), 1);
        assert!(mgr.active().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn remove_with_nothing_matching_succeeds() -> anyhow::Result<()> {
        let am = FakeAlertmanager::start().await?;
        let report = manager(&am).remove_matching().await?;
        assert_eq!(report.matched, 0);
        assert!(report.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn failed_deletes_are_reported() -> anyhow::Result<()> {
        let am = FakeAlertmanager::start().await?;
        am.seed(silence("stuck", ".*cpu.*", "active"));
        am.fail_delete("stuck");

        let report = manager(&am).remove_matching().await?;
        assert_eq!(report.failed, vec!["stuck".to_string()]);
        assert!(!report.succeeded());
        Ok(())
    }

    #[tokio::test]
    async fn monitor_cleans_up_after_interrupt() -> anyhow::Result<()> {
        let am = FakeAlertmanager::start().await?;
        let mgr = manager(&am);

        let report = mgr
            .monitor(Duration::from_secs(3600), std::future::ready(()))
            .await?;

        assert!(report.interrupted);
        assert_eq!(report.removal.removed, vec![report.silence_id.clone()]);
        assert!(mgr.active().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn monitor_fails_when_create_is_rejected() -> anyhow::Result<()> {
        let am = FakeAlertmanager::start().await?;
        am.reject_creates(true);
        let mgr = manager(&am);

        let res = mgr
            .monitor(Duration::from_secs(1), std::future::pending())
            .await;
        assert!(res.is_err());
        assert!(am.deleted().is_empty());
        Ok(())
    }
}
