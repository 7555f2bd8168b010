use crate::core::session::Session;
use crate::domain::ports::{Script, ScriptReport};
use crate::utils::error::{Result, WranglerError};
use crate::utils::monitor::RunMonitor;
use chrono::Utc;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// 單一 script 的執行結果
#[derive(Debug, Clone)]
pub struct ScriptResult {
    pub script_name: String,
    pub report: ScriptReport,
    pub duration: Duration,
}

/// Runs scripts in order against one session. The first failing script
/// aborts the sequence.
pub struct ScriptSequence {
    scripts: Vec<Box<dyn Script>>,
    monitor: Option<RunMonitor>,
    execution_id: String,
}

impl ScriptSequence {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            scripts: Vec::new(),
            monitor: None,
            execution_id: execution_id.into(),
        }
    }

    /// 啟用或禁用系統監控
    pub fn with_monitoring(mut self, enabled: bool) -> Self {
        self.monitor = enabled.then(RunMonitor::new);
        self
    }

    pub fn add_script(&mut self, script: Box<dyn Script>) {
        self.scripts.push(script);
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Run every script. Each script's start and finish are recorded as a
    /// timestamp named after the script, and the session is committed after
    /// each one.
    pub async fn execute_all(&self, session: &mut Session) -> Result<Vec<ScriptResult>> {
        let mut results = Vec::new();

        if let Some(monitor) = &self.monitor {
            monitor.log_sample("start");
        }
        tracing::debug!(
            "Execution {}: {} script(s) queued",
            self.execution_id,
            self.scripts.len()
        );

        for script in &self.scripts {
            let start_time = Instant::now();
            let started_at = Utc::now();
            tracing::info!("🚀 Running script: {}", script.name());

            match script.run(session).await {
                Ok(report) => {
                    let counter = u64::try_from(report.items_processed).ok();
                    session
                        .catalog
                        .update_timestamp(script.name(), Some(started_at), Some(Utc::now()), counter);
                    session.commit().await?;

                    let result = ScriptResult {
                        script_name: script.name().to_string(),
                        report,
                        duration: start_time.elapsed(),
                    };
                    tracing::info!(
                        "✅ Script executed: {} (items: {}, duration: {:?})",
                        result.script_name,
                        result.report.items_processed,
                        result.duration
                    );
                    if let Some(monitor) = &self.monitor {
                        monitor.log_sample(&result.script_name);
                    }
                    results.push(result);
                }
                Err(e) => {
                    tracing::error!("❌ Script execution failed: {}", e);
                    // 連線錯誤與設定錯誤維持原本分類，讓 exit code 正確
                    return Err(match e {
                        WranglerError::ScriptError { .. }
                        | WranglerError::CoverageError { .. }
                        | WranglerError::HttpError(_)
                        | WranglerError::UpstreamError { .. }
                        | WranglerError::ConfigError { .. }
                        | WranglerError::ConfigValidationError { .. }
                        | WranglerError::MissingConfigError { .. }
                        | WranglerError::InvalidConfigValueError { .. }
                        | WranglerError::IoError(_) => e,
                        other => WranglerError::ScriptError {
                            script: script.name().to_string(),
                            details: other.to_string(),
                        },
                    });
                }
            }
        }

        if let Some(monitor) = &self.monitor {
            monitor.log_summary();
        }

        Ok(results)
    }

    /// Totals across a finished run, keyed the way the launcher prints them.
    pub fn get_execution_summary(results: &[ScriptResult]) -> HashMap<String, serde_json::Value> {
        let mut summary = HashMap::new();
        let total_items: usize = results.iter().map(|r| r.report.items_processed).sum();
        let total_failures: usize = results.iter().map(|r| r.report.failures).sum();
        let total_duration: Duration = results.iter().map(|r| r.duration).sum();

        summary.insert("total_scripts".to_string(), serde_json::json!(results.len()));
        summary.insert("total_items".to_string(), serde_json::json!(total_items));
        summary.insert("total_failures".to_string(), serde_json::json!(total_failures));
        summary.insert(
            "total_duration_ms".to_string(),
            serde_json::json!(total_duration.as_millis() as u64),
        );
        summary.insert(
            "scripts".to_string(),
            serde_json::json!(results
                .iter()
                .map(|r| serde_json::json!({
                    "name": r.script_name,
                    "items": r.report.items_processed,
                    "successes": r.report.successes,
                    "failures": r.report.failures,
                    "duration_ms": r.duration.as_millis() as u64,
                }))
                .collect::<Vec<_>>()),
        );
        summary
    }
}
