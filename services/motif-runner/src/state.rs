//! State Management - Write "chatty" state files for observability
//!
//! ```text
//! <dir>/state/<bot>.json                   latest snapshot, overwritten each cycle
//! <dir>/journal/decisions/<date>.jsonl     one line per decision, append-only
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::risk::{PerformanceMetrics, Position};

/// Manages state files for observability
pub struct StateManager {
    state_dir: PathBuf,
    journal_dir: PathBuf,
}

/// Current status of one bot (state/<bot>.json)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NowState {
    pub bot: String,
    pub timestamp: DateTime<Utc>,
    pub status: BotStatus,
    pub cycles: u64,
    pub balance: f64,
    pub open_positions: Vec<Position>,
    pub metrics: PerformanceMetrics,
    pub last_decision: Option<serde_json::Value>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotStatus {
    Starting,
    Running,
    Skipped,
    Error,
    Stopped,
}

/// One journal line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub bot: String,
    pub timestamp: DateTime<Utc>,
    pub decision: serde_json::Value,
}

impl StateManager {
    pub fn new(workspace_dir: impl AsRef<Path>) -> Self {
        let base = workspace_dir.as_ref();
        Self {
            state_dir: base.join("state"),
            journal_dir: base.join("journal").join("decisions"),
        }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.state_dir).await?;
        fs::create_dir_all(&self.journal_dir).await?;
        Ok(())
    }

    pub fn state_path(&self, bot: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", bot))
    }

    pub fn journal_path(&self, date: DateTime<Utc>) -> PathBuf {
        self.journal_dir
            .join(format!("{}.jsonl", date.format("%Y-%m-%d")))
    }

    /// Replace the bot's snapshot; written to a temp file and renamed
    pub async fn write_now(&self, state: &NowState) -> anyhow::Result<()> {
        let path = self.state_path(&state.bot);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(state)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;
        debug!("Wrote {}", path.display());
        Ok(())
    }

    pub async fn read_now(&self, bot: &str) -> anyhow::Result<Option<NowState>> {
        let path = self.state_path(bot);
        match fs::read_to_string(&path).await {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn append_journal(&self, entry: &JournalEntry) -> anyhow::Result<()> {
        let path = self.journal_path(entry.timestamp);
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now_state(bot: &str) -> NowState {
        NowState {
            bot: bot.to_string(),
            timestamp: Utc::now(),
            status: BotStatus::Running,
            cycles: 3,
            balance: 10_000.0,
            open_positions: Vec::new(),
            metrics: PerformanceMetrics::default(),
            last_decision: Some(serde_json::json!({ "action": "NEUTRAL" })),
            last_error: None,
        }
    }

    #[tokio::test]
    async fn test_write_and_read_now() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path());
        manager.init().await.unwrap();

        assert!(manager.read_now("single").await.unwrap().is_none());

        let state = now_state("single");
        manager.write_now(&state).await.unwrap();
        let read = manager.read_now("single").await.unwrap().unwrap();
        assert_eq!(read, state);
        assert!(dir.path().join("state").join("single.json").exists());
        assert!(!dir.path().join("state").join("single.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_journal_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StateManager::new(dir.path());
        manager.init().await.unwrap();

        let timestamp = Utc::now();
        for i in 0..3 {
            manager
                .append_journal(&JournalEntry {
                    bot: "rotation".to_string(),
                    timestamp,
                    decision: serde_json::json!({ "n": i }),
                })
                .await
                .unwrap();
        }

        let content = std::fs::read_to_string(manager.journal_path(timestamp)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: JournalEntry = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last.decision["n"], 2);
    }
}
