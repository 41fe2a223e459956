//! Append-only JSONL audit log of completed conversations.
//!
//! Each line is one record `{"messages": [...], "functions": [...]}`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::mcp::FunctionDefinition;
use crate::types::Message;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub messages: Vec<Message>,
    pub functions: Vec<FunctionDefinition>,
}

/// Cheap to clone; clones share one write lock so records never interleave.
#[derive(Clone, Debug)]
pub struct AuditLog {
    path: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, creating parent directories as needed.
    pub async fn append(
        &self,
        messages: &[Message],
        functions: &[FunctionDefinition],
    ) -> crate::Result<()> {
        let mut line = serde_json::to_vec(&AuditRecord {
            messages: messages.to_vec(),
            functions: functions.to_vec(),
        })?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || append_line_sync(&path, &line))
            .await
            .map_err(|e| crate::Error::Io(std::io::Error::other(e)))??;
        Ok(())
    }

    /// Reads every record back, skipping lines that do not parse.
    pub async fn read_all(&self) -> crate::Result<Vec<AuditRecord>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "Skipping malformed audit record");
                    None
                }
            })
            .collect())
    }
}

fn append_line_sync(path: &Path, line: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(line)?;
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_append_creates_directories_and_lines() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("nested/logs/audit.jsonl"));

        let functions = vec![FunctionDefinition {
            name: "fs_read".into(),
            description: "Read".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        log.append(&[Message::user("one")], &functions).await.unwrap();
        log.append(&[Message::user("two"), Message::assistant("ok")], &[])
            .await
            .unwrap();

        let records = log.read_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].functions[0].name, "fs_read");
        assert_eq!(records[1].messages.len(), 2);

        let raw = std::fs::read_to_string(log.path()).unwrap();
        let first: serde_json::Value = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
        assert!(first.get("messages").is_some());
        assert!(first.get("functions").is_some());
    }

    #[tokio::test]
    async fn test_read_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("absent.jsonl"));
        assert!(log.read_all().await.unwrap().is_empty());
    }
}
