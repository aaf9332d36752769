use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::event::{MutationBatch, MutationRecord};

#[derive(Deserialize)]
#[serde(untagged)]
enum LogLine {
    Batch(Vec<MutationRecord>),
    Single(MutationRecord),
}

/// Parses one mutation log line. Blank lines give `None`.
pub fn parse_line(line: &str) -> Result<Option<MutationBatch>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let batch = match serde_json::from_str::<LogLine>(line)? {
        LogLine::Batch(records) => records,
        LogLine::Single(record) => vec![record],
    };
    Ok(Some(batch))
}

/// Feeds recorded notification batches from a mutation log into a session.
pub struct Replay {
    path: PathBuf,
    cancellation_token: CancellationToken,
    task_handle: Option<JoinHandle<Result<usize>>>,
}

impl Replay {
    pub fn new(path: PathBuf, cancellation_token: CancellationToken) -> Self {
        Self {
            path,
            cancellation_token,
            task_handle: None,
        }
    }

    /// Starts reading the log on a background task. The sender is dropped
    /// when the log is exhausted, which closes the session's stream.
    pub fn start(&mut self, sender: Sender<MutationBatch>) {
        info!("Starting mutation replay from {}", self.path.display());
        let path = self.path.clone();
        let cancel_token = self.cancellation_token.child_token();

        self.task_handle = Some(tokio::spawn(async move {
            Self::replay_task(path, sender, cancel_token).await
        }));
    }

    async fn replay_task(
        path: PathBuf,
        sender: Sender<MutationBatch>,
        cancel_token: CancellationToken,
    ) -> Result<usize> {
        let file = File::open(&path)
            .await
            .with_context(|| format!("Failed to open mutation log {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let mut buf = Vec::new();
        let mut line_no = 0;
        let mut sent = 0;

        loop {
            buf.clear();
            let read = tokio::select! {
                read = reader.read_until(b'\n', &mut buf) => read.context("Failed to read mutation log")?,
                _ = cancel_token.cancelled() => {
                    info!("Replay cancelled after {} batches", sent);
                    break;
                }
            };
            if read == 0 {
                break;
            }
            line_no += 1;

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Skipping mutation log line {} with invalid UTF-8: {}", line_no, e);
                    continue;
                }
            };

            let batch = match parse_line(line) {
                Ok(Some(batch)) => batch,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Skipping malformed mutation log line {}: {}", line_no, e);
                    continue;
                }
            };

            debug!("Replaying line {} ({} records)", line_no, batch.len());
            if sender.send(batch).await.is_err() {
                warn!("Session stopped listening, ending replay");
                break;
            }
            sent += 1;
        }

        info!("Replay finished: {} batches sent", sent);
        Ok(sent)
    }

    /// Waits for the replay task and returns the number of batches sent.
    pub async fn finish(&mut self) -> Result<usize> {
        match self.task_handle.take() {
            Some(handle) => handle.await.context("Replay task panicked")?,
            None => {
                warn!("No replay to finish");
                Ok(0)
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Replay {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("Replay dropped while still running, sending cancellation signal");
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ElementId;
    use crate::event::MutationKind;
    use std::io::Write;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_batch_line() {
        let batch = parse_line(
            r#"[{"target": 2, "type": "attributes", "attributeName": "src", "value": "/1.jpg"},
                {"target": 2, "type": "childList"}]"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].target, ElementId(2));
        assert_eq!(batch[1].kind, MutationKind::ChildList);
    }

    #[test]
    fn test_parse_single_record_line() {
        let batch = parse_line(r#"{"target": 0, "type": "attributes", "attributeName": "src"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(batch, vec![MutationRecord::attribute(ElementId(0), "src", None)]);
    }

    #[test]
    fn test_parse_blank_and_malformed() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("{not json").is_err());
        assert!(parse_line(r#"{"target": 0, "type": "resize"}"#).is_err());
    }

    #[tokio::test]
    async fn test_replay_file() {
        let mut log = tempfile::NamedTempFile::new().unwrap();
        writeln!(log, r#"{{"target": 1, "type": "attributes", "attributeName": "src", "value": "/a.jpg"}}"#).unwrap();
        writeln!(log).unwrap();
        writeln!(log, "garbage").unwrap();
        writeln!(log, r#"[{{"target": 1, "type": "attributes", "attributeName": "src", "value": "/b.jpg"}}]"#).unwrap();
        log.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut replay = Replay::new(log.path().to_path_buf(), CancellationToken::new());
        replay.start(tx);

        let mut batches = Vec::new();
        while let Some(batch) = rx.recv().await {
            batches.push(batch);
        }
        assert_eq!(replay.finish().await.unwrap(), 2);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1][0].value.as_deref(), Some("/b.jpg"));
    }

    #[tokio::test]
    async fn test_replay_skips_invalid_utf8_line() {
        let mut log = tempfile::NamedTempFile::new().unwrap();
        writeln!(log, r#"{{"target": 1, "type": "attributes", "attributeName": "src", "value": "/a.jpg"}}"#).unwrap();
        log.write_all(b"\xff\xfe garbage\n").unwrap();
        write!(log, r#"{{"target": 1, "type": "attributes", "attributeName": "src", "value": "/b.jpg"}}"#).unwrap();
        log.flush().unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let mut replay = Replay::new(log.path().to_path_buf(), CancellationToken::new());
        replay.start(tx);

        let mut values = Vec::new();
        while let Some(batch) = rx.recv().await {
            values.extend(batch.into_iter().filter_map(|record| record.value));
        }
        assert_eq!(replay.finish().await.unwrap(), 2);
        assert_eq!(values, ["/a.jpg", "/b.jpg"]);
    }

    #[tokio::test]
    async fn test_replay_missing_file() {
        let (tx, _rx) = mpsc::channel(1);
        let mut replay = Replay::new(PathBuf::from("/nonexistent/mutations.jsonl"), CancellationToken::new());
        replay.start(tx);
        assert!(replay.finish().await.is_err());
    }
}
