use crate::core::Update;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, info, warn};

/// Where newline-delimited JSON updates are read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Stdin,
    File(PathBuf),
}

impl std::str::FromStr for Source {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "-" {
            return Ok(Self::Stdin);
        }
        Ok(Self::File(s.into()))
    }
}

impl Source {
    /// Opens the source for reading.
    pub async fn open(self) -> Result<Box<dyn AsyncBufRead + Send + Unpin>> {
        match self {
            Self::Stdin => Ok(Box::new(BufReader::new(io::stdin()))),
            Self::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .with_context(|| format!("failed to open {}", path.display()))?;
                Ok(Box::new(BufReader::new(file)))
            }
        }
    }
}

/// Decodes one update per line and sends it to the processor.
///
/// Lines that can't be decoded are logged and skipped.
pub async fn read_updates<R>(reader: R, tx: mpsc::Sender<Update>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut lineno = 0usize;
    while let Some(line) = lines.next_line().await.context("failed to read updates")? {
        lineno += 1;
        let update = match decode(&line) {
            Ok(Some(update)) => update,
            Ok(None) => continue,
            Err(error) => {
                warn!(line = lineno, %error, "Skipping malformed update");
                continue;
            }
        };
        debug!(line = lineno, kind = update.kind(), "Read update");
        if tx.send(update).await.is_err() {
            debug!("Update processor stopped");
            return Ok(());
        }
    }

    info!(updates = lineno, "Update stream complete");
    Ok(())
}

/// Decodes a single line, ignoring blank lines.
fn decode(line: &str) -> serde_json::Result<Option<Update>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PolicyKey;

    #[tokio::test]
    async fn skips_blank_and_malformed_lines() {
        let input = concat!(
            "{\"kind\": \"policy\", \"key\": {\"name\": \"p1\"}, \"value\": {\"selector\": \"all()\"}}\n",
            "\n",
            "not json\n",
            "{\"kind\": \"policy\", \"key\": {\"name\": \"p1\"}}\n",
            "{\"kind\": \"felix-config\", \"key\": \"x\"}\n",
        );
        let (tx, mut rx) = mpsc::channel(8);
        read_updates(input.as_bytes(), tx).await.unwrap();

        match rx.recv().await {
            Some(Update::Policy {
                key,
                value: Some(policy),
            }) => {
                assert_eq!(key, PolicyKey::named("p1"));
                assert_eq!(policy.selector, "all()");
            }
            update => panic!("unexpected update: {:?}", update),
        }
        assert_eq!(
            rx.recv().await,
            Some(Update::Policy {
                key: PolicyKey::named("p1"),
                value: None,
            })
        );
        assert_eq!(rx.recv().await, Some(Update::Unknown));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn stops_when_receiver_dropped() {
        let input = "{\"kind\": \"profile-rules\", \"key\": \"pr1\"}\n".repeat(4);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        read_updates(input.as_bytes(), tx).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file() {
        let source = Source::File("/nonexistent/updates.json".into());
        let error = source.open().await.err().expect("file must not exist");
        assert_eq!(
            error.to_string(),
            "failed to open /nonexistent/updates.json"
        );
    }

    #[test]
    fn parses_source() {
        assert_eq!("-".parse(), Ok(Source::Stdin));
        assert_eq!(
            "/tmp/updates.json".parse(),
            Ok(Source::File("/tmp/updates.json".into()))
        );
    }
}
