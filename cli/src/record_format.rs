//! NDJSON observation ingestion: one JSON object per line, read lazily
//! from a file or stdin. Grounded on the teacher's `RecordsIn::reader()`
//! (`record_format.rs`), which wraps `tokio::io::BufReader::lines()` in
//! a `LinesStream` for files and a dedicated blocking-thread channel
//! pump for stdin.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;

use futures::Stream;
use obsdb_common::{FoiId, Instant, Observation, ResultValue};
use serde::Deserialize;
use tokio::fs::File;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{LinesStream, ReceiverStream};

use crate::error::CliError;

#[derive(Debug, Clone)]
pub enum RecordsIn {
    File(PathBuf),
    Stdin,
}

impl RecordsIn {
    pub async fn lines(&self) -> io::Result<Pin<Box<dyn Stream<Item = io::Result<String>> + Send>>> {
        match self {
            RecordsIn::File(path) => {
                let file = File::open(path).await?;
                let stream = LinesStream::new(tokio::io::BufReader::new(file).lines());
                Ok(Box::pin(stream))
            }
            RecordsIn::Stdin => Ok(Box::pin(stdio_lines_stream(std::io::stdin()))),
        }
    }
}

fn stdio_lines_stream<F>(f: F) -> ReceiverStream<io::Result<String>>
where
    F: io::Read + Send + 'static,
{
    use std::io::BufRead;
    let lines = io::BufReader::new(f).lines();
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        for line in lines {
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    ReceiverStream::new(rx)
}

/// One NDJSON line's shape. `result_time` defaults to `phenomenon_time`
/// when omitted, matching the common case of a sensor reporting its
/// reading as soon as it is sampled (spec §3: "resultTime defaults to
/// phenomenonTime when not given" at the ingestion boundary — the store
/// itself always requires both explicitly).
#[derive(Debug, Deserialize)]
pub struct IngestLine {
    pub foi_id: u64,
    pub phenomenon_time_secs: i64,
    #[serde(default)]
    pub phenomenon_time_nanos: u32,
    pub result_time_secs: Option<i64>,
    #[serde(default)]
    pub result_time_nanos: u32,
    pub result: serde_json::Value,
}

impl IngestLine {
    pub fn into_observation(self) -> Result<Observation, serde_json::Error> {
        let phenomenon_time = Instant::at(self.phenomenon_time_secs, self.phenomenon_time_nanos);
        let result_time = match self.result_time_secs {
            Some(secs) => Instant::at(secs, self.result_time_nanos),
            None => phenomenon_time,
        };
        let result: ResultValue = serde_json::from_value(self.result)?;
        Ok(Observation {
            foi_id: FoiId(self.foi_id),
            phenomenon_time,
            result_time,
            result,
        })
    }
}

pub fn parse_line(line_no: u64, line: &str) -> Result<Observation, CliError> {
    let parsed: IngestLine =
        serde_json::from_str(line).map_err(|source| CliError::IngestLine { line: line_no, source })?;
    parsed
        .into_observation()
        .map_err(|source| CliError::IngestLine { line: line_no, source })
}
