//! Interpreting classifier rankings and handing reports to a display sink.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::info;

/// A top result above this confidence is reported as certain.
pub const DEFAULT_CONFIDENT_THRESHOLD: f32 = 0.9;

/// One ranked candidate from a classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Confident { label: String, confidence: f32 },
    Uncertain { label: String, confidence: f32 },
    NothingFound,
    Failed { message: String },
}

impl Outcome {
    /// Judges a ranking by its first entry. Rankings are best-first.
    pub fn from_ranking(ranking: &[Classification], threshold: f32) -> Self {
        match ranking.first() {
            None => Outcome::NothingFound,
            Some(top) if top.confidence > threshold => Outcome::Confident {
                label: top.label.clone(),
                confidence: top.confidence,
            },
            Some(top) => Outcome::Uncertain {
                label: top.label.clone(),
                confidence: top.confidence,
            },
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Confident { label, confidence } => {
                write!(f, "{label} ({:.1}%)", confidence * 100.0)
            }
            Outcome::Uncertain { label, .. } => write!(f, "{label}?"),
            Outcome::NothingFound => write!(f, "nothing found"),
            Outcome::Failed { message } => write!(f, "failed: {message}"),
        }
    }
}

/// Where a classified image came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Source {
    Frame { seq: u64 },
    Photo { origin: Option<PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub source: Source,
    pub general: Outcome,
    pub healthy: Outcome,
}

/// Receives finished reports.
pub trait ResultSink: Send + Sync {
    fn publish(&self, report: &Report) -> anyhow::Result<()>;
}

/// Writes each report as a log line.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn publish(&self, report: &Report) -> anyhow::Result<()> {
        info!(
            source = ?report.source,
            general = %report.general,
            healthy = %report.healthy,
            "classified"
        );
        Ok(())
    }
}

/// Writes each report as one JSON object per line.
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ResultSink for JsonLinesSink<W> {
    fn publish(&self, report: &Report) -> anyhow::Result<()> {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *out, report)?;
        out.write_all(b"\n")?;
        out.flush()?;
        Ok(())
    }
}

/// Keeps reports in memory so callers can wait for and inspect them.
#[derive(Clone, Default)]
pub struct MemorySink {
    inner: Arc<(Mutex<Vec<Report>>, Condvar)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until at least `count` reports have arrived. Returns false on timeout.
    pub fn wait_for(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (lock, arrived) = &*self.inner;
        let mut reports = lock.lock().unwrap_or_else(PoisonError::into_inner);
        while reports.len() < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = arrived
                .wait_timeout(reports, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            reports = guard;
        }
        true
    }
}

impl ResultSink for MemorySink {
    fn publish(&self, report: &Report) -> anyhow::Result<()> {
        let (lock, arrived) = &*self.inner;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
        arrived.notify_all();
        Ok(())
    }
}
