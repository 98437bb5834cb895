//! Scoped profiling session with render-on-release
//!
//! `ReportGuard` owns the recorder for one profiling scope. The recorder is
//! created by the first enter event; when the guard is finished (explicitly
//! or by `Drop`), the tree rooted at the recorder's cursor is rendered to the
//! sink exactly once and only then released. A guard that never saw an
//! enter event writes nothing.

use crate::call_node::CallSiteId;
use crate::config::{ProfilerConfig, ReportFormat};
use crate::error::Result;
use crate::event::Event;
use crate::recorder::Recorder;
use crate::render::{Renderer, UnresolvedPolicy};
use crate::symbols::SymbolResolver;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, error, trace};

/// Write-once destination of the final report
pub enum ReportSink {
    /// Create (or truncate) a file
    File(PathBuf),
    Stdout,
    Stderr,
    /// Caller-supplied writer
    Writer(Box<dyn Write + Send>),
}

impl ReportSink {
    /// Write the complete report and flush
    fn write_report(self, report: &[u8]) -> io::Result<()> {
        match self {
            ReportSink::File(path) => {
                let mut out = BufWriter::new(File::create(&path)?);
                out.write_all(report)?;
                out.flush()
            }
            ReportSink::Stdout => {
                let mut out = io::stdout().lock();
                out.write_all(report)?;
                out.flush()
            }
            ReportSink::Stderr => {
                let mut out = io::stderr().lock();
                out.write_all(report)?;
                out.flush()
            }
            ReportSink::Writer(mut out) => {
                out.write_all(report)?;
                out.flush()
            }
        }
    }
}

impl fmt::Debug for ReportSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportSink::File(path) => f.debug_tuple("File").field(path).finish(),
            ReportSink::Stdout => f.write_str("Stdout"),
            ReportSink::Stderr => f.write_str("Stderr"),
            ReportSink::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Owns one recording and renders it exactly once when released
pub struct ReportGuard<R: SymbolResolver> {
    recorder: Option<Recorder>,
    resolver: R,
    format: ReportFormat,
    unresolved: UnresolvedPolicy,
    /// Taken by the first finalization
    sink: Option<ReportSink>,
}

impl<R: SymbolResolver> ReportGuard<R> {
    /// Guard rendering text with the pruning policy
    pub fn new(resolver: R, sink: ReportSink) -> Self {
        Self {
            recorder: None,
            resolver,
            format: ReportFormat::default(),
            unresolved: UnresolvedPolicy::default(),
            sink: Some(sink),
        }
    }

    /// Guard writing to the configured file in the configured format
    pub fn from_config(resolver: R, config: &ProfilerConfig) -> Self {
        Self::new(resolver, ReportSink::File(config.output.clone()))
            .with_format(config.format)
            .with_unresolved(config.unresolved)
    }

    pub fn with_format(mut self, format: ReportFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_unresolved(mut self, unresolved: UnresolvedPolicy) -> Self {
        self.unresolved = unresolved;
        self
    }

    /// Record a function entry, creating the recorder on first use
    pub fn enter(&mut self, timestamp: u64, site: CallSiteId) {
        self.recorder
            .get_or_insert_with(|| {
                debug!(%site, "first call event, starting recorder");
                Recorder::new()
            })
            .enter(timestamp, site);
    }

    /// Record a function exit; ignored before the first entry
    pub fn leave(&mut self, timestamp: u64) {
        match self.recorder.as_mut() {
            Some(recorder) => recorder.leave(timestamp),
            None => trace!(timestamp, "leave before recorder exists ignored"),
        }
    }

    pub fn apply(&mut self, event: Event) {
        match event {
            Event::Enter { time, site } => self.enter(time, site),
            Event::Leave { time } => self.leave(time),
        }
    }

    pub fn replay<I: IntoIterator<Item = Event>>(&mut self, events: I) {
        for event in events {
            self.apply(event);
        }
    }

    /// The live recorder, `None` until the first entry
    pub fn recorder(&self) -> Option<&Recorder> {
        self.recorder.as_ref()
    }

    /// Render, write and release now
    ///
    /// Returns `true` if a report was written, `false` if nothing was
    /// recorded.
    pub fn finish(mut self) -> Result<bool> {
        self.finalize()
    }

    fn finalize(&mut self) -> Result<bool> {
        let Some(sink) = self.sink.take() else {
            return Ok(false);
        };
        let Some(recorder) = self.recorder.take() else {
            debug!("no call events recorded, skipping report");
            return Ok(false);
        };
        let Some(from) = recorder.report_root() else {
            return Ok(false);
        };

        let mut report = Vec::new();
        Renderer::new(&self.resolver)
            .with_policy(self.unresolved)
            .render(self.format, recorder.tree(), from, &mut report)?;

        debug!(
            nodes = recorder.tree().len(),
            bytes = report.len(),
            sink = ?sink,
            "writing call tree report"
        );
        sink.write_report(&report)?;

        // The tree is released only after the report is out
        drop(recorder);
        Ok(true)
    }
}

impl<R: SymbolResolver> Drop for ReportGuard<R> {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            error!("Failed to write call tree report: {}", e);
        }
    }
}

impl<R: SymbolResolver> fmt::Debug for ReportGuard<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportGuard")
            .field("recorder", &self.recorder)
            .field("format", &self.format)
            .field("unresolved", &self.unresolved)
            .field("sink", &self.sink)
            .finish()
    }
}
