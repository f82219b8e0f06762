//! Probe runs: open one library, resolve a list of symbols, close it, and
//! record every step both as a machine-readable report and as JSONL entries.

use std::time::Instant;

use dlbind_abi::{DlError, Library, Mode};
use dlbind_core::config::safety_level;
use dlbind_core::{default_mode, library_file_name};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::structured_log::{LogEntry, LogLevel, Outcome, TraceSequence};

/// What to probe.
#[derive(Debug, Clone)]
pub struct ProbePlan {
    /// Library to open; `None` probes the main program.
    pub library: Option<String>,
    /// Append the platform suffix (`.so`, `.dylib`) when missing.
    pub append_suffix: bool,
    /// Mode to open with; `None` uses the configured default.
    pub mode: Option<Mode>,
    pub symbols: Vec<String>,
    pub run_id: String,
}

impl ProbePlan {
    #[must_use]
    pub fn new(library: Option<String>, run_id: impl Into<String>) -> Self {
        Self {
            library,
            append_suffix: false,
            mode: None,
            symbols: Vec::new(),
            run_id: run_id.into(),
        }
    }

    #[must_use]
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.symbols.extend(symbols.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn with_suffix(mut self, append: bool) -> Self {
        self.append_suffix = append;
        self
    }

    /// Library name as the loader will see it.
    #[must_use]
    pub fn resolved_library(&self) -> Option<String> {
        self.library.as_deref().map(|name| {
            if self.append_suffix {
                library_file_name(name)
            } else {
                name.to_string()
            }
        })
    }
}

/// Result of resolving one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolProbe {
    pub name: String,
    /// Hex address on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SymbolProbe {
    #[must_use]
    pub fn resolved(&self) -> bool {
        self.error.is_none()
    }
}

/// Machine-readable probe report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeReport {
    pub run_id: String,
    /// Library as handed to the loader; `None` for the main program.
    pub library: Option<String>,
    pub safety_level: String,
    pub requested_flags: i32,
    /// Flags after hardened repair; absent if the open failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_flags: Option<i32>,
    pub opened: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_error: Option<String>,
    pub symbols: Vec<SymbolProbe>,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_error: Option<String>,
}

impl ProbeReport {
    /// True when the library opened, every symbol resolved, and it closed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.opened && self.closed && self.symbols.iter().all(SymbolProbe::resolved)
    }

    /// One-line description of the first failure, if any.
    #[must_use]
    pub fn failure_summary(&self) -> Option<String> {
        if let Some(err) = &self.open_error {
            return Some(err.clone());
        }
        let unresolved: Vec<&str> = self
            .symbols
            .iter()
            .filter(|s| !s.resolved())
            .map(|s| s.name.as_str())
            .collect();
        if !unresolved.is_empty() {
            return Some(format!("unresolved symbols: {}", unresolved.join(", ")));
        }
        self.close_error.clone()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// A finished probe: the report plus the JSONL entries describing it.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub report: ProbeReport,
    pub entries: Vec<LogEntry>,
}

struct Recorder {
    trace: TraceSequence,
    mode: &'static str,
    library: Option<String>,
    entries: Vec<LogEntry>,
}

impl Recorder {
    fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        LogEntry::new(self.trace.next_id(), level, event)
            .with_mode(self.mode)
            .with_library(self.library.as_deref())
    }

    fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

/// Run `plan` against the real loader.
///
/// Loader failures are part of the report, not errors: a probe that finds a
/// missing library has still done its job.
#[must_use]
pub fn run_probe(plan: &ProbePlan) -> ProbeOutcome {
    let level = safety_level();
    let library = plan.resolved_library();
    let mode = plan.mode.unwrap_or_else(default_mode);

    let mut rec = Recorder {
        trace: TraceSequence::new(plan.run_id.clone()),
        mode: level.as_str(),
        library: library.clone(),
        entries: Vec::new(),
    };
    let mut report = ProbeReport {
        run_id: plan.run_id.clone(),
        library: library.clone(),
        safety_level: level.as_str().to_string(),
        requested_flags: mode.bits(),
        effective_flags: None,
        opened: false,
        open_error: None,
        symbols: Vec::new(),
        closed: false,
        close_error: None,
    };

    let start = rec
        .entry(LogLevel::Info, "probe_start")
        .with_details(serde_json::json!({ "symbols": plan.symbols }));
    rec.push(start);

    let started = Instant::now();
    let opened = Library::open(library.as_deref(), mode);
    let open_ns = elapsed_ns(started);

    let lib = match opened {
        Ok(lib) => lib,
        Err(err) => {
            warn!(library = library.as_deref(), %err, "probe open failed");
            let entry = rec
                .entry(LogLevel::Warn, "dlopen")
                .with_flags(mode.bits())
                .with_outcome(Outcome::Fail)
                .with_message(err.message())
                .with_latency_ns(open_ns);
            rec.push(entry);
            report.open_error = Some(err.message());
            report.symbols = plan
                .symbols
                .iter()
                .map(|name| SymbolProbe {
                    name: name.clone(),
                    address: None,
                    error: Some("library not opened".to_string()),
                })
                .collect();
            finish(&mut rec, &report);
            return ProbeOutcome {
                report,
                entries: rec.entries,
            };
        }
    };

    report.opened = true;
    report.effective_flags = Some(lib.mode().bits());
    let entry = rec
        .entry(LogLevel::Info, "dlopen")
        .with_flags(lib.mode().bits())
        .with_outcome(Outcome::Pass)
        .with_address(lib.as_raw() as usize)
        .with_latency_ns(open_ns);
    rec.push(entry);

    for name in &plan.symbols {
        let started = Instant::now();
        let result = lib.get(name).map(|sym| sym.as_ptr() as usize);
        let ns = elapsed_ns(started);
        let entry = rec.entry(LogLevel::Info, "dlsym").with_symbol(name.clone());
        match result {
            Ok(addr) => {
                rec.push(
                    entry
                        .with_outcome(Outcome::Pass)
                        .with_address(addr)
                        .with_latency_ns(ns),
                );
                report.symbols.push(SymbolProbe {
                    name: name.clone(),
                    address: Some(format!("{addr:#x}")),
                    error: None,
                });
            }
            Err(err) => {
                let message = symbol_message(&err);
                let mut entry = entry
                    .with_outcome(Outcome::Fail)
                    .with_message(message.clone())
                    .with_latency_ns(ns);
                entry.level = LogLevel::Warn;
                rec.push(entry);
                report.symbols.push(SymbolProbe {
                    name: name.clone(),
                    address: None,
                    error: Some(message),
                });
            }
        }
    }

    let started = Instant::now();
    let closed = lib.close();
    let close_ns = elapsed_ns(started);
    let entry = rec.entry(LogLevel::Info, "dlclose").with_latency_ns(close_ns);
    match closed {
        Ok(()) => {
            report.closed = true;
            rec.push(entry.with_outcome(Outcome::Pass));
        }
        Err(err) => {
            report.close_error = Some(err.message());
            rec.push(entry.with_outcome(Outcome::Fail).with_message(err.message()));
        }
    }

    finish(&mut rec, &report);
    ProbeOutcome {
        report,
        entries: rec.entries,
    }
}

fn symbol_message(err: &DlError) -> String {
    let message = err.message();
    if message.is_empty() {
        dlbind_core::dlfcn::ERR_SYMBOL_NOT_FOUND.to_string()
    } else {
        message
    }
}

fn finish(rec: &mut Recorder, report: &ProbeReport) {
    let passed = report.all_passed();
    info!(
        run_id = %report.run_id,
        passed,
        resolved = report.symbols.iter().filter(|s| s.resolved()).count(),
        total = report.symbols.len(),
        "probe finished"
    );
    let mut entry = rec
        .entry(LogLevel::Info, "probe_end")
        .with_outcome(if passed { Outcome::Pass } else { Outcome::Fail });
    if let Some(summary) = report.failure_summary() {
        entry = entry.with_message(summary);
    }
    rec.push(entry);
}
