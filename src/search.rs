use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use chrono::Utc;
use crate::LogRecord;
use crate::error::SearchError;
use crate::matcher::{self, ExeTarget, MatchReason, MatchResult};
use crate::reader;
use crate::report::{self, ClassifiedEntry, SearchReport, SearchStatus};
use crate::rules;

pub const DAY_WINDOWS: [u8; 4] = [2, 3, 7, 14];
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub executable_path: PathBuf,
    pub day_window: u8,
    pub deep_scan: bool,
    pub timeout: Duration,
    /// Read `Application.evtx`/`System.evtx` from this directory instead of
    /// the live event log. The only source on non-Windows builds.
    pub evtx_dir: Option<PathBuf>,
    pub progress: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            executable_path: PathBuf::new(),
            day_window: 2,
            deep_scan: false,
            timeout: DEFAULT_TIMEOUT,
            evtx_dir: None,
            progress: false,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if !DAY_WINDOWS.contains(&self.day_window) {
            return Err(SearchError::InvalidDayWindow(self.day_window));
        }
        if !self.executable_path.is_file() {
            return Err(SearchError::InvalidExecutable(self.executable_path.clone()));
        }
        Ok(())
    }
}

/// Full pipeline: read, match, classify, assemble. `cancel` is polled between
/// stages only; a cancelled search discards partial results.
pub fn run(cfg: &SearchConfig, cancel: &AtomicBool) -> Result<SearchReport, SearchError> {
    cfg.validate()?;
    let exe = ExeTarget::from_path(&cfg.executable_path);
    let window_end = Utc::now();
    let window_start = reader::window_start(window_end, cfg.day_window);
    check_cancel(cancel)?;

    let records = reader::read_crash_records(cfg)?;
    let mut scanned_records = records.len();
    check_cancel(cancel)?;

    let matches = matcher::match_all(&records, &exe, cfg.deep_scan);
    log::info!("{} of {} records matched {}", matches.len(), records.len(), exe.display_name);
    check_cancel(cancel)?;

    let (matches, status, general_fallback, general_count) = resolve_outcome(matches, cfg.deep_scan, || reader::read_general_records(cfg))?;
    scanned_records += general_count;
    check_cancel(cancel)?;

    let entries: Vec<ClassifiedEntry> = matches.into_iter().map(classify_match).collect();
    let entries = report::assemble(entries);

    Ok(SearchReport {
        status,
        exe_name: exe.display_name.clone(),
        exe_path: cfg.executable_path.to_string_lossy().into_owned(),
        day_window: cfg.day_window,
        deep_scan: cfg.deep_scan,
        general_fallback,
        window_start,
        window_end,
        scanned_records,
        entries,
    })
}

/// Strict mode with no matches is a plain NoMatches. Deep scan with no matches
/// degrades to the unfiltered Application+System batch so the user still sees
/// something; only an empty batch yields NoMatches there.
fn resolve_outcome<F>(matches: Vec<MatchResult>, deep_scan: bool, fetch_general: F) -> Result<(Vec<MatchResult>, SearchStatus, bool, usize), SearchError>
where
    F: FnOnce() -> Result<Vec<LogRecord>, SearchError>,
{
    if !matches.is_empty() {
        return Ok((matches, SearchStatus::Ok, false, 0));
    }
    if !deep_scan {
        return Ok((Vec::new(), SearchStatus::NoMatches, false, 0));
    }
    let general = fetch_general()?;
    let count = general.len();
    if general.is_empty() {
        return Ok((Vec::new(), SearchStatus::NoMatches, true, 0));
    }
    log::warn!("No records matched the target; falling back to the full {}-record batch", count);
    let all: Vec<MatchResult> = general.into_iter()
        .map(|record| MatchResult { record, reason: MatchReason::None, confidence: 0.0 })
        .collect();
    Ok((all, SearchStatus::Ok, true, count))
}

fn classify_match(result: MatchResult) -> ClassifiedEntry {
    let rule = rules::classify(&result.record.message);
    ClassifiedEntry {
        result,
        category: rule.map(|r| r.category),
        explanation: rule.map(|r| r.explanation),
    }
}

fn check_cancel(cancel: &AtomicBool) -> Result<(), SearchError> {
    if cancel.load(Ordering::Relaxed) { Err(SearchError::Cancelled) } else { Ok(()) }
}
