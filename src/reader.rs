use std::path::Path;
use std::time::Instant;
use chrono::{DateTime, Duration, Utc};
use evtx::EvtxParser;
use crate::LogRecord;
use crate::error::SearchError;
use crate::search::SearchConfig;

/// Application error, error reporting, application hang.
pub const CRASH_EVENT_IDS: [u32; 3] = [1000, 1001, 1002];

pub fn window_start(now: DateTime<Utc>, days: u8) -> DateTime<Utc> {
    now - Duration::days(days as i64)
}

pub fn within_window(t: DateTime<Utc>, since: DateTime<Utc>, until: DateTime<Utc>) -> bool {
    t >= since && t <= until
}

/// Crash query: Application channel, event ids {1000, 1001, 1002}.
/// Re-queries on every call; nothing is cached between searches.
pub fn read_crash_records(cfg: &SearchConfig) -> Result<Vec<LogRecord>, SearchError> {
    read_channels(cfg, &["Application"], Some(&CRASH_EVENT_IDS))
}

/// Unfiltered batch over both channels, used only by the deep-scan terminal
/// fallback when nothing matched the target executable.
pub fn read_general_records(cfg: &SearchConfig) -> Result<Vec<LogRecord>, SearchError> {
    read_channels(cfg, &["Application", "System"], None)
}

fn read_channels(cfg: &SearchConfig, channels: &[&str], event_ids: Option<&[u32]>) -> Result<Vec<LogRecord>, SearchError> {
    let until = Utc::now();
    let since = window_start(until, cfg.day_window);
    let deadline = Instant::now() + cfg.timeout;
    let mut out: Vec<LogRecord> = Vec::new();
    for ch in channels {
        let recs = if let Some(dir) = cfg.evtx_dir.as_ref() {
            read_evtx_channel(dir, ch, event_ids, deadline, cfg)?
        } else {
            read_live_channel(ch, since, event_ids, deadline, cfg)?
        };
        out.extend(filter_batch(recs, since, until, event_ids));
    }
    log::info!("Read {} records from {:?} (last {} days)", out.len(), channels, cfg.day_window);
    Ok(out)
}

/// The source query already constrains time and ids where it can; this is the
/// authoritative filter applied to whatever the source handed back.
fn filter_batch(mut recs: Vec<LogRecord>, since: DateTime<Utc>, until: DateTime<Utc>, event_ids: Option<&[u32]>) -> Vec<LogRecord> {
    recs.retain(|r| within_window(r.time, since, until) && pass_event_id(event_ids, r.event_id));
    recs
}

#[cfg(windows)]
fn read_live_channel(channel: &str, since: DateTime<Utc>, event_ids: Option<&[u32]>, deadline: Instant, cfg: &SearchConfig) -> Result<Vec<LogRecord>, SearchError> {
    crate::windows_live::query_channel(channel, since, event_ids, deadline, cfg.timeout)
}

#[cfg(not(windows))]
fn read_live_channel(channel: &str, _since: DateTime<Utc>, _event_ids: Option<&[u32]>, _deadline: Instant, _cfg: &SearchConfig) -> Result<Vec<LogRecord>, SearchError> {
    Err(SearchError::SourceUnavailable(format!(
        "{} (live event log queries need Windows; pass --evtx-dir to read exported .evtx files)", channel
    )))
}

fn read_evtx_channel(dir: &Path, channel: &str, event_ids: Option<&[u32]>, deadline: Instant, cfg: &SearchConfig) -> Result<Vec<LogRecord>, SearchError> {
    let path = dir.join(format!("{}.evtx", channel));
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return Err(SearchError::PermissionDenied),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(SearchError::SourceUnavailable(path.to_string_lossy().into_owned())),
        Err(e) => return Err(SearchError::Io(e)),
    }
    let mut parser = EvtxParser::from_path(&path)
        .map_err(|e| { log::error!("EVTX open failed for {}: {}", path.to_string_lossy(), e); SearchError::SourceUnavailable(path.to_string_lossy().into_owned()) })?;
    let pb = if cfg.progress { Some(indicatif::ProgressBar::new_spinner()) } else { None };
    if let Some(ref pb) = pb { pb.set_message(format!("Scanning {}", channel)); }
    let mut out = Vec::new();
    let mut scanned = 0usize;
    for r in parser.records() {
        scanned += 1;
        if scanned % 500 == 0 {
            if Instant::now() >= deadline { return Err(SearchError::Timeout(cfg.timeout)); }
            if let Some(ref pb) = pb { pb.tick(); pb.set_message(format!("Scanned {} records", scanned)); }
        }
        let Ok(r) = r else { continue };
        if let Some(rec) = crate::event_xml::parse_record(&r.data, channel)
            && pass_event_id(event_ids, rec.event_id) {
            out.push(rec);
        }
    }
    if let Some(pb) = pb { pb.finish_and_clear(); }
    log::debug!("EVTX scan of {} parsed {} of {} records", channel, out.len(), scanned);
    Ok(out)
}

fn pass_event_id(event_ids: Option<&[u32]>, id: u32) -> bool {
    match event_ids {
        Some(ids) => ids.contains(&id),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_start_subtracts_days() {
        let now = Utc::now();
        for d in [2u8, 3, 7, 14] {
            let s = window_start(now, d);
            assert_eq!(now - s, Duration::days(d as i64));
        }
    }

    #[test]
    fn within_window_bounds_are_inclusive() {
        let until = Utc::now();
        let since = window_start(until, 2);
        assert!(within_window(since, since, until));
        assert!(within_window(until, since, until));
        assert!(!within_window(since - Duration::seconds(1), since, until));
        assert!(!within_window(until + Duration::seconds(1), since, until));
    }

    #[test]
    fn event_id_filter_only_applies_when_present() {
        assert!(pass_event_id(Some(&CRASH_EVENT_IDS), 1000));
        assert!(!pass_event_id(Some(&CRASH_EVENT_IDS), 7034));
        assert!(pass_event_id(None, 7034));
    }

    #[test]
    fn filter_batch_keeps_only_windowed_crash_ids() {
        let until = Utc::now();
        let since = window_start(until, 2);
        let rec = |time, event_id| LogRecord {
            time,
            channel: "Application".to_string(),
            source: "Application Error".to_string(),
            event_id,
            message: "x".to_string(),
        };
        let batch = vec![
            rec(until - Duration::hours(1), 1000),
            rec(until - Duration::hours(2), 1002),
            rec(until - Duration::days(3), 1000),
            rec(until - Duration::hours(1), 7034),
        ];
        let out = filter_batch(batch.clone(), since, until, Some(&CRASH_EVENT_IDS));
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|r| within_window(r.time, since, until)));
        assert!(out.iter().all(|r| CRASH_EVENT_IDS.contains(&r.event_id)));
        let general = filter_batch(batch, since, until, None);
        assert_eq!(general.len(), 3);
    }

    #[test]
    fn missing_evtx_file_is_source_unavailable() {
        let cfg = SearchConfig { evtx_dir: Some(std::env::temp_dir().join("no_such_dir_cd")), ..SearchConfig::default() };
        let err = read_evtx_channel(cfg.evtx_dir.as_ref().unwrap(), "Application", None, Instant::now() + cfg.timeout, &cfg).unwrap_err();
        assert!(matches!(err, SearchError::SourceUnavailable(_)));
    }
}
