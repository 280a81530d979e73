use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::matcher::MatchResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchStatus { Ok, NoMatches }

impl SearchStatus {
    pub fn label(self) -> &'static str {
        match self { SearchStatus::Ok => "OK", SearchStatus::NoMatches => "NO_MATCHES" }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ClassifiedEntry {
    #[serde(flatten)]
    pub result: MatchResult,
    pub category: Option<&'static str>,
    pub explanation: Option<&'static str>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SearchReport {
    pub status: SearchStatus,
    pub exe_name: String,
    pub exe_path: String,
    pub day_window: u8,
    pub deep_scan: bool,
    /// True when the deep-scan terminal fallback kicked in and `entries` is
    /// the unfiltered Application+System batch rather than a targeted result.
    pub general_fallback: bool,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub scanned_records: usize,
    pub entries: Vec<ClassifiedEntry>,
}

/// Most recent crash first; stable, so same-timestamp entries keep read order.
pub fn assemble(mut entries: Vec<ClassifiedEntry>) -> Vec<ClassifiedEntry> {
    entries.sort_by(|a, b| b.result.record.time.cmp(&a.result.record.time));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use crate::LogRecord;
    use crate::matcher::MatchReason;

    fn entry(time: DateTime<Utc>, message: &str) -> ClassifiedEntry {
        ClassifiedEntry {
            result: MatchResult {
                record: LogRecord { time, channel: "Application".to_string(), source: "Application Error".to_string(), event_id: 1000, message: message.to_string() },
                reason: MatchReason::Exact,
                confidence: 1.0,
            },
            category: None,
            explanation: None,
        }
    }

    #[test]
    fn orders_most_recent_first() {
        let t1 = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let t2 = t1 + Duration::hours(1);
        let t3 = t1 + Duration::hours(2);
        let out = assemble(vec![entry(t1, "a"), entry(t2, "b"), entry(t3, "c")]);
        let times: Vec<_> = out.iter().map(|e| e.result.record.time).collect();
        assert_eq!(times, vec![t3, t2, t1]);
    }

    #[test]
    fn tie_break_preserves_read_order() {
        let t = Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap();
        let out = assemble(vec![entry(t, "first"), entry(t, "second"), entry(t, "third")]);
        let msgs: Vec<_> = out.iter().map(|e| e.result.record.message.as_str()).collect();
        assert_eq!(msgs, vec!["first", "second", "third"]);
    }

    #[test]
    fn status_labels_match_output_vocabulary() {
        assert_eq!(SearchStatus::Ok.label(), "OK");
        assert_eq!(SearchStatus::NoMatches.label(), "NO_MATCHES");
    }
}
