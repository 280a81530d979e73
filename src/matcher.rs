use std::path::Path;
use std::sync::OnceLock;
use difflib::sequencematcher::SequenceMatcher;
use regex::Regex;
use serde::Serialize;
use crate::LogRecord;

/// Minimum similarity ratio for a fuzzy hit; separates renamed/truncated
/// process names from unrelated tokens.
pub const FUZZY_THRESHOLD: f32 = 0.6;
const FOLDER_CONFIDENCE: f32 = 0.4;
const ROOT_WALK_LIMIT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchReason { Exact, Fuzzy, Folder, None }

impl MatchReason {
    pub fn label(self) -> &'static str {
        match self { MatchReason::Exact => "exact", MatchReason::Fuzzy => "fuzzy", MatchReason::Folder => "folder", MatchReason::None => "none" }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct MatchResult {
    pub record: LogRecord,
    pub reason: MatchReason,
    pub confidence: f32,
}

/// Precomputed lowercase views of the target executable: full filename, stem,
/// and the name of its probable install-root folder.
#[derive(Clone, Debug)]
pub struct ExeTarget {
    pub display_name: String,
    pub name: String,
    pub stem: String,
    pub root_name: Option<String>,
}

impl ExeTarget {
    pub fn from_path(path: &Path) -> Self {
        let display_name = path.file_name().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        let name = display_name.to_lowercase();
        let stem = path.file_stem().map(|s| s.to_string_lossy().to_lowercase()).unwrap_or_else(|| name.clone());
        let root_name = install_root(path).map(|s| s.to_lowercase());
        ExeTarget { display_name, name, stem, root_name }
    }
}

/// Walks up from the executable's directory past leaf-container names
/// ("bin", "binaries", architecture qualifiers) until a directory without such
/// a marker is found, or the depth limit is hit. Returns that directory's name.
pub fn install_root(exe_path: &Path) -> Option<String> {
    let mut dir = exe_path.parent()?;
    for _ in 0..ROOT_WALK_LIMIT {
        let name = dir.file_name()?.to_string_lossy().into_owned();
        if !is_leaf_container(&name) { return Some(name); }
        dir = dir.parent()?;
    }
    dir.file_name().map(|s| s.to_string_lossy().into_owned())
}

fn is_leaf_container(name: &str) -> bool {
    let n = name.to_lowercase();
    matches!(n.as_str(), "bin" | "binaries" | "win64" | "win32" | "x64" | "x86" | "amd64" | "retail" | "shipping")
        || n.ends_with("-shipping")
}

fn token_splitter() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[\s\\/"',;:()\[\]<>|=]+"#).unwrap())
}

pub fn tokenize(text: &str) -> Vec<String> {
    token_splitter().split(text).filter(|t| !t.is_empty()).map(|t| t.to_lowercase()).collect()
}

pub fn similarity(a: &str, b: &str) -> f32 {
    let mut sm = SequenceMatcher::new(a, b);
    sm.ratio()
}

/// Strategy chain per record: exact, then (deep scan only) fuzzy, then folder.
/// Short-circuits on the first success.
pub fn match_record(rec: &LogRecord, exe: &ExeTarget, deep_scan: bool) -> (MatchReason, f32) {
    if exe.name.is_empty() { return (MatchReason::None, 0.0); }
    let src = rec.source.to_lowercase();
    let msg = rec.message.to_lowercase();
    if src.contains(&exe.name) || msg.contains(&exe.name) || src.contains(&exe.stem) || msg.contains(&exe.stem) {
        return (MatchReason::Exact, 1.0);
    }
    if deep_scan {
        let mut best = 0.0f32;
        for tok in tokenize(&rec.source).into_iter().chain(tokenize(&rec.message)) {
            let r = similarity(&exe.name, &tok).max(similarity(&exe.stem, &tok));
            if r > best { best = r; }
        }
        if best >= FUZZY_THRESHOLD { return (MatchReason::Fuzzy, best); }
        if let Some(root) = exe.root_name.as_ref() && !root.is_empty() && msg.contains(root) {
            return (MatchReason::Folder, FOLDER_CONFIDENCE);
        }
    }
    (MatchReason::None, 0.0)
}

/// Filters the batch down to matched records. Unmatched records are dropped
/// here; the terminal "general" fallback is the pipeline driver's decision.
pub fn match_all(records: &[LogRecord], exe: &ExeTarget, deep_scan: bool) -> Vec<MatchResult> {
    let mut out = Vec::new();
    for rec in records {
        let (reason, confidence) = match_record(rec, exe, deep_scan);
        if reason != MatchReason::None {
            out.push(MatchResult { record: rec.clone(), reason, confidence });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn rec(source: &str, message: &str) -> LogRecord {
        LogRecord {
            time: Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap(),
            channel: "Application".to_string(),
            source: source.to_string(),
            event_id: 1000,
            message: message.to_string(),
        }
    }

    fn target(p: &str) -> ExeTarget { ExeTarget::from_path(&PathBuf::from(p)) }

    #[test]
    fn exact_match_is_case_insensitive() {
        let exe = target("Games/Foo/Game.exe");
        let (reason, conf) = match_record(&rec("Application Error", "Faulting application game.exe crashed"), &exe, false);
        assert_eq!(reason, MatchReason::Exact);
        assert_eq!(conf, 1.0);
    }

    #[test]
    fn exact_match_accepts_name_without_extension() {
        let exe = target("Games/Foo/Game.exe");
        let (reason, _) = match_record(&rec("Game", "hang detected"), &exe, false);
        assert_eq!(reason, MatchReason::Exact);
    }

    #[test]
    fn fuzzy_requires_deep_scan() {
        let exe = target("Games/Foo/Game.exe");
        let r = rec("Application Error", "Faulting application Gaem.exe stopped");
        assert_eq!(match_record(&r, &exe, false).0, MatchReason::None);
        let (reason, conf) = match_record(&r, &exe, true);
        assert_eq!(reason, MatchReason::Fuzzy);
        assert!(conf >= FUZZY_THRESHOLD);
    }

    #[test]
    fn transposed_name_ratio_clears_threshold() {
        assert!(similarity("game.exe", "gaem.exe") >= FUZZY_THRESHOLD);
        assert!(similarity("game.exe", "svchost.exe") < FUZZY_THRESHOLD);
    }

    #[test]
    fn install_root_walks_past_bin_and_arch_dirs() {
        assert_eq!(install_root(&PathBuf::from("Games/Foo/bin/Win64/Foo.exe")).as_deref(), Some("Foo"));
        assert_eq!(install_root(&PathBuf::from("Games/Bar/Bar.exe")).as_deref(), Some("Bar"));
        assert_eq!(install_root(&PathBuf::from("Games/Baz/Binaries/Win64/BazGame-Win64-Shipping.exe")).as_deref(), Some("Baz"));
    }

    #[test]
    fn folder_match_fires_when_exact_and_fuzzy_fail() {
        let exe = target("Games/StarDrift/bin/Win64/SDClient.exe");
        assert_eq!(exe.root_name.as_deref(), Some("stardrift"));
        let r = rec("Windows Error Reporting", "Fault bucket for a module under Games\\StarDrift reported");
        let (reason, conf) = match_record(&r, &exe, true);
        assert_eq!(reason, MatchReason::Folder);
        assert_eq!(conf, FOLDER_CONFIDENCE);
        assert_eq!(match_record(&r, &exe, false).0, MatchReason::None);
    }

    #[test]
    fn unmatched_records_are_dropped_by_match_all() {
        let exe = target("Games/Foo/Game.exe");
        let records = vec![
            rec("Application Error", "Faulting application game.exe code 0xc0000005"),
            rec("Service Control Manager", "The Print Spooler service terminated"),
        ];
        let out = match_all(&records, &exe, false);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reason, MatchReason::Exact);
    }

    #[test]
    fn tokenizer_splits_paths_and_quotes() {
        let toks = tokenize("Faulting path: \"C:\\Games\\Foo\\bin\\Game.exe\", module ntdll.dll");
        assert!(toks.contains(&"game.exe".to_string()));
        assert!(toks.contains(&"ntdll.dll".to_string()));
        assert!(toks.contains(&"foo".to_string()));
    }
}
