use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::AtomicBool;
use std::time::Duration;
use anyhow::Context;
use chrono::{DateTime, Local, Utc};
use clap::{ArgAction, ColorChoice, CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use comfy_table::{ContentArrangement, Table};
use is_terminal::IsTerminal;
use serde::{Deserialize, Serialize};

mod error;
mod event_xml;
mod matcher;
mod reader;
mod report;
mod rules;
mod search;
#[cfg(windows)]
mod windows_live;

use crate::report::{SearchReport, SearchStatus};
use crate::search::{DAY_WINDOWS, SearchConfig};

static ENABLE_COLOR: OnceLock<bool> = OnceLock::new();

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub time: DateTime<Utc>,
    pub channel: String,
    pub source: String,
    pub event_id: u32,
    pub message: String,
}

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum OutputFmt { Text, Json }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum TextFormat { Lines, Table }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum TimeZone { Local, Utc }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, ValueEnum, Serialize, Deserialize)]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "CrashDetective",
    about = "Finds application crashes for a chosen executable in the Windows Event Log",
    long_about = "Searches the Windows Event Log for crash events (application error, error reporting, application hang) related to a chosen executable and explains known crash causes in plain language.",
    after_long_help = "Examples:\n  CrashDetective C:\\Games\\Foo\\Foo.exe\n  CrashDetective C:\\Games\\Foo\\Foo.exe --days 7 --deep-scan\n  CrashDetective Foo.exe --evtx-dir C:\\exported-logs --output json\n  CrashDetective Foo.exe --days 14 --csv-path crashes.csv",
    color = ColorChoice::Auto
)]
struct Args {
    /// Path to the executable to search crashes for
    #[arg(required_unless_present = "completions")]
    exe: Option<String>,
    /// Search period in days (2, 3, 7 or 14)
    #[arg(long, short = 'd', default_value_t = 2, value_parser = parse_day_window)]
    days: u8,
    /// Enable fuzzy and install-folder matching for renamed or helper processes
    #[arg(long, short = 'D', default_value_t = false)]
    deep_scan: bool,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    /// Read Application.evtx/System.evtx from this directory instead of the live log
    #[arg(long, short = 'e')]
    evtx_dir: Option<String>,
    #[arg(long, short = 'o', value_enum, default_value = "text")]
    output: OutputFmt,
    #[arg(long, value_enum, default_value = "lines")]
    text_format: TextFormat,
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    #[arg(long)]
    csv_path: Option<String>,
    #[arg(long, short = 'C', default_value_t = false)]
    no_color: bool,
    #[arg(long, default_value_t = false)]
    force_color: bool,
    #[arg(long)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, default_value_t = false)]
    no_header: bool,
    #[arg(long, default_value_t = false)]
    progress: bool,
    #[arg(long, value_enum, default_value = "local")]
    time_zone: TimeZone,
    #[arg(long)]
    time_format: Option<String>,
    #[arg(long)]
    msg_width: Option<usize>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
    #[arg(long)]
    config: Option<String>,
}

#[derive(Deserialize)]
struct AppConfig {
    days: Option<u8>,
    deep_scan: Option<bool>,
    timeout_secs: Option<u64>,
    evtx_dir: Option<String>,
    output: Option<OutputFmt>,
    text_format: Option<TextFormat>,
    json_path: Option<String>,
    csv_path: Option<String>,
    time_zone: Option<TimeZone>,
    time_format: Option<String>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    no_header: Option<bool>,
    progress: Option<bool>,
    msg_width: Option<usize>,
}

fn parse_day_window(s: &str) -> Result<u8, String> {
    let v: u8 = s.parse().map_err(|_| format!("invalid day count: {}", s))?;
    if DAY_WINDOWS.contains(&v) { Ok(v) } else { Err("search period must be one of 2, 3, 7 or 14 days".to_string()) }
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "CrashDetective", &mut f); } else { clap_complete::generate(sh, &mut cmd, "CrashDetective", &mut std::io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "CrashDetective", &mut std::io::stdout());
        }
        return;
    }
    if let Some(p) = args.config.as_ref()
        && let Ok(s) = std::fs::read_to_string(p)
        && let Ok(cfg) = toml::from_str::<AppConfig>(&s) { apply_config(&mut args, cfg); }
    else {
        let def = "CrashDetective.toml";
        if let Ok(s) = std::fs::read_to_string(def)
            && let Ok(cfg) = toml::from_str::<AppConfig>(&s) { apply_config(&mut args, cfg); }
    }
    init_logging(&args);
    let term = std::env::var("TERM").unwrap_or_default();
    let no_color_env = std::env::var_os("NO_COLOR").is_some();
    let color_default = std::io::stdout().is_terminal() && !no_color_env && term != "dumb";
    let enable_color = if args.force_color { true } else { color_default && !args.no_color };
    let _ = ENABLE_COLOR.set(enable_color);

    let cfg = SearchConfig {
        executable_path: PathBuf::from(args.exe.clone().unwrap_or_default()),
        day_window: args.days,
        deep_scan: args.deep_scan,
        timeout: Duration::from_secs(args.timeout_secs),
        evtx_dir: args.evtx_dir.clone().map(PathBuf::from),
        progress: args.progress,
    };
    let cancel = AtomicBool::new(false);
    match search::run(&cfg, &cancel) {
        Ok(rep) => {
            if let Err(e) = render_outputs(&args, &rep) {
                log::error!("{:#}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            if matches!(args.output, OutputFmt::Json) {
                let obj = serde_json::json!({ "status": e.status_label(), "error": e.to_string() });
                println!("{}", serde_json::to_string_pretty(&obj).unwrap());
            } else {
                eprintln!("{}", paint(&e.to_string(), "1;31"));
            }
            std::process::exit(e.exit_code());
        }
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
    if args.quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if let Some(lvl) = args.log_level {
        let f = match lvl { LogLevel::Error => log::LevelFilter::Error, LogLevel::Warn => log::LevelFilter::Warn, LogLevel::Info => log::LevelFilter::Info, LogLevel::Debug => log::LevelFilter::Debug, LogLevel::Trace => log::LevelFilter::Trace };
        builder.filter_level(f);
    } else if args.verbose > 0 {
        let f = if args.verbose >= 3 { log::LevelFilter::Trace } else if args.verbose == 2 { log::LevelFilter::Debug } else { log::LevelFilter::Info };
        builder.filter_level(f);
    }
    if let Some(fmt) = args.log_format {
        match fmt {
            LogFormat::Json => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().to_rfc3339();
                    let obj = serde_json::json!({
                        "ts": ts,
                        "level": record.level().to_string(),
                        "target": record.target(),
                        "msg": record.args().to_string(),
                    });
                    writeln!(buf, "{}", obj)
                });
            }
            LogFormat::Text => {
                builder.format(|buf, record| {
                    use std::io::Write;
                    let ts = chrono::Local::now().format("%H:%M:%S");
                    writeln!(buf, "[{:<5} {}] {}", record.level(), ts, record.args())
                });
            }
        }
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.days == 2 && let Some(v) = cfg.days { args.days = v; }
    if let Some(v) = cfg.deep_scan { args.deep_scan = v; }
    if args.timeout_secs == 30 && let Some(v) = cfg.timeout_secs { args.timeout_secs = v; }
    if args.evtx_dir.is_none() && let Some(v) = cfg.evtx_dir { args.evtx_dir = Some(v); }
    if let Some(v) = cfg.output { args.output = v; }
    if let Some(v) = cfg.text_format { args.text_format = v; }
    if args.json_path.is_none() && let Some(v) = cfg.json_path { args.json_path = Some(v); }
    if args.csv_path.is_none() && let Some(v) = cfg.csv_path { args.csv_path = Some(v); }
    if let Some(v) = cfg.time_zone { args.time_zone = v; }
    if args.time_format.is_none() && let Some(v) = cfg.time_format { args.time_format = Some(v); }
    if let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
    if let Some(v) = cfg.no_header { args.no_header = v; }
    if let Some(v) = cfg.progress { args.progress = v; }
    if args.msg_width.is_none() && let Some(v) = cfg.msg_width { args.msg_width = Some(v); }
}

fn render_outputs(args: &Args, rep: &SearchReport) -> anyhow::Result<()> {
    match args.output {
        OutputFmt::Text => {
            let width = args.msg_width.unwrap_or(96);
            match args.text_format {
                TextFormat::Lines => print_report(rep, args, width),
                TextFormat::Table => print_report_table(rep, args, width),
            }
        }
        OutputFmt::Json => {
            if args.json_path.is_none() && !args.quiet {
                println!("{}", serde_json::to_string_pretty(rep).context("serializing report")?);
            }
        }
    }
    if let Some(p) = args.json_path.as_ref() {
        let data = serde_json::to_vec_pretty(rep).context("serializing report")?;
        std::fs::write(p, data).with_context(|| format!("writing JSON report to {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("JSON written: {}", p), "1;36")); }
    }
    if let Some(p) = args.csv_path.as_ref() {
        write_csv(p, rep, args.time_zone, args.time_format.as_deref()).with_context(|| format!("writing CSV report to {}", p))?;
        if !args.quiet { println!("{}", paint(&format!("CSV written: {}", p), "1;36")); }
    }
    Ok(())
}

fn print_report(rep: &SearchReport, args: &Args, width: usize) {
    if !args.no_header { print_header(rep, args); }
    for e in &rep.entries {
        let ts = fmt_time(e.result.record.time, args.time_zone, args.time_format.as_deref());
        let cat = e.category.unwrap_or("UNCLASSIFIED");
        let cat_s = paint(cat, if e.category.is_some() { "1;33" } else { "2" });
        let how = format!("{} {:.2}", e.result.reason.label(), e.result.confidence);
        let src = format!("{} {}", e.result.record.source, e.result.record.event_id);
        let msg = truncate(&e.result.record.message.replace('\n', " "), width);
        println!("{}  {:<20}  [{:<11}]  {}  {}", ts, cat_s, how, src, msg);
        if let Some(expl) = e.explanation {
            println!("    {}", paint(expl, "2"));
        }
    }
}

fn print_report_table(rep: &SearchReport, args: &Args, width: usize) {
    if !args.no_header { print_header(rep, args); }
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![paint("Time", "1"), paint("Category", "1"), paint("Match", "1"), paint("Conf", "1"), paint("Source", "1"), paint("Event", "1"), paint("Message", "1")]);
    for e in &rep.entries {
        let ts = fmt_time(e.result.record.time, args.time_zone, args.time_format.as_deref());
        table.add_row(vec![
            ts,
            e.category.unwrap_or("UNCLASSIFIED").to_string(),
            e.result.reason.label().to_string(),
            format!("{:.2}", e.result.confidence),
            e.result.record.source.clone(),
            e.result.record.event_id.to_string(),
            truncate(&e.result.record.message.replace('\n', " "), width),
        ]);
    }
    println!("{}", table);
}

fn print_header(rep: &SearchReport, args: &Args) {
    println!("{}", paint("CrashDetective - Windows Event Log crash search", "1;36"));
    println!("{} {}", paint("File:", "1"), rep.exe_name);
    println!("{} {}", paint("Path:", "1"), rep.exe_path);
    let start_s = fmt_time(rep.window_start, args.time_zone, args.time_format.as_deref());
    let end_s = fmt_time(rep.window_end, args.time_zone, args.time_format.as_deref());
    println!("{} last {} days ({} to {})", paint("Period:", "1"), rep.day_window, start_s, end_s);
    println!("{} {}", paint("Deep Scan:", "1"), if rep.deep_scan { "enabled" } else { "disabled" });
    match rep.status {
        SearchStatus::Ok if rep.general_fallback => {
            println!("{} {} - no direct matches for {}, showing all recent Application/System errors.", paint("Status:", "1"), rep.status.label(), rep.exe_name);
        }
        SearchStatus::Ok => {
            println!("{} {} - {} matching crash events ({} records scanned).", paint("Status:", "1"), rep.status.label(), rep.entries.len(), rep.scanned_records);
        }
        SearchStatus::NoMatches => {
            println!("{} {} - no crash events related to {} in the last {} days.", paint("Status:", "1"), rep.status.label(), rep.exe_name, rep.day_window);
        }
    }
}

fn write_csv(path: &str, rep: &SearchReport, tz: TimeZone, tfmt: Option<&str>) -> Result<(), std::io::Error> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["time", "channel", "source", "event_id", "reason", "confidence", "category", "explanation", "message"])?;
    for e in &rep.entries {
        let r = &e.result.record;
        wtr.write_record([
            fmt_time(r.time, tz, tfmt),
            r.channel.clone(),
            r.source.clone(),
            r.event_id.to_string(),
            e.result.reason.label().to_string(),
            format!("{:.2}", e.result.confidence),
            e.category.unwrap_or("").to_string(),
            e.explanation.unwrap_or("").to_string(),
            r.message.replace('\n', " "),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

fn fmt_time(t: DateTime<Utc>, tz: TimeZone, tfmt: Option<&str>) -> String {
    match (tz, tfmt) {
        (TimeZone::Local, Some(f)) => format!("{}", t.with_timezone(&Local).format(f)),
        (TimeZone::Utc, Some(f)) => format!("{}", t.format(f)),
        (TimeZone::Local, None) => format!("{}", t.with_timezone(&Local).format("%Y-%m-%d %H:%M")),
        (TimeZone::Utc, None) => format!("{}", t.format("%Y-%m-%d %H:%M")),
    }
}

fn truncate(s: &str, n: usize) -> String {
    let mut out: String = s.chars().take(n).collect();
    if s.chars().count() > n { out.push_str("..."); }
    out
}

fn paint(s: &str, code: &str) -> String {
    if *ENABLE_COLOR.get().unwrap_or(&true) { format!("\x1b[{}m{}\x1b[0m", code, s) } else { s.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{MatchReason, MatchResult};
    use crate::report::ClassifiedEntry;

    #[test]
    fn day_window_parser_accepts_only_known_periods() {
        for d in ["2", "3", "7", "14"] {
            assert!(parse_day_window(d).is_ok());
        }
        assert!(parse_day_window("5").is_err());
        assert!(parse_day_window("0").is_err());
        assert!(parse_day_window("week").is_err());
    }

    #[test]
    fn cli_rejects_unknown_day_window() {
        assert!(Args::try_parse_from(["CrashDetective", "Game.exe", "--days", "5"]).is_err());
        assert!(Args::try_parse_from(["CrashDetective", "Game.exe", "--days", "14"]).is_ok());
    }

    #[test]
    fn cli_requires_exe_unless_generating_completions() {
        assert!(Args::try_parse_from(["CrashDetective"]).is_err());
        assert!(Args::try_parse_from(["CrashDetective", "--completions", "bash"]).is_ok());
    }

    fn sample_report() -> SearchReport {
        let rec = LogRecord {
            time: event_xml::parse_system_time("2026-08-01T12:00:00Z").unwrap(),
            channel: "Application".to_string(),
            source: "Application Error".to_string(),
            event_id: 1000,
            message: "Game.exe 0xc0000005 UnityPlayer.dll".to_string(),
        };
        let rule = rules::classify(&rec.message).unwrap();
        SearchReport {
            status: SearchStatus::Ok,
            exe_name: "Game.exe".to_string(),
            exe_path: "Games/Foo/Game.exe".to_string(),
            day_window: 2,
            deep_scan: false,
            general_fallback: false,
            window_start: event_xml::parse_system_time("2026-07-30T12:00:00Z").unwrap(),
            window_end: event_xml::parse_system_time("2026-08-01T12:00:00Z").unwrap(),
            scanned_records: 1,
            entries: vec![ClassifiedEntry {
                result: MatchResult { record: rec, reason: MatchReason::Exact, confidence: 1.0 },
                category: Some(rule.category),
                explanation: Some(rule.explanation),
            }],
        }
    }

    #[test]
    fn csv_export_writes_header_and_rows() {
        let p = std::env::temp_dir().join("crashdetective_test.csv");
        write_csv(&p.to_string_lossy(), &sample_report(), TimeZone::Utc, None).unwrap();
        let data = std::fs::read_to_string(&p).unwrap();
        let mut lines = data.lines();
        assert!(lines.next().unwrap().starts_with("time,channel,source"));
        let row = lines.next().unwrap();
        assert!(row.contains("ACCESS_VIOLATION"));
        assert!(row.contains("exact"));
        let _ = std::fs::remove_file(&p);
    }

    #[test]
    fn json_report_carries_status_and_entries() {
        let rep = sample_report();
        let v: serde_json::Value = serde_json::from_str(&serde_json::to_string(&rep).unwrap()).unwrap();
        assert_eq!(v["status"], "OK");
        assert_eq!(v["entries"][0]["category"], "ACCESS_VIOLATION");
        assert_eq!(v["entries"][0]["reason"], "exact");
        assert_eq!(v["entries"][0]["record"]["event_id"], 1000);
    }

    #[test]
    fn truncate_handles_multibyte() {
        let s = "你好世界";
        let t = truncate(s, 2);
        assert!(t.starts_with("你好"));
        assert!(t.ends_with("..."));
        assert_eq!(truncate("abcdef", 6), "abcdef");
    }
}
