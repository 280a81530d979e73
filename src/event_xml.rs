use chrono::{DateTime, Utc};
use quick_xml::Reader;
use quick_xml::events::Event as XmlEvent;
use crate::LogRecord;

pub fn parse_record(xml: &str, channel: &str) -> Option<LogRecord> {
    if let Some(rec) = parse_record_qx(xml, channel) { return Some(rec); }
    let t = extract_attr(xml, "TimeCreated", "SystemTime").and_then(|s| parse_system_time(&s))?;
    let source = extract_attr(xml, "Provider", "Name").unwrap_or_default();
    let event_id = extract_between(xml, "<EventID", "</EventID>").and_then(|s| {
        let s2 = if let Some(idx) = s.rfind('>') { &s[idx+1..] } else { &s };
        s2.trim().parse::<u32>().ok()
    }).unwrap_or(0);
    let ch = extract_between(xml, "<Channel>", "</Channel>").unwrap_or_else(|| channel.to_string());
    Some(LogRecord { time: t, channel: ch, source, event_id, message: event_message(xml) })
}

fn parse_record_qx(xml: &str, channel: &str) -> Option<LogRecord> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut time_opt: Option<DateTime<Utc>> = None;
    let mut source = String::new();
    let mut event_id_opt: Option<u32> = None;
    let mut channel_s = String::new();
    let mut cur = String::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) | Ok(XmlEvent::Empty(e)) => {
                cur = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if cur == "TimeCreated" {
                    for a in e.attributes().flatten() {
                        let k = String::from_utf8_lossy(a.key.as_ref());
                        if k == "SystemTime" {
                            let v = a.unescape_value().ok()?.to_string();
                            if let Some(dt) = parse_system_time(&v) { time_opt = Some(dt); }
                        }
                    }
                } else if cur == "Provider" {
                    for a in e.attributes().flatten() {
                        let k = String::from_utf8_lossy(a.key.as_ref());
                        if k == "Name" { source = a.unescape_value().ok()?.to_string(); }
                    }
                }
            }
            Ok(XmlEvent::Text(t)) => {
                let v = String::from_utf8_lossy(t.as_ref()).into_owned();
                if cur == "EventID" { if let Ok(n) = v.trim().parse::<u32>() { event_id_opt = Some(n); } }
                else if cur == "Channel" { channel_s = v; }
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => return None,
            _ => {}
        }
        buf.clear();
    }
    let time = time_opt?;
    let event_id = event_id_opt.unwrap_or(0);
    let ch = if channel_s.is_empty() { channel.to_string() } else { channel_s };
    Some(LogRecord { time, channel: ch, source, event_id, message: event_message(xml) })
}

/// Joined `<EventData>` values: for Application Error events this carries the
/// faulting application path, module and exception code, which is the text the
/// matcher and classifier run against.
pub fn event_message(xml: &str) -> String {
    let vals = event_data_values(xml);
    let vals = if vals.is_empty() { event_data_values_fallback(xml) } else { vals };
    if vals.is_empty() { xml.to_string() } else { vals.join(" ") }
}

pub fn event_data_values(xml: &str) -> Vec<String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_event_data = false;
    let mut in_data = false;
    let mut out: Vec<String> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(XmlEvent::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "EventData" { in_event_data = true; }
                else if in_event_data && name == "Data" { in_data = true; }
            }
            Ok(XmlEvent::End(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if name == "EventData" { in_event_data = false; }
                if name == "Data" { in_data = false; }
            }
            Ok(XmlEvent::Text(t)) => {
                if in_data {
                    let v = String::from_utf8_lossy(t.as_ref()).trim().to_string();
                    if !v.is_empty() { out.push(v); }
                }
            }
            Ok(XmlEvent::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }
    out
}

pub fn event_data_values_fallback(xml: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut rest = xml;
    while let Some(i) = rest.find("<Data") {
        rest = &rest[i + 5..];
        if !rest.starts_with(' ') && !rest.starts_with('>') && !rest.starts_with('/') { continue; }
        if let Some(gt) = rest.find('>') {
            if rest[..gt].ends_with('/') { rest = &rest[gt + 1..]; continue; }
            let val_part = &rest[gt + 1..];
            if let Some(ve) = val_part.find("</Data>") {
                let v = val_part[..ve].trim();
                if !v.is_empty() { out.push(v.to_string()); }
                rest = &val_part[ve + 7..];
                continue;
            }
        }
        break;
    }
    out
}

pub fn parse_system_time(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) { return Some(dt.with_timezone(&Utc)); }
    let mut alt = s.replace(' ', "T");
    if !alt.ends_with('Z') && !alt.contains('+') { alt.push('Z'); }
    if let Ok(dt) = DateTime::parse_from_rfc3339(&alt) { return Some(dt.with_timezone(&Utc)); }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") { return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc)); }
    None
}

fn extract_between(hay: &str, start: &str, end: &str) -> Option<String> {
    let s = hay.find(start)?;
    let e = hay[s + start.len()..].find(end)? + s + start.len();
    Some(hay[s + start.len()..e].to_string())
}

fn extract_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{} ", tag);
    let s = xml.find(&open)?;
    let rest = &xml[s + open.len()..];
    let key = format!("{}=\"", attr);
    let ks = rest.find(&key)?;
    let after = &rest[ks + key.len()..];
    let ke = after.find('"')?;
    Some(after[..ke].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRASH_XML: &str = "<Event><System><Provider Name=\"Application Error\"/><EventID>1000</EventID><Level>2</Level><TimeCreated SystemTime=\"2026-08-01T12:00:00Z\"/><Channel>Application</Channel></System><EventData><Data Name=\"AppName\">Game.exe</Data><Data Name=\"ExceptionCode\">0xc0000005</Data><Data Name=\"AppPath\">C:\\Games\\Foo\\bin\\Game.exe</Data></EventData></Event>";

    #[test]
    fn parses_crash_record_fields() {
        let rec = parse_record(CRASH_XML, "Fallback").unwrap();
        assert_eq!(rec.channel, "Application");
        assert_eq!(rec.source, "Application Error");
        assert_eq!(rec.event_id, 1000);
        assert!(rec.message.contains("Game.exe"));
        assert!(rec.message.contains("0xc0000005"));
    }

    #[test]
    fn falls_back_to_caller_channel() {
        let xml = "<Event><System><Provider Name=\"Application Hang\"/><EventID>1002</EventID><TimeCreated SystemTime=\"2026-08-01 09:30:00\"/></System><EventData><Data>Hang.exe</Data></EventData></Event>";
        let rec = parse_record(xml, "Application").unwrap();
        assert_eq!(rec.channel, "Application");
        assert_eq!(rec.event_id, 1002);
        assert_eq!(rec.message, "Hang.exe");
    }

    #[test]
    fn message_joins_data_values_in_order() {
        let msg = event_message(CRASH_XML);
        assert_eq!(msg, "Game.exe 0xc0000005 C:\\Games\\Foo\\bin\\Game.exe");
    }

    #[test]
    fn fallback_scanner_reads_unnamed_data() {
        let xml = "<Event><System><Data>ignored-no-close";
        assert!(event_data_values_fallback(xml).is_empty());
        let xml2 = "<Data Name=\"A\">one</Data><Data>two</Data><Data/>";
        assert_eq!(event_data_values_fallback(xml2), vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn record_without_timestamp_is_rejected() {
        let xml = "<Event><System><Provider Name=\"X\"/><EventID>1000</EventID></System></Event>";
        assert!(parse_record(xml, "Application").is_none());
    }
}
