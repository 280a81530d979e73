use std::ptr;
use std::time::Instant;
use chrono::{DateTime, Utc};
use crate::LogRecord;
use crate::error::SearchError;
use crate::event_xml::parse_record;
use windows_sys::Win32::System::EventLog::*;
use windows_sys::Win32::Foundation::GetLastError;

const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_FILE_NOT_FOUND: u32 = 2;
const ERROR_NO_MORE_ITEMS: u32 = 259;
const ERROR_EVT_CHANNEL_NOT_FOUND: u32 = 15007;

struct Handle(EVT_HANDLE);
impl Drop for Handle { fn drop(&mut self) { unsafe { EvtClose(self.0); } } }

fn w(s: &str) -> Vec<u16> { let mut v = s.encode_utf16().collect::<Vec<u16>>(); v.push(0); v }

fn build_query(channel: &str, since: DateTime<Utc>, event_ids: Option<&[u32]>) -> String {
    let ts = since.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
    let id_clause = match event_ids {
        Some(ids) if !ids.is_empty() => {
            let alts: Vec<String> = ids.iter().map(|id| format!("EventID={}", id)).collect();
            format!("({}) and ", alts.join(" or "))
        }
        _ => String::new(),
    };
    format!(
        "<QueryList><Query Id=\"0\"><Select Path=\"{}\">*[System[{}TimeCreated[@SystemTime &gt;= '{}']]]</Select></Query></QueryList>",
        channel, id_clause, ts
    )
}

fn map_query_error(channel: &str, code: u32) -> SearchError {
    match code {
        ERROR_ACCESS_DENIED => SearchError::PermissionDenied,
        ERROR_EVT_CHANNEL_NOT_FOUND | ERROR_FILE_NOT_FOUND => SearchError::SourceUnavailable(channel.to_string()),
        _ => SearchError::SourceUnavailable(format!("{} (OS error {})", channel, code)),
    }
}

/// One scoped query against a live channel. The query handle is released when
/// `Handle` drops, on every exit path.
pub fn query_channel(channel: &str, since: DateTime<Utc>, event_ids: Option<&[u32]>, deadline: Instant, timeout: std::time::Duration) -> Result<Vec<LogRecord>, SearchError> {
    let mut out = Vec::new();
    unsafe {
        let q = build_query(channel, since, event_ids);
        let h = EvtQuery(0, std::ptr::null(), w(&q).as_ptr(), 0);
        if h == 0 { return Err(map_query_error(channel, GetLastError())); }
        let h = Handle(h);
        let mut arr: [EVT_HANDLE; 64] = [0; 64];
        loop {
            if Instant::now() >= deadline { return Err(SearchError::Timeout(timeout)); }
            let mut returned: u32 = 0;
            let ok = EvtNext(h.0, arr.len() as u32, arr.as_mut_ptr(), 100, 0, &mut returned);
            if ok == 0 {
                let code = GetLastError();
                if code == ERROR_NO_MORE_ITEMS || code == 0 { break; }
                if code == ERROR_ACCESS_DENIED { return Err(SearchError::PermissionDenied); }
                log::error!("EvtNext error on {}: {}", channel, code);
                break;
            }
            if returned == 0 { break; }
            for &ev in arr.iter().take(returned as usize) {
                if let Some(xml) = render_xml(ev) && let Some(rec) = parse_record(&xml, channel) {
                    out.push(rec);
                }
                EvtClose(ev);
            }
        }
    }
    log::debug!("Live query on {} returned {} records", channel, out.len());
    Ok(out)
}

unsafe fn render_xml(ev: EVT_HANDLE) -> Option<String> {
    let mut used: u32 = 0;
    let mut count: u32 = 0;
    let ok = unsafe { EvtRender(0, ev, EvtRenderEventXml, 0, ptr::null_mut(), &mut used, &mut count) };
    let need = if ok == 0 { used } else { 0 };
    if need == 0 { return None; }
    let mut buf: Vec<u16> = vec![0u16; (need as usize).div_ceil(2)];
    if unsafe { EvtRender(0, ev, EvtRenderEventXml, need, buf.as_mut_ptr() as *mut _, &mut used, &mut count) } != 0 {
        let s = String::from_utf16_lossy(&buf);
        Some(s.trim_matches(char::from(0)).to_string())
    } else { None }
}
