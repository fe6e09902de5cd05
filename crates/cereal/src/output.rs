use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use cereal_frame::ReaderEvent;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    event: &'static str,
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    payload_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    baud_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    os_code: Option<i32>,
    detail: String,
    timestamp: String,
}

pub fn print_event(event: &ReaderEvent, role: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&event_output(event, role))
                    .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ROLE", "EVENT", "DETAIL"])
                .add_row(vec![
                    role.to_string(),
                    event.kind().to_string(),
                    describe(event),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("[{role}] {}: {}", event.kind(), describe(event));
        }
        OutputFormat::Raw => {
            if let ReaderEvent::Message(payload) = event {
                print_raw(payload.as_ref());
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// Console prompt, written without a trailing newline.
pub fn prompt(text: &str) {
    let mut out = std::io::stdout();
    let _ = out.write_all(text.as_bytes());
    let _ = out.flush();
}

fn event_output<'a>(event: &ReaderEvent, role: &'a str) -> EventOutput<'a> {
    let mut out = EventOutput {
        event: event.kind(),
        role,
        payload: None,
        payload_size: None,
        baud_rate: None,
        os_code: None,
        detail: describe(event),
        timestamp: now_unix_seconds(),
    };
    match event {
        ReaderEvent::Message(payload) => {
            out.payload = Some(payload_preview(payload.as_ref()));
            out.payload_size = Some(payload.len());
        }
        ReaderEvent::BaudChanged(rate) => out.baud_rate = Some(*rate),
        ReaderEvent::IoFailure { os_code, .. } => out.os_code = *os_code,
        _ => {}
    }
    out
}

fn describe(event: &ReaderEvent) -> String {
    match event {
        ReaderEvent::Message(payload) => payload_preview(payload.as_ref()),
        ReaderEvent::BaudChanged(rate) => format!("now at {rate} baud"),
        ReaderEvent::ShutdownRequested => "peer closed the session".to_string(),
        ReaderEvent::ProtocolCorruption {
            expected,
            received,
            length,
        } => format!(
            "parity mismatch on {length}-byte string (expected {expected}, received {received})"
        ),
        ReaderEvent::MalformedFrame { length } => format!("send-string length {length} skipped"),
        ReaderEvent::UnknownCommand(code) => format!("command byte 0x{code:02X}"),
        ReaderEvent::IoFailure { message, os_code } => match os_code {
            Some(code) if !message.contains("os error") => format!("{message} (os error {code})"),
            _ => message.clone(),
        },
    }
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
