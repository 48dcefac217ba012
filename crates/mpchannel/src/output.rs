use std::io::{IsTerminal, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use mpchannel_frame::{encode_to_vec, Message};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// The wire frame exactly as it travels over the channel.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// What happened to a printed message.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Event {
    Received,
    Sent,
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    event: Event,
    #[serde(rename = "type")]
    type_name: &'a str,
    action: &'a str,
    timeout: u64,
    channel: String,
    timestamp: String,
}

pub fn print_message(message: &Message, event: Event, channel: &Path, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                event,
                type_name: message.type_name(),
                action: message.kind().action(),
                timeout: message.timeout(),
                channel: channel.display().to_string(),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["EVENT", "ACTION", "TIMEOUT", "CHANNEL"])
                .add_row(vec![
                    event_name(event).to_string(),
                    message.kind().action().to_string(),
                    message.timeout().to_string(),
                    channel.display().to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} timeout={}s channel={}",
                event_name(event),
                message.type_name(),
                message.timeout(),
                channel.display()
            );
        }
        OutputFormat::Raw => {
            if let Ok(wire) = encode_to_vec(message) {
                print_raw(&wire);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn event_name(event: Event) -> &'static str {
    match event {
        Event::Received => "received",
        Event::Sent => "sent",
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
