use std::fmt::Write as _;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use keylink_frame::Frame;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
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

#[derive(Serialize)]
pub struct FrameOutput {
    pub channel: &'static str,
    pub channel_id: u8,
    pub length: usize,
    pub payload: String,
}

impl FrameOutput {
    pub fn new(frame: &Frame) -> Self {
        Self {
            channel: frame.channel.name(),
            channel_id: frame.channel.as_u8(),
            length: frame.payload.len(),
            payload: hex(&frame.payload),
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_table(header: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    println!("{table}");
}

/// One line per frame in the requested format. `Raw` writes the wire bytes.
pub fn print_frames(frames: &[Frame], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for frame in frames {
                print_json(&FrameOutput::new(frame));
            }
        }
        OutputFormat::Table => print_table(
            &["#", "CHANNEL", "LEN", "PAYLOAD"],
            frames
                .iter()
                .enumerate()
                .map(|(i, frame)| {
                    vec![
                        i.to_string(),
                        format!("{} ({:#04x})", frame.channel, frame.channel.as_u8()),
                        frame.payload.len().to_string(),
                        payload_preview(&frame.payload),
                    ]
                })
                .collect(),
        ),
        OutputFormat::Pretty => {
            for frame in frames {
                println!(
                    "channel={} len={} payload={}",
                    frame.channel,
                    frame.payload.len(),
                    payload_preview(&frame.payload)
                );
            }
        }
        OutputFormat::Raw => {
            let mut wire = Vec::new();
            for frame in frames {
                wire.push(frame.channel.as_u8());
                wire.push(frame.payload.len() as u8);
                wire.extend_from_slice(&frame.payload);
            }
            print_raw(&wire);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Printable ASCII as text, anything else as hex.
pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) if text.chars().all(|c| !c.is_control()) => format!("{text:?}"),
        _ => hex(payload),
    }
}
