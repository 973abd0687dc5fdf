use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use warpwire_frame::{Atom, Message};

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
struct MessageOutput<'a> {
    index: usize,
    atom_size: usize,
    init_id: Option<&'a str>,
    max_bitrate: Option<u64>,
    payload: String,
}

impl<'a> MessageOutput<'a> {
    fn new(index: usize, atom: &Atom, msg: &'a Message) -> Self {
        Self {
            index,
            atom_size: atom.wire_size(),
            init_id: msg.init.as_ref().map(|init| init.id.as_str()),
            max_bitrate: msg.debug.map(|debug| debug.max_bitrate),
            payload: payload_preview(&atom.payload),
        }
    }
}

/// Print decoded control messages.
pub fn print_messages(decoded: &[(Atom, Message)], format: OutputFormat) {
    let rows: Vec<MessageOutput<'_>> = decoded
        .iter()
        .enumerate()
        .map(|(index, (atom, msg))| MessageOutput::new(index, atom, msg))
        .collect();

    match format {
        OutputFormat::Json => {
            for row in &rows {
                println!(
                    "{}",
                    serde_json::to_string(row).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "SIZE", "INIT", "MAX BITRATE", "PAYLOAD"]);
            for row in &rows {
                table.add_row(vec![
                    row.index.to_string(),
                    row.atom_size.to_string(),
                    row.init_id.unwrap_or("-").to_string(),
                    optional(row.max_bitrate),
                    row.payload.clone(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for row in &rows {
                println!(
                    "atom={} size={} init={} max_bitrate={} payload={}",
                    row.index,
                    row.atom_size,
                    row.init_id.unwrap_or("-"),
                    optional(row.max_bitrate),
                    row.payload
                );
            }
        }
        OutputFormat::Raw => {
            for (atom, _) in decoded {
                print_raw(&atom.payload);
                println!();
            }
        }
    }
}

/// One init channel as seen by the receiving peer.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub id: String,
    pub priority: Option<i32>,
    pub size: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionReport {
    pub inits: Vec<InitOutput>,
    pub max_bandwidth: Option<u64>,
    pub close_code: u32,
    pub close_name: &'static str,
    pub close_reason: String,
}

pub fn print_inits(inits: &[InitOutput], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            for init in inits {
                println!(
                    "{}",
                    serde_json::to_string(init).unwrap_or_else(|_| "{}".to_string())
                );
            }
        }
        OutputFormat::Table => println!("{}", init_table(inits)),
        OutputFormat::Pretty => {
            for init in inits {
                println!(
                    "init={} priority={} size={}",
                    init.id,
                    optional(init.priority),
                    init.size
                );
            }
        }
        OutputFormat::Raw => {
            for init in inits {
                println!("{}", init.id);
            }
        }
    }
}

pub fn print_session(report: &SessionReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Session:");
            println!("  Inits received:   {}", report.inits.len());
            println!("  Max bandwidth:    {}", optional(report.max_bandwidth));
            println!(
                "  Closed:           {} ({}) {}",
                report.close_code, report.close_name, report.close_reason
            );
            if !report.inits.is_empty() {
                println!("{}", init_table(&report.inits));
            }
        }
        OutputFormat::Raw => {
            println!("{} {}", report.close_code, report.close_reason);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn init_table(inits: &[InitOutput]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["INIT", "PRIORITY", "SIZE"]);
    for init in inits {
        table.add_row(vec![
            init.id.clone(),
            optional(init.priority),
            init.size.to_string(),
        ]);
    }
    table
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "-".to_string(), |v| v.to_string())
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}
