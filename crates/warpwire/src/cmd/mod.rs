use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod loopback;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode warp atoms and print their control messages.
    Decode(DecodeArgs),
    /// Encode one control message as a warp atom on stdout.
    Encode(EncodeArgs),
    /// Serve inits to an in-memory client and report what it received.
    Loopback(LoopbackArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args),
        Command::Loopback(args) => loopback::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// File holding the channel bytes. Reads stdin when omitted.
    pub file: Option<PathBuf>,
    /// Treat input as an init channel: one init atom, then raw init bytes.
    #[arg(long)]
    pub init_stream: bool,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Announce an init with this id.
    #[arg(long, value_name = "ID")]
    pub init: Option<String>,
    /// Request a bandwidth ceiling in bits per second.
    #[arg(long, value_name = "BPS")]
    pub max_bitrate: Option<u64>,
    /// Append this file's bytes unframed after the atom.
    #[arg(long, value_name = "FILE", requires = "init")]
    pub raw: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LoopbackArgs {
    /// Init to announce, as ID=PATH. Repeatable; announced in order.
    #[arg(long = "init", value_name = "ID=PATH")]
    pub inits: Vec<String>,
    /// Bandwidth hint the client sends before receiving inits.
    #[arg(long, value_name = "BPS")]
    pub max_bitrate: Option<u64>,
    /// Give up after this long (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
