use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use keylink_frame::{ChannelId, ChannelMask};
use keylink_fw::Endpoint;

use crate::exit::{io_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod decode;
pub mod encode;
pub mod header;
pub mod reply;
pub mod simulate;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a raw UART capture into frames.
    Decode(DecodeArgs),
    /// Encode a payload into wire frames.
    Encode(EncodeArgs),
    /// Decode a secure-core command header byte.
    Header(HeaderArgs),
    /// Show the transport frames a secure-core reply is sent as.
    Reply(ReplyArgs),
    /// Feed a capture through a simulated bridge.
    Simulate(SimulateArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Decode(args) => decode::run(args, format),
        Command::Encode(args) => encode::run(args, format),
        Command::Header(args) => header::run(args, format),
        Command::Reply(args) => reply::run(args, format),
        Command::Simulate(args) => simulate::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Capture file, or `-` for stdin.
    pub input: PathBuf,
    /// Channels to deliver (comma-separated). Others are counted as discarded.
    #[arg(long, value_delimiter = ',')]
    pub active: Option<Vec<ChannelId>>,
}

#[derive(Args, Debug)]
pub struct EncodeArgs {
    /// Channel to frame the payload on.
    #[arg(long, short = 'c', default_value = "cdc")]
    pub channel: ChannelId,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["hex", "file"])]
    pub data: Option<String>,
    /// Hex payload, e.g. `01c0` or `01 c0`.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub file: Option<PathBuf>,
    /// Largest payload per frame.
    #[arg(long, default_value_t = keylink_frame::MAX_PAYLOAD)]
    pub chunk: usize,
}

#[derive(Args, Debug)]
pub struct HeaderArgs {
    /// Header byte, hex (`0x12`) or decimal.
    pub byte: String,
}

#[derive(Args, Debug)]
pub struct ReplyArgs {
    /// Response kind name (e.g. `name-version`) or code (e.g. `0x02`).
    #[arg(long)]
    pub kind: String,
    /// Transaction id of the command being answered (0-3).
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..4))]
    pub id: u8,
    /// Endpoint of the command being answered.
    #[arg(long, default_value = "fw")]
    pub endpoint: Endpoint,
    /// Reply data after the response code, in hex.
    #[arg(long)]
    pub hex: Option<String>,
}

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Capture of bytes sent by the secure core, or `-` for stdin.
    pub input: PathBuf,
    /// Endpoints enabled on the bridge (comma-separated). CDC and CONTROL
    /// are always enabled.
    #[arg(long, value_delimiter = ',')]
    pub active: Option<Vec<ChannelId>>,
    /// Hold USB IN transfers until this many polls have passed.
    #[arg(long, default_value_t = 0)]
    pub usb_latency: u32,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn read_input(path: &Path) -> CliResult<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .map_err(|err| io_error("failed reading stdin", err))?;
        return Ok(buf);
    }
    std::fs::read(path).map_err(|err| io_error(&format!("failed reading {}", path.display()), err))
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(CliError::usage(format!("expected pairs of hex digits: {input}")));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex: {input}")))
        })
        .collect()
}

pub fn parse_byte(input: &str) -> CliResult<u8> {
    let input = input.trim();
    let parsed = match input.strip_prefix("0x").or_else(|| input.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse::<u8>(),
    };
    parsed.map_err(|_| CliError::usage(format!("not a byte value: {input}")))
}

pub fn mask_of(channels: &[ChannelId]) -> ChannelMask {
    channels
        .iter()
        .fold(ChannelMask::empty(), |mask, ch| mask | ch.mask())
}
