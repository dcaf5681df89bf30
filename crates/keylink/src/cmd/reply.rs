use keylink_frame::{FrameError, FrameReader};
use keylink_fw::{CommandHeader, FwConfig, FwLink, FwResponse, LengthClass};
use keylink_transport::MemoryChannel;
use serde::Serialize;

use crate::cmd::{parse_byte, parse_hex, ReplyArgs};
use crate::exit::{frame_error, fw_error, CliResult, SUCCESS};
use crate::output::{hex, print_frames, print_json, print_raw, FrameOutput, OutputFormat};

#[derive(Serialize)]
struct ReplyOutput {
    code: String,
    kind: &'static str,
    length: usize,
    frames: Vec<FrameOutput>,
    wire: String,
}

pub fn run(args: ReplyArgs, format: OutputFormat) -> CliResult<i32> {
    let code = match args.kind.parse::<FwResponse>() {
        Ok(kind) => kind.code(),
        Err(_) => parse_byte(&args.kind)?,
    };
    let data = args.hex.as_deref().map(parse_hex).transpose()?.unwrap_or_default();
    let command = CommandHeader::new(args.id, args.endpoint, LengthClass::Len1);

    let mut link = FwLink::new(MemoryChannel::default(), &FwConfig::default());
    link.reply(&command, code, &data)
        .map_err(|err| fw_error("reply not sent", err))?;
    let wire = link.into_inner().take_written();

    let mut reader = FrameReader::new(MemoryChannel::with_input(&wire));
    let mut frames = Vec::new();
    loop {
        match reader.read_frame() {
            Ok(frame) => frames.push(frame),
            Err(FrameError::ConnectionClosed) => break,
            Err(err) => return Err(frame_error("reply frames", err)),
        }
    }

    match format {
        OutputFormat::Json => {
            let kind = FwResponse::from_code(code);
            print_json(&ReplyOutput {
                code: format!("{code:#04x}"),
                kind: kind.map_or("UNKNOWN", FwResponse::name),
                length: kind.map_or(0, |k| k.length_class().bytes()),
                frames: frames.iter().map(FrameOutput::new).collect(),
                wire: hex(&wire),
            });
        }
        OutputFormat::Raw => print_raw(&wire),
        OutputFormat::Table | OutputFormat::Pretty => print_frames(&frames, format),
    }
    Ok(SUCCESS)
}
