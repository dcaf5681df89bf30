use keylink_frame::{decode_frame, FrameWriter, MAX_PAYLOAD};
use keylink_transport::MemoryChannel;
use serde::Serialize;

use crate::cmd::{parse_hex, EncodeArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS};
use crate::output::{hex, print_frames, print_json, print_raw, OutputFormat};

#[derive(Serialize)]
struct EncodeOutput {
    channel: &'static str,
    frames: usize,
    bytes: usize,
    wire: String,
}

pub fn run(args: EncodeArgs, format: OutputFormat) -> CliResult<i32> {
    if args.chunk == 0 || args.chunk > MAX_PAYLOAD {
        return Err(CliError::usage(format!(
            "--chunk must be 1..={MAX_PAYLOAD}, got {}",
            args.chunk
        )));
    }
    let payload = resolve_payload(&args)?;

    let mut writer = FrameWriter::new(MemoryChannel::default());
    let count = if payload.is_empty() {
        writer.send(args.channel, &[]).map(|()| 1)
    } else {
        writer.send_chunked(args.channel, &payload, args.chunk)
    }
    .map_err(|err| frame_error("encode failed", err))?;
    let wire = writer.into_inner().take_written();

    match format {
        OutputFormat::Raw => print_raw(&wire),
        OutputFormat::Json => print_json(&EncodeOutput {
            channel: args.channel.name(),
            frames: count,
            bytes: wire.len(),
            wire: hex(&wire),
        }),
        OutputFormat::Table | OutputFormat::Pretty => {
            let mut buf = wire.as_slice().into();
            let mut frames = Vec::with_capacity(count);
            while let Some(frame) =
                decode_frame(&mut buf, MAX_PAYLOAD).map_err(|err| frame_error("encode failed", err))?
            {
                frames.push(frame);
            }
            print_frames(&frames, format);
        }
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &EncodeArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return std::fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
