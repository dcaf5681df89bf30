use keylink_frame::{ChannelMask, FrameError, FrameReader};
use keylink_transport::MemoryChannel;

use crate::cmd::{mask_of, read_input, DecodeArgs};
use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_frames, OutputFormat};

pub fn run(args: DecodeArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_input(&args.input)?;
    let active = args
        .active
        .as_deref()
        .map_or_else(ChannelMask::all, mask_of);

    let mut reader = FrameReader::with_active(MemoryChannel::with_input(&capture), active);
    let mut frames = Vec::new();
    let outcome = loop {
        match reader.read_frame() {
            Ok(frame) => frames.push(frame),
            Err(FrameError::ConnectionClosed) if !reader.mid_frame() => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    print_frames(&frames, format);
    tracing::info!(
        bytes = capture.len(),
        frames = frames.len(),
        discarded = reader.discarded(),
        "capture decoded"
    );

    match outcome {
        Ok(()) => Ok(SUCCESS),
        Err(FrameError::ConnectionClosed) => Err(CliError::new(
            DATA_INVALID,
            format!("capture ends inside a frame after {} complete frames", frames.len()),
        )),
        Err(err) => Err(frame_error(
            &format!("decode stopped after {} frames", frames.len()),
            err,
        )),
    }
}
