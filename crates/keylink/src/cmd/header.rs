use keylink_fw::CommandHeader;
use serde::Serialize;

use crate::cmd::{parse_byte, HeaderArgs};
use crate::exit::{CliError, CliResult, DATA_INVALID, SUCCESS};
use crate::output::{print_json, print_raw, print_table, OutputFormat};

#[derive(Serialize)]
struct HeaderOutput {
    byte: String,
    id: u8,
    endpoint: &'static str,
    status: bool,
    length: usize,
}

pub fn run(args: HeaderArgs, format: OutputFormat) -> CliResult<i32> {
    let byte = parse_byte(&args.byte)?;
    let header = CommandHeader::decode(byte)
        .map_err(|err| CliError::new(DATA_INVALID, format!("header rejected: {err}")))?;

    let out = HeaderOutput {
        byte: format!("{byte:#04x}"),
        id: header.id,
        endpoint: header.endpoint.name(),
        status: header.status,
        length: header.payload_len(),
    };

    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => print_table(
            &["BYTE", "ID", "ENDPOINT", "LENGTH"],
            vec![vec![
                out.byte,
                out.id.to_string(),
                out.endpoint.to_string(),
                out.length.to_string(),
            ]],
        ),
        OutputFormat::Pretty => println!(
            "byte={} id={} endpoint={} length={}",
            out.byte, out.id, out.endpoint, out.length
        ),
        OutputFormat::Raw => print_raw(&[byte]),
    }
    Ok(SUCCESS)
}
