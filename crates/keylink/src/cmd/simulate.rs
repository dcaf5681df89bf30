use keylink_bridge::{Bridge, BridgeConfig, LinkContext, PollOutcome, RecordingSink, UsbEndpoint};
use keylink_frame::RestartCause;
use keylink_transport::{MemoryChannel, RecordingLine};
use serde::Serialize;

use crate::cmd::{mask_of, read_input, SimulateArgs};
use crate::exit::{bridge_error, restart, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{hex, print_json, print_table, OutputFormat};

#[derive(Serialize)]
struct TransferOutput {
    endpoint: &'static str,
    length: usize,
    data: String,
}

#[derive(Serialize)]
struct SimulateOutput {
    bytes_in: usize,
    bytes_accepted: usize,
    transfers: Vec<TransferOutput>,
    delivered: u64,
    discarded: u64,
    stalls: u64,
    ignored_control: u64,
    pauses: usize,
    resumes: usize,
    overruns: usize,
    left_in_ring: usize,
    restart: Option<String>,
}

struct InFlight {
    endpoint: UsbEndpoint,
    polls_left: u32,
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let capture = read_input(&args.input)?;
    let persisted = args.active.as_deref().map_or(0, |channels| mask_of(channels).bits());
    let config = BridgeConfig::from_persisted(persisted);

    let link: LinkContext<RecordingLine> = LinkContext::new(RecordingLine::new(), &config)
        .map_err(|err| bridge_error("bridge setup failed", err))?;
    link.start();
    let mut bridge = Bridge::new(RecordingSink::new(), MemoryChannel::default(), &link);

    let mut transfers = Vec::new();
    let mut in_flight: Vec<InFlight> = Vec::new();
    let mut pos = 0usize;
    let mut restart_cause: Option<RestartCause> = None;
    let mut stuck = false;

    loop {
        // the peer only transmits while the line is up
        while pos < capture.len() && link.flow().line().may_send() {
            link.on_uart_rx(capture[pos]);
            pos += 1;
        }

        // completions land before the poll so a stalled frame sees them
        in_flight.retain_mut(|t| {
            if t.polls_left == 0 {
                link.on_transfer_complete(t.endpoint);
                false
            } else {
                t.polls_left -= 1;
                true
            }
        });

        let outcome = bridge
            .poll(&link)
            .map_err(|err| bridge_error("bridge poll failed", err))?;

        for transfer in bridge.sink_mut().take() {
            in_flight.push(InFlight {
                endpoint: transfer.endpoint,
                polls_left: args.usb_latency,
            });
            transfers.push(transfer);
        }

        match outcome {
            PollOutcome::Restart(cause) => {
                restart_cause = Some(cause);
                break;
            }
            PollOutcome::Idle if in_flight.is_empty() => {
                if pos < capture.len() && !link.flow().line().may_send() {
                    stuck = true;
                }
                if stuck || pos == capture.len() {
                    break;
                }
            }
            PollOutcome::Idle | PollOutcome::Progressed => {}
        }
    }

    let stats = bridge.stats();
    let line = link.flow().line();
    let out = SimulateOutput {
        bytes_in: capture.len(),
        bytes_accepted: pos,
        transfers: transfers
            .iter()
            .map(|t| TransferOutput {
                endpoint: t.endpoint.channel().name(),
                length: t.data.len(),
                data: hex(&t.data),
            })
            .collect(),
        delivered: stats.delivered,
        discarded: stats.discarded,
        stalls: stats.stalls,
        ignored_control: stats.ignored_control,
        pauses: line.pauses(),
        resumes: line.resumes(),
        overruns: link.ring().overruns(),
        left_in_ring: link.ring().occupancy(),
        restart: restart_cause.map(|cause| cause.to_string()),
    };
    print_report(&out, format);

    if let Some(cause) = restart_cause {
        return Err(restart("simulation", cause));
    }
    if stuck {
        return Err(CliError::new(
            FAILURE,
            format!("bridge stalled with the peer paused after {pos} bytes"),
        ));
    }
    Ok(SUCCESS)
}

fn print_report(out: &SimulateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => print_json(out),
        OutputFormat::Table => {
            print_table(
                &["#", "ENDPOINT", "LEN", "DATA"],
                out.transfers
                    .iter()
                    .enumerate()
                    .map(|(i, t)| {
                        vec![
                            i.to_string(),
                            t.endpoint.to_string(),
                            t.length.to_string(),
                            t.data.clone(),
                        ]
                    })
                    .collect(),
            );
            print_table(
                &["DELIVERED", "DISCARDED", "STALLS", "PAUSES", "RESUMES", "OVERRUNS", "RESTART"],
                vec![vec![
                    out.delivered.to_string(),
                    out.discarded.to_string(),
                    out.stalls.to_string(),
                    out.pauses.to_string(),
                    out.resumes.to_string(),
                    out.overruns.to_string(),
                    out.restart.clone().unwrap_or_else(|| "-".to_string()),
                ]],
            );
        }
        OutputFormat::Pretty => {
            for t in &out.transfers {
                println!("transfer endpoint={} len={} data={}", t.endpoint, t.length, t.data);
            }
            println!(
                "delivered={} discarded={} stalls={} pauses={} resumes={} overruns={} restart={}",
                out.delivered,
                out.discarded,
                out.stalls,
                out.pauses,
                out.resumes,
                out.overruns,
                out.restart.as_deref().unwrap_or("-")
            );
        }
    }
}
