use std::net::SocketAddr;

use rigwire_control::{send_oneshot, ConnectConfig, ControlEnvelope, Framing};
use serde::Serialize;
use serde_json::Value;

use crate::cmd::{parse_duration, resolve_addr, SendArgs};
use crate::exit::{control_error, CliError, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

#[derive(Serialize)]
struct SentRecord {
    event: &'static str,
    addr: SocketAddr,
    bytes: usize,
    framing: &'static str,
}

/// What goes on the wire. Envelopes keep their `type`, `command`, `args`
/// field order.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
enum Message {
    Envelope(ControlEnvelope),
    Json(Value),
}

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let addr = resolve_addr(&args.addr)?;
    let message = build_message(&args)?;
    let config = ConnectConfig {
        connect_timeout: parse_duration(&args.timeout)?,
        framing: if args.raw {
            Framing::Raw
        } else {
            Framing::LengthPrefixed
        },
        ..ConnectConfig::default()
    };

    let bytes = send_oneshot(addr, &message, &config)
        .map_err(|err| control_error("send failed", err))?;

    print_record(
        &SentRecord {
            event: "sent",
            addr,
            bytes,
            framing: match config.framing {
                Framing::LengthPrefixed => "length_prefixed",
                Framing::Raw => "raw",
            },
        },
        format,
    );
    Ok(SUCCESS)
}

fn build_message(args: &SendArgs) -> CliResult<Message> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map(Message::Json)
            .map_err(|err| CliError::usage(format!("--json is not valid JSON: {err}")));
    }

    let command = args
        .command
        .as_deref()
        .ok_or_else(|| CliError::usage("either --command or --json is required"))?;
    let command_args: Value = serde_json::from_str(&args.args)
        .map_err(|err| CliError::usage(format!("--args is not valid JSON: {err}")))?;
    if !command_args.is_object() {
        return Err(CliError::usage("--args must be a JSON object"));
    }

    Ok(Message::Envelope(ControlEnvelope::command(
        command,
        command_args,
    )))
}
