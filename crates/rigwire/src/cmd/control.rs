use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use rigwire_control::{ControlChannel, ControlConfig, ControlEvent, Delivery};
use serde_json::Value;
use tracing::{info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, ControlArgs};
use crate::exit::{control_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_record, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

pub fn run(args: ControlArgs, format: OutputFormat) -> CliResult<i32> {
    let greeting = args
        .on_connect
        .as_deref()
        .map(|text| {
            serde_json::from_str::<Value>(text).map_err(|err| {
                CliError::new(USAGE, format!("--on-connect is not valid JSON: {err}"))
            })
        })
        .transpose()?;
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|limit| Instant::now() + limit);
    let running = install_ctrlc_handler()?;

    let config = ControlConfig {
        bind_addr: args.bind,
        ..ControlConfig::default()
    };
    let (channel, events) = ControlChannel::new(config);
    channel
        .start(args.port)
        .map_err(|err| control_error("control bind failed", err))?;

    let mut messages = 0usize;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        let event = match events.recv_timeout(POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        print_record(&event, format);

        match &event {
            ControlEvent::Connected { peer } => {
                if let Some(greeting) = &greeting {
                    match channel.send_json(greeting) {
                        Ok(Delivery::Sent) => info!(%peer, "greeting sent"),
                        Ok(delivery) => warn!(%peer, ?delivery, "greeting not delivered"),
                        Err(err) => return Err(control_error("greeting failed", err)),
                    }
                }
            }
            ControlEvent::Message { .. } => {
                messages += 1;
                if args.count.is_some_and(|count| messages >= count) {
                    break;
                }
            }
            _ => {}
        }
    }

    channel.stop();
    for event in events.try_iter() {
        print_record(&event, format);
    }
    Ok(SUCCESS)
}
