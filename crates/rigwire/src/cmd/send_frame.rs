use std::fs;
use std::net::{SocketAddr, UdpSocket};
use std::thread;

use rigwire_codec::{fragment_frame, FRAGMENT_HEADER_SIZE};
use serde::Serialize;
use tracing::debug;

use crate::cmd::{parse_interval, resolve_addr, SendFrameArgs};
use crate::exit::{io_error, CliError, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

/// Largest UDP payload over IPv4.
const MAX_DATAGRAM: usize = 65_507;

#[derive(Serialize)]
struct FramesSentRecord {
    event: &'static str,
    addr: SocketAddr,
    frames: u32,
    datagrams: usize,
    frame_len: usize,
}

pub fn run(args: SendFrameArgs, format: OutputFormat) -> CliResult<i32> {
    let max_chunk = MAX_DATAGRAM - FRAGMENT_HEADER_SIZE;
    if args.chunk_size == 0 || args.chunk_size > max_chunk {
        return Err(CliError::usage(format!(
            "--chunk-size must be between 1 and {max_chunk}"
        )));
    }
    let addr = resolve_addr(&args.addr)?;
    let interval = parse_interval(&args.interval)?;
    let frame = fs::read(&args.file).map_err(|err| {
        io_error(&format!("failed reading {}", args.file.display()), err)
    })?;
    if frame.is_empty() {
        return Err(CliError::usage("frame file is empty"));
    }

    let local: SocketAddr = if addr.is_ipv6() {
        SocketAddr::from(([0u16; 8], 0))
    } else {
        SocketAddr::from(([0u8; 4], 0))
    };
    let socket = UdpSocket::bind(local).map_err(|err| io_error("udp bind failed", err))?;

    let mut datagrams = 0usize;
    for round in 0..args.repeat {
        if round > 0 && !interval.is_zero() {
            thread::sleep(interval);
        }
        for datagram in fragment_frame(&frame, args.chunk_size) {
            socket
                .send_to(&datagram, addr)
                .map_err(|err| io_error("udp send failed", err))?;
            datagrams += 1;
        }
        debug!(round, %addr, "frame sent");
    }

    print_record(
        &FramesSentRecord {
            event: "frames_sent",
            addr,
            frames: args.repeat,
            datagrams,
            frame_len: frame.len(),
        },
        format,
    );
    Ok(SUCCESS)
}
