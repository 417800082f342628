use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use rigwire_control::DEFAULT_CONTROL_PORT;
use rigwire_video::DEFAULT_VIDEO_PORT;

use crate::exit::{CliError, CliResult, INTERNAL};
use crate::output::OutputFormat;

pub mod control;
pub mod send;
pub mod send_frame;
pub mod version;
pub mod video;

const ANY_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Receive the rig's video stream and print each delivered frame.
    Video(VideoArgs),
    /// Listen for the rig's control connection and print its events.
    Control(ControlArgs),
    /// Push one command to a listening device.
    Send(SendArgs),
    /// Fragment a file and stream it as video datagrams.
    SendFrame(SendFrameArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Video(args) => video::run(args, format),
        Command::Control(args) => control::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::SendFrame(args) => send_frame::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct VideoArgs {
    /// UDP port to receive on (0 picks one).
    #[arg(long, default_value_t = DEFAULT_VIDEO_PORT)]
    pub port: u16,
    /// Local address to bind.
    #[arg(long, default_value_t = ANY_ADDR)]
    pub bind: IpAddr,
    /// Exit after delivering N frames.
    #[arg(long)]
    pub count: Option<u64>,
    /// Exit after this long (e.g. 10s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// Write every delivered frame into this directory.
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<PathBuf>,
    /// Minimum spacing between delivered frames; 0 disables throttling.
    #[arg(long, default_value = "33ms")]
    pub min_interval: String,
    /// Drop frames that are not a complete JPEG image.
    #[arg(long)]
    pub jpeg_check: bool,
    /// Reassembly buffer size in bytes.
    #[arg(long)]
    pub capacity: Option<usize>,
    /// Requested kernel receive buffer in bytes.
    #[arg(long)]
    pub recv_buffer: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ControlArgs {
    /// TCP port to listen on (0 picks one).
    #[arg(long, default_value_t = DEFAULT_CONTROL_PORT)]
    pub port: u16,
    /// Local address to bind.
    #[arg(long, default_value_t = ANY_ADDR)]
    pub bind: IpAddr,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit after this long (e.g. 10s, 500ms).
    #[arg(long)]
    pub duration: Option<String>,
    /// JSON message sent to every peer as soon as it connects.
    #[arg(long, value_name = "JSON")]
    pub on_connect: Option<String>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address (host:port).
    pub addr: String,
    /// Command name, wrapped in a `{"type":"cmd",...}` envelope.
    #[arg(long, short = 'c', required_unless_present = "json", conflicts_with = "json")]
    pub command: Option<String>,
    /// Command arguments as a JSON object.
    #[arg(long, default_value = "{}")]
    pub args: String,
    /// Send this JSON value as-is instead of building an envelope.
    #[arg(long)]
    pub json: Option<String>,
    /// Write bare JSON without the length prefix.
    #[arg(long)]
    pub raw: bool,
    /// Connect timeout (e.g. 1s, 500ms).
    #[arg(long, default_value = "1s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendFrameArgs {
    /// Receiver address (host:port).
    pub addr: String,
    /// File holding one encoded frame.
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,
    /// Payload bytes per datagram, excluding the flag byte.
    #[arg(long, default_value_t = 1400)]
    pub chunk_size: usize,
    /// Send the frame this many times.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Pause between repeats; 0 sends back to back.
    #[arg(long, default_value = "33ms")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `150ms` or a bare number of seconds. Zero is rejected.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let duration = parse_interval(input)?;
    if duration.is_zero() {
        return Err(CliError::usage("duration must be greater than zero"));
    }
    Ok(duration)
}

/// Like [`parse_duration`], but `0` is allowed.
pub fn parse_interval(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Resolve `host:port` to the first address it names.
pub fn resolve_addr(input: &str) -> CliResult<SocketAddr> {
    input
        .to_socket_addrs()
        .map_err(|err| CliError::usage(format!("invalid address {input:?}: {err}")))?
        .next()
        .ok_or_else(|| CliError::usage(format!("address {input:?} did not resolve")))
}

/// Flag cleared by Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn parse_interval_allows_zero() {
        assert_eq!(parse_interval("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_interval("0ms").unwrap(), Duration::ZERO);
    }

    #[test]
    fn resolve_addr_accepts_literal_and_rejects_garbage() {
        assert_eq!(
            resolve_addr("127.0.0.1:55555").unwrap(),
            SocketAddr::from(([127, 0, 0, 1], 55555))
        );
        assert!(resolve_addr("no-port-here").is_err());
    }
}
