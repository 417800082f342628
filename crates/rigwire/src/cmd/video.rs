use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use rigwire_video::{
    FrameDecoder, IngestSnapshot, JpegFrameCheck, PassthroughDecoder, ReadyFrame, VideoConfig,
    VideoIngestChannel,
};
use serde::Serialize;
use tracing::info;

use crate::cmd::{install_ctrlc_handler, parse_duration, parse_interval, VideoArgs};
use crate::exit::{io_error, video_error, CliResult, SUCCESS};
use crate::output::{print_record, OutputFormat};

const POLL: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct ListeningRecord {
    event: &'static str,
    addr: SocketAddr,
}

#[derive(Serialize)]
struct FrameRecord {
    event: &'static str,
    sequence: u64,
    len: usize,
    saved_to: Option<String>,
}

#[derive(Serialize)]
struct StatsRecord {
    event: &'static str,
    #[serde(flatten)]
    stats: IngestSnapshot,
}

pub fn run(args: VideoArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = VideoConfig {
        bind_addr: args.bind,
        min_frame_interval: parse_interval(&args.min_interval)?,
        ..VideoConfig::default()
    };
    if let Some(capacity) = args.capacity {
        config.reassembly_capacity = capacity;
    }
    if args.recv_buffer.is_some() {
        config.recv_buffer_size = args.recv_buffer;
    }

    if let Some(dir) = &args.save_dir {
        fs::create_dir_all(dir)
            .map_err(|err| io_error(&format!("failed creating {}", dir.display()), err))?;
    }

    if args.jpeg_check {
        receive(args, config, JpegFrameCheck, "jpg", format)
    } else {
        receive(args, config, PassthroughDecoder, "bin", format)
    }
}

fn receive<D>(
    args: VideoArgs,
    config: VideoConfig,
    decoder: D,
    extension: &str,
    format: OutputFormat,
) -> CliResult<i32>
where
    D: FrameDecoder,
    D::Image: AsRef<[u8]>,
{
    let deadline = args
        .duration
        .as_deref()
        .map(parse_duration)
        .transpose()?
        .map(|limit| Instant::now() + limit);
    let running = install_ctrlc_handler()?;

    let (channel, frames) = VideoIngestChannel::new(config, decoder);
    let addr = channel
        .start(args.port)
        .map_err(|err| video_error("video bind failed", err))?;
    print_record(
        &ListeningRecord {
            event: "listening",
            addr,
        },
        format,
    );

    let mut delivered = 0u64;
    let mut failure = None;
    while running.load(Ordering::SeqCst) {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        let ready = match frames.recv_timeout(POLL) {
            Ok(ready) => ready,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match handle_frame(ready, args.save_dir.as_deref(), extension) {
            Ok(record) => print_record(&record, format),
            Err(err) => {
                failure = Some(err);
                break;
            }
        }

        delivered += 1;
        if args.count.is_some_and(|count| delivered >= count) {
            break;
        }
    }

    channel.stop();
    let stats = channel.stats();
    info!(delivered, dropped = stats.dropped(), "video receive finished");
    print_record(
        &StatsRecord {
            event: "stats",
            stats,
        },
        format,
    );

    match failure {
        Some(err) => Err(err),
        None => Ok(SUCCESS),
    }
}

fn handle_frame<T: AsRef<[u8]>>(
    ready: ReadyFrame<T>,
    save_dir: Option<&Path>,
    extension: &str,
) -> CliResult<FrameRecord> {
    let sequence = ready.sequence;
    let len = ready.len;
    let image = ready.finish();

    let saved_to = match save_dir {
        Some(dir) => {
            let path = frame_path(dir, sequence, extension);
            fs::write(&path, image.as_ref())
                .map_err(|err| io_error(&format!("failed writing {}", path.display()), err))?;
            Some(path.display().to_string())
        }
        None => None,
    };

    Ok(FrameRecord {
        event: "frame",
        sequence,
        len,
        saved_to,
    })
}

fn frame_path(dir: &Path, sequence: u64, extension: &str) -> PathBuf {
    dir.join(format!("frame-{sequence:06}.{extension}"))
}
