// sabr_download.rs
//
// Run with `cargo run --example sabr_download -- --audio-itag 140 --video-itag 137 \
//   --ustreamer-config-b64 <BASE64> <SABR-URL>`
//

use std::path::PathBuf;
use std::process;

use base64::Engine;
use clap::Parser;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use sabr_stream::proto::FormatId;
use sabr_stream::sabr::{Event, FormatWriter, SeekReason};
use sabr_stream::{FormatSelector, SabrSession, SabrSessionConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(about = "Download audio/video from a YouTube SABR streaming URL")]
struct Args {
    /// SABR streaming URL, as found in a player response's streamingData.serverAbrStreamingUrl
    url: String,

    /// Base64-encoded videoPlaybackUstreamerConfig from the player response
    #[arg(long)]
    ustreamer_config_b64: String,

    /// itag of the audio format to request
    #[arg(long)]
    audio_itag: Option<i32>,

    /// itag of the video format to request
    #[arg(long)]
    video_itag: Option<i32>,

    /// Base64-encoded PO token, if the caller already obtained one
    #[arg(long)]
    po_token_b64: Option<String>,

    /// Output path for the audio track
    #[arg(long, default_value = "audio.bin")]
    audio_out: PathBuf,

    /// Output path for the video track
    #[arg(long, default_value = "video.bin")]
    video_out: PathBuf,

    /// Maximum bandwidth in bytes/second, 0 for unlimited
    #[arg(long, default_value_t = 0)]
    rate_limit: u64,

    /// Resume a previously interrupted download from its progress document
    #[arg(long)]
    resume: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let args = Args::parse();

    if args.audio_itag.is_none() && args.video_itag.is_none() {
        eprintln!("{}", "at least one of --audio-itag or --video-itag is required".red());
        process::exit(1);
    }

    let engine = base64::engine::general_purpose::STANDARD;
    let ustreamer_config = match engine.decode(&args.ustreamer_config_b64) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}: {e}", "invalid --ustreamer-config-b64".red());
            process::exit(1);
        }
    };
    let po_token = args.po_token_b64.as_deref().map(|s| engine.decode(s)).transpose();
    let po_token = match po_token {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}: {e}", "invalid --po-token-b64".red());
            process::exit(1);
        }
    };

    let mut audio_writer = args.audio_itag.is_some().then(|| writer_for(&args.audio_out, args.resume, "audio")).flatten();
    let mut video_writer = args.video_itag.is_some().then(|| writer_for(&args.video_out, args.resume, "video")).flatten();

    let mut config = SabrSessionConfig::new(&args.url)
        .with_ustreamer_config(ustreamer_config)
        .with_rate_limit(args.rate_limit)
        .with_continue_download(args.resume);
    if let Some(itag) = args.audio_itag {
        config = config.with_audio_selection(FormatSelector::Audio {
            ids: vec![FormatId { itag: Some(itag), lmt: None, xtags: None }],
            discard_media: false,
        });
    }
    if let Some(itag) = args.video_itag {
        config = config.with_video_selection(FormatSelector::Video {
            ids: vec![FormatId { itag: Some(itag), lmt: None, xtags: None }],
            discard_media: false,
        });
    }
    if let Some(token) = po_token {
        config = config.with_po_token(token);
    }
    if let Some(w) = &audio_writer {
        config = config.with_resume_state(0, w.initial_buffered_ranges(), w.has_init_segment());
    }
    if let Some(w) = &video_writer {
        config = config.with_resume_state(1, w.initial_buffered_ranges(), w.has_init_segment());
    }

    let http_client = reqwest::Client::new();
    let mut session = match SabrSession::new(config, http_client) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("{}: {e}", "failed to start session".red());
            process::exit(1);
        }
    };

    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::default_spinner()
            .template("[{elapsed_precise}] {spinner} {wide_msg}")
            .expect("building progress bar"),
    );

    loop {
        let events = match session.next_events().await {
            Ok(events) => events,
            Err(sabr_stream::SabrError::Consumed) => break,
            Err(e) => {
                bar.finish_with_message(format!("{}: {e}", "download failed".red()));
                process::exit(1);
            }
        };
        if events.is_empty() && session.is_live() {
            continue;
        }
        for event in events {
            match event {
                Event::MediaSegment { selector_index, format_id, is_init_segment, fragment_index, data, .. } => {
                    let writer = if selector_index == 0 { &mut audio_writer } else { &mut video_writer };
                    if let Some(writer) = writer {
                        if let Err(e) = writer.write_segment(&format_id, is_init_segment, fragment_index, data.len() as i64, &data) {
                            bar.finish_with_message(format!("{}: {e}", "write failed".red()));
                            process::exit(1);
                        }
                        if let Some(ranges) = session.buffered_ranges(&format_id) {
                            let _ = writer.update_buffered_ranges(ranges);
                        }
                    }
                    bar.set_message(format!("received {} bytes for {format_id}", data.len()));
                    bar.tick();
                }
                Event::MediaSeek { reason, format_id, .. } => {
                    let why = if reason == SeekReason::ServerSeek { "server seek" } else { "buffer seek" };
                    bar.set_message(format!("{why} for {format_id}"));
                }
                Event::PoTokenStatus { status } => {
                    bar.set_message(format!("PO token status: {status:?}"));
                }
                Event::RefreshPlayerResponse { .. } => {
                    bar.finish_with_message("player response refresh required, restart with a fresh SABR URL".yellow().to_string());
                    process::exit(2);
                }
            }
        }
    }

    if let Some(w) = audio_writer {
        let _ = w.finish();
    }
    if let Some(w) = video_writer {
        let _ = w.finish();
    }
    bar.finish_with_message(format!("{} in {}", "done".green(), humantime::format_duration(bar.elapsed())));
}

fn writer_for(path: &std::path::Path, resume: bool, label: &str) -> Option<FormatWriter> {
    use sanitise_file_name::{sanitise_with_options, Options};

    let file_name = path.file_name()?.to_string_lossy().into_owned();
    let mut opts = Options::DEFAULT;
    opts.length_limit = 150;
    let safe_name = sanitise_with_options(&file_name, &opts);
    let out = path.with_file_name(safe_name);

    if resume {
        match FormatWriter::resume(&out) {
            Ok(Some(w)) => return Some(w),
            Ok(None) => {}
            Err(e) => eprintln!("could not resume {label} progress: {e}"),
        }
    }
    Some(FormatWriter::new(out))
}
