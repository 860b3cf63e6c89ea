//! Receiver Demo Application
//!
//! Publishes a synthetic tone source on a loopback network and drives a
//! receiver node against it at the configured host cadence.
//!
//! Usage: `receiver [CONFIG] [BANDWIDTH]`, where `BANDWIDTH` is `Low` or `High`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use live_source_receiver::{
    audio::ReadOutcome,
    config::AppConfig,
    source::{AudioFrame, Bandwidth, CapturedFrame, LoopbackNetwork, LoopbackSource},
    ReceiverNode,
};

const TONE_SOURCE_NAME: &str = "DEMO (Tone Generator)";
const TONE_SAMPLE_RATE: u32 = 48000;
const TONE_FRAME_MS: u64 = 10;

/// Push 10 ms stereo frames of a 440 Hz / 660 Hz tone pair
async fn run_tone(source: LoopbackSource) {
    let samples = (TONE_SAMPLE_RATE as u64 * TONE_FRAME_MS / 1000) as usize;
    let mut ticker = tokio::time::interval(Duration::from_millis(TONE_FRAME_MS));
    let mut position: u64 = 0;

    loop {
        ticker.tick().await;

        let channels: Vec<Vec<f32>> = [440.0f32, 660.0]
            .iter()
            .map(|freq| {
                (0..samples)
                    .map(|i| {
                        let t = (position + i as u64) as f32 / TONE_SAMPLE_RATE as f32;
                        (t * freq * 2.0 * std::f32::consts::PI).sin() * 0.5
                    })
                    .collect()
            })
            .collect();
        position += samples as u64;

        source.send(CapturedFrame::Audio(AudioFrame::from_planar(TONE_SAMPLE_RATE, &channels)));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting live source receiver");

    let mut args = std::env::args().skip(1);
    let config_path = args.next().map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    let mut params = config.receiver.clone();
    if params.source_name.is_empty() {
        params.source_name = TONE_SOURCE_NAME.to_string();
    }
    if let Some(bandwidth) = args.next() {
        params.bandwidth = Bandwidth::from_menu(&bandwidth);
    }

    // Loopback network with a single tone source
    let network = LoopbackNetwork::new();
    let tone = network.publish(TONE_SOURCE_NAME, "127.0.0.1:5961", true);
    tokio::spawn(run_tone(tone));

    let mut node = ReceiverNode::with_poll_timeout(Arc::new(network), config.host.poll_timeout());

    tracing::info!(
        "Looking for \"{}\" at {:.0} cycles/s",
        params.source_name,
        config.host.cycle_rate_hz
    );

    let mut ticker = tokio::time::interval(config.host.cycle_interval());
    let mut outputs: Vec<Vec<f32>> = Vec::new();
    let mut last_stats_time = Instant::now();
    let mut silent_cycles: u64 = 0;
    let mut audible_cycles: u64 = 0;
    let mut peak: f32 = 0.0;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                tracing::info!("Shutting down");
                break;
            }
        }

        node.cook(&params);

        let info = node.output_info();
        outputs.resize_with(info.channels, Vec::new);
        let samples = config.host.samples_per_cycle(info.sample_rate);

        match node.execute(samples, &mut outputs) {
            ReadOutcome::Silence => silent_cycles += 1,
            ReadOutcome::Samples { short_bytes } => {
                audible_cycles += 1;
                if short_bytes > 0 {
                    tracing::debug!("Underrun: {} bytes zero-filled", short_bytes);
                }
                peak = outputs
                    .iter()
                    .flatten()
                    .fold(peak, |acc, s| acc.max(s.abs()));
            }
        }

        // Periodic stats
        if last_stats_time.elapsed() >= Duration::from_secs(5) {
            last_stats_time = Instant::now();

            let status = node.status();
            tracing::info!(
                "Status: {:?}, {} source(s), {} ch @ {} Hz, buffer {:.0}%, {} audible / {} silent cycles, peak {:.2}",
                status.state,
                status.source_count,
                status.channel_count,
                status.sample_rate,
                status.buffer_fill * 100.0,
                audible_cycles,
                silent_cycles,
                peak
            );
            if let Some(warning) = &status.warning {
                tracing::warn!("{}", warning);
            }
            if let Some(error) = &status.error {
                tracing::error!("{}", error);
            }
            tracing::debug!("{}", serde_json::to_string(&status)?);

            peak = 0.0;
        }
    }

    Ok(())
}
