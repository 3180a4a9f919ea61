mod app;
mod waveform;

use std::sync::Arc;

use eframe::egui;
use stem_core::{Config, HttpApi, Session};
use stem_engine::{AudioOutput, CpalOutput, TransportEngine, VirtualOutput};
use stem_transport::{Clock, MonotonicClock};

use app::PlayerApp;

fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug for poll and stem-load detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let config = Config::load();
    log::info!("separation backend at {}", config.server.base_url);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("stem-player-io")
        .enable_all()
        .build()?;
    let api = Arc::new(HttpApi::new(&config.server.base_url, config.server.timeout())?);
    let session = Session::new(open_engine(), &config);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([1000.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Stem Player",
        options,
        Box::new(move |_cc| Ok(Box::new(PlayerApp::new(session, runtime, api)))),
    )
    .map_err(|e| anyhow::anyhow!("{e}"))?;

    Ok(())
}

/// The default audio device, or a silent clock-driven output when there is none.
fn open_engine() -> TransportEngine {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let output: Box<dyn AudioOutput> = match CpalOutput::open_default() {
        Ok(output) => Box::new(output),
        Err(e) => {
            log::warn!("no audio output ({e}); playback will be silent");
            Box::new(VirtualOutput::new(clock.clone()))
        }
    };
    TransportEngine::new(output, clock)
}
