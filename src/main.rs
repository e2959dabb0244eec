use pixelflut_server::canvas::{Frame, PresentedFrame};
use pixelflut_server::config::Config;
use pixelflut_server::display::{ClearSwitch, HeadlessSink};
use pixelflut_server::frame::{run_frame_loop, FrameCycle};
use pixelflut_server::queue::pixel_queue;
use pixelflut_server::server::{CanvasHandle, Server};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        host = %config.host,
        port = config.port,
        width = config.width,
        height = config.height,
        queue_capacity = config.queue_capacity,
        frame_rate = config.frame_rate,
        debug = config.debug,
        "Starting pixelflut server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (updates, receiver) = pixel_queue(config.queue_capacity);
    let presented = PresentedFrame::new(Frame::new(config.width, config.height));
    let cycle = FrameCycle::new(receiver, Arc::clone(&presented));

    let clear = ClearSwitch::new();
    #[cfg(unix)]
    {
        let trigger = clear.clone();
        tokio::spawn(async move {
            if let Err(e) = pixelflut_server::display::clear_on_signal(trigger).await {
                tracing::warn!(error = %e, "Clear signal handler unavailable");
            }
        });
    }

    tokio::spawn(run_frame_loop(
        cycle,
        config.frame_rate,
        HeadlessSink::new(),
        clear,
    ));

    let server = Server::bind(&config, CanvasHandle::new(presented, updates)).await?;
    server.run().await;

    Ok(())
}
