use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use hotelswitch::animation::AnimationScript;
use hotelswitch::animation::AnimationSequencer;
use hotelswitch::api;
use hotelswitch::app::HostLoop;
use hotelswitch::config::HardwareConfig;
use hotelswitch::engine::HardwareLink;
use hotelswitch::engine::InputSink;
use hotelswitch::engine::Lamps;
use hotelswitch::engine::LinkStatus;
use hotelswitch::headless::HeadlessRenderer;
use hotelswitch::headless::HeadlessSoundPlayer;
use hotelswitch::integrations::feed::AsyncDataRefresher;
use hotelswitch::integrations::feed::FeedParser;
use hotelswitch::integrations::feed::HttpFeedSource;
use hotelswitch::integrations::publish::HttpStatusPublisher;
use hotelswitch::integrations::publish::PublishWorker;
use hotelswitch::ActuatorController;
use hotelswitch::Config;
use hotelswitch::SpaceStateMachine;
use hotelswitch::SwitchDebouncer;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Space status switch with lamps, confetti and a map of sibling spaces
#[derive(Parser, Debug)]
#[command(name = "hotelswitch", version, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "hotelswitch.toml")]
    config: PathBuf,

    /// Run without the relay board; status stays UNDETERMINED
    #[arg(long)]
    no_hardware: bool,

    /// Wait for the first feed fetch before showing anything
    #[arg(long)]
    wait_for_feed: bool,
}

#[cfg(feature = "integration_firmata")]
async fn connect_hardware(
    config: &HardwareConfig,
    sink: Arc<dyn InputSink>,
    status: LinkStatus,
) -> Option<Box<dyn HardwareLink>> {
    use hotelswitch::integrations::firmata::FirmataLink;

    match FirmataLink::connect(config, sink, status).await {
        Ok(link) => Some(Box::new(link)),
        Err(e) => {
            tracing::error!("{}; continuing without hardware", e);
            None
        }
    }
}

#[cfg(not(feature = "integration_firmata"))]
async fn connect_hardware(
    _config: &HardwareConfig,
    _sink: Arc<dyn InputSink>,
    _status: LinkStatus,
) -> Option<Box<dyn HardwareLink>> {
    tracing::warn!("Built without Firmata support; continuing without hardware");
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(config.logging.filter())
        .init();

    tracing::info!("hotelswitch starting");
    tracing::info!("Loaded config from: {}", args.config.display());

    let script = AnimationScript::from_file(&config.animation.script)?;
    let script = Arc::new(script);

    let link_status = LinkStatus::default();
    let machine = Arc::new(SpaceStateMachine::new(link_status.clone()));
    let debouncer = Arc::new(SwitchDebouncer::new(
        config.hardware.inputs,
        config.hardware.input_polarity,
        Duration::from_millis(config.hardware.debounce_ms),
        machine.clone(),
    ));

    let link = if args.no_hardware {
        tracing::info!("Hardware disabled on the command line");
        None
    } else {
        connect_hardware(&config.hardware, debouncer.clone(), link_status.clone()).await
    };
    let actuator = Arc::new(ActuatorController::new(
        link,
        &config.hardware,
        link_status.clone(),
        Some(debouncer.clone()),
    ));
    actuator.initialize();

    // Subscribers, in notification order: lamps, animation, publisher
    {
        let actuator = actuator.clone();
        machine.subscribe(move |state| actuator.set_color(state.lamp_color()));
    }

    let (state_tx, state_rx) = mpsc::unbounded_channel();
    machine.subscribe(move |state| {
        let _ = state_tx.send(state);
    });

    let publisher = match &config.publish {
        Some(publish) => {
            let worker = PublishWorker::spawn(Box::new(HttpStatusPublisher::new(publish)?));
            let tx = worker.sender();
            machine.subscribe(move |state| {
                let _ = tx.send(state);
            });
            Some(worker)
        }
        None => None,
    };

    let refresher = AsyncDataRefresher::start(
        Arc::new(HttpFeedSource::new(&config.feed)?),
        FeedParser::new(&config.feed),
        Duration::from_secs(config.feed.refresh_secs),
    );

    let api_shutdown = match &config.api {
        Some(api_config) => {
            let (tx, rx) = oneshot::channel();
            let state = api::ApiState::new(
                machine.clone(),
                link_status.clone(),
                refresher.reader(),
                actuator.clone(),
            );
            let listen = api_config.listen.clone();
            let port = api_config.port;
            tokio::spawn(async move {
                if let Err(e) = api::serve(state, listen, port, rx).await {
                    tracing::error!("HTTP API server failed: {}", e);
                }
            });
            Some(tx)
        }
        None => None,
    };

    let lamps: Arc<dyn Lamps> = actuator.clone();
    let sequencer = AnimationSequencer::new(script, lamps, tokio::time::Instant::now().into_std());
    let mut host = HostLoop::new(
        sequencer,
        refresher,
        state_rx,
        Box::new(HeadlessRenderer::default()),
        Box::new(HeadlessSoundPlayer),
        config.feed.local_name.clone(),
        config.animation.frame_rate,
    );

    if args.wait_for_feed {
        host.wait_for_feed().await;
    }

    tracing::info!("Press Ctrl+C to exit");
    host.run(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received shutdown signal"),
            Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
        }
    })
    .await;

    if let Some(tx) = api_shutdown {
        let _ = tx.send(());
    }
    host.shutdown().await;
    if let Some(publisher) = publisher {
        publisher.stop().await;
    }
    actuator.teardown();

    tracing::info!("hotelswitch shutdown complete");

    Ok(())
}
