/**
 * driver-agent - Driver Tracking Agent
 *
 * Headless driver client: connects the tracking channel, streams positions
 * read as `lat,lng` lines from stdin and optionally follows another driver
 * through the position snapshot. Stops on Ctrl-C.
 */
use clap::Parser;
use courier_track::driver_app::delivery::{DeliveryStateMachine, HttpRecordLookup};
use courier_track::driver_app::location::{LineReader, SampledSource};
use courier_track::driver_app::{
    Config, ConnectionManager, Credentials, HttpSnapshotSource, LocalStore, LocationPublisher,
    RemotePositionPoller, SampleOptions, WebSocketConnector,
};
use courier_track::shared::ConnectionEvent;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams a delivery driver's position to the tracking service")]
struct Args {
    /// Bearer token from the login service; stored for later runs
    #[arg(long, env = "DRIVER_TOKEN")]
    token: Option<String>,

    /// Driver id; taken from the token's `id` claim when omitted
    #[arg(long)]
    driver_id: Option<String>,

    /// Follow this driver's position through the snapshot endpoint
    #[arg(long)]
    follow: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::load()?;
    let store = LocalStore::open(&config.store_path()).await?;
    tracing::info!("Using local store at {}", config.store_path().display());

    let manager = ConnectionManager::spawn(WebSocketConnector, config.clone(), store.clone());
    let mut events = manager.subscribe();

    match args.token {
        Some(token) => {
            let credentials = match args.driver_id {
                Some(driver_id) => Credentials::new(driver_id, token),
                None => Credentials::from_token(token)?,
            };
            store.save_token(&credentials.token).await?;
            manager.connect(credentials);
        }
        None => manager.resume(),
    }

    let mut deliveries = DeliveryStateMachine::new(HttpRecordLookup::new(config.clone()), store.clone());
    if let Some(delivery) = deliveries.restore().await {
        tracing::info!(
            "Resuming delivery {} ({}), heading to {:?}",
            delivery.order_id,
            delivery.status,
            delivery.destination()
        );
    }

    let source = SampledSource::new(LineReader::new(BufReader::new(tokio::io::stdin())));
    let publisher = LocationPublisher::spawn(
        source,
        manager.handle(),
        SampleOptions::from(config.tracking()),
    );

    let poller = args.follow.map(|driver_id| {
        tracing::info!("Following driver {}", driver_id);
        RemotePositionPoller::spawn(
            HttpSnapshotSource::new(&config),
            Some(driver_id),
            config.tracking().poll_interval(),
        )
    });
    let mut followed = poller.as_ref().map(|p| p.watch());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
            event = events.recv() => match event {
                Ok(ConnectionEvent::ReauthenticationRequired { reason }) => {
                    tracing::error!("Re-authentication required ({}); run again with --token", reason);
                }
                Ok(ConnectionEvent::ReconnectExhausted { attempts }) => {
                    tracing::error!("Gave up reconnecting after {} attempts", attempts);
                }
                Ok(event) => tracing::debug!("Connection event: {:?}", event),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} connection events", skipped);
                }
                Err(_) => break,
            },
            changed = async {
                match followed.as_mut() {
                    Some(rx) => rx.changed().await,
                    None => std::future::pending().await,
                }
            } => {
                if changed.is_err() {
                    followed = None;
                } else if let Some(rx) = followed.as_ref() {
                    let state = rx.borrow().clone();
                    match (state.driver_position, state.error) {
                        (_, Some(error)) => tracing::warn!("Snapshot poll failed: {}", error),
                        (Some(position), None) => tracing::info!("Followed driver at {:?}", position),
                        (None, None) => {}
                    }
                }
            }
        }
    }

    publisher.shutdown().await;
    if let Some(poller) = poller {
        poller.stop();
    }
    manager.shutdown().await;
    store.close().await;
    Ok(())
}
