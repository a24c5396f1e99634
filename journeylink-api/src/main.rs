use anyhow::Context;
use journeylink_api::{app, AppState, AuthConfig, BroadcastSink};
use journeylink_core::notify::{FanoutSink, LogSink};
use journeylink_core::{BookingRepository, EventSink, RideRepository};
use journeylink_store::app_config::{Config, StorageBackend};
use journeylink_store::{DbClient, RedisClient, StoreBookingRepository, StoreRideRepository};
use journeylink_trips::{BookingManager, MemoryStore, RideManager, SearchLimits, SharedClock};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Repositories = (Arc<dyn RideRepository>, Arc<dyn BookingRepository>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "journeylink_api=debug,journeylink_trips=debug,journeylink_store=info,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting JourneyLink API on port {}", config.server.port);

    let (ride_repo, booking_repo) = repositories(&config).await?;

    // SSE Broadcast Channel
    let (notifications, _) = tokio::sync::broadcast::channel(256);
    let events = event_sink(&config, notifications.clone())?;

    let clock: SharedClock = Arc::new(mockable::DefaultClock);
    let bookings = Arc::new(BookingManager::new(
        ride_repo.clone(),
        booking_repo,
        events.clone(),
        clock.clone(),
    ));
    let rides = Arc::new(
        RideManager::new(ride_repo, bookings.clone(), events, clock).with_limits(SearchLimits {
            default_page_size: config.search.default_page_size,
            max_page_size: config.search.max_page_size,
        }),
    );

    let auth = AuthConfig { secret: config.auth.jwt_secret.clone(), leeway: config.auth.leeway_seconds };
    let mut state = AppState::new(rides, bookings, notifications, auth);
    if let Some(redis) = &config.redis {
        let client = RedisClient::new(&redis.url).context("Invalid Redis URL")?;
        state = state.with_redis(Arc::new(client), config.rate_limit.clone());
    } else {
        tracing::info!("No Redis configured, rate limiting disabled");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address")?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn repositories(config: &Config) -> anyhow::Result<Repositories> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            let rides: Arc<dyn RideRepository> = store.clone();
            let bookings: Arc<dyn BookingRepository> = store;
            Ok((rides, bookings))
        }
        StorageBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .context("storage.backend = \"postgres\" requires a [database] section")?;
            let db = DbClient::new(db_config).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;
            let rides: Arc<dyn RideRepository> = Arc::new(StoreRideRepository::new(db.pool.clone()));
            let bookings: Arc<dyn BookingRepository> = Arc::new(StoreBookingRepository::new(db.pool.clone()));
            Ok((rides, bookings))
        }
    }
}

fn event_sink(
    config: &Config,
    notifications: tokio::sync::broadcast::Sender<journeylink_shared::DomainEvent>,
) -> anyhow::Result<Arc<dyn EventSink>> {
    let fanout = FanoutSink::new().with(Arc::new(LogSink)).with(Arc::new(BroadcastSink::new(notifications)));

    #[cfg(feature = "kafka")]
    let fanout = match &config.kafka {
        Some(kafka) => {
            let producer = journeylink_store::EventProducer::new(&kafka.brokers)
                .context("Failed to create Kafka producer")?;
            tracing::info!("Publishing lifecycle events to Kafka topic {}", kafka.topic);
            fanout.with(Arc::new(journeylink_store::KafkaEventSink::new(producer, kafka.topic.clone())))
        }
        None => fanout,
    };
    #[cfg(not(feature = "kafka"))]
    if config.kafka.is_some() {
        tracing::warn!("Kafka configured but this build has no kafka feature; events are not published");
    }

    Ok(Arc::new(fanout))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}
