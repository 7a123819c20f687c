//! Application Startup
//!
//! The single place where collaborators are chosen and services wired
//! together. [`Services::build`] takes the storage and transport handles as
//! trait objects, so tests assemble the same graph over in-memory fakes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::services::maintenance::DEFAULT_PAGE_SIZE;
use crate::application::services::{
    DmService, DmServiceImpl, EventSynchronizer, Fanout, FriendService, FriendServiceImpl,
    GdmService, GdmServiceImpl, Maintenance, MaintenanceDeps, MessageService, MessageServiceImpl,
    PresenceTracker, RateLimiter, PRESENCE_TTL,
};
use crate::config::Settings;
use crate::domain::events::FRIEND_EVENTS_SUBJECT;
use crate::domain::{
    DmRepository, FriendRepository, GdmRepository, InvitationRepository, MessageRepository,
    UserDirectory,
};
use crate::infrastructure::cache::{self, KvStore, RedisKvStore};
use crate::infrastructure::database;
use crate::infrastructure::messaging::{
    EventPublisher, Publisher, RedisEventPublisher, RedisPublisher, RedisStreamConsumer,
};
use crate::infrastructure::repositories::{
    PgDmRepository, PgFriendRepository, PgGdmRepository, PgInvitationRepository,
    PgMessageRepository, PgUserDirectory,
};
use crate::presentation::http::handlers::health::{
    init_server_start, DependencyProbe, PostgresProbe, RedisProbe,
};
use crate::presentation::http::routes;
use crate::presentation::middleware::HttpRateLimit;
use crate::shared::clock::{Clock, SystemClock};
use crate::shared::snowflake::SnowflakeGenerator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub presence: PresenceTracker,
    pub fanout: Fanout,
    pub rate_limit: HttpRateLimit,
    pub probes: Arc<Vec<Arc<dyn DependencyProbe>>>,
}

/// Storage collaborators.
#[derive(Clone)]
pub struct Repositories {
    pub friends: Arc<dyn FriendRepository>,
    pub invitations: Arc<dyn InvitationRepository>,
    pub directory: Arc<dyn UserDirectory>,
    pub dms: Arc<dyn DmRepository>,
    pub gdms: Arc<dyn GdmRepository>,
    pub messages: Arc<dyn MessageRepository>,
}

/// KV, pub/sub and event stream collaborators.
#[derive(Clone)]
pub struct Transports {
    pub kv: Arc<dyn KvStore>,
    pub publisher: Arc<dyn Publisher>,
    pub events: Arc<dyn EventPublisher>,
}

/// Tunables the services are built with.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub invitation_duration: chrono::Duration,
    pub presence_ttl: Duration,
    pub fanout_timeout: Duration,
    pub page_size: usize,
    pub machine_id: u64,
    pub epoch: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            invitation_duration: chrono::Duration::hours(72),
            presence_ttl: PRESENCE_TTL,
            fanout_timeout: Duration::from_secs(5),
            page_size: DEFAULT_PAGE_SIZE,
            machine_id: 1,
            epoch: crate::shared::snowflake::DEFAULT_EPOCH,
        }
    }
}

impl From<&Settings> for ServiceConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            invitation_duration: settings.friends.invitation_duration(),
            presence_ttl: settings.presence.ttl(),
            fanout_timeout: settings.presence.fanout_timeout(),
            page_size: settings.maintenance.page_size,
            machine_id: settings.snowflake.machine_id as u64,
            epoch: settings.snowflake.epoch,
        }
    }
}

/// Every service of the core, wired.
#[derive(Clone)]
pub struct Services {
    pub friends: Arc<dyn FriendService>,
    pub dms: Arc<dyn DmService>,
    pub gdms: Arc<dyn GdmService>,
    pub messages: Arc<dyn MessageService>,
    pub presence: PresenceTracker,
    pub fanout: Fanout,
    pub rate_limiter: RateLimiter,
    pub synchronizer: Arc<EventSynchronizer>,
    pub maintenance: Arc<Maintenance>,
}

impl Services {
    pub fn build(
        repos: Repositories,
        transports: Transports,
        clock: Arc<dyn Clock>,
        config: &ServiceConfig,
    ) -> Self {
        let snowflake = Arc::new(SnowflakeGenerator::new(config.machine_id, config.epoch));
        let presence = PresenceTracker::new(transports.kv.clone(), config.presence_ttl);
        let fanout = Fanout::new(
            repos.dms.clone(),
            repos.gdms.clone(),
            repos.friends.clone(),
            presence.clone(),
            transports.publisher.clone(),
            config.fanout_timeout,
        );
        let notifier = Arc::new(fanout.clone());

        let friends: Arc<dyn FriendService> = Arc::new(FriendServiceImpl::new(
            repos.friends.clone(),
            repos.invitations.clone(),
            repos.directory.clone(),
            transports.events.clone(),
            clock.clone(),
            config.invitation_duration,
        ));
        let dms: Arc<dyn DmService> = Arc::new(DmServiceImpl::new(
            repos.dms.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let gdms: Arc<dyn GdmService> = Arc::new(GdmServiceImpl::new(
            repos.gdms.clone(),
            repos.messages.clone(),
            repos.friends.clone(),
            repos.directory.clone(),
            notifier.clone(),
            clock.clone(),
        ));
        let messages: Arc<dyn MessageService> = Arc::new(MessageServiceImpl::new(
            repos.messages.clone(),
            repos.dms.clone(),
            repos.gdms.clone(),
            notifier,
            snowflake,
            clock.clone(),
        ));

        let synchronizer = Arc::new(EventSynchronizer::new(
            repos.dms.clone(),
            repos.messages.clone(),
            clock.clone(),
        ));
        let maintenance = Arc::new(Maintenance::new(
            MaintenanceDeps {
                friends: repos.friends.clone(),
                friend_service: friends.clone(),
                gdms: repos.gdms.clone(),
                gdm_service: gdms.clone(),
                invitations: repos.invitations.clone(),
                directory: repos.directory.clone(),
                clock: clock.clone(),
            },
            config.invitation_duration,
            config.page_size,
        ));

        Self {
            friends,
            dms,
            gdms,
            messages,
            presence,
            fanout,
            rate_limiter: RateLimiter::new(transports.kv, clock),
            synchronizer,
            maintenance,
        }
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        init_server_start();

        let db = database::create_pool(&settings.database).await?;
        info!("Database connection pool created");
        if settings.database.migrate {
            database::run_migrations(&db).await?;
            info!("Database migrations applied");
        }

        let redis = cache::create_redis_client(&settings.redis).await?;
        // Blocking stream reads get a connection of their own.
        let consumer_conn = cache::create_redis_client(&settings.redis).await?;

        let kv: Arc<dyn KvStore> = match &settings.redis.key_prefix {
            Some(prefix) => Arc::new(RedisKvStore::with_prefix(redis.clone(), prefix.as_str())),
            None => Arc::new(RedisKvStore::new(redis.clone())),
        };

        let repos = Repositories {
            friends: Arc::new(PgFriendRepository::new(db.clone())),
            invitations: Arc::new(PgInvitationRepository::new(db.clone())),
            directory: Arc::new(PgUserDirectory::new(db.clone())),
            dms: Arc::new(PgDmRepository::new(db.clone())),
            gdms: Arc::new(PgGdmRepository::new(db.clone())),
            messages: Arc::new(PgMessageRepository::new(db.clone())),
        };
        let transports = Transports {
            kv,
            publisher: Arc::new(RedisPublisher::new(redis.clone())),
            events: Arc::new(RedisEventPublisher::new(
                redis.clone(),
                settings.events.partitions,
            )),
        };

        let services = Services::build(
            repos,
            transports,
            Arc::new(SystemClock),
            &ServiceConfig::from(&settings),
        );

        let cancel = CancellationToken::new();
        let mut workers = Vec::new();

        let mut consumer = RedisStreamConsumer::bind(
            consumer_conn,
            FRIEND_EVENTS_SUBJECT,
            &settings.events.group,
            settings.events.stream_options(),
        )
        .await?;
        let synchronizer = services.synchronizer.clone();
        let sync_cancel = cancel.clone();
        workers.push(tokio::spawn(async move {
            synchronizer.run(&mut consumer, sync_cancel).await;
        }));

        workers.extend(services.maintenance.clone().spawn_workers(
            Duration::from_secs(settings.maintenance.purge_interval_secs),
            Duration::from_secs(settings.maintenance.invitation_gc_interval_secs),
            cancel.clone(),
        ));

        let state = AppState {
            presence: services.presence.clone(),
            fanout: services.fanout.clone(),
            rate_limit: HttpRateLimit::new(services.rate_limiter.clone(), &settings.rate_limit),
            probes: Arc::new(vec![
                Arc::new(PostgresProbe(db)) as Arc<dyn DependencyProbe>,
                Arc::new(RedisProbe(redis)),
            ]),
        };
        let router = routes::create_router(state);

        let listener = TcpListener::bind(settings.server_addr()).await?;
        info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            cancel,
            workers,
        })
    }

    /// Serve until SIGINT/SIGTERM, then stop the background workers.
    pub async fn run_until_stopped(self) -> Result<()> {
        let cancel = self.cancel.clone();
        axum::serve(
            self.listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

        self.cancel.cancel();
        for worker in self.workers {
            if let Err(e) = worker.await {
                warn!(error = %e, "Background worker ended abnormally");
            }
        }
        info!("Shutdown complete");

        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = cancel.cancelled() => {},
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
