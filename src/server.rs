//! Process wiring: stores, services and the long-running loops.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use socialhands_actions::{ActionEnv, ConfigContentProvider, PostLedger, register_all};
use socialhands_api::{ApiServer, AppState, UserDirectory};
use socialhands_browser::CdpSessionProvider;
use socialhands_config::{Config, data_dir};
use socialhands_monitor::{HeartbeatMonitor, Heartbeater, StatusCollector};
use socialhands_scheduler::{ScheduleService, SlotOutcomeRecorder};
use socialhands_state::{ControlStore, Database, SqliteSettingsStore};
use socialhands_workqueue::{Dispatcher, HandlerRegistry, JobQueue, SqliteJobStore, Worker};

use crate::cli::Roles;

/// Initialize tracing with console and file output.
///
/// Log files are written to ~/.socialhands/logs/ with daily rotation.
pub(crate) fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let log_dir = data_dir().join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("socialhands")
        .filename_suffix("log")
        .max_log_files(30)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The guard flushes the file writer on drop; keep it for the process lifetime.
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(())
}

/// Shared handles over one database.
pub(crate) struct Services {
    pub config: Config,
    pub control: ControlStore,
    pub queue: Arc<JobQueue>,
    pub schedule: Arc<ScheduleService>,
    pub heartbeat: HeartbeatMonitor,
    pub registry: Arc<HandlerRegistry>,
    pub sessions: Arc<CdpSessionProvider>,
}

impl Services {
    pub(crate) async fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let db = Database::open(&config.storage.db_path).await?;
        info!("Database opened at {}", config.storage.db_path.display());

        let control = ControlStore::new(Arc::new(SqliteSettingsStore::new(db.clone()).await?));
        let store = Arc::new(SqliteJobStore::new(db).await?);
        let queue = Arc::new(JobQueue::new(store, control.clone(), &config.queue));
        let schedule = Arc::new(ScheduleService::new(
            control.clone(),
            queue.clone(),
            &config.scheduler,
        )?);
        let heartbeat = HeartbeatMonitor::new(control.clone(), &config.heartbeat);

        // Chrome is only launched when a routine first leases a page.
        let sessions = Arc::new(CdpSessionProvider::new(&config.browser));
        let env = Arc::new(ActionEnv::new(
            sessions.clone(),
            Arc::new(ConfigContentProvider::new(config.content.clone())),
            PostLedger::new(control.clone(), config.browser.dedupe_window_minutes),
            config.browser.clone(),
        ));
        let registry = Arc::new(HandlerRegistry::new());
        register_all(&registry, env)?;
        info!("Registered job types: {}", registry.job_types().join(", "));

        Ok(Self {
            config,
            control,
            queue,
            schedule,
            heartbeat,
            registry,
            sessions,
        })
    }

    pub(crate) fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.queue.clone())
    }

    pub(crate) fn status_collector(&self) -> StatusCollector {
        StatusCollector::new(
            self.control.clone(),
            self.queue.clone(),
            self.schedule.clone(),
            self.heartbeat.clone(),
        )
    }

    fn app_state(&self) -> AppState {
        AppState {
            control: self.control.clone(),
            queue: self.queue.clone(),
            dispatcher: self.dispatcher(),
            schedule: self.schedule.clone(),
            status: self.status_collector(),
            registry: self.registry.clone(),
            users: UserDirectory::from_config(&self.config.api),
        }
    }

    /// Start the loops selected by `roles`.
    pub(crate) fn spawn(
        &self,
        roles: Roles,
        worker_id: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if roles.api {
            let server = ApiServer::new(&self.config.server, self.app_state());
            let rx = shutdown.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = server.run(rx).await {
                    error!("API server failed: {}", e);
                }
            }));
        }

        if roles.scheduler {
            tasks.push(tokio::spawn(self.schedule.clone().run(shutdown.clone())));
        }

        if roles.worker {
            let worker = Worker::new(
                worker_id,
                self.queue.clone(),
                self.registry.clone(),
                &self.config.queue,
            )
            .with_listener(Arc::new(SlotOutcomeRecorder::new(self.schedule.clone())));
            let heartbeater = Heartbeater::new(
                self.heartbeat.clone(),
                worker_id,
                worker.jobs_processed(),
                &self.config.heartbeat,
            );
            tasks.push(tokio::spawn(Arc::new(worker).run(shutdown.clone())));
            tasks.push(tokio::spawn(heartbeater.run(shutdown.clone())));
        }

        tasks
    }
}

/// Run the selected components until Ctrl-C.
pub(crate) async fn run(
    config: Config,
    roles: Roles,
    worker_id: String,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting SocialHands v{} ({:?})", env!("CARGO_PKG_VERSION"), roles);
    let services = Services::open(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks = services.spawn(roles, &worker_id, &shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!("Task ended abnormally: {}", e);
        }
    }
    services.sessions.shutdown().await;
    info!("SocialHands stopped");
    Ok(())
}
