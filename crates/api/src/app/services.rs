//! Service wiring: event store selection, projections and the worker that
//! keeps them current.

use std::io;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::info;

use labstock_events::{EventEnvelope, InMemoryEventBus};
use labstock_infra::command_dispatcher::CommandDispatcher;
use labstock_infra::event_store::{EventStore, EventStoreError, InMemoryEventStore, PostgresEventStore};
use labstock_infra::projections::{ProjectionError, StockProjections};
use labstock_infra::stock_control::StockControl;
use labstock_infra::workers::{ProjectionWorker, WorkerHandle};

use crate::config::{ApiConfig, StoreConfig};

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type Control = StockControl<SharedStore, SharedBus>;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("event store: {0}")]
    Store(#[from] EventStoreError),

    #[error("projection rebuild: {0}")]
    Projection(#[from] ProjectionError),

    #[error("projection worker: {0}")]
    Worker(#[from] io::Error),
}

/// Everything request handlers need.
pub struct AppServices {
    pub control: Control,
}

/// Services plus the background worker feeding their read models.
pub struct Services {
    pub app: Arc<AppServices>,
    pub worker: WorkerHandle,
}

impl Services {
    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}

pub async fn build_services(config: &ApiConfig) -> Result<Services, StartupError> {
    let (store, history): (SharedStore, _) = match &config.store {
        StoreConfig::InMemory => {
            info!("using in-memory event store");
            (Arc::new(InMemoryEventStore::new()), Vec::new())
        }
        StoreConfig::Postgres { database_url } => {
            info!("using postgres event store");
            let store = PostgresEventStore::connect(database_url).await?;
            let history = store.load_all_async().await?;
            (Arc::new(store), history)
        }
    };
    let bus: SharedBus = Arc::new(InMemoryEventBus::new());
    let projections = Arc::new(StockProjections::new());

    let replayed = projections.rebuild(history.iter().map(|e| e.to_envelope()))?;
    info!(events = replayed, "read models rebuilt");

    let worker = ProjectionWorker::spawn("stock-projections", &bus, projections.clone())?;

    let dispatcher = Arc::new(CommandDispatcher::new(store, bus));
    Ok(Services {
        app: Arc::new(AppServices {
            control: StockControl::new(dispatcher, projections),
        }),
        worker,
    })
}
