use crate::config::{AppConfig, ConfigError};
use crate::core::DbError;
use crate::repository::{Repository, RepositoryError};
use crate::security::{
    AnonymousAuthenticator, AllowAllPolicy, ApiKeyAuthenticator, PermissionPolicy, SecurityError,
    SecurityGate,
};
use crate::storage::{DurableStorage, InMemoryStorage, StorageEngine};
use crate::web::{AppState, build_router};
use axum::Router;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to open storage: {0}")]
    Storage(#[from] DbError),

    #[error("failed to restore collections: {0}")]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Security(#[from] SecurityError),
}

/// Everything a running server needs.
pub struct Bootstrap {
    pub router: Router,
    pub repository: Repository,
    durable: Option<Arc<DurableStorage>>,
}

impl Bootstrap {
    /// Writes a final checkpoint when running on durable storage.
    pub async fn shutdown(self) -> Result<(), DbError> {
        if let Some(durable) = self.durable {
            durable.checkpoint().await?;
            info!("final checkpoint written");
        }
        Ok(())
    }
}

pub async fn bootstrap(config: &AppConfig) -> Result<Bootstrap, BootstrapError> {
    config.validate()?;

    let mut durable = None;
    let engine: Arc<dyn StorageEngine> = match &config.data_dir {
        Some(dir) => {
            let storage = Arc::new(
                DurableStorage::open(dir, config.durability, config.checkpoint_threshold).await?,
            );
            info!(path = %dir.display(), durability = %config.durability, "using durable storage");
            durable = Some(storage.clone());
            storage
        }
        None => {
            info!("using in-memory storage");
            Arc::new(InMemoryStorage::new())
        }
    };

    let repository = Repository::open(engine).await?;

    let security = if config.api_keys.is_empty() {
        SecurityGate::new(Arc::new(AnonymousAuthenticator), Arc::new(AllowAllPolicy))
    } else {
        let authenticator =
            ApiKeyAuthenticator::with_cost(config.api_keys.clone(), config.bcrypt_cost)?;
        info!(keys = authenticator.key_count(), "API key authentication enabled");
        SecurityGate::new(Arc::new(authenticator), Arc::new(PermissionPolicy))
    };

    let state = AppState::new(repository.clone(), security).with_limits(config.list_limits());
    Ok(Bootstrap {
        router: build_router(state),
        repository,
        durable,
    })
}

pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("autorestdb=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
