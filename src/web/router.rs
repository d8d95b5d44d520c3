use super::handlers;
use crate::inference::SchemaInferer;
use crate::repository::Repository;
use crate::security::SecurityGate;
use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const DEFAULT_LIST_LIMIT: usize = 100;
pub const MAX_LIST_LIMIT: usize = 1000;

/// Bounds for the `limit` query parameter of list requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    pub default: usize,
    pub max: usize,
}

impl ListLimits {
    /// Requested limit, or the default, clamped to the maximum.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested.unwrap_or(self.default).min(self.max)
    }
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            default: DEFAULT_LIST_LIMIT,
            max: MAX_LIST_LIMIT,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub repository: Repository,
    pub security: SecurityGate,
    pub inferer: SchemaInferer,
    pub limits: ListLimits,
}

impl AppState {
    pub fn new(repository: Repository, security: SecurityGate) -> Self {
        Self {
            repository,
            security,
            inferer: SchemaInferer::new(),
            limits: ListLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ListLimits) -> Self {
        self.limits = limits;
        self
    }
}

/// Routes:
/// - `GET /` health
/// - `GET /_collections` registered definitions
/// - `POST /upload` infer, register and bulk insert
/// - `GET|POST /:collection`
/// - `GET|PUT|DELETE /:collection/:id`
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::health))
        .route("/_collections", get(handlers::list_collections))
        .route("/upload", post(handlers::upload))
        .route(
            "/:collection",
            get(handlers::list_items).post(handlers::create_item),
        )
        .route(
            "/:collection/:id",
            get(handlers::get_item)
                .put(handlers::update_item)
                .delete(handlers::delete_item),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
