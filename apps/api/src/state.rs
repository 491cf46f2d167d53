use sqlx::PgPool;

use crate::config::Config;
use crate::store::ProgressStore;
use crate::tasks::launcher::TaskLauncher;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Pool handle kept for future admin/housekeeping endpoints; the durable
    /// tier holds its own clone.
    #[allow(dead_code)]
    pub db: PgPool,
    /// Dual-tier progress store: Redis fast tier + Postgres durable tier.
    /// Constructed once at startup; tiers are swappable trait objects.
    pub store: ProgressStore,
    pub launcher: TaskLauncher,
    #[allow(dead_code)]
    pub config: Config,
}
