//! Shared application state for the Axum API server.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use ciro_common::config::AppConfig;
use ciro_coordinator::bus::EventBus;
use ciro_coordinator::distributor::JobDistributor;
use ciro_coordinator::reputation::ReputationEngine;
use ciro_coordinator::telemetry::TelemetrySink;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub bus: EventBus,
    pub distributor: Arc<JobDistributor>,
    pub reputation: Arc<ReputationEngine>,
    pub telemetry: Arc<TelemetrySink>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        bus: EventBus,
        distributor: Arc<JobDistributor>,
        reputation: Arc<ReputationEngine>,
        telemetry: Arc<TelemetrySink>,
    ) -> Self {
        Self {
            pool,
            redis,
            config,
            bus,
            distributor,
            reputation,
            telemetry,
        }
    }
}
