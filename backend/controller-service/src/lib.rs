pub mod broadcast;
pub mod config;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod routes;
pub mod shutdown;
pub mod state;
pub mod subscriptions;
