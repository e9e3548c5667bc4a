//! Group expense, task and reminder sharing backed by a document store.

pub mod auth;
pub mod balance;
pub mod config;
pub mod error;
pub mod exchange;
pub mod memory;
pub mod mongo;
pub mod push;
pub mod routes;
pub mod schemas;
pub mod service;
pub mod store;
pub mod urgency;

#[cfg(test)]
mod service_tests;

/// Installs the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
