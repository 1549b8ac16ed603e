//! HTTP handlers, one module per provider area.

pub mod connections;
pub mod events;
pub mod health;
pub mod metrics;
pub mod read_models;
pub mod subscriptions;
