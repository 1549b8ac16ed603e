//! Storage adapters for an event-sourced application over a key-value store.
//!
//! - [`EventsAdapter`]: entity events and snapshots plus the entity index
//! - [`ReadModelsAdapter`]: read model documents and search
//! - [`SubscriptionsAdapter`]: live read model subscriptions per connection
//! - [`ConnectionsAdapter`]: data attached to open client connections
//!
//! [`ProviderLibrary`] bundles them over one store. Storage preparation lives
//! behind the `infrastructure` feature.

pub mod connections;
pub mod envelope;
pub mod error;
pub mod events;
#[cfg(feature = "infrastructure")]
pub mod infrastructure;
pub mod library;
pub mod read_models;
pub mod search;
pub mod subscriptions;
pub mod tables;

pub use connections::{ConnectionDataEnvelope, ConnectionsAdapter};
pub use envelope::{EventEnvelope, EventEnvelopeBuilder};
pub use error::{ProviderError, Result};
pub use events::EventsAdapter;
pub use library::ProviderLibrary;
pub use read_models::{ReadModelEnvelope, ReadModelsAdapter};
pub use search::{Filter, FilterOperation};
pub use subscriptions::{SubscriptionEnvelope, SubscriptionsAdapter};
pub use tables::TableNames;
