pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod model;
pub mod traits;
pub mod types;

// Re-export specific items to avoid ambiguity
pub use config::*;
pub use error::*;
pub use model::*;
pub use types::*;

// Re-export cache module items (simpler API)
pub use cache::Cache as SimpleCache;

// Re-export events module items
pub use events::{Event, EventPublisher, EventSubscriber};

// Re-export traits module items (repository/transaction/health-check interfaces)
pub use traits::{Embedder, HealthCheck, HealthStatus, Repository, Transaction};
