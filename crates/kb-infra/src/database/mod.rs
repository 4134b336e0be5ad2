pub mod migrations;
pub mod pool;

pub use migrations::{rollback_migrations, run_migrations, Migration};
pub use pool::{create_pool, PgPoolConfig};
