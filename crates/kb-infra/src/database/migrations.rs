//! Schema migration bookkeeping. Individual migration SQL lives with each crate that owns a
//! table (`kb-catalog`, `kb-tenant`); this module just drives sqlx's migrator against them.

use sqlx::migrate::Migrator;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: String,
}

pub async fn run_migrations(pool: &PgPool, migrator: &Migrator) -> Result<(), sqlx::migrate::MigrateError> {
    migrator.run(pool).await
}

pub async fn rollback_migrations(
    pool: &PgPool,
    migrator: &Migrator,
    target: i64,
) -> Result<(), sqlx::migrate::MigrateError> {
    migrator.undo(pool, target).await
}
