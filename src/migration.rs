//! Programmatic schema migrations.
//!
//! The binary applies these at startup with [`MigratorTrait::up`] before the
//! listener is bound, so a freshly pointed database is usable immediately.

pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_users_table;
mod m20250901_000002_create_access_tokens_table;
mod m20250901_000003_create_sessions_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    // App-specific bookkeeping table so a shared database stays unambiguous
    fn migration_table_name() -> sea_orm::DynIden {
        Alias::new("vestibule_migrations").into_iden()
    }

    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_users_table::Migration),
            Box::new(m20250901_000002_create_access_tokens_table::Migration),
            Box::new(m20250901_000003_create_sessions_table::Migration),
        ]
    }
}
