pub use sea_orm_migration::prelude::*;

pub mod entities;
mod m20261001_000001_catalog_tables;
mod m20261001_000002_clicks_and_macros;
mod m20261001_000003_ledger_tables;
mod m20261001_000004_dispatch_records;
mod m20261001_000005_campaign_metrics;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261001_000001_catalog_tables::Migration),
            Box::new(m20261001_000002_clicks_and_macros::Migration),
            Box::new(m20261001_000003_ledger_tables::Migration),
            Box::new(m20261001_000004_dispatch_records::Migration),
            Box::new(m20261001_000005_campaign_metrics::Migration),
        ]
    }
}
