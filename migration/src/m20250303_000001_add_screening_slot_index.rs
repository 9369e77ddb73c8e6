use sea_orm_migration::prelude::*;

use crate::m20250302_000001_create_screenings::Screenings;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Not unique: scrapers insert duplicates and dedup collapses them afterwards.
#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_index(
                Index::create()
                    .name("idx_screenings_slot")
                    .table(Screenings::Table)
                    .col(Screenings::MovieId)
                    .col(Screenings::Date)
                    .col(Screenings::Time)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_screenings_slot")
                    .table(Screenings::Table)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }
}
