use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250301_000001_create_movies::Movies;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Screenings::Table)
                    .if_not_exists()
                    .col(pk_auto(Screenings::Id))
                    .col(integer(Screenings::MovieId))
                    .col(string(Screenings::Cinema))
                    .col(string(Screenings::Date))
                    .col(string(Screenings::Time))
                    .col(string_null(Screenings::TicketUrl))
                    .col(boolean(Screenings::SoldOut).default(false))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_screenings_movie_id")
                            .from(Screenings::Table, Screenings::MovieId)
                            .to(Movies::Table, Movies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_screenings_movie_id")
                    .table(Screenings::Table)
                    .col(Screenings::MovieId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Screenings::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Screenings {
    Table,
    Id,
    MovieId,
    Cinema,
    Date,
    Time,
    TicketUrl,
    SoldOut,
}
