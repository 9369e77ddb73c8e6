use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Movies::Table)
                    .if_not_exists()
                    .col(pk_auto(Movies::Id))
                    .col(string(Movies::TitleEn))
                    .col(string_null(Movies::TitleCn))
                    .col(text_null(Movies::OverviewEn))
                    .col(text_null(Movies::OverviewCn))
                    .col(string_null(Movies::Director))
                    .col(string_null(Movies::DirectorCn))
                    .col(integer_null(Movies::Year))
                    .col(double_null(Movies::Rating))
                    .col(big_integer_null(Movies::TmdbId))
                    .col(string_null(Movies::ImdbId))
                    .col(string_null(Movies::TrailerUrl))
                    .col(string_null(Movies::ImageUrl))
                    .col(string_null(Movies::LetterboxdUrl))
                    .col(string_null(Movies::DoubanUrl))
                    .col(big_integer(Movies::CreatedAt))
                    .col(big_integer(Movies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_title_en")
                    .table(Movies::Table)
                    .col(Movies::TitleEn)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_movies_tmdb_id")
                    .table(Movies::Table)
                    .col(Movies::TmdbId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager.drop_table(Table::drop().table(Movies::Table).to_owned()).await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
pub(crate) enum Movies {
    Table,
    Id,
    TitleEn,
    TitleCn,
    OverviewEn,
    OverviewCn,
    Director,
    DirectorCn,
    Year,
    Rating,
    TmdbId,
    ImdbId,
    TrailerUrl,
    ImageUrl,
    LetterboxdUrl,
    DoubanUrl,
    CreatedAt,
    UpdatedAt,
}
