use sea_orm::{
    ActiveValue::NotSet, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QueryResult, QuerySelect, Set, Statement,
    TransactionTrait, sea_query::OnConflict,
};
use tracing::warn;

use crate::{
    entities::{movie, screening},
    models::{Movie, NewMovie, NewScreening, Screening},
};

/// Raw bytes of the free-text columns, read without UTF-8 validation.
#[derive(Debug, Default)]
pub struct RawText {
    pub id: i32,
    pub title_en: Vec<u8>,
    pub title_cn: Option<Vec<u8>>,
    pub overview_en: Option<Vec<u8>>,
    pub overview_cn: Option<Vec<u8>>,
    pub director: Option<Vec<u8>>,
    pub director_cn: Option<Vec<u8>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextFields {
    /// `None` leaves the stored title as it is.
    pub title_en: Option<String>,
    pub title_cn: Option<String>,
    pub overview_en: Option<String>,
    pub overview_cn: Option<String>,
    pub director: Option<String>,
    pub director_cn: Option<String>,
}

#[derive(Clone)]
pub struct MovieStore {
    db: DatabaseConnection,
}

impl MovieStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Rows whose text is not valid UTF-8 come back with U+FFFD in place of the bad bytes.
    pub async fn get(&self, id: i32) -> Result<Option<Movie>, DbErr> {
        match movie::Entity::find_by_id(id).one(&self.db).await {
            Ok(found) => Ok(found.map(Movie::from)),
            Err(e) if is_connection_loss(&e) => Err(e),
            Err(e) => {
                warn!(movie_id = id, error = %e, "decoding stored movie lossily");
                self.get_lossy(id).await
            },
        }
    }

    async fn get_lossy(&self, id: i32) -> Result<Option<Movie>, DbErr> {
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(
                self.db.get_database_backend(),
                LOSSY_SELECT,
                [id.into()],
            ))
            .await?;
        row.map(|row| lossy_movie(&row)).transpose()
    }

    pub async fn find_by_title(&self, title_en: &str) -> Result<Option<Movie>, DbErr> {
        let id = movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .filter(movie::Column::TitleEn.eq(title_en))
            .order_by_asc(movie::Column::Id)
            .into_tuple::<i32>()
            .one(&self.db)
            .await?;
        match id {
            Some(id) => self.get(id).await,
            None => Ok(None),
        }
    }

    pub async fn list_movies(&self) -> Result<Vec<Movie>, DbErr> {
        match movie::Entity::find().order_by_asc(movie::Column::Id).all(&self.db).await {
            Ok(rows) => Ok(rows.into_iter().map(Movie::from).collect()),
            Err(e) if is_connection_loss(&e) => Err(e),
            Err(e) => {
                warn!(error = %e, "movie list failed to decode, loading rows one at a time");
                let ids = self.movie_ids(0, None).await?;
                self.load_each(ids).await
            },
        }
    }

    /// One page of movies (1-based) and the total count.
    pub async fn page_movies(&self, page: u64, limit: u64) -> Result<(Vec<Movie>, u64), DbErr> {
        let limit = limit.max(1);
        let paginator =
            movie::Entity::find().order_by_asc(movie::Column::Id).paginate(&self.db, limit);
        let total = paginator.num_items().await?;
        match paginator.fetch_page(page.saturating_sub(1)).await {
            Ok(rows) => Ok((rows.into_iter().map(Movie::from).collect(), total)),
            Err(e) if is_connection_loss(&e) => Err(e),
            Err(e) => {
                warn!(page, error = %e, "movie page failed to decode, loading rows one at a time");
                let ids = self.movie_ids(page.saturating_sub(1) * limit, Some(limit)).await?;
                Ok((self.load_each(ids).await?, total))
            },
        }
    }

    async fn movie_ids(&self, offset: u64, limit: Option<u64>) -> Result<Vec<i32>, DbErr> {
        movie::Entity::find()
            .select_only()
            .column(movie::Column::Id)
            .order_by_asc(movie::Column::Id)
            .offset(offset)
            .limit(limit)
            .into_tuple::<i32>()
            .all(&self.db)
            .await
    }

    async fn load_each(&self, ids: Vec<i32>) -> Result<Vec<Movie>, DbErr> {
        let mut movies = Vec::with_capacity(ids.len());
        for id in ids {
            movies.extend(self.get(id).await?);
        }
        Ok(movies)
    }

    pub async fn insert_movie(&self, new: &NewMovie) -> Result<Movie, DbErr> {
        let now = now_sec();
        let model = movie::ActiveModel {
            id: NotSet,
            title_en: Set(new.title_en.clone()),
            title_cn: Set(new.title_cn.clone()),
            overview_en: Set(new.overview_en.clone()),
            overview_cn: Set(None),
            director: Set(new.director.clone()),
            director_cn: Set(None),
            year: Set(new.year),
            rating: Set(None),
            tmdb_id: Set(None),
            imdb_id: Set(None),
            trailer_url: Set(new.trailer_url.clone()),
            image_url: Set(new.image_url.clone()),
            letterboxd_url: Set(None),
            douban_url: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let id = movie::Entity::insert(model).exec(&self.db).await?.last_insert_id;
        self.get(id).await?.ok_or(DbErr::RecordNotInserted)
    }

    /// Writes every column of `m` except `created_at`, inserting when `m.id` is unset.
    pub async fn upsert(&self, m: &Movie) -> Result<Movie, DbErr> {
        let now = now_sec();
        let model = movie::ActiveModel {
            id: if m.id > 0 { Set(m.id) } else { NotSet },
            title_en: Set(m.title_en.clone()),
            title_cn: Set(m.title_cn.clone()),
            overview_en: Set(m.overview_en.clone()),
            overview_cn: Set(m.overview_cn.clone()),
            director: Set(m.director.clone()),
            director_cn: Set(m.director_cn.clone()),
            year: Set(m.year),
            rating: Set(m.rating),
            tmdb_id: Set(m.tmdb_id),
            imdb_id: Set(m.imdb_id.clone()),
            trailer_url: Set(m.trailer_url.clone()),
            image_url: Set(m.image_url.clone()),
            letterboxd_url: Set(m.letterboxd_url.clone()),
            douban_url: Set(m.douban_url.clone()),
            created_at: Set(if m.created_at > 0 { m.created_at } else { now }),
            updated_at: Set(now),
        };

        let res = movie::Entity::insert(model)
            .on_conflict(
                OnConflict::column(movie::Column::Id)
                    .update_columns([
                        movie::Column::TitleEn,
                        movie::Column::TitleCn,
                        movie::Column::OverviewEn,
                        movie::Column::OverviewCn,
                        movie::Column::Director,
                        movie::Column::DirectorCn,
                        movie::Column::Year,
                        movie::Column::Rating,
                        movie::Column::TmdbId,
                        movie::Column::ImdbId,
                        movie::Column::TrailerUrl,
                        movie::Column::ImageUrl,
                        movie::Column::LetterboxdUrl,
                        movie::Column::DoubanUrl,
                        movie::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;

        // last_insert_id is only meaningful for fresh rows on SQLite.
        let id = if m.id > 0 { m.id } else { res.last_insert_id };
        self.get(id).await?.ok_or(DbErr::RecordNotFound(format!("movie {id}")))
    }

    /// Deletes a movie together with its screenings.
    pub async fn delete_movie(&self, id: i32) -> Result<u64, DbErr> {
        let txn = self.db.begin().await?;
        screening::Entity::delete_many()
            .filter(screening::Column::MovieId.eq(id))
            .exec(&txn)
            .await?;
        let res = movie::Entity::delete_by_id(id).exec(&txn).await?;
        txn.commit().await?;
        Ok(res.rows_affected)
    }

    pub async fn insert_screening(&self, new: &NewScreening) -> Result<Screening, DbErr> {
        let model = screening::ActiveModel {
            id: NotSet,
            movie_id: Set(new.movie_id),
            cinema: Set(new.cinema.clone()),
            date: Set(new.date.clone()),
            time: Set(new.time.clone()),
            ticket_url: Set(new.ticket_url.clone()),
            sold_out: Set(new.sold_out),
        };
        let id = screening::Entity::insert(model).exec(&self.db).await?.last_insert_id;
        screening::Entity::find_by_id(id)
            .one(&self.db)
            .await?
            .map(Screening::from)
            .ok_or(DbErr::RecordNotInserted)
    }

    pub async fn list_screenings(&self, movie_id: i32) -> Result<Vec<Screening>, DbErr> {
        let rows = screening::Entity::find()
            .filter(screening::Column::MovieId.eq(movie_id))
            .order_by_asc(screening::Column::Date)
            .order_by_asc(screening::Column::Time)
            .order_by_asc(screening::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Screening::from).collect())
    }

    pub async fn all_screenings(&self) -> Result<Vec<Screening>, DbErr> {
        let rows = screening::Entity::find()
            .order_by_asc(screening::Column::MovieId)
            .order_by_asc(screening::Column::Date)
            .order_by_asc(screening::Column::Time)
            .order_by_asc(screening::Column::Id)
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Screening::from).collect())
    }

    pub async fn page_screenings(
        &self,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<Screening>, u64), DbErr> {
        let paginator = screening::Entity::find()
            .order_by_asc(screening::Column::Date)
            .order_by_asc(screening::Column::Time)
            .order_by_asc(screening::Column::Id)
            .paginate(&self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((rows.into_iter().map(Screening::from).collect(), total))
    }

    /// Deletes the given screenings in one transaction.
    pub async fn delete_screenings(&self, ids: &[i32]) -> Result<u64, DbErr> {
        if ids.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin().await?;
        let res = screening::Entity::delete_many()
            .filter(screening::Column::Id.is_in(ids.iter().copied()))
            .exec(&txn)
            .await?;
        txn.commit().await?;
        Ok(res.rows_affected)
    }

    pub async fn raw_text(&self) -> Result<Vec<RawText>, DbErr> {
        let backend = self.db.get_database_backend();
        let rows = self
            .db
            .query_all(Statement::from_string(
                backend,
                "SELECT id, CAST(title_en AS BLOB) AS title_en, \
                 CAST(title_cn AS BLOB) AS title_cn, \
                 CAST(overview_en AS BLOB) AS overview_en, \
                 CAST(overview_cn AS BLOB) AS overview_cn, \
                 CAST(director AS BLOB) AS director, \
                 CAST(director_cn AS BLOB) AS director_cn \
                 FROM movies ORDER BY id"
                    .to_string(),
            ))
            .await?;

        rows.iter()
            .map(|row| {
                Ok(RawText {
                    id: row.try_get("", "id")?,
                    title_en: row.try_get("", "title_en")?,
                    title_cn: row.try_get("", "title_cn")?,
                    overview_en: row.try_get("", "overview_en")?,
                    overview_cn: row.try_get("", "overview_cn")?,
                    director: row.try_get("", "director")?,
                    director_cn: row.try_get("", "director_cn")?,
                })
            })
            .collect()
    }

    pub async fn update_text(&self, id: i32, text: &TextFields) -> Result<(), DbErr> {
        let model = movie::ActiveModel {
            id: Set(id),
            title_en: text.title_en.clone().map_or(NotSet, Set),
            title_cn: Set(text.title_cn.clone()),
            overview_en: Set(text.overview_en.clone()),
            overview_cn: Set(text.overview_cn.clone()),
            director: Set(text.director.clone()),
            director_cn: Set(text.director_cn.clone()),
            updated_at: Set(now_sec()),
            ..Default::default()
        };
        movie::Entity::update(model).exec(&self.db).await?;
        Ok(())
    }

    pub async fn update_links(
        &self,
        id: i32,
        letterboxd_url: Option<String>,
        douban_url: Option<String>,
    ) -> Result<(), DbErr> {
        let model = movie::ActiveModel {
            id: Set(id),
            letterboxd_url: Set(letterboxd_url),
            douban_url: Set(douban_url),
            updated_at: Set(now_sec()),
            ..Default::default()
        };
        movie::Entity::update(model).exec(&self.db).await?;
        Ok(())
    }
}

/// Connection-level failures; everything else is local to the query that hit it.
pub fn is_connection_loss(err: &DbErr) -> bool {
    matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
}

const LOSSY_SELECT: &str = "SELECT id, \
    CAST(title_en AS BLOB) AS title_en, CAST(title_cn AS BLOB) AS title_cn, \
    CAST(overview_en AS BLOB) AS overview_en, CAST(overview_cn AS BLOB) AS overview_cn, \
    CAST(director AS BLOB) AS director, CAST(director_cn AS BLOB) AS director_cn, \
    year, rating, tmdb_id, CAST(imdb_id AS BLOB) AS imdb_id, \
    CAST(trailer_url AS BLOB) AS trailer_url, CAST(image_url AS BLOB) AS image_url, \
    CAST(letterboxd_url AS BLOB) AS letterboxd_url, CAST(douban_url AS BLOB) AS douban_url, \
    created_at, updated_at FROM movies WHERE id = ?";

fn lossy(row: &QueryResult, col: &str) -> Result<Option<String>, DbErr> {
    let bytes: Option<Vec<u8>> = row.try_get("", col)?;
    Ok(bytes.map(|b| String::from_utf8_lossy(&b).into_owned()))
}

fn lossy_movie(row: &QueryResult) -> Result<Movie, DbErr> {
    Ok(Movie {
        id: row.try_get("", "id")?,
        title_en: lossy(row, "title_en")?.unwrap_or_default(),
        title_cn: lossy(row, "title_cn")?,
        overview_en: lossy(row, "overview_en")?,
        overview_cn: lossy(row, "overview_cn")?,
        director: lossy(row, "director")?,
        director_cn: lossy(row, "director_cn")?,
        year: row.try_get("", "year")?,
        rating: row.try_get("", "rating")?,
        tmdb_id: row.try_get("", "tmdb_id")?,
        imdb_id: lossy(row, "imdb_id")?,
        trailer_url: lossy(row, "trailer_url")?,
        image_url: lossy(row, "image_url")?,
        letterboxd_url: lossy(row, "letterboxd_url")?,
        douban_url: lossy(row, "douban_url")?,
        created_at: row.try_get("", "created_at")?,
        updated_at: row.try_get("", "updated_at")?,
    })
}

fn now_sec() -> i64 {
    jiff::Timestamp::now().as_second()
}
