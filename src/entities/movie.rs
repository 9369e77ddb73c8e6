use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "movies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub title_en: String,
    pub title_cn: Option<String>,
    pub overview_en: Option<String>,
    pub overview_cn: Option<String>,
    pub director: Option<String>,
    pub director_cn: Option<String>,
    pub year: Option<i32>,
    #[sea_orm(column_type = "Double", nullable)]
    pub rating: Option<f64>,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub trailer_url: Option<String>,
    pub image_url: Option<String>,
    pub letterboxd_url: Option<String>,
    pub douban_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::screening::Entity")]
    Screening,
}

impl Related<super::screening::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Screening.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
