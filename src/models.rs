use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::entities::{movie, screening};

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Movie {
    pub id: i32,
    pub title_en: String,
    pub title_cn: Option<String>,
    pub overview_en: Option<String>,
    pub overview_cn: Option<String>,
    pub director: Option<String>,
    pub director_cn: Option<String>,
    pub year: Option<i32>,
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

impl Movie {
    /// Missing a Chinese title or overview, or not yet linked to any catalog.
    pub fn needs_enrichment(&self) -> bool {
        let title_missing = match non_empty(self.title_cn.as_deref()) {
            None => true,
            Some(cn) => cn == self.title_en.trim(),
        };
        title_missing
            || non_empty(self.overview_cn.as_deref()).is_none()
            || (self.tmdb_id.is_none() && non_empty(self.imdb_id.as_deref()).is_none())
    }
}

impl From<movie::Model> for Movie {
    fn from(m: movie::Model) -> Self {
        Self {
            id: m.id,
            title_en: m.title_en,
            title_cn: m.title_cn,
            overview_en: m.overview_en,
            overview_cn: m.overview_cn,
            director: m.director,
            director_cn: m.director_cn,
            year: m.year,
            rating: m.rating,
            tmdb_id: m.tmdb_id,
            imdb_id: m.imdb_id,
            trailer_url: m.trailer_url,
            image_url: m.image_url,
            letterboxd_url: m.letterboxd_url,
            douban_url: m.douban_url,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct NewMovie {
    pub title_en: String,
    pub title_cn: Option<String>,
    pub overview_en: Option<String>,
    pub director: Option<String>,
    pub year: Option<i32>,
    pub image_url: Option<String>,
    pub trailer_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Screening {
    pub id: i32,
    pub movie_id: i32,
    pub cinema: String,
    pub date: String,
    pub time: String,
    pub ticket_url: Option<String>,
    pub sold_out: bool,
}

impl Screening {
    pub fn slot(&self) -> (i32, &str, &str) {
        (self.movie_id, self.date.as_str(), self.time.as_str())
    }
}

impl From<screening::Model> for Screening {
    fn from(s: screening::Model) -> Self {
        Self {
            id: s.id,
            movie_id: s.movie_id,
            cinema: s.cinema,
            date: s.date,
            time: s.time,
            ticket_url: s.ticket_url,
            sold_out: s.sold_out,
        }
    }
}

#[derive(Clone, Debug)]
pub struct NewScreening {
    pub movie_id: i32,
    pub cinema: String,
    pub date: String,
    pub time: String,
    pub ticket_url: Option<String>,
    pub sold_out: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Tmdb,
    Omdb,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::Tmdb, Source::Omdb];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::Tmdb => "tmdb",
            Source::Omdb => "omdb",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tmdb" => Ok(Source::Tmdb),
            "omdb" => Ok(Source::Omdb),
            other => anyhow::bail!("unknown source {other:?}"),
        }
    }
}

/// Query order and tie-break order for connectors; earlier wins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourcePriority(Vec<Source>);

impl SourcePriority {
    pub fn new(order: impl IntoIterator<Item = Source>) -> Self {
        let mut out = Vec::new();
        for source in order.into_iter().chain(Source::ALL) {
            if !out.contains(&source) {
                out.push(source);
            }
        }
        Self(out)
    }

    pub fn rank(&self, source: Source) -> usize {
        self.0.iter().position(|s| *s == source).unwrap_or(self.0.len())
    }

    pub fn order(&self) -> &[Source] {
        &self.0
    }
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self::new(Source::ALL)
    }
}

impl FromStr for SourcePriority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let order = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Source>, _>>()?;
        Ok(Self::new(order))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub enum Locale {
    En,
    ZhCn,
    ZhTw,
    ZhHk,
    Zh,
}

/// Chinese variants tried, in order, when picking a Chinese title or overview.
pub const CHINESE_FALLBACK: [Locale; 4] = [Locale::ZhCn, Locale::ZhTw, Locale::ZhHk, Locale::Zh];

impl Locale {
    pub fn as_tmdb_code(self) -> &'static str {
        match self {
            Locale::En => "en-US",
            Locale::ZhCn => "zh-CN",
            Locale::ZhTw => "zh-TW",
            Locale::ZhHk => "zh-HK",
            Locale::Zh => "zh",
        }
    }

    /// Maps an ISO 639-1 language plus ISO 3166-1 region pair.
    pub fn from_parts(language: &str, region: &str) -> Option<Self> {
        match (language, region) {
            ("en", _) => Some(Locale::En),
            ("zh", "CN") => Some(Locale::ZhCn),
            ("zh", "TW") => Some(Locale::ZhTw),
            ("zh", "HK") => Some(Locale::ZhHk),
            ("zh", _) => Some(Locale::Zh),
            _ => None,
        }
    }
}

pub type LocaleText = BTreeMap<Locale, String>;

/// A record returned by a source connector, not yet merged into the store.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub source: Source,
    pub tmdb_id: Option<i64>,
    pub imdb_id: Option<String>,
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<i32>,
    pub titles: LocaleText,
    pub overviews: LocaleText,
    pub rating: Option<f64>,
    pub director: Option<String>,
    pub director_cn: Option<String>,
    pub trailer_url: Option<String>,
    pub image_url: Option<String>,
}

impl Candidate {
    pub fn new(source: Source, title: impl Into<String>) -> Self {
        Self {
            source,
            tmdb_id: None,
            imdb_id: None,
            title: title.into(),
            original_title: None,
            year: None,
            titles: LocaleText::new(),
            overviews: LocaleText::new(),
            rating: None,
            director: None,
            director_cn: None,
            trailer_url: None,
            image_url: None,
        }
    }

    pub fn external_id(&self) -> Option<String> {
        match self.source {
            Source::Tmdb => self.tmdb_id.map(|id| id.to_string()),
            Source::Omdb => self.imdb_id.clone(),
        }
    }

    /// Every title this candidate is known by: its own, the original and localized ones.
    pub fn all_titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str())
            .chain(self.original_title.as_deref())
            .chain(self.titles.values().map(String::as_str))
    }

    pub fn overview_in(&self, locale: Locale) -> Option<&str> {
        non_empty(self.overviews.get(&locale).map(String::as_str))
    }

    pub fn first_overview(&self, locales: &[Locale]) -> Option<&str> {
        locales.iter().find_map(|l| self.overview_in(*l))
    }
}

pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
