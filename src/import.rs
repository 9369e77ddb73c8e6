use std::{collections::BTreeMap, path::Path, sync::LazyLock};

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    models::{NewMovie, NewScreening, non_empty},
    store::MovieStore,
};

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());

/// Scraper dumps come either as a list or as an object keyed by title.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Dump {
    List(Vec<ScrapedMovie>),
    Keyed(BTreeMap<String, ScrapedMovie>),
}

#[derive(Debug, Deserialize)]
struct ScrapedMovie {
    title_en: Option<String>,
    #[serde(alias = "title_cn")]
    title_zh: Option<String>,
    director: Option<String>,
    #[serde(default)]
    year: serde_json::Value,
    overview_en: Option<String>,
    image_url: Option<String>,
    trailer_url: Option<String>,
    cinema: Option<String>,
    #[serde(default)]
    show_dates: Vec<ShowDate>,
}

#[derive(Debug, Deserialize)]
struct ShowDate {
    date: Option<String>,
    #[serde(default)]
    times: Vec<ShowTime>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ShowTime {
    Plain(String),
    Detailed {
        time: Option<String>,
        ticket_url: Option<String>,
        #[serde(default)]
        sold_out: bool,
    },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub movies_created: usize,
    pub movies_matched: usize,
    pub screenings: usize,
    pub skipped: usize,
}

fn scraped_year(value: &serde_json::Value) -> Option<i32> {
    match value {
        serde_json::Value::Number(n) => {
            n.as_i64().and_then(|y| i32::try_from(y).ok()).filter(|y| (1870..=2100).contains(y))
        },
        serde_json::Value::String(s) => YEAR.captures(s).and_then(|c| c[1].parse().ok()),
        _ => None,
    }
}

fn valid_date(date: &str) -> bool {
    date.len() == 10 && date.parse::<jiff::civil::Date>().is_ok()
}

pub async fn import_file(
    store: &MovieStore,
    path: impl AsRef<Path>,
    cinema: Option<&str>,
) -> anyhow::Result<ImportReport> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(store, &text, cinema).await.with_context(|| format!("importing {}", path.display()))
}

/// Finds or inserts each scraped movie by exact English title, then adds its screenings.
pub async fn import_json(
    store: &MovieStore,
    json: &str,
    cinema: Option<&str>,
) -> anyhow::Result<ImportReport> {
    let movies = match serde_json::from_str::<Dump>(json).context("unrecognized scraper dump")? {
        Dump::List(movies) => movies,
        Dump::Keyed(movies) => movies.into_values().collect(),
    };

    let mut report = ImportReport::default();
    for scraped in movies {
        let Some(title_en) = non_empty(scraped.title_en.as_deref()).map(str::to_string) else {
            warn!("skipping scraped movie without an English title");
            report.skipped += 1;
            continue;
        };

        let movie = match store.find_by_title(&title_en).await? {
            Some(existing) => {
                report.movies_matched += 1;
                existing
            },
            None => {
                let new = NewMovie {
                    title_en: title_en.clone(),
                    title_cn: non_empty(scraped.title_zh.as_deref()).map(str::to_string),
                    overview_en: non_empty(scraped.overview_en.as_deref()).map(str::to_string),
                    director: non_empty(scraped.director.as_deref()).map(str::to_string),
                    year: scraped_year(&scraped.year),
                    image_url: non_empty(scraped.image_url.as_deref()).map(str::to_string),
                    trailer_url: non_empty(scraped.trailer_url.as_deref()).map(str::to_string),
                };
                report.movies_created += 1;
                store.insert_movie(&new).await?
            },
        };

        let Some(venue) = cinema.or(non_empty(scraped.cinema.as_deref())) else {
            warn!(title = %title_en, "no cinema for scraped movie, skipping its screenings");
            report.skipped += scraped.show_dates.len();
            continue;
        };

        for show in scraped.show_dates {
            let Some(date) = show.date.as_deref().map(str::trim).filter(|d| valid_date(d)) else {
                warn!(title = %title_en, date = ?show.date, "skipping unparseable date");
                report.skipped += 1;
                continue;
            };
            for time in show.times {
                let (time, ticket_url, sold_out) = match time {
                    ShowTime::Plain(time) => (Some(time), None, false),
                    ShowTime::Detailed { time, ticket_url, sold_out } => (time, ticket_url, sold_out),
                };
                let Some(time) = time.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
                else {
                    report.skipped += 1;
                    continue;
                };
                store
                    .insert_screening(&NewScreening {
                        movie_id: movie.id,
                        cinema: venue.to_string(),
                        date: date.to_string(),
                        time,
                        ticket_url,
                        sold_out,
                    })
                    .await?;
                report.screenings += 1;
            }
        }
        debug!(movie_id = movie.id, title = %title_en, "imported movie");
    }

    info!(?report, "import finished");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::memory_store;

    const FILM_FORUM: &str = r#"[
        {
            "title_en": "Tokyo Story",
            "title_zh": "东京物语",
            "director": "Yasujirō Ozu",
            "year": "1953, 136 min",
            "show_dates": [
                {"date": "2025-03-01", "times": ["12:30", {"time": "19:00", "ticket_url": "https://x/t", "sold_out": true}]},
                {"date": "March 2", "times": ["12:30"]}
            ]
        },
        {"title_en": "", "show_dates": []}
    ]"#;

    #[tokio::test]
    async fn imports_list_dump_and_skips_bad_dates() {
        let store = memory_store().await;
        let report = import_json(&store, FILM_FORUM, Some("Film Forum")).await.unwrap();
        assert_eq!(
            report,
            ImportReport { movies_created: 1, movies_matched: 0, screenings: 2, skipped: 2 }
        );

        let movie = store.find_by_title("Tokyo Story").await.unwrap().unwrap();
        assert_eq!(movie.year, Some(1953));
        assert_eq!(movie.title_cn.as_deref(), Some("东京物语"));

        let screenings = store.list_screenings(movie.id).await.unwrap();
        assert_eq!(screenings.len(), 2);
        assert!(screenings.iter().all(|s| s.cinema == "Film Forum"));
        assert!(screenings[1].sold_out);
        assert_eq!(screenings[1].ticket_url.as_deref(), Some("https://x/t"));
    }

    #[tokio::test]
    async fn keyed_dump_reuses_existing_movies() {
        let store = memory_store().await;
        let json = r#"{
            "Nomadland": {"title_en": "Nomadland", "year": 2020, "cinema": "Metrograph",
                          "show_dates": [{"date": "2025-03-01", "times": [{"time": "21:00"}]}]}
        }"#;
        import_json(&store, json, None).await.unwrap();
        let second = import_json(&store, json, None).await.unwrap();

        assert_eq!(second.movies_matched, 1);
        assert_eq!(store.list_movies().await.unwrap().len(), 1);
        // Duplicate slots are left for the dedup pass.
        assert_eq!(store.all_screenings().await.unwrap().len(), 2);
    }

    #[test]
    fn years_come_from_numbers_or_text() {
        assert_eq!(scraped_year(&serde_json::json!(2020)), Some(2020));
        assert_eq!(scraped_year(&serde_json::json!("USA, 1975")), Some(1975));
        assert_eq!(scraped_year(&serde_json::json!("n/a")), None);
        assert_eq!(scraped_year(&serde_json::Value::Null), None);
    }

    #[test]
    fn dates_must_be_iso() {
        assert!(valid_date("2025-03-01"));
        assert!(!valid_date("2025-02-30"));
        assert!(!valid_date("March 2"));
    }
}
