use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{models::Screening, normalize::normalize_title, store::MovieStore};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DedupReport {
    pub groups: usize,
    pub removed: u64,
}

/// Ids to delete per duplicated (movie, date, time) slot. The smallest id survives.
pub fn plan(screenings: &[Screening]) -> Vec<Vec<i32>> {
    let mut slots: BTreeMap<(i32, &str, &str), Vec<i32>> = BTreeMap::new();
    for s in screenings {
        slots.entry(s.slot()).or_default().push(s.id);
    }

    slots
        .into_values()
        .filter(|ids| ids.len() > 1)
        .map(|mut ids| {
            ids.sort_unstable();
            ids.split_off(1)
        })
        .collect()
}

pub async fn dedup_screenings(store: &MovieStore) -> anyhow::Result<DedupReport> {
    let screenings = store.all_screenings().await?;
    let groups = plan(&screenings);

    let mut report = DedupReport::default();
    for ids in groups {
        let removed = store.delete_screenings(&ids).await?;
        debug!(removed, ids = ?ids, "collapsed duplicate screenings");
        report.groups += 1;
        report.removed += removed;
    }

    info!(groups = report.groups, removed = report.removed, "screening dedup finished");
    Ok(report)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub movies: usize,
    pub screenings: usize,
}

/// Deletes movies whose title is nothing but venue boilerplate, with their screenings.
pub async fn prune_placeholders(store: &MovieStore) -> anyhow::Result<PruneReport> {
    let mut report = PruneReport::default();

    for movie in store.list_movies().await? {
        if !normalize_title(&movie.title_en).title.is_empty() {
            continue;
        }
        let screenings = store.list_screenings(movie.id).await?.len();
        match store.delete_movie(movie.id).await {
            Ok(_) => {
                info!(movie_id = movie.id, title = %movie.title_en, screenings, "removed placeholder movie");
                report.movies += 1;
                report.screenings += screenings;
            },
            Err(e) => warn!(movie_id = movie.id, error = %e, "failed to remove placeholder movie"),
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::{memory_store, new_movie, new_screening};

    fn screening(id: i32, movie_id: i32, date: &str, time: &str) -> Screening {
        Screening {
            id,
            movie_id,
            cinema: "IFC Center".into(),
            date: date.into(),
            time: time.into(),
            ticket_url: None,
            sold_out: false,
        }
    }

    #[test]
    fn keeps_smallest_id_per_slot() {
        let rows = vec![
            screening(9, 1, "2025-03-01", "19:00"),
            screening(3, 1, "2025-03-01", "19:00"),
            screening(5, 1, "2025-03-01", "19:00"),
            screening(4, 1, "2025-03-01", "21:30"),
            screening(6, 2, "2025-03-01", "19:00"),
        ];
        assert_eq!(plan(&rows), vec![vec![5, 9]]);
    }

    #[tokio::test]
    async fn dedup_is_idempotent_against_the_store() {
        let store = memory_store().await;
        let m = store.insert_movie(&new_movie("Nomadland")).await.unwrap();
        let first = store.insert_screening(&new_screening(m.id, "2025-03-01", "19:00")).await.unwrap();
        store.insert_screening(&new_screening(m.id, "2025-03-01", "19:00")).await.unwrap();
        store.insert_screening(&new_screening(m.id, "2025-03-01", "19:00")).await.unwrap();
        store.insert_screening(&new_screening(m.id, "2025-03-02", "19:00")).await.unwrap();

        let report = dedup_screenings(&store).await.unwrap();
        assert_eq!(report, DedupReport { groups: 1, removed: 2 });

        let left = store.list_screenings(m.id).await.unwrap();
        assert_eq!(left.len(), 2);
        assert_eq!(left[0].id, first.id);

        assert_eq!(dedup_screenings(&store).await.unwrap(), DedupReport::default());
    }

    #[tokio::test]
    async fn prunes_only_boilerplate_titles() {
        let store = memory_store().await;
        let placeholder = store.insert_movie(&new_movie("Showtimes coming soon")).await.unwrap();
        let real = store.insert_movie(&new_movie("Showtimes coming soon: Nomadland")).await.unwrap();
        store.insert_screening(&new_screening(placeholder.id, "2025-03-01", "19:00")).await.unwrap();

        let report = prune_placeholders(&store).await.unwrap();
        assert_eq!(report, PruneReport { movies: 1, screenings: 1 });
        assert!(store.get(placeholder.id).await.unwrap().is_none());
        assert!(store.get(real.id).await.unwrap().is_some());
    }
}
