use std::fmt::Display;

use crate::{
    clean::contains_cjk,
    error::EnrichError,
    models::{CHINESE_FALLBACK, Candidate, Locale, Movie, non_empty},
    overrides::Override,
};

#[derive(Debug)]
pub struct Merged {
    pub movie: Movie,
    pub conflicts: Vec<EnrichError>,
}

/// Combines a stored record with an external candidate and an operator override.
///
/// Per field the override wins, then a non-empty local value, then the
/// external value. External ids only fill gaps unless `force_ids` is set.
pub fn merge(
    local: &Movie,
    external: Option<&Candidate>,
    over: Option<&Override>,
    force_ids: bool,
) -> Merged {
    let mut conflicts = Vec::new();
    let over_title_cn = over.and_then(|o| non_empty(o.title_cn.as_deref()));
    let over_overview_cn = over.and_then(|o| non_empty(o.overview_cn.as_deref()));
    let over_overview_en = over.and_then(|o| non_empty(o.overview_en.as_deref()));

    let local_title_cn = non_empty(local.title_cn.as_deref()).filter(|t| contains_cjk(t));
    let external_title_cn = external.and_then(|c| {
        CHINESE_FALLBACK
            .iter()
            .filter_map(|l| non_empty(c.titles.get(l).map(String::as_str)))
            .find(|t| contains_cjk(t))
    });

    let mut movie = Movie {
        title_cn: pick(over_title_cn, local_title_cn, external_title_cn)
            .or(local.title_cn.clone()),
        overview_cn: pick(
            over_overview_cn,
            non_empty(local.overview_cn.as_deref()),
            external.and_then(|c| c.first_overview(&CHINESE_FALLBACK)),
        ),
        overview_en: pick(
            over_overview_en,
            non_empty(local.overview_en.as_deref()),
            external.and_then(|c| c.overview_in(Locale::En)),
        ),
        director: pick(
            None,
            non_empty(local.director.as_deref()),
            external.and_then(|c| non_empty(c.director.as_deref())),
        ),
        director_cn: pick(
            None,
            non_empty(local.director_cn.as_deref()),
            external.and_then(|c| non_empty(c.director_cn.as_deref())),
        ),
        trailer_url: pick(
            None,
            non_empty(local.trailer_url.as_deref()),
            external.and_then(|c| non_empty(c.trailer_url.as_deref())),
        ),
        image_url: pick(
            None,
            non_empty(local.image_url.as_deref()),
            external.and_then(|c| non_empty(c.image_url.as_deref())),
        ),
        year: local.year.or(external.and_then(|c| c.year)),
        rating: local.rating.or(external.and_then(|c| c.rating)),
        ..local.clone()
    };

    movie.tmdb_id =
        merge_id("tmdb_id", local.tmdb_id, external.and_then(|c| c.tmdb_id), force_ids, &mut conflicts);
    movie.imdb_id = merge_id(
        "imdb_id",
        non_empty(local.imdb_id.as_deref()).map(str::to_string),
        external.and_then(|c| non_empty(c.imdb_id.as_deref())).map(str::to_string),
        force_ids,
        &mut conflicts,
    );

    Merged { movie, conflicts }
}

fn pick(over: Option<&str>, local: Option<&str>, external: Option<&str>) -> Option<String> {
    over.or(local).or(external).map(str::to_string)
}

fn merge_id<T: PartialEq + Display>(
    field: &'static str,
    local: Option<T>,
    external: Option<T>,
    force: bool,
    conflicts: &mut Vec<EnrichError>,
) -> Option<T> {
    match (local, external) {
        (None, external) => external,
        (Some(local), Some(external)) if local != external => {
            if force {
                return Some(external);
            }
            conflicts.push(EnrichError::MergeConflict {
                field,
                local: local.to_string(),
                external: external.to_string(),
            });
            Some(local)
        },
        (local, _) => local,
    }
}
