use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    clean::{clean_bytes, clean_field},
    error::EnrichError,
    links::links,
    matcher::Matcher,
    merge::{Merged, merge},
    models::{Candidate, Movie},
    normalize::normalize_title,
    overrides::OverrideTable,
    sources::SourceConnector,
    store::{MovieStore, RawText, TextFields, is_connection_loss},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selection {
    All,
    NeedsEnrichment,
    One(i32),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EnrichReport {
    pub repaired: usize,
    pub processed: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub unmatched: usize,
    pub failed: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Updated,
    Unchanged,
    Unmatched,
}

pub struct Enricher {
    store: MovieStore,
    connectors: Vec<Box<dyn SourceConnector>>,
    matcher: Matcher,
    overrides: OverrideTable,
    force_ids: bool,
}

impl Enricher {
    pub fn new(
        store: MovieStore,
        connectors: Vec<Box<dyn SourceConnector>>,
        matcher: Matcher,
        overrides: OverrideTable,
    ) -> Self {
        Self { store, connectors, matcher, overrides, force_ids: false }
    }

    pub fn force_ids(mut self, force: bool) -> Self {
        self.force_ids = force;
        self
    }

    /// Enriches the selected movies one at a time. A failing record is logged
    /// and skipped; losing the store connection stops the batch.
    pub async fn run(&self, selection: Selection) -> anyhow::Result<EnrichReport> {
        let repaired = repair_malformed(&self.store).await?;

        let movies = match selection {
            Selection::All => self.store.list_movies().await?,
            Selection::NeedsEnrichment => {
                let all = self.store.list_movies().await?;
                all.into_iter().filter(|m| self.is_pending(m)).collect()
            },
            Selection::One(id) => match self.store.get(id).await? {
                Some(movie) => vec![movie],
                None => anyhow::bail!("movie {id} not found"),
            },
        };

        info!(
            total = movies.len(),
            sources = self.connectors.len(),
            overrides = self.overrides.len(),
            "starting enrichment"
        );

        let mut report = EnrichReport { repaired, ..Default::default() };
        for movie in movies {
            report.processed += 1;
            debug!(movie_id = movie.id, title = %movie.title_en, "enriching movie");

            match self.enrich_one(&movie).await {
                Ok(Outcome::Updated) => report.updated += 1,
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Unmatched) => report.unmatched += 1,
                Err(err) if err.is_fatal() => {
                    error!(movie_id = movie.id, error = %err, "store connection lost, stopping batch");
                    return Err(anyhow::Error::new(err)
                        .context(format!("enrichment aborted after {} movies", report.processed)));
                },
                Err(err) => {
                    warn!(movie_id = movie.id, error = %err, "failed to enrich movie");
                    report.failed += 1;
                },
            }
        }

        info!(?report, "enrichment finished");
        Ok(report)
    }

    fn is_pending(&self, movie: &Movie) -> bool {
        movie.needs_enrichment()
            || self.overrides.get(movie.id).is_some_and(|o| o.differs_from(movie))
    }

    async fn enrich_one(&self, movie: &Movie) -> Result<Outcome, EnrichError> {
        let external = self.resolve(movie).await;
        let over = self.overrides.get(movie.id);

        let Merged { movie: merged, conflicts } =
            merge(movie, external.as_ref(), over, self.force_ids);
        for conflict in &conflicts {
            warn!(movie_id = movie.id, error = %conflict, "keeping stored value");
        }

        let finalized = finalize(merged);
        if finalized == *movie {
            return Ok(if external.is_some() { Outcome::Unchanged } else { Outcome::Unmatched });
        }

        self.store.upsert(&finalized).await?;
        debug!(movie_id = movie.id, matched = external.is_some(), "movie updated");
        Ok(Outcome::Updated)
    }

    async fn resolve(&self, movie: &Movie) -> Option<Candidate> {
        for connector in &self.connectors {
            match connector.lookup(movie).await {
                Ok(Some(found)) => {
                    debug!(movie_id = movie.id, source = %connector.source(), "found by stored id");
                    return Some(found);
                },
                Ok(None) => {},
                Err(e) => {
                    let err = e.into_enrich(connector.source());
                    warn!(movie_id = movie.id, error = %err, "lookup by stored id failed");
                },
            }
        }

        let normalized = normalize_title(&movie.title_en);
        if normalized.title.is_empty() {
            debug!(movie_id = movie.id, title = %movie.title_en, "title is only boilerplate, skipping");
            return None;
        }
        let year = movie.year.or(normalized.year);

        let mut candidates = Vec::new();
        for connector in &self.connectors {
            candidates.extend(search_variants(connector.as_ref(), &normalized.title, year).await);
        }

        let Some(selected) = self.matcher.select(&normalized.title, year, &candidates) else {
            debug!(
                movie_id = movie.id,
                title = %normalized.title,
                candidates = candidates.len(),
                error = %EnrichError::NoMatch,
                "leaving movie for the next run"
            );
            return None;
        };
        debug!(
            movie_id = movie.id,
            source = %selected.source,
            external_id = ?selected.external_id(),
            "matched candidate"
        );

        let Some(connector) = self.connectors.iter().find(|c| c.source() == selected.source)
        else {
            return Some(selected.clone());
        };
        match connector.hydrate(selected.clone()).await {
            Ok(hydrated) => Some(hydrated),
            Err(e) => {
                let err = e.into_enrich(selected.source);
                warn!(movie_id = movie.id, error = %err, "detail fetch failed, using search data");
                Some(selected.clone())
            },
        }
    }
}

// With a year first, then without it if that found nothing.
async fn search_variants(
    connector: &dyn SourceConnector,
    title: &str,
    year: Option<i32>,
) -> Vec<Candidate> {
    let mut variants = vec![year];
    if year.is_some() {
        variants.push(None);
    }

    for year in variants {
        match connector.search(title, year).await {
            Ok(found) if !found.is_empty() => return found,
            Ok(_) => {},
            Err(e) => {
                let err = e.into_enrich(connector.source());
                warn!(title = %title, error = %err, "treating source as having no candidates");
                return Vec::new();
            },
        }
    }
    Vec::new()
}

/// Cleans the text fields and regenerates the search links.
pub fn finalize(mut movie: Movie) -> Movie {
    movie.title_cn = clean_field(movie.title_cn.as_deref());
    movie.overview_en = clean_field(movie.overview_en.as_deref());
    movie.overview_cn = clean_field(movie.overview_cn.as_deref());
    movie.director = clean_field(movie.director.as_deref());
    movie.director_cn = clean_field(movie.director_cn.as_deref());

    (movie.letterboxd_url, movie.douban_url) = movie_links(&movie);
    movie
}

// Both empty when the title is nothing but boilerplate.
fn movie_links(movie: &Movie) -> (Option<String>, Option<String>) {
    match links(&normalize_title(&movie.title_en).title) {
        Some(l) => (Some(l.letterboxd_url), Some(l.douban_url)),
        None => (None, None),
    }
}

struct Decoded {
    text: TextFields,
    changed: bool,
    malformed: bool,
}

/// Decodes the stored text bytes of one row. `tidy` also runs the cleaner;
/// the English title is only ever repaired, never cleaned.
fn decode_row(raw: &RawText, tidy: bool) -> Decoded {
    let mut changed = false;
    let mut malformed = false;
    let report_malformed = |field: &'static str| {
        let err = EnrichError::MalformedText { field };
        debug!(movie_id = raw.id, error = %err, "replacing invalid bytes");
    };

    let title_en = std::str::from_utf8(&raw.title_en).is_err().then(|| {
        report_malformed("title_en");
        String::from_utf8_lossy(&raw.title_en).into_owned()
    });
    if title_en.is_some() {
        changed = true;
        malformed = true;
    }

    let mut field = |name: &'static str, bytes: &Option<Vec<u8>>| -> Option<String> {
        let bytes = bytes.as_deref()?;
        if std::str::from_utf8(bytes).is_err() {
            malformed = true;
            report_malformed(name);
        }
        let text = if tidy {
            Some(clean_bytes(bytes)).filter(|s| !s.is_empty())
        } else {
            Some(String::from_utf8_lossy(bytes).into_owned())
        };
        if text.as_deref().map(str::as_bytes) != Some(bytes) {
            changed = true;
        }
        text
    };

    let text = TextFields {
        title_en,
        title_cn: field("title_cn", &raw.title_cn),
        overview_en: field("overview_en", &raw.overview_en),
        overview_cn: field("overview_cn", &raw.overview_cn),
        director: field("director", &raw.director),
        director_cn: field("director_cn", &raw.director_cn),
    };
    Decoded { text, changed, malformed }
}

/// Rewrites rows holding invalid UTF-8 with U+FFFD so the batch can load them.
async fn repair_malformed(store: &MovieStore) -> anyhow::Result<usize> {
    let mut repaired = 0;
    for raw in store.raw_text().await? {
        let decoded = decode_row(&raw, false);
        if !decoded.malformed {
            continue;
        }
        match store.update_text(raw.id, &decoded.text).await {
            Ok(()) => repaired += 1,
            Err(e) if is_connection_loss(&e) => return Err(e.into()),
            Err(e) => warn!(movie_id = raw.id, error = %e, "failed to repair malformed text"),
        }
    }
    if repaired > 0 {
        info!(repaired, "repaired malformed text");
    }
    Ok(repaired)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    pub scanned: usize,
    pub updated: usize,
    pub malformed: usize,
}

/// Re-cleans every stored text field, repairing invalid UTF-8 on the way.
pub async fn clean_stored_text(store: &MovieStore) -> anyhow::Result<CleanReport> {
    let mut report = CleanReport::default();

    for raw in store.raw_text().await? {
        report.scanned += 1;
        let decoded = decode_row(&raw, true);
        if decoded.malformed {
            report.malformed += 1;
        }
        if decoded.changed {
            store.update_text(raw.id, &decoded.text).await?;
            report.updated += 1;
        }
    }

    info!(?report, "text cleanup finished");
    Ok(report)
}

/// Rewrites the Letterboxd and Douban links of every movie from its title.
pub async fn regenerate_links(store: &MovieStore) -> anyhow::Result<usize> {
    let mut updated = 0;
    for movie in store.list_movies().await? {
        let (letterboxd, douban) = movie_links(&movie);
        if letterboxd == movie.letterboxd_url && douban == movie.douban_url {
            continue;
        }
        store.update_links(movie.id, letterboxd, douban).await?;
        updated += 1;
    }
    info!(updated, "links regenerated");
    Ok(updated)
}
