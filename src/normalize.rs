use std::sync::LazyLock;

use regex::Regex;

const BOILERPLATE: &[&str] = &[
    "showtimes coming soon",
    "now playing",
    "sold out",
    "special screening",
    "members only",
    "q&a",
];

const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1870..=2100;

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\(\s*(\d{4})\s*\)").unwrap());

static FORMAT_MARKER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

// Phrases go through the same punctuation pass as titles, so "q&a" matches "q a".
static BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = BOILERPLATE
        .iter()
        .map(|p| regex::escape(&collapse_whitespace(&strip_punctuation(p))))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b")).unwrap()
});

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedTitle {
    pub title: String,
    pub year: Option<i32>,
}

/// Turns a scraped title into a search key. Display titles are never replaced
/// with this value.
pub fn normalize_title(raw: &str) -> NormalizedTitle {
    let mut year = None;
    let without_year = YEAR.replace_all(raw, |caps: &regex::Captures<'_>| {
        match caps[1].parse::<i32>() {
            Ok(y) if YEAR_RANGE.contains(&y) => {
                year = Some(y);
                " ".to_string()
            },
            _ => caps[0].to_string(),
        }
    });

    let without_markers = FORMAT_MARKER.replace_all(&without_year, " ");
    let mut title = collapse_whitespace(&strip_punctuation(&without_markers));

    loop {
        let next = collapse_whitespace(&BOILERPLATE_RE.replace_all(&title, " "));
        if next == title {
            break;
        }
        title = next;
    }

    NormalizedTitle { title, year }
}

/// Lowercased search key used for title comparison.
pub fn match_key(raw: &str) -> String {
    normalize_title(raw).title.to_lowercase()
}

fn strip_punctuation(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '\'' | '\u{2018}' | '\u{2019}'))
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn norm(raw: &str) -> (String, Option<i32>) {
        let n = normalize_title(raw);
        (n.title, n.year)
    }

    #[test]
    fn strips_venue_boilerplate() {
        assert_eq!(norm("Showtimes coming soon: Nomadland"), ("Nomadland".into(), None));
        assert_eq!(norm("SHOWTIMES COMING SOON - Nomadland"), ("Nomadland".into(), None));
    }

    #[test]
    fn extracts_embedded_year() {
        assert_eq!(norm("Tokyo Story (1953)"), ("Tokyo Story".into(), Some(1953)));
        assert_eq!(norm("  In the Mood for Love ( 2000 ) "), ("In the Mood for Love".into(), Some(2000)));
    }

    #[test]
    fn out_of_range_year_stays_in_title() {
        assert_eq!(norm("Room (1234)"), ("Room 1234".into(), None));
    }

    #[test]
    fn removes_format_markers_and_punctuation() {
        assert_eq!(norm("Stalker [35mm]"), ("Stalker".into(), None));
        assert_eq!(norm("8½ [DCP] + Q&A!"), ("8½".into(), None));
        assert_eq!(norm("Schindler's List"), ("Schindlers List".into(), None));
    }

    #[test]
    fn boilerplate_only_titles_normalize_to_empty() {
        assert_eq!(norm("Showtimes coming soon"), (String::new(), None));
        assert_eq!(norm("Showtimes Showtimes coming soon coming soon"), (String::new(), None));
    }

    #[test]
    fn keeps_boilerplate_words_inside_other_words() {
        assert_eq!(norm("The Soldout Show"), ("The Soldout Show".into(), None));
    }

    #[test]
    fn keeps_cjk_titles() {
        assert_eq!(norm("花样年华 (2000)"), ("花样年华".into(), Some(2000)));
    }

    #[test]
    fn normalization_is_idempotent() {
        let samples = [
            "Showtimes coming soon: Nomadland",
            "Showtimes-coming soon",
            "Stalker [35mm] (1979)",
            "Room (1234)",
            "  A   Brighter\tSummer Day  ",
            "Q&A: Q&A",
            "花样年华 (2000)",
            "Wicked Games - Rimini Sparta",
        ];
        for raw in samples {
            let once = normalize_title(raw).title;
            let twice = normalize_title(&once).title;
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn match_key_is_lowercase() {
        assert_eq!(match_key("The GODFATHER: Part II"), "the godfather part ii");
    }
}
