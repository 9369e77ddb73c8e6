use std::{collections::HashMap, io, path::Path};

use serde::Deserialize;
use tracing::{debug, info};

use crate::{clean::clean_field, models::Movie};

pub const VERSION: u32 = 1;

/// Operator-supplied values that beat both local and external data.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Override {
    pub movie_id: i32,
    pub title_cn: Option<String>,
    pub overview_cn: Option<String>,
    pub overview_en: Option<String>,
    pub note: Option<String>,
}

impl Override {
    /// Whether applying this override would change what is stored for `movie`.
    pub fn differs_from(&self, movie: &Movie) -> bool {
        let differs = |over: Option<&str>, stored: Option<&str>| {
            clean_field(over).is_some_and(|value| stored != Some(value.as_str()))
        };
        differs(self.title_cn.as_deref(), movie.title_cn.as_deref())
            || differs(self.overview_cn.as_deref(), movie.overview_cn.as_deref())
            || differs(self.overview_en.as_deref(), movie.overview_en.as_deref())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OverrideFile {
    version: u32,
    #[serde(rename = "override", default)]
    overrides: Vec<Override>,
}

#[derive(Debug, thiserror::Error)]
pub enum OverrideError {
    #[error("failed to read override file: {0}")]
    Io(#[from] io::Error),
    #[error("invalid override file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("unsupported override file version {found}, expected {}", VERSION)]
    UnsupportedVersion { found: u32 },
    #[error("movie {0} has more than one override")]
    Duplicate(i32),
}

#[derive(Clone, Debug, Default)]
pub struct OverrideTable {
    by_movie: HashMap<i32, Override>,
}

impl OverrideTable {
    /// Reads the table from disk. A missing file is an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverrideError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no override file, using empty table");
                return Ok(Self::default());
            },
            Err(e) => return Err(e.into()),
        };
        let table = Self::parse(&text)?;
        info!(path = %path.display(), count = table.len(), "loaded overrides");
        Ok(table)
    }

    pub fn parse(text: &str) -> Result<Self, OverrideError> {
        let file: OverrideFile = toml::from_str(text)?;
        if file.version != VERSION {
            return Err(OverrideError::UnsupportedVersion { found: file.version });
        }

        let mut by_movie = HashMap::with_capacity(file.overrides.len());
        for entry in file.overrides {
            let id = entry.movie_id;
            if by_movie.insert(id, entry).is_some() {
                return Err(OverrideError::Duplicate(id));
            }
        }
        Ok(Self { by_movie })
    }

    pub fn get(&self, movie_id: i32) -> Option<&Override> {
        self.by_movie.get(&movie_id)
    }

    pub fn len(&self) -> usize {
        self.by_movie.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_movie.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn parses_versioned_table() {
        let table = OverrideTable::parse(
            r#"
            version = 1

            [[override]]
            movie_id = 12
            title_cn = "反色情"
            note = "TMDB has no Chinese title"

            [[override]]
            movie_id = 40
            overview_en = "Restored 4K print."
            "#,
        )
        .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.get(12).unwrap().title_cn.as_deref(), Some("反色情"));
        assert_eq!(table.get(40).unwrap().title_cn, None);
        assert!(table.get(41).is_none());
    }

    #[test]
    fn differs_only_when_a_set_value_is_not_stored() {
        let over = Override {
            movie_id: 12,
            title_cn: Some("反色情".into()),
            overview_en: Some("  ".into()),
            ..Default::default()
        };
        let mut movie = Movie {
            id: 12,
            title_en: "Anti-Porno".into(),
            title_cn: Some("错误标题".into()),
            overview_en: Some("A satire.".into()),
            ..Default::default()
        };
        assert!(over.differs_from(&movie));

        movie.title_cn = Some("反色情".into());
        assert!(!over.differs_from(&movie));
    }

    #[test]
    fn rejects_other_versions() {
        let err = OverrideTable::parse("version = 2").unwrap_err();
        assert!(matches!(err, OverrideError::UnsupportedVersion { found: 2 }));
    }

    #[test]
    fn rejects_duplicate_movie_ids() {
        let err = OverrideTable::parse(
            "version = 1\n[[override]]\nmovie_id = 3\n[[override]]\nmovie_id = 3\n",
        )
        .unwrap_err();
        assert!(matches!(err, OverrideError::Duplicate(3)));
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = OverrideTable::parse("version = 1\n[[override]]\nmovie_id = 3\ntitle_zh = \"x\"\n")
            .unwrap_err();
        assert!(matches!(err, OverrideError::Parse(_)));
    }

    #[test]
    fn missing_file_is_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = OverrideTable::load(dir.path().join("overrides.toml")).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "version = 1\n[[override]]\nmovie_id = 7\ntitle_cn = \"花样年华\"").unwrap();
        let table = OverrideTable::load(file.path()).unwrap();
        assert_eq!(table.get(7).unwrap().title_cn.as_deref(), Some("花样年华"));
    }
}
