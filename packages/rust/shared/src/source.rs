//! Source classification: single file vs. directory of files.
//!
//! Classification is purely lexical. No filesystem access happens here;
//! existence is checked later by the fetch step.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScrapeGraphError};

/// Suffix appended to the source type name for directory sources.
const COLLECTION_SUFFIX: &str = "_dir";

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

/// The kind of records a pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Json,
    Csv,
    Xml,
    #[serde(rename = "md")]
    Markdown,
}

impl SourceType {
    /// All supported source types.
    pub const ALL: [SourceType; 4] = [Self::Json, Self::Csv, Self::Xml, Self::Markdown];

    /// Name used as the state key for single-item sources.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Xml => "xml",
            Self::Markdown => "md",
        }
    }

    /// File extensions (lowercase, without dot) belonging to this type.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Json => &["json"],
            Self::Csv => &["csv"],
            Self::Xml => &["xml"],
            Self::Markdown => &["md", "markdown"],
        }
    }

    /// Whether `ext` (any case, no dot) belongs to this type.
    pub fn matches_extension(&self, ext: &str) -> bool {
        self.extensions()
            .iter()
            .any(|known| known.eq_ignore_ascii_case(ext))
    }

    /// Input key for this type given a classified source.
    pub fn input_key(self, kind: InputKind) -> InputKey {
        InputKey::new(self, kind)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = ScrapeGraphError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s) || t.matches_extension(s))
            .ok_or_else(|| ScrapeGraphError::config(format!("unknown source type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// InputKind / classify
// ---------------------------------------------------------------------------

/// Shape of a source descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// One file with a recognized extension.
    Single,
    /// A directory of files (also the fallback for unknown extensions).
    Collection,
}

/// Classify a source string by its shape.
///
/// Returns [`InputKind::Single`] when the final path segment has a `.`
/// followed by an extension of any [`SourceType`]; everything else, including
/// trailing-slash paths and unknown extensions, is a [`InputKind::Collection`].
pub fn classify(source: &str) -> InputKind {
    kind_if(file_extension(source).is_some_and(|ext| {
        SourceType::ALL.iter().any(|t| t.matches_extension(ext))
    }))
}

/// Classify `source` for one source type: only that type's own extensions
/// make it a single file, so `data.csv` read as JSON is a collection.
pub fn classify_for(source_type: SourceType, source: &str) -> InputKind {
    kind_if(file_extension(source).is_some_and(|ext| source_type.matches_extension(ext)))
}

/// Extension of the final path segment, if it has a non-empty stem.
fn file_extension(source: &str) -> Option<&str> {
    let last_segment = source.rsplit(['/', '\\']).next().unwrap_or_default();
    last_segment
        .rsplit_once('.')
        .filter(|(stem, _)| !stem.is_empty())
        .map(|(_, ext)| ext)
}

fn kind_if(single: bool) -> InputKind {
    if single {
        InputKind::Single
    } else {
        InputKind::Collection
    }
}

// ---------------------------------------------------------------------------
// InputKey
// ---------------------------------------------------------------------------

/// The state key under which a run's source descriptor is stored.
///
/// Renders as `"<type>"` for single files and `"<type>_dir"` for directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputKey {
    pub source_type: SourceType,
    pub kind: InputKind,
}

impl InputKey {
    pub fn new(source_type: SourceType, kind: InputKind) -> Self {
        Self { source_type, kind }
    }

    /// Classify `source` against `source_type` and build its key.
    pub fn for_source(source_type: SourceType, source: &str) -> Self {
        Self::new(source_type, classify_for(source_type, source))
    }

    /// State key name, e.g. `json` or `json_dir`.
    pub fn name(&self) -> String {
        match self.kind {
            InputKind::Single => self.source_type.as_str().to_string(),
            InputKind::Collection => format!("{}{COLLECTION_SUFFIX}", self.source_type),
        }
    }

    /// Both key names for a source type, single first.
    pub fn variants(source_type: SourceType) -> [String; 2] {
        [
            Self::new(source_type, InputKind::Single).name(),
            Self::new(source_type, InputKind::Collection).name(),
        ]
    }
}

impl fmt::Display for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_file_sources() {
        for source in [
            "path/to/single/file.json",
            "file.json",
            "./data/items.CSV",
            "C:\\exports\\feed.xml",
            "notes/readme.md",
            "nested.dir/report.json",
        ] {
            assert_eq!(classify(source), InputKind::Single, "{source}");
        }
    }

    #[test]
    fn collection_sources() {
        for source in [
            "path/to/json/directory",
            "path/to/dir.json/",
            "data",
            "",
            ".json",
            "archive.tar.gz",
            "datajson",
            "file.json.bak",
        ] {
            assert_eq!(classify(source), InputKind::Collection, "{source}");
        }
    }

    #[test]
    fn input_key_names() {
        let key = InputKey::for_source(SourceType::Json, "path/to/single/file.json");
        assert_eq!(key.name(), "json");

        let key = InputKey::for_source(SourceType::Json, "path/to/json/directory");
        assert_eq!(key.name(), "json_dir");

        let key = InputKey::for_source(SourceType::Csv, "exports/");
        assert_eq!(key.to_string(), "csv_dir");

        assert_eq!(
            InputKey::variants(SourceType::Markdown),
            ["md".to_string(), "md_dir".to_string()]
        );
    }

    #[test]
    fn other_type_extension_is_a_collection() {
        assert_eq!(classify("exports/data.csv"), InputKind::Single);

        let key = InputKey::for_source(SourceType::Json, "exports/data.csv");
        assert_eq!(key.name(), "json_dir");
        let key = InputKey::for_source(SourceType::Csv, "exports/data.json");
        assert_eq!(key.name(), "csv_dir");

        let key = InputKey::for_source(SourceType::Csv, "exports/data.csv");
        assert_eq!(key.name(), "csv");
        assert_eq!(
            classify_for(SourceType::Markdown, "notes/README.markdown"),
            InputKind::Single
        );
    }

    #[test]
    fn source_type_parsing() {
        assert_eq!("json".parse::<SourceType>().unwrap(), SourceType::Json);
        assert_eq!("XML".parse::<SourceType>().unwrap(), SourceType::Xml);
        assert_eq!("markdown".parse::<SourceType>().unwrap(), SourceType::Markdown);
        assert!("yaml".parse::<SourceType>().is_err());
    }
}
