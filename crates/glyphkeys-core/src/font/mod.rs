// Glyphkeys Font
// A font here is an ordered character replacement table: each standard
// character maps to an arbitrary replacement string, usually a fancy
// Unicode glyph.

pub mod store;

pub use store::FontStore;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Errors when building, loading, or saving a font.
#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("duplicate entry for source character {0:?}")]
    DuplicateEntry(char),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("font parse error: {0}")]
    Parse(String),

    #[error("font serialize error: {0}")]
    Serialize(String),
}

/// One source-to-replacement mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlyphEntry {
    pub source: char,
    pub target: String,
}

/// A named, ordered replacement table.
///
/// At most one entry per source character. Duplicates are an authoring
/// defect and are rejected when the table is built, which keeps the
/// per-keystroke lookup infallible.
#[derive(Debug, Clone, PartialEq)]
pub struct GlyphFont {
    name: String,
    description: String,
    author: String,
    modified: Option<DateTime<Utc>>,
    entries: IndexMap<char, String>,
}

impl GlyphFont {
    /// Empty font with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            author: String::new(),
            modified: None,
            entries: IndexMap::new(),
        }
    }

    /// Build from a list of entries, rejecting duplicate sources.
    pub fn from_entries(
        name: impl Into<String>,
        entries: Vec<GlyphEntry>,
    ) -> Result<Self, FontError> {
        let mut font = Self::new(name);
        for entry in entries {
            font.insert(entry.source, entry.target)?;
        }
        Ok(font)
    }

    /// Identity template over a confirmed character set: every character
    /// maps to itself, ready for an author to fill in glyphs.
    pub fn from_discovery(
        name: impl Into<String>,
        chars: impl IntoIterator<Item = char>,
    ) -> Result<Self, FontError> {
        let entries = chars
            .into_iter()
            .map(|ch| GlyphEntry {
                source: ch,
                target: ch.to_string(),
            })
            .collect();
        Self::from_entries(name, entries)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.modified
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    /// Add one mapping. Fails on a source already present.
    pub fn insert(&mut self, source: char, target: impl Into<String>) -> Result<(), FontError> {
        if self.entries.contains_key(&source) {
            return Err(FontError::DuplicateEntry(source));
        }
        self.entries.insert(source, target.into());
        Ok(())
    }

    /// Replacement for `ch`, if the font defines one.
    pub fn lookup(&self, ch: char) -> Option<&str> {
        self.entries.get(&ch).map(String::as_str)
    }

    /// Replacement for `ch`, or the character itself. Case is preserved
    /// for unmapped characters: the caller has already settled it.
    pub fn resolve(&self, ch: char) -> String {
        match self.lookup(ch) {
            Some(target) => target.to_string(),
            None => ch.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in authoring order.
    pub fn entries(&self) -> impl Iterator<Item = (char, &str)> + '_ {
        self.entries.iter().map(|(source, target)| (*source, target.as_str()))
    }

    /// Stamp the modification time.
    pub fn touch(&mut self) {
        self.modified = Some(Utc::now());
    }

    /// Parse the TOML wire form.
    pub fn from_toml(content: &str) -> Result<Self, FontError> {
        let raw: FontToml = toml::from_str(content).map_err(|e| FontError::Parse(e.to_string()))?;
        let mut font = Self::from_entries(raw.name, raw.entries)?;
        font.description = raw.description.unwrap_or_default();
        font.author = raw.author.unwrap_or_default();
        font.modified = raw.modified;
        Ok(font)
    }

    pub fn to_toml(&self) -> Result<String, FontError> {
        let raw = FontToml {
            name: self.name.clone(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            author: (!self.author.is_empty()).then(|| self.author.clone()),
            modified: self.modified,
            entries: self
                .entries()
                .map(|(source, target)| GlyphEntry {
                    source,
                    target: target.to_string(),
                })
                .collect(),
        };
        toml::to_string_pretty(&raw).map_err(|e| FontError::Serialize(e.to_string()))
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, FontError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Write to `path`, stamping the modification time first.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<(), FontError> {
        self.touch();
        let content = self.to_toml()?;
        fs::write(path, content)?;
        Ok(())
    }
}

/// Raw TOML shape of a font file.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct FontToml {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    modified: Option<DateTime<Utc>>,
    #[serde(default)]
    entries: Vec<GlyphEntry>,
}
