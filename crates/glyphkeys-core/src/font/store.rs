// Glyphkeys Font Store
// One TOML file per font under a fonts directory.

use super::{FontError, GlyphFont};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk font library.
pub struct FontStore {
    dir: PathBuf,
}

impl FontStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Default fonts directory (~/.config/glyphkeys/fonts).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("glyphkeys").join("fonts"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every font in the directory. Files that fail to parse are
    /// skipped with a warning; one corrupt file must not hide the rest of
    /// the library. A missing directory is an empty library.
    pub fn load_all(&self) -> Result<Vec<(PathBuf, GlyphFont)>, FontError> {
        let mut fonts = Vec::new();
        if !self.dir.exists() {
            return Ok(fonts);
        }
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            match GlyphFont::load(&path) {
                Ok(font) => fonts.push((path, font)),
                Err(err) => log::warn!("skipping font {}: {}", path.display(), err),
            }
        }
        fonts.sort_by(|(a, _), (b, _)| a.cmp(b));
        Ok(fonts)
    }

    /// Find a font by name among the loadable files.
    pub fn find(&self, name: &str) -> Result<Option<(PathBuf, GlyphFont)>, FontError> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|(_, font)| font.name() == name))
    }

    /// File path a font with this name would be stored at.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.toml", file_stem(name)))
    }

    /// Save a font under its name, creating the directory on first use.
    pub fn save(&self, font: &mut GlyphFont) -> Result<PathBuf, FontError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(font.name());
        font.save(&path)?;
        Ok(path)
    }
}

/// Font name to file stem: lowercase, spaces to dashes, everything else
/// non-alphanumeric dropped.
fn file_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_alphanumeric() {
            stem.extend(ch.to_lowercase());
        } else if (ch == ' ' || ch == '-' || ch == '_') && !stem.ends_with('-') {
            stem.push('-');
        }
    }
    let stem = stem.trim_matches('-').to_string();
    if stem.is_empty() {
        "font".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::GlyphEntry;

    fn temp_store(tag: &str) -> FontStore {
        let dir = std::env::temp_dir().join(format!(
            "glyphkeys-store-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        FontStore::new(dir)
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("Small Caps"), "small-caps");
        assert_eq!(file_stem("greek"), "greek");
        assert_eq!(file_stem("a  b!!c"), "a-bc");
        assert_eq!(file_stem("***"), "font");
    }

    #[test]
    fn test_missing_dir_is_empty_library() {
        let store = temp_store("missing");
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn test_save_and_load_all() {
        let store = temp_store("roundtrip");
        let mut font = GlyphFont::from_entries(
            "Test Font",
            vec![GlyphEntry {
                source: 'a',
                target: "ä".to_string(),
            }],
        )
        .unwrap();
        let path = store.save(&mut font).unwrap();
        assert_eq!(path.file_name().unwrap(), "test-font.toml");
        assert!(font.modified().is_some());

        let fonts = store.load_all().unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].1.name(), "Test Font");
        assert_eq!(store.find("Test Font").unwrap().unwrap().1.resolve('a'), "ä");
        assert!(store.find("absent").unwrap().is_none());

        let _ = fs::remove_dir_all(store.dir());
    }

    #[test]
    fn test_corrupt_file_skipped() {
        let store = temp_store("corrupt");
        fs::create_dir_all(store.dir()).unwrap();
        fs::write(store.dir().join("broken.toml"), "not = valid = toml").unwrap();
        let mut font = GlyphFont::new("ok");
        store.save(&mut font).unwrap();

        let fonts = store.load_all().unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].1.name(), "ok");

        let _ = fs::remove_dir_all(store.dir());
    }
}
