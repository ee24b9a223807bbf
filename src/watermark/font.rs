//! Font discovery and family resolution.

use ab_glyph::FontVec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use super::error::{AssetError, FontResolutionError};

const FONT_EXTENSIONS: [&str; 3] = ["ttf", "otf", "ttc"];

/// Labels older template files use for "pick a font for me".
const AUTO_LABELS: [&str; 3] = ["auto", "(auto)", "(自动)"];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FontFamily {
    #[default]
    Auto,
    /// Matched case-insensitively against font file stems.
    Named(String),
}

impl FontFamily {
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() || AUTO_LABELS.contains(&trimmed.to_lowercase().as_str()) {
            FontFamily::Auto
        } else {
            FontFamily::Named(trimmed.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FontFamily::Auto => "(auto)",
            FontFamily::Named(name) => name,
        }
    }
}

/// A loaded font plus the warning produced if it is not what was asked for.
#[derive(Clone)]
pub struct ResolvedFont {
    pub name: String,
    pub font: Arc<FontVec>,
    pub warning: Option<FontResolutionError>,
}

impl std::fmt::Debug for ResolvedFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedFont")
            .field("name", &self.name)
            .field("warning", &self.warning)
            .finish()
    }
}

/// Font files found on disk, keyed by lowercase file stem.
#[derive(Debug, Clone, Default)]
pub struct FontCatalog {
    fonts: BTreeMap<String, PathBuf>,
    searched: usize,
}

impl FontCatalog {
    /// Scan `directories` recursively, or the platform font directories when
    /// none are given.
    pub fn discover(directories: &[PathBuf]) -> Self {
        let directories = if directories.is_empty() {
            platform_font_dirs()
        } else {
            directories.to_vec()
        };

        let mut fonts = BTreeMap::new();
        for dir in &directories {
            if !dir.is_dir() {
                trace!("Skipping missing font directory {:?}", dir);
                continue;
            }
            for entry in WalkDir::new(dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if let Some(stem) = font_stem(entry.path()) {
                    // First directory wins for duplicate stems
                    fonts.entry(stem).or_insert_with(|| entry.path().to_path_buf());
                }
            }
        }

        debug!(
            "Discovered {} fonts in {} directories",
            fonts.len(),
            directories.len()
        );
        Self {
            fonts,
            searched: directories.len(),
        }
    }

    /// Catalog over an explicit list of font files.
    pub fn from_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let fonts: BTreeMap<String, PathBuf> = files
            .into_iter()
            .filter_map(|p| {
                let path = p.as_ref();
                font_stem(path).map(|stem| (stem, path.to_path_buf()))
            })
            .collect();
        Self { fonts, searched: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.fonts.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fonts.keys().map(|s| s.as_str())
    }

    pub fn path_of(&self, name: &str) -> Option<&Path> {
        self.fonts.get(&name.to_lowercase()).map(|p| p.as_path())
    }

    /// Load the requested family.
    ///
    /// A named family that is missing or unreadable falls back to the
    /// preferred list and then to any font in the catalog, with a
    /// [`FontResolutionError`] attached. Only an empty or entirely
    /// unreadable catalog is an error.
    pub fn resolve(
        &self,
        family: &FontFamily,
        preferred: &[String],
    ) -> Result<ResolvedFont, AssetError> {
        if let FontFamily::Named(requested) = family {
            match self.load_named(requested) {
                Some(font) => return Ok(font),
                None => {
                    let mut fallback = self.load_fallback(preferred)?;
                    let warning = FontResolutionError {
                        requested: requested.clone(),
                        fallback: fallback.name.clone(),
                    };
                    warn!("{}", warning);
                    fallback.warning = Some(warning);
                    return Ok(fallback);
                }
            }
        }
        self.load_fallback(preferred)
    }

    fn load_named(&self, requested: &str) -> Option<ResolvedFont> {
        let wanted = requested.to_lowercase();
        // Exact stem first, then a stem that starts with the family name
        let candidate = self
            .fonts
            .get_key_value(&wanted)
            .or_else(|| self.fonts.iter().find(|(stem, _)| stem.starts_with(&wanted)))?;
        load_font(candidate.0, candidate.1)
    }

    fn load_fallback(&self, preferred: &[String]) -> Result<ResolvedFont, AssetError> {
        let preferred_paths = preferred
            .iter()
            .filter_map(|name| self.fonts.get_key_value(&name.to_lowercase()));
        preferred_paths
            .chain(self.fonts.iter())
            .find_map(|(stem, path)| load_font(stem, path))
            .ok_or(AssetError::NoFontAvailable {
                searched: self.searched,
            })
    }
}

fn font_stem(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    if !FONT_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

fn load_font(name: &str, path: &Path) -> Option<ResolvedFont> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            debug!("Failed to read font {:?}: {}", path, e);
            return None;
        }
    };
    match FontVec::try_from_vec(data) {
        Ok(font) => {
            debug!("Loaded font '{}' from {:?}", name, path);
            Some(ResolvedFont {
                name: name.to_string(),
                font: Arc::new(font),
                warning: None,
            })
        }
        Err(_) => {
            debug!("Failed to parse font {:?}", path);
            None
        }
    }
}

fn platform_font_dirs() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from);

    let mut dirs: Vec<PathBuf> = Vec::new();
    if cfg!(target_os = "windows") {
        let windir = std::env::var_os("WINDIR").unwrap_or_else(|| "C:\\Windows".into());
        dirs.push(PathBuf::from(windir).join("Fonts"));
        if let Some(local) = std::env::var_os("LOCALAPPDATA") {
            dirs.push(PathBuf::from(local).join("Microsoft").join("Windows").join("Fonts"));
        }
    } else if cfg!(target_os = "macos") {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Some(home) = &home {
            dirs.push(home.join("Library").join("Fonts"));
        }
    } else {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Some(home) = &home {
            dirs.push(home.join(".local").join("share").join("fonts"));
            dirs.push(home.join(".fonts"));
        }
    }
    dirs
}
