use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod batch;
pub mod export;
pub mod metadata;
pub mod preview;
pub mod template;
pub mod watermark;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub fonts: FontConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FontConfig {
    /// Directories searched recursively for .ttf/.otf/.ttc files.
    /// Empty means the platform defaults.
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    /// File stems tried in order when the requested family is `auto` or
    /// cannot be found.
    #[serde(default = "default_preferred_fonts")]
    pub preferred: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Worker threads for batch export. Capped at the number of cores.
    pub workers: Option<usize>,
    pub overwrite_existing: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Longest edge of the downscaled preview copy.
    pub max_edge: u32,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TemplateConfig {
    /// Overrides `~/.photomark`.
    pub directory: Option<PathBuf>,
}

fn default_preferred_fonts() -> Vec<String> {
    [
        "DejaVuSans",
        "LiberationSans-Regular",
        "NotoSans-Regular",
        "Arial",
        "arial",
        "Helvetica",
        "msyh",
        "simhei",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Photomark".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            preferred: default_preferred_fonts(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { max_edge: 800 }
    }
}

impl Config {
    /// Parse a `photomark.toml` document. Missing sections take defaults.
    pub fn from_toml(content: &str) -> Result<Self, toml_edit::de::Error> {
        toml_edit::de::from_str::<Config>(content)
    }

    /// Worker count for batch export: the configured value, never more than
    /// the available cores and never less than one.
    pub fn effective_workers(&self) -> usize {
        batch::effective_workers(self.export.workers.unwrap_or(usize::MAX))
    }
}
