use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::error::TemplateError;
use super::record::TemplateRecord;
use super::Template;
use crate::TemplateConfig;

const LAST_FILE: &str = "last.json";
const TEMPLATES_DIR: &str = "templates";
const DEFAULT_DIR: &str = ".photomark";

/// Result of reading the last-used template. `warning` is set when the file
/// existed but could not be used and the default was substituted.
#[derive(Debug)]
pub struct LoadedTemplate {
    pub template: Template,
    pub warning: Option<TemplateError>,
}

/// Template files under one root directory:
/// `<root>/last.json` and `<root>/templates/<name>.json`.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Configured directory, or `~/.photomark`.
    pub fn from_config(config: &TemplateConfig) -> Self {
        let root = config.directory.clone().unwrap_or_else(|| {
            std::env::var_os("HOME")
                .or_else(|| std::env::var_os("USERPROFILE"))
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DIR)
        });
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn last_path(&self) -> PathBuf {
        self.root.join(LAST_FILE)
    }

    pub fn template_path(&self, name: &str) -> Result<PathBuf, TemplateError> {
        Ok(self
            .root
            .join(TEMPLATES_DIR)
            .join(format!("{}.json", sanitize_name(name)?)))
    }

    /// Read the last-used template. Never fails: a missing file gives the
    /// default template, an unreadable one the default plus a warning.
    pub fn load_last(&self) -> LoadedTemplate {
        let path = self.last_path();
        match read_template(&path) {
            Ok(template) => {
                info!("Restored last template from {:?}", path);
                LoadedTemplate {
                    template,
                    warning: None,
                }
            }
            Err(TemplateError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("No last template at {:?}, using defaults", path);
                LoadedTemplate {
                    template: Template::default(),
                    warning: None,
                }
            }
            Err(e) => {
                warn!("{}; using the default template", e);
                LoadedTemplate {
                    template: Template::default(),
                    warning: Some(e),
                }
            }
        }
    }

    pub fn save_last(&self, template: &Template) -> Result<(), TemplateError> {
        write_template(&self.last_path(), template)
    }

    /// Store `template` under `name`, replacing any template of that name.
    pub fn save(&self, name: &str, template: &Template) -> Result<PathBuf, TemplateError> {
        let path = self.template_path(name)?;
        let named = Template {
            name: name.to_string(),
            ..template.clone()
        };
        write_template(&path, &named)?;
        info!("Saved template '{}' to {:?}", name, path);
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<Template, TemplateError> {
        read_template(&self.template_path(name)?)
    }

    /// Names of the saved templates, sorted.
    pub fn list(&self) -> Result<Vec<String>, TemplateError> {
        let dir = self.root.join(TEMPLATES_DIR);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(TemplateError::Io { path: dir, source }),
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("json"))
            .filter_map(|path| path.file_stem().and_then(|s| s.to_str()).map(String::from))
            .collect();
        names.sort();
        Ok(names)
    }

    /// Returns whether a template was removed.
    pub fn delete(&self, name: &str) -> Result<bool, TemplateError> {
        let path = self.template_path(name)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!("Deleted template '{}'", name);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(TemplateError::Io { path, source }),
        }
    }
}

/// Path separators become `_` so a name always maps to one file in the
/// templates directory.
pub fn sanitize_name(name: &str) -> Result<String, TemplateError> {
    let sanitized = name.trim().replace(['/', '\\'], "_");
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    Ok(sanitized)
}

fn read_template(path: &Path) -> Result<Template, TemplateError> {
    let content = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let record = TemplateRecord::from_json(&content).map_err(|source| TemplateError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(record.into_template())
}

/// Write through a temporary file in the target directory and rename it into
/// place, so readers see either the old or the new file.
fn write_template(path: &Path, template: &Template) -> Result<(), TemplateError> {
    let json = TemplateRecord::from_template(template)
        .to_json()
        .map_err(|source| TemplateError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    let io_error = |source: std::io::Error| TemplateError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(io_error)?;

    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(json.as_bytes()).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;
    debug!("Wrote template to {:?}", path);
    Ok(())
}
