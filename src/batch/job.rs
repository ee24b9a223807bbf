use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::template::Template;

pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "tif", "tiff", "bmp", "webp"];

pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|n| n.starts_with('.'))
}

/// Expand files and directories into an ordered list of images.
///
/// Directories are walked recursively in name order, hidden entries are
/// skipped, and a path reached twice keeps its first position. A directory
/// met during a walk that is `output_dir` is not entered, so earlier
/// exports never become sources.
pub fn enumerate_inputs(inputs: &[PathBuf], output_dir: Option<&Path>) -> Vec<PathBuf> {
    let output_dir = output_dir.and_then(|dir| std::fs::canonicalize(dir).ok());
    let is_output = |path: &Path| {
        output_dir
            .as_deref()
            .is_some_and(|out| std::fs::canonicalize(path).is_ok_and(|p| p == out))
    };
    let mut seen = HashSet::new();
    let mut sources = Vec::new();
    let mut push = |path: PathBuf| {
        let key = std::fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        if seen.insert(key) {
            sources.push(path);
        }
    };

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| {
                    if is_hidden(e.file_name()) {
                        return false;
                    }
                    if e.file_type().is_dir() && is_output(e.path()) {
                        debug!("Skipping output directory {:?}", e.path());
                        return false;
                    }
                    true
                })
                .flatten()
            {
                if entry.file_type().is_file() && is_supported_image(entry.path()) {
                    push(entry.into_path());
                }
            }
        } else if input.is_file() {
            if is_supported_image(input) {
                push(input.clone());
            } else {
                debug!("Skipping unsupported file {:?}", input);
            }
        } else {
            warn!("Input {:?} does not exist, skipping", input);
        }
    }
    sources
}

/// One export run: expanded sources bound to a template and an output
/// directory.
#[derive(Debug, Clone)]
pub struct BatchJob {
    sources: Vec<PathBuf>,
    template: Arc<Template>,
    output_dir: PathBuf,
    overwrite: bool,
}

impl BatchJob {
    pub fn new(inputs: &[PathBuf], template: Arc<Template>, output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        let sources = enumerate_inputs(inputs, Some(&output_dir));
        debug!("Batch job with {} sources", sources.len());
        Self {
            sources,
            template,
            output_dir,
            overwrite: false,
        }
    }

    /// Allow replacing files that already exist in the output directory.
    pub fn with_overwrite(self, overwrite: bool) -> Self {
        Self { overwrite, ..self }
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
