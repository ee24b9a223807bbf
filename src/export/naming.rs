//! Output file names and collision handling.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::error::ExportError;
use super::formats::OutputFormat;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RenameRule {
    #[default]
    Keep,
    Prefix(String),
    Suffix(String),
}

/// File name for the output of `source`: the source stem with the rule
/// applied and the extension of `format`.
pub fn output_file_name(rule: &RenameRule, source: &Path, format: OutputFormat) -> String {
    file_name_with_counter(rule, source, format, None)
}

fn file_name_with_counter(
    rule: &RenameRule,
    source: &Path,
    format: OutputFormat,
    counter: Option<u32>,
) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let stem = match rule {
        RenameRule::Keep => stem,
        RenameRule::Prefix(prefix) => format!("{}{}", sanitize_affix(prefix), stem),
        RenameRule::Suffix(suffix) => format!("{}{}", stem, sanitize_affix(suffix)),
    };
    match counter {
        Some(n) => format!("{}_{}.{}", stem, n, format.extension()),
        None => format!("{}.{}", stem, format.extension()),
    }
}

/// Path separators in a prefix or suffix become `_`, so every name stays a
/// single component inside the output directory.
fn sanitize_affix(affix: &str) -> String {
    affix.replace(['/', '\\'], "_")
}

/// Hands out output paths for one batch.
///
/// Rules, in order:
/// - a name equal to the file's own source gets `_1`, `_2`, ... appended
/// - a name equal to another source of the batch, or already handed out,
///   is a collision
/// - a name that exists on disk is a collision unless overwriting is allowed
///
/// Names handed out by [`reserve`](Self::reserve) follow job order, however
/// the workers later interleave.
pub struct OutputNamer {
    output_dir: PathBuf,
    sources: HashSet<PathBuf>,
    claimed: Mutex<HashSet<PathBuf>>,
    reserved: Mutex<HashMap<PathBuf, PathBuf>>,
    overwrite: bool,
}

impl OutputNamer {
    pub fn new(output_dir: &Path, sources: &[PathBuf], overwrite: bool) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            sources: sources.iter().map(|p| normalize(p)).collect(),
            claimed: Mutex::new(HashSet::new()),
            reserved: Mutex::new(HashMap::new()),
            overwrite,
        }
    }

    /// Claim names for `sources` in order, before any of them is exported.
    ///
    /// A later [`claim`](Self::claim) for one of them returns the reserved
    /// name. A source whose name is taken gets no reservation, so its own
    /// claim reports the collision.
    pub fn reserve(&self, sources: &[PathBuf], rule: &RenameRule, format: OutputFormat) {
        for source in sources {
            match self.claim(source, rule, format) {
                Ok(output) => {
                    self.reserved
                        .lock()
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .insert(normalize(source), output);
                }
                Err(e) => debug!("No output name reserved for {:?}: {}", source, e),
            }
        }
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite
    }

    /// Reserve the output path for `source`.
    pub fn claim(
        &self,
        source: &Path,
        rule: &RenameRule,
        format: OutputFormat,
    ) -> Result<PathBuf, ExportError> {
        let own_source = normalize(source);
        if let Some(output) = self
            .reserved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&own_source)
        {
            return Ok(output);
        }
        let mut claimed = self
            .claimed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let candidate = self
            .output_dir
            .join(output_file_name(rule, source, format));
        let normalized = normalize(&candidate);

        if normalized != own_source {
            self.check_free(&candidate, &normalized, &claimed)?;
            claimed.insert(normalized);
            return Ok(candidate);
        }

        // Writing over our own source: find the first free numbered name
        for counter in 1..=u32::MAX {
            let candidate = self
                .output_dir
                .join(file_name_with_counter(rule, source, format, Some(counter)));
            let normalized = normalize(&candidate);
            if self.check_free(&candidate, &normalized, &claimed).is_ok() {
                debug!(
                    "Output for {:?} renamed to {:?} to keep the source intact",
                    source, candidate
                );
                claimed.insert(normalized);
                return Ok(candidate);
            }
        }
        Err(ExportError::OutputCollision {
            path: candidate,
            reason: "every numbered alternative".to_string(),
        })
    }

    fn check_free(
        &self,
        candidate: &Path,
        normalized: &Path,
        claimed: &HashSet<PathBuf>,
    ) -> Result<(), ExportError> {
        let reason = if self.sources.contains(normalized) {
            "another source image of this batch"
        } else if claimed.contains(normalized) {
            "the output of an earlier image in this batch"
        } else if !self.overwrite && candidate.exists() {
            "an existing file"
        } else {
            return Ok(());
        };
        Err(ExportError::OutputCollision {
            path: candidate.to_path_buf(),
            reason: reason.to_string(),
        })
    }
}

/// Absolute path with the parent directory canonicalized when it exists, so
/// `./a/../photo.jpg` and `photo.jpg` compare equal.
fn normalize(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };
    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => std::fs::canonicalize(parent)
            .map(|parent| parent.join(name))
            .unwrap_or(absolute),
        _ => absolute,
    }
}
