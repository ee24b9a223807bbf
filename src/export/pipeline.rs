use image::ImageReader;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::error::ExportError;
use super::formats;
use super::naming::OutputNamer;
use super::resize::{resample, target_dimensions};
use crate::metadata::MetadataResolver;
use crate::template::Template;
use crate::watermark::{WatermarkAssets, WatermarkSpec, prepare, render, resolve};

/// A written output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub source: PathBuf,
    pub output: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Runs one source image through decode, resize, watermark, encode and
/// write. Shared read-only between worker threads.
pub struct Exporter {
    template: Arc<Template>,
    assets: Arc<WatermarkAssets>,
    metadata: Arc<dyn MetadataResolver>,
    namer: Arc<OutputNamer>,
    output_dir: PathBuf,
}

impl Exporter {
    pub fn new(
        template: Arc<Template>,
        assets: Arc<WatermarkAssets>,
        metadata: Arc<dyn MetadataResolver>,
        namer: Arc<OutputNamer>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            template,
            assets,
            metadata,
            namer,
            output_dir: output_dir.into(),
        }
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn export(&self, source: &Path) -> Result<ExportedFile, ExportError> {
        let template = self.template.as_ref();

        let decoded = decode(source)?;
        let target = target_dimensions(template.resize, decoded.width(), decoded.height())?;
        let canvas = resample(decoded, target).to_rgba8();

        // The layer is measured against the final canvas, so placement
        // matches what the preview showed for the same position
        let watermark = effective_watermark(&template.watermark, source, self.metadata.as_ref());
        let layer = prepare(&watermark, &self.assets, 1.0)?;
        let (x, y) = resolve(
            &template.position,
            canvas.width(),
            canvas.height(),
            layer.width(),
            layer.height(),
        );
        let composed = render(&canvas, &layer, x, y);
        debug!(
            "Watermarked {:?} at ({}, {}) on {}x{}",
            source,
            x,
            y,
            composed.width(),
            composed.height()
        );

        let temp = self.encode_to_temp(&composed)?;
        let output = self.namer.claim(source, &template.rename, template.format)?;
        self.persist(temp, &output)?;

        info!("Exported {:?} -> {:?}", source, output);
        Ok(ExportedFile {
            source: source.to_path_buf(),
            output,
            width: composed.width(),
            height: composed.height(),
        })
    }

    fn encode_to_temp(&self, image: &image::RgbaImage) -> Result<NamedTempFile, ExportError> {
        let write_error = |source: std::io::Error| ExportError::OutputWrite {
            path: self.output_dir.clone(),
            source,
        };

        let temp = NamedTempFile::new_in(&self.output_dir).map_err(write_error)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            formats::encode(
                image,
                self.template.format,
                self.template.jpeg_quality,
                &mut writer,
            )
            .map_err(|e| write_error(std::io::Error::other(e)))?;
            writer.flush().map_err(write_error)?;
        }
        Ok(temp)
    }

    fn persist(&self, temp: NamedTempFile, output: &Path) -> Result<(), ExportError> {
        let result = if self.namer.overwrite() {
            temp.persist(output)
        } else {
            temp.persist_noclobber(output)
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(ExportError::OutputCollision {
                    path: output.to_path_buf(),
                    reason: "a file created while exporting".to_string(),
                })
            }
            Err(e) => Err(ExportError::OutputWrite {
                path: output.to_path_buf(),
                source: e.error,
            }),
        }
    }
}

/// Text watermarks with no content show the capture date of `source`.
pub fn effective_watermark(
    spec: &WatermarkSpec,
    source: &Path,
    metadata: &dyn MetadataResolver,
) -> WatermarkSpec {
    match spec {
        WatermarkSpec::Text(text) if text.uses_capture_date() => {
            let date = metadata.capture_time(source).date_label();
            WatermarkSpec::Text(text.clone().with_content(date))
        }
        other => other.clone(),
    }
}

/// Decode with the format taken from the file content, not the extension.
pub(crate) fn decode(source: &Path) -> Result<image::DynamicImage, ExportError> {
    let decode_error = |e: image::ImageError| ExportError::Decode {
        path: source.to_path_buf(),
        source: e,
    };
    ImageReader::open(source)
        .map_err(|e| decode_error(image::ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| decode_error(image::ImageError::IoError(e)))?
        .decode()
        .map_err(decode_error)
}
