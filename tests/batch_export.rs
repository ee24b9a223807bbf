use image::{ImageBuffer, Rgb, Rgba, RgbaImage};
use photomark::batch::{BatchError, BatchJob, BatchOrchestrator};
use photomark::export::{ExportErrorKind, OutputFormat, RenameRule};
use photomark::metadata::ExifResolver;
use photomark::template::Template;
use photomark::watermark::{Anchor, FontCatalog, ImageWatermark, PositionSpec, WatermarkSpec};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// Helper to write a batch of photos, with the listed indices corrupt
fn create_photos(dir: &Path, count: usize, corrupt: &[usize]) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| {
            let path = dir.join(format!("photo{}.png", i));
            if corrupt.contains(&i) {
                std::fs::write(&path, b"this is not a png").unwrap();
            } else {
                let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
                    ImageBuffer::from_pixel(120, 80, Rgb([30, 60, 90]));
                img.save(&path).unwrap();
            }
            path
        })
        .collect()
}

fn create_logo(dir: &Path) -> PathBuf {
    let path = dir.join("logo.png");
    let logo: RgbaImage = ImageBuffer::from_pixel(20, 10, Rgba([255, 255, 0, 255]));
    logo.save(&path).unwrap();
    path
}

fn logo_template(logo: &Path) -> Arc<Template> {
    Arc::new(Template {
        watermark: WatermarkSpec::Image(ImageWatermark::new(logo).with_opacity(1.0)),
        position: PositionSpec::Preset(Anchor::TopLeft),
        format: OutputFormat::Png,
        ..Template::default()
    })
}

fn prepare(job: BatchJob) -> Result<BatchOrchestrator, BatchError> {
    BatchOrchestrator::prepare(
        job,
        &FontCatalog::from_files(Vec::<PathBuf>::new()),
        &[],
        Arc::new(ExifResolver),
    )
}

#[test]
fn test_one_corrupt_file_does_not_stop_the_batch() {
    let photos_dir = TempDir::new().unwrap();
    let assets_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    create_photos(photos_dir.path(), 5, &[3]);
    let logo = create_logo(assets_dir.path());

    let job = BatchJob::new(
        &[photos_dir.path().to_path_buf()],
        logo_template(&logo),
        output_dir.path(),
    );
    let results: Vec<_> = prepare(job).unwrap().run().collect();

    assert_eq!(results.len(), 5);
    let failed: Vec<_> = results.iter().filter(|r| r.outcome.is_err()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].source.ends_with("photo3.png"));
    assert_eq!(
        failed[0].outcome.as_ref().unwrap_err().kind(),
        ExportErrorKind::DecodeError
    );

    let mut outputs: Vec<_> = std::fs::read_dir(output_dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    outputs.sort();
    assert_eq!(
        outputs,
        vec!["photo1.png", "photo2.png", "photo4.png", "photo5.png"]
    );

    let written = image::open(output_dir.path().join("photo1.png"))
        .unwrap()
        .to_rgba8();
    assert_eq!(*written.get_pixel(10, 10), Rgba([255, 255, 0, 255]));
    assert_eq!(*written.get_pixel(60, 40), Rgba([30, 60, 90, 255]));
}

#[test]
fn test_parallel_run_matches_sequential_outputs() {
    let photos_dir = TempDir::new().unwrap();
    let assets_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    create_photos(photos_dir.path(), 8, &[2, 7]);
    let logo = create_logo(assets_dir.path());

    let job = BatchJob::new(
        &[photos_dir.path().to_path_buf()],
        logo_template(&logo),
        output_dir.path(),
    );
    let (tx, rx) = std::sync::mpsc::channel();
    let summary = prepare(job).unwrap().run_parallel(3, Some(tx));

    assert_eq!(summary.total, 8);
    assert_eq!(summary.succeeded.len(), 6);
    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.not_processed, 0);
    assert_eq!(rx.into_iter().count(), 8);
    assert_eq!(std::fs::read_dir(output_dir.path()).unwrap().count(), 6);
}

#[test]
fn test_exporting_into_the_source_folder_never_replaces_sources() {
    let photos_dir = TempDir::new().unwrap();
    let assets_dir = TempDir::new().unwrap();
    let sources = create_photos(photos_dir.path(), 2, &[]);
    let originals: Vec<_> = sources.iter().map(|p| std::fs::read(p).unwrap()).collect();
    let logo = create_logo(assets_dir.path());

    let job = BatchJob::new(
        &[photos_dir.path().to_path_buf()],
        logo_template(&logo),
        photos_dir.path(),
    );
    let summary = prepare(job).unwrap().run_parallel(2, None);
    assert_eq!(summary.succeeded.len(), 2);

    for (source, original) in sources.iter().zip(&originals) {
        assert_eq!(&std::fs::read(source).unwrap(), original);
    }
    assert!(photos_dir.path().join("photo1_1.png").exists());
    assert!(photos_dir.path().join("photo2_1.png").exists());
}

#[test]
fn test_renamed_outputs_are_deterministic() {
    let photos_dir = TempDir::new().unwrap();
    let assets_dir = TempDir::new().unwrap();
    create_photos(photos_dir.path(), 3, &[]);
    let logo = create_logo(assets_dir.path());
    let template = Arc::new(Template {
        rename: RenameRule::Suffix("_wm".to_string()),
        format: OutputFormat::Jpeg,
        ..(*logo_template(&logo)).clone()
    });

    let mut runs = Vec::new();
    for _ in 0..2 {
        let output_dir = TempDir::new().unwrap();
        let job = BatchJob::new(
            &[photos_dir.path().to_path_buf()],
            Arc::clone(&template),
            output_dir.path(),
        );
        let summary = prepare(job).unwrap().run_parallel(3, None);
        let mut names: Vec<_> = summary
            .succeeded
            .iter()
            .map(|f| f.output.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        names.sort();
        runs.push(names);
    }
    assert_eq!(runs[0], vec!["photo1_wm.jpg", "photo2_wm.jpg", "photo3_wm.jpg"]);
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn test_preconditions_fail_before_any_output() {
    let photos_dir = TempDir::new().unwrap();
    let output_dir = TempDir::new().unwrap();
    create_photos(photos_dir.path(), 2, &[]);

    let missing_logo = photos_dir.path().join("missing-logo.png");
    let job = BatchJob::new(
        &[photos_dir.path().to_path_buf()],
        logo_template(&missing_logo),
        output_dir.path(),
    );
    assert!(matches!(prepare(job), Err(BatchError::Assets(_))));

    let empty_dir = TempDir::new().unwrap();
    let job = BatchJob::new(
        &[empty_dir.path().to_path_buf()],
        Arc::new(Template::default()),
        output_dir.path(),
    );
    assert!(matches!(prepare(job), Err(BatchError::EmptyJob)));
    assert_eq!(std::fs::read_dir(output_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_rerun_with_output_nested_in_input_skips_earlier_outputs() {
    let photos_dir = TempDir::new().unwrap();
    let assets_dir = TempDir::new().unwrap();
    create_photos(photos_dir.path(), 2, &[]);
    let logo = create_logo(assets_dir.path());
    let output_dir = photos_dir.path().join("watermarked");

    let run = |overwrite: bool| {
        let job = BatchJob::new(
            &[photos_dir.path().to_path_buf()],
            logo_template(&logo),
            &output_dir,
        )
        .with_overwrite(overwrite);
        assert_eq!(
            job.sources(),
            &[photos_dir.path().join("photo1.png"), photos_dir.path().join("photo2.png")]
        );
        prepare(job).unwrap().run_parallel(2, None)
    };

    let first = run(false);
    assert_eq!(first.succeeded.len(), 2);
    let second = run(true);
    assert_eq!(second.total, 2);
    assert_eq!(second.succeeded.len(), 2);
    assert!(second.failed.is_empty());

    let mut outputs: Vec<_> = std::fs::read_dir(&output_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["photo1.png", "photo2.png"]);
}
