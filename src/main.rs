use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use photomark::{
    Config,
    batch::{BatchJob, BatchOrchestrator, PerFileResult},
    export::{OutputFormat, Quality, RenameRule, ResizePolicy, effective_watermark},
    metadata::{ExifResolver, MetadataResolver},
    preview::Preview,
    template::{Session, Template, TemplateRecord, TemplateStore},
    watermark::{
        Anchor, FontCatalog, FontFamily, ImageWatermark, PositionSpec, TextWatermark,
        WatermarkAssets, WatermarkSpec, parse_color,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "photomark.toml", global = true)]
    config: PathBuf,

    /// Overrides `app.log_level` from the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watermark and export images or folders of images
    Export {
        /// Image files or directories (searched recursively)
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,

        /// Named template to use instead of the last one
        #[arg(short, long)]
        template: Option<String>,

        #[arg(short, long)]
        workers: Option<usize>,

        /// Replace files that already exist in the output directory
        #[arg(long)]
        overwrite: bool,
    },

    /// Render a downscaled preview of one image with the current template
    Preview {
        input: PathBuf,

        #[arg(short, long, default_value = "preview.png")]
        output: PathBuf,

        /// Drag the watermark so its center lands on X,Y (preview pixels)
        /// and keep the resulting position
        #[arg(long, value_name = "X,Y")]
        drag: Option<String>,
    },

    /// Manage the current and named templates
    #[command(subcommand)]
    Template(TemplateCommands),
}

#[derive(Subcommand, Debug)]
enum TemplateCommands {
    /// Print the current template
    Show,
    /// List saved templates
    List,
    /// Save the current template under a name
    Save { name: String },
    /// Make a saved template the current one
    Load { name: String },
    /// Delete a saved template
    Delete { name: String },
    /// Convert a legacy custom position to span form, keeping its pixel
    /// position on a reference image
    Migrate {
        name: String,
        #[arg(long)]
        reference: PathBuf,
    },
    /// Change fields of the current template
    Set(SetArgs),
}

#[derive(clap::Args, Debug)]
struct SetArgs {
    /// Text watermark; empty text shows the capture date
    #[arg(long, conflicts_with = "image")]
    text: Option<String>,
    /// Image watermark from this file
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long)]
    font: Option<String>,
    #[arg(long)]
    font_size: Option<f32>,
    #[arg(long)]
    color: Option<String>,
    #[arg(long)]
    opacity: Option<f32>,
    #[arg(long)]
    rotation: Option<f32>,
    /// Image watermark scale in percent
    #[arg(long)]
    scale: Option<f32>,
    /// One of the nine anchors, e.g. bottom-right
    #[arg(long)]
    position: Option<String>,
    /// jpeg or png
    #[arg(long)]
    format: Option<String>,
    #[arg(long)]
    quality: Option<i64>,
    /// none, width:N, height:N or percent:N
    #[arg(long)]
    resize: Option<String>,
    /// keep, prefix:TEXT or suffix:TEXT
    #[arg(long)]
    rename: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let level_name = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.app.log_level.clone());
    let level = match level_name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let session = Session::start(TemplateStore::from_config(&config.templates));
    if let Some(warning) = session.warning() {
        warn!("{}", warning);
    }

    run(&config, session, cli.command).await
}

/// Run one command. The session is saved even when the command fails.
async fn run(
    config: &Config,
    mut session: Session,
    command: Commands,
) -> Result<(), Box<dyn std::error::Error>> {
    let result = match command {
        Commands::Export {
            inputs,
            output,
            template,
            workers,
            overwrite,
        } => {
            let template = match template {
                Some(name) => session.store().load(&name).map(Arc::new),
                None => Ok(session.current()),
            };
            match template {
                Ok(template) => {
                    run_export(config, template, inputs, output, workers, overwrite).await
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Preview {
            input,
            output,
            drag,
        } => run_preview(config, &mut session, &input, &output, drag.as_deref()),
        Commands::Template(command) => handle_template_command(config, &mut session, command),
    };

    session.finish()?;
    result
}

fn load_config(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        Ok(Config::from_toml(&content)?)
    } else {
        Ok(Config::default())
    }
}

async fn run_export(
    config: &Config,
    template: Arc<Template>,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    workers: Option<usize>,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting {} export with template '{}'", config.app.name, template.name);
    let job = BatchJob::new(&inputs, template, &output)
        .with_overwrite(overwrite || config.export.overwrite_existing);
    let catalog = FontCatalog::discover(&config.fonts.directories);
    let metadata: Arc<dyn MetadataResolver> = Arc::new(ExifResolver);
    let orchestrator = BatchOrchestrator::prepare(job, &catalog, &config.fonts.preferred, metadata)?;
    let total = orchestrator.job().len();
    let workers = workers.unwrap_or_else(|| config.effective_workers());

    let cancel = CancellationToken::new();
    let orchestrator = orchestrator.with_cancellation(cancel.clone());
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing files in progress");
            signal_token.cancel();
        }
    });

    let (tx, rx) = std::sync::mpsc::channel::<PerFileResult>();
    let printer = std::thread::spawn(move || {
        let mut done = 0;
        for result in rx {
            done += 1;
            match &result.outcome {
                Ok(file) => println!("[{}/{}] {}", done, total, file.output.display()),
                Err(e) => println!("[{}/{}] FAILED {}: {}", done, total, result.source.display(), e),
            }
        }
    });

    let summary =
        tokio::task::spawn_blocking(move || orchestrator.run_parallel(workers, Some(tx))).await?;
    if printer.join().is_err() {
        error!("Progress printer panicked");
    }

    println!(
        "Exported {} of {} ({} failed, {} not processed)",
        summary.succeeded.len(),
        summary.total,
        summary.failed.len(),
        summary.not_processed
    );
    for failed in &summary.failed {
        println!("  {} [{}]: {}", failed.source.display(), failed.kind, failed.reason);
    }
    Ok(())
}

fn run_preview(
    config: &Config,
    session: &mut Session,
    input: &Path,
    output: &Path,
    drag: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let template = session.current();
    let preview = Preview::open(input, template.resize, config.preview.max_edge)?;
    let spec = effective_watermark(&template.watermark, input, &ExifResolver);
    let catalog = FontCatalog::discover(&config.fonts.directories);
    let assets = WatermarkAssets::load(&spec, &catalog, &config.fonts.preferred)?;

    let mut position = template.position;
    if let Some(target) = drag {
        let (tx, ty) = parse_point(target)?;
        let mut drag_session = preview.drag_session(&spec, position, &assets)?;
        let (cx, cy) = drag_session.current_rect().center();
        drag_session.press(cx, cy);
        drag_session.drag_to(tx, ty);
        if let Some(captured) = drag_session.release() {
            position = captured;
            session.replace(Template {
                position,
                ..(*template).clone()
            });
            info!("Watermark moved to {:?}", position);
        }
    }

    let rendered = preview.render(&spec, &position, &assets)?;
    rendered.save(output)?;
    println!(
        "Preview {}x{} (export {}x{}) written to {}",
        rendered.width(),
        rendered.height(),
        preview.export_size().0,
        preview.export_size().1,
        output.display()
    );
    Ok(())
}

fn handle_template_command(
    config: &Config,
    session: &mut Session,
    command: TemplateCommands,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        TemplateCommands::Show => {
            let current = session.current();
            println!("{}", TemplateRecord::from_template(&current).to_json()?);
        }
        TemplateCommands::List => {
            let names = session.store().list()?;
            if names.is_empty() {
                println!("No saved templates in {}", session.store().root().display());
            }
            for name in names {
                println!("{}", name);
            }
        }
        TemplateCommands::Save { name } => {
            let path = session.store().save(&name, &session.current())?;
            println!("Saved template '{}' to {}", name, path.display());
        }
        TemplateCommands::Load { name } => {
            let template = session.store().load(&name)?;
            session.replace(template);
            println!("Loaded template '{}'", name);
        }
        TemplateCommands::Delete { name } => {
            if !session.store().delete(&name)? {
                return Err(format!("Template '{}' not found", name).into());
            }
            println!("Deleted template '{}'", name);
        }
        TemplateCommands::Migrate { name, reference } => {
            let template = session.store().load(&name)?;
            if !template.position.is_legacy() {
                println!("Template '{}' has no legacy position", name);
                return Ok(());
            }
            // Full-size layer on the exported reference, as export draws it
            let preview = Preview::open(&reference, template.resize, 0)?;
            let spec = effective_watermark(&template.watermark, &reference, &ExifResolver);
            let catalog = FontCatalog::discover(&config.fonts.directories);
            let assets = WatermarkAssets::load(&spec, &catalog, &config.fonts.preferred)?;
            let (wm_w, wm_h) = preview.layer(&spec, &assets)?.dimensions();
            let (canvas_w, canvas_h) = preview.export_size();

            let migrated = Template {
                position: template.position.migrate_legacy(canvas_w, canvas_h, wm_w, wm_h),
                ..template
            };
            session.store().save(&name, &migrated)?;
            println!("Migrated template '{}' to {:?}", name, migrated.position);
        }
        TemplateCommands::Set(args) => {
            let updated = apply_settings((*session.current()).clone(), args)?;
            session.replace(updated);
            println!("{}", TemplateRecord::from_template(&session.current()).to_json()?);
        }
    }
    Ok(())
}

fn apply_settings(template: Template, args: SetArgs) -> Result<Template, String> {
    let mut watermark = template.watermark.clone();
    if let Some(text) = args.text {
        watermark = match watermark {
            WatermarkSpec::Text(existing) => WatermarkSpec::Text(existing.with_content(text)),
            WatermarkSpec::Image(_) => WatermarkSpec::Text(TextWatermark::new(text)),
        };
    }
    if let Some(path) = args.image {
        watermark = WatermarkSpec::Image(ImageWatermark::new(path));
    }

    let color = args
        .color
        .as_deref()
        .map(|c| parse_color(c).ok_or_else(|| format!("Unknown color '{}'", c)))
        .transpose()?;
    watermark = match watermark {
        WatermarkSpec::Text(mut text) => {
            if let Some(font) = &args.font {
                text = text.with_font_family(FontFamily::parse(font));
            }
            if let Some(size) = args.font_size {
                text = text.with_font_size(size);
            }
            if let Some(color) = color {
                text = text.with_color(color);
            }
            if let Some(opacity) = args.opacity {
                text = text.with_opacity(opacity);
            }
            if let Some(rotation) = args.rotation {
                text = text.with_rotation(rotation);
            }
            WatermarkSpec::Text(text)
        }
        WatermarkSpec::Image(mut image) => {
            if let Some(scale) = args.scale {
                image = image.with_scale_percent(scale);
            }
            if let Some(opacity) = args.opacity {
                image = image.with_opacity(opacity);
            }
            if let Some(rotation) = args.rotation {
                image = image.with_rotation(rotation);
            }
            WatermarkSpec::Image(image)
        }
    };

    let position = match args.position.as_deref() {
        Some(label) => PositionSpec::Preset(
            Anchor::parse(label).ok_or_else(|| format!("Unknown position '{}'", label))?,
        ),
        None => template.position,
    };
    let format = match args.format.as_deref() {
        Some(value) => {
            OutputFormat::parse(value).ok_or_else(|| format!("Unknown format '{}'", value))?
        }
        None => template.format,
    };
    let resize = match args.resize.as_deref() {
        Some(value) => parse_resize(value)?,
        None => template.resize,
    };
    let rename = match args.rename.as_deref() {
        Some(value) => parse_rename(value)?,
        None => template.rename.clone(),
    };

    Ok(Template {
        watermark,
        position,
        format,
        resize,
        rename,
        jpeg_quality: args.quality.map(Quality::new).unwrap_or(template.jpeg_quality),
        ..template
    })
}

fn parse_point(value: &str) -> Result<(f64, f64), String> {
    let invalid = || format!("Expected X,Y but got '{}'", value);
    let (x, y) = value.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse::<f64>().map_err(|_| invalid())?;
    let y = y.trim().parse::<f64>().map_err(|_| invalid())?;
    Ok((x, y))
}

fn parse_resize(value: &str) -> Result<ResizePolicy, String> {
    let invalid = || format!("Unknown resize '{}'", value);
    if value.trim().eq_ignore_ascii_case("none") {
        return Ok(ResizePolicy::None);
    }
    let (mode, amount) = value.split_once(':').ok_or_else(invalid)?;
    match mode.trim().to_lowercase().as_str() {
        "width" => Ok(ResizePolicy::Width(amount.trim().parse().map_err(|_| invalid())?)),
        "height" => Ok(ResizePolicy::Height(amount.trim().parse().map_err(|_| invalid())?)),
        "percent" => Ok(ResizePolicy::Percent(amount.trim().parse().map_err(|_| invalid())?)),
        _ => Err(invalid()),
    }
}

fn parse_rename(value: &str) -> Result<RenameRule, String> {
    if value.trim().eq_ignore_ascii_case("keep") {
        return Ok(RenameRule::Keep);
    }
    match value.split_once(':') {
        Some(("prefix", text)) => Ok(RenameRule::Prefix(text.to_string())),
        Some(("suffix", text)) => Ok(RenameRule::Suffix(text.to_string())),
        _ => Err(format!("Unknown rename rule '{}'", value)),
    }
}
