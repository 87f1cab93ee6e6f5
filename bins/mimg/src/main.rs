//! mimg: CLI for memory-backed images.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use memimage::{
    BeforeWrite, DimensionMode, FormattedImageGenerator, ImageConfig, MemoryImage, PendingUpload,
    TransformRegistry,
};
use owo_colors::OwoColorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "mimg")]
#[command(about = "Store, inspect and transform images kept as blobs")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to .memimage.toml / memimage.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect image format from magic bytes
    Detect {
        /// Path or URL of the image
        source: String,
    },
    /// Show format, dimensions and size
    Info {
        /// Path or URL of the image
        source: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the image as a data: URI
    Embed {
        /// Path or URL of the image
        source: String,
    },
    /// Print an <img> tag embedding the image
    Tag {
        /// Path or URL of the image
        source: String,
        /// Alt text (defaults to the filename stem)
        #[arg(long)]
        title: Option<String>,
    },
    /// Convert between binary and base64
    Base64 {
        #[command(subcommand)]
        action: Base64Action,
    },
    /// Apply a named transform and write the derived image
    Transform {
        /// Path or URL of the image
        source: String,
        /// Transform name (resize, width, height, fit, crop, pad, greyscale)
        name: String,
        /// First transform argument
        arg1: Option<u32>,
        /// Second transform argument
        arg2: Option<u32>,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Ingest an uploaded file into a record, as the pre-save hook does
    Ingest {
        /// Uploaded file
        upload: PathBuf,
        /// Upload name (defaults to the file name)
        #[arg(long)]
        name: Option<String>,
        /// Record title
        #[arg(long)]
        title: Option<String>,
        /// Keep the uploaded file even if the config says to remove it
        #[arg(long)]
        keep: bool,
        /// Write the record JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Analyze images in a directory
    Analyze {
        /// Directory to analyze
        path: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum Base64Action {
    /// Print a file as base64
    Encode {
        /// Path or URL of the image
        source: String,
    },
    /// Decode base64 text into a file
    Decode {
        /// File holding base64 text, or - for stdin
        input: PathBuf,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Arc::new(ImageConfig::load(cli.config.as_deref())?);
    tracing::debug!(config = ?config.path, "Configuration loaded");

    match cli.command {
        Commands::Detect { source } => {
            let image = load(&config, &source)?;
            let format = image.determine_format();
            println!("Format: {}", format);
            println!("MIME: {}", format.mime_type());
            println!("Extension: {}", format.extension());
        }

        Commands::Info { source, json } => {
            let image = load(&config, &source)?;
            let format = image.determine_format();
            let width = image.dimensions(DimensionMode::Width);
            let height = image.dimensions(DimensionMode::Height);
            let size = image.content().map_or(0, <[u8]>::len);

            if json {
                let info = serde_json::json!({
                    "source": source,
                    "format": format,
                    "mime": format.mime_type(),
                    "width": width.and_then(|w| w.pixels()),
                    "height": height.and_then(|h| h.pixels()),
                    "size_bytes": size,
                });
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                println!("Format: {}", format);
                if let Some(dimensions) = image.dimensions(DimensionMode::Text) {
                    println!("Dimensions: {}", dimensions);
                }
                println!("Size: {} bytes", size);
            }
        }

        Commands::Embed { source } => {
            let image = load(&config, &source)?;
            let url = image.embedded_url().context("Image has no content")?;
            print!("{}", url);
        }

        Commands::Tag { source, title } => {
            let mut image = load(&config, &source)?;
            if let Some(title) = title {
                image.set_title(title);
            }
            println!("{}", image.tag().context("Image has no content")?);
        }

        Commands::Base64 { action } => match action {
            Base64Action::Encode { source } => {
                let image = load(&config, &source)?;
                println!("{}", image.base64().unwrap_or_default());
            }
            Base64Action::Decode { input, output } => {
                let text = read_text(&input)?;
                let mut image = MemoryImage::with_config(Arc::clone(&config));
                image.set_base64(&text, None);
                image
                    .save_to_path(&output)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
                println!(
                    "{} Decoded {} ({} bytes) to {}",
                    "✓".green(),
                    image.determine_format(),
                    image.content().map_or(0, <[u8]>::len),
                    output.display()
                );
            }
        },

        Commands::Transform { source, name, arg1, arg2, output } => {
            let image = load(&config, &source)?;
            let generator = FormattedImageGenerator::new(TransformRegistry::with_defaults());
            let Some(derived) = image.formatted_image(&generator, &name, arg1, arg2) else {
                bail!(
                    "Could not generate '{}' (known transforms: {})",
                    name,
                    generator.transforms().names().join(", ")
                );
            };
            derived
                .save_to_path(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            if let Some(dimensions) = derived.dimensions(DimensionMode::Text) {
                println!("{} {} -> {} ({})", "✓".green(), name, output.display(), dimensions);
            }
        }

        Commands::Ingest { upload, name, title, keep, output } => {
            let mut settings = (*config).clone();
            if keep {
                settings.remove_uploaded_files = false;
            }
            let name = name.or_else(|| file_name(&upload)).unwrap_or_default();

            let mut image = MemoryImage::with_config(Arc::new(settings));
            if let Some(title) = title {
                image.set_title(title);
            }
            image.attach_upload(0, PendingUpload::new(name, &upload));
            image.on_before_write();

            if !image.exists() {
                bail!("Could not read upload {}", upload.display());
            }

            let record = serde_json::to_string_pretty(&image.record())?;
            match output {
                Some(path) => {
                    std::fs::write(&path, record)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} Stored {} as {}", "✓".green(), upload.display(), image.filename());
                }
                None => println!("{}", record),
            }
        }

        Commands::Analyze { path, json } => {
            let entries: Vec<_> = WalkDir::new(&path)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .collect();

            let pb = ProgressBar::new(entries.len() as u64);
            pb.set_style(ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
                .progress_chars("#>-"));

            let mut results = Vec::new();
            let mut embedded_bytes = 0usize;
            for entry in entries {
                pb.inc(1);
                let mut image = MemoryImage::with_config(Arc::clone(&config));
                image.copy_from_file(entry.path(), file_name(entry.path()).as_deref());

                let (Some(width), Some(height)) = (
                    image.dimensions(DimensionMode::Width),
                    image.dimensions(DimensionMode::Height),
                ) else {
                    continue;
                };

                let size = image.content().map_or(0, <[u8]>::len);
                let embedded = image.embedded_url().map_or(0, |url| url.len());
                embedded_bytes += embedded;
                results.push(serde_json::json!({
                    "path": entry.path().to_string_lossy(),
                    "format": image.determine_format(),
                    "width": width.pixels(),
                    "height": height.pixels(),
                    "size_bytes": size,
                    "embedded_bytes": embedded,
                }));
            }
            pb.finish_with_message("Done");

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                println!("\nFound {} images", results.len());
                println!("{} bytes when embedded as data URIs", embedded_bytes);
            }
        }
    }

    Ok(())
}

/// Load a path or URL into a fresh image, failing when nothing was read.
fn load(config: &Arc<ImageConfig>, source: &str) -> anyhow::Result<MemoryImage> {
    let mut image = MemoryImage::with_config(Arc::clone(config));
    image.copy_from_path(source, file_name(Path::new(source)).as_deref());
    if image.content().is_none() {
        bail!("Could not read {}", source);
    }
    Ok(image)
}

fn read_text(input: &Path) -> anyhow::Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input.display()))
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
}
