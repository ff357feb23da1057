use catalog_images::compress::Compressor;
use catalog_images::config;
use catalog_images::imaging::{OutputFormat, Quality, RustBackend};
use catalog_images::inputs::{collect_image_paths, load_inputs};
use catalog_images::output::{self, CheckedInput};
use catalog_images::pipeline::{BatchStageProgressFn, ImagePipeline, Stage};
use catalog_images::preview::PreviewRegistry;
use catalog_images::types::{CompressionOptions, RawImageInput};
use catalog_images::upload::UploadClient;
use catalog_images::validate::validate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "catalog-images")]
#[command(about = "Prepare and upload product photos for the furniture catalog")]
#[command(long_about = "\
Prepare and upload product photos for the furniture catalog

Each image is validated (JPEG, PNG, WebP or GIF, at most 10MB by default),
scaled down to fit a bounding box without changing its aspect ratio,
re-encoded (WebP by default), given a unique name, and uploaded to the
storage gateway, which answers with the public URL.

Directories are searched recursively for supported images.

Run 'catalog-images gen-config' to generate a documented config.toml.
Set RUST_LOG=debug for detailed logs. Ctrl-C cancels in-flight work.")]
#[command(version)]
struct Cli {
    /// Configuration file (missing file = stock defaults)
    #[arg(long, default_value = "config.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the `[compression]` config table.
#[derive(Args, Clone, Default)]
struct CompressionArgs {
    /// Bounding box width in pixels
    #[arg(long)]
    max_width: Option<u32>,
    /// Bounding box height in pixels
    #[arg(long)]
    max_height: Option<u32>,
    /// Lossy quality in (0, 1]
    #[arg(long)]
    quality: Option<f32>,
    /// Output format: webp, jpeg or png
    #[arg(long)]
    format: Option<OutputFormat>,
}

impl CompressionArgs {
    fn apply(&self, base: CompressionOptions) -> CompressionOptions {
        CompressionOptions {
            max_width: self.max_width.unwrap_or(base.max_width),
            max_height: self.max_height.unwrap_or(base.max_height),
            quality: self.quality.map(Quality::new).unwrap_or(base.quality),
            output_format: self.format.unwrap_or(base.output_format),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Validate images without processing them
    Check {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Resize and re-encode images into a local directory
    Compress {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Where compressed files are written
        #[arg(long, default_value = "compressed")]
        out_dir: PathBuf,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Compress images and upload them to the storage gateway
    Upload {
        /// Image files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        #[command(flatten)]
        compression: CompressionArgs,
    },
    /// Delete stored images by public URL
    Delete {
        /// Public URLs of the images
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let mut config = config::load_config(&cli.config)?;
    let cancel = cancel_on_ctrl_c();

    let failure = match cli.command {
        Command::Check { paths } => {
            let loaded = load_inputs(&collect_image_paths(&paths));
            let inputs = readable(loaded)?;
            let reports: Vec<_> = inputs
                .iter()
                .map(|i| validate(i, config.validation.max_size_mb))
                .collect();
            let checked: Vec<CheckedInput<'_>> = inputs
                .iter()
                .zip(&reports)
                .map(|(input, report)| CheckedInput {
                    name: &input.name,
                    len: input.len(),
                    report,
                })
                .collect();
            output::print_check_output(&checked);
            let failed = reports.iter().filter(|r| !r.is_valid()).count();
            output::failure_summary(failed, reports.len(), "validation")
        }
        Command::Compress {
            paths,
            out_dir,
            compression,
        } => {
            config.compression = compression.apply(config.compression);
            config.validate()?;
            let inputs = readable(load_inputs(&collect_image_paths(&paths)))?;
            std::fs::create_dir_all(&out_dir)?;

            let compressor = Compressor::new(RustBackend::new())
                .with_defaults(config.compression)
                .with_max_size_mb(config.validation.max_size_mb);
            let total = inputs.len();
            let items = compressor
                .compress_multiple(
                    &inputs,
                    None,
                    |done, total| eprint!("\rCompressing {done}/{total}"),
                    Some(&cancel),
                )
                .await;
            if total > 0 {
                eprintln!();
            }

            let namer = config.namer();
            let mut succeeded = 0;
            for item in &items {
                let written = match &item.result {
                    Ok(image) => {
                        let name = namer
                            .name_with_extension(&item.original_name, image.format.extension())
                            .filename();
                        let path = out_dir.join(name);
                        std::fs::write(&path, &image.bytes)?;
                        succeeded += 1;
                        Some(path)
                    }
                    Err(_) => None,
                };
                output::print_compress_item(item, written.as_deref());
            }
            println!("{}", output::format_compress_summary(succeeded, total));
            output::failure_summary(total - succeeded, total, "to compress")
        }
        Command::Upload {
            paths,
            json,
            compression,
        } => {
            config.compression = compression.apply(config.compression);
            config.validate()?;
            config.storage.check()?;
            let inputs = readable(load_inputs(&collect_image_paths(&paths)))?;

            let client = UploadClient::new(&config.storage)?;
            let pipeline = ImagePipeline::new(RustBackend::new(), &config, PreviewRegistry::new());
            let progress: BatchStageProgressFn =
                Arc::new(|item: usize, total: usize, pct: f64, stage: Stage| {
                    eprint!("\r[{item}/{total}] {stage} {pct:>3.0}%   ");
                });
            let items = pipeline
                .prepare_and_upload_multiple(&inputs, &client, Some(progress), Some(&cancel))
                .await;
            if !inputs.is_empty() {
                eprintln!();
            }

            if json {
                println!("{}", output::format_upload_json(&items)?);
            } else {
                output::print_upload_output(&items);
            }
            let failed = items.iter().filter(|i| i.result.is_err()).count();
            output::failure_summary(failed, items.len(), "to upload")
        }
        Command::Delete { urls } => {
            config.storage.check()?;
            let client = UploadClient::new(&config.storage)?;
            let items = client.delete_multiple(&urls, Some(&cancel)).await;
            output::print_delete_output(&items);
            let failed = items.iter().filter(|i| i.result.is_err()).count();
            output::failure_summary(failed, items.len(), "to delete")
        }
        Command::GenConfig => None,
    };

    match failure {
        Some(message) => Err(message.into()),
        None => Ok(()),
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling...");
            trigger.cancel();
        }
    });
    token
}

/// Unwrap loaded inputs, failing on the first unreadable file.
fn readable(
    loaded: Vec<(PathBuf, std::io::Result<RawImageInput>)>,
) -> Result<Vec<RawImageInput>, Box<dyn std::error::Error>> {
    loaded
        .into_iter()
        .map(|(path, result)| result.map_err(|e| format!("{}: {e}", path.display()).into()))
        .collect()
}
