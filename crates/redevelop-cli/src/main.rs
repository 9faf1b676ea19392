use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use redevelop_contracts::catalog::{Catalog, CatalogEntry, TransformMode};
use redevelop_contracts::events::EventWriter;
use redevelop_contracts::receipts::{build_receipt, write_receipt, ResolvedGeneration};
use redevelop_contracts::requests::{
    GeneratedImage, GenerationRequest, GenerationResult, ReferenceImage,
};
use redevelop_engine::{EngineConfig, GenerationReport, Visualizer};
use sha2::{Digest, Sha256};

const API_KEY_ENV: &str = "POLLINATIONS_API_KEY";
const COMPARE_GAP_PX: u32 = 16;
const COMPARE_MAX_HEIGHT_PX: u32 = 1024;

#[derive(Debug, Parser)]
#[command(
    name = "redevelop-rs",
    version,
    about = "Visualize the redevelopment of a building"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate one visualization
    Generate(GenerateArgs),
    /// List styles, building types and transformation modes
    Catalog,
    /// Write a side-by-side before/after image
    Compare(CompareArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    out: PathBuf,
    /// Photo of the current building
    #[arg(long)]
    image: Option<PathBuf>,
    #[arg(long, default_value = "modern-industrieel")]
    style: String,
    #[arg(long, default_value = "warehouse")]
    building: String,
    #[arg(long, default_value = "renovation")]
    mode: String,
    #[arg(long)]
    api_key: Option<String>,
    #[arg(long)]
    seed: Option<i32>,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Also write a before/after comparison when a photo is given
    #[arg(long)]
    compare: bool,
}

#[derive(Debug, Parser)]
struct CompareArgs {
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
    #[arg(long)]
    out: PathBuf,
}

#[derive(Debug, Clone)]
struct WrittenArtifacts {
    image_path: PathBuf,
    prompt_path: PathBuf,
    receipt_path: PathBuf,
    comparison_path: Option<PathBuf>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("redevelop-rs error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::Catalog => {
            print!("{}", render_catalog(&Catalog::new()));
            Ok(0)
        }
        Command::Compare(args) => run_compare(args),
    }
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    let catalog = Catalog::new();
    let style = catalog.style(&args.style)?;
    let building_type = catalog.building_type(&args.building)?;
    let mode: TransformMode = args.mode.parse()?;
    let api_key = resolve_api_key(args.api_key.as_deref(), non_empty_env(API_KEY_ENV))?;

    let reference = match args.image.as_deref() {
        Some(path) => Some(read_reference_image(path)?),
        None => None,
    };

    let mut request = GenerationRequest::new(style.clone(), building_type.clone(), mode, api_key);
    if let Some(image) = reference.clone() {
        request = request.with_reference_image(image);
    }
    if let Some(seed) = args.seed {
        request = request.with_seed(i64::from(seed));
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("failed to create {}", args.out.display()))?;
    let events_path = args
        .events
        .clone()
        .unwrap_or_else(|| args.out.join("events.jsonl"));
    let session_id = args
        .out
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("session-rs")
        .to_string();

    let config = EngineConfig::from_env()?;
    let visualizer =
        Visualizer::new(config)?.with_events(EventWriter::new(&events_path, session_id));

    println!(
        "Generating: {} (10-30 sec)",
        summary_line(&building_type, &style, mode)
    );
    let report = visualizer.generate(&request)?;

    if let Some(message) = report.result.error_message() {
        eprintln!("Generation failed: {message}");
        return Ok(1);
    }

    let comparison_source = if args.compare {
        reference.as_ref()
    } else {
        None
    };
    let written = write_artifacts(
        &args.out,
        &request,
        &report,
        visualizer.config(),
        comparison_source,
    )?;

    if let GenerationResult::Success { prompt, model, .. } = &report.result {
        println!("{}", summary_line(&building_type, &style, mode));
        println!("Model: {model}");
        println!("Prompt used:\n{prompt}");
    }
    println!("Image: {}", written.image_path.display());
    println!("Prompt: {}", written.prompt_path.display());
    println!("Receipt: {}", written.receipt_path.display());
    if let Some(path) = written.comparison_path.as_ref() {
        println!("Comparison: {}", path.display());
    }
    Ok(0)
}

fn run_compare(args: CompareArgs) -> Result<i32> {
    let before = open_image(&args.before)?;
    let after = open_image(&args.after)?;
    save_comparison(&args.out, &before, &after)?;
    println!("Comparison written to {}", args.out.display());
    Ok(0)
}

fn write_artifacts(
    out_dir: &Path,
    request: &GenerationRequest,
    report: &GenerationReport,
    config: &EngineConfig,
    comparison_source: Option<&ReferenceImage>,
) -> Result<WrittenArtifacts> {
    let GenerationResult::Success {
        image,
        prompt,
        model,
        seed,
        reference_url,
    } = &report.result
    else {
        bail!("no generated image to write");
    };

    let artifact_id = short_id(&image.bytes);
    let ext = output_extension(image);
    let image_path = out_dir.join(format!("visualization-{artifact_id}.{ext}"));
    let prompt_path = out_dir.join(format!("prompt-{artifact_id}.txt"));
    let receipt_path = out_dir.join(format!("receipt-{artifact_id}.json"));

    fs::write(&image_path, &image.bytes)
        .with_context(|| format!("failed to write {}", image_path.display()))?;
    fs::write(&prompt_path, prompt)
        .with_context(|| format!("failed to write {}", prompt_path.display()))?;

    let mut summary = request.summary();
    summary.seed = Some(*seed);
    let resolved = ResolvedGeneration {
        prompt: prompt.clone(),
        model: model.clone(),
        seed: *seed,
        reference_url: reference_url.clone(),
        width: config.width,
        height: config.height,
        content_type: image.content_type.clone(),
    };
    let receipt = build_receipt(
        &summary,
        &resolved,
        &report.attempts,
        &image_path,
        &prompt_path,
    );
    write_receipt(&receipt_path, &receipt)?;

    let comparison_path = match comparison_source {
        Some(reference) => {
            let path = out_dir.join(format!("comparison-{artifact_id}.png"));
            let before = image::load_from_memory(&reference.bytes)
                .context("failed to decode reference image")?;
            let after = image::load_from_memory(&image.bytes)
                .context("failed to decode generated image")?;
            save_comparison(&path, &before, &after)?;
            Some(path)
        }
        None => None,
    };

    Ok(WrittenArtifacts {
        image_path,
        prompt_path,
        receipt_path,
        comparison_path,
    })
}

fn resolve_api_key(flag: Option<&str>, env_value: Option<String>) -> Result<String> {
    if let Some(key) = flag.map(str::trim).filter(|value| !value.is_empty()) {
        return Ok(key.to_string());
    }
    match env_value {
        Some(key) => Ok(key),
        None => bail!("no API key: pass --api-key or set {API_KEY_ENV}"),
    }
}

fn read_reference_image(path: &Path) -> Result<ReferenceImage> {
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    if bytes.is_empty() {
        bail!("reference image is empty ({})", path.display());
    }
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("reference.jpg")
        .to_string();
    Ok(ReferenceImage::new(file_name, bytes))
}

fn summary_line(
    building_type: &impl CatalogEntry,
    style: &impl CatalogEntry,
    mode: TransformMode,
) -> String {
    format!(
        "{} -> {} ({})",
        building_type.name(),
        style.name(),
        mode.label()
    )
}

fn render_catalog(catalog: &Catalog) -> String {
    let mut out = String::new();
    out.push_str("Styles:\n");
    for style in catalog.styles.list() {
        out.push_str(&format!("  {:<20} {}\n", style.id, style.name));
    }
    out.push_str("Building types:\n");
    for building in catalog.building_types.list() {
        out.push_str(&format!("  {:<20} {}\n", building.id, building.name));
    }
    out.push_str("Modes:\n");
    for mode in TransformMode::ALL {
        out.push_str(&format!(
            "  {:<20} {} ({})\n",
            mode.as_str(),
            mode.label(),
            mode.description()
        ));
    }
    out
}

fn output_extension(image: &GeneratedImage) -> &'static str {
    if let Some(mime) = image.content_type.as_deref() {
        let lowered = mime.to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            return "jpg";
        }
        if lowered.contains("webp") {
            return "webp";
        }
        if lowered.contains("png") {
            return "png";
        }
    }
    image::guess_format(&image.bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
        .unwrap_or("bin")
}

fn open_image(path: &Path) -> Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to read image ({})", path.display()))
}

fn save_comparison(path: &Path, before: &DynamicImage, after: &DynamicImage) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    compose_comparison(before, after)
        .save(path)
        .with_context(|| format!("failed to save {}", path.display()))?;
    Ok(())
}

/// Before on the left, after on the right, both scaled to a shared height.
fn compose_comparison(before: &DynamicImage, after: &DynamicImage) -> RgbaImage {
    let height = before
        .height()
        .min(after.height())
        .clamp(1, COMPARE_MAX_HEIGHT_PX);
    let left = scale_to_height(before, height);
    let right = scale_to_height(after, height);
    let width = left.width() + COMPARE_GAP_PX + right.width();

    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    image::imageops::overlay(&mut canvas, &left, 0, 0);
    image::imageops::overlay(
        &mut canvas,
        &right,
        (left.width() + COMPARE_GAP_PX) as i64,
        0,
    );
    canvas
}

fn scale_to_height(source: &DynamicImage, height: u32) -> RgbaImage {
    let ratio = height as f64 / source.height().max(1) as f64;
    let width = ((source.width() as f64) * ratio).round().max(1.0) as u32;
    source
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgba8()
}

fn short_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(&digest[..6])
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
