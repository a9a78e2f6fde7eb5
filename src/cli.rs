// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands standing in for the preview UI
//!
//! This module provides command-line functionality for:
//! - Listing available filters
//! - Rendering one image through the pipeline
//! - Streaming an image through the pipeline as a synthetic camera

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use stylecam::backends::analysis::FixedAnalysisService;
use stylecam::backends::assets::{AssetStore, DirectoryAssetStore, EmbeddedAssetStore};
use stylecam::backends::source::{SyntheticCamera, SyntheticCameraOptions, fit_to_resolution};
use stylecam::constants::{StreamResolution, file_formats, timing};
use stylecam::media::{SyntheticLayout, encode_rgba};
use stylecam::{
    AppError, AppResult, Config, FilterAssetCache, FilterCatalog, FilterDefinition, Pipeline,
    PipelineStats,
};

/// Default folder name for saved looks
const DEFAULT_SAVE_FOLDER: &str = "Stylecam";

/// How long `render` waits for the pipeline to publish a frame
const RENDER_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RenderArgs {
    pub input: PathBuf,
    pub filter: Option<String>,
    pub output: Option<PathBuf>,
    pub format: String,
    pub assets: Option<PathBuf>,
}

pub struct StreamArgs {
    pub input: PathBuf,
    pub filter: Option<String>,
    pub fps: u32,
    pub duration: u64,
    pub resolution: String,
    pub assets: Option<PathBuf>,
}

/// List all available filters
pub fn list_filters(assets: Option<PathBuf>) -> AppResult<()> {
    let config = Config::load();
    let store = open_store(assets.as_deref(), &config);
    let catalog = FilterCatalog::discover(store.as_ref())?;

    if catalog.is_empty() {
        println!("No filters found.");
        return Ok(());
    }

    println!("Available filters:");
    println!();
    for filter in catalog.iter() {
        println!("  {:<16} {}", filter.id, filter.name);
        println!(
            "      Category: {}, layers: {}",
            filter.category.display_name(),
            filter.layers.len()
        );
    }
    println!();

    Ok(())
}

/// Run a single image through one pipeline cycle and save the result
pub fn render(args: RenderArgs) -> AppResult<()> {
    let mut config = Config::load();
    // Captures are never mirrored
    config.mirror_preview = false;

    let layout = SyntheticLayout::from_name(&args.format)
        .ok_or_else(|| format!("Unknown frame format: {}", args.format))?;
    let image = load_image(&args.input)?;
    let (width, height) = image.dimensions();
    println!("Input: {}x{} ({})", width, height, args.input.display());

    let store = open_store(args.assets.as_deref(), &config);
    let filter = resolve_filter(store.as_ref(), args.filter.as_deref(), &config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let cache = Arc::new(FilterAssetCache::new(store, config.cache_budget_bytes));
    let pipeline = Pipeline::new(config, Arc::new(FixedAnalysisService::portrait()), cache);
    pipeline.select_filter(filter);
    pipeline.start()?;

    let raw = encode_rgba(width, height, image.as_raw(), layout, 0);
    let mut frames = pipeline.subscribe_frames();
    pipeline.submit_frame(raw);

    let frame = runtime.block_on(async {
        tokio::time::timeout(RENDER_TIMEOUT, frames.wait_for(|frame| frame.is_some()))
            .await
            .map_err(|_| "Timed out waiting for the pipeline".to_string())?
            .map_err(|e| e.to_string())
            .map(|frame| frame.clone())
    })?;
    runtime.block_on(pipeline.stop_and_wait())?;

    let frame = frame.ok_or("Pipeline published no frame")?;
    let output = frame.to_image().ok_or("Published frame has no image data")?;

    if let Some(result) = pipeline.latest_result() {
        println!(
            "Analysis: confidence {:.2}, {} landmarks, mask: {}",
            result.confidence,
            result.landmarks.len(),
            if result.mask.is_some() { "yes" } else { "no" }
        );
    }
    let stats = pipeline.stats();
    if stats.composition_failures > 0 {
        println!("Filter could not be applied, saved the unfiltered frame");
    }

    let output_path = resolve_output_path(args.output)?;
    output.save(&output_path)?;
    println!("Saved: {}", output_path.display());

    Ok(())
}

/// Feed an image into the pipeline at a fixed rate until the duration
/// elapses or Ctrl+C is pressed
pub fn stream(args: StreamArgs) -> AppResult<()> {
    let config = Config::load();
    let resolution = StreamResolution::from_name(&args.resolution)
        .ok_or_else(|| format!("Unknown resolution: {}", args.resolution))?;
    let fps = args.fps.clamp(1, timing::MAX_STREAM_FPS);

    let image = fit_to_resolution(&load_image(&args.input)?, resolution);
    let store = open_store(args.assets.as_deref(), &config);
    let filter = resolve_filter(store.as_ref(), args.filter.as_deref(), &config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let cache = Arc::new(FilterAssetCache::new(store, config.cache_budget_bytes));
    let pipeline = Pipeline::new(config, Arc::new(FixedAnalysisService::portrait()), cache);
    pipeline.select_filter(filter);
    pipeline.start()?;

    let mut camera = SyntheticCamera::start(
        &image,
        SyntheticCameraOptions {
            fps,
            ..Default::default()
        },
        pipeline.frame_sink(),
    )?;

    println!(
        "Streaming {}x{} @ {}fps ({})",
        image.width(),
        image.height(),
        fps,
        resolution.display_name()
    );
    println!("Press Ctrl+C to stop early");

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|e| AppError::Other(format!("Failed to set Ctrl+C handler: {}", e)))?;

    let start = Instant::now();
    let target_duration = Duration::from_secs(args.duration);

    while start.elapsed() < target_duration {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        if let Some(reason) = pipeline.state().failure() {
            println!();
            println!("Pipeline failed: {}", reason);
            break;
        }

        let stats = pipeline.stats();
        print!(
            "\rPublished: {:>6}  dropped: {:>6}",
            stats.frames_published, stats.frames_replaced
        );
        std::io::Write::flush(&mut std::io::stdout())?;

        std::thread::sleep(Duration::from_millis(100));
    }
    println!();

    camera.stop();
    runtime.block_on(pipeline.stop_and_wait()).or_else(|e| {
        // Already failed; nothing left to stop
        if pipeline.state().failure().is_some() {
            Ok(())
        } else {
            Err(e)
        }
    })?;

    print_stats(&pipeline.stats(), camera.frames_sent(), start.elapsed());
    let cache = pipeline.cache_stats();
    println!(
        "Filter cache: {} hits, {} misses, {} decodes, {} KiB resident",
        cache.hits,
        cache.misses,
        cache.decodes,
        cache.resident_bytes / 1024
    );

    Ok(())
}

/// Print the effective configuration
pub fn show_config(init: bool) -> AppResult<()> {
    let path = Config::default_path();

    if init {
        match &path {
            Some(p) if p.exists() => println!("Config already exists: {}", p.display()),
            _ => {
                let written = Config::default().save()?;
                println!("Wrote default config: {}", written.display());
            }
        }
    }

    let config = Config::load();
    match &path {
        Some(p) => println!("Config file: {}", p.display()),
        None => println!("Config file: (none on this platform)"),
    }
    let json = serde_json::to_string_pretty(&config)
        .map_err(|e| AppError::Config(format!("serialize: {}", e)))?;
    println!("{}", json);

    Ok(())
}

fn print_stats(stats: &PipelineStats, sent: u64, elapsed: Duration) {
    let secs = elapsed.as_secs_f64().max(f64::EPSILON);
    println!("Frames sent:       {}", sent);
    println!("Frames accepted:   {}", stats.frames_accepted);
    println!("Frames replaced:   {}", stats.frames_replaced);
    println!(
        "Frames published:  {} ({:.1} fps)",
        stats.frames_published,
        stats.frames_published as f64 / secs
    );
    println!("Over budget:       {}", stats.over_budget_frames);
    println!(
        "Failures:          conversion {}, analysis {}, composition {}",
        stats.conversion_failures, stats.analysis_failures, stats.composition_failures
    );
    if let Some(session) = stats.session_id {
        println!("Session:           {}", session);
    }
}

/// Filter directory from the command line, then the config, else built-ins
fn open_store(assets: Option<&Path>, config: &Config) -> Arc<dyn AssetStore> {
    match assets.or(config.assets_dir.as_deref()) {
        Some(dir) => Arc::new(DirectoryAssetStore::new(dir)),
        None => Arc::new(EmbeddedAssetStore::new()),
    }
}

fn resolve_filter(
    store: &dyn AssetStore,
    requested: Option<&str>,
    config: &Config,
) -> AppResult<Option<FilterDefinition>> {
    let Some(id) = requested.or(config.default_filter.as_deref()) else {
        return Ok(None);
    };

    let catalog = FilterCatalog::discover(store)?;
    let filter = catalog.get(id).cloned().ok_or_else(|| {
        let known: Vec<&str> = catalog.ids().collect();
        format!("Unknown filter '{}' (available: {})", id, known.join(", "))
    })?;
    println!("Filter: {} ({})", filter.name, filter.category.display_name());
    Ok(Some(filter))
}

fn load_image(path: &Path) -> AppResult<image::RgbaImage> {
    let supported = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(file_formats::is_image_extension);
    if !supported {
        return Err(AppError::Image(format!(
            "Unsupported image file: {}",
            path.display()
        )));
    }
    Ok(image::open(path)?.to_rgba8())
}

/// Explicit output path, or a timestamped file in the pictures directory
fn resolve_output_path(output: Option<PathBuf>) -> AppResult<PathBuf> {
    let path = match output {
        Some(path) if path.is_dir() => path.join(default_file_name()),
        Some(path) => path,
        None => get_default_save_dir().join(default_file_name()),
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(path)
}

fn default_file_name() -> String {
    format!("look_{}.png", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Get default save directory
fn get_default_save_dir() -> PathBuf {
    dirs::picture_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join(DEFAULT_SAVE_FOLDER)
}
