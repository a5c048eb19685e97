//! Command-line interface for the map comparison tool.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::config::CompareConfig;
use crate::core::labels::{class_histogram, split_by_dynamic};
use crate::core::loaders::{load_cloud, PointCloud};
use crate::core::writers::{write_labels_csv, write_pcd};
use crate::processors::complement::{compute_complement, evaluate_candidates, AlgorithmComplement};
use crate::publish::{DirectorySink, IntervalTicker, LogSink, PublishSink, Publisher};
use crate::visualization;

#[derive(Parser)]
#[command(name = "map-complement")]
#[command(about = "Find reference points missing from dynamic-removal static maps", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare every candidate map against the raw map and publish the complements
    Compare {
        /// Raw (reference) map
        #[arg(long)]
        raw: Option<PathBuf>,
        /// Candidate map as NAME=PATH (repeatable)
        #[arg(long = "candidate", value_parser = parse_candidate)]
        candidates: Vec<(String, PathBuf)>,
        /// Squared-distance tolerance
        #[arg(long)]
        threshold_sq: Option<f32>,
        /// Write each complement as PCD and CSV into this directory
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Render one PNG per algorithm into this directory
        #[arg(long)]
        plot_dir: Option<PathBuf>,
        /// Publish rate in Hz
        #[arg(long)]
        rate_hz: Option<f64>,
        /// Stop publishing after this many cycles
        #[arg(long)]
        max_cycles: Option<u64>,
        /// Compute and report, then exit without publishing
        #[arg(long)]
        once: bool,
    },

    /// Split a labeled cloud into static and dynamic parts
    Split {
        /// Input PCD or PLY file
        input: PathBuf,
        /// Output directory for static.pcd and dynamic.pcd
        output_dir: PathBuf,
    },

    /// Print point count and semantic class histogram
    Info {
        /// Input PCD or PLY file
        input: PathBuf,
    },

    /// Render the complement of one candidate over the reference (PNG)
    Visualize {
        /// Reference (raw) map
        reference: PathBuf,
        /// Candidate static map
        candidate: PathBuf,
        /// Output PNG file
        output: PathBuf,
        /// Maximum number of reference points to plot (subsamples if exceeded)
        #[arg(long, default_value_t = 1_000_000)]
        max_points: usize,
    },
}

fn parse_candidate(arg: &str) -> std::result::Result<(String, PathBuf), String> {
    match arg.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), PathBuf::from(path)))
        }
        _ => Err(format!("expected NAME=PATH, got '{}'", arg)),
    }
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

/// Load a cloud, naming it in the error.
fn load_named(name: &str, path: &Path) -> Result<PointCloud> {
    let cloud = load_cloud(path).with_context(|| format!("failed to load {} map", name))?;
    info!("Loaded {} map: {} points from {}", name, cloud.len(), path.display());
    Ok(cloud)
}

/// Defaults when no config file is given; a given file must load and validate.
fn load_config(path: Option<&Path>) -> Result<CompareConfig> {
    match path {
        Some(path) => {
            let config = CompareConfig::from_yaml(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(CompareConfig::default()),
    }
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let config = match load_config(cli.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    // Dispatch to subcommands
    let result = match cli.command {
        Commands::Compare {
            raw,
            candidates,
            threshold_sq,
            output_dir,
            plot_dir,
            rate_hz,
            max_cycles,
            once,
        } => {
            let mut config = config;
            if let Some(raw) = raw {
                config.inputs.raw = raw;
            }
            for (name, path) in candidates {
                config.inputs.set_candidate(&name, path);
            }
            if let Some(threshold_sq) = threshold_sq {
                config.complement.threshold_sq = threshold_sq;
                config.complement.max_distance = None;
            }
            if let Some(rate_hz) = rate_hz {
                config.publish.rate_hz = rate_hz;
            }
            if max_cycles.is_some() {
                config.publish.max_cycles = max_cycles;
            }
            cmd_compare(&config, output_dir.as_deref(), plot_dir.as_deref(), once)
        }
        Commands::Split { input, output_dir } => cmd_split(&input, &output_dir, &config),
        Commands::Info { input } => cmd_info(&input, &config),
        Commands::Visualize {
            reference,
            candidate,
            output,
            max_points,
        } => cmd_visualize(&reference, &candidate, &output, max_points, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_compare(
    config: &CompareConfig,
    output_dir: Option<&Path>,
    plot_dir: Option<&Path>,
    once: bool,
) -> Result<()> {
    config.validate()?;
    let start = Instant::now();

    // Every input must load before anything is computed or published
    let spinner = create_spinner("Loading point clouds...");
    let loaded = (|| -> Result<(PointCloud, Vec<(String, PointCloud)>)> {
        let reference = load_named("raw", &config.inputs.raw)?;
        let mut candidates = Vec::with_capacity(config.inputs.candidates.len());
        for c in &config.inputs.candidates {
            candidates.push((c.name.clone(), load_named(&c.name, &c.path)?));
        }
        Ok((reference, candidates))
    })();
    spinner.finish_and_clear();
    let (reference, candidates) = loaded?;

    let spinner = create_spinner("Computing complements...");
    let classes = config.labels.class_set();
    let results = evaluate_candidates(
        &reference,
        candidates.iter().map(|(name, cloud)| (name.as_str(), cloud)),
        &classes,
        &config.complement,
    );
    drop(candidates);
    spinner.finish_and_clear();

    if let Some(dir) = output_dir {
        export_results(dir, &results)?;
    }
    if let Some(dir) = plot_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        for (i, result) in results.iter().enumerate() {
            let path = dir.join(format!("{}_complement.png", result.name));
            visualization::plot_complement(
                &path,
                &reference,
                &result.complement,
                visualization::algorithm_color(i),
                1_000_000,
            )
            .with_context(|| format!("failed to plot {}", path.display()))?;
        }
    }

    let mut items = vec![
        ("Raw map", config.inputs.raw.display().to_string()),
        ("Reference points", reference.len().to_string()),
        (
            "Threshold (sq)",
            config.complement.effective_threshold_sq().to_string(),
        ),
    ];
    for result in &results {
        items.push((
            result.name.as_str(),
            format!(
                "{} missing, {:.2}% preserved",
                result.stats.complement_points,
                result.stats.preserved_ratio() * 100.0
            ),
        ));
    }
    items.push(("Duration", format!("{:.2?}", start.elapsed())));
    print_summary("Comparison Complete", &items);

    if once {
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to install Ctrl-C handler")?;

    let mut sinks: Vec<Box<dyn PublishSink>> = vec![Box::new(LogSink)];
    if let Some(dir) = &config.publish.output_dir {
        sinks.push(Box::new(DirectorySink::new(dir)));
    }

    let publisher = Publisher::from_results(&results).with_log_every(config.publish.log_every);
    let mut ticker = IntervalTicker::from_hz(config.publish.rate_hz);

    info!(
        "Publishing {} channels at {} Hz (Ctrl-C to stop)",
        publisher.snapshots().len(),
        config.publish.rate_hz
    );
    let cycles = publisher.run(&mut sinks, &mut ticker, &running, config.publish.max_cycles)?;
    println!("Published {} cycles", cycles);

    Ok(())
}

/// Write `<name>_complement.pcd` and `<name>_complement.csv` per algorithm.
fn export_results(dir: &Path, results: &[AlgorithmComplement]) -> Result<()> {
    for result in results {
        let pcd = dir.join(format!("{}_complement.pcd", result.name));
        let csv = dir.join(format!("{}_complement.csv", result.name));
        write_pcd(&pcd, &result.complement)?;
        write_labels_csv(&csv, &result.complement)?;
        info!("Wrote {} and {}", pcd.display(), csv.display());
    }
    Ok(())
}

fn cmd_split(input: &Path, output_dir: &Path, config: &CompareConfig) -> Result<()> {
    let start = Instant::now();

    let cloud = load_named("input", input)?;

    let spinner = create_spinner("Splitting point cloud...");
    let (static_part, dynamic_part) = split_by_dynamic(&cloud, &config.labels.class_set());
    let static_path = output_dir.join("static.pcd");
    let dynamic_path = output_dir.join("dynamic.pcd");
    let written =
        write_pcd(&static_path, &static_part).and_then(|_| write_pcd(&dynamic_path, &dynamic_part));
    spinner.finish_and_clear();
    written?;

    print_summary(
        "Split Complete",
        &[
            ("Input file", input.display().to_string()),
            ("Static points", static_part.len().to_string()),
            ("Dynamic points", dynamic_part.len().to_string()),
            ("Static output", static_path.display().to_string()),
            ("Dynamic output", dynamic_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}

fn cmd_info(input: &Path, config: &CompareConfig) -> Result<()> {
    let cloud = load_named("input", input)?;
    let classes = config.labels.class_set();

    let dynamic = cloud
        .labels
        .iter()
        .filter(|&&label| classes.is_dynamic_label(label))
        .count();

    let histogram = class_histogram(&cloud);
    let rows: Vec<(String, String)> = histogram
        .iter()
        .map(|(class, count)| {
            let kind = if classes.is_dynamic(*class) { "dynamic" } else { "static" };
            (format!("Class {}", class), format!("{} ({})", count, kind))
        })
        .collect();

    let mut items = vec![
        ("Input file", input.display().to_string()),
        ("Points", cloud.len().to_string()),
        ("Dynamic points", dynamic.to_string()),
        (
            "Dynamic classes",
            classes.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","),
        ),
        ("Classes", histogram.len().to_string()),
    ];
    items.extend(rows.iter().map(|(k, v)| (k.as_str(), v.clone())));
    print_summary("Point Cloud Info", &items);

    Ok(())
}

fn cmd_visualize(
    reference: &Path,
    candidate: &Path,
    output: &Path,
    max_points: usize,
    config: &CompareConfig,
) -> Result<()> {
    let start = Instant::now();

    let spinner = create_spinner("Loading point clouds...");
    let loaded = load_named("reference", reference).and_then(|r| Ok((r, load_named("candidate", candidate)?)));
    spinner.finish_and_clear();
    let (reference_cloud, candidate_cloud) = loaded?;

    if reference_cloud.is_empty() {
        bail!("reference map {} has no points", reference.display());
    }

    let spinner = create_spinner("Generating plot...");
    let complement = compute_complement(
        &candidate_cloud,
        &reference_cloud,
        &config.labels.class_set(),
        config.complement.effective_threshold_sq(),
    );
    let plotted = visualization::plot_complement(
        output,
        &reference_cloud,
        &complement,
        visualization::algorithm_color(0),
        max_points,
    );
    spinner.finish_and_clear();
    plotted?;

    print_summary(
        "Visualization Complete",
        &[
            ("Reference", reference.display().to_string()),
            ("Candidate", candidate.display().to_string()),
            ("Output PNG", output.display().to_string()),
            ("Reference points", reference_cloud.len().to_string()),
            ("Complement points", complement.len().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(())
}
