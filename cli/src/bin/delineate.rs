use clap::{Parser, Subcommand};
use cli::ExtractJob;
use color_eyre::eyre::Result;
use image::{GrayImage, Luma};
use regions::{io as region_io, RegionAlgebra, RegionStore};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract regions from a binary mask image into a GeoJSON file
    Extract {
        /// Path to the mask image (PNG or TIFF)
        #[arg(short, long)]
        mask: PathBuf,
        /// Path of the GeoJSON file to write
        #[arg(short, long)]
        output: PathBuf,
        /// Discard components smaller than this many pixels
        #[arg(long, default_value = "4")]
        min_area: u32,
        /// Class assigned to every extracted region
        #[arg(long, default_value = "")]
        class_name: String,
        /// Douglas-Peucker tolerance for display output (exact when omitted)
        #[arg(long)]
        simplify: Option<f32>,
        /// Offset of the mask within the orthophoto, x
        #[arg(long, default_value = "0")]
        origin_x: i32,
        /// Offset of the mask within the orthophoto, y
        #[arg(long, default_value = "0")]
        origin_y: i32,
    },
    /// Run an extraction job described by a TOML or JSON config file
    Job {
        /// Path to the configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Summarize a GeoJSON file produced by extract
    Info {
        /// Path to the GeoJSON file
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Extract {
            mask,
            output,
            min_area,
            class_name,
            simplify,
            origin_x,
            origin_y,
        } => {
            let job = ExtractJob {
                mask_path: mask.display().to_string(),
                output_path: output.display().to_string(),
                min_area: *min_area,
                class_name: class_name.clone(),
                simplify_tolerance: *simplify,
                origin: (*origin_x, *origin_y),
            };
            run_job(&job)?;
        }
        Commands::Job { config } => {
            let job = ExtractJob::from_file(config)?;
            run_job(&job)?;
        }
        Commands::Info { input } => {
            run_info(input)?;
        }
    }

    Ok(())
}

fn run_job(job: &ExtractJob) -> Result<()> {
    info!(mask = %job.mask_path, "loading mask");
    let mask = load_binary_mask(&job.mask_path)?;

    let algebra = RegionAlgebra::new();
    let mut store = RegionStore::new();

    let found = algebra.from_mask(&mask, job.origin, job.min_area)?;
    info!(count = found.len(), min_area = job.min_area, "regions extracted");

    let ids = store.add_all(found)?;
    if !job.class_name.is_empty() {
        for id in &ids {
            store.set_class_name(*id, job.class_name.as_str())?;
        }
    }

    let text = match job.simplify_tolerance {
        Some(tolerance) => serde_json::to_string_pretty(
            &region_io::store_to_geojson_simplified(&store, tolerance),
        )?,
        None => region_io::store_to_geojson_string(&store)?,
    };
    std::fs::write(&job.output_path, text)?;
    info!(path = %job.output_path, regions = ids.len(), "GeoJSON written");
    Ok(())
}

fn run_info(input: &Path) -> Result<()> {
    let text = std::fs::read_to_string(input)?;
    let regions = region_io::regions_from_geojson_string(&text)?;

    println!("{} regions", regions.len());
    for region in &regions {
        let label = if region.class_name.is_empty() {
            "(unlabeled)"
        } else {
            &region.class_name
        };
        println!(
            "  #{:<5} {:<16} area {:>10.0} px   perimeter {:>8.1}",
            region.id, label, region.area, region.perimeter
        );
    }
    let total: f64 = regions.iter().map(|r| r.area).sum();
    println!("total area: {total:.0} px");
    Ok(())
}

/// Load an image and normalize it to a strict 0/255 mask; the engine
/// rejects anything in between.
fn load_binary_mask(path: &str) -> Result<GrayImage> {
    let img = image::open(path)?.to_luma8();
    let mut mask = GrayImage::new(img.width(), img.height());
    for (out, p) in mask.pixels_mut().zip(img.pixels()) {
        *out = if p.0[0] > 127 { Luma([255u8]) } else { Luma([0u8]) };
    }
    Ok(mask)
}
