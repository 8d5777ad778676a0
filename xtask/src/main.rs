use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use medvol_core::{AdapterConfig, Direction, Volume};
use medvol_io::codec_for_path;
use ndarray::{ArrayD, IxDyn};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Developer tasks for medvol")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the index-to-physical affine of one or more images
    PrintAffine {
        /// Image files to inspect
        paths: Vec<PathBuf>,

        /// Also print the affine of a zero-filled volume with this shape
        #[arg(long, value_delimiter = ',')]
        zeros: Option<Vec<usize>>,
    },

    /// Save an image to a temporary file, reload it and compare geometry
    CheckRoundtrip {
        /// Image to round-trip
        path: PathBuf,

        /// Keep the temporary file
        #[arg(short, long)]
        keep: bool,

        /// Fail on 4D volumes instead of dropping the fourth geometric axis
        #[arg(long)]
        reject_4d: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::PrintAffine { paths, zeros } => {
            print_affines(&paths, zeros.as_deref())?;
        }
        Commands::CheckRoundtrip {
            path,
            keep,
            reject_4d,
        } => {
            let config = if reject_4d {
                AdapterConfig::new().rejecting_four_d()
            } else {
                AdapterConfig::default()
            };
            check_roundtrip(&path, keep, &config)?;
        }
    }

    Ok(())
}

fn print_affines(paths: &[PathBuf], zeros: Option<&[usize]>) -> Result<()> {
    for path in paths {
        let codec = codec_for_path(path)?;
        let volume = Volume::load(path, codec.as_ref())
            .with_context(|| format!("Failed to load {}", path.display()))?;
        println!("{} {:?}", path.display(), volume.shape());
        println!("{}", volume.affine()?);
    }

    if let Some(shape) = zeros {
        let volume = Volume::from_array(ArrayD::zeros(IxDyn(shape)))?;
        println!("zeros {:?}", shape);
        println!("{}", volume.affine()?);
    }
    Ok(())
}

fn check_roundtrip(path: &Path, keep: bool, config: &AdapterConfig) -> Result<()> {
    let codec = codec_for_path(path)?;
    let original = Volume::load(path, codec.as_ref())
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!("Loaded {} with shape {:?}", path.display(), original.shape());

    let tmp_path = roundtrip_path(path);
    original
        .save(&tmp_path, codec.as_ref(), config)
        .with_context(|| format!("Failed to save {}", tmp_path.display()))?;
    let reloaded = Volume::load(&tmp_path, codec.as_ref())
        .with_context(|| format!("Failed to reload {}", tmp_path.display()))?;

    let expected = if original.ndims() > codec.max_geometry_ndims() {
        warn!("format stores 3D geometry only; expecting a synthesized fourth axis");
        with_synthesized_fourth_axis(&original)?
    } else {
        original
    };

    let mut mismatches = Vec::new();
    if expected.spacing() != reloaded.spacing() {
        mismatches.push("spacing");
    }
    if expected.origin() != reloaded.origin() {
        mismatches.push("origin");
    }
    if expected.direction() != reloaded.direction() {
        mismatches.push("direction");
    }
    if expected.affine()? != reloaded.affine()? {
        mismatches.push("affine");
    }
    if expected.array() != reloaded.array() {
        mismatches.push("voxels");
    }

    if keep {
        info!("Kept {}", tmp_path.display());
    } else {
        std::fs::remove_file(&tmp_path)?;
    }

    if !mismatches.is_empty() {
        anyhow::bail!("Round trip changed: {}", mismatches.join(", "));
    }
    println!("All checks passed.");
    Ok(())
}

/// Geometry a 4D volume has after a save/load cycle through a 3D-only format.
fn with_synthesized_fourth_axis(volume: &Volume) -> Result<Volume> {
    let mut spacing = volume.spacing().context("spacing is not set")?.to_vec();
    let mut origin = volume.origin().context("origin is not set")?.to_vec();
    let mut direction = volume.direction().context("direction is not set")?.inner().clone();
    spacing[3] = 1.0;
    origin[3] = 0.0;
    direction.row_mut(3).fill(0.0);
    direction.column_mut(3).fill(0.0);
    direction[(3, 3)] = 1.0;

    Ok(volume
        .with_spacing(spacing)?
        .with_origin(origin)?
        .with_direction(Direction(direction))?)
}

/// `<stem>_tmp.<ext>` next to `path`, keeping its format.
fn roundtrip_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image.nii.gz");
    let lower = name.to_ascii_lowercase();
    let ext = [".nii.gz", ".nii", ".nrrd"]
        .into_iter()
        .find(|ext| lower.ends_with(ext))
        .unwrap_or(".nii.gz");
    let stem = if lower.ends_with(ext) {
        &name[..name.len() - ext.len()]
    } else {
        name
    };
    path.with_file_name(format!("{}_tmp{}", stem, ext))
}
