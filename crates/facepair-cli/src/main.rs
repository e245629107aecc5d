mod config;
mod metadata;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use facepair_core::{
    extract_face_with, load_image, load_subjects, BoundingBox, FaceDetector, FaceSelector,
    FirstFace, FullFrameDetector, LargestFace, Network, Pipeline, PipelineOutput, Predictor,
};
use image::GrayImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "facepair", about = "Face-pair similarity inference CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the face in an image against every reference subject
    Predict {
        /// Probe image
        image: PathBuf,
        /// Reference subjects directory (overrides FACEPAIR_SUBJECTS_DIR)
        #[arg(long)]
        subjects: Option<PathBuf>,
        #[command(flatten)]
        face: FaceArgs,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Fail instead of predicting with randomly initialized layers
        #[arg(long)]
        require_pretrained: bool,
    },
    /// Save the face in an image as a new reference subject
    Capture {
        /// Source image
        image: PathBuf,
        /// Subject name; used as the file stem
        #[arg(short, long)]
        name: String,
        /// Reference subjects directory (overrides FACEPAIR_SUBJECTS_DIR)
        #[arg(long)]
        subjects: Option<PathBuf>,
        #[command(flatten)]
        face: FaceArgs,
    },
    /// Write a CSV inventory of the images in a directory
    Metadata {
        dir: PathBuf,
        #[arg(short, long, default_value = "image_metadata.csv")]
        output: PathBuf,
    },
    /// Write a randomly initialized model to the model directory
    InitModel {
        /// Overwrite existing parameter files
        #[arg(long)]
        force: bool,
    },
}

/// Face location options shared by commands that extract a patch.
#[derive(clap::Args)]
struct FaceArgs {
    /// Face region as x,y,width,height; the whole image is used when omitted
    #[arg(long, value_parser = parse_region)]
    region: Option<BoundingBox>,
    /// Pick the largest face instead of the first one
    #[arg(long)]
    largest: bool,
}

impl FaceArgs {
    fn detector(&self) -> Box<dyn FaceDetector> {
        match self.region {
            Some(region) => Box::new(RegionDetector(region)),
            None => Box::new(FullFrameDetector),
        }
    }

    fn selector(&self) -> Box<dyn FaceSelector> {
        if self.largest {
            Box::new(LargestFace)
        } else {
            Box::new(FirstFace)
        }
    }
}

/// Reports one caller-supplied region for every frame.
struct RegionDetector(BoundingBox);

impl FaceDetector for RegionDetector {
    fn detect(&mut self, _frame: &GrayImage) -> Vec<BoundingBox> {
        vec![self.0]
    }
}

fn parse_region(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,width,height, got {s:?}"));
    };
    let x = x.parse().map_err(|e| format!("x: {e}"))?;
    let y = y.parse().map_err(|e| format!("y: {e}"))?;
    let w = w.parse().map_err(|e| format!("width: {e}"))?;
    let h = h.parse().map_err(|e| format!("height: {e}"))?;
    Ok(BoundingBox::new(x, y, w, h))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Predict {
            image,
            subjects,
            face,
            json,
            require_pretrained,
        } => {
            let subjects_dir = subjects.unwrap_or_else(|| config.subjects_dir.clone());
            let output = predict(&config, &image, &subjects_dir, &face, require_pretrained)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                print_predictions(&output);
            }
        }
        Commands::Capture {
            image,
            name,
            subjects,
            face,
        } => {
            let subjects_dir = subjects.unwrap_or_else(|| config.subjects_dir.clone());
            let path = capture(&image, &name, &subjects_dir, &face)?;
            println!("Saved subject '{name}' to {}", path.display());
        }
        Commands::Metadata { dir, output } => {
            let records = metadata::scan(&dir)?;
            metadata::write_csv(&records, &output)?;
            println!("Wrote {} records to {}", records.len(), output.display());
        }
        Commands::InitModel { force } => {
            let store = config.weight_store();
            if !force && store.weights_path(1).exists() {
                bail!(
                    "model '{}' already exists in {} (use --force to overwrite)",
                    store.model_name(),
                    store.dir().display()
                );
            }
            let mut rng = StdRng::seed_from_u64(config.seed);
            Network::random(&config.network, &mut rng)?.save(&store)?;
            println!(
                "Initialized model '{}' in {}",
                store.model_name(),
                store.dir().display()
            );
        }
    }

    Ok(())
}

fn predict(
    config: &Config,
    image: &Path,
    subjects_dir: &Path,
    face: &FaceArgs,
    require_pretrained: bool,
) -> Result<PipelineOutput> {
    let store = config.weight_store();
    let mut rng = StdRng::seed_from_u64(config.seed);
    let network = Network::load_or_random(&config.network, &store, &mut rng)?;
    if require_pretrained {
        network.require_pretrained()?;
    }

    let subjects = load_subjects(subjects_dir)?;
    let probe = load_image(image)?;

    let predictor = Predictor::new(network, config.labels.clone());
    let mut pipeline = Pipeline::new(face.detector(), predictor).with_selector(face.selector());
    let output = pipeline
        .run(&probe, &subjects)
        .with_context(|| format!("evaluating {}", image.display()))?;
    Ok(output)
}

fn print_predictions(output: &PipelineOutput) {
    if output.degraded {
        println!("WARNING: model parameters missing, predictions use random weights");
    }
    for entry in &output.predictions {
        let p = &entry.prediction;
        let label = p.label.as_deref().unwrap_or("?");
        let scores: Vec<String> = p.scores.iter().map(|s| format!("{s:.4}")).collect();
        println!(
            "{}: class {} ({label}) [{}]",
            entry.subject,
            p.class_index,
            scores.join(", ")
        );
    }
}

fn capture(image: &Path, name: &str, subjects_dir: &Path, face: &FaceArgs) -> Result<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) {
        bail!("invalid subject name {name:?}");
    }
    let frame = load_image(image)?;
    let patch = extract_face_with(&frame, &mut face.detector(), &face.selector())?;

    std::fs::create_dir_all(subjects_dir)
        .with_context(|| format!("creating {}", subjects_dir.display()))?;
    let path = subjects_dir.join(format!("{name}.png"));
    patch
        .to_gray_image()
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    tracing::info!(subject = name, path = %path.display(), "subject captured");
    Ok(path)
}
