extern crate clap;
extern crate indicatif;

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use humansize::{format_size, DECIMAL};
use indicatif::{ProgressBar, ProgressStyle};

use libbintree::Order;
use libkdforest::prelude::*;
use libkdforest::Depth;

fn style_pb(pb: ProgressBar) -> ProgressBar {
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{spinner:.green}] {bar:30.green/yellow} {pos}/{len} levels {msg} ({elapsed})")
    {
        pb.set_style(style.progress_chars("█▇▆▅▄▃▂▁  "));
    }
    pb
}

#[derive(Parser)]
#[clap(arg_required_else_help = true)]
#[clap(name = "kdf")]
#[clap(author = "Joseph Guhlin <joseph.guhlin@gmail.com>")]
#[clap(about = "Level-synchronized k-d forests over column-major data", long_about = None)]
#[clap(version)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

/// Dataset and forest options. Flags override values from `--config`.
#[derive(Args)]
struct ForestArgs {
    /// YAML parameter file
    #[clap(short, long)]
    config: Option<PathBuf>,
    /// Raw little-endian f64 matrix
    #[clap(short, long)]
    data: Option<PathBuf>,
    #[clap(long)]
    samples: Option<usize>,
    #[clap(long)]
    features: Option<usize>,
    #[clap(long)]
    orientation: Option<Orientation>,
    /// sync or memory
    #[clap(long)]
    io_mode: Option<IoMode>,
    #[clap(short, long)]
    trees: Option<usize>,
    #[clap(short = 'j', long)]
    threads: Option<usize>,
    #[clap(long)]
    depth: Option<Depth>,
    #[clap(long)]
    fanout: Option<usize>,
    /// cyclic or random
    #[clap(long)]
    split: Option<SplitKind>,
    #[clap(long)]
    seed: Option<u64>,
}

impl ForestArgs {
    fn params(&self) -> Result<Params> {
        let mut params = match &self.config {
            Some(path) => Params::from_yaml_file(path)?,
            None => Params::default(),
        };

        if let Some(data) = &self.data {
            params.data_path = Some(data.clone());
        }
        if let Some(samples) = self.samples {
            params.sample_count = samples;
        }
        if let Some(features) = self.features {
            params.feature_count = features;
        }
        if let Some(orientation) = self.orientation {
            params.orientation = orientation;
        }
        if let Some(io_mode) = self.io_mode {
            params.io_mode = io_mode;
        }
        if let Some(trees) = self.trees {
            params.tree_count = trees;
        }
        if let Some(threads) = self.threads {
            params.thread_count = threads;
        }
        if let Some(depth) = self.depth {
            params.max_depth = depth;
        }
        if let Some(fanout) = self.fanout {
            params.fanout = fanout;
        }
        if let Some(split) = self.split {
            params.split = split;
        }
        if let Some(seed) = self.seed {
            params.seed = seed;
        }

        params.validate()?;
        Ok(params)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write a seeded random dataset
    Generate {
        output: PathBuf,
        #[clap(long)]
        samples: usize,
        #[clap(long)]
        features: usize,
        #[clap(long, default_value_t = Orientation::Col)]
        orientation: Orientation,
        #[clap(long, default_value_t = 42)]
        seed: u64,
    },
    /// Build a forest and report the shape of every tree
    Train {
        #[clap(flatten)]
        forest: ForestArgs,
        /// Print each binary tree's partitions
        #[clap(long)]
        summary: bool,
    },
    /// Print the samples sharing a leaf with a point, per tree
    Query {
        #[clap(flatten)]
        forest: ForestArgs,
        #[clap(long, value_delimiter = ',', allow_hyphen_values = true)]
        point: Vec<f64>,
    },
    /// Print the effective parameters as YAML
    Params {
        #[clap(flatten)]
        forest: ForestArgs,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Generate {
            output,
            samples,
            features,
            orientation,
            seed,
        } => generate(output, *samples, *features, *orientation, *seed),
        Commands::Train { forest, summary } => train(forest, *summary),
        Commands::Query { forest, point } => query(forest, point),
        Commands::Params { forest } => forest
            .params()
            .and_then(|p| p.to_yaml())
            .map(|yaml| print!("{yaml}")),
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn generate(
    output: &Path,
    samples: usize,
    features: usize,
    orientation: Orientation,
    seed: u64,
) -> Result<()> {
    let matrix = MemoryMatrix::random(samples, features, seed);
    let written = write_matrix(output, &matrix, orientation)?;
    println!(
        "Wrote {}x{} {}-major matrix to {} ({})",
        samples,
        features,
        orientation,
        output.display(),
        format_size(written, DECIMAL)
    );
    Ok(())
}

fn build(forest: &ForestArgs) -> Result<Engine> {
    let params = forest.params()?;
    let levels = params.max_depth as u64 + 1;
    let mut engine = Engine::new(params)?;

    let pb = style_pb(ProgressBar::new(levels));
    let result = engine.train_with(|report| {
        pb.set_message(format!("{} nodes", report.nodes));
        pb.inc(1);
    });
    pb.finish_and_clear();

    let summary = result?;
    log::info!(
        "{} nodes across {} trees in {:?}",
        summary.node_count(),
        summary.trees,
        summary.elapsed
    );
    Ok(engine)
}

fn train(forest: &ForestArgs, show_summary: bool) -> Result<()> {
    let engine = build(forest)?;

    for tree in engine.forest() {
        println!(
            "tree {}: {} nodes, {} leaves, depth {}",
            tree.id(),
            tree.node_count()?,
            tree.leaf_count()?,
            tree.depth()?
        );

        if show_summary {
            let summary = tree.summarize()?;
            summary
                .apply(Order::PreOrder, |node| {
                    let p = node.payload();
                    let indent = 2 * (p.depth as usize + 1);
                    match p.split {
                        Some(split) => println!(
                            "{:indent$}column {} < {split} ({} samples)",
                            "", p.dimension, p.samples
                        ),
                        None => println!("{:indent$}leaf ({} samples)", "", p.samples),
                    }
                })
                .map_err(|e| ForestError::invalid(e.to_string()))?;
        }
    }
    Ok(())
}

fn query(forest: &ForestArgs, point: &[f64]) -> Result<()> {
    let engine = build(forest)?;

    for (tree, bucket) in engine.query(point)?.iter().enumerate() {
        let ids = bucket
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        println!("tree {tree}: {ids}");
    }
    Ok(())
}
