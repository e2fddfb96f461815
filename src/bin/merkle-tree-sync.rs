//! merkle-tree-sync - replay a leaf feed into a tree and inspect the result

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::warn;
use merkle_tree_sync::{init, ErrorKind, LeafEvent, SyncTree};

#[derive(Parser)]
#[command(name = "merkle-tree-sync", version, about = "Sparse Merkle tree kept in sync with an on-chain leaf feed")]
struct Cli {
    /// Configuration file (TOML); defaults are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply a JSON-lines file of leaf events and print the resulting checkpoint
    Replay {
        /// One `{leafIndex, leafValue}` or `{minLeafIndex, leafValues}` object per line
        #[arg(short, long)]
        feed: PathBuf,
    },
    /// Print the current watermark and root
    Root,
    /// Print the Merkle proof of one leaf
    Proof {
        #[arg(short, long)]
        leaf: u64,
    },
    /// Drop leaves from the given index onward
    Rewind {
        #[arg(short, long)]
        from: u64,
    },
}

fn replay(tree: &SyncTree, feed: &PathBuf) -> anyhow::Result<()> {
    let file = File::open(feed).with_context(|| format!("opening feed {}", feed.display()))?;
    let mut skipped = 0usize;
    for (line_no, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: LeafEvent = serde_json::from_str(&line)
            .with_context(|| format!("parsing feed line {}", line_no + 1))?;
        match tree.ingest(event) {
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::OutOfRange | ErrorKind::Validation) => {
                warn!("Skipping feed line {}: {}", line_no + 1, e);
                skipped += 1;
            }
            Err(e) => bail!("feed line {}: {} (status {})", line_no + 1, e, e.kind().status_code()),
        }
    }
    let checkpoint = tree.checkpoint();
    println!("{}", serde_json::to_string_pretty(&checkpoint)?);
    if skipped > 0 {
        eprintln!("{} feed lines skipped", skipped);
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = init(config_path.as_deref()).context("loading configuration")?;
    let tree = SyncTree::open(config).context("opening tree")?;

    match cli.command {
        Command::Replay { feed } => replay(&tree, &feed)?,
        Command::Root => println!("{}", serde_json::to_string_pretty(&tree.checkpoint())?),
        Command::Proof { leaf } => {
            let proof = tree.get_proof(leaf)?;
            println!("{}", serde_json::to_string_pretty(&proof)?);
        }
        Command::Rewind { from } => {
            let checkpoint = tree.rewind(from)?;
            println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        }
    }
    Ok(())
}
