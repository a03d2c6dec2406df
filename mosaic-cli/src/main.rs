//! Command-line front end for the mosaic asset pipeline.
//!
//! Mounts one or more content directories (in order, later mounts shadow
//! earlier ones) and answers namespace queries: the digest, path listings,
//! per-path provenance, and one-off asset fetches.

mod commands;

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use mosaic::{AssetPipeline, DirectorySource, EngineConfig};

#[derive(Parser)]
#[command(name = "mosaic", about = "Inspect merged asset namespaces", version)]
struct Cli {
    /// Content directory to mount; repeat for overlays (later wins).
    #[arg(short, long = "mount", required = true)]
    mount: Vec<std::path::PathBuf>,

    /// Worker threads for asset loading.
    #[arg(long, default_value_t = mosaic::config::DEFAULT_WORKER_THREADS)]
    workers: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the deterministic namespace digest.
    Digest {
        /// Glob patterns of paths to exclude.
        #[arg(long = "ignore")]
        ignore: Vec<String>,
    },

    /// List namespace paths.
    List {
        /// Only paths with this extension (without the dot).
        #[arg(long)]
        ext: Option<String>,

        /// Only paths under this prefix.
        #[arg(long)]
        prefix: Option<String>,
    },

    /// Show which sources provide a path (owner first, then patches).
    Sources {
        /// Namespace path.
        path: String,
    },

    /// Fetch one asset and print a summary of the decoded payload.
    Show {
        /// Payload kind: document, image, audio, font or bytes.
        kind: String,

        /// Asset query, e.g. `gfx/sheet.png:walk_0?flipx`.
        query: String,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = EngineConfig::default().with_worker_threads(cli.workers);
    if let Command::Digest { ignore } = &cli.command {
        for pattern in ignore {
            config = config.with_digest_ignore(pattern.clone());
        }
    }

    let mut builder = AssetPipeline::builder().with_config(config);
    for root in &cli.mount {
        builder = builder.mount(Arc::new(DirectorySource::new(root.clone())));
    }
    let pipeline = builder.build();

    let result = match cli.command {
        Command::Digest { .. } => commands::digest(&pipeline),
        Command::List { ext, prefix } => commands::list(&pipeline, ext.as_deref(), prefix.as_deref()),
        Command::Sources { path } => commands::sources(&pipeline, &path),
        Command::Show { kind, query } => commands::show(&pipeline, &kind, &query),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
