//! Generator process: maps the supervisor's region and writes candidate
//! solutions for the given edge list until stopped.

use clap::Parser;
use tracing::info;

use arcset::generator::{Generator, GeneratorConfig};
use arcset::{logging, signal, Error, Graph, Result, SharedRegion, DEFAULT_SHM_NAME};

#[derive(Parser)]
#[command(name = "generator")]
#[command(about = "Feed random feedback arc set candidates to the supervisor", long_about = None)]
struct Args {
    /// Graph edges as <start>-<end>, e.g. 0-1 1-2 2-0
    #[arg(required = true, value_name = "EDGE")]
    edges: Vec<String>,

    /// Fixed RNG seed (default: derived from pid and clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Shared memory object name
    #[arg(long, env = "ARCSET_SHM", default_value = DEFAULT_SHM_NAME)]
    shm_name: String,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<()> {
    // Reject bad input before touching anything shared.
    let graph = Graph::parse(&args.edges)?;

    signal::install().map_err(Error::Signal)?;
    let region = SharedRegion::open(&args.shm_name)?;

    let config = GeneratorConfig { seed: args.seed };
    let summary = Generator::new(graph, &config).run(&region)?;
    info!(
        written = summary.written,
        discarded = summary.discarded,
        stop = ?summary.stop,
        "generator finished"
    );
    Ok(())
}

fn main() {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    if let Err(e) = run(args) {
        e.exit();
    }
}
