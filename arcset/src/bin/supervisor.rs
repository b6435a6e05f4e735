//! Supervisor process: creates the shared region, keeps the smallest
//! solution the generators send, and tears everything down at the end.

use std::time::Duration;

use clap::Parser;

use arcset::supervisor::{Outcome, Supervisor, SupervisorConfig};
use arcset::{logging, signal, Error, Result, SharedRegion, DEFAULT_SHM_NAME};

#[derive(Parser)]
#[command(name = "supervisor")]
#[command(about = "Collect feedback arc set candidates and keep the best", long_about = None)]
struct Args {
    /// Print every improved solution to stderr
    #[arg(short, long)]
    print: bool,

    /// Stop after this many solutions (0 = unlimited)
    #[arg(short = 'n', long, default_value_t = 0)]
    limit: u64,

    /// Seconds to wait before reading the first solution
    #[arg(short = 'w', long, default_value_t = 0)]
    delay: u64,

    /// Shared memory object name
    #[arg(long, env = "ARCSET_SHM", default_value = DEFAULT_SHM_NAME)]
    shm_name: String,

    /// Debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: Args) -> Result<Outcome> {
    signal::install().map_err(Error::Signal)?;

    let config = SupervisorConfig {
        print: args.print,
        limit: args.limit,
        delay: Duration::from_secs(args.delay),
    };

    let mut region = SharedRegion::create(&args.shm_name)?;
    let result = Supervisor::new(&region, config).run();
    let destroyed = region.destroy();

    let outcome = result?;
    destroyed?;
    Ok(outcome)
}

fn main() {
    let args = Args::parse();
    logging::init_logging(args.verbose);

    match run(args) {
        Ok(outcome) => println!("{}", outcome),
        Err(e) => e.exit(),
    }
}
