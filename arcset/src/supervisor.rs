//! Supervisor engine: the single reader of the edge stream.
//!
//! Setup -> Draining -> ShuttingDown. Draining ends on the solution limit,
//! an interrupt, or an empty (acyclic) solution. ShuttingDown clears the
//! active flag and closes the writer gates so no generator stays blocked.

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::frame;
use crate::gate::SyncError;
use crate::graph::Edge;
use crate::region::SharedRegion;
use crate::signal;

#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Print every improvement to stderr.
    pub print: bool,
    /// Stop after this many solutions were written; 0 means no limit.
    pub limit: u64,
    /// Wait before the first read so generators can get going.
    pub delay: Duration,
}

/// Final verdict reported on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Acyclic,
    NoSolution,
    Best(Vec<Edge>),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Acyclic => write!(f, "The graph is acyclic!"),
            Outcome::NoSolution => {
                write!(f, "The graph might not be acyclic, no solution found.")
            }
            Outcome::Best(edges) => write!(
                f,
                "The graph might not be acyclic, best solution removes {} edges.",
                edges.len()
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Setup,
    Draining,
    ShuttingDown,
}

pub struct Supervisor<'r> {
    region: &'r SharedRegion,
    config: SupervisorConfig,
    best: Option<Vec<Edge>>,
    phase: Phase,
}

impl<'r> Supervisor<'r> {
    pub fn new(region: &'r SharedRegion, config: SupervisorConfig) -> Self {
        Self {
            region,
            config,
            best: None,
            phase: Phase::Setup,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Run to completion. Shutdown happens even if draining failed.
    pub fn run(&mut self) -> Result<Outcome> {
        self.setup();
        let drained = self.drain();
        let outcome = self.shut_down();
        drained?;
        Ok(outcome)
    }

    fn setup(&mut self) {
        self.region.control().set_active(true);
        info!(limit = self.config.limit, "generators activated");

        if !self.config.delay.is_zero() {
            debug!(delay = ?self.config.delay, "delaying first read");
            if !signal::sleep(self.config.delay) {
                debug!("delay cut short");
            }
        }
        self.phase = Phase::Draining;
    }

    fn limit_reached(&self) -> bool {
        self.config.limit > 0 && self.region.control().solution_count() >= self.config.limit
    }

    fn drain(&mut self) -> Result<()> {
        let region = self.region;
        let buffer = region.buffer();
        let _wake = signal::installed().then(|| buffer.wake_reader_on_signal());

        loop {
            if self.limit_reached() {
                info!(limit = self.config.limit, "solution limit reached");
                return Ok(());
            }
            if signal::requested() {
                info!("interrupted");
                return Ok(());
            }

            let solution = match frame::read_solution(buffer) {
                Ok(s) => s,
                Err(SyncError::Interrupted) => {
                    info!("read interrupted");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            self.offer(solution);
            if matches!(&self.best, Some(b) if b.is_empty()) {
                return Ok(());
            }
        }
    }

    /// Keep `solution` if it beats the best so far.
    fn offer(&mut self, solution: Vec<Edge>) -> bool {
        let better = match &self.best {
            Some(best) => solution.len() < best.len(),
            None => true,
        };
        if !better {
            return false;
        }

        debug!(edges = solution.len(), "new best solution");
        if self.config.print && !solution.is_empty() {
            let edges: Vec<String> = solution.iter().map(Edge::to_string).collect();
            eprintln!("Solution with {} edges: {}", solution.len(), edges.join(" "));
        }
        self.best = Some(solution);
        true
    }

    fn shut_down(&mut self) -> Outcome {
        self.phase = Phase::ShuttingDown;
        self.region.control().set_active(false);
        if let Err(e) = self.region.buffer().close_writers() {
            warn!("closing writer gates failed: {}", e);
        }

        let outcome = match self.best.take() {
            None => Outcome::NoSolution,
            Some(b) if b.is_empty() => Outcome::Acyclic,
            Some(b) => Outcome::Best(b),
        };
        info!(
            solutions = self.region.control().solution_count(),
            unread = self.region.buffer().unread(),
            "{}",
            outcome
        );
        outcome
    }
}
