//! Generator engine: random vertex orderings turned into feedback arc set
//! candidates, framed into the shared buffer until told to stop.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::error::Result;
use crate::frame;
use crate::gate::SyncError;
use crate::graph::{backward_edges, Edge, Graph, Vertex};
use crate::region::SharedRegion;
use crate::{signal, MAX_SOLUTION_EDGES};

#[derive(Debug, Clone, Default)]
pub struct GeneratorConfig {
    /// Fixed RNG seed; derived from pid and clock when absent.
    pub seed: Option<u64>,
}

/// Why a generator's loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Supervisor cleared the active flag.
    Deactivated,
    /// Wrote a solution with no edges.
    Acyclic,
    /// Signal arrived or the supervisor closed the buffer.
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub written: u64,
    pub discarded: u64,
    pub stop: StopReason,
}

/// Candidate over the size cap; never leaves this module.
#[derive(Debug)]
struct CandidateTooLarge(usize);

/// Seed that differs between generators started side by side.
pub fn default_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    (u64::from(std::process::id()) << 32) ^ nanos
}

/// Edges violating the ordering `order` (first vertex ranks lowest).
pub fn candidate_for_order(edges: &[Edge], order: &[Vertex]) -> Vec<Edge> {
    let rank: HashMap<Vertex, usize> = order.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    backward_edges(edges, &rank)
}

pub struct Generator {
    graph: Graph,
    order: Vec<Vertex>,
    rng: SmallRng,
}

impl Generator {
    pub fn new(graph: Graph, config: &GeneratorConfig) -> Self {
        let seed = config.seed.unwrap_or_else(default_seed);
        debug!(seed, "generator seeded");
        Self {
            order: graph.vertices(),
            graph,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Shuffle the ordering and collect its backward edges.
    fn candidate(&mut self) -> std::result::Result<Vec<Edge>, CandidateTooLarge> {
        self.order.shuffle(&mut self.rng);
        let solution = candidate_for_order(self.graph.edges(), &self.order);
        if solution.len() > MAX_SOLUTION_EDGES {
            return Err(CandidateTooLarge(solution.len()));
        }
        Ok(solution)
    }

    /// Produce and frame solutions while the region is active.
    pub fn run(&mut self, region: &SharedRegion) -> Result<RunSummary> {
        let mut written = 0;
        let mut discarded = 0;
        let mut stop = StopReason::Deactivated;

        while region.control().is_active() {
            if signal::requested() {
                stop = StopReason::Interrupted;
                break;
            }

            let solution = match self.candidate() {
                Ok(s) => s,
                Err(CandidateTooLarge(n)) => {
                    discarded += 1;
                    debug!(edges = n, "candidate over cap, retrying");
                    continue;
                }
            };

            match frame::write_solution(region.shared(), &solution) {
                Ok(0) => {
                    written += 1;
                    info!("acyclic ordering found, stopping");
                    stop = StopReason::Acyclic;
                    break;
                }
                Ok(n) => {
                    written += 1;
                    debug!(edges = n, "solution written");
                }
                Err(SyncError::Interrupted) | Err(SyncError::Closed) => {
                    info!("write interrupted, stopping");
                    stop = StopReason::Interrupted;
                    break;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(RunSummary {
            written,
            discarded,
            stop,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::read_solution;

    fn triangle() -> Graph {
        Graph::parse(["1-2", "2-3", "3-1"]).unwrap()
    }

    #[test]
    fn test_candidate_for_order_on_every_triangle_ordering() {
        let g = triangle();
        let perms: [[Vertex; 3]; 6] = [
            [1, 2, 3],
            [1, 3, 2],
            [2, 1, 3],
            [2, 3, 1],
            [3, 1, 2],
            [3, 2, 1],
        ];
        for order in perms {
            let pos = |v: Vertex| order.iter().position(|&x| x == v).unwrap();
            let expected: Vec<Edge> = g
                .edges()
                .iter()
                .filter(|e| pos(e.start) > pos(e.end))
                .copied()
                .collect();
            let got = candidate_for_order(g.edges(), &order);
            assert_eq!(got, expected, "order {:?}", order);
            assert!((1..=2).contains(&got.len()));
        }
    }

    #[test]
    fn test_same_seed_same_candidates() {
        let cfg = GeneratorConfig { seed: Some(7) };
        let mut a = Generator::new(triangle(), &cfg);
        let mut b = Generator::new(triangle(), &cfg);
        for _ in 0..10 {
            assert_eq!(a.candidate().unwrap(), b.candidate().unwrap());
        }
    }

    #[test]
    fn test_oversized_candidates_are_discarded() {
        // Both directions of all 45 pairs: every ordering has 45 backward edges.
        let mut tokens = Vec::new();
        for a in 0..10u16 {
            for b in (a + 1)..10 {
                tokens.push(format!("{}-{}", a, b));
                tokens.push(format!("{}-{}", b, a));
            }
        }
        let graph = Graph::parse(&tokens).unwrap();
        let mut gen = Generator::new(graph, &GeneratorConfig { seed: Some(1) });
        assert!(matches!(gen.candidate(), Err(CandidateTooLarge(45))));
    }

    #[test]
    fn test_inactive_region_writes_nothing() {
        let region = SharedRegion::anonymous().unwrap();
        let mut gen = Generator::new(triangle(), &GeneratorConfig { seed: Some(3) });
        let summary = gen.run(&region).unwrap();
        assert_eq!(summary.written, 0);
        assert_eq!(summary.stop, StopReason::Deactivated);
    }

    #[test]
    fn test_acyclic_graph_stops_after_empty_solution() {
        let region = SharedRegion::anonymous().unwrap();
        region.control().set_active(true);

        let path = Graph::parse(["1-2", "2-3"]).unwrap();
        let mut gen = Generator::new(path, &GeneratorConfig { seed: Some(11) });
        // At most 3 slots per solution, so ~85 tries before the ring fills.
        let summary = gen.run(&region).unwrap();
        assert_eq!(summary.stop, StopReason::Acyclic);
        assert_eq!(region.control().solution_count(), summary.written);

        let mut last = None;
        for _ in 0..summary.written {
            last = Some(read_solution(region.buffer()).unwrap());
        }
        assert_eq!(last, Some(Vec::new()));
    }
}
