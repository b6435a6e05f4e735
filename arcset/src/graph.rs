//! Edge and graph model, plus parsing of the `start-end` edge tokens.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Vertex identifier.
pub type Vertex = u16;

/// An input edge. Real edges never have `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub start: Vertex,
    pub end: Vertex,
}

impl Edge {
    pub const fn new(start: Vertex, end: Vertex) -> Self {
        Self { start, end }
    }

    pub fn is_loop(&self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("no edges given")]
    NoEdges,
    #[error("malformed edge '{0}', expected <start>-<end>")]
    Malformed(String),
    #[error("loops are not allowed: '{0}'")]
    Loop(String),
}

impl FromStr for Edge {
    type Err = ParamError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let malformed = || ParamError::Malformed(token.to_string());
        let (start, end) = token.trim().split_once('-').ok_or_else(malformed)?;
        let start = start.parse::<Vertex>().map_err(|_| malformed())?;
        let end = end.parse::<Vertex>().map_err(|_| malformed())?;

        let edge = Edge::new(start, end);
        if edge.is_loop() {
            return Err(ParamError::Loop(token.to_string()));
        }
        Ok(edge)
    }
}

/// The input graph, fixed for the lifetime of a generator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Graph {
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new(edges: Vec<Edge>) -> Result<Self, ParamError> {
        if edges.is_empty() {
            return Err(ParamError::NoEdges);
        }
        if let Some(e) = edges.iter().find(|e| e.is_loop()) {
            return Err(ParamError::Loop(e.to_string()));
        }
        Ok(Self { edges })
    }

    /// Parse the command-line edge list.
    pub fn parse<I, S>(tokens: I) -> Result<Self, ParamError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let edges = tokens
            .into_iter()
            .map(|t| t.as_ref().parse::<Edge>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(edges)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Distinct endpoints, in order of first occurrence.
    pub fn vertices(&self) -> Vec<Vertex> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for e in &self.edges {
            for v in [e.start, e.end] {
                if seen.insert(v) {
                    out.push(v);
                }
            }
        }
        out
    }
}

/// Edges that point backwards under `rank`: included iff the start vertex
/// ranks after the end vertex. Removing them leaves the graph acyclic under
/// that ordering.
///
/// Every endpoint must have a rank.
pub fn backward_edges(edges: &[Edge], rank: &HashMap<Vertex, usize>) -> Vec<Edge> {
    edges
        .iter()
        .filter(|e| rank[&e.start] > rank[&e.end])
        .copied()
        .collect()
}
