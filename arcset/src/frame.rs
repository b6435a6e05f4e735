//! Solution framing: a solution is a run of edges followed by one
//! `EndOfSolution` marker in the shared edge stream.

use crate::buffer::BoundedBuffer;
use crate::gate::SyncError;
use crate::graph::Edge;
use crate::region::Shared;

// Bit 32 of a slot marks the end of a solution; edges only use the low 32.
const END_OF_SOLUTION: u64 = 1 << 32;

/// One element of the shared edge stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamItem {
    Edge(Edge),
    EndOfSolution,
}

impl StreamItem {
    pub(crate) fn pack(self) -> u64 {
        match self {
            StreamItem::Edge(e) => (u64::from(e.start) << 16) | u64::from(e.end),
            StreamItem::EndOfSolution => END_OF_SOLUTION,
        }
    }

    pub(crate) fn unpack(raw: u64) -> Self {
        if raw & END_OF_SOLUTION != 0 {
            return StreamItem::EndOfSolution;
        }
        StreamItem::Edge(Edge::new((raw >> 16) as u16, raw as u16))
    }
}

/// Write one framed solution and count it.
///
/// Holds the writers mutex for the whole solution, so solutions from
/// different producers never interleave. Returns the number of edges
/// written; 0 is the acyclic witness. On error the remaining edges are
/// dropped, the mutex is released, and the solution is not counted.
pub fn write_solution(shared: &Shared, edges: &[Edge]) -> Result<usize, SyncError> {
    let buffer = &shared.buffer;
    let guard = buffer.lock_writers()?;

    for &edge in edges {
        buffer.write(&guard, StreamItem::Edge(edge))?;
    }
    buffer.write(&guard, StreamItem::EndOfSolution)?;
    shared.control.record_solution(&guard);

    Ok(edges.len())
}

/// Read exactly one framed solution, blocking until its marker arrives.
pub fn read_solution(buffer: &BoundedBuffer) -> Result<Vec<Edge>, SyncError> {
    let mut edges = Vec::new();
    loop {
        match buffer.read()? {
            StreamItem::Edge(e) => edges.push(e),
            StreamItem::EndOfSolution => return Ok(edges),
        }
    }
}
