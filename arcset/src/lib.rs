// arcset/src/lib.rs
// Shared layout, the bounded buffer protocol over it, and the two engines
// (generator, supervisor) that talk through it. The binaries only parse
// arguments and drive these.

pub mod buffer;
pub mod error;
pub mod frame;
pub mod gate;
pub mod generator;
pub mod graph;
pub mod logging;
pub mod region;
pub mod signal;
pub mod supervisor;

pub use error::{Error, Result};
pub use graph::{Edge, Graph};
pub use region::SharedRegion;

/// Slots in the circular edge buffer.
pub const RING_CAPACITY: usize = 256;

/// Largest candidate a generator will frame. A full solution plus its
/// delimiter must fit in the ring.
pub const MAX_SOLUTION_EDGES: usize = 8;

/// Region name used when none is configured.
pub const DEFAULT_SHM_NAME: &str = "/arcset_shm";

const _: () = assert!(MAX_SOLUTION_EDGES + 1 <= RING_CAPACITY);
