//! Core algorithms: the deques themselves and the substrate they share
//! (memory reclamation, elimination, the harness's deterministic PRNG and
//! thread-id bit-packing).

pub mod container;
pub mod elim;
pub mod memory;
pub mod mm_deque;
pub mod of_deque;
pub mod rand;
pub mod uid;
