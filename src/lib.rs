//! Lock-free two-ended deque research harness.
//!
//! Two independent deque implementations (`core::of_deque::OfDeque`,
//! `core::mm_deque::MmDeque`) share a common `core::memory` reclamation
//! substrate and a common `core::container::Deque` trait; `verify` drives
//! them through the concurrent correctness and liveness tests described in
//! `SPEC_FULL.md` §4.6.

pub mod config;
pub mod core;
pub mod error;
pub mod verify;
