//! Adapters that live inside the domain crate for convenience.
//!
//! The in-memory backend is meant for unit tests and local demos. Relational
//! drivers live in separate adapter crates.

pub mod memory_backend;
