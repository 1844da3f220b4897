//! Integration test utilities for the presence registry
//!
//! Builds presence services with deterministic session ids and observable
//! minute ledgers for end-to-end tests.


pub use fixtures::*;
pub use helpers::*;
