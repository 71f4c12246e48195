//! Integration tests for Agrohub
//!
//! The tests in this crate run the marketplace services (accounts, catalog,
//! order desk) against the in-memory stores, the way the HTTP server wires
//! them, and check concurrency properties of order placement.

// This is a test-only crate
#![cfg(test)]
