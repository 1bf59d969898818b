//! Integration tests for the mesh gateway daemon
//!
//! These tests wire the mediator, storage sink and read model together in
//! a [`Daemon`](meshgw_daemon::Daemon) on top of the loopback broker and
//! drive gateways through it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p meshgw-tests
//! ```
//!
//! # Test Structure
//!
//! - `pipeline_test.rs` - status, configuration and data flow end to end
//! - `lifecycle_test.rs` - startup failures, gating and shutdown

// This crate only contains tests, no library code
