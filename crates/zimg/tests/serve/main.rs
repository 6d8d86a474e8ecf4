//! Integration tests for the zimg HTTP surface.
//!
//! Each test spins up a real server over a temporary store via the harness
//! and drives it over HTTP.

mod harness;

mod fetch;
