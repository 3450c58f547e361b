//! Test suites for the service host crate.

mod support;
