//! End-to-end tests over the in-memory stores.

mod common;
mod driver_tests;
mod scenario_tests;
