//! Shared utilities.
//!
//! Hashing helpers and, for tests, fake collaborators.

pub mod hash;

#[cfg(test)]
pub mod testutil;
