//! trellis-lib: configuration and dependency resolution core
//!
//! This crate decides which configuration(s) each dependency of a target is
//! built under and drives top-level targets from "analyzed" to "executed":
//! - `transition`: applies transitions to build options
//! - `config`: interns configurations and resolves dependency edges
//! - `target`: fetches target definitions and reports root causes
//! - `prereq`: the prerequisite state machine (configured nodes + aspects)
//! - `driver`: conflict detection, test classification, compatibility, execution
//!
//! Every computation returns `Eval<T, E>`: a value, a suspension naming the
//! values it still needs, an interruption, or a typed error. The in-memory
//! collaborators in `store` and the `session` loop act as the evaluation
//! substrate for tests and the CLI.

pub mod action;
pub mod analysis;
pub mod aspect;
pub mod config;
pub mod consts;
pub mod dependency;
pub mod driver;
pub mod env;
pub mod eval;
pub mod event;
pub mod label;
pub mod node;
pub mod prereq;
pub mod provider;
pub mod session;
pub mod settings;
pub mod store;
pub mod target;
pub mod transition;
pub mod util;
pub mod workspace;
