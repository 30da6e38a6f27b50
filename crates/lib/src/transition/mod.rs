//! Transition engine.
//!
//! A transition maps one build configuration's options to one or more named
//! option sets:
//! - `Null`: the destination has no configuration
//! - `Patch`: one output under the constant key `""`
//! - `Split`: one output per branch, keys chosen by the transition
//! - `UserDefined`: evaluated by an interpreter, cached per input

pub mod engine;
pub mod types;

pub use engine::{SettingDefaults, TransitionEngine};
pub use types::{
  Applied, ExecTransition, PatchTransition, SetOptions, SplitOptions, SplitTransition, Transition, TransitionError,
  TransitionOutputs, UserTransition,
};
