//! Output conflict detection.

use std::collections::{BTreeMap, HashMap};

use crate::action::{Action, ActionKey, Artifact, ConflictError};
use crate::env::ActionConflictChecker;

/// Two actions conflict when they produce the same output path and are not
/// shareable (same mnemonic, same outputs).
#[derive(Debug, Default, Clone, Copy)]
pub struct OutputConflictChecker;

impl ActionConflictChecker for OutputConflictChecker {
  fn find_conflicts(&self, actions: &[Action]) -> BTreeMap<ActionKey, ConflictError> {
    let mut owners: HashMap<&Artifact, &Action> = HashMap::new();
    let mut conflicts = BTreeMap::new();
    for action in actions {
      for output in &action.outputs {
        let Some(first) = owners.get(output).copied() else {
          owners.insert(output, action);
          continue;
        };
        if first.key == action.key || first.is_shareable_with(action) {
          continue;
        }
        conflicts.entry(action.key.clone()).or_insert_with(|| ConflictError {
          artifact: output.clone(),
          first: first.key.clone(),
          first_mnemonic: first.mnemonic.clone(),
          second: action.key.clone(),
          second_mnemonic: action.mnemonic.clone(),
        });
      }
    }
    conflicts
  }
}
