//! Apply transitions to option sets.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::types::{Applied, Transition, TransitionError, UserTransition};
use crate::config::{BuildOptions, OptionValue};
use crate::env::TransitionInterpreter;
use crate::eval::{Eval, Halt, Interrupt};
use crate::util::hash::Checksum;

/// Source of default values for build settings a transition reads but the
/// source options do not carry.
pub trait SettingDefaults {
  /// Defaults for every named setting. Suspends while any is unavailable.
  fn setting_defaults(&self, transition: &str, settings: &[String]) -> Eval<BTreeMap<String, OptionValue>, TransitionError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
  options: Checksum,
  transition: String,
  defaults: BTreeMap<String, OptionValue>,
}

type Branches = Result<Arc<BTreeMap<String, BuildOptions>>, TransitionError>;

/// Turns a source option set plus a transition into destination option sets.
///
/// Results of user-defined transitions are cached by source options,
/// transition identity and the defaults they were evaluated with. User
/// transitions must be referentially transparent, so a hit never re-runs
/// user code.
pub struct TransitionEngine {
  interpreter: Arc<dyn TransitionInterpreter>,
  cache: DashMap<CacheKey, Branches>,
  hits: AtomicUsize,
}

impl TransitionEngine {
  pub fn new(interpreter: Arc<dyn TransitionInterpreter>) -> Self {
    Self {
      interpreter,
      cache: DashMap::new(),
      hits: AtomicUsize::new(0),
    }
  }

  /// Apply `transition` to `options`.
  pub fn apply(
    &self,
    options: &BuildOptions,
    transition: &Transition,
    defaults: &dyn SettingDefaults,
    interrupt: &Interrupt,
  ) -> Eval<Applied, TransitionError> {
    match transition {
      Transition::Null => Ok(Applied::ConfigurationLess),
      Transition::NoTransition => Ok(Applied::single(options.clone())),
      Transition::Patch(patch) => Ok(Applied::single(patch.patch(options)?)),
      Transition::Split(split) => {
        let branches = split.split(options)?;
        if branches.is_empty() {
          return Err(Halt::Failed(TransitionError::EmptySplit {
            transition: split.identity(),
          }));
        }
        Ok(Applied::Options(branches))
      }
      Transition::UserDefined(user) => {
        let branches = self.apply_user(options, user, defaults, interrupt)?;
        Ok(Applied::Options(branches.as_ref().clone()))
      }
    }
  }

  /// Number of user transition evaluations answered from the cache.
  pub fn cache_hits(&self) -> usize {
    self.hits.load(Ordering::Relaxed)
  }

  pub fn clear_cache(&self) {
    self.cache.clear();
  }

  fn apply_user(
    &self,
    options: &BuildOptions,
    user: &UserTransition,
    defaults: &dyn SettingDefaults,
    interrupt: &Interrupt,
  ) -> Eval<Arc<BTreeMap<String, BuildOptions>>, TransitionError> {
    let missing: Vec<String> = user.inputs.iter().filter(|name| !options.contains(name)).cloned().collect();
    let external = if missing.is_empty() {
      BTreeMap::new()
    } else {
      defaults.setting_defaults(&user.id, &missing)?
    };

    let key = CacheKey {
      options: options.checksum(),
      transition: user.identity(),
      defaults: external.clone(),
    };
    if let Some(cached) = self.cache.get(&key) {
      self.hits.fetch_add(1, Ordering::Relaxed);
      trace!(transition = %user.id, "transition cache hit");
      return cached.value().clone().map_err(Halt::Failed);
    }

    if interrupt.is_triggered() {
      return Err(Halt::Interrupted);
    }

    let mut inputs = external;
    for name in &user.inputs {
      if let Some(value) = options.get(name) {
        inputs.insert(name.clone(), value.clone());
      }
    }

    debug!(transition = %user.id, inputs = inputs.len(), "evaluating user transition");
    let result = self
      .interpreter
      .evaluate(user, options, &inputs)
      .and_then(|outputs| validate_outputs(user, options, outputs))
      .map(Arc::new);

    let stored = self.cache.entry(key).or_insert(result).value().clone();
    stored.map_err(Halt::Failed)
  }
}

impl std::fmt::Debug for TransitionEngine {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TransitionEngine")
      .field("cached", &self.cache.len())
      .field("hits", &self.cache_hits())
      .finish()
  }
}

fn validate_outputs(
  user: &UserTransition,
  options: &BuildOptions,
  outputs: super::types::TransitionOutputs,
) -> Result<BTreeMap<String, BuildOptions>, TransitionError> {
  if outputs.is_empty() {
    return Err(TransitionError::EmptySplit {
      transition: user.id.clone(),
    });
  }

  let mut branches = BTreeMap::new();
  for (branch, values) in outputs {
    for name in values.keys() {
      if !user.outputs.contains(name) {
        return Err(TransitionError::UndeclaredOutput {
          transition: user.id.clone(),
          output: name.clone(),
        });
      }
    }
    if let Some(missing) = user.outputs.iter().find(|name| !values.contains_key(*name)) {
      return Err(TransitionError::MissingOutput {
        transition: user.id.clone(),
        branch,
        output: missing.clone(),
      });
    }
    let overrides: BuildOptions = values.into_iter().collect();
    branches.insert(branch, options.overlay(&overrides));
  }
  Ok(branches)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::transition::types::TransitionOutputs;
  use crate::util::testutil::{CountingInterpreter, FixedDefaults, NoDefaults};

  fn user(id: &str, inputs: &[&str], outputs: &[&str]) -> Transition {
    Transition::user(UserTransition {
      id: id.to_string(),
      inputs: inputs.iter().map(|s| s.to_string()).collect(),
      outputs: outputs.iter().map(|s| s.to_string()).collect(),
      source: serde_json::Value::Null,
    })
  }

  fn outputs(branches: &[(&str, &str, &str)]) -> TransitionOutputs {
    let mut map: TransitionOutputs = BTreeMap::new();
    for (branch, name, value) in branches {
      map
        .entry(branch.to_string())
        .or_default()
        .insert(name.to_string(), OptionValue::from(*value));
    }
    map
  }

  mod builtin {
    use super::*;

    #[test]
    fn null_is_configuration_less() {
      let engine = TransitionEngine::new(Arc::new(CountingInterpreter::returning(BTreeMap::new())));
      let applied = engine
        .apply(&BuildOptions::new(), &Transition::Null, &NoDefaults, &Interrupt::new())
        .unwrap();
      assert_eq!(applied, Applied::ConfigurationLess);
    }

    #[test]
    fn patch_uses_single_constant_key() {
      let engine = TransitionEngine::new(Arc::new(CountingInterpreter::returning(BTreeMap::new())));
      let transition = Transition::set_options(BuildOptions::new().with("cpu", "arm"));
      let Applied::Options(map) = engine
        .apply(&BuildOptions::new(), &transition, &NoDefaults, &Interrupt::new())
        .unwrap()
      else {
        panic!("expected options");
      };
      assert_eq!(map.len(), 1);
      assert_eq!(map[""].get_str("cpu"), Some("arm"));
    }

    #[test]
    fn empty_split_fails_loudly() {
      let engine = TransitionEngine::new(Arc::new(CountingInterpreter::returning(BTreeMap::new())));
      let transition = Transition::split_options(BTreeMap::new());
      let err = engine
        .apply(&BuildOptions::new(), &transition, &NoDefaults, &Interrupt::new())
        .unwrap_err();
      assert!(matches!(err, Halt::Failed(TransitionError::EmptySplit { .. })));
    }
  }

  mod user_defined {
    use super::*;

    #[test]
    fn results_are_cached() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter.clone());
      let transition = user("to_arm", &[], &["cpu"]);
      let options = BuildOptions::new().with("cpu", "k8");

      let first = engine.apply(&options, &transition, &NoDefaults, &Interrupt::new()).unwrap();
      let second = engine.apply(&options, &transition, &NoDefaults, &Interrupt::new()).unwrap();

      assert_eq!(first, second);
      assert_eq!(interpreter.calls(), 1);
      assert_eq!(engine.cache_hits(), 1);
    }

    #[test]
    fn descriptors_sharing_an_id_are_cached_apart() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter.clone());
      let options = BuildOptions::new().with("cpu", "k8");
      let declared = user("to_arm", &[], &["cpu"]);
      let redeclared = user("to_arm", &[], &["cpu", "os"]);

      engine.apply(&options, &declared, &NoDefaults, &Interrupt::new()).unwrap();
      let err = engine
        .apply(&options, &redeclared, &NoDefaults, &Interrupt::new())
        .unwrap_err();

      assert!(matches!(err, Halt::Failed(TransitionError::MissingOutput { .. })));
      assert_eq!(interpreter.calls(), 2);
      assert_eq!(engine.cache_hits(), 0);
    }

    #[test]
    fn different_source_options_miss_the_cache() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter.clone());
      let transition = user("to_arm", &[], &["cpu"]);

      engine
        .apply(&BuildOptions::new().with("cpu", "k8"), &transition, &NoDefaults, &Interrupt::new())
        .unwrap();
      engine
        .apply(&BuildOptions::new().with("cpu", "ppc"), &transition, &NoDefaults, &Interrupt::new())
        .unwrap();
      assert_eq!(interpreter.calls(), 2);
    }

    #[test]
    fn undeclared_output_is_an_error() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "os", "linux")])));
      let engine = TransitionEngine::new(interpreter);
      let err = engine
        .apply(&BuildOptions::new(), &user("t", &[], &["cpu"]), &NoDefaults, &Interrupt::new())
        .unwrap_err();
      assert!(matches!(err, Halt::Failed(TransitionError::UndeclaredOutput { ref output, .. }) if output == "os"));
    }

    #[test]
    fn missing_output_is_an_error() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter);
      let err = engine
        .apply(&BuildOptions::new(), &user("t", &[], &["cpu", "os"]), &NoDefaults, &Interrupt::new())
        .unwrap_err();
      assert!(matches!(err, Halt::Failed(TransitionError::MissingOutput { ref output, .. }) if output == "os"));
    }

    #[test]
    fn missing_inputs_suspend_on_defaults() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter.clone());
      let transition = user("t", &["//settings:flavor"], &["cpu"]);

      let err = engine
        .apply(&BuildOptions::new(), &transition, &FixedDefaults::pending(), &Interrupt::new())
        .unwrap_err();
      assert!(err.is_suspend());
      assert_eq!(interpreter.calls(), 0);

      let defaults = FixedDefaults::ready(&[("//settings:flavor", "sweet")]);
      engine.apply(&BuildOptions::new(), &transition, &defaults, &Interrupt::new()).unwrap();
      assert_eq!(interpreter.calls(), 1);
      assert_eq!(interpreter.last_inputs().get("//settings:flavor"), Some(&OptionValue::from("sweet")));
    }

    #[test]
    fn interrupt_stops_before_user_code() {
      let interpreter = Arc::new(CountingInterpreter::returning(outputs(&[("", "cpu", "arm")])));
      let engine = TransitionEngine::new(interpreter.clone());
      let interrupt = Interrupt::new();
      interrupt.trigger();

      let err = engine
        .apply(&BuildOptions::new(), &user("t", &[], &["cpu"]), &NoDefaults, &interrupt)
        .unwrap_err();
      assert_eq!(err, Halt::Interrupted);
      assert_eq!(interpreter.calls(), 0);
    }
  }
}
