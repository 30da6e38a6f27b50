//! Build driver: from "analyzed" to "executed" for one top-level key.
//!
//! Each evaluation runs this sequence, re-entering from the top after every
//! suspension:
//!
//! 1. fetch the analyzed value
//! 2. post `TargetAnalyzed` once
//! 3. check the action closure for conflicts once per generation
//! 4. classify the test type (retained across restarts)
//! 5. check platform and environment compatibility (retained across restarts)
//! 6. request execution of the artifacts, bundling non-exclusive tests
//! 7. post `TargetCompleted` and purge retained state
//!
//! Exclusive tests are not executed here. They are returned in the value and
//! run one at a time by [`BuildDriver::run_exclusive_test`] after every
//! other key has finished.

mod compat;
mod conflict;
mod state;
mod types;

use tracing::{debug, info, warn};

use crate::action::ConflictError;
use crate::env::DriverEnv;
use crate::eval::{Eval, Halt, Lookup, Pending};
use crate::event::{BuildEvent, EventKind};
use crate::settings::AnalysisSettings;

pub use compat::{Compatibility, check_compatibility};
pub use conflict::OutputConflictChecker;
pub use state::Generation;
pub use types::{
  AnalyzedValue, BuildDriverKey, BuildDriverValue, DriverError, ExecutionFailure, ExecutionKey,
  TargetCompatibilityViolation, TestType, TopLevelKey,
};

/// Classify a top-level key's test type. Aspects are never tests.
pub fn classify_test(key: &TopLevelKey, value: &AnalyzedValue, settings: &AnalysisSettings) -> TestType {
  let target = &value.node.target;
  if key.is_aspect() || !target.is_test() {
    TestType::NotTest
  } else if settings.exclusive_test_strategy || target.is_exclusive() {
    TestType::Exclusive
  } else if target.is_exclusive_if_local() {
    TestType::ExclusiveIfLocal
  } else {
    TestType::Parallel
  }
}

pub struct BuildDriver<'a> {
  env: DriverEnv<'a>,
}

impl<'a> BuildDriver<'a> {
  pub fn new(env: DriverEnv<'a>) -> Self {
    Self { env }
  }

  /// Drive one key as far as it can go.
  pub fn evaluate(&self, key: &BuildDriverKey) -> Eval<BuildDriverValue, DriverError> {
    let top = &key.top_level;
    self.interrupted()?;

    let value = match self.env.analysis.analyzed(top) {
      Lookup::Pending => return Err(Halt::Suspend(Pending::of(format!("analysis {top}")))),
      Lookup::Ready(Err(failure)) => {
        self.env.generation.purge(top);
        return Err(Halt::Failed(DriverError::from(failure)));
      }
      Lookup::Ready(Ok(value)) => value,
    };

    self.post(top, EventKind::TargetAnalyzed);
    self.check_conflicts(top, &value.actions)?;

    let test_type = self
      .env
      .generation
      .test_type(top, || classify_test(top, &value, self.env.settings));

    self.interrupted()?;
    let compatibility = match self.env.generation.compatibility(top) {
      Some(compatibility) => compatibility,
      None => {
        let compatibility = check_compatibility(&self.env, key, &value).inspect_err(|halt| {
          if matches!(halt, Halt::Failed(_)) {
            self.env.generation.purge(top);
          }
        })?;
        self.env.generation.retain_compatibility(top, compatibility.clone());
        compatibility
      }
    };

    if let Compatibility::Skip(reason) = compatibility {
      if test_type.is_test() {
        self.post(top, EventKind::TestAnalyzed { skipped: true });
      }
      self.post(
        top,
        EventKind::TargetSkipped {
          reason: reason.clone(),
        },
      );
      self.env.generation.purge(top);
      info!(target = %top, reason = %reason, "target skipped");
      return Ok(BuildDriverValue {
        key: key.clone(),
        test_type,
        skipped: Some(reason),
        exclusive_test: None,
      });
    }
    if test_type.is_test() {
      self.post(top, EventKind::TestAnalyzed { skipped: false });
    }

    self.interrupted()?;
    let (requested, exclusive_test) = self.execution_keys(top, &value, test_type);
    match self.env.execution.request(&requested) {
      Lookup::Pending => {
        debug!(target = %top, keys = requested.len(), "waiting for execution");
        return Err(Halt::Suspend(Pending::of(format!("execution of {top}"))));
      }
      Lookup::Ready(Err(failure)) => {
        self.env.generation.purge(top);
        return Err(Halt::Failed(DriverError::from(failure)));
      }
      Lookup::Ready(Ok(())) => {}
    }

    self.post(top, EventKind::TargetCompleted { test_type });
    self.env.generation.purge(top);
    info!(target = %top, test_type = %test_type, artifacts = value.artifacts.len(), "target completed");
    Ok(BuildDriverValue {
      key: key.clone(),
      test_type,
      skipped: None,
      exclusive_test,
    })
  }

  /// Execute the exclusive test deferred by [`BuildDriver::evaluate`], if any.
  pub fn run_exclusive_test(&self, value: &BuildDriverValue) -> Eval<(), DriverError> {
    let Some(test) = &value.exclusive_test else {
      return Ok(());
    };
    self.interrupted()?;
    match self.env.execution.request(std::slice::from_ref(test)) {
      Lookup::Pending => Err(Halt::Suspend(Pending::of(test.to_string()))),
      Lookup::Ready(Err(failure)) => Err(Halt::Failed(DriverError::from(failure))),
      Lookup::Ready(Ok(())) => {
        info!(test = %test, "exclusive test completed");
        Ok(())
      }
    }
  }

  fn check_conflicts(&self, top: &TopLevelKey, actions: &[crate::action::Action]) -> Eval<(), DriverError> {
    if !self.env.generation.begin_conflict_check(top) {
      return Ok(());
    }
    let conflicts: Vec<ConflictError> = self.env.conflicts.find_conflicts(actions).into_values().collect();
    if conflicts.is_empty() {
      return Ok(());
    }
    for conflict in &conflicts {
      warn!(target = %top, conflict = %conflict, "action conflict");
    }
    self.post(
      top,
      EventKind::ActionConflict {
        conflicts: conflicts.iter().map(ToString::to_string).collect(),
      },
    );
    self.env.generation.purge(top);
    Err(Halt::Failed(DriverError::ActionConflict {
      key: top.clone(),
      conflicts,
    }))
  }

  /// Keys to request now, and the exclusive test to run later.
  fn execution_keys(
    &self,
    top: &TopLevelKey,
    value: &AnalyzedValue,
    test_type: TestType,
  ) -> (Vec<ExecutionKey>, Option<ExecutionKey>) {
    let mut keys: Vec<ExecutionKey> = value.artifacts.iter().cloned().map(ExecutionKey::Artifact).collect();
    let exclusive = match test_type {
      TestType::NotTest => return (keys, None),
      TestType::Parallel => false,
      TestType::Exclusive => true,
      TestType::ExclusiveIfLocal => self.env.settings.local_test_execution,
    };
    let completion = ExecutionKey::TestCompletion {
      target: top.target().clone(),
      exclusive,
    };
    if exclusive {
      (keys, Some(completion))
    } else {
      keys.push(completion);
      (keys, None)
    }
  }

  fn post(&self, top: &TopLevelKey, kind: EventKind) {
    self.env.generation.post_once(
      self.env.events,
      BuildEvent {
        key: top.clone(),
        kind,
      },
    );
  }

  fn interrupted(&self) -> Eval<(), DriverError> {
    if self.env.interrupt.is_triggered() {
      return Err(Halt::Interrupted);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use crate::action::{Action, ActionKey};
  use crate::env::{ActionConflictChecker, AnalysisStore, ExecutionRequester};
  use crate::eval::Interrupt;
  use crate::event::RecordingSink;
  use crate::label::Label;
  use crate::node::{AnalysisFailure, ConfiguredNode, ConfiguredTargetKey};
  use crate::target::{ActionTemplate, Target, TargetKind};
  use crate::util::testutil::{FakePackages, label};

  #[derive(Default)]
  struct FakeAnalysis {
    values: Mutex<BTreeMap<TopLevelKey, Result<Arc<AnalyzedValue>, AnalysisFailure>>>,
    calls: AtomicUsize,
  }

  impl FakeAnalysis {
    fn add(&self, value: AnalyzedValue) {
      self.values.lock().unwrap().insert(value.key.clone(), Ok(Arc::new(value)));
    }
  }

  impl AnalysisStore for FakeAnalysis {
    fn analyzed(&self, key: &TopLevelKey) -> Lookup<Result<Arc<AnalyzedValue>, AnalysisFailure>> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      match self.values.lock().unwrap().get(key) {
        Some(value) => Lookup::Ready(value.clone()),
        None => Lookup::Pending,
      }
    }
  }

  #[derive(Default)]
  struct CountingChecker {
    calls: AtomicUsize,
  }

  impl ActionConflictChecker for CountingChecker {
    fn find_conflicts(&self, actions: &[Action]) -> BTreeMap<ActionKey, ConflictError> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      OutputConflictChecker.find_conflicts(actions)
    }
  }

  /// Suspends on the first `suspensions` requests, then succeeds.
  #[derive(Default)]
  struct FakeExecutor {
    suspensions: AtomicUsize,
    requested: Mutex<Vec<ExecutionKey>>,
    fail: bool,
  }

  impl ExecutionRequester for FakeExecutor {
    fn request(&self, keys: &[ExecutionKey]) -> Lookup<Result<(), ExecutionFailure>> {
      if self.suspensions.load(Ordering::SeqCst) > 0 {
        self.suspensions.fetch_sub(1, Ordering::SeqCst);
        return Lookup::Pending;
      }
      self.requested.lock().unwrap().extend(keys.iter().cloned());
      if self.fail {
        if let Some(key) = keys.first() {
          return Lookup::Ready(Err(ExecutionFailure {
            key: key.clone(),
            message: "exit 1".to_string(),
          }));
        }
      }
      Lookup::Ready(Ok(()))
    }
  }

  struct Harness {
    analysis: FakeAnalysis,
    checker: CountingChecker,
    executor: FakeExecutor,
    events: RecordingSink,
    packages: FakePackages,
    generation: Generation,
    settings: AnalysisSettings,
    interrupt: Interrupt,
  }

  impl Harness {
    fn new() -> Self {
      Self {
        analysis: FakeAnalysis::default(),
        checker: CountingChecker::default(),
        executor: FakeExecutor::default(),
        events: RecordingSink::new(),
        packages: FakePackages::new(),
        generation: Generation::new(),
        settings: AnalysisSettings::default(),
        interrupt: Interrupt::new(),
      }
    }

    fn driver(&self) -> BuildDriver<'_> {
      BuildDriver::new(DriverEnv {
        analysis: &self.analysis,
        conflicts: &self.checker,
        execution: &self.executor,
        events: &self.events,
        packages: &self.packages,
        generation: &self.generation,
        settings: &self.settings,
        interrupt: &self.interrupt,
      })
    }

    /// Register an analyzed target and return its explicit driver key.
    fn analyzed(&self, target: Target) -> BuildDriverKey {
      let target = Arc::new(target);
      let key = ConfiguredTargetKey::new(target.label.clone(), None);
      let node = ConfiguredNode::new(key.clone(), Arc::clone(&target), None);
      let actions = node.actions.clone();
      let top = TopLevelKey::Target(key);
      self.analysis.add(AnalyzedValue::new(top.clone(), node, actions));
      BuildDriverKey::new(top, true)
    }

    fn events(&self, key: &BuildDriverKey) -> Vec<EventKind> {
      self.events.events_for(&key.top_level)
    }
  }

  fn rule(text: &str, class: &str, outputs: &[&str]) -> Target {
    let mut target = Target::rule(label(text), class);
    if !outputs.is_empty() {
      target.actions.push(ActionTemplate {
        mnemonic: "Build".to_string(),
        outputs: outputs.iter().map(|o| o.to_string()).collect(),
      });
    }
    target
  }

  mod sequence {
    use super::*;

    #[test]
    fn builds_artifacts_and_posts_events_in_order() {
      let harness = Harness::new();
      let key = harness.analyzed(rule("//app:bin", "cc_binary", &["bin"]));

      let value = harness.driver().evaluate(&key).unwrap();
      assert!(!value.is_skipped());
      assert_eq!(value.test_type, TestType::NotTest);
      assert_eq!(
        *harness.executor.requested.lock().unwrap(),
        vec![ExecutionKey::Artifact(crate::action::Artifact("src/app/bin".to_string()))]
      );
      assert_eq!(
        harness.events(&key),
        vec![
          EventKind::TargetAnalyzed,
          EventKind::TargetCompleted {
            test_type: TestType::NotTest
          }
        ]
      );
      assert_eq!(harness.generation.retained(), 0);
    }

    #[test]
    fn missing_analysis_suspends() {
      let harness = Harness::new();
      let key = BuildDriverKey::new(TopLevelKey::Target(ConfiguredTargetKey::new(label("//a:a"), None)), true);
      let halt = harness.driver().evaluate(&key).unwrap_err();
      assert!(halt.is_suspend());
      assert!(harness.events.events().is_empty());
    }

    #[test]
    fn restarts_post_analyzed_once_and_check_conflicts_once() {
      let harness = Harness::new();
      harness.executor.suspensions.store(2, Ordering::SeqCst);
      let key = harness.analyzed(rule("//app:bin", "cc_binary", &["bin"]));
      let driver = harness.driver();

      assert!(driver.evaluate(&key).unwrap_err().is_suspend());
      assert!(driver.evaluate(&key).unwrap_err().is_suspend());
      driver.evaluate(&key).unwrap();

      assert_eq!(harness.checker.calls.load(Ordering::SeqCst), 1);
      let analyzed = harness
        .events(&key)
        .into_iter()
        .filter(|kind| *kind == EventKind::TargetAnalyzed)
        .count();
      assert_eq!(analyzed, 1);
    }

    #[test]
    fn execution_failure_is_reported_and_purged() {
      let mut harness = Harness::new();
      harness.executor.fail = true;
      let key = harness.analyzed(rule("//app:bin", "cc_binary", &["bin"]));
      let err = harness.driver().evaluate(&key).unwrap_err();
      assert!(matches!(err, Halt::Failed(DriverError::Execution(_))));
      assert_eq!(harness.generation.retained(), 0);
    }

    #[test]
    fn interrupt_stops_before_analysis() {
      let harness = Harness::new();
      let key = harness.analyzed(rule("//app:bin", "cc_binary", &[]));
      harness.interrupt.trigger();
      assert_eq!(harness.driver().evaluate(&key), Err(Halt::Interrupted));
      assert_eq!(harness.analysis.calls.load(Ordering::SeqCst), 0);
    }
  }

  mod conflicts {
    use super::*;

    fn conflicting(harness: &Harness) -> BuildDriverKey {
      let target = Arc::new(rule("//app:bin", "cc_binary", &["out"]));
      let key = ConfiguredTargetKey::new(target.label.clone(), None);
      let node = ConfiguredNode::new(key.clone(), Arc::clone(&target), None);
      let other_key = ConfiguredTargetKey::new(label("//app:other"), None);
      let other = Action::from_template(
        &other_key,
        None,
        0,
        &ActionTemplate {
          mnemonic: "Generate".to_string(),
          outputs: vec!["out".to_string()],
        },
      );
      let mut actions = node.actions.clone();
      actions.push(other);
      let top = TopLevelKey::Target(key);
      harness.analysis.add(AnalyzedValue::new(top.clone(), node, actions));
      BuildDriverKey::new(top, true)
    }

    #[test]
    fn conflict_fails_with_transient_error() {
      let harness = Harness::new();
      let key = conflicting(&harness);
      let err = harness.driver().evaluate(&key).unwrap_err();
      let Halt::Failed(error) = err else {
        panic!("expected failure");
      };
      assert!(error.is_transient());
      assert!(matches!(&error, DriverError::ActionConflict { conflicts, .. } if conflicts.len() == 1));
      assert!(
        harness
          .events(&key)
          .iter()
          .any(|kind| matches!(kind, EventKind::ActionConflict { .. }))
      );
      assert!(harness.executor.requested.lock().unwrap().is_empty());
      assert_eq!(harness.generation.retained(), 0);
    }

    #[test]
    fn conflict_is_checked_once_per_generation() {
      let harness = Harness::new();
      let key = conflicting(&harness);
      let driver = harness.driver();
      assert!(driver.evaluate(&key).is_err());
      // Already checked in this generation: not checked again.
      let _ = driver.evaluate(&key);
      assert_eq!(harness.checker.calls.load(Ordering::SeqCst), 1);

      harness.generation.finish();
      assert!(driver.evaluate(&key).is_err());
      assert_eq!(harness.checker.calls.load(Ordering::SeqCst), 2);
    }
  }

  mod tests_classification {
    use super::*;

    fn tagged(tags: &[&str]) -> Target {
      let mut target = rule("//t:unit", "sh_test", &[]);
      target.tags = tags.iter().map(|t| t.to_string()).collect();
      target
    }

    fn value(target: Target) -> (TopLevelKey, AnalyzedValue) {
      let target = Arc::new(target);
      let key = ConfiguredTargetKey::new(target.label.clone(), None);
      let node = ConfiguredNode::new(key.clone(), target, None);
      let top = TopLevelKey::Target(key);
      (top.clone(), AnalyzedValue::new(top, node, Vec::new()))
    }

    #[test]
    fn classifies_by_rule_and_tags() {
      let settings = AnalysisSettings::default();
      let cases = [
        (rule("//t:lib", "cc_library", &[]), TestType::NotTest),
        (tagged(&[]), TestType::Parallel),
        (tagged(&["exclusive"]), TestType::Exclusive),
        (tagged(&["exclusive-if-local"]), TestType::ExclusiveIfLocal),
      ];
      for (target, expected) in cases {
        let (top, value) = value(target);
        assert_eq!(classify_test(&top, &value, &settings), expected);
      }
    }

    #[test]
    fn exclusive_strategy_forces_exclusive() {
      let settings = AnalysisSettings {
        exclusive_test_strategy: true,
        ..AnalysisSettings::default()
      };
      let (top, value) = value(tagged(&[]));
      assert_eq!(classify_test(&top, &value, &settings), TestType::Exclusive);
    }

    #[test]
    fn aspects_are_never_tests() {
      let (top, value) = value(tagged(&[]));
      let aspect = TopLevelKey::Aspect(crate::aspect::AspectKey {
        aspect: "lint".to_string(),
        target: top.target().clone(),
      });
      assert_eq!(
        classify_test(&aspect, &value, &AnalysisSettings::default()),
        TestType::NotTest
      );
    }

    #[test]
    fn parallel_test_is_bundled_with_artifacts() {
      let harness = Harness::new();
      let key = harness.analyzed(tagged(&[]));
      let value = harness.driver().evaluate(&key).unwrap();
      assert_eq!(value.test_type, TestType::Parallel);
      assert!(value.exclusive_test.is_none());
      assert_eq!(
        *harness.executor.requested.lock().unwrap(),
        vec![ExecutionKey::TestCompletion {
          target: key.top_level.target().clone(),
          exclusive: false,
        }]
      );
      assert!(
        harness
          .events(&key)
          .contains(&EventKind::TestAnalyzed { skipped: false })
      );
    }

    #[test]
    fn exclusive_test_is_deferred_then_run() {
      let harness = Harness::new();
      let key = harness.analyzed(tagged(&["exclusive"]));
      let driver = harness.driver();
      let value = driver.evaluate(&key).unwrap();
      assert!(harness.executor.requested.lock().unwrap().is_empty());

      driver.run_exclusive_test(&value).unwrap();
      assert_eq!(
        *harness.executor.requested.lock().unwrap(),
        vec![ExecutionKey::TestCompletion {
          target: key.top_level.target().clone(),
          exclusive: true,
        }]
      );
    }

    #[test]
    fn exclusive_if_local_depends_on_local_execution() {
      let mut harness = Harness::new();
      let key = harness.analyzed(tagged(&["exclusive-if-local"]));
      let value = harness.driver().evaluate(&key).unwrap();
      assert!(value.exclusive_test.is_none());

      harness.generation.finish();
      harness.settings.local_test_execution = true;
      let value = harness.driver().evaluate(&key).unwrap();
      assert!(value.exclusive_test.is_some());
    }
  }

  mod compatibility {
    use super::*;

    fn incompatible(harness: &Harness, explicit: bool) -> BuildDriverKey {
      let mut target = rule("//t:unit", "sh_test", &["unit"]);
      target.incompatible = Some("requires @platforms//os:windows".to_string());
      let mut key = harness.analyzed(target);
      key.explicitly_requested = explicit;
      key
    }

    #[test]
    fn implicit_incompatible_target_is_skipped_before_execution() {
      let harness = Harness::new();
      let key = incompatible(&harness, false);
      let value = harness.driver().evaluate(&key).unwrap();
      assert!(value.is_skipped());
      assert!(harness.executor.requested.lock().unwrap().is_empty());

      let events = harness.events(&key);
      assert!(events.contains(&EventKind::TestAnalyzed { skipped: true }));
      assert!(
        events
          .iter()
          .any(|kind| matches!(kind, EventKind::TargetSkipped { .. }))
      );
      assert_eq!(harness.generation.retained(), 0);
    }

    #[test]
    fn explicit_incompatible_target_fails() {
      let harness = Harness::new();
      let key = incompatible(&harness, true);
      let err = harness.driver().evaluate(&key).unwrap_err();
      assert!(matches!(
        err,
        Halt::Failed(DriverError::Compatibility(
          TargetCompatibilityViolation::IncompatiblePlatform { .. }
        ))
      ));
    }

    #[test]
    fn explicit_incompatible_target_can_be_skipped() {
      let mut harness = Harness::new();
      harness.settings.skip_incompatible_explicit_targets = true;
      let key = incompatible(&harness, true);
      assert!(harness.driver().evaluate(&key).unwrap().is_skipped());
    }

    fn restricted(harness: &mut Harness, explicit: bool) -> BuildDriverKey {
      harness.settings.target_environments = vec![label("//env:linux")];
      let env = Target::new(
        label("//env:posix"),
        TargetKind::Environment {
          fulfills: Vec::<Label>::new(),
        },
      );
      harness.packages = FakePackages::new().with_target(env);
      let mut target = rule("//app:bin", "cc_binary", &["bin"]);
      target.restricted_to = vec![label("//env:posix")];
      let mut key = harness.analyzed(target);
      key.explicitly_requested = explicit;
      key
    }

    #[test]
    fn explicit_target_missing_environment_is_severe() {
      let mut harness = Harness::new();
      let key = restricted(&mut harness, true);
      let err = harness.driver().evaluate(&key).unwrap_err();
      let Halt::Failed(DriverError::Compatibility(TargetCompatibilityViolation::MissingEnvironments {
        environments,
        ..
      })) = err
      else {
        panic!("expected missing environments");
      };
      assert_eq!(environments, vec![label("//env:linux")]);
    }

    #[test]
    fn implicit_target_missing_environment_is_skipped() {
      let mut harness = Harness::new();
      let key = restricted(&mut harness, false);
      let value = harness.driver().evaluate(&key).unwrap();
      assert!(value.skipped.unwrap().contains("//env:linux"));
    }

    #[test]
    fn fulfilled_environment_is_compatible() {
      let mut harness = Harness::new();
      harness.settings.target_environments = vec![label("//env:linux")];
      let env = Target::new(
        label("//env:posix"),
        TargetKind::Environment {
          fulfills: vec![label("//env:linux")],
        },
      );
      harness.packages = FakePackages::new().with_target(env);
      let mut target = rule("//app:bin", "cc_binary", &["bin"]);
      target.restricted_to = vec![label("//env:posix")];
      let key = harness.analyzed(target);
      assert!(!harness.driver().evaluate(&key).unwrap().is_skipped());
    }

    #[test]
    fn environment_lookup_suspends_until_loaded() {
      let mut harness = Harness::new();
      let key = restricted(&mut harness, false);
      harness.packages = FakePackages::new().deferred();
      let halt = harness.driver().evaluate(&key).unwrap_err();
      assert!(halt.is_suspend());
      // Compatibility is retained only once decided.
      assert!(harness.generation.compatibility(&key.top_level).is_none());
    }
  }
}
