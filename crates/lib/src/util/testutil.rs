//! Helpers and fake collaborators for unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{BuildOptions, Configuration, OptionValue};
use crate::consts::DEFAULT_PLATFORM_MAPPINGS;
use crate::env::{PackageStore, ResolutionEnv, TransitionInterpreter};
use crate::eval::{Eval, Halt, Lookup, Pending};
use crate::label::{Label, PackageId};
use crate::settings::AnalysisSettings;
use crate::store::InMemoryStores;
use crate::target::{Package, PackageLoadError, Target, TargetKind};
use crate::transition::{SettingDefaults, Transition, TransitionError, TransitionOutputs, UserTransition};

pub fn label(text: &str) -> Label {
  Label::parse(text).unwrap()
}

/// A split transition setting `cpu` per branch.
pub fn split(branches: &[(&str, &str)]) -> Transition {
  let branches = branches
    .iter()
    .map(|(key, cpu)| (key.to_string(), BuildOptions::new().with("cpu", *cpu)))
    .collect();
  Transition::split_options(branches)
}

/// In-memory stores plus shortcuts for the resolver tests.
pub struct Fixture {
  pub stores: InMemoryStores,
}

impl Fixture {
  pub fn new() -> Self {
    Self {
      stores: InMemoryStores::new(AnalysisSettings::default()),
    }
  }

  /// Every lookup suspends until `stores.settle()`.
  pub fn deferred() -> Self {
    Self {
      stores: InMemoryStores::deferred(AnalysisSettings::default()),
    }
  }

  /// Eager stores whose default platform mapping file holds `text`.
  pub fn with_mapping(text: &str) -> Self {
    let mut fixture = Self::new();
    fixture.stores.mappings.add(DEFAULT_PLATFORM_MAPPINGS, text);
    fixture
  }

  pub fn target(mut self, target: Target) -> Self {
    self.stores.packages.add_target(target);
    self
  }

  /// An interned configuration, created immediately.
  pub fn configuration(&self, options: BuildOptions) -> Arc<Configuration> {
    self.stores.configurations.intern(options).unwrap()
  }

  pub fn env(&self) -> ResolutionEnv<'_> {
    self.stores.env()
  }
}

/// A package store built in the test, optionally stuck pending forever.
#[derive(Default)]
pub struct FakePackages {
  packages: BTreeMap<PackageId, Package>,
  failures: BTreeMap<PackageId, PackageLoadError>,
  deferred: bool,
}

impl FakePackages {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_target(mut self, target: Target) -> Self {
    let id = target.label.package_id();
    self.packages.entry(id.clone()).or_insert_with(|| Package::new(id)).add(target);
    self
  }

  pub fn rule(self, text: &str, rule_class: &str) -> Self {
    self.with_target(Target::rule(label(text), rule_class))
  }

  pub fn setting(self, text: &str, default: OptionValue) -> Self {
    self.with_target(Target::new(label(text), TargetKind::BuildSetting { default }))
  }

  pub fn failing(mut self, package: &str, error: PackageLoadError) -> Self {
    self.failures.insert(PackageId::parse(package).unwrap(), error);
    self
  }

  /// Answer every lookup with `Pending`.
  pub fn deferred(mut self) -> Self {
    self.deferred = true;
    self
  }
}

impl PackageStore for FakePackages {
  fn package(&self, id: &PackageId) -> Lookup<Result<Arc<Package>, PackageLoadError>> {
    if self.deferred {
      return Lookup::Pending;
    }
    if let Some(error) = self.failures.get(id) {
      return Lookup::Ready(Err(error.clone()));
    }
    Lookup::Ready(match self.packages.get(id) {
      Some(package) => Ok(Arc::new(package.clone())),
      None => Err(PackageLoadError::NoSuchPackage {
        package: id.clone(),
        message: "not in test store".to_string(),
      }),
    })
  }
}

/// Returns fixed outputs and counts invocations.
pub struct CountingInterpreter {
  outputs: TransitionOutputs,
  calls: AtomicUsize,
  last_inputs: Mutex<BTreeMap<String, OptionValue>>,
}

impl CountingInterpreter {
  pub fn returning(outputs: TransitionOutputs) -> Self {
    Self {
      outputs,
      calls: AtomicUsize::new(0),
      last_inputs: Mutex::new(BTreeMap::new()),
    }
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn last_inputs(&self) -> BTreeMap<String, OptionValue> {
    self.last_inputs.lock().unwrap().clone()
  }
}

impl TransitionInterpreter for CountingInterpreter {
  fn evaluate(
    &self,
    _transition: &UserTransition,
    _options: &BuildOptions,
    inputs: &BTreeMap<String, OptionValue>,
  ) -> Result<TransitionOutputs, TransitionError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    *self.last_inputs.lock().unwrap() = inputs.clone();
    Ok(self.outputs.clone())
  }
}

/// Setting defaults that are either all missing or all fixed.
pub struct FixedDefaults(Option<BTreeMap<String, OptionValue>>);

impl FixedDefaults {
  pub fn pending() -> Self {
    Self(None)
  }

  pub fn ready(values: &[(&str, &str)]) -> Self {
    Self(Some(
      values
        .iter()
        .map(|(name, value)| (name.to_string(), OptionValue::from(*value)))
        .collect(),
    ))
  }
}

impl SettingDefaults for FixedDefaults {
  fn setting_defaults(&self, _transition: &str, settings: &[String]) -> Eval<BTreeMap<String, OptionValue>, TransitionError> {
    let Some(values) = &self.0 else {
      let mut pending = Pending::new();
      for setting in settings {
        pending.request(format!("setting {setting}"));
      }
      return Err(Halt::Suspend(pending));
    };
    Ok(
      settings
        .iter()
        .filter_map(|name| values.get(name).map(|value| (name.clone(), value.clone())))
        .collect(),
    )
  }
}

/// No setting has a default.
pub struct NoDefaults;

impl SettingDefaults for NoDefaults {
  fn setting_defaults(&self, _transition: &str, _settings: &[String]) -> Eval<BTreeMap<String, OptionValue>, TransitionError> {
    Ok(BTreeMap::new())
  }
}
