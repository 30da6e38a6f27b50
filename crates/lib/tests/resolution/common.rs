//! Shared setup for the end-to-end tests.

use std::collections::BTreeMap;

use trellis_lib::aspect::Aspect;
use trellis_lib::config::BuildOptions;
use trellis_lib::driver::BuildDriverKey;
use trellis_lib::label::Label;
use trellis_lib::session::Session;
use trellis_lib::settings::AnalysisSettings;
use trellis_lib::store::InMemoryStores;
use trellis_lib::target::{ActionTemplate, Target};
use trellis_lib::transition::Transition;

pub fn label(text: &str) -> Label {
  Label::parse(text).unwrap()
}

/// A rule with one `Build` action producing `outputs`.
pub fn rule(text: &str, class: &str, outputs: &[&str]) -> Target {
  let mut target = Target::rule(label(text), class);
  if !outputs.is_empty() {
    target.actions.push(ActionTemplate {
      mnemonic: "Build".to_string(),
      outputs: outputs.iter().map(|o| o.to_string()).collect(),
    });
  }
  target
}

/// Point `attribute` at `deps`, which may be relative to the target's package.
pub fn with_deps(mut target: Target, attribute: &str, deps: &[&str]) -> Target {
  let package = target.label.package_id();
  let labels = deps
    .iter()
    .map(|dep| Label::parse_relative(dep, &package).unwrap())
    .collect();
  target.attributes.insert(attribute.to_string(), labels);
  target
}

/// One request per label, all explicitly requested.
pub fn requests(session: &Session<'_>, labels: &[&str]) -> Vec<BuildDriverKey> {
  labels
    .iter()
    .map(|text| BuildDriverKey::new(session.target_key(label(text)), true))
    .collect()
}

/// Split on `cpu`, one branch per value, keyed by the value.
pub fn cpu_split(cpus: &[&str]) -> Transition {
  Transition::split_options(
    cpus
      .iter()
      .map(|cpu| (cpu.to_string(), BuildOptions::new().with("cpu", *cpu)))
      .collect(),
  )
}

/// Stores and aspects a session borrows.
pub struct World {
  pub stores: InMemoryStores,
  pub aspects: BTreeMap<String, Aspect>,
  pub root: BuildOptions,
}

impl World {
  pub fn new(deferred: bool) -> Self {
    Self::with_settings(deferred, AnalysisSettings::default())
  }

  pub fn with_settings(deferred: bool, settings: AnalysisSettings) -> Self {
    let stores = if deferred {
      InMemoryStores::deferred(settings)
    } else {
      InMemoryStores::new(settings)
    };
    Self {
      stores,
      aspects: BTreeMap::new(),
      root: BuildOptions::new().with("cpu", "k8"),
    }
  }

  pub fn target(mut self, target: Target) -> Self {
    self.stores.packages.add_target(target);
    self
  }

  pub fn aspect(mut self, aspect: Aspect) -> Self {
    self.aspects.insert(aspect.name.clone(), aspect);
    self
  }

  pub fn session(&self) -> Session<'_> {
    let root = self.stores.configurations.intern(self.root.clone()).unwrap();
    Session::new(&self.stores, root, &self.aspects)
  }
}
