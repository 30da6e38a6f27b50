//! Label to target resolution.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::cause::{LoadingFailureKind, RootCause, RootCauseHook};
use super::types::{Package, PackageLoadError, Target, TargetKind};
use crate::config::OptionValue;
use crate::env::PackageStore;
use crate::eval::{Eval, Halt, Lookup, Pending};
use crate::label::{Label, PackageId};
use crate::transition::{SettingDefaults, TransitionError};

/// Resolves labels to target definitions through the package store.
#[derive(Clone, Copy)]
pub struct TargetFetcher<'a> {
  packages: &'a dyn PackageStore,
}

impl<'a> TargetFetcher<'a> {
  pub fn new(packages: &'a dyn PackageStore) -> Self {
    Self { packages }
  }

  /// Targets for every label reachable from `from`.
  ///
  /// Every distinct owning package is requested before returning, so one
  /// suspension reports all missing packages. Load failures do not stop the
  /// batch: they go to `hook` as loading root causes on the `from -> label`
  /// edge and the label is left out of the result.
  pub fn targets(
    &self,
    from: &Label,
    labels: &[Label],
    hook: &mut dyn RootCauseHook,
  ) -> Result<BTreeMap<Label, Arc<Target>>, Pending> {
    let mut packages: BTreeMap<PackageId, Lookup<Result<Arc<Package>, PackageLoadError>>> = BTreeMap::new();
    let mut pending = Pending::new();
    for label in labels {
      let id = label.package_id();
      if packages.contains_key(&id) {
        continue;
      }
      let lookup = self.packages.package(&id);
      if lookup.is_pending() {
        pending.request(format!("package {id}"));
      }
      packages.insert(id, lookup);
    }

    let mut found = BTreeMap::new();
    for label in labels {
      let resolved = match packages.get(&label.package_id()) {
        Some(Lookup::Ready(Ok(package))) => package.target(label.name()),
        Some(Lookup::Ready(Err(error))) => Err(error.clone()),
        Some(Lookup::Pending) | None => continue,
      };
      match resolved {
        Ok(target) => {
          found.insert(label.clone(), target);
        }
        Err(error) => hook.report(loading_cause(from, label, &error)),
      }
    }

    if pending.is_empty() { Ok(found) } else { Err(pending) }
  }

  /// The target for a single label.
  pub fn target(&self, label: &Label) -> Lookup<Result<Arc<Target>, PackageLoadError>> {
    self
      .packages
      .package(&label.package_id())
      .map(|package| package.and_then(|package| package.target(label.name())))
  }
}

/// Classify a load error as a root cause on the `from -> to` edge.
pub fn loading_cause(from: &Label, to: &Label, error: &PackageLoadError) -> RootCause {
  let kind = if error.is_repository_fetch() {
    LoadingFailureKind::RepositoryFetch
  } else {
    LoadingFailureKind::TargetDefinition
  };
  let culprit = if error.pertains_to(to) {
    to.to_string()
  } else {
    error.subject()
  };
  debug!(from = %from, to = %to, culprit = %culprit, error = %error, "dependency failed to load");
  RootCause::Loading {
    from: from.clone(),
    to: to.clone(),
    culprit,
    kind,
    message: error.to_string(),
  }
}

impl SettingDefaults for TargetFetcher<'_> {
  fn setting_defaults(&self, transition: &str, settings: &[String]) -> Eval<BTreeMap<String, OptionValue>, TransitionError> {
    let setting_error = |setting: &str, message: String| TransitionError::BuildSetting {
      transition: transition.to_string(),
      setting: setting.to_string(),
      message,
    };

    let mut pending = Pending::new();
    let mut defaults = BTreeMap::new();
    for setting in settings {
      let label = Label::parse(setting).map_err(|e| setting_error(setting, e.to_string()))?;
      match self.target(&label) {
        Lookup::Pending => pending.request(format!("package {}", label.package_id())),
        Lookup::Ready(Err(error)) => return Err(Halt::Failed(setting_error(setting, error.to_string()))),
        Lookup::Ready(Ok(target)) => match &target.kind {
          TargetKind::BuildSetting { default } => {
            defaults.insert(setting.clone(), default.clone());
          }
          _ => return Err(Halt::Failed(setting_error(setting, "not a build setting".to_string()))),
        },
      }
    }

    if !pending.is_empty() {
      return Err(Halt::Suspend(pending));
    }
    Ok(defaults)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{FakePackages, label};

  fn fetch(store: &FakePackages, labels: &[&str]) -> (Result<BTreeMap<Label, Arc<Target>>, Pending>, Vec<RootCause>) {
    let from = label("//app:main");
    let labels: Vec<Label> = labels.iter().map(|l| label(l)).collect();
    let mut causes = Vec::new();
    let result = TargetFetcher::new(store).targets(&from, &labels, &mut causes);
    (result, causes)
  }

  #[test]
  fn resolves_labels_across_packages() {
    let store = FakePackages::new().rule("//a:x", "cc_library").rule("//b:y", "cc_library");
    let (result, causes) = fetch(&store, &["//a:x", "//b:y"]);
    let targets = result.unwrap();
    assert_eq!(targets.len(), 2);
    assert!(causes.is_empty());
  }

  #[test]
  fn requests_every_missing_package_in_one_round() {
    let store = FakePackages::new().rule("//a:x", "cc_library").deferred();
    let (result, _) = fetch(&store, &["//a:x", "//b:y", "//a:z"]);
    let pending = result.unwrap_err();
    assert_eq!(pending.keys(), ["package //a", "package //b"]);
  }

  #[test]
  fn missing_target_is_a_root_cause_not_an_error() {
    let store = FakePackages::new().rule("//a:x", "cc_library");
    let (result, causes) = fetch(&store, &["//a:x", "//a:missing"]);
    let targets = result.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(causes.len(), 1);
    let RootCause::Loading { to, culprit, kind, .. } = &causes[0] else {
      panic!("expected loading cause");
    };
    assert_eq!(to, &label("//a:missing"));
    assert_eq!(culprit, "//a:missing");
    assert_eq!(*kind, LoadingFailureKind::TargetDefinition);
  }

  #[test]
  fn repository_fetch_failures_are_classified() {
    let store = FakePackages::new().failing(
      "@ext//lib",
      PackageLoadError::RepositoryFetch {
        repo: "ext".to_string(),
        message: "offline".to_string(),
      },
    );
    let (result, causes) = fetch(&store, &["@ext//lib:z"]);
    assert!(result.unwrap().is_empty());
    assert!(matches!(
      &causes[0],
      RootCause::Loading {
        kind: LoadingFailureKind::RepositoryFetch,
        ..
      }
    ));
  }

  #[test]
  fn errors_about_other_packages_name_the_culprit() {
    let store = FakePackages::new().failing(
      "//broken",
      PackageLoadError::BuildFile {
        package: PackageId::main("defs"),
        message: "syntax error".to_string(),
      },
    );
    let (_, causes) = fetch(&store, &["//broken:t"]);
    let RootCause::Loading { culprit, .. } = &causes[0] else {
      panic!("expected loading cause");
    };
    assert_eq!(culprit, "//defs");
  }

  #[test]
  fn setting_defaults_come_from_build_setting_targets() {
    let store = FakePackages::new().setting("//settings:flavor", OptionValue::from("plain"));
    let fetcher = TargetFetcher::new(&store);
    let defaults = fetcher
      .setting_defaults("t", &["//settings:flavor".to_string()])
      .unwrap();
    assert_eq!(defaults.get("//settings:flavor"), Some(&OptionValue::from("plain")));

    let err = fetcher.setting_defaults("t", &["not-a-label".to_string()]).unwrap_err();
    assert!(matches!(err, Halt::Failed(TransitionError::BuildSetting { .. })));
  }
}
