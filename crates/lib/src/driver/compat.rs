//! Platform and environment compatibility of top-level targets.

use std::collections::BTreeSet;

use tracing::debug;

use super::types::{AnalyzedValue, BuildDriverKey, DriverError, TargetCompatibilityViolation};
use crate::env::DriverEnv;
use crate::eval::{Eval, Halt};
use crate::label::Label;
use crate::node::AnalysisFailure;
use crate::target::{RootCause, TargetKind};

/// Outcome of the compatibility checks for one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compatibility {
  Compatible,
  /// Not built, and not an error. Carries the reason.
  Skip(String),
}

/// Check the platform and the required environments.
///
/// Incompatible targets that were not explicitly requested are skipped.
/// Explicit ones fail, unless the settings ask to skip them too. Missing
/// environments on an explicit target are always fatal for that key.
pub fn check_compatibility(
  env: &DriverEnv<'_>,
  key: &BuildDriverKey,
  value: &AnalyzedValue,
) -> Eval<Compatibility, DriverError> {
  let label = key.top_level.label();

  if let Some(reason) = &value.incompatible {
    if key.explicitly_requested && !env.settings.skip_incompatible_explicit_targets {
      return Err(Halt::Failed(DriverError::from(
        TargetCompatibilityViolation::IncompatiblePlatform {
          label: label.clone(),
          reason: reason.clone(),
        },
      )));
    }
    debug!(target = %label, reason = %reason, "skipping incompatible target");
    return Ok(Compatibility::Skip(format!("incompatible with the target platform: {reason}")));
  }

  let missing = missing_environments(env, label, value)?;
  if missing.is_empty() {
    return Ok(Compatibility::Compatible);
  }
  if key.explicitly_requested {
    return Err(Halt::Failed(DriverError::from(
      TargetCompatibilityViolation::MissingEnvironments {
        label: label.clone(),
        environments: missing,
      },
    )));
  }
  let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
  Ok(Compatibility::Skip(format!("missing environment(s): {}", names.join(", "))))
}

/// Required environments the target neither lists nor fulfills.
///
/// An unrestricted target supports every environment. Otherwise each
/// environment it is restricted to counts, plus everything that
/// environment fulfills, which means fetching the environment targets.
fn missing_environments(env: &DriverEnv<'_>, label: &Label, value: &AnalyzedValue) -> Eval<Vec<Label>, DriverError> {
  let required = &env.settings.target_environments;
  if required.is_empty() || value.restricted_to.is_empty() {
    return Ok(Vec::new());
  }

  let mut causes: Vec<RootCause> = Vec::new();
  let environments = match env.fetcher().targets(label, &value.restricted_to, &mut causes) {
    Ok(environments) => environments,
    Err(pending) => return Err(Halt::Suspend(pending)),
  };
  if !causes.is_empty() {
    return Err(Halt::Failed(DriverError::from(AnalysisFailure {
      label: label.clone(),
      message: "cannot load restricted environments".to_string(),
      root_causes: causes,
    })));
  }

  let mut supported: BTreeSet<&Label> = value.restricted_to.iter().collect();
  for target in environments.values() {
    if let TargetKind::Environment { fulfills } = &target.kind {
      supported.extend(fulfills.iter());
    }
  }

  Ok(
    required
      .iter()
      .filter(|environment| !supported.contains(environment))
      .cloned()
      .collect(),
  )
}
