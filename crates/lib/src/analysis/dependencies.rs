//! Attribute edges of one configured target.
//!
//! For every attribute: fetch the referenced targets, build one
//! [`DependencyKey`] per label, resolve the keys to configurations, then run
//! the prerequisite resolver once per label to get merged configured nodes.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::trace;

use super::error::AnalysisError;
use crate::config::{Configuration, ConfigurationResolver};
use crate::consts::VISIBILITY_ATTRIBUTE;
use crate::dependency::{Dependency, DependencyKey, DependencyKind};
use crate::env::ResolutionEnv;
use crate::eval::{Eval, Halt, Pending};
use crate::node::ConfiguredNode;
use crate::prereq::{AttributeConfiguration, PrerequisiteOutcome, PrerequisiteResolver, Progress};
use crate::target::{RootCauseHook, Target};
use crate::transition::Transition;

pub struct DependencyResolver<'a> {
  env: ResolutionEnv<'a>,
  target: &'a Target,
  configuration: &'a Arc<Configuration>,
}

impl<'a> DependencyResolver<'a> {
  pub fn new(env: ResolutionEnv<'a>, target: &'a Target, configuration: &'a Arc<Configuration>) -> Self {
    Self {
      env,
      target,
      configuration,
    }
  }

  pub fn kind(&self, attribute: &str) -> DependencyKind {
    if attribute == VISIBILITY_ATTRIBUTE {
      return DependencyKind::Visibility;
    }
    let split = self
      .target
      .attribute_transitions
      .get(attribute)
      .filter(|transition| matches!(transition, Transition::Split(_)))
      .cloned();
    DependencyKind::Attribute {
      name: attribute.to_string(),
      split,
    }
  }

  /// Configured dependencies of `attribute`, in declaration order.
  ///
  /// Labels that fail to load are reported to `hook` and left out.
  /// Non-configurable targets get a `Null` transition. A label listed twice
  /// is an error: its outputs could not be told apart per edge.
  pub fn resolve_attribute(&self, attribute: &str, hook: &mut dyn RootCauseHook) -> Eval<Vec<Dependency>, AnalysisError> {
    let Some(labels) = self.target.attributes.get(attribute) else {
      return Ok(Vec::new());
    };
    let mut seen = BTreeSet::new();
    if let Some(repeated) = labels.iter().find(|label| !seen.insert(*label)) {
      return Err(Halt::Failed(AnalysisError::DuplicateLabel {
        target: self.target.label.clone(),
        attribute: attribute.to_string(),
        label: repeated.clone(),
      }));
    }
    let targets = match self.env.fetcher().targets(&self.target.label, labels, hook) {
      Ok(targets) => targets,
      Err(pending) => return Err(Halt::Suspend(pending)),
    };

    let transition = self
      .target
      .attribute_transitions
      .get(attribute)
      .cloned()
      .unwrap_or(Transition::NoTransition);
    let aspects = self.target.attribute_aspects.get(attribute).cloned().unwrap_or_default();
    let keys: Vec<DependencyKey> = labels
      .iter()
      .filter_map(|label| {
        let dependency = targets.get(label)?;
        let transition = if dependency.is_configurable() {
          transition.clone()
        } else {
          Transition::Null
        };
        Some(
          DependencyKey::new(label.clone())
            .with_transition(transition)
            .with_aspects(aspects.clone()),
        )
      })
      .collect();

    trace!(target = %self.target.label, attribute, edges = keys.len(), "resolving attribute");
    ConfigurationResolver::new(self.env, &self.target.label, self.configuration)
      .resolve_all(&self.kind(attribute), &keys)
      .map_err(|halt| halt.map_failed(AnalysisError::from))
  }

  /// Merged configured nodes for resolved `dependencies` of `attribute`.
  ///
  /// Runs one prerequisite resolver per label, so `dependencies` must hold
  /// each label's outputs contiguously and each label once, as
  /// [`DependencyResolver::resolve_attribute`] returns them. Every label is
  /// stepped before suspending so one suspension covers the whole attribute.
  pub fn resolve_prerequisites(
    &self,
    attribute: &str,
    dependencies: &[Dependency],
  ) -> Eval<Vec<ConfiguredNode>, AnalysisError> {
    let kind = self.kind(attribute);
    let mut pending = Pending::new();
    let mut nodes = Vec::with_capacity(dependencies.len());
    for group in dependencies.chunk_by(|a, b| a.label == b.label) {
      let first = &group[0];
      let mut resolver = PrerequisiteResolver::new(
        self.target.label.clone(),
        Some(Arc::clone(self.configuration)),
        first.label.clone(),
        AttributeConfiguration::from_dependencies(&kind, group),
      )
      .with_execution_platform(first.execution_platform.clone())
      .with_aspects(first.aspects.clone());

      let mut outcome: Option<PrerequisiteOutcome> = None;
      match resolver.step(self.env, &mut outcome) {
        Progress::Done => {}
        Progress::Suspended(missing) => {
          pending.merge(missing);
          continue;
        }
        Progress::Interrupted => return Err(Halt::Interrupted),
      }
      match outcome {
        Some(PrerequisiteOutcome::Prerequisites(found)) => nodes.extend(found),
        Some(PrerequisiteOutcome::Visibility(error)) => return Err(Halt::Failed(error.into())),
        Some(PrerequisiteOutcome::Creation(error)) => return Err(Halt::Failed(error.into())),
        Some(PrerequisiteOutcome::Aspect(error)) => return Err(Halt::Failed(error.into())),
        None => {}
      }
    }
    if !pending.is_empty() {
      return Err(Halt::Suspend(pending));
    }
    Ok(nodes)
  }
}
