//! Prerequisite resolution.
//!
//! Turns one prerequisite label plus its [`AttributeConfiguration`] into
//! merged configured nodes. The resolver is an explicit state machine:
//!
//! - `Start`: one slot per requested configuration
//! - `AwaitConfiguredTargets`: fill every slot, fail fast on any error
//! - `AwaitAspects`: apply and merge the applicable aspects per slot
//! - `Done`: exactly one outcome has been sent to the sink
//!
//! Filled slots live in the resolver itself, so re-entering [`step`] after a
//! suspension resumes where it stopped instead of starting over.
//!
//! [`step`]: PrerequisiteResolver::step

pub mod types;

use std::sync::Arc;

use tracing::{debug, trace};

use crate::aspect::{Aspect, AspectValue, applicable_aspects};
use crate::config::{Configuration, ConfigurationResolver};
use crate::dependency::{DependencyKey, DependencyKind};
use crate::env::ResolutionEnv;
use crate::eval::{Halt, Lookup, Pending};
use crate::label::Label;
use crate::node::{ConfiguredNode, ConfiguredTargetKey};
use crate::target::{RootCause, Target, loading_cause};

pub use types::{
  AttributeConfiguration, CreationError, PrerequisiteOutcome, PrerequisiteSink, VisibilityError,
};

/// Result of one call to [`PrerequisiteResolver::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
  /// An outcome was delivered to the sink.
  Done,
  /// Values are missing; call `step` again once they exist.
  Suspended(Pending),
  Interrupted,
}

enum Step {
  Continue,
  Done,
  Suspend(Pending),
  Interrupted,
}

#[derive(Debug, Clone)]
struct SlotRequest {
  transition_key: Option<String>,
  configuration: Option<Arc<Configuration>>,
}

#[derive(Debug)]
enum State {
  Start,
  AwaitConfiguredTargets,
  AwaitAspects {
    nodes: Vec<ConfiguredNode>,
    applicable: Option<Vec<Aspect>>,
  },
  Done,
}

/// Resolves one prerequisite label of one parent target.
#[derive(Debug)]
pub struct PrerequisiteResolver {
  parent: Label,
  parent_configuration: Option<Arc<Configuration>>,
  label: Label,
  execution_platform: Option<Label>,
  attribute: AttributeConfiguration,
  aspects: Vec<Aspect>,
  state: State,
  requests: Vec<SlotRequest>,
  slots: Vec<Option<ConfiguredNode>>,
}

impl PrerequisiteResolver {
  pub fn new(
    parent: Label,
    parent_configuration: Option<Arc<Configuration>>,
    label: Label,
    attribute: AttributeConfiguration,
  ) -> Self {
    Self {
      parent,
      parent_configuration,
      label,
      execution_platform: None,
      attribute,
      aspects: Vec::new(),
      state: State::Start,
      requests: Vec::new(),
      slots: Vec::new(),
    }
  }

  pub fn with_execution_platform(mut self, platform: Option<Label>) -> Self {
    self.execution_platform = platform;
    self
  }

  pub fn with_aspects(mut self, aspects: Vec<Aspect>) -> Self {
    self.aspects = aspects;
    self
  }

  pub fn label(&self) -> &Label {
    &self.label
  }

  pub fn is_done(&self) -> bool {
    matches!(self.state, State::Done)
  }

  /// Advance as far as possible.
  pub fn step(&mut self, env: ResolutionEnv<'_>, sink: &mut dyn PrerequisiteSink) -> Progress {
    loop {
      if self.is_done() {
        return Progress::Done;
      }
      if env.interrupt.is_triggered() {
        return Progress::Interrupted;
      }
      let next = match self.state {
        State::Start => {
          self.start();
          Step::Continue
        }
        State::AwaitConfiguredTargets => self.fill_slots(env, sink),
        State::AwaitAspects { .. } => self.apply_aspects(env, sink),
        State::Done => Step::Done,
      };
      match next {
        Step::Continue => {}
        Step::Done => return Progress::Done,
        Step::Suspend(pending) => return Progress::Suspended(pending),
        Step::Interrupted => return Progress::Interrupted,
      }
    }
  }

  fn start(&mut self) {
    self.requests = match &self.attribute {
      AttributeConfiguration::Visibility => vec![SlotRequest {
        transition_key: None,
        configuration: None,
      }],
      AttributeConfiguration::Unary(configuration) => vec![SlotRequest {
        transition_key: None,
        configuration: configuration.clone(),
      }],
      AttributeConfiguration::Split(split) => split
        .iter()
        .map(|(key, configuration)| SlotRequest {
          transition_key: Some(key.clone()),
          configuration: configuration.clone(),
        })
        .collect(),
    };
    self.slots = vec![None; self.requests.len()];
    trace!(parent = %self.parent, label = %self.label, slots = self.slots.len(), "prerequisite started");
    self.state = State::AwaitConfiguredTargets;
  }

  /// Fill every empty slot, failing fast on the first error.
  fn fill_slots(&mut self, env: ResolutionEnv<'_>, sink: &mut dyn PrerequisiteSink) -> Step {
    let target = match env.fetcher().target(&self.label) {
      Lookup::Pending => return Step::Suspend(Pending::of(format!("package {}", self.label.package_id()))),
      Lookup::Ready(Err(error)) => {
        let cause = loading_cause(&self.parent, &self.label, &error);
        self.fail_creation(sink, None, error.to_string(), vec![cause]);
        return Step::Done;
      }
      Lookup::Ready(Ok(target)) => target,
    };

    if matches!(self.attribute, AttributeConfiguration::Visibility) && !target.is_package_group() {
      self.state = State::Done;
      sink.accept_visibility_error(VisibilityError {
        parent: self.parent.clone(),
        label: self.label.clone(),
        reason: "visibility must name a package group".to_string(),
      });
      return Step::Done;
    }

    let mut pending = Pending::new();
    for index in 0..self.requests.len() {
      if self.slots[index].is_some() {
        continue;
      }
      let request = self.requests[index].clone();
      match self.configured_target(env, &target, &request) {
        Ok(node) => self.slots[index] = Some(node),
        Err(Halt::Suspend(missing)) => pending.merge(missing),
        Err(Halt::Interrupted) => return Step::Interrupted,
        Err(Halt::Failed(error)) => {
          self.state = State::Done;
          debug!(parent = %self.parent, label = %self.label, error = %error, "prerequisite failed");
          sink.accept_creation_error(error);
          return Step::Done;
        }
      }
    }
    if !pending.is_empty() {
      return Step::Suspend(pending);
    }

    let nodes = self.cleanup(self.slots.iter().flatten().cloned().collect());
    self.state = State::AwaitAspects {
      nodes,
      applicable: None,
    };
    Step::Continue
  }

  /// One sub-computation: the configured node for one slot.
  fn configured_target(
    &self,
    env: ResolutionEnv<'_>,
    target: &Arc<Target>,
    request: &SlotRequest,
  ) -> Result<ConfiguredNode, Halt<CreationError>> {
    let configuration = match (&request.configuration, target.is_configurable()) {
      (Some(configuration), true) => Some(self.incoming(env, target, configuration)?),
      _ => None,
    };

    let mut key = ConfiguredTargetKey::new(self.label.clone(), configuration.as_deref());
    key.execution_platform = self.execution_platform.clone();

    match env.configured_targets.configured_target(&key, target, configuration.as_ref()) {
      Lookup::Pending => Err(Halt::Suspend(Pending::of(format!("configured target {key}")))),
      Lookup::Ready(Err(failure)) => Err(Halt::Failed(CreationError {
        parent: self.parent.clone(),
        label: self.label.clone(),
        configuration: configuration.as_ref().map(|c| c.short_id()),
        message: failure.message,
        root_causes: failure.root_causes,
      })),
      Lookup::Ready(Ok(node)) => {
        let mut node = node.as_ref().clone();
        node.transition_keys = request.transition_key.iter().cloned().collect();
        Ok(node)
      }
    }
  }

  /// Apply the target's own incoming transition, if any.
  fn incoming(
    &self,
    env: ResolutionEnv<'_>,
    target: &Target,
    configuration: &Arc<Configuration>,
  ) -> Result<Arc<Configuration>, Halt<CreationError>> {
    let Some(transition) = &target.incoming_transition else {
      return Ok(Arc::clone(configuration));
    };
    let resolver = ConfigurationResolver::new(env, &self.label, configuration);
    let key = DependencyKey::new(self.label.clone()).with_transition(transition.clone());
    let resolved = resolver.resolve(&DependencyKind::Incoming, &key).map_err(|halt| {
      halt.map_failed(|error| CreationError {
        parent: self.parent.clone(),
        label: self.label.clone(),
        configuration: Some(configuration.short_id()),
        message: error.to_string(),
        root_causes: Vec::new(),
      })
    })?;
    match resolved.as_slice() {
      [dependency] => Ok(dependency.configuration.clone().unwrap_or_else(|| Arc::clone(configuration))),
      _ => Err(Halt::Failed(CreationError {
        parent: self.parent.clone(),
        label: self.label.clone(),
        configuration: Some(configuration.short_id()),
        message: format!("incoming transition {transition} must produce exactly one configuration"),
        root_causes: Vec::new(),
      })),
    }
  }

  /// Normalize filled slots before aspects are applied.
  fn cleanup(&self, mut nodes: Vec<ConfiguredNode>) -> Vec<ConfiguredNode> {
    if nodes.len() == 1 {
      let same = match (&nodes[0].configuration, &self.parent_configuration) {
        (Some(mine), Some(parent)) => mine.options() == parent.options(),
        _ => false,
      };
      if same {
        nodes[0].transition_keys.clear();
      }
      return nodes;
    }

    if nodes.first().is_some_and(|first| first.configuration.is_none()) {
      assert!(
        nodes.iter().all(|node| node.configuration.is_none()),
        "split of {} mixes configured and configuration-less outputs",
        self.label
      );
      let keys: Vec<String> = nodes.iter().flat_map(|node| node.transition_keys.clone()).collect();
      nodes.truncate(1);
      nodes[0].transition_keys = keys;
      return nodes;
    }

    nodes.sort_by(|a, b| {
      let order = |node: &ConfiguredNode| node.configuration.as_ref().map(|c| (c.mnemonic().to_string(), c.checksum().clone()));
      order(a).cmp(&order(b))
    });
    nodes
  }

  fn apply_aspects(&mut self, env: ResolutionEnv<'_>, sink: &mut dyn PrerequisiteSink) -> Step {
    let State::AwaitAspects { nodes, applicable } = std::mem::replace(&mut self.state, State::Done) else {
      return Step::Done;
    };

    if self.aspects.is_empty() || nodes.is_empty() {
      self.finish(sink, nodes);
      return Step::Done;
    }

    // Every slot shares the same target, so any one node decides applicability.
    let aspects = match applicable {
      Some(aspects) => aspects,
      None => match applicable_aspects(&self.aspects, &nodes[0].target.advertised_providers()) {
        Ok(aspects) => aspects,
        Err(error) => {
          sink.accept_aspect_error(error);
          return Step::Done;
        }
      },
    };

    let mut pending = Pending::new();
    let mut values: Vec<Vec<AspectValue>> = Vec::with_capacity(nodes.len());
    for node in &nodes {
      let mut node_values = Vec::with_capacity(aspects.len());
      for aspect in &aspects {
        match env.aspects.apply(aspect, node) {
          Lookup::Pending => pending.request(format!("aspect {} on {}", aspect.name, node.key)),
          Lookup::Ready(Ok(value)) => node_values.push(value),
          Lookup::Ready(Err(error)) => {
            sink.accept_aspect_error(error);
            return Step::Done;
          }
        }
      }
      values.push(node_values);
    }
    if !pending.is_empty() {
      self.state = State::AwaitAspects {
        nodes,
        applicable: Some(aspects),
      };
      return Step::Suspend(pending);
    }

    let mut merged = nodes;
    for (node, node_values) in merged.iter_mut().zip(&values) {
      for value in node_values {
        if let Err(error) = node.merge_aspect(value) {
          debug!(parent = %self.parent, label = %self.label, error = %error, "aspect merge failed");
          sink.accept_aspect_error(error);
          return Step::Done;
        }
      }
    }
    self.finish(sink, merged);
    Step::Done
  }

  fn finish(&mut self, sink: &mut dyn PrerequisiteSink, nodes: Vec<ConfiguredNode>) {
    self.state = State::Done;
    trace!(parent = %self.parent, label = %self.label, nodes = nodes.len(), "prerequisite resolved");
    sink.accept_prerequisites(&self.label, nodes);
  }

  fn fail_creation(
    &mut self,
    sink: &mut dyn PrerequisiteSink,
    configuration: Option<String>,
    message: String,
    root_causes: Vec<RootCause>,
  ) {
    self.state = State::Done;
    sink.accept_creation_error(CreationError {
      parent: self.parent.clone(),
      label: self.label.clone(),
      configuration,
      message,
      root_causes,
    });
  }
}
