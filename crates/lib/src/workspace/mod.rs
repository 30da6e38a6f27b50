//! Workspace files: a JSON description of packages, transitions, aspects
//! and top-level requests that populates the in-memory stores.
//!
//! Loading resolves every label and named reference up front and rejects
//! attribute cycles, so later failures are about analysis, not about the
//! file itself.

mod graph;
mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

pub use graph::TargetGraph;
pub use types::*;

use crate::action::Artifact;
use crate::aspect::Aspect;
use crate::config::ConfigurationError;
use crate::driver::{BuildDriverKey, ExecutionKey};
use crate::label::{Label, LabelError, PackageId};
use crate::session::Session;
use crate::store::InMemoryStores;
use crate::target::{ActionTemplate, PackageLoadError, Target};
use crate::transition::{Transition, UserTransition};
use crate::util::hash::{Checksum, Hashable};

#[derive(Debug, Error)]
pub enum WorkspaceError {
  #[error("failed to read workspace file: {0}")]
  Read(#[source] io::Error),

  #[error("failed to parse workspace file: {0}")]
  Parse(#[source] serde_json::Error),

  #[error("unsupported workspace version {0}, expected {WORKSPACE_VERSION}")]
  UnsupportedVersion(u32),

  #[error("invalid label '{text}': {error}")]
  Label {
    text: String,
    #[source]
    error: LabelError,
  },

  #[error("target {0} is declared twice")]
  DuplicateTarget(Label),

  #[error("{target} refers to unknown transition '{name}'")]
  UnknownTransition { target: Label, name: String },

  #[error("{target} refers to unknown aspect '{name}'")]
  UnknownAspect { target: Label, name: String },

  #[error("aspect '{0}' is declared twice")]
  DuplicateAspect(String),

  #[error("attribute cycle through {0}")]
  Cycle(Label),

  #[error("invalid top-level configuration: {0}")]
  Configuration(#[from] ConfigurationError),

  #[error("failed to checksum workspace: {0}")]
  Checksum(#[source] serde_json::Error),
}

/// A loaded and validated workspace.
#[derive(Debug, Clone)]
pub struct Workspace {
  file: WorkspaceFile,
  checksum: Checksum,
  targets: Vec<Target>,
  aspects: BTreeMap<String, Aspect>,
}

impl Workspace {
  pub fn load(path: &Path) -> Result<Self, WorkspaceError> {
    let content = fs::read_to_string(path).map_err(WorkspaceError::Read)?;
    Self::parse(&content)
  }

  pub fn parse(text: &str) -> Result<Self, WorkspaceError> {
    let file: WorkspaceFile = serde_json::from_str(text).map_err(WorkspaceError::Parse)?;
    Self::from_file(file)
  }

  pub fn from_file(file: WorkspaceFile) -> Result<Self, WorkspaceError> {
    if file.version != WORKSPACE_VERSION {
      return Err(WorkspaceError::UnsupportedVersion(file.version));
    }

    let mut aspects = BTreeMap::new();
    for aspect in &file.aspects {
      if aspects.insert(aspect.name.clone(), aspect.clone()).is_some() {
        return Err(WorkspaceError::DuplicateAspect(aspect.name.clone()));
      }
    }

    let mut targets = Vec::new();
    let mut seen = BTreeSet::new();
    for (package, defs) in &file.packages {
      let id = PackageId::parse(package).map_err(|error| WorkspaceError::Label {
        text: package.clone(),
        error,
      })?;
      for def in defs {
        let target = build_target(&id, def, &file.transitions, &aspects)?;
        if !seen.insert(target.label.clone()) {
          return Err(WorkspaceError::DuplicateTarget(target.label));
        }
        targets.push(target);
      }
    }

    for top in &file.top_level {
      if let Some(name) = top.aspects.iter().find(|name| !aspects.contains_key(*name)) {
        return Err(WorkspaceError::UnknownAspect {
          target: top.label.clone(),
          name: name.clone(),
        });
      }
    }

    TargetGraph::new(&targets).order().map_err(WorkspaceError::Cycle)?;

    let checksum = file.compute_hash().map_err(WorkspaceError::Checksum)?;
    debug!(
      checksum = %checksum.short(),
      targets = targets.len(),
      aspects = aspects.len(),
      "workspace loaded"
    );
    Ok(Self {
      file,
      checksum,
      targets,
      aspects,
    })
  }

  /// SHA-256 of the file's JSON form.
  pub fn checksum(&self) -> &Checksum {
    &self.checksum
  }

  pub fn file(&self) -> &WorkspaceFile {
    &self.file
  }

  pub fn targets(&self) -> &[Target] {
    &self.targets
  }

  pub fn target(&self, label: &Label) -> Option<&Target> {
    self.targets.iter().find(|target| &target.label == label)
  }

  pub fn aspects(&self) -> &BTreeMap<String, Aspect> {
    &self.aspects
  }

  /// Fresh stores holding the workspace's packages, mappings and failures.
  pub fn stores(&self) -> Result<InMemoryStores, WorkspaceError> {
    let settings = self.file.settings.clone();
    let mut stores = if self.file.deferred {
      InMemoryStores::deferred(settings)
    } else {
      InMemoryStores::new(settings)
    };

    for target in &self.targets {
      stores.packages.add_target(target.clone());
    }
    for (path, text) in &self.file.platform_mappings {
      stores.mappings.add(path.clone(), text.clone());
    }

    let failures = &self.file.failures;
    for (package, message) in &failures.packages {
      let id = PackageId::parse(package).map_err(|error| WorkspaceError::Label {
        text: package.clone(),
        error,
      })?;
      let error = PackageLoadError::BuildFile {
        package: id.clone(),
        message: message.clone(),
      };
      stores.packages.fail(id, error);
    }
    for (label, message) in &failures.targets {
      stores.configured_targets.fail(label.clone(), message.clone());
    }
    for (aspect, message) in &failures.aspects {
      stores.aspects.fail(aspect.clone(), message.clone());
    }
    for (path, message) in &failures.artifacts {
      stores
        .executor
        .fail(ExecutionKey::Artifact(Artifact(path.clone())), message.clone());
    }
    Ok(stores)
  }

  /// A session over `stores` rooted at the workspace's configuration.
  pub fn session<'a>(&'a self, stores: &'a InMemoryStores) -> Result<Session<'a>, WorkspaceError> {
    let root = stores.configurations.intern(self.file.configuration.clone())?;
    Ok(Session::new(stores, root, &self.aspects))
  }

  /// Driver keys for every top-level entry: the target, then one key per
  /// requested aspect.
  pub fn requests(&self, session: &Session<'_>) -> Vec<BuildDriverKey> {
    let mut keys = Vec::new();
    for top in &self.file.top_level {
      keys.push(BuildDriverKey::new(session.target_key(top.label.clone()), top.explicit));
      for aspect in &top.aspects {
        keys.push(BuildDriverKey::new(
          session.aspect_key(aspect.clone(), top.label.clone()),
          top.explicit,
        ));
      }
    }
    keys
  }
}

fn build_target(
  package: &PackageId,
  def: &TargetDef,
  transitions: &BTreeMap<String, TransitionDef>,
  aspects: &BTreeMap<String, Aspect>,
) -> Result<Target, WorkspaceError> {
  let label = resolve(&def.name, package)?;
  let mut target = Target::new(label.clone(), def.kind.clone());

  for (attribute, texts) in &def.attributes {
    let labels = texts
      .iter()
      .map(|text| resolve(text, package))
      .collect::<Result<Vec<_>, _>>()?;
    target.attributes.insert(attribute.clone(), labels);
  }
  target.restricted_to = def
    .restricted_to
    .iter()
    .map(|text| resolve(text, package))
    .collect::<Result<_, _>>()?;

  target.tags = def.tags.clone();
  target.providers = def.providers.clone();
  target.incompatible = def.incompatible.clone();
  if !def.outputs.is_empty() {
    target.actions.push(ActionTemplate {
      mnemonic: DEFAULT_MNEMONIC.to_string(),
      outputs: def.outputs.clone(),
    });
  }
  target.actions.extend(def.actions.iter().cloned());

  let named = |name: &String| -> Result<Transition, WorkspaceError> {
    transitions
      .get(name)
      .map(|def| transition(name, def))
      .ok_or_else(|| WorkspaceError::UnknownTransition {
        target: label.clone(),
        name: name.clone(),
      })
  };
  if let Some(name) = &def.incoming_transition {
    target.incoming_transition = Some(named(name)?);
  }
  for (attribute, name) in &def.transitions {
    target.attribute_transitions.insert(attribute.clone(), named(name)?);
  }

  for (attribute, names) in &def.aspects {
    let mut propagated = Vec::new();
    for name in names {
      let aspect = aspects.get(name).ok_or_else(|| WorkspaceError::UnknownAspect {
        target: label.clone(),
        name: name.clone(),
      })?;
      propagated.push(aspect.clone());
    }
    target.attribute_aspects.insert(attribute.clone(), propagated);
  }
  Ok(target)
}

fn resolve(text: &str, package: &PackageId) -> Result<Label, WorkspaceError> {
  Label::parse_relative(text, package).map_err(|error| WorkspaceError::Label {
    text: text.to_string(),
    error,
  })
}

fn transition(name: &str, def: &TransitionDef) -> Transition {
  match def {
    TransitionDef::None => Transition::NoTransition,
    TransitionDef::Set { options } => Transition::set_options(options.clone()),
    TransitionDef::Split { branches } => Transition::split_options(branches.clone()),
    TransitionDef::Exec { platform } => Transition::exec(platform.clone()),
    TransitionDef::User {
      inputs,
      outputs,
      source,
    } => Transition::user(UserTransition {
      id: name.to_string(),
      inputs: inputs.clone(),
      outputs: outputs.clone(),
      source: source.clone(),
    }),
  }
}
