//! The four canonical resolution scenarios, each in eager and deferred mode.

use std::collections::BTreeMap;

use trellis_lib::analysis::AnalysisError;
use trellis_lib::aspect::{Aspect, AspectError};
use trellis_lib::config::BuildOptions;
use trellis_lib::eval::Unsettled;
use trellis_lib::provider::{ProviderId, ProviderValue};
use trellis_lib::target::{LoadingFailureKind, RootCause};
use trellis_lib::transition::Transition;

use super::common::{World, cpu_split, label, rule, with_deps};

fn split_world(deferred: bool) -> World {
  let mut top = with_deps(rule("//pkg:t", "cc_binary", &["t"]), "deps", &[":a"]);
  top.attribute_transitions.insert("deps".to_string(), cpu_split(&["k8", "arm"]));
  World::new(deferred)
    .target(top)
    .target(rule("//pkg:a", "cc_library", &["a.o"]))
}

mod split_transition {
  use super::*;

  fn check(deferred: bool) {
    let world = split_world(deferred);
    let session = world.session();
    let settled = session.resolve(&label("//pkg:t"), "deps").unwrap();

    let edges: Vec<(String, String, Vec<String>)> = settled
      .value
      .dependencies
      .iter()
      .map(|edge| {
        (
          edge.label.to_string(),
          edge.mnemonic.clone().unwrap(),
          edge.transition_keys.clone(),
        )
      })
      .collect();
    assert_eq!(
      edges,
      vec![
        ("//pkg:a".to_string(), "arm-fastbuild".to_string(), vec!["arm".to_string()]),
        ("//pkg:a".to_string(), "k8-fastbuild".to_string(), vec!["k8".to_string()]),
      ]
    );
    assert_eq!(settled.value.nodes.len(), 2);
    assert_eq!(settled.restarts > 0, deferred);
  }

  #[test]
  fn eager() {
    check(false);
  }

  #[test]
  fn deferred() {
    check(true);
  }
}

mod no_op_transition {
  use super::*;

  fn check(deferred: bool) {
    let mut top = with_deps(rule("//pkg:t", "cc_binary", &["t"]), "deps", &[":a"]);
    top
      .attribute_transitions
      .insert("deps".to_string(), Transition::set_options(BuildOptions::new().with("cpu", "k8")));
    let world = World::new(deferred)
      .target(top)
      .target(rule("//pkg:a", "cc_library", &["a.o"]));
    let session = world.session();

    let resolution = session.resolve(&label("//pkg:t"), "deps").unwrap().value;
    assert_eq!(resolution.dependencies.len(), 1);
    let edge = &resolution.dependencies[0];
    assert_eq!(edge.configuration.as_ref(), Some(session.root().checksum()));
    assert!(edge.transition_keys.is_empty());
  }

  #[test]
  fn eager() {
    check(false);
  }

  #[test]
  fn deferred() {
    check(true);
  }
}

mod missing_package {
  use super::*;

  fn check(deferred: bool) {
    let top = with_deps(rule("//pkg:t", "cc_binary", &["t"]), "deps", &["//missing:x", ":a"]);
    let world = World::new(deferred)
      .target(top)
      .target(rule("//pkg:a", "cc_library", &["a.o"]));
    let session = world.session();

    let resolution = session.resolve(&label("//pkg:t"), "deps").unwrap().value;
    let labels: Vec<String> = resolution.dependencies.iter().map(|e| e.label.to_string()).collect();
    assert_eq!(labels, vec!["//pkg:a"]);
    assert_eq!(resolution.root_causes.len(), 1);
    match &resolution.root_causes[0] {
      RootCause::Loading { from, to, kind, .. } => {
        assert_eq!(from, &label("//pkg:t"));
        assert_eq!(to, &label("//missing:x"));
        assert_eq!(*kind, LoadingFailureKind::TargetDefinition);
      }
      other => panic!("expected a loading cause, got {other:?}"),
    }
  }

  #[test]
  fn eager() {
    check(false);
  }

  #[test]
  fn deferred() {
    check(true);
  }

  #[test]
  fn external_repository_is_a_fetch_failure() {
    let top = with_deps(rule("//pkg:t", "cc_binary", &["t"]), "deps", &["@remote//lib:x"]);
    let world = World::new(false).target(top);
    let session = world.session();

    let resolution = session.resolve(&label("//pkg:t"), "deps").unwrap().value;
    assert!(matches!(
      resolution.root_causes[0],
      RootCause::Loading {
        kind: LoadingFailureKind::RepositoryFetch,
        ..
      }
    ));
  }
}

mod duplicate_provider_on_merge {
  use super::*;

  fn providing(name: &str) -> Aspect {
    let mut aspect = Aspect::named(name);
    aspect.provides = BTreeMap::from([(
      ProviderId::new("LintInfo"),
      ProviderValue::Files(vec![format!("{name}.txt")]),
    )]);
    aspect
  }

  fn check(deferred: bool) {
    let mut world = split_world(deferred);
    let mut top = with_deps(rule("//pkg:t", "cc_binary", &["t"]), "deps", &[":a"]);
    top.attribute_transitions.insert("deps".to_string(), cpu_split(&["k8", "arm"]));
    top
      .attribute_aspects
      .insert("deps".to_string(), vec![providing("first"), providing("second")]);
    world.stores.packages.add_target(top);
    let session = world.session();

    let err = session.resolve(&label("//pkg:t"), "deps").unwrap_err();
    match err {
      Unsettled::Failed(AnalysisError::Aspect(AspectError::DuplicateProvider { target, provider })) => {
        assert_eq!(target, label("//pkg:a"));
        assert_eq!(provider, ProviderId::new("LintInfo"));
      }
      other => panic!("expected a duplicate provider, got {other:?}"),
    }
  }

  #[test]
  fn eager() {
    check(false);
  }

  #[test]
  fn deferred() {
    check(true);
  }
}
