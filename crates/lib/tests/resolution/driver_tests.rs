//! Whole builds through the session, eager and deferred.

use std::collections::BTreeSet;

use trellis_lib::aspect::Aspect;
use trellis_lib::driver::{BuildDriverKey, ExecutionKey};
use trellis_lib::event::RecordingSink;
use trellis_lib::provider::{ProviderId, ProviderValue};
use trellis_lib::session::TargetStatus;
use trellis_lib::settings::AnalysisSettings;
use trellis_lib::target::{Target, TargetKind};

use super::common::{World, cpu_split, label, requests, rule, with_deps};

fn app(deferred: bool) -> World {
  let mut main = with_deps(rule("//app:main", "cc_binary", &["main"]), "deps", &[":lib"]);
  main.attribute_transitions.insert("deps".to_string(), cpu_split(&["k8", "arm"]));
  let mut test = with_deps(rule("//app:main_test", "cc_test", &["main_test"]), "deps", &[":main"]);
  test.tags.push("exclusive".to_string());
  World::new(deferred)
    .target(main)
    .target(rule("//app:lib", "cc_library", &["lib.a"]))
    .target(test)
}

fn executed(world: &World, labels: &[&str]) -> (BTreeSet<String>, Vec<TargetStatus>) {
  let session = world.session();
  let report = session.build(&requests(&session, labels), &RecordingSink::new());
  let keys = report.executed.iter().map(ToString::to_string).collect();
  let statuses = report.targets.iter().map(|target| target.status).collect();
  (keys, statuses)
}

#[test]
fn deferred_and_eager_builds_execute_the_same_keys() {
  let labels = ["//app:main", "//app:main_test"];
  let eager = executed(&app(false), &labels);
  let deferred = executed(&app(true), &labels);
  assert_eq!(eager, deferred);
  assert_eq!(eager.1, vec![TargetStatus::Built, TargetStatus::Built]);
  assert!(eager.0.contains("artifact k8-fastbuild/app/main"));
}

#[test]
fn exclusive_test_completion_comes_last() {
  let world = app(true);
  let session = world.session();
  let report = session.build(&requests(&session, &["//app:main_test", "//app:main"]), &RecordingSink::new());
  assert!(report.success(), "{report:?}");
  assert!(report.restarts > 0);
  assert!(matches!(
    report.executed.last(),
    Some(ExecutionKey::TestCompletion { exclusive: true, .. })
  ));
}

#[test]
fn each_build_is_its_own_generation() {
  let world = app(false);
  let session = world.session();
  let first = session.build(&requests(&session, &["//app:main"]), &RecordingSink::new());
  let second = session.build(&requests(&session, &["//app:main"]), &RecordingSink::new());
  assert_eq!((first.generation, second.generation), (0, 1));
  assert_eq!(session.generation().number(), 2);
  assert!(second.success());
}

#[test]
fn incompatible_targets_skip_unless_explicit() {
  let mut legacy = rule("//app:legacy", "cc_binary", &["legacy"]);
  legacy.incompatible = Some("requires a 32-bit platform".to_string());
  let world = World::new(false).target(legacy);
  let session = world.session();
  let key = session.target_key(label("//app:legacy"));

  let implicit = session.build(&[BuildDriverKey::new(key.clone(), false)], &RecordingSink::new());
  let report = &implicit.targets[0];
  assert_eq!(report.status, TargetStatus::Skipped);
  assert!(report.message.as_deref().unwrap().contains("32-bit"));

  let explicit = session.build(&[BuildDriverKey::new(key, true)], &RecordingSink::new());
  let report = &explicit.targets[0];
  assert_eq!(report.status, TargetStatus::Failed);
  assert!(report.message.as_deref().unwrap().contains("incompatible"));
  assert!(!report.transient);
}

mod environments {
  use super::*;

  fn world() -> World {
    let settings = AnalysisSettings {
      target_environments: vec![label("//env:prod")],
      ..AnalysisSettings::default()
    };
    let environment = |text: &str, fulfills: &[&str]| {
      Target::new(
        label(text),
        TargetKind::Environment {
          fulfills: fulfills.iter().map(|l| label(l)).collect(),
        },
      )
    };
    let mut staging_only = rule("//app:staging_only", "cc_binary", &["staging_only"]);
    staging_only.restricted_to = vec![label("//env:staging")];
    let mut everywhere = rule("//app:everywhere", "cc_binary", &["everywhere"]);
    everywhere.restricted_to = vec![label("//env:all")];

    World::with_settings(true, settings)
      .target(environment("//env:prod", &[]))
      .target(environment("//env:staging", &[]))
      .target(environment("//env:all", &["//env:prod", "//env:staging"]))
      .target(staging_only)
      .target(everywhere)
      .target(rule("//app:unrestricted", "cc_binary", &["unrestricted"]))
  }

  #[test]
  fn fulfilled_environments_count_as_supported() {
    let world = world();
    let session = world.session();
    let report = session.build(
      &requests(&session, &["//app:everywhere", "//app:unrestricted"]),
      &RecordingSink::new(),
    );
    assert!(report.success(), "{report:?}");
  }

  #[test]
  fn explicit_targets_missing_an_environment_fail() {
    let world = world();
    let session = world.session();
    let report = session.build(&requests(&session, &["//app:staging_only"]), &RecordingSink::new());
    let target = report.target(&label("//app:staging_only")).unwrap();
    assert_eq!(target.status, TargetStatus::Failed);
    assert!(target.message.as_deref().unwrap().contains("//env:prod"));
  }

  #[test]
  fn implicit_targets_missing_an_environment_are_skipped() {
    let world = world();
    let session = world.session();
    let key = BuildDriverKey::new(session.target_key(label("//app:staging_only")), false);
    let report = session.build(&[key], &RecordingSink::new());
    assert_eq!(report.targets[0].status, TargetStatus::Skipped);
  }
}

#[test]
fn top_level_aspects_build_alongside_their_target() {
  let mut lint = Aspect::named("lint");
  lint.provides.insert(
    ProviderId::new("LintInfo"),
    ProviderValue::Files(vec!["lint.txt".to_string()]),
  );
  let world = app(false).aspect(lint);
  let session = world.session();
  let mut keys = requests(&session, &["//app:main"]);
  keys.push(BuildDriverKey::new(session.aspect_key("lint", label("//app:main")), true));

  let report = session.build(&keys, &RecordingSink::new());
  assert!(report.success(), "{report:?}");
  assert_eq!(report.count(TargetStatus::Built), 2);
  assert!(report.targets.iter().any(|target| target.key.is_aspect()));
}
