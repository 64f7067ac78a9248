//! Every started container is released exactly once on every exit path.

use std::collections::HashMap;

use helpsweep::batch::PoolConfig;
use helpsweep::logging::LogLevel;

use super::fakes::{
    Behavior, FakeImages, FakeIntrospector, FakePlatform, Harness, Startup, manifest, one_image,
};

#[tokio::test]
/// What: A panic during introspection still releases the container.
///
/// Inputs:
/// - `tool=1` whose only binary panics when explored.
///
/// Output:
/// - Unit failed, container and image removed once, other units unaffected.
async fn pipeline_panic_in_introspection_still_releases() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([
            ("tool-1".to_string(), manifest(&["explode"])),
            ("fine-1".to_string(), manifest(&["fine"])),
        ]),
        ..FakePlatform::default()
    };
    let introspector = FakeIntrospector {
        behaviors: HashMap::from([("explode".to_string(), Behavior::Panic)]),
        ..FakeIntrospector::default()
    };
    let harness = Harness::new(
        platform,
        introspector,
        FakeImages(HashMap::from([one_image("tool=1"), one_image("fine=1")])),
    );
    let (summary, records) = harness
        .run(&["tool=1", "fine=1"], out.path(), &PoolConfig::new(Some(2), None, true), None)
        .await;

    assert_eq!((summary.failed, summary.completed), (1, 1));
    harness.platform.assert_all_released_once();
    assert_eq!(harness.platform.removed_images().len(), 2);
    assert!(records.iter().any(|r| r.source_id == "tool=1"
        && r.level == LogLevel::Error
        && r.message.contains("panicked")));
}

#[tokio::test]
/// What: A container that never becomes ready is released after the ceiling.
///
/// Inputs:
/// - All containers stuck in `created`; readiness ceiling of 100 ms.
///
/// Output:
/// - Unit failed with a timeout message, nothing explored, container released once.
async fn pipeline_readiness_timeout_still_releases() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        startup: Startup::Stuck,
        ..FakePlatform::default()
    };
    let harness = Harness::new(
        platform,
        FakeIntrospector::default(),
        FakeImages(HashMap::from([one_image("slow=1")])),
    );
    let (summary, records) = harness
        .run(&["slow=1"], out.path(), &PoolConfig::new(Some(1), None, false), None)
        .await;

    assert_eq!(summary.failed, 1);
    harness.platform.assert_all_released_once();
    assert_eq!(
        harness
            .introspector
            .calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert!(records
        .iter()
        .any(|r| r.level == LogLevel::Error && r.message.contains("did not start")));
}

#[tokio::test]
/// What: A unit without binaries is released and reported as such.
async fn pipeline_no_binaries_still_releases() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([("libonly-2".to_string(), manifest(&[]))]),
        ..FakePlatform::default()
    };
    let harness = Harness::new(
        platform,
        FakeIntrospector::default(),
        FakeImages(HashMap::from([one_image("libonly=2")])),
    );
    let (summary, _) = harness
        .run(&["libonly=2"], out.path(), &PoolConfig::default(), None)
        .await;
    assert_eq!(summary.no_binaries, 1);
    harness.platform.assert_all_released_once();
}
