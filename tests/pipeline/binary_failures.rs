//! One binary's failure does not affect its siblings.

use std::collections::HashMap;

use helpsweep::batch::PoolConfig;
use helpsweep::logging::LogLevel;

use super::fakes::{Behavior, FakeImages, FakeIntrospector, FakePlatform, Harness, manifest, one_image};

#[tokio::test]
/// What: Failing and hanging binaries are skipped; the rest are written.
///
/// Inputs:
/// - `kit=3` with binaries `one`, `two` (fails) and `three`, and `slow` (hangs).
///
/// Output:
/// - `one.yml` and `three.yml` exist, `two.yml` and `slow.yml` do not; two
///   error records and one completed unit with two binary failures.
async fn pipeline_binary_failure_is_isolated() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([(
            "kit-3".to_string(),
            manifest(&["one", "two", "three", "slow"]),
        )]),
        ..FakePlatform::default()
    };
    let introspector = FakeIntrospector {
        behaviors: HashMap::from([
            ("two".to_string(), Behavior::Fail),
            ("slow".to_string(), Behavior::Hang),
        ]),
        ..FakeIntrospector::default()
    };
    let harness = Harness::new(
        platform,
        introspector,
        FakeImages(HashMap::from([one_image("kit=3")])),
    );
    let (summary, records) = harness
        .run(&["kit=3"], out.path(), &PoolConfig::new(Some(1), None, true), None)
        .await;

    let dir = out.path().join("kit/3");
    assert!(dir.join("one.yml").exists());
    assert!(!dir.join("two.yml").exists());
    assert!(dir.join("three.yml").exists());
    assert!(!dir.join("slow.yml").exists());
    assert_eq!((summary.completed, summary.written, summary.binary_failures), (1, 2, 2));
    let errors = records
        .iter()
        .filter(|r| r.source_id == "kit=3" && r.level == LogLevel::Error)
        .count();
    assert_eq!(errors, 2);
    harness.platform.assert_all_released_once();
}
