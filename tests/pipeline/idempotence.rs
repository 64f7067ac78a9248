//! Re-running a batch over the same output directory.

use std::collections::HashMap;

use helpsweep::batch::PoolConfig;

use super::fakes::{FakeImages, FakeIntrospector, FakePlatform, Harness, manifest, one_image, tree};

#[tokio::test]
/// What: A second run over the same targets does no work.
///
/// Inputs:
/// - `bwa=0.7.17` processed twice into one output directory.
///
/// Output:
/// - The second run starts no container, skips the unit, and leaves the
///   output tree byte for byte unchanged.
async fn pipeline_second_run_is_a_no_op() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([("bwa-0.7.17".to_string(), manifest(&["bwa"]))]),
        ..FakePlatform::default()
    };
    let harness = Harness::new(
        platform,
        FakeIntrospector::default(),
        FakeImages(HashMap::from([one_image("bwa=0.7.17")])),
    );
    let pool = PoolConfig::new(Some(2), None, true);

    let (first, _) = harness.run(&["bwa=0.7.17"], out.path(), &pool, None).await;
    assert_eq!(first.completed, 1);
    let before = tree(out.path());
    let content = std::fs::read_to_string(out.path().join("bwa/0.7.17/bwa.yml")).expect("written");
    let started = harness.platform.started();

    let (second, records) = harness.run(&["bwa=0.7.17"], out.path(), &pool, None).await;
    assert_eq!(second.skipped, 1);
    assert_eq!(second.completed, 0);
    assert_eq!(harness.platform.started(), started);
    assert_eq!(tree(out.path()), before);
    assert_eq!(
        std::fs::read_to_string(out.path().join("bwa/0.7.17/bwa.yml")).expect("still there"),
        content
    );
    assert!(records
        .iter()
        .any(|r| r.source_id == "bwa=0.7.17" && r.message.contains("Directory already exists")));
}
