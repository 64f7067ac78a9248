//! Resume from a previous snapshot.

use std::collections::HashMap;

use helpsweep::batch::PoolConfig;
use helpsweep::model::{StateSnapshot, WorkUnit};

use super::fakes::{FakeImages, FakeIntrospector, FakePlatform, Harness, manifest, one_image};

#[tokio::test]
/// What: Only units missing from the resume snapshot are processed.
///
/// Inputs:
/// - Targets {a=1, b=1, c=1}; previous snapshot {a=1, z=9}.
///
/// Output:
/// - Exactly b and c get output directories; a is never touched and the
///   start-of-run message reports the counts.
async fn pipeline_resume_processes_only_the_delta() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([
            ("a-1".to_string(), manifest(&["a"])),
            ("b-1".to_string(), manifest(&["b"])),
            ("c-1".to_string(), manifest(&["c"])),
        ]),
        ..FakePlatform::default()
    };
    let images = FakeImages(HashMap::from([
        one_image("a=1"),
        one_image("b=1"),
        one_image("c=1"),
    ]));
    let harness = Harness::new(platform, FakeIntrospector::default(), images);
    let previous = StateSnapshot::new("1.0", [WorkUnit::new("a", "1"), WorkUnit::new("z", "9")]);

    let (summary, records) = harness
        .run(
            &["a=1", "b=1", "c=1"],
            out.path(),
            &PoolConfig::new(Some(2), None, true),
            Some(&previous),
        )
        .await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.completed, 2);
    assert!(!out.path().join("a").exists());
    assert!(out.path().join("b/1/b.yml").exists());
    assert!(out.path().join("c/1/c.yml").exists());
    assert_eq!(harness.platform.started(), 2);
    assert!(records.iter().any(|r| r.message
        == "There are 2 packages in the old metadata and 3 in the new. There are 2 to process."));
}

#[tokio::test]
/// What: A malformed target fails alone and is logged under its own text.
///
/// Inputs:
/// - Targets `good=1` and `broken`.
///
/// Output:
/// - `good=1` completes; one error record is attributed to `broken`.
async fn pipeline_malformed_target_fails_only_itself() {
    let out = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([("good-1".to_string(), manifest(&["good"]))]),
        ..FakePlatform::default()
    };
    let harness = Harness::new(
        platform,
        FakeIntrospector::default(),
        FakeImages(HashMap::from([one_image("good=1")])),
    );
    let (summary, records) = harness
        .run(&["good=1", "broken"], out.path(), &PoolConfig::new(Some(1), None, true), None)
        .await;
    assert_eq!((summary.total, summary.completed, summary.failed), (2, 1, 1));
    let broken: Vec<_> = records.iter().filter(|r| r.source_id == "broken").collect();
    assert_eq!(broken.len(), 1);
}

#[tokio::test]
/// What: Targets that would escape or nest in the output tree are rejected.
///
/// Inputs:
/// - Targets `..=1` and `good/nested=1` with the output root one level below a scratch directory.
///
/// Output:
/// - Both fail without creating any directory; nothing appears next to the output root.
async fn pipeline_path_like_targets_claim_nothing() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let out = scratch.path().join("out");
    std::fs::create_dir(&out).expect("out dir");
    let harness = Harness::new(
        FakePlatform::default(),
        FakeIntrospector::default(),
        FakeImages(HashMap::new()),
    );
    let (summary, _) = harness
        .run(&["..=1", "good/nested=1"], &out, &PoolConfig::new(Some(2), None, true), None)
        .await;
    assert_eq!((summary.total, summary.failed), (2, 2));
    assert!(!scratch.path().join("1").exists());
    assert!(std::fs::read_dir(&out).expect("read out").next().is_none());
    assert_eq!(harness.platform.started(), 0);
}
