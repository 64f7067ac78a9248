//! Pool mode, debug mode and worker recycling.


use helpsweep::batch::PoolConfig;

use super::fakes::{FakeImages, FakeIntrospector, FakePlatform, Harness, manifest, one_image, tree};

/// Six units with two binaries each.
fn six_units() -> (Vec<String>, FakePlatform, FakeImages) {
    let names = ["a", "b", "c", "d", "e", "f"];
    let targets: Vec<String> = names.iter().map(|n| format!("{n}=1.0")).collect();
    let manifests = names
        .iter()
        .map(|n| {
            let util = format!("{n}-util");
            (format!("{n}-1.0"), manifest(&[*n, util.as_str()]))
        })
        .collect();
    let images = FakeImages(targets.iter().map(|t| one_image(t)).collect());
    let platform = FakePlatform {
        manifests,
        ..FakePlatform::default()
    };
    (targets, platform, images)
}

#[tokio::test]
/// What: Debug mode and pool mode write identical artifacts.
///
/// Inputs:
/// - Six units run once with `fork = false` and once with four workers.
///
/// Output:
/// - Same file tree and same file contents in both output directories.
async fn pipeline_debug_and_pool_modes_agree() {
    let serial_out = tempfile::tempdir().expect("tempdir");
    let pooled_out = tempfile::tempdir().expect("tempdir");

    let (targets, platform, images) = six_units();
    let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
    let serial = Harness::new(platform, FakeIntrospector::default(), images);
    let (s1, _) = serial
        .run(&refs, serial_out.path(), &PoolConfig::new(Some(4), None, false), None)
        .await;

    let (_, platform, images) = six_units();
    let pooled = Harness::new(platform, FakeIntrospector::default(), images);
    let (s2, _) = pooled
        .run(&refs, pooled_out.path(), &PoolConfig::new(Some(4), None, true), None)
        .await;

    assert_eq!((s1.completed, s1.written), (6, 12));
    assert_eq!((s2.completed, s2.written), (6, 12));
    assert_eq!(s1.workers_spawned, 0);
    let files = tree(serial_out.path());
    assert_eq!(files, tree(pooled_out.path()));
    for rel in files.iter().filter(|f| !f.ends_with('/')) {
        assert_eq!(
            std::fs::read(serial_out.path().join(rel)).expect("serial file"),
            std::fs::read(pooled_out.path().join(rel)).expect("pooled file"),
            "{rel}"
        );
    }
    serial.platform.assert_all_released_once();
    pooled.platform.assert_all_released_once();
}

#[tokio::test]
/// What: With `max_tasks = 1` every unit gets a fresh worker.
///
/// Inputs:
/// - Six units, two workers, one unit per worker.
///
/// Output:
/// - All six complete and exactly six workers were spawned.
async fn pipeline_max_tasks_respawns_workers() {
    let out = tempfile::tempdir().expect("tempdir");
    let (targets, platform, images) = six_units();
    let refs: Vec<&str> = targets.iter().map(String::as_str).collect();
    let harness = Harness::new(platform, FakeIntrospector::default(), images);
    let (summary, _) = harness
        .run(&refs, out.path(), &PoolConfig::new(Some(2), Some(1), true), None)
        .await;
    assert_eq!(summary.completed, 6);
    assert_eq!(summary.workers_spawned, 6);
}
