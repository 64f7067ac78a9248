//! Realistic single-package runs.

use std::collections::HashMap;
use std::sync::Arc;

use helpsweep::batch::{Coordinator, PoolConfig};
use helpsweep::logging::{LogAggregator, LogLevel, MemorySink};
use helpsweep::model::{CommandDescription, WorkUnit};
use helpsweep::processor::WrapperTarget;
use helpsweep::wrappers::{JsonGenerator, WrapperGenerator, YmlGenerator};

use super::fakes::{Behavior, FakeImages, FakeIntrospector, FakePlatform, Harness, manifest, one_image};

/// `samtools` as the parser describes it: two sub-commands.
const SAMTOOLS: &str = "command: [samtools]
help_text: 'Usage: samtools <command> [options]'
parent: null
subcommands:
- command: [samtools, index]
  help_text: 'Usage: samtools index <in.bam>'
  parent: null
  subcommands: []
- command: [samtools, sort]
  help_text: 'Usage: samtools sort [options] <in.bam>'
  parent: null
  subcommands: []
";

#[tokio::test]
/// What: samtools produces one file per binary and wrappers for its leaves.
///
/// Inputs:
/// - `samtools=1.9` with binaries `samtools` (two sub-commands) and `wgsim`,
///   and a wrapper root with YAML and JSON generators.
///
/// Output:
/// - `samtools.yml` keeps its sub-commands, `wgsim.yml` exists, wrappers
///   exist for `samtools_index`, `samtools_sort` and `wgsim` but not `samtools`.
async fn pipeline_samtools_scenario() {
    let out = tempfile::tempdir().expect("tempdir");
    let wrappers = tempfile::tempdir().expect("tempdir");
    let platform = FakePlatform {
        manifests: HashMap::from([("samtools-1.9".to_string(), manifest(&["samtools", "wgsim"]))]),
        ..FakePlatform::default()
    };
    let introspector = FakeIntrospector {
        behaviors: HashMap::from([("samtools".to_string(), Behavior::Describe(SAMTOOLS.to_string()))]),
        ..FakeIntrospector::default()
    };
    let harness = Harness::new(
        platform,
        introspector,
        FakeImages(HashMap::from([one_image("samtools=1.9")])),
    );
    let generators: Vec<Box<dyn WrapperGenerator>> = vec![Box::new(YmlGenerator), Box::new(JsonGenerator)];
    let processor = harness.processor().with_wrappers(WrapperTarget {
        root: wrappers.path().to_path_buf(),
        generators: Arc::new(generators),
    });

    let aggregator = LogAggregator::start(MemorySink::default());
    let log = aggregator.handle("batch");
    let summary = Coordinator::new(processor)
        .run(
            &["samtools=1.9".to_string()],
            out.path(),
            &PoolConfig::new(Some(1), None, true),
            None,
            &log,
        )
        .await
        .expect("output dir exists");
    drop(log);
    aggregator.shutdown().await;

    assert_eq!((summary.completed, summary.written), (1, 2));
    let unit_dir = out.path().join("samtools/1.9");
    let samtools = CommandDescription::load(&unit_dir.join("samtools.yml")).expect("written");
    assert_eq!(samtools.subcommands().len(), 2);
    assert!(unit_dir.join("wgsim.yml").exists());

    let wrapper_dir = wrappers.path().join("samtools/1.9");
    for stem in ["samtools_index", "samtools_sort", "wgsim"] {
        assert!(wrapper_dir.join(format!("{stem}.yml")).exists(), "{stem}.yml");
        assert!(wrapper_dir.join(format!("{stem}.json")).exists(), "{stem}.json");
    }
    assert!(!wrapper_dir.join("samtools.yml").exists());
    harness.platform.assert_all_released_once();
}

#[tokio::test]
/// What: bwa falls through a missing image to the next candidate.
///
/// Inputs:
/// - `bwa=0.7.17` with two candidates; the newest cannot be pulled.
///
/// Output:
/// - `bwa.yml` written, one warning naming the missing image, the image of
///   the started container removed.
async fn pipeline_bwa_falls_back_to_next_image() {
    let out = tempfile::tempdir().expect("tempdir");
    let newest = "quay.io/biocontainers/bwa:0.7.17--h5bf99c6_8".to_string();
    let older = "quay.io/biocontainers/bwa:0.7.17--hed695b0_7".to_string();
    let platform = FakePlatform {
        missing: vec![newest.clone()],
        manifests: HashMap::from([("bwa-0.7.17".to_string(), manifest(&["bwa"]))]),
        ..FakePlatform::default()
    };
    let images = FakeImages(HashMap::from([(
        WorkUnit::new("bwa", "0.7.17"),
        vec![format!("https://{newest}"), older.clone()],
    )]));
    let harness = Harness::new(platform, FakeIntrospector::default(), images);
    let (summary, records) = harness
        .run(&["bwa=0.7.17"], out.path(), &PoolConfig::default(), None)
        .await;

    assert_eq!(summary.completed, 1);
    assert!(out.path().join("bwa/0.7.17/bwa.yml").exists());
    let warnings: Vec<_> = records
        .iter()
        .filter(|r| r.level == LogLevel::Warn && r.message.contains(&newest))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(harness.platform.started(), 1);
    assert_eq!(harness.platform.removed_images(), vec![format!("sha256:{older}")]);
}

#[tokio::test]
/// What: When no candidate can be pulled the unit fails cleanly.
///
/// Inputs:
/// - `ghost=1` whose two candidates are both missing.
///
/// Output:
/// - An empty `ghost/1` directory, one error record naming the unit, and no
///   container ever started.
async fn pipeline_all_candidates_missing() {
    let out = tempfile::tempdir().expect("tempdir");
    let candidates = vec!["quay.io/x/ghost:1--0".to_string(), "quay.io/x/ghost:1--1".to_string()];
    let platform = FakePlatform {
        missing: candidates.clone(),
        ..FakePlatform::default()
    };
    let images = FakeImages(HashMap::from([(WorkUnit::new("ghost", "1"), candidates)]));
    let harness = Harness::new(platform, FakeIntrospector::default(), images);
    let (summary, records) = harness
        .run(&["ghost=1"], out.path(), &PoolConfig::default(), None)
        .await;

    assert_eq!(summary.failed, 1);
    let unit_dir = out.path().join("ghost/1");
    assert!(unit_dir.is_dir());
    assert_eq!(std::fs::read_dir(&unit_dir).expect("dir").count(), 0);
    let errors: Vec<_> = records.iter().filter(|r| r.level == LogLevel::Error).collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("ghost=1"));
    assert_eq!(harness.platform.started(), 0);
}
