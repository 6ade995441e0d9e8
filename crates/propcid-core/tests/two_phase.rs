//! two_phase.rs
//!
//! Black-box runs of the orchestrator over temporary property directories:
//! seed cascade, schema shape enforcement, link handling, concurrency bound
//! and phase ordering.

mod common;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use propcid_core::determinism::cid::{calculate_cid_v1_for_raw_data, parse_cid, Codec};
use propcid_core::errors::FileError;
use propcid_core::model::DirectoryOutcome;
use propcid_core::pipeline::{Orchestrator, ProgressSink, Phase};
use propcid_core::validate::{JsonValidator, ValidationResult};
use serde_json::{json, Value};

use common::*;

#[tokio::test]
async fn two_directories_with_images() {
    let h = Harness::new();
    h.write("prop-a/front.jpg", b"front-a");
    h.write("prop-b/front.jpg", b"front-b");

    let mut entries = Vec::new();
    for dir in ["prop-a", "prop-b"] {
        entries.push(h.seed(dir, &format!("parcel-{dir}")));
        h.write_json(
            &format!("{dir}/{DEPENDENT}.json"),
            &json!({"label": "Photos", "relationships": {"photos": ["./front.jpg"]}}),
        );
        entries.push(h.pending(dir, DEPENDENT));
    }

    let out = h.orchestrator().run(entries).await.unwrap();
    assert!(h.reporter.errors().is_empty(), "{:?}", h.reporter.errors());
    assert_eq!(out.metrics.processed, 4);
    assert_eq!(out.metrics.total, 4);
    assert_eq!(out.hashed_files.len(), 4);
    assert_eq!(out.assets.len(), 2);

    for dir in ["prop-a", "prop-b"] {
        let d = h.root().join(dir);
        let seed_cid = match &out.directory_outcomes[&d] {
            DirectoryOutcome::SeedSucceeded(cid) => cid.clone(),
            other => panic!("unexpected outcome {other:?}"),
        };
        let in_dir: Vec<_> = out
            .hashed_files
            .iter()
            .filter(|f| f.original_path.starts_with(&d))
            .collect();
        assert_eq!(in_dir.len(), 2);
        assert!(in_dir.iter().all(|f| f.property_cid == seed_cid));

        let dep = in_dir.iter().find(|f| f.data_group_cid == DEPENDENT).unwrap();
        let image_cid = calculate_cid_v1_for_raw_data(format!("front-{}", &dir[5..]).as_bytes()).unwrap();
        assert!(dep.canonical_json.contains(&format!("ipfs://{image_cid}")));
    }
}

#[tokio::test]
async fn failed_seed_skips_its_directory_only() {
    let h = Harness::new();
    // Missing `relationships.parcel_id`.
    h.write_json(
        &format!("prop-a/{SEED}.json"),
        &json!({"label": "Property Seed", "relationships": {}}),
    );
    let mut entries = vec![h.pending("prop-a", SEED)];
    for dir in ["prop-a", "prop-b"] {
        h.write_json(
            &format!("{dir}/{DEPENDENT}.json"),
            &json!({"label": "x", "relationships": {}}),
        );
        h.write_json(&format!("{dir}/{OWNER_CLASS}.json"), &json!({"name": "unused"}));
        entries.push(h.pending(dir, DEPENDENT));
    }
    entries.push(h.seed("prop-b", "parcel-b"));
    // A second dependent in prop-a. Its group schema is never fetched.
    entries.push(h.pending("prop-a", OWNER_CLASS));

    let out = h.orchestrator().run(entries).await.unwrap();

    let a = h.root().join("prop-a");
    assert!(out.hashed_files.iter().all(|f| !f.original_path.starts_with(&a)));
    assert!(matches!(out.directory_outcomes[&a], DirectoryOutcome::SeedFailed { .. }));
    assert_eq!(out.hashed_files.len(), 2);

    let warnings = h.reporter.warnings();
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.message.contains("prop-a")));

    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert_eq!(errors[0].error_path, "prop-a/relationships/parcel_id");

    assert!(out.validation_failed);
    assert_eq!(out.metrics.skipped, 2);
    assert_eq!(out.metrics.errors, 1);
    assert_eq!(out.metrics.processed, 2);
}

#[tokio::test]
async fn malformed_seed_reports_one_error_row() {
    let h = Harness::new();
    h.write(&format!("prop-a/{SEED}.json"), b"{ not json");
    h.write_json(
        &format!("prop-a/{DEPENDENT}.json"),
        &json!({"label": "x", "relationships": {}}),
    );
    let entries = vec![h.pending("prop-a", SEED), h.pending("prop-a", DEPENDENT)];

    let out = h.orchestrator().run(entries).await.unwrap();

    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].file_path.ends_with(&format!("{SEED}.json")));
    assert!(!errors[0].message.contains("dependent file skipped"));

    let warnings = h.reporter.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("dependent file skipped"));

    assert_eq!(out.metrics.errors, 1);
    assert_eq!(out.metrics.skipped, 1);
    assert!(out.hashed_files.is_empty());
}

#[tokio::test]
async fn resolved_link_is_left_untouched() {
    let h = Harness::new();
    let link = "bafkreibm6jg3ux5qumhcn2b3flc3tyu6dmlb4xa7u5bf44yegnrjhc4yeq";
    let entries = vec![h.seed("prop-a", "p1"), {
        h.write_json(
            &format!("prop-a/{DEPENDENT}.json"),
            &json!({"label": "Owner", "relationships": {"owner": {"/": link}}}),
        );
        h.pending("prop-a", DEPENDENT)
    }];

    let out = h.orchestrator().run(entries).await.unwrap();
    let dep = out
        .hashed_files
        .iter()
        .find(|f| f.data_group_cid == DEPENDENT)
        .unwrap();
    assert_eq!(
        dep.canonical_json,
        format!(r#"{{"label":"Owner","relationships":{{"owner":{{"/":"{link}"}}}}}}"#)
    );
    assert_eq!(parse_cid(&dep.calculated_cid).unwrap().codec(), Codec::DagJson.code());
    assert_eq!(out.hashed_files.len(), 2);
}

#[tokio::test]
async fn key_order_does_not_change_cids() {
    let h = Harness::new();
    h.write(
        &format!("prop-a/{SEED}.json"),
        r#"{"label":"Property Seed","relationships":{"parcel_id":"p-1"}}"#,
    );
    h.write(
        &format!("prop-b/{SEED}.json"),
        "{\n  \"relationships\": { \"parcel_id\": \"p-1\" },\n  \"label\": \"Property Seed\"\n}",
    );
    let entries = vec![h.pending("prop-a", SEED), h.pending("prop-b", SEED)];

    let out = h.orchestrator().run(entries).await.unwrap();
    assert_eq!(out.hashed_files.len(), 2);
    assert_eq!(out.hashed_files[0].calculated_cid, out.hashed_files[1].calculated_cid);
    assert_eq!(out.hashed_files[0].canonical_json, out.hashed_files[1].canonical_json);
}

#[tokio::test]
async fn bad_shape_fails_every_user_identically() {
    let h = Harness::new();
    let mut entries = Vec::new();
    for dir in ["prop-a", "prop-b", "prop-c"] {
        entries.push(h.seed(dir, dir));
        h.write_json(&format!("{dir}/{BAD_SHAPE}.json"), &json!({"anything": dir}));
        entries.push(h.pending(dir, BAD_SHAPE));
    }

    let out = h.orchestrator().run(entries).await.unwrap();
    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.message == errors[0].message));
    assert!(errors[0].message.contains(BAD_SHAPE));
    assert!(errors[0].message.contains("lexicon"));
    assert_eq!(out.metrics.errors, 3);
    // Seed schema and the bad-shape schema, one fetch each.
    assert_eq!(h.cache.fetch_count(), 2);
}

#[tokio::test]
async fn pending_entry_without_seed_is_an_error() {
    let h = Harness::new();
    h.write_json(
        &format!("orphan/{DEPENDENT}.json"),
        &json!({"label": "x", "relationships": {}}),
    );
    let out = h
        .orchestrator()
        .run(vec![h.pending("orphan", DEPENDENT)])
        .await
        .unwrap();

    assert!(out.hashed_files.is_empty());
    assert_eq!(out.metrics.skipped, 1);
    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 1);
    let expected = FileError::MissingSeed {
        directory: h.root().join("orphan"),
    };
    assert_eq!(errors[0].message, expected.to_string());
}

#[tokio::test]
async fn linked_documents_become_hashed_files() {
    let h = Harness::new();
    h.write_json("prop-a/owners/owner.json", &json!({"name": "Ada"}));
    h.write_json(
        &format!("prop-a/{DEPENDENT}.json"),
        &json!({
            "label": "Owner",
            "relationships": {"owner": {"/": "./owners/owner.json"}, "photos": ["missing.png"]}
        }),
    );
    let entries = vec![h.seed("prop-a", "p"), h.pending("prop-a", DEPENDENT)];

    let out = h.orchestrator().run(entries).await.unwrap();
    assert_eq!(out.hashed_files.len(), 3);
    let owner = out
        .hashed_files
        .iter()
        .find(|f| f.original_path.ends_with("owners/owner.json"))
        .unwrap();
    assert_eq!(owner.canonical_json, r#"{"name":"Ada"}"#);

    let dep = out
        .hashed_files
        .iter()
        .find(|f| f.data_group_cid == DEPENDENT && f.original_path.ends_with(format!("{DEPENDENT}.json")))
        .unwrap();
    assert_eq!(owner.property_cid, dep.property_cid);
    assert!(dep.canonical_json.contains(&owner.calculated_cid));

    // The unresolved image is reported but does not fail the file.
    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_path, "prop-a/relationships/photos/0");
    assert_eq!(out.metrics.errors, 0);
}

#[tokio::test]
async fn strict_mode_validates_linked_owner() {
    let mut h = Harness::new();
    h.config.pipeline.resolve_local_refs = true;
    h.write_json("prop-a/owner.json", &json!({"name": 7}));
    h.write_json(
        &format!("prop-a/{DEPENDENT}.json"),
        &json!({"label": "Owner", "relationships": {"owner": {"/": "owner.json"}}}),
    );
    let entries = vec![h.seed("prop-a", "p"), h.pending("prop-a", DEPENDENT)];

    let out = h.orchestrator().run(entries).await.unwrap();
    assert!(out.validation_failed);
    let errors = h.reporter.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].error_path, "prop-a/relationships/owner/name");
    assert_eq!(errors[0].current_value, "7");
}

/// Delegates to a real validator while counting calls in flight.
struct CountingValidator {
    inner: Arc<dyn JsonValidator>,
    in_flight: AtomicUsize,
    max_seen: AtomicUsize,
}

#[async_trait]
impl JsonValidator for CountingValidator {
    async fn validate(
        &self,
        doc: &Value,
        schema: &Value,
        source_path: &std::path::Path,
        resolve_local_refs: bool,
    ) -> Result<ValidationResult, FileError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let r = self
            .inner
            .validate(doc, schema, source_path, resolve_local_refs)
            .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        r
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrency_never_exceeds_limit() {
    let mut h = Harness::new();
    h.config.pipeline.max_concurrency = Some(2);
    let mut entries = Vec::new();
    for i in 0..12 {
        entries.push(h.seed(&format!("prop-{i}"), &format!("parcel-{i}")));
    }

    let mut services = h.services();
    let counting = Arc::new(CountingValidator {
        inner: services.validator.clone(),
        in_flight: AtomicUsize::new(0),
        max_seen: AtomicUsize::new(0),
    });
    services.validator = counting.clone() as Arc<dyn JsonValidator>;

    let orchestrator = Orchestrator::new(services, &h.config);
    assert_eq!(orchestrator.concurrency(), 2);
    let out = orchestrator.run(entries).await.unwrap();

    assert_eq!(out.metrics.processed, 12);
    let max = counting.max_seen.load(Ordering::SeqCst);
    assert!((1..=2).contains(&max), "max in flight {max}");
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<(String, PathBuf)>>,
    phases: Mutex<Vec<Phase>>,
}

impl ProgressSink for RecordingProgress {
    fn on_phase(&self, phase: Phase) {
        self.phases.lock().push(phase);
    }

    fn on_file_started(&self, path: &std::path::Path) {
        self.events.lock().push(("start".into(), path.to_path_buf()));
    }

    fn on_file_finished(&self, path: &std::path::Path, _ok: bool) {
        self.events.lock().push(("finish".into(), path.to_path_buf()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn dependents_start_after_every_seed_finished() {
    let h = Harness::new();
    let mut entries = Vec::new();
    for dir in ["prop-a", "prop-b", "prop-c"] {
        h.write_json(
            &format!("{dir}/{DEPENDENT}.json"),
            &json!({"label": "x", "relationships": {}}),
        );
        entries.push(h.pending(dir, DEPENDENT));
        entries.push(h.seed(dir, dir));
    }

    let progress = Arc::new(RecordingProgress::default());
    let services = h.services().with_progress(progress.clone());
    let out = Orchestrator::new(services, &h.config).run(entries).await.unwrap();
    assert_eq!(out.metrics.processed, 6);

    let events = progress.events.lock().clone();
    let is_seed = |p: &PathBuf| p.ends_with(format!("{SEED}.json"));
    let last_seed_finish = events
        .iter()
        .rposition(|(kind, p)| kind == "finish" && is_seed(p))
        .unwrap();
    let first_dependent_start = events
        .iter()
        .position(|(kind, p)| kind == "start" && !is_seed(p))
        .unwrap();
    assert!(last_seed_finish < first_dependent_start);
    assert_eq!(
        *progress.phases.lock(),
        vec![Phase::RunningPipeline, Phase::Completed]
    );
}

#[tokio::test]
async fn repeated_runs_produce_identical_outputs() {
    let h = Harness::new();
    h.write("prop-a/front.jpg", b"img");
    h.write_json(
        &format!("prop-a/{DEPENDENT}.json"),
        &json!({"label": "Photos", "relationships": {"photos": ["front.jpg"]}}),
    );
    let entries = vec![h.seed("prop-a", "p"), h.pending("prop-a", DEPENDENT)];

    let first = h.orchestrator().run(entries.clone()).await.unwrap();
    let second = h.orchestrator().run(entries).await.unwrap();
    assert_eq!(first.hashed_files, second.hashed_files);
    assert_eq!(first.assets, second.assets);
    assert_ne!(first.metrics.run_id, second.metrics.run_id);
}
