//! Run lifecycle integration tests.
//!
//! These drive complete runs through the coordinator with an in-memory file
//! source, a scripted endpoint and a real SQLite audit store:
//! discovery -> staging -> parse -> select -> dispatch -> verdict -> archive

use std::sync::Arc;

use tempfile::TempDir;

use deactivator_core::{
    audit::{AuditFilter, AuditStore, SqliteAuditStore},
    coordinator::{abort_before_run, FatalError, RunOutcome, RunStatus},
    dispatch::ErrorKind,
    endpoint::{EndpointResponse, ALREADY_EXPIRED_CODE},
    load_config_from_str,
    outcome::{AlertClass, Verdict},
    testing::{fixtures, FlakyAuditStore, MockEndpoint, MockFileSource, MockNotifier, MockReply},
    Config, FileState, LockError, RunCoordinator, RunLock,
};

const FILE_1: &str = "NGIN_DataFile_20240101080000.xml";
const FILE_2: &str = "NGIN_DataFile_20240102080000.xml";

/// Test helper wiring a coordinator to mocks.
struct TestHarness {
    source: Arc<MockFileSource>,
    endpoint: Arc<MockEndpoint>,
    notifier: Arc<MockNotifier>,
    audit: Arc<SqliteAuditStore>,
    config: Config,
    temp_dir: TempDir,
}

impl TestHarness {
    fn new() -> Self {
        Self::with_threshold(0.95)
    }

    fn with_threshold(threshold: f64) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        let ranges = fixtures::ranges();

        let toml = format!(
            r#"
[source]
root = '{root}/pickup'
staging_dir = '{root}/staging'

[[ranges]]
name = "{a_name}"
start = "{a_start}"
end = "{a_end}"

[[ranges]]
name = "{b_name}"
start = "{b_start}"
end = "{b_end}"

[dispatch]
chunk_size = 10
chunk_cooldown_ms = 0
concurrency = 4
max_attempts = 3
base_delay_ms = 5
call_timeout_secs = 5

[policy]
success_threshold = {threshold}

[endpoint]
base_url = "http://rsp.invalid"
access_key = "ak"
secret_key = "sk"

[audit]
path = '{root}/audit.db'
write_retry_delay_ms = 1

[notify]
reports_dir = '{root}/reports'

[run]
lock_path = '{root}/run.lock'
"#,
            root = root.display(),
            a_name = ranges[0].name,
            a_start = ranges[0].start,
            a_end = ranges[0].end,
            b_name = ranges[1].name,
            b_start = ranges[1].start,
            b_end = ranges[1].end,
        );
        let config = load_config_from_str(&toml).expect("Failed to parse test config");
        deactivator_core::validate_config(&config).expect("Test config is invalid");

        let audit =
            Arc::new(SqliteAuditStore::new(&config.audit.path).expect("Failed to create audit store"));

        Self {
            source: Arc::new(MockFileSource::new()),
            endpoint: Arc::new(MockEndpoint::new()),
            notifier: Arc::new(MockNotifier::new()),
            audit,
            config,
            temp_dir,
        }
    }

    fn coordinator(&self) -> RunCoordinator {
        self.coordinator_with_store(self.audit.clone())
    }

    fn coordinator_with_store(&self, store: Arc<dyn AuditStore>) -> RunCoordinator {
        RunCoordinator::from_config(
            &self.config,
            self.source.clone(),
            self.endpoint.clone(),
            store,
            self.notifier.clone(),
        )
        .expect("Failed to build coordinator")
    }

    fn audit_count(&self, event_type: &str) -> i64 {
        self.audit
            .count(&AuditFilter::new().with_event_type(event_type))
            .unwrap()
    }
}

/// `n` in-scope identifiers from range A.
fn esim_ids(n: u64) -> Vec<String> {
    (0..n).map(fixtures::esim_id).collect()
}

fn export(ids: &[String]) -> Vec<u8> {
    let records: Vec<_> = ids.iter().map(|id| fixtures::deactivate(id.clone())).collect();
    fixtures::export_xml(&records)
}

#[tokio::test]
async fn test_happy_path_archives_file() {
    let h = TestHarness::new();

    // 203 records: 4 in range A, 3 in range B, the rest physical SIMs.
    let mut ids: Vec<String> = (0..4).map(fixtures::esim_id).collect();
    ids.extend((0..3).map(fixtures::esim_id_b));
    ids.extend((0..196).map(fixtures::physical_id));
    h.source.add_file(FILE_1, &export(&ids));

    let report = h.coordinator().run().await;

    assert_eq!(report.outcome, RunOutcome::Success);
    assert_eq!(report.status(), RunStatus::Success);
    assert_eq!(report.files.len(), 1);

    let file = &report.files[0];
    assert_eq!(file.records_parsed, 203);
    assert_eq!(file.out_of_range, 196);
    assert_eq!(file.outcome.total, 7);
    assert_eq!(file.outcome.succeeded, 7);
    assert_eq!(file.outcome.verdict, Verdict::Complete);
    assert_eq!(file.outcome.alert, AlertClass::FullSuccess);
    assert_eq!(file.final_state, FileState::Archived);

    assert_eq!(h.endpoint.total_calls(), 7);
    assert_eq!(h.endpoint.calls_for(&fixtures::esim_id_b(2)), 1);
    assert_eq!(h.endpoint.calls_for(&fixtures::physical_id(0)), 0);
    assert_eq!(
        h.source.relocated(),
        vec![(FILE_1.to_string(), "done".to_string())]
    );

    assert_eq!(h.notifier.reports().len(), 1);
    assert_eq!(h.audit_count("run_started"), 1);
    assert_eq!(h.audit_count("run_finished"), 1);
    assert_eq!(h.audit_count("deactivation_attempt"), 7);

    // Staged copies do not outlive the run.
    let staging = h.temp_dir.path().join("staging");
    assert_eq!(std::fs::read_dir(&staging).unwrap().count(), 0);
}

#[tokio::test]
async fn test_no_candidate_files() {
    let h = TestHarness::new();
    h.source.add_file("unrelated.csv", b"a,b,c");

    let report = h.coordinator().run().await;

    assert_eq!(report.outcome, RunOutcome::NoData);
    assert_eq!(report.status().exit_code(), 0);
    assert!(report.files.is_empty());
    assert_eq!(h.endpoint.total_calls(), 0);
    assert_eq!(h.notifier.reports().len(), 1);
}

#[tokio::test]
async fn test_partial_failure_then_rerun_completes() {
    let h = TestHarness::new();
    let ids = esim_ids(10);
    h.source.add_file(FILE_1, &export(&ids));
    for id in &ids[..2] {
        h.endpoint.script(id, vec![MockReply::Status(500); 3]);
    }

    let first = h.coordinator().run().await;

    assert_eq!(first.outcome, RunOutcome::Partial);
    assert_eq!(first.status().exit_code(), 2);
    let file = &first.files[0];
    assert_eq!(file.outcome.succeeded, 8);
    assert_eq!(file.outcome.failed, 2);
    assert_eq!(file.outcome.alert, AlertClass::PartialEscalate);
    assert_eq!(file.final_state, FileState::PendingRetry);
    assert_eq!(
        file.outcome.errors_by_kind.get(&ErrorKind::TransientEndpointError),
        Some(&6)
    );
    assert_eq!(h.source.file_names(), vec![FILE_1]);

    // Next run: the platform reports the 8 already handled as expired.
    h.endpoint.set_default(MockReply::Response(EndpointResponse::new(
        200,
        Some(ALREADY_EXPIRED_CODE),
        "",
    )));
    for id in &ids[..2] {
        h.endpoint
            .script(id, vec![MockReply::Response(EndpointResponse::success())]);
    }

    let second = h.coordinator().run().await;

    assert_eq!(second.outcome, RunOutcome::Success);
    let file = &second.files[0];
    assert_eq!(file.outcome.succeeded, 10);
    assert_eq!(file.outcome.already_expired, 8);
    assert_eq!(file.final_state, FileState::Archived);
    assert!(h.source.file_names().is_empty());
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_unparsable_file_is_skipped() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, b"<SiebelMessage><CvtNginPrepaidData><ICCID>8923");
    h.source.add_file(FILE_2, &export(&esim_ids(3)));

    let report = h.coordinator().run().await;

    assert_eq!(report.outcome, RunOutcome::Partial);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].file, FILE_1);
    assert_eq!(report.skipped[0].error_kind, ErrorKind::UnparsableFile);

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].outcome.file, FILE_2);
    assert_eq!(report.files[0].final_state, FileState::Archived);
    assert_eq!(h.source.file_names(), vec![FILE_1]);
}

#[tokio::test]
async fn test_threshold_boundary() {
    // 19 of 20 meets 0.95.
    let h = TestHarness::new();
    let ids = esim_ids(20);
    h.source.add_file(FILE_1, &export(&ids));
    h.endpoint.script(&ids[0], vec![MockReply::Status(404); 3]);

    let report = h.coordinator().run().await;
    let file = &report.files[0];
    assert_eq!(file.outcome.succeeded, 19);
    assert_eq!(file.outcome.verdict, Verdict::Complete);
    assert_eq!(file.outcome.alert, AlertClass::SuccessWithRetries);
    assert_eq!(file.final_state, FileState::Archived);
    assert_eq!(file.outcome.failed_tasks.len(), 1);

    // 18 of 20 does not.
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&ids));
    h.endpoint.script(&ids[0], vec![MockReply::Status(404); 3]);
    h.endpoint.script(&ids[1], vec![MockReply::Timeout; 3]);

    let report = h.coordinator().run().await;
    let file = &report.files[0];
    assert_eq!(file.outcome.succeeded, 18);
    assert_eq!(file.outcome.verdict, Verdict::Incomplete);
    assert_eq!(file.final_state, FileState::PendingRetry);
}

#[tokio::test]
async fn test_duplicates_are_dispatched_once() {
    let h = TestHarness::new();
    let a = fixtures::esim_id(1);
    let b = fixtures::esim_id(2);
    h.source
        .add_file(FILE_1, &export(&[a.clone(), b.clone(), a.clone(), a.clone()]));

    let report = h.coordinator().run().await;

    let file = &report.files[0];
    assert_eq!(file.outcome.total, 2);
    assert_eq!(file.duplicates, 2);
    assert_eq!(h.endpoint.calls_for(&a), 1);
    assert_eq!(h.endpoint.calls_for(&b), 1);
}

#[tokio::test]
async fn test_files_are_processed_oldest_first() {
    let h = TestHarness::new();
    h.source.add_file(FILE_2, &export(&[fixtures::esim_id(2)]));
    h.source.add_file(FILE_1, &export(&[fixtures::esim_id(1)]));

    let report = h.coordinator().run().await;

    let order: Vec<_> = report.files.iter().map(|f| f.outcome.file.as_str()).collect();
    assert_eq!(order, vec![FILE_1, FILE_2]);
    assert_eq!(
        h.endpoint.call_order(),
        vec![fixtures::esim_id(1), fixtures::esim_id(2)]
    );
}

#[tokio::test]
async fn test_lock_contention_does_nothing() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&esim_ids(1)));
    let _held = RunLock::try_acquire(&h.config.run.lock_path).unwrap();

    let result = h.coordinator().run_locked(&h.config.run.lock_path).await;

    assert!(matches!(result, Err(LockError::AlreadyHeld(_))));
    assert!(h.source.fetched().is_empty());
    assert!(h.notifier.reports().is_empty());
    assert_eq!(h.audit_count("run_started"), 0);
}

#[tokio::test]
async fn test_run_locked_runs_when_free() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&esim_ids(1)));

    let report = h
        .coordinator()
        .run_locked(&h.config.run.lock_path)
        .await
        .unwrap();
    assert_eq!(report.outcome, RunOutcome::Success);

    // Released afterwards.
    assert!(RunLock::try_acquire(&h.config.run.lock_path).is_ok());
}

#[tokio::test]
async fn test_total_authorization_failure_aborts_run() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&esim_ids(3)));
    h.source.add_file(FILE_2, &export(&[fixtures::esim_id(50)]));
    h.endpoint.set_default(MockReply::Status(401));

    let report = h.coordinator().run().await;

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert_eq!(report.status().exit_code(), 1);
    assert!(report.files.is_empty());
    let fatal = report.fatal_error.as_ref().unwrap();
    assert_eq!(fatal.error_kind, ErrorKind::AuthorizationError);
    assert_eq!(fatal.file.as_deref(), Some(FILE_1));
    assert!(fatal.message.contains("all 3 task(s)"), "{}", fatal.message);

    // Nothing archived, second file never touched.
    assert_eq!(h.source.file_names(), vec![FILE_1, FILE_2]);
    assert_eq!(h.source.fetched(), vec![FILE_1]);
    assert_eq!(h.audit_count("run_aborted"), 1);
    assert_eq!(h.notifier.last_report().unwrap().outcome, RunOutcome::Fatal);
}

#[tokio::test]
async fn test_unreachable_source_is_fatal() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&esim_ids(1)));
    h.source.set_unavailable(true);

    let report = h.coordinator().run().await;

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert_eq!(
        report.fatal_error.unwrap().error_kind,
        ErrorKind::SourceUnavailable
    );
    assert_eq!(h.endpoint.total_calls(), 0);
}

#[tokio::test]
async fn test_audit_outage_is_a_warning_not_a_failure() {
    let h = TestHarness::new();
    h.source.add_file(FILE_1, &export(&esim_ids(2)));
    let store = Arc::new(FlakyAuditStore::always_failing());

    let report = h.coordinator_with_store(store.clone()).run().await;

    assert_eq!(report.outcome, RunOutcome::Success);
    let file = &report.files[0];
    assert_eq!(file.final_state, FileState::Archived);
    assert!(file.outcome.audit_failures > 0);
    assert!(file
        .outcome
        .errors_by_kind
        .contains_key(&ErrorKind::PersistenceError));
    assert!(!report.warnings.is_empty());
    assert!(store.records().is_empty());
}

#[tokio::test]
async fn test_config_threshold_is_honored() {
    let h = TestHarness::with_threshold(0.5);
    let ids = esim_ids(4);
    h.source.add_file(FILE_1, &export(&ids));
    h.endpoint.script(&ids[0], vec![MockReply::ConnectError; 3]);
    h.endpoint.script(&ids[1], vec![MockReply::Status(503); 3]);

    let report = h.coordinator().run().await;

    assert_eq!(report.files[0].outcome.success_rate, 0.5);
    assert_eq!(report.files[0].final_state, FileState::Archived);
}

#[tokio::test]
async fn test_setup_failure_still_notifies() {
    let notifier = MockNotifier::new();

    let report = abort_before_run(
        &notifier,
        FatalError {
            error_kind: ErrorKind::PersistenceError,
            message: "Failed to create audit store".to_string(),
            file: None,
        },
    )
    .await;

    assert_eq!(report.status(), RunStatus::Fatal);
    assert_eq!(report.status().exit_code(), 1);
    let sent = notifier.last_report().unwrap();
    assert_eq!(sent.run_id, report.run_id);
    assert_eq!(sent.outcome, RunOutcome::Fatal);
    assert!(sent.files.is_empty());
    assert_eq!(
        sent.fatal_error.unwrap().error_kind,
        ErrorKind::PersistenceError
    );
}

#[tokio::test]
async fn test_setup_failure_survives_failing_notifier() {
    let notifier = MockNotifier::new();
    notifier.set_failing(true);

    let report = abort_before_run(
        &notifier,
        FatalError {
            error_kind: ErrorKind::PersistenceError,
            message: "lock file unwritable".to_string(),
            file: None,
        },
    )
    .await;

    assert_eq!(report.outcome, RunOutcome::Fatal);
    assert!(notifier.reports().is_empty());
}
