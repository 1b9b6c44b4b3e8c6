//! Lifecycle tests against the in-memory DataSource service.

use crud_contract::{
    CrudVerifier, Mutation, ResourceSpec, RunReport, Step, StepOutcome, VerifierConfig, Violation,
};
use rust_common::{HttpConfig, RetryConfig, RetryPolicy};
use serde_json::json;
use std::time::Duration;
use test_utils::fixtures::{UPDATED_CRON, sample_datasource};
use test_utils::{COLLECTION_PATH, Defects, EnvelopeStyle, MockDataSourceService};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ROUND_TRIP: &[&str] = &[
    "name",
    "supplierName",
    "category",
    "filePath",
    "filePattern",
    "cronExpression",
    "isActive",
    "jsonSchema",
];

fn spec(token: &str) -> ResourceSpec {
    let fields = sample_datasource(token).as_object().cloned().unwrap();
    ResourceSpec::from(fields)
}

fn round_trip() -> Vec<String> {
    ROUND_TRIP.iter().map(ToString::to_string).collect()
}

fn mutation() -> Mutation {
    Mutation::new().set("cronExpression", UPDATED_CRON)
}

fn verifier(url: &str) -> CrudVerifier {
    let config = VerifierConfig::new(url)
        .unwrap()
        .with_settle_delay(Duration::ZERO)
        .with_http(HttpConfig::default().with_timeout(Duration::from_secs(5)));
    CrudVerifier::new(config).unwrap()
}

async fn run_against(mock: &MockDataSourceService, token: &str) -> RunReport {
    verifier(&mock.collection_url())
        .run(&spec(token), &round_trip(), &mutation())
        .await
}

/// A server that creates record `a1` and answers its read with `read`.
async fn server_reading_back(read: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(COLLECTION_PATH))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"success": true, "data": {"id": "a1"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{COLLECTION_PATH}/a1")))
        .respond_with(read)
        .mount(&server)
        .await;
    server
}

fn outcome(report: &RunReport, step: Step) -> StepOutcome {
    report.step(step).unwrap().outcome()
}

#[tokio::test]
async fn test_well_behaved_service_passes_every_step() {
    let mock = MockDataSourceService::start().await;

    let report = run_against(&mock, "pass").await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.passed(), 5);
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.discrepancies().count(), 0);
    assert!(report.residue().is_none());
    assert_eq!(mock.records_created(), 1);
    assert_eq!(mock.live_records(), 0);
    assert_eq!(mock.last_deleted_by().as_deref(), Some("AutoTest"));
}

#[tokio::test]
async fn test_pascal_case_service_passes_with_advisories() {
    let mock = MockDataSourceService::start_with(EnvelopeStyle::PascalWrapped, Defects::default()).await;

    let report = run_against(&mock, "pascal").await;

    assert!(report.is_success(), "{report}");
    assert!(report.discrepancies().count() > 0);
    assert!(report.discrepancies().all(Violation::is_advisory));
    assert!(report.to_string().contains("ADVISORIES:"));
}

#[tokio::test]
async fn test_bare_documents_pass() {
    let mock = MockDataSourceService::start_with(EnvelopeStyle::Bare, Defects::default()).await;

    let report = run_against(&mock, "bare").await;

    assert!(report.is_success(), "{report}");
}

#[tokio::test]
async fn test_update_accepted_but_not_applied() {
    let defects = Defects {
        ignore_updates: true,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "ignored").await;

    assert_eq!(outcome(&report, Step::Update), StepOutcome::Failed);
    assert!(report.discrepancies().any(|v| matches!(
        v,
        Violation::UpdateNotApplied { field, .. } if field == "cronExpression"
    )));
    assert_eq!(outcome(&report, Step::Delete), StepOutcome::Passed);
    assert_eq!(outcome(&report, Step::VerifyAbsent), StepOutcome::Passed);
    assert_eq!(report.passed(), 4);
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn test_update_clobbering_other_fields_fails() {
    let defects = Defects {
        clobber_on_update: Some("category".to_string()),
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "clobber").await;

    assert_eq!(outcome(&report, Step::Update), StepOutcome::Failed);
    assert!(report.discrepancies().any(|v| matches!(
        v,
        Violation::FieldMismatch { step: Step::Update, field, .. } if field == "category"
    )));
}

#[tokio::test]
async fn test_update_with_no_content_is_reverified() {
    let defects = Defects {
        update_status: 204,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "nocontent").await;

    assert!(report.is_success(), "{report}");
    assert_eq!(report.step(Step::Update).unwrap().status(), Some(204));
}

#[tokio::test]
async fn test_soft_deleted_record_still_readable() {
    let defects = Defects {
        soft_delete_visible: true,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "soft").await;

    assert_eq!(outcome(&report, Step::Delete), StepOutcome::Passed);
    assert_eq!(outcome(&report, Step::VerifyAbsent), StepOutcome::Failed);
    assert!(report.discrepancies().any(|v| matches!(v, Violation::RecordStillPresent { status: 200 })));

    let Some(Violation::ResidualRecord {
        identifier: Some(id),
        location,
        ..
    }) = report.residue()
    else {
        panic!("expected a residue advisory: {report}");
    };
    assert!(location.starts_with(&mock.uri()));
    assert!(location.ends_with(id.as_str()));
    assert!(mock.record(id).is_some());
}

#[tokio::test]
async fn test_missing_identifier_skips_remaining_steps() {
    let defects = Defects {
        omit_identifier: true,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::PascalWrapped, defects).await;

    let report = run_against(&mock, "noid").await;

    assert_eq!(outcome(&report, Step::Create), StepOutcome::Failed);
    assert!(matches!(
        report.step(Step::Create).unwrap().violations(),
        [Violation::NoIdentifierReturned { status: 201, .. }]
    ));
    for step in &Step::ALL[1..] {
        assert_eq!(outcome(&report, *step), StepOutcome::Skipped);
    }
    assert_eq!(report.total(), 5);
    assert_eq!(mock.records_created(), 1);
    assert_eq!(mock.live_records(), 1);

    let Some(Violation::ResidualRecord {
        identifier,
        natural_key,
        location,
    }) = report.residue()
    else {
        panic!("expected a residue advisory: {report}");
    };
    assert_eq!(identifier, &None);
    assert_eq!(natural_key.as_deref(), Some("CRUD_TEST_noid"));
    assert_eq!(location, &mock.collection_url());
    assert!(report.to_string().contains("named `CRUD_TEST_noid`"));
}

#[tokio::test]
async fn test_rejected_create() {
    let defects = Defects {
        reject_create_status: Some(400),
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "rejected").await;

    assert!(matches!(
        report.step(Step::Create).unwrap().violations(),
        [Violation::UnexpectedStatus { actual: 400, body_excerpt, .. }] if body_excerpt.contains("validation failed")
    ));
    assert_eq!(report.passed(), 0);
    assert_eq!(mock.records_created(), 0);
}

#[tokio::test]
async fn test_dropped_field_fails_read_only() {
    let defects = Defects {
        drop_fields: vec!["filePattern".to_string()],
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;

    let report = run_against(&mock, "dropped").await;

    assert_eq!(outcome(&report, Step::Read), StepOutcome::Failed);
    let read = report.step(Step::Read).unwrap();
    assert!(matches!(
        read.violations(),
        [Violation::FieldMismatch { field, actual: None, .. }] if field == "filePattern"
    ));
    assert_eq!(outcome(&report, Step::Update), StepOutcome::Passed);
    assert_eq!(report.passed(), 4);
}

#[tokio::test]
async fn test_unreachable_service_aborts_after_create() {
    let config = VerifierConfig::new("http://127.0.0.1:1/api/v1/DataSource")
        .unwrap()
        .with_settle_delay(Duration::ZERO)
        .with_http(HttpConfig::default().with_connect_timeout(Duration::from_secs(1)));
    let verifier = CrudVerifier::new(config).unwrap();

    let report = verifier.run(&spec("down"), &round_trip(), &mutation()).await;

    assert_eq!(report.total(), 5);
    assert_eq!(report.passed(), 0);
    assert!(matches!(
        report.step(Step::Create).unwrap().violations(),
        [Violation::Transport { step: Step::Create, .. }]
    ));
    assert!(report.infrastructure_failure().is_some());
    for step in &Step::ALL[1..] {
        let result = report.step(*step).unwrap();
        assert_eq!(result.outcome(), StepOutcome::Skipped);
        assert_eq!(result.message(), Some("aborted after transport failure in CREATE"));
    }
    assert!(report.to_string().contains("service unreachable"));
}

#[tokio::test]
async fn test_read_timeout_aborts_and_reports_residue() {
    let slow = ResponseTemplate::new(200)
        .set_body_json(json!({"data": {"id": "a1"}}))
        .set_delay(Duration::from_secs(3));
    let server = server_reading_back(slow).await;
    let url = format!("{}{COLLECTION_PATH}", server.uri());
    let config = VerifierConfig::new(&url)
        .unwrap()
        .with_settle_delay(Duration::ZERO)
        .with_http(HttpConfig::default().with_timeout(Duration::from_millis(300)));
    let verifier = CrudVerifier::new(config).unwrap();

    let report = verifier.run(&spec("slow"), &round_trip(), &mutation()).await;

    assert_eq!(report.total(), 5);
    assert_eq!(outcome(&report, Step::Create), StepOutcome::Passed);
    assert!(matches!(
        report.step(Step::Read).unwrap().violations(),
        [Violation::Transport { step: Step::Read, .. }]
    ));
    for step in [Step::Update, Step::Delete, Step::VerifyAbsent] {
        let result = report.step(step).unwrap();
        assert_eq!(result.outcome(), StepOutcome::Skipped);
        assert_eq!(result.message(), Some("aborted after transport failure in READ"));
    }
    assert!(report.infrastructure_failure().is_some());
    assert!(matches!(
        report.residue(),
        Some(Violation::ResidualRecord { identifier: Some(id), location, .. })
            if id == "a1" && location == &format!("{url}/a1")
    ));
}

#[tokio::test]
async fn test_read_with_different_identifier() {
    let mut record = spec("drift").fields().clone();
    record.insert("id".to_string(), json!("zz"));
    let read = ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": record}));
    let server = server_reading_back(read).await;

    let report = verifier(&format!("{}{COLLECTION_PATH}", server.uri()))
        .run(&spec("drift"), &round_trip(), &mutation())
        .await;

    assert_eq!(outcome(&report, Step::Read), StepOutcome::Failed);
    assert_eq!(
        report.step(Step::Read).unwrap().violations(),
        [Violation::IdentifierChanged {
            step: Step::Read,
            expected: "a1".to_string(),
            actual: "zz".to_string(),
        }]
    );
}

#[tokio::test]
async fn test_read_with_unusable_body() {
    let cases: [(ResponseTemplate, &str); 2] = [
        (
            ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"),
            "not JSON",
        ),
        (
            ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": "gone"})),
            "expected a JSON object",
        ),
    ];

    for (read, reason_prefix) in cases {
        let server = server_reading_back(read).await;

        let report = verifier(&format!("{}{COLLECTION_PATH}", server.uri()))
            .run(&spec("garbled"), &round_trip(), &mutation())
            .await;

        let violations = report.step(Step::Read).unwrap().violations();
        assert!(
            matches!(
                violations,
                [Violation::InvalidBody { step: Step::Read, reason }] if reason.starts_with(reason_prefix)
            ),
            "{violations:?}"
        );
        assert_eq!(report.step(Step::Read).unwrap().status(), Some(200));
        assert_eq!(report.total(), 5);
    }
}

#[tokio::test]
async fn test_concurrent_runs_do_not_interfere() {
    let mock = MockDataSourceService::start().await;
    let verifier = verifier(&mock.collection_url());
    let (first, second) = (spec("first"), spec("second"));
    let (fields, change) = (round_trip(), mutation());

    let (a, b) = tokio::join!(
        verifier.run(&first, &fields, &change),
        verifier.run(&second, &fields, &change),
    );

    assert!(a.is_success(), "{a}");
    assert!(b.is_success(), "{b}");
    assert_eq!(mock.records_created(), 2);
    assert_eq!(mock.live_records(), 0);
}

#[tokio::test]
async fn test_delete_without_audit_actor() {
    let mock = MockDataSourceService::start().await;
    let config = VerifierConfig::new(&mock.collection_url())
        .unwrap()
        .with_settle_delay(Duration::ZERO)
        .with_deleted_by(None);
    let verifier = CrudVerifier::new(config).unwrap();

    let report = verifier.run(&spec("noaudit"), &round_trip(), &mutation()).await;

    assert!(report.is_success(), "{report}");
    assert_eq!(mock.last_deleted_by(), None);
}

#[tokio::test]
async fn test_summarize_collection() {
    let defects = Defects {
        soft_delete_visible: true,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::PascalWrapped, defects).await;
    mock.seed(sample_datasource("a"));
    mock.seed(sample_datasource("b"));
    let verifier = verifier(&mock.collection_url());

    let summary = verifier.summarize_collection().await.unwrap();
    assert_eq!((summary.total, summary.active), (2, 2));

    let report = verifier.run(&spec("c"), &round_trip(), &mutation()).await;
    assert_eq!(outcome(&report, Step::VerifyAbsent), StepOutcome::Failed);

    let summary = verifier.summarize_collection().await.unwrap();
    assert_eq!((summary.total, summary.active), (3, 2));
    assert!(!summary.is_empty());
}

#[tokio::test]
async fn test_empty_collection() {
    let mock = MockDataSourceService::start_with(EnvelopeStyle::Bare, Defects::default()).await;

    let summary = verifier(&mock.collection_url())
        .summarize_collection()
        .await
        .unwrap();

    assert!(summary.is_empty());
    assert_eq!(summary.total, 0);
}

#[tokio::test]
async fn test_wait_until_ready() {
    let defects = Defects {
        unavailable_probes: 2,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;
    let verifier = verifier(&mock.collection_url());
    let policy = RetryPolicy::new(RetryConfig::fixed(5, Duration::from_millis(10)));

    let attempts = verifier.wait_until_ready(&policy).await.unwrap();

    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_wait_until_ready_gives_up() {
    let defects = Defects {
        unavailable_probes: 10,
        ..Defects::default()
    };
    let mock = MockDataSourceService::start_with(EnvelopeStyle::default(), defects).await;
    let verifier = verifier(&mock.collection_url());
    let policy = RetryPolicy::new(RetryConfig::fixed(2, Duration::from_millis(10)));

    let result = verifier.wait_until_ready(&policy).await;

    assert!(result.is_err());
}
