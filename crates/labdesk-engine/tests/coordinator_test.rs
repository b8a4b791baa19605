#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Integration tests for the mutation coordinator: lock gating, in-flight
//! guards, settled-success cache patching, and event emission.

use std::sync::Arc;

use labdesk_api::error::LabApiError;
use labdesk_api::mock::{test_organism, test_patient, test_request, MockLabApi};
use labdesk_api::types::{
    ChildResultPatch, OrganismDraft, OrganismPatch, PopulateCbcParams, PopulateOutcome,
};
use labdesk_engine::cache::{CacheKey, CacheStatus, CacheStore, CacheValue};
use labdesk_engine::coordinator::{MutationCoordinator, MutationError};
use labdesk_engine::event::{InMemoryEventSink, MutationOutcome, OpKind};

struct Fixture {
    api: Arc<MockLabApi>,
    cache: Arc<CacheStore>,
    sink: Arc<InMemoryEventSink>,
    coordinator: Arc<MutationCoordinator>,
}

/// Mock backend plus a cache seeded the way a workstation would have it
/// after loading the queue and opening request 500 for patient 7.
fn fixture(api: MockLabApi) -> Fixture {
    let api = Arc::new(api);
    let cache = Arc::new(CacheStore::new(api.clone()));
    let sink = Arc::new(InMemoryEventSink::new());
    let coordinator = Arc::new(MutationCoordinator::new(
        api.clone(),
        cache.clone(),
        sink.clone(),
    ));
    Fixture {
        api,
        cache,
        sink,
        coordinator,
    }
}

fn seeded_fixture() -> Fixture {
    let fx = fixture(
        MockLabApi::new()
            .with_patient(test_patient(7, false))
            .with_request(test_request(500, 7))
            .with_request(test_request(600, 8)),
    );
    let request = test_request(500, 7);
    fx.cache.set(
        CacheKey::PendingQueue,
        CacheValue::PendingQueue(vec![request.clone(), test_request(600, 8)]),
    );
    fx.cache.apply_lab_request(request);
    fx.cache
        .set(CacheKey::PatientLock(7), CacheValue::PatientLock(false));
    fx
}

// ── Lock toggle ──

#[tokio::test]
async fn lock_flip_patches_every_cached_view_of_the_patient() {
    let fx = seeded_fixture();

    let patient = fx.coordinator.toggle_lock(7, true).await.unwrap();
    assert!(patient.result_locked);

    assert_eq!(fx.cache.patient_locked(7), Some(true));
    assert!(fx.cache.find_lab_request(500).unwrap().result_locked);
    match fx.cache.snapshot(CacheKey::PendingQueue).value {
        Some(CacheValue::PendingQueue(rows)) => {
            assert!(rows.iter().find(|r| r.id == 500).unwrap().result_locked);
            assert!(!rows.iter().find(|r| r.id == 600).unwrap().result_locked);
        }
        other => panic!("expected queue, got {other:?}"),
    }

    let events = fx.sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].op, OpKind::ToggleLock);
    assert_eq!(events[0].outcome, MutationOutcome::Success);
    assert_eq!(events[0].detail, "lock");
}

#[tokio::test]
async fn unlock_is_allowed_on_a_locked_patient() {
    let fx = seeded_fixture();
    fx.coordinator.toggle_lock(7, true).await.unwrap();

    let patient = fx.coordinator.toggle_lock(7, false).await.unwrap();
    assert!(!patient.result_locked);
    assert_eq!(fx.cache.patient_locked(7), Some(false));
    assert!(!fx.cache.find_lab_request(500).unwrap().result_locked);
}

// ── Lock gating (no network on rejection) ──

#[tokio::test]
async fn locked_results_reject_writes_before_any_network_call() {
    let fx = seeded_fixture();
    fx.coordinator.toggle_lock(7, true).await.unwrap();
    let calls_before = fx.api.call_count();

    let err = fx.coordinator.reset_to_default(500).await.unwrap_err();
    assert_eq!(err, MutationError::ResultLocked);
    let err = fx
        .coordinator
        .populate_cbc(
            500,
            PopulateCbcParams {
                visit_id: 10_500,
                main_test_id: 3,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, MutationError::ResultLocked);

    assert_eq!(fx.api.call_count(), calls_before);
}

#[tokio::test]
async fn organism_edits_are_rejected_under_a_patient_lock() {
    let fx = fixture(
        MockLabApi::new()
            .with_patient(test_patient(7, false))
            .with_request(test_request(500, 7))
            .with_organism(test_organism(11, 500, "E. coli")),
    );
    fx.cache.apply_lab_request(test_request(500, 7));
    fx.cache
        .set(CacheKey::PatientLock(7), CacheValue::PatientLock(false));
    fx.cache.set(
        CacheKey::Organisms(500),
        CacheValue::Organisms(vec![test_organism(11, 500, "E. coli")]),
    );

    fx.coordinator.toggle_lock(7, true).await.unwrap();
    let calls_before = fx.api.call_count();
    let list_before = fx.cache.snapshot(CacheKey::Organisms(500));

    let err = fx
        .coordinator
        .update_organism(
            11,
            OrganismPatch {
                resistant: Some("ampicillin".into()),
                ..OrganismPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, MutationError::ResultLocked);

    let err = fx.coordinator.delete_organism(11).await.unwrap_err();
    assert_eq!(err, MutationError::ResultLocked);

    let err = fx
        .coordinator
        .add_organism(
            500,
            OrganismDraft {
                organism: "S. aureus".into(),
                sensitive: String::new(),
                resistant: String::new(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err, MutationError::ResultLocked);

    assert_eq!(fx.api.call_count(), calls_before);
    assert_eq!(fx.cache.snapshot(CacheKey::Organisms(500)), list_before);
}

#[tokio::test]
async fn unknown_target_rejects_before_any_network_call() {
    let fx = fixture(MockLabApi::new());

    let err = fx.coordinator.reset_to_default(999).await.unwrap_err();
    assert_eq!(err, MutationError::SelectionRequired);
    assert_eq!(fx.api.call_count(), 0);
}

// ── In-flight guard ──

#[tokio::test]
async fn duplicate_submission_is_bounced_without_a_second_call() {
    let fx = seeded_fixture();
    fx.api.hold_op("reset_to_default");

    let first = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move { coordinator.reset_to_default(500).await })
    };
    while fx.api.count_op("reset_to_default") == 0 {
        tokio::task::yield_now().await;
    }

    let err = fx.coordinator.reset_to_default(500).await.unwrap_err();
    assert_eq!(err, MutationError::InFlight);
    assert_eq!(fx.api.count_op("reset_to_default"), 1);
    // The bounced duplicate is not an attempt and emits no event.
    assert_eq!(fx.sink.count(), 0);

    fx.api.release_op("reset_to_default");
    first.await.unwrap().unwrap();
    assert_eq!(fx.sink.count(), 1);

    // The guard is released once the call settles.
    fx.coordinator.reset_to_default(500).await.unwrap();
    assert_eq!(fx.api.count_op("reset_to_default"), 2);
}

#[tokio::test]
async fn same_op_on_different_targets_runs_concurrently() {
    let fx = seeded_fixture();
    fx.cache.apply_lab_request(test_request(600, 8));
    fx.cache
        .set(CacheKey::PatientLock(8), CacheValue::PatientLock(false));
    fx.api.hold_op("reset_to_default");

    let first = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move { coordinator.reset_to_default(500).await })
    };
    while fx.api.count_op("reset_to_default") == 0 {
        tokio::task::yield_now().await;
    }

    let second = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move { coordinator.reset_to_default(600).await })
    };
    while fx.api.count_op("reset_to_default") < 2 {
        tokio::task::yield_now().await;
    }

    fx.api.release_op("reset_to_default");
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
}

// ── No partial patch on failure ──

#[tokio::test]
async fn transport_failure_leaves_the_cache_untouched() {
    let fx = seeded_fixture();
    let before = [
        fx.cache.snapshot(CacheKey::LabRequest(500)),
        fx.cache.snapshot(CacheKey::ChildResults(500)),
        fx.cache.snapshot(CacheKey::PendingQueue),
        fx.cache.snapshot(CacheKey::PatientLock(7)),
    ];

    fx.api.fail_next_op(
        "populate_cbc",
        LabApiError::TransportUnavailable {
            message: "backend down".into(),
        },
    );
    let err = fx
        .coordinator
        .populate_cbc(
            500,
            PopulateCbcParams {
                visit_id: 10_500,
                main_test_id: 3,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MutationError::Api(ref inner) if inner.is_retryable()));

    let after = [
        fx.cache.snapshot(CacheKey::LabRequest(500)),
        fx.cache.snapshot(CacheKey::ChildResults(500)),
        fx.cache.snapshot(CacheKey::PendingQueue),
        fx.cache.snapshot(CacheKey::PatientLock(7)),
    ];
    assert_eq!(before, after);
}

#[tokio::test]
async fn populate_logical_failure_surfaces_the_server_message() {
    let fx = fixture(
        MockLabApi::new()
            .with_patient(test_patient(7, false))
            .with_request(test_request(500, 7))
            .with_populate_outcome(
                500,
                PopulateOutcome {
                    succeeded: false,
                    message: "no analyzer data for sample".into(),
                    request: None,
                },
            ),
    );
    fx.cache.apply_lab_request(test_request(500, 7));
    let before = fx.cache.snapshot(CacheKey::ChildResults(500));

    let err = fx
        .coordinator
        .populate_cbc(
            500,
            PopulateCbcParams {
                visit_id: 10_500,
                main_test_id: 3,
            },
        )
        .await
        .unwrap_err();

    assert_eq!(
        err,
        MutationError::LogicalFailure("no analyzer data for sample".into())
    );
    assert_eq!(fx.cache.snapshot(CacheKey::ChildResults(500)), before);
    assert_eq!(
        fx.sink.events()[0].outcome,
        MutationOutcome::Error("no analyzer data for sample".into())
    );
}

// ── Settled-success patching ──

#[tokio::test]
async fn reset_overwrites_request_and_panel_and_stales_the_queue() {
    let fx = seeded_fixture();

    let request = fx.coordinator.reset_to_default(500).await.unwrap();
    assert!(request.results.iter().all(|r| r.value.is_empty()));

    match fx.cache.snapshot(CacheKey::ChildResults(500)).value {
        Some(CacheValue::ChildResults(rows)) => assert!(rows[0].value.is_empty()),
        other => panic!("expected child results, got {other:?}"),
    }
    assert_eq!(
        fx.cache.snapshot(CacheKey::PendingQueue).status,
        CacheStatus::Stale
    );
}

#[tokio::test]
async fn populate_success_applies_the_returned_request() {
    let fx = seeded_fixture();

    let outcome = fx
        .coordinator
        .populate_cbc(
            500,
            PopulateCbcParams {
                visit_id: 10_500,
                main_test_id: 3,
            },
        )
        .await
        .unwrap();
    assert!(outcome.succeeded);
    assert_eq!(
        fx.cache.snapshot(CacheKey::LabRequest(500)).status,
        CacheStatus::Fresh
    );
    // The event carries the server's message.
    assert_eq!(fx.sink.events()[0].detail, "ok");
}

#[tokio::test]
async fn child_result_edit_patches_the_cached_row() {
    let fx = seeded_fixture();
    let row_id = fx.cache.find_lab_request(500).unwrap().results[0].id;

    let row = fx
        .coordinator
        .update_child_result(
            500,
            ChildResultPatch {
                child_result_id: row_id,
                value: "14.2".into(),
            },
        )
        .await
        .unwrap();
    assert_eq!(row.value, "14.2");

    match fx.cache.snapshot(CacheKey::ChildResults(500)).value {
        Some(CacheValue::ChildResults(rows)) => assert_eq!(rows[0].value, "14.2"),
        other => panic!("expected child results, got {other:?}"),
    }
    assert_eq!(fx.cache.find_lab_request(500).unwrap().results[0].value, "14.2");
}

#[tokio::test]
async fn child_result_edit_rejects_a_foreign_row_without_network() {
    let fx = seeded_fixture();
    let calls_before = fx.api.call_count();

    let err = fx
        .coordinator
        .update_child_result(
            500,
            ChildResultPatch {
                child_result_id: 999,
                value: "14.2".into(),
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err, MutationError::SelectionRequired);
    assert_eq!(fx.api.call_count(), calls_before);
}

// ── Organisms ──

#[tokio::test]
async fn organism_lifecycle_patches_the_cached_list() {
    let fx = seeded_fixture();
    fx.cache
        .set(CacheKey::Organisms(500), CacheValue::Organisms(Vec::new()));

    let record = fx
        .coordinator
        .add_organism(
            500,
            OrganismDraft {
                organism: "E. coli".into(),
                sensitive: "gentamicin".into(),
                resistant: String::new(),
            },
        )
        .await
        .unwrap();
    assert_eq!(fx.cache.find_organism(record.id).unwrap().organism, "E. coli");

    fx.coordinator
        .update_organism(
            record.id,
            OrganismPatch {
                resistant: Some("ampicillin".into()),
                ..OrganismPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        fx.cache.find_organism(record.id).unwrap().resistant,
        "ampicillin"
    );

    fx.coordinator.delete_organism(record.id).await.unwrap();
    assert!(fx.cache.find_organism(record.id).is_none());
    assert_eq!(fx.sink.count(), 3);
}

#[tokio::test]
async fn slow_organism_update_blocks_delete_of_the_same_row() {
    let fx = fixture(
        MockLabApi::new()
            .with_patient(test_patient(7, false))
            .with_request(test_request(500, 7))
            .with_organism(test_organism(11, 500, "E. coli")),
    );
    fx.cache.apply_lab_request(test_request(500, 7));
    fx.cache
        .set(CacheKey::PatientLock(7), CacheValue::PatientLock(false));
    fx.cache.set(
        CacheKey::Organisms(500),
        CacheValue::Organisms(vec![test_organism(11, 500, "E. coli")]),
    );
    fx.api.hold_op("update_organism");

    let update = {
        let coordinator = fx.coordinator.clone();
        tokio::spawn(async move {
            coordinator
                .update_organism(
                    11,
                    OrganismPatch {
                        sensitive: Some("gentamicin".into()),
                        ..OrganismPatch::default()
                    },
                )
                .await
        })
    };
    while fx.api.count_op("update_organism") == 0 {
        tokio::task::yield_now().await;
    }

    let err = fx.coordinator.delete_organism(11).await.unwrap_err();
    assert_eq!(err, MutationError::InFlight);
    assert_eq!(fx.api.count_op("delete_organism"), 0);

    fx.api.release_op("update_organism");
    update.await.unwrap().unwrap();

    fx.coordinator.delete_organism(11).await.unwrap();
    assert!(fx.cache.find_organism(11).is_none());
}

// ── Event trail ──

#[tokio::test]
async fn every_attempt_emits_exactly_one_event() {
    let fx = seeded_fixture();

    fx.coordinator.reset_to_default(500).await.unwrap();
    fx.coordinator.toggle_lock(7, true).await.unwrap();
    let _ = fx.coordinator.reset_to_default(500).await.unwrap_err();

    let events = fx.sink.events();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].outcome, MutationOutcome::Success);
    assert_eq!(events[1].outcome, MutationOutcome::Success);
    assert!(matches!(events[2].outcome, MutationOutcome::Error(_)));
    assert_eq!(events[2].op, OpKind::ResetToDefault);
}
