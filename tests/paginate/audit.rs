use std::sync::Arc;

use httpmock::Method::GET;
use serde_json::json;

use bioingest::{
    ApiClient, AuditEvent, AuditStatus, ItemsKey, MemoryAuditSink, PaginationRequest,
};

use crate::common::page;

#[tokio::test]
async fn audit_sink_sees_begin_updates_and_finish() {
    let server = crate::common::setup_server();

    server.mock(|when, then| {
        when.method(GET).path("/data/status.json");
        then.status(200).json_body(json!({ "chembl_db_version": "ChEMBL_34" }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/data/activity.json");
        then.status(200).json_body(page(
            "activities",
            json!([{ "activity_id": 1 }, { "activity_id": 2 }]),
            Some("/data/activity/page/2"),
        ));
    });
    server.mock(|when, then| {
        when.method(GET).path("/data/activity/page/2");
        then.status(200)
            .json_body(page("activities", json!([{ "activity_id": 3 }]), None));
    });

    let cfg = crate::common::config(&server, "chembl")
        .status_path("status.json")
        .build()
        .unwrap();
    let client = ApiClient::new(cfg).unwrap();
    let sink = Arc::new(MemoryAuditSink::new());

    let req = PaginationRequest::new("activity.json", ItemsKey::named("activities"))
        .param("assay_type", "B")
        .page_size(2)
        .audit(sink.clone())
        .audit_job("job-42", "nightly");
    let items = client.paginate_all(req).await.unwrap();
    assert_eq!(items.len(), 3);

    let events = sink.events();
    assert_eq!(events.len(), 4);

    match &events[0] {
        AuditEvent::Begin(begin) => {
            assert_eq!(begin.source, "chembl");
            assert_eq!(begin.url, server.url("/data/activity.json"));
            assert_eq!(
                begin.params,
                vec![
                    ("assay_type".to_string(), "B".to_string()),
                    ("limit".to_string(), "2".to_string()),
                ]
            );
            assert_eq!(begin.release.as_deref(), Some("ChEMBL_34"));
            assert_eq!(begin.version.as_deref(), Some("ChEMBL_34"));
            assert_eq!(begin.job_id.as_deref(), Some("job-42"));
            assert_eq!(begin.operator.as_deref(), Some("nightly"));
        }
        other => panic!("expected Begin, got {other:?}"),
    }

    match (&events[1], &events[2]) {
        (
            AuditEvent::Update {
                record_id: id1,
                snapshot: first,
                delta: d1,
            },
            AuditEvent::Update {
                record_id: id2,
                snapshot: second,
                delta: d2,
            },
        ) => {
            assert_eq!(id1, "audit-1");
            assert_eq!(id2, "audit-1");
            assert_eq!((first.page_index, first.status, *d1), (0, 200, 2));
            assert!(first.params.is_some());
            assert_eq!((second.page_index, *d2), (1, 1));
            assert!(second.params.is_none());
        }
        other => panic!("expected two updates, got {other:?}"),
    }

    assert_eq!(
        events[3],
        AuditEvent::Finish {
            record_id: "audit-1".into(),
            status: AuditStatus::Success,
            records_fetched: 3,
            error_message: None,
        }
    );
}

#[tokio::test]
async fn failed_traversal_finishes_as_failed() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/document.json");
        then.status(200).json_body(page(
            "documents",
            json!([{ "document_chembl_id": "D1" }]),
            Some("/data/document.json"),
        ));
    });

    let client = crate::common::client(&server);
    let sink = Arc::new(MemoryAuditSink::new());
    let req = PaginationRequest::new("document.json", ItemsKey::named("documents"))
        .audit(sink.clone())
        .audit_source("chembl-documents");

    // next cursor differs from the first URL only by its query, so it is followed once
    let err = client.paginate_all(req).await.unwrap_err();
    assert!(matches!(err, bioingest::ApiError::RepeatedCursor { .. }));

    let events = sink.events();
    match events.first() {
        Some(AuditEvent::Begin(b)) => assert_eq!(b.source, "chembl-documents"),
        other => panic!("expected Begin, got {other:?}"),
    }
    match events.last() {
        Some(AuditEvent::Finish {
            status,
            records_fetched,
            error_message,
            ..
        }) => {
            assert_eq!(*status, AuditStatus::Failed);
            assert_eq!(*records_fetched, 2);
            assert!(error_message.as_deref().unwrap_or("").contains("repeated"));
        }
        other => panic!("expected Finish, got {other:?}"),
    }
    let finishes = events
        .iter()
        .filter(|e| matches!(e, AuditEvent::Finish { .. }))
        .count();
    assert_eq!(finishes, 1);
}

#[tokio::test]
async fn dropping_the_stream_early_closes_the_audit_record() {
    use futures::StreamExt;

    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/assay.json");
        then.status(200).json_body(page(
            "assays",
            json!([{ "assay_chembl_id": "A1" }, { "assay_chembl_id": "A2" }]),
            Some("/data/assay/page/2"),
        ));
    });
    let second = server.mock(|when, then| {
        when.method(GET).path("/data/assay/page/2");
        then.status(200)
            .json_body(page("assays", json!([{ "assay_chembl_id": "A3" }]), None));
    });

    let client = crate::common::client(&server);
    let sink = Arc::new(MemoryAuditSink::new());
    let req = PaginationRequest::new("assay.json", ItemsKey::named("assays")).audit(sink.clone());

    let mut stream = Box::pin(client.paginate(req));
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first["assay_chembl_id"], "A1");
    drop(stream);

    second.assert_hits(0);
    let events = sink.events();
    let finishes: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, AuditEvent::Finish { .. }))
        .collect();
    assert_eq!(finishes.len(), 1);
    match events.last() {
        Some(AuditEvent::Finish {
            record_id,
            status,
            records_fetched,
            error_message,
        }) => {
            assert_eq!(record_id, "audit-1");
            assert_eq!(*status, AuditStatus::Failed);
            assert_eq!(*records_fetched, 2);
            assert!(error_message.is_some());
        }
        other => panic!("expected Finish, got {other:?}"),
    }
}
