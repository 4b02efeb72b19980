use httpmock::Method::GET;
use serde_json::json;

use bioingest::{ApiError, ItemsKey, PaginationRequest};

use crate::common::page;

#[tokio::test]
#[allow(deprecated)]
async fn heuristic_picks_the_first_list_of_objects() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/molecule.json");
        then.status(200).json_body(json!({
            "page_meta": { "next": null },
            "molecules": [{ "molecule_chembl_id": "CHEMBL25" }, { "molecule_chembl_id": "CHEMBL2" }]
        }));
    });

    let client = crate::common::client(&server);
    let items = client
        .paginate_all(PaginationRequest::new("molecule.json", ItemsKey::Heuristic))
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[1]["molecule_chembl_id"], "CHEMBL2");
}

#[tokio::test]
#[allow(deprecated)]
async fn heuristic_follows_document_order_not_key_order() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/mixed.json");
        then.status(200).body(
            r#"{"page_meta":{"next":null},"zebras":[{"id":"z1"}],"apples":[{"id":"a1"},{"id":"a2"}]}"#,
        );
    });

    let client = crate::common::client(&server);
    let items = client
        .paginate_all(PaginationRequest::new("mixed.json", ItemsKey::Heuristic))
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], "z1");
}

#[tokio::test]
#[allow(deprecated)]
async fn heuristic_with_nothing_to_find_yields_no_items() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/odd.json");
        then.status(200).json_body(json!({
            "page_meta": { "next": null },
            "count": 3,
            "tags": ["a", "b"]
        }));
    });

    let client = crate::common::client(&server);
    let items = client
        .paginate_all(PaginationRequest::new("odd.json", ItemsKey::Heuristic))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn missing_named_key_is_a_data_error() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/assay.json");
        then.status(200).json_body(page("assay_list", json!([]), None));
    });

    let client = crate::common::client(&server);
    let err = client
        .paginate_all(PaginationRequest::new("assay.json", ItemsKey::named("assays")))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Data(_)));
}

#[tokio::test]
async fn null_items_mean_an_empty_page() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET).path("/data/assay.json");
        then.status(200).json_body(page("assays", json!(null), None));
    });

    let client = crate::common::client(&server);
    let items = client
        .paginate_all(PaginationRequest::new("assay.json", ItemsKey::named("assays")))
        .await
        .unwrap();
    assert!(items.is_empty());
}

#[tokio::test]
async fn custom_meta_and_next_keys() {
    let server = crate::common::setup_server();
    server.mock(|when, then| {
        when.method(GET)
            .path("/data/search")
            .query_param("size", "25");
        then.status(200).json_body(json!({
            "meta": { "nextCursor": "/data/search/after/abc" },
            "results": [{ "id": "P1" }]
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/data/search/after/abc");
        then.status(200).json_body(json!({
            "meta": { "nextCursor": "" },
            "results": [{ "id": "P2" }]
        }));
    });

    let cfg = crate::common::config(&server, "uniprot")
        .pagination(bioingest::PaginationConfig {
            meta_key: "meta".into(),
            next_key: "nextCursor".into(),
            limit_param: "size".into(),
            default_page_size: 25,
            max_page_size: 500,
            status_path: None,
        })
        .build()
        .unwrap();
    let client = bioingest::ApiClient::new(cfg).unwrap();
    let items = client
        .paginate_all(PaginationRequest::new("search", ItemsKey::named("results")))
        .await
        .unwrap();
    assert_eq!(items.len(), 2);
}
