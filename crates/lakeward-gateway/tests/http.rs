//! HTTP tests for the gateway routes.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use lakeward_core::{GovernanceSeed, SecureQueryEngine, SledGovernanceStore, SqliteExecutor};
use lakeward_gateway::error::ErrorResponse;
use lakeward_gateway::json::{HealthResponse, QueryRequest, SuccessResponse};
use lakeward_gateway::{create_router, AppState, GatewayConfig};
use lakeward_proto::{Manifest, QueryResult, TableStatistics};

const SEED: &str = r#"{
    "principals": [
        { "id": 1, "name": "analyst1", "kind": "user" },
        { "id": 2, "name": "admin_user", "kind": "user", "is_admin": true },
        { "id": 3, "name": "no_access_user", "kind": "user" }
    ],
    "groups": [{ "id": 1, "name": "analysts" }],
    "memberships": [{ "principal": "analyst1", "group": "analysts" }],
    "tables": [{
        "id": 1, "catalog_id": 1, "schema_id": 1,
        "catalog": "lake", "schema": "main", "name": "titanic",
        "columns": [
            { "name": "PassengerId", "data_type": "INTEGER" },
            { "name": "Pclass", "data_type": "INTEGER" }
        ],
        "files": ["main/titanic/part-0.parquet"]
    }],
    "grants": [
        { "grantee": { "principal": "analyst1" },
          "securable": { "type": "schema", "id": 1 }, "privilege": "USAGE" },
        { "grantee": { "principal": "analyst1" },
          "securable": { "type": "table", "id": 1 }, "privilege": "SELECT" }
    ],
    "row_filters": [{
        "id": 1, "table_id": 1, "filter_sql": "\"Pclass\" = 1",
        "bound_to": [{ "group": "analysts" }]
    }]
}"#;

/// Ten passengers, the first four in first class.
fn test_server() -> (TestServer, sled::Db) {
    let db = sled::Config::new().temporary(true).open().unwrap();
    let store = Arc::new(SledGovernanceStore::open(&db).unwrap());
    GovernanceSeed::from_json(SEED)
        .unwrap()
        .apply(&store, "test")
        .unwrap();

    let executor = Arc::new(SqliteExecutor::open_in_memory().unwrap());
    executor
        .with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE titanic (PassengerId INTEGER, Pclass INTEGER);
                 INSERT INTO titanic VALUES
                    (1, 1), (2, 1), (3, 1), (4, 1), (5, 3),
                    (6, 3), (7, 3), (8, 2), (9, 2), (10, 3);",
            )
        })
        .unwrap();

    let engine = SecureQueryEngine::new(store, executor);
    let app = create_router(AppState::new(engine, GatewayConfig::default()));
    (TestServer::new(app).unwrap(), db)
}

fn principal(name: &'static str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-principal"),
        HeaderValue::from_static(name),
    )
}

fn query(sql: &str) -> QueryRequest {
    QueryRequest { sql: sql.into() }
}

#[tokio::test]
async fn test_health() {
    let (server, _db) = test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<HealthResponse>().status, "healthy");
}

#[tokio::test]
async fn test_query_applies_row_filter() {
    let (server, _db) = test_server();
    let (name, value) = principal("analyst1");
    let response = server
        .post("/v1/query")
        .add_header(name, value)
        .json(&query("SELECT * FROM titanic"))
        .await;

    response.assert_status_ok();
    let body = response.json::<SuccessResponse<QueryResult>>();
    assert!(body.success);
    assert_eq!(body.data.row_count, 4);
}

#[tokio::test]
async fn test_admin_query_is_unfiltered() {
    let (server, _db) = test_server();
    let (name, value) = principal("admin_user");
    let response = server
        .post("/v1/query")
        .add_header(name, value)
        .json(&query("SELECT * FROM titanic"))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<SuccessResponse<QueryResult>>().data.row_count,
        10
    );
}

#[tokio::test]
async fn test_missing_principal_is_unauthorized() {
    let (server, _db) = test_server();
    let response = server
        .post("/v1/query")
        .json(&query("SELECT * FROM titanic"))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json::<ErrorResponse>().code, "UNAUTHORIZED");
}

#[tokio::test]
async fn test_error_kinds_map_to_status_codes() {
    let (server, _db) = test_server();
    let cases = [
        ("no_access_user", "SELECT * FROM titanic", StatusCode::FORBIDDEN, "ACCESS_DENIED"),
        ("analyst1", "SELECT * FROM lifeboats", StatusCode::NOT_FOUND, "NOT_FOUND"),
        ("analyst1", "DELETE FROM titanic", StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
    ];

    for (who, sql, status, code) in cases {
        let (name, value) = principal(who);
        let response = server
            .post("/v1/query")
            .add_header(name, value)
            .json(&query(sql))
            .await;
        response.assert_status(status);
        let body = response.json::<ErrorResponse>();
        assert!(body.error);
        assert_eq!(body.code, code);
    }
}

#[tokio::test]
async fn test_manifest() {
    let (server, _db) = test_server();
    let (name, value) = principal("analyst1");
    let response = server
        .get("/v1/manifest/lake/main/titanic")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let manifest = response.json::<SuccessResponse<Manifest>>().data;
    assert_eq!(manifest.table, "titanic");
    assert_eq!(manifest.files, vec!["main/titanic/part-0.parquet"]);
    assert_eq!(manifest.row_filters, vec!["\"Pclass\" = 1"]);

    let (name, value) = principal("no_access_user");
    server
        .get("/v1/manifest/lake/main/titanic")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_profile_is_unfiltered() {
    let (server, _db) = test_server();
    let (name, value) = principal("analyst1");
    let response = server
        .post("/v1/tables/main/titanic/profile")
        .add_header(name, value)
        .await;
    response.assert_status_ok();

    let stats = response.json::<SuccessResponse<TableStatistics>>().data;
    assert_eq!(stats.row_count, 10);
    assert_eq!(stats.column_count, 2);
    assert_eq!(stats.profiled_by, "analyst1");
}
