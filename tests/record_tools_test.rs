//! Integration tests for the structured record and schema tools.

use dbhub_mcp_server::db::ConnectionRegistry;
use dbhub_mcp_server::models::{BackendKind, ConnectParams, LogicalType, SqlParam};
use dbhub_mcp_server::tools::query::{ExecuteQueryInput, QueryToolHandler};
use dbhub_mcp_server::tools::record::{
    DeleteRecordInput, GetRecordsInput, InsertRecordInput, RecordToolHandler, UpdateRecordInput,
};
use dbhub_mcp_server::tools::schema::{
    AlterTableInput, CreateIndexInput, CreateTableInput, DropIndexInput, DropTableInput,
    GetTableSchemaInput, ListTablesInput, SchemaToolHandler,
};
use std::sync::Arc;

struct Fixture {
    registry: Arc<ConnectionRegistry>,
    records: RecordToolHandler,
    schemas: SchemaToolHandler,
    queries: QueryToolHandler,
}

async fn fixture(dir: &tempfile::TempDir) -> Fixture {
    let registry = Arc::new(ConnectionRegistry::new());
    let params = ConnectParams {
        path: Some(dir.path().join("records.db").display().to_string()),
        ..Default::default()
    };
    registry.add("db", BackendKind::SQLite, params).await.unwrap();
    Fixture {
        records: RecordToolHandler::new(registry.clone()),
        schemas: SchemaToolHandler::new(registry.clone()),
        queries: QueryToolHandler::new(registry.clone()),
        registry,
    }
}

fn obj(json: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(json).unwrap()
}

async fn create_users_table(f: &Fixture) {
    f.schemas
        .create_table(CreateTableInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: serde_json::from_str(
                r#"[
                    {"name": "id", "type": "INTEGER", "primary_key": true},
                    {"name": "name", "type": "TEXT", "nullable": false},
                    {"name": "age", "type": "INTEGER"}
                ]"#,
            )
            .unwrap(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_create_insert_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    let output = f
        .records
        .insert_record(InsertRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(r#"{"id": 1, "name": "a"}"#),
        })
        .await
        .unwrap();
    assert_eq!(output.rows_affected, 1);
    assert_eq!(output.last_insert_id, Some(1));

    let output = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: None,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
        })
        .await
        .unwrap();

    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["id"], serde_json::json!(1));
    assert_eq!(output.rows[0]["name"], serde_json::json!("a"));
    assert_eq!(output.rows[0]["age"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_get_records_filters_and_ordering() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    for (id, name, age) in [(1, "alice", 30), (2, "bob", 17), (3, "carol", 45)] {
        f.records
            .insert_record(InsertRecordInput {
                connection_id: "db".to_string(),
                table: "users".to_string(),
                data: obj(&format!(
                    r#"{{"id": {}, "name": "{}", "age": {}}}"#,
                    id, name, age
                )),
            })
            .await
            .unwrap();
    }

    // gt filter with descending order
    let output = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: Some(vec!["name".to_string()]),
            filter: Some(obj(r#"{"age": {"gt": 18}}"#)),
            order_by: Some(vec!["-age".to_string()]),
            limit: None,
            offset: None,
        })
        .await
        .unwrap();
    assert_eq!(output.row_count, 2);
    assert_eq!(output.rows[0]["name"], serde_json::json!("carol"));
    assert_eq!(output.rows[1]["name"], serde_json::json!("alice"));

    // in filter
    let output = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: None,
            filter: Some(obj(r#"{"id": {"in": [1, 3]}}"#)),
            order_by: Some(vec!["id".to_string()]),
            limit: None,
            offset: None,
        })
        .await
        .unwrap();
    assert_eq!(output.row_count, 2);

    // like filter
    let output = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: None,
            filter: Some(obj(r#"{"name": {"like": "%ob"}}"#)),
            order_by: None,
            limit: None,
            offset: None,
        })
        .await
        .unwrap();
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["name"], serde_json::json!("bob"));
}

#[tokio::test]
async fn test_update_and_delete_require_filters() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    f.records
        .insert_record(InsertRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(r#"{"id": 1, "name": "a", "age": 20}"#),
        })
        .await
        .unwrap();

    let err = f
        .records
        .update_record(UpdateRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(r#"{"age": 21}"#),
            filter: obj("{}"),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_params");

    let err = f
        .records
        .delete_record(DeleteRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            filter: obj("{}"),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_params");

    let output = f
        .records
        .update_record(UpdateRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(r#"{"age": 21}"#),
            filter: obj(r#"{"id": 1}"#),
        })
        .await
        .unwrap();
    assert_eq!(output.rows_affected, 1);

    let output = f
        .records
        .delete_record(DeleteRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            filter: obj(r#"{"id": 1}"#),
        })
        .await
        .unwrap();
    assert_eq!(output.rows_affected, 1);
}

#[tokio::test]
async fn test_bound_parameters_are_injection_safe() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    // A classic injection payload stays plain data when bound
    let payload = "x'; DROP TABLE users; --";
    f.records
        .insert_record(InsertRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(&format!(r#"{{"id": 1, "name": {}}}"#, serde_json::json!(payload))),
        })
        .await
        .unwrap();

    let result = f
        .queries
        .execute_query(ExecuteQueryInput {
            connection_id: "db".to_string(),
            query: "SELECT name FROM users WHERE name = ?".to_string(),
            params: vec![SqlParam::String(payload.to_string())],
            limit: None,
            timeout_secs: None,
        })
        .await
        .unwrap();
    assert_eq!(result.row_count, 1);
    assert_eq!(result.rows[0]["name"], serde_json::json!(payload));

    // The table survived
    let tables = f
        .schemas
        .list_tables(ListTablesInput {
            connection_id: "db".to_string(),
        })
        .await
        .unwrap();
    assert!(tables.tables.contains(&"users".to_string()));

    // Malicious identifiers are rejected outright
    let err = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users; DROP TABLE users".to_string(),
            columns: None,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_params");
}

#[tokio::test]
async fn test_raw_query_with_bound_comparison() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    for (id, age) in [(1, 17), (2, 22), (3, 40)] {
        f.records
            .insert_record(InsertRecordInput {
                connection_id: "db".to_string(),
                table: "users".to_string(),
                data: obj(&format!(r#"{{"id": {}, "name": "u{}", "age": {}}}"#, id, id, age)),
            })
            .await
            .unwrap();
    }

    let result = f
        .queries
        .execute_query(ExecuteQueryInput {
            connection_id: "db".to_string(),
            query: "SELECT * FROM users WHERE age > ? ORDER BY age".to_string(),
            params: vec![SqlParam::Int(21)],
            limit: None,
            timeout_secs: None,
        })
        .await
        .unwrap();
    assert_eq!(result.row_count, 2);
    assert_eq!(result.rows[0]["age"], serde_json::json!(22));
    assert_eq!(result.rows[1]["age"], serde_json::json!(40));
}

#[tokio::test]
async fn test_table_schema_and_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    f.schemas
        .create_index(CreateIndexInput {
            connection_id: "db".to_string(),
            index: serde_json::from_str(
                r#"{"name": "idx_users_name", "table": "users", "columns": ["name"], "unique": true}"#,
            )
            .unwrap(),
        })
        .await
        .unwrap();

    let schema = f
        .schemas
        .get_table_schema(GetTableSchemaInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(schema.table, "users");
    assert_eq!(schema.columns.len(), 3);

    let id = schema.columns.iter().find(|c| c.name == "id").unwrap();
    assert!(id.primary_key);
    assert_eq!(id.column_type, LogicalType::Integer);

    let name = schema.columns.iter().find(|c| c.name == "name").unwrap();
    assert!(!name.nullable);
    assert_eq!(name.column_type, LogicalType::Text);

    let index = schema
        .indexes
        .iter()
        .find(|i| i.name == "idx_users_name")
        .unwrap();
    assert!(index.unique);
    assert_eq!(index.columns, vec!["name".to_string()]);

    f.schemas
        .drop_index(DropIndexInput {
            connection_id: "db".to_string(),
            index: "idx_users_name".to_string(),
            table: None,
        })
        .await
        .unwrap();

    let schema = f
        .schemas
        .get_table_schema(GetTableSchemaInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
        })
        .await
        .unwrap();
    assert!(schema.indexes.iter().all(|i| i.name != "idx_users_name"));
}

#[tokio::test]
async fn test_alter_table_recreation_preserves_data() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    f.records
        .insert_record(InsertRecordInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            data: obj(r#"{"id": 1, "name": "a", "age": 30}"#),
        })
        .await
        .unwrap();

    f.schemas
        .alter_table(AlterTableInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            operations: serde_json::from_str(
                r#"[
                    {"operation": "add_column", "column": {"name": "email", "type": "TEXT"}},
                    {"operation": "drop_column", "column": "age"}
                ]"#,
            )
            .unwrap(),
        })
        .await
        .unwrap();

    let schema = f
        .schemas
        .get_table_schema(GetTableSchemaInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
        })
        .await
        .unwrap();
    let names: Vec<&str> = schema.columns.iter().map(|c| c.name.as_str()).collect();
    assert!(names.contains(&"email"));
    assert!(!names.contains(&"age"));

    // Data in surviving columns is intact
    let output = f
        .records
        .get_records(GetRecordsInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
            columns: None,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
        })
        .await
        .unwrap();
    assert_eq!(output.row_count, 1);
    assert_eq!(output.rows[0]["name"], serde_json::json!("a"));
    assert_eq!(output.rows[0]["email"], serde_json::Value::Null);
}

#[tokio::test]
async fn test_drop_table_removes_it_from_listing() {
    let dir = tempfile::tempdir().unwrap();
    let f = fixture(&dir).await;
    create_users_table(&f).await;

    f.schemas
        .drop_table(DropTableInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
        })
        .await
        .unwrap();

    let tables = f
        .schemas
        .list_tables(ListTablesInput {
            connection_id: "db".to_string(),
        })
        .await
        .unwrap();
    assert!(tables.tables.is_empty());

    // Describing the dropped table reports a statement error
    let err = f
        .schemas
        .get_table_schema(GetTableSchemaInput {
            connection_id: "db".to_string(),
            table: "users".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "statement_error");

    drop(f.registry);
}
