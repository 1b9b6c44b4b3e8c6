//! Test fixtures with sample data.
//!
//! Sample DataSource records and the response envelopes real services have
//! been seen to produce for them.

use chrono::{DateTime, Utc};
use serde_json::{Value, json};

/// Cron schedule a sample record is created with.
pub const INITIAL_CRON: &str = "0 */15 * * * *";

/// Cron schedule the sample mutation switches to.
pub const UPDATED_CRON: &str = "0 */30 * * * *";

/// A complete DataSource record, unique per `token`.
#[must_use]
pub fn sample_datasource(token: &str) -> Value {
    json!({
        "name": format!("CRUD_TEST_{token}"),
        "supplierName": "Test Supplier",
        "connectionString": format!("file:///test/data/{token}"),
        "category": "Testing",
        "description": "Automated CRUD test datasource",
        "isActive": true,
        "filePath": format!("/test/data/{token}"),
        "filePattern": "*.json",
        "cronExpression": INITIAL_CRON,
        "jsonSchema": sample_json_schema(),
    })
}

/// A small draft-07 object schema.
#[must_use]
pub fn sample_json_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "required": ["transactionId", "amount"],
        "properties": {
            "transactionId": {"type": "string", "pattern": "^TXN-[0-9]{8}$"},
            "amount": {"type": "number", "minimum": 0}
        }
    })
}

/// Create response in the `PascalCase` `{"IsSuccess", "Data": {"ID"}}` shape.
#[must_use]
pub fn pascal_create_response(id: &str) -> Value {
    json!({
        "IsSuccess": true,
        "Data": {"ID": id, "Name": "CRUD_TEST", "CronExpression": INITIAL_CRON},
        "Errors": []
    })
}

/// Create response in the `camelCase` `{"success", "data": {"id"}}` shape.
#[must_use]
pub fn camel_create_response(id: &str) -> Value {
    json!({
        "success": true,
        "data": {"id": id, "name": "CRUD_TEST", "cronExpression": INITIAL_CRON}
    })
}

/// Bare document with a database-style `_id`.
#[must_use]
pub fn bare_document(id: &str) -> Value {
    json!({"_id": id, "name": "CRUD_TEST", "cronExpression": INITIAL_CRON})
}

/// Paginated listing with one live and one soft-deleted record.
#[must_use]
pub fn paginated_listing(now: DateTime<Utc>) -> Value {
    json!({
        "data": {
            "items": [
                {"id": "a1", "name": "live", "isDeleted": false},
                {"id": "b2", "name": "gone", "isDeleted": true, "deletedAt": now.to_rfc3339()}
            ],
            "totalCount": 2,
            "page": 1
        }
    })
}
