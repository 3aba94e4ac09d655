use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rise_protocol::{generate_document_id, Document, Fields};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::types::Json as JsonColumn;
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::handlers::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct FilterQuery {
    pub field: Option<String>,
    pub equals: Option<String>,
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    id: String,
    data: JsonColumn<Fields>,
}

impl From<DocumentRow> for Document {
    fn from(row: DocumentRow) -> Self {
        Document::new(row.id, row.data.0)
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 64
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn check_collection(collection: &str) -> ApiResult<()> {
    if valid_name(collection) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid collection name: {collection}")))
    }
}

fn check_id(id: &str) -> ApiResult<()> {
    if valid_name(id) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!("Invalid document id: {id}")))
    }
}

/// `equals` carries a JSON literal (`true`, `42`, `"Open"`); anything that does
/// not parse is compared as a plain string.
fn parse_filter(query: FilterQuery) -> ApiResult<Option<(String, Value)>> {
    match (query.field, query.equals) {
        (None, None) => Ok(None),
        (Some(field), Some(raw)) if !field.is_empty() => {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            Ok(Some((field, value)))
        }
        _ => Err(ApiError::BadRequest(
            "Both `field` and `equals` are required to filter".into(),
        )),
    }
}

fn body_fields(mut fields: Fields) -> Fields {
    fields.remove("id");
    fields
}

pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path(collection): Path<String>,
    Query(query): Query<FilterQuery>,
) -> ApiResult<Json<Vec<Document>>> {
    check_collection(&collection)?;
    let rows = match parse_filter(query)? {
        None => {
            sqlx::query_as::<_, DocumentRow>(
                "SELECT id, data FROM documents WHERE collection = $1 ORDER BY created_at, id",
            )
            .bind(&collection)
            .fetch_all(&state.db)
            .await?
        }
        Some((field, value)) => {
            sqlx::query_as::<_, DocumentRow>(
                "SELECT id, data FROM documents \
                 WHERE collection = $1 AND data -> $2 = $3 \
                 ORDER BY created_at, id",
            )
            .bind(&collection)
            .bind(&field)
            .bind(JsonColumn(value))
            .fetch_all(&state.db)
            .await?
        }
    };
    tracing::debug!("Listed {} documents from {}", rows.len(), collection);
    Ok(Json(rows.into_iter().map(Document::from).collect()))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<Json<Document>> {
    check_collection(&collection)?;
    check_id(&id)?;
    let row = sqlx::query_as::<_, DocumentRow>(
        "SELECT id, data FROM documents WHERE collection = $1 AND id = $2",
    )
    .bind(&collection)
    .bind(&id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| ApiError::NotFound(format!("{collection}/{id}")))?;
    Ok(Json(row.into()))
}

pub async fn add_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(collection): Path<String>,
    Json(fields): Json<Fields>,
) -> ApiResult<impl IntoResponse> {
    check_collection(&collection)?;
    let id = generate_document_id();
    sqlx::query("INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3)")
        .bind(&collection)
        .bind(&id)
        .bind(JsonColumn(body_fields(fields)))
        .execute(&state.db)
        .await?;
    tracing::info!("{} added {}/{}", user.email, collection, id);
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

pub async fn set_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Json(fields): Json<Fields>,
) -> ApiResult<StatusCode> {
    check_collection(&collection)?;
    check_id(&id)?;
    sqlx::query(
        "INSERT INTO documents (collection, id, data) VALUES ($1, $2, $3) \
         ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data, updated_at = now()",
    )
    .bind(&collection)
    .bind(&id)
    .bind(JsonColumn(body_fields(fields)))
    .execute(&state.db)
    .await?;
    tracing::info!("{} set {}/{}", user.email, collection, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
    Json(patch): Json<Fields>,
) -> ApiResult<StatusCode> {
    check_collection(&collection)?;
    check_id(&id)?;
    let result = sqlx::query(
        "UPDATE documents SET data = data || $3, updated_at = now() \
         WHERE collection = $1 AND id = $2",
    )
    .bind(&collection)
    .bind(&id)
    .bind(JsonColumn(body_fields(patch)))
    .execute(&state.db)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("{collection}/{id}")));
    }
    tracing::info!("{} updated {}/{}", user.email, collection, id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path((collection, id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    check_collection(&collection)?;
    check_id(&id)?;
    sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
        .bind(&collection)
        .bind(&id)
        .execute(&state.db)
        .await?;
    tracing::info!("{} deleted {}/{}", user.email, collection, id);
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(field: Option<&str>, equals: Option<&str>) -> FilterQuery {
        FilterQuery {
            field: field.map(str::to_string),
            equals: equals.map(str::to_string),
        }
    }

    #[test]
    fn filter_values_parse_as_json_literals() {
        assert_eq!(parse_filter(query(None, None)).unwrap(), None);
        assert_eq!(
            parse_filter(query(Some("isAdmin"), Some("true"))).unwrap(),
            Some(("isAdmin".to_string(), Value::Bool(true)))
        );
        assert_eq!(
            parse_filter(query(Some("status"), Some("In Progress"))).unwrap(),
            Some(("status".to_string(), Value::String("In Progress".into())))
        );
        assert!(parse_filter(query(Some("isAdmin"), None)).is_err());
    }

    #[test]
    fn names_are_restricted() {
        assert!(check_collection("courses").is_ok());
        assert!(check_collection("../etc").is_err());
        assert!(check_id("").is_err());
        assert!(check_id("aB3dE5gH7jK9mN1pQ3sT").is_ok());
    }

    #[test]
    fn body_id_is_dropped() {
        let Value::Object(fields) = json!({ "id": "x", "title": "t" }) else {
            unreachable!()
        };
        let stored = body_fields(fields);
        assert!(!stored.contains_key("id"));
        assert_eq!(stored["title"], "t");
    }
}
