use std::sync::Arc;
use axum::{extract::{State, Path, Query}, http::StatusCode, Json};
use axum::response::IntoResponse;
use serde::Deserialize;
use crate::AppState;
use crate::api::handlers::{with_conn, ApiError};
use crate::db::query;
use crate::identity::IdentityError;
use crate::models::face::{FaceId, PersonId};

#[derive(Deserialize)]
pub struct PersonsQ {
    #[serde(default)]
    pub anonymous: bool,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_persons(State(state): State<Arc<AppState>>, Query(q): Query<PersonsQ>) -> Result<impl IntoResponse, ApiError> {
    let persons = with_conn(&state, move |conn, _| {
        if q.anonymous {
            query::list_anonymous_persons(conn, q.offset.unwrap_or(0), q.limit.unwrap_or(25))
        } else {
            query::list_persons(conn)
        }
    })
    .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "persons": persons }))))
}

pub async fn get_person(State(state): State<Arc<AppState>>, Path(id): Path<PersonId>) -> Result<impl IntoResponse, ApiError> {
    let (person, faces) = with_conn(&state, move |conn, _| {
        let person = query::get_person(conn, id)?.ok_or(IdentityError::PersonNotFound(id))?;
        let faces = query::faces_of_person(conn, id, false)?;
        Ok((person, faces))
    })
    .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "person": person, "faces": faces }))))
}

#[derive(Deserialize)]
pub struct NameReq {
    pub name: String,
}

pub async fn rename_person(
    State(state): State<Arc<AppState>>,
    Path(id): Path<PersonId>,
    Json(req): Json<NameReq>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = with_conn(&state, move |conn, engine| engine.rename_person(conn, id, &req.name)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "result": outcome }))))
}

pub async fn delete_person(State(state): State<Arc<AppState>>, Path(id): Path<PersonId>) -> Result<impl IntoResponse, ApiError> {
    with_conn(&state, move |conn, engine| engine.delete_person(conn, id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true }))))
}

#[derive(Deserialize)]
pub struct MergePersonsReq {
    pub source_person_id: PersonId,
    pub target_person_id: PersonId,
}

pub async fn merge_persons(State(state): State<Arc<AppState>>, Json(req): Json<MergePersonsReq>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, move |conn, engine| {
        engine.merge_persons(conn, req.source_person_id, req.target_person_id)
    })
    .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}

pub async fn get_face(State(state): State<Arc<AppState>>, Path(id): Path<FaceId>) -> Result<impl IntoResponse, ApiError> {
    let (face, excluded) = with_conn(&state, move |conn, _| {
        let face = query::get_face(conn, id)?.ok_or(IdentityError::FaceNotFound(id))?;
        let mut excluded: Vec<PersonId> = query::excluded_persons(conn, id)?.into_iter().collect();
        excluded.sort_unstable();
        Ok((face, excluded))
    })
    .await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "face": face, "excluded_persons": excluded }))))
}

pub async fn label_face(
    State(state): State<Arc<AppState>>,
    Path(id): Path<FaceId>,
    Json(req): Json<NameReq>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = with_conn(&state, move |conn, engine| engine.label_face(conn, id, &req.name)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "result": outcome }))))
}

pub async fn hide_face(State(state): State<Arc<AppState>>, Path(id): Path<FaceId>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, move |conn, engine| engine.hide_face(conn, id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}

pub async fn unhide_face(State(state): State<Arc<AppState>>, Path(id): Path<FaceId>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, move |conn, engine| engine.unhide_face(conn, id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}

pub async fn confirm_face(State(state): State<Arc<AppState>>, Path(id): Path<FaceId>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, move |conn, engine| engine.confirm_face(conn, id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}

pub async fn reject_face(State(state): State<Arc<AppState>>, Path(id): Path<FaceId>) -> Result<impl IntoResponse, ApiError> {
    let report = with_conn(&state, move |conn, engine| engine.reject_face(conn, id)).await?;
    Ok((StatusCode::OK, Json(serde_json::json!({ "success": true, "report": report }))))
}
