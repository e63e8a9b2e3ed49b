use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::extractors::Caller,
    error::ApiError,
    lists::{
        dto::{CreateList, ListResponse, ListSummary, UpdateList},
        engine, repo,
    },
    state::AppState,
    users,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/lists", get(list_lists).post(create_list))
        .route("/lists/:id", get(get_list).patch(update_list))
}

/// Path ids are parsed by hand so a non-numeric id is a validation error,
/// not a routing 400.
fn parse_list_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::validation("Provided id is not a number"))
}

#[instrument(skip(state, _caller))]
async fn list_lists(
    State(state): State<AppState>,
    _caller: Caller,
) -> Result<Json<Vec<ListSummary>>, ApiError> {
    let lists = repo::find_lists(&state.db).await?;
    Ok(Json(lists))
}

#[instrument(skip(state, _caller))]
async fn get_list(
    State(state): State<AppState>,
    _caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<ListResponse>, ApiError> {
    let id = parse_list_id(&id)?;
    let list = repo::find_list(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No list exists with the id {id}")))?;
    Ok(Json(ListResponse::from(list)))
}

#[instrument(skip(state, caller, props))]
async fn create_list(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(props): Json<CreateList>,
) -> Result<(StatusCode, Json<ListResponse>), ApiError> {
    let fields = engine::initial_fields(&props.structure);
    let list = repo::create_list(
        &state.db,
        &props.kind,
        &props.version,
        &props.structure,
        &fields,
        props.colors.as_ref(),
        &caller.handle,
    )
    .await?;
    info!(list_id = list.id, creator = %caller.handle, "list created");
    Ok((StatusCode::CREATED, Json(ListResponse::from(list))))
}

/// One general update operation; the lifecycle gates run in a fixed order so
/// validation fails before any lookup-dependent check.
#[instrument(skip(state, caller, patch))]
async fn update_list(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(id): Path<String>,
    Json(patch): Json<UpdateList>,
) -> Result<Json<ListResponse>, ApiError> {
    let id = parse_list_id(&id)?;
    patch.validate()?;

    let list = repo::find_list(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No list exists with the id {id}")))?;
    let caller = caller.minimal();

    engine::authorize_edit(&caller, &list, &patch)?;

    let new_owner = match &patch.owner {
        Some(owner) => {
            engine::check_owner_change(&list, &patch)?;
            let target = users::repo::find_user(&state.db, owner)
                .await?
                .ok_or_else(|| {
                    ApiError::not_found(format!("No user with the handle '{owner}' exists"))
                })?;
            Some(target.minimal())
        }
        None => None,
    };

    engine::check_verification(&caller, &list, &patch)?;
    engine::check_submission(&list, &patch)?;

    let next = engine::apply_update(&list, patch, &caller, new_owner, OffsetDateTime::now_utc());
    let saved = repo::save_update(&state.db, &next).await?;
    info!(list_id = saved.id, caller = %caller.handle, "list updated");
    Ok(Json(ListResponse::from(saved)))
}
