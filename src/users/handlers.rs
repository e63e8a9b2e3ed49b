use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        extractors::Caller,
        password, recovery,
        role::{require_role, Role},
        secret, token,
    },
    error::ApiError,
    state::AppState,
    users::{
        dto::{
            CreateUser, CreateUserWithSecret, ForgotPasswordRequest, LoginRequest,
            NewSecretRequest, ResetPasswordRequest, UpdateUser, UserResponse, UsersQuery,
        },
        policy, repo,
    },
    validate,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/secret", post(create_user_with_secret))
        .route("/users/login", post(login))
        .route("/users/new-secret", post(new_generator_secret))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/reset-password", post(reset_password))
        .route("/users/:handle", get(get_user).patch(update_user))
        .route("/authenticate", get(authenticate))
}

#[instrument(skip(state, _caller))]
async fn list_users(
    State(state): State<AppState>,
    _caller: Caller,
    Query(query): Query<UsersQuery>,
) -> Result<Json<Vec<repo::MinimalUser>>, ApiError> {
    // An unrecognized role filter is ignored rather than rejected.
    let role = query.role.as_deref().and_then(|r| r.parse::<Role>().ok());
    let filter = repo::UserFilter {
        search: query.search,
        role,
    };
    let users = repo::find_users(&state.db, filter, query.limit, query.page).await?;
    Ok(Json(users))
}

#[instrument(skip(state, _caller))]
async fn get_user(
    State(state): State<AppState>,
    _caller: Caller,
    Path(handle): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = repo::find_user(&state.db, &handle)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user with the handle '{handle}' exists")))?;
    Ok(Json(UserResponse::public(user)))
}

#[instrument(skip(state, caller, props))]
async fn create_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(props): Json<CreateUser>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    require_role(caller.role, state.config.user_creation_role)?;
    props.validate()?;

    let requested_role = props.role.unwrap_or(Role::Base);
    policy::check_role_grant(caller.role, requested_role)?;

    let password_hash = password::hash_secret(&props.password)?;
    let mut user = repo::create_user(
        &state.db,
        &props.handle,
        &props.name,
        props.email.as_deref(),
        requested_role,
        &password_hash,
        false,
    )
    .await
    .map_err(|e| {
        ApiError::on_unique(
            e,
            format!("A user already exists with the handle '{}'", props.handle.to_lowercase()),
        )
    })?;
    user.token = Some(token::issue(&state.db, &user.handle).await?);

    info!(handle = %user.handle, role = %user.role, creator = %caller.handle, "user created");
    Ok((StatusCode::CREATED, Json(UserResponse::public(user))))
}

/// Self-service signup without a token, gated by the process-wide generator
/// secret presented in the Authorization header.
#[instrument(skip(state, headers, props))]
async fn create_user_with_secret(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(props): Json<CreateUserWithSecret>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| ApiError::validation("No secret provided"))?;
    props.validate()?;

    let generator = secret::get_generator_secret(&state.db)
        .await?
        .ok_or_else(|| ApiError::server("Server doesn't have a secret. Please contact an admin"))?;
    if !password::verify_secret(presented, &generator.secret_hash)? {
        warn!("signup attempt with incorrect generator secret");
        return Err(ApiError::bad_request("Incorrect secret"));
    }

    let password_hash = password::hash_secret(&props.password)?;
    let mut user = repo::create_user(
        &state.db,
        &props.handle,
        &props.name,
        props.email.as_deref(),
        Role::Base,
        &password_hash,
        true,
    )
    .await
    .map_err(|e| {
        ApiError::on_unique(
            e,
            format!("A user already exists with the handle '{}'", props.handle.to_lowercase()),
        )
    })?;
    user.token = Some(token::issue(&state.db, &user.handle).await?);

    info!(handle = %user.handle, "user signed up via generator secret");
    Ok((StatusCode::CREATED, Json(UserResponse::with_token(user))))
}

#[instrument(skip(state, caller, props))]
async fn update_user(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Path(handle): Path<String>,
    Json(props): Json<UpdateUser>,
) -> Result<Json<UserResponse>, ApiError> {
    let handle = handle.to_lowercase();
    props.validate()?;

    let own = policy::check_edit_access(&caller.handle, caller.role, &handle)?;
    let target = repo::find_user(&state.db, &handle)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("No user with the handle '{handle}' exists")))?;
    policy::check_target_rank(own, caller.role, target.role)?;

    if let Some(requested) = props.role {
        policy::check_role_change(own, caller.role, target.role, requested)?;
    }

    let mut password_hash = None;
    if let Some(new_password) = &props.password {
        let proof =
            policy::check_password_change(own, caller.role, props.current_password.as_deref())?;
        if !password::verify_secret(proof, &caller.password_hash)? {
            return Err(ApiError::forbidden("Incorrect password"));
        }
        password_hash = Some(password::hash_secret(new_password)?);
    }

    let email_conflict = format!(
        "Another user already has the email '{}'",
        props.email.clone().unwrap_or_default()
    );
    let updated = repo::update_user(
        &state.db,
        &handle,
        props.name.as_deref(),
        props.email.as_deref(),
        props.role,
        password_hash.as_deref(),
    )
    .await
    .map_err(|e| ApiError::on_unique(e, email_conflict))?;

    // A password change invalidates every existing session.
    let updated = token::ensure_fresh(&state.db, updated, password_hash.is_some()).await?;

    info!(handle = %updated.handle, editor = %caller.handle, "user updated");
    Ok(Json(if own {
        UserResponse::with_token(updated)
    } else {
        UserResponse::public(updated)
    }))
}

#[instrument(skip(state, caller))]
async fn authenticate(
    State(state): State<AppState>,
    Caller(caller): Caller,
) -> Result<Json<UserResponse>, ApiError> {
    repo::set_last_signed_in(&state.db, &caller.handle).await?;
    Ok(Json(UserResponse::with_token(caller)))
}

#[instrument(skip(state, body))]
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = repo::find_user(&state.db, &body.handle)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("No user with the handle '{}' exists", body.handle))
        })?;

    if !password::verify_secret(&body.password, &user.password_hash)? {
        warn!(handle = %user.handle, "login with incorrect password");
        return Err(ApiError::unauthorized("Incorrect password"));
    }

    let user = token::ensure_fresh(&state.db, user, false).await?;
    repo::set_last_signed_in(&state.db, &user.handle).await?;

    info!(handle = %user.handle, "user logged in");
    Ok(Json(UserResponse::with_token(user)))
}

/// Rotates the shared signup secret; the ADMIN caller re-proves their own
/// password first.
#[instrument(skip(state, caller, body))]
async fn new_generator_secret(
    State(state): State<AppState>,
    Caller(caller): Caller,
    Json(body): Json<NewSecretRequest>,
) -> Result<(StatusCode, String), ApiError> {
    require_role(caller.role, Role::Admin)?;
    if !password::verify_secret(&body.password, &caller.password_hash)? {
        return Err(ApiError::bad_request("Incorrect password"));
    }
    let plaintext = secret::rotate_generator_secret(&state.db, &caller.handle).await?;
    info!(admin = %caller.handle, "generator secret rotated");
    Ok((StatusCode::CREATED, plaintext))
}

#[instrument(skip(state, body))]
async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<&'static str, ApiError> {
    if !validate::is_valid_email(&body.email) {
        return Err(ApiError::validation(
            "Must provide an email to recover password for",
        ));
    }
    let user = repo::find_user_by_email(&state.db, &body.email)
        .await?
        .ok_or_else(|| ApiError::not_found("No user is registered with the provided email"))?;

    let secret_plain = token::generate_token();
    let secret_hash = password::hash_secret(&secret_plain)?;
    let valid_until = OffsetDateTime::now_utc() + token::RESET_TOKEN_LIFETIME;
    repo::upsert_reset_token(&state.db, &user.handle, &secret_hash, valid_until).await?;

    let reset_token = recovery::build_reset_token(&secret_plain, &user.handle);
    let smtp = state
        .config
        .smtp
        .as_ref()
        .ok_or_else(|| ApiError::server("Email delivery is not configured"))?;
    recovery::send_recovery_email(smtp, &state.config.frontend_url, &user, &reset_token)
        .await
        .map_err(|e| {
            error!(error = %e, handle = %user.handle, "recovery email failed");
            ApiError::server("Something went wrong sending the email")
        })?;

    Ok("Successfully sent password recovery email")
}

#[instrument(skip(state, body))]
async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<StatusCode, ApiError> {
    let (presented_secret, handle) =
        recovery::split_reset_token(&body.token).ok_or_else(|| ApiError::validation("Invalid token"))?;

    let reset = repo::find_reset_token(&state.db, &handle)
        .await?
        .ok_or_else(|| ApiError::validation("Invalid token"))?;
    let usable = reset.valid_until > OffsetDateTime::now_utc()
        && password::verify_secret(&presented_secret, &reset.secret_hash)?;
    if !usable {
        return Err(ApiError::validation("Invalid token"));
    }

    let password_hash = password::hash_secret(&body.password)?;
    let user = repo::update_user(&state.db, &handle, None, None, None, Some(&password_hash))
        .await
        .map_err(ApiError::from)?;
    token::ensure_fresh(&state.db, user, true).await?;
    repo::delete_reset_token(&state.db, &handle).await?;

    info!(handle = %handle, "password reset via recovery token");
    Ok(StatusCode::OK)
}
