use askama::Template;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;

use crate::auth::accounts::{Credentials, CredentialsForm};
use crate::auth::session::SessionToken;
use crate::error::{AppError, AppResult};
use crate::extractors::{session_token, CurrentUser, MaybeUser, ValidForm};
use crate::routes::home::Html;
use crate::state::AppState;

// -- Templates --

#[derive(Template)]
#[template(path = "pages/register.html")]
pub struct RegisterTemplate {
    pub viewer: Option<String>,
    pub username: String,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub viewer: Option<String>,
    pub error: Option<String>,
}

#[derive(Template)]
#[template(path = "pages/profile.html")]
pub struct ProfileTemplate {
    pub viewer: Option<String>,
    pub username: String,
    pub member_since: String,
}

// -- Request types --

#[derive(Deserialize)]
pub struct LoginQuery {
    pub error: Option<String>,
}

// -- Cookie helpers --

fn session_cookie(name: &str, token: &SessionToken, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours.saturating_mul(3600);
    format!(
        "{}={}; HttpOnly; SameSite=Lax; Path=/; Max-Age={}",
        name,
        token.as_str(),
        max_age_secs
    )
}

fn clear_session_cookie(name: &str) -> String {
    format!("{}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0", name)
}

/// Drop the session the browser held before signing in again.
async fn revoke_previous(state: &AppState, headers: &HeaderMap) -> AppResult<()> {
    match session_token(headers, &state.config.auth.cookie_name) {
        Some(previous) => state.accounts.logout(&previous).await,
        None => Ok(()),
    }
}

fn logged_in(state: &AppState, token: &SessionToken, to: &str) -> Response {
    let cookie = session_cookie(
        &state.config.auth.cookie_name,
        token,
        state.config.auth.session_hours,
    );
    ([(header::SET_COOKIE, cookie)], Redirect::to(to)).into_response()
}

// -- Registration --

/// GET /register: render registration form
pub async fn register_page(maybe_user: MaybeUser) -> Html<RegisterTemplate> {
    Html(RegisterTemplate {
        viewer: maybe_user.viewer(),
        username: String::new(),
        error: None,
    })
}

/// POST /register: create the account, log it in, continue to the dog form
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidForm(form): ValidForm<CredentialsForm>,
) -> AppResult<Response> {
    let result = match Credentials::for_registration(&form) {
        Ok(creds) => state.accounts.register(creds).await,
        Err(e) => Err(e),
    };

    let error = match result {
        Ok((_, token)) => {
            revoke_previous(&state, &headers).await?;
            return Ok(logged_in(&state, &token, "/dogs/new"));
        }
        Err(e) => e,
    };

    let status = match error {
        AppError::DuplicateUsername(_) => StatusCode::CONFLICT,
        AppError::MalformedInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
        other => return Err(other),
    };
    let page = RegisterTemplate {
        viewer: None,
        username: form.username.unwrap_or_default().trim().to_string(),
        error: Some(error.public_message()),
    };
    Ok((status, Html(page)).into_response())
}

// -- Login --

/// GET /login: render login form
pub async fn login_page(maybe_user: MaybeUser, Query(query): Query<LoginQuery>) -> Response {
    if maybe_user.0.is_some() {
        return Redirect::to("/profile").into_response();
    }

    let error = query
        .error
        .map(|_| AppError::InvalidCredentials.public_message());
    Html(LoginTemplate {
        viewer: None,
        error,
    })
    .into_response()
}

/// POST /login: check credentials; failures return to the login form
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidForm(form): ValidForm<CredentialsForm>,
) -> AppResult<Response> {
    let creds = match Credentials::for_login(&form) {
        Ok(creds) => creds,
        Err(_) => return Ok(Redirect::to("/login?error=invalid").into_response()),
    };

    match state.accounts.authenticate(creds).await {
        Ok((_, token)) => {
            revoke_previous(&state, &headers).await?;
            Ok(logged_in(&state, &token, "/profile"))
        }
        Err(AppError::InvalidCredentials) => Ok(Redirect::to("/login?error=invalid").into_response()),
        Err(e) => Err(e),
    }
}

/// GET /logout: destroy the session and clear the cookie
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    let cookie_name = &state.config.auth.cookie_name;
    if let Some(token) = session_token(&headers, cookie_name) {
        state.accounts.logout(&token).await?;
    }

    Ok((
        [(header::SET_COOKIE, clear_session_cookie(cookie_name))],
        Redirect::to("/"),
    )
        .into_response())
}

/// GET /profile: signed-in landing page after login
pub async fn profile(user: CurrentUser) -> Html<ProfileTemplate> {
    Html(ProfileTemplate {
        viewer: Some(user.username().to_string()),
        username: user.account.username.clone(),
        member_since: user.account.created_at.format("%B %-d, %Y").to_string(),
    })
}
