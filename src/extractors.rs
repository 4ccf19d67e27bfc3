use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap};
use axum::Form;
use serde::de::DeserializeOwned;

use crate::auth::accounts::Account;
use crate::auth::session::SessionToken;
use crate::error::AppError;
use crate::state::AppState;

/// Represents the currently authenticated user.
///
/// Using it as an extractor guards the route: anonymous requests are
/// rejected with `AppError::Unauthorized`, which redirects to `/login`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub account: Account,
    pub token: SessionToken,
}

impl CurrentUser {
    pub fn username(&self) -> &str {
        &self.account.username
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;

        match state.accounts.deserialize_session(&token).await? {
            Some(account) => Ok(CurrentUser { account, token }),
            None => Err(AppError::Unauthorized),
        }
    }
}

/// Optional user extractor: `None` instead of a redirect when anonymous.
pub struct MaybeUser(pub Option<CurrentUser>);

impl MaybeUser {
    /// Username for the navigation bar.
    pub fn viewer(&self) -> Option<String> {
        self.0.as_ref().map(|u| u.username().to_string())
    }
}

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

/// Form body whose decoding failures surface as `MalformedInput`.
pub struct ValidForm<T>(pub T);

impl<S, T> FromRequest<S> for ValidForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::MalformedInput(rejection.body_text()))?;
        Ok(ValidForm(value))
    }
}

pub fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<SessionToken> {
    cookie_value(headers, cookie_name)
        .filter(|v| !v.is_empty())
        .map(SessionToken::from)
}

fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == name {
                Some(val)
            } else {
                None
            }
        })
}
