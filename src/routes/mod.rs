pub mod auth;
pub mod dogs;
pub mod home;

use axum::extract::Request;
use axum::http::Method;
use axum::routing::get;
use axum::Router;
use tower::util::{MapRequest, MapRequestLayer};
use tower::Layer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

const METHOD_OVERRIDE_HEADER: &str = "x-http-method-override";

/// The full application. Method override wraps the router so that it runs
/// before route matching.
pub type App = MapRequest<Router, fn(Request) -> Request>;

pub fn app(state: AppState) -> App {
    let router = Router::new()
        .route("/", get(home::index))
        .merge(dogs::router())
        .merge(auth::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    MapRequestLayer::new(method_override as fn(Request) -> Request).layer(router)
}

/// HTML forms can only POST; `?_method=PUT` (or the override header)
/// turns a POST into PUT, PATCH or DELETE.
fn method_override(mut req: Request) -> Request {
    if req.method() != Method::POST {
        return req;
    }

    let from_query = req.uri().query().and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "_method")
            .map(|(_, value)| value.into_owned())
    });
    let from_header = req
        .headers()
        .get(METHOD_OVERRIDE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let target = from_query.or(from_header).and_then(|m| match m.to_ascii_uppercase().as_str() {
        "PUT" => Some(Method::PUT),
        "PATCH" => Some(Method::PATCH),
        "DELETE" => Some(Method::DELETE),
        _ => None,
    });

    if let Some(method) = target {
        *req.method_mut() = method;
    }
    req
}
