//! End-to-end flows through the real router, driven in-process.

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use dog_rescue::config::SessionBackend;
use dog_rescue::routes::{self, App};
use dog_rescue::state::{AppState, DbPool};
use tower::ServiceExt;

use common::{test_config, test_db, PLACEHOLDER};

const FORM: &str = "application/x-www-form-urlencoded";

struct Harness {
    _dir: tempfile::TempDir,
    pool: DbPool,
    state: AppState,
    app: App,
}

impl Harness {
    fn new() -> Self {
        Self::with_backend(SessionBackend::Sqlite)
    }

    fn with_memory_sessions() -> Self {
        Self::with_backend(SessionBackend::Memory)
    }

    fn with_backend(backend: SessionBackend) -> Self {
        let (dir, pool) = test_db();
        let state = AppState::new(pool.clone(), test_config(backend)).unwrap();
        let app = routes::app(state.clone());
        Self {
            _dir: dir,
            pool,
            state,
            app,
        }
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder().method(Method::GET).uri(uri);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: &str, cookie: Option<&str>) -> Response {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, FORM);
        if let Some(c) = cookie {
            req = req.header(header::COOKIE, c);
        }
        self.send(req.body(Body::from(body.to_string())).unwrap()).await
    }

    /// Registers `username` and returns the `name=value` session cookie.
    async fn register(&self, username: &str) -> String {
        let resp = self
            .post(
                "/register",
                &format!("username={}&password=password123", username),
                None,
            )
            .await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/dogs/new");
        session_cookie(&resp).expect("registration sets a session cookie")
    }
}

fn location(resp: &Response) -> &str {
    resp.headers()[header::LOCATION].to_str().unwrap()
}

fn session_cookie(resp: &Response) -> Option<String> {
    resp.headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

async fn body_text(resp: Response) -> String {
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn landing_and_empty_list_render() {
    let h = Harness::new();

    let resp = h.get("/", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Welcome to the dog rescue app!"));

    let resp = h.get("/dogs", None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("No dogs listed yet."));
}

#[tokio::test]
async fn chester_scenario() {
    let h = Harness::new();
    let cookie = h.register("volunteer").await;

    let resp = h
        .post(
            "/dogs",
            "name=Chester&ageYr=7&breed=beagle&location=forever+home",
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/dogs");

    let dogs = h.state.dogs.list().await.unwrap();
    assert_eq!(dogs.len(), 1);
    let chester = &dogs[0];
    assert_eq!(chester.image, PLACEHOLDER);
    assert!(!chester.adopted);

    let resp = h.get(&format!("/dogs/{}", chester.id), None).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let html = body_text(resp).await;
    assert!(html.contains("Chester"));
    assert!(html.contains("beagle"));
    assert!(html.contains("forever home"));
    assert!(html.contains("7 years"));
    assert!(html.contains("placeholder-dog.png"));
    assert!(html.contains("Available"));

    let list = body_text(h.get("/dogs", None).await).await;
    assert!(list.contains(&format!("/dogs/{}", chester.id)));
}

#[tokio::test]
async fn authoring_routes_redirect_anonymous_visitors_to_login() {
    let h = Harness::new();
    let dog = h
        .state
        .dogs
        .create(dog_rescue::dogs::NewDog::new("Chester", "beagle", "shelter"))
        .await
        .unwrap();

    let resp = h.get("/dogs/new", None).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login");

    let resp = h
        .post("/dogs", "name=Rex&breed=lab&location=shelter", None)
        .await;
    assert_eq!(location(&resp), "/login");

    let resp = h.get(&format!("/dogs/{}/edit", dog.id), None).await;
    assert_eq!(location(&resp), "/login");

    let resp = h
        .post(&format!("/dogs/{}?_method=DELETE", dog.id), "", None)
        .await;
    assert_eq!(location(&resp), "/login");

    // Nothing was created or deleted.
    assert_eq!(h.state.dogs.list().await.unwrap().len(), 1);

    let resp = h.get("/profile", Some("dog_rescue_session=forged")).await;
    assert_eq!(location(&resp), "/login");
}

#[tokio::test]
async fn edit_via_method_override_updates_only_submitted_fields() {
    let h = Harness::new();
    let cookie = h.register("volunteer").await;
    let dog = h
        .state
        .dogs
        .create(dog_rescue::dogs::NewDog {
            description: Some("Loves naps".into()),
            ..dog_rescue::dogs::NewDog::new("Chester", "beagle", "shelter")
        })
        .await
        .unwrap();

    let resp = h.get(&format!("/dogs/{}/edit", dog.id), Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("value=\"Chester\""));

    let resp = h
        .post(
            &format!("/dogs/{}?_method=PUT", dog.id),
            "location=forever+home&adopted=yes",
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), format!("/dogs/{}", dog.id));

    let updated = h.state.dogs.get(&dog.id).await.unwrap();
    assert_eq!(updated.location, "forever home");
    assert!(updated.adopted);
    assert_eq!(updated.name, "Chester");
    assert_eq!(updated.description.as_deref(), Some("Loves naps"));
}

#[tokio::test]
async fn delete_via_method_override_then_show_is_404() {
    let h = Harness::new();
    let cookie = h.register("volunteer").await;
    let dog = h
        .state
        .dogs
        .create(dog_rescue::dogs::NewDog::new("Chester", "beagle", "shelter"))
        .await
        .unwrap();

    let resp = h
        .post(&format!("/dogs/{}?_method=DELETE", dog.id), "", Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");

    let resp = h.get(&format!("/dogs/{}", dog.id), None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    // Deleting again is treated as success.
    let resp = h
        .post(&format!("/dogs/{}?_method=DELETE", dog.id), "", Some(&cookie))
        .await;
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn malformed_id_renders_not_found_page() {
    let h = Harness::new();
    let resp = h.get("/dogs/not-a-real-id", None).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert!(body_text(resp).await.contains("find that page or dog"));
}

#[tokio::test]
async fn invalid_dog_form_is_shown_back_with_a_message() {
    let h = Harness::new();
    let cookie = h.register("volunteer").await;

    let resp = h
        .post("/dogs", "name=Chester&ageYr=seven&breed=beagle&location=home", Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let html = body_text(resp).await;
    assert!(html.contains("ageYr must be a whole number"));
    assert!(html.contains("value=\"Chester\""));

    let resp = h
        .post("/dogs", "name=Chester&breed=beagle&location=home&owner=me", Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    assert!(h.state.dogs.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_registration_shows_conflict() {
    let h = Harness::new();
    h.register("volunteer").await;

    let resp = h
        .post("/register", "username=volunteer&password=another-pass", None)
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert!(session_cookie(&resp).is_none());
    assert!(body_text(resp).await.contains("already taken"));
}

#[tokio::test]
async fn login_success_and_failure_redirects() {
    let h = Harness::new();
    h.register("volunteer").await;

    let resp = h
        .post("/login", "username=volunteer&password=wrong-password", None)
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/login?error=invalid");
    assert!(session_cookie(&resp).is_none());

    let resp = h.get("/login?error=invalid", None).await;
    assert!(body_text(resp).await.contains("Invalid username or password."));

    let resp = h
        .post("/login", "username=volunteer&password=password123", None)
        .await;
    assert_eq!(location(&resp), "/profile");
    let cookie = session_cookie(&resp).unwrap();

    let resp = h.get("/profile", Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_text(resp).await.contains("Hello, volunteer"));
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    for h in [Harness::new(), Harness::with_memory_sessions()] {
        let cookie = h.register("volunteer").await;
        assert_eq!(h.get("/profile", Some(&cookie)).await.status(), StatusCode::OK);

        let resp = h.get("/logout", Some(&cookie)).await;
        assert_eq!(location(&resp), "/");
        assert!(session_cookie(&resp).unwrap().ends_with('='));

        // Replaying the old cookie is anonymous now.
        let resp = h.get("/profile", Some(&cookie)).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&resp), "/login");
    }
}

#[tokio::test]
async fn signing_in_again_revokes_the_previous_session() {
    let h = Harness::new();
    let first = h.register("volunteer").await;

    let resp = h
        .post(
            "/login",
            "username=volunteer&password=password123",
            Some(&first),
        )
        .await;
    assert_eq!(location(&resp), "/profile");
    let second = session_cookie(&resp).unwrap();
    assert_ne!(first, second);

    assert_eq!(location(&h.get("/profile", Some(&first)).await), "/login");
    assert_eq!(h.get("/profile", Some(&second)).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn deleting_a_malformed_id_is_treated_as_success() {
    let h = Harness::new();
    let cookie = h.register("volunteer").await;

    let resp = h
        .post("/dogs/not-a-real-id?_method=DELETE", "", Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp), "/");
}

#[tokio::test]
async fn store_failure_shows_an_error_page_not_an_empty_list() {
    let h = Harness::new();
    h.pool
        .get()
        .unwrap()
        .execute_batch("DROP TABLE dogs;")
        .unwrap();

    let resp = h.get("/dogs", None).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let html = body_text(resp).await;
    assert!(html.contains("unavailable right now"));
    assert!(!html.contains("No dogs listed yet."));
}
