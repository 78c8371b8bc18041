use hyper::StatusCode;
use squehub::prelude::*;
use std::fs;
use tempfile::TempDir;

fn test_app(session_exempt: &[&str]) -> (TempDir, Squehub) {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("notice.squehub.html"),
        "@notification('success')|@notification('success')",
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.views.directory = temp_dir.path().display().to_string();
    config.views.cache_enabled = false;
    config.csrf.enabled = false;
    config.session.exempt_routes = session_exempt.iter().map(|s| s.to_string()).collect();
    (temp_dir, Squehub::with_config(config))
}

fn login(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        ctx.session_set("user", "ada")?;
        ctx.flash("welcome", "first visit")?;
        ctx.notify("success", "Logged in")?;
        ctx.redirect("/profile")
    })
}

fn profile(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let user: String = ctx.session_get("user").unwrap_or_else(|| "guest".to_string());
        let welcome = ctx
            .get_flash("welcome")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        ctx.text(format!("{}:{}", user, welcome))
    })
}

fn notice(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move { ctx.view("notice", json!({})) })
}

fn health(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let body = if ctx.has_session() { "session" } else { "none" };
        ctx.text(body)
    })
}

fn session_cookie(response: &Response) -> String {
    let header = response.header("set-cookie").unwrap();
    assert!(header.contains("HttpOnly"));
    assert!(header.contains("SameSite=Lax"));
    header.split(';').next().unwrap().to_string()
}

fn routes(app: Squehub) -> Squehub {
    app.routes(|router| {
        router.add(Route::get("/login", login))?;
        router.add(Route::get("/profile", profile))?;
        router.add(Route::get("/notice", notice))?;
        router.add(Route::get("/health", health))
    })
    .unwrap()
}

#[tokio::test]
async fn test_session_round_trips_through_cookie() {
    let (_dir, app) = test_app(&[]);
    let app = routes(app);

    let response = app.dispatch(Request::new("GET", "/login")).await;
    assert_eq!(response.status, StatusCode::FOUND);
    assert_eq!(response.header("location"), Some("/profile"));
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("squehub_session="));

    let response = app
        .dispatch(Request::new("GET", "/profile").with_header("Cookie", &cookie))
        .await;
    assert_eq!(response.body_string(), "ada:first visit");
    assert_eq!(session_cookie(&response), cookie);

    // Flash values are gone on the next request; session data stays
    let response = app
        .dispatch(Request::new("GET", "/profile").with_header("Cookie", &cookie))
        .await;
    assert_eq!(response.body_string(), "ada:");
}

#[tokio::test]
async fn test_unknown_cookie_starts_fresh_session() {
    let (_dir, app) = test_app(&[]);
    let app = routes(app);

    let response = app
        .dispatch(Request::new("GET", "/profile").with_header("Cookie", "squehub_session=forged"))
        .await;
    assert_eq!(response.body_string(), "guest:");
    assert_ne!(session_cookie(&response), "squehub_session=forged");
}

#[tokio::test]
async fn test_notification_renders_once() {
    let (_dir, app) = test_app(&[]);
    let app = routes(app);

    let response = app.dispatch(Request::new("GET", "/login")).await;
    let cookie = session_cookie(&response);

    let response = app
        .dispatch(Request::new("GET", "/notice").with_header("Cookie", &cookie))
        .await;
    assert_eq!(
        response.body_string(),
        "<p style=\"color: green; \">Logged in</p>|"
    );

    let response = app
        .dispatch(Request::new("GET", "/notice").with_header("Cookie", &cookie))
        .await;
    assert_eq!(response.body_string(), "|");
}

#[tokio::test]
async fn test_exempt_routes_get_no_session() {
    let (_dir, app) = test_app(&["/health"]);
    let app = routes(app);

    let response = app.dispatch(Request::new("GET", "/health")).await;
    assert_eq!(response.body_string(), "none");
    assert!(response.header("set-cookie").is_none());

    let response = app.dispatch(Request::new("GET", "/profile")).await;
    assert!(response.header("set-cookie").is_some());
}

#[tokio::test]
async fn test_handlers_without_session_fail_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.views.directory = temp_dir.path().display().to_string();
    config.session.enabled = false;
    config.csrf.enabled = false;
    let app = routes(Squehub::with_config(config));
    assert!(app.session_store().is_none());

    let response = app.dispatch(Request::new("GET", "/login")).await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_expired_sessions_are_cleaned_up() {
    let (_dir, app) = test_app(&[]);
    let app = routes(app);
    app.dispatch(Request::new("GET", "/login")).await;

    let store = app.session_store().unwrap();
    assert_eq!(store.backend_name(), "memory");
    assert_eq!(store.cleanup_expired().await.unwrap(), 0);
}
