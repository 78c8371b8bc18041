use hyper::StatusCode;
use squehub::prelude::*;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type Log = Arc<Mutex<Vec<String>>>;

/// Records both phases and answers with a fixed action
#[derive(Clone)]
struct Recorder {
    label: &'static str,
    action: InboundAction,
    priority: i32,
    log: Log,
}

impl Recorder {
    fn new(label: &'static str, action: InboundAction, log: &Log) -> Self {
        Self {
            label,
            action,
            priority: 0,
            log: Arc::clone(log),
        }
    }

    fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

#[async_trait]
impl InboundMiddleware for Recorder {
    async fn process_request(&self, ctx: &mut Context) -> Result<InboundAction> {
        self.log.lock().unwrap().push(format!("in:{}", self.label));
        if self.action == InboundAction::Stop {
            ctx.throw403(Some("stopped"))?;
        }
        Ok(self.action)
    }

    fn name(&self) -> &'static str {
        self.label
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[async_trait]
impl OutboundMiddleware for Recorder {
    async fn process_response(&self, ctx: &mut Context) -> Result<()> {
        self.log.lock().unwrap().push(format!("out:{}", self.label));
        ctx.add_header("X-Seen-By", self.label);
        Ok(())
    }
}

fn handler(ctx: &mut Context) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        let marker = ctx.get::<String>("marker").cloned().unwrap_or_default();
        ctx.text(format!("handler{}", marker))
    })
}

fn test_app() -> (TempDir, Squehub) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = AppConfig::default();
    config.views.directory = temp_dir.path().display().to_string();
    config.views.cache_enabled = false;
    config.session.enabled = false;
    config.csrf.enabled = false;
    (temp_dir, Squehub::with_config(config))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[tokio::test]
async fn test_captured_outbound_runs_in_reverse() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            registry.register_dual("a", Recorder::new("a", InboundAction::Capture, &log));
            registry.register_dual("b", Recorder::new("b", InboundAction::Capture, &log));
        })
        .routes(|router| router.add(Route::get("/", handler).middleware("a").middleware("b")))
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.body_string(), "handler");
    assert_eq!(entries(&log), vec!["in:a", "in:b", "out:b", "out:a"]);

    let seen: Vec<&str> = response
        .headers
        .iter()
        .filter(|(name, _)| name == "X-Seen-By")
        .map(|(_, value)| value.as_str())
        .collect();
    assert_eq!(seen, vec!["b", "a"]);
}

#[tokio::test]
async fn test_stop_short_circuits_chain_and_handler() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            registry.register_dual("a", Recorder::new("a", InboundAction::Capture, &log));
            registry.register_dual("gate", Recorder::new("gate", InboundAction::Stop, &log));
            registry.register_dual("c", Recorder::new("c", InboundAction::Continue, &log));
        })
        .routes(|router| {
            router.add(
                Route::get("/", handler)
                    .middleware("a")
                    .middleware("gate")
                    .middleware("c"),
            )
        })
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body_string(), "stopped");
    assert_eq!(entries(&log), vec!["in:a", "in:gate", "out:a"]);
}

#[tokio::test]
async fn test_inbound_only_middleware_never_gets_outbound() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            registry.register_inbound("plain", Recorder::new("plain", InboundAction::Capture, &log));
        })
        .routes(|router| router.add(Route::get("/", handler).middleware("plain")))
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.body_string(), "handler");
    assert_eq!(entries(&log), vec!["in:plain"]);
}

#[tokio::test]
async fn test_continue_skips_outbound_phase() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            registry.register_dual("pass", Recorder::new("pass", InboundAction::Continue, &log));
            registry.register_dual("keep", Recorder::new("keep", InboundAction::Capture, &log));
        })
        .routes(|router| router.add(Route::get("/", handler).middleware("pass").middleware("keep")))
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.header("X-Seen-By"), Some("keep"));
    assert_eq!(entries(&log), vec!["in:pass", "in:keep", "out:keep"]);
}

#[tokio::test]
async fn test_route_middleware_precede_group_middleware() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            for label in ["route", "outer", "inner"] {
                registry.register_inbound(label, Recorder::new(label, InboundAction::Continue, &log));
            }
        })
        .routes(|router| {
            router.group(GroupAttributes::new().prefix("/admin").middleware("outer"), |admin| {
                admin.group(GroupAttributes::new().prefix("/reports").middleware("inner"), |reports| {
                    reports.add(Route::get("/daily", handler).middleware("route"))
                })
            })
        })
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/admin/reports/daily")).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(entries(&log), vec!["in:route", "in:outer", "in:inner"]);
}

#[tokio::test]
async fn test_global_middleware_ordered_by_priority() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .global(|registry| {
            registry.register_dual(
                "late",
                Recorder::new("late", InboundAction::Capture, &log).with_priority(10),
            );
            registry.register_dual(
                "early",
                Recorder::new("early", InboundAction::Capture, &log).with_priority(-10),
            );
        })
        .middleware_from(|registry| {
            registry.register_dual("route", Recorder::new("route", InboundAction::Capture, &log));
        })
        .routes(|router| router.add(Route::get("/", handler).middleware("route")))
        .unwrap();

    app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(
        entries(&log),
        vec!["in:early", "in:late", "in:route", "out:route", "out:late", "out:early"]
    );
}

#[tokio::test]
async fn test_global_stop_skips_routing() {
    let log: Log = Arc::default();
    let (_dir, app) = test_app();
    let app = app
        .global(|registry| {
            registry.register_inbound("maintenance", Recorder::new("maintenance", InboundAction::Stop, &log));
        })
        .routes(|router| router.add(Route::get("/", handler)))
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app.dispatch(Request::new("GET", "/unknown")).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_inline_closure_middleware() {
    let (_dir, app) = test_app();
    let app = app
        .routes(|router| {
            router.add(Route::get("/api", handler).middleware(MiddlewareRef::func(
                "json-only",
                |ctx| {
                    if ctx.header("accept") == Some("application/json") {
                        ctx.set("marker", "+json".to_string())?;
                        return Ok(InboundAction::Continue);
                    }
                    ctx.json(json!({"error": "json only"}))?;
                    ctx.status(StatusCode::NOT_ACCEPTABLE);
                    Ok(InboundAction::Stop)
                },
            )))
        })
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/api")).await;
    assert_eq!(response.status, StatusCode::NOT_ACCEPTABLE);
    assert_eq!(response.body_string(), r#"{"error":"json only"}"#);

    let response = app
        .dispatch(Request::new("GET", "/api").with_header("Accept", "application/json"))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body_string(), "handler+json");
}

#[tokio::test]
async fn test_registered_closure_middleware() {
    let (_dir, app) = test_app();
    let app = app
        .middleware_from(|registry| {
            registry.register_fn("tag", |ctx| {
                ctx.set("marker", "+tagged".to_string())?;
                Ok(InboundAction::Continue)
            })
        })
        .routes(|router| router.add(Route::get("/", handler).middleware("tag")))
        .unwrap();

    let response = app.dispatch(Request::new("GET", "/")).await;
    assert_eq!(response.body_string(), "handler+tagged");
}
