//! Request pipeline contract, checked in-process on both engines.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use http::StatusCode;
use serde::Deserialize;
use serde_json::json;

use servekit::core::{handler, ContextExt, Ctx, HandlerFunc, Value};
use servekit::errors::HttpError;
use servekit::middleware::{
    auth, cors, default_basic_auth, default_error_handler, duplicate_request, logging, sign_hs256, timeout,
    AuthConfig, AuthError, BasicAuthUserLookup, BodyHashGenerator, CorsConfig, DuplicateRequestConfig,
    JwtUserLookup, MapClaims, MemoryRequestIdStorage, TimeoutConfig,
};

mod common;
use common::{captured_logging, get, json_body, request, test_server, test_server_with, text_body, ENGINES};

const SECRET: &str = "pipeline-secret";

fn ok(body: &'static str) -> HandlerFunc {
    handler(move |c: Ctx| async move { c.string(StatusCode::OK, body) })
}

fn counting(hits: &Arc<AtomicUsize>) -> HandlerFunc {
    let hits = hits.clone();
    handler(move |c: Ctx| {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
            c.string(StatusCode::OK, "downstream");
        }
    })
}

struct Users;

impl BasicAuthUserLookup for Users {
    fn lookup_user_by_basic_auth(&self, username: &str, password: &str) -> Result<Value, AuthError> {
        if username == "user" && password == "goodpass" {
            Ok(Arc::new(username.to_string()))
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}

impl JwtUserLookup for Users {
    fn lookup_user_by_jwt(&self, claims: &MapClaims) -> Result<Value, AuthError> {
        claims
            .get("sub")
            .and_then(|sub| sub.as_str())
            .map(|sub| Arc::new(sub.to_string()) as Value)
            .ok_or(AuthError::UserNotFound)
    }
}

#[tokio::test]
async fn handlers_run_in_registration_order() {
    for engine in ENGINES {
        let server = test_server(engine);
        let trace = |label: &'static str| {
            handler(move |c: Ctx| async move {
                let mut seen = c.get_as::<Vec<&'static str>>("trace").map(|v| (*v).clone()).unwrap_or_default();
                seen.push(label);
                c.set("trace", Arc::new(seen));
                c.next().await;
            })
        };
        server.use_middleware(vec![trace("global-1"), trace("global-2")]);
        let group = server.group("/api");
        group.use_middleware(vec![trace("group")]);
        group.get(
            "/order",
            vec![
                trace("route-1"),
                handler(|c: Ctx| async move {
                    let seen = c.get_as::<Vec<&'static str>>("trace").map(|v| (*v).clone()).unwrap_or_default();
                    c.json(StatusCode::OK, &seen);
                }),
            ],
        );

        let response = server.dispatch(get("/api/order")).await;
        assert_eq!(response.status(), StatusCode::OK, "{engine}");
        assert_eq!(
            json_body(&response),
            json!(["global-1", "global-2", "group", "route-1"]),
            "{engine}"
        );
    }
}

#[tokio::test]
async fn params_wildcards_and_query() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.get(
            "/users/:id",
            vec![handler(|c: Ctx| async move {
                c.json(
                    StatusCode::OK,
                    &json!({"id": c.param("id"), "tab": c.default_query("tab", "profile"), "q": c.query("q")}),
                );
            })],
        );
        server.get("/users/me", vec![ok("static wins")]);
        server.get(
            "/files/*path",
            vec![handler(|c: Ctx| async move { c.string(StatusCode::OK, &c.param("path")) })],
        );
        let v1 = server.group("/v1");
        let admin = v1.group("/admin");
        admin.get("/stats", vec![ok("stats")]);

        let response = server.dispatch(get("/users/42?q=rust")).await;
        assert_eq!(
            json_body(&response),
            json!({"id": "42", "tab": "profile", "q": "rust"}),
            "{engine}"
        );
        assert_eq!(text_body(&server.dispatch(get("/users/me")).await), "static wins", "{engine}");
        let files = text_body(&server.dispatch(get("/files/a/b.txt")).await);
        assert!(files.ends_with("a/b.txt"), "{engine}: {files}");
        assert_eq!(text_body(&server.dispatch(get("/v1/admin/stats")).await), "stats", "{engine}");
    }
}

#[tokio::test]
async fn default_not_found_and_method_not_allowed() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.get("/items", vec![ok("items")]);

        let response = server.dispatch(get("/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{engine}");
        assert_eq!(
            json_body(&response),
            json!({"error": {"code": 404, "message": "route not found: /missing"}}),
            "{engine}"
        );

        let response = server.dispatch(request("DELETE", "/items", &[], "")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{engine}");
        assert_eq!(
            json_body(&response),
            json!({"error": {"code": 405, "message": "method DELETE not allowed for path /items"}}),
            "{engine}"
        );
    }
}

#[tokio::test]
async fn fallbacks_run_behind_global_middleware() {
    for engine in ENGINES {
        let server = test_server(engine);
        let (config, sink) = captured_logging(&[]);
        server.use_middleware(vec![default_error_handler(), logging(config)]);
        server.get("/items", vec![ok("items")]);
        server.no_route(vec![handler(|c: Ctx| async move {
            c.json(StatusCode::NOT_FOUND, &json!({"custom": true}));
        })]);

        let response = server.dispatch(get("/nowhere")).await;
        assert_eq!(json_body(&response), json!({"custom": true}), "{engine}");
        server.dispatch(request("PUT", "/items", &[], "")).await;

        let entries = sink.entries();
        assert_eq!(entries.len(), 2, "{engine}");
        assert_eq!(entries[0].status_code, 404, "{engine}");
        assert_eq!(entries[1].status_code, 405, "{engine}");
    }
}

#[tokio::test]
async fn abort_and_implicit_stop_skip_downstream() {
    for engine in ENGINES {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = test_server(engine);
        let gate = handler(|c: Ctx| async move {
            match c.request().path() {
                "/aborted" => {
                    c.string(StatusCode::FORBIDDEN, "nope");
                    c.abort();
                    c.next().await;
                }
                "/silent" => c.string(StatusCode::ACCEPTED, "stopped here"),
                _ => c.next().await,
            }
        });
        server.use_middleware(vec![gate]);
        for path in ["/aborted", "/silent", "/open"] {
            server.get(path, vec![counting(&hits)]);
        }

        let aborted = server.dispatch(get("/aborted")).await;
        assert_eq!(aborted.status(), StatusCode::FORBIDDEN, "{engine}");
        assert_eq!(text_body(&aborted), "nope");
        let silent = server.dispatch(get("/silent")).await;
        assert_eq!(silent.status(), StatusCode::ACCEPTED, "{engine}");
        assert_eq!(hits.load(Ordering::SeqCst), 0, "{engine}");

        server.dispatch(get("/open")).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1, "{engine}");
    }
}

#[tokio::test]
async fn repeated_next_does_not_resume_a_stopped_chain() {
    for engine in ENGINES {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = test_server(engine);
        let twice = || {
            handler(|c: Ctx| async move {
                c.next().await;
                c.next().await;
            })
        };
        let stopper = handler(|c: Ctx| async move { c.string(StatusCode::OK, "stopper") });
        server.use_middleware(vec![twice()]);
        server.get("/route", vec![twice(), stopper.clone(), counting(&hits)]);
        server.get("/global", vec![stopper, counting(&hits)]);

        for path in ["/route", "/global"] {
            let response = server.dispatch(get(path)).await;
            assert_eq!(response.status(), StatusCode::OK, "{engine} {path}");
            assert_eq!(text_body(&response), "stopper", "{engine} {path}");
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0, "{engine}");
    }
}

#[tokio::test]
async fn first_status_wins_but_body_appends() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.get(
            "/twice",
            vec![handler(|c: Ctx| async move {
                c.set_status(StatusCode::CREATED);
                c.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                c.writer().write(b"a");
                c.writer().write(b"b");
            })],
        );
        let response = server.dispatch(get("/twice")).await;
        assert_eq!(response.status(), StatusCode::CREATED, "{engine}");
        assert_eq!(text_body(&response), "ab", "{engine}");
    }
}

#[tokio::test]
async fn panics_become_500_envelopes() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.use_middleware(vec![default_error_handler()]);
        server.get("/str", vec![handler(|_c: Ctx| async { panic!("string panic") })]);
        server.get(
            "/error",
            vec![handler(|_c: Ctx| async {
                std::panic::panic_any(HttpError::conflict("error panic"))
            })],
        );
        server.get(
            "/value",
            vec![handler(|_c: Ctx| async { std::panic::panic_any(vec![1_u8, 2, 3]) })],
        );

        for path in ["/str", "/error", "/value"] {
            let response = server.dispatch(get(path)).await;
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{engine} {path}");
            assert_eq!(
                json_body(&response),
                json!({"error": {"code": 500, "message": "Internal Server Error"}}),
                "{engine} {path}"
            );
        }
    }
}

#[tokio::test]
async fn engine_safety_net_without_error_middleware() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.get("/panic", vec![handler(|_c: Ctx| async { panic!("unguarded") })]);
        server.get(
            "/recorded",
            vec![handler(|c: Ctx| async move {
                c.record_error(HttpError::service_unavailable("maintenance"));
            })],
        );

        let response = server.dispatch(get("/panic")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{engine}");
        assert_eq!(json_body(&response)["error"]["code"], 500, "{engine}");

        let response = server.dispatch(get("/recorded")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{engine}");
        assert_eq!(json_body(&response)["error"]["message"], "maintenance", "{engine}");
    }
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
}

#[tokio::test]
async fn binding_failures_are_bad_requests() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.use_middleware(vec![default_error_handler()]);
        server.post(
            "/orders",
            vec![handler(|c: Ctx| async move {
                let Ok(order) = c.bind::<Order>() else {
                    return;
                };
                c.json(StatusCode::CREATED, &json!({"id": order.id}));
            })],
        );

        let created = server
            .dispatch(request("POST", "/orders", &[("Content-Type", "application/json")], r#"{"id":"7"}"#))
            .await;
        assert_eq!(created.status(), StatusCode::CREATED, "{engine}");

        let form = server
            .dispatch(request(
                "POST",
                "/orders",
                &[("Content-Type", "application/x-www-form-urlencoded")],
                "id=8",
            ))
            .await;
        assert_eq!(json_body(&form), json!({"id": "8"}), "{engine}");

        let broken = server
            .dispatch(request("POST", "/orders", &[("Content-Type", "application/json")], "{"))
            .await;
        assert_eq!(broken.status(), StatusCode::BAD_REQUEST, "{engine}");
        assert_eq!(json_body(&broken)["error"]["code"], 400, "{engine}");
    }
}

#[tokio::test]
async fn oversized_bodies_get_413() {
    for engine in ENGINES {
        let server = test_server_with(engine, |options| options.max_body_bytes = 8);
        server.post("/upload", vec![ok("stored")]);

        let small = server.dispatch(request("POST", "/upload", &[], "tiny")).await;
        assert_eq!(small.status(), StatusCode::OK, "{engine}");
        let large = server
            .dispatch(request("POST", "/upload", &[], "this body is far too long"))
            .await;
        assert_eq!(large.status(), StatusCode::PAYLOAD_TOO_LARGE, "{engine}");
        assert_eq!(json_body(&large)["error"]["code"], 413, "{engine}");
    }
}

#[tokio::test]
async fn health_skip_path_needs_no_auth_and_is_not_logged() {
    for engine in ENGINES {
        let server = test_server(engine);
        let (config, sink) = captured_logging(&["/health"]);
        let auth = auth(AuthConfig {
            jwt_lookup: Some(Arc::new(Users)),
            jwt_secret: SECRET.into(),
            skip_paths: vec!["/health".into(), "/public/*".into(), "/docs/:page".into()],
            ..AuthConfig::default()
        })
        .unwrap();
        server.use_middleware(vec![logging(config), auth]);
        server.get("/health", vec![ok("healthy")]);
        server.get("/public/info", vec![ok("info")]);
        server.get("/docs/:page", vec![ok("docs")]);
        server.get("/private", vec![ok("secret")]);

        let response = server.dispatch(get("/health")).await;
        assert_eq!(response.status(), StatusCode::OK, "{engine}");
        assert_eq!(text_body(&response), "healthy");
        assert!(sink.entries().is_empty(), "{engine}");

        assert_eq!(server.dispatch(get("/public/info")).await.status(), StatusCode::OK);
        assert_eq!(server.dispatch(get("/docs/intro")).await.status(), StatusCode::OK);
        assert_eq!(server.dispatch(get("/private")).await.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(sink.paths(), vec!["/public/info", "/docs/intro", "/private"], "{engine}");
    }
}

fn jwt_server(engine: servekit::FrameworkType) -> Box<dyn servekit::Server> {
    let server = test_server(engine);
    let auth = servekit::middleware::default_jwt_auth(Arc::new(Users), SECRET).unwrap();
    server.use_middleware(vec![auth]);
    server.get(
        "/me",
        vec![handler(|c: Ctx| async move {
            let user = servekit::middleware::user_from_context(c.as_ref())
                .and_then(|u| u.downcast::<String>().ok())
                .map(|u| (*u).clone())
                .unwrap_or_default();
            c.string(StatusCode::OK, &user);
        })],
    );
    server
}

#[tokio::test]
async fn jwt_non_hs256_is_rejected_even_when_signed() {
    for engine in ENGINES {
        let server = jwt_server(engine);
        for alg in ["HS384", "none", "RS256"] {
            let header = URL_SAFE_NO_PAD.encode(format!(r#"{{"alg":"{alg}","typ":"JWT"}}"#));
            let payload = URL_SAFE_NO_PAD.encode(r#"{"sub":"eve"}"#);
            let valid = sign_hs256(json!({"sub": "eve"}).as_object().unwrap(), SECRET.as_bytes()).unwrap();
            let signature = valid.rsplit('.').next().unwrap();
            let token = format!("{header}.{payload}.{signature}");
            let response = server
                .dispatch(request("GET", "/me", &[("Authorization", &format!("Bearer {token}"))], ""))
                .await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{engine} {alg}");
        }
    }
}

#[tokio::test]
async fn jwt_signature_must_match() {
    for engine in ENGINES {
        let server = jwt_server(engine);
        let good = sign_hs256(json!({"sub": "alice"}).as_object().unwrap(), SECRET.as_bytes()).unwrap();
        let response = server
            .dispatch(request("GET", "/me", &[("Authorization", &format!("Bearer {good}"))], ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{engine}");
        assert_eq!(text_body(&response), "alice");

        let forged = sign_hs256(json!({"sub": "alice"}).as_object().unwrap(), b"guess").unwrap();
        let response = server
            .dispatch(request("GET", "/me", &[("Authorization", &format!("Bearer {forged}"))], ""))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{engine}");
        assert_eq!(
            json_body(&response),
            json!({"error": {"code": 401, "message": "Unauthorized"}})
        );
    }
}

#[tokio::test]
async fn basic_auth_bad_password_envelope() {
    assert_eq!(STANDARD.encode("user:badpass"), "dXNlcjpiYWRwYXNz");
    for engine in ENGINES {
        let server = test_server(engine);
        server.use_middleware(vec![default_basic_auth(Arc::new(Users)).unwrap()]);
        server.get("/account", vec![ok("account")]);

        let response = server
            .dispatch(request("GET", "/account", &[("Authorization", "Basic dXNlcjpiYWRwYXNz")], ""))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{engine}");
        assert_eq!(text_body(&response), r#"{"error":{"code":401,"message":"Unauthorized"}}"#);

        let good = format!("Basic {}", STANDARD.encode("user:goodpass"));
        let response = server
            .dispatch(request("GET", "/account", &[("Authorization", &good)], ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{engine}");
    }
}

#[tokio::test]
async fn duplicate_post_is_conflict() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.use_middleware(vec![duplicate_request(DuplicateRequestConfig::new(
            Arc::new(BodyHashGenerator),
            Arc::new(MemoryRequestIdStorage::new()),
        ))]);
        server.post(
            "/orders",
            vec![handler(|c: Ctx| async move { c.json(StatusCode::CREATED, &json!({"ok": true})) })],
        );

        let first = server.dispatch(request("POST", "/orders", &[], r#"{"id":"123"}"#)).await;
        assert_eq!(first.status(), StatusCode::CREATED, "{engine}");
        let second = server.dispatch(request("POST", "/orders", &[], r#"{"id":"123"}"#)).await;
        assert_eq!(second.status(), StatusCode::CONFLICT, "{engine}");
        assert!(text_body(&second).contains("Duplicate request detected"));
    }
}

#[tokio::test]
async fn timeout_produces_exactly_one_503() {
    for engine in ENGINES {
        let late_writes = Arc::new(AtomicUsize::new(0));
        let server = test_server(engine);
        server.use_middleware(vec![
            default_error_handler(),
            timeout(TimeoutConfig {
                timeout: Duration::from_millis(50),
            }),
        ]);
        {
            let late_writes = late_writes.clone();
            server.get(
                "/slow",
                vec![handler(move |c: Ctx| {
                    let late_writes = late_writes.clone();
                    async move {
                        tokio::time::sleep(Duration::from_millis(250)).await;
                        c.json(StatusCode::OK, &json!({"late": true}));
                        late_writes.fetch_add(1, Ordering::SeqCst);
                    }
                })],
            );
        }

        let started = Instant::now();
        let response = server.dispatch(get("/slow")).await;
        assert!(started.elapsed() < Duration::from_millis(240), "{engine}");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE, "{engine}");
        assert_eq!(text_body(&response), "Request timed out after 50ms", "{engine}");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(late_writes.load(Ordering::SeqCst), 1, "{engine}");
    }
}

#[tokio::test]
async fn logging_captures_handler_status_and_latency() {
    for engine in ENGINES {
        let server = test_server(engine);
        let (config, sink) = captured_logging(&[]);
        server.use_middleware(vec![default_error_handler(), logging(config)]);
        server.get(
            "/explode",
            vec![handler(|c: Ctx| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                c.json(StatusCode::INTERNAL_SERVER_ERROR, &json!({"reason": "db"}));
            })],
        );

        let response = server
            .dispatch(request("GET", "/explode", &[("X-Real-IP", "198.51.100.4")], ""))
            .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let entries = sink.entries();
        assert_eq!(entries.len(), 1, "{engine}");
        assert_eq!(entries[0].status_code, 500, "{engine}");
        assert!(entries[0].latency > 0, "{engine}");
        assert_eq!(entries[0].client_ip, "198.51.100.4", "{engine}");
        assert_eq!(
            response.headers()["x-request-id"].to_str().unwrap(),
            entries[0].request_id,
            "{engine}"
        );
    }
}

#[tokio::test]
async fn cors_preflight_short_circuits() {
    for engine in ENGINES {
        let hits = Arc::new(AtomicUsize::new(0));
        let server = test_server(engine);
        let (config, sink) = captured_logging(&[]);
        server.use_middleware(vec![cors(CorsConfig::default()), logging(config)]);
        server.get("/api/data", vec![counting(&hits)]);

        let response = server
            .dispatch(request("OPTIONS", "/api/data", &[("Origin", "http://x.com")], ""))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{engine}");
        assert_eq!(response.headers()["access-control-allow-origin"], "*", "{engine}");
        assert_eq!(
            response.headers()["access-control-allow-methods"],
            "GET, POST, PUT, DELETE, OPTIONS, PATCH"
        );
        assert_eq!(hits.load(Ordering::SeqCst), 0, "{engine}");
        assert!(sink.entries().is_empty(), "{engine}");

        let response = server
            .dispatch(request("GET", "/api/data", &[("Origin", "http://x.com")], ""))
            .await;
        assert_eq!(text_body(&response), "downstream", "{engine}");
        assert_eq!(hits.load(Ordering::SeqCst), 1, "{engine}");
    }
}

#[tokio::test]
async fn api_key_guards_routes() {
    for engine in ENGINES {
        let server = test_server(engine);
        server.use_middleware(vec![servekit::middleware::default_api_key("k-123").unwrap()]);
        server.get("/data", vec![ok("data")]);

        let denied = server.dispatch(get("/data")).await;
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED, "{engine}");
        let allowed = server
            .dispatch(request("GET", "/data", &[("x-api-key", "k-123")], ""))
            .await;
        assert_eq!(text_body(&allowed), "data", "{engine}");
    }
}
