use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use kestrel_web::prelude::*;
use serde_json::Value;
use tower::ServiceExt;

fn server() -> KestrelWebServer {
    let mut routes = RouteTable::new();
    routes
        .path("user/{id}")
        .match_num("id", NumRule::new().min(1))
        .middleware(["greet"]);
    routes
        .path("register")
        .methods([RequestMethod::Get, RequestMethod::Post])
        .on(RequestMethod::Post)
        .match_str("name", StrRule::new().max_len(8))
        .match_num("age", NumRule::new())
        .fails(Redirect::to("register").with_input(&[]));
    routes
        .path("api/items")
        .methods([RequestMethod::Post])
        .match_str("title", StrRule::new())
        .controller("ItemController", "create");
    routes
        .path("avatar")
        .methods([RequestMethod::Post])
        .match_file("avatar", FileRule::new(["text/plain"]).empty_able(false));

    let mut middleware = MiddlewareRegistry::new();
    middleware.register(
        "greet",
        Handler::new([Param::named("id")], |args, _| {
            Ok(json!({"greeting": format!("hello {}", args.i64("id").unwrap_or(0))}).into())
        }),
    );

    let mut controllers = ControllerRegistry::new();
    controllers.register(
        "UserController",
        "get",
        Handler::new([Param::named("id"), Param::named("greeting")], |args, _| {
            Ok(json!({"id": args.value("id"), "greeting": args.value("greeting")}).into())
        }),
    );
    controllers.register(
        "RegisterController",
        "get",
        Handler::new([], |_, exchange| {
            Ok(json!({
                "errors": exchange.request.flash().get("ERRORS").cloned(),
                "old": exchange.request.old("name").cloned(),
            })
            .into())
        }),
    );
    controllers.register(
        "RegisterController",
        "post",
        Handler::new([], |_, _| Ok(Redirect::home().into())),
    );
    controllers.register(
        "ItemController",
        "create",
        Handler::new([Param::named("title")], |args, _| {
            Ok(JsonResponse::new(json!({"created": args.value("title")}))
                .status(StatusCode::CREATED)
                .into())
        }),
    );
    controllers.register(
        "AvatarController",
        "post",
        Handler::new([Param::named("avatar")], |args, _| {
            Ok(json!({"name": args.value("avatar")["name"]}).into())
        }),
    );

    let kernel = Kernel::new(routes)
        .with_middleware(middleware)
        .with_controllers(controllers);

    let config = ServerProperties {
        domain: Some("http://kestrel.test".to_string()),
        enable_request_logging: false,
        ..ServerProperties::default()
    };
    KestrelWebServer::new(kernel, config)
}

fn server_with_upload_limit(max_file_size: u64) -> KestrelWebServer {
    server().with_upload(UploadProperties {
        max_file_size,
        tmp_dir: std::env::temp_dir(),
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn session_cookie(response: &axum::response::Response) -> String {
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
    cookie.split(';').next().unwrap().to_string()
}

async fn send(app: &Router, request: Request<Body>) -> axum::response::Response {
    app.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_get_runs_full_pipeline() {
    let app = server().router();

    let response = send(
        &app,
        Request::get("/user/7?extra=1").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    // 无状态请求不建立会话
    assert!(!response.headers().contains_key(header::SET_COOKIE));
    assert_eq!(
        body_json(response).await,
        json!({"id": 7, "greeting": "hello 7"})
    );
}

#[tokio::test]
async fn test_invalid_get_is_not_found() {
    let app = server().router();

    let response = send(&app, Request::get("/user/abc").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/user/abc");
    assert_eq!(body["details"]["code"], 2001);
}

#[tokio::test]
async fn test_unknown_path_hits_fallback() {
    let app = server().router();

    let response = send(&app, Request::get("/missing").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "Route not found.");
}

#[tokio::test]
async fn test_unregistered_method_is_not_found() {
    let app = server().router();

    let response = send(&app, Request::delete("/register").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_failed_form_redirects_and_flashes_errors() {
    let app = server().router();

    let response = send(
        &app,
        Request::post("/register")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=much+too+long&age=x"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "http://kestrel.test/register"
    );
    let cookie = session_cookie(&response);

    let response = send(
        &app,
        Request::get("/register")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["errors"]["name"]["code"], 1004);
    assert_eq!(body["errors"]["age"]["code"], 2001);
    assert_eq!(body["old"], "much too long");

    // 闪存只能读一次
    let response = send(
        &app,
        Request::get("/register")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(body_json(response).await["errors"], Value::Null);
}

#[tokio::test]
async fn test_valid_form_redirects_home() {
    let app = server().router();

    let response = send(
        &app,
        Request::post("/register")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=kit&age=3"))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "http://kestrel.test/");
}

#[tokio::test]
async fn test_json_body_and_explicit_controller() {
    let app = server().router();

    let response = send(
        &app,
        Request::post("/api/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title": "first", "ignored": true}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, json!({"created": "first"}));
}

#[tokio::test]
async fn test_invalid_json_input_is_bad_request() {
    let app = server().router();

    let response = send(
        &app,
        Request::post("/api/items")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"title": 5}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["details"]["code"], 1001);
    assert_eq!(body["details"]["kind"], "invalid_input");
}

#[tokio::test]
async fn test_multipart_upload() {
    let app = server().router();
    let boundary = "kestrel-boundary";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"avatar\"; filename=\"note.txt\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         hello\r\n\
         --{b}--\r\n",
        b = boundary
    );

    let response = send(
        &app,
        Request::post("/avatar")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"name": "note.txt"}));
}

#[tokio::test]
async fn test_missing_upload_is_rejected() {
    let app = server().router();
    let boundary = "kestrel-boundary";
    let body = format!(
        "--{b}\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         nothing attached\r\n\
         --{b}--\r\n",
        b = boundary
    );

    let response = send(
        &app,
        Request::post("/avatar")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["details"]["code"], 3004);
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = server_with_upload_limit(1).router();
    let limit = UploadProperties {
        max_file_size: 1,
        tmp_dir: std::env::temp_dir(),
    }
    .body_limit();
    let body = format!("title={}", "x".repeat(limit + 1));

    let response = send(
        &app,
        Request::post("/api/items")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["message"],
        "Request body is too large or unreadable."
    );
}

#[tokio::test]
async fn test_unknown_session_id_is_not_adopted() {
    let app = server().router();

    let response = send(
        &app,
        Request::get("/user/7")
            .header(header::COOKIE, "KESTRELSESSID=attacker")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key(header::SET_COOKIE));

    let response = send(
        &app,
        Request::post("/register")
            .header(header::COOKIE, "KESTRELSESSID=attacker")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=much+too+long&age=x"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("KESTRELSESSID="));
    assert_ne!(cookie, "KESTRELSESSID=attacker");
}
