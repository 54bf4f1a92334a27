//! A server demonstrating contexts, servlets, filters and handlers.
//!
//! Run with `RUST_LOG=info cargo run --example routing_server`.

use microrest_rs::{
    filter_fn, servlet_fn, HandlerConfig, HttpServer, Json, JsonFormat, Method, ServerConfig, StatusCode,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Greeting {
    message: String,
}

#[derive(Deserialize)]
struct NewUser {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig {
        addr: "127.0.0.1:8080".parse()?,
        keep_alive: true,
        ..ServerConfig::default()
    };
    let server = HttpServer::new(config);

    // 1. Handlers on the root context
    let root = server.root()?;
    root.get("/", |_scope| Ok("Welcome to microrest-rs!"))?
        .get("/hello", |scope| {
            let name = scope.request().get_query_param("name").cloned().unwrap_or_else(|| "World".to_string());
            Ok(Json(Greeting {
                message: format!("Hello, {name}!"),
            }))
        })?
        .add_embedded_resource("/static", "banner.txt", include_bytes!("../src/banner.txt"))?;

    // 2. A request logging filter for everything
    root.filter(
        filter_fn("access-log", -10, |scope, chain| {
            log::info!("{} {}", scope.request().method, scope.request().path);
            chain.proceed();
            Ok(())
        }),
        &[],
    )?;

    // 3. An API context with a token check and per-route headers
    let api = server.context("/api")?;
    api.json_format(JsonFormat::Pretty)?.index_url("/users/me")?;
    api.filter(
        filter_fn("token", 0, |scope, chain| {
            if scope.request().has_header("X-Token") {
                chain.proceed();
                Ok(())
            } else {
                scope.response_mut().write_text(StatusCode::Unauthorized, "missing X-Token")
            }
        }),
        &["/users*"],
    )?;
    api.mapping_with_config(
        "/users",
        &[Method::POST],
        HandlerConfig::new().with_header("Cache-Control", "no-store"),
        |scope| {
            let user: NewUser = scope.request().json()?;
            scope
                .response_mut()
                .write_text(StatusCode::Created, format!("created {}", user.name))?;
            Ok(())
        },
    )?;

    // 4. A servlet owning a placeholder pattern
    api.servlet(
        "/users/{id}",
        servlet_fn("user", |scope| {
            let id = scope.placeholder("id").unwrap_or_default().to_string();
            scope.response_mut().write_json(StatusCode::Ok, &serde_json::json!({ "id": id }))
        }),
    )?;

    // 5. Failures become a JSON error body
    api.error_handler(|ctx| {
        ctx.response
            .write_json(StatusCode::InternalServerError, &serde_json::json!({ "error": ctx.cause.to_string() }))
    })?;

    server.start().await?;
    Ok(())
}
