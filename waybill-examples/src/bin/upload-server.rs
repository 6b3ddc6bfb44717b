//! Example: waybill router and multipart decoding behind axum
//!
//! Every request goes through an axum fallback that converts it into a
//! `waybill::Request` and dispatches it with a `waybill` router. Unmatched
//! requests get a plain 404.
//!
//! Run with: cargo run --bin upload-server
//! Bind address: WAYBILL_ADDR (default 0.0.0.0:3000)

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;
use waybill::http::StatusCode;
use waybill::multipart::MultipartLimits;
use waybill::prelude::*;

#[derive(Deserialize)]
struct FileParams {
    id: u64,
}

fn error_response(status: StatusCode, err: impl std::fmt::Display) -> Response {
    Response::text(err.to_string()).with_status(status)
}

fn json_response(value: serde_json::Value) -> Response {
    Response::json(&value)
        .unwrap_or_else(|err| error_response(StatusCode::INTERNAL_SERVER_ERROR, err))
}

/// GET /files/{id}
async fn get_file(_req: Request, matched: RouteMatch) -> Response {
    match matched.path_as::<FileParams>() {
        Ok(params) => json_response(json!({
            "id": params.id,
            "download": matched.query_param("download").is_some(),
        })),
        Err(err) => error_response(StatusCode::BAD_REQUEST, err),
    }
}

/// POST /upload: report name, filename and size of every part.
async fn upload(mut req: Request, _matched: RouteMatch) -> Response {
    let mut multipart = req.multipart(MultipartLimits::default());
    let mut received = Vec::new();

    loop {
        let part = match multipart.try_next_part().await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(err) => return error_response(StatusCode::BAD_REQUEST, err),
        };

        let name = part.name().unwrap_or_default().to_string();
        let filename = part.filename().map(str::to_string);
        let content_type = part.content_type().map(str::to_string);
        match part.decoded_bytes().await {
            Ok(bytes) => received.push(json!({
                "name": name,
                "filename": filename,
                "content_type": content_type,
                "size": bytes.len(),
            })),
            Err(err) => return error_response(StatusCode::BAD_REQUEST, err),
        }
    }

    tracing::info!(parts = received.len(), "upload received");
    json_response(json!({ "parts": received }))
}

/// GET /static/*
async fn static_file(_req: Request, matched: RouteMatch) -> Response {
    Response::text(format!("static asset: {}", matched.wildcard(0).unwrap_or_default()))
}

/// GET /search?q&!token
async fn search(_req: Request, matched: RouteMatch) -> Response {
    json_response(json!({
        "q": matched.query_param("q"),
        "fragment": matched.fragment,
    }))
}

fn routes() -> Result<Router, waybill::Error> {
    Router::new()
        .get("/files/{id}", get_file)?
        .post("/upload", upload)?
        .get("/static/*", static_file)?
        .get("/search?q&!token", search)
}

fn into_axum(response: Response) -> axum::response::Response {
    response.into_http().map(axum::body::Body::new)
}

async fn serve(
    State(router): State<Arc<Router>>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let request = match Request::from_http(request) {
        Ok(request) => request,
        Err(err) => return into_axum(error_response(StatusCode::BAD_REQUEST, err)),
    };

    match router.dispatch(request).await {
        Ok(response) => into_axum(response),
        Err(unmatched) => {
            tracing::info!(
                method = %unmatched.method,
                path = unmatched.path(),
                "no route, answering 404"
            );
            into_axum(Response::not_found())
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,waybill=debug")),
        )
        .init();

    let router = Arc::new(routes()?);
    for route in router.routes() {
        tracing::info!(
            method = ?route.method(),
            template = route.template().source(),
            "route registered"
        );
    }

    let app = axum::Router::new().fallback(serve).with_state(router);

    let addr: SocketAddr = std::env::var("WAYBILL_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    println!("=== Example: waybill upload server ===");
    println!("Server listening on http://{}", addr);
    println!();
    println!("Test with:");
    println!("  curl http://localhost:3000/files/42?download");
    println!("  curl http://localhost:3000/static/css/site.css");
    println!("  curl 'http://localhost:3000/search?q=rust&token=abc'");
    println!("  curl -F title=hello -F file=@Cargo.toml http://localhost:3000/upload");

    axum::serve(listener, app).await?;
    Ok(())
}
