// Axum service that turns policy text posted by an editor into the graph the
// editor draws. One shared GraphBuilder serves every request.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use policy_graph::*;
use std::sync::Arc;

// --------------------
// 1) Shared builder
// --------------------

/// Builder shared by all handlers. Names prefixed with `role:` are always
/// drawn as roles, everything else goes through the default heuristic.
pub fn build_graph_builder() -> Arc<GraphBuilder> {
    Arc::new(
        GraphBuilder::new().classifier(|name: &str, usage: &NodeUsage| {
            if name.starts_with("role:") {
                NodeType::Role
            } else {
                HeuristicClassifier.classify(name, usage)
            }
        }),
    )
}

// --------------------
// 2) Handlers
// --------------------

/// `POST /graph` with the policy text as the body.
///
/// Responds with the full graph. Non-blank text that yields no relation is
/// answered with 422 so the editor can show its empty state.
pub async fn graph_handler(
    Extension(builder): Extension<Arc<GraphBuilder>>,
    body: String,
) -> impl IntoResponse {
    let graph = builder.build(&body);
    let status = if graph.is_empty() && !body.trim().is_empty() {
        StatusCode::UNPROCESSABLE_ENTITY
    } else {
        StatusCode::OK
    };
    (status, Json(graph))
}

/// `POST /cycles` with the policy text as the body.
///
/// Returns only the detected role-inheritance loops.
pub async fn cycles_handler(
    Extension(builder): Extension<Arc<GraphBuilder>>,
    body: String,
) -> Json<Vec<Vec<String>>> {
    Json(builder.build(&body).cycles)
}

pub fn app() -> Router {
    Router::new()
        .route("/graph", post(graph_handler))
        .route("/cycles", post(cycles_handler))
        .layer(Extension(build_graph_builder()))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await.unwrap();
    println!("Listening on http://0.0.0.0:8000");
    axum::serve(listener, app()).await.unwrap();
}
