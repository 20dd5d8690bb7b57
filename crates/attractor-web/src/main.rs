use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use attractor_web::server::{pipeline, stream, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let state = AppState::default();

    let app = Router::new()
        .route("/api/pipelines", post(pipeline::start_pipeline))
        .route("/api/pipelines/:id/events", get(stream::stream_events))
        .route(
            "/api/pipelines/:id/questions",
            get(pipeline::get_pending_question),
        )
        .route("/api/pipelines/:id/answers", post(pipeline::submit_answer))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("ATTRACTOR_WEB_ADDR").unwrap_or_else(|_| "127.0.0.1:7777".to_string());
    tracing::info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
