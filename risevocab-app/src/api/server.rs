use axum::{
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::api::routes::{create_card, due_cards, list_cards, post_grade, stats, upcoming_cards, AppState};
use risevocab_core::Repository;

pub fn router(repo: Arc<dyn Repository>) -> Router {
    let state = Arc::new(AppState { repo });

    Router::new()
        .route("/cards", get(list_cards).post(create_card))
        .route("/due", get(due_cards))
        .route("/upcoming", get(upcoming_cards))
        .route("/grade", post(post_grade))
        .route("/stats", get(stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(repo: Arc<dyn Repository>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = router(repo);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "api listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
