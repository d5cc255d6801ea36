pub mod spond;

use axum::{
    Json, Router,
    routing::{get, post},
};

use crate::{
    AppState,
    middleware::auth_middleware,
    utils::{ApiResponse, success_to_api_response},
};

pub async fn health() -> Json<ApiResponse<&'static str>> {
    success_to_api_response("ok")
}

/// 组装全部路由，限流和日志层由 main 负责
pub fn api_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health));

    let protected_routes = Router::new()
        // 集成配置
        .route("/spond/status", get(spond::status))
        .route(
            "/spond/configure",
            post(spond::configure).delete(spond::remove_configuration),
        )
        .route("/spond/test-connection", post(spond::test_connection))
        .route("/spond/groups", get(spond::list_groups))
        // 球队与群组关联
        .route("/spond/teams/link", post(spond::link_team))
        .route("/spond/teams/unlink", post(spond::unlink_team))
        // 同步
        .route("/spond/events", get(spond::list_events))
        .route("/spond/sync", post(spond::trigger_sync))
        .route("/spond/events/{id}/export", post(spond::export_one))
        .route("/spond/events/{id}/update", post(spond::update_one))
        .route("/spond/events/{id}/unlink", post(spond::unlink_one))
        .route("/spond/events/{id}/attendance", post(spond::attendance_one))
        .route("/spond/export/validate", post(spond::validate_export))
        .route("/spond/attendance/batch", post(spond::attendance_batch))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest(
            &state.config.api_base_uri,
            Router::new().merge(public_routes).merge(protected_routes),
        )
        .with_state(state)
}
