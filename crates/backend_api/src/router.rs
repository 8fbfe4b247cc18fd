use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{self, AppState};

/// Create the main application router with all API endpoints
pub fn create_router(state: AppState) -> Router {
    // Create CORS layer
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Assets
        .route(
            "/api/assets",
            get(handlers::list_assets).post(handlers::create_asset),
        )
        .route("/api/assets/lookup", post(handlers::lookup_asset))
        .route(
            "/api/assets/:id",
            get(handlers::get_asset)
                .put(handlers::update_asset)
                .delete(handlers::delete_asset),
        )
        .route(
            "/api/assets/:id/import_dividends",
            post(handlers::import_asset_dividends),
        )
        // Dividend records
        .route(
            "/api/dividends",
            get(handlers::list_dividends).post(handlers::create_dividend),
        )
        .route(
            "/api/dividends/:id",
            get(handlers::get_dividend)
                .put(handlers::update_dividend)
                .delete(handlers::delete_dividend),
        )
        // Income goals
        .route(
            "/api/goals",
            get(handlers::list_goals).post(handlers::create_goal),
        )
        .route(
            "/api/goals/:id",
            get(handlers::get_goal)
                .put(handlers::update_goal)
                .delete(handlers::delete_goal),
        )
        .route("/api/goals/:id/simulate", post(handlers::simulate_goal))
        // Simulations
        .route("/api/simulations", get(handlers::list_simulations))
        .route(
            "/api/simulations/:id",
            get(handlers::get_simulation).delete(handlers::delete_simulation),
        )
        // Add shared state
        .with_state(state)
        // Add middleware
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{JsonFileRepository, PlannerRepository};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use brapi_client::{BrapiClient, BrapiConfig};
    use models::GoalInput;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn test_state(dir: &tempfile::TempDir) -> AppState {
        let repo = JsonFileRepository::open(dir.path().join("planner.json"))
            .await
            .unwrap();
        let market = BrapiClient::new(BrapiConfig {
            base_url: "http://localhost:1/api/".to_string(),
            token: None,
        })
        .unwrap();
        AppState {
            repo: Arc::new(repo),
            market: Arc::new(market),
            settings: Arc::new(models::Settings::default()),
        }
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_simulate_with_explicit_yield() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let goal = state
            .repo
            .create_goal(GoalInput {
                name: "FIRE".to_string(),
                desired_monthly_income: dec!(5000),
                years_to_target: 10,
                annual_inflation_rate: dec!(4.5),
                reinvestment_percentage: Decimal::ZERO,
            })
            .await
            .unwrap();
        let app = create_router(state);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/goals/{}/simulate", goal.id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"average_yield": "6.0"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_simulate_with_zero_yield_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(&dir).await;
        let goal = state
            .repo
            .create_goal(GoalInput {
                name: "Zero yield".to_string(),
                desired_monthly_income: dec!(1000),
                years_to_target: 5,
                annual_inflation_rate: Decimal::ZERO,
                reinvestment_percentage: Decimal::ZERO,
            })
            .await
            .unwrap();
        let app = create_router(state);

        let request = Request::builder()
            .method("POST")
            .uri(format!("/api/goals/{}/simulate", goal.id))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"average_yield": "0"}"#))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_goal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_router(test_state(&dir).await);

        let request = Request::builder()
            .method("POST")
            .uri("/api/goals/99/simulate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
