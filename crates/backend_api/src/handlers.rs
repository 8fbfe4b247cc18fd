use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use brapi_client::BrapiClient;
use models::{
    Asset, AssetInput, DividendInput, DividendRecord, DividendSource, GoalInput, Settings,
    ValidationError,
};
use projection::{average_yield, project, ProjectionInput, ProjectionResult, YieldSample};

use crate::{
    error::ApiError,
    repository::{DividendFilter, PlannerRepository},
    Result,
};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn PlannerRepository>,
    pub market: Arc<BrapiClient>,
    pub settings: Arc<Settings>,
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "dividend-planner-api"
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub search: Option<String>,
}

// Assets

/// GET /api/assets
/// Lists assets, optionally filtered by ticker, company name or sector
pub async fn list_assets(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse> {
    let assets = state.repo.list_assets(params.search.as_deref()).await?;
    Ok(Json(assets))
}

/// POST /api/assets
pub async fn create_asset(
    State(state): State<AppState>,
    Json(input): Json<AssetInput>,
) -> Result<impl IntoResponse> {
    let asset = state.repo.create_asset(input).await?;
    Ok((StatusCode::CREATED, Json(asset)))
}

/// Asset detail enriched with its dividend history
#[derive(Debug, Serialize)]
pub struct AssetDetail {
    #[serde(flatten)]
    pub asset: Asset,
    pub dividends: Vec<DividendRecord>,
    pub total_dividends_year: Decimal,
}

/// GET /api/assets/:id
pub async fn get_asset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let asset = state.repo.get_asset(id).await?;
    let dividends = state
        .repo
        .list_dividends(DividendFilter {
            asset_id: Some(id),
            ..Default::default()
        })
        .await?;
    let window_start = trailing_window_start(&state.settings);
    let total_dividends_year = state.repo.dividend_total_since(id, window_start).await?;

    Ok(Json(AssetDetail {
        asset,
        dividends,
        total_dividends_year,
    }))
}

/// PUT /api/assets/:id
pub async fn update_asset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<AssetInput>,
) -> Result<impl IntoResponse> {
    let asset = state.repo.update_asset(id, input).await?;
    Ok(Json(asset))
}

/// DELETE /api/assets/:id
pub async fn delete_asset(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    state.repo.delete_asset(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub ticker: String,
}

#[derive(Debug, Serialize)]
pub struct LookupDividend {
    pub payment_date: NaiveDate,
    pub amount_per_share: Decimal,
    pub source: DividendSource,
}

#[derive(Debug, Serialize)]
pub struct LookupResponse {
    pub ticker: String,
    pub company_name: String,
    pub sector: Option<String>,
    pub country: String,
    pub current_price: Option<Decimal>,
    pub annual_yield: Option<Decimal>,
    pub dividends: Vec<LookupDividend>,
    pub total_dividends_year: usize,
}

/// POST /api/assets/lookup
/// Fetches quote, dividend history and trailing yield for a ticker from
/// brapi.dev without persisting anything
pub async fn lookup_asset(
    State(state): State<AppState>,
    Json(request): Json<LookupRequest>,
) -> Result<impl IntoResponse> {
    let ticker = request.ticker.trim().to_uppercase();
    if ticker.is_empty() {
        return Err(ApiError::Validation(ValidationError::EmptyTicker));
    }

    let quote = state.market.get_quote(&ticker, "1y", true).await?;
    let current_price = quote.current_price();
    let payments = quote.cash_dividends();

    let total: Decimal = payments.iter().map(|p| p.amount_per_share).sum();
    let annual_yield = match current_price {
        Some(price) if total > Decimal::ZERO => Some(
            (total / price * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
        ),
        _ => None,
    };

    let dividends: Vec<LookupDividend> = payments
        .into_iter()
        .map(|payment| LookupDividend {
            payment_date: payment.payment_date,
            amount_per_share: payment.amount_per_share,
            source: DividendSource::Api,
        })
        .collect();
    let total_dividends_year = dividends.len();

    Ok(Json(LookupResponse {
        ticker,
        company_name: quote.company_name().unwrap_or_default(),
        sector: quote.sector.clone().filter(|s| !s.is_empty()),
        country: "Brasil".to_string(),
        current_price,
        annual_yield,
        dividends,
        total_dividends_year,
    }))
}

#[derive(Debug, Serialize)]
pub struct ImportResponse {
    pub ticker: String,
    pub imported: usize,
    pub duplicates: usize,
    pub total_found: usize,
}

/// POST /api/assets/:id/import_dividends
/// Pulls the trailing-year dividends from brapi.dev into the local history,
/// skipping payment dates already on record
pub async fn import_asset_dividends(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let asset = state.repo.get_asset(id).await?;
    let payments = state.market.get_dividends(&asset.ticker, "1y").await?;
    if payments.is_empty() {
        return Err(ApiError::NoDividendsFound(asset.ticker));
    }

    let note = format!(
        "Imported automatically from brapi.dev on {}",
        Utc::now().format("%d/%m/%Y %H:%M")
    );
    let outcome = state.repo.import_dividends(asset.id, &payments, &note).await?;
    tracing::info!(
        ticker = %asset.ticker,
        imported = outcome.imported,
        duplicates = outcome.duplicates,
        "dividend import finished"
    );

    Ok(Json(ImportResponse {
        ticker: asset.ticker,
        imported: outcome.imported,
        duplicates: outcome.duplicates,
        total_found: payments.len(),
    }))
}

// Dividend records

#[derive(Debug, Deserialize)]
pub struct DividendParams {
    pub asset: Option<u64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /api/dividends
pub async fn list_dividends(
    State(state): State<AppState>,
    Query(params): Query<DividendParams>,
) -> Result<impl IntoResponse> {
    let records = state
        .repo
        .list_dividends(DividendFilter {
            asset_id: params.asset,
            from: params.from,
            to: params.to,
        })
        .await?;
    Ok(Json(records))
}

/// POST /api/dividends
pub async fn create_dividend(
    State(state): State<AppState>,
    Json(input): Json<DividendInput>,
) -> Result<impl IntoResponse> {
    let record = state.repo.create_dividend(input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /api/dividends/:id
pub async fn get_dividend(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let record = state.repo.get_dividend(id).await?;
    Ok(Json(record))
}

/// PUT /api/dividends/:id
pub async fn update_dividend(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<DividendInput>,
) -> Result<impl IntoResponse> {
    let record = state.repo.update_dividend(id, input).await?;
    Ok(Json(record))
}

/// DELETE /api/dividends/:id
pub async fn delete_dividend(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    state.repo.delete_dividend(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Income goals

/// GET /api/goals
pub async fn list_goals(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse> {
    let goals = state.repo.list_goals(params.search.as_deref()).await?;
    Ok(Json(goals))
}

/// POST /api/goals
pub async fn create_goal(
    State(state): State<AppState>,
    Json(input): Json<GoalInput>,
) -> Result<impl IntoResponse> {
    let goal = state.repo.create_goal(input).await?;
    Ok((StatusCode::CREATED, Json(goal)))
}

/// GET /api/goals/:id
pub async fn get_goal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let goal = state.repo.get_goal(id).await?;
    Ok(Json(goal))
}

/// PUT /api/goals/:id
pub async fn update_goal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(input): Json<GoalInput>,
) -> Result<impl IntoResponse> {
    let goal = state.repo.update_goal(id, input).await?;
    Ok(Json(goal))
}

/// DELETE /api/goals/:id
pub async fn delete_goal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    state.repo.delete_goal(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Simulation

#[derive(Debug, Default, Deserialize)]
pub struct SimulateRequest {
    /// Blended yield percentage; computed from the portfolio when absent.
    #[serde(default)]
    pub average_yield: Option<Decimal>,
    /// Restrict the blend to these assets; empty means all of them.
    #[serde(default)]
    pub asset_ids: Vec<u64>,
    #[serde(default)]
    pub save: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SimulateResponse {
    #[serde(flatten)]
    pub result: ProjectionResult,
    pub simulation_id: Option<u64>,
}

/// POST /api/goals/:id/simulate
/// Runs the projection engine for a goal. Without an explicit yield the
/// handler blends one from the portfolio; `save: true` persists the run.
pub async fn simulate_goal(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<SimulateRequest>,
) -> Result<impl IntoResponse> {
    let goal = state.repo.get_goal(id).await?;

    let average_yield = match request.average_yield {
        Some(value) => Some(value),
        None => blended_portfolio_yield(&state, &request.asset_ids).await?,
    };
    // A configured default still leaves the engine's own 6% as last resort
    let average_yield = average_yield.or(state.settings.default_average_yield);

    let input = ProjectionInput {
        desired_monthly_income: goal.desired_monthly_income,
        years_to_target: goal.years_to_target,
        annual_inflation_rate: goal.annual_inflation_rate,
        reinvestment_percentage: goal.reinvestment_percentage,
        average_yield,
    };
    let result = project(&input)?;

    let simulation_id = if request.save {
        let simulation = state
            .repo
            .record_simulation(goal.id, &result, request.notes.clone())
            .await?;
        Some(simulation.id)
    } else {
        None
    };

    Ok(Json(SimulateResponse {
        result,
        simulation_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SimulationParams {
    pub goal: Option<u64>,
}

/// GET /api/simulations
pub async fn list_simulations(
    State(state): State<AppState>,
    Query(params): Query<SimulationParams>,
) -> Result<impl IntoResponse> {
    let sims = state.repo.list_simulations(params.goal).await?;
    Ok(Json(sims))
}

/// GET /api/simulations/:id
pub async fn get_simulation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    let sim = state.repo.get_simulation(id).await?;
    Ok(Json(sim))
}

/// DELETE /api/simulations/:id
pub async fn delete_simulation(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse> {
    state.repo.delete_simulation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn trailing_window_start(settings: &Settings) -> NaiveDate {
    Utc::now().date_naive() - Duration::days(settings.dividend_window_days)
}

/// Builds one `YieldSample` per selected asset and blends them.
///
/// Trailing-year dividends come from brapi.dev, falling back to the local
/// records when the API has none or fails; the price is the current Brapi
/// quote. Assets without a usable price drop out of the blend inside
/// `average_yield`.
async fn blended_portfolio_yield(
    state: &AppState,
    asset_ids: &[u64],
) -> Result<Option<Decimal>> {
    let assets = state.repo.list_assets(None).await?;
    let assets: Vec<Asset> = if asset_ids.is_empty() {
        assets
    } else {
        assets
            .into_iter()
            .filter(|asset| asset_ids.contains(&asset.id))
            .collect()
    };

    let window_start = trailing_window_start(&state.settings);
    let mut samples = Vec::with_capacity(assets.len());
    for asset in &assets {
        let annual_dividends = match state.market.get_dividends(&asset.ticker, "1y").await {
            Ok(payments) if !payments.is_empty() => {
                payments.iter().map(|p| p.amount_per_share).sum()
            }
            Ok(_) => {
                state
                    .repo
                    .dividend_total_since(asset.id, window_start)
                    .await?
            }
            Err(err) => {
                tracing::warn!(
                    ticker = %asset.ticker,
                    %err,
                    "brapi dividends unavailable, using local records"
                );
                state
                    .repo
                    .dividend_total_since(asset.id, window_start)
                    .await?
            }
        };

        let average_price = match state.market.get_current_price(&asset.ticker).await {
            Ok(price) => price,
            Err(err) => {
                tracing::warn!(ticker = %asset.ticker, %err, "brapi price unavailable");
                None
            }
        };

        samples.push(YieldSample {
            annual_dividends,
            average_price,
        });
    }

    Ok(average_yield(&samples))
}
