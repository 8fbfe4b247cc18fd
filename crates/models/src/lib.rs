use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Application settings (settings.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub settings_version: u32,
    /// Overrides the built-in 6% working yield when set.
    #[serde(default)]
    pub default_average_yield: Option<Decimal>,
    /// Trailing window used when summing local dividend records.
    #[serde(default = "default_dividend_window_days")]
    pub dividend_window_days: i64,
}

fn default_dividend_window_days() -> i64 {
    365
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            settings_version: 1,
            default_average_yield: None,
            dividend_window_days: 365,
        }
    }
}

// Domain entities

/// A tracked equity position (ticker + metadata).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: u64,
    pub ticker: String,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    pub country: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividendSource {
    Manual,
    Api,
}

/// One historical dividend payment of an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DividendRecord {
    pub id: u64,
    pub asset_id: u64,
    pub payment_date: NaiveDate,
    pub amount_per_share: Decimal,
    pub source: DividendSource,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A desired monthly passive-income target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomeGoal {
    pub id: u64,
    pub name: String,
    pub desired_monthly_income: Decimal,
    pub years_to_target: u32,
    pub annual_inflation_rate: Decimal,
    pub reinvestment_percentage: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted projection run for a goal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub id: u64,
    pub goal_id: u64,
    pub target_capital: Decimal,
    pub adjusted_monthly_income: Decimal,
    pub required_monthly_contribution: Decimal,
    #[serde(default)]
    pub yield_used: Option<Decimal>,
    pub executed_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

// Request payloads

#[derive(Debug, Clone, Deserialize)]
pub struct AssetInput {
    pub ticker: String,
    pub company_name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_country() -> String {
    "Brasil".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DividendInput {
    pub asset_id: u64,
    pub payment_date: NaiveDate,
    pub amount_per_share: Decimal,
    #[serde(default = "default_source")]
    pub source: DividendSource,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_source() -> DividendSource {
    DividendSource::Manual
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoalInput {
    pub name: String,
    pub desired_monthly_income: Decimal,
    pub years_to_target: u32,
    #[serde(default = "default_inflation")]
    pub annual_inflation_rate: Decimal,
    #[serde(default)]
    pub reinvestment_percentage: Decimal,
}

fn default_inflation() -> Decimal {
    dec!(4.5)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("ticker must not be empty")]
    EmptyTicker,

    #[error("name must not be empty")]
    EmptyName,

    #[error("desired monthly income must be positive, got {0}")]
    NonPositiveIncome(Decimal),

    #[error("years to target must be at least 1")]
    ZeroYears,

    #[error("{field} must be between 0 and 100, got {value}")]
    PercentageOutOfRange { field: &'static str, value: Decimal },

    #[error("dividend amount per share must not be negative, got {0}")]
    NegativeAmount(Decimal),
}

fn check_percentage(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value < Decimal::ZERO || value > dec!(100) {
        return Err(ValidationError::PercentageOutOfRange { field, value });
    }
    Ok(())
}

impl AssetInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.ticker.trim().is_empty() {
            return Err(ValidationError::EmptyTicker);
        }
        if self.company_name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        Ok(())
    }

    /// Tickers are stored uppercase without surrounding whitespace.
    pub fn normalized_ticker(&self) -> String {
        self.ticker.trim().to_uppercase()
    }
}

impl DividendInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_per_share < Decimal::ZERO {
            return Err(ValidationError::NegativeAmount(self.amount_per_share));
        }
        Ok(())
    }
}

impl GoalInput {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if self.desired_monthly_income <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveIncome(
                self.desired_monthly_income,
            ));
        }
        if self.years_to_target < 1 {
            return Err(ValidationError::ZeroYears);
        }
        check_percentage("annual_inflation_rate", self.annual_inflation_rate)?;
        check_percentage("reinvestment_percentage", self.reinvestment_percentage)?;
        Ok(())
    }
}

// Persisted store document

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerStore {
    pub store_version: u32,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub dividends: Vec<DividendRecord>,
    #[serde(default)]
    pub goals: Vec<IncomeGoal>,
    #[serde(default)]
    pub simulations: Vec<Simulation>,
    pub next_asset_id: u64,
    pub next_dividend_id: u64,
    pub next_goal_id: u64,
    pub next_simulation_id: u64,
}

impl Default for PlannerStore {
    fn default() -> Self {
        Self {
            store_version: 1,
            assets: Vec::new(),
            dividends: Vec::new(),
            goals: Vec::new(),
            simulations: Vec::new(),
            next_asset_id: 1,
            next_dividend_id: 1,
            next_goal_id: 1,
            next_simulation_id: 1,
        }
    }
}

impl PlannerStore {
    /// Sum of an asset's recorded payouts on or after `since`.
    pub fn dividend_total_since(&self, asset_id: u64, since: NaiveDate) -> Decimal {
        self.dividends
            .iter()
            .filter(|d| d.asset_id == asset_id && d.payment_date >= since)
            .map(|d| d.amount_per_share)
            .sum()
    }

    /// Whether another asset already uses `ticker` (case-insensitive).
    pub fn ticker_exists(&self, ticker: &str, exclude_id: Option<u64>) -> bool {
        self.assets
            .iter()
            .any(|a| a.ticker.eq_ignore_ascii_case(ticker) && Some(a.id) != exclude_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn goal_input() -> GoalInput {
        GoalInput {
            name: "Financial independence".to_string(),
            desired_monthly_income: dec!(5000),
            years_to_target: 10,
            annual_inflation_rate: dec!(4.5),
            reinvestment_percentage: Decimal::ZERO,
        }
    }

    #[test]
    fn test_goal_input_valid() {
        assert_eq!(goal_input().validate(), Ok(()));
    }

    #[test]
    fn test_goal_input_rejects_non_positive_income() {
        let mut input = goal_input();
        input.desired_monthly_income = Decimal::ZERO;
        assert_eq!(
            input.validate(),
            Err(ValidationError::NonPositiveIncome(Decimal::ZERO))
        );
    }

    #[test]
    fn test_goal_input_rejects_zero_years() {
        let mut input = goal_input();
        input.years_to_target = 0;
        assert_eq!(input.validate(), Err(ValidationError::ZeroYears));
    }

    #[test]
    fn test_goal_input_rejects_out_of_range_percentages() {
        let mut input = goal_input();
        input.annual_inflation_rate = dec!(100.01);
        assert!(matches!(
            input.validate(),
            Err(ValidationError::PercentageOutOfRange {
                field: "annual_inflation_rate",
                ..
            })
        ));

        let mut input = goal_input();
        input.reinvestment_percentage = dec!(-1);
        assert!(matches!(
            input.validate(),
            Err(ValidationError::PercentageOutOfRange {
                field: "reinvestment_percentage",
                ..
            })
        ));
    }

    #[test]
    fn test_asset_input_normalizes_ticker() {
        let input = AssetInput {
            ticker: " petr4 ".to_string(),
            company_name: "Petrobras".to_string(),
            sector: None,
            country: default_country(),
            notes: None,
        };
        assert_eq!(input.normalized_ticker(), "PETR4");
    }

    #[test]
    fn test_dividend_total_since_filters_by_asset_and_date() {
        let mut store = PlannerStore::default();
        let date = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        let record = |id: u64, asset_id: u64, day: &str, amount: Decimal| DividendRecord {
            id,
            asset_id,
            payment_date: date(day),
            amount_per_share: amount,
            source: DividendSource::Manual,
            notes: None,
            created_at: Utc::now(),
        };
        store.dividends.push(record(1, 1, "2025-06-01", dec!(0.50)));
        store.dividends.push(record(2, 1, "2024-01-01", dec!(0.75)));
        store.dividends.push(record(3, 2, "2025-06-01", dec!(1.25)));

        let total = store.dividend_total_since(1, date("2025-01-01"));
        assert_eq!(total, dec!(0.50));
    }

    #[test]
    fn test_ticker_exists_ignores_excluded_id() {
        let mut store = PlannerStore::default();
        store.assets.push(Asset {
            id: 1,
            ticker: "VALE3".to_string(),
            company_name: "Vale".to_string(),
            sector: None,
            country: "Brasil".to_string(),
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        });

        assert!(store.ticker_exists("vale3", None));
        assert!(!store.ticker_exists("VALE3", Some(1)));
        assert!(!store.ticker_exists("PETR4", None));
    }
}
