//! Dividend-income projection core.
//!
//! Two pure functions: [`average_yield`] blends per-holding dividend/price
//! samples into a single yield percentage, and [`project`] converts an income
//! goal plus that yield into the capital and monthly contribution required to
//! reach it. All arithmetic is exact base-10 decimal; percentages are passed
//! in whole-percent form (`4.5` means 4.5%).

use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Working yield (percent) applied when the caller supplies none.
pub const DEFAULT_AVERAGE_YIELD: Decimal = dec!(6.0);

/// One holding considered for yield aggregation.
///
/// `annual_dividends` is the sum of the holding's payouts over the trailing
/// twelve months; a missing `average_price` excludes the sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldSample {
    pub annual_dividends: Decimal,
    #[serde(default)]
    pub average_price: Option<Decimal>,
}

/// Arithmetic mean of the per-sample yields, as a percentage rounded to
/// 2 decimal places.
///
/// Samples without a strictly positive price are skipped. Returns `None` when
/// no sample is usable — absence means "use the default yield", never zero.
pub fn average_yield(samples: &[YieldSample]) -> Option<Decimal> {
    let yields: Vec<Decimal> = samples
        .iter()
        .filter_map(|sample| {
            let price = sample.average_price?;
            if price <= Decimal::ZERO {
                return None;
            }
            Some(sample.annual_dividends / price * dec!(100))
        })
        .collect();

    if yields.is_empty() {
        return None;
    }

    let total: Decimal = yields.iter().copied().sum();
    Some(round_currency(total / Decimal::from(yields.len())))
}

/// Goal parameters for one projection run. Range validation (positive income,
/// years >= 1, percentages within 0–100) belongs to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionInput {
    pub desired_monthly_income: Decimal,
    pub years_to_target: u32,
    pub annual_inflation_rate: Decimal,
    pub reinvestment_percentage: Decimal,
    #[serde(default)]
    pub average_yield: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionResult {
    pub target_capital: Decimal,
    pub adjusted_monthly_income: Decimal,
    pub required_monthly_contribution: Decimal,
    /// The yield actually applied, echoed at its input precision.
    pub yield_used: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    /// Target capital is the adjusted annual income divided by the yield
    /// fraction; a non-positive working yield leaves it undefined.
    #[error("working yield must be positive to size target capital, got {0}%")]
    NonPositiveYield(Decimal),
}

/// Computes the inflation-adjusted income, the capital sustaining it at the
/// working yield, and the level monthly contribution reaching that capital
/// within the horizon.
pub fn project(input: &ProjectionInput) -> Result<ProjectionResult, ProjectionError> {
    let yield_used = input.average_yield.unwrap_or(DEFAULT_AVERAGE_YIELD);

    // Whole-percent form -> fractions (4.5 -> 0.045)
    let inflation = input.annual_inflation_rate / dec!(100);
    let yield_fraction = yield_used / dec!(100);
    let reinvestment = input.reinvestment_percentage / dec!(100);

    // Future value of the desired income under whole-year compounding
    let adjusted_monthly_income =
        input.desired_monthly_income * compound(inflation, input.years_to_target);
    let adjusted_annual_income = adjusted_monthly_income * dec!(12);

    // Perpetuity sizing: the portfolio must pay the adjusted annual income
    // out of its yield alone
    if yield_fraction <= Decimal::ZERO {
        return Err(ProjectionError::NonPositiveYield(yield_used));
    }
    let target_capital = adjusted_annual_income / yield_fraction;

    // Reinvested dividends accelerate monthly growth, approximated by
    // scaling the monthly rate up by the reinvestment fraction
    let months = input.years_to_target * 12;
    let monthly_rate = yield_fraction / dec!(12);
    let effective_rate = monthly_rate * (Decimal::ONE + reinvestment);
    let contribution = required_contribution(target_capital, effective_rate, months);

    Ok(ProjectionResult {
        target_capital: round_currency(target_capital),
        adjusted_monthly_income: round_currency(adjusted_monthly_income),
        required_monthly_contribution: round_currency(contribution),
        yield_used,
    })
}

/// Level payment that grows to `target` over `months` periods at `rate` per
/// period (future-value-of-annuity inversion). Without positive growth the
/// annuity formula divides by zero, so the payment degrades to straight
/// division.
pub fn required_contribution(target: Decimal, rate: Decimal, months: u32) -> Decimal {
    if rate > Decimal::ZERO {
        let growth_factor = compound(rate, months);
        target * rate / (growth_factor - Decimal::ONE)
    } else {
        target / Decimal::from(months)
    }
}

/// (1 + rate)^periods by iterated multiplication; exponents here are always
/// whole periods.
fn compound(rate: Decimal, periods: u32) -> Decimal {
    let factor = Decimal::ONE + rate;
    let mut result = Decimal::ONE;
    for _ in 0..periods {
        result *= factor;
    }
    result
}

/// Half-up rounding at the cent.
fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
