//! Turns raw request parameters into checked loan queries.
//!
//! Validation runs as a [`Pipeline`] of field checks. Each check is given a [`Policy`]: a
//! `FailFast` failure stops the pipeline, a `Collect` failure is recorded and the next check
//! still runs. The two calculator directions differ only in the [`ValidationPolicy`] they pass.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::amortization::PaymentSchedule;
use crate::rates::{RateBound, normalize_rate};

pub const MIN_AMORTIZATION_YEARS: f64 = 5.0;
pub const MAX_AMORTIZATION_YEARS: f64 = 25.0;

/// Portion of the asking price above which the larger down payment share applies.
const DOWN_PAYMENT_TIER: f64 = 500_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("{0} must be a number")]
    NotANumber(&'static str),

    #[error("{0} must be greater than zero")]
    NotPositive(&'static str),

    #[error("{field} must be between {min} and {max} years")]
    OutOfRange { field: &'static str, min: f64, max: f64 },

    #[error("paymentschedule must be one of 'weekly', 'biweekly', or 'monthly'")]
    InvalidSchedule(String),

    #[error("downpayment too low for askingprice. Must be at least ${minimum:.2}")]
    InsufficientDownPayment { minimum: f64 },

    #[error(transparent)]
    InvalidRate(#[from] RateBound),

    #[error("request body must be a JSON object")]
    MalformedBody,

    #[error("query string could not be parsed")]
    MalformedQuery,
}

/// Every error a validation run produced, in the order the checks ran. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Client-facing messages.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        Self(vec![error])
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.messages().join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

/// What a failed check does to the rest of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Record the error and skip every later check.
    FailFast,
    /// Record the error and keep going.
    Collect,
}

/// Per-stage policies for one calculator direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Presence checks for required parameters.
    pub missing: Policy,
    /// Numeric check of the leading amount (asking price or payment amount).
    pub leading_amount: Policy,
    /// Checks of the remaining fields.
    pub fields: Policy,
}

impl ValidationPolicy {
    pub const PAYMENT_AMOUNT: Self = Self {
        missing: Policy::FailFast,
        leading_amount: Policy::FailFast,
        fields: Policy::Collect,
    };

    pub const MORTGAGE_AMOUNT: Self = Self {
        missing: Policy::Collect,
        leading_amount: Policy::Collect,
        fields: Policy::Collect,
    };
}

/// Accumulates field check results.
#[derive(Debug, Default)]
pub struct Pipeline {
    errors: Vec<ValidationError>,
    halted: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `check` unless the pipeline has halted. Returns the checked value on success.
    pub fn check<T>(
        &mut self,
        policy: Policy,
        check: impl FnOnce() -> Result<T, ValidationError>,
    ) -> Option<T> {
        if self.halted {
            return None;
        }

        match check() {
            Ok(value) => Some(value),
            Err(error) => {
                self.errors.push(error);
                if policy == Policy::FailFast {
                    self.halted = true;
                }
                None
            }
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn into_errors(self) -> ValidationErrors {
        ValidationErrors(self.errors)
    }

    /// Yields `value` if no check failed.
    ///
    /// A passing check always yields its value and a skipped one implies an earlier failure, so
    /// `value` is `Some` whenever the error list is empty.
    pub fn finish<T>(self, value: Option<T>) -> Result<T, ValidationErrors> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => {
                debug_assert!(!self.errors.is_empty(), "incomplete query without errors");
                Err(self.into_errors())
            }
        }
    }
}

/// Raw parameters of a payment amount request.
///
/// Collected from query-string pairs; a repeated key keeps its last value and unknown keys are
/// ignored.
#[derive(Debug, Clone, Default)]
pub struct PaymentAmountParams {
    pub asking_price: Option<String>,
    pub down_payment: Option<String>,
    pub payment_schedule: Option<String>,
    pub amortization_period: Option<String>,
}

impl FromIterator<(String, String)> for PaymentAmountParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "askingprice" => &mut params.asking_price,
                "downpayment" => &mut params.down_payment,
                "paymentschedule" => &mut params.payment_schedule,
                "amortizationperiod" => &mut params.amortization_period,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

/// Raw parameters of a mortgage amount request. The down payment is optional and defaults to 0.
#[derive(Debug, Clone, Default)]
pub struct MortgageAmountParams {
    pub payment_amount: Option<String>,
    pub down_payment: Option<String>,
    pub payment_schedule: Option<String>,
    pub amortization_period: Option<String>,
}

impl FromIterator<(String, String)> for MortgageAmountParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(pairs: I) -> Self {
        let mut params = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "paymentamount" => &mut params.payment_amount,
                "downpayment" => &mut params.down_payment,
                "paymentschedule" => &mut params.payment_schedule,
                "amortizationperiod" => &mut params.amortization_period,
                _ => continue,
            };
            *slot = Some(value);
        }
        params
    }
}

/// Checked inputs for a payment amount calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentAmountQuery {
    #[serde(rename = "askingprice")]
    pub asking_price: f64,
    #[serde(rename = "downpayment")]
    pub down_payment: f64,
    #[serde(rename = "paymentschedule")]
    pub schedule: PaymentSchedule,
    #[serde(rename = "amortizationperiod")]
    pub amortization_years: f64,
}

/// Checked inputs for a mortgage amount calculation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MortgageAmountQuery {
    #[serde(rename = "paymentamount")]
    pub payment_amount: f64,
    #[serde(rename = "downpayment")]
    pub down_payment: f64,
    #[serde(rename = "paymentschedule")]
    pub schedule: PaymentSchedule,
    #[serde(rename = "amortizationperiod")]
    pub amortization_years: f64,
}

/// Smallest down payment accepted for `asking_price`: 5% of the price plus another 10% of
/// whatever exceeds $500k.
pub fn minimum_down_payment(asking_price: f64) -> f64 {
    asking_price * 0.05 + (asking_price - DOWN_PAYMENT_TIER).max(0.0) * 0.10
}

fn required<'a>(field: &'static str, raw: Option<&'a str>) -> Result<&'a str, ValidationError> {
    raw.ok_or(ValidationError::MissingParameter(field))
}

// An empty schedule counts as absent.
fn required_schedule(raw: Option<&str>) -> Result<&str, ValidationError> {
    raw.filter(|schedule| !schedule.is_empty())
        .ok_or(ValidationError::MissingParameter("paymentschedule"))
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or(ValidationError::NotANumber(field))
}

fn parse_schedule(raw: &str) -> Result<PaymentSchedule, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::InvalidSchedule(raw.to_string()))
}

fn parse_amortization_years(raw: &str) -> Result<f64, ValidationError> {
    let years = parse_number("amortizationperiod", raw)?;
    if (MIN_AMORTIZATION_YEARS..=MAX_AMORTIZATION_YEARS).contains(&years) {
        Ok(years)
    } else {
        Err(ValidationError::OutOfRange {
            field: "amortizationperiod",
            min: MIN_AMORTIZATION_YEARS,
            max: MAX_AMORTIZATION_YEARS,
        })
    }
}

/// Parses a plain or scientific-notation decimal.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

pub fn validate_payment_amount(params: &PaymentAmountParams) -> Result<PaymentAmountQuery, ValidationErrors> {
    validate_payment_amount_with(params, ValidationPolicy::PAYMENT_AMOUNT)
}

pub fn validate_payment_amount_with(
    params: &PaymentAmountParams,
    policy: ValidationPolicy,
) -> Result<PaymentAmountQuery, ValidationErrors> {
    let mut pipeline = Pipeline::new();

    let asking_raw = pipeline.check(policy.missing, || required("askingprice", params.asking_price.as_deref()));
    let down_raw = pipeline.check(policy.missing, || required("downpayment", params.down_payment.as_deref()));
    let schedule_raw = pipeline.check(policy.missing, || required_schedule(params.payment_schedule.as_deref()));
    let years_raw = pipeline.check(policy.missing, || {
        required("amortizationperiod", params.amortization_period.as_deref())
    });

    let (Some(asking_raw), Some(down_raw), Some(schedule_raw), Some(years_raw)) =
        (asking_raw, down_raw, schedule_raw, years_raw)
    else {
        return Err(pipeline.into_errors());
    };

    let asking_price = pipeline.check(policy.leading_amount, || {
        let asking_price = parse_number("askingprice", asking_raw)?;
        if asking_price > 0.0 {
            Ok(asking_price)
        } else {
            Err(ValidationError::NotPositive("askingprice"))
        }
    });

    let down_payment = pipeline.check(policy.fields, || {
        let down_payment = parse_number("downpayment", down_raw)?;
        match asking_price {
            Some(asking_price) if down_payment < minimum_down_payment(asking_price) => {
                Err(ValidationError::InsufficientDownPayment {
                    minimum: minimum_down_payment(asking_price),
                })
            }
            _ => Ok(down_payment),
        }
    });

    let schedule = pipeline.check(policy.fields, || parse_schedule(schedule_raw));
    let years = pipeline.check(policy.fields, || parse_amortization_years(years_raw));

    let query = match (asking_price, down_payment, schedule, years) {
        (Some(asking_price), Some(down_payment), Some(schedule), Some(amortization_years)) => {
            Some(PaymentAmountQuery {
                asking_price,
                down_payment,
                schedule,
                amortization_years,
            })
        }
        _ => None,
    };
    pipeline.finish(query)
}

pub fn validate_mortgage_amount(params: &MortgageAmountParams) -> Result<MortgageAmountQuery, ValidationErrors> {
    validate_mortgage_amount_with(params, ValidationPolicy::MORTGAGE_AMOUNT)
}

pub fn validate_mortgage_amount_with(
    params: &MortgageAmountParams,
    policy: ValidationPolicy,
) -> Result<MortgageAmountQuery, ValidationErrors> {
    let mut pipeline = Pipeline::new();

    let payment_raw = pipeline.check(policy.missing, || {
        required("paymentamount", params.payment_amount.as_deref())
    });
    let schedule_raw = pipeline.check(policy.missing, || required_schedule(params.payment_schedule.as_deref()));
    let years_raw = pipeline.check(policy.missing, || {
        required("amortizationperiod", params.amortization_period.as_deref())
    });

    let (Some(payment_raw), Some(schedule_raw), Some(years_raw)) = (payment_raw, schedule_raw, years_raw) else {
        return Err(pipeline.into_errors());
    };
    let down_raw = params.down_payment.as_deref().unwrap_or("0");

    let payment_amount = pipeline.check(policy.leading_amount, || parse_number("paymentamount", payment_raw));
    let down_payment = pipeline.check(policy.fields, || parse_number("downpayment", down_raw));
    let schedule = pipeline.check(policy.fields, || parse_schedule(schedule_raw));
    let years = pipeline.check(policy.fields, || parse_amortization_years(years_raw));

    let query = match (payment_amount, down_payment, schedule, years) {
        (Some(payment_amount), Some(down_payment), Some(schedule), Some(amortization_years)) => {
            Some(MortgageAmountQuery {
                payment_amount,
                down_payment,
                schedule,
                amortization_years,
            })
        }
        _ => None,
    };
    pipeline.finish(query)
}

/// Checks a raw rate for the ledger and returns it rounded to the stored precision.
pub fn validate_rate_update(raw: Option<&str>) -> Result<Decimal, ValidationErrors> {
    let mut pipeline = Pipeline::new();

    let rate = pipeline
        .check(Policy::FailFast, || required("interestrate", raw))
        .and_then(|raw| {
            pipeline.check(Policy::Collect, || {
                let rate = parse_decimal(raw).ok_or(ValidationError::NotANumber("interestrate"))?;
                Ok(normalize_rate(rate)?)
            })
        });

    pipeline.finish(rate)
}
