//! Annuity arithmetic for level-payment mortgages.
//!
//! Amounts and rates are `f64` here. The ledger keeps rates as fixed-point [`Decimal`]s and they
//! are converted only when they enter these functions.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, ensure};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Average number of weeks in a year, leap years included.
pub const WEEKS_PER_YEAR: f64 = 52.177457;

/// Loans above this amount are not eligible for mortgage insurance.
pub const INSURANCE_LOAN_CAP: f64 = 1_000_000.0;

/// How often a payment is made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentSchedule {
    Weekly,
    Biweekly,
    Monthly,
}

/// Returned when a schedule name is not one of `weekly`, `biweekly` or `monthly`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown payment schedule '{0}'")]
pub struct UnknownSchedule(pub String);

impl PaymentSchedule {
    pub const ALL: [PaymentSchedule; 3] = [
        PaymentSchedule::Weekly,
        PaymentSchedule::Biweekly,
        PaymentSchedule::Monthly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentSchedule::Weekly => "weekly",
            PaymentSchedule::Biweekly => "biweekly",
            PaymentSchedule::Monthly => "monthly",
        }
    }

    /// Number of payments made in one year.
    pub fn periods_per_year(self) -> f64 {
        match self {
            PaymentSchedule::Weekly => WEEKS_PER_YEAR,
            PaymentSchedule::Biweekly => WEEKS_PER_YEAR / 2.0,
            PaymentSchedule::Monthly => 12.0,
        }
    }

    /// Divisor turning an annual rate into a per-payment rate.
    ///
    /// Biweekly divides by twice the weekly factor even though [`Self::periods_per_year`] uses
    /// half of it. Existing payment figures depend on this pairing.
    fn rate_divisor(self) -> f64 {
        match self {
            PaymentSchedule::Weekly => WEEKS_PER_YEAR,
            PaymentSchedule::Biweekly => WEEKS_PER_YEAR * 2.0,
            PaymentSchedule::Monthly => 12.0,
        }
    }

    /// Total number of payments over `years`, rounded half to even.
    pub fn payment_count(self, years: f64) -> u32 {
        (years * self.periods_per_year()).round_ties_even() as u32
    }

    /// Interest rate applied at each payment.
    pub fn periodic_rate(self, annual_rate: f64) -> f64 {
        annual_rate / self.rate_divisor()
    }
}

impl fmt::Display for PaymentSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentSchedule {
    type Err = UnknownSchedule;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        PaymentSchedule::ALL
            .into_iter()
            .find(|schedule| schedule.as_str() == lowered)
            .ok_or_else(|| UnknownSchedule(s.to_string()))
    }
}

/// Mortgage insurance premium, as a fraction of the loan, for a given down payment.
///
/// | down payment / asking price | premium |
/// |-----------------------------|---------|
/// | below 10%                   | 3.15%   |
/// | 10% to below 15%            | 2.4%    |
/// | 15% to below 20%            | 1.8%    |
/// | 20% and above               | none    |
///
/// Loans above [`INSURANCE_LOAN_CAP`] carry no premium whatever the ratio.
pub fn insurance_rate(asking_price: f64, down_payment: f64) -> f64 {
    if asking_price - down_payment > INSURANCE_LOAN_CAP {
        return 0.0;
    }

    let down_ratio = down_payment / asking_price;
    if down_ratio < 0.10 {
        0.0315
    } else if down_ratio < 0.15 {
        0.024
    } else if down_ratio < 0.20 {
        0.018
    } else {
        0.0
    }
}

/// Converts a ledger rate to the floating-point form the formulas use.
///
/// # Errors
///
/// Returns an error if the decimal has no `f64` representation.
pub fn rate_as_f64(rate: Decimal) -> Result<f64, anyhow::Error> {
    rate.to_f64()
        .ok_or_else(|| anyhow!("Interest rate {} cannot be represented as a float.", rate))
}

fn finite(amount: f64) -> Result<f64, anyhow::Error> {
    ensure!(amount.is_finite(), "Calculated amount is too large to represent.");
    Ok(amount)
}

/// Level payment that fully repays `principal` over `payments` periods.
///
/// The formula is: PMT = L * [c(1 + c)^n] / [(1 + c)^n - 1]. A zero rate has no interest to
/// amortize, so the payment is simply `L / n`.
///
/// # Errors
///
/// Returns an error if `payments` is zero or the payment overflows.
pub fn annuity_payment(principal: f64, periodic_rate: f64, payments: u32) -> Result<f64, anyhow::Error> {
    if payments == 0 {
        return Err(anyhow!("Total payments cannot be zero."));
    }

    let n = f64::from(payments);
    if periodic_rate == 0.0 {
        return finite(principal / n);
    }

    let c = periodic_rate;
    let c_plus_1_pow_n = (1.0 + c).powf(n);
    finite(principal * (c * c_plus_1_pow_n) / (c_plus_1_pow_n - 1.0))
}

/// Principal that a level `payment` repays over `payments` periods; the inverse of
/// [`annuity_payment`].
///
/// # Errors
///
/// Returns an error if `payments` is zero or the principal overflows.
pub fn annuity_principal(payment: f64, periodic_rate: f64, payments: u32) -> Result<f64, anyhow::Error> {
    if payments == 0 {
        return Err(anyhow!("Total payments cannot be zero."));
    }

    let n = f64::from(payments);
    if periodic_rate == 0.0 {
        return finite(payment * n);
    }

    let c = periodic_rate;
    let c_plus_1_pow_n = (1.0 + c).powf(n);
    finite(payment * (c_plus_1_pow_n - 1.0) / (c * c_plus_1_pow_n))
}

/// Periodic payment for buying at `asking_price` with `down_payment` down.
///
/// The financed amount is grossed up by the mortgage insurance premium (see
/// [`insurance_rate`]) before the annuity formula is applied.
///
/// # Arguments
///
/// * `asking_price` - Purchase price of the property.
/// * `down_payment` - Amount paid up front.
/// * `schedule` - Payment frequency.
/// * `years` - Amortization period in years.
/// * `annual_rate` - Annual interest rate as a fraction (0.025 for 2.5%).
///
/// # Errors
///
/// Returns an error if the period yields no payments, the rate cannot be converted or the
/// result overflows.
pub fn compute_payment_amount(
    asking_price: f64,
    down_payment: f64,
    schedule: PaymentSchedule,
    years: f64,
    annual_rate: Decimal,
) -> Result<f64, anyhow::Error> {
    let insurance = insurance_rate(asking_price, down_payment);
    let principal = (asking_price - down_payment) * (1.0 + insurance);

    let periodic_rate = schedule.periodic_rate(rate_as_f64(annual_rate)?);
    let payments = schedule.payment_count(years);
    let payment = annuity_payment(principal, periodic_rate, payments)?;

    debug!(
        principal,
        insurance,
        payments,
        %schedule,
        %annual_rate,
        payment,
        "computed payment amount"
    );
    Ok(payment)
}

/// Largest mortgage, down payment included, that `payment_amount` per period can carry.
///
/// Mortgage insurance is not backed out of the result.
///
/// # Arguments
///
/// * `payment_amount` - Amount paid each period.
/// * `down_payment` - Amount paid up front, added to the financed principal.
/// * `schedule` - Payment frequency.
/// * `years` - Amortization period in years.
/// * `annual_rate` - Annual interest rate as a fraction (0.025 for 2.5%).
///
/// # Errors
///
/// Returns an error if the period yields no payments, the rate cannot be converted or the
/// result overflows.
pub fn compute_mortgage_amount(
    payment_amount: f64,
    down_payment: f64,
    schedule: PaymentSchedule,
    years: f64,
    annual_rate: Decimal,
) -> Result<f64, anyhow::Error> {
    let periodic_rate = schedule.periodic_rate(rate_as_f64(annual_rate)?);
    let payments = schedule.payment_count(years);
    let principal = annuity_principal(payment_amount, periodic_rate, payments)?;
    let mortgage = finite(principal + down_payment)?;

    debug!(
        payment_amount,
        payments,
        %schedule,
        %annual_rate,
        mortgage,
        "computed mortgage amount"
    );
    Ok(mortgage)
}
