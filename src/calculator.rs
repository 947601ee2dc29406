//! Request-level operations: validate the raw parameters, resolve the rate in effect, compute.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, warn};

use crate::amortization::{compute_mortgage_amount, compute_payment_amount};
use crate::rates::{LedgerError, RateChange, RateLedger, RateRecord};
use crate::validation::{
    MortgageAmountParams, MortgageAmountQuery, PaymentAmountParams, PaymentAmountQuery,
    ValidationErrors, validate_mortgage_amount, validate_payment_amount, validate_rate_update,
};

#[derive(Debug, Error)]
pub enum CalculatorError {
    /// The caller's input was rejected. Reported back as data.
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationErrors),

    /// The ledger could not supply a rate.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The validated inputs produced no representable result.
    #[error(transparent)]
    Calculation(#[from] anyhow::Error),
}

impl CalculatorError {
    /// Whether the error stems from the caller's input rather than from the service itself.
    pub fn is_client_error(&self) -> bool {
        matches!(self, CalculatorError::Invalid(_) | CalculatorError::Calculation(_))
    }
}

/// A computed value together with the validated inputs that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Calculation<Q> {
    pub query: Q,
    pub value: f64,
}

/// Mortgage calculator backed by a shared rate ledger.
#[derive(Debug, Default)]
pub struct MortgageCalculator {
    ledger: RateLedger,
}

impl MortgageCalculator {
    pub fn new(ledger: RateLedger) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &RateLedger {
        &self.ledger
    }

    /// Periodic payment for the requested purchase, at the rate in effect now.
    pub fn payment_amount(
        &self,
        params: &PaymentAmountParams,
    ) -> Result<Calculation<PaymentAmountQuery>, CalculatorError> {
        self.payment_amount_at(params, Utc::now())
    }

    pub fn payment_amount_at(
        &self,
        params: &PaymentAmountParams,
        at: DateTime<Utc>,
    ) -> Result<Calculation<PaymentAmountQuery>, CalculatorError> {
        let query = validate_payment_amount(params).inspect_err(|errors| {
            warn!(%errors, "payment amount request rejected");
        })?;
        let rate = self.rate_at(at)?;

        let value = compute_payment_amount(
            query.asking_price,
            query.down_payment,
            query.schedule,
            query.amortization_years,
            rate,
        )?;
        Ok(Calculation { query, value })
    }

    /// Largest mortgage the requested payment supports, at the rate in effect now.
    pub fn mortgage_amount(
        &self,
        params: &MortgageAmountParams,
    ) -> Result<Calculation<MortgageAmountQuery>, CalculatorError> {
        self.mortgage_amount_at(params, Utc::now())
    }

    pub fn mortgage_amount_at(
        &self,
        params: &MortgageAmountParams,
        at: DateTime<Utc>,
    ) -> Result<Calculation<MortgageAmountQuery>, CalculatorError> {
        let query = validate_mortgage_amount(params).inspect_err(|errors| {
            warn!(%errors, "mortgage amount request rejected");
        })?;
        let rate = self.rate_at(at)?;

        let value = compute_mortgage_amount(
            query.payment_amount,
            query.down_payment,
            query.schedule,
            query.amortization_years,
            rate,
        )?;
        Ok(Calculation { query, value })
    }

    /// Validates `raw` and records it as the rate from now on.
    pub fn update_rate(&self, raw: Option<&str>) -> Result<RateChange, CalculatorError> {
        let rate = validate_rate_update(raw).inspect_err(|errors| {
            warn!(%errors, "interest rate update rejected");
        })?;
        Ok(self.ledger.record_rate(rate)?)
    }

    pub fn current_rate(&self) -> Result<RateRecord, CalculatorError> {
        self.ledger.current_rate().map_err(|e| {
            error!(error = %e, "interest rate ledger has no current rate");
            e.into()
        })
    }

    fn rate_at(&self, at: DateTime<Utc>) -> Result<Decimal, CalculatorError> {
        self.ledger.effective_rate_at(at).map_err(|e| {
            error!(error = %e, "interest rate ledger has no rate");
            e.into()
        })
    }
}
