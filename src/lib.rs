//! `mortgage_calc` answers mortgage questions against a time-versioned interest rate.
//!
//! It provides:
//! - **Payment amount**: the periodic payment for a purchase, given asking price, down payment,
//!   payment schedule and amortization period. Mortgage insurance is added to the financed
//!   amount when the down payment is below 20%.
//! - **Mortgage amount**: the largest mortgage a periodic payment can carry.
//! - **Interest rate ledger**: an append-only history of annual rates, each effective from an
//!   instant, which every calculation reads.
//!
//! With the `server` feature (on by default) the crate also ships an HTTP server exposing these
//! operations.
//!
//! ## Usage
//!
//! ```rust
//! use mortgage_calc::{MortgageCalculator, PaymentAmountParams};
//!
//! let calculator = MortgageCalculator::default();
//! let params = PaymentAmountParams {
//!     asking_price: Some("500000".to_string()),
//!     down_payment: Some("80000".to_string()),
//!     payment_schedule: Some("weekly".to_string()),
//!     amortization_period: Some("15".to_string()),
//! };
//!
//! match calculator.payment_amount(&params) {
//!     Ok(result) => println!("Weekly payment: {:.2}", result.value),
//!     Err(e) => eprintln!("Error calculating payment: {}", e),
//! }
//! ```

pub mod amortization;
pub mod calculator;
pub mod rates;
pub mod validation;

#[cfg(feature = "server")]
pub mod config;
#[cfg(feature = "server")]
pub mod server;

pub use amortization::{
    PaymentSchedule, annuity_payment, annuity_principal, compute_mortgage_amount,
    compute_payment_amount, insurance_rate,
};
pub use calculator::{Calculation, CalculatorError, MortgageCalculator};
pub use rates::{LedgerError, RateBound, RateChange, RateLedger, RateRecord, format_rate};
pub use validation::{
    MortgageAmountParams, MortgageAmountQuery, PaymentAmountParams, PaymentAmountQuery, Policy,
    ValidationError, ValidationErrors, ValidationPolicy,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
