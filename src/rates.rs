//! Time-versioned interest rate.
//!
//! The ledger is append-only. Each record carries the instant it takes effect, and the rate at
//! any instant is the record with the latest `effective_from` not after it. Records sharing an
//! `effective_from` resolve to the one appended last.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use thiserror::Error;
use tracing::info;

/// Fractional digits kept for every stored rate.
pub const RATE_SCALE: u32 = 7;

/// Rates at or above this (1000%) are rejected.
pub const RATE_CEILING: Decimal = dec!(10);

/// Rate the ledger is seeded with when nothing else is configured.
pub const DEFAULT_RATE: Decimal = dec!(0.025);

/// Why a rate was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateBound {
    #[error("interestrate must be positive")]
    Negative,

    #[error("rate cannot exceed 1000%")]
    Ceiling,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("invalid interest rate {rate}: {bound}")]
    InvalidRate { rate: Decimal, bound: RateBound },

    #[error("no interest rate configured at {at}")]
    NoRateConfigured { at: DateTime<Utc> },
}

/// Rounds `rate` to [`RATE_SCALE`] digits and checks it against the accepted range.
///
/// Rounding happens first, so a value just under the ceiling that rounds up to it is refused.
pub fn normalize_rate(rate: Decimal) -> Result<Decimal, RateBound> {
    let rounded = rate.round_dp(RATE_SCALE);
    if rounded < Decimal::ZERO {
        Err(RateBound::Negative)
    } else if rounded >= RATE_CEILING {
        Err(RateBound::Ceiling)
    } else {
        Ok(rounded)
    }
}

/// Renders a rate with exactly [`RATE_SCALE`] fractional digits, e.g. `0.0250000`.
pub fn format_rate(rate: Decimal) -> String {
    let mut scaled = rate;
    scaled.rescale(RATE_SCALE);
    scaled.to_string()
}

/// An annual rate and the instant from which it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateRecord {
    pub rate: Decimal,
    pub effective_from: DateTime<Utc>,
}

/// Outcome of appending a rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateChange {
    /// Record that was in effect at the new record's instant, if any.
    pub previous: Option<RateRecord>,
    pub current: RateRecord,
}

#[derive(Debug, Default)]
struct RateIndex {
    // (effective_from, append sequence) -> rate
    records: BTreeMap<(DateTime<Utc>, u64), Decimal>,
    next_seq: u64,
    // latest instant handed out by `record_rate`
    last_stamp: Option<DateTime<Utc>>,
}

impl RateIndex {
    fn lookup(&self, at: DateTime<Utc>) -> Option<RateRecord> {
        self.records
            .range(..=(at, u64::MAX))
            .next_back()
            .map(|(&(effective_from, _), &rate)| RateRecord { rate, effective_from })
    }

    /// Current time, never earlier than the previous stamp.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = self.last_stamp.map_or(now, |last| last.max(now));
        self.last_stamp = Some(stamp);
        stamp
    }

    fn append(&mut self, rate: Decimal, effective_from: DateTime<Utc>) {
        self.records.insert((effective_from, self.next_seq), rate);
        self.next_seq += 1;
    }
}

/// Shared, append-only store of interest rates.
///
/// Appends are serialized behind a write lock; lookups take a read lock and always see a whole
/// append or none of it.
#[derive(Debug)]
pub struct RateLedger {
    index: RwLock<RateIndex>,
}

impl Default for RateLedger {
    /// Ledger seeded with [`DEFAULT_RATE`].
    fn default() -> Self {
        let mut index = RateIndex::default();
        index.append(DEFAULT_RATE, DateTime::<Utc>::UNIX_EPOCH);
        Self { index: RwLock::new(index) }
    }
}

impl RateLedger {
    /// Ledger with no records. Every lookup fails until a rate is recorded.
    pub fn empty() -> Self {
        Self { index: RwLock::new(RateIndex::default()) }
    }

    /// Ledger whose first record applies from the Unix epoch, so every current lookup resolves.
    pub fn seeded(rate: Decimal) -> Result<Self, LedgerError> {
        let ledger = Self::empty();
        ledger.record_rate_at(rate, DateTime::<Utc>::UNIX_EPOCH)?;
        Ok(ledger)
    }

    /// Appends `rate` effective from now.
    ///
    /// The instant is taken under the write lock and never precedes an earlier `record_rate`, so
    /// concurrent updates take effect in the order they were stored.
    pub fn record_rate(&self, rate: Decimal) -> Result<RateChange, LedgerError> {
        self.append_with(rate, RateIndex::stamp)
    }

    /// Appends `rate` effective from `effective_from`.
    pub fn record_rate_at(
        &self,
        rate: Decimal,
        effective_from: DateTime<Utc>,
    ) -> Result<RateChange, LedgerError> {
        self.append_with(rate, |_| effective_from)
    }

    // The rate is rounded to `RATE_SCALE` digits before it is checked and stored.
    fn append_with(
        &self,
        rate: Decimal,
        stamp: impl FnOnce(&mut RateIndex) -> DateTime<Utc>,
    ) -> Result<RateChange, LedgerError> {
        let rounded = normalize_rate(rate).map_err(|bound| LedgerError::InvalidRate { rate, bound })?;

        let mut index = self.index.write();
        let effective_from = stamp(&mut *index);
        let previous = index.lookup(effective_from);
        index.append(rounded, effective_from);
        drop(index);

        info!(
            old_rate = ?previous.as_ref().map(|record| record.rate),
            new_rate = %rounded,
            %effective_from,
            "interest rate recorded"
        );

        Ok(RateChange {
            previous,
            current: RateRecord { rate: rounded, effective_from },
        })
    }

    /// Record in effect at `at`.
    pub fn record_at(&self, at: DateTime<Utc>) -> Result<RateRecord, LedgerError> {
        self.index
            .read()
            .lookup(at)
            .ok_or(LedgerError::NoRateConfigured { at })
    }

    /// Annual rate in effect at `at`.
    pub fn effective_rate_at(&self, at: DateTime<Utc>) -> Result<Decimal, LedgerError> {
        self.record_at(at).map(|record| record.rate)
    }

    pub fn current_rate(&self) -> Result<RateRecord, LedgerError> {
        self.record_at(Utc::now())
    }

    /// All records, in resolution order.
    pub fn history(&self) -> Vec<RateRecord> {
        self.index
            .read()
            .records
            .iter()
            .map(|(&(effective_from, _), &rate)| RateRecord { rate, effective_from })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.index.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;
    use std::collections::HashSet;

    #[test]
    fn test_rate_at_time() {
        let ledger = RateLedger::default();
        let now = Utc::now();

        assert_eq!(ledger.effective_rate_at(now).unwrap(), dec!(0.025));

        ledger.record_rate_at(dec!(0.01), now - Duration::hours(2)).unwrap();
        ledger.record_rate_at(dec!(0.02), now - Duration::hours(1)).unwrap();
        ledger.record_rate_at(dec!(0.03), now).unwrap();
        ledger.record_rate_at(dec!(0.04), now + Duration::hours(1)).unwrap();
        ledger.record_rate_at(dec!(0.05), now + Duration::hours(2)).unwrap();

        assert_eq!(ledger.effective_rate_at(now).unwrap(), dec!(0.03));
        assert_eq!(ledger.effective_rate_at(now + Duration::seconds(1)).unwrap(), dec!(0.03));
        assert_eq!(ledger.effective_rate_at(now - Duration::seconds(1)).unwrap(), dec!(0.02));
        assert_eq!(ledger.effective_rate_at(now + Duration::hours(1)).unwrap(), dec!(0.04));
        assert_eq!(
            ledger.effective_rate_at(now - Duration::hours(1) - Duration::seconds(1)).unwrap(),
            dec!(0.01)
        );
    }

    #[test]
    fn test_same_instant_resolves_to_last_appended() {
        let ledger = RateLedger::default();
        let at = Utc::now();

        ledger.record_rate_at(dec!(0.031), at).unwrap();
        ledger.record_rate_at(dec!(0.029), at).unwrap();

        assert_eq!(ledger.effective_rate_at(at).unwrap(), dec!(0.029));
    }

    #[test]
    fn test_out_of_order_appends_do_not_affect_earlier_queries() {
        let ledger = RateLedger::default();
        let now = Utc::now();

        ledger.record_rate_at(dec!(0.05), now + Duration::days(3)).unwrap();
        ledger.record_rate_at(dec!(0.04), now + Duration::days(1)).unwrap();
        ledger.record_rate_at(dec!(0.06), now + Duration::days(2)).unwrap();

        assert_eq!(ledger.effective_rate_at(now).unwrap(), DEFAULT_RATE);
        assert_eq!(ledger.effective_rate_at(now + Duration::days(2)).unwrap(), dec!(0.06));
    }

    #[test]
    fn test_empty_ledger_has_no_rate() {
        let ledger = RateLedger::empty();
        let at = Utc::now();

        assert!(ledger.is_empty());
        assert_eq!(
            ledger.effective_rate_at(at),
            Err(LedgerError::NoRateConfigured { at })
        );
    }

    #[test]
    fn test_query_before_first_record_has_no_rate() {
        let ledger = RateLedger::empty();
        let now = Utc::now();
        ledger.record_rate_at(dec!(0.03), now).unwrap();

        assert!(ledger.effective_rate_at(now - Duration::seconds(1)).is_err());
        assert_eq!(ledger.effective_rate_at(now).unwrap(), dec!(0.03));
    }

    #[test]
    fn test_record_rate_reports_previous_rate() {
        let ledger = RateLedger::default();

        let change = ledger.record_rate(dec!(0.0375)).unwrap();

        assert_eq!(change.previous.map(|record| record.rate), Some(DEFAULT_RATE));
        assert_eq!(change.current.rate, dec!(0.0375));
        assert_eq!(
            ledger.effective_rate_at(change.current.effective_from + Duration::seconds(1)).unwrap(),
            dec!(0.0375)
        );
    }

    #[test]
    fn test_first_record_has_no_previous() {
        let change = RateLedger::empty().record_rate(dec!(0.02)).unwrap();
        assert!(change.previous.is_none());
    }

    #[rstest]
    #[case(dec!(0), Ok(dec!(0)))]
    #[case(dec!(0.123456789), Ok(dec!(0.1234568)))]
    #[case(dec!(0.00000005), Ok(dec!(0.0000000)))]
    #[case(dec!(9.9999999), Ok(dec!(9.9999999)))]
    #[case(dec!(-0.0000001), Err(RateBound::Negative))]
    #[case(dec!(10), Err(RateBound::Ceiling))]
    #[case(dec!(9.99999999), Err(RateBound::Ceiling))]
    fn test_normalize_rate(#[case] input: Decimal, #[case] expected: Result<Decimal, RateBound>) {
        assert_eq!(normalize_rate(input), expected);
    }

    #[test]
    fn test_rejected_rate_is_not_stored() {
        let ledger = RateLedger::default();

        let result = ledger.record_rate(dec!(-1));

        assert_eq!(
            result,
            Err(LedgerError::InvalidRate { rate: dec!(-1), bound: RateBound::Negative })
        );
        assert_eq!(ledger.len(), 1);
    }

    #[rstest]
    #[case(dec!(0.025), "0.0250000")]
    #[case(dec!(0.1234568), "0.1234568")]
    #[case(dec!(3), "3.0000000")]
    fn test_format_rate(#[case] rate: Decimal, #[case] expected: &str) {
        assert_eq!(format_rate(rate), expected);
    }

    #[test]
    fn test_seeded_rejects_invalid_seed() {
        assert!(RateLedger::seeded(dec!(12)).is_err());
        assert_eq!(
            RateLedger::seeded(dec!(0.04)).unwrap().effective_rate_at(Utc::now()).unwrap(),
            dec!(0.04)
        );
    }

    #[test]
    fn test_concurrent_updates_each_supersede_a_distinct_rate() {
        let ledger = RateLedger::default();

        let changes: Vec<RateChange> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8u32)
                .map(|worker| {
                    let ledger = &ledger;
                    scope.spawn(move || {
                        (0..200u32)
                            .map(|step| {
                                let rate = Decimal::from(worker * 1000 + step + 1) / dec!(1000000);
                                ledger.record_rate(rate).unwrap()
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            workers.into_iter().flat_map(|worker| worker.join().unwrap()).collect()
        });

        assert_eq!(ledger.len(), 1 + 8 * 200);

        let superseded: HashSet<Decimal> = changes
            .iter()
            .map(|change| change.previous.as_ref().unwrap().rate)
            .collect();
        assert_eq!(superseded.len(), changes.len());

        // exactly one update is never superseded, and it is the one in effect
        let standing: Vec<Decimal> = changes
            .iter()
            .map(|change| change.current.rate)
            .filter(|rate| !superseded.contains(rate))
            .collect();
        assert_eq!(standing.len(), 1);
        assert_eq!(ledger.current_rate().unwrap().rate, standing[0]);
    }

    #[test]
    fn test_record_rate_after_backdated_record_still_takes_effect() {
        let ledger = RateLedger::default();
        let first = ledger.record_rate(dec!(0.03)).unwrap();

        ledger.record_rate_at(dec!(0.07), first.current.effective_from - Duration::minutes(5)).unwrap();
        let second = ledger.record_rate(dec!(0.04)).unwrap();

        assert!(second.current.effective_from >= first.current.effective_from);
        assert_eq!(second.previous.map(|record| record.rate), Some(dec!(0.03)));
        assert_eq!(ledger.record_at(second.current.effective_from).unwrap().rate, dec!(0.04));
    }
}
