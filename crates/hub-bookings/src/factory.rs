use hub_finance::{ClaimLine, FeeBasis};
use rust_decimal::Decimal;

use crate::BookingError;

/// Turns a booking into the claim lines owed for it.
pub trait ClaimFactory {
    fn claim_lines(&self) -> Result<Vec<ClaimLine>, BookingError>;

    /// Opt-in hook for payment-fee claims. Bookings that return `None` are never charged a fee.
    fn fee_basis(&self, _lines: &[ClaimLine]) -> Option<FeeBasis> {
        None
    }
}

/// Net total of the lines, bounded by their earliest start and latest end.
pub fn fee_basis_over<'a>(lines: impl IntoIterator<Item = &'a ClaimLine>) -> Option<FeeBasis> {
    let mut lines = lines.into_iter();
    let first = lines.next()?;
    let mut basis = FeeBasis {
        net_total: first.quantity * first.price,
        currency: first.currency.clone(),
        period_start: first.period_start,
        period_end: first.period_end,
    };
    for line in lines {
        basis.net_total += line.quantity * line.price;
        basis.period_start = basis.period_start.min(line.period_start);
        basis.period_end = basis.period_end.max(line.period_end);
    }
    basis.net_total = basis.net_total.round_dp(hub_core::money::MONEY_SCALE);
    if basis.net_total <= Decimal::ZERO {
        return None;
    }
    Some(basis)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn line(offset_days: i64, quantity: i64, price: i64) -> ClaimLine {
        let start = Utc::now() + Duration::days(offset_days);
        ClaimLine {
            item: "Drill".to_string(),
            quantity: Decimal::new(quantity, 0),
            unit: "d".to_string(),
            price: Decimal::new(price, 0),
            currency: "EUR".to_string(),
            period_start: start,
            period_end: start + Duration::days(quantity),
        }
    }

    #[test]
    fn basis_spans_all_lines() {
        let lines = vec![line(3, 1, 10), line(0, 2, 20), line(5, 4, 5)];
        let basis = fee_basis_over(&lines).unwrap();
        assert_eq!(basis.net_total, Decimal::new(70, 0));
        assert_eq!(basis.period_start, lines[1].period_start);
        assert_eq!(basis.period_end, lines[2].period_end);
    }

    #[test]
    fn no_basis_without_lines_or_value() {
        assert!(fee_basis_over(&[]).is_none());
        assert!(fee_basis_over(&[line(0, 1, 0)]).is_none());
    }
}
