use rust_decimal::Decimal;

/// Decimal places kept for stored monetary amounts.
pub const MONEY_SCALE: u32 = 5;

pub fn percent_of(value: Decimal, percent: Decimal) -> Decimal {
    value * percent / Decimal::ONE_HUNDRED
}

/// `net * (1 + rate/100)`
pub fn apply_tax(net: Decimal, rate: Decimal) -> Decimal {
    (net + percent_of(net, rate)).round_dp(MONEY_SCALE)
}

/// `net * (1 - discount/100)`
pub fn apply_discount(net: Decimal, discount: Decimal) -> Decimal {
    (net - percent_of(net, discount)).round_dp(MONEY_SCALE)
}

/// Round to the minor unit of a currency (cents for everything we settle).
pub fn round_to_cents(amount: Decimal) -> Decimal {
    amount.round_dp(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_and_discount() {
        let net = Decimal::new(100, 0);
        assert_eq!(apply_tax(net, Decimal::new(19, 0)), Decimal::new(119, 0));
        assert_eq!(apply_discount(net, Decimal::new(25, 0)), Decimal::new(75, 0));
        assert_eq!(apply_tax(net, Decimal::ZERO), net);
    }

    #[test]
    fn rounding_keeps_money_scale() {
        let net = Decimal::new(1, 0) / Decimal::new(3, 0);
        assert_eq!(apply_tax(net, Decimal::ZERO).scale(), MONEY_SCALE);
        assert_eq!(round_to_cents(Decimal::new(12345, 3)), Decimal::new(1234, 2));
    }
}
