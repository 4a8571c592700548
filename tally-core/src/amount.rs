use rust_decimal::Decimal;

use crate::error::{LedgerError, LedgerResult};

/// Fractional digits carried by every monetary amount.
pub const AMOUNT_SCALE: u32 = 2;

/// Validate a caller-supplied amount: strictly positive, at most two
/// fractional digits. Returns the amount unchanged so call sites can bind
/// the checked value.
pub fn validate_amount(amount: Decimal) -> LedgerResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount}"
        )));
    }
    if amount.round_dp(AMOUNT_SCALE) != amount {
        return Err(LedgerError::InvalidAmount(format!(
            "amount carries more than {AMOUNT_SCALE} decimal places: {amount}"
        )));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn accepts_two_decimal_places() {
        assert_eq!(validate_amount(dec!(10.25)).unwrap(), dec!(10.25));
        assert_eq!(validate_amount(dec!(0.01)).unwrap(), dec!(0.01));
        assert_eq!(validate_amount(dec!(1000)).unwrap(), dec!(1000));
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(matches!(
            validate_amount(Decimal::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            validate_amount(dec!(-5)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert!(matches!(
            validate_amount(dec!(1.005)),
            Err(LedgerError::InvalidAmount(_))
        ));
    }
}
