pub mod auth;
pub mod cart;
pub mod categories;
pub mod employees;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod profile;

use rust_decimal::Decimal;
use validator::ValidationError;

/// Money columns are `NUMERIC(12, 2)`: at most 10 integer digits and 2 decimals.
pub(crate) fn max_amount() -> Decimal {
    Decimal::from(10_000_000_000i64)
}

pub(crate) fn positive_decimal(value: &Decimal) -> Result<(), ValidationError> {
    let code_and_message = if !value.is_sign_positive() || value.is_zero() {
        Some(("positive", "must be greater than 0"))
    } else if value.normalize().scale() > 2 {
        Some(("scale", "must have at most 2 decimal places"))
    } else if *value >= max_amount() {
        Some(("too_large", "must be less than 10000000000"))
    } else {
        None
    };

    match code_and_message {
        None => Ok(()),
        Some((code, message)) => {
            let mut err = ValidationError::new(code);
            err.message = Some(message.into());
            Err(err)
        }
    }
}

pub(crate) fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        Err(err)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    fn code(value: &str) -> Option<String> {
        positive_decimal(&Decimal::from_str(value).unwrap())
            .err()
            .map(|err| err.code.to_string())
    }

    #[test]
    fn accepts_prices_that_fit_the_money_columns() {
        assert_eq!(code("0.01"), None);
        assert_eq!(code("10.5"), None);
        assert_eq!(code("10.500"), None);
        assert_eq!(code("9999999999.99"), None);
    }

    #[test]
    fn rejects_zero_and_negative_prices() {
        assert_eq!(code("0").as_deref(), Some("positive"));
        assert_eq!(code("-1.00").as_deref(), Some("positive"));
    }

    #[test]
    fn rejects_sub_cent_prices_instead_of_rounding() {
        assert_eq!(code("0.001").as_deref(), Some("scale"));
        assert_eq!(code("10.005").as_deref(), Some("scale"));
    }

    #[test]
    fn rejects_prices_beyond_ten_integer_digits() {
        assert_eq!(code("10000000000").as_deref(), Some("too_large"));
        assert_eq!(code("10000000000000").as_deref(), Some("too_large"));
    }
}
