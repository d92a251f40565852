// src/common/money.rs

use rust_decimal::{Decimal, RoundingStrategy};

use crate::common::error::AppError;

/// Arredonda para centavos (meio para longe do zero, como no caixa).
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Quantidades de estoque guardam até 3 casas.
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(3, RoundingStrategy::MidpointAwayFromZero)
}

/// Aplica um percentual (0..=100) sobre um valor, sem arredondar.
pub fn percent_of(value: Decimal, percentage: Decimal) -> Result<Decimal, AppError> {
    value
        .checked_mul(percentage)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| overflow("percentual"))
}

/// Estouro de Decimal vindo de valores do cliente.
pub fn overflow(what: &str) -> AppError {
    AppError::InvalidQuantity(format!("{} fora do intervalo suportado", what))
}

pub fn ensure_percentage(field: &str, value: Decimal) -> Result<(), AppError> {
    if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
        return Err(AppError::InvalidQuantity(format!(
            "{} deve estar entre 0 e 100 (recebido {})",
            field, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_cents(Decimal::from_str("10.005").unwrap()), Decimal::from_str("10.01").unwrap());
        assert_eq!(round_cents(Decimal::from_str("10.004").unwrap()), Decimal::from_str("10.00").unwrap());
    }

    #[test]
    fn quantities_keep_three_places() {
        assert_eq!(round_quantity(Decimal::from_str("1.0005").unwrap()), Decimal::from_str("1.001").unwrap());
        assert_eq!(round_quantity(Decimal::from_str("0.0004").unwrap()), Decimal::ZERO);
    }

    #[test]
    fn percent_of_reports_overflow() {
        assert_eq!(percent_of(Decimal::from(200), Decimal::from(10)).unwrap(), Decimal::from(20));
        assert!(matches!(percent_of(Decimal::MAX, Decimal::from(50)), Err(AppError::InvalidQuantity(_))));
    }

    #[test]
    fn percentage_bounds() {
        assert!(ensure_percentage("desconto", Decimal::ZERO).is_ok());
        assert!(ensure_percentage("desconto", Decimal::ONE_HUNDRED).is_ok());
        assert!(ensure_percentage("desconto", Decimal::from(101)).is_err());
        assert!(ensure_percentage("desconto", Decimal::from(-1)).is_err());
    }
}
