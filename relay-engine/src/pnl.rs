//! Leveraged profit/loss.
//!
//! `size` is the leveraged notional recorded at open time, so the number of
//! units held is `size / entry_price`:
//!
//! ```text
//! LONG  profit = (exit  - entry) * (size / entry)
//! SHORT profit = (entry - exit ) * (size / entry)
//! ```

use relay_domain::{DomainError, Position, Price, Side};
use rust_decimal::Decimal;

use crate::error::EngineResult;

/// Profit realized by closing `position` at `exit_price`.
///
/// # Example
///
/// ```
/// # use relay_domain::{MessageId, Position, Price, Quantity, Side};
/// # use relay_engine::realized_pnl;
/// # use rust_decimal_macros::dec;
/// let long = Position::open(
///     Side::Long,
///     Price::new(dec!(100)).unwrap(),
///     Quantity::new(dec!(500)).unwrap(),
///     MessageId::new("a").unwrap(),
/// );
/// let profit = realized_pnl(&long, Price::new(dec!(110)).unwrap()).unwrap();
/// assert_eq!(profit, dec!(50));
/// ```
pub fn realized_pnl(position: &Position, exit_price: Price) -> EngineResult<Decimal> {
    let entry = position.entry_price.as_decimal();
    let exit = exit_price.as_decimal();

    let move_per_unit = match position.side {
        Side::Long => exit.checked_sub(entry),
        Side::Short => entry.checked_sub(exit),
    };

    let units = position.size.as_decimal().checked_div(entry);

    move_per_unit
        .zip(units)
        .and_then(|(delta, units)| delta.checked_mul(units))
        .ok_or_else(|| {
            DomainError::InvalidBalance(format!(
                "PnL of {} {} @ {} → {} overflows",
                position.side, position.size, entry, exit
            ))
            .into()
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use relay_domain::{MessageId, Quantity};
    use rust_decimal_macros::dec;

    fn position(side: Side, entry: Decimal, size: Decimal) -> Position {
        Position::open(
            side,
            Price::new(entry).unwrap(),
            Quantity::new(size).unwrap(),
            MessageId::new("open").unwrap(),
        )
    }

    fn price(value: Decimal) -> Price {
        Price::new(value).unwrap()
    }

    #[test]
    fn test_long_profit() {
        let long = position(Side::Long, dec!(100), dec!(500));
        assert_eq!(realized_pnl(&long, price(dec!(110))).unwrap(), dec!(50));
    }

    #[test]
    fn test_long_loss() {
        let long = position(Side::Long, dec!(100), dec!(500));
        assert_eq!(realized_pnl(&long, price(dec!(95))).unwrap(), dec!(-25));
    }

    #[test]
    fn test_short_profit_and_loss() {
        let short = position(Side::Short, dec!(110), dec!(500));

        // 10 * (500 / 110)
        let profit = realized_pnl(&short, price(dec!(100))).unwrap();
        assert_eq!(profit.round_dp(6), dec!(45.454545));

        let short = position(Side::Short, dec!(100), dec!(500));
        let loss = realized_pnl(&short, price(dec!(120))).unwrap();
        assert_eq!(loss, dec!(-100));
    }

    #[test]
    fn test_flat_exit_is_zero() {
        let long = position(Side::Long, dec!(95000), dec!(0.5));
        assert_eq!(realized_pnl(&long, price(dec!(95000))).unwrap(), Decimal::ZERO);
    }
}
