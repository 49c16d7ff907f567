//! Quantity parsing and presentation.
//!
//! Quantities are exact decimals. Accumulation always keeps full precision;
//! rounding happens only when a figure is rendered.

use core::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};

use stockledger_core::{DomainError, DomainResult};

/// Parse a textual quantity (e.g. `"12.5"`, `"1e3"`).
///
/// Non-finite spellings (`NaN`, `inf`, ...) and unparsable input are `BAD_QTY`.
pub fn parse_quantity(raw: &str) -> DomainResult<Decimal> {
    let trimmed = raw.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let unsigned = lowered.trim_start_matches(['+', '-']);
    if matches!(unsigned, "nan" | "inf" | "infinity") {
        return Err(DomainError::bad_quantity("quantity must be finite"));
    }

    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map(|d| d.normalize())
        .map_err(|_| DomainError::bad_quantity(format!("'{trimmed}' is not a number")))
}

/// Largest magnitude accepted for a single quantity (10^18).
///
/// Balances are sums of many quantities and must stay far below
/// `Decimal::MAX`, so every quantity that enters the ledger is bounded here.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(2_808_348_672, 232_830_643, 0, false, 0);

/// `BAD_QTY` when `quantity` is larger in magnitude than [`MAX_QUANTITY`].
pub fn ensure_within_bounds(quantity: Decimal) -> DomainResult<()> {
    if quantity.abs() > MAX_QUANTITY {
        return Err(DomainError::bad_quantity(format!(
            "quantity magnitude cannot exceed {MAX_QUANTITY}"
        )));
    }
    Ok(())
}

/// Round for display only (half away from zero).
pub fn round_for_display(quantity: Decimal, scale: u32) -> Decimal {
    quantity
        .round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_scientific_notation() {
        assert_eq!(parse_quantity(" 12.50 ").unwrap(), Decimal::new(125, 1));
        assert_eq!(parse_quantity("1e3").unwrap(), Decimal::from(1000));
    }

    #[test]
    fn non_finite_input_is_bad_qty() {
        for raw in ["NaN", "inf", "-Infinity", "+inf"] {
            assert_eq!(parse_quantity(raw).unwrap_err().code(), "BAD_QTY", "{raw}");
        }
    }

    #[test]
    fn garbage_is_bad_qty() {
        assert_eq!(parse_quantity("ten").unwrap_err().code(), "BAD_QTY");
    }

    #[test]
    fn magnitude_is_bounded_in_both_directions() {
        assert_eq!(MAX_QUANTITY, parse_quantity("1e18").unwrap());
        ensure_within_bounds(MAX_QUANTITY).unwrap();
        ensure_within_bounds(-MAX_QUANTITY).unwrap();

        let over = MAX_QUANTITY + Decimal::new(1, 3);
        assert_eq!(ensure_within_bounds(over).unwrap_err().code(), "BAD_QTY");
        let huge = parse_quantity("50000000000000000000000000000").unwrap();
        assert_eq!(ensure_within_bounds(-huge).unwrap_err().code(), "BAD_QTY");
    }

    #[test]
    fn many_small_movements_do_not_drift() {
        let tenth = parse_quantity("0.1").unwrap();
        let total: Decimal = std::iter::repeat(tenth).take(1000).sum();
        assert_eq!(total, Decimal::from(100));
    }

    #[test]
    fn display_rounding_is_presentation_only() {
        let q = parse_quantity("2.0005").unwrap();
        assert_eq!(round_for_display(q, 3), parse_quantity("2.001").unwrap());
        assert_eq!(q, parse_quantity("2.0005").unwrap());
    }
}
