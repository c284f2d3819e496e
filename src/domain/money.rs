use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

/// Number of fractional digits every stored amount carries.
pub const SCALE: u32 = 4;

/// Money is persisted as integer minor units (1/10_000 of a currency unit) so that
/// sums computed by the database are exact. For NGN, "100.0000" = 1_000_000 units.
pub type MinorUnits = i64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("'{0}' is not a decimal amount")]
    Malformed(String),

    #[error("amount must be positive, got {0}")]
    NotPositive(String),

    #[error("amount '{0}' has more than 4 fractional digits")]
    TooPrecise(String),

    #[error("amount '{0}' is out of range")]
    OutOfRange(String),
}

/// Parse and validate a positive monetary amount.
///
/// The result always carries exactly [`SCALE`] fractional digits.
/// Example: "100" -> 100.0000, "12.5" -> 12.5000
pub fn parse_amount(input: &str) -> Result<Decimal, AmountError> {
    let malformed = || AmountError::Malformed(input.to_string());

    let digits = input.strip_prefix(['+', '-']).unwrap_or(input);
    if !digits.chars().any(|c| c.is_ascii_digit())
        || !digits.chars().all(|c| c.is_ascii_digit() || c == '.')
    {
        return Err(malformed());
    }

    let value = Decimal::from_str(input).map_err(|_| malformed())?;
    if value <= Decimal::ZERO {
        return Err(AmountError::NotPositive(input.to_string()));
    }
    if value.normalize().scale() > SCALE {
        return Err(AmountError::TooPrecise(input.to_string()));
    }

    let units = to_minor_units(value)?;
    Ok(from_minor_units(units))
}

/// Convert a decimal into minor units. Fails if the value does not fit or
/// carries more precision than a stored amount can hold.
pub fn to_minor_units(amount: Decimal) -> Result<MinorUnits, AmountError> {
    if amount.normalize().scale() > SCALE {
        return Err(AmountError::TooPrecise(amount.to_string()));
    }
    if amount.abs() > from_minor_units(MinorUnits::MAX) {
        return Err(AmountError::OutOfRange(amount.to_string()));
    }

    let mut scaled = amount;
    scaled.rescale(SCALE);
    MinorUnits::try_from(scaled.mantissa())
        .map_err(|_| AmountError::OutOfRange(amount.to_string()))
}

pub fn from_minor_units(units: MinorUnits) -> Decimal {
    Decimal::new(units, SCALE)
}

/// Format an amount with exactly four fractional digits.
/// Example: 100 -> "100.0000", -1.5 -> "-1.5000"
pub fn format_amount(amount: Decimal) -> String {
    let mut fixed = amount.round_dp(SCALE);
    fixed.rescale(SCALE);
    fixed.to_string()
}
