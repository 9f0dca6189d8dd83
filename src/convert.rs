use crate::error::BridgeError;

/// Exchange rate as an integer ratio, tagged with where and when it was
/// obtained. Callers can judge freshness instead of trusting a bare number;
/// there is deliberately no way to construct a "default" rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuote {
    pub numerator: u128,
    pub denominator: u128,
    pub source: String,
    /// UNIX seconds at fetch time.
    pub fetched_at: i64,
}

impl RateQuote {
    pub fn new(
        numerator: u128,
        denominator: u128,
        source: impl Into<String>,
        fetched_at: i64,
    ) -> Result<Self, BridgeError> {
        if numerator == 0 || denominator == 0 {
            return Err(BridgeError::conversion(format!(
                "degenerate rate {numerator}/{denominator}"
            )));
        }
        Ok(RateQuote {
            numerator,
            denominator,
            source: source.into(),
            fetched_at,
        })
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.fetched_at).max(0)
    }
}

#[derive(Debug, Clone)]
pub struct ConversionSpec {
    pub source_decimals: u32,
    pub destination_decimals: u32,
    /// Bridge fee deducted from the output, in basis points.
    pub fee_bps: u32,
    /// Cross-asset rate. `None` means a 1:1 nominal conversion (same asset,
    /// differing precision only). Rate-dependent conversions with no live
    /// quote must fail upstream rather than pass a fabricated rate here.
    pub rate: Option<RateQuote>,
}

/// Rescale `source_amount` (integer string in the source asset's smallest
/// unit) into the destination asset's smallest unit and render it as a
/// decimal string with exactly `destination_decimals` fractional digits.
///
/// All arithmetic is u128 integer math; division truncates, so the
/// destination amount is never rounded up.
pub fn convert_amount(source_amount: &str, spec: &ConversionSpec) -> Result<String, BridgeError> {
    if spec.fee_bps >= 10_000 {
        return Err(BridgeError::conversion(format!(
            "fee {} bps consumes the whole amount",
            spec.fee_bps
        )));
    }

    let amount = parse_smallest_units(source_amount)?;
    if amount == 0 {
        return Err(BridgeError::conversion("amount must be positive"));
    }

    let amount = match &spec.rate {
        Some(rate) => amount
            .checked_mul(rate.numerator)
            .ok_or_else(|| BridgeError::conversion("amount overflows at rate application"))?
            / rate.denominator,
        None => amount,
    };

    let amount = rescale(amount, spec.source_decimals, spec.destination_decimals)?;

    let amount = amount
        .checked_mul(u128::from(10_000 - spec.fee_bps))
        .ok_or_else(|| BridgeError::conversion("amount overflows at fee application"))?
        / 10_000;

    // One smallest unit is the floor; truncation must not silently produce a
    // zero-value transfer.
    if amount == 0 {
        return Err(BridgeError::conversion(
            "amount is below the minimum transferable unit of the destination asset",
        ));
    }

    Ok(format_units(amount, spec.destination_decimals))
}

/// Parse a non-negative integer string. Rejects signs, decimal points and
/// anything else that is not an ASCII digit; never goes through a float.
pub fn parse_smallest_units(s: &str) -> Result<u128, BridgeError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(BridgeError::conversion("empty amount"));
    }
    if s.starts_with('-') {
        return Err(BridgeError::conversion(format!("negative amount {s:?}")));
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BridgeError::conversion(format!(
            "non-integer amount {s:?}: expected a smallest-unit integer string"
        )));
    }
    s.parse::<u128>()
        .map_err(|e| BridgeError::conversion(format!("amount {s:?} out of range: {e}")))
}

fn rescale(amount: u128, from_decimals: u32, to_decimals: u32) -> Result<u128, BridgeError> {
    if from_decimals >= to_decimals {
        let divisor = pow10(from_decimals - to_decimals)?;
        Ok(amount / divisor)
    } else {
        let factor = pow10(to_decimals - from_decimals)?;
        amount
            .checked_mul(factor)
            .ok_or_else(|| BridgeError::conversion("amount overflows at precision upscaling"))
    }
}

fn pow10(exp: u32) -> Result<u128, BridgeError> {
    10u128
        .checked_pow(exp)
        .ok_or_else(|| BridgeError::conversion(format!("decimal shift 10^{exp} out of range")))
}

/// Render smallest units as a decimal string with exactly `decimals`
/// fractional digits, e.g. (980_000, 6) -> "0.980000".
pub fn format_units(units: u128, decimals: u32) -> String {
    if decimals == 0 {
        return units.to_string();
    }
    let scale = 10u128.pow(decimals);
    let whole = units / scale;
    let frac = units % scale;
    format!("{whole}.{frac:0width$}", width = decimals as usize)
}
