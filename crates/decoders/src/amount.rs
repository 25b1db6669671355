use alloy::primitives::U256;
use alloy::primitives::utils::format_units;

/// Decimals of the chain's native currency.
pub const NATIVE_DECIMALS: u8 = 18;

/// Render a base-unit amount as a trimmed decimal string ("18000000000000000" → "0.018").
pub fn format_amount(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(formatted) => trim_decimal(&formatted),
        Err(e) => {
            tracing::warn!(%value, decimals, error = %e, "Failed to format amount, using base units");
            value.to_string()
        }
    }
}

/// Strip trailing fractional zeros and a dangling decimal point.
pub fn trim_decimal(value: &str) -> String {
    if !value.contains('.') {
        return value.to_string();
    }
    let trimmed = value.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}
