//! Minimum-output bounds
//!
//! Integer math in basis points so a bound never rounds up past what
//! the curve would pay.

use alloy::primitives::U256;

const BPS: u64 = 10_000;

/// Slippage fraction as basis points, clamped to [0, 10000]
pub fn slippage_bps(slippage: f64) -> u64 {
    if !slippage.is_finite() || slippage <= 0.0 {
        return 0;
    }
    ((slippage * BPS as f64).round() as u64).min(BPS)
}

/// `amount * (1 - slippage)`
pub fn apply_slippage(amount: U256, slippage: f64) -> U256 {
    let keep = BPS - slippage_bps(slippage);
    amount * U256::from(keep) / U256::from(BPS)
}

/// Contracts reject a literal zero minimum
pub fn clamp_min_output(bound: U256) -> U256 {
    if bound.is_zero() {
        U256::from(1)
    } else {
        bound
    }
}

/// Tokens out for `funds_in` at the curve's current offers/funds ratio.
/// Without reserves, falls back to the input scaled by the slippage.
pub fn local_min_output(funds_in: U256, offers: U256, funds: U256, slippage: f64) -> U256 {
    if offers.is_zero() || funds.is_zero() {
        return apply_slippage(funds_in, slippage);
    }
    let expected = funds_in.saturating_mul(offers) / funds;
    apply_slippage(expected, slippage)
}

/// Funds out for `tokens_in` at the curve's current ratio
pub fn local_min_funds(tokens_in: U256, offers: U256, funds: U256, slippage: f64) -> U256 {
    if offers.is_zero() || funds.is_zero() {
        return apply_slippage(tokens_in, slippage);
    }
    let expected = tokens_in.saturating_mul(funds) / offers;
    apply_slippage(expected, slippage)
}
