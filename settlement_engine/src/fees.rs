//! Fee calculation for collections and withdrawals.
//!
//! All fee math happens in decimal space and is rounded half-up at the cent boundary before it
//! touches the integer ledger. These functions are pure; the caller supplies the merchant policy
//! and the platform defaults.

use mpg_common::Money;
use rust_decimal::Decimal;

use crate::db_types::{FeeTier, FeeType, PaymentFeeConfig, WithdrawalFeeConfig};

/// Platform-wide fee parameters, used when a merchant has no policy of its own or defers to the
/// default.
#[derive(Debug, Clone)]
pub struct FeeDefaults {
    /// Collection charge, as a percentage of the gross amount.
    pub percentage: Decimal,
    /// Upper bound on the collection charge.
    pub cap: Money,
    pub withdrawal_tiers: Vec<FeeTier>,
}

impl Default for FeeDefaults {
    fn default() -> Self {
        Self {
            percentage: Decimal::new(15, 1), // 1.5%
            cap: Money::from_major(500),
            withdrawal_tiers: vec![
                FeeTier { min: Money::zero(), max: Some(Money::from_major(5_000)), fee: Money::from_major(20) },
                FeeTier {
                    min: Money::from_major(5_000) + Money::from(1),
                    max: Some(Money::from_major(50_000)),
                    fee: Money::from_major(30),
                },
                FeeTier { min: Money::from_major(50_000) + Money::from(1), max: None, fee: Money::from_major(50) },
            ],
        }
    }
}

/// The outcome of applying a collection charge to a gross amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charge {
    pub gross: Money,
    pub charge: Money,
    pub net: Money,
}

/// Computes the platform charge for an inbound collection.
///
/// Percentage charges are `gross * pct / 100`, rounded half-up to the cent and capped. A fixed
/// policy charges its flat amount. In every case the charge is clamped to the gross amount so the
/// net credit can never be negative.
pub fn payment_charge(gross: Money, policy: Option<&PaymentFeeConfig>, defaults: &FeeDefaults) -> Charge {
    let charge = match policy {
        Some(p) if !p.use_default && p.fee_type == FeeType::Fixed => p.fixed,
        Some(p) if !p.use_default => percentage_charge(gross, p.percentage, p.cap),
        Some(p) => {
            // Deferring to the default, but policy-level overrides still win when set.
            let pct = if p.percentage > Decimal::ZERO { p.percentage } else { defaults.percentage };
            let cap = if p.cap.is_positive() { p.cap } else { defaults.cap };
            percentage_charge(gross, pct, cap)
        },
        None => percentage_charge(gross, defaults.percentage, defaults.cap),
    };
    let charge = charge.min(gross).max(Money::zero());
    Charge { gross, charge, net: gross - charge }
}

fn percentage_charge(gross: Money, percentage: Decimal, cap: Money) -> Money {
    let raw = gross.to_decimal() * percentage / Decimal::ONE_HUNDRED;
    // i64 overflow is unreachable here: the product of two in-range amounts in decimal space
    // still fits comfortably.
    let charge = Money::from_decimal_round(raw).unwrap_or(cap);
    charge.min(cap)
}

/// Looks up the flat fee band for a withdrawal of `gross`. Returns `None` when no tier covers
/// the amount, which callers treat as a validation failure.
pub fn withdrawal_fee(gross: Money, policy: Option<&WithdrawalFeeConfig>, defaults: &FeeDefaults) -> Option<Money> {
    let tiers: &[FeeTier] = match policy {
        Some(p) if !p.use_default && !p.tiers.is_empty() => &p.tiers,
        _ => &defaults.withdrawal_tiers,
    };
    tiers.iter().find(|t| gross >= t.min && t.max.map_or(true, |max| gross <= max)).map(|t| t.fee)
}
