// src/utils/precision.rs
use rust_decimal::Decimal;

/// Floors a quantity DOWN to the nearest multiple of the exchange lot step.
/// Example: qty=10.999, step=1.0 -> 10.0. A zero step passes through.
pub fn floor_to_lot(qty: Decimal, lot_step: Decimal) -> Decimal {
    if lot_step.is_zero() {
        return qty;
    }
    (qty / lot_step).floor() * lot_step
}

/// Order quantity for spending `notional` quote units at `price`, floored
/// to the lot step. Sub-lot remainders are left unspent, never rounded up.
pub fn quantity_for_notional(notional: Decimal, price: Decimal, lot_step: Decimal) -> Decimal {
    if price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    floor_to_lot(notional / price, lot_step)
}
