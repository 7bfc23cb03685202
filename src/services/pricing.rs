use serde::Serialize;

/// Computed checkout totals for a cart or an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Totals {
    pub subtotal: f64,
    pub tax: f64,
    pub shipping: f64,
    pub total: f64,
}

/// Round a money amount to cents, half away from zero.
pub fn round_cents(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Compute totals for a set of (unit_price, quantity) lines.
///
/// Each line is rounded to cents before summing so that order items and the
/// order header always agree. Shipping is a flat fee waived for an empty cart.
pub fn compute_totals(lines: &[(f64, i64)], tax_rate: f64, shipping_flat: f64) -> Totals {
    let subtotal: f64 = lines
        .iter()
        .map(|(price, qty)| round_cents(price * *qty as f64))
        .sum();
    let subtotal = round_cents(subtotal);

    let tax = round_cents(subtotal * tax_rate);
    let shipping = if subtotal > 0.0 { shipping_flat } else { 0.0 };
    let total = round_cents(subtotal + tax + shipping);

    Totals {
        subtotal,
        tax,
        shipping,
        total,
    }
}
