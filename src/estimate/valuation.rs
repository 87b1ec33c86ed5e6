//! Per-resource cost formulas.

/// The three derived money fields of a resource.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedCosts {
    pub cost: f64,
    pub price_with_markup: f64,
    pub cost_with_markup: f64,
}

/// Compute a resource's derived fields from its base fields.
///
/// Total over all inputs: negative markup is a discount, and out-of-domain
/// volume/price are rejected by the mutation layer before this is reached.
pub fn derive_costs(volume: f64, price: f64, markup: f64) -> DerivedCosts {
    let price_with_markup = price * (1.0 + markup / 100.0);
    DerivedCosts {
        cost: volume * price,
        price_with_markup,
        cost_with_markup: volume * price_with_markup,
    }
}
