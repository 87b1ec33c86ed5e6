//! Project-level markup and tax application.

use serde::{Deserialize, Serialize};

use super::rollup::Totals;
use crate::models::{Markup, MarkupKind};

/// The bottom line of an estimate after project-level adjustments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimateSummary {
    /// Rolled-up resource cost before resource markups.
    pub subtotal: f64,
    /// Rolled-up resource cost including per-resource markups; the base the
    /// markup list is applied to.
    pub subtotal_with_markup: f64,
    /// Accumulated amount of all `is_tax` markups.
    pub tax: f64,
    /// Final figure: running total plus tax.
    pub grand_total: f64,
}

/// Apply the project's markup list to the rolled-up totals.
///
/// Markups run strictly in the given order. Each percent markup is taken
/// from the running total at the moment it is processed, so an earlier
/// fixed markup raises the base of every later percent one. Tax markups
/// read the same running total but accumulate separately and never feed
/// back into it. No clamping anywhere; a discount-heavy list may produce a
/// negative grand total.
pub fn apply_markups(totals: Totals, markups: &[Markup]) -> EstimateSummary {
    let mut total = totals.cost_with_markup;
    let mut tax = 0.0;

    for markup in markups {
        let amount = match markup.kind {
            MarkupKind::Percent => total * (markup.value / 100.0),
            MarkupKind::Fixed => markup.value,
        };
        if markup.is_tax {
            tax += amount;
        } else {
            total += amount;
        }
    }

    EstimateSummary {
        subtotal: totals.cost,
        subtotal_with_markup: totals.cost_with_markup,
        tax,
        grand_total: total + tax,
    }
}
