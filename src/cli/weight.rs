use std::fmt::Write as _;

use anyhow::Result;

use crate::model::InventoryRecord;
use crate::normalization::dimensions::dimensions_inches;
use crate::normalization::estimate_weight;

#[derive(Debug, Clone, Default)]
pub struct WeightConfig {
    /// Free-text size, e.g. `2-6 X 1-2 X 0-6` or `36 x 8 x 24`.
    pub size: String,
    /// `ft` / `in` override for bare numbers.
    pub unit: Option<String>,
}

pub async fn run(cfg: WeightConfig) -> Result<()> {
    println!("{}", render_estimate(&cfg));
    Ok(())
}

pub fn render_estimate(cfg: &WeightConfig) -> String {
    let probe = InventoryRecord {
        size: cfg.size.clone(),
        unit: cfg.unit.clone(),
        ..InventoryRecord::default()
    };
    let mut out = String::new();
    writeln!(out, "size: {}", cfg.size).ok();
    match dimensions_inches(&probe) {
        Some(dims) => {
            writeln!(
                out,
                "inches: {} x {} x {} ({:.2} cu ft)",
                dims.length,
                dims.width,
                dims.height,
                dims.cubic_feet()
            )
            .ok();
        }
        None => {
            writeln!(out, "inches: could not parse dimensions").ok();
        }
    }
    match estimate_weight(&probe) {
        Some(weight) => writeln!(out, "weight: {}", weight.label()).ok(),
        None => writeln!(out, "weight: unknown").ok(),
    };
    out
}
