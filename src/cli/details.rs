use std::fmt::Write as _;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::details::{DetailLookup, ItemDetail};
use crate::facets::FilterState;
use crate::model::InventoryRecord;
use crate::session::SessionContext;

#[derive(Debug, Clone)]
pub struct DetailsConfig {
    pub product_code: String,
}

pub async fn run(cfg: DetailsConfig) -> Result<()> {
    let engine = EngineConfig::from_env()?;
    let ctx = SessionContext::from_config(&engine).context("building inventory client")?;

    // The design code for the image search lives on the stock row.
    let result = ctx
        .cache
        .get(&FilterState::new(), false, &CancellationToken::new())
        .await
        .context("inventory load cancelled")?;
    let record = result
        .dataset()
        .find_by_code(&cfg.product_code)
        .cloned()
        .unwrap_or_else(|| {
            tracing::warn!(product_code = %cfg.product_code, "product not in dataset; images skipped");
            InventoryRecord {
                product_code: cfg.product_code.clone(),
                ..InventoryRecord::default()
            }
        });

    let lookup = DetailLookup::new(ctx.source.clone());
    let detail = lookup.select(&record).await;
    println!("{}", render_detail(&detail));
    Ok(())
}

pub fn render_detail(detail: &ItemDetail) -> String {
    let mut out = String::new();
    writeln!(out, "PRODUCT {}:", detail.product_code).ok();
    writeln!(
        out,
        "design code: {}",
        detail.design_code.as_deref().unwrap_or("none")
    )
    .ok();
    if let Some(err) = &detail.error {
        writeln!(out, "stones unavailable: {err}").ok();
    } else {
        writeln!(out, "stones: {}", detail.stones.len()).ok();
    }
    for stone in &detail.stones {
        let s = &stone.stone;
        writeln!(
            out,
            "  crate {} | {} | {} | {}",
            s.crate_no.as_deref().unwrap_or("-"),
            s.location_name.as_deref().unwrap_or("-"),
            s.dimensions.as_deref().unwrap_or("-"),
            stone.weight_label.as_deref().unwrap_or("weight unknown"),
        )
        .ok();
    }
    writeln!(out, "images: {}", detail.images.len()).ok();
    for image in &detail.images {
        writeln!(out, "  {} ({})", image.path, image.category).ok();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::details::StoneView;
    use crate::model::{ImageAsset, StoneDetail};

    #[test]
    fn detail_report_distinguishes_estimated_weights() {
        let detail = ItemDetail {
            product_code: "EP-1".into(),
            design_code: Some("AG-112".into()),
            stones: vec![
                StoneView::from(StoneDetail {
                    crate_no: Some("12".into()),
                    weight: Some(1250.0),
                    ..StoneDetail::default()
                }),
                StoneView::from(StoneDetail {
                    crate_no: Some("13".into()),
                    dimensions: Some("36 x 8 x 24".into()),
                    ..StoneDetail::default()
                }),
            ],
            images: vec![ImageAsset {
                path: "/img/AG-112.jpg".into(),
                name: "AG-112.jpg".into(),
                category: "serp".into(),
            }],
            error: None,
        };

        let report = render_detail(&detail);
        assert!(report.contains("design code: AG-112"));
        assert!(report.contains("crate 12 | - | - | 1250 lbs"));
        assert!(report.contains("crate 13 | - | 36 x 8 x 24 | ~340 lbs (estimated)"));
        assert!(report.contains("  /img/AG-112.jpg (serp)"));
    }

    #[test]
    fn failed_stone_lookup_is_reported() {
        let detail = ItemDetail {
            product_code: "EP-2".into(),
            design_code: None,
            stones: Vec::new(),
            images: Vec::new(),
            error: Some("request timed out: details".into()),
        };
        let report = render_detail(&detail);
        assert!(report.contains("design code: none"));
        assert!(report.contains("stones unavailable: request timed out"));
    }
}
