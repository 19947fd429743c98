use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::model::{InventoryRecord, StoneDetail};

pub const CUBIC_INCHES_PER_CUBIC_FOOT: f64 = 1728.0;
pub const CUBIC_FEET_PER_CUBIC_METER: f64 = 35.28;
/// Granite density used for estimates; results are reported in pounds.
pub const GRANITE_DENSITY: f64 = 3000.0;

/// Upper bound for the "decimal feet" heuristic.
const FEET_HEURISTIC_MAX: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    Inches,
    Feet,
}

impl LengthUnit {
    /// Interpret an explicit unit field (`ft`, `feet`, `'`, `in`, `inches`, `"`).
    pub fn from_hint(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            None
        } else if feet_marker_re().is_match(raw) {
            Some(Self::Feet)
        } else if inch_marker_re().is_match(raw) {
            Some(Self::Inches)
        } else {
            None
        }
    }
}

/// Length, width and height in inches.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Dimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Dimensions {
    fn from_values(values: [f64; 3], unit: LengthUnit) -> Self {
        let scale = match unit {
            LengthUnit::Inches => 1.0,
            LengthUnit::Feet => 12.0,
        };
        Self {
            length: values[0] * scale,
            width: values[1] * scale,
            height: values[2] * scale,
        }
    }

    pub fn is_positive(&self) -> bool {
        self.length > 0.0 && self.width > 0.0 && self.height > 0.0
    }

    pub fn cubic_feet(&self) -> f64 {
        self.length * self.width * self.height / CUBIC_INCHES_PER_CUBIC_FOOT
    }
}

/// A weight in pounds, tagged with where it came from. Callers must label estimates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", content = "pounds", rename_all = "snake_case")]
pub enum WeightEstimate {
    Authoritative(f64),
    Estimated(f64),
}

impl WeightEstimate {
    pub fn pounds(&self) -> f64 {
        match self {
            Self::Authoritative(p) | Self::Estimated(p) => *p,
        }
    }

    pub fn is_estimated(&self) -> bool {
        matches!(self, Self::Estimated(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Authoritative(p) => format!("{p} lbs"),
            Self::Estimated(p) => format!("~{} lbs (estimated)", p.round()),
        }
    }
}

/// Anything that can be weighed: a stock row or an individual stone.
pub trait Measurable {
    fn authoritative_weight(&self) -> Option<f64>;

    /// Explicit unit field, if the upstream supplied one.
    fn unit_hint(&self) -> Option<&str> {
        None
    }

    /// Per-axis numeric fields; these win over the dimension text.
    fn axis_dimensions(&self) -> Option<[f64; 3]> {
        None
    }

    fn dimension_text(&self) -> Option<&str>;
}

impl Measurable for InventoryRecord {
    fn authoritative_weight(&self) -> Option<f64> {
        self.weight
    }

    fn unit_hint(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn dimension_text(&self) -> Option<&str> {
        Some(self.size.as_str()).filter(|s| !s.trim().is_empty())
    }
}

impl Measurable for StoneDetail {
    fn authoritative_weight(&self) -> Option<f64> {
        self.weight
    }

    fn unit_hint(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    fn axis_dimensions(&self) -> Option<[f64; 3]> {
        match (self.length, self.width, self.height) {
            (Some(l), Some(w), Some(h)) if l > 0.0 && w > 0.0 && h > 0.0 => Some([l, w, h]),
            _ => None,
        }
    }

    fn dimension_text(&self) -> Option<&str> {
        self.dimensions.as_deref()
    }
}

fn triplet_re() -> &'static Regex {
    static TRIPLET_RE: OnceLock<Regex> = OnceLock::new();
    TRIPLET_RE.get_or_init(|| {
        let token = r"(\d+(?:\.\d+)?(?:-\d+(?:\.\d+)?)?)";
        let sep = r"\s*[x*×]\s*";
        Regex::new(&format!("(?i){token}{sep}{token}{sep}{token}")).expect("static triplet pattern")
    })
}

fn feet_marker_re() -> &'static Regex {
    static FEET_RE: OnceLock<Regex> = OnceLock::new();
    FEET_RE.get_or_init(|| Regex::new(r"(?i)\b(ft|feet|foot)\b|'|′").expect("static feet pattern"))
}

fn inch_marker_re() -> &'static Regex {
    static INCH_RE: OnceLock<Regex> = OnceLock::new();
    INCH_RE.get_or_init(|| Regex::new(r#"(?i)\b(in|inch|inches)\b|"|″"#).expect("static inch pattern"))
}

/// Three values pulled from size text, plus the unit the text itself pins down.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedTriplet {
    pub values: [f64; 3],
    pub unit: Option<LengthUnit>,
}

/// Parse `L x W x H` out of free text.
///
/// Tokens written as `feet-inches` (`2-6` is 2 ft 6 in) are folded into inches and pin the
/// whole triplet to inches. Otherwise a foot marker anywhere in the text pins it to feet.
pub fn parse_triplet(text: &str) -> Option<ParsedTriplet> {
    let caps = triplet_re().captures(text)?;
    let mut values = [0.0; 3];
    let mut compound = false;
    for (slot, idx) in values.iter_mut().zip(1..=3) {
        let token = caps.get(idx)?.as_str();
        *slot = match token.split_once('-') {
            Some((feet, inches)) => {
                compound = true;
                feet.parse::<f64>().ok()? * 12.0 + inches.parse::<f64>().ok()?
            }
            None => token.parse::<f64>().ok()?,
        };
    }
    let unit = if compound {
        Some(LengthUnit::Inches)
    } else if feet_marker_re().is_match(text) {
        Some(LengthUnit::Feet)
    } else {
        None
    };
    Some(ParsedTriplet { values, unit })
}

/// Decimal feet entered without a unit look like small fractional numbers.
fn looks_like_feet(values: &[f64; 3]) -> bool {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    min > 0.0 && min < 1.0 && max <= FEET_HEURISTIC_MAX
}

fn resolve_unit(values: &[f64; 3], explicit: Option<LengthUnit>) -> LengthUnit {
    match explicit {
        Some(unit) => unit,
        None if looks_like_feet(values) => LengthUnit::Feet,
        None => LengthUnit::Inches,
    }
}

/// Dimensions in inches, from axis fields first, then from the dimension text.
pub fn dimensions_inches<M: Measurable + ?Sized>(item: &M) -> Option<Dimensions> {
    let hinted = item.unit_hint().and_then(LengthUnit::from_hint);

    if let Some(values) = item.axis_dimensions() {
        return Some(Dimensions::from_values(values, resolve_unit(&values, hinted)));
    }

    let parsed = parse_triplet(item.dimension_text()?)?;
    // Feet-inch tokens already resolved to inches; a unit field cannot rescale them.
    let unit = match parsed.unit {
        Some(LengthUnit::Inches) => Some(LengthUnit::Inches),
        text_unit => hinted.or(text_unit),
    };
    Some(Dimensions::from_values(
        parsed.values,
        resolve_unit(&parsed.values, unit),
    ))
}

/// Pounds for a volume given in inches, or `None` when any axis is not positive.
pub fn weight_from_dimensions(dims: &Dimensions) -> Option<f64> {
    if !dims.is_positive() {
        return None;
    }
    let cubic_meters = dims.cubic_feet() / CUBIC_FEET_PER_CUBIC_METER;
    let pounds = cubic_meters * GRANITE_DENSITY;
    (pounds.is_finite() && pounds > 0.0).then_some(pounds)
}

/// Known weight verbatim, otherwise a density-based estimate from the dimensions.
pub fn estimate_weight<M: Measurable + ?Sized>(item: &M) -> Option<WeightEstimate> {
    if let Some(known) = item.authoritative_weight() {
        return Some(WeightEstimate::Authoritative(known));
    }
    let dims = dimensions_inches(item)?;
    weight_from_dimensions(&dims).map(WeightEstimate::Estimated)
}
