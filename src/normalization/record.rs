use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::model::{InventoryRecord, Location, StoneDetail};

const PRODUCT_CODE: &[&str] = &["EndProductCode", "ProductCode", "EPCode", "Code"];
const DESCRIPTION: &[&str] = &["EndProductDescription", "Description", "Desc"];
const PRODUCT_TYPE: &[&str] = &["Ptype", "ProductType", "Type"];
const COLOR: &[&str] = &["PColor", "Color", "Colour"];
const DESIGN: &[&str] = &["PDesign", "Design"];
const FINISH: &[&str] = &["PFinish", "Finish"];
const SIZE: &[&str] = &["Size"];
const QUANTITY: &[&str] = &["Qty", "Quantity"];
const LOCATION: &[&str] = &["Locationname", "LocationName", "Location"];
const WEIGHT: &[&str] = &["Weight", "Wt"];
const UNIT: &[&str] = &["Unit", "UOM", "DimUnit", "DimensionUnit"];

const CONTAINER: &[&str] = &["Container", "ContainerNo"];
const CRATE_NO: &[&str] = &["CrateNo", "Crate", "CrateNumber"];
const SUBLOCATION: &[&str] = &["SublocationName", "Sublocation"];
const STATUS: &[&str] = &["Status"];
const STOCK_ID: &[&str] = &["StockId", "StockID", "Stock"];
const COMMENTS: &[&str] = &["Comments", "Comment", "Notes"];
const LENGTH: &[&str] = &["Length", "L", "Len", "LengthIn"];
const WIDTH: &[&str] = &["Width", "W", "Wid", "WidthIn"];
const HEIGHT: &[&str] = &["Height", "H", "Ht", "HeightIn"];
const DIMENSIONS: &[&str] = &["Dimensions", "Dimension", "Size", "Measurement"];

/// Case-insensitive view over one upstream JSON object.
///
/// Upstream casing drifts between `Locationname`, `locationname` and `LocationName`, so every
/// key is folded once here and downstream code works on fixed-shape structs.
pub struct FieldLookup<'a> {
    fields: HashMap<String, (&'a str, &'a Value)>,
}

impl<'a> FieldLookup<'a> {
    pub fn new(raw: &'a Value) -> Option<Self> {
        let obj = raw.as_object()?;
        let fields = obj
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), (k.as_str(), v)))
            .collect();
        Some(Self { fields })
    }

    /// First alias present with a non-null value.
    pub fn get(&self, aliases: &[&str]) -> Option<&'a Value> {
        aliases.iter().find_map(|alias| {
            self.fields
                .get(&alias.to_ascii_lowercase())
                .map(|(_, v)| *v)
                .filter(|v| !v.is_null())
        })
    }

    pub fn string(&self, aliases: &[&str]) -> Option<String> {
        self.get(aliases).and_then(value_as_string)
    }

    pub fn number(&self, aliases: &[&str]) -> Option<f64> {
        self.get(aliases).and_then(value_as_f64)
    }

    /// Scalar fields whose key matches none of `known`, keyed by their original spelling.
    fn extras(&self, known: &[&[&str]]) -> BTreeMap<String, String> {
        let known: Vec<String> = known
            .iter()
            .flat_map(|group| group.iter())
            .map(|k| k.to_ascii_lowercase())
            .collect();
        self.fields
            .iter()
            .filter(|(folded, _)| !known.contains(*folded))
            .filter_map(|(_, (original, v))| value_as_string(v).map(|s| (original.to_string(), s)))
            .collect()
    }
}

/// Render a scalar JSON value as trimmed text. Objects, arrays and blanks yield `None`.
pub fn value_as_string(v: &Value) -> Option<String> {
    let s = match v {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn number_re() -> &'static Regex {
    static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
    NUMBER_RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("static number pattern"))
}

/// Numeric reading of a JSON value; strings may carry thousands separators or units (`"1,250 lbs"`).
pub fn value_as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_numeric(s),
        _ => None,
    }
}

pub fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    number_re()
        .find(cleaned)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|f| f.is_finite())
}

/// Normalize one upstream stock row into an [`InventoryRecord`].
///
/// The location name comes from the row when present, otherwise from `location`.
/// Returns `None` for anything that is not a JSON object.
pub fn normalize_record(raw: &Value, location: &Location) -> Option<InventoryRecord> {
    let fields = FieldLookup::new(raw)?;
    let quantity = fields
        .number(QUANTITY)
        .map(|q| q.max(0.0).round().min(u32::MAX as f64) as u32)
        .unwrap_or(0);
    let location_name = fields
        .string(LOCATION)
        .unwrap_or_else(|| location.name.clone());

    Some(InventoryRecord {
        product_code: fields.string(PRODUCT_CODE).unwrap_or_default(),
        description: fields.string(DESCRIPTION).unwrap_or_default(),
        product_type: fields.string(PRODUCT_TYPE).unwrap_or_default(),
        color: fields.string(COLOR).unwrap_or_default(),
        design: fields.string(DESIGN).unwrap_or_default(),
        finish: fields.string(FINISH).unwrap_or_default(),
        size: fields.string(SIZE).unwrap_or_default(),
        quantity,
        location: location_name,
        location_id: location.id.clone(),
        weight: fields.number(WEIGHT).filter(|w| *w > 0.0),
        unit: fields.string(UNIT),
        extras: fields.extras(&[
            PRODUCT_CODE,
            DESCRIPTION,
            PRODUCT_TYPE,
            COLOR,
            DESIGN,
            FINISH,
            SIZE,
            QUANTITY,
            LOCATION,
            WEIGHT,
            UNIT,
        ]),
    })
}

/// Normalize one entry from the detail endpoint's `stones` array.
pub fn normalize_stone(raw: &Value) -> Option<StoneDetail> {
    let fields = FieldLookup::new(raw)?;
    Some(StoneDetail {
        container: fields.string(CONTAINER),
        crate_no: fields.string(CRATE_NO),
        location_name: fields.string(LOCATION),
        sublocation_name: fields.string(SUBLOCATION),
        status: fields.string(STATUS),
        stock_id: fields.string(STOCK_ID),
        comments: fields.string(COMMENTS),
        weight: fields.number(WEIGHT).filter(|w| *w > 0.0),
        unit: fields.string(UNIT),
        length: fields.number(LENGTH),
        width: fields.number(WIDTH),
        height: fields.number(HEIGHT),
        dimensions: fields.string(DIMENSIONS),
    })
}
