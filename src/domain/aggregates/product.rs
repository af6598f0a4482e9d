//! Product Aggregate: catalog categories, their field schemas and draft validation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::domain::value_objects::Sku;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryKey {
    Adezive,
    Preparate,
    Consumabile,
    #[serde(rename = "ingrijire-personala")]
    IngrijirePersonala,
    Accesorii,
    Gene,
    Ustensile,
    TehnologieLed,
    HenaSprancene,
    VopseleProfesionale,
    PensuleInstrumenteSpeciale,
    SolutiiLaminare,
    AdeziveLaminare,
    AccesoriiSpecifice,
}

impl CategoryKey {
    pub const ALL: [CategoryKey; 14] = [
        Self::Adezive, Self::Preparate, Self::Consumabile, Self::IngrijirePersonala, Self::Accesorii,
        Self::Gene, Self::Ustensile, Self::TehnologieLed, Self::HenaSprancene, Self::VopseleProfesionale,
        Self::PensuleInstrumenteSpeciale, Self::SolutiiLaminare, Self::AdeziveLaminare, Self::AccesoriiSpecifice,
    ];

    /// Backing table name.
    pub fn table(self) -> &'static str {
        match self {
            Self::Adezive => "adezive",
            Self::Preparate => "preparate",
            Self::Consumabile => "consumabile",
            Self::IngrijirePersonala => "ingrijire-personala",
            Self::Accesorii => "accesorii",
            Self::Gene => "gene",
            Self::Ustensile => "ustensile",
            Self::TehnologieLed => "tehnologie_led",
            Self::HenaSprancene => "hena_sprancene",
            Self::VopseleProfesionale => "vopsele_profesionale",
            Self::PensuleInstrumenteSpeciale => "pensule_instrumente_speciale",
            Self::SolutiiLaminare => "solutii_laminare",
            Self::AdeziveLaminare => "adezive_laminare",
            Self::AccesoriiSpecifice => "accesorii_specifice",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Adezive => "Adezive",
            Self::Preparate => "Preparate",
            Self::Consumabile => "Consumabile",
            Self::IngrijirePersonala => "Îngrijire Personală",
            Self::Accesorii => "Accesorii",
            Self::Gene => "Gene",
            Self::Ustensile => "Ustensile",
            Self::TehnologieLed => "Tehnologie LED",
            Self::HenaSprancene => "Hena sprâncene",
            Self::VopseleProfesionale => "Vopsele profesionale",
            Self::PensuleInstrumenteSpeciale => "Pensule/Instrumente speciale",
            Self::SolutiiLaminare => "Soluții laminare",
            Self::AdeziveLaminare => "Adezive laminare",
            Self::AccesoriiSpecifice => "Accesorii specifice",
        }
    }

    pub fn schema(self) -> CategorySchema {
        match self {
            Self::Gene => CategorySchema::Lashes,
            Self::Adezive => CategorySchema::Adhesive,
            _ => CategorySchema::Base,
        }
    }
}

impl fmt::Display for CategoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.table()) }
}

impl FromStr for CategoryKey {
    type Err = UnknownCategory;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|k| k.table() == s).ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown product category: {0}")]
pub struct UnknownCategory(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind { Text, Number, Integer, Textarea }

/// Form metadata for one editable column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(name: &'static str, label: &'static str, kind: FieldKind, required: bool) -> FieldSpec {
    FieldSpec { name, label, kind, required }
}

pub const COMMON_FIELDS: &[FieldSpec] = &[
    field("name", "Nume produs", FieldKind::Text, true),
    field("sale_price", "Preț", FieldKind::Number, true),
    field("discount", "Discount (%)", FieldKind::Number, false),
    field("store_stock", "Stoc magazin", FieldKind::Integer, true),
    field("total_stock", "Stoc total", FieldKind::Integer, true),
    field("image_url", "URL Imagine", FieldKind::Text, true),
    field("descriere", "Descriere", FieldKind::Textarea, false),
];

const LASH_FIELDS: &[FieldSpec] = &[
    field("curbura", "Curbură", FieldKind::Text, true),
    field("grosime", "Grosime", FieldKind::Text, true),
    field("lungime", "Lungime", FieldKind::Text, true),
    field("culoare", "Culoare", FieldKind::Text, true),
];

const ADHESIVE_FIELDS: &[FieldSpec] = &[field("sku", "SKU", FieldKind::Text, true)];

/// Validation schema family a category uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategorySchema { Base, Lashes, Adhesive }

impl CategorySchema {
    pub fn extra_fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Base => &[],
            Self::Lashes => LASH_FIELDS,
            Self::Adhesive => ADHESIVE_FIELDS,
        }
    }

    /// Column that must be unique within the table, if any.
    pub fn unique_field(self) -> Option<&'static str> {
        match self {
            Self::Adhesive => Some("sku"),
            _ => None,
        }
    }

    pub fn allows(self, name: &str) -> bool {
        COMMON_FIELDS.iter().chain(self.extra_fields()).any(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct CommonFields {
    #[validate(length(min = 2, message = "Numele trebuie să aibă minim 2 caractere"))]
    pub name: String,
    #[validate(custom = "non_negative_price")]
    pub sale_price: Decimal,
    #[serde(default)]
    #[validate(custom = "percent")]
    pub discount: Decimal,
    #[validate(range(min = 0, message = "Stoc magazin trebuie să fie ≥ 0"))]
    pub store_stock: i64,
    #[validate(range(min = 0, message = "Stoc total trebuie să fie ≥ 0"))]
    pub total_stock: i64,
    #[validate(custom = "http_url")]
    pub image_url: String,
    #[serde(default)]
    pub descriere: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct LashFields {
    #[validate(length(min = 1, message = "Curbura este obligatorie"))]
    pub curbura: String,
    #[validate(custom = "lash_thickness")]
    pub grosime: String,
    #[validate(length(min = 1, message = "Lungimea este obligatorie"))]
    pub lungime: String,
    #[validate(length(min = 1, message = "Culoarea este obligatorie"))]
    pub culoare: String,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AdhesiveFields {
    #[validate(custom = "sku_format")]
    pub sku: String,
}

#[derive(Clone, Debug)]
pub enum CategoryDetails { None, Lashes(LashFields), Adhesive(AdhesiveFields) }

/// A validated product ready to be written to its category table.
#[derive(Clone, Debug)]
pub struct ProductDraft {
    pub category: CategoryKey,
    pub common: CommonFields,
    pub details: CategoryDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldViolation { pub field: String, pub message: String }

impl ProductDraft {
    /// Validates a full row against the category schema. Columns outside the
    /// schema (ids, timestamps) are ignored here; callers reject them on input.
    pub fn parse(category: CategoryKey, row: &Map<String, Value>) -> Result<Self, Vec<FieldViolation>> {
        let value = Value::Object(row.clone());
        let common: CommonFields = decode(&value)?;
        let mut violations = collect_violations(common.validate());
        let details = match category.schema() {
            CategorySchema::Base => CategoryDetails::None,
            CategorySchema::Lashes => {
                let lashes: LashFields = decode(&value)?;
                violations.extend(collect_violations(lashes.validate()));
                CategoryDetails::Lashes(lashes)
            }
            CategorySchema::Adhesive => {
                let adhesive: AdhesiveFields = decode(&value)?;
                violations.extend(collect_violations(adhesive.validate()));
                CategoryDetails::Adhesive(adhesive)
            }
        };
        if category.schema() != CategorySchema::Base && violations.is_empty() {
            violations.extend(stock_consistent(&common));
        }
        if !violations.is_empty() { return Err(violations); }
        Ok(Self { category, common, details })
    }

    /// Normalized column values, schema fields only.
    pub fn to_row(&self) -> Map<String, Value> {
        let c = &self.common;
        let mut row = Map::new();
        row.insert("name".into(), Value::String(c.name.trim().to_string()));
        row.insert("sale_price".into(), decimal_value(c.sale_price));
        row.insert("discount".into(), decimal_value(c.discount));
        row.insert("store_stock".into(), Value::from(c.store_stock));
        row.insert("total_stock".into(), Value::from(c.total_stock));
        row.insert("image_url".into(), Value::String(c.image_url.clone()));
        row.insert("descriere".into(), c.descriere.clone().map_or(Value::Null, Value::String));
        match &self.details {
            CategoryDetails::None => {}
            CategoryDetails::Lashes(l) => {
                row.insert("curbura".into(), Value::String(l.curbura.clone()));
                row.insert("grosime".into(), Value::String(l.grosime.clone()));
                row.insert("lungime".into(), Value::String(l.lungime.clone()));
                row.insert("culoare".into(), Value::String(l.culoare.clone()));
            }
            CategoryDetails::Adhesive(a) => {
                let sku = Sku::new(a.sku.as_str()).map(|s| s.to_string()).unwrap_or_else(|_| a.sku.clone());
                row.insert("sku".into(), Value::String(sku));
            }
        }
        row
    }
}

/// Decimals are written as JSON numbers so numeric columns accept them.
pub fn decimal_value(d: Decimal) -> Value {
    serde_json::Number::from_f64(d.try_into().unwrap_or(0.0)).map_or(Value::Null, Value::Number)
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T, Vec<FieldViolation>> {
    serde_json::from_value(value.clone()).map_err(|e| vec![FieldViolation { field: "_".into(), message: e.to_string() }])
}

pub fn collect_violations(result: Result<(), ValidationErrors>) -> Vec<FieldViolation> {
    let Err(errors) = result else { return vec![] };
    let mut out = vec![];
    for (field, kind) in errors.errors() {
        if let ValidationErrorsKind::Field(list) = kind {
            for e in list {
                let message = e.message.as_ref().map_or_else(|| e.code.to_string(), ToString::to_string);
                out.push(FieldViolation { field: (*field).to_string(), message });
            }
        }
    }
    out.sort_by(|a, b| a.field.cmp(&b.field));
    out
}

fn violation(code: &'static str, message: &'static str) -> ValidationError {
    let mut e = ValidationError::new(code);
    e.message = Some(message.into());
    e
}

fn non_negative_price(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() { return Err(violation("range", "Prețul trebuie să fie ≥ 0")); }
    Ok(())
}

fn percent(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED { return Err(violation("range", "Discount între 0 și 100")); }
    Ok(())
}

fn http_url(value: &str) -> Result<(), ValidationError> {
    let rest = value.strip_prefix("https://").or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(host) if !host.is_empty() && !host.contains(char::is_whitespace) => Ok(()),
        _ => Err(violation("url", "URL imagine invalid (trebuie să înceapă cu http/https)")),
    }
}

/// `0.dd`, e.g. 0.05, 0.07, 0.10.
fn lash_thickness(value: &str) -> Result<(), ValidationError> {
    let ok = value.len() == 4 && value.starts_with("0.") && value[2..].bytes().all(|b| b.is_ascii_digit());
    if !ok { return Err(violation("format", "Format grosime ex: 0.05, 0.07, 0.10, 0.12")); }
    Ok(())
}

fn sku_format(value: &str) -> Result<(), ValidationError> {
    Sku::new(value).map(|_| ()).map_err(|_| violation("sku", "SKU este obligatoriu"))
}

/// Lash and adhesive tables track a warehouse total that includes the shop shelf.
fn stock_consistent(fields: &CommonFields) -> Option<FieldViolation> {
    (fields.total_stock < fields.store_stock)
        .then(|| FieldViolation { field: "total_stock".into(), message: "Stoc total trebuie să fie ≥ stoc magazin".into() })
}
