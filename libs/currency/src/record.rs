use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Latest known quote for one symbol. Only `price` and `last_updated`
/// change after the record is provisioned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyRecord {
    pub symbol: String,
    pub name_en: String,
    pub name: String,
    pub price: f64,
    pub change_percent: f64,
    pub unit: String,
    pub last_updated: DateTime<Utc>,
}

impl CurrencyRecord {
    /// New record stamped with the current time.
    pub fn new(
        symbol: impl Into<String>,
        name_en: impl Into<String>,
        name: impl Into<String>,
        price: f64,
        change_percent: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name_en: name_en.into(),
            name: name.into(),
            price,
            change_percent,
            unit: unit.into(),
            last_updated: Utc::now(),
        }
    }

    /// Flat field/value pairs, as stored in a Redis hash.
    pub(crate) fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("symbol", self.symbol.clone()),
            ("name_en", self.name_en.clone()),
            ("name", self.name.clone()),
            ("price", self.price.to_string()),
            ("change_percent", self.change_percent.to_string()),
            ("unit", self.unit.clone()),
            ("last_updated", self.last_updated.to_rfc3339()),
        ]
    }

    pub(crate) fn from_fields(
        key: &str,
        mut fields: HashMap<String, String>,
    ) -> Result<Self, StoreError> {
        let corrupt = |reason: String| StoreError::Corrupt {
            key: key.to_string(),
            reason,
        };

        let mut take = |field: &str| {
            fields
                .remove(field)
                .ok_or_else(|| corrupt(format!("missing field `{field}`")))
        };

        let symbol = take("symbol")?;
        let name_en = take("name_en")?;
        let name = take("name")?;
        let price = take("price")?;
        let change_percent = take("change_percent")?;
        let unit = take("unit")?;
        let last_updated = take("last_updated")?;

        Ok(Self {
            symbol,
            name_en,
            name,
            price: price
                .parse()
                .map_err(|e| corrupt(format!("price `{price}`: {e}")))?,
            change_percent: change_percent
                .parse()
                .map_err(|e| corrupt(format!("change_percent `{change_percent}`: {e}")))?,
            unit,
            last_updated: parse_timestamp(&last_updated)
                .ok_or_else(|| corrupt(format!("last_updated `{last_updated}`")))?,
        })
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
