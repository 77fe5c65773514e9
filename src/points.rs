//! Point values and the alias ↔ device point table

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Binary "on" token as understood by the controller
pub const ACTIVE: &str = "active";
/// Binary "off" token as understood by the controller
pub const INACTIVE: &str = "inactive";

/// A value read from or written to a device point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointValue {
    Number(f64),
    Text(String),
}

impl PointValue {
    pub fn active() -> Self {
        Self::Text(ACTIVE.to_string())
    }

    pub fn inactive() -> Self {
        Self::Text(INACTIVE.to_string())
    }

    pub fn binary(on: bool) -> Self {
        if on {
            Self::active()
        } else {
            Self::inactive()
        }
    }

    /// Numeric view of the value
    ///
    /// Binary tokens normalize to 1/0, numeric text is parsed, anything
    /// else has no numeric value.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) if t.eq_ignore_ascii_case(ACTIVE) => Some(1.0),
            Self::Text(t) if t.eq_ignore_ascii_case(INACTIVE) => Some(0.0),
            Self::Text(t) => t.trim().parse().ok(),
        }
    }
}

impl From<f64> for PointValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(t) => f.write_str(t),
        }
    }
}

/// How raw device values relate to the values written in test scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    #[default]
    Plain,
    /// Device reports 0..100, scripts use 0..1
    Percent,
}

impl Units {
    /// Convert a raw device number into script units
    pub fn scale(self, raw: f64) -> f64 {
        match self {
            Self::Plain => raw,
            Self::Percent => raw / 100.0,
        }
    }
}

/// A device point as known to the test script
#[derive(Debug, Clone, PartialEq)]
pub struct PointProperty {
    /// Name the device (gateway) addresses the point by
    pub device_name: String,
    /// Human-readable name used in the test script
    pub alias: String,
    pub units: Units,
    /// Protocol object type, e.g. "analogValue"
    pub object_type: Option<String>,
    /// Protocol object instance
    pub address: Option<u32>,
}

/// Read-only point lookup shared by every component of a run
#[derive(Debug, Clone, Default)]
pub struct PointTable {
    points: Vec<PointProperty>,
    by_alias: HashMap<String, usize>,
    by_device: HashMap<String, usize>,
}

impl PointTable {
    pub fn new(points: Vec<PointProperty>) -> Self {
        let mut by_alias = HashMap::new();
        let mut by_device = HashMap::new();
        for (i, point) in points.iter().enumerate() {
            by_alias.insert(point.alias.clone(), i);
            by_device.insert(point.device_name.clone(), i);
        }
        Self {
            points,
            by_alias,
            by_device,
        }
    }

    pub fn by_alias(&self, alias: &str) -> Option<&PointProperty> {
        self.by_alias.get(alias).map(|&i| &self.points[i])
    }

    pub fn by_device(&self, device_name: &str) -> Option<&PointProperty> {
        self.by_device.get(device_name).map(|&i| &self.points[i])
    }

    /// Units of a device point, plain when unknown
    pub fn units(&self, device_name: &str) -> Units {
        self.by_device(device_name)
            .map(|p| p.units)
            .unwrap_or_default()
    }

    /// Alias of a device point, falling back to the device name itself
    pub fn alias_of<'a>(&'a self, device_name: &'a str) -> &'a str {
        self.by_device(device_name)
            .map(|p| p.alias.as_str())
            .unwrap_or(device_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PointProperty> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(alias: &str, device: &str, units: Units) -> PointProperty {
        PointProperty {
            device_name: device.to_string(),
            alias: alias.to_string(),
            units,
            object_type: None,
            address: None,
        }
    }

    #[test]
    fn test_binary_tokens_normalize() {
        assert_eq!(PointValue::active().as_number(), Some(1.0));
        assert_eq!(PointValue::inactive().as_number(), Some(0.0));
        assert_eq!(PointValue::Text("Active".into()).as_number(), Some(1.0));
        assert_eq!(PointValue::Text("42.5".into()).as_number(), Some(42.5));
        assert_eq!(PointValue::Text("occupied".into()).as_number(), None);
    }

    #[test]
    fn test_untagged_json_shape() {
        let values: Vec<PointValue> = serde_json::from_str(r#"[72.5, "active"]"#).unwrap();
        assert_eq!(values[0], PointValue::Number(72.5));
        assert_eq!(values[1], PointValue::active());
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[72.5,"active"]"#);
    }

    #[test]
    fn test_percent_scaling() {
        assert_eq!(Units::Percent.scale(40.0), 0.4);
        assert_eq!(Units::Plain.scale(40.0), 40.0);
    }

    #[test]
    fn test_table_lookups() {
        let table = PointTable::new(vec![
            point("SupplyTemp", "AV-1", Units::Plain),
            point("OADamper", "AO-2", Units::Percent),
        ]);

        assert_eq!(table.by_alias("OADamper").unwrap().device_name, "AO-2");
        assert_eq!(table.units("AO-2"), Units::Percent);
        assert_eq!(table.units("unknown"), Units::Plain);
        assert_eq!(table.alias_of("AV-1"), "SupplyTemp");
        assert_eq!(table.alias_of("BV-9"), "BV-9");
        assert_eq!(table.len(), 2);
    }
}
