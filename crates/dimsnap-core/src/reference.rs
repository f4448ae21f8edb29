//! Reference objects of known physical size.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Catalog id that selects a caller-supplied size.
pub const CUSTOM_ID: &str = "custom";

/// Physical length unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Cm,
    Mm,
    In,
}

impl Unit {
    fn cm_per_unit(self) -> f64 {
        match self {
            Unit::Cm => 1.0,
            Unit::Mm => 0.1,
            Unit::In => 2.54,
        }
    }

    /// Convert `value` expressed in `self` into `to`.
    #[inline]
    pub fn convert(self, value: f64, to: Unit) -> f64 {
        if self == to {
            return value;
        }
        value * self.cm_per_unit() / to.cm_per_unit()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Cm => "cm",
            Unit::Mm => "mm",
            Unit::In => "in",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Unit {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cm" => Ok(Unit::Cm),
            "mm" => Ok(Unit::Mm),
            "in" | "inch" | "inches" => Ok(Unit::In),
            other => Err(ReferenceError::UnknownUnit(other.to_string())),
        }
    }
}

/// Known physical size of a reference object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    pub id: String,
    pub physical_width: f64,
    pub physical_height: f64,
    pub unit: Unit,
}

impl ReferenceSpec {
    /// Nominal width over height.
    #[inline]
    pub fn aspect_ratio(&self) -> f64 {
        self.physical_width / self.physical_height
    }

    /// The same reference expressed in another unit.
    pub fn to_unit(&self, unit: Unit) -> Self {
        Self {
            id: self.id.clone(),
            physical_width: self.unit.convert(self.physical_width, unit),
            physical_height: self.unit.convert(self.physical_height, unit),
            unit,
        }
    }
}

/// Caller-supplied reference size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomSize {
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub unit: Unit,
}

impl CustomSize {
    pub fn cm(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            unit: Unit::Cm,
        }
    }
}

/// Reference lookup errors.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ReferenceError {
    #[error("unknown reference object '{0}'")]
    UnknownReference(String),
    #[error("custom reference size must be finite and > 0 (width={width}, height={height})")]
    InvalidCustomSize { width: f64, height: f64 },
    #[error("custom reference requires both width and height")]
    MissingCustomSize,
    #[error("unknown unit '{0}' (expected cm, mm or in)")]
    UnknownUnit(String),
}

/// One static catalog entry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub id: &'static str,
    pub name: &'static str,
    pub physical_width: f64,
    pub physical_height: f64,
    pub unit: Unit,
}

impl CatalogEntry {
    fn spec(&self) -> ReferenceSpec {
        ReferenceSpec {
            id: self.id.to_string(),
            physical_width: self.physical_width,
            physical_height: self.physical_height,
            unit: self.unit,
        }
    }
}

const BUILTIN: [CatalogEntry; 5] = [
    CatalogEntry {
        id: "credit-card",
        name: "Credit/Debit Card",
        physical_width: 8.56,
        physical_height: 5.398,
        unit: Unit::Cm,
    },
    CatalogEntry {
        id: "us-quarter",
        name: "US Quarter",
        physical_width: 2.426,
        physical_height: 2.426,
        unit: Unit::Cm,
    },
    CatalogEntry {
        id: "business-card",
        name: "Business Card",
        physical_width: 8.89,
        physical_height: 5.08,
        unit: Unit::Cm,
    },
    CatalogEntry {
        id: "iphone-14",
        name: "iPhone 14",
        physical_width: 14.67,
        physical_height: 7.15,
        unit: Unit::Cm,
    },
    CatalogEntry {
        id: "a4-paper",
        name: "A4 Paper",
        physical_width: 29.7,
        physical_height: 21.0,
        unit: Unit::Cm,
    },
];

/// Read-only table of reference objects.
#[derive(Debug)]
pub struct ReferenceCatalog {
    entries: &'static [CatalogEntry],
}

static CATALOG: OnceLock<ReferenceCatalog> = OnceLock::new();

impl ReferenceCatalog {
    /// Process-wide built-in catalog, initialised on first use.
    pub fn builtin() -> &'static ReferenceCatalog {
        CATALOG.get_or_init(|| ReferenceCatalog { entries: &BUILTIN })
    }

    /// Entries in catalog order (without the `custom` pseudo-entry).
    pub fn entries(&self) -> &[CatalogEntry] {
        self.entries
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Resolve a reference id, optionally with a caller-supplied size.
    ///
    /// Catalog ids ignore `custom`. `"custom"` requires a valid size. Any
    /// other id is accepted only with a valid size and yields a custom spec
    /// under that id.
    pub fn lookup(
        &self,
        id: &str,
        custom: Option<CustomSize>,
    ) -> Result<ReferenceSpec, ReferenceError> {
        if let Some(entry) = self.get(id) {
            return Ok(entry.spec());
        }
        match custom {
            Some(size) => custom_spec(id, size),
            None if id == CUSTOM_ID => Err(ReferenceError::MissingCustomSize),
            None => Err(ReferenceError::UnknownReference(id.to_string())),
        }
    }
}

fn custom_spec(id: &str, size: CustomSize) -> Result<ReferenceSpec, ReferenceError> {
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(size.width) || !valid(size.height) {
        return Err(ReferenceError::InvalidCustomSize {
            width: size.width,
            height: size.height,
        });
    }
    Ok(ReferenceSpec {
        id: id.to_string(),
        physical_width: size.width,
        physical_height: size.height,
        unit: size.unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builtin_entries_have_documented_sizes() {
        let catalog = ReferenceCatalog::builtin();
        let expected = [
            ("credit-card", 8.56, 5.398),
            ("us-quarter", 2.426, 2.426),
            ("business-card", 8.89, 5.08),
            ("iphone-14", 14.67, 7.15),
            ("a4-paper", 29.7, 21.0),
        ];
        assert_eq!(catalog.entries().len(), expected.len());
        for (id, w, h) in expected {
            let spec = catalog.lookup(id, None).expect("catalog id");
            assert_eq!(spec.id, id);
            assert_eq!(spec.physical_width, w);
            assert_eq!(spec.physical_height, h);
            assert_eq!(spec.unit, Unit::Cm);
        }
    }

    #[test]
    fn catalog_id_ignores_custom_size() {
        let spec = ReferenceCatalog::builtin()
            .lookup("credit-card", Some(CustomSize::cm(1.0, 1.0)))
            .expect("catalog id");
        assert_eq!(spec.physical_width, 8.56);
    }

    #[test]
    fn custom_returns_supplied_size() {
        for (w, h) in [(0.01, 0.02), (3.0, 4.5), (120.0, 80.0)] {
            let spec = ReferenceCatalog::builtin()
                .lookup(CUSTOM_ID, Some(CustomSize::cm(w, h)))
                .expect("custom");
            assert_eq!((spec.physical_width, spec.physical_height), (w, h));
        }
    }

    #[test]
    fn custom_rejects_invalid_sizes() {
        let catalog = ReferenceCatalog::builtin();
        for (w, h) in [(0.0, 1.0), (1.0, -2.0), (f64::NAN, 1.0), (1.0, f64::INFINITY)] {
            assert!(matches!(
                catalog.lookup(CUSTOM_ID, Some(CustomSize::cm(w, h))),
                Err(ReferenceError::InvalidCustomSize { .. })
            ));
        }
        assert_eq!(
            catalog.lookup(CUSTOM_ID, None),
            Err(ReferenceError::MissingCustomSize)
        );
    }

    #[test]
    fn unknown_id_fails_without_custom_size() {
        assert_eq!(
            ReferenceCatalog::builtin().lookup("unknown", None),
            Err(ReferenceError::UnknownReference("unknown".into()))
        );
    }

    #[test]
    fn unknown_id_with_size_becomes_named_custom() {
        let spec = ReferenceCatalog::builtin()
            .lookup("my-ruler", Some(CustomSize::cm(30.0, 3.0)))
            .expect("named custom");
        assert_eq!(spec.id, "my-ruler");
        assert_eq!(spec.physical_width, 30.0);
    }

    #[test]
    fn unit_conversion() {
        assert_relative_eq!(Unit::In.convert(1.0, Unit::Cm), 2.54);
        assert_relative_eq!(Unit::Cm.convert(8.56, Unit::Mm), 85.6, epsilon = 1e-9);
        assert_relative_eq!(Unit::Mm.convert(25.4, Unit::In), 1.0, epsilon = 1e-12);

        let card = ReferenceCatalog::builtin()
            .lookup("credit-card", None)
            .expect("card")
            .to_unit(Unit::Mm);
        assert_eq!(card.unit, Unit::Mm);
        assert_relative_eq!(card.physical_height, 53.98, epsilon = 1e-9);
    }

    #[test]
    fn unit_parses_common_spellings() {
        assert_eq!("CM".parse::<Unit>(), Ok(Unit::Cm));
        assert_eq!("inches".parse::<Unit>(), Ok(Unit::In));
        assert!("ft".parse::<Unit>().is_err());
    }
}
