use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

use super::{OrganizationId, ShipmentId, ValidationError};

/// Custody stages in forward order. A shipment with no stage yet has
/// `current_status = None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    SentFromFactory,
    ShippedFromFf,
    Delivered,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::SentFromFactory, Stage::ShippedFromFf, Stage::Delivered];

    /// The single stage reachable from `current`, or `None` once delivered.
    pub fn next(current: Option<Stage>) -> Option<Stage> {
        match current {
            None => Some(Stage::SentFromFactory),
            Some(Stage::SentFromFactory) => Some(Stage::ShippedFromFf),
            Some(Stage::ShippedFromFf) => Some(Stage::Delivered),
            Some(Stage::Delivered) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Delivered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::SentFromFactory => "SENT_FROM_FACTORY",
            Stage::ShippedFromFf => "SHIPPED_FROM_FF",
            Stage::Delivered => "DELIVERED",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownStage(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteType {
    #[serde(rename = "DIRECT")]
    Direct,
    #[serde(rename = "VIA_FF")]
    ViaFf,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Direct => "DIRECT",
            RouteType::ViaFf => "VIA_FF",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DIRECT" => Ok(RouteType::Direct),
            "VIA_FF" => Ok(RouteType::ViaFf),
            other => Err(ValidationError::UnknownRouteType(other.to_string())),
        }
    }
}

/// Size label to positive quantity. Absent labels mean "not present";
/// explicit zero entries are rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, i64>")]
pub struct SizeQuantities(BTreeMap<String, u32>);

impl SizeQuantities {
    pub fn pieces(&self) -> u64 {
        self.0.values().map(|&q| u64::from(q)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, label: &str) -> Option<u32> {
        self.0.get(label).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(label, &q)| (label.as_str(), q))
    }
}

impl TryFrom<BTreeMap<String, i64>> for SizeQuantities {
    type Error = ValidationError;

    fn try_from(raw: BTreeMap<String, i64>) -> Result<Self, Self::Error> {
        let mut sizes = BTreeMap::new();
        for (label, quantity) in raw {
            let label = label.trim().to_string();
            if label.is_empty() {
                return Err(ValidationError::EmptySizeLabel);
            }
            if quantity < 1 {
                return Err(ValidationError::SizeQuantity { label, quantity });
            }
            let quantity =
                u32::try_from(quantity).map_err(|_| ValidationError::SizeOverflow { label: label.clone() })?;
            if sizes.contains_key(&label) {
                return Err(ValidationError::DuplicateSizeLabel(label));
            }
            sizes.insert(label, quantity);
        }
        Ok(Self(sizes))
    }
}

impl<const N: usize> TryFrom<[(&str, i64); N]> for SizeQuantities {
    type Error = ValidationError;

    fn try_from(pairs: [(&str, i64); N]) -> Result<Self, Self::Error> {
        let raw: BTreeMap<String, i64> = pairs
            .into_iter()
            .map(|(label, q)| (label.to_string(), q))
            .collect();
        Self::try_from(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub model: String,
    pub color: String,
    pub sizes: SizeQuantities,
}

impl Item {
    pub fn pieces(&self) -> u64 {
        self.sizes.pieces()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bag {
    pub bag_id: String,
    #[serde(default)]
    pub items: Vec<Item>,
}

impl Bag {
    pub fn pieces(&self) -> u64 {
        self.items.iter().map(Item::pieces).sum()
    }
}

/// Checks bag ids are present and unique and that every item carries sizes.
pub fn validate_bags(bags: &[Bag]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for bag in bags {
        if bag.bag_id.trim().is_empty() {
            return Err(ValidationError::EmptyBagId);
        }
        if !seen.insert(bag.bag_id.as_str()) {
            return Err(ValidationError::DuplicateBagId(bag.bag_id.clone()));
        }
        for item in &bag.items {
            if item.model.trim().is_empty() {
                return Err(ValidationError::EmptyField { field: "model" });
            }
            if item.sizes.is_empty() {
                return Err(ValidationError::EmptyItem {
                    bag_id: bag.bag_id.clone(),
                });
            }
        }
    }
    Ok(())
}

pub(crate) fn require_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        Err(ValidationError::EmptyField { field })
    } else {
        Ok(trimmed.to_string())
    }
}

/// Derived counts, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub bags: u32,
    pub pieces: u64,
}

impl Totals {
    pub fn of(bags: &[Bag]) -> Self {
        Self {
            bags: u32::try_from(bags.len()).unwrap_or(u32::MAX),
            pieces: bags.iter().map(Bag::pieces).sum(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    pub organization_id: OrganizationId,
    pub supplier: String,
    pub warehouse: String,
    pub route_type: RouteType,
    pub shipment_date: Option<NaiveDate>,
    pub current_status: Option<Stage>,
    pub bags: Vec<Bag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    pub fn totals(&self) -> Totals {
        Totals::of(&self.bags)
    }
}
