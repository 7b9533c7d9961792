use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a `FieldSpec` plays in a compiled scoring query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// The field's current value, parameterised by periodicity.
    Current,
    /// The field's change over the lookback window; contributes to a score group.
    Change,
    /// A normalized score over one group of change fields.
    Score,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Current => f.write_str("current"),
            FieldKind::Change => f.write_str("change"),
            FieldKind::Score => f.write_str("score"),
        }
    }
}

/// Sign convention of a change field: whether a rise is good (`Positive`) or bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Side {
    Positive,
    Negative,
}

impl Side {
    pub fn sign(self) -> Decimal {
        match self {
            Side::Positive => Decimal::ONE,
            Side::Negative => Decimal::NEGATIVE_ONE,
        }
    }
}

impl TryFrom<i64> for Side {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Side::Positive),
            -1 => Ok(Side::Negative),
            other => Err(format!("side must be +1 or -1, got {other}")),
        }
    }
}

impl From<Side> for i64 {
    fn from(side: Side) -> Self {
        match side {
            Side::Positive => 1,
            Side::Negative => -1,
        }
    }
}

/// Reporting periodicity of fundamental fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Periodicity {
    #[serde(rename = "A", alias = "Annual", alias = "annual")]
    Annual,
    #[serde(rename = "S", alias = "Semi-Annual", alias = "semi_annual")]
    SemiAnnual,
    #[serde(rename = "Q", alias = "Quarterly", alias = "quarterly")]
    Quarterly,
}

impl Periodicity {
    /// The service's period-type code.
    pub fn code(self) -> &'static str {
        match self {
            Periodicity::Annual => "A",
            Periodicity::SemiAnnual => "S",
            Periodicity::Quarterly => "Q",
        }
    }

    /// Unit used for lookback offsets. Annual lookbacks are expressed in years.
    pub fn period_unit(self) -> &'static str {
        match self {
            Periodicity::Annual => "Y",
            other => other.code(),
        }
    }
}

/// Aggregation applied to a metric across a universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    #[default]
    Avg,
    Median,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub fn function_name(self) -> &'static str {
        match self {
            Aggregation::Avg => "avg",
            Aggregation::Median => "median",
            Aggregation::Sum => "sum",
            Aggregation::Min => "min",
            Aggregation::Max => "max",
            Aggregation::Count => "count",
        }
    }
}
