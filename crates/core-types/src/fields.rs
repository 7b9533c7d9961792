use crate::enums::{FieldKind, Side};
use crate::template::FormulaTemplate;
use rust_decimal::Decimal;

/// One named entry of the scoring configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    /// Service formula; `None` for `Score` specs, whose definition is derived.
    pub template: Option<FormulaTemplate>,
    pub kind: FieldKind,
    pub weight: Decimal,
    pub side: Side,
    /// Score group a `Change` field contributes to, or the group a `Score` spec declares.
    pub group: Option<String>,
}

impl FieldSpec {
    pub fn current(name: impl Into<String>, template: FormulaTemplate) -> Self {
        Self {
            name: name.into(),
            template: Some(template),
            kind: FieldKind::Current,
            weight: Decimal::ZERO,
            side: Side::Positive,
            group: None,
        }
    }

    pub fn change(
        name: impl Into<String>,
        template: FormulaTemplate,
        weight: Decimal,
        side: Side,
        group: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            template: Some(template),
            kind: FieldKind::Change,
            weight,
            side,
            group: Some(group.into()),
        }
    }

    /// Declares a score group. The spec's name is the group name.
    pub fn score(group: impl Into<String>) -> Self {
        let group = group.into();
        Self {
            name: group.clone(),
            template: None,
            kind: FieldKind::Score,
            weight: Decimal::ZERO,
            side: Side::Positive,
            group: Some(group),
        }
    }
}

/// The read-only, ordered scoring configuration handed to the compiler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldTable {
    specs: Vec<FieldSpec>,
}

impl FieldTable {
    pub fn new(specs: Vec<FieldSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[FieldSpec] {
        &self.specs
    }

    pub fn of_kind(&self, kind: FieldKind) -> impl Iterator<Item = &FieldSpec> + '_ {
        self.specs.iter().filter(move |spec| spec.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }
}

impl FromIterator<FieldSpec> for FieldTable {
    fn from_iter<I: IntoIterator<Item = FieldSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
