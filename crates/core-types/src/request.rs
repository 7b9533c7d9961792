use crate::expression::Expression;
use std::fmt;

/// Label of the synthetic row built from requests with no bucket filter.
pub const ALL_LABEL: &str = "All";

/// Which part of a classification a request covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selection {
    /// One bucket: the universe is filtered to `classification == label`.
    Bucket(String),
    /// No bucket filter at all; feeds the synthetic "All" row.
    All,
    /// One request grouped by the classification expression; one result row per bucket.
    Grouped,
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::Bucket(label) => f.write_str(label),
            Selection::All => f.write_str(ALL_LABEL),
            Selection::Grouped => f.write_str("Grouped"),
        }
    }
}

/// Where a request came from in the fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// Position of the descriptor in its batch.
    pub index: usize,
    /// Name of the classification axis, e.g. "Maturity Bucket".
    pub classification: String,
    pub selection: Selection,
    pub universe_name: String,
    pub universe_label: String,
    pub metrics: Vec<String>,
    pub offset: String,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {}={} universe='{}' metrics=[{}] offset={}",
            self.index,
            self.classification,
            self.selection,
            self.universe_label,
            self.metrics.join(","),
            self.offset
        )
    }
}

/// One independent sub-query of a batch. Built once, submitted once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    label: String,
    universe: Expression,
    bindings: Vec<(String, Expression)>,
    fields: Vec<(String, Expression)>,
    provenance: Provenance,
}

impl RequestDescriptor {
    pub fn new(
        label: impl Into<String>,
        universe: Expression,
        fields: Vec<(String, Expression)>,
        provenance: Provenance,
    ) -> Self {
        Self {
            label: label.into(),
            universe,
            bindings: Vec::new(),
            fields,
            provenance,
        }
    }

    /// Adds `let` bindings that the requested fields may reference by name.
    pub fn with_bindings(mut self, bindings: Vec<(String, Expression)>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn universe(&self) -> &Expression {
        &self.universe
    }

    pub fn bindings(&self) -> &[(String, Expression)] {
        &self.bindings
    }

    pub fn fields(&self) -> &[(String, Expression)] {
        &self.fields
    }

    /// The query text sent for this request: optional `let(...)` block, then `get(...)`.
    pub fn query(&self) -> String {
        let mut out = String::new();
        if !self.bindings.is_empty() {
            out.push_str("let(");
            for (name, expression) in &self.bindings {
                out.push_str(&format!("{name}={expression};"));
            }
            out.push(')');
        }
        let items: Vec<String> = self
            .fields
            .iter()
            .map(|(name, expression)| format!("{expression} as {name}"))
            .collect();
        out.push_str(&format!("get({})", items.join(",")));
        out
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn provenance() -> Provenance {
        Provenance {
            index: 3,
            classification: "Maturity Bucket".to_string(),
            selection: Selection::Bucket("0-5".to_string()),
            universe_name: "Sector".to_string(),
            universe_label: "Industrials".to_string(),
            metrics: vec!["OAS".to_string()],
            offset: "current".to_string(),
        }
    }

    #[test]
    fn query_renders_bindings_then_fields() {
        let descriptor = RequestDescriptor::new(
            "Industrials",
            Expression::call("members", vec![Expression::text("IDX")]),
            vec![(
                "#score_filtered".to_string(),
                Expression::reference("#score").gt(Expression::number(dec!(0))),
            )],
            provenance(),
        )
        .with_bindings(vec![(
            "#score".to_string(),
            Expression::reference("#a") / Expression::number(dec!(2)),
        )]);

        assert_eq!(
            descriptor.query(),
            "let(#score=#a/2;)get(#score>0 as #score_filtered)"
        );
    }

    #[test]
    fn query_without_bindings_is_a_plain_get() {
        let descriptor = RequestDescriptor::new(
            "Industrials",
            Expression::reference("UNIV"),
            vec![("OAS".to_string(), Expression::formula("SPREAD()"))],
            provenance(),
        );
        assert_eq!(descriptor.query(), "get(SPREAD() as OAS)");
    }

    #[test]
    fn provenance_display_names_every_coordinate() {
        let text = provenance().to_string();
        assert_eq!(
            text,
            "#3 Maturity Bucket=0-5 universe='Industrials' metrics=[OAS] offset=current"
        );
    }
}
