use crate::error::CoreError;
use crate::expression::Expression;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A service formula with named `{placeholder}` slots.
///
/// The source text is split into literal and placeholder segments once, at load time.
/// Rendering only substitutes parameter values into the slots; the formula text itself is
/// never interpreted. `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct FormulaTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl FormulaTemplate {
    pub fn parse(source: &str) -> Result<Self, CoreError> {
        let invalid = |reason: &str| CoreError::InvalidTemplate {
            template: source.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for next in chars.by_ref() {
                        if next == '}' {
                            closed = true;
                            break;
                        }
                        name.push(next);
                    }
                    if !closed {
                        return Err(invalid("unterminated placeholder"));
                    }
                    if name.is_empty() {
                        return Err(invalid("placeholders must be named"));
                    }
                    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
                        return Err(invalid(&format!("invalid placeholder name '{name}'")));
                    }
                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(name));
                }
                '}' => return Err(invalid("unmatched '}'")),
                other => text.push(other),
            }
        }
        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance (repeats included).
    pub fn placeholders(&self) -> impl Iterator<Item = &str> + '_ {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Slot(name) => Some(name.as_str()),
            Segment::Text(_) => None,
        })
    }

    /// Fails if the template uses a placeholder outside `allowed`.
    pub fn check_placeholders(&self, allowed: &[&str]) -> Result<(), CoreError> {
        match self.placeholders().find(|name| !allowed.contains(name)) {
            Some(name) => Err(CoreError::UnknownPlaceholder {
                template: self.source.clone(),
                placeholder: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn render(&self, params: &TemplateParams) -> Result<Expression, CoreError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => {
                    let value = params.get(name).ok_or_else(|| CoreError::UnknownPlaceholder {
                        template: self.source.clone(),
                        placeholder: name.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(Expression::Formula(out))
    }
}

impl FromStr for FormulaTemplate {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FormulaTemplate {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl fmt::Display for FormulaTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Values substituted into a `FormulaTemplate`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateParams {
    values: BTreeMap<String, String>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.values.insert(name.into(), value.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_named_placeholders() {
        let template = FormulaTemplate::parse("NET_DEBT(fpt={fpt},fpo=-{lookback}{period})").unwrap();
        let params = TemplateParams::new()
            .with("fpt", "Q")
            .with("lookback", 4)
            .with("period", "Q");
        let rendered = template.render(&params).unwrap();
        assert_eq!(rendered.to_string(), "NET_DEBT(fpt=Q,fpo=-4Q)");
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec!["fpt", "lookback", "period"]
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        let template = FormulaTemplate::parse("x{{1}}{fpt}").unwrap();
        let rendered = template.render(&TemplateParams::new().with("fpt", "A")).unwrap();
        assert_eq!(rendered.to_string(), "x{1}A");
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(matches!(
            FormulaTemplate::parse("SPREAD({fpt"),
            Err(CoreError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            FormulaTemplate::parse("SPREAD(fpt})"),
            Err(CoreError::InvalidTemplate { .. })
        ));
        assert!(matches!(
            FormulaTemplate::parse("SPREAD({})"),
            Err(CoreError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn missing_parameter_is_an_unknown_placeholder() {
        let template = FormulaTemplate::parse("YIELD(dates={offset})").unwrap();
        let err = template.render(&TemplateParams::new()).unwrap_err();
        assert_eq!(
            err,
            CoreError::UnknownPlaceholder {
                template: "YIELD(dates={offset})".to_string(),
                placeholder: "offset".to_string(),
            }
        );
        assert!(template.check_placeholders(&["fpt"]).is_err());
        assert!(template.check_placeholders(&["offset"]).is_ok());
    }
}
