use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    str::FromStr,
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

pub type Expressions = Vec<Expression>;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Expression {
    key: String,
    operator: Operator,
    #[serde(default)]
    values: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
}

/// Selects a set of objects (nodes, pods) by their labels.
///
/// Selectors are usually written in the string form accepted by `kubectl -l`,
/// e.g. `worker=true,zone in (a, b),!cordoned`.
#[derive(Clone, Debug, Eq, PartialEq, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    match_labels: Option<Map>,
    match_expressions: Option<Expressions>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty requirement in selector")]
    EmptyRequirement,

    #[error("invalid label key: {0:?}")]
    InvalidKey(String),

    #[error("invalid label value: {0:?}")]
    InvalidValue(String),

    #[error("unbalanced parentheses in selector")]
    Unbalanced,

    #[error("unknown set operator in requirement: {0:?}")]
    UnknownOperator(String),
}

// === Selector ===

impl Selector {
    pub fn from_expressions(exprs: Expressions) -> Self {
        Self {
            match_labels: None,
            match_expressions: Some(exprs),
        }
    }

    pub fn from_map(map: Map) -> Self {
        Self {
            match_labels: Some(map),
            match_expressions: None,
        }
    }

    /// Indicates whether this selector matches all objects.
    pub fn selects_all(&self) -> bool {
        self.match_labels.as_ref().map_or(true, |m| m.is_empty())
            && self.match_expressions.as_ref().map_or(true, |e| e.is_empty())
    }

    pub fn matches(&self, labels: &Labels) -> bool {
        for expr in self.match_expressions.iter().flatten() {
            if !expr.matches(labels.as_ref()) {
                return false;
            }
        }

        if let Some(match_labels) = self.match_labels.as_ref() {
            for (k, v) in match_labels.iter() {
                if labels.0.get(k) != Some(v) {
                    return false;
                }
            }
        }

        true
    }
}

impl FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut match_labels = Map::new();
        let mut exprs = Expressions::new();

        if s.trim().is_empty() {
            return Ok(Self::default());
        }

        for req in split_requirements(s)? {
            let req = req.trim();
            if req.is_empty() {
                return Err(ParseError::EmptyRequirement);
            }

            if let Some(key) = req.strip_prefix('!') {
                exprs.push(Expression::new(
                    parse_key(key)?,
                    Operator::DoesNotExist,
                    None,
                ));
            } else if let Some(open) = req.find('(') {
                exprs.push(parse_set_requirement(req, open)?);
            } else if let Some((k, v)) = req.split_once("!=") {
                let value = parse_value(v)?;
                exprs.push(Expression::new(parse_key(k)?, Operator::NotIn, Some(value)));
            } else if let Some((k, v)) = req.split_once("==").or_else(|| req.split_once('=')) {
                match_labels.insert(parse_key(k)?, parse_value(v)?);
            } else {
                exprs.push(Expression::new(parse_key(req)?, Operator::Exists, None));
            }
        }

        Ok(Self {
            match_labels: Some(match_labels).filter(|m| !m.is_empty()),
            match_expressions: Some(exprs).filter(|e| !e.is_empty()),
        })
    }
}

impl std::iter::FromIterator<(String, String)> for Selector {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Selector {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        Self::from_map(
            iter.into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

impl std::iter::FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self::from_expressions(iter.into_iter().collect())
    }
}

/// Splits a selector on the commas that separate requirements, ignoring
/// commas nested in a set requirement's value list.
fn split_requirements(s: &str) -> Result<Vec<&str>, ParseError> {
    let mut reqs = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.checked_sub(1).ok_or(ParseError::Unbalanced)?,
            ',' if depth == 0 => {
                reqs.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ParseError::Unbalanced);
    }
    reqs.push(&s[start..]);
    Ok(reqs)
}

fn parse_set_requirement(req: &str, open: usize) -> Result<Expression, ParseError> {
    let values = req[open + 1..]
        .trim_end()
        .strip_suffix(')')
        .ok_or(ParseError::Unbalanced)?;

    let mut head = req[..open].split_whitespace();
    let key = head.next().ok_or(ParseError::EmptyRequirement)?;
    let op = head.next().unwrap_or_default();
    if let Some(extra) = head.next() {
        return Err(ParseError::UnknownOperator(extra.to_string()));
    }
    let operator = match op {
        "in" => Operator::In,
        "notin" => Operator::NotIn,
        op => return Err(ParseError::UnknownOperator(op.to_string())),
    };

    let values = values
        .split(',')
        .map(parse_value)
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(Expression {
        key: parse_key(key)?,
        operator,
        values,
    })
}

fn parse_key(key: &str) -> Result<String, ParseError> {
    let key = key.trim();
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'));
    if !valid {
        return Err(ParseError::InvalidKey(key.to_string()));
    }
    Ok(key.to_string())
}

fn parse_value(value: &str) -> Result<String, ParseError> {
    let value = value.trim();
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(ParseError::InvalidValue(value.to_string()));
    }
    Ok(value.to_string())
}

// === Labels ===

impl Labels {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl From<Option<Map>> for Labels {
    #[inline]
    fn from(labels: Option<Map>) -> Self {
        labels.unwrap_or_default().into()
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

// === Expression ===

impl Expression {
    pub fn new(
        key: impl Into<String>,
        operator: Operator,
        values: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().collect(),
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self.operator {
            Operator::In => labels
                .get(&self.key)
                .map_or(false, |v| self.values.contains(v)),
            Operator::NotIn => labels
                .get(&self.key)
                .map_or(true, |v| !self.values.contains(v)),
            Operator::Exists => labels.contains_key(&self.key),
            Operator::DoesNotExist => !labels.contains_key(&self.key),
        }
    }
}
