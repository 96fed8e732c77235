// Query-string filtering and ordering
//
// Parameters follow the `field__lookup=value` convention (`driver_name__icontains=bo`,
// `create_time__gte=2024-01-01`). A bare `field=value` is an exact match.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};

use crate::error::{ApiError, FieldErrors};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Text,
    DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Exact,
    IExact,
    Contains,
    IContains,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Lookup {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "exact" => Some(Lookup::Exact),
            "iexact" => Some(Lookup::IExact),
            "contains" => Some(Lookup::Contains),
            "icontains" => Some(Lookup::IContains),
            "gt" => Some(Lookup::Gt),
            "gte" => Some(Lookup::Gte),
            "lt" => Some(Lookup::Lt),
            "lte" => Some(Lookup::Lte),
            _ => None,
        }
    }
}

const TEXT_LOOKUPS: &[Lookup] = &[
    Lookup::Exact,
    Lookup::IExact,
    Lookup::Contains,
    Lookup::IContains,
];
const INT_LOOKUPS: &[Lookup] = &[
    Lookup::Exact,
    Lookup::Gt,
    Lookup::Gte,
    Lookup::Lt,
    Lookup::Lte,
];
const RANGE_LOOKUPS: &[Lookup] = &[Lookup::Gt, Lookup::Gte, Lookup::Lt, Lookup::Lte];

/// A filterable column. `name` is both the query parameter and the column name.
#[derive(Debug)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
    pub lookups: &'static [Lookup],
}

const fn text(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::Text,
        lookups: TEXT_LOOKUPS,
    }
}

const fn datetime(name: &'static str) -> FieldDef {
    FieldDef {
        name,
        kind: FieldKind::DateTime,
        lookups: RANGE_LOOKUPS,
    }
}

const ID: FieldDef = FieldDef {
    name: "id",
    kind: FieldKind::Int,
    lookups: INT_LOOKUPS,
};

/// Columns accepted by `ordering`
pub const ORDERING_FIELDS: &[&str] = &["id", "create_time", "update_time"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    DateTime(NaiveDateTime),
}

impl Value {
    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

/// Implemented by records the in-memory store evaluates predicates against
pub trait Filterable {
    fn id(&self) -> i64;
    fn field_value(&self, field: &str) -> Option<Value>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: &'static str,
    pub lookup: Lookup,
    pub value: Value,
}

impl Predicate {
    pub fn matches<R: Filterable>(&self, record: &R) -> bool {
        let Some(actual) = record.field_value(self.field) else {
            return false;
        };

        match (self.lookup, &actual, &self.value) {
            (Lookup::Exact, a, b) => a == b,
            (Lookup::IExact, Value::Text(a), Value::Text(b)) => a.to_lowercase() == b.to_lowercase(),
            (Lookup::Contains, Value::Text(a), Value::Text(b)) => a.contains(b.as_str()),
            (Lookup::IContains, Value::Text(a), Value::Text(b)) => {
                a.to_lowercase().contains(&b.to_lowercase())
            }
            (Lookup::Gt, a, b) => a.compare(b) == Some(Ordering::Greater),
            (Lookup::Gte, a, b) => matches!(a.compare(b), Some(Ordering::Greater | Ordering::Equal)),
            (Lookup::Lt, a, b) => a.compare(b) == Some(Ordering::Less),
            (Lookup::Lte, a, b) => matches!(a.compare(b), Some(Ordering::Less | Ordering::Equal)),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub field: &'static str,
    pub descending: bool,
}

/// Parsed filters plus ordering for one request
#[derive(Debug, Clone, PartialEq)]
pub struct Criteria {
    pub predicates: Vec<Predicate>,
    pub ordering: Vec<OrderKey>,
}

impl Default for Criteria {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            ordering: default_ordering(),
        }
    }
}

fn default_ordering() -> Vec<OrderKey> {
    vec![OrderKey {
        field: "id",
        descending: true,
    }]
}

impl Criteria {
    pub fn matches<R: Filterable>(&self, record: &R) -> bool {
        self.predicates.iter().all(|p| p.matches(record))
    }

    /// Ordering with `id` as the final tie-breaker
    pub fn compare<R: Filterable>(&self, a: &R, b: &R) -> Ordering {
        for key in &self.ordering {
            let ord = match (a.field_value(key.field), b.field_value(key.field)) {
                (Some(x), Some(y)) => x.compare(&y).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            };
            let ord = if key.descending { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id().cmp(&b.id())
    }
}

#[derive(Debug)]
pub struct FilterSet {
    pub fields: &'static [FieldDef],
}

pub const DRIVER_FILTERS: FilterSet = FilterSet {
    fields: &[
        ID,
        text("driver_name"),
        text("license_plate"),
        text("contact"),
        text("creater"),
        datetime("create_time"),
        datetime("update_time"),
    ],
};

pub const DISPATCH_LIST_FILTERS: FilterSet = FilterSet {
    fields: &[
        ID,
        text("driver_name"),
        text("dn_code"),
        text("contact"),
        text("creater"),
        datetime("create_time"),
        datetime("update_time"),
    ],
};

impl FilterSet {
    /// Turn raw query pairs into criteria. Unknown parameters are ignored,
    /// bad values for known ones are reported per parameter.
    pub fn parse(&self, params: &[(String, String)]) -> Result<Criteria, ApiError> {
        let mut predicates = Vec::new();
        let mut ordering = Vec::new();
        let mut errors = FieldErrors::new();

        for (key, raw) in params {
            if key == "ordering" {
                ordering.extend(parse_ordering(raw));
                continue;
            }

            let (name, suffix) = match key.split_once("__") {
                Some((name, suffix)) => (name, suffix),
                None => (key.as_str(), "exact"),
            };
            let Some(field) = self.fields.iter().find(|f| f.name == name) else {
                continue;
            };
            let Some(lookup) = Lookup::from_suffix(suffix).filter(|l| field.lookups.contains(l))
            else {
                continue;
            };
            // Empty values are treated as "no filter"
            if raw.is_empty() {
                continue;
            }

            match parse_value(field.kind, raw) {
                Some(value) => predicates.push(Predicate {
                    field: field.name,
                    lookup,
                    value,
                }),
                None => {
                    let message = match field.kind {
                        FieldKind::Int => "Enter a number.",
                        FieldKind::DateTime => "Enter a valid date/time.",
                        FieldKind::Text => "Enter a valid value.",
                    };
                    errors
                        .entry(key.clone())
                        .or_default()
                        .push(message.to_string());
                }
            }
        }

        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        if ordering.is_empty() {
            ordering = default_ordering();
        }

        Ok(Criteria {
            predicates,
            ordering,
        })
    }
}

fn parse_ordering(raw: &str) -> Vec<OrderKey> {
    raw.split(',')
        .map(str::trim)
        .filter_map(|term| {
            let (descending, name) = match term.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, term),
            };
            ORDERING_FIELDS
                .iter()
                .find(|f| **f == name)
                .map(|field| OrderKey {
                    field: *field,
                    descending,
                })
        })
        .collect()
}

fn parse_value(kind: FieldKind, raw: &str) -> Option<Value> {
    match kind {
        FieldKind::Int => raw.trim().parse().ok().map(Value::Int),
        FieldKind::Text => Some(Value::Text(raw.to_string())),
        FieldKind::DateTime => parse_datetime(raw.trim()).map(Value::DateTime),
    }
}

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
