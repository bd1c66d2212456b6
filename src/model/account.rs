//! Account record schema.
//!
//! The field set is closed and ordered. A [`Record`] stores one optional
//! value per declared field, so it can never carry a column outside the
//! schema.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::revenue::AnnualRevenue;
use super::row::Row;
use crate::error::{Error, Result};

/// Number of declared fields.
pub const FIELD_COUNT: usize = 15;

/// Declared account fields, in file column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum AccountField {
    Id,
    Name,
    BillingStreet,
    BillingCity,
    BillingCountry,
    BillingPostalCode,
    BillingState,
    ShippingStreet,
    ShippingCity,
    ShippingCountry,
    ShippingPostalCode,
    ShippingState,
    NumberOfEmployees,
    Phone,
    AnnualRevenue,
}

impl AccountField {
    pub const ALL: [Self; FIELD_COUNT] = [
        Self::Id,
        Self::Name,
        Self::BillingStreet,
        Self::BillingCity,
        Self::BillingCountry,
        Self::BillingPostalCode,
        Self::BillingState,
        Self::ShippingStreet,
        Self::ShippingCity,
        Self::ShippingCountry,
        Self::ShippingPostalCode,
        Self::ShippingState,
        Self::NumberOfEmployees,
        Self::Phone,
        Self::AnnualRevenue,
    ];

    /// API and column name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::BillingStreet => "BillingStreet",
            Self::BillingCity => "BillingCity",
            Self::BillingCountry => "BillingCountry",
            Self::BillingPostalCode => "BillingPostalCode",
            Self::BillingState => "BillingState",
            Self::ShippingStreet => "ShippingStreet",
            Self::ShippingCity => "ShippingCity",
            Self::ShippingCountry => "ShippingCountry",
            Self::ShippingPostalCode => "ShippingPostalCode",
            Self::ShippingState => "ShippingState",
            Self::NumberOfEmployees => "NumberOfEmployees",
            Self::Phone => "Phone",
            Self::AnnualRevenue => "AnnualRevenue",
        }
    }

    /// Position in the declared order.
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Declared header, in order.
    #[must_use]
    pub fn header() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::as_str).collect()
    }
}

impl fmt::Display for AccountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountField {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown account field: {s}"))
    }
}

/// The remote operation a record is being prepared for.
///
/// Determines which fields are mandatory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upsert,
    Create,
    Delete,
}

impl Operation {
    #[must_use]
    pub const fn mandatory_fields(&self) -> &'static [AccountField] {
        match self {
            Self::Upsert | Self::Create => &[AccountField::Name],
            Self::Delete => &[AccountField::Id],
        }
    }
}

/// A single stored field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Revenue(AnnualRevenue),
}

/// Soft field problem: the value was kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldWarning {
    pub line: u64,
    pub field: AccountField,
    pub value: String,
}

impl fmt::Display for FieldWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} value '{}' at line {} is not a number; passing it through unchanged",
            self.field, self.value, self.line
        )
    }
}

/// A normalized account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    values: [Option<FieldValue>; FIELD_COUNT],
}

impl Record {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, field: AccountField) -> Option<&FieldValue> {
        self.values[field.index()].as_ref()
    }

    /// Text of a non-revenue field.
    #[must_use]
    pub fn text(&self, field: AccountField) -> Option<&str> {
        match self.get(field) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Remote-assigned id.
    #[must_use]
    pub fn identity(&self) -> Option<&str> {
        self.text(AccountField::Id)
    }

    /// Short label for diagnostics: the id, else the name.
    #[must_use]
    pub fn label(&self) -> String {
        self.identity()
            .or_else(|| self.text(AccountField::Name))
            .unwrap_or("<unnamed>")
            .to_string()
    }

    /// Store a raw value, normalizing it for its field.
    ///
    /// Empty text clears the field. Returns a warning when AnnualRevenue is
    /// not numeric; the raw text is kept in that case.
    pub fn set(&mut self, line: u64, field: AccountField, raw: &str) -> Option<FieldWarning> {
        if raw.is_empty() {
            self.values[field.index()] = None;
            return None;
        }
        if field == AccountField::AnnualRevenue {
            let revenue = AnnualRevenue::parse(raw);
            let warning = (!revenue.is_numeric()).then(|| FieldWarning {
                line,
                field,
                value: raw.to_string(),
            });
            self.values[field.index()] = Some(FieldValue::Revenue(revenue));
            return warning;
        }
        self.values[field.index()] = Some(FieldValue::Text(raw.to_string()));
        None
    }

    /// Convert a decoded file row into a record for `op`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaMismatch` for overflow/underflow rows and
    /// `FieldFormat` when a field mandatory for `op` is empty. A malformed
    /// AnnualRevenue is only a warning.
    pub fn parse_row(line: u64, row: &Row, op: Operation) -> Result<(Self, Vec<FieldWarning>)> {
        if !row.overflow().is_empty() {
            return Err(Error::SchemaMismatch {
                line,
                detail: format!("{} value(s) beyond the declared columns", row.overflow().len()),
            });
        }
        if !row.missing().is_empty() {
            let missing: Vec<&str> = row.missing().iter().map(AccountField::as_str).collect();
            return Err(Error::SchemaMismatch {
                line,
                detail: format!("missing value(s) for {}", missing.join(", ")),
            });
        }

        let (record, warnings) = Self::from_row_lenient(line, row);
        for field in op.mandatory_fields() {
            if record.get(*field).is_none() {
                return Err(Error::FieldFormat {
                    line,
                    field: field.to_string(),
                    value: String::new(),
                });
            }
        }
        Ok((record, warnings))
    }

    /// Convert a row without structural checks.
    ///
    /// Used for data coming back from the remote store, which is written
    /// through best-effort.
    #[must_use]
    pub fn from_row_lenient(line: u64, row: &Row) -> (Self, Vec<FieldWarning>) {
        let mut record = Self::new();
        let mut warnings = Vec::new();
        for field in AccountField::ALL {
            if let Some(raw) = row.get(field) {
                warnings.extend(record.set(line, field, raw));
            }
        }
        (record, warnings)
    }

    /// Disk form: AnnualRevenue grouped.
    #[must_use]
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        for field in AccountField::ALL {
            let value = match self.get(field) {
                Some(FieldValue::Text(s)) => s.clone(),
                Some(FieldValue::Revenue(r)) => r.to_grouped(),
                None => String::new(),
            };
            row.insert(field, value);
        }
        row
    }

    /// Payload form: AnnualRevenue ungrouped, declared order.
    #[must_use]
    pub fn to_wire_values(&self) -> Vec<String> {
        AccountField::ALL
            .iter()
            .map(|field| match self.get(*field) {
                Some(FieldValue::Text(s)) => s.clone(),
                Some(FieldValue::Revenue(r)) => r.to_wire(),
                None => String::new(),
            })
            .collect()
    }

    /// Payload form for single-record create: present fields only, no id.
    #[must_use]
    pub fn to_wire_fields(&self) -> BTreeMap<String, String> {
        AccountField::ALL
            .iter()
            .filter(|f| **f != AccountField::Id)
            .filter_map(|field| {
                let value = match self.get(*field)? {
                    FieldValue::Text(s) => s.clone(),
                    FieldValue::Revenue(r) => r.to_wire(),
                };
                Some((field.as_str().to_string(), value))
            })
            .collect()
    }
}
