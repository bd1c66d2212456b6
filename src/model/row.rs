//! Raw decoded rows.

use std::collections::BTreeMap;

use super::account::AccountField;

/// One decoded line: column values keyed by declared field.
///
/// `overflow` holds values beyond the last header column; `missing` lists
/// header columns the line had no value for. A row is well-formed only when
/// both are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: BTreeMap<AccountField, String>,
    overflow: Vec<String>,
    missing: Vec<AccountField>,
}

impl Row {
    /// Create an empty, well-formed row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from raw positional values laid against `columns`.
    #[must_use]
    pub fn from_values<'v>(
        columns: &[AccountField],
        values: impl IntoIterator<Item = &'v str>,
    ) -> Self {
        let mut row = Self::new();
        let mut values = values.into_iter();
        for &column in columns {
            match values.next() {
                Some(value) => {
                    row.values.insert(column, value.to_string());
                }
                None => row.missing.push(column),
            }
        }
        row.overflow = values.map(str::to_string).collect();
        row
    }

    /// Value for `field`, if present.
    #[must_use]
    pub fn get(&self, field: AccountField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    /// Set a column value.
    pub fn insert(&mut self, field: AccountField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    /// Values that did not map onto a header column.
    #[must_use]
    pub fn overflow(&self) -> &[String] {
        &self.overflow
    }

    /// Header columns with no corresponding value.
    #[must_use]
    pub fn missing(&self) -> &[AccountField] {
        &self.missing
    }

    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.overflow.is_empty() && self.missing.is_empty()
    }

    /// Values in declared field order, empty for absent columns.
    #[must_use]
    pub fn ordered_values(&self) -> Vec<&str> {
        AccountField::ALL
            .iter()
            .map(|f| self.get(*f).unwrap_or(""))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_values_exact() {
        let columns = [AccountField::Id, AccountField::Name];
        let row = Row::from_values(&columns, ["001", "Acme"]);
        assert!(row.is_well_formed());
        assert_eq!(row.get(AccountField::Name), Some("Acme"));
    }

    #[test]
    fn test_from_values_overflow_and_underflow() {
        let columns = [AccountField::Id, AccountField::Name];
        let over = Row::from_values(&columns, ["001", "Acme", "extra"]);
        assert_eq!(over.overflow(), ["extra".to_string()]);

        let under = Row::from_values(&columns, ["001"]);
        assert_eq!(under.missing(), [AccountField::Name]);
        assert!(!under.is_well_formed());
    }
}
