use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::error::SprocDbError;
use crate::types::RowValues;

/// Column metadata shared by every row of one result set.
#[derive(Debug, Clone, Default)]
pub struct ColumnNames {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl ColumnNames {
    #[must_use]
    pub fn new(names: Vec<String>) -> Arc<Self> {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            // first occurrence wins for duplicated column names
            index.entry(name.clone()).or_insert(i);
        }
        Arc::new(Self { names, index })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Index of a column, exact match first, then ASCII case-insensitive.
    #[must_use]
    pub fn position(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.index.get(column_name) {
            return Some(idx);
        }
        self.names
            .iter()
            .position(|col| col.eq_ignore_ascii_case(column_name))
    }
}

/// One decoded row, positioned under a result cursor and handed to a row mapper.
///
/// The typed getters fail with [`SprocDbError::MappingError`] so a mapper can use `?`:
/// ```rust
/// use sproc_middleware::prelude::*;
///
/// struct Customer { id: i64, name: String, email: Option<String> }
///
/// fn read_customer(row: &ProcRow) -> Result<Customer, SprocDbError> {
///     Ok(Customer {
///         id: row.get_i64(0)?,
///         name: row.get_str("CustomerName")?.to_string(),
///         email: row.get_optional_str("Email")?.map(str::to_string),
///     })
/// }
///
/// let row = ProcRow::new(
///     ColumnNames::new(vec!["CustomerId".into(), "CustomerName".into(), "Email".into()]),
///     vec![RowValues::Int(7), RowValues::Text("Ada".into()), RowValues::Null],
/// );
/// let customer = read_customer(&row).unwrap();
/// assert_eq!(customer.id, 7);
/// assert_eq!(customer.email, None);
/// # let _ = customer.name;
/// ```
#[derive(Debug, Clone)]
pub struct ProcRow {
    columns: Arc<ColumnNames>,
    values: Vec<RowValues>,
}

/// Column selector for the typed getters: a zero-based index or a column name.
pub trait ColumnIndex {
    fn resolve(&self, row: &ProcRow) -> Option<usize>;
    fn describe(&self) -> String;
}

impl ColumnIndex for usize {
    fn resolve(&self, row: &ProcRow) -> Option<usize> {
        (*self < row.values.len()).then_some(*self)
    }

    fn describe(&self) -> String {
        format!("column {self}")
    }
}

impl ColumnIndex for &str {
    fn resolve(&self, row: &ProcRow) -> Option<usize> {
        row.columns.position(self)
    }

    fn describe(&self) -> String {
        format!("column \"{self}\"")
    }
}

impl ProcRow {
    #[must_use]
    pub fn new(columns: Arc<ColumnNames>, values: Vec<RowValues>) -> Self {
        Self { columns, values }
    }

    #[must_use]
    pub fn columns(&self) -> &Arc<ColumnNames> {
        &self.columns
    }

    #[must_use]
    pub fn values(&self) -> &[RowValues] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<RowValues> {
        self.values
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value lookup by index or column name.
    #[must_use]
    pub fn get<I: ColumnIndex>(&self, idx: I) -> Option<&RowValues> {
        idx.resolve(self).and_then(|i| self.values.get(i))
    }

    fn value<I: ColumnIndex>(&self, idx: &I) -> Result<&RowValues, SprocDbError> {
        idx.resolve(self)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| SprocDbError::mapping(format!("{} not found", idx.describe())))
    }

    fn required<'a, I, T>(
        &'a self,
        idx: &I,
        expected: &str,
        convert: impl FnOnce(&'a RowValues) -> Option<T>,
    ) -> Result<T, SprocDbError>
    where
        I: ColumnIndex,
    {
        match self.optional(idx, expected, convert)? {
            Some(v) => Ok(v),
            None => Err(SprocDbError::mapping(format!(
                "{} is NULL, expected {expected}",
                idx.describe()
            ))),
        }
    }

    fn optional<'a, I, T>(
        &'a self,
        idx: &I,
        expected: &str,
        convert: impl FnOnce(&'a RowValues) -> Option<T>,
    ) -> Result<Option<T>, SprocDbError>
    where
        I: ColumnIndex,
    {
        let value = self.value(idx)?;
        if value.is_null() {
            return Ok(None);
        }
        convert(value).map(Some).ok_or_else(|| {
            SprocDbError::mapping(format!(
                "{} holds {}, expected {expected}",
                idx.describe(),
                value.kind()
            ))
        })
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not an integer.
    pub fn get_i64<I: ColumnIndex>(&self, idx: I) -> Result<i64, SprocDbError> {
        self.required(&idx, "integer", |v| v.as_int().copied())
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or does not fit in an `i32`.
    pub fn get_i32<I: ColumnIndex>(&self, idx: I) -> Result<i32, SprocDbError> {
        let wide = self.required(&idx, "integer", |v| v.as_int().copied())?;
        i32::try_from(wide).map_err(|_| {
            SprocDbError::mapping(format!("{} value {wide} overflows i32", idx.describe()))
        })
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not numeric.
    pub fn get_f64<I: ColumnIndex>(&self, idx: I) -> Result<f64, SprocDbError> {
        self.required(&idx, "float", RowValues::as_float)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not text.
    pub fn get_str<I: ColumnIndex>(&self, idx: I) -> Result<&str, SprocDbError> {
        self.required(&idx, "text", RowValues::as_text)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not a boolean.
    pub fn get_bool<I: ColumnIndex>(&self, idx: I) -> Result<bool, SprocDbError> {
        self.required(&idx, "bool", |v| v.as_bool().copied())
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not a timestamp.
    pub fn get_timestamp<I: ColumnIndex>(&self, idx: I) -> Result<NaiveDateTime, SprocDbError> {
        self.required(&idx, "timestamp", RowValues::as_timestamp)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing, NULL, or not binary.
    pub fn get_blob<I: ColumnIndex>(&self, idx: I) -> Result<&[u8], SprocDbError> {
        self.required(&idx, "blob", RowValues::as_blob)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or holds a non-integer.
    pub fn get_optional_i64<I: ColumnIndex>(&self, idx: I) -> Result<Option<i64>, SprocDbError> {
        self.optional(&idx, "integer", |v| v.as_int().copied())
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or holds a non-numeric value.
    pub fn get_optional_f64<I: ColumnIndex>(&self, idx: I) -> Result<Option<f64>, SprocDbError> {
        self.optional(&idx, "float", RowValues::as_float)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or holds a non-text value.
    pub fn get_optional_str<I: ColumnIndex>(&self, idx: I) -> Result<Option<&str>, SprocDbError> {
        self.optional(&idx, "text", RowValues::as_text)
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or holds a non-boolean.
    pub fn get_optional_bool<I: ColumnIndex>(
        &self,
        idx: I,
    ) -> Result<Option<bool>, SprocDbError> {
        self.optional(&idx, "bool", |v| v.as_bool().copied())
    }

    /// # Errors
    /// Returns `MappingError` if the column is missing or holds a non-timestamp.
    pub fn get_optional_timestamp<I: ColumnIndex>(
        &self,
        idx: I,
    ) -> Result<Option<NaiveDateTime>, SprocDbError> {
        self.optional(&idx, "timestamp", RowValues::as_timestamp)
    }
}
