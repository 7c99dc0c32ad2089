use std::time::Duration;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Values that can be passed as stored-procedure parameters or read back from a row.
///
/// The same enum is used by every backend so row mappers do not need to branch on driver
/// types:
/// ```rust
/// use sproc_middleware::prelude::*;
///
/// let params = vec![
///     ProcParam::input("offset", RowValues::Int(0)),
///     ProcParam::input("pageSize", RowValues::Int(50)),
///     ProcParam::input("search", RowValues::Null),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<&bool> {
        if let RowValues::Bool(value) = self {
            return Some(value);
        } else if let Some(i) = self.as_int() {
            if *i == 1 {
                return Some(&true);
            } else if *i == 0 {
                return Some(&false);
            }
        }
        None
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            // Try "YYYY-MM-DD HH:MM:SS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            // Try "YYYY-MM-DD HH:MM:SS.SSS"
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&JsonValue> {
        if let RowValues::JSON(value) = self {
            Some(value)
        } else {
            None
        }
    }

    /// The parameter type this value would bind as; `None` for NULL.
    #[must_use]
    pub fn param_type(&self) -> Option<ParamType> {
        match self {
            RowValues::Int(_) => Some(ParamType::BigInt),
            RowValues::Float(_) => Some(ParamType::Float),
            RowValues::Text(_) => Some(ParamType::Text),
            RowValues::Bool(_) => Some(ParamType::Bool),
            RowValues::Timestamp(_) => Some(ParamType::Timestamp),
            RowValues::JSON(_) => Some(ParamType::Json),
            RowValues::Blob(_) => Some(ParamType::Blob),
            RowValues::Null => None,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            RowValues::Int(_) => "integer",
            RowValues::Float(_) => "float",
            RowValues::Text(_) => "text",
            RowValues::Bool(_) => "bool",
            RowValues::Timestamp(_) => "timestamp",
            RowValues::Null => "NULL",
            RowValues::JSON(_) => "json",
            RowValues::Blob(_) => "blob",
        }
    }
}

/// Direction of a stored-procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParamDirection {
    #[default]
    Input,
    Output,
    InputOutput,
}

impl ParamDirection {
    /// True when the server writes a value back for this parameter.
    #[must_use]
    pub fn is_output(self) -> bool {
        matches!(self, Self::Output | Self::InputOutput)
    }

    /// True when the caller's value is sent to the server.
    #[must_use]
    pub fn is_input(self) -> bool {
        matches!(self, Self::Input | Self::InputOutput)
    }
}

/// Declared SQL type of an output parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParamType {
    /// 32-bit integer
    Int,
    /// 64-bit integer
    BigInt,
    Float,
    Text,
    Bool,
    Timestamp,
    Blob,
    Json,
}

/// One stored-procedure parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcParam {
    name: String,
    value: RowValues,
    direction: ParamDirection,
    sql_type: Option<ParamType>,
}

impl ProcParam {
    /// An input parameter. A leading `@` in `name` is ignored.
    pub fn input(name: impl Into<String>, value: RowValues) -> Self {
        Self {
            name: normalize_param_name(name.into()),
            value,
            direction: ParamDirection::Input,
            sql_type: None,
        }
    }

    /// An output parameter of the given type; its value is NULL until the call completes.
    pub fn output(name: impl Into<String>, sql_type: ParamType) -> Self {
        Self {
            name: normalize_param_name(name.into()),
            value: RowValues::Null,
            direction: ParamDirection::Output,
            sql_type: Some(sql_type),
        }
    }

    /// A parameter sent to the server and overwritten with the value it returns.
    pub fn input_output(name: impl Into<String>, value: RowValues) -> Self {
        Self {
            name: normalize_param_name(name.into()),
            value,
            direction: ParamDirection::InputOutput,
            sql_type: None,
        }
    }

    #[must_use]
    pub fn with_type(mut self, sql_type: ParamType) -> Self {
        self.sql_type = Some(sql_type);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn value(&self) -> &RowValues {
        &self.value
    }

    #[must_use]
    pub fn direction(&self) -> ParamDirection {
        self.direction
    }

    /// The declared type, falling back to the type of the current value.
    #[must_use]
    pub fn sql_type(&self) -> Option<ParamType> {
        self.sql_type.or_else(|| self.value.param_type())
    }

    pub(crate) fn set_value(&mut self, value: RowValues) {
        self.value = value;
    }
}

fn normalize_param_name(name: String) -> String {
    match name.strip_prefix('@') {
        Some(stripped) => stripped.to_string(),
        None => name,
    }
}

/// A stored-procedure invocation request.
///
/// Output parameters are written back into the request once the call completes:
/// ```rust
/// use sproc_middleware::prelude::*;
///
/// let call = ProcedureCall::new("CustomerGetAll")
///     .param(ProcParam::output("PTotalRecord", ParamType::Int))
///     .param(ProcParam::input("POffset", RowValues::Int(25)))
///     .param(ProcParam::input("PPageSize", RowValues::Int(50)));
/// assert_eq!(call.output("PTotalRecord"), Some(&RowValues::Null));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureCall {
    name: String,
    timeout: Option<Duration>,
    params: Vec<ProcParam>,
}

impl ProcedureCall {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout: None,
            params: Vec::new(),
        }
    }

    /// Override the executor's default command timeout for this call.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    #[must_use]
    pub fn param(mut self, param: ProcParam) -> Self {
        self.params.push(param);
        self
    }

    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = ProcParam>) -> Self {
        self.params.extend(params);
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub fn parameters(&self) -> &[ProcParam] {
        &self.params
    }

    /// Value of an output (or input-output) parameter, matched case-insensitively.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&RowValues> {
        let name = name.strip_prefix('@').unwrap_or(name);
        self.params
            .iter()
            .find(|p| p.direction.is_output() && p.name.eq_ignore_ascii_case(name))
            .map(ProcParam::value)
    }

    /// Copy driver-reported output values into the matching output parameters.
    pub(crate) fn apply_outputs(&mut self, outputs: Vec<(String, RowValues)>) {
        for (name, value) in outputs {
            if let Some(param) = self
                .params
                .iter_mut()
                .find(|p| p.direction.is_output() && p.name.eq_ignore_ascii_case(&name))
            {
                param.set_value(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_at_prefix_from_names() {
        let p = ProcParam::input("@param1", RowValues::Int(1));
        assert_eq!(p.name(), "param1");
        assert_eq!(p.direction(), ParamDirection::Input);
    }

    #[test]
    fn output_type_falls_back_to_value_type() {
        let declared = ProcParam::output("total", ParamType::Int);
        assert_eq!(declared.sql_type(), Some(ParamType::Int));

        let inferred = ProcParam::input_output("counter", RowValues::Text("x".into()));
        assert_eq!(inferred.sql_type(), Some(ParamType::Text));

        let untyped = ProcParam::input_output("counter", RowValues::Null);
        assert_eq!(untyped.sql_type(), None);
    }

    #[test]
    fn apply_outputs_only_touches_output_params() {
        let mut call = ProcedureCall::new("p")
            .param(ProcParam::input("Total", RowValues::Int(7)))
            .param(ProcParam::output("PTotal", ParamType::Int));
        call.apply_outputs(vec![
            ("ptotal".into(), RowValues::Int(120)),
            ("Total".into(), RowValues::Int(0)),
        ]);
        assert_eq!(call.output("@PTotal"), Some(&RowValues::Int(120)));
        assert_eq!(call.parameters()[0].value(), &RowValues::Int(7));
        assert_eq!(call.output("Total"), None);
    }

    #[test]
    fn as_bool_accepts_integer_flags() {
        assert_eq!(RowValues::Int(1).as_bool(), Some(&true));
        assert_eq!(RowValues::Int(0).as_bool(), Some(&false));
        assert_eq!(RowValues::Int(2).as_bool(), None);
    }
}
