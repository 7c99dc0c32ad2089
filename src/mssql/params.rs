use std::fmt::Write as _;

use tiberius::Query;

use crate::command::ProcCommand;
use crate::types::{ParamDirection, ParamType, RowValues};

/// A stored-procedure call rendered as a T-SQL batch.
///
/// Inputs are bound as `@P1..@Pn`. Output parameters are declared as batch variables, passed
/// with `OUTPUT`, and selected back as a trailing one-row result set whose columns carry the
/// parameter names.
#[derive(Debug, Clone, PartialEq)]
pub struct MssqlBatch {
    pub text: String,
    pub binds: Vec<RowValues>,
    pub output_names: Vec<String>,
}

impl MssqlBatch {
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        !self.output_names.is_empty()
    }

    /// Build a tiberius query with every input value bound in order.
    #[must_use]
    pub fn to_query(&self) -> Query<'_> {
        let mut query = Query::new(self.text.as_str());
        for value in &self.binds {
            bind_value(&mut query, value);
        }
        query
    }
}

/// T-SQL type used to declare an output variable.
#[must_use]
pub fn declared_type(sql_type: ParamType) -> &'static str {
    match sql_type {
        ParamType::Int => "INT",
        ParamType::BigInt => "BIGINT",
        ParamType::Float => "FLOAT",
        ParamType::Bool => "BIT",
        ParamType::Timestamp => "DATETIME2",
        ParamType::Blob => "VARBINARY(MAX)",
        ParamType::Text | ParamType::Json => "NVARCHAR(MAX)",
    }
}

/// Render `command` as `DECLARE ...; EXEC name @a = @P1, @b = @__o1 OUTPUT; SELECT ...;`.
#[must_use]
pub fn render_call(command: &ProcCommand) -> MssqlBatch {
    let mut declares = String::new();
    let mut args = Vec::with_capacity(command.params().len());
    let mut binds = Vec::new();
    let mut selects = Vec::new();
    let mut output_names = Vec::new();

    for param in command.params() {
        match param.direction() {
            ParamDirection::Input => {
                binds.push(param.value().clone());
                args.push(format!("@{} = @P{}", param.name(), binds.len()));
            }
            direction => {
                let var = format!("@__o{}", output_names.len() + 1);
                let sql_type = param
                    .sql_type()
                    .map_or("NVARCHAR(MAX)", declared_type);
                let _ = write!(declares, "DECLARE {var} {sql_type}");
                if direction == ParamDirection::InputOutput {
                    binds.push(param.value().clone());
                    let _ = write!(declares, " = @P{}", binds.len());
                }
                declares.push_str("; ");
                args.push(format!("@{} = {var} OUTPUT", param.name()));
                selects.push(format!("{var} AS [{}]", param.name()));
                output_names.push(param.name().to_string());
            }
        }
    }

    let mut text = declares;
    text.push_str("EXEC ");
    text.push_str(command.name());
    if !args.is_empty() {
        text.push(' ');
        text.push_str(&args.join(", "));
    }
    text.push(';');
    if !selects.is_empty() {
        let _ = write!(text, " SELECT {};", selects.join(", "));
    }

    MssqlBatch {
        text,
        binds,
        output_names,
    }
}

fn bind_value(query: &mut Query<'_>, value: &RowValues) {
    match value {
        RowValues::Int(i) => query.bind(*i),
        RowValues::Float(f) => query.bind(*f),
        RowValues::Text(s) => query.bind(s.clone()),
        RowValues::Bool(b) => query.bind(*b),
        RowValues::Timestamp(dt) => query.bind(*dt),
        RowValues::Null => query.bind(Option::<String>::None),
        RowValues::JSON(jsval) => query.bind(jsval.to_string()),
        RowValues::Blob(bytes) => query.bind(bytes.clone()),
    }
}
