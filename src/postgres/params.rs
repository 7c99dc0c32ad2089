use std::error::Error;

use chrono::{DateTime, Utc};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::command::ProcCommand;
use crate::types::{ParamDirection, ParamType, RowValues};

/// A stored-procedure call rendered for Postgres.
///
/// Inputs are passed in named notation (`name => $n`). Output parameters are passed as typed
/// `NULL` placeholders to `CALL`, whose single result row carries their values.
#[derive(Debug, Clone, PartialEq)]
pub struct PgCall {
    pub text: String,
    pub binds: Vec<RowValues>,
    pub output_names: Vec<String>,
}

impl PgCall {
    #[must_use]
    pub fn has_outputs(&self) -> bool {
        !self.output_names.is_empty()
    }

    /// Bind values in placeholder order.
    #[must_use]
    pub fn bind_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.binds.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }
}

/// Postgres type used for the `NULL` placeholder of an output parameter.
#[must_use]
pub fn cast_type(sql_type: ParamType) -> &'static str {
    match sql_type {
        ParamType::Int => "int4",
        ParamType::BigInt => "int8",
        ParamType::Float => "float8",
        ParamType::Text => "text",
        ParamType::Bool => "bool",
        ParamType::Timestamp => "timestamp",
        ParamType::Blob => "bytea",
        ParamType::Json => "jsonb",
    }
}

fn render_args(command: &ProcCommand, with_outputs: bool) -> (String, Vec<RowValues>, Vec<String>) {
    let mut args = Vec::with_capacity(command.params().len());
    let mut binds = Vec::new();
    let mut output_names = Vec::new();
    for param in command.params() {
        match param.direction() {
            ParamDirection::Output if with_outputs => {
                let ty = param.sql_type().map_or("text", cast_type);
                args.push(format!("{} => NULL::{ty}", param.name()));
                output_names.push(param.name().to_string());
            }
            ParamDirection::Output => {}
            direction => {
                binds.push(param.value().clone());
                args.push(format!("{} => ${}", param.name(), binds.len()));
                if direction == ParamDirection::InputOutput && with_outputs {
                    output_names.push(param.name().to_string());
                }
            }
        }
    }
    (args.join(", "), binds, output_names)
}

/// Render a call whose rows are read: `SELECT * FROM name(a => $1)`.
#[must_use]
pub fn render_select(command: &ProcCommand) -> PgCall {
    let (args, binds, _) = render_args(command, false);
    PgCall {
        text: format!("SELECT * FROM {}({args})", command.name()),
        binds,
        output_names: Vec::new(),
    }
}

/// Render a call that returns no rows: `CALL name(a => $1, total => NULL::int4)`.
#[must_use]
pub fn render_call(command: &ProcCommand) -> PgCall {
    let (args, binds, output_names) = render_args(command, true);
    PgCall {
        text: format!("CALL {}({args})", command.name()),
        binds,
        output_names,
    }
}

fn narrow<T>(value: i64, ty: &Type) -> Result<T, Box<dyn Error + Sync + Send>>
where
    T: TryFrom<i64>,
{
    T::try_from(value).map_err(|_| format!("integer {value} does not fit in {ty}").into())
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            RowValues::Int(i) => match *ty {
                Type::INT2 => narrow::<i16>(*i, ty)?.to_sql(ty, out),
                Type::INT4 => narrow::<i32>(*i, ty)?.to_sql(ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => (*i).to_sql(ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => (*f).to_sql(ty, out),
            },
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => {
                    DateTime::<Utc>::from_naive_utc_and_offset(*dt, Utc).to_sql(ty, out)
                }
                Type::DATE => dt.date().to_sql(ty, out),
                _ => dt.to_sql(ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => jsval.to_sql(ty, out),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}
