use std::collections::HashSet;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::SprocDbError;
use crate::types::{ParamDirection, ProcParam};

static PARAM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_$#]*$").expect("parameter name pattern is valid")
});

const FORBIDDEN_IN_NAME: [&str; 5] = [";", "'", "--", "/*", "*/"];

/// An executable stored-procedure command: name, timeout, and ordered parameters.
///
/// Building a command validates the request but touches no connection; drivers render it
/// into their own call syntax.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcCommand {
    name: String,
    timeout: Duration,
    params: Vec<ProcParam>,
}

impl ProcCommand {
    /// Build a stored-procedure command.
    ///
    /// # Errors
    /// Returns `SprocDbError::InvalidArgument` if the name is empty or unsafe to embed in a
    /// call, the timeout is zero, a parameter name is invalid or duplicated, or an output
    /// parameter has no type.
    pub fn build(
        name: &str,
        timeout: Duration,
        params: &[ProcParam],
    ) -> Result<Self, SprocDbError> {
        if FORBIDDEN_IN_NAME.iter().any(|bad| name.contains(bad))
            || name.chars().any(char::is_control)
        {
            return Err(SprocDbError::invalid_argument(format!(
                "stored procedure name {name:?} contains characters that are not allowed"
            )));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(SprocDbError::invalid_argument(
                "stored procedure name must not be empty",
            ));
        }
        if timeout.is_zero() {
            return Err(SprocDbError::invalid_argument(format!(
                "timeout for {name} must be greater than zero"
            )));
        }

        let mut seen = HashSet::with_capacity(params.len());
        for param in params {
            if !PARAM_NAME.is_match(param.name()) {
                return Err(SprocDbError::invalid_argument(format!(
                    "parameter name {:?} of {name} is not a valid identifier",
                    param.name()
                )));
            }
            if !seen.insert(param.name().to_ascii_lowercase()) {
                return Err(SprocDbError::invalid_argument(format!(
                    "parameter {} of {name} is given more than once",
                    param.name()
                )));
            }
            if param.direction().is_output() && param.sql_type().is_none() {
                return Err(SprocDbError::invalid_argument(format!(
                    "output parameter {} of {name} needs a declared type",
                    param.name()
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            timeout,
            params: params.to_vec(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Timeout in whole seconds, rounded up so sub-second timeouts never become zero.
    #[must_use]
    pub fn timeout_secs(&self) -> u64 {
        let secs = self.timeout.as_secs();
        if self.timeout.subsec_nanos() > 0 {
            secs + 1
        } else {
            secs
        }
    }

    #[must_use]
    pub fn params(&self) -> &[ProcParam] {
        &self.params
    }

    pub fn output_params(&self) -> impl Iterator<Item = &ProcParam> {
        self.params.iter().filter(|p| p.direction().is_output())
    }

    #[must_use]
    pub fn has_outputs(&self) -> bool {
        self.params
            .iter()
            .any(|p| p.direction() != ParamDirection::Input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ParamType, RowValues};

    fn ok_params() -> Vec<ProcParam> {
        vec![
            ProcParam::output("PTotalRecord", ParamType::Int),
            ProcParam::input("POffset", RowValues::Int(25)),
            ProcParam::input("@PPageSize", RowValues::Int(50)),
            ProcParam::input("PSearchText", RowValues::Null),
        ]
    }

    #[test]
    fn keeps_parameter_order_and_direction() {
        let cmd = ProcCommand::build("CustomerGetAll", Duration::from_secs(30), &ok_params())
            .unwrap();
        let names: Vec<_> = cmd.params().iter().map(ProcParam::name).collect();
        assert_eq!(
            names,
            ["PTotalRecord", "POffset", "PPageSize", "PSearchText"]
        );
        assert_eq!(cmd.params()[0].direction(), ParamDirection::Output);
        assert!(cmd.has_outputs());
        assert_eq!(cmd.timeout_secs(), 30);
    }

    #[test]
    fn empty_parameter_list_is_fine() {
        let cmd = ProcCommand::build("[Scheme].[SPName]", Duration::from_secs(10), &[]).unwrap();
        assert!(cmd.params().is_empty());
        assert!(!cmd.has_outputs());
    }

    #[test]
    fn rejects_blank_name_and_zero_timeout() {
        let blank = ProcCommand::build("   ", Duration::from_secs(1), &[]).unwrap_err();
        assert!(matches!(blank, SprocDbError::InvalidArgument(_)));
        let zero = ProcCommand::build("p", Duration::ZERO, &[]).unwrap_err();
        assert!(matches!(zero, SprocDbError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_statement_breaking_names() {
        for name in ["p; DROP TABLE t", "p'--", "p /* x */", "p\n", "\tp", "  p\r\n"] {
            let err = ProcCommand::build(name, Duration::from_secs(1), &[]).unwrap_err();
            assert!(matches!(err, SprocDbError::InvalidArgument(_)), "{name}");
        }
    }

    #[test]
    fn rejects_bad_and_duplicate_parameter_names() {
        let bad = [ProcParam::input("1abc", RowValues::Int(1))];
        assert!(ProcCommand::build("p", Duration::from_secs(1), &bad).is_err());

        let dup = [
            ProcParam::input("Offset", RowValues::Int(1)),
            ProcParam::input("@offset", RowValues::Int(2)),
        ];
        let err = ProcCommand::build("p", Duration::from_secs(1), &dup).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn untyped_output_is_rejected() {
        let params = [ProcParam::input_output("counter", RowValues::Null)];
        let err = ProcCommand::build("p", Duration::from_secs(1), &params).unwrap_err();
        assert!(err.to_string().contains("needs a declared type"));
    }

    #[test]
    fn surrounding_spaces_are_trimmed() {
        let cmd = ProcCommand::build("  dbo.p  ", Duration::from_secs(1), &[]).unwrap();
        assert_eq!(cmd.name(), "dbo.p");
    }

    #[test]
    fn sub_second_timeout_rounds_up() {
        let cmd = ProcCommand::build("p", Duration::from_millis(1500), &[]).unwrap();
        assert_eq!(cmd.timeout_secs(), 2);
    }
}
