//! The seam between the dispatcher loop and whatever actually runs code.
//!
//! An [`Interpreter`] owns its namespace. The dispatcher never looks inside it;
//! it only moves values in and out through this trait.

use std::fmt;

use serde_json::{Map, Value};

/// A failure raised while serving one request, rendered for the parent.
///
/// Carries the failure's category (e.g. `KeyError`), its message, and a trace as
/// text. The parent surfaces [`Failure::render`] verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: String,
    pub message: String,
    pub trace: String,
}

impl Failure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            trace: String::new(),
        }
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = trace.into();
        self
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new("TypeError", message)
    }

    pub fn key_error(name: &str) -> Self {
        Self::new("KeyError", format!("'{name}'"))
    }

    /// `"<kind>: <message>"`, followed by the trace on the next lines if any.
    pub fn render(&self) -> String {
        if self.trace.is_empty() {
            format!("{}: {}", self.kind, self.message)
        } else {
            format!(
                "{}: {}\n{}",
                self.kind,
                self.message,
                self.trace.trim_end_matches('\n')
            )
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for Failure {}

/// A `"<module-path>:<attribute-name>"` call target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub module: String,
    pub attr: String,
}

impl Target {
    pub fn parse(reference: &str) -> Result<Self, Failure> {
        match reference.split_once(':') {
            Some((module, attr)) if !module.is_empty() && !attr.is_empty() => Ok(Self {
                module: module.to_string(),
                attr: attr.to_string(),
            }),
            _ => Err(Failure::new(
                "ValueError",
                format!("invalid target reference '{reference}', expected 'module:attr'"),
            )),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.attr)
    }
}

/// Runs caller-supplied logic against a persistent namespace.
///
/// Calls arrive one at a time from the dispatcher loop; implementations may block.
pub trait Interpreter {
    /// Description sent to the parent in the readiness message.
    fn describe(&self) -> String;

    /// Run `code` as statements with read/write access to the namespace.
    fn exec(&mut self, code: &str) -> Result<(), Failure>;

    /// Evaluate a single expression against the namespace.
    fn eval(&mut self, expr: &str) -> Result<Value, Failure>;

    /// Resolve `target` outside the namespace and invoke it.
    fn call(
        &mut self,
        target: &Target,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, Failure>;

    /// Look up a bound name. Absent names fail with a `KeyError`.
    fn get(&mut self, name: &str) -> Result<Value, Failure>;

    /// Bind `name`, replacing any previous binding.
    fn set(&mut self, name: &str, value: Value) -> Result<(), Failure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_without_trace() {
        let f = Failure::key_error("missing");
        assert_eq!(f.render(), "KeyError: 'missing'");
    }

    #[test]
    fn render_with_trace() {
        let f = Failure::new("ZeroDivisionError", "division by zero")
            .with_trace("  at line 1 (<eval>): 1/0\n");
        assert_eq!(
            f.to_string(),
            "ZeroDivisionError: division by zero\n  at line 1 (<eval>): 1/0"
        );
    }

    #[test]
    fn target_splits_on_first_colon() {
        let t = Target::parse("pkg.mod:func").unwrap();
        assert_eq!(t.module, "pkg.mod");
        assert_eq!(t.attr, "func");
        assert_eq!(t.to_string(), "pkg.mod:func");

        let t = Target::parse("a:b:c").unwrap();
        assert_eq!(t.attr, "b:c");
    }

    #[test]
    fn target_requires_both_parts() {
        for bad in ["nocolon", ":f", "m:", ""] {
            let err = Target::parse(bad).unwrap_err();
            assert_eq!(err.kind, "ValueError", "{bad}");
        }
    }
}
