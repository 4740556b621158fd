//! A small statement/expression language over a JSON-valued [`Namespace`].
//!
//! This is the interpreter the `subenv-worker` binary serves. It is not a
//! general-purpose language: no loops, no user-defined functions. Scripts bind
//! names, compute with JSON values and call native functions from a
//! [`Registry`].

mod lexer;
mod ops;
mod parser;
mod registry;

use serde_json::{Map, Value};

use self::parser::{Expr, Stmt, StmtKind, parse_expression, parse_program};
pub use self::registry::{Function, Param, Registry};
use crate::interpreter::{Failure, Interpreter, Target};
use crate::namespace::Namespace;

const BUILTINS: &str = "builtins";

pub struct ScriptInterpreter {
    namespace: Namespace,
    registry: Registry,
}

impl Default for ScriptInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptInterpreter {
    pub fn new() -> Self {
        Self::with_registry(Registry::standard())
    }

    pub fn with_registry(registry: Registry) -> Self {
        Self {
            namespace: Namespace::new(),
            registry,
        }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn scope(&self) -> Scope<'_> {
        Scope {
            namespace: &self.namespace,
            registry: &self.registry,
        }
    }

    fn run(&mut self, stmt: &Stmt) -> Result<(), Failure> {
        match &stmt.kind {
            StmtKind::Assign(name, expr) => {
                let value = self.scope().eval(expr)?;
                self.namespace.set(name.clone(), value);
            }
            StmtKind::Del(name) => {
                if self.namespace.remove(name).is_none() {
                    return Err(name_error(name));
                }
            }
            StmtKind::Expr(expr) => {
                self.scope().eval(expr)?;
            }
        }
        Ok(())
    }
}

impl Interpreter for ScriptInterpreter {
    fn describe(&self) -> String {
        format!("subenv-script {}", env!("CARGO_PKG_VERSION"))
    }

    fn exec(&mut self, code: &str) -> Result<(), Failure> {
        let program = parse_program(code)?;
        for stmt in &program {
            self.run(stmt)
                .map_err(|f| locate(f, "<exec>", code, stmt.line))?;
        }
        Ok(())
    }

    fn eval(&mut self, expr: &str) -> Result<Value, Failure> {
        let parsed = parse_expression(expr)?;
        let line = expr
            .lines()
            .position(|l| !l.trim().is_empty())
            .map_or(1, |i| i + 1);
        self.scope()
            .eval(&parsed)
            .map_err(|f| locate(f, "<eval>", expr, line))
    }

    fn call(
        &mut self,
        target: &Target,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, Failure> {
        self.registry.resolve(target)?.invoke(args, kwargs)
    }

    fn get(&mut self, name: &str) -> Result<Value, Failure> {
        self.namespace
            .get(name)
            .cloned()
            .ok_or_else(|| Failure::key_error(name))
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), Failure> {
        self.namespace.set(name, value);
        Ok(())
    }
}

fn name_error(name: &str) -> Failure {
    Failure::new("NameError", format!("name '{name}' is not defined"))
}

/// Attach `  at line N (<origin>): <source line>` unless a trace is already set.
fn locate(failure: Failure, origin: &str, source: &str, line: usize) -> Failure {
    if !failure.trace.is_empty() {
        return failure;
    }
    let text = source
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or_default()
        .trim();
    failure.with_trace(format!("  at line {line} ({origin}): {text}"))
}

/// Read-only view used while evaluating expressions.
struct Scope<'a> {
    namespace: &'a Namespace,
    registry: &'a Registry,
}

impl Scope<'_> {
    fn eval(&self, expr: &Expr) -> Result<Value, Failure> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self
                .namespace
                .get(name)
                .cloned()
                .ok_or_else(|| name_error(name)),
            Expr::List(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Dict(entries) => {
                let mut map = Map::new();
                for (key, value) in entries {
                    let key = match self.eval(key)? {
                        Value::String(s) => s,
                        other => {
                            return Err(Failure::type_error(format!(
                                "dict keys must be str, not '{}'",
                                ops::type_name(&other)
                            )));
                        }
                    };
                    map.insert(key, self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Neg(inner) => ops::negate(&self.eval(inner)?),
            Expr::Not(inner) => Ok(Value::Bool(!ops::truthy(&self.eval(inner)?))),
            Expr::And(lhs, rhs) => {
                let left = self.eval(lhs)?;
                if ops::truthy(&left) { self.eval(rhs) } else { Ok(left) }
            }
            Expr::Or(lhs, rhs) => {
                let left = self.eval(lhs)?;
                if ops::truthy(&left) { Ok(left) } else { self.eval(rhs) }
            }
            Expr::Binary(op, lhs, rhs) => ops::binary(*op, &self.eval(lhs)?, &self.eval(rhs)?),
            Expr::Index(base, index) => ops::index(&self.eval(base)?, &self.eval(index)?),
            Expr::Attr(base, attr) => ops::attribute(&self.eval(base)?, attr),
            Expr::Call {
                callee,
                args,
                kwargs,
            } => self.call(callee, args, kwargs),
        }
    }

    fn call(
        &self,
        callee: &Expr,
        args: &[Expr],
        kwargs: &[(String, Expr)],
    ) -> Result<Value, Failure> {
        let target = match callee {
            Expr::Name(name) if !self.namespace.contains(name) => Target {
                module: BUILTINS.to_string(),
                attr: name.clone(),
            },
            Expr::Attr(base, attr) => match base.as_ref() {
                Expr::Name(module)
                    if !self.namespace.contains(module) && self.registry.has_module(module) =>
                {
                    Target {
                        module: module.clone(),
                        attr: attr.clone(),
                    }
                }
                _ => return Err(not_callable(&self.eval(callee)?)),
            },
            other => return Err(not_callable(&self.eval(other)?)),
        };

        let function = match self.registry.resolve(&target) {
            Ok(function) => function,
            Err(_) if target.module == BUILTINS => return Err(name_error(&target.attr)),
            Err(failure) => return Err(failure),
        };

        let args = args
            .iter()
            .map(|arg| self.eval(arg))
            .collect::<Result<Vec<_>, _>>()?;
        let mut bound = Map::new();
        for (name, expr) in kwargs {
            if bound.insert(name.clone(), self.eval(expr)?).is_some() {
                return Err(Failure::new(
                    "SyntaxError",
                    format!("keyword argument repeated: {name}"),
                ));
            }
        }
        function.invoke(args, bound)
    }
}

fn not_callable(value: &Value) -> Failure {
    Failure::type_error(format!("'{}' object is not callable", ops::type_name(value)))
}
