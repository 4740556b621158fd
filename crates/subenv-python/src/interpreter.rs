//! Python-backed [`Interpreter`]: a dict namespace driven by `exec`/`eval`.

use pyo3::prelude::*;
use pyo3::types::{PyDict, PyTuple};
use serde_json::{Map, Value};

use subenv_core::{Failure, Interpreter, Target};

use crate::convert;

/// Namespace is a plain dict used as `globals` for every exec/eval.
pub struct PythonInterpreter {
    namespace: Py<PyDict>,
}

impl PythonInterpreter {
    pub fn new(py: Python<'_>) -> PyResult<Self> {
        let namespace = PyDict::new(py);
        namespace.set_item("__builtins__", py.import("builtins")?)?;
        namespace.set_item("__name__", "__subenv__")?;
        Ok(Self {
            namespace: namespace.unbind(),
        })
    }

    fn run(&self, py: Python<'_>, source: &str, origin: &str, mode: &str) -> PyResult<Py<PyAny>> {
        let builtins = py.import("builtins")?;
        let code = builtins
            .getattr("compile")?
            .call1((source, origin, mode))?;
        let globals = self.namespace.bind(py);
        let result = if mode == "eval" {
            // Throwaway locals: a walrus inside the expression cannot rebind globals.
            builtins
                .getattr("eval")?
                .call1((code, globals, PyDict::new(py)))?
        } else {
            builtins.getattr("exec")?.call1((code, globals))?
        };
        Ok(result.unbind())
    }
}

impl Interpreter for PythonInterpreter {
    fn describe(&self) -> String {
        Python::attach(|py| {
            let version = py.version();
            let short = version.split_whitespace().next().unwrap_or(version);
            format!("python {short}")
        })
    }

    fn exec(&mut self, code: &str) -> Result<(), Failure> {
        Python::attach(|py| {
            self.run(py, code, "<exec>", "exec")
                .map(drop)
                .map_err(|e| failure(py, &e))
        })
    }

    fn eval(&mut self, expr: &str) -> Result<Value, Failure> {
        Python::attach(|py| {
            let result = self
                .run(py, expr.trim(), "<eval>", "eval")
                .map_err(|e| failure(py, &e))?;
            convert::from_python(py, result.bind(py)).map_err(|e| failure(py, &e))
        })
    }

    fn call(
        &mut self,
        target: &Target,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Result<Value, Failure> {
        Python::attach(|py| {
            let result = invoke(py, target, &args, &kwargs).map_err(|e| failure(py, &e))?;
            convert::from_python(py, &result).map_err(|e| failure(py, &e))
        })
    }

    fn get(&mut self, name: &str) -> Result<Value, Failure> {
        Python::attach(|py| {
            let value = self
                .namespace
                .bind(py)
                .get_item(name)
                .map_err(|e| failure(py, &e))?
                .ok_or_else(|| Failure::key_error(name))?;
            convert::from_python(py, &value).map_err(|e| failure(py, &e))
        })
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), Failure> {
        Python::attach(|py| {
            let obj = convert::to_python(py, &value).map_err(|e| failure(py, &e))?;
            self.namespace
                .bind(py)
                .set_item(name, obj)
                .map_err(|e| failure(py, &e))
        })
    }
}

/// Import `target.module` and walk the dotted attribute path to the callable.
fn invoke<'py>(
    py: Python<'py>,
    target: &Target,
    args: &[Value],
    kwargs: &Map<String, Value>,
) -> PyResult<Bound<'py, PyAny>> {
    let mut callable = py
        .import("importlib")?
        .call_method1("import_module", (target.module.as_str(),))?;
    for part in target.attr.split('.') {
        callable = callable.getattr(part)?;
    }

    let args = args
        .iter()
        .map(|v| convert::to_python(py, v))
        .collect::<PyResult<Vec<_>>>()?;
    let py_kwargs = PyDict::new(py);
    for (key, value) in kwargs {
        py_kwargs.set_item(key, convert::to_python(py, value)?)?;
    }
    callable.call(PyTuple::new(py, args)?, Some(&py_kwargs))
}

/// Exception type name, message, and the Python traceback as text.
fn failure(py: Python<'_>, err: &PyErr) -> Failure {
    let kind = err
        .get_type(py)
        .name()
        .map(|n| n.to_string())
        .unwrap_or_else(|_| "Exception".to_string());
    let message = err
        .value(py)
        .str()
        .map(|s| s.to_string())
        .unwrap_or_default();

    let trace = err
        .traceback(py)
        .and_then(|tb| {
            let frames = py
                .import("traceback")
                .and_then(|m| m.call_method1("format_tb", (tb,)))
                .and_then(|lines| lines.extract::<Vec<String>>())
                .ok()?;
            Some(format!("Traceback (most recent call last):\n{}", frames.concat()))
        })
        .unwrap_or_default();

    Failure::new(kind, message).with_trace(trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpreter() -> PythonInterpreter {
        Python::attach(|py| PythonInterpreter::new(py).unwrap())
    }

    #[test]
    fn namespace_persists_between_exec_and_eval() {
        let mut interp = interpreter();
        interp.exec("x = 1\ndef double(n):\n    return n * 2").unwrap();
        assert_eq!(interp.eval("double(x) + 40").unwrap(), json!(42));

        interp.set("items", json!([3, 1, 2])).unwrap();
        interp.exec("items.sort()").unwrap();
        assert_eq!(interp.get("items").unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn eval_does_not_rebind_names() {
        let mut interp = interpreter();
        interp.exec("x = 1").unwrap();
        assert_eq!(interp.eval("(x := 5)").unwrap(), json!(5));
        assert_eq!(interp.get("x").unwrap(), json!(1));
    }

    #[test]
    fn failures_carry_kind_and_traceback() {
        let mut interp = interpreter();
        let err = interp.eval("1 / 0").unwrap_err();
        assert_eq!(err.kind, "ZeroDivisionError");
        assert_eq!(err.message, "division by zero");
        assert!(err.trace.starts_with("Traceback (most recent call last):"));
        assert!(err.trace.contains("<eval>"));

        let err = interp.get("missing").unwrap_err();
        assert_eq!(err.render(), "KeyError: 'missing'");

        let err = interp.exec("def broken(:").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");

        assert_eq!(interp.eval("1 + 1").unwrap(), json!(2));
    }

    #[test]
    fn calls_resolve_through_importlib() {
        let mut interp = interpreter();

        let target = Target::parse("json:dumps").unwrap();
        let mut kwargs = Map::new();
        kwargs.insert("sort_keys".into(), json!(true));
        let out = interp.call(&target, vec![json!({"b": 1, "a": 2})], kwargs).unwrap();
        assert_eq!(out, json!(r#"{"a": 2, "b": 1}"#));

        let target = Target::parse("os.path:basename").unwrap();
        let out = interp.call(&target, vec![json!("dir/file.txt")], Map::new()).unwrap();
        assert_eq!(out, json!("file.txt"));

        let target = Target::parse("collections:OrderedDict.fromkeys").unwrap();
        let out = interp.call(&target, vec![json!(["a", "b"])], Map::new()).unwrap();
        assert_eq!(out, json!({"a": null, "b": null}));

        let target = Target::parse("no_such_module_xyz:f").unwrap();
        let err = interp.call(&target, vec![], Map::new()).unwrap_err();
        assert_eq!(err.kind, "ModuleNotFoundError");
    }

    #[test]
    fn unencodable_results_are_type_errors() {
        let mut interp = interpreter();
        let err = interp.eval("object()").unwrap_err();
        assert_eq!(err.kind, "TypeError");
    }
}
