//! Moving values between `serde_json::Value` and Python objects.
//!
//! Python side of the codec goes through the stdlib `json` module. Before
//! encoding, results are normalised into plain containers:
//! - Pydantic models → dict (`model_dump()`)
//! - dataclass instances → dict (`dataclasses.asdict()`)
//! - tuple/set/frozenset → list
//! - Enums → `.value`
//! - datetime/date/time → `.isoformat()`
//! - numpy scalars and arrays → int/float/bool/list
//!
//! Anything `json.dumps` still rejects surfaces as its own `TypeError`.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyFrozenSet, PyList, PySet, PyString, PyTuple, PyType};
use serde_json::Value;

pub fn to_python<'py>(py: Python<'py>, value: &Value) -> PyResult<Bound<'py, PyAny>> {
    let text = serde_json::to_string(value).map_err(|e| PyValueError::new_err(e.to_string()))?;
    py.import("json")?.call_method1("loads", (text,))
}

pub fn from_python(py: Python<'_>, obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    let plain = normalise(py, obj)?;
    let kwargs = PyDict::new(py);
    // NaN and infinities have no JSON spelling.
    kwargs.set_item("allow_nan", false)?;
    let text: String = py
        .import("json")?
        .call_method("dumps", (plain,), Some(&kwargs))?
        .extract()?;
    serde_json::from_str(&text).map_err(|e| PyValueError::new_err(e.to_string()))
}

fn normalise<'py>(py: Python<'py>, obj: &Bound<'py, PyAny>) -> PyResult<Bound<'py, PyAny>> {
    if obj.is_none() || obj.is_instance_of::<PyString>() {
        return Ok(obj.clone());
    }
    let is_class = obj.is_instance(py.get_type::<PyType>().as_any())?;

    if !is_class
        && let Ok(method) = obj.getattr("model_dump")
        && method.is_callable()
    {
        return normalise(py, &method.call0()?);
    }

    let dataclasses = py.import("dataclasses")?;
    if !is_class && dataclasses.getattr("is_dataclass")?.call1((obj,))?.is_truthy()? {
        let as_dict = dataclasses.getattr("asdict")?.call1((obj,))?;
        return normalise(py, &as_dict);
    }

    if let Ok(dict) = obj.cast::<PyDict>() {
        let out = PyDict::new(py);
        for (key, value) in dict.iter() {
            out.set_item(&key, normalise(py, &value)?)?;
        }
        return Ok(out.into_any());
    }

    if obj.is_instance_of::<PyList>()
        || obj.is_instance_of::<PyTuple>()
        || obj.is_instance_of::<PySet>()
        || obj.is_instance_of::<PyFrozenSet>()
    {
        let items = obj
            .try_iter()?
            .map(|item| normalise(py, &item?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(PyList::new(py, &items)?.into_any());
    }

    let enum_cls = py.import("enum")?.getattr("Enum")?;
    if obj.is_instance(&enum_cls)? {
        return normalise(py, &obj.getattr("value")?);
    }

    let datetime = py.import("datetime")?;
    for name in ["datetime", "date", "time"] {
        if obj.is_instance(&datetime.getattr(name)?)? {
            return obj.call_method0("isoformat");
        }
    }

    if !is_class && let Ok(np) = py.import("numpy") {
        if obj.is_instance(&np.getattr("ndarray")?)? {
            return normalise(py, &obj.call_method0("tolist")?);
        }
        if obj.is_instance(&np.getattr("generic")?)? {
            return obj.call_method0("item");
        }
    }

    Ok(obj.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_values_cross_both_ways() {
        Python::attach(|py| {
            let value = json!({"a": [1, 2.5, "x", null, true], "b": {}});
            let obj = to_python(py, &value).unwrap();
            assert!(obj.is_instance_of::<PyDict>());
            assert_eq!(from_python(py, &obj).unwrap(), value);
        });
    }

    #[test]
    fn containers_and_stdlib_types_are_normalised() {
        Python::attach(|py| {
            let globals = PyDict::new(py);
            py.run(
                c"
import dataclasses, datetime, enum

class Color(enum.Enum):
    RED = 'red'

@dataclasses.dataclass
class Point:
    x: int
    y: tuple

value = {
    'tuple': (1, 2),
    'set': {3},
    'color': Color.RED,
    'when': datetime.date(2024, 1, 2),
    'point': Point(1, (2, 3)),
}
",
                Some(&globals),
                None,
            )
            .unwrap();
            let obj = globals.get_item("value").unwrap().unwrap();
            assert_eq!(
                from_python(py, &obj).unwrap(),
                json!({
                    "tuple": [1, 2],
                    "set": [3],
                    "color": "red",
                    "when": "2024-01-02",
                    "point": {"x": 1, "y": [2, 3]},
                })
            );
        });
    }

    #[test]
    fn unencodable_values_raise_type_error() {
        Python::attach(|py| {
            let obj = py.eval(c"object()", None, None).unwrap();
            let err = from_python(py, &obj).unwrap_err();
            assert!(err.is_instance_of::<pyo3::exceptions::PyTypeError>(py));

            let nan = py.eval(c"float('nan')", None, None).unwrap();
            let err = from_python(py, &nan).unwrap_err();
            assert!(err.is_instance_of::<PyValueError>(py));
        });
    }
}
