//! Native functions reachable from scripts and from `call` targets.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Value};

use super::ops::{self, MAX_SEQUENCE_LEN, Num};
use super::parser::BinOp;
use crate::interpreter::{Failure, Target};

type Body = Box<dyn Fn(Vec<Value>) -> Result<Value, Failure> + Send + Sync>;

/// A declared parameter: positional-or-keyword, optionally defaulted.
#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Value>,
}

impl Param {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
        }
    }
}

/// A native function. Its body receives arguments already bound to the
/// declared parameters, in declaration order.
pub struct Function {
    name: String,
    params: Vec<Param>,
    variadic: bool,
    body: Body,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("variadic", &self.variadic)
            .finish_non_exhaustive()
    }
}

impl Function {
    pub fn new<F>(name: impl Into<String>, params: Vec<Param>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params,
            variadic: false,
            body: Box::new(body),
        }
    }

    /// Shorthand for a function whose parameters are all required.
    pub fn fixed<F>(name: impl Into<String>, params: &[&str], body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Self::new(name, params.iter().map(|p| Param::required(*p)).collect(), body)
    }

    /// Takes any number of positional arguments and no keywords.
    pub fn variadic<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(Vec<Value>) -> Result<Value, Failure> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            variadic: true,
            body: Box::new(body),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Value, Failure> {
        let bound = self.bind(args, kwargs)?;
        (self.body)(bound)
    }

    fn bind(&self, args: Vec<Value>, kwargs: Map<String, Value>) -> Result<Vec<Value>, Failure> {
        let name = &self.name;
        if self.variadic {
            if let Some(key) = kwargs.keys().next() {
                return Err(Failure::type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            }
            return Ok(args);
        }

        if args.len() > self.params.len() {
            return Err(Failure::type_error(format!(
                "{name}() takes {} positional argument{} but {} were given",
                self.params.len(),
                if self.params.len() == 1 { "" } else { "s" },
                args.len()
            )));
        }

        let mut slots: Vec<Option<Value>> = args.into_iter().map(Some).collect();
        slots.resize(self.params.len(), None);

        for (key, value) in kwargs {
            let Some(i) = self.params.iter().position(|p| p.name == key) else {
                return Err(Failure::type_error(format!(
                    "{name}() got an unexpected keyword argument '{key}'"
                )));
            };
            if slots[i].is_some() {
                return Err(Failure::type_error(format!(
                    "{name}() got multiple values for argument '{key}'"
                )));
            }
            slots[i] = Some(value);
        }

        slots
            .into_iter()
            .zip(&self.params)
            .map(|(slot, param)| {
                slot.or_else(|| param.default.clone()).ok_or_else(|| {
                    Failure::type_error(format!(
                        "{name}() missing required argument: '{}'",
                        param.name
                    ))
                })
            })
            .collect()
    }
}

/// Modules of native functions, keyed by module path then function name.
#[derive(Debug, Default)]
pub struct Registry {
    modules: BTreeMap<String, BTreeMap<String, Function>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `builtins`, `math` and `text`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        register_builtins(&mut registry);
        register_math(&mut registry);
        register_text(&mut registry);
        registry
    }

    pub fn register(&mut self, module: impl Into<String>, function: Function) -> &mut Self {
        self.modules
            .entry(module.into())
            .or_default()
            .insert(function.name.clone(), function);
        self
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains_key(module)
    }

    pub fn resolve(&self, target: &Target) -> Result<&Function, Failure> {
        let module = self.modules.get(&target.module).ok_or_else(|| {
            Failure::new(
                "ModuleNotFoundError",
                format!("No module named '{}'", target.module),
            )
        })?;
        module.get(&target.attr).ok_or_else(|| {
            Failure::new(
                "AttributeError",
                format!(
                    "module '{}' has no attribute '{}'",
                    target.module, target.attr
                ),
            )
        })
    }
}

fn expect_str<'a>(func: &str, value: &'a Value) -> Result<&'a str, Failure> {
    value.as_str().ok_or_else(|| {
        Failure::type_error(format!(
            "{func}() expected str, got '{}'",
            ops::type_name(value)
        ))
    })
}

fn expect_list<'a>(func: &str, value: &'a Value) -> Result<&'a [Value], Failure> {
    value.as_array().map(Vec::as_slice).ok_or_else(|| {
        Failure::type_error(format!(
            "{func}() expected list, got '{}'",
            ops::type_name(value)
        ))
    })
}

fn expect_num(func: &str, value: &Value) -> Result<Num, Failure> {
    Num::from_value(value).ok_or_else(|| {
        Failure::type_error(format!(
            "{func}() expected a number, got '{}'",
            ops::type_name(value)
        ))
    })
}

fn float_to_int(func: &str, f: f64) -> Result<Value, Failure> {
    if !f.is_finite() {
        return Err(Failure::new(
            "OverflowError",
            format!("{func}() cannot convert {f} to int"),
        ));
    }
    let t = f.trunc();
    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
        return Err(Failure::new("OverflowError", "integer result out of range"));
    }
    Ok(Value::from(t as i64))
}

/// `str()` rendering: strings pass through, other values print as JSON.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn extreme(func: &'static str, args: Vec<Value>, want: Ordering) -> Result<Value, Failure> {
    let items = match args.as_slice() {
        [Value::Array(items)] => items.clone(),
        [] => {
            return Err(Failure::type_error(format!(
                "{func} expected at least 1 argument, got 0"
            )));
        }
        _ => args,
    };
    let mut iter = items.into_iter();
    let mut best = iter.next().ok_or_else(|| {
        Failure::new("ValueError", format!("{func}() arg is an empty sequence"))
    })?;
    for item in iter {
        if ops::compare(BinOp::Lt, &item, &best)? == want {
            best = item;
        }
    }
    Ok(best)
}

fn register_builtins(r: &mut Registry) {
    const M: &str = "builtins";

    r.register(
        M,
        Function::fixed("len", &["obj"], |a| {
            let n = match &a[0] {
                Value::String(s) => s.chars().count(),
                Value::Array(v) => v.len(),
                Value::Object(m) => m.len(),
                other => {
                    return Err(Failure::type_error(format!(
                        "object of type '{}' has no len()",
                        ops::type_name(other)
                    )));
                }
            };
            Ok(Value::from(n))
        }),
    );
    r.register(
        M,
        Function::fixed("str", &["obj"], |a| Ok(Value::String(display(&a[0])))),
    );
    r.register(
        M,
        Function::fixed("int", &["x"], |a| match &a[0] {
            Value::Bool(b) => Ok(Value::from(i64::from(*b))),
            Value::String(s) => s.trim().replace('_', "").parse::<i64>().map(Value::from).map_err(|_| {
                Failure::new(
                    "ValueError",
                    format!("invalid literal for int() with base 10: '{s}'"),
                )
            }),
            other => match expect_num("int", other)? {
                Num::Int(i) => Ok(Value::from(i)),
                Num::Float(f) => float_to_int("int", f),
            },
        }),
    );
    r.register(
        M,
        Function::fixed("float", &["x"], |a| match &a[0] {
            Value::Bool(b) => ops::float_value(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => {
                let f = s.trim().parse::<f64>().map_err(|_| {
                    Failure::new(
                        "ValueError",
                        format!("could not convert string to float: '{s}'"),
                    )
                })?;
                ops::float_value(f)
            }
            other => ops::float_value(expect_num("float", other)?.as_f64()),
        }),
    );
    r.register(
        M,
        Function::fixed("bool", &["x"], |a| Ok(Value::Bool(ops::truthy(&a[0])))),
    );
    r.register(
        M,
        Function::fixed("abs", &["x"], |a| match expect_num("abs", &a[0])? {
            Num::Int(i) => i
                .checked_abs()
                .map(Value::from)
                .ok_or_else(|| Failure::new("OverflowError", "integer result out of range")),
            Num::Float(f) => ops::float_value(f.abs()),
        }),
    );
    r.register(M, Function::variadic("min", |a| extreme("min", a, Ordering::Less)));
    r.register(M, Function::variadic("max", |a| extreme("max", a, Ordering::Greater)));
    r.register(
        M,
        Function::new(
            "sum",
            vec![Param::required("items"), Param::optional("start", Value::from(0))],
            |a| {
                expect_list("sum", &a[0])?
                    .iter()
                    .try_fold(a[1].clone(), |acc, item| ops::add(&acc, item))
            },
        ),
    );
    r.register(
        M,
        Function::new(
            "sorted",
            vec![
                Param::required("items"),
                Param::optional("reverse", Value::Bool(false)),
            ],
            |a| {
                let mut items = expect_list("sorted", &a[0])?.to_vec();
                check_sortable(&items.iter().collect::<Vec<_>>())?;
                items.sort_by(|x, y| ops::compare(BinOp::Lt, x, y).unwrap_or(Ordering::Equal));
                if ops::truthy(&a[1]) {
                    items.reverse();
                }
                Ok(Value::Array(items))
            },
        ),
    );
    r.register(
        M,
        Function::new(
            "range",
            vec![
                Param::required("start"),
                Param::optional("stop", Value::Null),
                Param::optional("step", Value::from(1)),
            ],
            |a| {
                let int = |v: &Value| match Num::from_value(v) {
                    Some(Num::Int(i)) => Ok(i),
                    _ => Err(Failure::type_error(format!(
                        "range() expected int, got '{}'",
                        ops::type_name(v)
                    ))),
                };
                let (start, stop) = match &a[1] {
                    Value::Null => (0, int(&a[0])?),
                    stop => (int(&a[0])?, int(stop)?),
                };
                let step = int(&a[2])?;
                if step == 0 {
                    return Err(Failure::new("ValueError", "range() arg 3 must not be zero"));
                }
                let span = if step > 0 {
                    i128::from(stop) - i128::from(start)
                } else {
                    i128::from(start) - i128::from(stop)
                };
                let len = if span <= 0 {
                    0
                } else {
                    (span + i128::from(step.unsigned_abs()) - 1) / i128::from(step.unsigned_abs())
                };
                if len > MAX_SEQUENCE_LEN as i128 {
                    return Err(Failure::new(
                        "MemoryError",
                        format!("range of {len} elements exceeds the {MAX_SEQUENCE_LEN} element limit"),
                    ));
                }
                Ok(Value::Array(
                    (0..len)
                        .map(|i| Value::from((i128::from(start) + i * i128::from(step)) as i64))
                        .collect(),
                ))
            },
        ),
    );
    r.register(
        M,
        Function::fixed("keys", &["mapping"], |a| match &a[0] {
            Value::Object(m) => Ok(Value::Array(m.keys().cloned().map(Value::String).collect())),
            other => Err(Failure::type_error(format!(
                "keys() expected dict, got '{}'",
                ops::type_name(other)
            ))),
        }),
    );
    r.register(
        M,
        Function::fixed("values", &["mapping"], |a| match &a[0] {
            Value::Object(m) => Ok(Value::Array(m.values().cloned().collect())),
            other => Err(Failure::type_error(format!(
                "values() expected dict, got '{}'",
                ops::type_name(other)
            ))),
        }),
    );
}

fn register_math(r: &mut Registry) {
    const M: &str = "math";

    for (name, op) in [
        ("add", BinOp::Add),
        ("sub", BinOp::Sub),
        ("mul", BinOp::Mul),
        ("div", BinOp::Div),
    ] {
        r.register(
            M,
            Function::fixed(name, &["a", "b"], move |a| {
                let (x, y) = (expect_num(name, &a[0])?, expect_num(name, &a[1])?);
                ops::arith(op, x, y)?.into_value()
            }),
        );
    }

    r.register(
        M,
        Function::new(
            "pow",
            vec![Param::required("base"), Param::optional("exp", Value::from(2))],
            |a| match (expect_num("pow", &a[0])?, expect_num("pow", &a[1])?) {
                (Num::Int(b), Num::Int(e)) if e >= 0 => u32::try_from(e)
                    .ok()
                    .and_then(|e| b.checked_pow(e))
                    .map(Value::from)
                    .ok_or_else(|| Failure::new("OverflowError", "integer result out of range")),
                (Num::Int(0), Num::Int(_)) => Err(Failure::new(
                    "ZeroDivisionError",
                    "0 cannot be raised to a negative power",
                )),
                (b, e) => ops::float_value(b.as_f64().powf(e.as_f64())),
            },
        ),
    );
    r.register(
        M,
        Function::fixed("sqrt", &["x"], |a| {
            let x = expect_num("sqrt", &a[0])?.as_f64();
            if x < 0.0 {
                return Err(Failure::new("ValueError", "math domain error"));
            }
            ops::float_value(x.sqrt())
        }),
    );
    r.register(
        M,
        Function::fixed("floor", &["x"], |a| match expect_num("floor", &a[0])? {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => float_to_int("floor", f.floor()),
        }),
    );
    r.register(
        M,
        Function::fixed("ceil", &["x"], |a| match expect_num("ceil", &a[0])? {
            Num::Int(i) => Ok(Value::from(i)),
            Num::Float(f) => float_to_int("ceil", f.ceil()),
        }),
    );
}

fn register_text(r: &mut Registry) {
    const M: &str = "text";

    r.register(
        M,
        Function::fixed("upper", &["s"], |a| {
            Ok(Value::String(expect_str("upper", &a[0])?.to_uppercase()))
        }),
    );
    r.register(
        M,
        Function::fixed("lower", &["s"], |a| {
            Ok(Value::String(expect_str("lower", &a[0])?.to_lowercase()))
        }),
    );
    r.register(
        M,
        Function::fixed("strip", &["s"], |a| {
            Ok(Value::String(expect_str("strip", &a[0])?.trim().to_string()))
        }),
    );
    r.register(
        M,
        Function::new(
            "split",
            vec![Param::required("s"), Param::optional("sep", Value::from(" "))],
            |a| {
                let s = expect_str("split", &a[0])?;
                let sep = expect_str("split", &a[1])?;
                if sep.is_empty() {
                    return Err(Failure::new("ValueError", "empty separator"));
                }
                Ok(Value::Array(
                    s.split(sep).map(|p| Value::String(p.to_string())).collect(),
                ))
            },
        ),
    );
    r.register(
        M,
        Function::new(
            "join",
            vec![Param::required("items"), Param::optional("sep", Value::from(""))],
            |a| {
                let sep = expect_str("join", &a[1])?;
                let parts = expect_list("join", &a[0])?
                    .iter()
                    .map(|item| expect_str("join", item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::String(parts.join(sep)))
            },
        ),
    );
    r.register(
        M,
        Function::fixed("replace", &["s", "old", "new"], |a| {
            let s = expect_str("replace", &a[0])?;
            let old = expect_str("replace", &a[1])?;
            let new = expect_str("replace", &a[2])?;
            Ok(Value::String(s.replace(old, new)))
        }),
    );
}

/// Fails unless every pair in `items` compares, so `sort_by` sees a total order.
///
/// Lists only need comparable elements where their prefixes agree, as in
/// `[[1, "a"], [2, 3]]`; runs of equal prefixes are walked column by column.
fn check_sortable(items: &[&Value]) -> Result<(), Failure> {
    fn rank(value: &Value) -> Option<u8> {
        match value {
            Value::Number(_) => Some(0),
            Value::String(_) => Some(1),
            Value::Array(_) => Some(2),
            _ => None,
        }
    }
    let order = |x: &Value, y: &Value| ops::compare(BinOp::Lt, x, y).unwrap_or(Ordering::Equal);

    let Some(first) = items.first() else {
        return Ok(());
    };
    for item in &items[1..] {
        if rank(first).is_none() || rank(item) != rank(first) {
            ops::compare(BinOp::Lt, first, item)?;
        }
    }

    let mut pending: Vec<(Vec<&Vec<Value>>, usize)> =
        vec![(items.iter().filter_map(|v| v.as_array()).collect(), 0)];
    while let Some((mut lists, column)) = pending.pop() {
        lists.retain(|l| l.len() > column);
        if lists.len() < 2 {
            continue;
        }
        let cells: Vec<&Value> = lists.iter().map(|l| &l[column]).collect();
        check_sortable(&cells)?;
        lists.sort_by(|x, y| order(&x[column], &y[column]));
        for run in lists.chunk_by(|x, y| order(&x[column], &y[column]) == Ordering::Equal) {
            pending.push((run.to_vec(), column + 1));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(target: &str, args: Value, kwargs: Value) -> Result<Value, Failure> {
        let registry = Registry::standard();
        let target = Target::parse(target).unwrap();
        let Value::Array(args) = args else { panic!() };
        let Value::Object(kwargs) = kwargs else { panic!() };
        registry.resolve(&target)?.invoke(args, kwargs)
    }

    #[test]
    fn defaults_and_keywords_bind() {
        assert_eq!(call("math:pow", json!([5]), json!({})).unwrap(), json!(25));
        assert_eq!(call("math:pow", json!([2]), json!({"exp": 10})).unwrap(), json!(1024));
        assert_eq!(
            call("math:pow", json!([]), json!({"base": 3, "exp": 3})).unwrap(),
            json!(27)
        );
    }

    #[test]
    fn binding_errors_are_type_errors() {
        let err = call("math:add", json!([1]), json!({})).unwrap_err();
        assert_eq!(err.render(), "TypeError: add() missing required argument: 'b'");

        let err = call("math:add", json!([1, 2, 3]), json!({})).unwrap_err();
        assert_eq!(
            err.render(),
            "TypeError: add() takes 2 positional arguments but 3 were given"
        );

        let err = call("math:add", json!([1, 2]), json!({"a": 1})).unwrap_err();
        assert!(err.message.contains("multiple values for argument 'a'"));

        let err = call("math:add", json!([1, 2]), json!({"c": 1})).unwrap_err();
        assert!(err.message.contains("unexpected keyword argument 'c'"));
    }

    #[test]
    fn unresolvable_targets() {
        let err = call("nosuch:f", json!([]), json!({})).unwrap_err();
        assert_eq!(err.render(), "ModuleNotFoundError: No module named 'nosuch'");
        let err = call("math:nosuch", json!([]), json!({})).unwrap_err();
        assert_eq!(err.kind, "AttributeError");
    }

    #[test]
    fn builtins() {
        assert_eq!(call("builtins:len", json!(["héllo"]), json!({})).unwrap(), json!(5));
        assert_eq!(call("builtins:max", json!([3, 9, 2]), json!({})).unwrap(), json!(9));
        assert_eq!(call("builtins:min", json!([[3, 9, 2]]), json!({})).unwrap(), json!(2));
        assert_eq!(
            call("builtins:sorted", json!([[3, 1, 2]]), json!({"reverse": true})).unwrap(),
            json!([3, 2, 1])
        );
        assert_eq!(call("builtins:sum", json!([[1, 2, 3.5]]), json!({})).unwrap(), json!(6.5));
        assert_eq!(call("builtins:range", json!([3]), json!({})).unwrap(), json!([0, 1, 2]));
        assert_eq!(
            call("builtins:range", json!([5, 0, -2]), json!({})).unwrap(),
            json!([5, 3, 1])
        );
        assert_eq!(call("builtins:int", json!([" 42 "]), json!({})).unwrap(), json!(42));
        assert_eq!(call("builtins:int", json!([-2.7]), json!({})).unwrap(), json!(-2));
        assert_eq!(call("builtins:str", json!([[1]]), json!({})).unwrap(), json!("[1]"));
        assert_eq!(
            call("builtins:values", json!([{"a": [2]}]), json!({})).unwrap(),
            json!([[2]])
        );
    }

    #[test]
    fn builtin_failures() {
        assert_eq!(
            call("builtins:int", json!(["x"]), json!({})).unwrap_err().kind,
            "ValueError"
        );
        assert_eq!(
            call("builtins:max", json!([[]]), json!({})).unwrap_err().kind,
            "ValueError"
        );
        assert_eq!(
            call("builtins:sorted", json!([[1, "a"]]), json!({})).unwrap_err().kind,
            "TypeError"
        );
        let err = call("builtins:sorted", json!([[3, 1, "a", 2]]), json!({})).unwrap_err();
        assert_eq!(
            err.render(),
            "TypeError: '<' not supported between instances of 'int' and 'str'"
        );
        assert_eq!(
            call("builtins:sorted", json!([[[2, 3], [1, "a"], [2, "b"]]]), json!({}))
                .unwrap_err()
                .kind,
            "TypeError"
        );
        assert_eq!(
            call("builtins:range", json!([0, 1, 0]), json!({})).unwrap_err().kind,
            "ValueError"
        );
    }

    #[test]
    fn sorted_orders_comparable_items() {
        let sorted =
            |items: Value, kwargs: Value| call("builtins:sorted", json!([items]), kwargs).unwrap();
        assert_eq!(sorted(json!([2.5, 1, -3, 2]), json!({})), json!([-3, 1, 2, 2.5]));
        assert_eq!(sorted(json!(["b", "c", "a"]), json!({"reverse": true})), json!(["c", "b", "a"]));
        assert_eq!(
            sorted(json!([[2, 3], [1, "a"], [2], [1, "b"]]), json!({})),
            json!([[1, "a"], [1, "b"], [2], [2, 3]])
        );
        assert_eq!(sorted(json!([null]), json!({})), json!([null]));
        assert_eq!(sorted(json!([]), json!({})), json!([]));
    }

    #[test]
    fn math_and_text() {
        assert_eq!(call("math:div", json!([1, 4]), json!({})).unwrap(), json!(0.25));
        assert_eq!(call("math:sqrt", json!([9]), json!({})).unwrap(), json!(3.0));
        assert_eq!(call("math:floor", json!([-1.5]), json!({})).unwrap(), json!(-2));
        assert_eq!(call("math:ceil", json!([1.2]), json!({})).unwrap(), json!(2));
        assert_eq!(
            call("math:sqrt", json!([-1]), json!({})).unwrap_err().render(),
            "ValueError: math domain error"
        );
        assert_eq!(
            call("text:split", json!(["a,b"]), json!({"sep": ","})).unwrap(),
            json!(["a", "b"])
        );
        assert_eq!(
            call("text:join", json!([["a", "b"], "-"]), json!({})).unwrap(),
            json!("a-b")
        );
        assert_eq!(
            call("text:replace", json!(["aXa", "X", "-"]), json!({})).unwrap(),
            json!("a-a")
        );
        assert_eq!(call("text:upper", json!(["hi"]), json!({})).unwrap(), json!("HI"));
    }

    #[test]
    fn custom_registration() {
        let mut registry = Registry::new();
        registry.register(
            "app",
            Function::new(
                "f",
                vec![Param::required("a"), Param::optional("b", json!(2))],
                |a| ops::binary(BinOp::Mul, &a[0], &a[1]),
            ),
        );
        let target = Target::parse("app:f").unwrap();
        let f = registry.resolve(&target).unwrap();
        assert_eq!(f.name(), "f");
        assert_eq!(f.invoke(vec![json!(5)], Map::new()).unwrap(), json!(10));
        assert!(registry.has_module("app"));
        assert!(!registry.has_module("math"));
    }
}
