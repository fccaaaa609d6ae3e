//! Expression interpreter and built-in functions.

use action_mapper::{get, set, EvaluatorError, Path};
use serde_json::{Map, Number, Value};

use super::parser::Expr;

/// Resource and capability limits for one evaluator mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Allows `env()` and `now()`.
    pub host_access: bool,
    /// Longest accepted expression, in bytes.
    pub max_len: Option<usize>,
    pub max_depth: Option<usize>,
    /// Evaluation steps (one per node visited).
    pub max_steps: Option<usize>,
}

impl Limits {
    pub const fn unrestricted() -> Self {
        Self {
            host_access: true,
            max_len: None,
            max_depth: None,
            max_steps: None,
        }
    }

    pub const fn sandboxed() -> Self {
        Self {
            host_access: false,
            max_len: Some(1024),
            max_depth: Some(16),
            max_steps: Some(256),
        }
    }
}

/// Evaluates one parsed expression against a bound value.
pub struct Interpreter<'a> {
    bound: &'a Value,
    limits: Limits,
    steps: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(bound: &'a Value, limits: Limits) -> Self {
        Self {
            bound,
            limits,
            steps: 0,
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Option<Value>, EvaluatorError> {
        self.steps += 1;
        if let Some(max) = self.limits.max_steps {
            if self.steps > max {
                return Err(err(format!("step limit of {max} exceeded")));
            }
        }

        match expr {
            Expr::Literal(v) => Ok(Some(v.clone())),
            Expr::Selector(None) => Ok(Some(self.bound.clone())),
            Expr::Selector(Some(path)) => Ok(get(self.bound, path).cloned()),
            Expr::Concat(terms) => {
                let values = self.eval_all(terms)?;
                Ok(concat(values))
            }
            Expr::Call { name, args } => {
                let values = self.eval_all(args)?;
                self.call(name, values)
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Result<Vec<Option<Value>>, EvaluatorError> {
        exprs.iter().map(|e| self.eval(e)).collect()
    }

    fn call(&self, name: &str, args: Vec<Option<Value>>) -> Result<Option<Value>, EvaluatorError> {
        match name {
            "concat" => Ok(Some(Value::String(
                args.iter().flatten().map(stringify).collect(),
            ))),
            "lower" => map_text(name, args, |s| s.to_lowercase()),
            "upper" => map_text(name, args, |s| s.to_uppercase()),
            "trim" => map_text(name, args, |s| s.trim().to_string()),
            "join" => join(args),
            "split" => split(args),
            "len" => {
                let [arg] = arity::<1>(name, args)?;
                len(arg)
            }
            "first" => {
                let [arg] = arity::<1>(name, args)?;
                Ok(match arg {
                    Some(Value::Array(items)) => items.into_iter().next(),
                    other => other,
                })
            }
            "default" => Ok(args.into_iter().flatten().find(|v| !v.is_null())),
            "number" => {
                let [arg] = arity::<1>(name, args)?;
                arg.map(to_number).transpose()
            }
            "string" => {
                let [arg] = arity::<1>(name, args)?;
                Ok(arg.map(|v| Value::String(stringify(&v))))
            }
            "obj" => obj(args),
            "env" | "now" if !self.limits.host_access => {
                Err(err(format!("`{name}` is not available in the sandbox")))
            }
            "env" => {
                let [arg] = arity::<1>(name, args)?;
                let Some(Value::String(var)) = arg else {
                    return Err(err("env() takes a variable name"));
                };
                Ok(std::env::var(var).ok().map(Value::String))
            }
            "now" => {
                let [] = arity::<0>(name, args)?;
                Ok(Some(Value::String(chrono::Utc::now().to_rfc3339())))
            }
            other => Err(err(format!("unknown function `{other}`"))),
        }
    }
}

/// Numeric sum when every term is a number, string concatenation otherwise.
/// Absent terms are skipped.
fn concat(values: Vec<Option<Value>>) -> Option<Value> {
    let present: Vec<Value> = values.into_iter().flatten().collect();
    if present.is_empty() {
        return None;
    }

    if present.iter().all(Value::is_number) {
        if present.iter().all(|v| v.is_i64()) {
            let sum = present.iter().filter_map(Value::as_i64).try_fold(0i64, i64::checked_add);
            if let Some(sum) = sum {
                return Some(Value::from(sum));
            }
        }
        let sum: f64 = present.iter().filter_map(Value::as_f64).sum();
        return Number::from_f64(sum).map(Value::Number);
    }

    Some(Value::String(present.iter().map(stringify).collect()))
}

fn map_text(
    name: &str,
    args: Vec<Option<Value>>,
    f: impl Fn(&str) -> String,
) -> Result<Option<Value>, EvaluatorError> {
    let [arg] = arity::<1>(name, args)?;
    Ok(arg.map(|v| Value::String(f(&stringify(&v)))))
}

fn join(args: Vec<Option<Value>>) -> Result<Option<Value>, EvaluatorError> {
    let (seq, sep) = match args.len() {
        1 | 2 => {
            let mut args = args.into_iter();
            let seq = args.next().flatten();
            let sep = args.next().flatten().map_or_else(|| ",".to_string(), |v| stringify(&v));
            (seq, sep)
        }
        n => return Err(err(format!("join() takes 1 or 2 arguments, got {n}"))),
    };
    Ok(match seq {
        None => None,
        Some(Value::Array(items)) => Some(Value::String(
            items.iter().map(stringify).collect::<Vec<_>>().join(&sep),
        )),
        Some(scalar) => Some(Value::String(stringify(&scalar))),
    })
}

fn split(args: Vec<Option<Value>>) -> Result<Option<Value>, EvaluatorError> {
    let [text, sep] = arity::<2>("split", args)?;
    let (Some(text), Some(sep)) = (text, sep) else {
        return Ok(None);
    };
    let (text, sep) = (stringify(&text), stringify(&sep));
    if sep.is_empty() {
        return Err(err("split() separator must not be empty"));
    }
    Ok(Some(Value::Array(
        text.split(sep.as_str()).map(|s| Value::String(s.to_string())).collect(),
    )))
}

fn len(arg: Option<Value>) -> Result<Option<Value>, EvaluatorError> {
    let n = match arg {
        None => return Ok(None),
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        Some(other) => return Err(err(format!("len() of {other}"))),
    };
    Ok(Some(Value::from(n)))
}

fn to_number(value: Value) -> Result<Value, EvaluatorError> {
    match value {
        Value::Number(_) => Ok(value),
        Value::Bool(b) => Ok(Value::from(u8::from(b))),
        Value::String(ref s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(Value::from(i));
            }
            s.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| err(format!("cannot convert {value} to a number")))
        }
        other => Err(err(format!("cannot convert {other} to a number"))),
    }
}

/// `obj(path, value, ...)`: build a mapping by writing each pair with `set`.
fn obj(args: Vec<Option<Value>>) -> Result<Option<Value>, EvaluatorError> {
    if args.len() % 2 != 0 {
        return Err(err("obj() takes path/value pairs"));
    }
    let mut out = Value::Object(Map::new());
    let mut args = args.into_iter();
    while let (Some(key), Some(value)) = (args.next(), args.next()) {
        let Some(Value::String(key)) = key else {
            return Err(err("obj() paths must be strings"));
        };
        let path = Path::parse(key.trim_start_matches('$')).map_err(|e| err(e.to_string()))?;
        if let Some(value) = value {
            set(&mut out, &path, value).map_err(|e| err(e.to_string()))?;
        }
    }
    Ok(Some(out))
}

fn arity<const N: usize>(
    name: &str,
    args: Vec<Option<Value>>,
) -> Result<[Option<Value>; N], EvaluatorError> {
    let got = args.len();
    args.try_into()
        .map_err(|_| err(format!("{name}() takes {N} argument(s), got {got}")))
}

/// Text form of a value: strings bare, everything else as JSON.
pub(crate) fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn err(msg: impl Into<String>) -> EvaluatorError {
    EvaluatorError::new(msg)
}
