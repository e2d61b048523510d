//! 🧽 Lenient field readers — because the POS terminals were written by four different
//! vendors and none of them agreed on whether an id is a string or a number.
//!
//! [`Fields`] wraps one JSON object and reads typed values out of it:
//! - missing or null → the zero value (`""`, `0`, unset time)
//! - keys match exactly first, then ASCII case-insensitively (`orderId` finds `orderid`)
//! - a value of the wrong shape is an `Err(reason)`, which the mapper turns into
//!   `MalformedDocument`
//!
//! 🦆

use serde_json::{Map, Value};

use crate::rows::OcTime;

/// 💀 Why a field could not be read. Plain text, because it ends up in the audit log.
pub type Reason = String;

static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();

/// 🔍 A read-only view over one JSON object.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
    path: &'a str,
}

impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Value>, path: &'a str) -> Self {
        Self { map, path }
    }

    /// 🕳️ An object with nothing in it. Every read returns the zero value.
    pub fn empty(path: &'a str) -> Self {
        Self {
            map: EMPTY.get_or_init(Map::new),
            path,
        }
    }

    /// 📦 View `value` as an object. Null means empty; any other non-object is a shape error.
    pub fn of(value: Option<&'a Value>, path: &'a str) -> Result<Self, Reason> {
        match value {
            None | Some(Value::Null) => Ok(Self::empty(path)),
            Some(Value::Object(map)) => Ok(Self::new(map, path)),
            Some(other) => Err(format!("'{path}' should be an object, got {}", kind_of(other))),
        }
    }

    pub fn path(&self) -> &'a str {
        self.path
    }

    /// 🔑 Exact key first, then any key that matches ignoring ASCII case.
    pub fn get(&self, key: &str) -> Option<&'a Value> {
        self.map.get(key).or_else(|| {
            self.map
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v)
        })
    }

    /// 📦 A nested object. Missing or null is an empty object.
    pub fn object(&self, key: &str, path: &'a str) -> Result<Fields<'a>, Reason> {
        Fields::of(self.get(key), path)
    }

    /// 📋 A list of objects. Missing or null is an empty list.
    pub fn list(&self, key: &str) -> Result<Vec<Fields<'a>>, Reason> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| Fields::of(Some(item), self.path))
                .collect(),
            Some(other) => Err(format!(
                "'{}.{key}' should be a list, got {}",
                self.path,
                kind_of(other)
            )),
        }
    }

    /// 🪪 Identity-like: quoted or unquoted, always a plain string. Null is `""`.
    pub fn identity(&self, key: &str) -> String {
        match self.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// 🔤 Free text. Numbers and booleans are stringified rather than refused.
    pub fn text(&self, key: &str) -> Result<String, Reason> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(String::new()),
            Some(Value::String(s)) => Ok(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Ok(v.to_string()),
            Some(other) => Err(self.wrong_shape(key, "text", other)),
        }
    }

    /// 🔢 Integer: a JSON integer or a numeric string. Empty string and null are 0.
    pub fn int(&self, key: &str) -> Result<i64, Reason> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(0),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15).map(|f| f as i64))
                .ok_or_else(|| format!("'{}.{key}' should be an integer, got {n}", self.path)),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(0),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("'{}.{key}' should be an integer, got \"{s}\"", self.path)),
            Some(other) => Err(self.wrong_shape(key, "an integer", other)),
        }
    }

    /// 🎲 For columns that store integers but the source treats as free identifiers.
    /// Whatever doesn't parse is 0. No questions asked.
    pub fn lenient_int(&self, key: &str) -> i64 {
        atoi_lenient(&self.identity(key))
    }

    /// 🕰️ `YYYY-MM-DD HH:MM:SS`, or unset for `""`, `"null"` and null.
    pub fn time(&self, key: &str) -> Result<OcTime, Reason> {
        match self.get(key) {
            None | Some(Value::Null) => Ok(OcTime::UNSET),
            Some(Value::String(s)) => OcTime::parse(s).map_err(|e| {
                format!("'{}.{key}' should look like 2019-03-07 12:00:00, got \"{s}\" ({e})", self.path)
            }),
            Some(other) => Err(self.wrong_shape(key, "a timestamp", other)),
        }
    }

    /// ✅ A boolean flag. Only literal `true` counts.
    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::Bool(true)))
    }

    fn wrong_shape(&self, key: &str, wanted: &str, got: &Value) -> Reason {
        format!("'{}.{key}' should be {wanted}, got {}", self.path, kind_of(got))
    }
}

/// 🎲 `"42"` → 42, `" 7 "` → 7, `"abc"` → 0, `""` → 0.
pub fn atoi_lenient(raw: &str) -> i64 {
    raw.trim().parse::<i64>().unwrap_or(0)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
