//! Path algebra over JSON trees.
//!
//! A [`Path`] is parsed from a dotted or bracketed selector (`a[0].b` and
//! `a.0.b` are the same path). [`get`] folds a path over a tree and yields
//! `None` (absent) as soon as a step cannot be taken. [`set`] writes in place
//! and never discards data that is already there:
//!
//! - a second write to the same field turns the field into a sequence
//!   (`{a: 1}` then `a = 2` gives `{a: [1, 2]}`);
//! - writing a keyed field into a sequence fans the write out across every
//!   mapping element, so one rule can fill a repeated group of any length.
//!
//! A stored `null` is vacant for writes: it is replaced rather than promoted.
//! Reads still distinguish `Some(&Value::Null)` from `None`. A numeric write
//! past the end pads with `null`, but never by more than [`MAX_INDEX_GAP`]
//! slots.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};

/// Most `null` slots a single numeric write may add past the end of a sequence.
pub const MAX_INDEX_GAP: usize = 1024;

/// Errors raised while parsing a selector into a [`Path`] or writing through one.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path `{0}` has no segments")]
    Empty(String),

    #[error("unclosed bracket in path `{0}`")]
    UnclosedBracket(String),

    #[error("index {index} is too far past the end of a sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// One step of a [`Path`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Segment(String);

impl Segment {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sequence index this segment denotes, if it is all ASCII digits.
    pub fn index(&self) -> Option<usize> {
        if !self.0.is_empty() && self.0.bytes().all(|b| b.is_ascii_digit()) {
            self.0.parse().ok()
        } else {
            None
        }
    }

    pub fn is_index(&self) -> bool {
        self.index().is_some()
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A non-empty ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// Parse a selector such as `a.b[0]` or `a['b'].c`.
    ///
    /// Brackets are rewritten to dots, then the string is split on `.` with
    /// empty pieces dropped. A selector without any segment is rejected.
    pub fn parse(selector: &str) -> Result<Self, PathError> {
        let normalized = normalize_brackets(selector)?;
        let segments: Vec<Segment> = normalized
            .split('.')
            .filter(|s| !s.is_empty())
            .map(Segment::new)
            .collect();

        if segments.is_empty() {
            return Err(PathError::Empty(selector.to_string()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// The final segment. Paths are never empty.
    pub fn last(&self) -> &Segment {
        &self.segments[self.segments.len() - 1]
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(seg.as_str())?;
        }
        Ok(())
    }
}

fn normalize_brackets(selector: &str) -> Result<String, PathError> {
    let mut out = String::with_capacity(selector.len());
    let mut chars = selector.chars();

    while let Some(c) = chars.next() {
        if c != '[' {
            out.push(c);
            continue;
        }
        let mut inner = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == ']' {
                closed = true;
                break;
            }
            inner.push(c);
        }
        if !closed {
            return Err(PathError::UnclosedBracket(selector.to_string()));
        }
        let inner = inner.trim();
        let inner = inner
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
            .unwrap_or(inner);
        out.push('.');
        out.push_str(inner);
    }
    Ok(out)
}

/// Structural classification of a slot in a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Missing, or holding `null`.
    Absent,
    Scalar,
    Sequence,
    Mapping,
}

impl Shape {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Null) => Shape::Absent,
            Some(Value::Array(_)) => Shape::Sequence,
            Some(Value::Object(_)) => Shape::Mapping,
            Some(_) => Shape::Scalar,
        }
    }

    pub fn is_container(self) -> bool {
        matches!(self, Shape::Sequence | Shape::Mapping)
    }
}

/// Resolve `path` against `tree`. Returns `None` when any step is missing.
pub fn get<'a>(tree: &'a Value, path: &Path) -> Option<&'a Value> {
    path.segments.iter().try_fold(tree, |node, seg| match node {
        Value::Object(map) => map.get(seg.as_str()),
        Value::Array(items) => seg.index().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at `path`, creating containers and branching as needed.
///
/// Fails only when a numeric segment would pad a sequence by more than
/// [`MAX_INDEX_GAP`] slots; nothing is written in that case for the failing
/// branch.
pub fn set(tree: &mut Value, path: &Path, value: Value) -> Result<(), PathError> {
    write(tree, &path.segments, value)
}

fn write(node: &mut Value, segments: &[Segment], value: Value) -> Result<(), PathError> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(());
    };

    if node.is_null() {
        *node = fresh_container(head);
    }

    match node {
        Value::Object(map) => write_key(map, head, rest, value),
        Value::Array(items) => match head.index() {
            Some(idx) => write_index(items, idx, rest, value),
            None => write_across(items, head, rest, value),
        },
        other => {
            tracing::debug!(segment = head.as_str(), scalar = %other, "dropping write below a scalar");
            Ok(())
        }
    }
}

fn write_key(
    map: &mut Map<String, Value>,
    key: &Segment,
    rest: &[Segment],
    value: Value,
) -> Result<(), PathError> {
    if !rest.is_empty() {
        let child = map.entry(key.as_str()).or_insert(Value::Null);
        return descend(child, rest, value);
    }

    match map.get_mut(key.as_str()) {
        None | Some(Value::Null) => {
            map.insert(key.as_str().to_string(), value);
        }
        Some(Value::Array(items)) => items.push(value),
        Some(slot) => promote(slot, value),
    }
    Ok(())
}

fn write_index(
    items: &mut Vec<Value>,
    idx: usize,
    rest: &[Segment],
    value: Value,
) -> Result<(), PathError> {
    let len = items.len();
    if idx >= len {
        let out_of_range = PathError::IndexOutOfRange { index: idx, len };
        if idx - len > MAX_INDEX_GAP {
            return Err(out_of_range);
        }
        let new_len = idx.checked_add(1).ok_or(out_of_range)?;
        items.resize(new_len, Value::Null);
    }
    let slot = &mut items[idx];

    if !rest.is_empty() {
        return descend(slot, rest, value);
    }

    match slot {
        Value::Null => *slot = value,
        Value::Array(inner) => inner.push(value),
        _ => promote(slot, value),
    }
    Ok(())
}

/// A keyed segment applied to a sequence: fan out over its mapping elements.
fn write_across(
    items: &mut Vec<Value>,
    key: &Segment,
    rest: &[Segment],
    value: Value,
) -> Result<(), PathError> {
    let all_scalar = items
        .iter()
        .all(|v| !Shape::of(Some(v)).is_container());

    if all_scalar {
        if rest.is_empty() {
            let mut map = Map::new();
            map.insert(key.as_str().to_string(), value);
            items.push(Value::Object(map));
            return Ok(());
        }
        items.push(Value::Object(Map::new()));
    }

    for item in items.iter_mut() {
        match item {
            Value::Object(map) => write_key(map, key, rest, value.clone())?,
            Value::Array(inner) if !rest.is_empty() => {
                write_across(inner, key, rest, value.clone())?
            }
            // Scalars mixed in with containers do not receive the write.
            _ => {}
        }
    }
    Ok(())
}

/// Continue a write below an existing slot.
fn descend(slot: &mut Value, rest: &[Segment], value: Value) -> Result<(), PathError> {
    if Shape::of(Some(slot)) == Shape::Scalar {
        let old = slot.take();
        *slot = Value::Array(vec![old]);
    }
    write(slot, rest, value)
}

fn promote(slot: &mut Value, value: Value) {
    let old = slot.take();
    *slot = Value::Array(vec![old, value]);
}

fn fresh_container(next: &Segment) -> Value {
    if next.is_index() {
        Value::Array(Vec::new())
    } else {
        Value::Object(Map::new())
    }
}
