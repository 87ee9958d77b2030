//! Scannable - named-attribute introspection for diagnostics and tests

use std::fmt;

/// Attribute keys a sink may answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attr {
    /// Completed or errored
    Terminated,
    /// Cancelled by its subscribers
    Cancelled,
    /// Backlog capacity (`usize::MAX` when unbounded)
    Capacity,
    /// Values currently retained
    Buffered,
    /// Live subscriber count
    Subscribers,
    /// Flavor description
    Name,
    /// Calls rejected by the serialization guard
    Rejected,
}

/// Attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    Bool(bool),
    Usize(usize),
    Str(String),
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Usize(n) => write!(f, "{n}"),
            AttrValue::Str(s) => f.write_str(s),
        }
    }
}

/// Introspection capability
///
/// Optional for correctness; unknown attributes answer `None`.
pub trait Scannable {
    fn scan(&self, attr: Attr) -> Option<AttrValue>;

    fn scan_bool(&self, attr: Attr) -> bool {
        matches!(self.scan(attr), Some(AttrValue::Bool(true)))
    }

    fn scan_usize(&self, attr: Attr) -> Option<usize> {
        match self.scan(attr) {
            Some(AttrValue::Usize(n)) => Some(n),
            _ => None,
        }
    }
}
