#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod parse;

pub use self::parse::{ParseError, ParseErrorKind};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Arc,
};

#[derive(Clone, Debug, Eq, Default)]
pub struct Labels(Arc<Map>);

pub type Map = BTreeMap<String, String>;

/// A boolean expression over an endpoint's labels.
///
/// Selectors are written in a small expression language, e.g.
/// `role == 'web' && !has(quarantine)`, and are built with [`str::parse`].
/// The empty expression selects everything.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Selector {
    All,
    Has(String),
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Not(Box<Selector>),
    And(Box<Selector>, Box<Selector>),
    Or(Box<Selector>, Box<Selector>),
}

// === Selector ===

impl Selector {
    pub fn matches(&self, labels: &Labels) -> bool {
        self.eval(labels.as_ref())
    }

    fn eval(&self, labels: &Map) -> bool {
        match self {
            Self::All => true,
            Self::Has(k) => labels.contains_key(k),
            Self::Equals(k, v) => labels.get(k) == Some(v),
            Self::NotEquals(k, v) => labels.get(k) != Some(v),
            Self::In(k, vs) => labels.get(k).map(|v| vs.contains(v)).unwrap_or(false),
            Self::NotIn(k, vs) => labels.get(k).map(|v| !vs.contains(v)).unwrap_or(true),
            Self::Not(s) => !s.eval(labels),
            Self::And(a, b) => a.eval(labels) && b.eval(labels),
            Self::Or(a, b) => a.eval(labels) || b.eval(labels),
        }
    }

    /// Returns a selector that matches when both `self` and `other` match.
    pub fn and(self, other: Selector) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// Returns a selector that matches when either `self` or `other` matches.
    pub fn or(self, other: Selector) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }
}

impl Default for Selector {
    fn default() -> Self {
        Self::All
    }
}

impl std::str::FromStr for Selector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The grammar has no escapes, so pick whichever quote the value doesn't contain.
        fn quote(f: &mut fmt::Formatter<'_>, v: &str) -> fmt::Result {
            if v.contains('\'') {
                write!(f, "\"{}\"", v)
            } else {
                write!(f, "'{}'", v)
            }
        }

        fn set(f: &mut fmt::Formatter<'_>, vs: &BTreeSet<String>) -> fmt::Result {
            write!(f, "{{")?;
            for (i, v) in vs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                quote(f, v)?;
            }
            write!(f, "}}")
        }

        match self {
            Self::All => write!(f, "all()"),
            Self::Has(k) => write!(f, "has({})", k),
            Self::Equals(k, v) => {
                write!(f, "{} == ", k)?;
                quote(f, v)
            }
            Self::NotEquals(k, v) => {
                write!(f, "{} != ", k)?;
                quote(f, v)
            }
            Self::In(k, vs) => {
                write!(f, "{} in ", k)?;
                set(f, vs)
            }
            Self::NotIn(k, vs) => {
                write!(f, "{} not in ", k)?;
                set(f, vs)
            }
            Self::Not(s) => write!(f, "!({})", s),
            Self::And(a, b) => write!(f, "({} && {})", a, b),
            Self::Or(a, b) => write!(f, "({} || {})", a, b),
        }
    }
}

// === Labels ===

impl Labels {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}

impl From<Map> for Labels {
    #[inline]
    fn from(labels: Map) -> Self {
        Self(Arc::new(labels))
    }
}

impl AsRef<Map> for Labels {
    #[inline]
    fn as_ref(&self) -> &Map {
        self.0.as_ref()
    }
}

impl<T: AsRef<Map>> std::cmp::PartialEq<T> for Labels {
    #[inline]
    fn eq(&self, t: &T) -> bool {
        self.0.as_ref().eq(t.as_ref())
    }
}

impl std::iter::FromIterator<(String, String)> for Labels {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(Arc::new(iter.into_iter().collect()))
    }
}

impl std::iter::FromIterator<(&'static str, &'static str)> for Labels {
    fn from_iter<T: IntoIterator<Item = (&'static str, &'static str)>>(iter: T) -> Self {
        iter.into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
