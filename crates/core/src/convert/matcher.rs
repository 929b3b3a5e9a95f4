//! Type matchers
//!
//! A [`TypeMatcher`] selects type definitions by name or structure. The
//! same matcher drives conversion rules and accessor path searches.
//!
//! | pattern            | matches                                   |
//! |--------------------|-------------------------------------------|
//! | `/NS/T`            | exactly `/NS/T`                           |
//! | `/NS/T[]`          | any array of `/NS/T` (`/NS/T[4]`, ...)    |
//! | `/std/vector<>`    | any instantiation of `/std/vector`        |
//! | regex              | names matching the expression             |

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use typelib_schema::{name, Specialization, TypeDefinition};

use crate::error::{Error, Result};

/// Predicate over type definitions
pub type TypePredicate = dyn Fn(&TypeDefinition) -> bool + Send + Sync;

/// Priority class of a matcher, highest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchClass {
    Exact,
    ArrayGeneric,
    ContainerGeneric,
    Pattern,
}

/// Selects type definitions
#[derive(Clone)]
pub enum TypeMatcher {
    /// Full type name
    Exact(String),
    /// Generic array name, `"<element>[]"`
    ArrayOf(String),
    /// Generic container name, `"<kind><>"`
    ContainerOf(String),
    Regex(Regex),
    /// Every type with this value strategy
    Kind(Specialization),
    /// Arbitrary predicate; `key` identifies it in memoization tables
    Custom {
        key: String,
        test: Arc<TypePredicate>,
    },
}

impl TypeMatcher {
    /// Parse a name pattern: `T[]` and `K<>` are generic, anything else is
    /// an exact name
    pub fn parse(pattern: &str) -> Result<Self> {
        if pattern.is_empty() {
            return Err(Error::mismatch(pattern, "empty type pattern"));
        }
        if pattern.len() > 2 && pattern.ends_with("[]") {
            Ok(TypeMatcher::ArrayOf(pattern.to_string()))
        } else if pattern.len() > 2 && pattern.ends_with("<>") {
            Ok(TypeMatcher::ContainerOf(pattern.to_string()))
        } else {
            Ok(TypeMatcher::Exact(pattern.to_string()))
        }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        TypeMatcher::Exact(name.into())
    }

    /// Any array of `element`
    pub fn array_of(element: &str) -> Self {
        TypeMatcher::ArrayOf(format!("{element}[]"))
    }

    /// Any instantiation of the container kind
    pub fn container_of(kind: &str) -> Self {
        TypeMatcher::ContainerOf(format!("{kind}<>"))
    }

    pub fn regex(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(TypeMatcher::Regex)
            .map_err(|err| Error::mismatch(pattern, format!("invalid pattern: {err}")))
    }

    pub fn kind(specialization: Specialization) -> Self {
        TypeMatcher::Kind(specialization)
    }

    pub fn custom<F>(key: impl Into<String>, test: F) -> Self
    where
        F: Fn(&TypeDefinition) -> bool + Send + Sync + 'static,
    {
        TypeMatcher::Custom {
            key: key.into(),
            test: Arc::new(test),
        }
    }

    pub fn matches(&self, ty: &TypeDefinition) -> bool {
        match self {
            TypeMatcher::Exact(name) => ty.name() == name,
            TypeMatcher::ArrayOf(pattern) => {
                ty.is_array()
                    && name::generic_array_name(ty.name()).is_some_and(|g| &g == pattern)
            }
            TypeMatcher::ContainerOf(pattern) => {
                ty.is_container()
                    && name::generic_container_name(ty.name()).is_some_and(|g| &g == pattern)
            }
            TypeMatcher::Regex(regex) => regex.is_match(ty.name()),
            TypeMatcher::Kind(specialization) => ty.specialization() == *specialization,
            TypeMatcher::Custom { test, .. } => test(ty),
        }
    }

    pub fn class(&self) -> MatchClass {
        match self {
            TypeMatcher::Exact(_) => MatchClass::Exact,
            TypeMatcher::ArrayOf(_) => MatchClass::ArrayGeneric,
            TypeMatcher::ContainerOf(_) => MatchClass::ContainerGeneric,
            TypeMatcher::Regex(_) | TypeMatcher::Kind(_) | TypeMatcher::Custom { .. } => {
                MatchClass::Pattern
            }
        }
    }

    /// The predicate of a custom matcher
    pub fn predicate(&self) -> Option<&Arc<TypePredicate>> {
        match self {
            TypeMatcher::Custom { test, .. } => Some(test),
            _ => None,
        }
    }

    /// Stable identity used as a memoization key; custom matchers are told
    /// apart by predicate, not by their label
    pub fn key(&self) -> String {
        match self {
            TypeMatcher::Exact(name) => format!("exact:{name}"),
            TypeMatcher::ArrayOf(pattern) => format!("array:{pattern}"),
            TypeMatcher::ContainerOf(pattern) => format!("container:{pattern}"),
            TypeMatcher::Regex(regex) => format!("regex:{}", regex.as_str()),
            TypeMatcher::Kind(specialization) => format!("kind:{specialization:?}"),
            TypeMatcher::Custom { key, test } => format!("custom:{key}@{:p}", Arc::as_ptr(test)),
        }
    }
}

impl fmt::Debug for TypeMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeMatcher({})", self.key())
    }
}

#[cfg(test)]
mod tests {
    use typelib_schema::Registry;

    use super::*;

    #[test]
    fn test_parse() {
        assert!(matches!(TypeMatcher::parse("/NS/T").unwrap(), TypeMatcher::Exact(_)));
        assert!(matches!(TypeMatcher::parse("/NS/T[]").unwrap(), TypeMatcher::ArrayOf(_)));
        assert!(matches!(
            TypeMatcher::parse("/std/vector<>").unwrap(),
            TypeMatcher::ContainerOf(_)
        ));
        assert!(TypeMatcher::parse("").is_err());
    }

    #[test]
    fn test_generic_matching() {
        let mut registry = Registry::with_standard_types();
        let array = registry.build("/float[10]").unwrap();
        let vector = registry.build("/std/vector</float>").unwrap();
        let float = registry.get("/float").unwrap();

        let arrays = TypeMatcher::array_of("/float");
        assert!(arrays.matches(&array));
        assert!(!arrays.matches(&vector));
        assert!(!arrays.matches(&float));

        let vectors = TypeMatcher::container_of("/std/vector");
        assert!(vectors.matches(&vector));
        assert!(!vectors.matches(&array));

        assert!(TypeMatcher::exact("/float").matches(&float));
        assert!(TypeMatcher::kind(Specialization::Container).matches(&vector));
    }

    #[test]
    fn test_regex() {
        let mut registry = Registry::with_standard_types();
        let ty = registry.build("/uint16_t").unwrap();
        assert!(TypeMatcher::regex("^/uint").unwrap().matches(&ty));
        assert!(TypeMatcher::regex("(").is_err());
    }

    #[test]
    fn test_keys_distinguish_classes() {
        assert_ne!(
            TypeMatcher::exact("/T").key(),
            TypeMatcher::regex("/T").unwrap().key()
        );
        assert_eq!(TypeMatcher::exact("/T").class(), MatchClass::Exact);
        assert_eq!(TypeMatcher::array_of("/T").class(), MatchClass::ArrayGeneric);
    }

    #[test]
    fn test_custom_keys_follow_the_predicate() {
        let small = TypeMatcher::custom("sized", |ty| ty.size() <= 4);
        let large = TypeMatcher::custom("sized", |ty| ty.size() > 4);
        assert_ne!(small.key(), large.key());
        assert_eq!(small.key(), small.clone().key());
        assert!(small.key().starts_with("custom:sized@"));
    }
}
