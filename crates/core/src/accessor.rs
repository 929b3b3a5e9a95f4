//! Accessors
//!
//! An [`Accessor`] lists every path from a root type to the values whose
//! type matches a [`TypeMatcher`]. A path is a sequence of field calls and
//! element iterations:
//!
//! ```text
//!   /Root { intern: /Intern, list: /std/vector</Intern> }
//!
//!   matcher "/double"  ──►  .intern.x
//!                           .list[].x
//! ```
//!
//! Path search depends only on the types, so accessors are memoized per
//! (type uid, matcher key). A memo entry lives as long as its root type
//! and, for custom matchers, its predicate. Resolving walks a concrete value; cached
//! resolution only follows proxies that were already handed out and is
//! what container mutations use to find the proxies they might invalidate.

use std::fmt;
use std::sync::{Arc, LazyLock, Weak};

use dashmap::DashMap;
use tracing::debug;
use typelib_schema::{TypeDefinition, TypeKind, TypeUid};

use crate::convert::{TypeMatcher, TypePredicate};
use crate::error::{Error, Result};
use crate::value::{Key, Value};

/// One step from a value to its children
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Field access by name
    Call(String),
    /// Every element of an array or container
    Iterate,
}

/// Steps from a root value to matching values
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The root itself
    pub fn is_root(&self) -> bool {
        self.steps.is_empty()
    }

    fn push(&self, step: Step) -> Path {
        let mut steps = self.steps.clone();
        steps.push(step);
        Path { steps }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return f.write_str(".");
        }
        for step in &self.steps {
            match step {
                Step::Call(name) => write!(f, ".{name}")?,
                Step::Iterate => f.write_str("[]")?,
            }
        }
        Ok(())
    }
}

struct Memo {
    root: Weak<TypeDefinition>,
    predicate: Option<Weak<TypePredicate>>,
    accessor: Arc<Accessor>,
}

impl Memo {
    fn is_live(&self) -> bool {
        self.root.strong_count() > 0
            && self
                .predicate
                .as_ref()
                .map_or(true, |predicate| predicate.strong_count() > 0)
    }
}

static ACCESSORS: LazyLock<DashMap<(TypeUid, String), Memo>> = LazyLock::new(DashMap::new);

/// Paths from a root type to every value matching a type matcher
#[derive(Debug)]
pub struct Accessor {
    root: TypeUid,
    root_name: String,
    paths: Vec<Path>,
}

impl Accessor {
    /// Paths in declaration order; a match is listed before the matches
    /// nested inside it
    pub fn find_in_type(ty: &Arc<TypeDefinition>, matcher: &TypeMatcher) -> Arc<Accessor> {
        let key = (ty.uid(), matcher.key());
        if let Some(memo) = ACCESSORS.get(&key) {
            if memo.is_live() {
                return memo.accessor.clone();
            }
        }

        let mut paths = Vec::new();
        collect(ty, matcher, &Path::default(), &mut paths);
        debug!(
            "Accessor for {:?} in {}: {} paths",
            matcher,
            ty.name(),
            paths.len()
        );

        let accessor = Arc::new(Accessor {
            root: ty.uid(),
            root_name: ty.name().to_string(),
            paths,
        });
        ACCESSORS.retain(|_, memo| memo.is_live());
        ACCESSORS.insert(
            key,
            Memo {
                root: Arc::downgrade(ty),
                predicate: matcher.predicate().map(Arc::downgrade),
                accessor: accessor.clone(),
            },
        );
        accessor
    }

    #[cfg(test)]
    fn is_memoized(uid: TypeUid, matcher: &TypeMatcher) -> bool {
        ACCESSORS.contains_key(&(uid, matcher.key()))
    }

    pub fn paths(&self) -> &[Path] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn check_root(&self, root: &Value) -> Result<()> {
        let ty = root.type_def();
        if ty.uid() != self.root {
            return Err(Error::mismatch(
                ty.name(),
                format!("accessor was built for {}", self.root_name),
            ));
        }
        Ok(())
    }

    /// Proxies on every matching value inside `root`, creating them as
    /// needed
    pub fn resolve(&self, root: &Value) -> Result<Vec<Value>> {
        self.check_root(root)?;
        let mut out = Vec::new();
        for path in &self.paths {
            walk(root, path.steps(), &mut out)?;
        }
        Ok(out)
    }

    /// Matching proxies reachable through already cached children only
    ///
    /// Invalidated proxies are skipped. Roots of another type yield nothing.
    pub fn resolve_cached(&self, root: &Value) -> Vec<Value> {
        let mut out = Vec::new();
        if self.check_root(root).is_ok() {
            for path in &self.paths {
                walk_cached(root, path.steps(), &mut out);
            }
        }
        out
    }
}

fn collect(ty: &TypeDefinition, matcher: &TypeMatcher, at: &Path, out: &mut Vec<Path>) {
    if matcher.matches(ty) {
        out.push(at.clone());
    }
    match ty.kind() {
        TypeKind::Compound(compound) => {
            for field in compound.fields() {
                collect(
                    field.type_def(),
                    matcher,
                    &at.push(Step::Call(field.name().to_string())),
                    out,
                );
            }
        }
        TypeKind::Array { element, .. } | TypeKind::Container { element, .. } => {
            collect(element, matcher, &at.push(Step::Iterate), out);
        }
        // Pointers are not followed: the pointee is not part of the value
        _ => {}
    }
}

fn walk(value: &Value, steps: &[Step], out: &mut Vec<Value>) -> Result<()> {
    match steps.split_first() {
        None => out.push(value.clone()),
        Some((Step::Call(name), rest)) => walk(&value.raw_get(name.as_str())?, rest, out)?,
        Some((Step::Iterate, rest)) => {
            for element in value.raw_each()? {
                walk(&element, rest, out)?;
            }
        }
    }
    Ok(())
}

fn walk_cached(value: &Value, steps: &[Step], out: &mut Vec<Value>) {
    if value.is_invalidated() {
        return;
    }
    match steps.split_first() {
        None => out.push(value.clone()),
        Some((Step::Call(name), rest)) => {
            if let Some(child) = value.cached_child(Key::Field(name)) {
                walk_cached(&child, rest, out);
            }
        }
        Some((Step::Iterate, rest)) => {
            for element in value.cached_children() {
                walk_cached(&element, rest, out);
            }
        }
    }
}
