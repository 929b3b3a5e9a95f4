//! Conversion rule tables
//!
//! Rules are stored in one slot map so either direction can be removed by
//! key. To-host lookups are memoized per (type uid, resolution); the memo is
//! dropped whenever the rule set changes.
//!
//! To-host priority for a type, first non-empty class wins:
//!
//! ```text
//!   1. exact name rules
//!   2. element propagation   (arrays/containers whose element converts)
//!   3. array-generic rules   "/T[]"
//!   4. container-generic     "/std/vector<>"
//!   5. patterns              regex, kind, custom
//! ```
//!
//! Rules whose condition rejects the type are discarded before classes are
//! considered. Two surviving rules in the winning class are ambiguous unless
//! the caller asked for [`Resolution::FirstMatch`], which takes the earliest
//! registered one.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};
use tracing::{debug, trace};
use typelib_schema::{TypeDefinition, TypeUid};

use super::host::{HostClass, HostValue};
use super::matcher::{MatchClass, TypeMatcher, TypePredicate};
use crate::error::{Error, Result};
use crate::value::Value;

new_key_type! {
    /// Key for registered conversion rules
    pub struct RuleKey;
}

/// Typelib value → host value
pub type ToHostFn = dyn Fn(&Value) -> Result<HostValue> + Send + Sync;

/// Host value → typelib value; writes into the target value
pub type FromHostFn = dyn Fn(&HostValue, &Value) -> Result<()> + Send + Sync;

/// Tie-breaking between rules of the same priority class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// More than one candidate is an error
    #[default]
    Unique,
    /// The earliest registered candidate wins
    FirstMatch,
}

/// Conversion of typelib values to host values
pub struct ToHostRule {
    matcher: TypeMatcher,
    host_class: Option<HostClass>,
    condition: Option<Arc<TypePredicate>>,
    transform: Arc<ToHostFn>,
}

impl ToHostRule {
    pub fn new<F>(matcher: TypeMatcher, transform: F) -> Self
    where
        F: Fn(&Value) -> Result<HostValue> + Send + Sync + 'static,
    {
        Self {
            matcher,
            host_class: None,
            condition: None,
            transform: Arc::new(transform),
        }
    }

    /// Declare the class of the host values this rule produces
    pub fn host_class(mut self, class: HostClass) -> Self {
        self.host_class = Some(class);
        self
    }

    /// Only apply to types accepted by `condition`
    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&TypeDefinition) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn matcher(&self) -> &TypeMatcher {
        &self.matcher
    }

    pub fn produces(&self) -> Option<HostClass> {
        self.host_class
    }

    pub fn applies_to(&self, ty: &TypeDefinition) -> bool {
        self.matcher.matches(ty) && self.condition.as_ref().map_or(true, |c| c(ty))
    }

    pub fn convert(&self, value: &Value) -> Result<HostValue> {
        (self.transform)(value)
    }
}

/// Conversion of host values of one class into typelib values
pub struct FromHostRule {
    host_class: HostClass,
    matcher: TypeMatcher,
    condition: Option<Arc<TypePredicate>>,
    transform: Arc<FromHostFn>,
}

impl FromHostRule {
    pub fn new<F>(host_class: HostClass, matcher: TypeMatcher, transform: F) -> Self
    where
        F: Fn(&HostValue, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            host_class,
            matcher,
            condition: None,
            transform: Arc::new(transform),
        }
    }

    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&TypeDefinition) -> bool + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn host_class(&self) -> HostClass {
        self.host_class
    }

    pub fn matcher(&self) -> &TypeMatcher {
        &self.matcher
    }

    pub fn applies_to(&self, ty: &TypeDefinition) -> bool {
        self.matcher.matches(ty) && self.condition.as_ref().map_or(true, |c| c(ty))
    }

    pub fn apply(&self, host: &HostValue, target: &Value) -> Result<()> {
        (self.transform)(host, target)
    }
}

/// Outcome of a to-host lookup
#[derive(Clone)]
pub enum ToHostPlan {
    /// No rule: numbers and symbols for scalars, the proxy otherwise
    Native,
    /// Apply this rule
    Rule(Arc<ToHostRule>),
    /// Convert to a list of converted elements
    Elements,
}

impl ToHostPlan {
    pub fn is_native(&self) -> bool {
        matches!(self, ToHostPlan::Native)
    }
}

enum RuleEntry {
    ToHost { seq: u64, rule: Arc<ToHostRule> },
    FromHost { seq: u64, rule: Arc<FromHostRule> },
}

/// Process-wide default registry
static GLOBAL: LazyLock<Arc<ConversionRegistry>> =
    LazyLock::new(|| Arc::new(ConversionRegistry::new()));

/// To-host and from-host conversion rules
pub struct ConversionRegistry {
    rules: RwLock<SlotMap<RuleKey, RuleEntry>>,
    next_seq: AtomicU64,
    plans: DashMap<(TypeUid, Resolution), ToHostPlan>,
}

impl Default for ConversionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversionRegistry {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(SlotMap::with_key()),
            next_seq: AtomicU64::new(0),
            plans: DashMap::new(),
        }
    }

    /// The process-wide registry used by runtimes built without their own
    pub fn global() -> Arc<ConversionRegistry> {
        GLOBAL.clone()
    }

    fn insert(&self, make: impl FnOnce(u64) -> RuleEntry) -> RuleKey {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = self.rules.write().insert(make(seq));
        self.plans.clear();
        key
    }

    pub fn add_to_host(&self, rule: ToHostRule) -> RuleKey {
        debug!("Registering to-host conversion for {:?}", rule.matcher);
        let rule = Arc::new(rule);
        self.insert(|seq| RuleEntry::ToHost { seq, rule })
    }

    pub fn add_from_host(&self, rule: FromHostRule) -> RuleKey {
        debug!(
            "Registering from-host conversion {} -> {:?}",
            rule.host_class, rule.matcher
        );
        let rule = Arc::new(rule);
        self.insert(|seq| RuleEntry::FromHost { seq, rule })
    }

    /// Register a to-host transform for a name pattern (see
    /// [`TypeMatcher::parse`])
    pub fn to_host<F>(&self, pattern: &str, transform: F) -> Result<RuleKey>
    where
        F: Fn(&Value) -> Result<HostValue> + Send + Sync + 'static,
    {
        Ok(self.add_to_host(ToHostRule::new(TypeMatcher::parse(pattern)?, transform)))
    }

    /// Register a from-host transform for host values of Rust type `T`
    pub fn from_host<T, F>(&self, pattern: &str, transform: F) -> Result<RuleKey>
    where
        T: Any,
        F: Fn(&T, &Value) -> Result<()> + Send + Sync + 'static,
    {
        let matcher = TypeMatcher::parse(pattern)?;
        let rule = FromHostRule::new(HostClass::of::<T>(), matcher, move |host, target| {
            let value = host.downcast_ref::<T>().ok_or_else(|| {
                Error::conversion(
                    target.type_def().name(),
                    format!("expected {}, got {}", std::any::type_name::<T>(), host.class()),
                )
            })?;
            transform(value, target)
        });
        Ok(self.add_from_host(rule))
    }

    /// Remove a rule of either direction
    pub fn remove(&self, key: RuleKey) -> bool {
        let removed = self.rules.write().remove(key).is_some();
        if removed {
            self.plans.clear();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rules.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.read().is_empty()
    }

    pub fn clear(&self) {
        self.rules.write().clear();
        self.plans.clear();
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Find how values of `ty` are converted to host values
    pub fn resolve_to_host(
        &self,
        ty: &TypeDefinition,
        resolution: Resolution,
    ) -> Result<ToHostPlan> {
        if let Some(plan) = self.plans.get(&(ty.uid(), resolution)) {
            trace!("Conversion plan cache hit for {}", ty.name());
            return Ok(plan.clone());
        }

        // Snapshot the rules so matchers and conditions run without the lock
        let mut candidates: Vec<(u64, Arc<ToHostRule>)> = self
            .rules
            .read()
            .values()
            .filter_map(|entry| match entry {
                RuleEntry::ToHost { seq, rule } => Some((*seq, rule.clone())),
                RuleEntry::FromHost { .. } => None,
            })
            .collect();
        candidates.sort_by_key(|(seq, _)| *seq);
        let surviving: Vec<Arc<ToHostRule>> = candidates
            .into_iter()
            .map(|(_, rule)| rule)
            .filter(|rule| rule.applies_to(ty))
            .collect();

        let in_class = |class: MatchClass| {
            surviving
                .iter()
                .filter(|rule| rule.matcher.class() == class)
                .cloned()
                .collect::<Vec<_>>()
        };

        let plan = 'found: {
            if let Some(rule) = pick(ty, in_class(MatchClass::Exact), resolution)? {
                break 'found ToHostPlan::Rule(rule);
            }
            if let Some(element) = ty.element() {
                if !self.resolve_to_host(element, resolution)?.is_native() {
                    break 'found ToHostPlan::Elements;
                }
            }
            for class in [
                MatchClass::ArrayGeneric,
                MatchClass::ContainerGeneric,
                MatchClass::Pattern,
            ] {
                if let Some(rule) = pick(ty, in_class(class), resolution)? {
                    break 'found ToHostPlan::Rule(rule);
                }
            }
            ToHostPlan::Native
        };

        self.plans.insert((ty.uid(), resolution), plan.clone());
        Ok(plan)
    }

    /// Find the rule converting host values of `class` into `ty`
    pub fn resolve_from_host(
        &self,
        class: HostClass,
        ty: &TypeDefinition,
        resolution: Resolution,
    ) -> Result<Option<Arc<FromHostRule>>> {
        let mut candidates: Vec<(u64, Arc<FromHostRule>)> = self
            .rules
            .read()
            .values()
            .filter_map(|entry| match entry {
                RuleEntry::FromHost { seq, rule } if rule.host_class == class => {
                    Some((*seq, rule.clone()))
                }
                _ => None,
            })
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }
        candidates.sort_by_key(|(seq, _)| *seq);

        let surviving: Vec<Arc<FromHostRule>> = candidates
            .into_iter()
            .map(|(_, rule)| rule)
            .filter(|rule| rule.applies_to(ty))
            .collect();

        for class in [
            MatchClass::Exact,
            MatchClass::ArrayGeneric,
            MatchClass::ContainerGeneric,
            MatchClass::Pattern,
        ] {
            let rules: Vec<_> = surviving
                .iter()
                .filter(|rule| rule.matcher.class() == class)
                .cloned()
                .collect();
            if let Some(rule) = pick(ty, rules, resolution)? {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }
}

fn pick<R>(
    ty: &TypeDefinition,
    mut rules: Vec<Arc<R>>,
    resolution: Resolution,
) -> Result<Option<Arc<R>>> {
    match (rules.len(), resolution) {
        (0, _) => Ok(None),
        (1, _) | (_, Resolution::FirstMatch) => Ok(Some(rules.swap_remove(0))),
        (candidates, Resolution::Unique) => Err(Error::AmbiguousConversion {
            type_name: ty.name().to_string(),
            candidates,
        }),
    }
}
