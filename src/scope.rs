use std::sync::Arc;

use indexmap::IndexMap;

use crate::value::{normalize_name, ObjectValue, Property, Value};

/// Per-call scratch namespace and its short alias.
pub const TEMP: &str = "temp";
pub const TEMP_ALIAS: &str = "t";

/// Case-insensitive namespace of top-level bindings.
///
/// A scope is a shared base map plus a small local overlay. Writes on the
/// owning scope go to the base (copied on write if a snapshot still holds
/// it); writes on a snapshot made by [`Scope::copy`] go to its overlay. A
/// per-call snapshot therefore only clones the overlay, and writes on
/// either side never leak into the other. Objects held by the scope are shared handles: writes *into*
/// a mutable object are visible through every snapshot.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    base: Arc<IndexMap<String, Property>>,
    overlay: IndexMap<String, Property>,
    frozen: bool,
    snapshot: bool,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bindings<I, S>(bindings: I) -> Self
    where
        I: IntoIterator<Item = (S, Property)>,
        S: AsRef<str>,
    {
        let base = bindings
            .into_iter()
            .map(|(name, property)| (normalize_name(name.as_ref()), property))
            .collect();
        Self {
            base: Arc::new(base),
            overlay: IndexMap::new(),
            frozen: false,
            snapshot: false,
        }
    }

    /// Independent, unfrozen snapshot of this scope.
    pub fn copy(&self) -> Scope {
        Scope {
            base: Arc::clone(&self.base),
            overlay: self.overlay.clone(),
            frozen: false,
            snapshot: true,
        }
    }

    /// Rejects every later top-level write.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn get_property(&self, name: &str) -> Option<&Property> {
        let key = normalize_name(name);
        self.overlay.get(&key).or_else(|| self.base.get(&key))
    }

    /// Never fails: unknown names resolve to zero.
    pub fn get(&self, name: &str) -> Value {
        self.get_property(name)
            .map(|property| property.value.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_property(name).is_some()
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set_property(name, Property::new(value.into(), false))
    }

    pub fn set_constant(&mut self, name: &str, value: impl Into<Value>) -> bool {
        self.set_property(name, Property::new(value.into(), true))
    }

    pub fn set_property(&mut self, name: &str, property: Property) -> bool {
        if self.frozen {
            tracing::debug!(name, "rejected write to frozen scope");
            return false;
        }
        let key = normalize_name(name);
        if self.snapshot {
            self.overlay.insert(key, property);
        } else {
            self.overlay.shift_remove(&key);
            Arc::make_mut(&mut self.base).insert(key, property);
        }
        true
    }

    /// Binds a fresh mutable `temp` object, also reachable as `t`.
    pub(crate) fn bind_temp(&mut self) -> ObjectValue {
        let temp = ObjectValue::mutable();
        self.set(TEMP, temp.clone());
        self.set(TEMP_ALIAS, temp.clone());
        temp
    }

    /// Binding names, base first, without duplicates.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.base.keys().cloned().collect();
        for key in self.overlay.keys() {
            if !self.base.contains_key(key) {
                names.push(key.clone());
            }
        }
        names
    }
}
