use crate::rules::Action;
use crate::runtime::{Routine, RoutineKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::panic::Location;
use std::sync::{Arc, Weak};

/// Stable identity of a wrappable slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CallSite {
    pub module: String,
    /// Qualified class name inside the module, `None` for module-level slots
    pub owner: Option<String>,
    pub attribute: String,
}

impl CallSite {
    pub fn function(module: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            owner: None,
            attribute: attribute.into(),
        }
    }

    pub fn method(
        module: impl Into<String>,
        owner: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Self {
        Self {
            module: module.into(),
            owner: Some(owner.into()),
            attribute: attribute.into(),
        }
    }

    /// `module.Class.attr` or `module.attr`
    pub fn qualified_name(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{}.{}.{}", self.module, owner, self.attribute),
            None => format!("{}.{}", self.module, self.attribute),
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.qualified_name())
    }
}

/// Book-keeping for one installed wrapper
///
/// Owns the original routine; nothing outside the engine can reach it. The
/// record lives as long as the wrapper stays in its slot.
pub struct WrapperRecord {
    pub(crate) engine_id: u64,
    site: CallSite,
    qualified_name: String,
    action: Action,
    original: Routine,
    inherited_from: Option<String>,
}

impl WrapperRecord {
    pub(crate) fn new(
        engine_id: u64,
        site: CallSite,
        qualified_name: String,
        action: Action,
        original: Routine,
        inherited_from: Option<String>,
    ) -> Self {
        Self {
            engine_id,
            site,
            qualified_name,
            action,
            original,
            inherited_from,
        }
    }

    pub fn site(&self) -> &CallSite {
        &self.site
    }

    /// Name the rules were matched against
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// Full name of the base class that declares the original, when the
    /// wrapper was installed on a subclass
    pub fn inherited_from(&self) -> Option<&str> {
        self.inherited_from.as_deref()
    }

    pub fn original_kind(&self) -> RoutineKind {
        self.original.kind()
    }

    pub fn original_location(&self) -> &'static Location<'static> {
        self.original.location()
    }

    pub(crate) fn original(&self) -> &Routine {
        &self.original
    }
}

impl fmt::Debug for WrapperRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapperRecord")
            .field("site", &self.site)
            .field("qualified_name", &self.qualified_name)
            .field("action", &self.action)
            .field("inherited_from", &self.inherited_from)
            .finish()
    }
}

/// Installed wrappers by call site
///
/// Entries are weak: the wrapper in the slot keeps its record alive.
#[derive(Default)]
pub(crate) struct WrapperRegistry {
    records: HashMap<CallSite, Weak<WrapperRecord>>,
}

impl WrapperRegistry {
    pub(crate) fn get(&self, site: &CallSite) -> Option<Arc<WrapperRecord>> {
        self.records.get(site)?.upgrade()
    }

    /// Register `record`, replacing whatever was recorded for its site
    pub(crate) fn insert(&mut self, record: &Arc<WrapperRecord>) {
        self.records
            .insert(record.site().clone(), Arc::downgrade(record));
    }

    /// Live records, ordered by call site
    pub(crate) fn live(&self) -> Vec<Arc<WrapperRecord>> {
        let mut live: Vec<_> = self.records.values().filter_map(Weak::upgrade).collect();
        live.sort_by(|a, b| a.site().cmp(b.site()));
        live
    }

    /// Entries including dead ones not yet pruned
    #[cfg(test)]
    pub(crate) fn entry_count(&self) -> usize {
        self.records.len()
    }

    /// Forget entries whose wrapper is gone
    pub(crate) fn prune(&mut self) {
        self.records.retain(|_, record| record.strong_count() > 0);
    }
}
