//! Namespace sweeps
//!
//! A sweep walks a module's namespace, and every class reachable from it,
//! resolving each routine's qualified name and installing a wrapper where the
//! rules ask for one. The registry lock is held for the whole sweep, so two
//! threads never wrap the same slot twice.

use crate::engine::registry::WrapperRegistry;
use crate::engine::{wrapper, CallSite, Engine, InstallError, WrapperRecord};
use crate::runtime::{Attr, Class, Module, Routine, RuntimeError};
use std::collections::HashSet;
use std::sync::Arc;

/// Counts from one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Wrappers installed
    pub wrapped: usize,
    /// Slots that already carried the right wrapper
    pub already_wrapped: usize,
    /// Slots that could not be rewritten
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.wrapped += other.wrapped;
        self.already_wrapped += other.already_wrapped;
        self.failed += other.failed;
    }

    /// Combine reports from several sweeps
    pub fn total<I: IntoIterator<Item = SweepReport>>(reports: I) -> SweepReport {
        let mut total = SweepReport::default();
        for report in reports {
            total.merge(report);
        }
        total
    }
}

/// Where a wrapper gets written
#[derive(Clone, Copy)]
enum Slot<'a> {
    Module(&'a Arc<Module>),
    Class(&'a Arc<Class>),
}

impl Slot<'_> {
    fn set(&self, name: &str, routine: Routine) -> Result<(), RuntimeError> {
        match self {
            Slot::Module(module) => module.set(name, Attr::Routine(routine)),
            Slot::Class(class) => class.set_attr(name, Attr::Routine(routine)),
        }
    }
}

/// A routine found during a sweep, with everything needed to wrap it
struct Candidate<'a> {
    slot: Slot<'a>,
    site: CallSite,
    qualified_name: String,
    current: Routine,
    inherited_from: Option<String>,
}

struct Sweep<'e> {
    engine: &'e Engine,
    registry: &'e mut WrapperRegistry,
    visited: HashSet<*const Class>,
    report: SweepReport,
}

impl Engine {
    pub(crate) fn sweep_module(&self, module: &Arc<Module>) -> SweepReport {
        let mut registry = self.lock_registry();
        let mut sweep = Sweep::new(self, &mut registry);

        for (name, attr) in module.attrs() {
            match attr {
                Attr::Routine(routine) => {
                    let site = CallSite::function(module.name(), &name);
                    sweep.install(Candidate {
                        slot: Slot::Module(module),
                        qualified_name: site.qualified_name(),
                        site,
                        current: routine,
                        inherited_from: None,
                    });
                }
                Attr::Class(class) => sweep.class(&class),
                Attr::Module(_) | Attr::Value(_) => {}
            }
        }

        let report = sweep.report;
        registry.prune();
        tracing::debug!(
            module = module.name(),
            wrapped = report.wrapped,
            already_wrapped = report.already_wrapped,
            failed = report.failed,
            "module swept"
        );
        report
    }

    pub(crate) fn sweep_class(&self, class: &Arc<Class>) -> SweepReport {
        let mut registry = self.lock_registry();
        let mut sweep = Sweep::new(self, &mut registry);
        sweep.class(class);
        let report = sweep.report;
        registry.prune();
        report
    }
}

impl<'e> Sweep<'e> {
    fn new(engine: &'e Engine, registry: &'e mut WrapperRegistry) -> Self {
        Self {
            engine,
            registry,
            visited: HashSet::new(),
            report: SweepReport::default(),
        }
    }

    fn class(&mut self, class: &Arc<Class>) {
        if !self.visited.insert(Arc::as_ptr(class)) {
            return;
        }

        let own = class.own_attrs();
        let mut seen: HashSet<String> = own.iter().map(|(name, _)| name.clone()).collect();

        for (name, attr) in own {
            match attr {
                Attr::Routine(routine) => {
                    let site = CallSite::method(class.module(), class.qualname(), &name);
                    self.install(Candidate {
                        slot: Slot::Class(class),
                        qualified_name: site.qualified_name(),
                        site,
                        current: routine,
                        inherited_from: None,
                    });
                }
                Attr::Class(nested) => self.class(&nested),
                Attr::Module(_) | Attr::Value(_) => {}
            }
        }

        if self.engine.settings().wrap_base_class_attributes {
            for base in class.linearize().iter().skip(1) {
                for (name, attr) in base.own_attrs() {
                    let Attr::Routine(routine) = attr else {
                        continue;
                    };
                    // Our wrapper for an inherited name is not a declaration;
                    // the declaring class comes later in lookup order
                    let engine_id = self.engine.id();
                    if routine
                        .tag::<WrapperRecord>()
                        .is_some_and(|r| r.engine_id == engine_id && r.inherited_from().is_some())
                    {
                        continue;
                    }
                    // The first class in lookup order that declares a name wins
                    if !seen.insert(name.clone()) {
                        continue;
                    }
                    self.install(Candidate {
                        slot: Slot::Class(class),
                        site: CallSite::method(class.module(), class.qualname(), &name),
                        qualified_name: format!(
                            "{} -> {}.{}",
                            class.full_name(),
                            base.full_name(),
                            name
                        ),
                        current: routine,
                        inherited_from: Some(base.full_name()),
                    });
                }
            }
        }

        for base in class.bases() {
            self.class(base);
        }
    }

    fn install(&mut self, candidate: Candidate<'_>) {
        let engine_id = self.engine.id();
        let current_record = candidate
            .current
            .tag::<WrapperRecord>()
            .filter(|record| record.engine_id == engine_id);

        // A slot already holding our wrapper keeps the name it was matched under
        let existing = current_record
            .as_ref()
            .filter(|record| record.site() == &candidate.site)
            .cloned();
        let qualified_name = existing
            .as_ref()
            .map(|record| record.qualified_name().to_string())
            .unwrap_or(candidate.qualified_name);

        let Some(action) = self.engine.rules().wrap_action(&qualified_name) else {
            return;
        };
        if existing.as_ref().is_some_and(|record| record.action() == action) {
            self.report.already_wrapped += 1;
            return;
        }

        // Never wrap a wrapper: start again from the original it owns
        let original = match &current_record {
            Some(record) => record.original().clone(),
            None => candidate.current,
        };
        let record = Arc::new(WrapperRecord::new(
            engine_id,
            candidate.site,
            qualified_name,
            action,
            original,
            candidate.inherited_from,
        ));
        let wrapper = wrapper::wrap(
            self.engine.tracer(),
            &record,
            self.engine.settings().wrap_using_wrapper_class,
        );

        match candidate.slot.set(&record.site().attribute, wrapper) {
            Ok(()) => {
                self.registry.insert(&record);
                self.report.wrapped += 1;
                tracing::debug!(uri = record.qualified_name(), action = %action, "wrapper installed");
            }
            Err(source) => {
                let err = InstallError::Slot {
                    uri: record.qualified_name().to_string(),
                    source,
                };
                self.report.failed += 1;
                tracing::warn!(error = %err, "attribute skipped");
                self.engine
                    .channels()
                    .error
                    .write_line(&format!("tracecall: {}", err));
            }
        }
    }
}
