//! Startup-time table mapping operation names to handler factories.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::{DynOperation, Erased, Operation};
use crate::{AppError, Result};

type Factory = Arc<dyn Fn() -> Result<Box<dyn DynOperation>> + Send + Sync>;

/// A handler type paired with the factory that builds it.
#[derive(Clone)]
pub struct Registration {
    type_name: &'static str,
    factory: Factory,
}

impl Registration {
    /// Register handler `H`, built on demand by `factory`.
    pub fn new<H, F>(factory: F) -> Self
    where
        H: Operation,
        F: Fn() -> Result<H> + Send + Sync + 'static,
    {
        Self {
            type_name: std::any::type_name::<H>(),
            factory: Arc::new(move || {
                factory().map(|handler| Box::new(Erased(handler)) as Box<dyn DynOperation>)
            }),
        }
    }

    /// Register a handler built with [`Default`].
    #[must_use]
    pub fn from_default<H: Operation + Default>() -> Self {
        Self::new::<H, _>(|| Ok(H::default()))
    }

    /// Fully qualified handler type name.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Handler type name without module path or generic arguments.
    #[must_use]
    pub fn short_type_name(&self) -> &'static str {
        let without_generics = self
            .type_name
            .split_once('<')
            .map_or(self.type_name, |(head, _)| head);
        without_generics
            .rsplit_once("::")
            .map_or(without_generics, |(_, tail)| tail)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// Operation name → handler registration.
///
/// Populated through `&mut self` during startup, then shared read-only
/// (typically as `Arc<OperationRegistry>`) with the executor.
#[derive(Debug, Default, Clone)]
pub struct OperationRegistry {
    entries: BTreeMap<String, Registration>,
}

impl OperationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `registration` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::DuplicateOperation` if `name` is already taken and
    /// `AppError::Config` if it is blank. The existing entry is left intact.
    pub fn register(&mut self, name: impl Into<String>, registration: Registration) -> Result<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(AppError::Config("operation name must not be blank".into()));
        }
        if let Some(existing) = self.entries.get(&name) {
            return Err(AppError::DuplicateOperation(format!(
                "'{name}' is already bound to {}, cannot bind {}",
                existing.type_name(),
                registration.type_name()
            )));
        }

        debug!(operation = %name, handler = registration.type_name(), "operation registered");
        self.entries.insert(name, registration);
        Ok(())
    }

    /// Register every candidate under its short type name with `suffix`
    /// stripped, e.g. `InvokeElementHandler` → `InvokeElement`.
    ///
    /// All names are derived and checked before anything is inserted, so a
    /// failure leaves the registry unchanged.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when a candidate's type name does not end in
    /// `suffix` (or is nothing but the suffix), and
    /// `AppError::DuplicateOperation` when a derived name collides with an
    /// existing entry or another candidate.
    pub fn register_by_convention(
        &mut self,
        candidates: impl IntoIterator<Item = Registration>,
        suffix: &str,
    ) -> Result<()> {
        let mut derived: BTreeMap<String, Registration> = BTreeMap::new();

        for candidate in candidates {
            let short = candidate.short_type_name();
            let name = short
                .strip_suffix(suffix)
                .filter(|stem| !stem.is_empty())
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "{short} does not follow the '<Name>{suffix}' naming convention"
                    ))
                })?
                .to_owned();

            if let Some(existing) = self.entries.get(&name).or_else(|| derived.get(&name)) {
                return Err(AppError::DuplicateOperation(format!(
                    "'{name}' derived from both {} and {}",
                    existing.type_name(),
                    candidate.type_name()
                )));
            }
            derived.insert(name, candidate);
        }

        for (name, registration) in derived {
            self.register(name, registration)?;
        }
        Ok(())
    }

    /// Handler type registered under `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::OperationNotRegistered` if `name` is unknown.
    pub fn resolve(&self, name: &str) -> Result<&'static str> {
        self.entry(name).map(Registration::type_name)
    }

    /// Build a fresh, type-erased handler for `name`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::OperationNotRegistered` if `name` is unknown, or
    /// `AppError::InstantiationFailed` if the factory fails.
    pub fn instantiate(&self, name: &str) -> Result<Box<dyn DynOperation>> {
        let entry = self.entry(name)?;
        (entry.factory)().map_err(|err| {
            AppError::InstantiationFailed(format!("{} for '{name}': {err}", entry.type_name()))
        })
    }

    /// Build a fresh handler for `name` as the concrete type `H`.
    ///
    /// # Errors
    ///
    /// As [`OperationRegistry::instantiate`], plus `AppError::TypeMismatch`
    /// when `name` is bound to a handler type other than `H`.
    pub fn instantiate_as<H: Operation>(&self, name: &str) -> Result<H> {
        let handler = self.instantiate(name)?;
        let found = handler.type_name();
        handler
            .into_any()
            .downcast::<H>()
            .map(|boxed| *boxed)
            .map_err(|_| {
                AppError::TypeMismatch(format!(
                    "'{name}' is bound to {found}, not {}",
                    std::any::type_name::<H>()
                ))
            })
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// All registered names in sorted order.
    #[must_use]
    pub fn list_registered(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Number of registered operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&Registration> {
        self.entries
            .get(name)
            .ok_or_else(|| AppError::OperationNotRegistered(name.to_owned()))
    }
}
