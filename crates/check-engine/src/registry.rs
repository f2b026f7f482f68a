//! Ordered registry of named checks.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::context::CheckContext;
use crate::error::{CheckError, RegistryError};
use crate::finding::Finding;

/// Future returned by a check.
pub type CheckFuture = BoxFuture<'static, Result<Finding, CheckError>>;

/// A diagnostic check: a function of its context.
///
/// Implemented for every `Fn(CheckContext) -> impl Future` closure or async
/// fn, so checks are registered as plain functions.
pub trait Check: Send + Sync {
    fn run(&self, ctx: CheckContext) -> CheckFuture;
}

impl<F, Fut> Check for F
where
    F: Fn(CheckContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Finding, CheckError>> + Send + 'static,
{
    fn run(&self, ctx: CheckContext) -> CheckFuture {
        Box::pin(self(ctx))
    }
}

/// A check plus its optional timeout override.
#[derive(Clone)]
pub struct RegisteredCheck {
    check: Arc<dyn Check>,
    timeout: Option<Duration>,
}

impl RegisteredCheck {
    pub fn check(&self) -> Arc<dyn Check> {
        Arc::clone(&self.check)
    }

    /// Timeout override; `None` means the executor's default applies.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Checks keyed by unique name, iterated in lexicographic name order.
#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: BTreeMap<String, RegisteredCheck>,
}

impl CheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `check` under `name`. Names must be unique.
    pub fn register<C>(&mut self, name: impl Into<String>, check: C) -> Result<(), RegistryError>
    where
        C: Check + 'static,
    {
        self.insert(name.into(), Arc::new(check), None)
    }

    /// Register `check` with its own timeout instead of the executor default.
    pub fn register_with_timeout<C>(
        &mut self,
        name: impl Into<String>,
        timeout: Duration,
        check: C,
    ) -> Result<(), RegistryError>
    where
        C: Check + 'static,
    {
        let name = name.into();
        if timeout.is_zero() {
            return Err(RegistryError::ZeroTimeout(name));
        }
        self.insert(name, Arc::new(check), Some(timeout))
    }

    /// Override the timeout of an already registered check.
    pub fn set_timeout(&mut self, name: &str, timeout: Duration) -> Result<(), RegistryError> {
        if timeout.is_zero() {
            return Err(RegistryError::ZeroTimeout(name.to_string()));
        }
        let entry = self
            .checks
            .get_mut(name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))?;
        entry.timeout = Some(timeout);
        Ok(())
    }

    /// Drop a check. Unknown names are reported.
    pub fn remove(&mut self, name: &str) -> Result<(), RegistryError> {
        self.checks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.checks.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.checks.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RegisteredCheck)> {
        self.checks.iter().map(|(name, check)| (name.as_str(), check))
    }

    fn insert(
        &mut self,
        name: String,
        check: Arc<dyn Check>,
        timeout: Option<Duration>,
    ) -> Result<(), RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.checks.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.checks.insert(name, RegisteredCheck { check, timeout });
        Ok(())
    }
}

impl std::fmt::Debug for CheckRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.checks.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn passing(_ctx: CheckContext) -> Result<Finding, CheckError> {
        Ok(Finding::ok("fine"))
    }

    #[test]
    fn test_rejects_duplicates_and_empty_names() {
        let mut registry = CheckRegistry::new();
        registry.register("CheckA", passing).unwrap();
        assert_eq!(
            registry.register("CheckA", passing),
            Err(RegistryError::Duplicate("CheckA".into()))
        );
        assert_eq!(registry.register("", passing), Err(RegistryError::EmptyName));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = CheckRegistry::new();
        for name in ["CheckZ", "CheckM", "CheckA"] {
            registry.register(name, passing).unwrap();
        }
        let names: Vec<_> = registry.names().collect();
        assert_eq!(names, vec!["CheckA", "CheckM", "CheckZ"]);
    }

    #[test]
    fn test_timeout_overrides() {
        let mut registry = CheckRegistry::new();
        registry
            .register_with_timeout("Slow", Duration::from_secs(60), passing)
            .unwrap();
        registry.register("Fast", passing).unwrap();
        registry.set_timeout("Fast", Duration::from_secs(2)).unwrap();

        let timeouts: Vec<_> = registry.iter().map(|(_, c)| c.timeout()).collect();
        assert_eq!(
            timeouts,
            vec![Some(Duration::from_secs(2)), Some(Duration::from_secs(60))]
        );
        assert_eq!(
            registry.set_timeout("Missing", Duration::from_secs(1)),
            Err(RegistryError::Unknown("Missing".into()))
        );
        assert_eq!(
            registry.set_timeout("Fast", Duration::ZERO),
            Err(RegistryError::ZeroTimeout("Fast".into()))
        );
    }
}
