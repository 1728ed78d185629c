//! Process default secure-socket factory and the install-once binding.
//!
//! `FactorySlot` holds the factory that protocol code uses to open secure
//! sockets. `install` wraps whatever the slot holds in a
//! `BindingSocketFactory`, once; later calls leave it alone. There is no
//! uninstall.
//!
//! The process-wide slot is reached through `global()`. Tests build their
//! own `FactorySlot` instead of sharing process state.

use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::binding::BindingSocketFactory;
use crate::error::BindError;
use crate::report::Reporter;
use crate::session::{SessionId, SessionRecord};
use crate::socket::{SecureSocketFactory, UnconfiguredFactory};

/// A single readable/writable default secure-socket factory.
pub struct FactorySlot {
    current: RwLock<Arc<dyn SecureSocketFactory>>,
}

impl FactorySlot {
    pub fn new(initial: Arc<dyn SecureSocketFactory>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// The current default factory, whatever it is.
    pub fn default_factory(&self) -> Arc<dyn SecureSocketFactory> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the default factory.
    ///
    /// Replacing an installed binding factory is allowed; afterwards
    /// `actual_session_id` fails with `BindError::Security`.
    pub fn set_default(&self, factory: Arc<dyn SecureSocketFactory>) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if is_binding(&**current) && !is_binding(factory.as_ref()) {
            tracing::warn!(
                replacement = factory.name(),
                "binding socket factory replaced"
            );
        }
        *current = factory;
    }

    /// Wrap the current default in a `BindingSocketFactory`.
    ///
    /// Idempotent: when the slot already holds a binding factory it is left
    /// as is and returned. The wrapper is built, and its construction
    /// report sent, with no lock held; the swap only happens if the slot
    /// still holds the factory that was wrapped.
    pub fn install(&self, reporter: Arc<dyn Reporter>) -> Arc<dyn SecureSocketFactory> {
        loop {
            let wrapped = self.default_factory();
            if is_binding(&*wrapped) {
                tracing::debug!("binding socket factory already installed");
                return wrapped;
            }
            let binding: Arc<dyn SecureSocketFactory> =
                Arc::new(BindingSocketFactory::new(reporter.clone(), wrapped.clone()));

            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if is_binding(&**current) {
                tracing::debug!("binding socket factory installed concurrently");
                return current.clone();
            }
            if !std::ptr::addr_eq(Arc::as_ptr(&*current), Arc::as_ptr(&wrapped)) {
                // Default replaced while the wrapper was built; wrap the new one.
                continue;
            }
            *current = binding.clone();
            drop(current);

            tracing::info!(wrapped = wrapped.name(), "binding socket factory installed");
            return binding;
        }
    }

    pub fn is_installed(&self) -> bool {
        is_binding(self.default_factory().as_ref())
    }

    /// Session id bound by the installed binding factory.
    ///
    /// `BindError::Security` when the slot does not hold a binding factory,
    /// `BindError::State` when no handshake has completed yet.
    pub fn actual_session_id(&self) -> Result<SessionId, BindError> {
        self.actual_session().map(|r| r.id().clone())
    }

    /// Full bound record, same failure modes as `actual_session_id`.
    pub fn actual_session(&self) -> Result<SessionRecord, BindError> {
        let current = self.default_factory();
        let binding = current
            .as_any()
            .downcast_ref::<BindingSocketFactory>()
            .ok_or_else(|| BindError::Security(current.name().to_string()))?;
        binding.session()
    }

    /// Run `f` against the installed binding factory.
    pub fn with_binding<T>(
        &self,
        f: impl FnOnce(&BindingSocketFactory) -> T,
    ) -> Result<T, BindError> {
        let current = self.default_factory();
        let binding = current
            .as_any()
            .downcast_ref::<BindingSocketFactory>()
            .ok_or_else(|| BindError::Security(current.name().to_string()))?;
        Ok(f(binding))
    }
}

impl Default for FactorySlot {
    fn default() -> Self {
        Self::new(Arc::new(UnconfiguredFactory))
    }
}

fn is_binding(factory: &dyn SecureSocketFactory) -> bool {
    factory.as_any().is::<BindingSocketFactory>()
}

// ── Process-wide ──────────────────────────────────────────────────────────────

static GLOBAL: OnceLock<FactorySlot> = OnceLock::new();

/// The process-wide slot. Starts out holding an `UnconfiguredFactory`.
pub fn global() -> &'static FactorySlot {
    GLOBAL.get_or_init(FactorySlot::default)
}

/// Install the binding factory in the process-wide slot.
pub fn install(reporter: Arc<dyn Reporter>) -> Arc<dyn SecureSocketFactory> {
    global().install(reporter)
}

/// Bound session id of the process-wide binding factory.
pub fn actual_session_id() -> Result<SessionId, BindError> {
    global().actual_session_id()
}

/// Current process default factory.
pub fn default_factory() -> Arc<dyn SecureSocketFactory> {
    global().default_factory()
}
