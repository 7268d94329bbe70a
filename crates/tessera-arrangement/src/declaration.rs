//! Arrangement declarations

use std::fmt;
use std::sync::Arc;

use tessera_context::{Context, ContextKind};
use tessera_core::{TesseraError, TesseraResult};

/// Callback run once when an arrangement first prepares a context
pub type SetupFn = dyn Fn(&Arc<Context>) -> TesseraResult<()> + Send + Sync;

/// Arrangement lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrangementState {
    /// Configuration only, no context
    Abstract,
    /// Context resolved, not yet touched
    Resolved,
    /// Setup has run
    Prepared,
}

/// Everything known about an arrangement at declaration time.
///
/// `D` is the kind of arrangement the descent is.
pub struct Declaration<D> {
    pub name: String,
    pub context_kind: Option<ContextKind>,
    /// `None` inherits, which means false
    pub new_context: Option<bool>,
    pub descent: Option<Arc<D>>,
    pub is_abstract: bool,
    pub setup: Option<Arc<SetupFn>>,
}

impl<D> Declaration<D> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            context_kind: None,
            new_context: None,
            descent: None,
            is_abstract: false,
            setup: None,
        }
    }

    pub fn kind(mut self, kind: ContextKind) -> Self {
        self.context_kind = Some(kind);
        self
    }

    pub fn new_context(mut self, new_context: bool) -> Self {
        self.new_context = Some(new_context);
        self
    }

    pub fn descent(mut self, descent: &Arc<D>) -> Self {
        self.descent = Some(descent.clone());
        self
    }

    /// Declare configuration only; no context is allocated
    pub fn abstract_only(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn setup<F>(mut self, setup: F) -> Self
    where
        F: Fn(&Arc<Context>) -> TesseraResult<()> + Send + Sync + 'static,
    {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn has_new_context(&self) -> bool {
        self.new_context.unwrap_or(false)
    }
}

impl<D> fmt::Debug for Declaration<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declaration")
            .field("name", &self.name)
            .field("context_kind", &self.context_kind)
            .field("new_context", &self.new_context)
            .field("has_descent", &self.descent.is_some())
            .field("is_abstract", &self.is_abstract)
            .finish()
    }
}

/// Merge the declared kind with the one inherited from the descent.
///
/// Without `new_context` the declared kind must be compatible with the
/// inherited one.
pub fn resolve_kind(
    name: &str,
    declared: Option<ContextKind>,
    inherited: Option<ContextKind>,
    new_context: bool,
) -> TesseraResult<ContextKind> {
    if let (Some(own), Some(base), false) = (declared, inherited, new_context) {
        if !own.is_compatible_with(base) {
            return Err(TesseraError::ArrangementConstruction(format!(
                "{}: context kind {} is incompatible with the descent's {} (a new context may fix this)",
                name,
                own.name(),
                base.name()
            )));
        }
    }
    Ok(declared.or(inherited).unwrap_or(ContextKind::DEFAULT))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_kind_defaults() {
        assert_eq!(resolve_kind("A", None, None, false).unwrap(), ContextKind::Construct);
        assert_eq!(
            resolve_kind("B", None, Some(ContextKind::List), false).unwrap(),
            ContextKind::List
        );
    }

    #[test]
    fn test_resolve_kind_checks_compatibility() {
        assert!(resolve_kind("C", Some(ContextKind::Construct), Some(ContextKind::Dict), false).is_ok());
        let err = resolve_kind("D", Some(ContextKind::List), Some(ContextKind::Dict), false).unwrap_err();
        assert!(err.is_construction());
        assert_eq!(
            resolve_kind("E", Some(ContextKind::List), Some(ContextKind::Dict), true).unwrap(),
            ContextKind::List
        );
    }
}
