//! The execution boundary.
//!
//! A [`Sandbox`] runs transformed module code. It has no module loader of
//! its own: every static dependency is already settled and handed over in
//! a [`RequireMap`], and dynamic `import()` goes back to the loading
//! session through [`ExecutionUnit::import`].

use crate::error::LoadResult;
use crate::interop;
use crate::loader::WeakSession;
use crate::path::ModuleId;
use crate::value::{Object, Value};
use futures::future::{FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;
use vize_carton::{CompactString, FxHashMap};

/// An exception thrown by module code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecError {
    pub message: String,
}

impl ExecError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The `module` binding of a module body.
///
/// Starts out as `{ exports: {} }`. Importers that reach a module through
/// a cycle hold on to whatever `exports` was at that point.
#[derive(Debug, Clone)]
pub struct Module {
    exports: Rc<RefCell<Value>>,
}

impl Module {
    pub fn new() -> Self {
        Self {
            exports: Rc::new(RefCell::new(Value::Object(Object::new()))),
        }
    }

    pub fn exports(&self) -> Value {
        self.exports.borrow().clone()
    }

    /// `module.exports = value`.
    pub fn set_exports(&self, value: Value) {
        *self.exports.borrow_mut() = value;
    }
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

/// Settled exports of a module's static dependencies, by specifier as
/// written in the source.
#[derive(Debug, Clone, Default)]
pub struct RequireMap {
    modules: FxHashMap<CompactString, Value>,
}

impl RequireMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, specifier: impl Into<CompactString>, exports: Value) {
        self.modules.insert(specifier.into(), exports);
    }

    pub fn contains(&self, specifier: &str) -> bool {
        self.modules.contains_key(specifier)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// `require(specifier)`: the raw exports.
    pub fn require(&self, specifier: &str) -> Result<Value, ExecError> {
        self.modules
            .get(specifier)
            .cloned()
            .ok_or_else(|| ExecError::new(format!("Cannot find module '{specifier}'")))
    }

    /// `import x from specifier`: the default export after interop.
    pub fn import_default(&self, specifier: &str) -> Result<Value, ExecError> {
        self.require(specifier).map(|exports| interop::import_default(&exports))
    }
}

/// Entry point for `import()` from a running module body.
#[derive(Clone)]
pub struct DynamicImporter {
    session: WeakSession,
    referrer: ModuleId,
}

impl DynamicImporter {
    pub(crate) fn new(session: WeakSession, referrer: ModuleId) -> Self {
        Self { session, referrer }
    }

    /// Load `specifier` relative to the importing module. The returned
    /// future is independent of the execution unit and may be kept after
    /// the body returns. Once the session has been dropped it fails with
    /// [`LoadError::SessionClosed`](crate::LoadError::SessionClosed).
    pub fn import(&self, specifier: &str) -> LocalBoxFuture<'static, LoadResult<Value>> {
        let session = self.session.clone();
        let referrer = self.referrer.clone();
        let specifier = specifier.to_string();
        async move {
            let session = session.upgrade(&referrer)?;
            session.load_module_internal(&referrer, &specifier).await
        }
        .boxed_local()
    }
}

/// One module body ready to run.
pub struct ExecutionUnit<'a> {
    pub id: &'a ModuleId,
    pub code: &'a str,
    pub requires: &'a RequireMap,
    pub module: &'a Module,
    importer: DynamicImporter,
}

impl<'a> ExecutionUnit<'a> {
    pub(crate) fn new(
        id: &'a ModuleId,
        code: &'a str,
        requires: &'a RequireMap,
        module: &'a Module,
        importer: DynamicImporter,
    ) -> Self {
        Self {
            id,
            code,
            requires,
            module,
            importer,
        }
    }

    /// `import(specifier)`.
    pub fn import(&self, specifier: &str) -> LocalBoxFuture<'static, LoadResult<Value>> {
        self.importer.import(specifier)
    }

    /// A detached handle for `import()` calls made after the body returns.
    pub fn importer(&self) -> DynamicImporter {
        self.importer.clone()
    }
}

/// Executes module code.
pub trait Sandbox {
    fn execute(&self, unit: &ExecutionUnit<'_>) -> Result<(), ExecError>;
}
