//! Session-scoped module registry.
//!
//! The first request for an identifier creates its [`ModuleRecord`] and a
//! shared load future; every later request in the same session awaits that
//! future, so a module is fetched, compiled and executed at most once.
//!
//! ```text
//! load_module_internal(referrer, specifier)
//!   -> resolve            PathResolver
//!   -> module_cache?      host-provided exports, never fetched
//!   -> record_for(id)     registry hit or new record + shared future
//!   -> closes a cycle?    partial exports of the record
//!   -> await              instantiate (fetch, dispatch, execute)
//! ```
//!
//! While a load waits on another, the pair is an edge of the session's
//! waits-for graph. Awaiting a record that can already reach the waiter
//! would never finish, so the waiter gets the record's current exports
//! instead, which is what `require` does on a cycle.

use crate::error::{LoadError, LoadResult};
use crate::handler;
use crate::host::{Dependency, DependencyKind};
use crate::options::LoaderOptions;
use crate::path::ModuleId;
use crate::sandbox::{DynamicImporter, ExecutionUnit, Module, RequireMap};
use crate::value::Value;
use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use vize_carton::{FxHashMap, FxHashSet};

type LoadFuture = Shared<LocalBoxFuture<'static, LoadResult<Value>>>;

/// Where a module is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Loading,
    Loaded,
    Failed,
}

/// One module of a session.
pub struct ModuleRecord {
    id: ModuleId,
    module: Module,
    loading: LoadFuture,
}

impl ModuleRecord {
    pub fn id(&self) -> &ModuleId {
        &self.id
    }

    pub fn state(&self) -> ModuleState {
        match self.loading.peek() {
            None => ModuleState::Loading,
            Some(Ok(_)) => ModuleState::Loaded,
            Some(Err(_)) => ModuleState::Failed,
        }
    }

    /// Current exports; partial while the module is loading.
    pub fn exports(&self) -> Value {
        self.module.exports()
    }
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRecord")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}

struct SessionState {
    options: LoaderOptions,
    registry: RefCell<FxHashMap<ModuleId, Rc<ModuleRecord>>>,
    /// waiter -> awaited -> number of pending awaits
    waits: RefCell<FxHashMap<ModuleId, FxHashMap<ModuleId, usize>>>,
}

/// One top-level load and everything it pulls in.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone)]
pub struct Session {
    state: Rc<SessionState>,
}

impl Session {
    pub fn new(options: LoaderOptions) -> Self {
        Self {
            state: Rc::new(SessionState {
                options,
                registry: RefCell::new(FxHashMap::default()),
                waits: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn options(&self) -> &LoaderOptions {
        &self.state.options
    }

    /// Load `path`, resolved against the root.
    pub async fn load_module(&self, path: &str) -> LoadResult<Value> {
        let id = self.resolve(&ModuleId::root(), path)?;
        self.request(None, id).await
    }

    /// Load `specifier` on behalf of the module `referrer`.
    pub async fn load_module_internal(
        &self,
        referrer: &ModuleId,
        specifier: &str,
    ) -> LoadResult<Value> {
        let id = self.resolve(referrer, specifier)?;
        self.request(Some(referrer), id).await
    }

    pub fn resolve(&self, referrer: &ModuleId, specifier: &str) -> LoadResult<ModuleId> {
        if specifier.is_empty() {
            return Err(LoadError::Resolution {
                specifier: specifier.to_string(),
                referrer: referrer.clone(),
            });
        }
        Ok(self.state.options.path_resolver.resolve(referrer, specifier))
    }

    pub fn record(&self, id: &ModuleId) -> Option<Rc<ModuleRecord>> {
        self.state.registry.borrow().get(id).cloned()
    }

    /// Identifiers requested so far, sorted.
    pub fn module_ids(&self) -> Vec<ModuleId> {
        let mut ids: Vec<ModuleId> = self.state.registry.borrow().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Load every static dependency in order, each one fully settled
    /// before the next starts.
    pub(crate) async fn load_dependencies(
        &self,
        referrer: &ModuleId,
        dependencies: &[Dependency],
    ) -> LoadResult<RequireMap> {
        let mut requires = RequireMap::new();
        for dependency in dependencies {
            if dependency.kind != DependencyKind::Static || requires.contains(&dependency.specifier)
            {
                continue;
            }
            let exports = self
                .load_module_internal(referrer, &dependency.specifier)
                .await?;
            requires.insert(dependency.specifier.as_str(), exports);
        }
        Ok(requires)
    }

    /// Run `code` as the body of `id` and return what it exported.
    pub(crate) fn execute(
        &self,
        id: &ModuleId,
        code: &str,
        requires: &RequireMap,
        module: &Module,
    ) -> LoadResult<Value> {
        tracing::debug!(module = %id, "executing");
        let importer = DynamicImporter::new(self.downgrade(), id.clone());
        let unit = ExecutionUnit::new(id, code, requires, module, importer);
        self.state
            .options
            .sandbox
            .execute(&unit)
            .map_err(|error| LoadError::Execution {
                id: id.clone(),
                error,
            })?;
        Ok(module.exports())
    }

    async fn request(&self, waiter: Option<&ModuleId>, id: ModuleId) -> LoadResult<Value> {
        if let Some(exports) = self.state.options.module_cache.get(id.to_string().as_str()) {
            return Ok(exports.clone());
        }

        let record = self.record_for(&id);
        if let Some(settled) = record.loading.peek() {
            return settled.clone();
        }

        let _wait = match waiter {
            Some(waiter) if self.closes_cycle(waiter, &id) => {
                tracing::debug!(module = %id, from = %waiter, "circular dependency");
                return Ok(record.exports());
            }
            Some(waiter) => Some(WaitEdge::new(&self.state.waits, waiter, &id)),
            None => None,
        };
        record.loading.clone().await
    }

    fn record_for(&self, id: &ModuleId) -> Rc<ModuleRecord> {
        if let Some(record) = self.state.registry.borrow().get(id) {
            return record.clone();
        }

        let module = Module::new();
        let loading = self.load_future(id.clone(), module.clone());
        let record = Rc::new(ModuleRecord {
            id: id.clone(),
            module,
            loading,
        });
        self.state
            .registry
            .borrow_mut()
            .insert(id.clone(), record.clone());
        record
    }

    /// The future keeps only a weak handle on the session: the registry
    /// owns it, so a strong one would keep the session alive forever.
    fn load_future(&self, id: ModuleId, module: Module) -> LoadFuture {
        let session = self.downgrade();
        async move {
            let session = session.upgrade(&id)?;
            tracing::debug!(module = %id, "loading");
            let result = handler::instantiate(&session, &id, &module).await;
            match &result {
                Ok(_) => tracing::debug!(module = %id, "loaded"),
                Err(e) => tracing::debug!(module = %id, error = %e, "failed"),
            }
            result
        }
        .boxed_local()
        .shared()
    }

    pub(crate) fn downgrade(&self) -> WeakSession {
        WeakSession(Rc::downgrade(&self.state))
    }

    /// Whether `target` already waits, directly or not, on `waiter`.
    fn closes_cycle(&self, waiter: &ModuleId, target: &ModuleId) -> bool {
        let waits = self.state.waits.borrow();
        let mut seen = FxHashSet::default();
        let mut stack = vec![target];
        while let Some(node) = stack.pop() {
            if node == waiter {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            if let Some(edges) = waits.get(node) {
                stack.extend(edges.keys());
            }
        }
        false
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("modules", &self.module_ids())
            .finish_non_exhaustive()
    }
}

/// Handle that does not keep a session alive.
///
/// Anything stored inside the registry (load futures, `import()` entry
/// points captured by module code) holds one of these.
#[derive(Clone)]
pub(crate) struct WeakSession(Weak<SessionState>);

impl WeakSession {
    /// The session, or [`LoadError::SessionClosed`] on behalf of `id`.
    pub(crate) fn upgrade(&self, id: &ModuleId) -> LoadResult<Session> {
        self.0
            .upgrade()
            .map(|state| Session { state })
            .ok_or_else(|| LoadError::SessionClosed { id: id.clone() })
    }
}

/// Edge of the waits-for graph, removed when the await ends or is dropped.
struct WaitEdge<'s> {
    waits: &'s RefCell<FxHashMap<ModuleId, FxHashMap<ModuleId, usize>>>,
    from: ModuleId,
    to: ModuleId,
}

impl<'s> WaitEdge<'s> {
    fn new(
        waits: &'s RefCell<FxHashMap<ModuleId, FxHashMap<ModuleId, usize>>>,
        from: &ModuleId,
        to: &ModuleId,
    ) -> Self {
        *waits
            .borrow_mut()
            .entry(from.clone())
            .or_default()
            .entry(to.clone())
            .or_default() += 1;
        Self {
            waits,
            from: from.clone(),
            to: to.clone(),
        }
    }
}

impl Drop for WaitEdge<'_> {
    fn drop(&mut self) {
        let mut waits = self.waits.borrow_mut();
        let Some(edges) = waits.get_mut(&self.from) else {
            return;
        };
        if let Some(count) = edges.get_mut(&self.to) {
            *count -= 1;
            if *count == 0 {
                edges.remove(&self.to);
            }
        }
        if edges.is_empty() {
            waits.remove(&self.from);
        }
    }
}
