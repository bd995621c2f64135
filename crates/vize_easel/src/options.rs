//! Loader options: configuration plus the host collaborators.

use crate::cache::CacheBackend;
use crate::config::LoaderConfig;
use crate::host::{
    CodeTransformer, CustomBlockHandler, DiscardStyleSink, Logger, ModuleHandler,
    ResourceFetcher, SfcCompiler, StylePreprocessor, StyleSink, TracingLogger,
};
use crate::path::{DefaultPathResolver, PathResolver};
use crate::sandbox::Sandbox;
use crate::value::Value;
use std::fmt;
use std::rc::Rc;
use vize_carton::{CompactString, FxHashMap};

/// Everything a load session needs.
///
/// Cheap to clone: collaborators are shared handles.
#[derive(Clone)]
pub struct LoaderOptions {
    pub config: LoaderConfig,
    pub fetcher: Rc<dyn ResourceFetcher>,
    pub sfc_compiler: Rc<dyn SfcCompiler>,
    pub transformer: Rc<dyn CodeTransformer>,
    pub sandbox: Rc<dyn Sandbox>,
    pub style_sink: Rc<dyn StyleSink>,
    pub logger: Rc<dyn Logger>,
    pub path_resolver: Rc<dyn PathResolver>,
    /// Modules provided by the host, by identifier (`vue`, `/env.js`, ...).
    pub module_cache: FxHashMap<CompactString, Value>,
    /// Backend for compiled artifacts; `None` disables caching.
    pub compiled_cache: Option<Rc<dyn CacheBackend>>,
    pub style_preprocessor: Option<Rc<dyn StylePreprocessor>>,
    pub custom_block_handler: Option<Rc<dyn CustomBlockHandler>>,
    pub module_handler: Option<Rc<dyn ModuleHandler>>,
}

impl LoaderOptions {
    pub fn new(
        fetcher: Rc<dyn ResourceFetcher>,
        sfc_compiler: Rc<dyn SfcCompiler>,
        transformer: Rc<dyn CodeTransformer>,
        sandbox: Rc<dyn Sandbox>,
    ) -> Self {
        Self {
            config: LoaderConfig::default(),
            fetcher,
            sfc_compiler,
            transformer,
            sandbox,
            style_sink: Rc::new(DiscardStyleSink),
            logger: Rc::new(TracingLogger),
            path_resolver: Rc::new(DefaultPathResolver),
            module_cache: FxHashMap::default(),
            compiled_cache: None,
            style_preprocessor: None,
            custom_block_handler: None,
            module_handler: None,
        }
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_style_sink(mut self, sink: Rc<dyn StyleSink>) -> Self {
        self.style_sink = sink;
        self
    }

    pub fn with_logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_path_resolver(mut self, resolver: Rc<dyn PathResolver>) -> Self {
        self.path_resolver = resolver;
        self
    }

    /// Pre-populate the module cache; `name` is never fetched.
    pub fn with_module(mut self, name: impl Into<CompactString>, exports: Value) -> Self {
        self.module_cache.insert(name.into(), exports);
        self
    }

    pub fn with_compiled_cache(mut self, cache: Rc<dyn CacheBackend>) -> Self {
        self.compiled_cache = Some(cache);
        self
    }

    pub fn with_style_preprocessor(mut self, preprocessor: Rc<dyn StylePreprocessor>) -> Self {
        self.style_preprocessor = Some(preprocessor);
        self
    }

    pub fn with_custom_block_handler(mut self, handler: Rc<dyn CustomBlockHandler>) -> Self {
        self.custom_block_handler = Some(handler);
        self
    }

    pub fn with_module_handler(mut self, handler: Rc<dyn ModuleHandler>) -> Self {
        self.module_handler = Some(handler);
        self
    }
}

impl fmt::Debug for LoaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modules: Vec<&str> = self.module_cache.keys().map(|k| k.as_str()).collect();
        modules.sort_unstable();
        f.debug_struct("LoaderOptions")
            .field("config", &self.config)
            .field("module_cache", &modules)
            .field("compiled_cache", &self.compiled_cache.is_some())
            .field("style_preprocessor", &self.style_preprocessor.is_some())
            .field("custom_block_handler", &self.custom_block_handler.is_some())
            .field("module_handler", &self.module_handler.is_some())
            .finish_non_exhaustive()
    }
}
