//! Host collaborators.
//!
//! The loader never touches the network, a compiler or a JavaScript engine
//! itself. Everything it needs from the embedding environment comes
//! through the traits in this module, all of them `?Send` because a load
//! session is single threaded.

use crate::config::Whitespace;
use crate::error::{LoadError, LoadResult};
use crate::path::ModuleId;
use crate::value::{Object, Value};
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use thiserror::Error;
use vize_atelier_sfc::{
    parse_sfc, BindingMetadata, SfcCustomBlock, SfcDescriptor, SfcError, SfcParseOptions,
};
use vize_carton::CompactString;

// =============================================================================
// Fetching
// =============================================================================

/// Raw content of a module.
///
/// Script, component, JSON and CSS modules are decoded as UTF-8 on use;
/// a [`ModuleHandler`] sees the bytes untouched.
#[derive(Debug, Clone, Default)]
pub struct Resource {
    pub content: Vec<u8>,
    /// Extension to dispatch on instead of the one in the identifier.
    pub kind: Option<CompactString>,
}

impl Resource {
    pub fn new(content: impl Into<Vec<u8>>) -> Self {
        Self {
            content: content.into(),
            kind: None,
        }
    }

    /// The content as text, or a parse error naming `id`.
    pub fn text(&self, id: &ModuleId) -> LoadResult<&str> {
        std::str::from_utf8(&self.content).map_err(|e| LoadError::Parse {
            id: id.clone(),
            message: format!("content is not valid UTF-8: {e}"),
        })
    }

    pub fn with_kind(mut self, kind: impl Into<CompactString>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Why a resource could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    pub message: String,
    pub status: Option<u16>,
}

impl FetchError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    pub fn not_found(id: &ModuleId) -> Self {
        Self {
            message: format!("{id} not found"),
            status: Some(404),
        }
    }
}

#[async_trait(?Send)]
pub trait ResourceFetcher {
    async fn fetch(&self, id: &ModuleId) -> Result<Resource, FetchError>;
}

// =============================================================================
// SFC compilation
// =============================================================================

/// A compiler message with an optional byte range into the compiled source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Diagnostic {
    pub message: String,
    pub range: Option<Range<usize>>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            range: None,
        }
    }

    pub fn with_range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct ScriptCompileOptions {
    /// Scope id of the component
    pub id: String,
    pub is_production: bool,
    pub syntax_extensions: Vec<CompactString>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptOutput {
    /// Script code with a default export
    pub content: String,
    pub bindings: Option<BindingMetadata>,
    /// Any entry here fails the component load
    pub errors: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateCompileOptions {
    pub source: String,
    pub filename: String,
    /// Scope id of the component
    pub id: String,
    pub scoped: bool,
    pub bindings: Option<BindingMetadata>,
    pub delimiters: Option<(String, String)>,
    pub whitespace: Whitespace,
    pub is_production: bool,
    pub dev_mode: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TemplateOutput {
    /// Module code exporting `render`
    pub code: String,
    pub errors: Vec<Diagnostic>,
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StyleCompileOptions {
    pub source: String,
    pub filename: String,
    /// Scope id of the component
    pub id: String,
    pub scoped: bool,
    pub is_production: bool,
    pub trim: bool,
    /// `lang` of the block when the compiler has to preprocess it
    pub preprocess_lang: Option<String>,
    /// Exports of the module named by `preprocess_lang`
    pub preprocessor: Option<Value>,
}

#[derive(Debug, Clone, Default)]
pub struct StyleOutput {
    pub code: String,
    pub errors: Vec<Diagnostic>,
}

/// Block splitter plus the per-block compilers.
#[async_trait(?Send)]
pub trait SfcCompiler {
    /// Identifies the compiler build. Part of every cache key derived from
    /// its output, so a new version never reuses stale artifacts.
    fn version(&self) -> &str;

    /// Split a component source into blocks.
    fn parse(&self, source: &str, filename: &str) -> Result<SfcDescriptor, SfcError> {
        parse_sfc(
            source,
            SfcParseOptions {
                filename: filename.to_string(),
                ..Default::default()
            },
        )
    }

    fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        options: &ScriptCompileOptions,
    ) -> ScriptOutput;

    fn compile_template(&self, options: &TemplateCompileOptions) -> TemplateOutput;

    async fn compile_style(&self, options: StyleCompileOptions) -> StyleOutput;
}

// =============================================================================
// Code transform
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// `import ... from` / `require(...)`, settled before the body runs
    Static,
    /// `import(...)`, loaded when the body asks for it
    Dynamic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub specifier: String,
    pub kind: DependencyKind,
}

impl Dependency {
    pub fn new(specifier: impl Into<String>, kind: DependencyKind) -> Self {
        Self {
            specifier: specifier.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub code: String,
    pub id: ModuleId,
    /// Parser plugins such as `typescript` or `jsx`
    pub syntax_extensions: Vec<CompactString>,
}

/// Executable code plus every specifier it references, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOutput {
    pub code: String,
    pub dependencies: Vec<Dependency>,
}

impl TransformOutput {
    pub fn static_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies_of(DependencyKind::Static)
    }

    pub fn dynamic_dependencies(&self) -> impl Iterator<Item = &str> {
        self.dependencies_of(DependencyKind::Dynamic)
    }

    fn dependencies_of(&self, kind: DependencyKind) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .filter(move |d| d.kind == kind)
            .map(|d| d.specifier.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }
}

/// Turns module source into code the sandbox can run.
#[async_trait(?Send)]
pub trait CodeTransformer {
    /// Identifies the transformer build, see [`SfcCompiler::version`].
    fn version(&self) -> &str;

    async fn transform(&self, request: TransformRequest) -> Result<TransformOutput, TransformError>;
}

// =============================================================================
// Styles
// =============================================================================

/// Replaces the built-in style preprocessing.
#[async_trait(?Send)]
pub trait StylePreprocessor {
    /// `Ok(None)` means "not handled": the raw text is compiled instead
    /// and the result is not cached.
    async fn process(&self, raw: &str, lang: Option<&str>, id: &ModuleId)
        -> LoadResult<Option<String>>;
}

/// Receives compiled CSS.
pub trait StyleSink {
    fn add_style(&self, css: &str, scope_id: Option<&str>);
}

/// Sink that only traces what it is given.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardStyleSink;

impl StyleSink for DiscardStyleSink {
    fn add_style(&self, css: &str, scope_id: Option<&str>) {
        tracing::debug!(scope_id, bytes = css.len(), "style discarded");
    }
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Receives compiler diagnostics meant for the user.
pub trait Logger {
    fn log(&self, level: LogLevel, category: &str, message: &str);
}

/// Forwards to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, category: &str, message: &str) {
        match level {
            LogLevel::Info => tracing::info!(category, "{message}"),
            LogLevel::Warn => tracing::warn!(category, "{message}"),
            LogLevel::Error => tracing::error!(category, "{message}"),
        }
    }
}

// =============================================================================
// Extension hooks
// =============================================================================

/// Runs against the finished component, after every phase.
pub type CustomBlockCallback = Box<dyn FnOnce(Object) -> LocalBoxFuture<'static, LoadResult<()>>>;

/// Handles `<i18n>`, `<docs>` and other non-standard blocks.
#[async_trait(?Send)]
pub trait CustomBlockHandler {
    async fn handle(
        &self,
        block: &SfcCustomBlock,
        id: &ModuleId,
    ) -> LoadResult<Option<CustomBlockCallback>>;
}

/// Takes over loading of particular module types.
#[async_trait(?Send)]
pub trait ModuleHandler {
    /// `Ok(None)` falls back to the built-in handling of `extension`.
    async fn handle(
        &self,
        extension: &str,
        resource: &Resource,
        id: &ModuleId,
    ) -> LoadResult<Option<Value>>;
}
