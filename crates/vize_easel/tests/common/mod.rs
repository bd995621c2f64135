//! Fakes shared by the integration tests.
//!
//! - `MemoryFetcher`: files by path, records every fetch
//! - `ScriptSandbox`: runs a tiny line-oriented module language
//! - `RegexTransformer`: leaves code as is, scans `import`/`require`
//! - `FakeCompiler`: counting SFC compiler driven by `@@` markers

#![allow(dead_code)]

use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use vize_atelier_sfc::{BindingMetadata, BindingType, SfcDescriptor};
use vize_carton::{CompactString, FxHashMap};
use vize_easel::host::{
    CodeTransformer, Dependency, DependencyKind, Diagnostic, FetchError, LogLevel, Logger,
    Resource, ResourceFetcher, ScriptCompileOptions, ScriptOutput, SfcCompiler,
    StyleCompileOptions, StyleOutput, StyleSink, TemplateCompileOptions, TemplateOutput,
    TransformError, TransformOutput, TransformRequest,
};
use vize_easel::interop::mark_es_module;
use vize_easel::sandbox::{ExecError, ExecutionUnit, Sandbox};
use vize_easel::{Function, LoadResult, LoaderOptions, ModuleId, Object, Session, Value};

// =============================================================================
// Fetcher
// =============================================================================

#[derive(Default)]
pub struct MemoryFetcher {
    files: RefCell<FxHashMap<String, Vec<u8>>>,
    fetched: RefCell<Vec<String>>,
}

impl MemoryFetcher {
    pub fn insert(&self, path: &str, content: &str) {
        self.insert_bytes(path, content.as_bytes());
    }

    pub fn insert_bytes(&self, path: &str, content: &[u8]) {
        self.files
            .borrow_mut()
            .insert(path.to_string(), content.to_vec());
    }

    /// Every fetched identifier, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetched.borrow().clone()
    }

    pub fn fetch_count(&self, id: &str) -> usize {
        self.fetched.borrow().iter().filter(|f| *f == id).count()
    }
}

#[async_trait(?Send)]
impl ResourceFetcher for MemoryFetcher {
    async fn fetch(&self, id: &ModuleId) -> Result<Resource, FetchError> {
        self.fetched.borrow_mut().push(id.to_string());
        // Give concurrent requests a chance to interleave.
        tokio::task::yield_now().await;
        let content = self.files.borrow().get(id.path()).cloned();
        content
            .map(Resource::new)
            .ok_or_else(|| FetchError::not_found(id))
    }
}

// =============================================================================
// Sandbox
// =============================================================================

type PendingImport = (String, LocalBoxFuture<'static, LoadResult<Value>>);

/// Runs one statement per line:
///
/// ```text
/// import NAME from 'SPEC'          const NAME = EXPR
/// import('SPEC')                   function NAME() { return EXPR }
/// export default EXPR              function NAME() { return import('SPEC') }
/// export const NAME = EXPR         NAME.KEY = EXPR
/// export render HTML               module.exports = EXPR
/// throw 'MESSAGE'                  exports.NAME = EXPR
/// log EXPR
/// ```
///
/// A function returning `import('SPEC')` starts the import when called.
///
/// `EXPR` is a JSON literal, a `'string'`, `undefined`, `require('SPEC')`
/// or a local name, the last two optionally followed by `.prop` chains.
#[derive(Default)]
pub struct ScriptSandbox {
    journal: RefCell<Vec<String>>,
    pending: Rc<RefCell<Vec<PendingImport>>>,
}

impl ScriptSandbox {
    /// `exec ID` per executed body and `log VALUE` per `log` statement.
    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    pub fn executions(&self, id: &str) -> usize {
        let entry = format!("exec {id}");
        self.journal.borrow().iter().filter(|e| **e == entry).count()
    }

    /// Dynamic imports started by module bodies, in order.
    pub fn take_imports(&self) -> Vec<PendingImport> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    fn statement(
        &self,
        unit: &ExecutionUnit<'_>,
        scope: &mut FxHashMap<String, Value>,
        line: &str,
    ) -> Result<(), ExecError> {
        if let Some(rest) = line.strip_prefix("import(") {
            let specifier = unquote(rest.trim_end_matches(')'))?;
            self.pending
                .borrow_mut()
                .push((specifier.to_string(), unit.import(specifier)));
        } else if let Some(rest) = line.strip_prefix("import ") {
            let (name, source) = rest.split_once(" from ").ok_or_else(|| syntax_error(line))?;
            let value = unit.requires.import_default(unquote(source)?)?;
            scope.insert(name.trim().to_string(), value);
        } else if let Some(expr) = line.strip_prefix("export default ") {
            let value = eval(unit, scope, expr)?;
            es_exports(unit)?.set("default", value);
        } else if let Some(rest) = line.strip_prefix("export const ") {
            let (name, expr) = assignment(rest)?;
            let value = eval(unit, scope, expr)?;
            scope.insert(name.to_string(), value.clone());
            es_exports(unit)?.set(name, value);
        } else if let Some(html) = line.strip_prefix("export render ") {
            es_exports(unit)?.set("render", Value::Function(render_function(html)));
        } else if let Some(expr) = line.strip_prefix("module.exports = ") {
            unit.module.set_exports(eval(unit, scope, expr)?);
        } else if let Some(rest) = line.strip_prefix("exports.") {
            let (name, expr) = assignment(rest)?;
            let value = eval(unit, scope, expr)?;
            let exports = unit.module.exports();
            let object = exports
                .as_object()
                .ok_or_else(|| ExecError::new("exports is not an object"))?;
            object.set(name, value);
        } else if let Some(rest) = line.strip_prefix("const ") {
            let (name, expr) = assignment(rest)?;
            let value = eval(unit, scope, expr)?;
            scope.insert(name.to_string(), value);
        } else if let Some(rest) = line.strip_prefix("function ") {
            let (name, body) = rest.split_once("()").ok_or_else(|| syntax_error(line))?;
            let expr = body
                .trim()
                .strip_prefix('{')
                .and_then(|b| b.strip_suffix('}'))
                .and_then(|b| b.trim().strip_prefix("return "))
                .ok_or_else(|| syntax_error(line))?;
            let expr = expr.trim().trim_end_matches(';');
            let name = name.trim();
            let function = match expr.strip_prefix("import(") {
                Some(rest) => {
                    let specifier = unquote(rest.trim_end_matches(')'))?.to_string();
                    let importer = unit.importer();
                    let pending = self.pending.clone();
                    Function::new(name, move |_| {
                        let import = importer.import(&specifier);
                        pending.borrow_mut().push((specifier.clone(), import));
                        Ok(Value::Undefined)
                    })
                }
                None => {
                    let value = eval(unit, scope, expr)?;
                    Function::new(name, move |_| Ok(value.clone()))
                }
            };
            scope.insert(name.to_string(), Value::Function(function));
        } else if let Some(message) = line.strip_prefix("throw ") {
            return Err(ExecError::new(unquote(message).unwrap_or(message)));
        } else if let Some(expr) = line.strip_prefix("log ") {
            let value = eval(unit, scope, expr)?;
            self.journal
                .borrow_mut()
                .push(format!("log {}", display(&value)));
        } else if let Some((target, expr)) = line.split_once(" = ") {
            let (name, key) = target.split_once('.').ok_or_else(|| syntax_error(line))?;
            let value = eval(unit, scope, expr)?;
            let object = scope
                .get(name.trim())
                .and_then(|v| v.as_object().cloned())
                .ok_or_else(|| ExecError::new(format!("{name} is not an object")))?;
            object.set(key.trim(), value);
        } else {
            return Err(syntax_error(line));
        }
        Ok(())
    }
}

impl Sandbox for ScriptSandbox {
    fn execute(&self, unit: &ExecutionUnit<'_>) -> Result<(), ExecError> {
        self.journal.borrow_mut().push(format!("exec {}", unit.id));
        let mut scope = FxHashMap::default();
        for line in unit.code.lines() {
            let line = line.trim().trim_end_matches(';');
            if line.is_empty() || line.starts_with("//") {
                continue;
            }
            self.statement(unit, &mut scope, line)?;
        }
        Ok(())
    }
}

fn eval(
    unit: &ExecutionUnit<'_>,
    scope: &FxHashMap<String, Value>,
    expr: &str,
) -> Result<Value, ExecError> {
    let expr = expr.trim();
    if let Some(rest) = expr.strip_prefix("require(") {
        let (specifier, props) = rest.split_once(')').ok_or_else(|| syntax_error(expr))?;
        let value = unit.requires.require(unquote(specifier)?)?;
        return Ok(member(value, props));
    }
    if expr.starts_with('\'') {
        return unquote(expr).map(Value::from);
    }
    if expr == "undefined" {
        return Ok(Value::Undefined);
    }
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(expr) {
        return Ok(Value::from_json(&json));
    }

    let (name, props) = match expr.find('.') {
        Some(dot) => (&expr[..dot], &expr[dot..]),
        None => (expr, ""),
    };
    let value = scope
        .get(name)
        .cloned()
        .ok_or_else(|| ExecError::new(format!("{name} is not defined")))?;
    Ok(member(value, props))
}

fn member(value: Value, props: &str) -> Value {
    props
        .split('.')
        .filter(|p| !p.is_empty())
        .fold(value, |value, prop| value.get(prop))
}

fn es_exports(unit: &ExecutionUnit<'_>) -> Result<Object, ExecError> {
    let exports = unit.module.exports();
    let object = exports
        .as_object()
        .cloned()
        .ok_or_else(|| ExecError::new("exports is not an object"))?;
    mark_es_module(&object);
    Ok(object)
}

/// `render(ctx)` replaces every `{{ name }}` with `ctx.name`.
fn render_function(html: &str) -> Function {
    let html = html.to_string();
    Function::new("render", move |args| {
        let ctx = args.first().cloned().unwrap_or_default();
        let mut out = String::new();
        let mut rest = html.as_str();
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open..].find("}}") else {
                break;
            };
            out.push_str(&rest[..open]);
            out.push_str(&display(&ctx.get(rest[open + 2..open + close].trim())));
            rest = &rest[open + close + 2..];
        }
        out.push_str(rest);
        Ok(Value::from(out))
    })
}

fn assignment(rest: &str) -> Result<(&str, &str), ExecError> {
    rest.split_once(" = ")
        .map(|(name, expr)| (name.trim(), expr))
        .ok_or_else(|| syntax_error(rest))
}

fn unquote(text: &str) -> Result<&str, ExecError> {
    let text = text.trim();
    let quoted = text.len() >= 2
        && ((text.starts_with('\'') && text.ends_with('\''))
            || (text.starts_with('"') && text.ends_with('"')));
    if quoted {
        Ok(&text[1..text.len() - 1])
    } else {
        Err(ExecError::new(format!("expected a string literal: {text}")))
    }
}

fn syntax_error(line: &str) -> ExecError {
    ExecError::new(format!("SyntaxError: {line}"))
}

pub fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(a) => a.to_vec().iter().map(display).collect::<Vec<_>>().join(","),
        other => other.type_name().to_string(),
    }
}

// =============================================================================
// Transformer
// =============================================================================

pub struct RegexTransformer {
    version: String,
    calls: Cell<usize>,
    syntax: RefCell<Vec<Vec<CompactString>>>,
    pattern: Regex,
}

impl Default for RegexTransformer {
    fn default() -> Self {
        Self {
            version: "regex/1".to_string(),
            calls: Cell::new(0),
            syntax: RefCell::new(Vec::new()),
            pattern: Regex::new(
                r#"import\s+\w+\s+from\s+['"]([^'"]+)['"]|require\(\s*['"]([^'"]+)['"]\s*\)|import\(\s*['"]([^'"]+)['"]\s*\)"#,
            )
            .unwrap(),
        }
    }
}

impl RegexTransformer {
    pub fn with_version(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    /// Syntax extensions of every transform, in order.
    pub fn syntax(&self) -> Vec<Vec<CompactString>> {
        self.syntax.borrow().clone()
    }
}

#[async_trait(?Send)]
impl CodeTransformer for RegexTransformer {
    fn version(&self) -> &str {
        &self.version
    }

    async fn transform(&self, request: TransformRequest) -> Result<TransformOutput, TransformError> {
        self.calls.set(self.calls.get() + 1);
        self.syntax
            .borrow_mut()
            .push(request.syntax_extensions.clone());

        if let Some(offset) = request.code.find("@@syntax-error") {
            let line = request.code[..offset].matches('\n').count() as u32 + 1;
            return Err(TransformError::new("Unexpected token").at(line, 1));
        }

        let dependencies = self
            .pattern
            .captures_iter(&request.code)
            .filter_map(|caps| match caps.get(1).or_else(|| caps.get(2)) {
                Some(m) => Some(Dependency::new(m.as_str(), DependencyKind::Static)),
                None => caps
                    .get(3)
                    .map(|m| Dependency::new(m.as_str(), DependencyKind::Dynamic)),
            })
            .collect();

        Ok(TransformOutput {
            code: request.code,
            dependencies,
        })
    }
}

// =============================================================================
// SFC compiler
// =============================================================================

const SCRIPT_ERROR: &str = "@@script-error";
const TEMPLATE_ERROR: &str = "@@template-error";
const TEMPLATE_TIP: &str = "@@tip";
const STYLE_ERROR: &str = "@@style-error";

/// Script: blocks concatenated, `const` names reported as bindings.
/// Template: one `export render` line. Style: trimmed, scope id prefixed
/// when scoped, run through the preprocessor module's `render`.
#[derive(Default)]
pub struct FakeCompiler {
    version: Option<String>,
    script_compiles: Cell<usize>,
    template_compiles: Cell<usize>,
    style_compiles: Cell<usize>,
    style_langs: RefCell<Vec<Option<String>>>,
    bindings_seen: RefCell<Vec<Option<BindingMetadata>>>,
}

impl FakeCompiler {
    pub fn with_version(version: &str) -> Self {
        Self {
            version: Some(version.to_string()),
            ..Self::default()
        }
    }

    pub fn script_compiles(&self) -> usize {
        self.script_compiles.get()
    }

    pub fn template_compiles(&self) -> usize {
        self.template_compiles.get()
    }

    pub fn style_compiles(&self) -> usize {
        self.style_compiles.get()
    }

    /// `preprocess_lang` of every style compile.
    pub fn style_langs(&self) -> Vec<Option<String>> {
        self.style_langs.borrow().clone()
    }

    /// Bindings handed to every template compile.
    pub fn bindings_seen(&self) -> Vec<Option<BindingMetadata>> {
        self.bindings_seen.borrow().clone()
    }
}

fn marker(source: &str, marker: &str, message: &str) -> Option<Diagnostic> {
    source
        .find(marker)
        .map(|start| Diagnostic::new(message).with_range(start..start + marker.len()))
}

#[async_trait(?Send)]
impl SfcCompiler for FakeCompiler {
    fn version(&self) -> &str {
        self.version.as_deref().unwrap_or("fake-sfc/1")
    }

    fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        _options: &ScriptCompileOptions,
    ) -> ScriptOutput {
        self.script_compiles.set(self.script_compiles.get() + 1);

        let mut content = String::new();
        for block in [&descriptor.script, &descriptor.script_setup]
            .into_iter()
            .flatten()
        {
            content.push_str(&block.content);
            content.push('\n');
        }

        let mut bindings = BindingMetadata::new();
        for line in content.lines() {
            if let Some((name, _)) = line.trim().strip_prefix("const ").and_then(|r| r.split_once('=')) {
                bindings.insert(name.trim().to_string(), BindingType::SetupConst);
            }
        }

        ScriptOutput {
            content,
            bindings: Some(bindings),
            errors: marker(&descriptor.source, SCRIPT_ERROR, "Unexpected marker in script")
                .into_iter()
                .collect(),
        }
    }

    fn compile_template(&self, options: &TemplateCompileOptions) -> TemplateOutput {
        self.template_compiles.set(self.template_compiles.get() + 1);
        self.bindings_seen.borrow_mut().push(options.bindings.clone());

        let mut html: String = options.source.lines().map(str::trim).collect();
        if let Some((open, close)) = &options.delimiters {
            html = html.replace(open.as_str(), "{{").replace(close.as_str(), "}}");
        }

        let mut output = TemplateOutput {
            code: format!("export render {html}"),
            ..Default::default()
        };
        output
            .errors
            .extend(marker(&options.source, TEMPLATE_ERROR, "Unknown directive"));
        if options.source.contains(TEMPLATE_TIP) {
            output.tips.push("prefer v-show for frequent toggles".to_string());
        }
        output
    }

    async fn compile_style(&self, options: StyleCompileOptions) -> StyleOutput {
        self.style_compiles.set(self.style_compiles.get() + 1);
        self.style_langs
            .borrow_mut()
            .push(options.preprocess_lang.clone());

        let mut css = options.source.clone();
        let render = options
            .preprocessor
            .as_ref()
            .and_then(|p| p.get("render").as_function().cloned());
        if let Some(render) = render {
            if let Ok(Value::String(out)) = render.call(&[Value::from(css.as_str())]) {
                css = out.to_string();
            }
        }
        let css = if options.trim { css.trim().to_string() } else { css };
        let code = if options.scoped {
            format!("[{}] {css}", options.id)
        } else {
            css
        };

        StyleOutput {
            code,
            errors: marker(&options.source, STYLE_ERROR, "Unclosed block")
                .into_iter()
                .collect(),
        }
    }
}

// =============================================================================
// Sink and logger
// =============================================================================

#[derive(Default)]
pub struct RecordingSink {
    styles: RefCell<Vec<(String, Option<String>)>>,
}

impl RecordingSink {
    pub fn styles(&self) -> Vec<(String, Option<String>)> {
        self.styles.borrow().clone()
    }
}

impl StyleSink for RecordingSink {
    fn add_style(&self, css: &str, scope_id: Option<&str>) {
        self.styles
            .borrow_mut()
            .push((css.to_string(), scope_id.map(str::to_string)));
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    entries: RefCell<Vec<(LogLevel, String, String)>>,
}

impl RecordingLogger {
    /// Messages logged at `level` under `category`.
    pub fn messages(&self, level: LogLevel, category: &str) -> Vec<String> {
        self.entries
            .borrow()
            .iter()
            .filter(|(l, c, _)| *l == level && c == category)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

impl Logger for RecordingLogger {
    fn log(&self, level: LogLevel, category: &str, message: &str) {
        self.entries
            .borrow_mut()
            .push((level, category.to_string(), message.to_string()));
    }
}

// =============================================================================
// Harness
// =============================================================================

/// All fakes wired together.
#[derive(Default)]
pub struct Harness {
    pub fetcher: Rc<MemoryFetcher>,
    pub compiler: Rc<FakeCompiler>,
    pub transformer: Rc<RegexTransformer>,
    pub sandbox: Rc<ScriptSandbox>,
    pub sink: Rc<RecordingSink>,
    pub logger: Rc<RecordingLogger>,
}

impl Harness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, path: &str, content: &str) -> &Self {
        self.fetcher.insert(path, content);
        self
    }

    pub fn options(&self) -> LoaderOptions {
        LoaderOptions::new(
            self.fetcher.clone(),
            self.compiler.clone(),
            self.transformer.clone(),
            self.sandbox.clone(),
        )
        .with_style_sink(self.sink.clone())
        .with_logger(self.logger.clone())
    }

    pub fn session(&self) -> Session {
        Session::new(self.options())
    }
}

/// An object with a `render(source)` function, as template and style
/// language processors expose.
pub fn processor(render: impl Fn(&str) -> String + 'static) -> Value {
    let object = Object::new();
    object.set(
        "render",
        Value::Function(Function::new("render", move |args| {
            let source = args.first().and_then(Value::as_str).unwrap_or_default();
            Ok(Value::from(render(source)))
        })),
    );
    Value::Object(object)
}
