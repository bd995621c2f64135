//! Single file component assembly.
//!
//! A component is built in a fixed order:
//!
//! 1. parse the source into blocks and fetch `src` scripts,
//! 2. hand custom blocks to the custom block handler,
//! 3. load the template language processor, if any,
//! 4. compile, transform and run the script,
//! 5. compile, transform and run the template,
//! 6. compile every style block and pass it to the style sink,
//! 7. apply the custom block callbacks.
//!
//! Script failures abort the load. Template and style diagnostics are
//! logged and keep the artifact out of the cache, and one broken style
//! block does not affect the others.

use crate::cache::{with_cache, CacheControl, CacheKey};
use crate::diagnostics::format_diagnostic;
use crate::error::{LoadError, LoadResult, Phase};
use crate::handler::{self, syntax_extensions};
use crate::host::{
    CustomBlockCallback, Dependency, Diagnostic, LogLevel, ScriptCompileOptions,
    StyleCompileOptions, TemplateCompileOptions,
};
use crate::interop::{import_default, merge_exports};
use crate::loader::Session;
use crate::options::LoaderOptions;
use crate::path::ModuleId;
use crate::sandbox::Module;
use crate::value::{Object, Value};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use vize_atelier_sfc::{
    BindingMetadata, SfcBlock, SfcCustomBlock, SfcDescriptor, SfcScriptBlock, SfcStyleBlock,
    SfcTemplateBlock,
};
use vize_carton::hash::short_hash;
use vize_carton::CompactString;

/// Component property holding the scope id when a style is scoped.
pub const SCOPE_ID_KEY: &str = "__scopeId";

const SCRIPT_CATEGORY: &str = "SFC script";
const TEMPLATE_CATEGORY: &str = "SFC template";
const STYLE_CATEGORY: &str = "SFC style";

/// `data-v-xxxxxxxx` scope id of the component `id`.
pub fn scope_id(id: &ModuleId) -> String {
    format!("data-v-{}", short_hash(&id.to_string()))
}

/// Build the component object for the source of `id`.
///
/// The component object is published as the module's exports before any
/// phase runs, so a dependency that reaches back to this component sees
/// the same object.
pub(crate) async fn assemble(
    session: &Session,
    id: &ModuleId,
    source: &str,
    module: &Module,
) -> LoadResult<Value> {
    let component = Object::new();
    module.set_exports(Value::Object(component.clone()));

    let assembler = ComponentAssembler {
        session,
        options: session.options(),
        id,
        filename: id.path().to_string(),
        scope_id: scope_id(id),
        component,
    };
    assembler.run(source).await
}

/// Cached output of the script phase.
#[derive(Debug, Serialize, Deserialize)]
struct ScriptArtifact {
    bindings: Option<BindingMetadata>,
    dependencies: Vec<Dependency>,
    code: String,
}

/// Cached output of the template phase.
#[derive(Debug, Serialize, Deserialize)]
struct TemplateArtifact {
    dependencies: Vec<Dependency>,
    code: String,
}

/// The blocks of a component, in source order, sorted by the phase
/// that handles them.
#[derive(Debug, Default)]
struct ComponentBlocks<'d> {
    script: Option<&'d SfcScriptBlock>,
    script_setup: Option<&'d SfcScriptBlock>,
    template: Option<&'d SfcTemplateBlock>,
    styles: Vec<&'d SfcStyleBlock>,
    custom: Vec<&'d SfcCustomBlock>,
}

impl<'d> ComponentBlocks<'d> {
    fn collect(descriptor: &'d SfcDescriptor) -> Self {
        let mut blocks = Self::default();
        for block in descriptor.blocks() {
            match block {
                SfcBlock::Template(template) => blocks.template = Some(template),
                SfcBlock::Script(script) => blocks.script = Some(script),
                SfcBlock::ScriptSetup(setup) => blocks.script_setup = Some(setup),
                SfcBlock::Style(style) => blocks.styles.push(style),
                SfcBlock::Custom(custom) => blocks.custom.push(custom),
            }
        }
        blocks
    }

    fn scripts(&self) -> impl Iterator<Item = &'d SfcScriptBlock> {
        self.script.into_iter().chain(self.script_setup)
    }

    fn has_scoped_style(&self) -> bool {
        self.styles.iter().any(|style| style.scoped)
    }
}

struct ComponentAssembler<'a> {
    session: &'a Session,
    options: &'a LoaderOptions,
    id: &'a ModuleId,
    filename: String,
    scope_id: String,
    component: Object,
}

impl ComponentAssembler<'_> {
    async fn run(self, source: &str) -> LoadResult<Value> {
        let mut descriptor = self.parse(source)?;
        self.resolve_script_sources(&mut descriptor).await?;
        let blocks = ComponentBlocks::collect(&descriptor);

        let callbacks = self.handle_custom_blocks(&blocks.custom).await?;

        let scoped = blocks.has_scoped_style();
        if scoped {
            self.component
                .set(SCOPE_ID_KEY, Value::from(self.scope_id.as_str()));
        }

        let template_lang = blocks
            .template
            .and_then(|t| t.lang.as_deref())
            .filter(|lang| *lang != "html");
        let template_processor = match template_lang {
            Some(lang) => Some(self.session.load_module_internal(self.id, lang).await?),
            None => None,
        };

        let syntax = syntax_extensions(
            &self.options.config.syntax_extensions,
            blocks.scripts().any(|b| b.is_ts()),
            blocks.scripts().any(|b| b.is_jsx()),
        );

        let mut bindings = None;
        if blocks.scripts().next().is_some() {
            bindings = self.script_phase(&descriptor, &blocks, &syntax).await?;
        }

        if let Some(template) = blocks.template {
            self.template_phase(
                template,
                template_processor.as_ref(),
                bindings.as_ref(),
                scoped,
                &syntax,
            )
            .await?;
        }

        for style in &blocks.styles {
            if let Err(error) = self.style_block(style).await {
                self.options
                    .logger
                    .log(LogLevel::Error, STYLE_CATEGORY, &error.to_string());
            }
        }

        for callback in callbacks {
            callback(self.component.clone()).await?;
        }

        Ok(Value::Object(self.component))
    }

    fn parse(&self, source: &str) -> LoadResult<SfcDescriptor> {
        self.options
            .sfc_compiler
            .parse(source, &self.filename)
            .map_err(|e| LoadError::Parse {
                id: self.id.clone(),
                message: format_diagnostic(
                    &e.message,
                    &self.filename,
                    source,
                    e.loc.as_ref().map(|loc| loc.start..loc.end),
                ),
            })
    }

    async fn handle_custom_blocks(
        &self,
        custom: &[&SfcCustomBlock],
    ) -> LoadResult<Vec<CustomBlockCallback>> {
        let Some(handler) = &self.options.custom_block_handler else {
            return Ok(Vec::new());
        };
        let callbacks =
            try_join_all(custom.iter().map(|block| handler.handle(block, self.id))).await?;
        Ok(callbacks.into_iter().flatten().collect())
    }

    // =========================================================================
    // Script
    // =========================================================================

    async fn resolve_script_sources(&self, descriptor: &mut SfcDescriptor) -> LoadResult<()> {
        let blocks = [descriptor.script.as_mut(), descriptor.script_setup.as_mut()];
        for block in blocks.into_iter().flatten() {
            if let Some(src) = block.src.clone() {
                block.content = self.fetch_src(&src).await?;
            }
        }
        Ok(())
    }

    async fn script_phase(
        &self,
        descriptor: &SfcDescriptor,
        blocks: &ComponentBlocks<'_>,
        syntax: &[CompactString],
    ) -> LoadResult<Option<BindingMetadata>> {
        let config = &self.options.config;
        let script = blocks.script;
        let setup = blocks.script_setup;
        let key = self
            .compiled_key("script")
            .flag(config.production)
            .flag(config.dev_mode)
            .opt(script.map(|s| s.content.as_str()))
            .opt(script.and_then(|s| s.lang.as_deref()))
            .opt(setup.map(|s| s.content.as_str()))
            .opt(setup.and_then(|s| s.lang.as_deref()))
            .text(&self.scope_id)
            .list(syntax);

        let artifact: ScriptArtifact =
            with_cache(self.options.compiled_cache.as_deref(), key, |_| {
                self.compile_script(descriptor, syntax)
            })
            .await?;

        let exports = self.run_block(&artifact.code, &artifact.dependencies).await?;
        merge_exports(&self.component, &import_default(&exports));
        Ok(artifact.bindings)
    }

    async fn compile_script(
        &self,
        descriptor: &SfcDescriptor,
        syntax: &[CompactString],
    ) -> LoadResult<ScriptArtifact> {
        let compiled = self.options.sfc_compiler.compile_script(
            descriptor,
            &ScriptCompileOptions {
                id: self.scope_id.clone(),
                is_production: self.options.config.production,
                syntax_extensions: syntax.to_vec(),
            },
        );
        if !compiled.errors.is_empty() {
            let messages = self.report(SCRIPT_CATEGORY, &compiled.errors, &descriptor.source);
            return Err(LoadError::Compile {
                id: self.id.clone(),
                phase: Phase::Script,
                messages,
            });
        }

        let output = handler::transform(self.options, self.id, &compiled.content, syntax).await?;
        Ok(ScriptArtifact {
            bindings: compiled.bindings,
            dependencies: output.dependencies,
            code: output.code,
        })
    }

    // =========================================================================
    // Template
    // =========================================================================

    async fn template_phase(
        &self,
        template: &SfcTemplateBlock,
        processor: Option<&Value>,
        bindings: Option<&BindingMetadata>,
        scoped: bool,
        syntax: &[CompactString],
    ) -> LoadResult<()> {
        let mut source = match &template.src {
            Some(src) => self.fetch_src(src).await?,
            None => template.content.clone(),
        };
        if let (Some(lang), Some(processor)) = (template.lang.as_deref(), processor) {
            source = self.preprocess_template(source, lang, processor).await?;
        }

        let config = &self.options.config;
        let key = self
            .compiled_key("template")
            .flag(config.production)
            .flag(config.dev_mode)
            .text(&source)
            .json(&config.delimiters)
            .text(config.whitespace.as_str())
            .opt(scoped.then_some(self.scope_id.as_str()))
            .json(&bindings)
            .list(syntax);

        let options = TemplateCompileOptions {
            source,
            filename: self.filename.clone(),
            id: self.scope_id.clone(),
            scoped,
            bindings: bindings.cloned(),
            delimiters: config.delimiters.clone(),
            whitespace: config.whitespace,
            is_production: config.production,
            dev_mode: config.dev_mode,
        };
        let artifact: TemplateArtifact =
            with_cache(self.options.compiled_cache.as_deref(), key, |control| {
                self.compile_template(control, options, syntax)
            })
            .await?;

        let exports = self.run_block(&artifact.code, &artifact.dependencies).await?;
        merge_exports(&self.component, &exports);
        Ok(())
    }

    async fn compile_template(
        &self,
        control: CacheControl,
        options: TemplateCompileOptions,
        syntax: &[CompactString],
    ) -> LoadResult<TemplateArtifact> {
        let compiled = self.options.sfc_compiler.compile_template(&options);
        if !compiled.errors.is_empty() {
            control.prevent_cache();
            self.report(TEMPLATE_CATEGORY, &compiled.errors, &options.source);
        }
        for tip in &compiled.tips {
            self.options
                .logger
                .log(LogLevel::Info, TEMPLATE_CATEGORY, tip);
        }

        let output = handler::transform(self.options, self.id, &compiled.code, syntax).await?;
        Ok(TemplateArtifact {
            dependencies: output.dependencies,
            code: output.code,
        })
    }

    /// Run the template through the `render` function of its language
    /// processor module.
    async fn preprocess_template(
        &self,
        source: String,
        lang: &str,
        processor: &Value,
    ) -> LoadResult<String> {
        let key = CacheKey::new("template-lang").text(&source).text(lang);
        with_cache(self.options.compiled_cache.as_deref(), key, |_| async move {
            self.render_template(source, lang, processor)
        })
        .await
    }

    fn render_template(&self, source: String, lang: &str, processor: &Value) -> LoadResult<String> {
        let render = processor
            .get("render")
            .as_function()
            .cloned()
            .or_else(|| import_default(processor).get("render").as_function().cloned());
        let Some(render) = render else {
            return Err(self.template_error(format!("'{lang}' exports no render function")));
        };

        match render.call(&[Value::from(source)]) {
            Ok(Value::String(html)) => Ok(html.to_string()),
            Ok(other) => Err(self.template_error(format!(
                "'{lang}' render returned {}",
                other.type_name()
            ))),
            Err(e) => Err(self.template_error(format!("'{lang}' render failed: {e}"))),
        }
    }

    fn template_error(&self, message: String) -> LoadError {
        LoadError::Compile {
            id: self.id.clone(),
            phase: Phase::Template,
            messages: vec![message],
        }
    }

    // =========================================================================
    // Styles
    // =========================================================================

    async fn style_block(&self, style: &SfcStyleBlock) -> LoadResult<()> {
        let raw = match &style.src {
            Some(src) => self.fetch_src(src).await?,
            None => style.content.clone(),
        };

        let key = CacheKey::new("style")
            .text(self.options.sfc_compiler.version())
            .flag(self.options.config.production)
            .text(&raw)
            .opt(style.lang.as_deref())
            .text(&self.scope_id)
            .flag(style.scoped);
        let css: String = with_cache(self.options.compiled_cache.as_deref(), key, |control| {
            self.compile_style(control, style, raw)
        })
        .await?;

        self.options
            .style_sink
            .add_style(&css, style.scoped.then_some(self.scope_id.as_str()));
        Ok(())
    }

    async fn compile_style(
        &self,
        control: CacheControl,
        style: &SfcStyleBlock,
        raw: String,
    ) -> LoadResult<String> {
        let mut options = StyleCompileOptions {
            source: raw,
            filename: self.filename.clone(),
            id: self.scope_id.clone(),
            scoped: style.scoped,
            is_production: self.options.config.production,
            trim: true,
            preprocess_lang: None,
            preprocessor: None,
        };

        let lang = style.lang.as_deref();
        match &self.options.style_preprocessor {
            Some(preprocessor) => {
                match preprocessor.process(&options.source, lang, self.id).await? {
                    Some(css) => options.source = css,
                    None => control.prevent_cache(),
                }
            }
            None => {
                if let Some(lang) = lang.filter(|lang| *lang != "css") {
                    let processor = self.session.load_module_internal(self.id, lang).await?;
                    options.preprocess_lang = Some(lang.to_string());
                    options.preprocessor = Some(processor);
                }
            }
        }

        let source = options.source.clone();
        let compiled = self.options.sfc_compiler.compile_style(options).await;
        if !compiled.errors.is_empty() {
            control.prevent_cache();
            self.report(STYLE_CATEGORY, &compiled.errors, &source);
        }
        Ok(compiled.code)
    }

    // =========================================================================
    // Shared
    // =========================================================================

    /// Key of an artifact produced by the SFC compiler and the transformer.
    fn compiled_key(&self, kind: &str) -> CacheKey {
        CacheKey::new(kind)
            .text(self.options.sfc_compiler.version())
            .text(self.options.transformer.version())
    }

    async fn fetch_src(&self, src: &str) -> LoadResult<String> {
        let id = self.session.resolve(self.id, src)?;
        let resource = self
            .options
            .fetcher
            .fetch(&id)
            .await
            .map_err(|source| LoadError::Fetch {
                id: id.clone(),
                source,
            })?;
        resource.text(&id).map(str::to_string)
    }

    /// Load the dependencies of a compiled block and run it.
    async fn run_block(&self, code: &str, dependencies: &[Dependency]) -> LoadResult<Value> {
        let requires = self
            .session
            .load_dependencies(self.id, dependencies)
            .await?;
        self.session
            .execute(self.id, code, &requires, &Module::new())
    }

    /// Log every diagnostic at error level and return their messages.
    fn report(&self, category: &str, diagnostics: &[Diagnostic], source: &str) -> Vec<String> {
        diagnostics
            .iter()
            .map(|diagnostic| {
                let rendered = format_diagnostic(
                    &diagnostic.message,
                    &self.filename,
                    source,
                    diagnostic.range.clone(),
                );
                self.options
                    .logger
                    .log(LogLevel::Error, category, &rendered);
                diagnostic.message.clone()
            })
            .collect()
    }
}
