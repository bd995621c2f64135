//! Per-type module instantiation.

use crate::assembler;
use crate::cache::{with_cache, CacheKey};
use crate::error::{LoadError, LoadResult};
use crate::host::{TransformOutput, TransformRequest};
use crate::loader::Session;
use crate::options::LoaderOptions;
use crate::path::ModuleId;
use crate::sandbox::Module;
use crate::value::Value;
use vize_carton::CompactString;

pub(crate) const SYNTAX_TYPESCRIPT: &str = "typescript";
pub(crate) const SYNTAX_JSX: &str = "jsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ModuleKind {
    Component,
    Script { typescript: bool, jsx: bool },
    Json,
    Style,
}

impl ModuleKind {
    fn from_extension(extension: &str) -> Option<Self> {
        let kind = match extension {
            "vue" => ModuleKind::Component,
            "js" | "mjs" | "cjs" => ModuleKind::Script {
                typescript: false,
                jsx: false,
            },
            "ts" | "mts" | "cts" => ModuleKind::Script {
                typescript: true,
                jsx: false,
            },
            "jsx" => ModuleKind::Script {
                typescript: false,
                jsx: true,
            },
            "tsx" => ModuleKind::Script {
                typescript: true,
                jsx: true,
            },
            "json" => ModuleKind::Json,
            "css" => ModuleKind::Style,
            _ => return None,
        };
        Some(kind)
    }
}

/// Fetch `id` and turn it into exports.
pub(crate) async fn instantiate(
    session: &Session,
    id: &ModuleId,
    module: &Module,
) -> LoadResult<Value> {
    let options = session.options();
    tracing::debug!(module = %id, "fetching");
    let resource = options
        .fetcher
        .fetch(id)
        .await
        .map_err(|source| LoadError::Fetch {
            id: id.clone(),
            source,
        })?;
    let extension = resource.kind.clone().unwrap_or_else(|| id.extension());

    if let Some(handler) = &options.module_handler {
        if let Some(exports) = handler.handle(&extension, &resource, id).await? {
            module.set_exports(exports.clone());
            return Ok(exports);
        }
    }

    match ModuleKind::from_extension(&extension) {
        Some(ModuleKind::Component) => {
            assembler::assemble(session, id, resource.text(id)?, module).await
        }
        Some(ModuleKind::Script { typescript, jsx }) => {
            let syntax = syntax_extensions(&options.config.syntax_extensions, typescript, jsx);
            load_script(session, id, resource.text(id)?, &syntax, module).await
        }
        Some(ModuleKind::Json) => {
            let json: serde_json::Value =
                serde_json::from_str(resource.text(id)?).map_err(|e| LoadError::Parse {
                    id: id.clone(),
                    message: e.to_string(),
                })?;
            let exports = Value::from_json(&json);
            module.set_exports(exports.clone());
            Ok(exports)
        }
        Some(ModuleKind::Style) => {
            options.style_sink.add_style(resource.text(id)?, None);
            Ok(module.exports())
        }
        None => Err(LoadError::UnsupportedModule {
            id: id.clone(),
            extension,
        }),
    }
}

async fn load_script(
    session: &Session,
    id: &ModuleId,
    source: &str,
    syntax: &[CompactString],
    module: &Module,
) -> LoadResult<Value> {
    let options = session.options();
    let key = CacheKey::new("module")
        .text(options.transformer.version())
        .text(source)
        .list(syntax)
        .flag(options.config.production);
    let output: TransformOutput = with_cache(options.compiled_cache.as_deref(), key, |_| {
        transform(options, id, source, syntax)
    })
    .await?;

    let requires = session.load_dependencies(id, &output.dependencies).await?;
    session.execute(id, &output.code, &requires, module)
}

/// Run the code transformer, mapping its failure onto `id`.
pub(crate) async fn transform(
    options: &LoaderOptions,
    id: &ModuleId,
    code: &str,
    syntax: &[CompactString],
) -> LoadResult<TransformOutput> {
    tracing::debug!(module = %id, "transforming");
    options
        .transformer
        .transform(TransformRequest {
            code: code.to_string(),
            id: id.clone(),
            syntax_extensions: syntax.to_vec(),
        })
        .await
        .map_err(|error| LoadError::Transform {
            id: id.clone(),
            error,
        })
}

/// Configured parser plugins plus the ones implied by the source language.
pub(crate) fn syntax_extensions(
    configured: &[CompactString],
    typescript: bool,
    jsx: bool,
) -> Vec<CompactString> {
    let mut syntax = configured.to_vec();
    for (enabled, name) in [(typescript, SYNTAX_TYPESCRIPT), (jsx, SYNTAX_JSX)] {
        if enabled && !syntax.iter().any(|s| s == name) {
            syntax.push(CompactString::from(name));
        }
    }
    syntax
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_by_extension() {
        assert_eq!(ModuleKind::from_extension("vue"), Some(ModuleKind::Component));
        assert_eq!(
            ModuleKind::from_extension("mts"),
            Some(ModuleKind::Script {
                typescript: true,
                jsx: false
            })
        );
        assert_eq!(ModuleKind::from_extension("json"), Some(ModuleKind::Json));
        assert_eq!(ModuleKind::from_extension("png"), None);
        assert_eq!(ModuleKind::from_extension(""), None);
    }

    #[test]
    fn test_syntax_extensions() {
        let configured = vec![CompactString::from("decorators"), CompactString::from("jsx")];
        assert_eq!(
            syntax_extensions(&configured, true, true),
            vec!["decorators", "jsx", "typescript"]
        );
        assert!(syntax_extensions(&[], false, false).is_empty());
    }
}
