//! SFC type definitions.
//!
//! The descriptor owns its strings: a runtime loader keeps descriptors
//! alive across suspension points and hands blocks to user callbacks, so
//! borrowing from the source buffer would only push lifetimes into every
//! async signature downstream.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use vize_carton::FxHashMap;

/// Attribute map of a block's opening tag.
pub type BlockAttrs = FxHashMap<String, String>;

/// SFC Descriptor - parsed result of a .vue file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfcDescriptor {
    /// Filename
    pub filename: String,

    /// Source code
    pub source: String,

    /// Template block
    pub template: Option<SfcTemplateBlock>,

    /// Script block (options API or <script> without setup)
    pub script: Option<SfcScriptBlock>,

    /// Script setup block
    pub script_setup: Option<SfcScriptBlock>,

    /// Style blocks
    pub styles: Vec<SfcStyleBlock>,

    /// Custom blocks
    pub custom_blocks: Vec<SfcCustomBlock>,
}

impl SfcDescriptor {
    /// Create an empty descriptor for `filename`.
    pub fn new(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Whether any script-like block is present.
    pub fn has_script(&self) -> bool {
        self.script.is_some() || self.script_setup.is_some()
    }

    /// Whether at least one style block is scoped.
    pub fn has_scoped_style(&self) -> bool {
        self.styles.iter().any(|s| s.scoped)
    }

    /// All blocks as tagged variants, in source order.
    pub fn blocks(&self) -> Vec<SfcBlock<'_>> {
        let mut blocks = Vec::with_capacity(
            3 + self.styles.len() + self.custom_blocks.len(),
        );
        if let Some(template) = &self.template {
            blocks.push(SfcBlock::Template(template));
        }
        if let Some(script) = &self.script {
            blocks.push(SfcBlock::Script(script));
        }
        if let Some(setup) = &self.script_setup {
            blocks.push(SfcBlock::ScriptSetup(setup));
        }
        blocks.extend(self.styles.iter().map(SfcBlock::Style));
        blocks.extend(self.custom_blocks.iter().map(SfcBlock::Custom));
        blocks.sort_by_key(|b| b.loc().start);
        blocks
    }
}

/// A block of a descriptor, tagged by kind.
#[derive(Debug, Clone, Copy)]
pub enum SfcBlock<'d> {
    Template(&'d SfcTemplateBlock),
    Script(&'d SfcScriptBlock),
    ScriptSetup(&'d SfcScriptBlock),
    Style(&'d SfcStyleBlock),
    Custom(&'d SfcCustomBlock),
}

impl<'d> SfcBlock<'d> {
    /// Tag name of the block as written in the source.
    pub fn tag(&self) -> &'d str {
        match self {
            SfcBlock::Template(_) => "template",
            SfcBlock::Script(_) | SfcBlock::ScriptSetup(_) => "script",
            SfcBlock::Style(_) => "style",
            SfcBlock::Custom(block) => &block.block_type,
        }
    }

    /// Raw block content.
    pub fn content(&self) -> &'d str {
        match self {
            SfcBlock::Template(b) => &b.content,
            SfcBlock::Script(b) | SfcBlock::ScriptSetup(b) => &b.content,
            SfcBlock::Style(b) => &b.content,
            SfcBlock::Custom(b) => &b.content,
        }
    }

    /// Location of the block content.
    pub fn loc(&self) -> &'d BlockLocation {
        match self {
            SfcBlock::Template(b) => &b.loc,
            SfcBlock::Script(b) | SfcBlock::ScriptSetup(b) => &b.loc,
            SfcBlock::Style(b) => &b.loc,
            SfcBlock::Custom(b) => &b.loc,
        }
    }

    /// `src` attribute, for blocks that may be external.
    pub fn src(&self) -> Option<&'d str> {
        match self {
            SfcBlock::Template(b) => b.src.as_deref(),
            SfcBlock::Script(b) | SfcBlock::ScriptSetup(b) => b.src.as_deref(),
            SfcBlock::Style(b) => b.src.as_deref(),
            SfcBlock::Custom(b) => b.attrs.get("src").map(String::as_str),
        }
    }
}

/// Template block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfcTemplateBlock {
    /// Block content
    pub content: String,

    /// Block location in source
    pub loc: BlockLocation,

    /// Template language (default: html)
    #[serde(default)]
    pub lang: Option<String>,

    /// Source attribute for external template
    #[serde(default)]
    pub src: Option<String>,

    /// Additional attributes
    #[serde(default)]
    pub attrs: BlockAttrs,
}

/// Script block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfcScriptBlock {
    /// Block content
    pub content: String,

    /// Block location in source
    pub loc: BlockLocation,

    /// Script language (js/ts)
    #[serde(default)]
    pub lang: Option<String>,

    /// Source attribute for external script
    #[serde(default)]
    pub src: Option<String>,

    /// Whether this is script setup
    #[serde(default)]
    pub setup: bool,

    /// Additional attributes
    #[serde(default)]
    pub attrs: BlockAttrs,
}

impl SfcScriptBlock {
    /// Whether the block is written in TypeScript.
    pub fn is_ts(&self) -> bool {
        matches!(self.lang.as_deref(), Some("ts" | "tsx"))
    }

    /// Whether the block uses JSX syntax.
    pub fn is_jsx(&self) -> bool {
        matches!(self.lang.as_deref(), Some("jsx" | "tsx"))
    }
}

/// Style block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfcStyleBlock {
    /// Block content
    pub content: String,

    /// Block location in source
    pub loc: BlockLocation,

    /// Style language (css/scss/less/etc)
    #[serde(default)]
    pub lang: Option<String>,

    /// Source attribute for external style
    #[serde(default)]
    pub src: Option<String>,

    /// Whether the style is scoped
    #[serde(default)]
    pub scoped: bool,

    /// CSS module name, `$style` when the attribute has no value
    #[serde(default)]
    pub module: Option<String>,

    /// Additional attributes
    #[serde(default)]
    pub attrs: BlockAttrs,
}

/// Custom block (e.g., <i18n>, <docs>)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SfcCustomBlock {
    /// Block type/tag name
    #[serde(rename = "type")]
    pub block_type: String,

    /// Block content
    pub content: String,

    /// Block location in source
    pub loc: BlockLocation,

    /// Additional attributes
    #[serde(default)]
    pub attrs: BlockAttrs,
}

/// Location information for a block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockLocation {
    /// Start offset of the content in source
    pub start: usize,

    /// End offset of the content in source
    pub end: usize,

    /// Start line (1-based)
    pub start_line: usize,

    /// Start column (1-based)
    pub start_column: usize,

    /// End line (1-based)
    pub end_line: usize,

    /// End column (1-based)
    pub end_column: usize,
}

/// How a name declared in `<script>` / `<script setup>` is bound.
///
/// Produced by the script compiler and consumed by the template compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingType {
    Data,
    Props,
    PropsAliased,
    SetupLet,
    SetupConst,
    SetupReactiveConst,
    SetupMaybeRef,
    SetupRef,
    Options,
    LiteralConst,
}

/// Binding metadata, ordered by name so it serializes deterministically.
pub type BindingMetadata = BTreeMap<String, BindingType>;

/// Parse options for SFC
#[derive(Debug, Clone)]
pub struct SfcParseOptions {
    /// Filename
    pub filename: String,

    /// Drop script/style/custom blocks whose content is blank and that
    /// have no `src`
    pub ignore_empty: bool,
}

impl Default for SfcParseOptions {
    fn default() -> Self {
        Self {
            filename: String::from("anonymous.vue"),
            ignore_empty: true,
        }
    }
}

/// SFC parse error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct SfcError {
    /// Error message
    pub message: String,

    /// Error code
    #[serde(default)]
    pub code: Option<String>,

    /// Location
    #[serde(default)]
    pub loc: Option<BlockLocation>,
}

impl SfcError {
    pub(crate) fn new(message: impl Into<String>, code: &str, loc: BlockLocation) -> Self {
        Self {
            message: message.into(),
            code: Some(code.to_string()),
            loc: Some(loc),
        }
    }
}
