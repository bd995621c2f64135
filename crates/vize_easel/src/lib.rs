//! # vize_easel
//!
//! Easel - Runtime loading of Vue Single File Components for Vize.
//!
//! ## Name Origin
//!
//! An **easel** holds a work up while it is being shown, no frame or
//! gallery required. `vize_easel` does the same for `.vue` files: it takes
//! a component straight from its source and puts it up as a live module
//! at run time, without a build step in between.
//!
//! ## Architecture
//!
//! ```text
//! load_module("/app.vue")
//!        |
//!        v
//! +-------------+   resolve    +--------------+
//! |   Session   |------------->| PathResolver |
//! |  (registry) |              +--------------+
//! +-------------+
//!        | fetch + dispatch by extension
//!        v
//! +--------------------+     +-----------------------+
//! | ComponentAssembler |---->| with_cache(CacheKey)  |
//! | .vue               |     |  SfcCompiler          |
//! +--------------------+     |  CodeTransformer      |
//! | script module      |---->+-----------------------+
//! | .js .ts .jsx ...   |
//! +--------------------+
//!        | static dependencies, depth first
//!        v
//! +--------------------+
//! | Sandbox::execute   |  RequireMap + Module exports + import()
//! +--------------------+
//! ```
//!
//! Compilers, the code transformer and the JavaScript engine are supplied
//! by the host through the traits in [`host`] and [`sandbox`].
//!
//! ## Usage
//!
//! ```ignore
//! let options = LoaderOptions::new(fetcher, compiler, transformer, sandbox)
//!     .with_module("vue", vue_exports)
//!     .with_compiled_cache(Rc::new(MemoryCache::new()));
//!
//! let component = vize_easel::load_module("/app.vue", &options).await?;
//! ```

mod assembler;
pub mod cache;
pub mod config;
pub mod diagnostics;
mod error;
mod handler;
pub mod host;
pub mod interop;
mod loader;
mod options;
pub mod path;
pub mod sandbox;
pub mod value;

pub use assembler::{scope_id, SCOPE_ID_KEY};
pub use cache::{with_cache, CacheBackend, CacheControl, CacheError, CacheKey, MemoryCache};
pub use config::{load_config, LoaderConfig, Whitespace};
pub use error::{LoadError, LoadResult, Phase};
pub use loader::{ModuleRecord, ModuleState, Session};
pub use options::LoaderOptions;
pub use path::{resolve, DefaultPathResolver, ModuleId, PathResolver};
pub use value::{Array, Function, Object, Value};

/// Version of vize_easel. Part of every cache key.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load `path` in a fresh session.
///
/// Every call starts with an empty registry, so nothing but the compiled
/// cache in `options` is shared between calls.
pub async fn load_module(path: &str, options: &LoaderOptions) -> LoadResult<Value> {
    Session::new(options.clone()).load_module(path).await
}
