//! Atelier SFC - The Single File Component workshop for Vize.
//!
//! Splits a `.vue` document into its top-level blocks. Compiling those
//! blocks is left to whoever consumes the [`SfcDescriptor`]; the runtime
//! loader in `vize_easel` plugs its own compilers in.
//!
//! ```
//! use vize_atelier_sfc::{parse_sfc, SfcBlock, SfcParseOptions};
//!
//! let descriptor = parse_sfc(
//!     "<template><p>{{ msg }}</p></template><style scoped>p {}</style>",
//!     SfcParseOptions::default(),
//! )
//! .unwrap();
//!
//! assert!(descriptor.has_scoped_style());
//! assert!(matches!(descriptor.blocks()[0], SfcBlock::Template(_)));
//! ```

mod parse;
mod types;

pub use parse::parse_sfc;
pub use types::*;
