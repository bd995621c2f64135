//! Bridging `require`-style exports and `import`/`export` modules.
//!
//! A module compiled from `export` syntax flags its exports object with
//! `__esModule`. Everything else is a plain `module.exports` value and is
//! seen by an ESM importer as the default export.

use crate::value::{Object, Value};

/// Property marking an exports object as produced by ESM code.
pub const ES_MODULE_FLAG: &str = "__esModule";

pub fn is_es_module(value: &Value) -> bool {
    value.get(ES_MODULE_FLAG).is_truthy()
}

pub fn mark_es_module(object: &Object) {
    object.set(ES_MODULE_FLAG, Value::Bool(true));
}

/// Flagged exports pass through; anything else becomes `{ default: value }`.
pub fn interop_require_default(value: &Value) -> Value {
    if is_es_module(value) {
        return value.clone();
    }
    let wrapper = Object::new();
    wrapper.set("default", value.clone());
    Value::Object(wrapper)
}

/// What `import x from '...'` binds `x` to.
pub fn import_default(value: &Value) -> Value {
    interop_require_default(value).get("default")
}

/// Copy the properties of `exports` onto `target`, skipping the ESM flag.
pub fn merge_exports(target: &Object, exports: &Value) {
    let Some(source) = exports.as_object() else {
        return;
    };
    for (key, value) in source.entries() {
        if key != ES_MODULE_FLAG {
            target.set(key, value);
        }
    }
}
