//! ECMAScript/TypeScript AST for unawait.
//!
//! Re-exports the standard SWC AST and adds the options that control the
//! async-to-promise rewrite.

pub use swc_ecma_ast::*;

use serde::{Deserialize, Serialize};

/// Options controlling the async-to-promise rewrite.
///
/// Loaded from JSON by the CLI (`--config`); every field is optional there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformOptions {
    /// Run the final inliner that collapses single-return IIFEs.
    pub inline: bool,
    /// Hoist operands evaluated before an `await` into `_temp` variables so
    /// left-to-right evaluation order survives the split.
    pub hoist_exec_order: bool,
    /// Abort on constructs the rewrite cannot handle instead of leaving them
    /// untouched.
    pub strict: bool,
    /// Identifier the generated chains start from (`Promise.resolve()`).
    pub promise_ident: String,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            inline: true,
            hoist_exec_order: true,
            strict: false,
            promise_ident: "Promise".to_string(),
        }
    }
}

/// The async flavours an input function can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AsyncKind {
    /// `async function` declarations, expressions and methods.
    Function,
    /// `async () => ...`
    Arrow,
}

impl std::fmt::Display for AsyncKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsyncKind::Function => write!(f, "async function"),
            AsyncKind::Arrow => write!(f, "async arrow"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_fill_missing_fields_with_defaults() {
        let opts: TransformOptions = serde_json::from_str(r#"{ "strict": true }"#).unwrap();
        assert!(opts.strict);
        assert!(opts.inline);
        assert!(opts.hoist_exec_order);
        assert_eq!(opts.promise_ident, "Promise");
    }

    #[test]
    fn options_roundtrip_through_json() {
        let opts = TransformOptions {
            inline: false,
            promise_ident: "P".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&opts).unwrap();
        let back: TransformOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}
