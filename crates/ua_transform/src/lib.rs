//! Rewrites `async` functions into equivalent `Promise` chains.
//!
//! Every `await` becomes a step boundary: the statements before it run in one
//! `.then` callback, the awaited value is returned from it, and the rest of
//! the function continues in the next callback with the value as `_resp`.
//! Control flow the chain cannot express directly is normalized first:
//! - loops containing `await` become recursive functions,
//! - `switch` becomes an if-chain,
//! - `return` inside `try` is captured into a flag and a result variable,
//! - ifs are brought into single-exit form.
//!
//! ```text
//! async function f() { a(); await b(); return c(); }
//! =>
//! function f() {
//!   return Promise.resolve().then(function () {
//!     a();
//!     return b();
//!   }).then(function () {
//!     return c();
//!   });
//! }
//! ```

mod blocks;
mod build;
mod capture;
mod chain;
mod context;
pub mod error;
mod exits;
mod hoist;
mod inline;
mod loops;
mod order;
pub mod scope;
mod switch;
mod transform;
mod walk;

#[cfg(test)]
mod test_utils;

pub use error::{Result, TransformError};
pub use scope::Scope;
pub use transform::{transform_function, transform_module};
pub use ua_ast::TransformOptions;
