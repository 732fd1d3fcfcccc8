//! luapack: a flattening module bundler for Lua.
//!
//! Source files written with an `import`/`export` surface syntax are linked
//! into one flat, plain-Lua file. Every cross-module name is resolved
//! statically at bundle time; there is no runtime loader.

pub mod allocator;
pub mod ast;
pub mod ast_rewriter;
pub mod bundler;
pub mod config;
pub mod emit;
pub mod extractor;
pub mod graph;
pub mod ident_deps;
pub mod lexer;
pub mod lua_stdlib;
pub mod mangler;
pub mod orderer;
pub mod parser;
pub mod resolver;

pub use bundler::Bundler;
pub use config::Config;
pub use mangler::MangleMode;
