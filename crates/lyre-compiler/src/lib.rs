//! Lyre compiler: lexer, parser, and bytecode compiler for the Lyre
//! scripting language, plus the search query mini-language.

pub mod ast;
pub mod code;
pub mod compiler;
pub mod disasm;
pub mod lexer;
pub mod parser;
pub mod query;
pub mod routine;
pub mod token;
