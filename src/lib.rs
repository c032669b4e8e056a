// Reading sources
mod span;
pub use span::{Idx, Span};
mod source;
pub use source::{Line, Source};

// Assembling
pub mod hack;
mod symbol;
pub use symbol::{Binding, Entry, SymbolTable};
mod assembler;
pub use assembler::{assemble, Assembler, Program};

// Translating
pub mod vm;

// Running
mod runtime;
pub use runtime::{Exit, Machine, Status, Step, MEMORY_MAX};

mod error;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
