//! Stack-machine VM language and its translation into Hack assembly.

use std::fmt;

mod command;
pub use command::{ArithOp, Command, ParseError, Segment, MAX_ARGS};
mod translator;
pub use translator::Translator;

use miette::Result;

use crate::source::{Line, Source};

/// Saved cells between the arguments and the callee's locals: return address, LCL, ARG, THIS, THAT.
const FRAME_SIZE: u16 = 5;

/// Location of a command, kept for errors raised after its unit is done.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Site {
    /// Source name, e.g. `Main.vm`
    pub unit: String,
    pub line: usize,
    pub text: String,
}

impl Site {
    pub fn new(src: &Source, line: &Line) -> Self {
        Site {
            unit: src.name().to_string(),
            line: line.number,
            text: line.text.to_string(),
        }
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.line)
    }
}

/// Translate a whole program, one unit per source, into Hack assembly.
pub fn translate(sources: &[Source], bootstrap: bool, annotate: bool) -> Result<String> {
    let mut translator = Translator::new().annotate(annotate);
    if bootstrap {
        translator.bootstrap();
    }
    for src in sources {
        translator.translate(src)?;
    }
    translator.finish()
}
