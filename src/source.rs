use std::{fs, path::Path};

use miette::{IntoDiagnostic, NamedSource, Result};

use crate::span::{Idx, Span};

/// Marks the rest of a line as a comment, in both assembly and VM sources.
pub const COMMENT: &str = "//";

/// A single compilation unit: an `.asm` or `.vm` file held in memory.
#[derive(Clone, Debug)]
pub struct Source {
    /// File name used in diagnostics, e.g. `Main.vm`
    name: String,
    text: String,
}

impl Source {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Source {
            name: name.into(),
            text: text.into(),
        }
    }

    /// Read a source file from disk, naming it after its file name.
    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).into_diagnostic()?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Source::new(name, text))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Name of the unit without extension. Used to namespace `static` cells.
    pub fn unit(&self) -> &str {
        match self.name.rfind('.') {
            Some(dot) if dot > 0 => &self.name[..dot],
            _ => &self.name,
        }
    }

    /// Source wrapped for attaching to a diagnostic.
    pub fn named(&self) -> NamedSource<String> {
        NamedSource::new(&self.name, self.text.clone())
    }

    /// Iterate over trimmed, comment-stripped, non-blank lines.
    pub fn lines(&self) -> Lines<'_> {
        Lines {
            rest: &self.text,
            offs: 0,
            number: 0,
        }
    }
}

/// One meaningful line of a source.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Line<'a> {
    /// 1-based line number in the original text
    pub number: usize,
    /// Line contents with comment and surrounding whitespace removed
    pub text: &'a str,
    /// Location of `text` inside the source
    pub span: Span,
}

pub struct Lines<'a> {
    rest: &'a str,
    offs: usize,
    number: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.rest.is_empty() {
            let (raw, consumed) = match self.rest.find('\n') {
                Some(end) => (&self.rest[..end], end + 1),
                None => (self.rest, self.rest.len()),
            };
            let start = self.offs;
            self.rest = &self.rest[consumed..];
            self.offs += consumed;
            self.number += 1;

            let code = match raw.find(COMMENT) {
                Some(comment) => &raw[..comment],
                None => raw,
            };
            let text = code.trim();
            if text.is_empty() {
                continue;
            }
            let lead = code.len() - code.trim_start().len();
            return Some(Line {
                number: self.number,
                text,
                span: Span::new(Idx((start + lead) as u32), text.len() as u32),
            });
        }
        None
    }
}
