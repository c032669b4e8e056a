use miette::SourceSpan;

/// Byte position relative to start of source.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Debug)]
pub struct Idx(pub u32);

/// Holds a view into a source.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    start: Idx,
    len: u32,
}

impl Span {
    pub fn new(start: Idx, len: u32) -> Self {
        Span { start, len }
    }

    pub fn offs(&self) -> usize {
        self.start.0 as usize
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_range(&self) -> std::ops::Range<usize> {
        let start = self.offs();
        start..start + self.len()
    }

    /// Narrow the span to a sub-range, given in bytes relative to this span.
    pub fn sub(&self, offs: usize, len: usize) -> Span {
        Span::new(Idx(self.start.0 + offs as u32), len as u32)
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}
