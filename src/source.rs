//! Opaque handles into the surface syntax.
//!
//! The core never inspects surface syntax; it only carries handles through
//! to diagnostics so the reporting layer can attribute an error to the node
//! that caused it.

use std::fmt;

/// A byte range in a source file, tracked for diagnostic reporting only.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ByteRange {
    start: u32,
    end: u32,
}

impl ByteRange {
    pub const fn new(start: u32, end: u32) -> ByteRange {
        ByteRange { start, end }
    }

    pub const fn start(&self) -> u32 {
        self.start
    }

    pub const fn end(&self) -> u32 {
        self.end
    }
}

/// A reference to the surface-syntax node an expression or equation
/// originated from. The core treats this as an opaque token: it is attached
/// to deferred equations and diagnostics and otherwise never looked at.
///
/// `SourceNode::SYNTHETIC` marks terms manufactured by the core itself
/// (prelude definitions, derived metavariables).
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct SourceNode {
    file: u32,
    range: ByteRange,
}

impl SourceNode {
    pub const SYNTHETIC: SourceNode = SourceNode {
        file: u32::MAX,
        range: ByteRange::new(0, 0),
    };

    pub const fn new(file: u32, range: ByteRange) -> SourceNode {
        SourceNode { file, range }
    }

    pub const fn file(&self) -> u32 {
        self.file
    }

    pub const fn range(&self) -> ByteRange {
        self.range
    }

    pub const fn is_synthetic(&self) -> bool {
        self.file == u32::MAX
    }
}

impl fmt::Debug for SourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_synthetic() {
            write!(f, "SourceNode(synthetic)")
        } else {
            write!(
                f,
                "SourceNode({}:{}..{})",
                self.file,
                self.range.start(),
                self.range.end()
            )
        }
    }
}
