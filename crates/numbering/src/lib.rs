//! Document numbering: one gap-free counter per tenant and document kind.

pub mod sequence;

pub use sequence::{
    AllocateNumber, ConfigureSequence, DocumentKind, DocumentSequence, NumberAllocated,
    SequenceCommand, SequenceConfigured, SequenceEvent, SequenceId, format_number,
};
