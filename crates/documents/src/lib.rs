//! Customer-facing documents: a print-ready view model and its renderers.
//!
//! Pure rendering, no IO. Callers build a [`DocumentView`] from their
//! aggregates and pick an output: PDF for attachments and downloads, plain
//! text and HTML for email bodies.

pub mod format;
pub mod html;
pub mod pdf;
pub mod text;
pub mod view;

pub use format::{format_bps, format_money};
pub use html::render_html;
pub use pdf::{FIRST_PAGE_ROWS, NEXT_PAGE_ROWS, page_count, render_pdf};
pub use text::render_text;
pub use view::{AddressBlock, DocumentKind, DocumentView, LabelledDate, ViewLine, ViewTotals};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("pdf backend error: {0}")]
    Pdf(String),
}
