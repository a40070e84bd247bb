//! Quotes: priced proposals sent to a customer, convertible into an invoice.

pub mod quote;

pub use quote::{
    AcceptQuote, AddQuoteLine, CreateQuote, DeclineQuote, MarkQuoteConverted, Quote,
    QuoteAccepted, QuoteCommand, QuoteConverted, QuoteCreated, QuoteDeclined, QuoteEvent,
    QuoteId, QuoteLineAdded, QuoteLineRemoved, QuoteSent, QuoteStatus, RemoveQuoteLine,
    SendQuote,
};
