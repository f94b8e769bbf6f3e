#![warn(rust_2018_idioms)]

//! A repairing HTML / XHTML / XML tidier.
//!
//! Possibly-broken markup goes in through an injected byte [`Source`];
//! a well-formed tree comes out, optionally cleaned of presentational
//! markup, and is re-serialized through an injected byte [`Sink`] with
//! indentation, wrapping and encoding transcode. Diagnostics flow
//! through an injected [`MessageSink`].
//!
//! ```no_run
//! use preen::{Config, Document, BufSource};
//!
//! let mut doc = Document::new(Config::default());
//! let src = Box::new(BufSource::new(&b"<p>one<p>two"[..]));
//! preen::parse_markup(&mut doc, src).unwrap();
//! preen::clean_and_repair(&mut doc);
//! let mut out = Vec::new();
//! preen::pretty_print_to(&mut doc, &mut out).unwrap();
//! ```

mod chars;
pub mod config;
pub mod dom;
pub mod entities;
mod istack;
pub mod lexer;
pub mod parser;
pub mod clean;
pub mod pprint;
pub mod report;
pub mod stream;

#[cfg(test)]
mod logger;
#[cfg(test)]
mod tests;

pub use clean::clean_and_repair;
pub use config::{AutoBool, Config, DoctypeMode, Encoding, Newline};
pub use dom::{Attr, Document, Element, Node, NodeData, NodeId, NodeRef, Span};
pub use report::{
    Counts, Diagnostic, MessageSink, PreenError, ReportCode, ReportLevel, StderrSink,
};
pub use stream::{BufSource, ReadSource, Sink, Source, StreamIn, StreamOut};

use lexer::Lexer;
use pprint::Printer;

/// Parse bytes from `source` into the document tree, per the document's
/// configuration (HTML repair rules, or XML when `xml-tags` is set).
///
/// A configuration snapshot is taken first and restored by
/// [`pretty_print`], so one handle can process several documents.
pub fn parse_markup(
    doc: &mut Document,
    source: Box<dyn Source>,
) -> Result<(), PreenError> {
    doc.config.take_snapshot();
    let stream = StreamIn::new(
        source,
        doc.config.input_encoding,
        doc.config.tab_size,
        doc.config.xml_lexing(),
    );
    let mut lexer = Lexer::new(stream);
    if doc.config.xml_lexing() {
        parser::parse_xml_document(doc, &mut lexer)
    } else {
        parser::parse_document(doc, &mut lexer)
    }
}

/// Serialize the document through the given sink.
///
/// When errors were reported and `force-output` is off, nothing is
/// written and `OutputSuppressed` is returned; diagnostics stand either
/// way. Restores the configuration snapshot taken by [`parse_markup`].
pub fn pretty_print(
    doc: &mut Document,
    sink: Box<dyn Sink>,
) -> Result<(), PreenError> {
    let result = print_inner(doc, sink);
    doc.config.reset_to_snapshot();
    result
}

fn print_inner(doc: &mut Document, sink: Box<dyn Sink>) -> Result<(), PreenError> {
    if doc.counts.errors > 0 && !doc.config.force_output {
        return Err(PreenError::OutputSuppressed { errors: doc.counts.errors });
    }
    let out = StreamOut::new(sink, doc.config.output_encoding, doc.config.newline);
    let mut printer = Printer::new(&doc.config, doc.versions, out);
    printer.print_document(doc);
    Ok(())
}

/// Convenience wrapper printing into a caller-provided `Vec<u8>`.
pub fn pretty_print_to(doc: &mut Document, out: &mut Vec<u8>) -> Result<(), PreenError> {
    let buf: Vec<u8> = Vec::new();
    let shared = std::rc::Rc::new(std::cell::RefCell::new(buf));

    #[derive(Clone)]
    struct Shared(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);
    impl Sink for Shared {
        fn put_byte(&mut self, b: u8) {
            self.0.borrow_mut().push(b);
        }
    }

    pretty_print(doc, Box::new(Shared(shared.clone())))?;
    out.extend_from_slice(&shared.borrow());
    Ok(())
}
