//! Diagnostic levels, codes, counters and the injected message sink.
//!
//! Everything recoverable is a diagnostic: the pipeline repairs in place and
//! reports what it did. Only tree corruption escapes as [`PreenError`].

use std::fmt;
use std::io::Write;

use thiserror::Error;

/// Severity taxonomy for emitted diagnostics.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Config,
    Access,
    Error,
    BadDocument,
    Fatal,
}

impl fmt::Display for ReportLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ReportLevel::Info => "Info",
            ReportLevel::Warning => "Warning",
            ReportLevel::Config => "Config",
            ReportLevel::Access => "Access",
            ReportLevel::Error => "Error",
            ReportLevel::BadDocument => "Document",
            ReportLevel::Fatal => "Fatal",
        };
        f.write_str(s)
    }
}

/// Diagnostic codes for every repair or anomaly the pipeline can flag.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReportCode {
    // stream / encoding
    EncodingMismatch,
    VendorSpecificChars,
    InvalidSgmlChars,
    InvalidUtf8,
    InvalidUtf16,
    InvalidNcr,

    // lexer
    UnknownEntity,
    MissingSemicolon,
    MissingSemicolonNcr,
    AposUndefined,
    UnescapedAmpersand,
    SuspectedMissingQuote,
    MissingQuotemark,
    UnexpectedQuotemark,
    UnexpectedGt,
    MissingAttrValue,
    UnexpectedEndOfFile,
    MalformedComment,
    BadCommentChars,
    MalformedDoctype,
    UnexpectedEndTag,
    BadCdataContent,
    NewlineInUri,
    UnknownElement,

    // attributes
    UnknownAttribute,
    BadAttributeValue,
    RepeatedAttribute,
    ProprietaryAttribute,
    ProprietaryAttrValue,
    XmlAttributeValue,
    XmlIdSyntax,
    IdNameMismatch,
    AnchorNotUnique,
    BackslashInUri,
    FixedBackslash,
    IllegalUriReference,
    EscapedIllegalUri,
    MissingImagemap,

    // parser / tree builder
    MissingEndtagFor,
    MissingEndtagBefore,
    DiscardingUnexpected,
    NestedEmphasis,
    NonMatchingEndtag,
    TagNotAllowedIn,
    MissingStarttag,
    DuplicateFrameset,
    CantBeNested,
    ObsoleteElement,
    CoerceToEndtag,
    InsertingTag,
    UsingBrInPlaceOf,
    ReplacingElement,
    TrimEmptyElement,
    MissingTitleElement,
    IllegalNesting,
    NoframesContent,
    ContentAfterBody,
    InconsistentVersion,
    DoctypeAfterTags,
    MissingDoctype,
    TooManyElements,
    NestedQuotation,
    ElementNotEmpty,

    // info
    DoctypeGiven,
    ReportVersion,
}

impl ReportCode {
    /// The severity this code is reported at.
    pub fn level(self) -> ReportLevel {
        use ReportCode::*;
        match self {
            DoctypeGiven | ReportVersion => ReportLevel::Info,
            UnknownElement
            | SuspectedMissingQuote
            | DuplicateFrameset
            | MalformedDoctype => ReportLevel::Error,
            _ => ReportLevel::Warning,
        }
    }

    /// Message template. A `%s` marker is substituted with call-site detail.
    pub fn message(self) -> &'static str {
        use ReportCode::*;
        match self {
            EncodingMismatch => {
                "specified input encoding does not match actual input encoding (%s)"
            }
            VendorSpecificChars => "invalid character code %s",
            InvalidSgmlChars => "invalid character code %s",
            InvalidUtf8 => "invalid UTF-8 bytes (char. code %s)",
            InvalidUtf16 => "invalid UTF-16 surrogate pair (char. code %s)",
            InvalidNcr => "invalid numeric character reference %s",

            UnknownEntity => "unescaped & or unknown entity \"%s\"",
            MissingSemicolon => "entity \"%s\" doesn't end in ';'",
            MissingSemicolonNcr => "numeric character reference \"%s\" doesn't end in ';'",
            AposUndefined => "named entity &apos; only defined in XML/XHTML",
            UnescapedAmpersand => "unescaped & which should be written as &amp;",
            SuspectedMissingQuote => "missing quote mark for attribute value",
            MissingQuotemark => "%s attribute with missing trailing quote mark",
            UnexpectedQuotemark => "%s unexpected or duplicate quote mark",
            UnexpectedGt => "%s missing '>' for end of tag",
            MissingAttrValue => "%s attribute with missing value",
            UnexpectedEndOfFile => "unexpected end of file %s",
            MalformedComment => "adjacent hyphens within comment",
            BadCommentChars => "expecting -- or > in comment",
            MalformedDoctype => "expecting doctype declaration",
            UnexpectedEndTag => "unexpected </%s>",
            BadCdataContent => "'<' + '/' + letter not allowed here",
            NewlineInUri => "discarding newline in URI reference",
            UnknownElement => "%s is not recognized",

            UnknownAttribute => "%s unknown attribute",
            BadAttributeValue => "%s has invalid value",
            RepeatedAttribute => "dropping value for repeated attribute %s",
            ProprietaryAttribute => "%s proprietary attribute",
            ProprietaryAttrValue => "%s proprietary attribute value",
            XmlAttributeValue => "%s has XML attribute",
            XmlIdSyntax => "%s has ID syntax that is not XML-compatible",
            IdNameMismatch => "%s id and name attribute value mismatch",
            AnchorNotUnique => "%s anchor \"%s\" already defined",
            BackslashInUri => "%s URI reference contains backslash",
            FixedBackslash => "%s converting backslash in URI to slash",
            IllegalUriReference => "%s improperly escaped URI reference",
            EscapedIllegalUri => "%s escaping malformed URI reference",
            MissingImagemap => "%s should use client-side image map",

            MissingEndtagFor => "missing </%s>",
            MissingEndtagBefore => "missing </%s> before %s",
            DiscardingUnexpected => "discarding unexpected %s",
            NestedEmphasis => "nested emphasis %s",
            NonMatchingEndtag => "replacing unexpected %s by </%s>",
            TagNotAllowedIn => "%s isn't allowed in <%s> elements",
            MissingStarttag => "missing <%s>",
            DuplicateFrameset => "repeated FRAMESET element",
            CantBeNested => "%s can't be nested",
            ObsoleteElement => "replacing obsolete element %s by %s",
            CoerceToEndtag => "<%s> is probably intended as </%s>",
            InsertingTag => "inserting implicit <%s>",
            UsingBrInPlaceOf => "using <br> in place of %s",
            ReplacingElement => "replacing element %s by %s",
            TrimEmptyElement => "trimming empty %s",
            MissingTitleElement => "inserting missing 'title' element",
            IllegalNesting => "%s shouldn't be nested",
            NoframesContent => "%s not inside 'noframes' element",
            ContentAfterBody => "content occurs after end of body",
            InconsistentVersion => "HTML DOCTYPE doesn't match content",
            DoctypeAfterTags => "DOCTYPE isn't allowed after elements",
            MissingDoctype => "no DOCTYPE found; inserting one",
            TooManyElements => "too many %s elements",
            NestedQuotation => "nested q elements, possible typo",
            ElementNotEmpty => "%s element not empty or not closed",

            DoctypeGiven => "doctype given is \"%s\"",
            ReportVersion => "document content looks like %s",
        }
    }
}

/// Substitute up to two `%s` markers in a code's template.
pub fn format_message(code: ReportCode, details: &[&str]) -> String {
    let mut out = String::with_capacity(64);
    let mut parts = code.message().split("%s");
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    let mut di = details.iter();
    for part in parts {
        if let Some(d) = di.next() {
            out.push_str(d);
        }
        out.push_str(part);
    }
    out
}

/// A single fully-formed diagnostic record.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub level: ReportLevel,
    pub line: u32,
    pub column: u32,
    pub text: String,
}

/// Receiver for diagnostic records, injected by the caller.
pub trait MessageSink {
    fn emit(&mut self, diag: &Diagnostic);
}

/// Default sink: formatted lines on stderr.
pub struct StderrSink;

impl MessageSink for StderrSink {
    fn emit(&mut self, diag: &Diagnostic) {
        writeln!(
            std::io::stderr(),
            "line {} column {} - {}: {}",
            diag.line, diag.column, diag.level, diag.text
        ).ok();
    }
}

/// Sink that retains diagnostics, for tests and embedding callers.
#[derive(Default)]
pub struct CollectSink {
    pub diags: Vec<Diagnostic>,
}

impl MessageSink for CollectSink {
    fn emit(&mut self, diag: &Diagnostic) {
        self.diags.push(diag.clone());
    }
}

/// Per-document tallies, by level.
#[derive(Clone, Copy, Debug, Default)]
pub struct Counts {
    pub errors: u32,
    pub warnings: u32,
    pub access_warnings: u32,
    pub config_errors: u32,
    pub doc_errors: u32,
    pub info: u32,
}

impl Counts {
    pub fn tally(&mut self, level: ReportLevel) {
        match level {
            ReportLevel::Info => self.info += 1,
            ReportLevel::Warning => self.warnings += 1,
            ReportLevel::Config => self.config_errors += 1,
            ReportLevel::Access => self.access_warnings += 1,
            ReportLevel::Error => self.errors += 1,
            ReportLevel::BadDocument => self.doc_errors += 1,
            ReportLevel::Fatal => self.doc_errors += 1,
        }
    }

    /// Conventional exit status: 0 clean, 1 warnings only, 2 errors.
    pub fn document_status(&self) -> i32 {
        if self.errors > 0 || self.doc_errors > 0 {
            2
        } else if self.warnings > 0 {
            1
        } else {
            0
        }
    }
}

/// The unrecoverable failures surfaced to the caller.
#[derive(Error, Debug)]
pub enum PreenError {
    /// Post-parse integrity sweep found inconsistent tree links.
    #[error("document tree corrupt at node {0}")]
    TreeCorrupt(u32),

    /// Errors were reported and `force-output` is off; nothing was written.
    #[error("output suppressed: {errors} error(s) reported")]
    OutputSuppressed { errors: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitution() {
        assert_eq!(
            "missing </b> before <p>",
            format_message(ReportCode::MissingEndtagBefore, &["b", "<p>"])
        );
        assert_eq!(
            "repeated FRAMESET element",
            format_message(ReportCode::DuplicateFrameset, &[])
        );
    }

    #[test]
    fn levels() {
        assert_eq!(ReportLevel::Error, ReportCode::SuspectedMissingQuote.level());
        assert_eq!(ReportLevel::Warning, ReportCode::MissingEndtagFor.level());
        assert_eq!(ReportLevel::Info, ReportCode::DoctypeGiven.level());
    }

    #[test]
    fn status() {
        let mut c = Counts::default();
        assert_eq!(0, c.document_status());
        c.tally(ReportLevel::Warning);
        assert_eq!(1, c.document_status());
        c.tally(ReportLevel::Error);
        assert_eq!(2, c.document_status());
    }
}
