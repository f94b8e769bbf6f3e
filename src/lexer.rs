//! The lexer: characters in, one token (tree node) out per call.
//!
//! Tokens index into the document's shared character buffer; the lexer
//! never aborts on malformed input, it yields a best-effort token plus a
//! diagnostic. One level of token pushback is supported, and the inline
//! stack may enqueue inferred start tags that are returned ahead of fresh
//! input.

use std::collections::VecDeque;

use log::trace;
use tendril::StrTendril;

use crate::chars::{is_letter, is_namechar, is_white, to_lower};
use crate::config::Encoding;
use crate::dom::meta::{lookup_attr, lookup_tag, AttrCheck};
use crate::dom::{Attr, Document, Element, Node, NodeData, NodeId, ServerKind, Span};
use crate::entities::entity_def;
use crate::istack::IStackEntry;
use crate::report::ReportCode;
use crate::stream::{decode_win1252, StreamIn};

/// Whitespace and markup policy for one `get_token` call.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LexMode {
    /// Drop leading whitespace, collapse runs.
    IgnoreWhitespace,
    /// Collapse runs, keep a leading space.
    MixedContent,
    /// Whitespace verbatim.
    Preformatted,
    /// `<` is plain text; whitespace verbatim.
    IgnoreMarkup,
}

/// The tokenizer over one document's input stream.
pub struct Lexer {
    pub input: StreamIn,
    pushed_token: Option<NodeId>,
    pub(crate) insert: VecDeque<NodeId>,
    pub(crate) istack: Vec<IStackEntry>,
    pub(crate) istack_base: usize,
    waswhite: bool,
    token_line: u32,
    token_column: u32,
}

enum Markup {
    Token(NodeId),
    /// The `<` did not open real markup; treat these chars as text.
    Literal(String),
    /// Nothing usable (e.g. `<!>` junk); keep lexing content.
    Skip,
}

impl Lexer {
    pub fn new(input: StreamIn) -> Lexer {
        Lexer {
            input,
            pushed_token: None,
            insert: VecDeque::new(),
            istack: Vec::new(),
            istack_base: 0,
            waswhite: false,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Arrange for the given token to be returned by the next `get_token`.
    pub fn unget_token(&mut self, token: NodeId) {
        debug_assert!(self.pushed_token.is_none(), "one level of token unget");
        self.pushed_token = Some(token);
    }

    /// Forward diagnostics raised inside the input stream.
    fn forward_diags(&mut self, doc: &mut Document) {
        for d in self.input.diags.drain(..) {
            doc.report_at(d.code, d.line, d.column, &[&d.detail]);
        }
        if self.input.input_had_bom {
            doc.input_had_bom = true;
        }
    }

    /// Return the next token, or None at end of input. Inferred inline
    /// duplicates queued by the stack come ahead of any pushed-back
    /// token, which in turn comes ahead of fresh input.
    pub fn get_token(&mut self, doc: &mut Document, mode: LexMode) -> Option<NodeId> {
        if let Some(t) = self.insert.pop_front() {
            return Some(t);
        }
        if let Some(t) = self.pushed_token.take() {
            return Some(t);
        }
        let tok = self.next_token(doc, mode);
        self.forward_diags(doc);
        if let Some(id) = tok {
            trace!("token {:?}", doc[id].data);
        }
        tok
    }

    fn mark_position(&mut self) {
        self.token_line = self.input.line;
        self.token_column = self.input.column;
    }

    fn new_node_at(&self, doc: &mut Document, data: NodeData) -> NodeId {
        let mut node = Node::new(data);
        node.line = self.token_line;
        node.column = self.token_column;
        doc.push_node(node)
    }

    fn next_token(&mut self, doc: &mut Document, mode: LexMode) -> Option<NodeId> {
        let mut span: Option<Span> = None;
        let mut text_line = 0u32;
        let mut text_column = 0u32;
        self.waswhite = false;
        let xml = doc.config.xml_lexing();

        macro_rules! push_text {
            ($s:expr) => {{
                let s: &str = $s;
                let added = doc.buf_push_str(s);
                match span {
                    Some(ref mut sp) => sp.end = added.end,
                    None => {
                        span = Some(added);
                        text_line = self.token_line;
                        text_column = self.token_column;
                    }
                }
            }};
        }
        macro_rules! emit_text {
            () => {{
                let sp = span.take().unwrap();
                let mut node = Node::new(NodeData::Text(sp));
                node.line = text_line;
                node.column = text_column;
                return Some(doc.push_node(node));
            }};
        }

        loop {
            self.mark_position();
            let c = match self.input.read_char() {
                Some(c) => c,
                None => {
                    if span.is_some() {
                        emit_text!();
                    }
                    return None;
                }
            };

            if is_white(c, xml) && mode != LexMode::Preformatted && mode != LexMode::IgnoreMarkup {
                if span.is_none() && mode == LexMode::IgnoreWhitespace {
                    continue; // drop leading whitespace
                }
                if !self.waswhite {
                    push_text!(" ");
                    self.waswhite = true;
                }
                continue;
            }

            if c == '<' && mode != LexMode::IgnoreMarkup {
                match self.lex_markup(doc, xml) {
                    Markup::Token(t) => {
                        if span.is_some() {
                            self.pushed_token = Some(t);
                            emit_text!();
                        }
                        return Some(t);
                    }
                    Markup::Literal(s) => {
                        self.waswhite = false;
                        push_text!(&s);
                        continue;
                    }
                    Markup::Skip => continue,
                }
            }

            self.waswhite = false;

            if c == '&' && mode != LexMode::IgnoreMarkup {
                let mut out = String::new();
                self.parse_entity(doc, xml, false, &mut out);
                if !out.is_empty() {
                    push_text!(&out);
                }
                continue;
            }

            let mut buf = [0u8; 4];
            push_text!(c.encode_utf8(&mut buf));
        }
    }

    /// Dispatch after a `<` was read in content.
    fn lex_markup(&mut self, doc: &mut Document, xml: bool) -> Markup {
        let c = match self.input.read_char() {
            Some(c) => c,
            None => return Markup::Literal("<".to_string()),
        };

        match c {
            '/' => self.lex_end_tag(doc, xml),
            '!' => self.lex_declaration(doc),
            '?' => self.lex_pi(doc, xml),
            '%' => self.lex_to_close(doc, "%>", SpanKind::Asp),
            '#' => self.lex_to_close(doc, "#>", SpanKind::Jste),
            c if is_letter(c) => self.lex_start_tag(doc, c, xml),
            c => {
                let mut s = String::from("<");
                s.push(c);
                Markup::Literal(s)
            }
        }
    }

    fn read_name(&mut self, first: char, xml: bool) -> StrTendril {
        let mut name = StrTendril::new();
        name.push_char(if xml { first } else { to_lower(first) });
        while let Some(c) = self.input.read_char() {
            if !is_namechar(c) {
                self.input.unget_char(c);
                break;
            }
            name.push_char(if xml { c } else { to_lower(c) });
        }
        name
    }

    fn lex_end_tag(&mut self, doc: &mut Document, xml: bool) -> Markup {
        let c = match self.input.read_char() {
            Some(c) => c,
            None => return Markup::Literal("</".to_string()),
        };
        if !is_letter(c) {
            let mut s = String::from("</");
            s.push(c);
            return Markup::Literal(s);
        }
        let name = self.read_name(c, xml);

        // anything up to `>` is discarded; end tags carry no attributes
        loop {
            match self.input.read_char() {
                Some('>') => break,
                Some(_) => {}
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &[&format!("in </{}>", name)],
                    );
                    break;
                }
            }
        }

        let tag = lookup_tag(&name, &doc.config);
        let elem = Element::new(name, tag);
        Markup::Token(self.new_node_at(doc, NodeData::EndTag(elem)))
    }

    fn lex_start_tag(&mut self, doc: &mut Document, first: char, xml: bool) -> Markup {
        let name = self.read_name(first, xml);
        let (attrs, self_closing) = self.parse_attrs(doc, xml, false);

        let tag = lookup_tag(&name, &doc.config);
        let mut elem = Element::new(name, tag);
        elem.attrs = attrs;
        elem.self_closing = self_closing;
        Markup::Token(self.new_node_at(doc, NodeData::Elem(elem)))
    }

    /// Attribute loop shared by start tags and the XML declaration.
    /// Returns the attributes and whether `/>` closed the tag.
    fn parse_attrs(&mut self, doc: &mut Document, xml: bool, in_xml_decl: bool)
        -> (Vec<Attr>, bool)
    {
        let mut attrs: Vec<Attr> = Vec::new();
        loop {
            let c = loop {
                match self.input.read_char() {
                    Some(c) if is_white(c, xml) => continue,
                    Some(c) => break c,
                    None => {
                        doc.report_at(
                            ReportCode::UnexpectedEndOfFile,
                            self.token_line,
                            self.token_column,
                            &["in tag"],
                        );
                        return (attrs, false);
                    }
                }
            };

            match c {
                '>' => return (attrs, false),
                '/' => {
                    match self.input.read_char() {
                        Some('>') => return (attrs, true),
                        Some(c2) => {
                            self.input.unget_char(c2);
                            // stray slash between attributes, skip it
                        }
                        None => return (attrs, false),
                    }
                }
                '?' if in_xml_decl => {
                    match self.input.read_char() {
                        Some('>') => return (attrs, false),
                        Some(c2) => self.input.unget_char(c2),
                        None => return (attrs, false),
                    }
                }
                '<' => {
                    // server markup islands may sit between attributes
                    match self.input.read_char() {
                        Some('%') => {
                            let val = self.raw_to_close(doc, "%>");
                            attrs.push(Attr {
                                name: None,
                                value: Some(val),
                                delim: 0,
                                server: Some(ServerKind::Asp),
                            });
                            continue;
                        }
                        Some('?') => {
                            let val = self.raw_to_close(doc, "?>");
                            attrs.push(Attr {
                                name: None,
                                value: Some(val),
                                delim: 0,
                                server: Some(ServerKind::Php),
                            });
                            continue;
                        }
                        Some(c2) => self.input.unget_char(c2),
                        None => {}
                    }
                    self.input.unget_char('<');
                    doc.report_at(
                        ReportCode::UnexpectedGt,
                        self.token_line,
                        self.token_column,
                        &["tag"],
                    );
                    return (attrs, false);
                }
                '"' | '\'' => {
                    doc.report_at(
                        ReportCode::UnexpectedQuotemark,
                        self.token_line,
                        self.token_column,
                        &["tag"],
                    );
                    continue;
                }
                c => {
                    // attribute name run
                    let mut name = StrTendril::new();
                    name.push_char(if xml { c } else { to_lower(c) });
                    loop {
                        match self.input.read_char() {
                            Some(c2) if is_white(c2, xml) => break,
                            Some(c2) if matches!(c2, '=' | '>' | '<' | '/' | '"' | '\'') => {
                                self.input.unget_char(c2);
                                break;
                            }
                            Some(c2) => name.push_char(if xml { c2 } else { to_lower(c2) }),
                            None => break,
                        }
                    }

                    let how = lookup_attr(&name).map(|d| d.how);
                    let (value, delim, self_close) = self.parse_attr_value(doc, xml, &name, how);
                    attrs.push(Attr { name: Some(name), value, delim, server: None });
                    if self_close {
                        return (attrs, true);
                    }
                }
            }
        }
    }

    /// Parse an optional `= value`, returning (value, delimiter,
    /// tag-self-closed). Absent values return (None, 0, false).
    fn parse_attr_value(
        &mut self,
        doc: &mut Document,
        xml: bool,
        name: &str,
        how: Option<AttrCheck>,
    ) -> (Option<StrTendril>, u8, bool) {
        // skip whitespace looking for `=`
        let c = loop {
            match self.input.read_char() {
                Some(c) if is_white(c, xml) => continue,
                Some(c) => break c,
                None => return (None, 0, false),
            }
        };
        if c != '=' {
            self.input.unget_char(c);
            return (None, 0, false);
        }

        // skip whitespace after `=`
        let c = loop {
            match self.input.read_char() {
                Some(c) if is_white(c, xml) => continue,
                Some(c) => break c,
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &[name],
                    );
                    return (None, 0, false);
                }
            }
        };

        let is_url = how == Some(AttrCheck::Url);
        let is_script = how == Some(AttrCheck::Script);
        let literal = doc.config.literal_attributes;
        let mut value = StrTendril::new();

        if c == '"' || c == '\'' {
            let delim = c;
            let mut punct = 0u32;
            let mut seen_gt = false;
            loop {
                let c2 = match self.input.read_char() {
                    Some(c2) => c2,
                    None => {
                        doc.report_at(
                            ReportCode::MissingQuotemark,
                            self.token_line,
                            self.token_column,
                            &[name],
                        );
                        break;
                    }
                };
                if c2 == delim {
                    break;
                }
                match c2 {
                    '\n' => {
                        if is_url {
                            doc.report_at(
                                ReportCode::NewlineInUri,
                                self.token_line,
                                self.token_column,
                                &[],
                            );
                            continue; // discarded
                        }
                        punct += 1;
                        value.push_char(if literal { '\n' } else { ' ' });
                    }
                    '<' => {
                        punct += 1;
                        value.push_char('<');
                    }
                    '>' => {
                        punct += 1;
                        seen_gt = true;
                        value.push_char('>');
                    }
                    '&' if !is_script => {
                        let mut out = String::new();
                        self.parse_entity(doc, xml, true, &mut out);
                        value.push_slice(&out);
                    }
                    c2 => value.push_char(c2),
                }
                if punct > 10 && seen_gt {
                    doc.report_at(
                        ReportCode::SuspectedMissingQuote,
                        self.token_line,
                        self.token_column,
                        &[],
                    );
                    break;
                }
            }
            (Some(value), delim as u8, false)
        } else {
            // bare value: ends at whitespace or `>`
            let mut c2 = c;
            loop {
                if is_white(c2, xml) {
                    break;
                }
                match c2 {
                    '>' => {
                        // a trailing / was already folded in below
                        self.input.unget_char('>');
                        break;
                    }
                    '<' => {
                        self.input.unget_char('<');
                        break;
                    }
                    '/' => {
                        match self.input.read_char() {
                            Some('>') if !is_url => {
                                // `.../>`: empty-tag slash, not value text
                                return (Some(value), 0, true);
                            }
                            Some(c3) => {
                                value.push_char('/');
                                c2 = c3;
                                continue;
                            }
                            None => {
                                value.push_char('/');
                                break;
                            }
                        }
                    }
                    '&' if !is_script => {
                        let mut out = String::new();
                        self.parse_entity(doc, xml, true, &mut out);
                        value.push_slice(&out);
                    }
                    c3 => value.push_char(c3),
                }
                c2 = match self.input.read_char() {
                    Some(c3) => c3,
                    None => break,
                };
            }
            (Some(value), 0, false)
        }
    }

    /// `&` was read: resolve a named or numeric reference into `out`.
    /// Unknown constructs are preserved literally.
    fn parse_entity(&mut self, doc: &mut Document, xml: bool, _in_attr: bool, out: &mut String) {
        let c = match self.input.read_char() {
            Some(c) => c,
            None => {
                out.push('&');
                return;
            }
        };

        if c == '#' {
            self.parse_ncr(doc, out);
            return;
        }

        if !is_letter(c) {
            // a naked & is passed through as text
            self.input.unget_char(c);
            doc.report_at(
                ReportCode::UnescapedAmpersand,
                self.token_line,
                self.token_column,
                &[],
            );
            out.push('&');
            return;
        }

        let mut name = String::new();
        name.push(c);
        let mut semicolon = false;
        while let Some(c2) = self.input.read_char() {
            if c2 == ';' {
                semicolon = true;
                break;
            }
            if !is_namechar(c2) {
                self.input.unget_char(c2);
                break;
            }
            name.push(c2);
        }

        match entity_def(&name) {
            Some(def) => {
                if name == "apos" && !xml && !doc.config.xml_output() {
                    doc.report_at(
                        ReportCode::AposUndefined,
                        self.token_line,
                        self.token_column,
                        &[],
                    );
                }
                if !semicolon {
                    doc.report_at(
                        ReportCode::MissingSemicolon,
                        self.token_line,
                        self.token_column,
                        &[&format!("&{}", name)],
                    );
                }
                if let Some(c) = std::char::from_u32(def.code) {
                    out.push(c);
                }
            }
            None => {
                if semicolon {
                    doc.report_at(
                        ReportCode::UnknownEntity,
                        self.token_line,
                        self.token_column,
                        &[&format!("&{};", name)],
                    );
                }
                out.push('&');
                out.push_str(&name);
                if semicolon {
                    out.push(';');
                }
            }
        }
    }

    /// Numeric character reference after `&#`.
    fn parse_ncr(&mut self, doc: &mut Document, out: &mut String) {
        let mut digits = String::new();
        let mut hex = false;
        let mut semicolon = false;

        match self.input.read_char() {
            Some(c) if c == 'x' || c == 'X' => hex = true,
            Some(c) if c.is_ascii_digit() => digits.push(c),
            Some(c) => {
                self.input.unget_char(c);
                out.push_str("&#");
                return;
            }
            None => {
                out.push_str("&#");
                return;
            }
        }

        while let Some(c) = self.input.read_char() {
            if c == ';' {
                semicolon = true;
                break;
            }
            let ok = if hex { c.is_ascii_hexdigit() } else { c.is_ascii_digit() };
            if !ok {
                self.input.unget_char(c);
                break;
            }
            digits.push(c);
        }

        let radix = if hex { 16 } else { 10 };
        let code = match u32::from_str_radix(&digits, radix) {
            Ok(n) => n,
            Err(_) => {
                doc.report_at(
                    ReportCode::InvalidNcr,
                    self.token_line,
                    self.token_column,
                    &[&format!("&#{}{}", if hex { "x" } else { "" }, digits)],
                );
                return;
            }
        };

        if !semicolon {
            doc.report_at(
                ReportCode::MissingSemicolonNcr,
                self.token_line,
                self.token_column,
                &[&format!("&#{}", digits)],
            );
        }

        // 128-159 are Windows repertoire references, not Unicode
        if (128..160).contains(&code) {
            let mapped = decode_win1252(code as u8);
            doc.report_at(
                ReportCode::InvalidNcr,
                self.token_line,
                self.token_column,
                &[&format!("&#{};", code)],
            );
            if mapped != 0 {
                if let Some(c) = std::char::from_u32(mapped) {
                    out.push(c);
                }
            }
            return;
        }

        match std::char::from_u32(code) {
            Some(c) if code >= 32 || c == '\t' || c == '\n' => out.push(c),
            _ => {
                doc.report_at(
                    ReportCode::InvalidNcr,
                    self.token_line,
                    self.token_column,
                    &[&format!("&#{};", code)],
                );
            }
        }
    }

    /// `<!` was read: comment, DOCTYPE, CDATA or conditional section.
    fn lex_declaration(&mut self, doc: &mut Document) -> Markup {
        match self.input.read_char() {
            Some('-') => match self.input.read_char() {
                Some('-') => self.lex_comment(doc),
                Some(c) => {
                    self.input.unget_char(c);
                    self.bogus_comment()
                }
                None => Markup::Literal("<!-".to_string()),
            },
            Some('[') => self.lex_section(doc),
            Some(c) if is_letter(c) => {
                let word = self.read_name(c, false);
                if &word[..] == "doctype" {
                    self.lex_doctype(doc)
                } else {
                    doc.report_at(
                        ReportCode::MalformedComment,
                        self.token_line,
                        self.token_column,
                        &[],
                    );
                    self.bogus_comment()
                }
            }
            Some(c) => {
                self.input.unget_char(c);
                self.bogus_comment()
            }
            None => Markup::Literal("<!".to_string()),
        }
    }

    /// Discard `<!` junk up to the closing `>`.
    fn bogus_comment(&mut self) -> Markup {
        loop {
            match self.input.read_char() {
                Some('>') | None => break,
                Some(_) => {}
            }
        }
        Markup::Skip
    }

    fn lex_comment(&mut self, doc: &mut Document) -> Markup {
        let mut text = String::new();
        let mut badcomment = false;
        loop {
            let c = match self.input.read_char() {
                Some(c) => c,
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in comment"],
                    );
                    break;
                }
            };
            if c != '-' {
                text.push(c);
                continue;
            }
            let c2 = match self.input.read_char() {
                Some(c2) => c2,
                None => {
                    text.push('-');
                    break;
                }
            };
            if c2 != '-' {
                text.push('-');
                self.input.unget_char(c2);
                continue;
            }
            // `--` seen; extra hyphens belong to the text
            let mut dashes = 0u32;
            let c3 = loop {
                match self.input.read_char() {
                    Some('-') => dashes += 1,
                    Some(c3) => break Some(c3),
                    None => break None,
                }
            };
            match c3 {
                Some('>') => {
                    for _ in 0..dashes {
                        text.push('-');
                    }
                    break;
                }
                Some(c3) => {
                    // adjacent hyphens inside the comment
                    if !badcomment {
                        doc.report_at(
                            ReportCode::MalformedComment,
                            self.token_line,
                            self.token_column,
                            &[],
                        );
                        badcomment = true;
                    }
                    let fill = if doc.config.fix_bad_comments { '=' } else { '-' };
                    text.push(fill);
                    text.push(fill);
                    for _ in 0..dashes {
                        text.push(fill);
                    }
                    self.input.unget_char(c3);
                }
                None => break,
            }
        }

        let span = doc.buf_push_str(&text);
        let id = self.new_node_at(doc, NodeData::Comment(span));
        // remember whether a newline followed, for output fidelity
        if let Some(c) = self.input.read_char() {
            if c == '\n' {
                doc[id].linebreak = true;
            }
            self.input.unget_char(c);
        }
        Markup::Token(id)
    }

    fn lex_doctype(&mut self, doc: &mut Document) -> Markup {
        let mut text = String::new();
        let mut bracket_depth = 0u32;
        // skip whitespace between the keyword and the body
        loop {
            match self.input.read_char() {
                Some(c) if is_white(c, false) => continue,
                Some(c) => {
                    self.input.unget_char(c);
                    break;
                }
                None => break,
            }
        }
        loop {
            match self.input.read_char() {
                Some('[') => {
                    bracket_depth += 1;
                    text.push('[');
                }
                Some(']') => {
                    bracket_depth = bracket_depth.saturating_sub(1);
                    text.push(']');
                }
                Some('>') if bracket_depth == 0 => break,
                Some(c) => text.push(c),
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in DOCTYPE"],
                    );
                    break;
                }
            }
        }
        let span = doc.buf_push_str(text.trim_end());
        Markup::Token(self.new_node_at(doc, NodeData::Doctype(span)))
    }

    /// `<![` was read: CDATA section or a Word conditional section.
    fn lex_section(&mut self, doc: &mut Document) -> Markup {
        // peek for `CDATA[`
        let mut peeked = Vec::new();
        let mut is_cdata = true;
        for expect in "cdata[".chars() {
            match self.input.read_char() {
                Some(c) => {
                    peeked.push(c);
                    if to_lower(c) != expect {
                        is_cdata = false;
                        break;
                    }
                }
                None => {
                    is_cdata = false;
                    break;
                }
            }
        }
        if is_cdata {
            return self.lex_cdata_section(doc);
        }
        for c in peeked.into_iter().rev() {
            self.input.unget_char(c);
        }

        // conditional section: read to `]>`
        let mut text = String::new();
        loop {
            match self.input.read_char() {
                Some(']') => match self.input.read_char() {
                    Some('>') => break,
                    Some(c2) => {
                        text.push(']');
                        self.input.unget_char(c2);
                    }
                    None => {
                        text.push(']');
                        break;
                    }
                },
                Some(c) => text.push(c),
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in section"],
                    );
                    break;
                }
            }
        }
        let span = doc.buf_push_str(&text);
        Markup::Token(self.new_node_at(doc, NodeData::Section(span)))
    }

    fn lex_cdata_section(&mut self, doc: &mut Document) -> Markup {
        let mut text = String::new();
        loop {
            match self.input.read_char() {
                Some(']') => match self.input.read_char() {
                    Some(']') => match self.input.read_char() {
                        Some('>') => break,
                        Some(c3) => {
                            text.push_str("]]");
                            self.input.unget_char(c3);
                        }
                        None => {
                            text.push_str("]]");
                            break;
                        }
                    },
                    Some(c2) => {
                        text.push(']');
                        self.input.unget_char(c2);
                    }
                    None => {
                        text.push(']');
                        break;
                    }
                },
                Some(c) => text.push(c),
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in CDATA section"],
                    );
                    break;
                }
            }
        }
        let span = doc.buf_push_str(&text);
        Markup::Token(self.new_node_at(doc, NodeData::CData(span)))
    }

    /// `<?` was read: XML declaration, PHP, or a processing instruction.
    fn lex_pi(&mut self, doc: &mut Document, xml: bool) -> Markup {
        let c = match self.input.read_char() {
            Some(c) => c,
            None => return Markup::Literal("<?".to_string()),
        };
        if !is_letter(c) {
            self.input.unget_char(c);
            return self.lex_pi_body(doc, xml, String::new());
        }
        let target = self.read_name(c, true);

        if &target[..] == "xml" {
            // an XML declaration only at line 1; elsewhere a plain PI
            if self.token_line == 1 && self.token_column <= 2 {
                let (attrs, _) = self.parse_attrs(doc, true, true);
                return Markup::Token(self.new_node_at(doc, NodeData::XmlDecl { attrs }));
            }
        }
        if target.eq_ignore_ascii_case("php") {
            let content = self.raw_to_close(doc, "?>");
            let mut text = String::from("php");
            text.push_str(&content);
            let span = doc.buf_push_str(&text);
            return Markup::Token(self.new_node_at(doc, NodeData::Php(span)));
        }

        self.lex_pi_body(doc, xml, target.to_string())
    }

    fn lex_pi_body(&mut self, doc: &mut Document, xml: bool, target: String) -> Markup {
        // XML-style PIs require `?>`; HTML tolerates a bare `>`
        let want_qgt = xml || doc.config.xml_pis;
        let mut text = target;
        loop {
            match self.input.read_char() {
                Some('?') if want_qgt => match self.input.read_char() {
                    Some('>') => break,
                    Some(c2) => {
                        text.push('?');
                        self.input.unget_char(c2);
                    }
                    None => break,
                },
                Some('>') if !want_qgt => {
                    // drop a conventional trailing `?`
                    if text.ends_with('?') {
                        text.pop();
                    }
                    break;
                }
                Some(c) => text.push(c),
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in processing instruction"],
                    );
                    break;
                }
            }
        }
        let span = doc.buf_push_str(&text);
        Markup::Token(self.new_node_at(doc, NodeData::ProcInstr(span)))
    }

    /// Verbatim read of server markup up to the 2-char closer, returning
    /// the content (closer excluded).
    fn raw_to_close(&mut self, doc: &mut Document, closer: &str) -> StrTendril {
        let bytes = closer.as_bytes();
        let (c1, c2) = (bytes[0] as char, bytes[1] as char);
        let mut text = StrTendril::new();
        loop {
            match self.input.read_char() {
                Some(c) if c == c1 => match self.input.read_char() {
                    Some(cc) if cc == c2 => break,
                    Some(cc) => {
                        text.push_char(c);
                        self.input.unget_char(cc);
                    }
                    None => {
                        text.push_char(c);
                        break;
                    }
                },
                Some(c) => text.push_char(c),
                None => {
                    doc.report_at(
                        ReportCode::UnexpectedEndOfFile,
                        self.token_line,
                        self.token_column,
                        &["in server markup"],
                    );
                    break;
                }
            }
        }
        text
    }

    fn lex_to_close(&mut self, doc: &mut Document, closer: &str, kind: SpanKind) -> Markup {
        let text = self.raw_to_close(doc, closer);
        let span = doc.buf_push_str(&text);
        let data = match kind {
            SpanKind::Asp => NodeData::Asp(span),
            SpanKind::Jste => NodeData::Jste(span),
        };
        Markup::Token(self.new_node_at(doc, data))
    }

    /// Read the raw contents of a CDATA element (`script`, `style`) up to
    /// its case-insensitive end tag, honoring JavaScript string literals.
    /// The end tag itself is pushed back for normal lexing. Returns a
    /// text node, or None for an immediately closed element.
    pub fn read_cdata(
        &mut self,
        doc: &mut Document,
        container: &str,
        is_js: bool,
    ) -> Option<NodeId> {
        self.mark_position();
        let mut text = String::new();
        let mut in_string: Option<char> = None;

        loop {
            let c = match self.input.read_char() {
                Some(c) => c,
                None => break,
            };

            if is_js {
                match in_string {
                    Some(q) => {
                        if c == '\\' {
                            text.push('\\');
                            if let Some(c2) = self.input.read_char() {
                                text.push(c2);
                            }
                            continue;
                        }
                        if c == q || c == '\n' {
                            in_string = None;
                        }
                        text.push(c);
                        continue;
                    }
                    None => {
                        if c == '"' || c == '\'' {
                            in_string = Some(c);
                            text.push(c);
                            continue;
                        }
                    }
                }
            }

            if c == '<' {
                match self.input.read_char() {
                    Some('/') => {
                        // possible end tag
                        let mut name = String::new();
                        while name.len() < container.len() {
                            match self.input.read_char() {
                                Some(cn) if is_namechar(cn) => name.push(cn),
                                Some(cn) => {
                                    self.input.unget_char(cn);
                                    break;
                                }
                                None => break,
                            }
                        }
                        if name.is_empty() {
                            text.push_str("</");
                            continue;
                        }
                        if !name.eq_ignore_ascii_case(container) {
                            doc.report_at(
                                ReportCode::BadCdataContent,
                                self.input.line,
                                self.input.column,
                                &[],
                            );
                        }
                        // push the end tag back for the regular lexer
                        for cn in name.chars().rev() {
                            self.input.unget_char(cn);
                        }
                        self.input.unget_char('/');
                        self.input.unget_char('<');
                        break;
                    }
                    Some(c2) => {
                        text.push('<');
                        self.input.unget_char(c2);
                    }
                    None => {
                        text.push('<');
                        break;
                    }
                }
                continue;
            }

            text.push(c);
        }

        if text.is_empty() {
            return None;
        }
        let span = doc.buf_push_str(&text);
        Some(self.new_node_at(doc, NodeData::Text(span)))
    }

    /// The encoding the input stream settled on (it may differ from the
    /// configured one after BOM detection).
    pub fn input_encoding(&self) -> Encoding {
        self.input.encoding
    }
}

enum SpanKind {
    Asp,
    Jste,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::logger::ensure_logger;
    use crate::report::CollectSink;
    use crate::stream::BufSource;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<CollectSink>>);

    impl crate::report::MessageSink for SharedSink {
        fn emit(&mut self, diag: &crate::report::Diagnostic) {
            self.0.borrow_mut().diags.push(diag.clone());
        }
    }

    fn lexer_for(input: &str) -> (Document, Lexer, SharedSink) {
        lexer_with(input, Config::default())
    }

    fn lexer_with(input: &str, config: Config) -> (Document, Lexer, SharedSink) {
        ensure_logger();
        let sink = SharedSink::default();
        let stream = StreamIn::new(
            Box::new(BufSource::new(input.as_bytes())),
            crate::config::Encoding::Utf8,
            config.tab_size,
            config.xml_lexing(),
        );
        let doc = Document::with_sink(config, Box::new(sink.clone()));
        (doc, Lexer::new(stream), sink)
    }

    fn all_tokens(doc: &mut Document, lexer: &mut Lexer) -> Vec<NodeId> {
        let mut out = Vec::new();
        while let Some(t) = lexer.get_token(doc, LexMode::MixedContent) {
            out.push(t);
        }
        out
    }

    fn elem_name(doc: &Document, id: NodeId) -> String {
        match doc[id].data {
            NodeData::Elem(ref e) | NodeData::EndTag(ref e) => e.name.to_string(),
            _ => panic!("not an element: {:?}", doc[id].data),
        }
    }

    #[test]
    fn simple_tags_and_text() {
        let (mut doc, mut lexer, _) = lexer_for("<p>Hello</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        assert_eq!(3, toks.len());
        assert_eq!("p", elem_name(&doc, toks[0]));
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("Hello", doc.buf_str(span)),
            ref other => panic!("expected text, got {:?}", other),
        }
        assert!(matches!(doc[toks[2]].data, NodeData::EndTag(_)));
    }

    #[test]
    fn case_folding() {
        let (mut doc, mut lexer, _) = lexer_for("<P CLASS=Intro>x</P>");
        let toks = all_tokens(&mut doc, &mut lexer);
        assert_eq!("p", elem_name(&doc, toks[0]));
        let elem = doc[toks[0]].as_element().unwrap();
        assert!(elem.attrs[0].is_named("class"));
        // attribute values keep their case
        assert_eq!("Intro", elem.attrs[0].value.as_ref().unwrap().as_ref());
    }

    #[test]
    fn whitespace_collapse() {
        let (mut doc, mut lexer, _) = lexer_for("<p>a   b\n\nc</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("a b c", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn quoted_attributes() {
        let (mut doc, mut lexer, _) =
            lexer_for("<a href=\"x.html\" title='A &amp; B' selected>t</a>");
        let toks = all_tokens(&mut doc, &mut lexer);
        let elem = doc[toks[0]].as_element().unwrap();
        assert_eq!(3, elem.attrs.len());
        assert_eq!("x.html", elem.attrs[0].value.as_ref().unwrap().as_ref());
        assert_eq!(b'"', elem.attrs[0].delim);
        assert_eq!("A & B", elem.attrs[1].value.as_ref().unwrap().as_ref());
        assert_eq!(b'\'', elem.attrs[1].delim);
        assert_eq!(None, elem.attrs[2].value);
    }

    #[test]
    fn bare_value_and_self_closing() {
        let (mut doc, mut lexer, _) = lexer_for("<br width=10/>");
        let toks = all_tokens(&mut doc, &mut lexer);
        let elem = doc[toks[0]].as_element().unwrap();
        assert_eq!("10", elem.attrs[0].value.as_ref().unwrap().as_ref());
        assert!(elem.self_closing);
    }

    #[test]
    fn url_value_keeps_trailing_slash() {
        let (mut doc, mut lexer, _) = lexer_for("<a href=http://example.com/>x</a>");
        let toks = all_tokens(&mut doc, &mut lexer);
        let elem = doc[toks[0]].as_element().unwrap();
        assert_eq!(
            "http://example.com/",
            elem.attrs[0].value.as_ref().unwrap().as_ref()
        );
        assert!(!elem.self_closing);
    }

    #[test]
    fn entities_in_text() {
        let (mut doc, mut lexer, _) = lexer_for("<p>&copy; &#169; &#xA9;</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("\u{A9} \u{A9} \u{A9}", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn unknown_entity_preserved() {
        let (mut doc, mut lexer, sink) = lexer_for("<p>&bogus; x</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("&bogus; x", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert!(sink.0.borrow().diags.iter().any(|d| d.text.contains("bogus")));
        assert_eq!(1, doc.counts.warnings);
    }

    #[test]
    fn naked_ampersand_reported() {
        let (mut doc, mut lexer, sink) = lexer_for("<p>fish & chips</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("fish & chips", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert!(sink.0.borrow().diags.iter().any(|d| d.text.contains("unescaped &")));
        assert_eq!(1, doc.counts.warnings);
    }

    #[test]
    fn missing_semicolon_still_resolves() {
        let (mut doc, mut lexer, _) = lexer_for("<p>&copy x</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("\u{A9} x", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert_eq!(1, doc.counts.warnings);
    }

    #[test]
    fn ncr_in_windows_range_remapped() {
        // &#147; is a Windows smart quote, mapped through CP-1252
        let (mut doc, mut lexer, _) = lexer_for("<p>&#147;q&#148;</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("\u{201C}q\u{201D}", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert_eq!(2, doc.counts.warnings);
    }

    #[test]
    fn comment_token() {
        let (mut doc, mut lexer, _) = lexer_for("<!-- note -->x");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::Comment(span) => assert_eq!(" note ", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn malformed_comment_hyphens() {
        let (mut doc, mut lexer, sink) = lexer_for("<!-- a -- b -->");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::Comment(span) => assert_eq!(" a == b ", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert!(sink.0.borrow().diags.iter().any(|d| d.text.contains("hyphens")));
    }

    #[test]
    fn doctype_token() {
        let (mut doc, mut lexer, _) =
            lexer_for("<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\">");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::Doctype(span) => {
                assert_eq!("html PUBLIC \"-//W3C//DTD HTML 4.01//EN\"", doc.buf_str(span));
            }
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn doctype_internal_subset() {
        let (mut doc, mut lexer, _) = lexer_for("<!doctype html [ <!ENTITY x \"y\"> ]>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::Doctype(span) => {
                assert_eq!("html [ <!ENTITY x \"y\"> ]", doc.buf_str(span));
            }
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn cdata_section() {
        let (mut doc, mut lexer, _) = lexer_for("<![CDATA[a < b]]>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::CData(span) => assert_eq!("a < b", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn word_section_tokens() {
        let (mut doc, mut lexer, _) = lexer_for("<![if !vml]>hidden<![endif]>");
        let toks = all_tokens(&mut doc, &mut lexer);
        assert_eq!(3, toks.len());
        match doc[toks[0]].data {
            NodeData::Section(span) => assert_eq!("if !vml", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        match doc[toks[2]].data {
            NodeData::Section(span) => assert_eq!("endif", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn processing_instruction() {
        let (mut doc, mut lexer, _) = lexer_for("<?works whatever>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::ProcInstr(span) => assert_eq!("works whatever", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn php_island() {
        let (mut doc, mut lexer, _) = lexer_for("<?php echo 1 > 0; ?>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::Php(span) => assert_eq!("php echo 1 > 0; ", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn asp_and_jste() {
        let (mut doc, mut lexer, _) = lexer_for("<% Response.Write 1 %><# hi #>");
        let toks = all_tokens(&mut doc, &mut lexer);
        assert!(matches!(doc[toks[0]].data, NodeData::Asp(_)));
        assert!(matches!(doc[toks[1]].data, NodeData::Jste(_)));
    }

    #[test]
    fn asp_island_inside_tag() {
        let (mut doc, mut lexer, _) = lexer_for("<tr <%= stuff %>>x</tr>");
        let toks = all_tokens(&mut doc, &mut lexer);
        let elem = doc[toks[0]].as_element().unwrap();
        assert_eq!(1, elem.attrs.len());
        assert_eq!(None, elem.attrs[0].name);
        assert_eq!(Some(ServerKind::Asp), elem.attrs[0].server);
    }

    #[test]
    fn xml_declaration() {
        let (mut doc, mut lexer, _) =
            lexer_for("<?xml version=\"1.0\" encoding=\"utf-8\"?><x>y</x>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[0]].data {
            NodeData::XmlDecl { ref attrs } => {
                assert!(attrs[0].is_named("version"));
                assert_eq!("1.0", attrs[0].value.as_ref().unwrap().as_ref());
                assert!(attrs[1].is_named("encoding"));
            }
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn literal_lt_in_text() {
        let (mut doc, mut lexer, _) = lexer_for("<p>1 < 2</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        match doc[toks[1]].data {
            NodeData::Text(span) => assert_eq!("1 < 2", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn token_unget() {
        let (mut doc, mut lexer, _) = lexer_for("<p>x</p>");
        let t1 = lexer.get_token(&mut doc, LexMode::MixedContent).unwrap();
        lexer.unget_token(t1);
        let t2 = lexer.get_token(&mut doc, LexMode::MixedContent).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn suspected_missing_quote() {
        let input = "<a href=\"x.html>a</a>\n<b>1</b>\n<b>2</b>\n<b>3</b>\n<b>4</b>\n\
                     <b>5</b>\n<b>6</b>\n";
        let (mut doc, mut lexer, sink) = lexer_for(input);
        let _ = all_tokens(&mut doc, &mut lexer);
        assert!(sink.0.borrow().diags.iter().any(|d| d.text.contains("quote")));
        assert!(doc.counts.errors > 0);
    }

    #[test]
    fn read_cdata_script() {
        let (mut doc, mut lexer, _) =
            lexer_for("var s = '</span>'; x = 1 < 2;</script>y");
        let tok = lexer.read_cdata(&mut doc, "script", true).unwrap();
        match doc[tok].data {
            NodeData::Text(span) => {
                assert_eq!("var s = '</span>'; x = 1 < 2;", doc.buf_str(span));
            }
            ref other => panic!("{:?}", other),
        }
        // end tag resumes normal lexing
        let end = lexer.get_token(&mut doc, LexMode::MixedContent).unwrap();
        assert!(matches!(doc[end].data, NodeData::EndTag(_)));
        assert_eq!("script", elem_name(&doc, end));
    }

    #[test]
    fn read_cdata_bad_content_terminates() {
        let (mut doc, mut lexer, sink) = lexer_for("text</div>more");
        let tok = lexer.read_cdata(&mut doc, "style", false).unwrap();
        match doc[tok].data {
            NodeData::Text(span) => assert_eq!("text", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
        assert!(sink.0.borrow().diags.iter().any(|d| d.text.contains("allowed")));
    }

    #[test]
    fn xml_mode_preserves_case() {
        let mut config = Config::default();
        config.xml_tags = true;
        let (mut doc, mut lexer, _) = lexer_with("<Case Attr=\"V\"/>", config);
        let toks = all_tokens(&mut doc, &mut lexer);
        let elem = doc[toks[0]].as_element().unwrap();
        assert_eq!("Case", elem.name.as_ref());
        assert!(elem.attrs[0].is_named("Attr"));
        assert!(elem.self_closing);
        assert!(elem.tag.is_none());
    }

    #[test]
    fn preformatted_keeps_whitespace() {
        let (mut doc, mut lexer, _) = lexer_for("a  b\nc \n");
        let t = lexer.get_token(&mut doc, LexMode::Preformatted).unwrap();
        match doc[t].data {
            NodeData::Text(span) => assert_eq!("a  b\nc \n", doc.buf_str(span)),
            ref other => panic!("{:?}", other),
        }
    }

    #[test]
    fn token_positions() {
        let (mut doc, mut lexer, _) = lexer_for("x\n<p>y</p>");
        let toks = all_tokens(&mut doc, &mut lexer);
        assert_eq!(1, doc[toks[0]].line);
        assert_eq!(2, doc[toks[1]].line, "tag on second line");
        assert_eq!(1, doc[toks[1]].column);
    }
}
