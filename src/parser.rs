//! The tree builder: per-element routines that assemble the document tree
//! from lexer tokens, repairing structure as they go.
//!
//! Every routine owns one open element and consumes tokens until that
//! element closes, by an explicit end tag, a tag that implicitly closes
//! it, or end of input. Tokens are appended, reinterpreted, or pushed
//! back for the enclosing routine; the tree is structurally valid after
//! every step.

use log::debug;

use crate::dom::meta::{
    check_attributes, constrain_version, lookup_tag, Routine, CM_BLOCK, CM_DEFLIST, CM_EMPTY,
    CM_HEAD, CM_INLINE, CM_LIST, CM_MIXED, CM_OBJECT, CM_OPT, CM_ROW, CM_ROWGRP, CM_TABLE,
    VERS_FRAMESET, VERS_HTML20, VERS_HTML32, VERS_HTML40_LOOSE, VERS_HTML40_STRICT, VERS_XML,
};
use crate::dom::{Document, Node, NodeData, NodeId};
use crate::lexer::{LexMode, Lexer};
use crate::report::{PreenError, ReportCode};

/// Parse an HTML document: builds the tree under the document node,
/// inferring `<html>`, `<head>` and `<body>` as needed, then verifies
/// tree integrity.
pub fn parse_document(doc: &mut Document, lexer: &mut Lexer) -> Result<(), PreenError> {
    let mut html: Option<NodeId> = None;

    while let Some(token) = lexer.get_token(doc, LexMode::IgnoreWhitespace) {
        match doc[token].data {
            NodeData::Doctype(_) => {
                if html.is_some() {
                    doc.report(ReportCode::DoctypeAfterTags, token, &[]);
                } else if doc
                    .children(Document::DOCUMENT_NODE_ID)
                    .any(|id| matches!(doc[id].data, NodeData::Doctype(_)))
                {
                    doc.report(ReportCode::DiscardingUnexpected, token, &["DOCTYPE"]);
                } else {
                    doc.append(Document::DOCUMENT_NODE_ID, token);
                }
            }
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_)
            | NodeData::Section(_)
            | NodeData::XmlDecl { .. } => {
                doc.append(Document::DOCUMENT_NODE_ID, token);
            }
            NodeData::Elem(ref e) if e.is_elem("html") => {
                let id = token;
                doc.append(Document::DOCUMENT_NODE_ID, id);
                check_attributes(doc, id);
                html = Some(id);
                parse_html(doc, lexer, id);
            }
            _ => {
                // anything else forces an implicit <html>
                lexer.unget_token(token);
                let id = match html {
                    Some(id) => id,
                    None => {
                        let id = infer_element(doc, "html");
                        doc.append(Document::DOCUMENT_NODE_ID, id);
                        id
                    }
                };
                html = Some(id);
                parse_html(doc, lexer, id);
            }
        }
    }

    if html.is_none() {
        let id = infer_element(doc, "html");
        doc.append(Document::DOCUMENT_NODE_ID, id);
        ensure_head_body(doc, id);
    }

    resolve_doctype(doc);
    doc.check_node_integrity()
}

/// Parse an XML document: no dictionary, no inference, recovery limited
/// to discarding mismatched end tags.
pub fn parse_xml_document(doc: &mut Document, lexer: &mut Lexer) -> Result<(), PreenError> {
    constrain_version(doc, VERS_XML);
    while let Some(token) = lexer.get_token(doc, LexMode::IgnoreWhitespace) {
        match doc[token].data {
            NodeData::Elem(ref e) => {
                let closed = e.self_closing;
                doc.append(Document::DOCUMENT_NODE_ID, token);
                if !closed {
                    parse_xml_element(doc, lexer, token);
                }
            }
            NodeData::EndTag(_) => {
                doc.report(ReportCode::DiscardingUnexpected, token, &["end tag"]);
            }
            _ => doc.append(Document::DOCUMENT_NODE_ID, token),
        }
    }
    doc.check_node_integrity()
}

fn parse_xml_element(doc: &mut Document, lexer: &mut Lexer, element: NodeId) {
    while let Some(token) = lexer.get_token(doc, LexMode::MixedContent) {
        match doc[token].data {
            NodeData::EndTag(ref e) => {
                let name = e.name.clone();
                if doc[element].is_elem(&name) {
                    doc[element].closed = true;
                    return;
                }
                // mismatched end tag: close here if an ancestor matches
                if open_ancestor_named(doc, element, &name) {
                    doc.report(ReportCode::MissingEndtagBefore, token, &[
                        &elem_name(doc, element),
                        &format!("</{}>", name),
                    ]);
                    lexer.unget_token(token);
                    return;
                }
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            NodeData::Elem(ref e) => {
                let closed = e.self_closing;
                doc.append(element, token);
                if !closed {
                    parse_xml_element(doc, lexer, token);
                }
            }
            _ => doc.append(element, token),
        }
    }
    doc.report(ReportCode::MissingEndtagFor, element, &[&elem_name(doc, element)]);
}

fn elem_name(doc: &Document, id: NodeId) -> String {
    match doc[id].data {
        NodeData::Elem(ref e) | NodeData::EndTag(ref e) => e.name.to_string(),
        NodeData::Text(_) => "plain text".to_string(),
        ref d => format!("{:?}", d),
    }
}

fn infer_element(doc: &mut Document, name: &str) -> NodeId {
    let tag = lookup_tag(name, &doc.config);
    let mut node = Node::new_element(name, tag);
    node.implicit = true;
    doc.push_node(node)
}

fn token_is_end_named(doc: &Document, token: NodeId, name: &str) -> bool {
    match doc[token].data {
        NodeData::EndTag(ref e) => e.is_elem(name),
        _ => false,
    }
}

/// Does any open ancestor (the chain of the element under construction)
/// carry this name?
fn open_ancestor_named(doc: &Document, element: NodeId, name: &str) -> bool {
    doc.node_and_ancestors(element)
        .skip(1)
        .any(|id| doc[id].is_elem(name))
}

/// Append a start-tag token as a child, validating its attributes and
/// narrowing the version mask.
fn append_elem(doc: &mut Document, parent: NodeId, token: NodeId) {
    doc.append(parent, token);
    let versions = doc[token].as_element().map(|e| e.versions()).unwrap_or(0);
    constrain_version(doc, versions);
    check_attributes(doc, token);
}

/// Unknown elements are reported and dropped; their content flows to the
/// enclosing element. Returns true when the token was discarded.
fn discard_if_unknown(doc: &mut Document, token: NodeId) -> bool {
    let unknown = match doc[token].data {
        NodeData::Elem(ref e) | NodeData::EndTag(ref e) => e.tag.is_none(),
        _ => false,
    };
    if unknown && !doc.config.xml_lexing() {
        let name = elem_name(doc, token);
        doc.report(ReportCode::UnknownElement, token, &[&name]);
        return true;
    }
    false
}

/// Dispatch on the element's bound parser routine. The element is already
/// attached to the tree.
fn parse_tag(doc: &mut Document, lexer: &mut Lexer, element: NodeId, mode: LexMode) {
    let (routine, self_closing, empty) = match doc[element].as_element() {
        Some(e) => (
            e.tag.map(|t| t.routine),
            e.self_closing,
            e.has_model(CM_EMPTY),
        ),
        None => return,
    };

    if empty {
        return;
    }
    if self_closing {
        // XHTML-style start-end tag: no content to parse
        doc[element].closed = true;
        return;
    }

    match routine {
        None | Some(Routine::Block) => parse_block(doc, lexer, element),
        Some(Routine::Inline) => parse_inline(doc, lexer, element, mode),
        Some(Routine::Empty) => {}
        Some(Routine::Html) => parse_html(doc, lexer, element),
        Some(Routine::Head) => parse_head(doc, lexer, element),
        Some(Routine::Body) => parse_body(doc, lexer, element),
        Some(Routine::Frameset) => parse_frameset(doc, lexer, element),
        Some(Routine::NoFrames) => parse_noframes(doc, lexer, element),
        Some(Routine::Title) => parse_text(doc, lexer, element, LexMode::MixedContent),
        Some(Routine::Text) => {
            let mode = if doc[element].is_elem("textarea") {
                LexMode::Preformatted
            } else {
                LexMode::MixedContent
            };
            parse_text(doc, lexer, element, mode)
        }
        Some(Routine::Script) => parse_script(doc, lexer, element),
        Some(Routine::Pre) => parse_pre(doc, lexer, element),
        Some(Routine::List) => parse_list(doc, lexer, element),
        Some(Routine::DefList) => parse_definition_list(doc, lexer, element),
        Some(Routine::Table) => parse_table(doc, lexer, element),
        Some(Routine::ColGroup) => parse_colgroup(doc, lexer, element),
        Some(Routine::RowGroup) => parse_row_group(doc, lexer, element),
        Some(Routine::Row) => parse_row(doc, lexer, element),
        Some(Routine::Cell) => parse_cell(doc, lexer, element),
        Some(Routine::Select) => parse_select(doc, lexer, element),
        Some(Routine::OptGroup) => parse_optgroup(doc, lexer, element),
    }
}

/// Make sure `<head>` and `<body>` exist under `<html>`.
fn ensure_head_body(doc: &mut Document, html: NodeId) {
    if doc.children(html).find(|&id| doc[id].is_elem("head")).is_none() {
        let head = infer_element(doc, "head");
        if let Some(first) = doc[html].first_child() {
            doc.insert_before(first, head);
        } else {
            doc.append(html, head);
        }
    }
    let has_frameset = doc.children(html).any(|id| doc[id].is_elem("frameset"));
    if !has_frameset
        && doc.children(html).find(|&id| doc[id].is_elem("body")).is_none()
    {
        let body = infer_element(doc, "body");
        doc.append(html, body);
    }
}

fn parse_html(doc: &mut Document, lexer: &mut Lexer, html: NodeId) {
    let mut head: Option<NodeId> = None;
    let mut frameset: Option<NodeId> = None;
    let mut body_seen = false;

    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        enum Kind {
            Head,
            Body,
            Frameset,
            EndHtml,
            Passthrough,
            Doctype,
            Other,
        }
        let kind = match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("head") => Kind::Head,
            NodeData::Elem(ref e) if e.is_elem("body") => Kind::Body,
            NodeData::Elem(ref e) if e.is_elem("frameset") => Kind::Frameset,
            NodeData::Elem(ref e) if e.is_elem("html") => {
                doc.report(ReportCode::DiscardingUnexpected, token, &["<html>"]);
                continue;
            }
            NodeData::EndTag(ref e) if e.is_elem("html") => Kind::EndHtml,
            NodeData::EndTag(ref e) => {
                let name = e.name.to_string();
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
                continue;
            }
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_)
            | NodeData::Section(_) => Kind::Passthrough,
            NodeData::Doctype(_) => Kind::Doctype,
            _ => Kind::Other,
        };

        match kind {
            Kind::Head => {
                if head.is_some() {
                    doc.report(ReportCode::DiscardingUnexpected, token, &["<head>"]);
                    continue;
                }
                append_elem(doc, html, token);
                head = Some(token);
                parse_head(doc, lexer, token);
            }
            Kind::Body => {
                if head.is_none() {
                    let h = infer_element(doc, "head");
                    doc.append(html, h);
                    head = Some(h);
                }
                if let Some(fs) = frameset {
                    // frameset wins; body content lands in noframes
                    doc.report(ReportCode::DiscardingUnexpected, token, &["<body>"]);
                    let nf = infer_element(doc, "noframes");
                    doc.append(fs, nf);
                    doc.append(nf, token);
                    parse_body(doc, lexer, token);
                    continue;
                }
                if body_seen {
                    doc.report(ReportCode::DiscardingUnexpected, token, &["<body>"]);
                    continue;
                }
                body_seen = true;
                append_elem(doc, html, token);
                parse_body(doc, lexer, token);
            }
            Kind::Frameset => {
                if body_seen || frameset.is_some() {
                    doc.report(ReportCode::DuplicateFrameset, token, &[]);
                    continue;
                }
                if head.is_none() {
                    let h = infer_element(doc, "head");
                    doc.append(html, h);
                    head = Some(h);
                }
                constrain_version(doc, VERS_FRAMESET);
                append_elem(doc, html, token);
                frameset = Some(token);
                parse_frameset(doc, lexer, token);
            }
            Kind::EndHtml => {
                doc[html].closed = true;
                // content after </html> is still collected
            }
            Kind::Passthrough => doc.append(html, token),
            Kind::Doctype => {
                doc.report(ReportCode::DoctypeAfterTags, token, &[]);
            }
            Kind::Other => {
                // head-only elements open an implicit head; everything
                // else forces the body
                let head_only = doc[token].has_model(CM_HEAD)
                    && !doc[token].has_model(CM_BLOCK | CM_INLINE);
                if head_only {
                    let h = match head {
                        Some(h) => h,
                        None => {
                            let h = infer_element(doc, "head");
                            doc.append(html, h);
                            head = Some(h);
                            h
                        }
                    };
                    lexer.unget_token(token);
                    parse_head_fragment(doc, lexer, h);
                    continue;
                }
                if head.is_none() {
                    let h = infer_element(doc, "head");
                    doc.append(html, h);
                    head = Some(h);
                }
                lexer.unget_token(token);
                if frameset.is_some() {
                    let fs = frameset.unwrap();
                    let nf = infer_element(doc, "noframes");
                    doc.append(fs, nf);
                    parse_noframes(doc, lexer, nf);
                    continue;
                }
                if body_seen {
                    // stray content after </body>
                    let body = doc.body_elem().expect("body exists");
                    doc.report_at(
                        ReportCode::ContentAfterBody,
                        doc[token].line,
                        doc[token].column,
                        &[],
                    );
                    parse_body(doc, lexer, body);
                    continue;
                }
                body_seen = true;
                let body = infer_element(doc, "body");
                doc.append(html, body);
                parse_body(doc, lexer, body);
            }
        }
    }

    ensure_head_body(doc, html);
}

/// One or more consecutive head-only elements arriving outside `<head>`.
fn parse_head_fragment(doc: &mut Document, lexer: &mut Lexer, head: NodeId) {
    if let Some(token) = lexer.get_token(doc, LexMode::IgnoreWhitespace) {
        match doc[token].data {
            NodeData::Elem(_) => {
                append_elem(doc, head, token);
                parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            }
            _ => lexer.unget_token(token),
        }
    }
}

fn parse_head(doc: &mut Document, lexer: &mut Lexer, head: NodeId) {
    let mut title_count = 0u32;
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        match doc[token].data {
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_)
            | NodeData::Section(_) => {
                doc.append(head, token);
                continue;
            }
            NodeData::Doctype(_) => {
                doc.report(ReportCode::DoctypeAfterTags, token, &[]);
                continue;
            }
            NodeData::EndTag(ref e) if e.is_elem("head") => {
                doc[head].closed = true;
                break;
            }
            NodeData::EndTag(ref e) if e.is_elem("html") || e.is_elem("body") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::Text(_) => {
                lexer.unget_token(token);
                break;
            }
            _ => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        let is_head_elem = doc[token].has_model(CM_HEAD)
            && matches!(doc[token].data, NodeData::Elem(_));
        if is_head_elem {
            if doc[token].is_elem("title") {
                title_count += 1;
                if title_count > 1 {
                    doc.report(ReportCode::TooManyElements, token, &["title"]);
                    continue;
                }
            }
            append_elem(doc, head, token);
            parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("head") || e.is_elem("html") => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&name]);
            }
            _ => {
                // not head content: close head implicitly
                lexer.unget_token(token);
                break;
            }
        }
    }
}

fn parse_body(doc: &mut Document, lexer: &mut Lexer, body: NodeId) {
    let mut mode = LexMode::IgnoreWhitespace;
    let mut checkstack = true;
    let mut end_body_seen = false;
    let mut after_body_reported = false;

    loop {
        let token = match lexer.get_token(doc, mode) {
            Some(t) => t,
            None => break,
        };

        match doc[token].data {
            NodeData::Doctype(_) => {
                doc.report(ReportCode::DoctypeAfterTags, token, &[]);
                continue;
            }
            NodeData::EndTag(ref e) if e.is_elem("body") => {
                doc[body].closed = true;
                end_body_seen = true;
                mode = LexMode::IgnoreWhitespace;
                continue;
            }
            NodeData::EndTag(ref e) if e.is_elem("html") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_)
            | NodeData::Section(_)
            | NodeData::CData(_)
            | NodeData::XmlDecl { .. } => {
                doc.append(body, token);
                continue;
            }
            _ => {}
        }

        if end_body_seen && !after_body_reported {
            doc.report_at(
                ReportCode::ContentAfterBody,
                doc[token].line,
                doc[token].column,
                &[],
            );
            after_body_reported = true;
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        let is_text = doc[token].data.is_text();
        let is_inline = doc[token].has_model(CM_INLINE)
            && matches!(doc[token].data, NodeData::Elem(_));

        // re-open duplicated inlines before the next run of content
        if (is_text || is_inline) && checkstack {
            checkstack = false;
            if lexer.inline_open() {
                lexer.unget_token(token);
                lexer.inline_dup(doc);
                continue;
            }
        }

        if is_text {
            doc.append(body, token);
            mode = LexMode::MixedContent;
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) => {
                let name = e.name.to_string();
                match &name[..] {
                    "html" | "body" => {
                        doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("<{}>", name)]);
                        continue;
                    }
                    "frameset" => {
                        doc.report(ReportCode::DuplicateFrameset, token, &[]);
                        continue;
                    }
                    _ => {}
                }

                // head-only elements are moved into the head
                let head_only = doc[token].has_model(CM_HEAD)
                    && !doc[token].has_model(CM_BLOCK | CM_INLINE);
                if head_only {
                    doc.report(ReportCode::TagNotAllowedIn, token, &[&format!("<{}>", name), "body"]);
                    if let Some(head) = doc.head_elem() {
                        append_elem(doc, head, token);
                        parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
                    }
                    continue;
                }

                // list items et al. get their implied parent inferred
                if let Some(implied) = implied_list_parent(doc, token) {
                    debug!("inferring <{}> in body", implied);
                    let parent = infer_element(doc, implied);
                    doc.append(body, parent);
                    doc.report(ReportCode::InsertingTag, token, &[implied]);
                    lexer.unget_token(token);
                    parse_tag(doc, lexer, parent, LexMode::IgnoreWhitespace);
                    checkstack = true;
                    mode = LexMode::MixedContent;
                    continue;
                }

                // table parts with no table get dropped
                let table_part = doc[token].has_model(CM_TABLE | CM_ROWGRP | CM_ROW)
                    && !doc[token].has_model(CM_BLOCK);
                if table_part {
                    doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("<{}>", name)]);
                    continue;
                }

                append_elem(doc, body, token);
                if is_inline {
                    lexer.push_inline(doc, token);
                } else {
                    checkstack = true;
                }
                parse_tag(doc, lexer, token, mode);
                mode = LexMode::MixedContent;
            }
            NodeData::EndTag(ref e) => {
                let name = e.name.to_string();
                // a stray inline end tag may close a duplicated entry
                lexer.pop_inline(doc, Some(token));
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(body, token),
        }
    }
}

/// If this token needs a list parent that is missing, name the element to
/// infer: `<li>` gets `ul`, `<dd>`/`<dt>` get `dl`.
fn implied_list_parent(doc: &Document, token: NodeId) -> Option<&'static str> {
    let e = doc[token].as_element()?;
    if e.has_model(CM_LIST) && e.is_elem("li") {
        Some("ul")
    } else if e.is_elem("dd") || e.is_elem("dt") {
        Some("dl")
    } else {
        None
    }
}

fn parse_frameset(doc: &mut Document, lexer: &mut Lexer, frameset: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => {
                doc.report(ReportCode::MissingEndtagFor, frameset, &["frameset"]);
                break;
            }
        };

        match doc[token].data {
            NodeData::EndTag(ref e) if e.is_elem("frameset") => {
                doc[frameset].closed = true;
                break;
            }
            NodeData::Elem(ref e) if e.is_elem("frameset") => {
                append_elem(doc, frameset, token);
                parse_frameset(doc, lexer, token);
            }
            NodeData::Elem(ref e) if e.is_elem("frame") => {
                append_elem(doc, frameset, token);
            }
            NodeData::Elem(ref e) if e.is_elem("noframes") => {
                append_elem(doc, frameset, token);
                parse_noframes(doc, lexer, token);
            }
            NodeData::Comment(_) => doc.append(frameset, token),
            NodeData::EndTag(ref e) if e.is_elem("html") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => {
                // body-like content belongs in noframes
                doc.report(ReportCode::NoframesContent, token, &[&elem_name(doc, token)]);
                let nf = infer_element(doc, "noframes");
                doc.append(frameset, nf);
                lexer.unget_token(token);
                parse_noframes(doc, lexer, nf);
            }
        }
    }
}

fn parse_noframes(doc: &mut Document, lexer: &mut Lexer, noframes: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::MixedContent) {
            Some(t) => t,
            None => {
                if !doc[noframes].implicit {
                    doc.report(ReportCode::MissingEndtagFor, noframes, &["noframes"]);
                }
                break;
            }
        };

        match doc[token].data {
            NodeData::EndTag(ref e) if e.is_elem("noframes") => {
                doc[noframes].closed = true;
                break;
            }
            NodeData::EndTag(ref e) if e.is_elem("frameset") || e.is_elem("html") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::Elem(ref e) if e.is_elem("body") => {
                let closed = e.self_closing;
                doc.append(noframes, token);
                if !closed {
                    parse_body(doc, lexer, token);
                }
            }
            NodeData::Elem(_) => {
                if discard_if_unknown(doc, token) {
                    continue;
                }
                append_elem(doc, noframes, token);
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(noframes, token),
        }
    }
}

/// Generic block container: div, blockquote, form, fieldset, li, dd…
fn parse_block(doc: &mut Document, lexer: &mut Lexer, element: NodeId) {
    let object_barrier = if doc[element].has_model(CM_OBJECT) {
        Some(lexer.defer_dup())
    } else {
        None
    };

    let mut mode = LexMode::IgnoreWhitespace;
    let mut checkstack = true;

    loop {
        let token = match lexer.get_token(doc, mode) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, element);
                break;
            }
        };

        let ended = handle_common_end(doc, lexer, element, token);
        match ended {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        let is_text = doc[token].data.is_text();
        let is_inline = doc[token].has_model(CM_INLINE)
            && matches!(doc[token].data, NodeData::Elem(_));

        if (is_text || is_inline) && checkstack {
            checkstack = false;
            if lexer.inline_open() {
                lexer.unget_token(token);
                lexer.inline_dup(doc);
                continue;
            }
        }

        if is_text {
            doc.append(element, token);
            mode = LexMode::MixedContent;
            continue;
        }

        match doc[token].data {
            NodeData::Elem(_) => {
                // head-only elements move to head
                let head_only = doc[token].has_model(CM_HEAD)
                    && !doc[token].has_model(CM_BLOCK | CM_INLINE);
                if head_only {
                    let name = elem_name(doc, token);
                    doc.report(ReportCode::TagNotAllowedIn, token, &[
                        &format!("<{}>", name),
                        &elem_name(doc, element),
                    ]);
                    if let Some(head) = doc.head_elem() {
                        append_elem(doc, head, token);
                        parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
                    }
                    continue;
                }

                // a sibling list item closes the chain up to its list;
                // without any list open, one is inferred here
                let tok_is_li = doc[token].is_elem("li");
                let tok_is_def = doc[token].is_elem("dt") || doc[token].is_elem("dd");
                if tok_is_li || tok_is_def {
                    let self_item = doc[element].is_elem("li")
                        || doc[element].is_elem("dt")
                        || doc[element].is_elem("dd");
                    let list_open = if tok_is_li {
                        doc.node_and_ancestors(element)
                            .any(|id| doc[id].has_model(CM_LIST) && doc[id].has_model(CM_BLOCK))
                    } else {
                        open_ancestor_named(doc, element, "dl")
                    };
                    if self_item || list_open {
                        lexer.unget_token(token);
                        break;
                    }
                    let implied = if tok_is_li { "ul" } else { "dl" };
                    let parent = infer_element(doc, implied);
                    doc.append(element, parent);
                    doc.report(ReportCode::InsertingTag, token, &[implied]);
                    lexer.unget_token(token);
                    parse_tag(doc, lexer, parent, LexMode::IgnoreWhitespace);
                    checkstack = true;
                    continue;
                }

                // table parts don't belong in a block: close back to an
                // open table, or drop them
                let table_part = doc[token].has_model(CM_TABLE | CM_ROWGRP | CM_ROW)
                    && !doc[token].has_model(CM_BLOCK);
                if table_part {
                    if open_ancestor_named(doc, element, "table") {
                        lexer.unget_token(token);
                        break;
                    }
                    let name = elem_name(doc, token);
                    doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("<{}>", name)]);
                    continue;
                }

                append_elem(doc, element, token);
                if is_inline {
                    lexer.push_inline(doc, token);
                } else {
                    checkstack = true;
                }
                parse_tag(doc, lexer, token, mode);
                mode = LexMode::MixedContent;
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                lexer.pop_inline(doc, Some(token));
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(element, token),
        }
    }

    if let Some(base) = object_barrier {
        lexer.restore_stack_base(base);
    }
    trim_empty_element(doc, element);
}

enum Flow {
    /// The element was closed; leave the routine.
    Closed,
    /// Token handled here; fetch the next one.
    Consumed,
    /// Token is normal content for the caller to process.
    Open,
}

/// End-of-element conditions shared by the content routines: an explicit
/// matching end tag, a misnested end tag for an open ancestor, document
/// structure end tags, and stray doctypes.
fn handle_common_end(
    doc: &mut Document,
    lexer: &mut Lexer,
    element: NodeId,
    token: NodeId,
) -> Flow {
    let ename = elem_name(doc, element);
    match doc[token].data {
        NodeData::EndTag(ref e) => {
            let name = e.name.to_string();
            if name == ename {
                doc[element].closed = true;
                return Flow::Closed;
            }
            if name == "body" || name == "html" {
                lexer.unget_token(token);
                return Flow::Closed;
            }
            if open_ancestor_named(doc, element, &name) {
                // omitted optional end tags close silently
                if !doc[element].implicit && !doc[element].has_model(CM_OPT) {
                    doc.report(ReportCode::MissingEndtagBefore, token, &[
                        &ename,
                        &format!("</{}>", name),
                    ]);
                }
                lexer.unget_token(token);
                return Flow::Closed;
            }
            Flow::Open
        }
        NodeData::Doctype(_) => {
            doc.report(ReportCode::DoctypeAfterTags, token, &[]);
            Flow::Consumed
        }
        _ => Flow::Open,
    }
}

fn missing_end_tag(doc: &mut Document, element: NodeId) {
    if !doc[element].implicit && !doc[element].has_model(CM_OPT) {
        let name = elem_name(doc, element);
        doc.report(ReportCode::MissingEndtagFor, element, &[&name]);
    }
}

/// Inline container: a, em, span, p (inline content), headings, dt…
fn parse_inline(doc: &mut Document, lexer: &mut Lexer, element: NodeId, _mode: LexMode) {
    let is_heading = doc[element].has_model(crate::dom::meta::CM_HEADING);
    let mixed_allowed = doc[element].has_model(CM_MIXED);
    let ename = elem_name(doc, element);
    // block containers with inline content (p, headings, dt, caption)
    // re-open any inline elements still on the stack
    let mut checkstack =
        doc[element].has_model(CM_BLOCK) && !doc[element].has_model(CM_INLINE);

    loop {
        let token = match lexer.get_token(doc, LexMode::MixedContent) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, element);
                break;
            }
        };

        let is_text_tok = doc[token].data.is_text();
        let is_inline_tok = doc[token].has_model(CM_INLINE)
            && matches!(doc[token].data, NodeData::Elem(_));
        if (is_text_tok || is_inline_tok) && checkstack {
            checkstack = false;
            if lexer.inline_open() {
                lexer.unget_token(token);
                lexer.inline_dup(doc);
                continue;
            }
        }

        match doc[token].data {
            NodeData::EndTag(ref e) if e.is_elem(&ename) => {
                doc[element].closed = true;
                lexer.pop_inline(doc, Some(token));
                break;
            }
            NodeData::EndTag(ref e) if is_heading && heading_name(&e.name) => {
                // h2 closed by </h3> and the like
                let name = e.name.to_string();
                doc.report(ReportCode::NonMatchingEndtag, token, &[
                    &format!("</{}>", name),
                    &ename,
                ]);
                doc[element].closed = true;
                lexer.pop_inline(doc, Some(element));
                break;
            }
            _ => {}
        }

        match handle_common_end(doc, lexer, element, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        if doc[token].data.is_text() {
            doc.append(element, token);
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) => {
                let name = e.name.to_string();

                // the same inline reopened: end this one first
                if name == ename && !doc[element].has_model(CM_MIXED) {
                    doc.report(ReportCode::MissingEndtagBefore, token, &[
                        &ename,
                        &format!("<{}>", name),
                    ]);
                    lexer.pop_inline(doc, Some(element));
                    lexer.unget_token(token);
                    break;
                }

                let is_block = doc[token]
                    .has_model(CM_BLOCK | CM_LIST | CM_DEFLIST | CM_TABLE | CM_ROWGRP | CM_ROW)
                    && !doc[token].has_model(CM_INLINE);
                if is_block && !mixed_allowed {
                    // a block closes the inline; the inline stack will
                    // re-open it inside the block
                    if !doc[element].implicit && !doc[element].has_model(CM_OPT) {
                        doc.report(ReportCode::MissingEndtagBefore, token, &[
                            &ename,
                            &format!("<{}>", name),
                        ]);
                    }
                    lexer.unget_token(token);
                    break;
                }

                append_elem(doc, element, token);
                if doc[token].has_model(CM_INLINE)
                    && matches!(doc[token].data, NodeData::Elem(_))
                {
                    lexer.push_inline(doc, token);
                }
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                lexer.pop_inline(doc, Some(token));
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(element, token),
        }
    }

    trim_empty_element(doc, element);
}

fn heading_name(name: &str) -> bool {
    matches!(name, "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
}

/// Empty inline and optional elements left without content are dropped.
fn trim_empty_element(doc: &mut Document, element: NodeId) {
    if !doc.config.drop_empty_paras {
        return;
    }
    if doc[element].first_child().is_some() {
        return;
    }
    let droppable = match doc[element].as_element() {
        Some(e) => {
            !e.has_model(CM_EMPTY)
                && !e.has_model(CM_OBJECT)
                && !e.has_model(CM_TABLE | CM_ROW | CM_ROWGRP)
                && (e.is_elem("p") || doc[element].implicit
                    || (e.has_model(CM_INLINE) && !e.is_elem("a") && e.attrs.is_empty()))
        }
        None => false,
    };
    if droppable && doc[element].parent().is_some() {
        let name = elem_name(doc, element);
        doc.report(ReportCode::TrimEmptyElement, element, &[&name]);
        doc.detach(element);
    }
}

fn parse_pre(doc: &mut Document, lexer: &mut Lexer, pre: NodeId) {
    let ename = elem_name(doc, pre);
    // plaintext swallows everything up to end of input
    let mode = if ename == "plaintext" {
        LexMode::IgnoreMarkup
    } else {
        LexMode::Preformatted
    };
    let mut first = true;
    loop {
        let token = match lexer.get_token(doc, mode) {
            Some(t) => t,
            None => {
                if mode != LexMode::IgnoreMarkup {
                    missing_end_tag(doc, pre);
                }
                break;
            }
        };

        match handle_common_end(doc, lexer, pre, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        if let NodeData::Text(span) = doc[token].data {
            // the newline right after <pre> is not content
            if first {
                let text = doc.buf_str(span);
                if let Some(stripped) = text.strip_prefix('\n') {
                    let new_span = crate::dom::Span::new(span.start + 1, span.end);
                    if stripped.is_empty() {
                        first = false;
                        continue;
                    }
                    doc[token].data = NodeData::Text(new_span);
                }
            }
            first = false;
            doc.append(pre, token);
            continue;
        }
        first = false;

        match doc[token].data {
            NodeData::Elem(_) => {
                let is_block = doc[token].has_model(CM_BLOCK)
                    && !doc[token].has_model(CM_INLINE);
                if is_block {
                    let name = elem_name(doc, token);
                    doc.report(ReportCode::MissingEndtagBefore, token, &[
                        &ename,
                        &format!("<{}>", name),
                    ]);
                    lexer.unget_token(token);
                    break;
                }
                append_elem(doc, pre, token);
                if doc[token].has_model(CM_INLINE) {
                    lexer.push_inline(doc, token);
                }
                parse_tag(doc, lexer, token, LexMode::Preformatted);
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                lexer.pop_inline(doc, Some(token));
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(pre, token),
        }
    }
}

fn parse_list(doc: &mut Document, lexer: &mut Lexer, list: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, list);
                break;
            }
        };

        match handle_common_end(doc, lexer, list, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        match doc[token].data {
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_)
            | NodeData::Section(_) => {
                doc.append(list, token);
            }
            NodeData::Elem(ref e) if e.is_elem("li") => {
                append_elem(doc, list, token);
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::Elem(ref e) if e.is_elem("dt") || e.is_elem("dd") => {
                let name = e.name.to_string();
                doc.report(ReportCode::ReplacingElement, token, &[&name, "li"]);
                {
                    let tag = lookup_tag("li", &doc.config);
                    let elem = doc[token].as_element_mut().unwrap();
                    elem.name = "li".into();
                    elem.tag = tag;
                }
                append_elem(doc, list, token);
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => {
                // raw content gets an implicit list item
                doc.report(ReportCode::MissingStarttag, token, &["li"]);
                let li = infer_element(doc, "li");
                doc.append(list, li);
                lexer.unget_token(token);
                parse_block(doc, lexer, li);
            }
        }
    }
}

fn parse_definition_list(doc: &mut Document, lexer: &mut Lexer, dl: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, dl);
                break;
            }
        };

        match handle_common_end(doc, lexer, dl, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        match doc[token].data {
            NodeData::Comment(_)
            | NodeData::ProcInstr(_)
            | NodeData::Asp(_)
            | NodeData::Jste(_)
            | NodeData::Php(_) => {
                doc.append(dl, token);
            }
            NodeData::Elem(ref e) if e.is_elem("dt") || e.is_elem("dd") => {
                append_elem(doc, dl, token);
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::Elem(ref e) if e.is_elem("li") => {
                doc.report(ReportCode::ReplacingElement, token, &["li", "dd"]);
                {
                    let tag = lookup_tag("dd", &doc.config);
                    let elem = doc[token].as_element_mut().unwrap();
                    elem.name = "dd".into();
                    elem.tag = tag;
                }
                append_elem(doc, dl, token);
                parse_tag(doc, lexer, token, LexMode::MixedContent);
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => {
                doc.report(ReportCode::MissingStarttag, token, &["dd"]);
                let dd = infer_element(doc, "dd");
                doc.append(dl, dd);
                lexer.unget_token(token);
                parse_block(doc, lexer, dd);
            }
        }
    }
}

fn parse_table(doc: &mut Document, lexer: &mut Lexer, table: NodeId) {
    let base = lexer.defer_dup();

    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, table);
                break;
            }
        };

        match handle_common_end(doc, lexer, table, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        let table_part = doc[token].has_model(CM_TABLE | CM_ROWGRP | CM_ROW)
            && matches!(doc[token].data, NodeData::Elem(_));
        if table_part {
            append_elem(doc, table, token);
            parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("td") || e.is_elem("th") => {
                // cell without a row
                doc.report(ReportCode::MissingStarttag, token, &["tr"]);
                let tr = infer_element(doc, "tr");
                doc.append(table, tr);
                lexer.unget_token(token);
                parse_row(doc, lexer, tr);
            }
            NodeData::Elem(ref e) if e.is_elem("table") => {
                doc.report(ReportCode::CantBeNested, token, &["<table>"]);
                lexer.unget_token(token);
                doc[table].closed = true;
                break;
            }
            NodeData::Text(_) => {
                // exile raw text before the table
                doc.report(ReportCode::TagNotAllowedIn, token, &["plain text", "table"]);
                doc.insert_before(table, token);
            }
            NodeData::Elem(_) => {
                let inline = doc[token].has_model(CM_INLINE);
                let name = elem_name(doc, token);
                doc.report(ReportCode::TagNotAllowedIn, token, &[
                    &format!("<{}>", name),
                    "table",
                ]);
                if inline {
                    // inline content moves in front of the table
                    doc.insert_before(table, token);
                    parse_tag(doc, lexer, token, LexMode::MixedContent);
                } else {
                    // block content gets a synthetic row and cell
                    let tr = infer_element(doc, "tr");
                    doc.append(table, tr);
                    let td = infer_element(doc, "td");
                    doc.append(tr, td);
                    lexer.unget_token(token);
                    parse_block(doc, lexer, td);
                }
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(table, token),
        }
    }

    lexer.restore_stack_base(base);
}

fn parse_colgroup(doc: &mut Document, lexer: &mut Lexer, colgroup: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        match handle_common_end(doc, lexer, colgroup, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("col") => {
                append_elem(doc, colgroup, token);
            }
            NodeData::Comment(_) => doc.append(colgroup, token),
            _ => {
                lexer.unget_token(token);
                break;
            }
        }
    }
}

fn parse_row_group(doc: &mut Document, lexer: &mut Lexer, group: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        match handle_common_end(doc, lexer, group, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("tr") => {
                append_elem(doc, group, token);
                parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            }
            NodeData::Elem(ref e) if e.is_elem("td") || e.is_elem("th") => {
                doc.report(ReportCode::MissingStarttag, token, &["tr"]);
                let tr = infer_element(doc, "tr");
                doc.append(group, tr);
                lexer.unget_token(token);
                parse_row(doc, lexer, tr);
            }
            NodeData::Elem(ref e)
                if e.has_model(CM_ROWGRP) || e.is_elem("caption") || e.is_elem("colgroup") =>
            {
                // a sibling group opens: this one is done
                lexer.unget_token(token);
                break;
            }
            NodeData::Comment(_) => doc.append(group, token),
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => {
                lexer.unget_token(token);
                break;
            }
        }
    }
}

fn parse_row(doc: &mut Document, lexer: &mut Lexer, row: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        match handle_common_end(doc, lexer, row, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("td") || e.is_elem("th") => {
                append_elem(doc, row, token);
                parse_cell(doc, lexer, token);
            }
            NodeData::Elem(ref e) if e.is_elem("tr") => {
                // new row implicitly closes this one
                lexer.unget_token(token);
                break;
            }
            NodeData::Elem(ref e) if e.has_model(CM_ROWGRP) || e.is_elem("caption") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::EndTag(ref e) if e.is_elem("td") || e.is_elem("th") => {
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!(
                    "</{}>",
                    e.name
                )]);
            }
            NodeData::Comment(_) => doc.append(row, token),
            _ => {
                // content outside any cell
                doc.report(ReportCode::MissingStarttag, token, &["td"]);
                let td = infer_element(doc, "td");
                doc.append(row, td);
                lexer.unget_token(token);
                parse_block(doc, lexer, td);
            }
        }
    }
}

fn parse_cell(doc: &mut Document, lexer: &mut Lexer, cell: NodeId) {
    let mut checkstack = true;
    let mut mode = LexMode::IgnoreWhitespace;
    loop {
        let token = match lexer.get_token(doc, mode) {
            Some(t) => t,
            None => break,
        };

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("td") || e.is_elem("th") => {
                // a new cell closes this one
                lexer.unget_token(token);
                break;
            }
            NodeData::Elem(ref e) if e.is_elem("tr") || e.has_model(CM_ROWGRP) => {
                lexer.unget_token(token);
                break;
            }
            NodeData::EndTag(ref e) if e.is_elem("tr") || e.is_elem("table") => {
                lexer.unget_token(token);
                break;
            }
            _ => {}
        }

        match handle_common_end(doc, lexer, cell, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        let is_text = doc[token].data.is_text();
        let is_inline = doc[token].has_model(CM_INLINE)
            && matches!(doc[token].data, NodeData::Elem(_));

        if (is_text || is_inline) && checkstack {
            checkstack = false;
            if lexer.inline_open() {
                lexer.unget_token(token);
                lexer.inline_dup(doc);
                continue;
            }
        }

        if is_text {
            doc.append(cell, token);
            mode = LexMode::MixedContent;
            continue;
        }

        match doc[token].data {
            NodeData::Elem(_) => {
                append_elem(doc, cell, token);
                if is_inline {
                    lexer.push_inline(doc, token);
                } else {
                    checkstack = true;
                }
                parse_tag(doc, lexer, token, mode);
                mode = LexMode::MixedContent;
            }
            NodeData::EndTag(_) => {
                let name = elem_name(doc, token);
                lexer.pop_inline(doc, Some(token));
                doc.report(ReportCode::DiscardingUnexpected, token, &[&format!("</{}>", name)]);
            }
            _ => doc.append(cell, token),
        }
    }
}

fn parse_select(doc: &mut Document, lexer: &mut Lexer, select: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, select);
                break;
            }
        };

        match handle_common_end(doc, lexer, select, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        if discard_if_unknown(doc, token) {
            continue;
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("option") || e.is_elem("optgroup") => {
                append_elem(doc, select, token);
                parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            }
            NodeData::Comment(_) => doc.append(select, token),
            _ => {
                let name = elem_name(doc, token);
                doc.report(ReportCode::DiscardingUnexpected, token, &[&name]);
            }
        }
    }
}

fn parse_optgroup(doc: &mut Document, lexer: &mut Lexer, optgroup: NodeId) {
    loop {
        let token = match lexer.get_token(doc, LexMode::IgnoreWhitespace) {
            Some(t) => t,
            None => break,
        };

        match handle_common_end(doc, lexer, optgroup, token) {
            Flow::Closed => break,
            Flow::Consumed => continue,
            Flow::Open => {}
        }

        match doc[token].data {
            NodeData::Elem(ref e) if e.is_elem("option") => {
                append_elem(doc, optgroup, token);
                parse_tag(doc, lexer, token, LexMode::IgnoreWhitespace);
            }
            NodeData::Elem(ref e) if e.is_elem("optgroup") => {
                lexer.unget_token(token);
                break;
            }
            NodeData::Comment(_) => doc.append(optgroup, token),
            _ => {
                lexer.unget_token(token);
                break;
            }
        }
    }
}

/// Single text-bearing elements: title, option, textarea.
fn parse_text(doc: &mut Document, lexer: &mut Lexer, element: NodeId, mode: LexMode) {
    let ename = elem_name(doc, element);
    loop {
        let token = match lexer.get_token(doc, mode) {
            Some(t) => t,
            None => {
                missing_end_tag(doc, element);
                break;
            }
        };

        match doc[token].data {
            NodeData::Text(_) => {
                doc.append(element, token);
            }
            NodeData::EndTag(ref e) if e.is_elem(&ename) => {
                doc[element].closed = true;
                break;
            }
            _ => {
                // anything else ends the element
                if !doc[element].has_model(CM_OPT) {
                    doc.report(ReportCode::MissingEndtagFor, element, &[&ename]);
                }
                lexer.unget_token(token);
                break;
            }
        }
    }
}

/// Script and style bodies are opaque character data up to the matching
/// end tag.
fn parse_script(doc: &mut Document, lexer: &mut Lexer, element: NodeId) {
    let ename = elem_name(doc, element);
    let is_js = is_javascript(doc, element);
    if let Some(text) = lexer.read_cdata(doc, &ename, is_js) {
        doc.append(element, text);
    }
    if let Some(token) = lexer.get_token(doc, LexMode::IgnoreWhitespace) {
        if token_is_end_named(doc, token, &ename) {
            doc[element].closed = true;
        } else {
            doc.report(ReportCode::MissingEndtagFor, element, &[&ename]);
            lexer.unget_token(token);
        }
    } else {
        doc.report(ReportCode::MissingEndtagFor, element, &[&ename]);
    }
}

/// A `<script>` body is JavaScript when no language/type attribute says
/// otherwise.
fn is_javascript(doc: &Document, element: NodeId) -> bool {
    let e = match doc[element].as_element() {
        Some(e) => e,
        None => return false,
    };
    if e.is_elem("style") {
        return false;
    }
    match (e.attr("language"), e.attr("type")) {
        (None, None) => true,
        (lang, typ) => {
            let check = |v: &tendril::StrTendril| {
                let v = v.to_ascii_lowercase();
                v.contains("javascript") || v.contains("ecmascript") || v.contains("jscript")
            };
            lang.map_or(false, |v| check(v)) || typ.map_or(false, |v| check(v))
        }
    }
}

// DOCTYPE recognition: W3C and IETF public identifiers and the HTML
// versions they declare.
static FPI_TABLE: &[(&str, u16)] = &[
    ("-//W3C//DTD HTML 4.01//EN", VERS_HTML40_STRICT),
    ("-//W3C//DTD HTML 4.01 Transitional//EN", VERS_HTML40_LOOSE),
    ("-//W3C//DTD HTML 4.01 Frameset//EN", VERS_FRAMESET),
    ("-//W3C//DTD HTML 4.0//EN", VERS_HTML40_STRICT),
    ("-//W3C//DTD HTML 4.0 Transitional//EN", VERS_HTML40_LOOSE),
    ("-//W3C//DTD HTML 4.0 Frameset//EN", VERS_FRAMESET),
    ("-//W3C//DTD XHTML 1.0 Strict//EN", VERS_HTML40_STRICT),
    ("-//W3C//DTD XHTML 1.0 Transitional//EN", VERS_HTML40_LOOSE),
    ("-//W3C//DTD XHTML 1.0 Frameset//EN", VERS_FRAMESET),
    ("-//W3C//DTD HTML 3.2//EN", VERS_HTML32),
    ("-//W3C//DTD HTML 3.2 Final//EN", VERS_HTML32),
    ("-//W3C//DTD HTML 3.2 Draft//EN", VERS_HTML32),
    ("-//IETF//DTD HTML 2.0//EN", VERS_HTML20),
    ("-//IETF//DTD HTML//EN", VERS_HTML20),
    ("-//W3C//DTD HTML 2.0//EN", VERS_HTML20),
];

/// The version a public identifier declares, if recognized.
pub fn version_from_fpi(fpi: &str) -> u16 {
    FPI_TABLE
        .iter()
        .find(|(s, _)| s.eq_ignore_ascii_case(fpi))
        .map(|&(_, v)| v)
        .unwrap_or(0)
}

/// Most specific version consistent with the content seen.
pub fn apparent_version(doc: &Document) -> u16 {
    for &v in &[
        VERS_HTML40_STRICT,
        VERS_HTML40_LOOSE,
        VERS_FRAMESET,
        VERS_HTML32,
        VERS_HTML20,
    ] {
        if doc.versions & v != 0 {
            return v;
        }
    }
    0
}

pub fn version_name(vers: u16) -> &'static str {
    match vers {
        VERS_HTML20 => "HTML 2.0",
        VERS_HTML32 => "HTML 3.2",
        VERS_HTML40_STRICT => "HTML 4.01",
        VERS_HTML40_LOOSE => "HTML 4.01 Transitional",
        VERS_FRAMESET => "HTML 4.01 Frameset",
        _ => "HTML Proprietary",
    }
}

/// Extract the quoted public identifier from a lexed DOCTYPE body.
pub fn doctype_fpi(doc: &Document, dt: NodeId) -> Option<String> {
    let span = match doc[dt].data {
        NodeData::Doctype(span) => span,
        _ => return None,
    };
    let text = doc.buf_str(span);
    let upper = text.to_ascii_uppercase();
    let pos = upper.find("PUBLIC")?;
    let rest = &text[pos + "PUBLIC".len()..];
    let mut chars = rest.char_indices().skip_while(|&(_, c)| c.is_whitespace());
    let (start, quote) = chars.next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let rest2 = &rest[start + 1..];
    let end = rest2.find(quote)?;
    Some(rest2[..end].to_string())
}

/// Match the declared DOCTYPE against the versions the content allows,
/// record the detected version, and report inconsistencies.
fn resolve_doctype(doc: &mut Document) {
    let dt = doc
        .children(Document::DOCUMENT_NODE_ID)
        .find(|&id| matches!(doc[id].data, NodeData::Doctype(_)));

    let apparent = apparent_version(doc);
    doc.doctype = apparent;

    if let Some(dt) = dt {
        if let Some(fpi) = doctype_fpi(doc, dt) {
            let declared = version_from_fpi(&fpi);
            let (line, column) = (doc[dt].line, doc[dt].column);
            doc.report_at(ReportCode::DoctypeGiven, line, column, &[&fpi]);
            if declared != 0 {
                if doc.versions & declared == 0 {
                    doc.report_at(ReportCode::InconsistentVersion, line, column, &[]);
                } else {
                    doc.doctype = declared;
                }
            }
        }
    } else {
        doc.report_at(ReportCode::MissingDoctype, 1, 1, &[]);
    }

    let name = version_name(doc.doctype);
    doc.report_at(ReportCode::ReportVersion, 1, 1, &[name]);
}
