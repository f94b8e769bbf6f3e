//! The pretty printer: walks the tree depth-first and emits indented,
//! wrapped markup through the output transcoder.
//!
//! A line buffer of code points carries one logical output line at a
//! time; a wrap point marks where the line may break, and indentation is
//! prepended when the line is flushed.

use crate::chars::{is_cjk_break_after, is_cjk_break_before};
use crate::config::{AutoBool, Config, Encoding};
use crate::dom::meta::{
    AttrCheck, lookup_attr, CM_BLOCK, CM_DEFLIST, CM_EMPTY, CM_FIELD, CM_FRAMES, CM_HEADING,
    CM_HTML, CM_INLINE, CM_LIST, CM_OBJECT, CM_OPT, CM_ROW, CM_ROWGRP, CM_TABLE,
};
use crate::dom::{Attr, Document, NodeData, NodeId, ServerKind, Span};
use crate::entities::entity_name;
use crate::stream::{want_output_bom, StreamOut};

// print modes
const NORMAL: u32 = 0;
const PREFORMATTED: u32 = 1;
const COMMENT: u32 = 2;
const ATTRIBVALUE: u32 = 4;
const NOWRAP: u32 = 8;
const CDATA_MODE: u32 = 16;

/// Tree-to-bytes serializer over a [`StreamOut`].
pub struct Printer {
    out: StreamOut,
    linebuf: Vec<char>,
    wraphere: usize,

    wrap: u32,
    indent_spaces: u32,
    quote_marks: bool,
    quote_nbsp: bool,
    quote_ampersand: bool,
    numeric_entities: bool,
    xml_out: bool,
    xhtml_out: bool,
    xml_tags: bool,
    hide_comments: bool,
    hide_endtags: bool,
    break_before_br: bool,
    uppercase_tags: bool,
    uppercase_attributes: bool,
    literal_attributes: bool,
    wrap_sections: bool,
    wrap_asp: bool,
    wrap_jste: bool,
    wrap_php: bool,
    wrap_script_literals: bool,
    wrap_attributes: bool,
    indent_attributes: bool,
    escape_cdata: bool,
    indent_cdata: bool,
    indent_mode: AutoBool,
    body_only: bool,
    cjk: bool,
    escape_above: u32,
    versions: u16,
}

impl Printer {
    pub fn new(config: &Config, versions: u16, out: StreamOut) -> Printer {
        let escape_above = match config.output_encoding {
            Encoding::Ascii => 126,
            Encoding::Latin0 | Encoding::Latin1 | Encoding::Win1252 | Encoding::Mac
            | Encoding::Ibm858 => 255,
            _ => u32::MAX,
        };
        let cjk = config.output_encoding == Encoding::Utf8
            && config.language.as_deref().map_or(false, |l| {
                l.starts_with("zh") || l.starts_with("ja")
            });
        Printer {
            out,
            linebuf: Vec::with_capacity(256),
            wraphere: 0,
            wrap: config.wrap,
            indent_spaces: config.indent_spaces,
            quote_marks: config.quote_marks,
            quote_nbsp: config.quote_nbsp,
            quote_ampersand: config.quote_ampersand,
            numeric_entities: config.numeric_entities,
            xml_out: config.xml_out,
            xhtml_out: config.xhtml_out,
            xml_tags: config.xml_tags,
            hide_comments: config.hide_comments,
            hide_endtags: config.hide_endtags,
            break_before_br: config.break_before_br,
            uppercase_tags: config.uppercase_tags,
            uppercase_attributes: config.uppercase_attributes,
            literal_attributes: config.literal_attributes,
            wrap_sections: config.wrap_sections,
            wrap_asp: config.wrap_asp,
            wrap_jste: config.wrap_jste,
            wrap_php: config.wrap_php,
            wrap_script_literals: config.wrap_script_literals,
            wrap_attributes: config.wrap_attributes,
            indent_attributes: config.indent_attributes,
            escape_cdata: config.escape_cdata,
            indent_cdata: config.indent_cdata,
            indent_mode: config.indent,
            body_only: config.body_only,
            cjk,
            escape_above,
            versions,
        }
    }

    fn xml_output(&self) -> bool {
        self.xml_out || self.xhtml_out || self.xml_tags
    }

    /// Serialize the whole document (or only the body's children when so
    /// configured), with a BOM when the policy asks for one.
    pub fn print_document(&mut self, doc: &Document) {
        if want_output_bom(doc.config.output_bom, doc.input_had_bom) {
            self.out.write_bom();
        }
        if self.body_only {
            if let Some(body) = doc.body_elem() {
                for child in doc.children(body) {
                    self.print_tree(doc, child, 0, NORMAL);
                }
            }
        } else {
            for child in doc.children(Document::DOCUMENT_NODE_ID) {
                self.print_tree(doc, child, 0, NORMAL);
            }
        }
        self.cond_flush_line(0);
    }

    // --- line buffer ------------------------------------------------

    fn add_char(&mut self, c: char) {
        self.linebuf.push(c);
    }

    fn add_str(&mut self, s: &str) {
        for c in s.chars() {
            self.linebuf.push(c);
        }
    }

    /// Mark the current position as a wrap candidate, unless the line
    /// already overflows at this indent (the previous point then stays).
    fn set_wrap(&mut self, indent: u32) {
        if self.wrap == 0 || indent + (self.linebuf.len() as u32) < self.wrap {
            self.wraphere = self.linebuf.len();
        }
    }

    fn check_wrap_line(&mut self, indent: u32) {
        if self.wrap > 0
            && indent + self.linebuf.len() as u32 >= self.wrap
            && self.wraphere > 0
        {
            self.wrap_line(indent);
        }
    }

    fn wrap_line(&mut self, indent: u32) {
        let rest: Vec<char> = self.linebuf.split_off(self.wraphere);
        self.write_indent(indent);
        let line: String = self.linebuf.iter().collect();
        self.out.write_str(&line);
        self.out.write_char('\n');
        // drop the space the line broke at
        let skip = rest.iter().take_while(|&&c| c == ' ').count();
        self.linebuf = rest[skip..].to_vec();
        self.wraphere = 0;
    }

    fn write_indent(&mut self, indent: u32) {
        for _ in 0..indent {
            self.out.write_char(' ');
        }
    }

    fn flush_line(&mut self, indent: u32) {
        if !self.linebuf.is_empty() {
            self.write_indent(indent);
            let line: String = self.linebuf.iter().collect();
            self.out.write_str(&line);
            self.linebuf.clear();
        }
        self.out.write_char('\n');
        self.wraphere = 0;
    }

    fn cond_flush_line(&mut self, indent: u32) {
        if !self.linebuf.is_empty() {
            self.flush_line(indent);
        }
    }

    // --- character escapes ------------------------------------------

    fn print_char(&mut self, c: char, mode: u32, indent: u32) {
        if c == ' ' && mode & (PREFORMATTED | COMMENT | ATTRIBVALUE | CDATA_MODE) == 0 {
            self.set_wrap(indent);
            self.add_char(' ');
            self.check_wrap_line(indent);
            return;
        }

        if c == '\n' {
            if mode & PREFORMATTED != 0 {
                self.flush_line(indent);
            } else {
                self.add_char(' ');
                self.set_wrap(indent);
            }
            return;
        }

        if mode & (COMMENT | CDATA_MODE) != 0 {
            self.add_char(c);
            return;
        }

        if self.cjk && mode & (PREFORMATTED | NOWRAP) == 0 {
            if is_cjk_break_before(c) {
                self.set_wrap(indent);
                self.add_char(c);
                self.check_wrap_line(indent);
                return;
            }
            if is_cjk_break_after(c) {
                self.add_char(c);
                self.set_wrap(indent);
                self.check_wrap_line(indent);
                return;
            }
        }

        match c {
            '<' => {
                self.add_str("&lt;");
                return;
            }
            '>' => {
                self.add_str("&gt;");
                return;
            }
            '&' => {
                if self.quote_ampersand {
                    self.add_str("&amp;");
                } else {
                    self.add_char('&');
                }
                return;
            }
            '"' if self.quote_marks => {
                self.add_str("&quot;");
                return;
            }
            '\'' if self.quote_marks => {
                self.add_str("&#39;");
                return;
            }
            '\u{00A0}' if self.quote_nbsp => {
                if self.numeric_entities || self.xml_output() {
                    self.add_str("&#160;");
                } else {
                    self.add_str("&nbsp;");
                }
                return;
            }
            _ => {}
        }

        let cp = c as u32;
        if cp > self.escape_above {
            if !self.numeric_entities && !self.xml_out && !self.xml_tags {
                if let Some(name) = entity_name(cp, self.versions) {
                    self.add_char('&');
                    self.add_str(name);
                    self.add_char(';');
                    return;
                }
            }
            self.add_str(&format!("&#{};", cp));
            return;
        }

        self.add_char(c);
    }

    fn print_string(&mut self, s: &str, mode: u32, indent: u32) {
        for c in s.chars() {
            self.print_char(c, mode, indent);
        }
    }

    fn print_text(&mut self, doc: &Document, span: Span, mode: u32, indent: u32) {
        let text = doc.buf_str(span).to_string();
        self.print_string(&text, mode, indent);
    }

    // --- attributes -------------------------------------------------

    fn fold_name(&self, name: &str, upper: bool) -> String {
        if upper && !self.xml_output() {
            name.to_ascii_uppercase()
        } else {
            name.to_string()
        }
    }

    fn print_attrs(&mut self, doc: &Document, node: NodeId, indent: u32) {
        let elem = match doc[node].as_element() {
            Some(e) => e,
            None => return,
        };
        let attrs: Vec<Attr> = elem.attrs.clone();
        let drop_proprietary = doc.config.drop_proprietary_attributes;

        for attr in attrs {
            let name = match attr.name {
                Some(ref n) => n.to_string(),
                None => {
                    // attribute-position server markup
                    if let Some(value) = &attr.value {
                        self.set_wrap(indent);
                        self.add_char(' ');
                        match attr.server {
                            Some(ServerKind::Asp) => {
                                self.add_str("<%");
                                self.add_str(value);
                                self.add_str("%>");
                            }
                            Some(ServerKind::Php) => {
                                self.add_str("<?");
                                self.add_str(value);
                                self.add_str("?>");
                            }
                            None => {}
                        }
                        self.check_wrap_line(indent);
                    }
                    continue;
                }
            };

            let def = lookup_attr(&name);
            if drop_proprietary {
                if let Some(def) = def {
                    use crate::dom::meta::{VERS_ALL, VERS_XML};
                    if def.versions & (VERS_ALL | VERS_XML) == 0 {
                        continue;
                    }
                } else {
                    continue;
                }
            }

            if self.indent_attributes {
                self.flush_line(indent);
            }
            self.set_wrap(indent);
            self.add_char(' ');
            let shown = self.fold_name(&name, self.uppercase_attributes);
            self.add_str(&shown);

            let is_script = def.map_or(false, |d| d.how == AttrCheck::Script);
            match attr.value {
                Some(ref value) => {
                    let delim = match attr.delim {
                        b'\'' => '\'',
                        _ => '"',
                    };
                    self.add_char('=');
                    self.add_char(delim);
                    self.print_attr_value(value, delim, is_script, indent);
                    self.add_char(delim);
                }
                None => {
                    // boolean attributes get expanded for XML dialects
                    if self.xml_output() {
                        self.add_char('=');
                        self.add_char('"');
                        self.add_str(&shown.to_ascii_lowercase());
                        self.add_char('"');
                    }
                }
            }
            self.check_wrap_line(indent);
        }
    }

    fn print_attr_value(&mut self, value: &str, delim: char, is_script: bool, indent: u32) {
        let mut in_string = false;
        for c in value.chars() {
            if c == ' ' && !self.literal_attributes {
                if is_script && in_string {
                    // breaking a script string needs a continuation
                    if self.wrap_script_literals
                        && self.wrap > 0
                        && indent + self.linebuf.len() as u32 >= self.wrap
                    {
                        self.add_char('\\');
                        self.flush_line(indent);
                    }
                    self.add_char(' ');
                    continue;
                }
                if self.wrap_attributes {
                    self.set_wrap(indent);
                    self.add_char(' ');
                    self.check_wrap_line(indent);
                } else {
                    self.add_char(' ');
                }
                continue;
            }
            if is_script && (c == '"' || c == '\'') {
                in_string = !in_string;
            }
            match c {
                '<' => self.add_str("&lt;"),
                '>' => self.add_str("&gt;"),
                '&' => self.add_str("&amp;"),
                c if c == delim => {
                    if delim == '"' {
                        self.add_str("&quot;");
                    } else {
                        self.add_str("&#39;");
                    }
                }
                '\u{00A0}' if self.quote_nbsp => {
                    if self.numeric_entities || self.xml_output() {
                        self.add_str("&#160;");
                    } else {
                        self.add_str("&nbsp;");
                    }
                }
                c if (c as u32) > self.escape_above => {
                    let cp = c as u32;
                    if !self.numeric_entities {
                        if let Some(name) = entity_name(cp, self.versions) {
                            self.add_char('&');
                            self.add_str(name);
                            self.add_char(';');
                            continue;
                        }
                    }
                    self.add_str(&format!("&#{};", cp));
                }
                c => self.add_char(c),
            }
        }
    }

    // --- tags -------------------------------------------------------

    fn print_start_tag(&mut self, doc: &Document, node: NodeId, indent: u32, closed: bool) {
        let name = doc[node]
            .as_element()
            .map(|e| e.name.to_string())
            .unwrap_or_default();
        self.add_char('<');
        let shown = self.fold_name(&name, self.uppercase_tags);
        self.add_str(&shown);
        self.print_attrs(doc, node, indent);
        if closed {
            self.add_str(" />");
        } else {
            self.add_char('>');
        }
    }

    fn print_end_tag(&mut self, doc: &Document, node: NodeId) {
        let name = doc[node]
            .as_element()
            .map(|e| e.name.to_string())
            .unwrap_or_default();
        self.add_str("</");
        let shown = self.fold_name(&name, self.uppercase_tags);
        self.add_str(&shown);
        self.add_char('>');
    }

    // --- indent policy ----------------------------------------------

    fn is_inline_flow(&self, doc: &Document, node: NodeId) -> bool {
        match doc[node].data {
            NodeData::Text(_) => true,
            NodeData::Elem(ref e) => {
                e.has_model(CM_INLINE) && !e.is_elem("map")
            }
            NodeData::Asp(_) | NodeData::Jste(_) | NodeData::Php(_) => true,
            _ => false,
        }
    }

    fn is_blank_text(&self, doc: &Document, id: NodeId) -> bool {
        match doc[id].data {
            NodeData::Text(span) => doc
                .buf_str(span)
                .chars()
                .all(|c| c == ' ' || c == '\n' || c == '\t'),
            _ => false,
        }
    }

    /// Whitespace-only text adjacent to a block boundary carries no
    /// rendering weight and is dropped on output; between inline
    /// siblings it separates words and stays.
    fn skip_blank(&self, doc: &Document, id: NodeId) -> bool {
        if !self.is_blank_text(doc, id) {
            return false;
        }
        let prev_inline = doc[id]
            .prev_sibling()
            .map_or(false, |p| self.is_inline_flow(doc, p));
        let next_inline = doc[id]
            .next_sibling()
            .map_or(false, |n| self.is_inline_flow(doc, n));
        !(prev_inline && next_inline)
    }

    /// Should this element's children be indented one step deeper?
    fn should_indent(&self, doc: &Document, node: NodeId) -> bool {
        if self.indent_mode == AutoBool::No {
            return false;
        }
        let elem = match doc[node].as_element() {
            Some(e) => e,
            None => return false,
        };
        if elem.has_model(CM_HEADING | CM_EMPTY)
            || elem.is_elem("p")
            || elem.is_elem("title")
            || elem.is_elem("textarea")
            || elem.is_elem("pre")
        {
            return false;
        }
        let container = elem.has_model(
            CM_HTML | CM_BLOCK | CM_LIST | CM_DEFLIST | CM_TABLE | CM_ROW | CM_ROWGRP
                | CM_FIELD | CM_OBJECT | CM_FRAMES,
        ) || elem.is_elem("map")
            || elem.is_elem("head")
            || elem.is_elem("body");
        if !container {
            return false;
        }
        if doc[node].first_child().is_none() {
            return false;
        }
        if self.indent_mode == AutoBool::Auto {
            // mixed content stays unindented
            let has_text = doc
                .children(node)
                .any(|c| matches!(doc[c].data, NodeData::Text(_)) && !self.skip_blank(doc, c));
            if has_text {
                return false;
            }
        }
        true
    }

    // --- tree walk --------------------------------------------------

    fn print_tree(&mut self, doc: &Document, node: NodeId, indent: u32, mode: u32) {
        match doc[node].data {
            NodeData::Document => {
                for child in doc.children(node) {
                    self.print_tree(doc, child, indent, mode);
                }
            }
            NodeData::Text(span) => {
                self.print_text(doc, span, mode, indent);
            }
            NodeData::Comment(span) => {
                if self.hide_comments {
                    return;
                }
                if mode & PREFORMATTED == 0 {
                    self.cond_flush_line(indent);
                }
                self.add_str("<!--");
                self.print_text(doc, span, mode | COMMENT, indent);
                self.add_str("-->");
                if doc[node].linebreak {
                    self.flush_line(indent);
                }
            }
            NodeData::Doctype(span) => {
                self.cond_flush_line(indent);
                self.add_str("<!DOCTYPE ");
                let text = doc.buf_str(span).to_string();
                for c in text.chars() {
                    if c == '\n' {
                        self.flush_line(0);
                    } else {
                        self.add_char(c);
                    }
                }
                self.add_char('>');
                self.flush_line(indent);
            }
            NodeData::ProcInstr(span) => {
                self.cond_flush_line(indent);
                self.add_str("<?");
                self.print_text(doc, span, mode | CDATA_MODE, indent);
                self.add_str("?>");
                self.flush_line(indent);
            }
            NodeData::XmlDecl { ref attrs } => {
                self.cond_flush_line(indent);
                self.add_str("<?xml");
                // fixed order: version, encoding, standalone
                let attrs = attrs.clone();
                for key in &["version", "encoding", "standalone"] {
                    if let Some(attr) = attrs.iter().find(|a| a.is_named(key)) {
                        if let Some(v) = &attr.value {
                            self.add_str(&format!(" {}=\"{}\"", key, v));
                        }
                    }
                }
                self.add_str("?>");
                self.flush_line(indent);
            }
            NodeData::CData(span) => {
                if self.indent_cdata {
                    self.cond_flush_line(indent);
                } else if self.wrap_sections {
                    self.set_wrap(indent);
                }
                self.add_str("<![CDATA[");
                self.print_text(doc, span, mode | CDATA_MODE, indent);
                self.add_str("]]>");
                if self.indent_cdata {
                    self.flush_line(indent);
                }
            }
            NodeData::Section(span) => {
                if self.wrap_sections {
                    self.set_wrap(indent);
                }
                self.add_str("<![");
                self.print_text(doc, span, mode | CDATA_MODE, indent);
                self.add_str("]>");
            }
            NodeData::Asp(span) => {
                let m = if self.wrap_asp { mode } else { mode | NOWRAP };
                self.add_str("<%");
                self.print_text(doc, span, m | CDATA_MODE, indent);
                self.add_str("%>");
            }
            NodeData::Jste(span) => {
                let m = if self.wrap_jste { mode } else { mode | NOWRAP };
                self.add_str("<#");
                self.print_text(doc, span, m | CDATA_MODE, indent);
                self.add_str("#>");
            }
            NodeData::Php(span) => {
                let m = if self.wrap_php { mode } else { mode | NOWRAP };
                self.add_str("<?");
                self.print_text(doc, span, m | CDATA_MODE, indent);
                self.add_str("?>");
            }
            NodeData::EndTag(_) => {}
            NodeData::Elem(_) => self.print_element(doc, node, indent, mode),
        }
    }

    fn print_element(&mut self, doc: &Document, node: NodeId, indent: u32, mode: u32) {
        let (name, empty, self_closing) = {
            let e = doc[node].as_element().unwrap();
            (e.name.to_string(), e.has_model(CM_EMPTY), e.self_closing)
        };

        // script and style contents stay verbatim
        if name == "script" || name == "style" {
            self.print_script_like(doc, node, indent);
            return;
        }

        if name == "textarea" || is_pre_like(&name) {
            self.print_preformatted(doc, node, indent);
            return;
        }

        let inline = self.is_inline_flow(doc, node);

        if !inline && mode & PREFORMATTED == 0 {
            self.cond_flush_line(indent);
        }
        if name == "br" && self.break_before_br {
            self.cond_flush_line(indent);
        }

        if empty || (self_closing && doc[node].first_child().is_none() && self.xml_output()) {
            let xml_close = self.xml_output();
            self.print_start_tag(doc, node, indent, xml_close);
            if !inline && mode & PREFORMATTED == 0 {
                self.flush_line(indent);
            }
            return;
        }

        let indent_children = self.should_indent(doc, node);
        let content_indent = if indent_children {
            indent + self.indent_spaces
        } else {
            indent
        };

        self.print_start_tag(doc, node, indent, false);
        if indent_children {
            self.flush_line(indent);
        }

        for child in doc.children(node) {
            if mode & PREFORMATTED == 0 && self.skip_blank(doc, child) {
                continue;
            }
            self.print_tree(doc, child, content_indent, mode);
        }

        if indent_children {
            self.cond_flush_line(content_indent);
        }

        let omit_end = self.hide_endtags
            && doc[node].has_model(CM_OPT)
            && !self.xml_output();
        if !omit_end {
            self.print_end_tag(doc, node);
        }
        if !inline && mode & PREFORMATTED == 0 {
            self.flush_line(indent);
        }
    }

    fn print_preformatted(&mut self, doc: &Document, node: NodeId, indent: u32) {
        self.cond_flush_line(indent);
        self.print_start_tag(doc, node, indent, false);
        self.flush_line(indent);
        for child in doc.children(node) {
            self.print_tree(doc, child, 0, PREFORMATTED | NOWRAP);
        }
        self.print_end_tag(doc, node);
        self.flush_line(indent);
    }

    fn print_script_like(&mut self, doc: &Document, node: NodeId, indent: u32) {
        self.cond_flush_line(indent);
        self.print_start_tag(doc, node, indent, false);

        let is_style = doc[node].is_elem("style");
        let content: String = doc
            .children(node)
            .filter_map(|c| match doc[c].data {
                NodeData::Text(span) => Some(doc.buf_str(span).to_string()),
                _ => None,
            })
            .collect();

        let wrap_cdata = (self.xhtml_out || self.xml_out)
            && self.escape_cdata
            && !content.contains("<![CDATA[");

        if !content.is_empty() {
            self.flush_line(indent);
            if wrap_cdata {
                if is_style {
                    self.add_str("/*<![CDATA[*/");
                } else {
                    self.add_str("//<![CDATA[");
                }
                self.flush_line(indent);
            }
            for c in content.chars() {
                if c == '\n' {
                    self.flush_line(0);
                } else {
                    self.add_char(c);
                }
            }
            self.cond_flush_line(0);
            if wrap_cdata {
                if is_style {
                    self.add_str("/*]]>*/");
                } else {
                    self.add_str("//]]>");
                }
                self.flush_line(indent);
            }
        }

        self.print_end_tag(doc, node);
        self.flush_line(indent);
    }
}

fn is_pre_like(name: &str) -> bool {
    matches!(name, "pre" | "listing" | "xmp" | "plaintext")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Newline};
    use crate::logger::ensure_logger;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl crate::stream::Sink for SharedSink {
        fn put_byte(&mut self, b: u8) {
            self.0.borrow_mut().push(b);
        }
    }

    pub(crate) fn print_to_string(doc: &Document) -> String {
        let sink = SharedSink::default();
        let out = StreamOut::new(
            Box::new(sink.clone()),
            doc.config.output_encoding,
            Newline::Lf,
        );
        let mut printer = Printer::new(&doc.config, doc.versions, out);
        printer.print_document(doc);
        let bytes = sink.0.borrow().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn build_simple() -> Document {
        let mut config = Config::default();
        config.output_encoding = Encoding::Utf8;
        let mut doc = Document::new(config);
        let html = doc.append_child(
            Document::DOCUMENT_NODE_ID,
            crate::dom::Node::new_element(
                "html",
                crate::dom::meta::lookup_tag("html", &doc.config),
            ),
        );
        let body = doc.append_child(
            html,
            crate::dom::Node::new_element(
                "body",
                crate::dom::meta::lookup_tag("body", &doc.config),
            ),
        );
        let p = doc.append_child(
            body,
            crate::dom::Node::new_element("p", crate::dom::meta::lookup_tag("p", &doc.config)),
        );
        let span = doc.buf_push_str("hello");
        doc.append_child(p, crate::dom::Node::new(NodeData::Text(span)));
        doc
    }

    #[test]
    fn simple_layout() {
        ensure_logger();
        let doc = build_simple();
        let out = print_to_string(&doc);
        assert_eq!("<html>\n  <body>\n    <p>hello</p>\n  </body>\n</html>\n", out);
    }

    #[test]
    fn escapes() {
        ensure_logger();
        let mut doc = build_simple();
        let p = doc
            .nodes()
            .find(|&id| doc[id].is_elem("p"))
            .unwrap();
        let span = doc.buf_push_str(" a<b&c");
        doc.append_child(p, crate::dom::Node::new(NodeData::Text(span)));
        let out = print_to_string(&doc);
        assert!(out.contains("a&lt;b&amp;c"), "got: {}", out);
    }

    #[test]
    fn ascii_output_uses_entities() {
        ensure_logger();
        let mut doc = build_simple();
        doc.config.output_encoding = Encoding::Ascii;
        let p = doc.nodes().find(|&id| doc[id].is_elem("p")).unwrap();
        let span = doc.buf_push_str("\u{00A9}");
        doc.append_child(p, crate::dom::Node::new(NodeData::Text(span)));
        let out = print_to_string(&doc);
        assert!(out.contains("&copy;"), "got: {}", out);
    }

    #[test]
    fn numeric_entities_option() {
        ensure_logger();
        let mut doc = build_simple();
        doc.config.output_encoding = Encoding::Ascii;
        doc.config.numeric_entities = true;
        let p = doc.nodes().find(|&id| doc[id].is_elem("p")).unwrap();
        let span = doc.buf_push_str("\u{00A9}");
        doc.append_child(p, crate::dom::Node::new(NodeData::Text(span)));
        let out = print_to_string(&doc);
        assert!(out.contains("&#169;"), "got: {}", out);
    }

    #[test]
    fn wrapping() {
        ensure_logger();
        let mut doc = build_simple();
        doc.config.wrap = 20;
        let p = doc.nodes().find(|&id| doc[id].is_elem("p")).unwrap();
        let span = doc.buf_push_str("one two three four five six seven");
        doc.append_child(p, crate::dom::Node::new(NodeData::Text(span)));
        let out = print_to_string(&doc);
        for line in out.lines() {
            assert!(line.len() <= 24, "line too long: {:?}", line);
        }
    }

    #[test]
    fn xhtml_empty_elements() {
        ensure_logger();
        let mut doc = build_simple();
        doc.config.xhtml_out = true;
        let p = doc.nodes().find(|&id| doc[id].is_elem("p")).unwrap();
        doc.append_child(
            p,
            crate::dom::Node::new_element("br", crate::dom::meta::lookup_tag("br", &doc.config)),
        );
        let out = print_to_string(&doc);
        assert!(out.contains("<br />"), "got: {}", out);
    }

    #[test]
    fn hide_comments_option() {
        ensure_logger();
        let mut doc = build_simple();
        doc.config.hide_comments = true;
        let body = doc.body_elem().unwrap();
        let span = doc.buf_push_str(" hidden ");
        doc.append_child(body, crate::dom::Node::new(NodeData::Comment(span)));
        let out = print_to_string(&doc);
        assert!(!out.contains("hidden"), "got: {}", out);
    }

    #[test]
    fn attributes_and_booleans() {
        ensure_logger();
        let mut doc = build_simple();
        let p = doc.nodes().find(|&id| doc[id].is_elem("p")).unwrap();
        if let Some(e) = doc[p].as_element_mut() {
            e.attrs.push(Attr::new("class", Some("x y".into()), b'"'));
        }
        let out = print_to_string(&doc);
        assert!(out.contains("<p class=\"x y\">"), "got: {}", out);
    }
}
