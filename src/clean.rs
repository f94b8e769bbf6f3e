//! Cleanup passes: distill presentational markup into style rules, scrub
//! Word 2000 output, and prepare the tree for printing.
//!
//! Passes run in a fixed order and reach a fixpoint: a second run leaves
//! the tree unchanged.

use log::debug;

use crate::config::DoctypeMode;
use crate::dom::meta::{
    lookup_tag, CM_BLOCK, CM_DEFLIST, CM_INLINE, CM_LIST, CM_ROW, CM_TABLE, VERS_FRAMESET,
    VERS_HTML20, VERS_HTML32, VERS_HTML40_LOOSE, VERS_HTML40_STRICT,
};
use crate::dom::filter::Action;
use crate::dom::{Attr, Document, Node, NodeData, NodeId, StyleRule};
use crate::parser::apparent_version;
use crate::report::ReportCode;

/// Run the whole cleanup sequence appropriate for the configuration.
pub fn clean_and_repair(doc: &mut Document) {
    coerce_obsolete_lists(doc);
    nested_emphasis(doc);
    if doc.config.logical_emphasis {
        em_from_i(doc);
    }
    list_to_bq(doc);
    bq_to_div(doc);
    if (doc.config.word_2000 || doc.config.make_bare) && is_word_2000(doc) {
        drop_sections(doc);
        clean_word_2000(doc);
    }
    if doc.config.make_clean || doc.config.drop_font_tags {
        clean_presentation(doc);
    }
    if doc.config.make_bare {
        bare_document(doc);
    }
    bump_object(doc);
    fix_brakes(doc);
    verify_http_equiv(doc);
    fix_xhtml_namespace(doc);
    fix_doctype(doc);
    add_generator(doc);
    fix_xml_space(doc);
    fix_xml_decl(doc);
}

/// `tidy-mark`: note the tool in a generator meta, replacing an earlier
/// one of ours.
fn add_generator(doc: &mut Document) {
    if !doc.config.tidy_mark {
        return;
    }
    let head = match doc.head_elem() {
        Some(h) => h,
        None => return,
    };
    let content = concat!("preen ", env!("CARGO_PKG_VERSION"));
    let existing = doc.children(head).find(|&id| {
        doc[id].is_elem("meta")
            && doc[id]
                .attr("name")
                .map_or(false, |v| v.eq_ignore_ascii_case("generator"))
            && doc[id].attr("content").map_or(false, |v| v.starts_with("preen"))
    });
    match existing {
        Some(meta) => {
            if let Some(e) = doc[meta].as_element_mut() {
                e.set_attr("content", content);
            }
        }
        None => {
            let tag = lookup_tag("meta", &doc.config);
            let mut meta = Node::new_element("meta", tag);
            meta.implicit = true;
            if let NodeData::Elem(ref mut e) = meta.data {
                e.attrs.push(Attr::new("name", Some("generator".into()), b'"'));
                e.attrs.push(Attr::new("content", Some(content.into()), b'"'));
            }
            let id = doc.push_node(meta);
            if let Some(first) = doc[head].first_child() {
                doc.insert_before(first, id);
            } else {
                doc.append(head, id);
            }
        }
    }
}

/// `add-xml-space`: mark whitespace-sensitive elements for XML tools.
fn fix_xml_space(doc: &mut Document) {
    if !doc.config.xml_space {
        return;
    }
    doc.filter(|doc, id| {
        let wants_preserve = doc[id].is_elem("pre")
            || doc[id].is_elem("textarea")
            || doc[id].is_elem("script")
            || doc[id].is_elem("style");
        if wants_preserve && doc[id].attr("xml:space").is_none() {
            if let Some(e) = doc[id].as_element_mut() {
                e.set_attr("xml:space", "preserve");
            }
        }
        Action::Continue
    });
}

const XHTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// XHTML output carries the XHTML namespace on `<html>`.
fn fix_xhtml_namespace(doc: &mut Document) {
    if !doc.config.xhtml_out {
        return;
    }
    if let Some(html) = doc.html_elem() {
        if let Some(e) = doc[html].as_element_mut() {
            e.set_attr("xmlns", XHTML_NAMESPACE);
        }
    }
}

fn is_attached(doc: &Document, id: NodeId) -> bool {
    doc.node_and_ancestors(id)
        .any(|a| a == Document::DOCUMENT_NODE_ID)
}

fn all_elements(doc: &Document) -> Vec<NodeId> {
    doc.nodes()
        .filter(|&id| doc[id].as_element().is_some())
        .collect()
}

fn rename_elem(doc: &mut Document, node: NodeId, name: &str) {
    let tag = lookup_tag(name, &doc.config);
    if let Some(e) = doc[node].as_element_mut() {
        e.name = name.into();
        e.tag = tag;
    }
}

fn has_one_child(doc: &Document, node: NodeId) -> bool {
    match doc[node].first_child() {
        Some(c) => doc[c].next_sibling().is_none(),
        None => false,
    }
}

/// Append a property to the node's `style` attribute, creating it as
/// needed.
fn add_style_property(doc: &mut Document, node: NodeId, property: &str) {
    let elem = match doc[node].as_element_mut() {
        Some(e) => e,
        None => return,
    };
    match elem.get_attr_mut("style") {
        Some(attr) => {
            let mut s = attr.value.take().unwrap_or_default().to_string();
            if !s.is_empty() && !s.trim_end().ends_with(';') {
                s.push_str("; ");
            }
            s.push_str(property);
            attr.value = Some(s.into());
        }
        None => {
            elem.attrs.push(Attr::new("style", Some(property.into()), b'"'));
        }
    }
}

/// Merge a child's style and class attributes into its parent before the
/// child is stripped.
fn merge_styles(doc: &mut Document, node: NodeId, child: NodeId) {
    let style = doc[child].attr("style").map(|v| v.to_string());
    let class = doc[child].attr("class").map(|v| v.to_string());
    if let Some(style) = style {
        add_style_property(doc, node, &style);
    }
    if let Some(class) = class {
        add_class(doc, node, &class);
    }
}

fn add_class(doc: &mut Document, node: NodeId, classname: &str) {
    let elem = match doc[node].as_element_mut() {
        Some(e) => e,
        None => return,
    };
    match elem.get_attr_mut("class") {
        Some(attr) => {
            let mut s = attr.value.take().unwrap_or_default().to_string();
            s.push('_');
            s.push_str(classname);
            attr.value = Some(s.into());
        }
        None => {
            elem.attrs.push(Attr::new("class", Some(classname.into()), b'"'));
        }
    }
}

/// Replace a node's only child with the child's own children.
fn strip_only_child(doc: &mut Document, node: NodeId) {
    if let Some(child) = doc[node].first_child() {
        doc.fold(child);
    }
}

// font size codes to CSS relative sizes
fn font_size_to_css(size: &str) -> Option<String> {
    let size = size.trim();
    let bytes = size.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    match bytes[0] {
        b'0'..=b'6' => {
            let n = (bytes[0] - b'0') as usize;
            static SIZES: [Option<&str>; 7] =
                [Some("60%"), Some("70%"), Some("80%"), None, Some("120%"), Some("150%"), Some("200%")];
            SIZES[n].map(|s| s.to_string())
        }
        b'-' => {
            if bytes.len() > 1 && bytes[1].is_ascii_digit() && bytes[1] <= b'6' {
                let n = (bytes[1] - b'0') as u32;
                let x = 0.8f64.powi(n as i32) * 100.0;
                Some(format!("{}%", x as u32))
            } else {
                Some("smaller".to_string())
            }
        }
        b'+' => {
            if bytes.len() > 1 && bytes[1].is_ascii_digit() && bytes[1] <= b'6' {
                let n = (bytes[1] - b'0') as u32;
                let x = 1.2f64.powi(n as i32) * 100.0;
                Some(format!("{}%", x as u32))
            } else {
                Some("larger".to_string())
            }
        }
        _ => None,
    }
}

/// Apply `face`, `size` and `color` attributes of a font element as style
/// properties of `node`. A size 4..6 font directly inside `<p>` promotes
/// the paragraph to a heading instead.
fn add_font_styles(doc: &mut Document, node: NodeId, attrs: &[(String, String)]) {
    for (name, value) in attrs {
        match &name[..] {
            "face" => add_style_property(doc, node, &format!("font-family: {}", value)),
            "color" => add_style_property(doc, node, &format!("color: {}", value)),
            "size" => {
                if doc[node].is_elem("p") {
                    let heading = match value.trim() {
                        "6" => Some("h1"),
                        "5" => Some("h2"),
                        "4" => Some("h3"),
                        _ => None,
                    };
                    if let Some(h) = heading {
                        rename_elem(doc, node, h);
                        continue;
                    }
                }
                if let Some(css) = font_size_to_css(value) {
                    add_style_property(doc, node, &format!("font-size: {}", css));
                }
            }
            _ => {}
        }
    }
}

fn font_attrs(doc: &Document, node: NodeId) -> Vec<(String, String)> {
    doc[node]
        .as_element()
        .map(|e| {
            e.attrs
                .iter()
                .filter_map(|a| match (&a.name, &a.value) {
                    (Some(n), Some(v)) => Some((n.to_string(), v.to_string())),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `align=X` becomes `text-align: x` on non-table elements.
fn text_align(doc: &mut Document, node: NodeId) {
    let value = {
        let elem = match doc[node].as_element_mut() {
            Some(e) => e,
            None => return,
        };
        match elem.remove_attr("align") {
            Some(attr) => attr.value.map(|v| v.to_lowercase()),
            None => return,
        }
    };
    if let Some(v) = value {
        add_style_property(doc, node, &format!("text-align: {}", v));
    }
}

// One rule application per call; returns true if the tree changed.

/// `<dir><li>…</li></dir>` with a sole implicit item becomes an indented
/// `<div>`.
fn dir_to_div(doc: &mut Document, node: NodeId) -> bool {
    if !(doc[node].is_elem("dir") || doc[node].is_elem("ul") || doc[node].is_elem("ol")) {
        return false;
    }
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if doc[child].next_sibling().is_some() || !doc[child].is_elem("li") || !doc[child].implicit {
        return false;
    }
    rename_elem(doc, node, "div");
    add_style_property(doc, node, "margin-left: 2em");
    strip_only_child(doc, node);
    true
}

/// `<center>` becomes `<div style="text-align: center">`, or under
/// `drop-font-tags` is replaced by a `<br>` separation.
fn center_to_div(doc: &mut Document, node: NodeId) -> bool {
    if !doc[node].is_elem("center") {
        return false;
    }
    if doc.config.drop_font_tags {
        let next = doc[node].next_sibling();
        let parent = doc[node].parent();
        doc.fold(node);
        let br = {
            let tag = lookup_tag("br", &doc.config);
            let mut n = Node::new_element("br", tag);
            n.implicit = true;
            doc.push_node(n)
        };
        if let Some(next) = next {
            doc.insert_before(next, br);
        } else if let Some(parent) = parent {
            doc.append(parent, br);
        }
        return true;
    }
    rename_elem(doc, node, "div");
    add_style_property(doc, node, "text-align: center");
    true
}

/// `<div><div>…</div></div>` merges into one div.
fn merge_divs(doc: &mut Document, node: NodeId) -> bool {
    if !doc[node].is_elem("div") {
        return false;
    }
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if !doc[child].is_elem("div") || doc[child].next_sibling().is_some() {
        return false;
    }
    merge_styles(doc, node, child);
    strip_only_child(doc, node);
    true
}

/// `<ul><li><ul>…` with a sole nested list discards the outer list.
fn nested_list(doc: &mut Document, node: NodeId) -> bool {
    if !(doc[node].is_elem("ul") || doc[node].is_elem("ol")) {
        return false;
    }
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if doc[child].next_sibling().is_some() {
        return false;
    }
    let list = match doc[child].first_child() {
        Some(l) => l,
        None => return false,
    };
    let same_type = {
        let outer = doc[node].as_element().map(|e| e.name.clone());
        let inner = doc[list].as_element().map(|e| e.name.clone());
        outer.is_some() && outer == inner
    };
    if !same_type || doc[list].next_sibling().is_some() {
        return false;
    }

    // inner list replaces the outer one
    doc.insert_before(node, list);
    doc.detach(node);

    // successive lists merge: Word marks nesting only by indent
    if let Some(prev) = doc[list].prev_sibling() {
        if doc[prev].is_elem("ul") || doc[prev].is_elem("ol") {
            if let Some(li) = doc[prev].last_child() {
                doc.append(li, list);
            }
        }
    }
    true
}

/// A block whose only child is `<b>`, `<i>` or `<font>` absorbs the
/// styling.
fn block_style(doc: &mut Document, node: NodeId) -> bool {
    let model = doc[node].model();
    if model & (CM_BLOCK | CM_LIST | CM_DEFLIST | CM_TABLE) == 0 {
        return false;
    }
    if doc[node].is_elem("table") || doc[node].is_elem("tr") || doc[node].is_elem("li") {
        return false;
    }
    if !doc[node].is_elem("caption") {
        text_align(doc, node);
    }
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if doc[child].next_sibling().is_some() {
        return false;
    }
    if doc[child].is_elem("b") {
        merge_styles(doc, node, child);
        add_style_property(doc, node, "font-weight: bold");
        strip_only_child(doc, node);
        return true;
    }
    if doc[child].is_elem("i") {
        merge_styles(doc, node, child);
        add_style_property(doc, node, "font-style: italic");
        strip_only_child(doc, node);
        return true;
    }
    if doc[child].is_elem("font") {
        merge_styles(doc, node, child);
        let attrs = font_attrs(doc, child);
        add_font_styles(doc, node, &attrs);
        strip_only_child(doc, node);
        return true;
    }
    false
}

/// The only child of an inline element or table cell gets folded in the
/// same way.
fn inline_style(doc: &mut Document, node: NodeId) -> bool {
    if doc[node].is_elem("font") || doc[node].model() & (CM_INLINE | CM_ROW) == 0 {
        return false;
    }
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if doc[child].next_sibling().is_some() {
        return false;
    }
    if doc[child].is_elem("b") && doc.config.logical_emphasis {
        merge_styles(doc, node, child);
        add_style_property(doc, node, "font-weight: bold");
        strip_only_child(doc, node);
        return true;
    }
    if doc[child].is_elem("i") && doc.config.logical_emphasis {
        merge_styles(doc, node, child);
        add_style_property(doc, node, "font-style: italic");
        strip_only_child(doc, node);
        return true;
    }
    if doc[child].is_elem("font") {
        merge_styles(doc, node, child);
        let attrs = font_attrs(doc, child);
        add_font_styles(doc, node, &attrs);
        strip_only_child(doc, node);
        return true;
    }
    false
}

/// `<font>` becomes `<span>` with an aggregated style attribute; under
/// `drop-font-tags` it is discarded outright.
fn font_to_span(doc: &mut Document, node: NodeId) -> bool {
    if !doc[node].is_elem("font") {
        return false;
    }
    if doc.config.drop_font_tags {
        doc.fold(node);
        return true;
    }
    // a FONT that is the only child is left for the enclosing rule
    let only_child = doc[node].prev_sibling().is_none() && doc[node].next_sibling().is_none();
    if only_child && doc[node].parent().is_some() {
        return false;
    }
    let attrs = font_attrs(doc, node);
    add_font_styles(doc, node, &attrs);
    let style = doc[node].attr("style").map(|v| v.clone());
    if let Some(e) = doc[node].as_element_mut() {
        e.attrs.clear();
        if let Some(style) = style {
            e.attrs.push(Attr::new("style", Some(style), b'"'));
        }
    }
    rename_elem(doc, node, "span");
    true
}

/// Apply the presentation rules bottom-up until none fires.
fn clean_presentation(doc: &mut Document) {
    loop {
        let mut changed = false;
        let ids = all_elements(doc);
        for id in ids.into_iter().rev() {
            if !is_attached(doc, id) {
                continue;
            }
            if dir_to_div(doc, id)
                || nested_list(doc, id)
                || center_to_div(doc, id)
                || merge_divs(doc, id)
                || block_style(doc, id)
                || inline_style(doc, id)
                || font_to_span(doc, id)
            {
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    if doc.config.make_clean {
        define_style_rules(doc);
        create_style_element(doc);
    }
}

/// Intern each `style` attribute as a class in the document style table.
fn define_style_rules(doc: &mut Document) {
    let ids = all_elements(doc);
    for id in ids {
        let (tag_name, style) = {
            let elem = match doc[id].as_element() {
                Some(e) => e,
                None => continue,
            };
            match elem.attr("style") {
                Some(v) => (elem.name.to_string(), v.to_string()),
                None => continue,
            }
        };
        let class = find_style(doc, &tag_name, &style);
        if let Some(e) = doc[id].as_element_mut() {
            e.remove_attr("style");
        }
        add_class(doc, id, &class);
    }
}

/// Look up or create the generated class for a (tag, properties) pair.
fn find_style(doc: &mut Document, tag: &str, properties: &str) -> String {
    if let Some(rule) = doc
        .styles
        .iter()
        .find(|r| r.tag == tag && r.props == properties)
    {
        return rule.class.clone();
    }
    let prefix = doc.config.css_prefix.clone().unwrap_or_else(|| "c".to_string());
    let class = format!("{}{}", prefix, doc.styles.len() + 1);
    doc.styles.push(StyleRule {
        tag: tag.to_string(),
        props: properties.to_string(),
        class: class.clone(),
    });
    class
}

/// Move body presentation attributes into stylesheet rules.
fn clean_body_attrs(doc: &mut Document, body: NodeId, css: &mut String) {
    let mut take = |doc: &mut Document, name: &str| -> Option<String> {
        doc[body]
            .as_element_mut()
            .and_then(|e| e.remove_attr(name))
            .and_then(|a| a.value.map(|v| v.to_string()))
    };

    let bgurl = take(doc, "background");
    let bgcolor = take(doc, "bgcolor");
    let color = take(doc, "text");

    if bgurl.is_some() || bgcolor.is_some() || color.is_some() {
        css.push_str(" body {\n");
        if let Some(url) = bgurl {
            css.push_str(&format!("  background-image: url({});\n", url));
        }
        if let Some(c) = bgcolor {
            css.push_str(&format!("  background-color: {};\n", c));
        }
        if let Some(c) = color {
            css.push_str(&format!("  color: {};\n", c));
        }
        css.push_str(" }\n");
    }

    for (attr, selector) in
        &[("link", ":link"), ("vlink", ":visited"), ("alink", ":active")]
    {
        if let Some(c) = take(doc, attr) {
            css.push_str(&format!(" {} {{ color: {} }}\n", selector, c));
        }
    }
}

/// Synthesize a `<style>` element in the head from the interned rules.
fn create_style_element(doc: &mut Document) {
    // an earlier clean already produced the stylesheet
    if let Some(head) = doc.head_elem() {
        if doc
            .children(head)
            .any(|id| doc[id].is_elem("style") && doc[id].implicit)
        {
            return;
        }
    }

    let body = doc.body_elem();
    let mut css = String::new();
    if let Some(body) = body {
        clean_body_attrs(doc, body, &mut css);
    }
    if doc.styles.is_empty() && css.is_empty() {
        return;
    }

    for rule in &doc.styles {
        css.push_str(&format!(" {}.{} {{{}}}\n", rule.tag, rule.class, rule.props));
    }

    let tag = lookup_tag("style", &doc.config);
    let mut style_node = Node::new_element("style", tag);
    style_node.implicit = true;
    if let NodeData::Elem(ref mut e) = style_node.data {
        e.attrs.push(Attr::new("type", Some("text/css".into()), b'"'));
    }
    let style_id = doc.push_node(style_node);
    let span = doc.buf_push_str(&css);
    let text = doc.push_node(Node::new(NodeData::Text(span)));
    doc.append(style_id, text);

    if let Some(head) = doc.head_elem() {
        doc.append(head, style_id);
    }
}

/// `dir` and `menu` are obsolete list elements; replace them by `ul`.
fn coerce_obsolete_lists(doc: &mut Document) {
    doc.filter(|doc, id| {
        let name = match doc[id].as_element() {
            Some(e) if e.is_elem("dir") || e.is_elem("menu") => e.name.to_string(),
            _ => return Action::Continue,
        };
        doc.report(ReportCode::ObsoleteElement, id, &[
            &format!("<{}>", name),
            "<ul>",
        ]);
        rename_elem(doc, id, "ul");
        Action::Continue
    });
}

/// Strip `<b>` within `<b>`, `<i>` within `<i>`.
fn nested_emphasis(doc: &mut Document) {
    doc.filter(|doc, id| {
        let name = match doc[id].as_element() {
            Some(e) if e.is_elem("b") || e.is_elem("i") => e.name.to_string(),
            _ => return Action::Continue,
        };
        let parent_same = doc[id]
            .parent()
            .map_or(false, |p| doc[p].is_elem(&name));
        if parent_same {
            doc.report(ReportCode::NestedEmphasis, id, &[&format!("<{}>", name)]);
            Action::Fold
        } else {
            Action::Continue
        }
    });
}

/// `<i>` → `<em>` and `<b>` → `<strong>`.
fn em_from_i(doc: &mut Document) {
    doc.filter(|doc, id| {
        if doc[id].is_elem("i") {
            rename_elem(doc, id, "em");
        } else if doc[id].is_elem("b") {
            rename_elem(doc, id, "strong");
        }
        Action::Continue
    });
}

/// Lists holding a single implicit item were indentation tricks: convert
/// them to implicit blockquotes, bottom-up.
fn list_to_bq(doc: &mut Document) {
    let ids = all_elements(doc);
    for id in ids.into_iter().rev() {
        if !is_attached(doc, id) {
            continue;
        }
        let is_list = doc[id].has_model(CM_LIST)
            && matches!(doc[id].data, NodeData::Elem(_));
        if !is_list || !has_one_child(doc, id) {
            continue;
        }
        let child = doc[id].first_child().unwrap();
        if doc[child].is_elem("li") && doc[child].implicit {
            strip_only_child(doc, id);
            rename_elem(doc, id, "blockquote");
            doc[id].implicit = true;
        }
    }
}

/// Implicit blockquotes collapse to a single `<div>` with a margin that
/// matches the nesting depth.
fn bq_to_div(doc: &mut Document) {
    let ids = all_elements(doc);
    for id in ids {
        if !is_attached(doc, id) {
            continue;
        }
        if !(doc[id].is_elem("blockquote") && doc[id].implicit) {
            continue;
        }
        let mut indent = 1u32;
        while has_one_child(doc, id) {
            let child = doc[id].first_child().unwrap();
            if doc[child].is_elem("blockquote") && doc[child].implicit {
                indent += 1;
                strip_only_child(doc, id);
            } else {
                break;
            }
        }
        rename_elem(doc, id, "div");
        add_style_property(doc, id, &format!("margin-left: {}em", 2 * indent));
    }
}

/// Word 2000 documents declare `xmlns:o` on `<html>` or a Microsoft
/// generator meta.
pub fn is_word_2000(doc: &Document) -> bool {
    if let Some(html) = doc.html_elem_ref() {
        if html.attr("xmlns:o").is_some() {
            return true;
        }
    }
    doc.document_node_ref()
        .select(|n| n.is_elem("meta"))
        .any(|meta| {
            meta.attr("name")
                .map_or(false, |v| v.eq_ignore_ascii_case("generator"))
                && meta
                    .attr("content")
                    .map_or(false, |v| v.contains("Microsoft"))
        })
}

fn section_text(doc: &Document, id: NodeId) -> Option<String> {
    match doc[id].data {
        NodeData::Section(span) => Some(doc.buf_str(span).to_string()),
        _ => None,
    }
}

fn find_enclosing_cell(doc: &Document, node: NodeId) -> Option<NodeId> {
    doc.node_and_ancestors(node).find(|&id| doc[id].is_elem("td"))
}

/// Drop `<![if …]>` … `<![endif]>` regions. Content survives only for
/// `if !vml` marker pairs; an `if !supportEmptyParas` region leaves one
/// no-break space in its enclosing table cell.
fn drop_sections(doc: &mut Document) {
    loop {
        let section = doc.nodes().find(|&id| {
            matches!(doc[id].data, NodeData::Section(_)) && is_attached(doc, id)
        });
        let id = match section {
            Some(id) => id,
            None => break,
        };
        let text = section_text(doc, id).unwrap_or_default();

        if text.starts_with("if") && !text.starts_with("if !vml") {
            // prune the region, within this sibling list, up to the
            // matching endif
            if text.starts_with("if !supportEmptyParas") {
                if let Some(cell) = find_enclosing_cell(doc, id) {
                    let span = doc.buf_push_str("\u{00A0}");
                    let nbsp = doc.push_node(Node::new(NodeData::Text(span)));
                    doc.append(cell, nbsp);
                }
            }
            let mut depth = 1u32;
            let mut next = doc[id].next_sibling();
            doc.detach(id);
            while let Some(n) = next {
                next = doc[n].next_sibling();
                let stext = section_text(doc, n);
                doc.detach(n);
                match stext {
                    Some(s) if s.starts_with("if") => depth += 1,
                    Some(s) if s.starts_with("endif") => {
                        depth -= 1;
                        if depth == 0 {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        } else {
            // markers only; keep the content between them
            doc.detach(id);
        }
    }
}

/// Remove class/style/lang and `x:` attributes Word scatters, keeping
/// `class="Code"` and user-defined class names.
fn purge_word_attributes(doc: &mut Document, node: NodeId) {
    let is_cell = doc[node].is_elem("td") || doc[node].is_elem("tr") || doc[node].is_elem("th");
    if let Some(elem) = doc[node].as_element_mut() {
        elem.attrs.retain(|a| {
            let name = match &a.name {
                Some(n) => &n[..],
                None => return true,
            };
            if name == "class" {
                if let Some(v) = &a.value {
                    // user classes pass through
                    if &v[..] == "Code" || !v.starts_with("Mso") {
                        return true;
                    }
                }
            }
            !(name == "class"
                || name == "style"
                || name == "lang"
                || name.starts_with("x:")
                || ((name == "height" || name == "width") && is_cell))
        });
    }
}

fn no_margins(doc: &Document, node: NodeId) -> bool {
    match doc[node].attr("style") {
        Some(style) => {
            style.contains("margin-top: 0") && style.contains("margin-bottom: 0")
        }
        None => false,
    }
}

fn single_space(doc: &Document, node: NodeId) -> bool {
    let child = match doc[node].first_child() {
        Some(c) => c,
        None => return false,
    };
    if doc[child].next_sibling().is_some() {
        return false;
    }
    match doc[child].data {
        NodeData::Text(span) => {
            let t = doc.buf_str(span);
            t == " " || t == "\u{00A0}"
        }
        _ => false,
    }
}

/// Replace no-break spaces with plain spaces in all text below a node.
fn normalize_spaces(doc: &mut Document, node: NodeId) {
    let texts: Vec<NodeId> = {
        let mut v = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            for c in doc.children(n) {
                if matches!(doc[c].data, NodeData::Text(_)) {
                    v.push(c);
                } else {
                    stack.push(c);
                }
            }
        }
        v
    };
    for t in texts {
        if let NodeData::Text(span) = doc[t].data {
            let s = doc.buf_str(span).to_string();
            if s.contains('\u{00A0}') {
                let fixed = s.replace('\u{00A0}', " ");
                let new_span = doc.buf_push_str(&fixed);
                doc[t].data = NodeData::Text(new_span);
            }
        }
    }
}

/// The Word 2000 scrub: strip spans and fonts, turn bullet paragraphs
/// into lists, zero-margin paragraph runs into `<pre>`, and drop the
/// style verbiage.
fn clean_word_2000(doc: &mut Document) {
    debug!("cleaning Word 2000 markup");
    if let Some(html) = doc.html_elem() {
        if let Some(e) = doc[html].as_element_mut() {
            e.attrs.clear();
        }
        clean_word_children(doc, html);
    }
}

fn clean_word_children(doc: &mut Document, parent: NodeId) {
    let mut list: Option<NodeId> = None;
    let mut child = doc[parent].first_child();

    while let Some(node) = child {
        let mut next = doc[node].next_sibling();

        // zero-margin paragraph runs hide preformatted text
        if doc[node].is_elem("p") && no_margins(doc, node) {
            rename_elem(doc, node, "pre");
            purge_word_attributes(doc, node);
            clean_word_children(doc, node);
            while let Some(p) = next {
                if !(doc[p].is_elem("p") && no_margins(doc, p)) {
                    break;
                }
                next = doc[p].next_sibling();
                let span = doc.buf_push_str("\n");
                let nl = doc.push_node(Node::new(NodeData::Text(span)));
                doc.append(node, nl);
                doc.append(node, p);
                doc.fold(p);
            }
            child = next;
            list = None;
            continue;
        }

        // a block holding one lone space collapses away
        if doc[node].has_model(CM_BLOCK) && single_space(doc, node) {
            clean_word_children(doc, node);
            doc.fold(node);
            child = next;
            list = None;
            continue;
        }

        // Word style verbiage
        let is_verbiage = doc[node].is_elem("style")
            || doc[node].is_elem("meta")
            || matches!(doc[node].data, NodeData::Comment(_));
        if is_verbiage {
            doc.detach(node);
            child = next;
            continue;
        }

        if doc[node].is_elem("span") || doc[node].is_elem("font") {
            clean_word_children(doc, node);
            doc.fold(node);
            child = next;
            continue;
        }

        if doc[node].is_elem("link") {
            let file_list = doc[node]
                .attr("rel")
                .map_or(false, |v| &v[..] == "File-List");
            if file_list {
                doc.detach(node);
                child = next;
                continue;
            }
        }

        if doc[node].is_elem("p") && doc[node].first_child().is_none() {
            doc.report(ReportCode::TrimEmptyElement, node, &["p"]);
            doc.detach(node);
            child = next;
            continue;
        }

        if doc[node].is_elem("p") {
            let class = doc[node].attr("class").map(|v| v.to_string());
            let style = doc[node].attr("style").map(|v| v.to_string());
            let is_bullet = class.as_deref() == Some("MsoListBullet");
            let is_number = class.as_deref() == Some("MsoListNumber");
            let is_mso_list = style.map_or(false, |s| s.contains("mso-list:"));

            if is_bullet || is_number || is_mso_list {
                let list_name = if is_number { "ol" } else { "ul" };
                rename_elem(doc, node, "li");
                let target = match list {
                    Some(l) if doc[l].is_elem(list_name) => l,
                    _ => {
                        let tag = lookup_tag(list_name, &doc.config);
                        let mut n = Node::new_element(list_name, tag);
                        n.implicit = true;
                        let l = doc.push_node(n);
                        doc.insert_before(node, l);
                        l
                    }
                };
                purge_word_attributes(doc, node);
                clean_word_children(doc, node);
                doc.append(target, node);
                list = Some(target);
                child = next;
                continue;
            } else if class.as_deref() == Some("Code") {
                normalize_spaces(doc, node);
                let target = match list {
                    Some(l) if doc[l].is_elem("pre") => l,
                    _ => {
                        let tag = lookup_tag("pre", &doc.config);
                        let mut n = Node::new_element("pre", tag);
                        n.implicit = true;
                        let l = doc.push_node(n);
                        doc.insert_before(node, l);
                        l
                    }
                };
                doc.append(target, node);
                doc.fold(node);
                let span = doc.buf_push_str("\n");
                let nl = doc.push_node(Node::new(NodeData::Text(span)));
                doc.append(target, nl);
                list = Some(target);
                child = next;
                continue;
            } else {
                list = None;
            }
        } else {
            list = None;
        }

        if matches!(doc[node].data, NodeData::Elem(_)) {
            purge_word_attributes(doc, node);
        }
        clean_word_children(doc, node);
        child = next;
    }
}

/// Smart quotes and dashes fold to ASCII in all text content.
fn bare_document(doc: &mut Document) {
    doc.filter(|doc, id| {
        if let NodeData::Text(span) = doc[id].data {
            let s = doc.buf_str(span);
            if s.chars().any(|c| crate::chars::fold_smart_char(c).is_some()) {
                let fixed: String = s
                    .chars()
                    .map(|c| crate::chars::fold_smart_char(c).unwrap_or(c))
                    .collect();
                let new_span = doc.buf_push_str(&fixed);
                doc[id].data = NodeData::Text(new_span);
            }
        }
        Action::Continue
    });
}

/// `<object>` in `<head>` with non-param content belongs in `<body>`.
pub fn bump_object(doc: &mut Document) {
    let (head, body) = match (doc.head_elem(), doc.body_elem()) {
        (Some(h), Some(b)) => (h, b),
        _ => return,
    };
    let objects: Vec<NodeId> = doc
        .children(head)
        .filter(|&id| doc[id].is_elem("object"))
        .collect();
    for object in objects {
        let bump = doc.children(object).any(|child| {
            let is_param = doc[child].is_elem("param");
            let is_blank_text = match doc[child].data {
                NodeData::Text(span) => doc.buf_str(span).trim().is_empty(),
                _ => false,
            };
            !is_param && !is_blank_text
        });
        if bump {
            if let Some(first) = doc[body].first_child() {
                doc.insert_before(first, object);
            } else {
                doc.append(body, object);
            }
        }
    }
}

/// Trailing `<br>` elements inside a block move out after the block; a
/// bare one is dropped.
fn fix_brakes(doc: &mut Document) {
    let ids = all_elements(doc);
    for id in ids.into_iter().rev() {
        if !is_attached(doc, id) || !doc[id].has_model(CM_BLOCK) {
            continue;
        }
        let mut deleted = false;
        while let Some(last) = doc[id].last_child() {
            if !doc[last].is_elem("br") {
                break;
            }
            let no_attrs = doc[last]
                .as_element()
                .map_or(false, |e| e.attrs.is_empty());
            if no_attrs && !deleted {
                doc.detach(last);
                deleted = true;
            } else {
                doc.detach(last);
                if let Some(next) = doc[id].next_sibling() {
                    doc.insert_before(next, last);
                } else if let Some(parent) = doc[id].parent() {
                    doc.append(parent, last);
                }
            }
        }
    }
}

/// Rewrite the charset in `<meta http-equiv="Content-Type">` to the
/// configured output encoding.
fn verify_http_equiv(doc: &mut Document) {
    let head = match doc.head_elem() {
        Some(h) => h,
        None => return,
    };
    let charset = doc.config.output_encoding.charset_name().to_string();
    let metas: Vec<NodeId> = doc
        .children(head)
        .filter(|&id| doc[id].is_elem("meta"))
        .collect();
    for meta in metas {
        let is_ctype = doc[meta]
            .attr("http-equiv")
            .map_or(false, |v| v.eq_ignore_ascii_case("content-type"));
        if !is_ctype {
            continue;
        }
        let content = match doc[meta].attr("content") {
            Some(v) => v.to_string(),
            None => continue,
        };
        let rewritten: Vec<String> = content
            .split(';')
            .map(|part| {
                let trimmed = part.trim();
                if trimmed.len() >= 7 && trimmed[..7].eq_ignore_ascii_case("charset") {
                    format!("charset={}", charset)
                } else {
                    trimmed.to_string()
                }
            })
            .collect();
        if let Some(e) = doc[meta].as_element_mut() {
            e.set_attr("content", &rewritten.join("; "));
        }
    }
}

// The doctype FPIs and system identifiers assigned on output.
fn doctype_strings(vers: u16, xhtml: bool) -> Option<(&'static str, &'static str)> {
    if xhtml {
        match vers {
            VERS_HTML40_STRICT => Some((
                "-//W3C//DTD XHTML 1.0 Strict//EN",
                "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd",
            )),
            VERS_HTML40_LOOSE => Some((
                "-//W3C//DTD XHTML 1.0 Transitional//EN",
                "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd",
            )),
            VERS_FRAMESET => Some((
                "-//W3C//DTD XHTML 1.0 Frameset//EN",
                "http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd",
            )),
            _ => None,
        }
    } else {
        match vers {
            VERS_HTML20 => Some(("-//IETF//DTD HTML 2.0//EN", "")),
            VERS_HTML32 => Some(("-//W3C//DTD HTML 3.2//EN", "")),
            VERS_HTML40_STRICT => Some((
                "-//W3C//DTD HTML 4.01//EN",
                "http://www.w3.org/TR/html4/strict.dtd",
            )),
            VERS_HTML40_LOOSE => Some((
                "-//W3C//DTD HTML 4.01 Transitional//EN",
                "http://www.w3.org/TR/html4/loose.dtd",
            )),
            VERS_FRAMESET => Some((
                "-//W3C//DTD HTML 4.01 Frameset//EN",
                "http://www.w3.org/TR/html4/frameset.dtd",
            )),
            _ => None,
        }
    }
}

/// Rewrite (or remove, or insert) the DOCTYPE per `doctype-mode`.
fn fix_doctype(doc: &mut Document) {
    let existing = doc
        .children(Document::DOCUMENT_NODE_ID)
        .find(|&id| matches!(doc[id].data, NodeData::Doctype(_)));

    let mode = doc.config.doctype_mode.clone();
    if mode == DoctypeMode::Omit {
        if let Some(dt) = existing {
            doc.detach(dt);
        }
        return;
    }
    if doc.config.xml_tags {
        // leave XML doctypes alone
        return;
    }

    let xhtml = doc.config.xhtml_out;
    let text = match mode {
        DoctypeMode::User => match doc.config.doctype.clone() {
            Some(fpi) => format!("html PUBLIC \"{}\"", fpi),
            None => return,
        },
        DoctypeMode::Strict => {
            let (fpi, sys) = doctype_strings(VERS_HTML40_STRICT, xhtml).unwrap();
            doctype_text(fpi, sys)
        }
        DoctypeMode::Loose => {
            let (fpi, sys) = doctype_strings(VERS_HTML40_LOOSE, xhtml).unwrap();
            doctype_text(fpi, sys)
        }
        DoctypeMode::Auto | DoctypeMode::Omit => {
            let vers = apparent_version(doc);
            match doctype_strings(vers, xhtml) {
                Some((fpi, sys)) => doctype_text(fpi, sys),
                None => return,
            }
        }
    };

    let span = doc.buf_push_str(&text);
    match existing {
        Some(dt) => doc[dt].data = NodeData::Doctype(span),
        None => {
            let dt = doc.push_node(Node::new(NodeData::Doctype(span)));
            if let Some(first) = doc[Document::DOCUMENT_NODE_ID].first_child() {
                doc.insert_before(first, dt);
            } else {
                doc.append(Document::DOCUMENT_NODE_ID, dt);
            }
        }
    }
}

fn doctype_text(fpi: &str, system: &str) -> String {
    if system.is_empty() {
        format!("html PUBLIC \"{}\"", fpi)
    } else {
        format!("html PUBLIC \"{}\"\n  \"{}\"", fpi, system)
    }
}

/// Add or normalize the XML declaration when XML output is configured.
fn fix_xml_decl(doc: &mut Document) {
    let existing = doc
        .children(Document::DOCUMENT_NODE_ID)
        .find(|&id| matches!(doc[id].data, NodeData::XmlDecl { .. }));

    if !(doc.config.add_xml_decl && doc.config.xml_output()) {
        return;
    }
    if existing.is_some() {
        return;
    }

    let encoding = doc.config.output_encoding.charset_name().to_string();
    let attrs = vec![
        Attr::new("version", Some("1.0".into()), b'"'),
        Attr::new("encoding", Some(encoding.into()), b'"'),
    ];
    let decl = doc.push_node(Node::new(NodeData::XmlDecl { attrs }));
    if let Some(first) = doc[Document::DOCUMENT_NODE_ID].first_child() {
        doc.insert_before(first, decl);
    } else {
        doc.append(Document::DOCUMENT_NODE_ID, decl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::logger::ensure_logger;

    fn doc_with(build: impl FnOnce(&mut Document)) -> Document {
        ensure_logger();
        let mut doc = Document::new(Config::default());
        build(&mut doc);
        doc
    }

    fn elem(doc: &mut Document, parent: NodeId, name: &str) -> NodeId {
        let tag = lookup_tag(name, &doc.config);
        doc.append_child(parent, Node::new_element(name, tag))
    }

    fn text(doc: &mut Document, parent: NodeId, s: &str) -> NodeId {
        let span = doc.buf_push_str(s);
        doc.append_child(parent, Node::new(NodeData::Text(span)))
    }

    #[test]
    fn font_sizes() {
        assert_eq!(Some("60%".to_string()), font_size_to_css("0"));
        assert_eq!(None, font_size_to_css("3"));
        assert_eq!(Some("120%".to_string()), font_size_to_css("4"));
        assert_eq!(Some("120%".to_string()), font_size_to_css("+1"));
        assert_eq!(Some("80%".to_string()), font_size_to_css("-1"));
        assert_eq!(Some("smaller".to_string()), font_size_to_css("-"));
    }

    #[test]
    fn style_property_merging() {
        let mut doc = doc_with(|_| {});
        let p = elem(&mut doc, Document::DOCUMENT_NODE_ID, "p");
        add_style_property(&mut doc, p, "color: red");
        add_style_property(&mut doc, p, "font-style: italic");
        assert_eq!(
            "color: red; font-style: italic",
            doc[p].attr("style").unwrap().as_ref()
        );
    }

    #[test]
    fn implicit_list_becomes_div() {
        let mut doc = doc_with(|_| {});
        let body = elem(&mut doc, Document::DOCUMENT_NODE_ID, "body");
        let dir = elem(&mut doc, body, "dir");
        let li = elem(&mut doc, dir, "li");
        doc[li].implicit = true;
        text(&mut doc, li, "indented");

        list_to_bq(&mut doc);
        bq_to_div(&mut doc);

        let kids: Vec<_> = doc.children(body).collect();
        assert_eq!(1, kids.len());
        assert!(doc[kids[0]].is_elem("div"), "tree: {:?}", doc);
        assert_eq!(
            "margin-left: 2em",
            doc[kids[0]].attr("style").unwrap().as_ref()
        );
        assert_eq!("indented", doc.text(kids[0]).unwrap().as_ref());
    }

    #[test]
    fn nested_emphasis_stripped() {
        let mut doc = doc_with(|_| {});
        let body = elem(&mut doc, Document::DOCUMENT_NODE_ID, "body");
        let outer = elem(&mut doc, body, "b");
        let inner = elem(&mut doc, outer, "b");
        text(&mut doc, inner, "x");

        nested_emphasis(&mut doc);
        let kids: Vec<_> = doc.children(outer).collect();
        assert_eq!(1, kids.len());
        assert!(matches!(doc[kids[0]].data, NodeData::Text(_)));
        assert_eq!(1, doc.counts.warnings);
    }

    #[test]
    fn style_interning_collapses_duplicates() {
        let mut doc = doc_with(|_| {});
        let c1 = find_style(&mut doc, "p", "color: red");
        let c2 = find_style(&mut doc, "p", "color: blue");
        let c3 = find_style(&mut doc, "p", "color: red");
        assert_eq!(c1, c3);
        assert_ne!(c1, c2);
        assert_eq!(2, doc.styles.len());
    }

    #[test]
    fn brakes_move_out_of_blocks() {
        let mut doc = doc_with(|_| {});
        let body = elem(&mut doc, Document::DOCUMENT_NODE_ID, "body");
        let p = elem(&mut doc, body, "p");
        text(&mut doc, p, "x");
        elem(&mut doc, p, "br");
        elem(&mut doc, p, "br");

        fix_brakes(&mut doc);
        // one bare trailing br is dropped, the other moves after the block
        assert_eq!(1, doc.children(p).count());
        let after: Vec<_> = doc.children(body).collect();
        assert_eq!(2, after.len());
        assert!(doc[after[1]].is_elem("br"));
    }
}
