// This DOM-like markup tree module was originally based on `victor::dom`,
// as found via the `marked` crate:
//
// https://github.com/SimonSapin/victor
// (No copyright notice.)
// Licensed under the Apache license v2.0, or the MIT license

//! The document tree, its shared character buffer, and diagnostics state.

use std::collections::HashMap;
use std::convert::TryInto;
use std::fmt;
use std::iter;
use std::num::NonZeroU32;

use tendril::{ByteTendril, StrTendril};

mod node_ref;
#[macro_use] pub mod filter;
pub mod meta;

#[cfg(test)]
mod tests;

pub use node_ref::{NodeRef, Selector};

use crate::config::Config;
use crate::report::{
    format_message, Counts, Diagnostic, MessageSink, PreenError, ReportCode, ReportLevel,
    StderrSink,
};
use meta::{TagInfo, VERS_ALL, VERS_PROPRIETARY, VERS_UNKNOWN};

// Initial allocation for the shared character buffer.
const TEXT_BUFFER_SIZE: u32 = 8 * 1024;

/// A half-open byte range into a document's character buffer.
///
/// Spans survive buffer growth because they are indices, never pointers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(start: u32, end: u32) -> Span {
        debug_assert!(start <= end);
        Span { start, end }
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Server-markup island kinds that may carry an attribute's value.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ServerKind {
    Asp,
    Php,
}

/// One parsed attribute. A `None` name marks a pure server-markup
/// placeholder sitting in the attribute list.
#[derive(Clone, Debug)]
pub struct Attr {
    pub name: Option<StrTendril>,
    pub value: Option<StrTendril>,
    /// Quote delimiter as seen in the source: `b'"'`, `b'\''` or 0.
    pub delim: u8,
    pub server: Option<ServerKind>,
}

impl Attr {
    pub fn new<N: Into<StrTendril>>(name: N, value: Option<StrTendril>, delim: u8) -> Attr {
        Attr { name: Some(name.into()), value, delim, server: None }
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.as_ref().map_or(false, |n| &n[..] == name)
    }
}

/// A markup element: name, resolved dictionary info, attributes.
#[derive(Clone, Debug)]
pub struct Element {
    pub name: StrTendril,
    pub tag: Option<TagInfo>,
    pub attrs: Vec<Attr>,
    /// The source tag was `<name …/>`.
    pub self_closing: bool,
}

impl Element {
    pub fn new<N: Into<StrTendril>>(name: N, tag: Option<TagInfo>) -> Element {
        Element { name: name.into(), tag, attrs: Vec::new(), self_closing: false }
    }

    pub fn model(&self) -> u32 {
        self.tag.map(|t| t.model).unwrap_or(0)
    }

    pub fn has_model(&self, bits: u32) -> bool {
        self.model() & bits != 0
    }

    pub fn versions(&self) -> u16 {
        self.tag.map(|t| t.versions).unwrap_or(VERS_PROPRIETARY)
    }

    pub fn is_elem(&self, name: &str) -> bool {
        &self.name[..] == name
    }

    /// Return attribute value by name, if present with a value.
    pub fn attr(&self, name: &str) -> Option<&StrTendril> {
        self.attrs
            .iter()
            .find(|a| a.is_named(name))
            .and_then(|a| a.value.as_ref())
    }

    pub fn get_attr_mut(&mut self, name: &str) -> Option<&mut Attr> {
        self.attrs.iter_mut().find(|a| a.is_named(name))
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<Attr> {
        let i = self.attrs.iter().position(|a| a.is_named(name))?;
        Some(self.attrs.remove(i))
    }

    /// Add or replace an attribute value.
    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(attr) = self.get_attr_mut(name) {
            attr.value = Some(value.into());
        } else {
            self.attrs.push(Attr::new(name, Some(value.into()), b'"'));
        }
    }
}

/// The typed payload of a tree node.
#[derive(Clone, Debug)]
pub enum NodeData {
    /// The synthetic document container node.
    Document,
    /// `<!DOCTYPE …>`, raw text of the declaration body.
    Doctype(Span),
    /// `<!-- … -->`, text between the markers.
    Comment(Span),
    /// `<? … ?>`, target and data together.
    ProcInstr(Span),
    /// Character data.
    Text(Span),
    /// A start or start-end tag with its subtree.
    Elem(Element),
    /// An end tag; only seen between lexer and parser.
    EndTag(Element),
    /// `<![CDATA[ … ]]>` verbatim.
    CData(Span),
    /// `<![if …]>` … style conditional section, kept verbatim.
    Section(Span),
    /// `<% … %>` server markup.
    Asp(Span),
    /// `<# … #>` server markup.
    Jste(Span),
    /// `<?php … ?>` server markup.
    Php(Span),
    /// `<?xml … ?>` declaration with pseudo-attributes.
    XmlDecl { attrs: Vec<Attr> },
}

impl NodeData {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            NodeData::Elem(ref e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            NodeData::Elem(ref mut e) => Some(e),
            _ => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, NodeData::Text(_))
    }
}

/// A `Node` identifier: a u32 index into a `Document`s node vector.
///
/// Should only be used with the `Document` it was obtained from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(NonZeroU32);

/// A typed node within a `Document`, with source position and repair flags.
#[derive(Debug)]
pub struct Node {
    pub(crate) parent: Option<NodeId>,
    pub(crate) prev_sibling: Option<NodeId>,
    pub(crate) next_sibling: Option<NodeId>,
    pub(crate) first_child: Option<NodeId>,
    pub(crate) last_child: Option<NodeId>,
    pub data: NodeData,
    /// Source position at which the node began.
    pub line: u32,
    pub column: u32,
    /// True once an explicit matching end tag was seen.
    pub closed: bool,
    /// True if the builder inferred this node.
    pub implicit: bool,
    /// Comments only: a newline should follow on output.
    pub linebreak: bool,
}

impl Node {
    pub(crate) fn new(data: NodeData) -> Self {
        Node {
            parent: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            data,
            line: 0,
            column: 0,
            closed: false,
            implicit: false,
            linebreak: false,
        }
    }

    pub fn new_element<N: Into<StrTendril>>(name: N, tag: Option<TagInfo>) -> Node {
        Node::new(NodeData::Elem(Element::new(name, tag)))
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn prev_sibling(&self) -> Option<NodeId> {
        self.prev_sibling
    }

    pub fn next_sibling(&self) -> Option<NodeId> {
        self.next_sibling
    }

    pub fn first_child(&self) -> Option<NodeId> {
        self.first_child
    }

    pub fn last_child(&self) -> Option<NodeId> {
        self.last_child
    }

    pub fn as_element(&self) -> Option<&Element> {
        self.data.as_element()
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        self.data.as_element_mut()
    }

    /// Return true if this node is an element (or end tag) with the name.
    pub fn is_elem(&self, name: &str) -> bool {
        match self.data {
            NodeData::Elem(ref e) => e.is_elem(name),
            _ => false,
        }
    }

    pub fn attr(&self, name: &str) -> Option<&StrTendril> {
        self.as_element().and_then(|e| e.attr(name))
    }

    pub fn model(&self) -> u32 {
        self.as_element().map(|e| e.model()).unwrap_or(0)
    }

    pub fn has_model(&self, bits: u32) -> bool {
        self.model() & bits != 0
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        let mut n = Node::new(self.data.clone());
        n.line = self.line;
        n.column = self.column;
        n.closed = self.closed;
        n.implicit = self.implicit;
        n.linebreak = self.linebreak;
        n
    }
}

/// A distilled style rule awaiting the synthesized `<style>` element.
#[derive(Clone, Debug)]
pub struct StyleRule {
    pub tag: String,
    pub props: String,
    pub class: String,
}

/// The owning aggregate: node arena, character buffer, configuration,
/// counters, anchors and distilled style rules.
///
/// All `Document` instances contain a synthetic document node at the fixed
/// `DOCUMENT_NODE_ID` that serves as the container for top level nodes.
pub struct Document {
    nodes: Vec<Node>,
    text_buf: ByteTendril,
    pub config: Config,
    pub counts: Counts,
    pub sink: Box<dyn MessageSink>,
    pub input_had_bom: bool,
    /// Bit-mask of HTML versions the content seen so far allows.
    pub versions: u16,
    /// Version declared by the DOCTYPE, if one was matched.
    pub doctype: u16,
    pub anchors: HashMap<String, NodeId>,
    pub styles: Vec<StyleRule>,
}

/// Core tree implementation.
impl Document {
    /// The constant `NodeId` for the document node of all `Document`s.
    pub const DOCUMENT_NODE_ID: NodeId = NodeId(
        unsafe { NonZeroU32::new_unchecked(1) }
    );

    pub fn new(config: Config) -> Self {
        Document::with_sink(config, Box::new(StderrSink))
    }

    pub fn with_sink(config: Config, sink: Box<dyn MessageSink>) -> Self {
        let text_buf = ByteTendril::with_capacity(TEXT_BUFFER_SIZE);
        Document {
            nodes: vec![
                Node::new(NodeData::Document), // dummy padding, index 0
                Node::new(NodeData::Document), // the real root, index 1
            ],
            text_buf,
            config,
            counts: Counts::default(),
            sink,
            input_had_bom: false,
            versions: VERS_ALL | VERS_PROPRIETARY,
            doctype: VERS_UNKNOWN,
            anchors: HashMap::new(),
            styles: Vec::new(),
        }
    }

    /// Allocate an unattached node, as the lexer does for each token.
    pub fn push_node(&mut self, node: Node) -> NodeId {
        let next_index: u32 = self.nodes.len()
            .try_into()
            .expect("Document (u32) node index overflow");
        debug_assert!(next_index > 1);
        self.nodes.push(node);
        NodeId(unsafe { NonZeroU32::new_unchecked(next_index) })
    }

    pub fn detach(&mut self, node: NodeId) {
        let (parent, prev_sibling, next_sibling) = {
            let node = &mut self[node];
            (
                node.parent.take(),
                node.prev_sibling.take(),
                node.next_sibling.take(),
            )
        };

        if let Some(next_sibling) = next_sibling {
            self[next_sibling].prev_sibling = prev_sibling
        } else if let Some(parent) = parent {
            self[parent].last_child = prev_sibling;
        }

        if let Some(prev_sibling) = prev_sibling {
            self[prev_sibling].next_sibling = next_sibling;
        } else if let Some(parent) = parent {
            self[parent].first_child = next_sibling;
        }
    }

    /// Append node as new last child of parent, and return its new ID.
    pub fn append_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        let id = self.push_node(node);
        self.append(parent, id);
        id
    }

    /// Attach an existing (detached or repositioned) node as last child.
    pub fn append(&mut self, parent: NodeId, new_child: NodeId) {
        self.detach(new_child);
        self[new_child].parent = Some(parent);
        if let Some(last_child) = self[parent].last_child.take() {
            self[new_child].prev_sibling = Some(last_child);
            debug_assert!(self[last_child].next_sibling.is_none());
            self[last_child].next_sibling = Some(new_child);
        } else {
            debug_assert!(self[parent].first_child.is_none());
            self[parent].first_child = Some(new_child);
        }
        self[parent].last_child = Some(new_child);
    }

    /// Insert node before the given sibling and return its new ID.
    pub fn insert_before_sibling(&mut self, sibling: NodeId, node: Node) -> NodeId {
        let id = self.push_node(node);
        self.insert_before(sibling, id);
        id
    }

    pub fn insert_before(&mut self, sibling: NodeId, new_sibling: NodeId) {
        self.detach(new_sibling);
        self[new_sibling].parent = self[sibling].parent;
        self[new_sibling].next_sibling = Some(sibling);
        if let Some(prev_sibling) = self[sibling].prev_sibling.take() {
            self[new_sibling].prev_sibling = Some(prev_sibling);
            debug_assert_eq!(self[prev_sibling].next_sibling, Some(sibling));
            self[prev_sibling].next_sibling = Some(new_sibling);
        } else if let Some(parent) = self[sibling].parent {
            debug_assert_eq!(self[parent].first_child, Some(sibling));
            self[parent].first_child = Some(new_sibling);
        }
        self[sibling].prev_sibling = Some(new_sibling);
    }

    /// Insert a new node between `child` and its parent, adopting `child`.
    pub fn insert_as_parent(&mut self, child: NodeId, node: Node) -> NodeId {
        let id = self.insert_before_sibling(child, node);
        self.append(id, child);
        id
    }

    /// Replace the given node with its children.
    pub fn fold(&mut self, id: NodeId) {
        let mut next_child = self[id].first_child;
        while let Some(child) = next_child {
            debug_assert_eq!(self[child].parent, Some(id));
            next_child = self[child].next_sibling;
            self.insert_before(id, child);
        }
        self.detach(id);
    }

    /// Move all children of `from` to the end of `to`, in order.
    pub fn reparent_children(&mut self, from: NodeId, to: NodeId) {
        let mut next_child = self[from].first_child;
        while let Some(child) = next_child {
            next_child = self[child].next_sibling;
            self.append(to, child);
        }
    }

    /// Return an iterator over this node's direct children.
    pub fn children<'a>(&'a self, node: NodeId)
        -> impl Iterator<Item = NodeId> + 'a
    {
        iter::successors(
            self[node].first_child,
            move |&node| self[node].next_sibling
        )
    }

    /// Return an iterator over the specified node and all its following,
    /// direct siblings, within the same parent.
    pub fn node_and_following_siblings<'a>(&'a self, node: NodeId)
        -> impl Iterator<Item = NodeId> + 'a
    {
        iter::successors(Some(node), move |&node| self[node].next_sibling)
    }

    /// Return an iterator over the specified node and all its ancestors,
    /// terminating at the document node.
    pub fn node_and_ancestors<'a>(&'a self, node: NodeId)
        -> impl Iterator<Item = NodeId> + 'a
    {
        iter::successors(Some(node), move |&node| self[node].parent)
    }

    /// Return an iterator over all nodes, starting with the document node,
    /// and including all attached descendants in tree order.
    pub fn nodes<'a>(&'a self) -> impl Iterator<Item = NodeId> + 'a {
        iter::successors(
            Some(Document::DOCUMENT_NODE_ID),
            move |&node| self.next_in_tree_order(node)
        )
    }

    fn next_in_tree_order(&self, node: NodeId) -> Option<NodeId> {
        self[node].first_child.or_else(|| {
            self.node_and_ancestors(node)
                .find_map(|ancestor| self[ancestor].next_sibling)
        })
    }

    /// Create a new `Document` from the ordered sub-tree rooted in the
    /// node referenced by ID. The new document shares no storage; text
    /// spans are re-interned into its own buffer.
    pub fn deep_clone(&self, id: NodeId) -> Document {
        let mut ndoc = Document::new(self.config.clone());
        ndoc.deep_clone_to(Document::DOCUMENT_NODE_ID, self, id);
        ndoc
    }

    fn deep_clone_to(&mut self, id: NodeId, odoc: &Document, oid: NodeId) {
        let mut node = odoc[oid].clone();
        // re-intern spans from the other document's buffer
        match node.data {
            NodeData::Doctype(ref mut s)
            | NodeData::Comment(ref mut s)
            | NodeData::ProcInstr(ref mut s)
            | NodeData::Text(ref mut s)
            | NodeData::CData(ref mut s)
            | NodeData::Section(ref mut s)
            | NodeData::Asp(ref mut s)
            | NodeData::Jste(ref mut s)
            | NodeData::Php(ref mut s) => {
                *s = self.buf_push_str(odoc.buf_str(*s));
            }
            _ => {}
        }
        let id = self.append_child(id, node);
        for child in odoc.children(oid) {
            self.deep_clone_to(id, odoc, child);
        }
    }

    /// Return all descendant text content of the given node, in tree
    /// order, as one owned string.
    pub fn text(&self, id: NodeId) -> Option<StrTendril> {
        let mut next = Vec::new();
        push_if(&mut next, self[id].first_child);
        let mut text: Option<StrTendril> = None;
        while let Some(id) = next.pop() {
            let node = &self[id];
            if let NodeData::Text(span) = node.data {
                match &mut text {
                    None => text = Some(self.buf_str(span).into()),
                    Some(text) => text.push_slice(self.buf_str(span)),
                }
                push_if(&mut next, node.next_sibling);
            } else {
                push_if(&mut next, node.next_sibling);
                push_if(&mut next, node.first_child);
            }
        }
        text
    }
}

/// Character buffer access.
impl Document {
    pub fn buf_len(&self) -> u32 {
        self.text_buf.len32()
    }

    /// Append one code point, UTF-8 encoded, returning its span.
    pub fn buf_push_char(&mut self, c: char) -> Span {
        let start = self.text_buf.len32();
        let mut buf = [0u8; 4];
        self.text_buf.push_slice(c.encode_utf8(&mut buf).as_bytes());
        Span::new(start, self.text_buf.len32())
    }

    /// Append a string, returning its span.
    pub fn buf_push_str(&mut self, s: &str) -> Span {
        let start = self.text_buf.len32();
        self.text_buf.push_slice(s.as_bytes());
        Span::new(start, self.text_buf.len32())
    }

    /// Borrow a span's text for the minimum scope.
    ///
    /// No caller may hold the returned slice across an append; spans, not
    /// slices, are the durable references.
    pub fn buf_str(&self, span: Span) -> &str {
        let bytes = &self.text_buf[span.start as usize..span.end as usize];
        // Safety: the buffer only ever receives whole UTF-8 encoded chars
        // and spans always cover whole pushes.
        unsafe { std::str::from_utf8_unchecked(bytes) }
    }

    pub fn buf_bytes(&self, span: Span) -> &[u8] {
        &self.text_buf[span.start as usize..span.end as usize]
    }
}

/// Diagnostics.
impl Document {
    /// Report a diagnostic at an explicit source position.
    pub fn report_at(&mut self, code: ReportCode, line: u32, column: u32, details: &[&str]) {
        let level = code.level();
        self.counts.tally(level);
        let show = match level {
            ReportLevel::Info => !self.config.quiet,
            ReportLevel::Warning => self.config.show_warnings && !self.config.quiet,
            ReportLevel::Error => self.counts.errors <= self.config.show_errors,
            _ => true,
        };
        if show {
            let diag = Diagnostic {
                level,
                line,
                column,
                text: format_message(code, details),
            };
            self.sink.emit(&diag);
        }
    }

    /// Report a diagnostic at a node's source position.
    pub fn report(&mut self, code: ReportCode, node: NodeId, details: &[&str]) {
        let (line, column) = (self[node].line, self[node].column);
        self.report_at(code, line, column, details);
    }

    /// Verify every attached node's parent/sibling links. A failure means
    /// the tree was corrupted by a builder bug and the document must be
    /// abandoned.
    pub fn check_node_integrity(&self) -> Result<(), PreenError> {
        let mut seen = vec![false; self.nodes.len()];
        for id in self.nodes() {
            let ix = id.0.get() as usize;
            if seen[ix] {
                return Err(PreenError::TreeCorrupt(id.0.get()));
            }
            seen[ix] = true;

            let node = &self[id];
            if let Some(first) = node.first_child {
                if self[first].prev_sibling.is_some() {
                    return Err(PreenError::TreeCorrupt(first.0.get()));
                }
            }
            if let Some(last) = node.last_child {
                if self[last].next_sibling.is_some() {
                    return Err(PreenError::TreeCorrupt(last.0.get()));
                }
            }
            if node.first_child.is_none() != node.last_child.is_none() {
                return Err(PreenError::TreeCorrupt(id.0.get()));
            }
            for child in self.children(id) {
                if self[child].parent != Some(id) {
                    return Err(PreenError::TreeCorrupt(child.0.get()));
                }
                if let Some(next) = self[child].next_sibling {
                    if self[next].prev_sibling != Some(child) {
                        return Err(PreenError::TreeCorrupt(next.0.get()));
                    }
                }
            }

            // span bounds
            match self[id].data {
                NodeData::Doctype(s) | NodeData::Comment(s) | NodeData::ProcInstr(s)
                | NodeData::Text(s) | NodeData::CData(s) | NodeData::Section(s)
                | NodeData::Asp(s) | NodeData::Jste(s) | NodeData::Php(s) => {
                    if s.start > s.end || s.end > self.buf_len() {
                        return Err(PreenError::TreeCorrupt(id.0.get()));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// Well-known element lookups.
impl Document {
    /// The `<html>` element, if the tree has been built.
    pub fn html_elem(&self) -> Option<NodeId> {
        self.children(Document::DOCUMENT_NODE_ID)
            .find(|&id| self[id].is_elem("html"))
    }

    pub fn head_elem(&self) -> Option<NodeId> {
        let html = self.html_elem()?;
        self.children(html).find(|&id| self[id].is_elem("head"))
    }

    pub fn body_elem(&self) -> Option<NodeId> {
        let html = self.html_elem()?;
        self.children(html).find(|&id| self[id].is_elem("body"))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.nodes[1..]).finish()
    }
}

impl std::ops::Index<NodeId> for Document {
    type Output = Node;

    #[inline]
    fn index(&self, id: NodeId) -> &Node {
        &self.nodes[id.0.get() as usize]
    }
}

impl std::ops::IndexMut<NodeId> for Document {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0.get() as usize]
    }
}

pub(crate) fn push_if(stack: &mut Vec<NodeId>, id: Option<NodeId>) {
    if let Some(id) = id {
        stack.push(id);
    }
}
