//! The inline stack: Mosaic-compatible recovery for overlapping emphasis.
//!
//! Open inline elements are remembered here so that when a new block opens
//! while `<i>`-like elements are still unclosed, duplicate start tags can
//! be re-emitted inside the block, and `<i>A<p>B</p>C</i>` renders with
//! `B` italicized.

use tendril::StrTendril;

use crate::dom::meta::{Routine, TagInfo, CM_INLINE, CM_OBJECT};
use crate::dom::{Attr, Document, Element, Node, NodeData, NodeId};
use crate::lexer::Lexer;

/// A cloned inline element header: everything needed to re-open it.
#[derive(Clone, Debug)]
pub struct IStackEntry {
    pub name: StrTendril,
    pub tag: TagInfo,
    pub attrs: Vec<Attr>,
}

impl Lexer {
    /// Remember an open inline element. Implicit elements, `object`-family
    /// elements, and a repeat of the topmost entry are not pushed.
    pub fn push_inline(&mut self, doc: &Document, node: NodeId) {
        let node = &doc[node];
        if node.implicit {
            return;
        }
        let elem = match node.as_element() {
            Some(e) => e,
            None => return,
        };
        let tag = match elem.tag {
            Some(t) => t,
            None => return,
        };
        if tag.model & CM_INLINE == 0 || tag.model & CM_OBJECT != 0 {
            return;
        }
        // only plain inline containers duplicate; script, select and
        // friends manage their own content
        if tag.routine != Routine::Inline {
            return;
        }

        // avoid <em><em>... building up the stack
        if let Some(top) = self.istack.last() {
            if top.name == elem.name {
                return;
            }
        }

        self.istack.push(IStackEntry {
            name: elem.name.clone(),
            tag,
            attrs: elem.attrs.clone(),
        });
    }

    /// Remove the topmost entry for an inline end tag; a stray end tag
    /// with no matching entry is the caller's to report.
    pub fn pop_inline(&mut self, doc: &Document, node: Option<NodeId>) {
        if let Some(node) = node {
            let name = match doc[node].data {
                NodeData::Elem(ref e) | NodeData::EndTag(ref e) => e.name.clone(),
                _ => return,
            };
            // only pop entries pushed since the last stack barrier
            let base = self.istack_base;
            if let Some(pos) = self.istack[base..].iter().rposition(|e| e.name == name) {
                self.istack.remove(base + pos);
            }
        } else if self.istack.len() > self.istack_base {
            self.istack.pop();
        }
    }

    /// Is an entry for this element's tag on the stack?
    pub fn is_pushed(&self, doc: &Document, node: NodeId) -> bool {
        let name = match doc[node].data {
            NodeData::Elem(ref e) | NodeData::EndTag(ref e) => &e.name,
            _ => return false,
        };
        self.istack[self.istack_base..].iter().any(|e| &e.name == name)
    }

    /// Queue inferred duplicates of every active stack entry, so the next
    /// `get_token` calls return re-opened inline elements inside a new
    /// block. Returns how many were queued.
    pub fn inline_dup(&mut self, doc: &mut Document) -> usize {
        let entries: Vec<IStackEntry> =
            self.istack[self.istack_base..].to_vec();
        let n = entries.len();
        for entry in entries {
            let mut node = Node::new(NodeData::Elem(Element {
                name: entry.name.clone(),
                tag: Some(entry.tag),
                attrs: entry.attrs.clone(),
                self_closing: false,
            }));
            node.implicit = true;
            let id = doc.push_node(node);
            self.insert.push_back(id);
        }
        n
    }

    /// Suppress duplication until the matching `restore_stack_base`; used
    /// on entry to tables so cell content starts clean.
    pub fn defer_dup(&mut self) -> usize {
        let saved = self.istack_base;
        self.istack_base = self.istack.len();
        saved
    }

    pub fn restore_stack_base(&mut self, base: usize) {
        debug_assert!(base <= self.istack.len());
        self.istack_base = base;
    }

    /// True when inline elements above the barrier remain open.
    pub fn inline_open(&self) -> bool {
        self.istack.len() > self.istack_base
    }
}
