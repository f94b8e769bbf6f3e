//! Mutating visitor support for `Document`.

use crate::dom::{Document, NodeId};

/// An instruction returned by the `Fn` closure used by `Document::filter`.
#[derive(Debug, PartialEq, Eq)]
pub enum Action {
    /// Continue filtering, without further changes to this `Node`.
    Continue,

    /// Replace this `Node` with its children. Equivalent to `Detach` if
    /// returned for a `Node` with no children.
    Fold,

    /// Detach this `Node`, and any children, from the tree.
    Detach,
}

/// Mutating filter methods.
impl Document {
    /// Perform a depth-first (children before parent nodes) walk of the
    /// entire document, from the document root node, allowing the provided
    /// function to make changes at each `NodeId`.
    pub fn filter<F>(&mut self, mut f: F)
        where F: FnMut(&mut Document, NodeId) -> Action
    {
        self.filter_at(Document::DOCUMENT_NODE_ID, &mut f);
    }

    /// Perform a depth-first walk from the specified node ID.
    pub fn filter_at<F>(&mut self, id: NodeId, f: &mut F) -> Action
        where F: FnMut(&mut Document, NodeId) -> Action
    {
        let mut next_child = self[id].first_child;
        while let Some(child) = next_child {
            next_child = self[child].next_sibling;
            match self.filter_at(child, f) {
                Action::Continue => {}
                Action::Fold => {
                    // next child set above, these children already walked
                    self.fold(child);
                }
                Action::Detach => {
                    self.detach(child);
                }
            }
        }
        f(self, id)
    }
}

/// Compose a new filter closure, by chaining a list of closures or
/// function paths. Each is executed in order, while the return action
/// remains `Continue`.
#[macro_export]
macro_rules! chain_filters {
    ($first:expr $(, $subs:expr)* $(,)?) => (
        |doc: &mut $crate::Document, id: $crate::NodeId| {
            let mut action: $crate::dom::filter::Action = $first(doc, id);
        $(
            if action == $crate::dom::filter::Action::Continue {
                action = $subs(doc, id);
            }
        )*
            action
        }
    );
}
