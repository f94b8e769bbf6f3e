use rand::Rng;

use crate::config::Config;
use crate::dom::filter::Action;
use crate::dom::meta::{lookup_tag, CM_BLOCK, CM_INLINE};
use crate::dom::{Document, Node, NodeData, Span};
use crate::logger::ensure_logger;

fn doc() -> Document {
    Document::new(Config::default())
}

fn new_elem(doc: &Document, name: &str) -> Node {
    let mut n = Node::new_element(name, lookup_tag(name, &doc.config));
    n.closed = true;
    n
}

#[test]
fn empty_document() {
    ensure_logger();
    let doc = doc();
    assert_eq!(None, doc.html_elem(), "no root element");
    assert_eq!(1, doc.nodes().count(), "one document node");
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn one_element() {
    ensure_logger();
    let mut doc = doc();
    let element = new_elem(&doc, "html");
    let id = doc.append_child(Document::DOCUMENT_NODE_ID, element);

    assert_eq!(Some(id), doc.html_elem());
    assert_eq!(2, doc.nodes().count(), "document + 1 element");
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn text_in_buffer() {
    ensure_logger();
    let mut doc = doc();
    let root = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "p"));
    let span = doc.buf_push_str("foo");
    doc.append_child(root, Node::new(NodeData::Text(span)));
    let span2 = doc.buf_push_str("bar");
    doc.append_child(root, Node::new(NodeData::Text(span2)));

    assert_eq!("foobar", doc.text(root).unwrap().as_ref());
    assert_eq!("foo", doc.buf_str(span));
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn spans_survive_buffer_growth() {
    ensure_logger();
    let mut doc = doc();
    let span = doc.buf_push_str("anchor");
    // force several reallocations
    for _ in 0..4096 {
        doc.buf_push_str("0123456789abcdef");
    }
    assert_eq!("anchor", doc.buf_str(span));
}

#[test]
fn detach_and_fold() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    let strike = doc.append_child(body, new_elem(&doc, "strike"));
    let span = doc.buf_push_str("kept");
    doc.append_child(strike, Node::new(NodeData::Text(span)));

    doc.fold(strike);
    assert_eq!("kept", doc.text(body).unwrap().as_ref());
    let kids: Vec<_> = doc.children(body).collect();
    assert_eq!(1, kids.len());
    assert!(doc[kids[0]].data.is_text());
    assert!(doc.check_node_integrity().is_ok());

    doc.detach(kids[0]);
    assert_eq!(None, doc.text(body));
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn insert_as_parent() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    let li = doc.append_child(body, new_elem(&doc, "li"));
    let ul = doc.insert_as_parent(li, new_elem(&doc, "ul"));

    assert_eq!(Some(ul), doc[li].parent());
    assert_eq!(Some(body), doc[ul].parent());
    assert_eq!(vec![ul], doc.children(body).collect::<Vec<_>>());
    assert_eq!(vec![li], doc.children(ul).collect::<Vec<_>>());
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn sibling_insert_ordering() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    let b = doc.append_child(body, new_elem(&doc, "b"));
    let a = doc.insert_before_sibling(b, new_elem(&doc, "a"));
    let names: Vec<String> = doc
        .children(body)
        .map(|id| doc[id].as_element().unwrap().name.to_string())
        .collect();
    assert_eq!(vec!["a", "b"], names);
    assert_eq!(Some(a), doc[b].prev_sibling());
    assert_eq!(Some(b), doc[a].next_sibling());
}

#[test]
fn deep_clone_reinterns_text() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    let p = doc.append_child(body, new_elem(&doc, "p"));
    let span = doc.buf_push_str("cloned text");
    doc.append_child(p, Node::new(NodeData::Text(span)));

    let copy = doc.deep_clone(body);
    assert_eq!("cloned text", copy.text(Document::DOCUMENT_NODE_ID).unwrap().as_ref());
    assert!(copy.check_node_integrity().is_ok());
}

#[test]
fn filter_fold_and_detach() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    let strike = doc.append_child(body, new_elem(&doc, "strike"));
    let i = doc.append_child(strike, new_elem(&doc, "i"));
    let span = doc.buf_push_str("x");
    doc.append_child(i, Node::new(NodeData::Text(span)));

    doc.filter(|doc, id| {
        if doc[id].is_elem("strike") { Action::Fold } else { Action::Continue }
    });
    assert_eq!(Some(body), doc[i].parent());

    doc.filter(|doc, id| {
        if doc[id].is_elem("i") { Action::Detach } else { Action::Continue }
    });
    assert_eq!(0, doc.children(body).count());
    assert!(doc.check_node_integrity().is_ok());
}

#[test]
fn chained_filters() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    doc.append_child(body, new_elem(&doc, "b"));
    doc.append_child(body, new_elem(&doc, "i"));

    let f = chain_filters!(
        |doc: &mut Document, id| {
            if doc[id].is_elem("b") { Action::Detach } else { Action::Continue }
        },
        |doc: &mut Document, id| {
            if doc[id].is_elem("i") { Action::Detach } else { Action::Continue }
        },
    );
    doc.filter(f);
    assert_eq!(0, doc.children(body).count());
}

#[test]
fn model_flags() {
    ensure_logger();
    let doc = doc();
    let p = new_elem(&doc, "p");
    assert!(p.has_model(CM_BLOCK));
    let em = new_elem(&doc, "em");
    assert!(em.has_model(CM_INLINE));
}

#[test]
fn integrity_detects_bad_span() {
    ensure_logger();
    let mut doc = doc();
    let body = doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"));
    doc.append_child(body, Node::new(NodeData::Text(Span::new(0, 64))));
    assert!(doc.check_node_integrity().is_err());
}

#[test]
fn random_tree_mutations_keep_integrity() {
    ensure_logger();
    let mut rng = rand::thread_rng();
    let mut doc = doc();
    let mut live = vec![doc.append_child(Document::DOCUMENT_NODE_ID, new_elem(&doc, "body"))];

    for _ in 0..500 {
        match rng.gen_range(0, 4) {
            0 => {
                let parent = live[rng.gen_range(0, live.len())];
                let id = doc.append_child(parent, new_elem(&doc, "div"));
                live.push(id);
            }
            1 => {
                let sib = live[rng.gen_range(0, live.len())];
                if doc[sib].parent().is_some() {
                    let id = doc.insert_before_sibling(sib, new_elem(&doc, "span"));
                    live.push(id);
                }
            }
            2 if live.len() > 1 => {
                let ix = rng.gen_range(1, live.len());
                let id = live[ix];
                doc.detach(id);
                // detached subtree is dropped from the live set
                let mut gone = vec![id];
                let mut stack = vec![id];
                while let Some(n) = stack.pop() {
                    for c in doc.children(n) {
                        gone.push(c);
                        stack.push(c);
                    }
                }
                live.retain(|n| !gone.contains(n));
            }
            _ if live.len() > 1 => {
                let ix = rng.gen_range(1, live.len());
                let id = live[ix];
                if doc[id].parent().is_some() {
                    doc.fold(id);
                    live.remove(ix);
                }
            }
            _ => {}
        }
        doc.check_node_integrity().expect("integrity after mutation");
    }
}
