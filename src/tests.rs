//! End-to-end pipeline tests: bytes in, repaired bytes out.

use std::cell::RefCell;
use std::rc::Rc;

use crate::config::{Config, Encoding};
use crate::dom::{Document, NodeData};
use crate::logger::ensure_logger;
use crate::report::{Diagnostic, MessageSink, ReportLevel};
use crate::stream::{BufSource, Sink};
use crate::{clean_and_repair, parse_markup, pretty_print};

#[derive(Clone, Default)]
struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl Sink for SharedSink {
    fn put_byte(&mut self, b: u8) {
        self.0.borrow_mut().push(b);
    }
}

#[derive(Clone, Default)]
struct DiagSink(Rc<RefCell<Vec<Diagnostic>>>);

impl MessageSink for DiagSink {
    fn emit(&mut self, diag: &Diagnostic) {
        self.0.borrow_mut().push(diag.clone());
    }
}

/// Run the whole pipeline; output is forced so broken inputs still
/// produce bytes to inspect.
fn tidy_with<F>(input: &[u8], tweak: F) -> (String, Vec<Diagnostic>)
where
    F: FnOnce(&mut Config),
{
    ensure_logger();
    let mut config = Config::default();
    config.force_output = true;
    tweak(&mut config);

    let diags = DiagSink::default();
    let mut doc = Document::with_sink(config, Box::new(diags.clone()));
    parse_markup(&mut doc, Box::new(BufSource::new(input))).expect("parse");
    clean_and_repair(&mut doc);

    let sink = SharedSink::default();
    pretty_print(&mut doc, Box::new(sink.clone())).expect("print");

    let out = String::from_utf8(sink.0.borrow().clone()).expect("utf8 output");
    let d = diags.0.borrow().clone();
    (out, d)
}

fn tidy(input: &[u8]) -> (String, Vec<Diagnostic>) {
    tidy_with(input, |_| {})
}

/// Parse only, returning the document for tree inspection.
fn parse_only(input: &[u8]) -> Document {
    ensure_logger();
    let mut config = Config::default();
    config.force_output = true;
    let diags = DiagSink::default();
    let mut doc = Document::with_sink(config, Box::new(diags.clone()));
    parse_markup(&mut doc, Box::new(BufSource::new(input))).expect("parse");
    doc
}

#[test]
fn smart_quote_folding() {
    let input = "<p>\u{201C}hi\u{201D}\u{2014}ok</p>".as_bytes();
    let (out, _) = tidy_with(input, |c| {
        c.make_bare = true;
        c.input_encoding = Encoding::Utf8;
        c.output_encoding = Encoding::Ascii;
    });
    assert!(out.contains("<p>\"hi\"-ok</p>"), "got: {}", out);
}

#[test]
fn font_to_heading_promotion() {
    let input = b"<p><font face=\"Arial\" size=\"4\" color=\"red\">X</font></p>";
    let (out, _) = tidy_with(input, |c| {
        c.make_clean = true;
    });
    assert!(out.contains("<h3"), "size 4 under p promotes to h3: {}", out);
    assert!(out.contains("font-family: Arial"), "got: {}", out);
    assert!(out.contains("color: red"), "got: {}", out);
    assert!(!out.contains("<font"), "font must be distilled away: {}", out);
}

#[test]
fn missing_end_tag_repair() {
    let (out, diags) = tidy(b"<p>one<p>two");
    assert!(out.contains("<p>one</p>"), "got: {}", out);
    assert!(out.contains("<p>two</p>"), "got: {}", out);
    let hits = diags
        .iter()
        .filter(|d| d.text.contains("missing </p> before"))
        .count();
    assert_eq!(1, hits, "diags: {:?}", diags);
}

#[test]
fn word_bullet_list() {
    let input = b"<html xmlns:o=\"urn:schemas-microsoft-com:office:office\"><body>\
        <p class=\"MsoListBullet\">A</p><p class=\"MsoListBullet\">B</p></body></html>";
    let (out, _) = tidy_with(input, |c| {
        c.word_2000 = true;
    });
    let ul = out.find("<ul>").expect("ul present");
    let a = out.find("<li>A</li>").expect("first item");
    let b = out.find("<li>B</li>").expect("second item");
    let end = out.find("</ul>").expect("list closed");
    assert!(ul < a && a < b && b < end, "got: {}", out);
    assert!(!out.contains("MsoListBullet"), "got: {}", out);
}

#[test]
fn doctype_inferred_strict() {
    let (out, _) = tidy(b"<p>x</p>");
    assert!(
        out.starts_with("<!DOCTYPE html PUBLIC \"-//W3C//DTD HTML 4.01//EN\""),
        "got: {}",
        out
    );
}

#[test]
fn doctype_inferred_frameset() {
    let (out, _) = tidy(b"<frameset><frame></frameset>");
    assert!(out.contains("Frameset//EN"), "got: {}", out);
}

#[test]
fn utf8_bom_passthrough() {
    ensure_logger();
    let mut config = Config::default();
    config.force_output = true;
    config.input_encoding = Encoding::Utf8;
    config.output_encoding = Encoding::Utf8;
    let mut doc = Document::with_sink(config, Box::new(DiagSink::default()));
    parse_markup(
        &mut doc,
        Box::new(BufSource::new(&b"\xEF\xBB\xBF<p>x</p>"[..])),
    )
    .unwrap();
    assert!(doc.input_had_bom);
    clean_and_repair(&mut doc);
    let sink = SharedSink::default();
    pretty_print(&mut doc, Box::new(sink.clone())).unwrap();
    let bytes = sink.0.borrow().clone();
    assert_eq!(&[0xEF, 0xBB, 0xBF], &bytes[..3]);
}

#[test]
fn head_body_inference() {
    let doc = parse_only(b"<title>T</title><p>x</p>");
    let html = doc.html_elem().expect("html inferred");
    assert!(doc[html].implicit);
    let head = doc.head_elem().expect("head inferred");
    let body = doc.body_elem().expect("body inferred");
    let title = doc
        .children(head)
        .find(|&id| doc[id].is_elem("title"))
        .expect("title in head");
    assert_eq!("T", doc.text(title).unwrap().as_ref());
    assert!(doc.children(body).any(|id| doc[id].is_elem("p")));
}

#[test]
fn unbalanced_inline_duplication() {
    // <i>A<p>B</p>C</i>: the italics re-open inside the block and after
    let doc = parse_only(b"<i>A<p>B</p>C</i>");
    let body = doc.body_elem().unwrap();
    let kids: Vec<_> = doc.children(body).collect();
    assert_eq!(3, kids.len(), "tree: {:?}", doc);

    assert!(doc[kids[0]].is_elem("i"));
    assert_eq!("A", doc.text(kids[0]).unwrap().as_ref());

    assert!(doc[kids[1]].is_elem("p"));
    let inner: Vec<_> = doc.children(kids[1]).collect();
    assert_eq!(1, inner.len());
    assert!(doc[inner[0]].is_elem("i"), "italic re-opened inside block");
    assert!(doc[inner[0]].implicit);
    assert_eq!("B", doc.text(inner[0]).unwrap().as_ref());

    assert!(doc[kids[2]].is_elem("i"));
    assert!(doc[kids[2]].implicit);
    assert_eq!("C", doc.text(kids[2]).unwrap().as_ref());
}

#[test]
fn list_repair_infers_ul() {
    let doc = parse_only(b"<li>stray</li>");
    let body = doc.body_elem().unwrap();
    let ul = doc
        .children(body)
        .find(|&id| doc[id].is_elem("ul"))
        .expect("ul inferred");
    assert!(doc[ul].implicit);
    assert!(doc.children(ul).any(|id| doc[id].is_elem("li")));
}

#[test]
fn table_cell_repair() {
    let doc = parse_only(b"<table><td>x</table>");
    let body = doc.body_elem().unwrap();
    let table = doc
        .children(body)
        .find(|&id| doc[id].is_elem("table"))
        .unwrap();
    let tr = doc
        .children(table)
        .find(|&id| doc[id].is_elem("tr"))
        .expect("tr inferred");
    assert!(doc[tr].implicit);
    let td = doc
        .children(tr)
        .find(|&id| doc[id].is_elem("td"))
        .expect("td kept");
    assert_eq!("x", doc.text(td).unwrap().as_ref());
}

#[test]
fn table_exiles_inline_content() {
    let doc = parse_only(b"<table>loose<tr><td>x</td></tr></table>");
    let body = doc.body_elem().unwrap();
    let kids: Vec<_> = doc.children(body).collect();
    // the loose text lands before the table
    assert!(matches!(doc[kids[0]].data, NodeData::Text(_)));
    assert!(doc[kids[1]].is_elem("table"));
}

#[test]
fn stray_end_tag_discarded() {
    let (out, diags) = tidy(b"<p>x</b></p>");
    assert!(out.contains("<p>x</p>"), "got: {}", out);
    assert!(
        diags.iter().any(|d| d.text.contains("discarding unexpected </b>")),
        "diags: {:?}",
        diags
    );
}

#[test]
fn duplicate_frameset_reported() {
    let (_, diags) = tidy(b"<frameset><frame></frameset><frameset></frameset>");
    assert!(
        diags.iter().any(|d| d.text.contains("repeated FRAMESET")),
        "diags: {:?}",
        diags
    );
}

#[test]
fn anchor_duplicates_reported() {
    let (_, diags) = tidy(b"<a name=\"x\">1</a><a name=\"x\">2</a>");
    assert!(
        diags.iter().any(|d| d.text.contains("already defined")),
        "diags: {:?}",
        diags
    );
}

#[test]
fn output_suppressed_without_force() {
    ensure_logger();
    let config = Config::default();
    let mut doc = Document::with_sink(config, Box::new(DiagSink::default()));
    // unknown element is an error
    parse_markup(&mut doc, Box::new(BufSource::new(&b"<wibble>x</wibble>"[..]))).unwrap();
    clean_and_repair(&mut doc);
    let sink = SharedSink::default();
    let result = pretty_print(&mut doc, Box::new(sink.clone()));
    assert!(result.is_err());
    assert!(sink.0.borrow().is_empty(), "nothing written");
    assert_eq!(2, doc.counts.document_status());
}

#[test]
fn print_is_idempotent() {
    for input in &[
        &b"<p>one<p>two"[..],
        &b"<i>A<p>B</p>C</i>"[..],
        &b"<table><td>x</table>"[..],
        &b"<ul><li>a<li>b</ul>"[..],
        &b"<pre>keep  this\n  spacing</pre>"[..],
        &b"<p>1 &lt; 2 &amp; 3</p>"[..],
    ] {
        let (once, _) = tidy(input);
        let (twice, _) = tidy(once.as_bytes());
        assert_eq!(once, twice, "unstable for {:?}", String::from_utf8_lossy(input));
    }
}

#[test]
fn cleanup_is_fixpoint() {
    let input = b"<center><b>x</b></center><dir><li>y</li></dir>";
    ensure_logger();
    let mut config = Config::default();
    config.force_output = true;
    config.make_clean = true;
    let mut doc = Document::with_sink(config, Box::new(DiagSink::default()));
    parse_markup(&mut doc, Box::new(BufSource::new(&input[..]))).unwrap();

    clean_and_repair(&mut doc);
    let sink1 = SharedSink::default();
    {
        let out = crate::stream::StreamOut::new(
            Box::new(sink1.clone()),
            doc.config.output_encoding,
            doc.config.newline,
        );
        let mut p = crate::pprint::Printer::new(&doc.config, doc.versions, out);
        p.print_document(&doc);
    }

    clean_and_repair(&mut doc);
    let sink2 = SharedSink::default();
    {
        let out = crate::stream::StreamOut::new(
            Box::new(sink2.clone()),
            doc.config.output_encoding,
            doc.config.newline,
        );
        let mut p = crate::pprint::Printer::new(&doc.config, doc.versions, out);
        p.print_document(&doc);
    }

    assert_eq!(sink1.0.borrow().clone(), sink2.0.borrow().clone());
}

#[test]
fn entity_round_trip() {
    let (out, _) = tidy(b"<p>&copy; 2002 &amp; beyond</p>");
    assert!(out.contains("&copy; 2002 &amp; beyond"), "got: {}", out);
}

#[test]
fn script_body_preserved() {
    let input = b"<script>var s = '</span>'; if (1 < 2) x();</script>";
    let (out, _) = tidy_with(input, |c| {
        c.input_encoding = Encoding::Latin1;
        c.output_encoding = Encoding::Utf8;
    });
    assert!(
        out.contains("var s = '</span>'; if (1 < 2) x();"),
        "script body must pass through verbatim: {}",
        out
    );
}

#[test]
fn xhtml_output_gets_namespace() {
    let (out, _) = tidy_with(b"<p>x<br>y</p>", |c| {
        c.xhtml_out = true;
    });
    assert!(
        out.contains("<html xmlns=\"http://www.w3.org/1999/xhtml\">"),
        "got: {}",
        out
    );
    assert!(out.contains("<br />"), "got: {}", out);
    assert!(out.contains("XHTML 1.0"), "doctype: {}", out);
}

#[test]
fn xml_mode_round_trip() {
    let input = b"<root><Item attr=\"V\">text</Item><empty/></root>";
    let (out, _) = tidy_with(input, |c| {
        c.xml_tags = true;
        c.xml_out = true;
        c.output_encoding = Encoding::Utf8;
    });
    assert!(out.contains("<Item attr=\"V\">text</Item>"), "got: {}", out);
    assert!(out.contains("<empty />"), "got: {}", out);
}

#[test]
fn word_section_content_pruned() {
    let input = b"<html xmlns:o=\"x\"><body><p>keep</p>\
        <![if !supportEmptyParas]>junk<![endif]><p>after</p></body></html>";
    let (out, _) = tidy_with(input, |c| {
        c.word_2000 = true;
    });
    assert!(out.contains("keep"), "got: {}", out);
    assert!(out.contains("after"), "got: {}", out);
    assert!(!out.contains("junk"), "section content dropped: {}", out);
    assert!(!out.contains("<!["), "section markers dropped: {}", out);
}

#[test]
fn obsolete_lists_coerced() {
    let (out, diags) = tidy(b"<dir><li>x</li></dir>");
    assert!(out.contains("<ul>"), "got: {}", out);
    assert!(out.contains("<li>x</li>"), "got: {}", out);
    assert!(!out.contains("<dir"), "got: {}", out);
    assert!(
        diags.iter().any(|d| d.text.contains("replacing obsolete element")),
        "diags: {:?}",
        diags
    );

    let (out, _) = tidy(b"<menu><li>y</li></menu>");
    assert!(out.contains("<ul>"), "got: {}", out);
    assert!(!out.contains("<menu"), "got: {}", out);
}

#[test]
fn logical_emphasis_rename() {
    let (out, _) = tidy_with(b"<p><i>a</i><b>c</b></p>", |c| {
        c.logical_emphasis = true;
    });
    assert!(out.contains("<em>a</em>"), "got: {}", out);
    assert!(out.contains("<strong>c</strong>"), "got: {}", out);
}

#[test]
fn center_to_div() {
    let (out, _) = tidy_with(b"<center>m</center>", |c| {
        c.make_clean = true;
    });
    assert!(!out.contains("<center>"), "got: {}", out);
    assert!(out.contains("text-align: center"), "got: {}", out);
}

#[test]
fn drop_font_tags_discards() {
    let (out, _) = tidy_with(b"<p><font size=\"2\">x</font> y</p>", |c| {
        c.make_clean = true;
        c.drop_font_tags = true;
    });
    assert!(!out.contains("font"), "got: {}", out);
    assert!(out.contains("x"), "content kept: {}", out);
}

#[test]
fn meta_charset_rewritten() {
    let input = b"<head><meta http-equiv=\"Content-Type\" \
        content=\"text/html; charset=iso-8859-1\"></head><body>x</body>";
    let (out, _) = tidy_with(input, |c| {
        c.output_encoding = Encoding::Utf8;
    });
    assert!(out.contains("charset=utf-8"), "got: {}", out);
}

#[test]
fn warnings_count_and_status() {
    ensure_logger();
    let config = Config::default();
    let mut doc = Document::with_sink(config, Box::new(DiagSink::default()));
    parse_markup(&mut doc, Box::new(BufSource::new(&b"<p>one<p>two"[..]))).unwrap();
    assert!(doc.counts.warnings > 0);
    assert_eq!(0, doc.counts.errors);
    assert_eq!(1, doc.counts.document_status());
}

#[test]
fn tree_integrity_on_malformed_soup() {
    for input in &[
        &b"</b></i><p>x</td></tr>"[..],
        &b"<b><i>overlap</b></i>"[..],
        &b"<table><table><td></td>"[..],
        &b"<dl><p>terms</p><dt>a<dd>b</dl>"[..],
        &b"<select><p>no</p><option>a</select>"[..],
        &b"<a href='x><b>unterminated"[..],
    ] {
        let doc = parse_only(input);
        doc.check_node_integrity().expect("integrity");
    }
}

#[test]
fn literal_attributes_preserved() {
    let (out, _) = tidy_with(b"<p title=\"two  spaces\">x</p>", |c| {
        c.literal_attributes = true;
    });
    assert!(out.contains("two  spaces"), "got: {}", out);
}

#[test]
fn hide_endtags_omits_optional() {
    let (out, _) = tidy_with(b"<ul><li>a</li><li>b</li></ul>", |c| {
        c.hide_endtags = true;
    });
    assert!(out.contains("<li>a"), "got: {}", out);
    assert!(!out.contains("</li>"), "got: {}", out);
}

#[test]
fn config_restored_after_print() {
    ensure_logger();
    let mut config = Config::default();
    config.force_output = true;
    let mut doc = Document::with_sink(config, Box::new(DiagSink::default()));
    parse_markup(&mut doc, Box::new(BufSource::new(&b"<p>x</p>"[..]))).unwrap();
    // a pass mutating configuration mid-flight must not leak
    doc.config.indent_spaces = 11;
    let sink = SharedSink::default();
    pretty_print(&mut doc, Box::new(sink.clone())).unwrap();
    assert_eq!(2, doc.config.indent_spaces, "snapshot restored");
}

#[test]
fn error_level_diags_are_errors() {
    ensure_logger();
    let config = Config::default();
    let diags = DiagSink::default();
    let mut doc = Document::with_sink(config, Box::new(diags.clone()));
    parse_markup(&mut doc, Box::new(BufSource::new(&b"<wibble>x</wibble>"[..]))).unwrap();
    assert!(doc.counts.errors > 0);
    assert!(diags
        .0
        .borrow()
        .iter()
        .any(|d| d.level == ReportLevel::Error));
}
