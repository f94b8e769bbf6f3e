//! Static metadata for HTML elements and attributes.
//!
//! Each element entry carries a content-model bit set, the HTML versions
//! in which it is legal, and the parser routine that governs its children.
//! User-declared tags from configuration layer on top of the static table.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::config::Config;
use crate::dom::{Document, NodeId};
use crate::report::ReportCode;

// HTML version bits.
pub const VERS_UNKNOWN: u16 = 0;
pub const VERS_HTML20: u16 = 1;
pub const VERS_HTML32: u16 = 2;
pub const VERS_HTML40_STRICT: u16 = 4;
pub const VERS_HTML40_LOOSE: u16 = 8;
pub const VERS_FRAMESET: u16 = 16;
pub const VERS_XML: u16 = 32;
pub const VERS_NETSCAPE: u16 = 64;
pub const VERS_MICROSOFT: u16 = 128;
pub const VERS_SUN: u16 = 256;
pub const VERS_MALFORMED: u16 = 512;
pub const VERS_XHTML11: u16 = 1024;

pub const VERS_PROPRIETARY: u16 = VERS_NETSCAPE | VERS_MICROSOFT | VERS_SUN;
pub const VERS_HTML40: u16 = VERS_HTML40_STRICT | VERS_HTML40_LOOSE | VERS_FRAMESET;
pub const VERS_IFRAME: u16 = VERS_HTML40_LOOSE | VERS_FRAMESET;
pub const VERS_LOOSE: u16 = VERS_HTML20 | VERS_HTML32 | VERS_IFRAME;
pub const VERS_FROM32: u16 = VERS_HTML32 | VERS_HTML40;
pub const VERS_EVENTS: u16 = VERS_HTML40 | VERS_XHTML11;
pub const VERS_FROM40: u16 = VERS_HTML40 | VERS_XHTML11;
pub const VERS_ALL: u16 = VERS_HTML20 | VERS_HTML32 | VERS_FROM40;

// Content model bits.
pub const CM_UNKNOWN: u32 = 0;
/// Elements with no content: defined end tag forbidden.
pub const CM_EMPTY: u32 = 1;
/// Elements that appear outside of BODY.
pub const CM_HTML: u32 = 1 << 1;
/// Elements that can appear within HEAD.
pub const CM_HEAD: u32 = 1 << 2;
/// HTML "block" elements.
pub const CM_BLOCK: u32 = 1 << 3;
/// HTML "inline" elements.
pub const CM_INLINE: u32 = 1 << 4;
/// Elements that mark the start of a list item.
pub const CM_LIST: u32 = 1 << 5;
/// Elements that mark a definition-list term or description.
pub const CM_DEFLIST: u32 = 1 << 6;
/// Elements that can appear inside TABLE.
pub const CM_TABLE: u32 = 1 << 7;
/// Table row groups: THEAD, TBODY, TFOOT.
pub const CM_ROWGRP: u32 = 1 << 8;
/// Table row.
pub const CM_ROW: u32 = 1 << 9;
/// Form fields.
pub const CM_FIELD: u32 = 1 << 10;
/// Object and applet content.
pub const CM_OBJECT: u32 = 1 << 11;
/// Elements that can appear inside object/applet.
pub const CM_PARAM: u32 = 1 << 12;
/// Frameset content.
pub const CM_FRAMES: u32 = 1 << 13;
/// Headings H1..H6.
pub const CM_HEADING: u32 = 1 << 14;
/// OPTION and OPTGROUP content.
pub const CM_OPT: u32 = 1 << 15;
/// Elements treated as images for alignment purposes.
pub const CM_IMG: u32 = 1 << 16;
/// Elements with mixed (block and inline) content.
pub const CM_MIXED: u32 = 1 << 17;
/// Content should not increase indentation on output.
pub const CM_NO_INDENT: u32 = 1 << 18;
/// Obsolete in the targeted versions.
pub const CM_OBSOLETE: u32 = 1 << 19;
/// Proprietary or user-declared.
pub const CM_NEW: u32 = 1 << 20;
/// The start tag may be omitted.
pub const CM_OMITST: u32 = 1 << 21;

/// Per-element parser routine, bound through the dictionary and
/// dispatched by the tree builder.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Routine {
    Empty,
    Html,
    Head,
    Body,
    Frameset,
    NoFrames,
    Title,
    Script,
    Text,
    Pre,
    Inline,
    Block,
    List,
    DefList,
    Table,
    ColGroup,
    RowGroup,
    Row,
    Cell,
    Select,
    OptGroup,
}

/// Resolved dictionary information carried on element nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TagInfo {
    pub model: u32,
    pub versions: u16,
    pub routine: Routine,
}

macro_rules! tags {
    ($(($name:literal, $vers:expr, $model:expr, $routine:ident),)+) => {{
        let mut m = HashMap::new();
        $(
            m.insert($name, TagInfo {
                model: $model,
                versions: $vers,
                routine: Routine::$routine,
            });
        )+
        m
    }};
}

lazy_static! {
    /// A static lookup table for metadata on known HTML tags.
    pub static ref TAG_META: HashMap<&'static str, TagInfo> = tags![
        ("html", VERS_ALL, CM_HTML | CM_OPT | CM_OMITST, Html),
        ("head", VERS_ALL, CM_HTML | CM_OPT | CM_OMITST, Head),
        ("body", VERS_ALL, CM_HTML | CM_OPT | CM_OMITST, Body),
        ("frameset", VERS_FRAMESET, CM_HTML | CM_FRAMES, Frameset),
        ("frame", VERS_FRAMESET, CM_FRAMES | CM_EMPTY, Empty),
        ("noframes", VERS_IFRAME, CM_BLOCK | CM_FRAMES, NoFrames),
        ("iframe", VERS_IFRAME, CM_INLINE, Block),

        ("title", VERS_ALL, CM_HEAD, Title),
        ("base", VERS_ALL, CM_HEAD | CM_EMPTY, Empty),
        ("isindex", VERS_LOOSE, CM_BLOCK | CM_EMPTY, Empty),
        ("link", VERS_ALL, CM_HEAD | CM_EMPTY, Empty),
        ("meta", VERS_ALL, CM_HEAD | CM_EMPTY, Empty),
        ("style", VERS_FROM32, CM_HEAD, Script),
        ("script", VERS_FROM32, CM_HEAD | CM_MIXED | CM_BLOCK | CM_INLINE, Script),
        ("noscript", VERS_FROM40, CM_BLOCK | CM_INLINE | CM_MIXED, Block),
        ("server", VERS_NETSCAPE, CM_HEAD, Script),

        ("p", VERS_ALL, CM_BLOCK | CM_OPT, Inline),
        ("h1", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("h2", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("h3", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("h4", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("h5", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("h6", VERS_ALL, CM_BLOCK | CM_HEADING, Inline),
        ("div", VERS_FROM32, CM_BLOCK, Block),
        ("address", VERS_ALL, CM_BLOCK, Block),
        ("blockquote", VERS_ALL, CM_BLOCK, Block),
        ("center", VERS_LOOSE, CM_BLOCK, Block),
        ("hr", VERS_ALL, CM_BLOCK | CM_EMPTY, Empty),
        ("pre", VERS_ALL, CM_BLOCK, Pre),
        ("listing", VERS_ALL, CM_BLOCK | CM_OBSOLETE, Pre),
        ("xmp", VERS_ALL, CM_BLOCK | CM_OBSOLETE, Pre),
        ("plaintext", VERS_ALL, CM_BLOCK | CM_OBSOLETE, Pre),
        ("multicol", VERS_NETSCAPE, CM_BLOCK, Block),
        ("nolayer", VERS_NETSCAPE, CM_BLOCK | CM_INLINE | CM_MIXED, Block),
        ("layer", VERS_NETSCAPE, CM_BLOCK, Block),
        ("ilayer", VERS_NETSCAPE, CM_INLINE, Inline),
        ("nosave", VERS_NETSCAPE, CM_BLOCK, Block),

        ("ul", VERS_ALL, CM_BLOCK | CM_LIST, List),
        ("ol", VERS_ALL, CM_BLOCK | CM_LIST, List),
        ("dir", VERS_LOOSE, CM_BLOCK | CM_LIST | CM_OBSOLETE, List),
        ("menu", VERS_LOOSE, CM_BLOCK | CM_LIST | CM_OBSOLETE, List),
        ("li", VERS_ALL, CM_LIST | CM_OPT | CM_NO_INDENT, Block),
        ("dl", VERS_ALL, CM_BLOCK | CM_DEFLIST, DefList),
        ("dt", VERS_ALL, CM_DEFLIST | CM_OPT | CM_NO_INDENT, Inline),
        ("dd", VERS_ALL, CM_DEFLIST | CM_OPT | CM_NO_INDENT, Block),

        ("table", VERS_FROM32, CM_BLOCK, Table),
        ("caption", VERS_FROM32, CM_TABLE, Inline),
        ("colgroup", VERS_HTML40, CM_TABLE | CM_OPT, ColGroup),
        ("col", VERS_HTML40, CM_TABLE | CM_EMPTY, Empty),
        ("thead", VERS_HTML40, CM_TABLE | CM_ROWGRP | CM_OPT, RowGroup),
        ("tbody", VERS_HTML40, CM_TABLE | CM_ROWGRP | CM_OPT, RowGroup),
        ("tfoot", VERS_HTML40, CM_TABLE | CM_ROWGRP | CM_OPT, RowGroup),
        ("tr", VERS_FROM32, CM_TABLE | CM_OPT, Row),
        ("td", VERS_FROM32, CM_ROW | CM_OPT | CM_NO_INDENT, Cell),
        ("th", VERS_FROM32, CM_ROW | CM_OPT | CM_NO_INDENT, Cell),

        ("form", VERS_ALL, CM_BLOCK, Block),
        ("fieldset", VERS_HTML40, CM_BLOCK, Block),
        ("legend", VERS_HTML40, CM_INLINE, Inline),
        ("label", VERS_HTML40, CM_INLINE, Inline),
        ("input", VERS_ALL, CM_INLINE | CM_IMG | CM_EMPTY, Empty),
        ("select", VERS_ALL, CM_INLINE | CM_FIELD, Select),
        ("optgroup", VERS_HTML40, CM_FIELD | CM_OPT, OptGroup),
        ("option", VERS_ALL, CM_FIELD | CM_OPT, Text),
        ("textarea", VERS_ALL, CM_INLINE | CM_FIELD, Text),
        ("button", VERS_HTML40, CM_INLINE, Inline),
        ("keygen", VERS_NETSCAPE, CM_INLINE | CM_EMPTY, Empty),

        ("a", VERS_ALL, CM_INLINE, Inline),
        ("abbr", VERS_HTML40, CM_INLINE, Inline),
        ("acronym", VERS_HTML40, CM_INLINE, Inline),
        ("b", VERS_ALL, CM_INLINE, Inline),
        ("bdo", VERS_HTML40, CM_INLINE, Inline),
        ("big", VERS_FROM32, CM_INLINE, Inline),
        ("blink", VERS_PROPRIETARY, CM_INLINE, Inline),
        ("br", VERS_ALL, CM_INLINE | CM_EMPTY, Empty),
        ("cite", VERS_ALL, CM_INLINE, Inline),
        ("code", VERS_ALL, CM_INLINE, Inline),
        ("dfn", VERS_ALL, CM_INLINE, Inline),
        ("em", VERS_ALL, CM_INLINE, Inline),
        ("font", VERS_LOOSE, CM_INLINE, Inline),
        ("basefont", VERS_LOOSE, CM_INLINE | CM_EMPTY, Empty),
        ("i", VERS_ALL, CM_INLINE, Inline),
        ("ins", VERS_HTML40, CM_INLINE | CM_BLOCK | CM_MIXED, Inline),
        ("del", VERS_HTML40, CM_INLINE | CM_BLOCK | CM_MIXED, Inline),
        ("kbd", VERS_ALL, CM_INLINE, Inline),
        ("marquee", VERS_MICROSOFT, CM_INLINE | CM_OPT, Inline),
        ("nobr", VERS_PROPRIETARY, CM_INLINE, Inline),
        ("q", VERS_HTML40, CM_INLINE, Inline),
        ("s", VERS_LOOSE, CM_INLINE, Inline),
        ("samp", VERS_ALL, CM_INLINE, Inline),
        ("small", VERS_FROM32, CM_INLINE, Inline),
        ("span", VERS_FROM40, CM_INLINE, Inline),
        ("strike", VERS_LOOSE, CM_INLINE, Inline),
        ("strong", VERS_ALL, CM_INLINE, Inline),
        ("sub", VERS_FROM32, CM_INLINE, Inline),
        ("sup", VERS_FROM32, CM_INLINE, Inline),
        ("tt", VERS_ALL, CM_INLINE, Inline),
        ("u", VERS_LOOSE, CM_INLINE, Inline),
        ("var", VERS_ALL, CM_INLINE, Inline),
        ("wbr", VERS_PROPRIETARY, CM_INLINE | CM_EMPTY, Empty),

        ("img", VERS_ALL, CM_INLINE | CM_IMG | CM_EMPTY, Empty),
        ("map", VERS_FROM32, CM_INLINE, Block),
        ("area", VERS_FROM32, CM_BLOCK | CM_EMPTY, Empty),
        ("object", VERS_HTML40, CM_OBJECT | CM_HEAD | CM_IMG | CM_INLINE | CM_PARAM, Block),
        ("applet", VERS_LOOSE, CM_OBJECT | CM_IMG | CM_INLINE | CM_PARAM, Block),
        ("servlet", VERS_SUN, CM_OBJECT | CM_IMG | CM_INLINE | CM_PARAM, Block),
        ("param", VERS_FROM32, CM_INLINE | CM_EMPTY, Empty),
        ("embed", VERS_NETSCAPE, CM_INLINE | CM_IMG | CM_EMPTY, Empty),
        ("noembed", VERS_NETSCAPE, CM_INLINE, Block),
        ("bgsound", VERS_MICROSOFT, CM_HEAD | CM_EMPTY, Empty),
        ("comment", VERS_MICROSOFT, CM_INLINE, Inline),
        ("spacer", VERS_NETSCAPE, CM_INLINE | CM_EMPTY, Empty),
    ];
}

/// Look up dictionary info for a lowercased tag name, including any tags
/// the configuration declares. XML lexing skips the dictionary entirely.
pub fn lookup_tag(name: &str, config: &Config) -> Option<TagInfo> {
    if config.xml_lexing() {
        return None;
    }
    if let Some(info) = TAG_META.get(name) {
        return Some(*info);
    }
    let listed = |list: &Vec<String>| list.iter().any(|t| t == name);
    if listed(&config.new_empty_tags) {
        // empty also implies inline unless separately declared block
        let model = if listed(&config.new_blocklevel_tags) {
            CM_EMPTY | CM_BLOCK | CM_NEW
        } else {
            CM_EMPTY | CM_INLINE | CM_NEW
        };
        return Some(TagInfo { model, versions: VERS_PROPRIETARY, routine: Routine::Empty });
    }
    if listed(&config.new_pre_tags) {
        return Some(TagInfo {
            model: CM_BLOCK | CM_NEW,
            versions: VERS_PROPRIETARY,
            routine: Routine::Pre,
        });
    }
    if listed(&config.new_inline_tags) {
        return Some(TagInfo {
            model: CM_INLINE | CM_NEW,
            versions: VERS_PROPRIETARY,
            routine: Routine::Inline,
        });
    }
    if listed(&config.new_blocklevel_tags) {
        return Some(TagInfo {
            model: CM_BLOCK | CM_NEW,
            versions: VERS_PROPRIETARY,
            routine: Routine::Block,
        });
    }
    None
}

/// Elements whose `id`/`name` attributes define document anchors.
pub fn is_anchor_element(name: &str) -> bool {
    matches!(name, "a" | "applet" | "form" | "frame" | "iframe" | "img" | "map")
}

/// Value disciplines for known attributes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttrCheck {
    Text,
    Url,
    Script,
    Name,
    Id,
    Bool,
    Length,
    Number,
    Character,
    Color,
    Align,
    Valign,
    Clear,
    Shape,
    Scope,
    Target,
    VType,
    TextDir,
    Scroll,
    Lang,
    Charset,
}

/// One known attribute: versions and value discipline.
#[derive(Copy, Clone, Debug)]
pub struct AttrDef {
    pub versions: u16,
    pub how: AttrCheck,
}

macro_rules! attrs {
    ($(($name:literal, $vers:expr, $how:ident),)+) => {{
        let mut m = HashMap::new();
        $(
            m.insert($name, AttrDef { versions: $vers, how: AttrCheck::$how });
        )+
        m
    }};
}

lazy_static! {
    /// A static lookup table for metadata on known attributes.
    pub static ref ATTR_META: HashMap<&'static str, AttrDef> = attrs![
        ("abbr", VERS_HTML40, Text),
        ("accept", VERS_ALL, Text),
        ("accept-charset", VERS_HTML40, Charset),
        ("accesskey", VERS_HTML40, Character),
        ("action", VERS_ALL, Url),
        ("align", VERS_ALL, Align),
        ("alink", VERS_LOOSE, Color),
        ("alt", VERS_ALL, Text),
        ("archive", VERS_HTML40, Url),
        ("axis", VERS_HTML40, Text),
        ("background", VERS_LOOSE, Url),
        ("bgcolor", VERS_LOOSE, Color),
        ("border", VERS_FROM32, Length),
        ("cellpadding", VERS_FROM32, Length),
        ("cellspacing", VERS_FROM32, Length),
        ("char", VERS_HTML40, Character),
        ("charoff", VERS_HTML40, Length),
        ("charset", VERS_HTML40, Charset),
        ("checked", VERS_ALL, Bool),
        ("cite", VERS_HTML40, Url),
        ("class", VERS_FROM40, Text),
        ("classid", VERS_HTML40, Url),
        ("clear", VERS_LOOSE, Clear),
        ("code", VERS_LOOSE, Text),
        ("codebase", VERS_HTML40, Url),
        ("codetype", VERS_HTML40, Text),
        ("color", VERS_LOOSE, Color),
        ("cols", VERS_IFRAME, Text),
        ("colspan", VERS_FROM32, Number),
        ("compact", VERS_ALL, Bool),
        ("content", VERS_ALL, Text),
        ("coords", VERS_FROM32, Text),
        ("data", VERS_HTML40, Url),
        ("datetime", VERS_HTML40, Text),
        ("declare", VERS_HTML40, Bool),
        ("defer", VERS_HTML40, Bool),
        ("dir", VERS_HTML40, TextDir),
        ("disabled", VERS_HTML40, Bool),
        ("enctype", VERS_ALL, Text),
        ("face", VERS_LOOSE, Text),
        ("for", VERS_HTML40, Id),
        ("frame", VERS_HTML40, Text),
        ("frameborder", VERS_IFRAME, Number),
        ("framespacing", VERS_PROPRIETARY, Number),
        ("headers", VERS_HTML40, Text),
        ("height", VERS_FROM32, Length),
        ("href", VERS_ALL, Url),
        ("hreflang", VERS_HTML40, Lang),
        ("hspace", VERS_LOOSE, Number),
        ("http-equiv", VERS_ALL, Text),
        ("id", VERS_FROM40, Id),
        ("ismap", VERS_ALL, Bool),
        ("label", VERS_HTML40, Text),
        ("lang", VERS_HTML40, Lang),
        ("language", VERS_LOOSE, Text),
        ("link", VERS_LOOSE, Color),
        ("longdesc", VERS_HTML40, Url),
        ("lowsrc", VERS_PROPRIETARY, Url),
        ("marginheight", VERS_IFRAME, Number),
        ("marginwidth", VERS_IFRAME, Number),
        ("maxlength", VERS_ALL, Number),
        ("media", VERS_HTML40, Text),
        ("method", VERS_ALL, Text),
        ("multiple", VERS_ALL, Bool),
        ("name", VERS_ALL, Name),
        ("nohref", VERS_FROM32, Bool),
        ("noresize", VERS_FRAMESET, Bool),
        ("noshade", VERS_LOOSE, Bool),
        ("nowrap", VERS_LOOSE, Bool),
        ("object", VERS_HTML40_LOOSE, Text),
        ("onblur", VERS_EVENTS, Script),
        ("onchange", VERS_EVENTS, Script),
        ("onclick", VERS_EVENTS, Script),
        ("ondblclick", VERS_EVENTS, Script),
        ("onfocus", VERS_EVENTS, Script),
        ("onkeydown", VERS_EVENTS, Script),
        ("onkeypress", VERS_EVENTS, Script),
        ("onkeyup", VERS_EVENTS, Script),
        ("onload", VERS_EVENTS, Script),
        ("onmousedown", VERS_EVENTS, Script),
        ("onmousemove", VERS_EVENTS, Script),
        ("onmouseout", VERS_EVENTS, Script),
        ("onmouseover", VERS_EVENTS, Script),
        ("onmouseup", VERS_EVENTS, Script),
        ("onreset", VERS_EVENTS, Script),
        ("onselect", VERS_EVENTS, Script),
        ("onsubmit", VERS_EVENTS, Script),
        ("onunload", VERS_EVENTS, Script),
        ("profile", VERS_HTML40, Url),
        ("prompt", VERS_LOOSE, Text),
        ("readonly", VERS_HTML40, Bool),
        ("rel", VERS_ALL, Text),
        ("rev", VERS_ALL, Text),
        ("rows", VERS_ALL, Text),
        ("rowspan", VERS_FROM32, Number),
        ("rules", VERS_HTML40, Text),
        ("scheme", VERS_HTML40, Text),
        ("scope", VERS_HTML40, Scope),
        ("scrolling", VERS_IFRAME, Scroll),
        ("selected", VERS_ALL, Bool),
        ("shape", VERS_FROM32, Shape),
        ("size", VERS_LOOSE, Number),
        ("span", VERS_HTML40, Number),
        ("src", VERS_ALL, Url),
        ("standby", VERS_HTML40, Text),
        ("start", VERS_ALL, Number),
        ("style", VERS_HTML40, Text),
        ("summary", VERS_HTML40, Text),
        ("tabindex", VERS_HTML40, Number),
        ("target", VERS_HTML40, Target),
        ("text", VERS_LOOSE, Color),
        ("title", VERS_HTML40, Text),
        ("type", VERS_FROM32, Text),
        ("usemap", VERS_ALL, Url),
        ("valign", VERS_FROM32, Valign),
        ("value", VERS_ALL, Text),
        ("valuetype", VERS_HTML40, VType),
        ("vlink", VERS_LOOSE, Color),
        ("vspace", VERS_LOOSE, Number),
        ("width", VERS_FROM32, Length),
        ("wrap", VERS_NETSCAPE, Text),
        ("xml:lang", VERS_XML, Lang),
        ("xml:space", VERS_XML, Text),
        ("xmlns", VERS_ALL, Text),
    ];
}

pub fn lookup_attr(name: &str) -> Option<&'static AttrDef> {
    ATTR_META.get(name)
}

/// Constrain the document's possible-versions mask; proprietary bits stay
/// possible so detection degrades gracefully.
pub fn constrain_version(doc: &mut Document, versions: u16) {
    doc.versions &= versions | VERS_PROPRIETARY;
}

fn is_valid_xml_id(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if crate::chars::is_letter(c) || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(crate::chars::is_namechar)
}

fn is_word_list(value: &str, words: &[&str]) -> bool {
    words.iter().any(|w| value.eq_ignore_ascii_case(w))
}

/// Validate and repair the attributes of an element node: duplicate
/// removal, value checks, version narrowing, anchor registration.
pub fn check_attributes(doc: &mut Document, node: NodeId) {
    // duplicates: keep the first occurrence, drop the rest
    let mut i = 0;
    loop {
        let elem = match doc[node].as_element() {
            Some(e) => e,
            None => return,
        };
        if i >= elem.attrs.len() {
            break;
        }
        let dup = match elem.attrs[i].name {
            Some(ref name) => {
                let name = name.clone();
                elem.attrs[..i].iter().any(|a| a.is_named(&name))
            }
            None => false,
        };
        if dup {
            let name = {
                let elem = doc[node].as_element_mut().unwrap();
                let a = elem.attrs.remove(i);
                a.name.unwrap()
            };
            doc.report(ReportCode::RepeatedAttribute, node, &[&name]);
        } else {
            i += 1;
        }
    }

    let count = doc[node].as_element().map(|e| e.attrs.len()).unwrap_or(0);
    for ix in 0..count {
        check_one_attribute(doc, node, ix);
    }

    register_anchor(doc, node);
}

fn check_one_attribute(doc: &mut Document, node: NodeId, ix: usize) {
    let (name, value, server) = {
        let elem = match doc[node].as_element() {
            Some(e) => e,
            None => return,
        };
        let attr = &elem.attrs[ix];
        match attr.name {
            Some(ref n) => (n.to_string(), attr.value.clone(), attr.server),
            None => return, // server-markup placeholder
        }
    };
    if server.is_some() {
        return; // computed value, nothing to check
    }

    let def = match lookup_attr(&name) {
        Some(def) => *def,
        None => {
            doc.report(ReportCode::UnknownAttribute, node, &[&name]);
            constrain_version(doc, VERS_PROPRIETARY);
            return;
        }
    };
    constrain_version(doc, def.versions | VERS_XML);
    if def.versions & VERS_ALL == 0 && def.versions & VERS_XML == 0 {
        doc.report(ReportCode::ProprietaryAttribute, node, &[&name]);
    }

    let value = match value {
        Some(v) => v,
        None => {
            // only boolean attributes may go valueless
            if def.how != AttrCheck::Bool {
                doc.report(ReportCode::MissingAttrValue, node, &[&name]);
            }
            return;
        }
    };

    let ok = match def.how {
        AttrCheck::Text | AttrCheck::Script | AttrCheck::Lang | AttrCheck::Charset => true,
        AttrCheck::Bool => true,
        AttrCheck::Url => {
            check_url_attribute(doc, node, ix, &name, &value);
            true
        }
        AttrCheck::Name | AttrCheck::Id => {
            if doc.config.xml_output() && !is_valid_xml_id(&value) {
                doc.report(ReportCode::XmlIdSyntax, node, &[&name]);
            }
            true
        }
        AttrCheck::Number => {
            let v = value.trim();
            !v.is_empty() && v.chars().all(|c| c.is_ascii_digit())
        }
        AttrCheck::Length => {
            let v = value.trim();
            let digits = v.trim_end_matches(|c| c == '%' || c == '*');
            !v.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
        }
        AttrCheck::Character => value.chars().count() == 1,
        AttrCheck::Color => {
            let v = value.trim();
            (v.starts_with('#') && v.len() == 7
                && v[1..].chars().all(|c| c.is_ascii_hexdigit()))
                || v.chars().all(|c| c.is_ascii_alphabetic())
        }
        AttrCheck::Align => {
            if doc[node].has_model(CM_IMG) {
                check_valign(&value)
            } else {
                is_word_list(&value, &["left", "center", "right", "justify"])
            }
        }
        AttrCheck::Valign => check_valign(&value),
        AttrCheck::Clear => is_word_list(&value, &["none", "left", "right", "all"]),
        AttrCheck::Shape => is_word_list(&value, &["rect", "default", "circle", "poly"]),
        AttrCheck::Scope => is_word_list(&value, &["row", "rowgroup", "col", "colgroup"]),
        AttrCheck::Target => {
            is_valid_xml_id(&value)
                || is_word_list(&value, &["_blank", "_self", "_parent", "_top"])
        }
        AttrCheck::VType => is_word_list(&value, &["data", "object", "ref"]),
        AttrCheck::TextDir => is_word_list(&value, &["ltr", "rtl"]),
        AttrCheck::Scroll => is_word_list(&value, &["yes", "no", "auto"]),
    };

    if !ok {
        doc.report(ReportCode::BadAttributeValue, node, &[&name]);
    }
}

fn check_valign(value: &str) -> bool {
    is_word_list(value, &["top", "middle", "bottom", "baseline"])
        || is_word_list(value, &["left", "right"])
        || is_word_list(value, &["texttop", "absmiddle", "absbottom", "textbottom"])
}

/// Backslash and escaping repair for URL-typed values, per `fix-backslash`
/// and `fix-uri`.
fn check_url_attribute(doc: &mut Document, node: NodeId, ix: usize, name: &str, value: &str) {
    let mut fixed = String::with_capacity(value.len());
    let mut had_backslash = false;
    let mut had_illegal = false;
    let fix_backslash = doc.config.fix_backslash;
    let fix_uri = doc.config.fix_uri;

    for c in value.chars() {
        match c {
            '\\' => {
                had_backslash = true;
                fixed.push(if fix_backslash { '/' } else { '\\' });
            }
            ' ' => {
                had_illegal = true;
                if fix_uri {
                    fixed.push_str("%20");
                } else {
                    fixed.push(' ');
                }
            }
            c if (c as u32) > 127 => {
                had_illegal = true;
                if fix_uri {
                    let mut buf = [0u8; 4];
                    for b in c.encode_utf8(&mut buf).as_bytes() {
                        fixed.push_str(&format!("%{:02X}", b));
                    }
                } else {
                    fixed.push(c);
                }
            }
            c => fixed.push(c),
        }
    }

    if had_backslash {
        let code = if fix_backslash {
            ReportCode::FixedBackslash
        } else {
            ReportCode::BackslashInUri
        };
        doc.report(code, node, &[name]);
    }
    if had_illegal {
        let code = if fix_uri {
            ReportCode::EscapedIllegalUri
        } else {
            ReportCode::IllegalUriReference
        };
        doc.report(code, node, &[name]);
    }
    if (had_backslash && fix_backslash) || (had_illegal && fix_uri) {
        if let Some(elem) = doc[node].as_element_mut() {
            elem.attrs[ix].value = Some(fixed.into());
        }
    }
}

/// Record `id`/`name` anchors for eligible elements and flag duplicates.
fn register_anchor(doc: &mut Document, node: NodeId) {
    let (name_of_elem, anchor) = {
        let elem = match doc[node].as_element() {
            Some(e) => e,
            None => return,
        };
        if !is_anchor_element(&elem.name) {
            return;
        }
        let id_val = elem.attr("id").map(|v| v.to_string());
        let name_val = elem.attr("name").map(|v| v.to_string());
        // mismatched id and name on one element is its own warning
        if let (Some(i), Some(n)) = (&id_val, &name_val) {
            if i != n {
                (elem.name.to_string(), Some((i.clone(), true)))
            } else {
                (elem.name.to_string(), Some((i.clone(), false)))
            }
        } else {
            (elem.name.to_string(), id_val.or(name_val).map(|v| (v, false)))
        }
    };

    if let Some((value, mismatched)) = anchor {
        if mismatched {
            doc.report(ReportCode::IdNameMismatch, node, &[&name_of_elem]);
        }
        if doc.anchors.contains_key(&value) {
            doc.report(ReportCode::AnchorNotUnique, node, &[&name_of_elem, &value]);
        } else {
            doc.anchors.insert(value, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags() {
        let cfg = Config::default();
        let p = lookup_tag("p", &cfg).unwrap();
        assert!(p.model & CM_BLOCK != 0);
        assert_eq!(Routine::Inline, p.routine);

        let br = lookup_tag("br", &cfg).unwrap();
        assert!(br.model & CM_EMPTY != 0);

        assert!(lookup_tag("bogus", &cfg).is_none());
    }

    #[test]
    fn xml_mode_skips_lookup() {
        let mut cfg = Config::default();
        cfg.xml_tags = true;
        assert!(lookup_tag("p", &cfg).is_none());
    }

    #[test]
    fn user_declared_tags() {
        let mut cfg = Config::default();
        cfg.new_inline_tags = vec!["flag".to_string()];
        cfg.new_empty_tags = vec!["breaker".to_string()];
        let flag = lookup_tag("flag", &cfg).unwrap();
        assert!(flag.model & CM_INLINE != 0);
        assert!(flag.model & CM_NEW != 0);
        let breaker = lookup_tag("breaker", &cfg).unwrap();
        assert!(breaker.model & CM_EMPTY != 0);
        assert_eq!(Routine::Empty, breaker.routine);
    }

    #[test]
    fn anchor_set() {
        assert!(is_anchor_element("a"));
        assert!(is_anchor_element("map"));
        assert!(!is_anchor_element("p"));
        assert!(!is_anchor_element("span"));
    }

    #[test]
    fn version_masks() {
        assert_eq!(VERS_ALL & VERS_FRAMESET, VERS_FRAMESET);
        let font = TAG_META.get("font").unwrap();
        assert_eq!(0, font.versions & VERS_HTML40_STRICT);
        let span = TAG_META.get("span").unwrap();
        assert_ne!(0, span.versions & VERS_HTML40_STRICT);
    }

    #[test]
    fn xml_id_syntax() {
        assert!(is_valid_xml_id("foo"));
        assert!(is_valid_xml_id("_bar2"));
        assert!(!is_valid_xml_id("2foo"));
        assert!(!is_valid_xml_id(""));
    }
}
