//! Typed configuration store with snapshot/restore.
//!
//! The external option-file reader is out of scope; this is the typed store
//! it would feed, plus the string surface (`set_option`) used by it and by
//! tests. A snapshot is taken before each parse and restored after printing
//! so one handle can process documents without state leakage.

use crate::report::{Diagnostic, ReportLevel};

/// Character encodings selectable for input and output.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Encoding {
    Raw,
    Ascii,
    Latin0,
    Latin1,
    Iso2022,
    Utf8,
    Mac,
    Win1252,
    Ibm858,
    Utf16Le,
    Utf16Be,
    Utf16,
    Big5,
    ShiftJis,
}

impl Encoding {
    pub fn parse(s: &str) -> Option<Encoding> {
        Some(match s {
            "raw" => Encoding::Raw,
            "ascii" => Encoding::Ascii,
            "latin0" => Encoding::Latin0,
            "latin1" => Encoding::Latin1,
            "iso2022" => Encoding::Iso2022,
            "utf8" => Encoding::Utf8,
            "mac" => Encoding::Mac,
            "win1252" => Encoding::Win1252,
            "ibm858" => Encoding::Ibm858,
            "utf16le" => Encoding::Utf16Le,
            "utf16be" => Encoding::Utf16Be,
            "utf16" => Encoding::Utf16,
            "big5" => Encoding::Big5,
            "shiftjis" => Encoding::ShiftJis,
            _ => return None,
        })
    }

    /// The name written into `<meta http-equiv="Content-Type">` charsets.
    pub fn charset_name(self) -> &'static str {
        match self {
            Encoding::Raw => "raw",
            Encoding::Ascii => "us-ascii",
            Encoding::Latin0 => "iso-8859-15",
            Encoding::Latin1 => "iso-8859-1",
            Encoding::Iso2022 => "iso-2022",
            Encoding::Utf8 => "utf-8",
            Encoding::Mac => "macintosh",
            Encoding::Win1252 => "windows-1252",
            Encoding::Ibm858 => "ibm858",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Utf16 => "utf-16",
            Encoding::Big5 => "big5",
            Encoding::ShiftJis => "shift_jis",
        }
    }
}

/// Output line terminator.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Newline {
    Lf,
    CrLf,
    Cr,
}

/// Three-state option: no / yes / auto.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AutoBool {
    No,
    Yes,
    Auto,
}

/// Policy for the emitted DOCTYPE declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DoctypeMode {
    Omit,
    Auto,
    Strict,
    Loose,
    User,
}

/// The full option set. Field names mirror the hyphenated public option
/// names (`indent-spaces` is `indent_spaces`, and so on).
#[derive(Clone, Debug)]
pub struct Config {
    // layout
    pub indent: AutoBool,
    pub indent_spaces: u32,
    pub wrap: u32,
    pub tab_size: u32,

    // encodings
    pub input_encoding: Encoding,
    pub output_encoding: Encoding,
    pub newline: Newline,
    pub output_bom: AutoBool,

    // doctype
    pub doctype_mode: DoctypeMode,
    pub doctype: Option<String>,

    // entities and escaping
    pub numeric_entities: bool,
    pub quote_marks: bool,
    pub quote_nbsp: bool,
    pub quote_ampersand: bool,

    // URI and comment repair
    pub fix_backslash: bool,
    pub fix_uri: bool,
    pub fix_bad_comments: bool,

    // cleanup
    pub logical_emphasis: bool,
    pub drop_font_tags: bool,
    pub drop_proprietary_attributes: bool,
    pub drop_empty_paras: bool,
    pub make_clean: bool,
    pub make_bare: bool,
    pub word_2000: bool,
    pub css_prefix: Option<String>,

    // markup dialect
    pub xml_tags: bool,
    pub xml_out: bool,
    pub xhtml_out: bool,
    pub html_out: bool,
    pub xml_pis: bool,
    pub xml_space: bool,
    pub add_xml_decl: bool,

    // serializer
    pub indent_cdata: bool,
    pub escape_cdata: bool,
    pub hide_comments: bool,
    pub hide_endtags: bool,
    pub wrap_asp: bool,
    pub wrap_jste: bool,
    pub wrap_php: bool,
    pub wrap_script_literals: bool,
    pub wrap_attributes: bool,
    pub wrap_sections: bool,
    pub literal_attributes: bool,
    pub break_before_br: bool,
    pub uppercase_tags: bool,
    pub uppercase_attributes: bool,
    pub indent_attributes: bool,
    pub body_only: bool,
    pub tidy_mark: bool,

    // diagnostics
    pub show_warnings: bool,
    pub show_errors: u32,
    pub quiet: bool,
    pub force_output: bool,
    pub accessibility_check: u32,

    // dictionary extension
    pub new_inline_tags: Vec<String>,
    pub new_blocklevel_tags: Vec<String>,
    pub new_empty_tags: Vec<String>,
    pub new_pre_tags: Vec<String>,

    // wrapping of ideographic text
    pub language: Option<String>,

    snapshot: Option<Box<Config>>,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            indent: AutoBool::Auto,
            indent_spaces: 2,
            wrap: 68,
            tab_size: 8,

            input_encoding: Encoding::Latin1,
            output_encoding: Encoding::Ascii,
            newline: Newline::Lf,
            output_bom: AutoBool::Auto,

            doctype_mode: DoctypeMode::Auto,
            doctype: None,

            numeric_entities: false,
            quote_marks: false,
            quote_nbsp: true,
            quote_ampersand: true,

            fix_backslash: true,
            fix_uri: true,
            fix_bad_comments: true,

            logical_emphasis: false,
            drop_font_tags: false,
            drop_proprietary_attributes: false,
            drop_empty_paras: true,
            make_clean: false,
            make_bare: false,
            word_2000: false,
            css_prefix: None,

            xml_tags: false,
            xml_out: false,
            xhtml_out: false,
            html_out: false,
            xml_pis: false,
            xml_space: false,
            add_xml_decl: false,

            indent_cdata: false,
            escape_cdata: false,
            hide_comments: false,
            hide_endtags: false,
            wrap_asp: true,
            wrap_jste: true,
            wrap_php: true,
            wrap_script_literals: false,
            wrap_attributes: false,
            wrap_sections: true,
            literal_attributes: false,
            break_before_br: false,
            uppercase_tags: false,
            uppercase_attributes: false,
            indent_attributes: false,
            body_only: false,
            tidy_mark: false,

            show_warnings: true,
            show_errors: 6,
            quiet: false,
            force_output: false,
            accessibility_check: 0,

            new_inline_tags: Vec::new(),
            new_blocklevel_tags: Vec::new(),
            new_empty_tags: Vec::new(),
            new_pre_tags: Vec::new(),

            language: None,

            snapshot: None,
        }
    }
}

impl Config {
    pub fn new() -> Config {
        Config::default()
    }

    /// True when lexing should follow XML rules.
    pub fn xml_lexing(&self) -> bool {
        self.xml_tags
    }

    /// True when output is any XML dialect (XML or XHTML).
    pub fn xml_output(&self) -> bool {
        self.xml_out || self.xhtml_out
    }

    /// Copy current values aside; restored by `reset_to_snapshot`.
    pub fn take_snapshot(&mut self) {
        let mut copy = self.clone();
        copy.snapshot = None;
        self.snapshot = Some(Box::new(copy));
    }

    /// Restore the values of the last `take_snapshot`, if any.
    pub fn reset_to_snapshot(&mut self) {
        if let Some(snap) = self.snapshot.take() {
            *self = *snap;
        }
    }

    /// Restore factory defaults.
    pub fn reset_to_default(&mut self) {
        *self = Config::default();
    }

    /// Set an option from its public hyphenated name and a string value.
    ///
    /// Unknown names and malformed values produce a Config-level
    /// [`Diagnostic`] in `errs` and leave the store unchanged.
    pub fn set_option(&mut self, name: &str, value: &str, errs: &mut Vec<Diagnostic>) -> bool {
        macro_rules! fail {
            ($($arg:tt)*) => {{
                errs.push(Diagnostic {
                    level: ReportLevel::Config,
                    line: 0,
                    column: 0,
                    text: format!($($arg)*),
                });
                return false;
            }};
        }

        fn as_bool(v: &str) -> Option<bool> {
            match v {
                "yes" | "y" | "true" | "1" => Some(true),
                "no" | "n" | "false" | "0" => Some(false),
                _ => None,
            }
        }
        fn as_autobool(v: &str) -> Option<AutoBool> {
            match v {
                "auto" => Some(AutoBool::Auto),
                _ => as_bool(v).map(|b| if b { AutoBool::Yes } else { AutoBool::No }),
            }
        }
        fn as_taglist(v: &str) -> Vec<String> {
            v.split(|c: char| c == ',' || c.is_ascii_whitespace())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_ascii_lowercase())
                .collect()
        }

        macro_rules! bool_opt {
            ($field:ident) => {{
                match as_bool(value) {
                    Some(b) => self.$field = b,
                    None => fail!("option {} expects yes or no, got \"{}\"", name, value),
                }
            }};
        }
        macro_rules! int_opt {
            ($field:ident) => {{
                match value.parse::<u32>() {
                    Ok(n) => self.$field = n,
                    Err(_) => fail!("option {} expects a number, got \"{}\"", name, value),
                }
            }};
        }
        macro_rules! auto_opt {
            ($field:ident) => {{
                match as_autobool(value) {
                    Some(a) => self.$field = a,
                    None => fail!("option {} expects yes, no or auto, got \"{}\"", name, value),
                }
            }};
        }

        match name {
            "indent" => auto_opt!(indent),
            "indent-spaces" => int_opt!(indent_spaces),
            "wrap" => int_opt!(wrap),
            "tab-size" => int_opt!(tab_size),

            "char-encoding" => match Encoding::parse(value) {
                Some(e) => {
                    self.input_encoding = e;
                    self.output_encoding = e;
                }
                None => fail!("unknown character encoding \"{}\"", value),
            },
            "input-encoding" => match Encoding::parse(value) {
                Some(e) => self.input_encoding = e,
                None => fail!("unknown character encoding \"{}\"", value),
            },
            "output-encoding" => match Encoding::parse(value) {
                Some(e) => self.output_encoding = e,
                None => fail!("unknown character encoding \"{}\"", value),
            },
            "newline" => match value {
                "LF" | "lf" => self.newline = Newline::Lf,
                "CRLF" | "crlf" => self.newline = Newline::CrLf,
                "CR" | "cr" => self.newline = Newline::Cr,
                _ => fail!("option newline expects LF, CRLF or CR, got \"{}\"", value),
            },
            "output-bom" => auto_opt!(output_bom),

            "doctype-mode" | "doctype" => match value {
                "omit" => self.doctype_mode = DoctypeMode::Omit,
                "auto" => self.doctype_mode = DoctypeMode::Auto,
                "strict" => self.doctype_mode = DoctypeMode::Strict,
                "loose" | "transitional" => self.doctype_mode = DoctypeMode::Loose,
                fpi => {
                    // a quoted string names a user FPI
                    self.doctype_mode = DoctypeMode::User;
                    self.doctype = Some(fpi.trim_matches('"').to_string());
                }
            },

            "numeric-entities" => bool_opt!(numeric_entities),
            "quote-marks" => bool_opt!(quote_marks),
            "quote-nbsp" => bool_opt!(quote_nbsp),
            "quote-ampersand" => bool_opt!(quote_ampersand),

            "fix-backslash" => bool_opt!(fix_backslash),
            "fix-uri" => bool_opt!(fix_uri),
            "fix-bad-comments" => bool_opt!(fix_bad_comments),

            "logical-emphasis" => bool_opt!(logical_emphasis),
            "drop-font-tags" => bool_opt!(drop_font_tags),
            "drop-proprietary-attributes" => bool_opt!(drop_proprietary_attributes),
            "drop-empty-paras" => bool_opt!(drop_empty_paras),
            "clean" | "make-clean" => bool_opt!(make_clean),
            "bare" | "make-bare" => bool_opt!(make_bare),
            "word-2000" => bool_opt!(word_2000),
            "css-prefix" => self.css_prefix = Some(value.to_string()),

            "input-xml" | "xml-tags" => bool_opt!(xml_tags),
            "output-xml" | "xml-out" => bool_opt!(xml_out),
            "output-xhtml" | "xhtml-out" => bool_opt!(xhtml_out),
            "output-html" | "html-out" => bool_opt!(html_out),
            "assume-xml-procins" | "xml-pis" => bool_opt!(xml_pis),
            "add-xml-space" | "xml-space" => bool_opt!(xml_space),
            "add-xml-decl" | "xml-decl" => bool_opt!(add_xml_decl),

            "indent-cdata" => bool_opt!(indent_cdata),
            "escape-cdata" => bool_opt!(escape_cdata),
            "hide-comments" => bool_opt!(hide_comments),
            "hide-endtags" => bool_opt!(hide_endtags),
            "wrap-asp" => bool_opt!(wrap_asp),
            "wrap-jste" => bool_opt!(wrap_jste),
            "wrap-php" => bool_opt!(wrap_php),
            "wrap-script-literals" => bool_opt!(wrap_script_literals),
            "wrap-attributes" => bool_opt!(wrap_attributes),
            "wrap-sections" => bool_opt!(wrap_sections),
            "literal-attributes" => bool_opt!(literal_attributes),
            "break-before-br" => bool_opt!(break_before_br),
            "uppercase-tags" => bool_opt!(uppercase_tags),
            "uppercase-attributes" => bool_opt!(uppercase_attributes),
            "indent-attributes" => bool_opt!(indent_attributes),
            "show-body-only" | "body-only" => bool_opt!(body_only),
            "tidy-mark" => bool_opt!(tidy_mark),

            "show-warnings" => bool_opt!(show_warnings),
            "show-errors" => int_opt!(show_errors),
            "quiet" => bool_opt!(quiet),
            "force-output" => bool_opt!(force_output),
            "accessibility-check" => int_opt!(accessibility_check),

            "new-inline-tags" => self.new_inline_tags = as_taglist(value),
            "new-blocklevel-tags" => self.new_blocklevel_tags = as_taglist(value),
            "new-empty-tags" => self.new_empty_tags = as_taglist(value),
            "new-pre-tags" => self.new_pre_tags = as_taglist(value),

            "language" => self.language = Some(value.to_string()),

            _ => fail!("unknown option \"{}\"", name),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_parse() {
        let mut cfg = Config::new();
        let mut errs = Vec::new();
        assert!(cfg.set_option("indent", "auto", &mut errs));
        assert!(cfg.set_option("wrap", "72", &mut errs));
        assert!(cfg.set_option("char-encoding", "utf8", &mut errs));
        assert!(cfg.set_option("new-inline-tags", "foo, bar baz", &mut errs));
        assert!(errs.is_empty());
        assert_eq!(AutoBool::Auto, cfg.indent);
        assert_eq!(72, cfg.wrap);
        assert_eq!(Encoding::Utf8, cfg.input_encoding);
        assert_eq!(Encoding::Utf8, cfg.output_encoding);
        assert_eq!(vec!["foo", "bar", "baz"], cfg.new_inline_tags);
    }

    #[test]
    fn bad_values_report() {
        let mut cfg = Config::new();
        let mut errs = Vec::new();
        assert!(!cfg.set_option("wrap", "wide", &mut errs));
        assert!(!cfg.set_option("no-such-option", "yes", &mut errs));
        assert_eq!(2, errs.len());
        assert_eq!(ReportLevel::Config, errs[0].level);
        assert_eq!(68, cfg.wrap);
    }

    #[test]
    fn snapshot_restore() {
        let mut cfg = Config::new();
        cfg.take_snapshot();
        let mut errs = Vec::new();
        cfg.set_option("indent-spaces", "8", &mut errs);
        cfg.set_option("quote-nbsp", "no", &mut errs);
        cfg.set_option("doctype", "omit", &mut errs);
        cfg.reset_to_snapshot();
        assert_eq!(2, cfg.indent_spaces);
        assert!(cfg.quote_nbsp);
        assert_eq!(DoctypeMode::Auto, cfg.doctype_mode);
    }

    #[test]
    fn user_doctype() {
        let mut cfg = Config::new();
        let mut errs = Vec::new();
        cfg.set_option("doctype", "\"-//ACME//DTD HTML 3.14159//EN\"", &mut errs);
        assert_eq!(DoctypeMode::User, cfg.doctype_mode);
        assert_eq!(Some("-//ACME//DTD HTML 3.14159//EN".to_string()), cfg.doctype);
    }
}
