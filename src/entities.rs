//! Named character entities and their version masks.

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::dom::meta::{VERS_ALL, VERS_FROM40, VERS_XML};

/// One named entity: name, versions in which it is defined, code point.
pub struct EntityDef {
    pub name: &'static str,
    pub versions: u16,
    pub code: u32,
}

macro_rules! entities {
    ($(($name:literal, $vers:expr, $code:expr),)+) => {
        &[ $( EntityDef { name: $name, versions: $vers, code: $code }, )+ ]
    };
}

/// The HTML entity set: markup-significant and Latin-1 entities are defined
/// in all versions; Latin Extended, Greek, punctuation, math and symbol
/// entities arrived with HTML 4.0; `apos` exists only in XML/XHTML.
pub static ENTITIES: &[EntityDef] = entities![
    // markup-significant
    ("quot", VERS_ALL, 0x0022),
    ("amp", VERS_ALL, 0x0026),
    ("apos", VERS_XML, 0x0027),
    ("lt", VERS_ALL, 0x003C),
    ("gt", VERS_ALL, 0x003E),

    // Latin-1
    ("nbsp", VERS_ALL, 0x00A0),
    ("iexcl", VERS_ALL, 0x00A1),
    ("cent", VERS_ALL, 0x00A2),
    ("pound", VERS_ALL, 0x00A3),
    ("curren", VERS_ALL, 0x00A4),
    ("yen", VERS_ALL, 0x00A5),
    ("brvbar", VERS_ALL, 0x00A6),
    ("sect", VERS_ALL, 0x00A7),
    ("uml", VERS_ALL, 0x00A8),
    ("copy", VERS_ALL, 0x00A9),
    ("ordf", VERS_ALL, 0x00AA),
    ("laquo", VERS_ALL, 0x00AB),
    ("not", VERS_ALL, 0x00AC),
    ("shy", VERS_ALL, 0x00AD),
    ("reg", VERS_ALL, 0x00AE),
    ("macr", VERS_ALL, 0x00AF),
    ("deg", VERS_ALL, 0x00B0),
    ("plusmn", VERS_ALL, 0x00B1),
    ("sup2", VERS_ALL, 0x00B2),
    ("sup3", VERS_ALL, 0x00B3),
    ("acute", VERS_ALL, 0x00B4),
    ("micro", VERS_ALL, 0x00B5),
    ("para", VERS_ALL, 0x00B6),
    ("middot", VERS_ALL, 0x00B7),
    ("cedil", VERS_ALL, 0x00B8),
    ("sup1", VERS_ALL, 0x00B9),
    ("ordm", VERS_ALL, 0x00BA),
    ("raquo", VERS_ALL, 0x00BB),
    ("frac14", VERS_ALL, 0x00BC),
    ("frac12", VERS_ALL, 0x00BD),
    ("frac34", VERS_ALL, 0x00BE),
    ("iquest", VERS_ALL, 0x00BF),
    ("Agrave", VERS_ALL, 0x00C0),
    ("Aacute", VERS_ALL, 0x00C1),
    ("Acirc", VERS_ALL, 0x00C2),
    ("Atilde", VERS_ALL, 0x00C3),
    ("Auml", VERS_ALL, 0x00C4),
    ("Aring", VERS_ALL, 0x00C5),
    ("AElig", VERS_ALL, 0x00C6),
    ("Ccedil", VERS_ALL, 0x00C7),
    ("Egrave", VERS_ALL, 0x00C8),
    ("Eacute", VERS_ALL, 0x00C9),
    ("Ecirc", VERS_ALL, 0x00CA),
    ("Euml", VERS_ALL, 0x00CB),
    ("Igrave", VERS_ALL, 0x00CC),
    ("Iacute", VERS_ALL, 0x00CD),
    ("Icirc", VERS_ALL, 0x00CE),
    ("Iuml", VERS_ALL, 0x00CF),
    ("ETH", VERS_ALL, 0x00D0),
    ("Ntilde", VERS_ALL, 0x00D1),
    ("Ograve", VERS_ALL, 0x00D2),
    ("Oacute", VERS_ALL, 0x00D3),
    ("Ocirc", VERS_ALL, 0x00D4),
    ("Otilde", VERS_ALL, 0x00D5),
    ("Ouml", VERS_ALL, 0x00D6),
    ("times", VERS_ALL, 0x00D7),
    ("Oslash", VERS_ALL, 0x00D8),
    ("Ugrave", VERS_ALL, 0x00D9),
    ("Uacute", VERS_ALL, 0x00DA),
    ("Ucirc", VERS_ALL, 0x00DB),
    ("Uuml", VERS_ALL, 0x00DC),
    ("Yacute", VERS_ALL, 0x00DD),
    ("THORN", VERS_ALL, 0x00DE),
    ("szlig", VERS_ALL, 0x00DF),
    ("agrave", VERS_ALL, 0x00E0),
    ("aacute", VERS_ALL, 0x00E1),
    ("acirc", VERS_ALL, 0x00E2),
    ("atilde", VERS_ALL, 0x00E3),
    ("auml", VERS_ALL, 0x00E4),
    ("aring", VERS_ALL, 0x00E5),
    ("aelig", VERS_ALL, 0x00E6),
    ("ccedil", VERS_ALL, 0x00E7),
    ("egrave", VERS_ALL, 0x00E8),
    ("eacute", VERS_ALL, 0x00E9),
    ("ecirc", VERS_ALL, 0x00EA),
    ("euml", VERS_ALL, 0x00EB),
    ("igrave", VERS_ALL, 0x00EC),
    ("iacute", VERS_ALL, 0x00ED),
    ("icirc", VERS_ALL, 0x00EE),
    ("iuml", VERS_ALL, 0x00EF),
    ("eth", VERS_ALL, 0x00F0),
    ("ntilde", VERS_ALL, 0x00F1),
    ("ograve", VERS_ALL, 0x00F2),
    ("oacute", VERS_ALL, 0x00F3),
    ("ocirc", VERS_ALL, 0x00F4),
    ("otilde", VERS_ALL, 0x00F5),
    ("ouml", VERS_ALL, 0x00F6),
    ("divide", VERS_ALL, 0x00F7),
    ("oslash", VERS_ALL, 0x00F8),
    ("ugrave", VERS_ALL, 0x00F9),
    ("uacute", VERS_ALL, 0x00FA),
    ("ucirc", VERS_ALL, 0x00FB),
    ("uuml", VERS_ALL, 0x00FC),
    ("yacute", VERS_ALL, 0x00FD),
    ("thorn", VERS_ALL, 0x00FE),
    ("yuml", VERS_ALL, 0x00FF),

    // Latin Extended-A / B, spacing modifiers
    ("OElig", VERS_FROM40, 0x0152),
    ("oelig", VERS_FROM40, 0x0153),
    ("Scaron", VERS_FROM40, 0x0160),
    ("scaron", VERS_FROM40, 0x0161),
    ("Yuml", VERS_FROM40, 0x0178),
    ("fnof", VERS_FROM40, 0x0192),
    ("circ", VERS_FROM40, 0x02C6),
    ("tilde", VERS_FROM40, 0x02DC),

    // Greek
    ("Alpha", VERS_FROM40, 0x0391),
    ("Beta", VERS_FROM40, 0x0392),
    ("Gamma", VERS_FROM40, 0x0393),
    ("Delta", VERS_FROM40, 0x0394),
    ("Epsilon", VERS_FROM40, 0x0395),
    ("Zeta", VERS_FROM40, 0x0396),
    ("Eta", VERS_FROM40, 0x0397),
    ("Theta", VERS_FROM40, 0x0398),
    ("Iota", VERS_FROM40, 0x0399),
    ("Kappa", VERS_FROM40, 0x039A),
    ("Lambda", VERS_FROM40, 0x039B),
    ("Mu", VERS_FROM40, 0x039C),
    ("Nu", VERS_FROM40, 0x039D),
    ("Xi", VERS_FROM40, 0x039E),
    ("Omicron", VERS_FROM40, 0x039F),
    ("Pi", VERS_FROM40, 0x03A0),
    ("Rho", VERS_FROM40, 0x03A1),
    ("Sigma", VERS_FROM40, 0x03A3),
    ("Tau", VERS_FROM40, 0x03A4),
    ("Upsilon", VERS_FROM40, 0x03A5),
    ("Phi", VERS_FROM40, 0x03A6),
    ("Chi", VERS_FROM40, 0x03A7),
    ("Psi", VERS_FROM40, 0x03A8),
    ("Omega", VERS_FROM40, 0x03A9),
    ("alpha", VERS_FROM40, 0x03B1),
    ("beta", VERS_FROM40, 0x03B2),
    ("gamma", VERS_FROM40, 0x03B3),
    ("delta", VERS_FROM40, 0x03B4),
    ("epsilon", VERS_FROM40, 0x03B5),
    ("zeta", VERS_FROM40, 0x03B6),
    ("eta", VERS_FROM40, 0x03B7),
    ("theta", VERS_FROM40, 0x03B8),
    ("iota", VERS_FROM40, 0x03B9),
    ("kappa", VERS_FROM40, 0x03BA),
    ("lambda", VERS_FROM40, 0x03BB),
    ("mu", VERS_FROM40, 0x03BC),
    ("nu", VERS_FROM40, 0x03BD),
    ("xi", VERS_FROM40, 0x03BE),
    ("omicron", VERS_FROM40, 0x03BF),
    ("pi", VERS_FROM40, 0x03C0),
    ("rho", VERS_FROM40, 0x03C1),
    ("sigmaf", VERS_FROM40, 0x03C2),
    ("sigma", VERS_FROM40, 0x03C3),
    ("tau", VERS_FROM40, 0x03C4),
    ("upsilon", VERS_FROM40, 0x03C5),
    ("phi", VERS_FROM40, 0x03C6),
    ("chi", VERS_FROM40, 0x03C7),
    ("psi", VERS_FROM40, 0x03C8),
    ("omega", VERS_FROM40, 0x03C9),
    ("thetasym", VERS_FROM40, 0x03D1),
    ("upsih", VERS_FROM40, 0x03D2),
    ("piv", VERS_FROM40, 0x03D6),

    // general punctuation
    ("ensp", VERS_FROM40, 0x2002),
    ("emsp", VERS_FROM40, 0x2003),
    ("thinsp", VERS_FROM40, 0x2009),
    ("zwnj", VERS_FROM40, 0x200C),
    ("zwj", VERS_FROM40, 0x200D),
    ("lrm", VERS_FROM40, 0x200E),
    ("rlm", VERS_FROM40, 0x200F),
    ("ndash", VERS_FROM40, 0x2013),
    ("mdash", VERS_FROM40, 0x2014),
    ("lsquo", VERS_FROM40, 0x2018),
    ("rsquo", VERS_FROM40, 0x2019),
    ("sbquo", VERS_FROM40, 0x201A),
    ("ldquo", VERS_FROM40, 0x201C),
    ("rdquo", VERS_FROM40, 0x201D),
    ("bdquo", VERS_FROM40, 0x201E),
    ("dagger", VERS_FROM40, 0x2020),
    ("Dagger", VERS_FROM40, 0x2021),
    ("bull", VERS_FROM40, 0x2022),
    ("hellip", VERS_FROM40, 0x2026),
    ("permil", VERS_FROM40, 0x2030),
    ("prime", VERS_FROM40, 0x2032),
    ("Prime", VERS_FROM40, 0x2033),
    ("lsaquo", VERS_FROM40, 0x2039),
    ("rsaquo", VERS_FROM40, 0x203A),
    ("oline", VERS_FROM40, 0x203E),
    ("frasl", VERS_FROM40, 0x2044),
    ("euro", VERS_FROM40, 0x20AC),

    // letterlike
    ("image", VERS_FROM40, 0x2111),
    ("weierp", VERS_FROM40, 0x2118),
    ("real", VERS_FROM40, 0x211C),
    ("trade", VERS_FROM40, 0x2122),
    ("alefsym", VERS_FROM40, 0x2135),

    // arrows
    ("larr", VERS_FROM40, 0x2190),
    ("uarr", VERS_FROM40, 0x2191),
    ("rarr", VERS_FROM40, 0x2192),
    ("darr", VERS_FROM40, 0x2193),
    ("harr", VERS_FROM40, 0x2194),
    ("crarr", VERS_FROM40, 0x21B5),
    ("lArr", VERS_FROM40, 0x21D0),
    ("uArr", VERS_FROM40, 0x21D1),
    ("rArr", VERS_FROM40, 0x21D2),
    ("dArr", VERS_FROM40, 0x21D3),
    ("hArr", VERS_FROM40, 0x21D4),

    // mathematical operators
    ("forall", VERS_FROM40, 0x2200),
    ("part", VERS_FROM40, 0x2202),
    ("exist", VERS_FROM40, 0x2203),
    ("empty", VERS_FROM40, 0x2205),
    ("nabla", VERS_FROM40, 0x2207),
    ("isin", VERS_FROM40, 0x2208),
    ("notin", VERS_FROM40, 0x2209),
    ("ni", VERS_FROM40, 0x220B),
    ("prod", VERS_FROM40, 0x220F),
    ("sum", VERS_FROM40, 0x2211),
    ("minus", VERS_FROM40, 0x2212),
    ("lowast", VERS_FROM40, 0x2217),
    ("radic", VERS_FROM40, 0x221A),
    ("prop", VERS_FROM40, 0x221D),
    ("infin", VERS_FROM40, 0x221E),
    ("ang", VERS_FROM40, 0x2220),
    ("and", VERS_FROM40, 0x2227),
    ("or", VERS_FROM40, 0x2228),
    ("cap", VERS_FROM40, 0x2229),
    ("cup", VERS_FROM40, 0x222A),
    ("int", VERS_FROM40, 0x222B),
    ("there4", VERS_FROM40, 0x2234),
    ("sim", VERS_FROM40, 0x223C),
    ("cong", VERS_FROM40, 0x2245),
    ("asymp", VERS_FROM40, 0x2248),
    ("ne", VERS_FROM40, 0x2260),
    ("equiv", VERS_FROM40, 0x2261),
    ("le", VERS_FROM40, 0x2264),
    ("ge", VERS_FROM40, 0x2265),
    ("sub", VERS_FROM40, 0x2282),
    ("sup", VERS_FROM40, 0x2283),
    ("nsub", VERS_FROM40, 0x2284),
    ("sube", VERS_FROM40, 0x2286),
    ("supe", VERS_FROM40, 0x2287),
    ("oplus", VERS_FROM40, 0x2295),
    ("otimes", VERS_FROM40, 0x2297),
    ("perp", VERS_FROM40, 0x22A5),
    ("sdot", VERS_FROM40, 0x22C5),

    // technical
    ("lceil", VERS_FROM40, 0x2308),
    ("rceil", VERS_FROM40, 0x2309),
    ("lfloor", VERS_FROM40, 0x230A),
    ("rfloor", VERS_FROM40, 0x230B),
    ("lang", VERS_FROM40, 0x2329),
    ("rang", VERS_FROM40, 0x232A),

    // geometric, misc symbols
    ("loz", VERS_FROM40, 0x25CA),
    ("spades", VERS_FROM40, 0x2660),
    ("clubs", VERS_FROM40, 0x2663),
    ("hearts", VERS_FROM40, 0x2665),
    ("diams", VERS_FROM40, 0x2666),
];

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, &'static EntityDef> = {
        let mut m = HashMap::with_capacity(ENTITIES.len());
        for e in ENTITIES {
            m.insert(e.name, e);
        }
        m
    };
}

/// Resolve a named entity (without `&` and `;`). Case-sensitive.
pub fn entity_def(name: &str) -> Option<&'static EntityDef> {
    BY_NAME.get(name).copied()
}

/// Resolve a named entity to its code point, or None if unknown.
pub fn entity_code(name: &str) -> Option<u32> {
    entity_def(name).map(|e| e.code)
}

/// Reverse lookup for the printer: the entity name for a code point, given
/// the versions the document may still be.
pub fn entity_name(code: u32, versions: u16) -> Option<&'static str> {
    ENTITIES
        .iter()
        .find(|e| e.code == code && (e.versions & versions) != 0)
        .map(|e| e.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::meta::{VERS_HTML20, VERS_HTML40_STRICT};

    #[test]
    fn lookup() {
        assert_eq!(Some(0x0026), entity_code("amp"));
        assert_eq!(Some(0x00A0), entity_code("nbsp"));
        assert_eq!(Some(0x20AC), entity_code("euro"));
        assert_eq!(None, entity_code("bogus"));
        // case matters
        assert_eq!(Some(0x2020), entity_code("dagger"));
        assert_eq!(Some(0x2021), entity_code("Dagger"));
    }

    #[test]
    fn apos_is_xml_only() {
        let e = entity_def("apos").unwrap();
        assert_eq!(VERS_XML, e.versions);
    }

    #[test]
    fn reverse() {
        assert_eq!(Some("copy"), entity_name(0x00A9, VERS_HTML20));
        assert_eq!(Some("mdash"), entity_name(0x2014, VERS_HTML40_STRICT));
        // extended entity not available down-version
        assert_eq!(None, entity_name(0x2014, VERS_HTML20));
    }

    #[test]
    fn round_trip_all() {
        for e in ENTITIES {
            assert_eq!(Some(e.code), entity_code(e.name), "entity {}", e.name);
        }
    }
}
