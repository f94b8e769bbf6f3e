//! Byte stream input with charset decoding, and the symmetric output side.
//!
//! `StreamIn` turns bytes from an injected [`Source`] into code points:
//! BOM sniffing, legacy single-byte pages, ISO-2022 designator tracking,
//! incremental multi-byte decoding through `encoding_rs`, newline and tab
//! normalization, and a bounded pushback. `StreamOut` is the mirror image
//! for the printer.

use std::io::Read;

use encoding_rs as enc;

use crate::config::{AutoBool, Encoding, Newline};
use crate::report::ReportCode;

/// Injected byte input.
pub trait Source {
    fn get_byte(&mut self) -> Option<u8>;
    fn unget_byte(&mut self, b: u8);
    fn at_eof(&self) -> bool;
}

/// Injected byte output.
pub trait Sink {
    fn put_byte(&mut self, b: u8);
}

/// A `Source` over an in-memory byte buffer.
pub struct BufSource {
    data: Vec<u8>,
    pos: usize,
    pushback: Vec<u8>,
}

impl BufSource {
    pub fn new<B: Into<Vec<u8>>>(data: B) -> BufSource {
        BufSource { data: data.into(), pos: 0, pushback: Vec::new() }
    }
}

impl Source for BufSource {
    fn get_byte(&mut self) -> Option<u8> {
        if let Some(b) = self.pushback.pop() {
            return Some(b);
        }
        let b = self.data.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn unget_byte(&mut self, b: u8) {
        self.pushback.push(b);
    }

    fn at_eof(&self) -> bool {
        self.pushback.is_empty() && self.pos >= self.data.len()
    }
}

/// A `Source` pulling single bytes from any `io::Read`.
pub struct ReadSource<R: Read> {
    inner: R,
    pushback: Vec<u8>,
    eof: bool,
}

impl<R: Read> ReadSource<R> {
    pub fn new(inner: R) -> ReadSource<R> {
        ReadSource { inner, pushback: Vec::new(), eof: false }
    }
}

impl<R: Read> Source for ReadSource<R> {
    fn get_byte(&mut self) -> Option<u8> {
        if let Some(b) = self.pushback.pop() {
            return Some(b);
        }
        let mut buf = [0u8; 1];
        match self.inner.read(&mut buf) {
            Ok(1) => Some(buf[0]),
            _ => {
                self.eof = true;
                None
            }
        }
    }

    fn unget_byte(&mut self, b: u8) {
        self.pushback.push(b);
    }

    fn at_eof(&self) -> bool {
        self.pushback.is_empty() && self.eof
    }
}

impl Sink for Vec<u8> {
    fn put_byte(&mut self, b: u8) {
        self.push(b);
    }
}

/// Char encoding used when replacing illegal SGML chars in the 128-159
/// range, regardless of the specified input encoding.
pub const REPLACEMENT_CHAR_ENCODING: Encoding = Encoding::Win1252;

/// Mapping for Windows Western CP-1252 chars 128-159 to Unicode. A zero
/// entry marks an unassigned byte.
pub(crate) static WIN2UNICODE: [u16; 32] = [
    0x20AC, 0x0000, 0x201A, 0x0192, 0x201E, 0x2026, 0x2020, 0x2021,
    0x02C6, 0x2030, 0x0160, 0x2039, 0x0152, 0x0000, 0x017D, 0x0000,
    0x0000, 0x2018, 0x2019, 0x201C, 0x201D, 0x2022, 0x2013, 0x2014,
    0x02DC, 0x2122, 0x0161, 0x203A, 0x0153, 0x0000, 0x017E, 0x0178,
];

/// Mapping for Mac Roman chars 128-255 to Unicode.
pub(crate) static MAC2UNICODE: [u16; 128] = [
    0x00C4, 0x00C5, 0x00C7, 0x00C9, 0x00D1, 0x00D6, 0x00DC, 0x00E1,
    0x00E0, 0x00E2, 0x00E4, 0x00E3, 0x00E5, 0x00E7, 0x00E9, 0x00E8,
    0x00EA, 0x00EB, 0x00ED, 0x00EC, 0x00EE, 0x00EF, 0x00F1, 0x00F3,
    0x00F2, 0x00F4, 0x00F6, 0x00F5, 0x00FA, 0x00F9, 0x00FB, 0x00FC,
    0x2020, 0x00B0, 0x00A2, 0x00A3, 0x00A7, 0x2022, 0x00B6, 0x00DF,
    0x00AE, 0x00A9, 0x2122, 0x00B4, 0x00A8, 0x2260, 0x00C6, 0x00D8,
    0x221E, 0x00B1, 0x2264, 0x2265, 0x00A5, 0x00B5, 0x2202, 0x2211,
    0x220F, 0x03C0, 0x222B, 0x00AA, 0x00BA, 0x03A9, 0x00E6, 0x00F8,
    0x00BF, 0x00A1, 0x00AC, 0x221A, 0x0192, 0x2248, 0x2206, 0x00AB,
    0x00BB, 0x2026, 0x00A0, 0x00C0, 0x00C3, 0x00D5, 0x0152, 0x0153,
    0x2013, 0x2014, 0x201C, 0x201D, 0x2018, 0x2019, 0x00F7, 0x25CA,
    0x00FF, 0x0178, 0x2044, 0x20AC, 0x2039, 0x203A, 0xFB01, 0xFB02,
    0x2021, 0x00B7, 0x201A, 0x201E, 0x2030, 0x00C2, 0x00CA, 0x00C1,
    0x00CB, 0x00C8, 0x00CD, 0x00CE, 0x00CF, 0x00CC, 0x00D3, 0x00D4,
    0xF8FF, 0x00D2, 0x00DA, 0x00DB, 0x00D9, 0x0131, 0x02C6, 0x02DC,
    0x00AF, 0x02D8, 0x02D9, 0x02DA, 0x00B8, 0x02DD, 0x02DB, 0x02C7,
];

/// Mapping for IBM CP-858 (CP-850 with the euro at 0xD5) chars 128-255.
pub(crate) static IBM2UNICODE: [u16; 128] = [
    0x00C7, 0x00FC, 0x00E9, 0x00E2, 0x00E4, 0x00E0, 0x00E5, 0x00E7,
    0x00EA, 0x00EB, 0x00E8, 0x00EF, 0x00EE, 0x00EC, 0x00C4, 0x00C5,
    0x00C9, 0x00E6, 0x00C6, 0x00F4, 0x00F6, 0x00F2, 0x00FB, 0x00F9,
    0x00FF, 0x00D6, 0x00DC, 0x00F8, 0x00A3, 0x00D8, 0x00D7, 0x0192,
    0x00E1, 0x00ED, 0x00F3, 0x00FA, 0x00F1, 0x00D1, 0x00AA, 0x00BA,
    0x00BF, 0x00AE, 0x00AC, 0x00BD, 0x00BC, 0x00A1, 0x00AB, 0x00BB,
    0x2591, 0x2592, 0x2593, 0x2502, 0x2524, 0x00C1, 0x00C2, 0x00C0,
    0x00A9, 0x2563, 0x2551, 0x2557, 0x255D, 0x00A2, 0x00A5, 0x2510,
    0x2514, 0x2534, 0x252C, 0x251C, 0x2500, 0x253C, 0x00E3, 0x00C3,
    0x255A, 0x2554, 0x2569, 0x2566, 0x2560, 0x2550, 0x256C, 0x00A4,
    0x00F0, 0x00D0, 0x00CA, 0x00CB, 0x00C8, 0x20AC, 0x00CD, 0x00CE,
    0x00CF, 0x2518, 0x250C, 0x2588, 0x2584, 0x00A6, 0x00CC, 0x2580,
    0x00D3, 0x00DF, 0x00D4, 0x00D2, 0x00F5, 0x00D5, 0x00B5, 0x00FE,
    0x00DE, 0x00DA, 0x00DB, 0x00D9, 0x00FD, 0x00DD, 0x00AF, 0x00B4,
    0x00AD, 0x00B1, 0x2017, 0x00BE, 0x00B6, 0x00A7, 0x00F7, 0x00B8,
    0x00B0, 0x00A8, 0x00B7, 0x00B9, 0x00B3, 0x00B2, 0x25A0, 0x00A0,
];

pub(crate) fn decode_win1252(b: u8) -> u32 {
    if (128..160).contains(&(b as u32)) {
        WIN2UNICODE[b as usize - 128] as u32
    } else {
        b as u32
    }
}

pub(crate) fn decode_mac_roman(b: u8) -> u32 {
    if b > 127 {
        MAC2UNICODE[b as usize - 128] as u32
    } else {
        b as u32
    }
}

pub(crate) fn decode_ibm858(b: u8) -> u32 {
    if b > 127 {
        IBM2UNICODE[b as usize - 128] as u32
    } else {
        b as u32
    }
}

/// Latin0 (ISO-8859-15) differs from Latin1 in eight code points.
pub(crate) fn decode_latin0(b: u8) -> u32 {
    match b {
        0xA4 => 0x20AC,
        0xA6 => 0x0160,
        0xA8 => 0x0161,
        0xB4 => 0x017D,
        0xB8 => 0x017E,
        0xBC => 0x0152,
        0xBD => 0x0153,
        0xBE => 0x0178,
        _ => b as u32,
    }
}

fn encode_latin0(c: u32) -> Option<u8> {
    Some(match c {
        0x20AC => 0xA4,
        0x0160 => 0xA6,
        0x0161 => 0xA8,
        0x017D => 0xB4,
        0x017E => 0xB8,
        0x0152 => 0xBC,
        0x0153 => 0xBD,
        0x0178 => 0xBE,
        0xA4 | 0xA6 | 0xA8 | 0xB4 | 0xB8 | 0xBC | 0xBD | 0xBE => return None,
        c if c < 256 => c as u8,
        _ => return None,
    })
}

/// ISO-2022 designator states. Designator bytes stay in the character
/// stream; the high bit marks bytes read in a multibyte character set.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Fsm {
    Ascii,
    Esc,
    EscD,
    EscDParen,
    EscParen,
    NonAscii,
}

/// One diagnostic raised inside the stream, to be forwarded by the lexer.
#[derive(Clone, Debug)]
pub struct StreamDiag {
    pub code: ReportCode,
    pub detail: String,
    pub line: u32,
    pub column: u32,
}

const PUSHBACK_DEPTH: usize = 16;

/// Character input stream: decoding, BOM handling, position tracking.
pub struct StreamIn {
    source: Box<dyn Source>,
    pub encoding: Encoding,
    state: Fsm,
    looking_for_bom: bool,
    pub input_had_bom: bool,
    decoder: Option<enc::Decoder>,
    pushed: Vec<char>,
    tabs: u32,
    tab_size: u32,
    xml: bool,
    pub line: u32,
    pub column: u32,
    lastcol: u32,
    pub diags: Vec<StreamDiag>,
}

impl StreamIn {
    pub fn new(source: Box<dyn Source>, encoding: Encoding, tab_size: u32, xml: bool) -> StreamIn {
        StreamIn {
            source,
            encoding,
            state: Fsm::Ascii,
            looking_for_bom: true,
            input_had_bom: false,
            decoder: multi_byte_decoder(encoding),
            pushed: Vec::new(),
            tabs: 0,
            tab_size: if tab_size == 0 { 1 } else { tab_size },
            xml,
            line: 1,
            column: 1,
            lastcol: 1,
            diags: Vec::new(),
        }
    }

    pub fn at_eof(&self) -> bool {
        self.pushed.is_empty() && self.tabs == 0 && self.source.at_eof()
    }

    fn diag(&mut self, code: ReportCode, detail: String) {
        let (line, column) = (self.line, self.column);
        self.diags.push(StreamDiag { code, detail, line, column });
    }

    /// Push back a decoded character; a bounded stack, EOF never pushed.
    pub fn unget_char(&mut self, c: char) {
        if self.pushed.len() >= PUSHBACK_DEPTH {
            self.pushed.remove(0);
        }
        self.pushed.push(c);
        if c == '\n' {
            self.line = self.line.saturating_sub(1);
        }
        self.column = self.lastcol;
    }

    /// Next code point, or None at end of input. Newlines are normalized,
    /// tabs expand to spaces, control characters (except ESC and HTML form
    /// feeds) are dropped.
    pub fn read_char(&mut self) -> Option<char> {
        if let Some(c) = self.pushed.pop() {
            if c == '\n' {
                self.column = 1;
                self.line += 1;
            } else {
                self.column += 1;
            }
            return Some(c);
        }

        self.lastcol = self.column;

        if self.tabs > 0 {
            self.column += 1;
            self.tabs -= 1;
            return Some(' ');
        }

        loop {
            let c = self.read_char_from_stream()?;

            if c == '\n' {
                self.column = 1;
                self.line += 1;
                return Some(c);
            }

            if c == '\t' {
                self.tabs = self.tab_size - ((self.column - 1) % self.tab_size) - 1;
                self.column += 1;
                return Some(' ');
            }

            if c == '\r' {
                match self.read_char_from_stream() {
                    Some('\n') | None => {}
                    Some(c2) => self.unget_char(c2),
                }
                self.column = 1;
                self.line += 1;
                return Some('\n');
            }

            // strip control characters, except for ESC (kept for ISO-2022)
            if c == '\u{001B}' {
                self.column += 1;
                return Some(c);
            }

            // form feed is allowed in HTML but not XML
            if c == '\u{000C}' && !self.xml {
                self.column += 1;
                return Some(c);
            }

            if (c as u32) < 32 {
                continue;
            }

            let c = match self.encoding {
                // already fully decoded
                Encoding::Raw
                | Encoding::Iso2022
                | Encoding::Utf8
                | Encoding::Big5
                | Encoding::ShiftJis => {
                    self.column += 1;
                    return Some(c);
                }
                Encoding::Mac => decode_mac_roman(c as u8),
                Encoding::Ibm858 => decode_ibm858(c as u8),
                Encoding::Latin0 => decode_latin0(c as u8),
                _ => c as u32,
            };

            // 128-159 are unassigned in SGML's document character set;
            // they show up as a side effect of smart quotes in Word. A
            // vendor encoding (win1252, mac) owns the range and maps it
            // silently; elsewhere the byte is reinterpreted through the
            // replacement encoding and reported.
            let c = if (128..160).contains(&c) {
                let is_vendor = matches!(self.encoding, Encoding::Win1252 | Encoding::Mac);
                let c1 = match REPLACEMENT_CHAR_ENCODING {
                    Encoding::Mac => decode_mac_roman(c as u8),
                    _ => decode_win1252(c as u8),
                };
                let c1 = if (128..160).contains(&c1) { 0 } else { c1 };
                if c1 == 0 && is_vendor {
                    self.diag(ReportCode::VendorSpecificChars, format!("U+{:04X}", c));
                } else if !is_vendor {
                    self.diag(ReportCode::InvalidSgmlChars, format!("U+{:04X}", c));
                }
                c1
            } else {
                c
            };

            if c == 0 {
                continue; // illegal char is discarded
            }

            self.column += 1;
            return std::char::from_u32(c);
        }
    }

    /// One decoded code point straight off the byte stream: BOM and
    /// designator handling, multi-byte assembly, no normalization.
    fn read_char_from_stream(&mut self) -> Option<char> {
        let b = self.source.get_byte()?;

        if self.looking_for_bom {
            self.looking_for_bom = false;
            if matches!(
                self.encoding,
                Encoding::Utf8 | Encoding::Utf16 | Encoding::Utf16Le | Encoding::Utf16Be
            ) {
                if let Some(c) = self.check_bom(b) {
                    return Some(c);
                }
                // BOM consumed; continue with the next byte
                let b2 = self.source.get_byte()?;
                return self.decode_byte(b2);
            }
        }

        self.decode_byte(b)
    }

    /// Peek for a BOM starting at byte `b`. Returns the first decoded char
    /// when no BOM was found; None when a BOM was consumed.
    fn check_bom(&mut self, b: u8) -> Option<char> {
        let b1 = match self.source.get_byte() {
            Some(b1) => b1,
            None => return self.decode_byte(b),
        };

        match (b, b1) {
            (0xFE, 0xFF) => {
                if self.encoding != Encoding::Utf16 && self.encoding != Encoding::Utf16Be {
                    self.diag(ReportCode::EncodingMismatch, "utf16be".to_string());
                }
                self.encoding = Encoding::Utf16Be;
                self.decoder = None;
                self.input_had_bom = true;
                None
            }
            (0xFF, 0xFE) => {
                if self.encoding != Encoding::Utf16 && self.encoding != Encoding::Utf16Le {
                    self.diag(ReportCode::EncodingMismatch, "utf16le".to_string());
                }
                self.encoding = Encoding::Utf16Le;
                self.decoder = None;
                self.input_had_bom = true;
                None
            }
            (0xEF, 0xBB) => match self.source.get_byte() {
                Some(0xBF) => {
                    if self.encoding != Encoding::Utf8 {
                        self.diag(ReportCode::EncodingMismatch, "utf8".to_string());
                        self.encoding = Encoding::Utf8;
                        self.decoder = multi_byte_decoder(Encoding::Utf8);
                    }
                    self.input_had_bom = true;
                    None
                }
                Some(b2) => {
                    self.source.unget_byte(b2);
                    self.source.unget_byte(b1);
                    self.decode_byte(b)
                }
                None => {
                    self.source.unget_byte(b1);
                    self.decode_byte(b)
                }
            },
            _ => {
                self.source.unget_byte(b1);
                self.decode_byte(b)
            }
        }
    }

    fn decode_byte(&mut self, b: u8) -> Option<char> {
        match self.encoding {
            Encoding::Iso2022 => Some(self.iso2022_byte(b)),
            Encoding::Utf16 | Encoding::Utf16Be => self.utf16_unit(b, true),
            Encoding::Utf16Le => self.utf16_unit(b, false),
            Encoding::Utf8 | Encoding::Big5 | Encoding::ShiftJis => self.decoder_byte(b),
            _ => Some(b as char),
        }
    }

    fn iso2022_byte(&mut self, b: u8) -> char {
        if b == 0x1B {
            self.state = Fsm::Esc;
            return b as char;
        }
        match self.state {
            Fsm::Esc => {
                self.state = match b {
                    b'$' => Fsm::EscD,
                    b'(' => Fsm::EscParen,
                    _ => Fsm::Ascii,
                };
                b as char
            }
            Fsm::EscD => {
                self.state = if b == b'(' { Fsm::EscDParen } else { Fsm::NonAscii };
                b as char
            }
            Fsm::EscDParen => {
                self.state = Fsm::NonAscii;
                b as char
            }
            Fsm::EscParen => {
                self.state = Fsm::Ascii;
                b as char
            }
            Fsm::NonAscii => (b | 0x80) as char,
            Fsm::Ascii => b as char,
        }
    }

    fn utf16_pair(&mut self, b: u8, big_endian: bool) -> Option<u16> {
        let b1 = self.source.get_byte()?;
        Some(if big_endian {
            ((b as u16) << 8) | b1 as u16
        } else {
            ((b1 as u16) << 8) | b as u16
        })
    }

    fn utf16_unit(&mut self, b: u8, big_endian: bool) -> Option<char> {
        let unit = self.utf16_pair(b, big_endian)?;
        if (0xD800..0xDC00).contains(&unit) {
            // high surrogate: need the low half
            let b2 = match self.source.get_byte() {
                Some(b2) => b2,
                None => {
                    self.diag(ReportCode::InvalidUtf16, format!("U+{:04X}", unit));
                    return None;
                }
            };
            match self.utf16_pair(b2, big_endian) {
                Some(low) if (0xDC00..0xE000).contains(&low) => {
                    let c = 0x10000 + (((unit as u32) - 0xD800) << 10) + ((low as u32) - 0xDC00);
                    std::char::from_u32(c)
                }
                _ => {
                    self.diag(ReportCode::InvalidUtf16, format!("U+{:04X}", unit));
                    self.read_char_from_stream()
                }
            }
        } else if (0xDC00..0xE000).contains(&unit) {
            // unpaired low surrogate: discard
            self.diag(ReportCode::InvalidUtf16, format!("U+{:04X}", unit));
            self.read_char_from_stream()
        } else {
            std::char::from_u32(unit as u32)
        }
    }

    /// Feed single bytes to the incremental decoder until one character
    /// completes. Malformed sequences replace with U+FFFD and report.
    fn decoder_byte(&mut self, b: u8) -> Option<char> {
        let mut byte = b;
        let mut out = [0u8; 8];
        loop {
            let decoder = self.decoder.as_mut()?;
            let (result, _read, written) =
                decoder.decode_to_utf8_without_replacement(&[byte], &mut out, false);
            if written > 0 {
                let s = std::str::from_utf8(&out[..written]).ok()?;
                return s.chars().next();
            }
            match result {
                enc::DecoderResult::InputEmpty => {
                    byte = match self.source.get_byte() {
                        Some(nb) => nb,
                        None => {
                            // flush any malformed tail
                            let decoder = self.decoder.as_mut()?;
                            let (r, _, w) =
                                decoder.decode_to_utf8_without_replacement(&[], &mut out, true);
                            self.decoder = multi_byte_decoder(self.encoding);
                            if let enc::DecoderResult::Malformed(..) = r {
                                self.diag(ReportCode::InvalidUtf8, "incomplete sequence".into());
                                return Some('\u{FFFD}');
                            }
                            if w > 0 {
                                let s = std::str::from_utf8(&out[..w]).ok()?;
                                return s.chars().next();
                            }
                            return None;
                        }
                    };
                }
                enc::DecoderResult::Malformed(..) => {
                    let code = if self.encoding == Encoding::Utf8 {
                        ReportCode::InvalidUtf8
                    } else {
                        ReportCode::InvalidSgmlChars
                    };
                    self.diag(code, format!("0x{:02X}", byte));
                    return Some('\u{FFFD}');
                }
                enc::DecoderResult::OutputFull => unreachable!("8-byte scratch too small"),
            }
        }
    }
}

fn multi_byte_decoder(encoding: Encoding) -> Option<enc::Decoder> {
    match encoding {
        Encoding::Utf8 => Some(enc::UTF_8.new_decoder_without_bom_handling()),
        Encoding::Big5 => Some(enc::BIG5.new_decoder_without_bom_handling()),
        Encoding::ShiftJis => Some(enc::SHIFT_JIS.new_decoder_without_bom_handling()),
        _ => None,
    }
}

/// Character output stream: encoding transcode, newline policy, BOM.
pub struct StreamOut {
    sink: Box<dyn Sink>,
    pub encoding: Encoding,
    newline: Newline,
    state: Fsm,
    encoder: Option<enc::Encoder>,
}

impl StreamOut {
    pub fn new(sink: Box<dyn Sink>, encoding: Encoding, newline: Newline) -> StreamOut {
        let encoder = match encoding {
            Encoding::Big5 => Some(enc::BIG5.new_encoder()),
            Encoding::ShiftJis => Some(enc::SHIFT_JIS.new_encoder()),
            _ => None,
        };
        StreamOut { sink, encoding, newline, state: Fsm::Ascii, encoder }
    }

    /// Emit the BOM appropriate for the output encoding, per the
    /// `output-bom` policy resolved by the caller.
    pub fn write_bom(&mut self) {
        match self.encoding {
            Encoding::Utf8 => {
                self.sink.put_byte(0xEF);
                self.sink.put_byte(0xBB);
                self.sink.put_byte(0xBF);
            }
            Encoding::Utf16 | Encoding::Utf16Be => {
                self.sink.put_byte(0xFE);
                self.sink.put_byte(0xFF);
            }
            Encoding::Utf16Le => {
                self.sink.put_byte(0xFF);
                self.sink.put_byte(0xFE);
            }
            _ => {}
        }
    }

    pub fn write_str(&mut self, s: &str) {
        for c in s.chars() {
            self.write_char(c);
        }
    }

    pub fn write_char(&mut self, c: char) {
        if c == '\n' {
            match self.newline {
                Newline::Lf => {}
                Newline::CrLf => {
                    self.put_encoded('\r');
                }
                Newline::Cr => {
                    self.put_encoded('\r');
                    return;
                }
            }
        }
        self.put_encoded(c);
    }

    fn put_encoded(&mut self, c: char) {
        let cp = c as u32;
        match self.encoding {
            Encoding::Mac => {
                if cp < 128 {
                    self.sink.put_byte(cp as u8);
                } else if let Some(i) = MAC2UNICODE.iter().position(|&u| u as u32 == cp) {
                    self.sink.put_byte((i + 128) as u8);
                }
            }
            Encoding::Win1252 => {
                if cp < 128 || (159 < cp && cp < 256) {
                    self.sink.put_byte(cp as u8);
                } else if let Some(i) = WIN2UNICODE.iter().position(|&u| u != 0 && u as u32 == cp) {
                    self.sink.put_byte((i + 128) as u8);
                }
            }
            Encoding::Ibm858 => {
                if cp < 128 {
                    self.sink.put_byte(cp as u8);
                } else if let Some(i) = IBM2UNICODE.iter().position(|&u| u as u32 == cp) {
                    self.sink.put_byte((i + 128) as u8);
                }
            }
            Encoding::Latin0 => {
                if let Some(b) = encode_latin0(cp) {
                    self.sink.put_byte(b);
                }
            }
            Encoding::Utf8 => {
                let mut buf = [0u8; 4];
                for b in c.encode_utf8(&mut buf).as_bytes() {
                    self.sink.put_byte(*b);
                }
            }
            Encoding::Iso2022 => {
                let mut b = cp;
                if cp == 0x1B {
                    self.state = Fsm::Esc;
                } else {
                    match self.state {
                        Fsm::Esc => {
                            self.state = match cp {
                                0x24 => Fsm::EscD,
                                0x28 => Fsm::EscParen,
                                _ => Fsm::Ascii,
                            };
                        }
                        Fsm::EscD => {
                            self.state =
                                if cp == 0x28 { Fsm::EscDParen } else { Fsm::NonAscii };
                        }
                        Fsm::EscDParen => self.state = Fsm::NonAscii,
                        Fsm::EscParen => self.state = Fsm::Ascii,
                        Fsm::NonAscii => b &= 0x7F,
                        Fsm::Ascii => {}
                    }
                }
                if b < 256 {
                    self.sink.put_byte(b as u8);
                }
            }
            Encoding::Utf16 | Encoding::Utf16Be | Encoding::Utf16Le => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    if self.encoding == Encoding::Utf16Le {
                        self.sink.put_byte((*unit & 0xFF) as u8);
                        self.sink.put_byte((*unit >> 8) as u8);
                    } else {
                        self.sink.put_byte((*unit >> 8) as u8);
                        self.sink.put_byte((*unit & 0xFF) as u8);
                    }
                }
            }
            Encoding::Big5 | Encoding::ShiftJis => {
                if let Some(encoder) = self.encoder.as_mut() {
                    let mut buf = [0u8; 8];
                    let mut sbuf = [0u8; 4];
                    let s: &str = c.encode_utf8(&mut sbuf);
                    let (_result, _read, written, _) =
                        encoder.encode_from_utf8(s, &mut buf, false);
                    for b in &buf[..written] {
                        self.sink.put_byte(*b);
                    }
                }
            }
            // raw, ascii, latin1
            _ => {
                if cp < 256 {
                    self.sink.put_byte(cp as u8);
                }
            }
        }
    }
}

/// Resolve the `output-bom` tri-state against what the input began with.
pub fn want_output_bom(policy: AutoBool, input_had_bom: bool) -> bool {
    match policy {
        AutoBool::Yes => true,
        AutoBool::No => false,
        AutoBool::Auto => input_had_bom,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Encoding;

    fn stream(bytes: &[u8], encoding: Encoding) -> StreamIn {
        StreamIn::new(Box::new(BufSource::new(bytes)), encoding, 8, false)
    }

    fn drain(mut s: StreamIn) -> (String, Vec<StreamDiag>) {
        let mut out = String::new();
        while let Some(c) = s.read_char() {
            out.push(c);
        }
        (out, s.diags)
    }

    #[test]
    fn ascii_passthrough() {
        let (s, d) = drain(stream(b"hello", Encoding::Ascii));
        assert_eq!("hello", s);
        assert!(d.is_empty());
    }

    #[test]
    fn newline_normalization() {
        let (s, _) = drain(stream(b"a\r\nb\rc\nd", Encoding::Ascii));
        assert_eq!("a\nb\nc\nd", s);
    }

    #[test]
    fn tab_expansion() {
        let (s, _) = drain(stream(b"a\tb", Encoding::Ascii));
        // tab at column 2 expands to the next multiple of 8
        assert_eq!("a       b", s);
    }

    #[test]
    fn position_tracking() {
        let mut s = stream(b"ab\ncd", Encoding::Ascii);
        assert_eq!(Some('a'), s.read_char());
        assert_eq!((1, 2), (s.line, s.column));
        s.read_char(); // b
        s.read_char(); // \n
        assert_eq!((2, 1), (s.line, s.column));
        assert_eq!(Some('c'), s.read_char());
        assert_eq!((2, 2), (s.line, s.column));
    }

    #[test]
    fn unget_restores_position() {
        let mut s = stream(b"xy", Encoding::Ascii);
        let c = s.read_char().unwrap();
        s.unget_char(c);
        assert_eq!((1, 1), (s.line, s.column));
        assert_eq!(Some('x'), s.read_char());
        assert_eq!(Some('y'), s.read_char());
    }

    #[test]
    fn utf8_bom_consumed() {
        let mut s = stream(b"\xEF\xBB\xBFx", Encoding::Utf8);
        assert_eq!(Some('x'), s.read_char());
        assert!(s.input_had_bom);
        assert!(s.diags.is_empty());
    }

    #[test]
    fn utf16be_bom_switches() {
        let mut s = stream(b"\xFE\xFF\x00x", Encoding::Utf8);
        assert_eq!(Some('x'), s.read_char());
        assert!(s.input_had_bom);
        assert_eq!(Encoding::Utf16Be, s.encoding);
        assert_eq!(1, s.diags.len());
        assert_eq!(ReportCode::EncodingMismatch, s.diags[0].code);
    }

    #[test]
    fn no_bom_ungets() {
        let (s, _) = drain(stream(b"ab", Encoding::Utf8));
        assert_eq!("ab", s);
    }

    #[test]
    fn utf8_decode_and_malformed() {
        let (s, d) = drain(stream(b"a\xEA\x99\xAEz", Encoding::Utf8));
        assert_eq!("a\u{a66e}z", s);
        assert!(d.is_empty());

        let (s, d) = drain(stream(b"a\xC0z", Encoding::Utf8));
        assert_eq!("a\u{FFFD}z", s);
        assert_eq!(1, d.len());
        assert_eq!(ReportCode::InvalidUtf8, d[0].code);
    }

    #[test]
    fn win1252_smart_quotes() {
        // 0x93/0x94 are curly quotes in CP-1252: decoded without comment
        let (s, d) = drain(stream(b"\x93hi\x94", Encoding::Win1252));
        assert_eq!("\u{201C}hi\u{201D}", s);
        assert!(d.is_empty());
    }

    #[test]
    fn win1252_unassigned_byte() {
        let (s, d) = drain(stream(b"a\x81b", Encoding::Win1252));
        assert_eq!("ab", s);
        assert_eq!(1, d.len());
        assert_eq!(ReportCode::VendorSpecificChars, d[0].code);
    }

    #[test]
    fn latin1_c1_replaced() {
        // 0x93 in Latin-1 is an illegal C1 control: replaced per Win-1252
        let (s, d) = drain(stream(b"a\x93b", Encoding::Latin1));
        assert_eq!("a\u{201C}b", s);
        assert_eq!(1, d.len());
        assert_eq!(ReportCode::InvalidSgmlChars, d[0].code);
    }

    #[test]
    fn mac_roman() {
        let (s, _) = drain(stream(b"\x80\xA9", Encoding::Mac));
        assert_eq!("\u{00C4}\u{2122}", s);
    }

    #[test]
    fn latin0_euro() {
        let (s, _) = drain(stream(b"\xA4", Encoding::Latin0));
        assert_eq!("\u{20AC}", s);
    }

    #[test]
    fn utf16_surrogate_pair() {
        // U+10384 = D800 DF84
        let (s, d) = drain(stream(b"\xD8\x00\xDF\x84", Encoding::Utf16Be));
        assert_eq!("\u{10384}", s);
        assert!(d.is_empty());
    }

    #[test]
    fn utf16_unpaired_surrogate_discarded() {
        let mut s = StreamIn::new(
            Box::new(BufSource::new(&b"\xDC\x00\x00x"[..])),
            Encoding::Utf16Be,
            8,
            false,
        );
        s.looking_for_bom = false;
        let (out, d) = drain(s);
        assert_eq!("x", out);
        assert_eq!(1, d.len());
        assert_eq!(ReportCode::InvalidUtf16, d[0].code);
    }

    #[test]
    fn iso2022_designators_preserved() {
        let (s, _) = drain(stream(b"\x1B$B01\x1B(Ba", Encoding::Iso2022));
        let bytes: Vec<u32> = s.chars().map(|c| c as u32).collect();
        // ESC $ B retained; '0' '1' get the high bit; ESC ( B returns to
        // ASCII for 'a'
        assert_eq!(
            vec![0x1B, 0x24, 0x42, 0xB0, 0xB1, 0x1B, 0x28, 0x42, 0x61],
            bytes
        );
    }

    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Sink for SharedSink {
        fn put_byte(&mut self, b: u8) {
            self.0.borrow_mut().push(b);
        }
    }

    impl SharedSink {
        fn bytes(&self) -> Vec<u8> {
            self.0.borrow().clone()
        }
    }

    fn transcode(s: &str, encoding: Encoding, newline: Newline) -> Vec<u8> {
        let sink = SharedSink::default();
        let mut out = StreamOut::new(Box::new(sink.clone()), encoding, newline);
        out.write_str(s);
        sink.bytes()
    }

    #[test]
    fn out_utf8() {
        assert_eq!(b"a\xE2\x82\xAC".to_vec(), transcode("a\u{20AC}", Encoding::Utf8, Newline::Lf));
    }

    #[test]
    fn out_newline_policy() {
        assert_eq!(b"a\r\nb".to_vec(), transcode("a\nb", Encoding::Ascii, Newline::CrLf));
        assert_eq!(b"a\rb".to_vec(), transcode("a\nb", Encoding::Ascii, Newline::Cr));
    }

    #[test]
    fn out_win1252() {
        assert_eq!(b"\x93x\x94".to_vec(),
            transcode("\u{201C}x\u{201D}", Encoding::Win1252, Newline::Lf));
    }

    #[test]
    fn out_utf16() {
        assert_eq!(b"\x00x".to_vec(), transcode("x", Encoding::Utf16Be, Newline::Lf));
        assert_eq!(b"x\x00".to_vec(), transcode("x", Encoding::Utf16Le, Newline::Lf));
    }

    #[test]
    fn out_bom() {
        let sink = SharedSink::default();
        let mut out = StreamOut::new(Box::new(sink.clone()), Encoding::Utf8, Newline::Lf);
        out.write_bom();
        assert_eq!(b"\xEF\xBB\xBF".to_vec(), sink.bytes());
    }

    #[test]
    fn round_trip_vendor_pages() {
        // decode(encode(c)) == c for every representable code point
        for b in 160u8..=255 {
            let c = decode_latin0(b);
            assert_eq!(Some(b), encode_latin0(c), "latin0 byte 0x{:02X}", b);
        }
        for b in 128u8..=255 {
            let c = decode_mac_roman(b);
            let bytes = transcode(
                &std::char::from_u32(c).unwrap().to_string(),
                Encoding::Mac,
                Newline::Lf,
            );
            assert_eq!(c, decode_mac_roman(bytes[0]), "mac byte 0x{:02X}", b);
        }
    }

    #[test]
    fn want_bom() {
        assert!(want_output_bom(AutoBool::Yes, false));
        assert!(!want_output_bom(AutoBool::No, true));
        assert!(want_output_bom(AutoBool::Auto, true));
        assert!(!want_output_bom(AutoBool::Auto, false));
    }
}
