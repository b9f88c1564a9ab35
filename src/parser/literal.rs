//! Constant evaluation for literal nodes, and comment unwrapping.

use super::ast::{BoolLit, Comment, CommentKind, FloatLit, IntLit, StrLit};

/// Magnitude of an unsigned integer literal: `0x`/`0X` hex, leading `0`
/// octal, decimal otherwise.
pub fn eval_int(text: &str) -> Option<u64> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if text.len() > 1 && text.starts_with('0') {
        u64::from_str_radix(&text[1..], 8).ok()
    } else {
        text.parse().ok()
    }
}

/// `inf` and `nan` map to the IEEE values; anything else parses as a decimal float.
pub fn eval_float(text: &str) -> Option<f64> {
    match text {
        "inf" => Some(f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}

pub fn eval_bool(text: &str) -> Option<bool> {
    match text {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Decode one quoted string token (quotes included) into bytes.
pub fn eval_str_token(text: &str) -> Vec<u8> {
    let bytes = text.as_bytes();
    let inner = if bytes.len() >= 2 && (bytes[0] == b'"' || bytes[0] == b'\'') {
        &bytes[1..bytes.len() - 1]
    } else {
        bytes
    };

    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let b = inner[i];
        i += 1;
        if b != b'\\' || i >= inner.len() {
            out.push(b);
            continue;
        }
        let esc = inner[i];
        i += 1;
        match esc {
            b'x' | b'X' => {
                let digits = take_digits(&inner[i..], 2, |c| c.is_ascii_hexdigit());
                if digits == 0 {
                    out.push(esc);
                } else {
                    out.push(parse_radix(&inner[i..i + digits], 16) as u8);
                    i += digits;
                }
            }
            b'0'..=b'7' => {
                let digits = 1 + take_digits(&inner[i..], 2, |c| (b'0'..=b'7').contains(&c));
                let value = parse_radix(&inner[i - 1..i - 1 + digits], 8);
                out.push((value % 256) as u8);
                i += digits - 1;
            }
            b'u' | b'U' => {
                let want = if esc == b'u' { 4 } else { 8 };
                let digits = take_digits(&inner[i..], want, |c| c.is_ascii_hexdigit());
                let decoded = (digits == want)
                    .then(|| char::from_u32(parse_radix(&inner[i..i + digits], 16)))
                    .flatten();
                match decoded {
                    Some(c) => {
                        let mut buf = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        i += digits;
                    }
                    None => out.push(esc),
                }
            }
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0b),
            other => out.push(other),
        }
    }
    out
}

fn take_digits(bytes: &[u8], max: usize, pred: impl Fn(u8) -> bool) -> usize {
    bytes.iter().take(max).take_while(|&&c| pred(c)).count()
}

fn parse_radix(digits: &[u8], radix: u32) -> u32 {
    digits
        .iter()
        .filter_map(|&c| (c as char).to_digit(radix))
        .fold(0u32, |acc, d| acc.wrapping_mul(radix).wrapping_add(d))
}

/// Concatenate all adjacent parts of a string literal.
pub fn eval_str_lit(lit: &StrLit) -> Vec<u8> {
    lit.parts
        .iter()
        .flat_map(|p| eval_str_token(&p.text))
        .collect()
}

impl IntLit {
    /// Signed value. `None` if the magnitude overflows `u64`.
    pub fn value(&self) -> Option<i128> {
        let magnitude = eval_int(&self.value.text)? as i128;
        Some(match &self.sign {
            Some(s) if s.is("-") => -magnitude,
            _ => magnitude,
        })
    }
}

impl FloatLit {
    pub fn value(&self) -> Option<f64> {
        let v = eval_float(&self.value.text)?;
        Some(match &self.sign {
            Some(s) if s.is("-") => -v,
            _ => v,
        })
    }
}

impl StrLit {
    pub fn value(&self) -> Vec<u8> {
        eval_str_lit(self)
    }

    /// The value as text, replacing invalid UTF-8.
    pub fn value_lossy(&self) -> String {
        String::from_utf8_lossy(&self.value()).into_owned()
    }
}

impl BoolLit {
    pub fn value(&self) -> bool {
        self.token.is("true")
    }
}

/// Strip comment markers, leaving the text a reader sees.
///
/// Block comments also lose a leading `*` on each continuation line.
pub fn unwrap_comment(comment: &Comment) -> String {
    let text = comment.token.text.as_str();
    match comment.kind {
        CommentKind::Line => text.trim_start_matches("//").trim_end().to_string(),
        CommentKind::Block => {
            let body = text.strip_prefix("/*").unwrap_or(text);
            let body = body.strip_suffix("*/").unwrap_or(body);
            body.lines()
                .enumerate()
                .map(|(i, line)| {
                    if i == 0 {
                        return line.trim_end();
                    }
                    let line = line.trim_start();
                    line.strip_prefix('*').unwrap_or(line).trim_end()
                })
                .collect::<Vec<_>>()
                .join("\n")
                .trim_matches('\n')
                .to_string()
        }
    }
}
