//! `application/x-www-form-urlencoded` body decoding.
//!
//! This is not general percent-decoding. Only `+` and a fixed table of
//! `%XX` escapes are understood; any other escape is kept literally, so
//! `%E2%9C%93` reaches the config unchanged. Browsers only produce the
//! listed escapes for the characters people actually type into SSIDs and
//! passwords on the settings page.

use std::collections::HashMap;
use zeroize::Zeroize;

/// Recognised escapes, matched case-insensitively on the hex digits.
const ESCAPES: &[(&str, char)] = &[
    ("40", '@'),
    ("21", '!'),
    ("23", '#'),
    ("24", '$'),
    ("25", '%'),
    ("26", '&'),
    ("2B", '+'),
    ("2F", '/'),
    ("3D", '='),
    ("3F", '?'),
];

/// Decode one form value.
///
/// Single pass: the output of one escape is never decoded again, so
/// `%2540` yields `%40`, not `@`.
pub fn decode_value(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(c) = rest.chars().next() {
        if c == '+' {
            out.push(' ');
            rest = &rest[1..];
            continue;
        }
        if c == '%' {
            if let Some(hex) = rest.get(1..3) {
                if let Some((_, decoded)) = ESCAPES
                    .iter()
                    .find(|(code, _)| code.eq_ignore_ascii_case(hex))
                {
                    out.push(*decoded);
                    rest = &rest[3..];
                    continue;
                }
            }
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Decoded form fields.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormData {
    fields: HashMap<String, String>,
}

impl FormData {
    /// Parse `key=value` pairs joined by `&`.
    ///
    /// Pairs without `=` are ignored. The key is taken verbatim, the value
    /// decoded with [`decode_value`]. A repeated key keeps the last value.
    pub fn parse(body: &str) -> Self {
        let fields = body
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .map(|(key, value)| (key.to_string(), decode_value(value)))
            .collect();
        Self { fields }
    }

    /// Decoded value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Value for `key`, or `default` when the field was not submitted.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// True when the body held no `key=value` pairs.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// Form values include the WiFi password.
impl Drop for FormData {
    fn drop(&mut self) {
        self.fields.values_mut().for_each(|value| value.zeroize());
    }
}
