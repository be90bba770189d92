//! Ad-filter pattern translation
//!
//! Converts the pattern part of a network filter (`||host^`, `|https://`,
//! `/ads/*.gif`, `/regex/`) into an anchored regular expression the backend
//! matcher understands. Translation is total: anything that is not syntax
//! is emitted as an escaped literal.

/// Replacement for `^`: one separator character, or the end of the URL.
/// A separator is anything but a letter, a digit, or one of `_ . % -`.
pub const SEPARATOR: &str = "(?:[^A-Za-z0-9_.%-]|$)";

/// Replacement for a leading `||`: start of URL, optional scheme, optional
/// subdomain labels. The literal domain follows.
pub const HOST_ANCHOR: &str = "^(?:[A-Za-z][A-Za-z0-9+.-]*://)?(?:[^/?#]*\\.)?";

/// Characters that have to be escaped to stay literal.
#[inline]
fn is_meta(ch: char) -> bool {
    matches!(
        ch,
        '\\' | '.' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '$'
    )
}

/// Inner expression of a `/.../` regex literal, if the pattern is one.
pub fn regex_literal(raw: &str) -> Option<&str> {
    if raw.len() > 2 && raw.starts_with('/') && raw.ends_with('/') {
        Some(&raw[1..raw.len() - 1])
    } else {
        None
    }
}

/// Translate an ad-filter pattern into an anchored match pattern.
///
/// Anchors are consumed before the body is escaped so the synthesized
/// fragments are never escaped twice.
pub fn to_match_pattern(raw: &str) -> String {
    let raw = raw.trim();
    if let Some(inner) = regex_literal(raw) {
        return inner.to_string();
    }

    let mut out = String::with_capacity(raw.len() * 2 + HOST_ANCHOR.len());
    let mut body = raw;

    if let Some(rest) = body.strip_prefix("||") {
        out.push_str(HOST_ANCHOR);
        body = rest;
    } else if let Some(rest) = body.strip_prefix('|') {
        out.push('^');
        body = rest;
    }

    let right_anchor = body.ends_with('|');
    if right_anchor {
        body = &body[..body.len() - 1];
    }

    let mut prev_wildcard = false;
    for ch in body.chars() {
        match ch {
            '*' => {
                if !prev_wildcard {
                    out.push_str(".*");
                }
            }
            '^' => out.push_str(SEPARATOR),
            c if is_meta(c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
        prev_wildcard = ch == '*';
    }

    if right_anchor {
        out.push('$');
    }

    if out.is_empty() {
        out.push_str(".*");
    }

    out
}

/// Check that a translated pattern compiles, with the size ceiling the
/// backend applies to regex conditions.
pub fn is_valid_match_pattern(pattern: &str) -> bool {
    !pattern.is_empty()
        && regex::RegexBuilder::new(pattern)
            .size_limit(1 << 20)
            .build()
            .is_ok()
}
