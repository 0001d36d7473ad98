//! Regular expression literals.
//!
//! JavaScript patterns are compiled with the `regex` crate. The two dialects
//! agree on everything catalog helpers write (classes, alternation,
//! quantifiers, anchors, `\s`), so translation is mostly escaping:
//!
//! | JavaScript | Compiled as |
//! |------------|-------------|
//! | `\/` | `/` |
//! | `\uXXXX`, `\u{X}` | `\x{XXXX}` |
//! | `\0` | `\x00` |
//! | `[` `&` `~` inside a class | escaped (set operators in `regex`) |
//! | a `{` or `}` that is not a quantifier, a stray `]` | escaped |
//!
//! Lookaround and backreferences have no counterpart and fail to compile.
//! `\d`, `\w` and `\b` are Unicode-aware rather than ASCII-only.

use super::ast::RegexLiteral;
use regex::RegexBuilder;

/// Compile `/pattern/flags`. The error is a human-readable message.
pub fn compile(pattern: &str, flags: &str) -> Result<RegexLiteral, String> {
    let mut builder_flags = (false, false, false);
    for flag in flags.chars() {
        match flag {
            'g' | 'u' | 'd' => {}
            'i' => builder_flags.0 = true,
            'm' => builder_flags.1 = true,
            's' => builder_flags.2 = true,
            other => return Err(format!("regular expression flag `{other}` is not supported")),
        }
    }
    let (case_insensitive, multi_line, dot_all) = builder_flags;
    let translated = translate(pattern)?;
    let regex = RegexBuilder::new(&translated)
        .case_insensitive(case_insensitive)
        .multi_line(multi_line)
        .dot_matches_new_line(dot_all)
        .crlf(true)
        .build()
        .map_err(|e| format!("invalid regular expression /{pattern}/: {}", last_line(&e.to_string())))?;
    Ok(RegexLiteral {
        source: pattern.to_string(),
        flags: flags.to_string(),
        regex,
    })
}

fn last_line(message: &str) -> &str {
    message.lines().last().unwrap_or(message).trim()
}

/// Rewrite JavaScript pattern syntax into `regex` crate syntax.
fn translate(pattern: &str) -> Result<String, String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut in_class = false;
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let Some(&next) = chars.get(i + 1) else {
                    return Err("pattern ends with a lone backslash".into());
                };
                i += 2;
                match next {
                    '/' => out.push('/'),
                    '0' => out.push_str(r"\x00"),
                    'u' => {
                        let (code, used) = unicode_escape(&chars[i..])
                            .ok_or_else(|| "bad \\u escape in regular expression".to_string())?;
                        out.push_str(&format!(r"\x{{{code}}}"));
                        i += used;
                    }
                    '1'..='9' => {
                        return Err("backreferences are not supported in regular expressions".into());
                    }
                    other => {
                        out.push('\\');
                        out.push(other);
                    }
                }
                continue;
            }
            '[' if in_class => out.push_str(r"\["),
            '&' | '~' if in_class => {
                out.push('\\');
                out.push(c);
            }
            '[' => {
                in_class = true;
                out.push('[');
                // a `]` right after the opener is a literal
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                if chars.get(i + 1) == Some(&']') {
                    out.push_str(r"\]");
                    i += 1;
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(']');
            }
            ']' => out.push_str(r"\]"),
            '(' if chars.get(i + 1) == Some(&'?') => {
                match chars.get(i + 2) {
                    Some(':') => out.push_str("(?:"),
                    Some('<') if !matches!(chars.get(i + 3), Some('=' | '!')) => out.push_str("(?<"),
                    _ => return Err("lookaround is not supported in regular expressions".into()),
                }
                i += 3;
                continue;
            }
            '{' if !in_class && !is_quantifier(&chars[i..]) => out.push_str(r"\{"),
            '}' if !in_class && !closes_quantifier(&chars[..i]) => out.push_str(r"\}"),
            other => out.push(other),
        }
        i += 1;
    }
    if in_class {
        return Err("unterminated character class".into());
    }
    Ok(out)
}

/// Parse the hex digits after `\u`; returns the code and characters used.
fn unicode_escape(rest: &[char]) -> Option<(String, usize)> {
    if rest.first() == Some(&'{') {
        let end = rest.iter().position(|&c| c == '}')?;
        let digits: String = rest[1..end].iter().collect();
        (!digits.is_empty() && digits.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| (digits, end + 1))
    } else {
        let digits: String = rest.iter().take(4).collect();
        (digits.len() == 4 && digits.chars().all(|c| c.is_ascii_hexdigit())).then_some((digits, 4))
    }
}

/// `{n}`, `{n,}` or `{n,m}` starting at `rest[0]`.
fn is_quantifier(rest: &[char]) -> bool {
    let Some(end) = rest.iter().position(|&c| c == '}') else {
        return false;
    };
    let body: String = rest[1..end].iter().collect();
    let mut parts = body.splitn(2, ',');
    let min = parts.next().unwrap_or_default();
    let max = parts.next();
    !min.is_empty()
        && min.chars().all(|c| c.is_ascii_digit())
        && max.is_none_or(|m| m.chars().all(|c| c.is_ascii_digit()))
}

/// Whether the `}` after `before` ends a quantifier.
fn closes_quantifier(before: &[char]) -> bool {
    match before.iter().rposition(|&c| c == '{') {
        Some(open) => is_quantifier(&before[open..].iter().copied().chain(['}']).collect::<Vec<_>>()),
        None => false,
    }
}
