//! Tolerant repair of almost-JSON produced by language models.
//!
//! Handles the malformations models actually emit: trailing commas, unquoted
//! keys, single-quoted strings, Python literals, raw newlines inside strings,
//! leading prose, trailing chatter, and output truncated mid-structure.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Object { expect_key: bool, pending_key: bool },
    Array,
}

impl Frame {
    fn closer(&self) -> char {
        match self {
            Frame::Object { .. } => '}',
            Frame::Array => ']',
        }
    }
}

/// Attempt to turn `input` into syntactically valid JSON.
///
/// Returns `None` when the text contains no JSON container at all. The output
/// is not guaranteed to parse; callers still run it through `serde_json`.
pub fn repair_json(input: &str) -> Option<String> {
    let start = input.find(['{', '['])?;
    let chars: Vec<char> = input[start..].chars().collect();
    let mut out = String::with_capacity(chars.len() + 8);
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                let (literal, next, closed) = read_string(&chars, i);
                out.push_str(&literal);
                note_scalar(&mut stack);
                i = next;
                if !closed {
                    break;
                }
                continue;
            }
            '{' => {
                note_scalar(&mut stack);
                stack.push(Frame::Object {
                    expect_key: true,
                    pending_key: false,
                });
                out.push('{');
            }
            '[' => {
                note_scalar(&mut stack);
                stack.push(Frame::Array);
                out.push('[');
            }
            '}' | ']' => {
                strip_trailing_comma(&mut out);
                if let Some(frame) = stack.pop() {
                    close_pending_key(&mut out, &frame);
                    out.push(frame.closer());
                }
                if stack.is_empty() {
                    break;
                }
            }
            ',' => {
                strip_trailing_comma(&mut out);
                out.push(',');
                if let Some(Frame::Object { expect_key, .. }) = stack.last_mut() {
                    *expect_key = true;
                }
            }
            ':' => {
                out.push(':');
                if let Some(Frame::Object {
                    expect_key,
                    pending_key,
                }) = stack.last_mut()
                {
                    *expect_key = false;
                    *pending_key = false;
                }
            }
            c if c.is_whitespace() => out.push(c),
            _ => {
                let (word, next) = read_bare(&chars, i);
                let expecting_key = matches!(
                    stack.last(),
                    Some(Frame::Object {
                        expect_key: true,
                        ..
                    })
                );
                if expecting_key {
                    out.push_str(&quote(&word));
                } else {
                    out.push_str(&normalize_literal(&word));
                }
                note_scalar(&mut stack);
                i = next;
                continue;
            }
        }
        i += 1;
    }

    // Close whatever the model left open.
    strip_trailing_comma(&mut out);
    if out.trim_end().ends_with(':') {
        out.push_str("null");
    }
    while let Some(frame) = stack.pop() {
        close_pending_key(&mut out, &frame);
        out.push(frame.closer());
    }

    Some(out)
}

/// Record that a key or value token was emitted in the current frame.
fn note_scalar(stack: &mut [Frame]) {
    if let Some(Frame::Object {
        expect_key,
        pending_key,
    }) = stack.last_mut()
    {
        if *expect_key {
            *expect_key = false;
            *pending_key = true;
        }
    }
}

/// A key with no `:value` before the object closed gets a null value.
fn close_pending_key(out: &mut String, frame: &Frame) {
    if let Frame::Object {
        pending_key: true, ..
    } = frame
    {
        out.push_str(":null");
    }
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed_len = out.trim_end().len();
    if out[..trimmed_len].ends_with(',') {
        out.truncate(trimmed_len - 1);
    }
}

/// Read a single- or double-quoted string starting at `start`.
///
/// Returns the re-encoded double-quoted literal, the index after it, and
/// whether the closing quote was found.
fn read_string(chars: &[char], start: usize) -> (String, usize, bool) {
    let quote_char = chars[start];
    let mut literal = String::from('"');
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if i + 1 < chars.len() => {
                let escaped = chars[i + 1];
                if escaped == '\'' {
                    literal.push('\'');
                } else {
                    literal.push('\\');
                    literal.push(escaped);
                }
                i += 2;
                continue;
            }
            '\\' => {
                // Dangling backslash at truncation point.
                i += 1;
                continue;
            }
            c if c == quote_char => {
                literal.push('"');
                return (literal, i + 1, true);
            }
            '"' => literal.push_str("\\\""),
            '\n' => literal.push_str("\\n"),
            '\r' => literal.push_str("\\r"),
            '\t' => literal.push_str("\\t"),
            c => literal.push(c),
        }
        i += 1;
    }

    literal.push('"');
    (literal, i, false)
}

/// Read an unquoted token (identifier, number or literal).
fn read_bare(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    let mut word = String::new();
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"' | '\'') {
            break;
        }
        word.push(c);
        i += 1;
    }
    (word, i)
}

fn normalize_literal(word: &str) -> String {
    match word {
        "true" | "false" | "null" => word.to_string(),
        "True" | "TRUE" => "true".to_string(),
        "False" | "FALSE" => "false".to_string(),
        "None" | "NULL" | "nil" | "undefined" => "null".to_string(),
        w if is_json_number(w) => w.to_string(),
        w => quote(w),
    }
}

fn is_json_number(word: &str) -> bool {
    !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        && word.chars().any(|c| c.is_ascii_digit())
        && word.parse::<f64>().is_ok()
}

fn quote(word: &str) -> String {
    let mut s = String::with_capacity(word.len() + 2);
    s.push('"');
    for c in word.chars() {
        match c {
            '"' => s.push_str("\\\""),
            '\\' => s.push_str("\\\\"),
            c => s.push(c),
        }
    }
    s.push('"');
    s
}
