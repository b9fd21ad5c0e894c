//! Dump reconstitution: tokenize dump text into executable statement blocks.
//!
//! Single-pass, line-oriented state machine with two states: `Normal` and
//! inside a bulk-copy block. Statement termination is tracked with a
//! quote-depth and brace-depth counter (backslash acts as an escape toggle),
//! so semicolons and newlines inside string or JSON payloads never split a
//! statement. Bulk-copy blocks are copied byte-for-byte through their `\.`
//! terminator. The grammar is deliberately narrow: inserts, copy blocks, and
//! opaque "other" statements — this is a re-tokenizer for self-produced
//! dumps, not a SQL parser.

use once_cell::sync::Lazy;
use regex::Regex;

/// Classification of one parsed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Insert,
    /// Bulk-copy block (`COPY ... FROM stdin` through `\.`).
    Copy,
    Other,
}

/// One executable unit of a dump.
#[derive(Debug, Clone)]
pub struct DumpBlock {
    pub kind: BlockKind,
    pub text: String,
    /// Target table, extracted for inserts only.
    pub table: Option<String>,
}

static INSERT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)^\s*INSERT\s+INTO\s+"?([^\s"(]+)"?"#).unwrap());

static COPY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^\s*COPY\s+.+FROM\s+stdin").unwrap());

const COPY_TERMINATOR: &str = "\\.";

/// Tokenize dump text into statement blocks, in file order.
pub fn parse(text: &str) -> Vec<DumpBlock> {
    let mut blocks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut in_copy = false;
    let mut in_string = false;
    let mut brace_depth: usize = 0;

    for line in text.lines() {
        if in_copy {
            buffer.push(line);
            if line == COPY_TERMINATOR {
                blocks.push(DumpBlock {
                    kind: BlockKind::Copy,
                    text: buffer.join("\n"),
                    table: None,
                });
                buffer.clear();
                in_copy = false;
            }
            continue;
        }

        // Blank lines and comments are dropped between literal spans.
        if !in_string && (line.trim().is_empty() || line.trim_start().starts_with("--")) {
            continue;
        }

        if !in_string && buffer.is_empty() && COPY_RE.is_match(line) {
            buffer.push(line);
            in_copy = true;
            continue;
        }

        buffer.push(line);
        scan_line(line, &mut in_string, &mut brace_depth);

        if !in_string && brace_depth == 0 && line.trim_end().ends_with(';') {
            blocks.push(classify(buffer.join("\n")));
            buffer.clear();
        }
    }

    if !buffer.is_empty() {
        // Trailing partial statement (or unterminated copy block): keep it
        // rather than dropping content on the floor.
        let text = buffer.join("\n");
        blocks.push(if in_copy {
            DumpBlock {
                kind: BlockKind::Copy,
                text,
                table: None,
            }
        } else {
            classify(text)
        });
    }

    blocks
}

/// Update quote/brace tracking across one line.
fn scan_line(line: &str, in_string: &mut bool, brace_depth: &mut usize) {
    let mut escaped = false;
    for c in line.chars() {
        match c {
            '\\' => escaped = !escaped,
            '\'' => {
                if !escaped {
                    *in_string = !*in_string;
                }
                escaped = false;
            }
            '{' if !*in_string => {
                *brace_depth += 1;
                escaped = false;
            }
            '}' if !*in_string => {
                *brace_depth = brace_depth.saturating_sub(1);
                escaped = false;
            }
            _ => escaped = false,
        }
    }
}

fn classify(text: String) -> DumpBlock {
    if let Some(caps) = INSERT_RE.captures(&text) {
        let table = caps.get(1).map(|m| m.as_str().to_string());
        return DumpBlock {
            kind: BlockKind::Insert,
            text: normalize_insert(&text),
            table,
        };
    }
    DumpBlock {
        kind: BlockKind::Other,
        text: text.trim().to_string(),
        table: None,
    }
}

/// Collapse multi-line formatting of an insert into one canonical line.
///
/// Whitespace outside string spans collapses to a single space (none after
/// `(` or before `)`, `,`, `;`); literal content is untouched; any trailing
/// `ON CONFLICT` clause stays attached with one space before it and the
/// statement ends with exactly one semicolon.
pub fn normalize_insert(statement: &str) -> String {
    let mut out = String::with_capacity(statement.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_space = false;

    for c in statement.chars() {
        if in_string {
            out.push(c);
            match c {
                '\\' => escaped = !escaped,
                '\'' => {
                    if !escaped {
                        in_string = false;
                    }
                    escaped = false;
                }
                _ => escaped = false,
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let after_open = matches!(out.chars().last(), Some('('));
            let before_closer = matches!(c, ')' | ',' | ';');
            if !out.is_empty() && !after_open && !before_closer {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(c);
        if c == '\'' {
            in_string = true;
            escaped = false;
        }
    }

    // Exactly one terminating semicolon.
    while out.ends_with(';') || out.ends_with(' ') {
        out.pop();
    }
    out.push(';');
    out
}
