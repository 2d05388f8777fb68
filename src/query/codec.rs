/// ServerQuery line codec
///
/// Replies are lines of records separated by `|`. Each record is a list of
/// space-separated `key=value` tokens (or bare `key` flags). Values use the
/// ServerQuery escaping rules, so a literal space travels as `\s` and a pipe
/// as `\p`. Every command ends with a status line `error id=<n> msg=<text>`.

use std::collections::HashMap;
use std::str::FromStr;

/// Escape pairs: (raw char, escape letter)
const ESCAPES: [(char, char); 11] = [
    ('\\', '\\'),
    ('/', '/'),
    (' ', 's'),
    ('|', 'p'),
    ('\x07', 'a'),
    ('\x08', 'b'),
    ('\x0C', 'f'),
    ('\n', 'n'),
    ('\r', 'r'),
    ('\t', 't'),
    ('\x0B', 'v'),
];

/// Escape a value for use in a command argument
pub fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match ESCAPES.iter().find(|(raw, _)| *raw == c) {
            Some((_, letter)) => {
                out.push('\\');
                out.push(*letter);
            }
            None => out.push(c),
        }
    }
    out
}

/// Undo ServerQuery escaping. Unknown escapes are kept verbatim.
pub fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some(next) => match ESCAPES.iter().find(|(_, letter)| *letter == next) {
                Some((raw, _)) => out.push(*raw),
                None => {
                    out.push('\\');
                    out.push(next);
                }
            },
            None => out.push('\\'),
        }
    }
    out
}

/// One `key=value` record from a reply line
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Record {
    fields: HashMap<String, String>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Numeric field, 0 when absent or unparseable
    pub fn number<T: FromStr + Default>(&self, key: &str) -> T {
        self.get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    /// ServerQuery flags are `0`/`1`
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).map(|v| v == "1").unwrap_or(false)
    }

    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }
}

/// Parse one data line into records
pub fn parse_records(line: &str) -> Vec<Record> {
    line.split('|')
        .map(parse_record)
        .filter(|record| !record.fields.is_empty())
        .collect()
}

fn parse_record(chunk: &str) -> Record {
    let fields = chunk
        .split(' ')
        .filter(|token| !token.is_empty())
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), unescape(value)),
            None => (token.to_string(), String::new()),
        })
        .collect();
    Record { fields }
}

/// Status id the server uses for "no rows", e.g. `serverlist` on an empty instance
pub const EMPTY_RESULT_SET: u32 = 1281;

/// Outcome line that terminates every command reply
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub id: u32,
    pub msg: String,
}

impl Status {
    pub fn is_ok(&self) -> bool {
        self.id == 0
    }

    pub fn is_empty_result(&self) -> bool {
        self.id == EMPTY_RESULT_SET
    }
}

/// Recognize an `error id=.. msg=..` status line
pub fn parse_status(line: &str) -> Option<Status> {
    let rest = line.strip_prefix("error ")?;
    let record = parse_record(rest);
    let id = record.get("id")?.parse().ok()?;
    Some(Status {
        id,
        msg: record.text("msg"),
    })
}

/// Server-pushed event lines, never part of a command reply
pub fn is_notification(line: &str) -> bool {
    line.starts_with("notify")
}

/// Build a command line from a name and escaped `key=value` arguments
pub fn command(name: &str, args: &[(&str, &str)]) -> String {
    let mut line = name.to_string();
    for (key, value) in args {
        line.push(' ');
        line.push_str(key);
        line.push('=');
        line.push_str(&escape(value));
    }
    line
}
