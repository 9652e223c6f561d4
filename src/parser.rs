//! Route path template compilation.
//!
//! `/users/{id:int}/posts` becomes the anchored matcher
//! `^/users/(?P<id>[0-9]+)/posts$` plus the converter list `[id → int]`.
//! A segment may carry literal text around a single placeholder:
//! `/item({id:int})` compiles to `^/item\((?P<id>[0-9]+)\)$`.

use std::sync::LazyLock;

use regex::Regex;

use crate::convert::Converter;
use crate::error::Error;

/// `<head>{name[:type]}<tail>`: one placeholder per segment. The head is
/// greedy, so in a segment with two placeholders only the last one binds.
static PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)\{([a-zA-Z_][a-zA-Z0-9_]*)(:.+)?\}(.*)$")
        .expect("placeholder regex is valid")
});

/// A compiled path template.
#[derive(Clone, Debug)]
pub struct ParsedPath {
    /// Display path with every placeholder normalised to `{name}`.
    pub path: String,
    pub pattern: Regex,
    /// Parameter converters in declaration order.
    pub converters: Vec<(String, Converter)>,
}

/// Compiles `path` into a matcher.
///
/// Fails when a parameter name is bound twice, or when a custom converter
/// fragment is not a valid regex.
pub fn parse_path(path: &str) -> Result<ParsedPath, Error> {
    let mut display = Vec::new();
    let mut fragments = vec!["^".to_owned()];
    let mut converters: Vec<(String, Converter)> = Vec::new();
    let mut duplicates: Vec<String> = Vec::new();

    for segment in path.trim_start_matches('/').split('/') {
        let Some(caps) = PARAM.captures(segment) else {
            fragments.push(regex::escape(segment));
            display.push(segment.to_owned());
            continue;
        };

        let head = caps.get(1).map_or("", |m| m.as_str());
        let name = &caps[2];
        let tag = caps.get(3).map_or("str", |m| &m.as_str()[1..]);
        let tail = caps.get(4).map_or("", |m| m.as_str());
        let converter = Converter::from_tag(tag);

        fragments.push(format!(
            "{}(?P<{name}>{}){}",
            regex::escape(head),
            converter.pattern(),
            regex::escape(tail),
        ));
        display.push(format!("{head}{{{name}}}{tail}"));

        if converters.iter().any(|(n, _)| n == name) {
            if !duplicates.iter().any(|d| d == name) {
                duplicates.push(name.to_owned());
            }
        } else {
            converters.push((name.to_owned(), converter));
        }
    }

    if !duplicates.is_empty() {
        return Err(Error::DuplicateParams { path: path.to_owned(), names: duplicates });
    }

    let source = fragments.join("/") + "$";
    let pattern = Regex::new(&source).map_err(|e| Error::InvalidPath {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;

    Ok(ParsedPath {
        path: format!("/{}", display.join("/")),
        pattern,
        converters,
    })
}
