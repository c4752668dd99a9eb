//! Directive annotations embedded in Go doc comments.
//!
//! Every declaration the generator cares about (service interfaces and their
//! methods) carries its instructions as lines of the leading doc comment:
//!
//! ```text
//! // @tg server-http
//! // @tg http-path /users/:id
//! // @tg swagger-tags:users,admin
//! ```
//!
//! Three line shapes are recognized:
//!
//! - `key value` - a string value (the rest of the line)
//! - `key:v1,v2` - a multi-value entry
//! - `key` - a bare flag
//!
//! When any line of a block starts with the `@tg` marker only marked lines are
//! directives and the rest is prose. Without a marker every non-empty line is a
//! directive.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Marker that singles out directive lines inside a prose comment.
pub const DIRECTIVE_MARKER: &str = "@tg";

pub const TAG_SERVER_JSONRPC: &str = "server-jsonrpc";
pub const TAG_SERVER_HTTP: &str = "server-http";
pub const TAG_TESTS: &str = "tests";
pub const TAG_IMPLEMENTS: &str = "implements";
pub const TAG_TRACE: &str = "trace";
pub const TAG_METRICS: &str = "metrics";
pub const TAG_LOGGER: &str = "logger";
pub const TAG_HTTP_PREFIX: &str = "http-prefix";
pub const TAG_HTTP_PATH: &str = "http-path";
pub const TAG_HTTP_METHOD: &str = "http-method";
pub const TAG_HTTP_SUCCESS: &str = "http-success";
pub const TAG_HTTP_HEADERS: &str = "http-headers";
pub const TAG_HTTP_COOKIES: &str = "http-cookies";
pub const TAG_SWAGGER_TAGS: &str = "swagger-tags";
pub const TAG_SUMMARY: &str = "summary";
pub const TAG_DESC: &str = "desc";
pub const TAG_DEPRECATED: &str = "deprecated";
pub const TAG_LOG_SKIP: &str = "log-skip";
pub const TAG_UPLOAD_VARS: &str = "upload-vars";
pub const TAG_DEFAULT_ERROR: &str = "defaultError";

pub const TAG_TITLE: &str = "title";
pub const TAG_VERSION: &str = "version";
pub const TAG_DESCRIPTION: &str = "description";
pub const TAG_SERVERS: &str = "servers";

/// Parsed directive set of one declaration.
///
/// A key maps to its values; a bare flag maps to an empty list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Annotations {
    entries: BTreeMap<String, Vec<String>>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a doc comment block. Duplicate keys resolve last-write-wins.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let marked = lines
            .iter()
            .any(|line| strip_marker(line.as_ref()).is_some());

        let mut annotations = Annotations::new();
        for line in lines {
            let line = line.as_ref().trim();
            let directive = if marked {
                match strip_marker(line) {
                    Some(rest) => rest,
                    None => continue,
                }
            } else {
                line
            };
            if directive.is_empty() {
                continue;
            }
            let (key, values) = parse_directive(directive);
            if annotations.entries.contains_key(&key) {
                debug!("Directive {} repeated, keeping the last value", key);
            }
            annotations.entries.insert(key, values);
        }
        annotations
    }

    /// Parses a free-text block, one directive per line.
    pub fn parse_text(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        Self::parse(&lines)
    }

    pub fn insert(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.entries.insert(key.into(), values);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// String value of a key. Multi-values are joined with `,`; flags are empty.
    pub fn value(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|values| values.join(","))
    }

    pub fn value_or(&self, key: &str, default: &str) -> String {
        self.value(key)
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }

    pub fn value_int(&self, key: &str, default: i64) -> i64 {
        match self.value(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                debug!("Directive {} has non-integer value {:?}", key, raw);
                default
            }),
            None => default,
        }
    }

    /// All values of a key, splitting string values on `,`.
    pub fn values(&self, key: &str) -> Vec<String> {
        self.entries
            .get(key)
            .map(|values| {
                values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Layers `other` over `self`; keys present in `other` win.
    pub fn merge(&self, other: &Annotations) -> Annotations {
        let mut merged = self.clone();
        for (key, values) in &other.entries {
            merged.entries.insert(key.clone(), values.clone());
        }
        merged
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

fn strip_marker(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix(DIRECTIVE_MARKER)?;
    if rest.is_empty() || rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn parse_directive(directive: &str) -> (String, Vec<String>) {
    let (head, rest) = match directive.find(char::is_whitespace) {
        Some(pos) => (&directive[..pos], directive[pos..].trim()),
        None => (directive, ""),
    };

    if let Some((key, list)) = head.split_once(':') {
        let mut joined = list.to_string();
        if !rest.is_empty() {
            joined.push(' ');
            joined.push_str(rest);
        }
        let values = joined
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return (key.to_string(), values);
    }

    if rest.is_empty() {
        (head.to_string(), Vec::new())
    } else {
        (head.to_string(), vec![rest.to_string()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_three_line_shapes() {
        let tags = Annotations::parse_text("server-http\nhttp-path /foo\nhttp-success 201");

        assert!(tags.contains("server-http"));
        assert_eq!(tags.value("server-http"), Some(String::new()));
        assert_eq!(tags.value("http-path"), Some("/foo".to_string()));
        assert_eq!(tags.value("http-success"), Some("201".to_string()));
        assert_eq!(tags.value_int("http-success", 200), 201);
    }

    #[test]
    fn test_multi_value() {
        let tags = Annotations::parse_text("swagger-tags:users, admin");

        assert_eq!(tags.values("swagger-tags"), vec!["users", "admin"]);
        assert_eq!(tags.value("swagger-tags"), Some("users,admin".to_string()));
    }

    #[test]
    fn test_string_value_split_by_values() {
        let tags = Annotations::parse_text("log-skip password,token");

        assert_eq!(tags.values("log-skip"), vec!["password", "token"]);
    }

    #[test]
    fn test_last_write_wins() {
        let tags = Annotations::parse_text("http-method get\nhttp-method post");

        assert_eq!(tags.value("http-method"), Some("post".to_string()));
        assert_eq!(tags.len(), 1);
    }

    #[test]
    fn test_value_defaults() {
        let tags = Annotations::parse_text("http-success created");

        assert_eq!(tags.value_int("http-success", 200), 200);
        assert_eq!(tags.value_int("missing", 7), 7);
        assert_eq!(tags.value_or("http-path", "/users"), "/users");
        assert!(tags.values("missing").is_empty());
    }

    #[test]
    fn test_error_payload_reference_is_a_string_value() {
        let tags = Annotations::parse_text(
            "404 github.com/acme/app/errors:NotFound\n\
             defaultError github.com/acme/app/errors:Error\n\
             500 skip",
        );

        assert_eq!(
            tags.value("404"),
            Some("github.com/acme/app/errors:NotFound".to_string())
        );
        assert_eq!(
            tags.value("defaultError"),
            Some("github.com/acme/app/errors:Error".to_string())
        );
        assert_eq!(tags.value("500"), Some("skip".to_string()));
    }

    #[test]
    fn test_marker_lines_only_when_present() {
        let lines = vec![
            "UserService manages user accounts.",
            "@tg server-http",
            "@tg http-prefix api/v1",
        ];
        let tags = Annotations::parse(&lines);

        assert_eq!(tags.len(), 2);
        assert!(tags.contains("server-http"));
        assert_eq!(tags.value("http-prefix"), Some("api/v1".to_string()));
        assert!(!tags.contains("UserService"));
    }

    #[test]
    fn test_marker_must_be_a_whole_word() {
        let tags = Annotations::parse(&["@tgx server-http", "trace"]);

        assert!(tags.contains("@tgx"));
        assert!(tags.contains("trace"));
    }

    #[test]
    fn test_merge_prefers_later_source() {
        let service = Annotations::parse_text("http-prefix api\nswagger-tags:users\ntrace");
        let method = Annotations::parse_text("swagger-tags:admin\nhttp-method GET");

        let merged = service.merge(&method);

        assert_eq!(merged.values("swagger-tags"), vec!["admin"]);
        assert_eq!(merged.value("http-prefix"), Some("api".to_string()));
        assert_eq!(merged.value("http-method"), Some("GET".to_string()));
        assert!(merged.contains("trace"));
        // Inputs are left untouched
        assert_eq!(service.values("swagger-tags"), vec!["users"]);
    }

    #[test]
    fn test_empty_block() {
        let tags = Annotations::parse::<&str>(&[]);
        assert!(tags.is_empty());
    }
}
