//! Structural type references shared by the parser, resolver and model.
//!
//! A [`TypeRef`] is purely syntactic: it records how a type was written in a Go
//! source file, with qualified identifiers already mapped to their import
//! paths. Turning it into something structural is the job of
//! [`crate::type_resolver::TypeResolver`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A syntactic type reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    /// A type name. `package` is set when the name was written qualified.
    Named {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        package: Option<String>,
    },
    Pointer { next: Box<TypeRef> },
    Slice { next: Box<TypeRef> },
    Array { len: usize, next: Box<TypeRef> },
    Map { key: Box<TypeRef>, value: Box<TypeRef> },
    Interface { methods: Vec<MethodSignature> },
    /// Anonymous struct body.
    Struct { fields: Vec<FieldDescriptor> },
    /// Variadic parameter (`...T`).
    Ellipsis { next: Box<TypeRef> },
    /// `pkg.T` - wraps the named type with the import path it came from.
    Imported { package: String, next: Box<TypeRef> },
}

impl TypeRef {
    /// Unqualified type name
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named {
            name: name.into(),
            package: None,
        }
    }

    /// Qualified type name, as the parser produces it for `pkg.T`
    pub fn imported(package: impl Into<String>, name: impl Into<String>) -> Self {
        let package = package.into();
        TypeRef::Imported {
            package: package.clone(),
            next: Box::new(TypeRef::Named {
                name: name.into(),
                package: Some(package),
            }),
        }
    }

    pub fn pointer(next: TypeRef) -> Self {
        TypeRef::Pointer {
            next: Box::new(next),
        }
    }

    pub fn slice(next: TypeRef) -> Self {
        TypeRef::Slice {
            next: Box::new(next),
        }
    }

    pub fn map(key: TypeRef, value: TypeRef) -> Self {
        TypeRef::Map {
            key: Box::new(key),
            value: Box::new(value),
        }
    }

    /// Returns the `(package, name)` identity of a named type, looking through
    /// an import wrapper but not through pointers or containers.
    pub fn identity(&self) -> Option<(Option<&str>, &str)> {
        match self {
            TypeRef::Named { name, package } => Some((package.as_deref(), name.as_str())),
            TypeRef::Imported { package, next } => match next.as_ref() {
                TypeRef::Named { name, .. } => Some((Some(package.as_str()), name.as_str())),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, TypeRef::Pointer { .. })
    }

    pub fn is_ellipsis(&self) -> bool {
        matches!(self, TypeRef::Ellipsis { .. })
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name, .. } => write!(f, "{}", name),
            TypeRef::Pointer { next } => write!(f, "*{}", next),
            TypeRef::Slice { next } => write!(f, "[]{}", next),
            TypeRef::Array { len, next } => write!(f, "[{}]{}", len, next),
            TypeRef::Map { key, value } => write!(f, "map[{}]{}", key, value),
            TypeRef::Interface { methods } if methods.is_empty() => write!(f, "interface{{}}"),
            TypeRef::Interface { .. } => write!(f, "interface{{...}}"),
            TypeRef::Struct { .. } => write!(f, "struct{{...}}"),
            TypeRef::Ellipsis { next } => write!(f, "...{}", next),
            TypeRef::Imported { package, next } => {
                let base = package.rsplit('/').next().unwrap_or(package);
                write!(f, "{}.{}", base, next)
            }
        }
    }
}

/// A struct field, method argument or method result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// Struct tag values, e.g. `json:"id,omitempty"` becomes `json -> [id, omitempty]`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub embedded: bool,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            tags: BTreeMap::new(),
            embedded: false,
        }
    }

    pub fn with_tag(mut self, key: &str, values: &[&str]) -> Self {
        self.tags.insert(
            key.to_string(),
            values.iter().map(|v| v.to_string()).collect(),
        );
        self
    }

    fn json_tag_name(&self) -> Option<&str> {
        self.tags
            .get("json")
            .and_then(|values| values.first())
            .map(|s| s.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Name under which `encoding/json` would serialize this field.
    ///
    /// `None` means the field is not serialized on its own: it is tagged `-`,
    /// unexported, or an untagged embedded field whose members are promoted.
    pub fn json_name(&self) -> Option<String> {
        match self.json_tag_name() {
            Some("-") => None,
            Some(name) => Some(name.to_string()),
            None if self.embedded => None,
            None if starts_lowercase(&self.name) => None,
            None => Some(self.name.clone()),
        }
    }

    /// Untagged embedded fields have their members promoted into the parent.
    pub fn is_flattened(&self) -> bool {
        self.embedded && self.json_tag_name().is_none()
    }

    pub fn omit_empty(&self) -> bool {
        self.tags
            .get("json")
            .map(|values| values.iter().skip(1).any(|v| v == "omitempty"))
            .unwrap_or(false)
    }
}

/// A method signature as written in an interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub docs: Vec<String>,
    pub args: Vec<FieldDescriptor>,
    pub results: Vec<FieldDescriptor>,
}

/// Identity of a named type: import path of the declaring package plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QualifiedName {
    pub package: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(package: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.package.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.package, self.name)
        }
    }
}

fn starts_lowercase(name: &str) -> bool {
    name.chars().next().map(|c| !c.is_uppercase()).unwrap_or(true)
}

/// Parses a Go struct tag (`json:"id,omitempty" db:"user_id"`).
pub fn parse_struct_tag(raw: &str) -> BTreeMap<String, Vec<String>> {
    let mut tags = BTreeMap::new();
    let mut rest = raw.trim();

    while !rest.is_empty() {
        let Some(colon) = rest.find(':') else {
            break;
        };
        let key = rest[..colon].trim().to_string();
        let after = &rest[colon + 1..];
        if !after.starts_with('"') {
            break;
        }
        let Some(end) = after[1..].find('"') else {
            break;
        };
        let value = &after[1..end + 1];
        tags.insert(
            key,
            value.split(',').map(|v| v.trim().to_string()).collect(),
        );
        rest = after[end + 2..].trim_start();
    }

    tags
}

/// `GetUser` -> `getUser`, `ID` -> `id`, `HTTPServer` -> `httpServer`.
pub fn to_lower_camel(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let upper_run = chars.iter().take_while(|c| c.is_uppercase()).count();

    let lower_count = match upper_run {
        0 => 0,
        n if n == chars.len() => n,
        1 => 1,
        n => n - 1,
    };

    chars
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i < lower_count {
                c.to_lowercase().next().unwrap_or(*c)
            } else {
                *c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_struct_tag() {
        let tags = parse_struct_tag(r#"json:"id,omitempty" db:"user_id""#);

        assert_eq!(tags["json"], vec!["id", "omitempty"]);
        assert_eq!(tags["db"], vec!["user_id"]);
    }

    #[test]
    fn test_parse_struct_tag_malformed_stops() {
        let tags = parse_struct_tag(r#"json:"name" broken"#);

        assert_eq!(tags.len(), 1);
        assert_eq!(tags["json"], vec!["name"]);
    }

    #[test]
    fn test_json_name_rules() {
        let tagged = FieldDescriptor::new("UserID", TypeRef::named("string"))
            .with_tag("json", &["userId", "omitempty"]);
        assert_eq!(tagged.json_name(), Some("userId".to_string()));
        assert!(tagged.omit_empty());

        let skipped =
            FieldDescriptor::new("Secret", TypeRef::named("string")).with_tag("json", &["-"]);
        assert_eq!(skipped.json_name(), None);

        let private = FieldDescriptor::new("cache", TypeRef::named("string"));
        assert_eq!(private.json_name(), None);

        let plain = FieldDescriptor::new("Name", TypeRef::named("string"));
        assert_eq!(plain.json_name(), Some("Name".to_string()));
        assert!(!plain.omit_empty());

        let mut embedded = FieldDescriptor::new("Base", TypeRef::named("Base"));
        embedded.embedded = true;
        assert_eq!(embedded.json_name(), None);
        assert!(embedded.is_flattened());
    }

    #[test]
    fn test_identity_looks_through_import() {
        let ctx = TypeRef::imported("context", "Context");
        assert_eq!(ctx.identity(), Some((Some("context"), "Context")));

        let err = TypeRef::named("error");
        assert_eq!(err.identity(), Some((None, "error")));

        assert_eq!(TypeRef::pointer(TypeRef::named("User")).identity(), None);
    }

    #[test]
    fn test_to_lower_camel() {
        assert_eq!(to_lower_camel("GetUser"), "getUser");
        assert_eq!(to_lower_camel("ID"), "id");
        assert_eq!(to_lower_camel("HTTPServer"), "httpServer");
        assert_eq!(to_lower_camel("already"), "already");
    }

    #[test]
    fn test_display() {
        let ty = TypeRef::map(
            TypeRef::named("string"),
            TypeRef::slice(TypeRef::pointer(TypeRef::imported(
                "github.com/acme/app/models",
                "User"
            ))),
        );
        assert_eq!(ty.to_string(), "map[string][]*models.User");
    }
}
