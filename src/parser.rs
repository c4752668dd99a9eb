use crate::error::{Error, Result};
use crate::types::{parse_struct_tag, FieldDescriptor, MethodSignature, TypeRef};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use tree_sitter::{Node as TsNode, Parser as TsParser};

/// Go source parser.
///
/// The `AstParser` runs the `tree-sitter-go` grammar over a source file and
/// keeps only the structural declarations the generator needs: imports,
/// interfaces, struct types and other named types, each with its leading doc
/// comment. Function bodies, constants and variables are ignored.
///
/// # Example
///
/// ```no_run
/// use go_service_gen::parser::AstParser;
/// use std::path::Path;
///
/// let parsed = AstParser::parse_file(Path::new("pkg/service/service.go")).unwrap();
/// println!("Parsed {} interfaces", parsed.interfaces.len());
/// ```
pub struct AstParser;

/// A successfully parsed Go file.
#[derive(Debug, Clone, Default)]
pub struct ParsedFile {
    /// Path to the source file
    pub path: PathBuf,
    /// Name from the `package` clause
    pub package: String,
    pub imports: Vec<Import>,
    pub interfaces: Vec<InterfaceDecl>,
    pub structs: Vec<StructDecl>,
    /// Named types that are neither interfaces nor structs (`type Status string`,
    /// `type Users = []User`)
    pub aliases: Vec<AliasDecl>,
}

/// One import spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    /// Explicit import name, if any
    pub alias: Option<String>,
    pub path: String,
}

impl Import {
    /// Identifier under which the import is visible in the file.
    pub fn local_name(&self) -> String {
        match &self.alias {
            Some(alias) => alias.clone(),
            None => default_package_name(&self.path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDecl {
    pub name: String,
    pub docs: Vec<String>,
    pub methods: Vec<MethodSignature>,
    /// Embedded interfaces, in declaration order
    pub embedded: Vec<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDecl {
    pub name: String,
    pub docs: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasDecl {
    pub name: String,
    pub docs: Vec<String>,
    pub target: TypeRef,
}

impl ParsedFile {
    /// Finds a declaration by name: interfaces first, then named types, then structs.
    pub fn find_declaration(&self, name: &str) -> Option<Declaration> {
        if let Some(iface) = self.interfaces.iter().find(|i| i.name == name) {
            return Some(Declaration::Interface(iface.clone()));
        }
        if let Some(alias) = self.aliases.iter().find(|a| a.name == name) {
            return Some(Declaration::Alias(alias.clone()));
        }
        self.structs
            .iter()
            .find(|s| s.name == name)
            .map(|s| Declaration::Struct(s.clone()))
    }
}

/// A structural declaration found in source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    Interface(InterfaceDecl),
    Struct(StructDecl),
    Alias(AliasDecl),
}

impl Declaration {
    pub fn name(&self) -> &str {
        match self {
            Declaration::Interface(i) => &i.name,
            Declaration::Struct(s) => &s.name,
            Declaration::Alias(a) => &a.name,
        }
    }

    /// The declared type body as a type reference.
    pub fn to_type_ref(&self) -> TypeRef {
        match self {
            Declaration::Interface(i) => TypeRef::Interface {
                methods: i.methods.clone(),
            },
            Declaration::Struct(s) => TypeRef::Struct {
                fields: s.fields.clone(),
            },
            Declaration::Alias(a) => a.target.clone(),
        }
    }
}

impl AstParser {
    /// Parses a single Go source file.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The file contains invalid Go syntax
    pub fn parse_file(path: &Path) -> Result<ParsedFile> {
        debug!("Parsing file: {}", path.display());

        let content = fs::read_to_string(path)?;
        let parsed = Self::parse_source(path, &content)?;

        debug!("Successfully parsed file: {}", path.display());
        Ok(parsed)
    }

    /// Parses Go source text; `path` is only used for reporting.
    pub fn parse_source(path: &Path, source: &str) -> Result<ParsedFile> {
        let mut parser = TsParser::new();
        parser
            .set_language(&tree_sitter_go::LANGUAGE.into())
            .map_err(|err| parse_error(path, format!("failed to load Go grammar: {}", err)))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| parse_error(path, "parser returned no syntax tree"))?;
        let root = tree.root_node();

        if root.has_error() {
            let message = match first_error(root) {
                Some(node) => {
                    let pos = node.start_position();
                    format!("syntax error at {}:{}", pos.row + 1, pos.column + 1)
                }
                None => "syntax error".to_string(),
            };
            return Err(parse_error(path, message));
        }

        let mut walker = SourceWalker {
            source,
            imports: Vec::new(),
        };
        let mut parsed = ParsedFile {
            path: path.to_path_buf(),
            ..Default::default()
        };

        // Imports first so qualified identifiers can be mapped to import paths
        let mut cursor = root.walk();
        let top_level: Vec<TsNode> = root.named_children(&mut cursor).collect();
        for node in &top_level {
            match node.kind() {
                "package_clause" => parsed.package = walker.package_name(*node),
                "import_declaration" => walker.collect_imports(*node),
                _ => {}
            }
        }

        for node in &top_level {
            if node.kind() == "type_declaration" {
                walker.collect_types(*node, &mut parsed);
            }
        }

        parsed.imports = walker.imports;
        Ok(parsed)
    }
}

fn parse_error(path: &Path, message: impl Into<String>) -> Error {
    Error::ParseError {
        file: path.to_path_buf(),
        message: message.into(),
    }
}

fn first_error(node: TsNode) -> Option<TsNode> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    let mut cursor = node.walk();
    let children: Vec<TsNode> = node.children(&mut cursor).collect();
    children
        .into_iter()
        .filter(|child| child.has_error())
        .find_map(first_error)
}

/// Go's default package name for an import path: `gopkg.in/yaml.v3` -> `yaml`,
/// `github.com/go-kit/kit/v2` -> `kit`, `github.com/satori/go.uuid` -> `uuid`.
fn default_package_name(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.len() > 1 {
        if let Some(last) = segments.last() {
            if is_major_version(last) {
                segments.pop();
            }
        }
    }
    let last = segments.last().copied().unwrap_or(path);

    let mut name = last;
    if let Some((base, suffix)) = name.rsplit_once('.') {
        name = if is_major_version(suffix) { base } else { suffix };
    }
    let name = name.strip_prefix("go-").unwrap_or(name);
    name.rsplit('-').next().unwrap_or(name).to_string()
}

fn is_major_version(segment: &str) -> bool {
    segment.len() > 1
        && segment.starts_with('v')
        && segment[1..].chars().all(|c| c.is_ascii_digit())
}

struct SourceWalker<'a> {
    source: &'a str,
    imports: Vec<Import>,
}

impl<'a> SourceWalker<'a> {
    fn text(&self, node: TsNode<'_>) -> &'a str {
        &self.source[node.byte_range()]
    }

    fn package_name(&self, node: TsNode) -> String {
        let mut cursor = node.walk();
        let name = node
            .named_children(&mut cursor)
            .find(|child| child.kind() == "package_identifier" || child.kind() == "identifier")
            .map(|child| self.text(child).to_string());
        name.unwrap_or_else(|| {
            warn!("package clause missing name");
            String::new()
        })
    }

    fn collect_imports(&mut self, node: TsNode) {
        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "import_spec" => self.collect_import_spec(child),
                "import_spec_list" => self.collect_imports(child),
                _ => {}
            }
        }
    }

    fn collect_import_spec(&mut self, node: TsNode) {
        let Some(path_node) = node.child_by_field_name("path") else {
            return;
        };
        let path = unquote(self.text(path_node));
        let alias = node
            .child_by_field_name("name")
            .map(|n| self.text(n).to_string())
            .filter(|alias| alias != "_" && alias != ".");

        self.imports.push(Import { alias, path });
    }

    /// Import path for a package identifier used in a qualified type.
    fn import_path(&self, ident: &str) -> String {
        self.imports
            .iter()
            .find(|import| import.local_name() == ident)
            .map(|import| import.path.clone())
            .unwrap_or_else(|| ident.to_string())
    }

    fn collect_types(&self, decl: TsNode, parsed: &mut ParsedFile) {
        let mut cursor = decl.walk();
        let specs: Vec<TsNode> = decl
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "type_spec" || n.kind() == "type_alias")
            .collect();
        let single = specs.len() == 1;

        for spec in specs {
            let Some(name_node) = spec.child_by_field_name("name") else {
                warn!("type spec missing name");
                continue;
            };
            let Some(ty_node) = spec.child_by_field_name("type") else {
                warn!("type spec missing type");
                continue;
            };
            let name = self.text(name_node).to_string();

            let mut docs = self.leading_comments(spec);
            if docs.is_empty() && single {
                docs = self.leading_comments(decl);
            }

            match (spec.kind(), ty_node.kind()) {
                ("type_spec", "interface_type") => {
                    let (methods, embedded) = self.interface_body(ty_node);
                    parsed.interfaces.push(InterfaceDecl {
                        name,
                        docs,
                        methods,
                        embedded,
                    });
                }
                ("type_spec", "struct_type") => {
                    let fields = self.struct_fields(ty_node);
                    parsed.structs.push(StructDecl { name, docs, fields });
                }
                _ => {
                    let target = self.type_ref(ty_node);
                    parsed.aliases.push(AliasDecl { name, docs, target });
                }
            }
        }
    }

    /// Doc comment lines directly above `node`, markers stripped.
    fn leading_comments(&self, node: TsNode) -> Vec<String> {
        let mut blocks: Vec<Vec<String>> = Vec::new();
        let mut anchor_row = node.start_position().row;
        let mut current = node.prev_named_sibling();

        while let Some(prev) = current {
            if prev.kind() != "comment" || prev.end_position().row + 1 < anchor_row {
                break;
            }
            // A trailing comment belongs to whatever precedes it on its line
            if let Some(before) = prev.prev_named_sibling() {
                if before.kind() != "comment"
                    && before.end_position().row == prev.start_position().row
                {
                    break;
                }
            }
            blocks.push(comment_lines(self.text(prev)));
            anchor_row = prev.start_position().row;
            current = prev.prev_named_sibling();
        }

        blocks.into_iter().rev().flatten().collect()
    }

    fn interface_body(&self, node: TsNode) -> (Vec<MethodSignature>, Vec<TypeRef>) {
        let mut methods = Vec::new();
        let mut embedded = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for child in children {
            match child.kind() {
                "method_elem" | "method_spec" => {
                    if let Some(method) = self.method_signature(child) {
                        methods.push(method);
                    }
                }
                "type_elem" | "constraint_elem" => {
                    let mut inner = child.walk();
                    let types: Vec<TsNode> = child.named_children(&mut inner).collect();
                    for ty in types {
                        embedded.push(self.type_ref(ty));
                    }
                }
                "type_identifier" | "qualified_type" => embedded.push(self.type_ref(child)),
                "comment" => {}
                other => debug!("Ignoring interface element: {}", other),
            }
        }

        (methods, embedded)
    }

    fn method_signature(&self, node: TsNode) -> Option<MethodSignature> {
        let name = self.text(node.child_by_field_name("name")?).to_string();
        let args = node
            .child_by_field_name("parameters")
            .map(|params| self.parameters(params, "arg"))
            .unwrap_or_default();
        let results = match node.child_by_field_name("result") {
            Some(result) if result.kind() == "parameter_list" => self.parameters(result, "ret"),
            Some(result) => vec![FieldDescriptor::new("ret0", self.type_ref(result))],
            None => Vec::new(),
        };

        Some(MethodSignature {
            name,
            docs: self.leading_comments(node),
            args,
            results,
        })
    }

    /// Parameters of a parameter list; unnamed ones get `{prefix}{index}`.
    fn parameters(&self, node: TsNode, prefix: &str) -> Vec<FieldDescriptor> {
        let mut fields = Vec::new();

        let mut cursor = node.walk();
        let children: Vec<TsNode> = node.named_children(&mut cursor).collect();
        for child in children {
            let variadic = match child.kind() {
                "parameter_declaration" => false,
                "variadic_parameter_declaration" => true,
                _ => continue,
            };
            let Some(ty_node) = child.child_by_field_name("type") else {
                warn!("parameter missing type");
                continue;
            };
            let mut ty = self.type_ref(ty_node);
            if variadic {
                ty = TypeRef::Ellipsis { next: Box::new(ty) };
            }

            let mut name_cursor = child.walk();
            let names: Vec<String> = child
                .children_by_field_name("name", &mut name_cursor)
                .map(|n| self.text(n).to_string())
                .collect();

            if names.is_empty() {
                let name = format!("{}{}", prefix, fields.len());
                fields.push(FieldDescriptor::new(name, ty));
            } else {
                for name in names {
                    fields.push(FieldDescriptor::new(name, ty.clone()));
                }
            }
        }

        fields
    }

    fn struct_fields(&self, node: TsNode) -> Vec<FieldDescriptor> {
        let mut fields = Vec::new();

        let mut cursor = node.walk();
        let lists: Vec<TsNode> = node
            .named_children(&mut cursor)
            .filter(|n| n.kind() == "field_declaration_list")
            .collect();
        for list in lists {
            let mut list_cursor = list.walk();
            let decls: Vec<TsNode> = list
                .named_children(&mut list_cursor)
                .filter(|n| n.kind() == "field_declaration")
                .collect();
            for decl in decls {
                fields.extend(self.field_declaration(decl));
            }
        }

        fields
    }

    fn field_declaration(&self, node: TsNode) -> Vec<FieldDescriptor> {
        let Some(ty_node) = node.child_by_field_name("type") else {
            warn!("field declaration missing type");
            return Vec::new();
        };
        let mut ty = self.type_ref(ty_node);
        let tags = node
            .child_by_field_name("tag")
            .map(|tag| parse_struct_tag(&unquote(self.text(tag))))
            .unwrap_or_default();

        let mut cursor = node.walk();
        let names: Vec<String> = node
            .children_by_field_name("name", &mut cursor)
            .map(|n| self.text(n).to_string())
            .collect();

        if names.is_empty() {
            let mut star_cursor = node.walk();
            let is_pointer = node.children(&mut star_cursor).any(|c| c.kind() == "*");
            let name = match ty.identity() {
                Some((_, name)) => name.to_string(),
                None => self.text(ty_node).to_string(),
            };
            if is_pointer {
                ty = TypeRef::pointer(ty);
            }
            let mut field = FieldDescriptor::new(name, ty);
            field.tags = tags;
            field.embedded = true;
            return vec![field];
        }

        names
            .into_iter()
            .map(|name| {
                let mut field = FieldDescriptor::new(name, ty.clone());
                field.tags = tags.clone();
                field
            })
            .collect()
    }

    fn type_ref(&self, node: TsNode) -> TypeRef {
        match node.kind() {
            "type_identifier" | "identifier" => TypeRef::named(self.text(node)),
            "qualified_type" => {
                let package = node
                    .child_by_field_name("package")
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                let name = node
                    .child_by_field_name("name")
                    .map(|n| self.text(n))
                    .unwrap_or_default();
                TypeRef::imported(self.import_path(package), name)
            }
            "pointer_type" => match last_named_child(node) {
                Some(inner) => TypeRef::pointer(self.type_ref(inner)),
                None => opaque(node.kind()),
            },
            "slice_type" | "implicit_length_array_type" => {
                match node.child_by_field_name("element") {
                    Some(elem) => TypeRef::slice(self.type_ref(elem)),
                    None => opaque(node.kind()),
                }
            }
            "array_type" => {
                let Some(elem) = node.child_by_field_name("element") else {
                    return opaque(node.kind());
                };
                let len = node
                    .child_by_field_name("length")
                    .and_then(|n| parse_int_literal(self.text(n)))
                    .unwrap_or_else(|| {
                        debug!("Array length is not a literal: {}", self.text(node));
                        0
                    });
                TypeRef::Array {
                    len,
                    next: Box::new(self.type_ref(elem)),
                }
            }
            "map_type" => {
                match (
                    node.child_by_field_name("key"),
                    node.child_by_field_name("value"),
                ) {
                    (Some(key), Some(value)) => {
                        TypeRef::map(self.type_ref(key), self.type_ref(value))
                    }
                    _ => opaque(node.kind()),
                }
            }
            "interface_type" => TypeRef::Interface {
                methods: self.interface_body(node).0,
            },
            "struct_type" => TypeRef::Struct {
                fields: self.struct_fields(node),
            },
            "parenthesized_type" => match last_named_child(node) {
                Some(inner) => self.type_ref(inner),
                None => opaque(node.kind()),
            },
            "generic_type" => match node.child_by_field_name("type") {
                Some(base) => self.type_ref(base),
                None => opaque(node.kind()),
            },
            other => opaque(other),
        }
    }
}

/// Types with no data shape (channels, functions) become an empty interface.
fn opaque(kind: &str) -> TypeRef {
    debug!("Treating {} as an opaque type", kind);
    TypeRef::Interface {
        methods: Vec::new(),
    }
}

fn last_named_child(node: TsNode) -> Option<TsNode> {
    let mut cursor = node.walk();
    let last = node.named_children(&mut cursor).last();
    last
}

fn parse_int_literal(raw: &str) -> Option<usize> {
    let normalized = raw.replace('_', "");
    if let Some(hex) = normalized
        .strip_prefix("0x")
        .or_else(|| normalized.strip_prefix("0X"))
    {
        return usize::from_str_radix(hex, 16).ok();
    }
    normalized.parse().ok()
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    if raw.len() >= 2
        && ((raw.starts_with('`') && raw.ends_with('`'))
            || (raw.starts_with('"') && raw.ends_with('"')))
    {
        return raw[1..raw.len() - 1].replace("\\\"", "\"");
    }
    raw.to_string()
}

fn comment_lines(raw: &str) -> Vec<String> {
    if let Some(line) = raw.strip_prefix("//") {
        return vec![line.trim().to_string()];
    }
    let body = raw
        .strip_prefix("/*")
        .and_then(|s| s.strip_suffix("*/"))
        .unwrap_or(raw);
    body.lines()
        .map(|line| {
            let line = line.trim();
            line.strip_prefix('*').unwrap_or(line).trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}
