use crate::error::Result;
use crate::locator::{Declaration, Locator, ProjectLayout};
use crate::types::{FieldDescriptor, QualifiedName, TypeRef};
use log::{debug, warn};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Type resolver - turns syntactic type references into structural descriptions
///
/// Named types are looked up through the [`Locator`] on first use and their
/// bodies stored in a declaration table keyed by [`QualifiedName`]. Everything
/// else refers to them by name, so self-referential types never nest.
pub struct TypeResolver {
    locator: Locator,
    /// Locator results, including misses, per (package, name)
    declarations: HashMap<QualifiedName, Option<Declaration>>,
    /// Resolved bodies of named types
    definitions: HashMap<QualifiedName, ResolvedType>,
    /// Named types whose bodies are being resolved right now
    resolving: HashSet<QualifiedName>,
}

/// Structural description of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "type", rename_all = "snake_case")]
pub enum ResolvedType {
    Primitive(Primitive),
    /// Reference to an entry of the declaration table
    Named(QualifiedName),
    /// A named type the locator could not find
    Unresolved(QualifiedName),
    /// Struct body
    Record(Vec<ResolvedField>),
    /// Body of a named non-struct type (`type Status string`)
    Alias(Box<ResolvedType>),
    /// Slice (`len` is `None`) or fixed array
    Array {
        len: Option<usize>,
        elem: Box<ResolvedType>,
    },
    Map {
        key: Box<ResolvedType>,
        value: Box<ResolvedType>,
    },
    Pointer(Box<ResolvedType>),
    /// Interface with at least one method; holds the method names
    Interface(Vec<String>),
}

/// Scalar types with a fixed schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    Bool,
    String,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    /// `[]byte`, base64 in JSON
    Bytes,
    DateTime,
    Uuid,
    /// `interface{}`, `any` and raw JSON
    Any,
    Error,
}

/// A struct field after resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedField {
    /// Go field name
    pub name: String,
    /// Serialized name; `None` if the field is not serialized on its own
    pub json_name: Option<String>,
    /// Embedded without a JSON name, members are promoted
    pub flatten: bool,
    pub omit_empty: bool,
    #[serde(rename = "type")]
    pub ty: ResolvedType,
}

impl ResolvedField {
    /// Serialized, not `omitempty` and not a pointer.
    pub fn is_required(&self) -> bool {
        self.json_name.is_some() && !self.omit_empty && !matches!(self.ty, ResolvedType::Pointer(_))
    }
}

/// Result of a nested field walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nested {
    /// Last type reached
    pub ty: TypeRef,
    /// Package context `ty` must be resolved in
    pub package: String,
}

impl TypeResolver {
    /// Create a new TypeResolver on top of a locator
    pub fn new(locator: Locator) -> Self {
        debug!("Initializing TypeResolver for {}", locator.layout().root.display());
        Self {
            locator,
            declarations: HashMap::new(),
            definitions: HashMap::new(),
            resolving: HashSet::new(),
        }
    }

    pub fn layout(&self) -> &ProjectLayout {
        self.locator.layout()
    }

    pub fn locator_mut(&mut self) -> &mut Locator {
        &mut self.locator
    }

    /// Declaration of `name` in `package`, located once and cached.
    ///
    /// # Errors
    ///
    /// Propagates locator failures (unreadable or malformed source).
    pub fn declaration(&mut self, package: &str, name: &str) -> Result<Option<Declaration>> {
        let qn = QualifiedName::new(package, name);
        if let Some(cached) = self.declarations.get(&qn) {
            debug!("Declaration {} found in cache", qn);
            return Ok(cached.clone());
        }

        let declaration = self
            .locator
            .locate(name, package)?
            .map(|located| located.declaration);
        self.declarations.insert(qn, declaration.clone());
        Ok(declaration)
    }

    /// Resolves a type reference written in `package`.
    ///
    /// Named types are defined in the declaration table as a side effect and
    /// returned as [`ResolvedType::Named`].
    pub fn resolve(&mut self, ty: &TypeRef, package: &str) -> Result<ResolvedType> {
        let resolved = match ty {
            TypeRef::Named {
                name,
                package: origin,
            } => match origin {
                Some(origin) => match well_known(origin, name) {
                    Some(primitive) => ResolvedType::Primitive(primitive),
                    None => self.resolve_named(origin, name)?,
                },
                None => match builtin(name) {
                    Some(primitive) => ResolvedType::Primitive(primitive),
                    None => self.resolve_named(package, name)?,
                },
            },
            TypeRef::Imported { package, next } => self.resolve(next, package)?,
            TypeRef::Pointer { next } => {
                ResolvedType::Pointer(Box::new(self.resolve(next, package)?))
            }
            TypeRef::Slice { next } if is_byte(next) => ResolvedType::Primitive(Primitive::Bytes),
            TypeRef::Slice { next } | TypeRef::Ellipsis { next } => ResolvedType::Array {
                len: None,
                elem: Box::new(self.resolve(next, package)?),
            },
            TypeRef::Array { len, next } => ResolvedType::Array {
                len: Some(*len),
                elem: Box::new(self.resolve(next, package)?),
            },
            TypeRef::Map { key, value } => ResolvedType::Map {
                key: Box::new(self.resolve(key, package)?),
                value: Box::new(self.resolve(value, package)?),
            },
            TypeRef::Interface { methods } if methods.is_empty() => {
                ResolvedType::Primitive(Primitive::Any)
            }
            TypeRef::Interface { methods } => {
                ResolvedType::Interface(methods.iter().map(|m| m.name.clone()).collect())
            }
            TypeRef::Struct { fields } => {
                ResolvedType::Record(self.resolve_fields(fields, package)?)
            }
        };
        Ok(resolved)
    }

    /// Resolves struct fields written in `package`.
    pub fn resolve_fields(
        &mut self,
        fields: &[FieldDescriptor],
        package: &str,
    ) -> Result<Vec<ResolvedField>> {
        fields
            .iter()
            .map(|field| {
                Ok(ResolvedField {
                    name: field.name.clone(),
                    json_name: field.json_name(),
                    flatten: field.is_flattened(),
                    omit_empty: field.omit_empty(),
                    ty: self.resolve(&field.ty, package)?,
                })
            })
            .collect()
    }

    /// Body of a named type, resolving and storing it on first use.
    ///
    /// Returns `Ok(None)` if the declaration cannot be found.
    pub fn resolve_declared(&mut self, package: &str, name: &str) -> Result<Option<ResolvedType>> {
        let qn = QualifiedName::new(package, name);
        if let Some(definition) = self.definitions.get(&qn) {
            return Ok(Some(definition.clone()));
        }

        let Some(declaration) = self.declaration(package, name)? else {
            return Ok(None);
        };

        debug!("Resolving body of {}", qn);
        self.resolving.insert(qn.clone());
        let body = self.resolve_body(&declaration, package);
        self.resolving.remove(&qn);

        let body = body?;
        self.definitions.insert(qn, body.clone());
        Ok(Some(body))
    }

    /// Table entry for a named type resolved earlier.
    pub fn definition(&self, qn: &QualifiedName) -> Option<&ResolvedType> {
        self.definitions.get(qn)
    }

    /// Walks a dotted field path starting at `ty`.
    ///
    /// Pointers and import wrappers are looked through, named types are
    /// located and entered, and struct fields are matched by Go name. The walk
    /// stops at containers and interfaces, at names that cannot be located, and
    /// at the first segment with no matching field; the last type reached is
    /// returned in each case.
    pub fn nested_type(&mut self, ty: &TypeRef, package: &str, path: &[&str]) -> Result<Nested> {
        let mut current = ty.clone();
        let mut package = package.to_string();
        let mut remaining = path;
        let mut entered: HashSet<QualifiedName> = HashSet::new();

        while let Some(segment) = remaining.first() {
            match current {
                TypeRef::Imported {
                    package: origin,
                    next,
                } => {
                    package = origin;
                    current = *next;
                }
                TypeRef::Pointer { next } => current = *next,
                TypeRef::Named {
                    ref name,
                    package: ref origin,
                } => {
                    if origin.is_none() && builtin(name).is_some() {
                        break;
                    }
                    let context = origin.clone().unwrap_or_else(|| package.clone());
                    if !entered.insert(QualifiedName::new(context.as_str(), name.as_str())) {
                        break;
                    }
                    match self.declaration(&context, name)? {
                        Some(declaration) => {
                            package = context;
                            current = declaration.to_type_ref();
                        }
                        None => {
                            debug!("Nested walk stopped at unknown type {}", name);
                            break;
                        }
                    }
                }
                TypeRef::Struct { ref fields } => {
                    match fields.iter().find(|field| field.name == *segment) {
                        Some(field) => {
                            current = field.ty.clone();
                            remaining = &remaining[1..];
                        }
                        None => {
                            warn!("No field {} in nested path {}", segment, path.join("."));
                            break;
                        }
                    }
                }
                _ => break,
            }
        }

        Ok(Nested {
            ty: current,
            package,
        })
    }

    fn resolve_named(&mut self, package: &str, name: &str) -> Result<ResolvedType> {
        let qn = QualifiedName::new(package, name);

        // Back-edges of a cycle stay references
        if self.definitions.contains_key(&qn) || self.resolving.contains(&qn) {
            return Ok(ResolvedType::Named(qn));
        }

        match self.resolve_declared(package, name)? {
            Some(_) => Ok(ResolvedType::Named(qn)),
            None => {
                warn!("Could not resolve type: {}", qn);
                Ok(ResolvedType::Unresolved(qn))
            }
        }
    }

    fn resolve_body(&mut self, declaration: &Declaration, package: &str) -> Result<ResolvedType> {
        match declaration {
            Declaration::Struct(decl) => Ok(ResolvedType::Record(
                self.resolve_fields(&decl.fields, package)?,
            )),
            Declaration::Interface(decl) => Ok(ResolvedType::Interface(
                decl.methods.iter().map(|m| m.name.clone()).collect(),
            )),
            Declaration::Alias(decl) => Ok(ResolvedType::Alias(Box::new(
                self.resolve(&decl.target, package)?,
            ))),
        }
    }
}

/// Whether `name` is a Go predeclared type.
pub fn is_builtin(name: &str) -> bool {
    builtin(name).is_some()
}

fn builtin(name: &str) -> Option<Primitive> {
    let primitive = match name {
        "bool" => Primitive::Bool,
        "string" => Primitive::String,
        "int" => Primitive::Int,
        "int8" => Primitive::Int8,
        "int16" => Primitive::Int16,
        "int32" | "rune" => Primitive::Int32,
        "int64" => Primitive::Int64,
        "uint" => Primitive::Uint,
        "uint8" | "byte" => Primitive::Uint8,
        "uint16" => Primitive::Uint16,
        "uint32" => Primitive::Uint32,
        "uint64" | "uintptr" => Primitive::Uint64,
        "float32" => Primitive::Float32,
        "float64" => Primitive::Float64,
        "any" | "complex64" | "complex128" => Primitive::Any,
        "error" => Primitive::Error,
        _ => return None,
    };
    Some(primitive)
}

/// Library types with a known JSON shape
fn well_known(package: &str, name: &str) -> Option<Primitive> {
    match (package, name) {
        ("time", "Time") => Some(Primitive::DateTime),
        ("time", "Duration") => Some(Primitive::Int64),
        ("encoding/json", "RawMessage") => Some(Primitive::Any),
        (package, "UUID") if package.ends_with("uuid") => Some(Primitive::Uuid),
        _ => None,
    }
}

fn is_byte(ty: &TypeRef) -> bool {
    matches!(ty, TypeRef::Named { name, package: None } if name == "byte" || name == "uint8")
}
