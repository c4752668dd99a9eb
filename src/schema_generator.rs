use crate::error::Result;
use crate::model::{ParamBinding, ParamLocation};
use crate::type_resolver::{Primitive, ResolvedField, ResolvedType, TypeResolver};
use crate::types::{FieldDescriptor, QualifiedName, TypeRef};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Prefix of component references
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

const CONTAINER_SUFFIX: &str = "#container";

/// Schema generator - materializes resolved Go types into OpenAPI schemas
///
/// Named struct types and named non-scalar types become components that are
/// registered before their body is walked, so revisits and cycles produce a
/// `$ref` instead of another walk.
pub struct SchemaGenerator {
    /// Type resolver for looking up type definitions
    type_resolver: TypeResolver,
    registry: SchemaRegistry,
}

/// OpenAPI Schema definition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// The type of the schema (string, integer, object, array, etc.)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    /// Format for primitive types (e.g., "int32", "int64", "date-time")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Properties for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Schema>>,
    /// Required field names for object types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Items schema for array types
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Value schema for map types
    #[serde(
        rename = "additionalProperties",
        skip_serializing_if = "Option::is_none"
    )]
    pub additional_properties: Option<Box<Schema>>,
    /// Reference to another schema
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "oneOf", skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
}

impl Schema {
    pub fn typed(schema_type: &str) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            ..Default::default()
        }
    }

    pub fn formatted(schema_type: &str, format: &str) -> Self {
        Self {
            format: Some(format.to_string()),
            ..Self::typed(schema_type)
        }
    }

    pub fn object() -> Self {
        Self::typed("object")
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed("array")
        }
    }

    pub fn map(value: Schema) -> Self {
        Self {
            additional_properties: Some(Box::new(value)),
            ..Self::typed("object")
        }
    }

    pub fn reference(id: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", COMPONENTS_PREFIX, id)),
            ..Default::default()
        }
    }

    /// Component id of a `$ref` schema.
    pub fn component_id(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
    }

    /// Object with the given properties, all of them required.
    pub fn record(properties: Vec<(&str, Schema)>) -> Self {
        let required = properties.iter().map(|(name, _)| name.to_string()).collect();
        Self {
            properties: Some(
                properties
                    .into_iter()
                    .map(|(name, schema)| (name.to_string(), schema))
                    .collect(),
            ),
            required: Some(required),
            ..Self::object()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Parameter schema for OpenAPI parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,
    /// Parameter location (path, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    /// Whether the parameter is required
    pub required: bool,
    /// Schema for the parameter
    pub schema: Schema,
}

/// Bijection between qualified type names and component ids.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    ids: HashMap<QualifiedName, String>,
    owners: HashMap<String, QualifiedName>,
    schemas: BTreeMap<String, Schema>,
}

impl SchemaRegistry {
    pub fn id_of(&self, qn: &QualifiedName) -> Option<&str> {
        self.ids.get(qn).map(String::as_str)
    }

    pub fn owner_of(&self, id: &str) -> Option<&QualifiedName> {
        self.owners.get(id)
    }

    /// Binds `qn` to a component id. The first registrant of a display name
    /// gets it as is; later ones get the first free `Name2`, `Name3`, ...
    ///
    /// Returns the id and whether the binding is new.
    pub fn register(&mut self, qn: &QualifiedName) -> (String, bool) {
        if let Some(id) = self.ids.get(qn) {
            return (id.clone(), false);
        }

        let mut id = qn.name.clone();
        let mut suffix = 2;
        while self.owners.contains_key(&id) {
            id = format!("{}{}", qn.name, suffix);
            suffix += 1;
        }
        if id != qn.name {
            debug!("Schema name {} taken, registering {} as {}", qn.name, qn, id);
        }

        self.ids.insert(qn.clone(), id.clone());
        self.owners.insert(id.clone(), qn.clone());
        (id, true)
    }

    pub fn set_schema(&mut self, id: &str, schema: Schema) {
        self.schemas.insert(id.to_string(), schema);
    }

    pub fn schemas(&self) -> &BTreeMap<String, Schema> {
        &self.schemas
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl SchemaGenerator {
    /// Create a new SchemaGenerator with a TypeResolver
    pub fn new(type_resolver: TypeResolver) -> Self {
        debug!("Initializing SchemaGenerator");
        Self {
            type_resolver,
            registry: SchemaRegistry::default(),
        }
    }

    pub fn resolver_mut(&mut self) -> &mut TypeResolver {
        &mut self.type_resolver
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Resolves a type reference written in `package` and materializes it.
    pub fn generate_schema(&mut self, ty: &TypeRef, package: &str) -> Result<Schema> {
        let resolved = self.type_resolver.resolve(ty, package)?;
        Ok(self.materialize(&resolved))
    }

    /// Materializes a resolved type.
    pub fn materialize(&mut self, ty: &ResolvedType) -> Schema {
        match ty {
            ResolvedType::Primitive(primitive) => primitive_to_schema(*primitive),
            ResolvedType::Named(qn) => self.materialize_named(qn),
            ResolvedType::Unresolved(qn) => {
                debug!("Using a placeholder for unresolved type {}", qn);
                Schema::object()
            }
            ResolvedType::Record(fields) => self.record_schema(fields),
            ResolvedType::Alias(target) => self.materialize(target),
            ResolvedType::Array { elem, .. } => Schema::array(self.materialize(elem)),
            ResolvedType::Map { value, .. } => Schema::map(self.materialize(value)),
            ResolvedType::Pointer(inner) => self.materialize(inner),
            ResolvedType::Interface(_) => Schema::object(),
        }
    }

    fn materialize_named(&mut self, qn: &QualifiedName) -> Schema {
        if let Some(id) = self.registry.id_of(qn) {
            return Schema::reference(id);
        }

        let Some(definition) = self.type_resolver.definition(qn).cloned() else {
            debug!("No definition for {}, using a placeholder", qn);
            return Schema::object();
        };

        match definition {
            ResolvedType::Alias(target)
                if matches!(target.as_ref(), ResolvedType::Primitive(_)) =>
            {
                self.materialize(&target)
            }
            ResolvedType::Interface(_) => Schema::object(),
            body => {
                let (id, _) = self.registry.register(qn);
                debug!("Generating schema for {} as {}", qn, id);
                let schema = self.materialize(&body);
                self.registry.set_schema(&id, schema);
                Schema::reference(&id)
            }
        }
    }

    fn record_schema(&mut self, fields: &[ResolvedField]) -> Schema {
        let mut properties = BTreeMap::new();
        let mut required = Vec::new();
        let mut embedded = HashSet::new();
        self.collect_properties(fields, &mut properties, &mut required, &mut embedded);

        let mut schema = Schema::object();
        if !properties.is_empty() {
            schema.properties = Some(properties);
        }
        if !required.is_empty() {
            schema.required = Some(required);
        }
        schema
    }

    /// Direct fields first; promoted fields never replace a shallower one.
    fn collect_properties(
        &mut self,
        fields: &[ResolvedField],
        properties: &mut BTreeMap<String, Schema>,
        required: &mut Vec<String>,
        embedded: &mut HashSet<QualifiedName>,
    ) {
        for field in fields.iter().filter(|f| !f.flatten) {
            let Some(name) = &field.json_name else {
                continue;
            };
            if properties.contains_key(name) {
                continue;
            }
            let schema = self.materialize(&field.ty);
            properties.insert(name.clone(), schema);
            if field.is_required() {
                required.push(name.clone());
            }
        }

        for field in fields.iter().filter(|f| f.flatten) {
            let target = match &field.ty {
                ResolvedType::Pointer(inner) => inner.as_ref(),
                other => other,
            };
            let ResolvedType::Named(qn) = target else {
                continue;
            };
            if !embedded.insert(qn.clone()) {
                continue;
            }
            if let Some(ResolvedType::Record(inner)) = self.type_resolver.definition(qn).cloned() {
                self.collect_properties(&inner, properties, required, embedded);
            }
        }
    }

    /// Registers a synthetic record (request or response container) and
    /// returns a reference to it.
    ///
    /// Containers are keyed under `<package>#container` so they never share a
    /// registry entry with a declared type of the same name.
    pub fn register_container(
        &mut self,
        name: &str,
        package: &str,
        fields: &[&FieldDescriptor],
    ) -> Result<Schema> {
        let owned: Vec<FieldDescriptor> = fields.iter().map(|f| (*f).clone()).collect();
        let resolved = self.type_resolver.resolve_fields(&owned, package)?;

        let qn = QualifiedName::new(format!("{}{}", package, CONTAINER_SUFFIX), name);
        let (id, _) = self.registry.register(&qn);
        let schema = self.record_schema(&resolved);
        self.registry.set_schema(&id, schema);
        Ok(Schema::reference(&id))
    }

    /// Component body behind a `$ref` schema.
    pub fn component(&self, schema: &Schema) -> Option<&Schema> {
        schema
            .component_id()
            .and_then(|id| self.registry.schemas().get(id))
    }

    /// `$ref` to an object component without properties.
    pub fn is_empty_component(&self, schema: &Schema) -> bool {
        match self.component(schema) {
            Some(component) => {
                component.schema_type.as_deref() == Some("object")
                    && component.properties.as_ref().map_or(true, |p| p.is_empty())
                    && component.additional_properties.is_none()
            }
            None => false,
        }
    }

    /// Generate a parameter schema for a bound argument
    pub fn generate_parameter_schema(&mut self, binding: &ParamBinding) -> Result<ParameterSchema> {
        let schema = self.generate_schema(&binding.ty, &binding.package)?;
        let required = binding.location == ParamLocation::Path
            || !binding.ty.is_pointer();

        Ok(ParameterSchema {
            name: binding.key.clone(),
            location: binding.location.as_str().to_string(),
            required,
            schema,
        })
    }

    /// Get all generated schemas
    pub fn get_schemas(&self) -> &BTreeMap<String, Schema> {
        self.registry.schemas()
    }
}

fn primitive_to_schema(primitive: Primitive) -> Schema {
    match primitive {
        Primitive::Bool => Schema::typed("boolean"),
        Primitive::String | Primitive::Error => Schema::typed("string"),
        Primitive::Int8
        | Primitive::Int16
        | Primitive::Int32
        | Primitive::Uint8
        | Primitive::Uint16
        | Primitive::Uint32 => Schema::formatted("integer", "int32"),
        Primitive::Int | Primitive::Int64 | Primitive::Uint | Primitive::Uint64 => {
            Schema::formatted("integer", "int64")
        }
        Primitive::Float32 => Schema::formatted("number", "float"),
        Primitive::Float64 => Schema::formatted("number", "double"),
        Primitive::Bytes => Schema::formatted("string", "byte"),
        Primitive::DateTime => Schema::formatted("string", "date-time"),
        Primitive::Uuid => Schema::formatted("string", "uuid"),
        Primitive::Any => Schema::default(),
    }
}
