use crate::annotations::{self, Annotations};
use crate::error::Result;
use crate::model::{Method, ParamBinding, ParamLocation, ResponseOverride, Service};
use crate::schema_generator::{Schema, SchemaGenerator};
use crate::type_resolver::ResolvedType;
use crate::types::{QualifiedName, TypeRef};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONTENT_JSON: &str = "application/json";
pub const CONTENT_MULTIPART: &str = "multipart/form-data";

/// OpenAPI document builder
pub struct OpenApiBuilder {
    /// OpenAPI info section
    info: Info,
    servers: Vec<Server>,
    /// Paths collection (URL path -> PathItem)
    paths: BTreeMap<String, PathItem>,
}

/// OpenAPI Info object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    /// API title
    pub title: String,
    /// API version
    pub version: String,
    /// API description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI Server object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI PathItem object - represents all operations for a single path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathItem {
    /// GET operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<Operation>,
    /// POST operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post: Option<Operation>,
    /// PUT operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put: Option<Operation>,
    /// DELETE operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<Operation>,
    /// PATCH operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch: Option<Operation>,
    /// OPTIONS operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Operation>,
    /// HEAD operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head: Option<Operation>,
}

impl PathItem {
    /// Operation slot for an upper-case HTTP verb.
    fn slot(&mut self, verb: &str) -> Option<&mut Option<Operation>> {
        match verb {
            "GET" => Some(&mut self.get),
            "POST" => Some(&mut self.post),
            "PUT" => Some(&mut self.put),
            "DELETE" => Some(&mut self.delete),
            "PATCH" => Some(&mut self.patch),
            "OPTIONS" => Some(&mut self.options),
            "HEAD" => Some(&mut self.head),
            _ => None,
        }
    }
}

/// OpenAPI Operation object - represents a single API operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Operation summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Operation description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Operation ID
    #[serde(rename = "operationId", skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deprecated: Option<bool>,
    /// Parameters (path, header, cookie)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<Parameter>>,
    /// Request body
    #[serde(rename = "requestBody", skip_serializing_if = "Option::is_none")]
    pub request_body: Option<RequestBody>,
    /// Responses
    pub responses: BTreeMap<String, Response>,
}

/// OpenAPI Parameter object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    /// Parameter name
    pub name: String,
    /// Parameter location (path, header, cookie)
    #[serde(rename = "in")]
    pub location: String,
    /// Whether the parameter is required
    pub required: bool,
    /// Parameter schema
    pub schema: Schema,
    /// Parameter description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OpenAPI RequestBody object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestBody {
    /// Request body description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the request body is required
    pub required: bool,
    /// Content types and their schemas
    pub content: BTreeMap<String, MediaType>,
}

/// OpenAPI MediaType object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaType {
    /// Schema for this media type
    pub schema: Schema,
}

/// OpenAPI Response object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Response description
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, Header>>,
    /// Response content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<BTreeMap<String, MediaType>>,
}

/// OpenAPI Header object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub schema: Schema,
}

/// OpenAPI Components object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Components {
    /// Schema definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schemas: Option<BTreeMap<String, Schema>>,
}

/// Complete OpenAPI document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenApiDocument {
    /// OpenAPI version
    pub openapi: String,
    /// API info
    pub info: Info,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servers: Option<Vec<Server>>,
    /// API paths
    pub paths: BTreeMap<String, PathItem>,
    /// Components (schemas, etc.)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Components>,
}

/// Directives of all services layered in declaration order, later services win.
pub fn document_annotations(services: &[Service]) -> Annotations {
    services
        .iter()
        .fold(Annotations::new(), |acc, service| acc.merge(&service.annotations))
}

impl OpenApiBuilder {
    /// Create a new OpenApiBuilder with default info
    pub fn new() -> Self {
        debug!("Initializing OpenApiBuilder");
        Self {
            info: Info {
                title: "Generated API".to_string(),
                version: "1.0.0".to_string(),
                description: Some(
                    "API documentation generated from Go service interfaces".to_string(),
                ),
            },
            servers: Vec::new(),
            paths: BTreeMap::new(),
        }
    }

    /// Applies the document directives `title`, `version`, `description` and
    /// `servers` (`url;description|url2`) that are present.
    pub fn with_annotations(mut self, tags: &Annotations) -> Self {
        let value = |key: &str| tags.value(key).filter(|v| !v.is_empty());

        if let Some(title) = value(annotations::TAG_TITLE) {
            self.info.title = title;
        }
        if let Some(version) = value(annotations::TAG_VERSION) {
            self.info.version = version;
        }
        if let Some(description) = value(annotations::TAG_DESCRIPTION) {
            self.info.description = Some(description);
        }
        if let Some(servers) = value(annotations::TAG_SERVERS) {
            self.servers = parse_servers(&servers);
        }
        self
    }

    /// Add every method of a service to the document
    ///
    /// Methods with an `http-method` directive are documented at their HTTP
    /// path; all others as JSON-RPC calls.
    pub fn add_service(
        &mut self,
        service: &Service,
        schema_gen: &mut SchemaGenerator,
    ) -> Result<()> {
        info!("Adding service {} ({} methods)", service.name, service.methods.len());

        for method in &service.methods {
            if method.is_http() {
                self.add_http_method(service, method, schema_gen)?;
            } else {
                self.add_jsonrpc_method(service, method, schema_gen)?;
            }
        }
        Ok(())
    }

    fn add_jsonrpc_method(
        &mut self,
        service: &Service,
        method: &Method,
        schema_gen: &mut SchemaGenerator,
    ) -> Result<()> {
        debug!("Adding JSON-RPC method: POST {}", method.jsonrpc_path);

        let params = schema_gen.register_container(
            &method.request_name,
            &service.package,
            &method.body_fields(),
        )?;
        let result = schema_gen.register_container(
            &method.response_name,
            &service.package,
            &method.response_body_fields(),
        )?;

        let params = (!schema_gen.is_empty_component(&params)).then_some(params);
        let result = (!schema_gen.is_empty_component(&result)).then_some(result);

        let mut responses = BTreeMap::new();
        responses.insert(
            "200".to_string(),
            Response {
                description: status_text(200).unwrap_or("OK").to_string(),
                headers: self.response_headers(method, &service.package, schema_gen)?,
                content: Some(json_content(Schema {
                    one_of: Some(vec![jsonrpc_envelope("result", result), jsonrpc_error()]),
                    ..Default::default()
                })),
            },
        );

        let operation = Operation {
            request_body: Some(RequestBody {
                description: None,
                required: true,
                content: json_content(jsonrpc_envelope("params", params)),
            }),
            responses,
            ..self.operation_base(service, method, schema_gen)?
        };

        self.insert_operation(method.jsonrpc_path.clone(), "POST", operation);
        Ok(())
    }

    fn add_http_method(
        &mut self,
        service: &Service,
        method: &Method,
        schema_gen: &mut SchemaGenerator,
    ) -> Result<()> {
        let verb = method.http_method();
        debug!("Adding HTTP method: {} {}", verb, method.http_path);

        let uploads = method.upload_vars();
        let request_content = if uploads.is_empty() {
            let request = schema_gen.register_container(
                &method.request_name,
                &service.package,
                &method.body_fields(),
            )?;
            clear_content(json_content(request), schema_gen)
        } else {
            let mut properties = BTreeMap::new();
            for (_, form_field) in &uploads {
                properties.insert(form_field.clone(), Schema::formatted("string", "binary"));
            }
            for field in method.body_fields() {
                if let Some(name) = field.json_name() {
                    let schema = schema_gen.generate_schema(&field.ty, &service.package)?;
                    properties.insert(name, schema);
                }
            }
            let form = Schema {
                properties: Some(properties),
                ..Schema::object()
            };
            let mut content = BTreeMap::new();
            content.insert(CONTENT_MULTIPART.to_string(), MediaType { schema: form });
            Some(content)
        };

        let response = schema_gen.register_container(
            &method.response_name,
            &service.package,
            &method.response_body_fields(),
        )?;

        let success = method.success_code();
        let mut responses = BTreeMap::new();
        responses.insert(
            success.to_string(),
            Response {
                description: u16::try_from(success)
                    .ok()
                    .and_then(status_text)
                    .unwrap_or("Successful response")
                    .to_string(),
                headers: self.response_headers(method, &service.package, schema_gen)?,
                content: clear_content(json_content(response), schema_gen),
            },
        );
        fill_errors(&mut responses, method, schema_gen)?;

        let operation = Operation {
            request_body: request_content.map(|content| RequestBody {
                description: None,
                required: true,
                content,
            }),
            responses,
            ..self.operation_base(service, method, schema_gen)?
        };

        let path = Self::convert_path_format(&method.http_path);
        self.insert_operation(path, &verb, operation);
        Ok(())
    }

    /// Fields shared by both kinds of operation; body and responses left empty.
    fn operation_base(
        &self,
        service: &Service,
        method: &Method,
        schema_gen: &mut SchemaGenerator,
    ) -> Result<Operation> {
        let mut parameters = Vec::new();
        for binding in &method.bindings {
            let param_schema = schema_gen.generate_parameter_schema(binding)?;
            parameters.push(Parameter {
                name: param_schema.name,
                location: param_schema.location,
                required: param_schema.required,
                schema: param_schema.schema,
                description: None,
            });
        }

        Ok(Operation {
            tags: Some(method.swagger_tags(&service.name)),
            summary: method.summary(),
            description: method.description(),
            operation_id: Some(format!("{}.{}", service.lc_name(), method.lcc_name())),
            deprecated: method.is_deprecated().then_some(true),
            parameters: (!parameters.is_empty()).then_some(parameters),
            request_body: None,
            responses: BTreeMap::new(),
        })
    }

    /// Results bound to headers; cookies travel in `Set-Cookie`.
    fn response_headers(
        &self,
        method: &Method,
        package: &str,
        schema_gen: &mut SchemaGenerator,
    ) -> Result<Option<BTreeMap<String, Header>>> {
        let mut headers = BTreeMap::new();
        for binding in &method.result_bindings {
            let schema = binding_schema(binding, package, schema_gen)?;
            let (name, description) = match binding.location {
                ParamLocation::Cookie => ("Set-Cookie".to_string(), Some(binding.key.clone())),
                _ => (binding.key.clone(), None),
            };
            headers.insert(name, Header { description, schema });
        }
        Ok((!headers.is_empty()).then_some(headers))
    }

    fn insert_operation(&mut self, path: String, verb: &str, operation: Operation) {
        let path_item = self.paths.entry(path.clone()).or_default();
        match path_item.slot(verb) {
            Some(slot) => {
                if slot.is_some() {
                    warn!("Replacing existing operation {} {}", verb, path);
                }
                *slot = Some(operation);
            }
            None => warn!("Unsupported HTTP method {} for {}", verb, path),
        }
    }

    /// Convert path format from :param or {param} to OpenAPI {param} format
    fn convert_path_format(path: &str) -> String {
        path.split('/')
            .map(|part| match part.strip_prefix(':') {
                Some(name) => format!("{{{}}}", name),
                None => part.to_string(),
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Build the final OpenAPI document
    pub fn build(self, schema_gen: SchemaGenerator) -> OpenApiDocument {
        debug!("Building final OpenAPI document");

        // Collect all schemas from the schema generator
        let schemas = schema_gen.get_schemas();
        let components = if !schemas.is_empty() {
            Some(Components {
                schemas: Some(schemas.clone()),
            })
        } else {
            None
        };

        OpenApiDocument {
            openapi: "3.0.0".to_string(),
            info: self.info,
            servers: (!self.servers.is_empty()).then_some(self.servers),
            paths: self.paths,
            components,
        }
    }
}

impl Default for OpenApiBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn binding_schema(
    binding: &ParamBinding,
    fallback_package: &str,
    schema_gen: &mut SchemaGenerator,
) -> Result<Schema> {
    let package = if binding.package.is_empty() {
        fallback_package
    } else {
        binding.package.as_str()
    };
    schema_gen.generate_schema(&binding.ty, package)
}

fn parse_servers(raw: &str) -> Vec<Server> {
    raw.split('|')
        .filter_map(|entry| {
            let mut parts = entry.splitn(2, ';');
            let url = parts.next()?.trim();
            if url.is_empty() {
                return None;
            }
            let description = parts
                .next()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty());
            Some(Server {
                url: url.to_string(),
                description,
            })
        })
        .collect()
}

fn json_content(schema: Schema) -> BTreeMap<String, MediaType> {
    let mut content = BTreeMap::new();
    content.insert(CONTENT_JSON.to_string(), MediaType { schema });
    content
}

/// Drops media types whose schema is an empty object or a reference to one.
fn clear_content(
    mut content: BTreeMap<String, MediaType>,
    schema_gen: &SchemaGenerator,
) -> Option<BTreeMap<String, MediaType>> {
    content.retain(|_, media| {
        let schema = &media.schema;
        let empty_object = schema.schema_type.as_deref() == Some("object")
            && schema.properties.as_ref().map_or(true, |p| p.is_empty())
            && schema.additional_properties.is_none();
        let empty_ref = schema.reference.is_some()
            && (schema_gen.component(schema).is_none() || schema_gen.is_empty_component(schema));
        !empty_object && !empty_ref
    });
    (!content.is_empty()).then_some(content)
}

/// JSON-RPC 2.0 envelope carrying `payload` under `field`.
fn jsonrpc_envelope(field: &str, payload: Option<Schema>) -> Schema {
    let mut properties = vec![
        ("jsonrpc", Schema::typed("string").with_description("2.0")),
        ("id", Schema::default()),
    ];
    if let Some(payload) = payload {
        properties.push((field, payload));
    }
    Schema::record(properties)
}

fn jsonrpc_error() -> Schema {
    let mut error = Schema::record(vec![
        ("code", Schema::formatted("integer", "int32")),
        ("message", Schema::typed("string")),
    ]);
    if let Some(properties) = error.properties.as_mut() {
        properties.insert("data".to_string(), Schema::default());
    }
    Schema::record(vec![
        ("jsonrpc", Schema::typed("string").with_description("2.0")),
        ("id", Schema::default()),
        ("error", error),
    ])
}

/// Adds the status code directives of a method to its responses.
fn fill_errors(
    responses: &mut BTreeMap<String, Response>,
    method: &Method,
    schema_gen: &mut SchemaGenerator,
) -> Result<()> {
    for (code, directive) in method.response_overrides() {
        let Some(text) = status_text(code) else {
            debug!("Ignoring unknown status code {} on {}", code, method.name);
            continue;
        };
        let (description, content) = match directive {
            ResponseOverride::Skip => continue,
            ResponseOverride::Payload(qn) => (text.to_string(), payload_content(&qn, schema_gen)?),
            ResponseOverride::Text(description) => (description, None),
        };
        responses.insert(
            code.to_string(),
            Response {
                description,
                headers: None,
                content,
            },
        );
    }

    if let Some(directive) = method.default_error() {
        let content = match directive {
            ResponseOverride::Payload(qn) => payload_content(&qn, schema_gen)?,
            _ => None,
        };
        responses.insert(
            "default".to_string(),
            Response {
                description: "Generic error".to_string(),
                headers: None,
                content,
            },
        );
    }
    Ok(())
}

/// JSON content for an error payload type; none if the type cannot be found.
fn payload_content(
    qn: &QualifiedName,
    schema_gen: &mut SchemaGenerator,
) -> Result<Option<BTreeMap<String, MediaType>>> {
    let ty = TypeRef::imported(qn.package.as_str(), qn.name.as_str());
    let resolved = schema_gen.resolver_mut().resolve(&ty, &qn.package)?;
    if let ResolvedType::Unresolved(_) = resolved {
        warn!("Error payload {} not found", qn);
        return Ok(None);
    }
    Ok(Some(json_content(schema_gen.materialize(&resolved))))
}

/// Reason phrase of an HTTP status code.
pub fn status_text(code: u16) -> Option<&'static str> {
    let text = match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        415 => "Unsupported Media Type",
        422 => "Unprocessable Entity",
        423 => "Locked",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => return None,
    };
    Some(text)
}
