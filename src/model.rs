//! Resolved service model.
//!
//! A [`Service`] is built from one annotated Go interface. Each [`Method`]
//! keeps its raw signature plus everything downstream consumers derive from
//! it: merged annotations, request and response container names, the HTTP
//! route and the parameter bindings. The whole model serializes to JSON for
//! external code emitters.

use crate::annotations::{self, Annotations};
use crate::error::Result;
use crate::locator::Declaration;
use crate::parser::InterfaceDecl;
use crate::type_resolver::{is_builtin, TypeResolver};
use crate::types::{to_lower_camel, FieldDescriptor, MethodSignature, QualifiedName, TypeRef};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

/// Import path of the reserved context type's package
pub const CONTEXT_PACKAGE: &str = "context";
pub const CONTEXT_TYPE: &str = "Context";
pub const ERROR_TYPE: &str = "error";

#[derive(Debug, Clone, Serialize)]
pub struct Service {
    pub name: String,
    /// Import path of the declaring package
    pub package: String,
    pub docs: Vec<String>,
    pub annotations: Annotations,
    pub features: Features,
    pub methods: Vec<Method>,
}

/// Companion artifacts a service asks for, read by external emitters from
/// the model dump.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Features {
    pub tests: bool,
    pub trace: bool,
    pub metrics: bool,
    pub logger: bool,
    /// Where the implementation skeleton goes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implements: Option<String>,
}

impl Features {
    pub fn from_annotations(tags: &Annotations) -> Self {
        Self {
            tests: tags.contains(annotations::TAG_TESTS),
            trace: tags.contains(annotations::TAG_TRACE),
            metrics: tags.contains(annotations::TAG_METRICS),
            logger: tags.contains(annotations::TAG_LOGGER),
            implements: tags
                .value(annotations::TAG_IMPLEMENTS)
                .filter(|path| !path.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Method {
    pub name: String,
    pub docs: Vec<String>,
    pub args: Vec<FieldDescriptor>,
    pub results: Vec<FieldDescriptor>,
    /// Directives written on the method itself
    pub own_annotations: Annotations,
    /// Service directives overlaid with the method's own
    pub annotations: Annotations,
    pub request_name: String,
    pub response_name: String,
    pub http_path: String,
    pub jsonrpc_path: String,
    /// Arguments carried in the path, headers or cookies
    pub bindings: Vec<ParamBinding>,
    /// Results returned in headers or cookies
    pub result_bindings: Vec<ParamBinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamLocation {
    Path,
    Header,
    Cookie,
}

impl ParamLocation {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamLocation::Path => "path",
            ParamLocation::Header => "header",
            ParamLocation::Cookie => "cookie",
        }
    }
}

/// A method argument (or a field inside one) carried outside the body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamBinding {
    pub location: ParamLocation,
    /// Parameter name on the wire
    pub key: String,
    /// Top-level argument name
    pub arg: String,
    /// Field path inside the argument, empty for the argument itself
    pub path: Vec<String>,
    /// Type at the end of the path
    #[serde(rename = "type")]
    pub ty: TypeRef,
    /// Package `ty` is written in
    pub package: String,
}

/// How a status code directive maps to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOverride {
    /// `skip` - drop the response
    Skip,
    /// `<package>:<Type>` - response with that payload
    Payload(QualifiedName),
    /// Any other text becomes the description
    Text(String),
}

impl ResponseOverride {
    fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw == "skip" {
            return ResponseOverride::Skip;
        }
        match raw.rsplit_once(':') {
            Some((package, name)) if is_import_path(package) && is_identifier(name) => {
                ResponseOverride::Payload(QualifiedName::new(package, name))
            }
            _ => ResponseOverride::Text(raw.to_string()),
        }
    }
}

fn is_import_path(package: &str) -> bool {
    !package.is_empty()
        && !package.contains(char::is_whitespace)
        && package.contains(['/', '.'])
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && !name.contains(char::is_whitespace)
}

/// First argument is `context.Context`.
pub fn is_context_first(args: &[FieldDescriptor]) -> bool {
    match args.first().map(|arg| &arg.ty) {
        Some(TypeRef::Imported { package, next }) => {
            package == CONTEXT_PACKAGE
                && matches!(next.as_ref(), TypeRef::Named { name, .. } if name == CONTEXT_TYPE)
        }
        _ => false,
    }
}

/// Last result is the predeclared `error`.
pub fn is_error_last(results: &[FieldDescriptor]) -> bool {
    matches!(
        results.last().map(|result| &result.ty),
        Some(TypeRef::Named { name, package: None }) if name == ERROR_TYPE
    )
}

impl Service {
    pub fn is_jsonrpc(&self) -> bool {
        self.annotations.contains(annotations::TAG_SERVER_JSONRPC)
    }

    pub fn is_http(&self) -> bool {
        self.annotations.contains(annotations::TAG_SERVER_HTTP)
    }

    /// Lowercased name, the default service segment of JSON-RPC paths.
    pub fn lc_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// JSON-RPC batch endpoint: prefix plus the service path.
    pub fn batch_path(&self) -> String {
        join_url(&[
            &self.annotations.value_or(annotations::TAG_HTTP_PREFIX, ""),
            &self.annotations.value_or(annotations::TAG_HTTP_PATH, &self.lc_name()),
        ])
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name == name)
    }
}

impl Method {
    /// Arguments that make up the request container.
    pub fn request_fields(&self) -> &[FieldDescriptor] {
        if is_context_first(&self.args) {
            &self.args[1..]
        } else {
            &self.args
        }
    }

    /// Results that make up the response container.
    pub fn response_fields(&self) -> &[FieldDescriptor] {
        if is_error_last(&self.results) {
            &self.results[..self.results.len() - 1]
        } else {
            &self.results
        }
    }

    /// Request fields that travel in the body: bound arguments and uploads excluded.
    pub fn body_fields(&self) -> Vec<&FieldDescriptor> {
        let uploads: HashSet<String> = self.upload_vars().into_iter().map(|(arg, _)| arg).collect();
        self.request_fields()
            .iter()
            .filter(|field| {
                !uploads.contains(&field.name)
                    && !self
                        .bindings
                        .iter()
                        .any(|b| b.arg == field.name && b.path.is_empty())
            })
            .collect()
    }

    pub fn is_http(&self) -> bool {
        self.annotations.contains(annotations::TAG_HTTP_METHOD)
    }

    /// Response fields that travel in the body.
    pub fn response_body_fields(&self) -> Vec<&FieldDescriptor> {
        self.response_fields()
            .iter()
            .filter(|field| {
                !self
                    .result_bindings
                    .iter()
                    .any(|b| b.arg == field.name && b.path.is_empty())
            })
            .collect()
    }

    /// Upper-cased `http-method`, `POST` when unset.
    pub fn http_method(&self) -> String {
        self.annotations
            .value_or(annotations::TAG_HTTP_METHOD, "POST")
            .to_uppercase()
    }

    pub fn success_code(&self) -> i64 {
        self.annotations.value_int(annotations::TAG_HTTP_SUCCESS, 200)
    }

    pub fn lcc_name(&self) -> String {
        to_lower_camel(&self.name)
    }

    pub fn summary(&self) -> Option<String> {
        self.annotations.value(annotations::TAG_SUMMARY).filter(|s| !s.is_empty())
    }

    pub fn description(&self) -> Option<String> {
        self.annotations.value(annotations::TAG_DESC).filter(|s| !s.is_empty())
    }

    pub fn is_deprecated(&self) -> bool {
        self.annotations.contains(annotations::TAG_DEPRECATED)
    }

    /// Fields the logging decorator must not print.
    pub fn log_skip(&self) -> Vec<String> {
        self.annotations.values(annotations::TAG_LOG_SKIP)
    }

    /// `(argument, form field)` pairs from `upload-vars` entries `arg|field`.
    pub fn upload_vars(&self) -> Vec<(String, String)> {
        self.annotations
            .values(annotations::TAG_UPLOAD_VARS)
            .into_iter()
            .map(|entry| match entry.split_once('|') {
                Some((arg, field)) => (arg.trim().to_string(), field.trim().to_string()),
                None => (entry.clone(), entry),
            })
            .collect()
    }

    pub fn swagger_tags(&self, service: &str) -> Vec<String> {
        let tags = self.annotations.values(annotations::TAG_SWAGGER_TAGS);
        if tags.is_empty() {
            vec![service.to_string()]
        } else {
            tags
        }
    }

    /// Status code directives (`404 pkg:Type`, `500 skip`), in code order.
    pub fn response_overrides(&self) -> BTreeMap<u16, ResponseOverride> {
        self.annotations
            .iter()
            .filter_map(|(key, values)| {
                let code: u16 = key.parse().ok()?;
                if !(100..=599).contains(&code) {
                    return None;
                }
                Some((code, ResponseOverride::parse(&values.join(","))))
            })
            .collect()
    }

    pub fn default_error(&self) -> Option<ResponseOverride> {
        self.annotations
            .value(annotations::TAG_DEFAULT_ERROR)
            .filter(|v| !v.is_empty())
            .map(|v| ResponseOverride::parse(&v))
    }
}

/// Builds services from the interfaces declared in one package directory.
///
/// Interfaces without directives are skipped unless `filter` names them; a
/// non-empty `filter` restricts the result to the named interfaces.
///
/// # Errors
///
/// Returns an error if the directory cannot be listed, a file fails to parse,
/// or a type lookup hits a malformed file.
pub fn load_services(
    resolver: &mut TypeResolver,
    dir: &Path,
    filter: &[String],
) -> Result<Vec<Service>> {
    let package = resolver.layout().import_path_for(dir);
    info!("Loading services from {} ({})", dir.display(), package);

    let files = resolver.locator_mut().package_files(dir)?;
    let mut services = Vec::new();

    for file in &files {
        for iface in &file.interfaces {
            let selected = if filter.is_empty() {
                !Annotations::parse(&iface.docs).is_empty()
            } else {
                filter.iter().any(|name| name == &iface.name)
            };
            if !selected {
                debug!("Skipping interface {}", iface.name);
                continue;
            }
            services.push(build_service(resolver, iface, &package)?);
        }
    }

    for name in filter {
        if !services.iter().any(|s| &s.name == name) {
            warn!("Interface {} not found in {}", name, dir.display());
        }
    }

    info!("Loaded {} services", services.len());
    Ok(services)
}

/// Builds the model of one interface declared in `package`.
pub fn build_service(
    resolver: &mut TypeResolver,
    iface: &InterfaceDecl,
    package: &str,
) -> Result<Service> {
    debug!("Building service {}", iface.name);
    let annotations = Annotations::parse(&iface.docs);
    let features = Features::from_annotations(&annotations);

    let mut visited = HashSet::new();
    visited.insert(QualifiedName::new(package, iface.name.as_str()));
    let mut signatures = Vec::new();
    collect_methods(resolver, iface, package, package, &mut visited, &mut signatures)?;

    let mut methods = Vec::with_capacity(signatures.len());
    for signature in &signatures {
        methods.push(build_method(resolver, &iface.name, &annotations, package, signature)?);
    }

    Ok(Service {
        name: iface.name.clone(),
        package: package.to_string(),
        docs: iface.docs.clone(),
        annotations,
        features,
        methods,
    })
}

/// Own methods first, then those of embedded interfaces that are not shadowed.
fn collect_methods(
    resolver: &mut TypeResolver,
    iface: &InterfaceDecl,
    iface_package: &str,
    service_package: &str,
    visited: &mut HashSet<QualifiedName>,
    out: &mut Vec<MethodSignature>,
) -> Result<()> {
    for method in &iface.methods {
        if out.iter().any(|m| m.name == method.name) {
            continue;
        }
        let mut method = method.clone();
        if iface_package != service_package {
            for field in method.args.iter_mut().chain(method.results.iter_mut()) {
                field.ty = qualify(&field.ty, iface_package);
            }
        }
        out.push(method);
    }

    for embedded in &iface.embedded {
        let Some((origin, name)) = embedded.identity() else {
            warn!("Ignoring embedded type {} in {}", embedded, iface.name);
            continue;
        };
        let package = origin.unwrap_or(iface_package).to_string();
        let qn = QualifiedName::new(package.as_str(), name);
        if !visited.insert(qn.clone()) {
            debug!("Interface {} already embedded", qn);
            continue;
        }

        match resolver.declaration(&package, name)? {
            Some(Declaration::Interface(inner)) => {
                collect_methods(resolver, &inner, &package, service_package, visited, out)?;
            }
            Some(_) => warn!("Embedded {} in {} is not an interface", qn, iface.name),
            None => warn!("Embedded interface {} of {} not found", qn, iface.name),
        }
    }

    Ok(())
}

/// Pins unqualified user types to the package they were written in.
fn qualify(ty: &TypeRef, package: &str) -> TypeRef {
    match ty {
        TypeRef::Named {
            name,
            package: None,
        } if !is_builtin(name) => TypeRef::imported(package, name.as_str()),
        TypeRef::Named { .. } | TypeRef::Imported { .. } => ty.clone(),
        TypeRef::Pointer { next } => TypeRef::pointer(qualify(next, package)),
        TypeRef::Slice { next } => TypeRef::slice(qualify(next, package)),
        TypeRef::Ellipsis { next } => TypeRef::Ellipsis {
            next: Box::new(qualify(next, package)),
        },
        TypeRef::Array { len, next } => TypeRef::Array {
            len: *len,
            next: Box::new(qualify(next, package)),
        },
        TypeRef::Map { key, value } => TypeRef::map(qualify(key, package), qualify(value, package)),
        TypeRef::Struct { fields } => TypeRef::Struct {
            fields: fields
                .iter()
                .map(|f| FieldDescriptor {
                    ty: qualify(&f.ty, package),
                    ..f.clone()
                })
                .collect(),
        },
        TypeRef::Interface { .. } => ty.clone(),
    }
}

fn build_method(
    resolver: &mut TypeResolver,
    service: &str,
    service_annotations: &Annotations,
    package: &str,
    signature: &MethodSignature,
) -> Result<Method> {
    let own_annotations = Annotations::parse(&signature.docs);
    let annotations = service_annotations.merge(&own_annotations);
    let lcc = to_lower_camel(&signature.name);

    let http_path = join_url(&[
        &service_annotations.value_or(annotations::TAG_HTTP_PREFIX, ""),
        &own_annotations.value_or(annotations::TAG_HTTP_PATH, &lcc),
    ]);
    let jsonrpc_path = join_url(&[
        &service_annotations.value_or(annotations::TAG_HTTP_PREFIX, ""),
        &service_annotations.value_or(annotations::TAG_HTTP_PATH, &service.to_lowercase()),
        &lcc,
    ]);

    let mut method = Method {
        name: signature.name.clone(),
        docs: signature.docs.clone(),
        args: signature.args.iter().map(json_tagged).collect(),
        results: signature.results.iter().map(json_tagged).collect(),
        own_annotations,
        annotations,
        request_name: format!("{}{}Request", service, signature.name),
        response_name: format!("{}{}Response", service, signature.name),
        http_path,
        jsonrpc_path,
        bindings: Vec::new(),
        result_bindings: Vec::new(),
    };

    let (bindings, result_bindings) = bind_params(resolver, &method, package)?;
    method.bindings = bindings;
    method.result_bindings = result_bindings;
    Ok(method)
}

/// Arguments and results serialize under their Go name unless tagged.
fn json_tagged(field: &FieldDescriptor) -> FieldDescriptor {
    let mut field = field.clone();
    if !field.tags.contains_key("json") {
        field.tags.insert("json".to_string(), vec![field.name.clone()]);
    }
    field
}

/// Bindings of arguments and of results named by the same directives.
fn bind_params(
    resolver: &mut TypeResolver,
    method: &Method,
    package: &str,
) -> Result<(Vec<ParamBinding>, Vec<ParamBinding>)> {
    let mut specs: Vec<(ParamLocation, String, String)> = Vec::new();

    if method.is_http() {
        for name in path_params(&method.http_path) {
            specs.push((ParamLocation::Path, name.clone(), name));
        }
    }
    for (location, tag) in [
        (ParamLocation::Header, annotations::TAG_HTTP_HEADERS),
        (ParamLocation::Cookie, annotations::TAG_HTTP_COOKIES),
    ] {
        for entry in method.annotations.values(tag) {
            match entry.split_once('|') {
                Some((arg, key)) => {
                    specs.push((location, arg.trim().to_string(), key.trim().to_string()))
                }
                None => specs.push((location, entry.clone(), entry)),
            }
        }
    }

    let mut bindings = Vec::new();
    let mut result_bindings = Vec::new();
    for (location, target, key) in specs {
        let mut parts = target.split('.');
        let arg_name = parts.next().unwrap_or_default().to_string();
        let path: Vec<String> = parts.map(str::to_string).collect();

        let (field, is_result) = match find_field(method.request_fields(), &arg_name) {
            Some(arg) => (arg, false),
            None => match find_field(method.response_fields(), &arg_name) {
                Some(result) => (result, true),
                None => {
                    warn!(
                        "{} parameter {} of {} does not match an argument or result",
                        location.as_str(),
                        key,
                        method.name
                    );
                    continue;
                }
            },
        };

        let segments: Vec<&str> = path.iter().map(String::as_str).collect();
        let nested = resolver.nested_type(&field.ty, package, &segments)?;
        let binding = ParamBinding {
            location,
            key,
            arg: field.name.clone(),
            path,
            ty: nested.ty,
            package: nested.package,
        };
        if is_result {
            result_bindings.push(binding);
        } else {
            bindings.push(binding);
        }
    }

    Ok((bindings, result_bindings))
}

/// Exact name match first, then case-insensitive.
fn find_field<'a>(fields: &'a [FieldDescriptor], name: &str) -> Option<&'a FieldDescriptor> {
    fields
        .iter()
        .find(|f| f.name == name)
        .or_else(|| fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
}

/// Names of `:name` and `{name}` path segments.
pub fn path_params(path: &str) -> Vec<String> {
    path.split('/')
        .filter_map(|segment| {
            if let Some(name) = segment.strip_prefix(':') {
                Some(name.to_string())
            } else {
                segment
                    .strip_prefix('{')
                    .and_then(|s| s.strip_suffix('}'))
                    .map(str::to_string)
            }
        })
        .filter(|name| !name.is_empty())
        .collect()
}

/// Joins URL parts with single slashes and a leading `/`.
fn join_url(parts: &[&str]) -> String {
    let segments: Vec<&str> = parts
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();
    format!("/{}", segments.join("/"))
}
