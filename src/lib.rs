//! Go Service Generator - resolved service models and OpenAPI documents from
//! annotated Go service interfaces.
//!
//! Service interfaces carry `@tg` directives in their doc comments. The
//! library parses the Go sources with tree-sitter, follows every referenced
//! type through the module, its vendor directory and the module cache, and
//! builds a [`model::Service`] per interface. The model serializes to JSON for
//! external emitters and materializes into an OpenAPI 3.0 document.
//!
//! # Architecture
//!
//! 1. [`scanner`] - Lists the Go files of one package directory
//! 2. [`parser`] - Parses Go files into interfaces, structs and named types
//! 3. [`annotations`] - Parses `@tg` directives
//! 4. [`locator`] - Finds a declaration by package and name
//! 5. [`type_resolver`] - Resolves type references into a cycle-safe graph
//! 6. [`model`] - Builds services and methods with their derived attributes
//! 7. [`schema_generator`] - Materializes resolved types into OpenAPI schemas
//! 8. [`openapi_builder`] - Constructs the complete OpenAPI document
//! 9. [`serializer`] - Serializes the document to YAML or JSON
//!
//! # Example Usage
//!
//! ```no_run
//! use go_service_gen::{
//!     locator::{Locator, ProjectLayout},
//!     model::load_services,
//!     openapi_builder::{document_annotations, OpenApiBuilder},
//!     schema_generator::SchemaGenerator,
//!     serializer::serialize_yaml,
//!     type_resolver::TypeResolver,
//! };
//! use std::path::Path;
//!
//! let layout = ProjectLayout::discover(Path::new("./my-module")).unwrap();
//! let mut schema_gen = SchemaGenerator::new(TypeResolver::new(Locator::new(layout)));
//!
//! let services =
//!     load_services(schema_gen.resolver_mut(), Path::new("./my-module/service"), &[]).unwrap();
//!
//! let mut builder = OpenApiBuilder::new().with_annotations(&document_annotations(&services));
//! for service in &services {
//!     builder.add_service(service, &mut schema_gen).unwrap();
//! }
//! let document = builder.build(schema_gen);
//!
//! println!("{}", serialize_yaml(&document).unwrap());
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module.

pub mod annotations;
pub mod cli;
pub mod error;
pub mod locator;
pub mod model;
pub mod openapi_builder;
pub mod parser;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
pub mod type_resolver;
pub mod types;
