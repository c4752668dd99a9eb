//! Serialization of OpenAPI documents and service models.
//!
//! Documents are written as YAML or pretty JSON; the format follows the output
//! file extension unless the caller picks one. The service model is always
//! dumped as pretty JSON.

use crate::error::Result;
use crate::model::Service;
use crate::openapi_builder::OpenApiDocument;
use log::debug;
use std::fs;
use std::path::Path;

/// Output document format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Yaml,
    Json,
}

impl Format {
    /// `.json` selects JSON; every other extension, or none, selects YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Format::Json,
            _ => Format::Yaml,
        }
    }
}

/// Serializes an OpenAPI document to YAML format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    Ok(serde_yaml::to_string(doc)?)
}

/// Serializes an OpenAPI document to JSON format with pretty printing.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    Ok(serde_json::to_string_pretty(doc)?)
}

pub fn serialize(doc: &OpenApiDocument, format: Format) -> Result<String> {
    match format {
        Format::Yaml => serialize_yaml(doc),
        Format::Json => serialize_json(doc),
    }
}

/// Pretty JSON dump of the resolved services for external emitters.
pub fn serialize_model(services: &[Service]) -> Result<String> {
    debug!("Serializing model of {} services", services.len());
    Ok(serde_json::to_string_pretty(services)?)
}

/// Writes string content to a file, creating parent directories as needed.
///
/// # Errors
///
/// Returns an error if a directory or the file cannot be written.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotations;
    use crate::model::Features;
    use crate::openapi_builder::{Info, OpenApiDocument, Server};
    use crate::types::{FieldDescriptor, TypeRef};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Helper function to create a minimal OpenAPI document for testing
    fn create_test_document() -> OpenApiDocument {
        OpenApiDocument {
            openapi: "3.0.0".to_string(),
            info: Info {
                title: "Test API".to_string(),
                version: "1.0.0".to_string(),
                description: Some("A test API".to_string()),
            },
            servers: Some(vec![Server {
                url: "http://localhost:9000".to_string(),
                description: None,
            }]),
            paths: BTreeMap::new(),
            components: None,
        }
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(&PathBuf::from("api/swagger.json")), Format::Json);
        assert_eq!(Format::from_path(&PathBuf::from("swagger.JSON")), Format::Json);
        assert_eq!(Format::from_path(&PathBuf::from("swagger.yaml")), Format::Yaml);
        assert_eq!(Format::from_path(&PathBuf::from("swagger.yml")), Format::Yaml);
        assert_eq!(Format::from_path(&PathBuf::from("swagger")), Format::Yaml);
    }

    #[test]
    fn test_serialize_yaml() {
        let yaml = serialize(&create_test_document(), Format::Yaml).unwrap();

        assert!(yaml.contains("openapi:"));
        assert!(yaml.contains("3.0.0"));
        assert!(yaml.contains("title: Test API"));
        assert!(yaml.contains("http://localhost:9000"));
        assert!(yaml.contains("paths: {}"));
        assert!(!yaml.contains("components"));
    }

    #[test]
    fn test_serialize_json() {
        let json = serialize(&create_test_document(), Format::Json).unwrap();

        // Pretty printed
        assert!(json.lines().count() > 5);

        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["openapi"], "3.0.0");
        assert_eq!(parsed["info"]["title"], "Test API");
        assert_eq!(parsed["servers"][0]["url"], "http://localhost:9000");
        assert!(parsed.get("components").is_none());
    }

    #[test]
    fn test_serialize_model() {
        let annotations = Annotations::parse_text(
            "server-jsonrpc\nhttp-prefix api\nlogger\nimplements internal/users",
        );
        let service = Service {
            name: "Users".to_string(),
            package: "github.com/acme/app/service".to_string(),
            docs: vec!["@tg server-jsonrpc".to_string()],
            features: Features::from_annotations(&annotations),
            annotations,
            methods: Vec::new(),
        };

        let json = serialize_model(&[service]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed[0]["name"], "Users");
        assert_eq!(parsed[0]["annotations"]["http-prefix"][0], "api");
        assert!(parsed[0]["annotations"]["server-jsonrpc"].as_array().unwrap().is_empty());
        assert_eq!(parsed[0]["features"]["logger"], true);
        assert_eq!(parsed[0]["features"]["trace"], false);
        assert_eq!(parsed[0]["features"]["implements"], "internal/users");
    }

    #[test]
    fn test_field_descriptor_in_model_dump() {
        let field = FieldDescriptor::new("id", TypeRef::pointer(TypeRef::named("string")))
            .with_tag("json", &["id", "omitempty"]);

        let json = serde_json::to_value(&field).unwrap();
        assert_eq!(json["name"], "id");
        assert_eq!(json["tags"]["json"][1], "omitempty");
    }

    #[test]
    fn test_write_to_file_creates_directories() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("subdir").join("nested").join("test.yaml");

        write_to_file("test content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "test content");
    }

    #[test]
    fn test_write_to_file_overwrites_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.yaml");

        write_to_file("initial content", &file_path).unwrap();
        write_to_file("new content", &file_path).unwrap();

        assert_eq!(fs::read_to_string(&file_path).unwrap(), "new content");
    }

    #[test]
    fn test_write_json_file_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("openapi.json");

        let content = serialize(&create_test_document(), Format::from_path(&file_path)).unwrap();
        write_to_file(&content, &file_path).unwrap();

        let read_back = fs::read_to_string(&file_path).unwrap();
        let deserialized: OpenApiDocument = serde_json::from_str(&read_back).unwrap();
        assert_eq!(deserialized.info.title, "Test API");
    }
}
