use go_service_gen::{
    cli::{self, CliArgs},
    locator::{Locator, ProjectLayout, SearchStep},
    openapi_builder::CONTENT_JSON,
    schema_generator::Schema,
    serializer::serialize_json,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SHOP: &[(&str, &str)] = &[
    ("go.mod", include_str!("fixtures/shop/go.mod")),
    ("service/service.go", include_str!("fixtures/shop/service/service.go")),
    ("models/order.go", include_str!("fixtures/shop/models/order.go")),
    ("models/common.go", include_str!("fixtures/shop/models/common.go")),
    ("legacy/order.go", include_str!("fixtures/shop/legacy/order.go")),
    ("errors/errors.go", include_str!("fixtures/shop/errors/errors.go")),
    (
        "vendor/github.com/acme/money/money.go",
        include_str!("fixtures/shop/vendor/github.com/acme/money/money.go"),
    ),
];

/// Helper function to create a temporary Go module from fixture files
fn create_test_project(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");

    for (path, content) in files {
        write_file(temp_dir.path(), path, content);
    }

    temp_dir
}

fn write_file(root: &Path, path: &str, content: &str) {
    let file_path = root.join(path);
    if let Some(parent) = file_path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent directories");
    }
    fs::write(&file_path, content).expect("Failed to write test file");
}

fn args_for(root: &Path) -> CliArgs {
    CliArgs {
        services_path: root.join("service"),
        output_path: None,
        output_format: None,
        root: Some(root.to_path_buf()),
        vendor: None,
        interfaces: Vec::new(),
        model_path: None,
        verbose: false,
    }
}

fn properties(schema: &Schema) -> Vec<&str> {
    schema
        .properties
        .as_ref()
        .map(|p| p.keys().map(String::as_str).collect())
        .unwrap_or_default()
}

#[test]
fn test_end_to_end_document() {
    let project = create_test_project(SHOP);
    let generation = cli::generate(&args_for(project.path())).expect("Generation failed");
    let document = generation.document;

    assert_eq!(generation.services.len(), 1);
    assert_eq!(generation.services[0].name, "Orders");

    assert_eq!(document.openapi, "3.0.0");
    assert_eq!(document.info.title, "Shop API");
    assert_eq!(document.info.version, "2.1.0");
    let servers = document.servers.as_ref().expect("Servers missing");
    assert_eq!(servers.len(), 2);
    assert_eq!(servers[0].url, "http://localhost:9000");
    assert_eq!(servers[0].description.as_deref(), Some("local"));
    assert_eq!(servers[1].url, "https://shop.acme.io");

    let paths: Vec<&str> = document.paths.keys().map(String::as_str).collect();
    assert_eq!(
        paths,
        vec![
            "/api/v2/orders",
            "/api/v2/orders/import",
            "/api/v2/orders/ping",
            "/api/v2/orders/{id}",
        ]
    );

    let get = document.paths["/api/v2/orders/{id}"]
        .get
        .as_ref()
        .expect("GET operation missing");
    assert_eq!(get.operation_id.as_deref(), Some("orders.get"));
    assert_eq!(get.tags, Some(vec!["Orders".to_string()]));
    let parameters = get.parameters.as_ref().expect("Parameters missing");
    let names: Vec<(&str, &str)> = parameters
        .iter()
        .map(|p| (p.name.as_str(), p.location.as_str()))
        .collect();
    assert_eq!(names, vec![("id", "path"), ("X-Token", "header")]);

    let create = document.paths["/api/v2/orders"]
        .post
        .as_ref()
        .expect("POST operation missing");
    assert_eq!(create.summary.as_deref(), Some("Places an order"));
    assert!(create.responses.contains_key("201"));

    let import = document.paths["/api/v2/orders/import"]
        .post
        .as_ref()
        .expect("JSON-RPC operation missing");
    assert_eq!(import.deprecated, Some(true));
}

#[test]
fn test_error_responses() {
    let project = create_test_project(SHOP);
    let document = cli::generate(&args_for(project.path())).unwrap().document;

    let get = document.paths["/api/v2/orders/{id}"].get.as_ref().unwrap();
    let codes: Vec<&str> = get.responses.keys().map(String::as_str).collect();
    assert_eq!(codes, vec!["200", "404", "default"]);

    assert_eq!(
        get.responses["404"].content.as_ref().unwrap()[CONTENT_JSON].schema,
        Schema::reference("NotFound")
    );
    assert_eq!(get.responses["default"].description, "Generic error");
    assert_eq!(
        get.responses["default"].content.as_ref().unwrap()[CONTENT_JSON].schema,
        Schema::reference("Generic")
    );

    // JSON-RPC calls report errors inside the envelope
    let ping = document.paths["/api/v2/orders/ping"].post.as_ref().unwrap();
    let codes: Vec<&str> = ping.responses.keys().map(String::as_str).collect();
    assert_eq!(codes, vec!["200"]);
}

#[test]
fn test_components_and_collisions() {
    let project = create_test_project(SHOP);
    let document = cli::generate(&args_for(project.path())).unwrap().document;
    let schemas = document.components.unwrap().schemas.unwrap();

    for name in [
        "Amount",
        "Customer",
        "Generic",
        "Item",
        "NotFound",
        "Order",
        "Order2",
        "OrdersGetResponse",
        "OrdersCreateRequest",
        "OrdersImportRequest",
    ] {
        assert!(schemas.contains_key(name), "Missing schema {}", name);
    }
    // Flattened embedded structs do not get their own component
    assert!(!schemas.contains_key("Base"));

    // models.Order came first, legacy.Order is suffixed
    assert_eq!(properties(&schemas["Order2"]), vec!["note", "number"]);

    let import = &schemas["OrdersImportRequest"];
    let import_properties = import.properties.as_ref().unwrap();
    assert_eq!(
        import_properties["orders"],
        Schema::array(Schema::reference("Order2"))
    );
    // Resolved through the vendor directory
    assert_eq!(import_properties["rate"], Schema::reference("Amount"));
    assert_eq!(properties(&schemas["Amount"]), vec!["currency", "units"]);
}

#[test]
fn test_cycles_and_flattening() {
    let project = create_test_project(SHOP);
    let document = cli::generate(&args_for(project.path())).unwrap().document;
    let schemas = document.components.unwrap().schemas.unwrap();

    let order = &schemas["Order"];
    assert_eq!(
        properties(order),
        vec![
            "created", "customer", "id", "items", "meta", "parent", "placed", "status", "total"
        ]
    );

    let order_properties = order.properties.as_ref().unwrap();
    assert_eq!(order_properties["parent"], Schema::reference("Order"));
    assert_eq!(
        order_properties["items"],
        Schema::array(Schema::reference("Item"))
    );
    assert_eq!(order_properties["status"], Schema::typed("string"));
    assert_eq!(
        order_properties["placed"],
        Schema::formatted("string", "date-time")
    );
    assert_eq!(order_properties["meta"], Schema::map(Schema::default()));

    // Direct fields first, then promoted ones; pointers are optional
    assert_eq!(
        order.required,
        Some(
            ["status", "items", "total", "meta", "placed", "id", "created"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        )
    );

    // `json:"-"` hides the back-reference
    assert_eq!(properties(&schemas["Item"]), vec!["count", "sku"]);
}

#[test]
fn test_generation_is_idempotent() {
    let project = create_test_project(SHOP);

    let first = cli::generate(&args_for(project.path())).unwrap();
    let second = cli::generate(&args_for(project.path())).unwrap();

    assert_eq!(
        serialize_json(&first.document).unwrap(),
        serialize_json(&second.document).unwrap()
    );
}

#[test]
fn test_vendor_fallback_order() {
    let project = create_test_project(SHOP);
    let layout = ProjectLayout::discover(project.path())
        .unwrap()
        .with_module_cache(None);
    let mut locator = Locator::new(layout);

    let located = locator
        .locate("Amount", "github.com/acme/money")
        .unwrap()
        .expect("Amount not found");

    assert_eq!(located.step, SearchStep::Vendor);
    assert_eq!(
        located.attempted,
        vec![
            SearchStep::PackageDir,
            SearchStep::ModuleMapping,
            SearchStep::Vendor
        ]
    );
    assert!(located.file.ends_with("vendor/github.com/acme/money/money.go"));

    assert!(locator
        .locate("Missing", "github.com/acme/money")
        .unwrap()
        .is_none());
}

#[test]
fn test_iface_selects_unannotated_interface() {
    let project = create_test_project(SHOP);
    let mut args = args_for(project.path());
    args.interfaces = vec!["Internal".to_string()];

    let generation = cli::generate(&args).unwrap();

    assert_eq!(generation.services.len(), 1);
    assert_eq!(generation.services[0].name, "Internal");
    assert_eq!(generation.document.info.title, "Generated API");
    assert!(generation.document.paths["/internal/reindex"].post.is_some());
}

#[test]
fn test_run_writes_yaml_by_default() {
    let project = create_test_project(SHOP);
    let args = args_for(project.path());

    cli::run(args).expect("Run failed");

    let output = project.path().join("service").join("swagger.yaml");
    let content = fs::read_to_string(&output).expect("Output not written");
    assert!(content.contains("openapi:"));
    assert!(content.contains("/api/v2/orders/import:"));
    assert!(serde_json::from_str::<serde_json::Value>(&content).is_err());
}

#[test]
fn test_run_writes_json_and_model() {
    let project = create_test_project(SHOP);
    let output = project.path().join("out").join("swagger.json");
    let model = project.path().join("out").join("model.json");
    let mut args = args_for(project.path());
    args.output_path = Some(output.clone());
    args.model_path = Some(model.clone());

    cli::run(args).expect("Run failed");

    let document: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(document["info"]["title"], "Shop API");

    let services: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&model).unwrap()).unwrap();
    assert_eq!(services[0]["name"], "Orders");
    assert_eq!(services[0]["methods"][0]["request_name"], "OrdersGetRequest");
    assert_eq!(services[0]["methods"][0]["http_path"], "/api/v2/orders/:id");
}

#[test]
fn test_malformed_source_aborts_without_output() {
    let project = create_test_project(SHOP);
    write_file(
        project.path(),
        "models/broken.go",
        "package models\n\ntype Broken struct {\n\tName string\n",
    );
    let output: PathBuf = project.path().join("swagger.yaml");
    let mut args = args_for(project.path());
    args.output_path = Some(output.clone());

    let err = cli::run(args).expect_err("Malformed source must fail");

    let message = format!("{:#}", err);
    assert!(message.contains("broken.go"), "Unexpected error: {}", message);
    assert!(!output.exists());
}

#[test]
fn test_missing_services_directory() {
    let project = create_test_project(SHOP);
    let mut args = args_for(project.path());
    args.services_path = project.path().join("nope");

    assert!(cli::generate(&args).is_err());
}
