use crate::locator::{Locator, ProjectLayout};
use crate::model::{load_services, Service};
use crate::openapi_builder::{document_annotations, OpenApiBuilder, OpenApiDocument};
use crate::schema_generator::SchemaGenerator;
use crate::serializer::{serialize, serialize_model, write_to_file, Format};
use crate::type_resolver::TypeResolver;
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{debug, info, warn};
use std::path::PathBuf;

/// Default document file name inside the services directory
pub const DEFAULT_OUTPUT: &str = "swagger.yaml";

/// Go Service Generator - Build an OpenAPI document from annotated Go service interfaces
#[derive(Parser, Debug)]
#[command(name = "go-service-gen")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Go package declaring the service interfaces
    #[arg(value_name = "SERVICES_PATH")]
    pub services_path: PathBuf,

    /// Output file path (default: SERVICES_PATH/swagger.yaml)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Output format (by default chosen from the output file extension)
    #[arg(short = 'f', long = "format", value_enum)]
    pub output_format: Option<OutputFormat>,

    /// Module root holding go.mod (default: nearest ancestor with one)
    #[arg(long = "root", value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Vendor directory (default: ROOT/vendor)
    #[arg(long = "vendor", value_name = "DIR")]
    pub vendor: Option<PathBuf>,

    /// Only process the named interfaces, annotated or not
    #[arg(long = "iface", value_name = "NAME")]
    pub interfaces: Vec<String>,

    /// Also write the resolved service model as JSON
    #[arg(long = "model", value_name = "FILE")]
    pub model_path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Yaml => Format::Yaml,
            OutputFormat::Json => Format::Json,
        }
    }
}

impl CliArgs {
    pub fn output(&self) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| self.services_path.join(DEFAULT_OUTPUT))
    }

    pub fn format(&self) -> Format {
        self.output_format
            .map(Format::from)
            .unwrap_or_else(|| Format::from_path(&self.output()))
    }
}

/// Everything one run produces, before anything is written.
pub struct Generation {
    pub services: Vec<Service>,
    pub document: OpenApiDocument,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if !args.services_path.exists() {
        anyhow::bail!(
            "Services path does not exist: {}",
            args.services_path.display()
        );
    }

    if !args.services_path.is_dir() {
        anyhow::bail!(
            "Services path is not a directory: {}",
            args.services_path.display()
        );
    }

    if let Some(root) = &args.root {
        if !root.is_dir() {
            anyhow::bail!("Module root is not a directory: {}", root.display());
        }
    }

    info!("Services path: {}", args.services_path.display());
    info!("Output: {} ({:?})", args.output().display(), args.format());
    if !args.interfaces.is_empty() {
        info!("Interfaces: {}", args.interfaces.join(", "));
    }
    if let Some(model) = &args.model_path {
        info!("Model dump: {}", model.display());
    }

    Ok(args)
}

/// Resolves the services and builds the document without writing anything.
pub fn generate(args: &CliArgs) -> Result<Generation> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => ProjectLayout::find_root(&args.services_path).unwrap_or_else(|| {
            warn!(
                "No go.mod above {}, using it as the module root",
                args.services_path.display()
            );
            args.services_path.clone()
        }),
    };
    info!("Module root: {}", root.display());

    let mut layout = ProjectLayout::discover(&root)
        .with_context(|| format!("Failed to read module layout of {}", root.display()))?;
    if let Some(vendor) = &args.vendor {
        layout = layout.with_vendor_dir(vendor.clone());
    }

    let type_resolver = TypeResolver::new(Locator::new(layout));
    let mut schema_gen = SchemaGenerator::new(type_resolver);

    info!("Loading services...");
    let services = load_services(
        schema_gen.resolver_mut(),
        &args.services_path,
        &args.interfaces,
    )
    .with_context(|| format!("Failed to load services from {}", args.services_path.display()))?;

    if services.is_empty() {
        anyhow::bail!(
            "No service interfaces found in {}",
            args.services_path.display()
        );
    }

    info!("Building OpenAPI document...");
    let mut builder = OpenApiBuilder::new().with_annotations(&document_annotations(&services));
    for service in &services {
        builder
            .add_service(service, &mut schema_gen)
            .with_context(|| format!("Failed to document service {}", service.name))?;
    }

    info!(
        "Registered {} schemas, parsed {} files",
        schema_gen.registry().len(),
        schema_gen.resolver_mut().locator_mut().parsed_file_count()
    );
    let document = builder.build(schema_gen);

    Ok(Generation { services, document })
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting generation...");

    let generation = generate(&args)?;

    // Serialize everything before touching the filesystem
    let output = args.output();
    let format = args.format();
    info!("Serializing to {:?} format...", format);
    let content = serialize(&generation.document, format)?;
    let model = match &args.model_path {
        Some(path) => Some((path, serialize_model(&generation.services)?)),
        None => None,
    };

    write_to_file(&content, &output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!("Wrote OpenAPI document to {}", output.display());

    if let Some((path, model)) = model {
        write_to_file(&model, path).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote service model to {}", path.display());
    }

    info!("Generation complete!");
    info!("Summary:");
    info!("  - Services: {}", generation.services.len());
    info!(
        "  - Methods: {}",
        generation.services.iter().map(|s| s.methods.len()).sum::<usize>()
    );
    info!("  - Paths: {}", generation.document.paths.len());

    Ok(())
}
