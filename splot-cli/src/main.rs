//! Splot CLI - serve, store and render pasted HTML documents

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use splot_core::{
    BlockId, Config, DocumentContext, DocumentId, Plugin, RenderContext, SplotEngine,
    StorageBackend,
};
use splot_interceptor::{
    classify, Classification, ClipboardPayload, EditorSurface, InterceptorPlugin, PasteEvent,
    PasteOutcome,
};
use splot_resolver::ResolverPlugin;
use splot_server::ServerPlugin;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the invocation asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Serve,
    Classify {
        file: PathBuf,
    },
    Store {
        document: u64,
        file: PathBuf,
        user: Option<String>,
        json: bool,
    },
    Render {
        document: u64,
        file: PathBuf,
    },
}

/// CLI arguments structure
#[derive(Debug, Clone)]
pub struct Args {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub config_file: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub dev_mode: bool,
    pub action: Action,
}

/// Machine-readable result of `splot store --json`
#[derive(Debug, Serialize)]
struct StoreReport {
    document: u64,
    block_id: BlockId,
    placeholder: String,
}

fn document_arg() -> Arg {
    Arg::new("document")
        .short('d')
        .long("document")
        .help("Id of the document the content belongs to")
        .long_help(
            "Positive integer id of the owning document. Blocks are stored on this \
            document and placeholders are resolved against it.",
        )
        .required(true)
        .value_parser(clap::value_parser!(u64))
}

fn file_arg(help: &'static str) -> Arg {
    Arg::new("file")
        .help(help)
        .required(true)
        .index(1)
        .value_parser(clap::value_parser!(PathBuf))
}

/// Build the command line definition
pub fn command() -> Command {
    Command::new("splot")
        .version("0.1.0")
        .about("Store pasted HTML documents and embed them as sandboxed frames")
        .long_about(
            "Splot swaps pasted full HTML documents for short placeholder tokens. \
            The document is stored out of band on its owning post and rendered back \
            as an isolated <iframe srcdoc> wherever the token appears.",
        )
        .arg(
            Arg::new("hostname")
                .short('H')
                .long("hostname")
                .global(true)
                .help("Hostname or IP address to bind the server to")
                .long_help(
                    "The hostname or IP address where the server will listen for connections. \
                    Use '0.0.0.0' to bind to all available interfaces. Defaults to the \
                    configuration file value, or '127.0.0.1'.",
                )
                .value_parser(clap::value_parser!(String)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .global(true)
                .help("Port number to bind the server to (1-65535)")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("Path to configuration file (JSON format)")
                .long_help(
                    "Path to a JSON configuration file with server, storage, embed and \
                    security sections. CLI arguments override settings from the file.",
                )
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("store-dir")
                .long("store-dir")
                .global(true)
                .help("Keep documents as JSON files in this directory")
                .long_help(
                    "Switch storage to the json_dir backend rooted at this directory. \
                    Without it documents live in memory and are lost on exit.",
                )
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dev-mode")
                .long("dev-mode")
                .global(true)
                .help("Enable development mode with debug logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(Command::new("serve").about("Run the HTTP service (default)"))
        .subcommand(
            Command::new("classify")
                .about("Report whether a file is a full HTML document or a fragment")
                .arg(file_arg("File to classify")),
        )
        .subcommand(
            Command::new("store")
                .about("Paste a file into a document and print its placeholder")
                .arg(document_arg())
                .arg(file_arg("HTML file to paste"))
                .arg(
                    Arg::new("user")
                        .short('u')
                        .long("user")
                        .help("Editor the store is performed as")
                        .value_parser(clap::value_parser!(String)),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print the result as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("render")
                .about("Expand placeholders in a file into embedded frames")
                .arg(document_arg())
                .arg(file_arg("Content containing placeholders")),
        )
        .after_help(
            "EXAMPLES:\n    \
            splot                                          Serve on 127.0.0.1:3000 with in-memory storage\n    \
            splot serve -p 8080 --store-dir ./data         Serve with documents kept on disk\n    \
            splot classify page.html                       Print full_document or fragment\n    \
            splot store -d 42 --store-dir ./data page.html Store a document, print its placeholder\n    \
            splot render -d 42 --store-dir ./data post.txt Expand placeholders found in post.txt",
        )
}

impl Args {
    /// Parse command line arguments
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    /// Build arguments from already parsed matches
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let action = match matches.subcommand() {
            Some(("classify", sub)) => Action::Classify {
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
            },
            Some(("store", sub)) => Action::Store {
                document: sub.get_one::<u64>("document").copied().unwrap_or_default(),
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
                user: sub.get_one::<String>("user").cloned(),
                json: sub.get_flag("json"),
            },
            Some(("render", sub)) => Action::Render {
                document: sub.get_one::<u64>("document").copied().unwrap_or_default(),
                file: sub.get_one::<PathBuf>("file").cloned().unwrap_or_default(),
            },
            _ => Action::Serve,
        };

        Self {
            hostname: matches.get_one::<String>("hostname").cloned(),
            port: matches.get_one::<u16>("port").copied(),
            config_file: matches.get_one::<PathBuf>("config").cloned(),
            store_dir: matches.get_one::<PathBuf>("store-dir").cloned(),
            dev_mode: matches.get_flag("dev-mode"),
            action,
        }
    }

    /// Validate the arguments with detailed error messages
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            bail!(
                "Port number cannot be 0.\n\n\
                Please specify a valid port number between 1 and 65535.\n\n\
                Example: splot serve -p 8080"
            );
        }

        if matches!(&self.hostname, Some(hostname) if hostname.is_empty()) {
            bail!(
                "Hostname cannot be empty.\n\n\
                Valid hostname examples:\n\
                - 127.0.0.1 (localhost only)\n\
                - 0.0.0.0 (all interfaces)"
            );
        }

        if let Some(config_file) = &self.config_file {
            if !config_file.is_file() {
                bail!(
                    "Configuration file not found: {}\n\n\
                    Example: splot --config splot.json serve",
                    config_file.display()
                );
            }
        }

        if let Some(store_dir) = &self.store_dir {
            if store_dir.exists() && !store_dir.is_dir() {
                bail!("Store path is not a directory: {}", store_dir.display());
            }
        }

        match &self.action {
            Action::Serve => {}
            Action::Classify { file } => check_input_file(file)?,
            Action::Store { document, file, .. } | Action::Render { document, file } => {
                if *document == 0 {
                    bail!("Document id must be a positive integer");
                }
                check_input_file(file)?;
            }
        }

        Ok(())
    }

    /// Load the configuration file, then apply CLI overrides
    pub fn load_config(&self) -> Result<Config> {
        let mut config = match &self.config_file {
            Some(config_file) => {
                info!("Loading configuration from: {}", config_file.display());
                Config::from_file(config_file).with_context(|| {
                    format!(
                        "Failed to load configuration file: {}",
                        config_file.display()
                    )
                })?
            }
            None => {
                debug!("Using default configuration");
                Config::new()
            }
        };

        if let Some(hostname) = &self.hostname {
            config.server.hostname = hostname.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(store_dir) = &self.store_dir {
            config.storage.backend = StorageBackend::JsonDir;
            config.storage.directory = Some(store_dir.clone());
        }

        // A stored paste needs its owning document to exist
        if let Action::Store { document, .. } = &self.action {
            if !config.storage.documents.contains(document) {
                config.storage.documents.push(*document);
            }
        }

        config.validate().context("Configuration validation failed")?;
        Ok(config)
    }
}

fn check_input_file(file: &Path) -> Result<()> {
    if !file.exists() {
        bail!("Input file not found: {}", file.display());
    }
    if file.is_dir() {
        bail!(
            "Path is a directory, not a file: {}\n\n\
            Please specify a file to read.",
            file.display()
        );
    }
    Ok(())
}

fn read_input(file: &Path) -> Result<String> {
    std::fs::read_to_string(file).with_context(|| format!("Cannot read file: {}", file.display()))
}

fn document_id(raw: u64) -> Result<DocumentId> {
    DocumentId::new(raw).context("Document id must be a positive integer")
}

async fn serve(config: Config) -> Result<()> {
    let address = format!("{}:{}", config.server.hostname, config.server.port);
    let store_path = config.server.store_path.clone();
    let mut engine = SplotEngine::new(config)
        .await
        .context("Failed to create splot engine")?;

    engine.register_plugin(Box::new(ResolverPlugin::new())).await?;
    engine.register_plugin(Box::new(InterceptorPlugin::new())).await?;
    engine.register_plugin(Box::new(ServerPlugin::new())).await?;

    for plugin in engine.plugin_registry().list_plugins() {
        info!("Loaded plugin {} v{}", plugin.name, plugin.version);
    }

    println!("Splot listening on http://{}", address);
    println!("Store endpoint: {}", store_path);
    println!("Press Ctrl+C to stop.");
    info!("Splot server started on {}", address);

    engine.run().await?;
    Ok(())
}

fn classification_label(classification: Classification) -> &'static str {
    match classification {
        Classification::FullDocument => "full_document",
        Classification::Fragment => "fragment",
    }
}

async fn store(
    config: Config,
    raw_document: u64,
    html: String,
    user: Option<String>,
) -> Result<StoreReport> {
    if config.storage.backend == StorageBackend::Memory {
        warn!(
            "Storing into the in-memory backend, the block is lost on exit; \
            pass --store-dir to keep it"
        );
    }

    let document = document_id(raw_document)?;
    let mut engine = SplotEngine::new(config).await?;

    let mut plugin = InterceptorPlugin::new();
    plugin.initialize(engine.context()).await?;
    let mut interceptor =
        plugin.create_interceptor(DocumentContext::for_document(document), user)?;

    let mut surface = EditorSurface::plain_input("splot-cli", "");
    interceptor.on_surface_available(&surface).await;

    let mut event = PasteEvent::new(ClipboardPayload::html(html));
    let outcome = interceptor.handle_paste(&mut surface, &mut event).await;

    plugin.shutdown().await?;
    engine.shutdown().await?;

    match outcome {
        PasteOutcome::Inserted {
            block_id,
            placeholder,
        } => Ok(StoreReport {
            document: document.get(),
            block_id,
            placeholder,
        }),
        PasteOutcome::PassedThrough => {
            bail!("Input is not a full HTML document (it needs both <head> and <body>)")
        }
        PasteOutcome::Dropped => bail!("No document id available, nothing stored"),
        PasteOutcome::NotInserted { block_id } => {
            bail!("Block {} stored but the placeholder could not be placed", block_id)
        }
        PasteOutcome::Failed { reason } => bail!("Store failed: {}", reason),
    }
}

async fn render(config: Config, raw_document: u64, content: &str) -> Result<String> {
    let document = document_id(raw_document)?;
    let mut engine = SplotEngine::new(config).await?;
    engine.register_plugin(Box::new(ResolverPlugin::new())).await?;

    let context = RenderContext::new(Some(document));
    let result = engine
        .context()
        .renderers
        .render_content(content, &context)
        .await;

    engine.shutdown().await?;
    Ok(result?.html)
}

fn init_logging(dev_mode: bool) {
    let level = if dev_mode { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(dev_mode)
        .with_line_number(dev_mode)
        .with_file(dev_mode);

    if dev_mode {
        subscriber.pretty().init();
        info!("Development mode enabled");
    } else {
        subscriber.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.dev_mode);

    if let Err(e) = args.validate() {
        eprintln!("Invalid arguments:\n{:#}", e);
        std::process::exit(1);
    }

    if let Action::Classify { file } = &args.action {
        let text = read_input(file)?;
        println!("{}", classification_label(classify(&text)));
        return Ok(());
    }

    let config = args.load_config()?;

    match args.action.clone() {
        Action::Serve => serve(config).await,
        Action::Classify { .. } => Ok(()),
        Action::Store {
            document,
            file,
            user,
            json,
        } => {
            let report = store(config, document, read_input(&file)?, user).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.placeholder);
            }
            Ok(())
        }
        Action::Render { document, file } => {
            let html = render(config, document, &read_input(&file)?).await?;
            println!("{}", html);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PAGE: &str = "<html><head><title>t</title></head><body>\"hi\" & bye</body></html>";

    fn args(argv: &[&str]) -> Args {
        Args::from_matches(&command().try_get_matches_from(argv).unwrap())
    }

    #[test]
    fn test_defaults_to_serve() {
        let parsed = args(&["splot"]);
        assert_eq!(parsed.action, Action::Serve);
        assert_eq!(parsed.port, None);
        assert!(!parsed.dev_mode);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let parsed = args(&[
            "splot",
            "store",
            "-d",
            "7",
            "page.html",
            "--store-dir",
            "data",
            "-p",
            "9000",
        ]);
        assert_eq!(parsed.port, Some(9000));
        assert_eq!(parsed.store_dir, Some(PathBuf::from("data")));
        assert_eq!(
            parsed.action,
            Action::Store {
                document: 7,
                file: PathBuf::from("page.html"),
                user: None,
                json: false,
            }
        );
    }

    #[test]
    fn test_store_requires_document() {
        assert!(command()
            .try_get_matches_from(["splot", "store", "page.html"])
            .is_err());
    }

    #[test]
    fn test_validate_rejects_missing_input_and_zero_document() {
        let missing = args(&["splot", "classify", "/definitely/not/here.html"]);
        assert!(missing.validate().is_err());

        let temp = TempDir::new().unwrap();
        let file = temp.path().join("page.html");
        std::fs::write(&file, PAGE).unwrap();
        let zero = args(&["splot", "render", "-d", "0", file.to_str().unwrap()]);
        assert!(zero.validate().is_err());

        let bad_port = args(&["splot", "-p", "0"]);
        assert!(bad_port.validate().is_err());
    }

    #[test]
    fn test_cli_overrides_config_file() {
        let temp = TempDir::new().unwrap();
        let config_path = temp.path().join("splot.json");
        std::fs::write(
            &config_path,
            r#"{"server": {"hostname": "0.0.0.0", "port": 4000}}"#,
        )
        .unwrap();

        let parsed = args(&[
            "splot",
            "--config",
            config_path.to_str().unwrap(),
            "-p",
            "5000",
        ]);
        let config = parsed.load_config().unwrap();
        assert_eq!(config.server.hostname, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_store_seeds_its_document() {
        let temp = TempDir::new().unwrap();
        let parsed = args(&[
            "splot",
            "store",
            "-d",
            "12",
            "page.html",
            "--store-dir",
            temp.path().to_str().unwrap(),
        ]);
        let config = parsed.load_config().unwrap();
        assert_eq!(config.storage.backend, StorageBackend::JsonDir);
        assert_eq!(config.storage.documents, vec![12]);
    }

    #[test]
    fn test_classification_labels() {
        assert_eq!(classification_label(classify(PAGE)), "full_document");
        assert_eq!(classification_label(classify("<p>hi</p>")), "fragment");
    }

    #[tokio::test]
    async fn test_store_then_render_through_disk() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.backend = StorageBackend::JsonDir;
        config.storage.directory = Some(temp.path().to_path_buf());
        config.storage.documents = vec![42];

        let report = store(config.clone(), 42, PAGE.to_string(), None)
            .await
            .unwrap();
        assert_eq!(report.document, 42);
        assert!(report.placeholder.starts_with("[placeholder id=\""));

        let post = format!("before {} after", report.placeholder);
        let html = render(config, 42, &post).await.unwrap();
        assert!(html.starts_with("before <iframe srcdoc=\""));
        assert!(html.contains("&quot;hi&quot; &amp; bye"));
        assert!(html.ends_with("</iframe> after"));
    }

    #[tokio::test]
    async fn test_store_rejects_fragment() {
        let mut config = Config::default();
        config.storage.documents = vec![3];
        let err = store(config, 3, "<p>not a page</p>".to_string(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not a full HTML document"));
    }
}
