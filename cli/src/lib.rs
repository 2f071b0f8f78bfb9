use anyhow::{anyhow, Error, Result};
use clap::{Parser, Subcommand};
use datamodel::api::ModelApi;
use datamodel::config::Config;
use datamodel::consts::{ONTOLOGY, TYPE};
use datamodel::util::{format_from_name, read_file};
use datamodel::ToUriString;
use log::info;
use oxigraph::io::RdfFormat;
use oxigraph::model::{NamedNode, NamedOrBlankNode, TermRef};
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "datamodel")]
#[command(about = "Data model graph inspection and schema export")]
#[command(arg_required_else_help = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Verbose mode - sets the RUST_LOG level to info, defaults to warning level
    #[clap(long, short, action, default_value = "false", global = true)]
    verbose: bool,
    /// Debug mode - sets the RUST_LOG level to debug, defaults to warning level
    #[clap(long, action, default_value = "false", global = true)]
    debug: bool,
    /// JSON configuration file; defaults are used when omitted
    #[clap(long, short, global = true)]
    config: Option<PathBuf>,
    /// Offline mode - namespaces are never fetched from the web
    #[clap(long, short, action, default_value = "false", global = true)]
    offline: bool,
    /// RDF files loaded into the core store before the command runs. Each file must describe
    /// exactly one owl:Ontology, which names the model graph.
    #[clap(long, num_args = 1.., global = true)]
    load: Vec<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration.
    Show {
        /// Print as JSON
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Write the default configuration to a file.
    Init {
        /// Destination file
        path: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the JSON Schema of a model or class
    Schema {
        /// Model namespace or class IRI
        iri: String,
        /// Language of titles and descriptions; all languages when omitted
        #[clap(long, short)]
        lang: Option<String>,
    },
    /// Print the OpenAPI document of a model
    Openapi {
        model: String,
        #[clap(long, short)]
        lang: Option<String>,
    },
    /// Serialize the Export graph of a model
    Export {
        model: String,
        /// turtle, ntriples, rdfxml, jsonld or a media type
        #[clap(long, short, default_value = "turtle")]
        format: String,
        /// Write to a file instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Search resources by a literal substring
    Search {
        term: String,
        /// Restrict to one model
        #[clap(long, short)]
        model: Option<String>,
        #[clap(long, short)]
        lang: Option<String>,
    },
    /// Print the SPARQL update that removes a model and all its graphs
    RemoveQuery { model: String },
    /// Rebuild the HasPart and Export graphs of a model from the resource graphs
    Reconcile {
        model: String,
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Report inconsistencies between a model and its derived graphs
    Doctor {
        model: String,
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Print the version history of a resource
    History {
        resource: String,
        #[clap(long, action, default_value = "false")]
        json: bool,
    },
    /// Resolve an external namespace into the imports store
    Resolve { namespace: String },
    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

pub fn run() -> Result<()> {
    datamodel::api::init_logging();
    let cmd = Cli::parse();
    execute(cmd)
}

pub fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    datamodel::api::init_logging();
    let cmd = Cli::try_parse_from(args).map_err(Error::from)?;
    execute(cmd)
}

fn iri(value: &str) -> Result<NamedNode> {
    NamedNode::new(value).map_err(|e| anyhow!("Invalid IRI {value}: {e}"))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Puts each file into the core store under the IRI of the ontology it describes.
fn load_files(api: &ModelApi, files: &[PathBuf]) -> Result<()> {
    for file in files {
        let graph = read_file(file)?;
        let models: Vec<NamedNode> = graph
            .subjects_for_predicate_object(TYPE, TermRef::from(ONTOLOGY))
            .filter_map(|s| match s.into_owned() {
                NamedOrBlankNode::NamedNode(n) => Some(n),
                _ => None,
            })
            .collect();
        let model = match models.as_slice() {
            [model] => model.clone(),
            [] => return Err(anyhow!("{} does not describe an owl:Ontology", file.display())),
            _ => {
                return Err(anyhow!(
                    "{} describes {} ontologies, expected one",
                    file.display(),
                    models.len()
                ))
            }
        };
        api.stores().core.put_graph(model.as_ref(), &graph)?;
        api.reconcile(model.as_ref())?;
        info!("Loaded {} as {}", file.display(), model.to_uri_string());
    }
    Ok(())
}

fn handle_config_command(config_cmd: ConfigCommands, config: &Config) -> Result<()> {
    match config_cmd {
        ConfigCommands::Show { json } => {
            if json {
                print_json(config)?;
            } else {
                config.print();
            }
        }
        ConfigCommands::Init { path } => {
            if path.exists() {
                return Err(anyhow!("{} already exists", path.display()));
            }
            Config::default().save_to_file(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

fn execute(cmd: Cli) -> Result<()> {
    // The RUST_LOG env var is set by `init_logging` if DATAMODEL_LOG is present.
    // CLI flags for verbosity take precedence. If nothing is set, we default to "warn".
    if cmd.debug {
        std::env::set_var("RUST_LOG", "debug");
    } else if cmd.verbose {
        std::env::set_var("RUST_LOG", "info");
    } else if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    let _ = env_logger::try_init();

    let mut config = match &cmd.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    if cmd.offline {
        config.offline = true;
    }
    if cmd.verbose || cmd.debug {
        config.print();
    }

    let command = match cmd.command {
        Commands::Config(config_cmd) => return handle_config_command(config_cmd, &config),
        other => other,
    };

    let api = ModelApi::new(config)?;
    load_files(&api, &cmd.load)?;

    let result = run_command(&api, command);
    api.shutdown();
    result
}

fn run_command(api: &ModelApi, command: Commands) -> Result<()> {
    match command {
        Commands::Schema { iri: target, lang } => {
            let target = iri(&target)?;
            print_json(&api.export_schema(target.as_ref(), lang.as_deref())?)?;
        }
        Commands::Openapi { model, lang } => {
            let model = iri(&model)?;
            print_json(&api.export_openapi(model.as_ref(), lang.as_deref())?)?;
        }
        Commands::Export {
            model,
            format,
            output,
        } => {
            let model = iri(&model)?;
            let format: RdfFormat =
                format_from_name(&format).ok_or_else(|| anyhow!("Unknown format {format}"))?;
            let bytes = api.export_graph(model.as_ref(), format)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &bytes)?;
                    println!("Wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
        Commands::Search { term, model, lang } => {
            let model = model.as_deref().map(iri).transpose()?;
            let graph = api.search(
                model.as_ref().map(|m| m.as_ref()),
                &term,
                lang.as_deref(),
            )?;
            let bytes = datamodel::util::serialize_graph(
                &graph,
                RdfFormat::Turtle,
                api.queries().prefixes(),
            )?;
            std::io::stdout().write_all(&bytes)?;
        }
        Commands::RemoveQuery { model } => {
            let model = iri(&model)?;
            println!("{}", api.remove_model_query(model.as_ref())?.as_str());
        }
        Commands::Reconcile { model, json } => {
            let model = iri(&model)?;
            let report = api.reconcile(model.as_ref())?;
            if json {
                print_json(&report)?;
            } else if report.is_clean() {
                println!("{} is consistent", model.to_uri_string());
            } else {
                println!("Reconciled {}", model.to_uri_string());
                for added in &report.added {
                    println!("  added to HasPart: {added}");
                }
                for removed in &report.removed {
                    println!("  removed from HasPart: {removed}");
                }
                println!(
                    "  export: {} -> {}",
                    report.export_before.as_deref().unwrap_or("<none>"),
                    report.export_after
                );
            }
        }
        Commands::Doctor { model, json } => {
            let model = iri(&model)?;
            let problems = api.doctor(model.as_ref())?;
            if json {
                print_json(&problems)?;
            } else if problems.is_empty() {
                println!("No issues found.");
            } else {
                println!("Found {} issues:", problems.len());
                for problem in problems {
                    println!("- [{}] {}", problem.check, problem.message);
                    for resource in problem.resources {
                        println!("    {resource}");
                    }
                }
            }
        }
        Commands::History { resource, json } => {
            let resource = iri(&resource)?;
            let history = api.history(resource.as_ref())?;
            if json {
                print_json(&history)?;
            } else if history.is_empty() {
                println!("No recorded versions of {}", resource.to_uri_string());
            } else {
                for entry in history {
                    println!(
                        "{}  {}  {}",
                        entry.time.to_rfc3339(),
                        entry.id,
                        entry.actor.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        Commands::Resolve { namespace } => {
            let resolution = api.resolve_namespace(&namespace)?;
            println!("{namespace}: {resolution}");
            if !resolution.is_resolved() {
                return Err(anyhow!("Could not resolve {namespace}"));
            }
        }
        Commands::Config(config_cmd) => handle_config_command(config_cmd, api.config())?,
    }
    Ok(())
}
