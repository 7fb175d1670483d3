mod error;
mod stack;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::LevelFilter;
use serde_json::{Map, Value};
use similar::{ChangeTag, TextDiff};

use cfport_core::input::DataSourceDeclaration;
use cfport_core::resolver::{DependencyResolver, ResolutionReport};
use cfport_core::template::Template;
use cfport_provider_aws::{load_traits, pseudo_parameter_declarations};
use cfport_state::{LocalBackend, StateBackend, resolve_dependencies};

use crate::error::{CliError, CliResult};
use crate::stack::StackDescription;

#[derive(Parser)]
#[command(name = "cfport")]
#[command(about = "Rewrite imported CloudFormation resources into Terraform references", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace deployed values in a Terraform state with references
    Resolve {
        /// CloudFormation template (JSON or YAML)
        template: PathBuf,

        /// Stack description (JSON)
        stack: PathBuf,

        /// Terraform state file
        #[arg(default_value = LocalBackend::DEFAULT_STATE_FILE)]
        state: PathBuf,

        /// Write the resolved state here instead of in place
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Schema traits file replacing the built-in one
        #[arg(long)]
        traits: Option<PathBuf>,

        /// Show a diff of the state changes
        #[arg(long)]
        diff: bool,

        /// Write the data blocks the references need as Terraform JSON
        #[arg(long)]
        declarations: Option<PathBuf>,
    },
    /// Print the references written into a resolved state
    Render {
        /// Terraform state file
        #[arg(default_value = LocalBackend::DEFAULT_STATE_FILE)]
        state: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Resolve {
            template,
            stack,
            state,
            output,
            traits,
            diff,
            declarations,
        } => {
            let options = ResolveOptions {
                output,
                traits,
                diff,
                declarations,
            };
            run_resolve(&template, &stack, &state, &options).await
        }
        Commands::Render { state } => run_render(&state).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    // RUST_LOG still wins when set
    builder.parse_default_env();
    builder.init();
}

struct ResolveOptions {
    output: Option<PathBuf>,
    traits: Option<PathBuf>,
    diff: bool,
    declarations: Option<PathBuf>,
}

async fn run_resolve(
    template_path: &Path,
    stack_path: &Path,
    state_path: &Path,
    options: &ResolveOptions,
) -> CliResult<()> {
    let text = fs::read_to_string(template_path).map_err(|source| CliError::Read {
        path: template_path.to_path_buf(),
        source,
    })?;
    let template = Template::from_str_auto(&text)?;
    let stack = StackDescription::load(stack_path)?;
    let template = stack.apply_conditions(template);

    let backend = LocalBackend::with_path(state_path.to_path_buf());
    let mut state = backend.require_state().await?;
    let before = serde_json::to_string_pretty(&state)?;

    let traits = load_traits(options.traits.as_deref())?;
    let catalog = stack.catalog(&state);
    let inputs = stack.inputs(&template);
    let snapshot = state.attribute_snapshot();

    let resolver =
        DependencyResolver::new(&template, &catalog, &traits, &inputs, &snapshot).with_facts(stack.facts());
    let report = resolve_dependencies(&mut state, &resolver);

    print_report(&report);

    let modified = report.modification_count() > 0;
    if modified {
        state.increment_serial();
    }

    if options.diff {
        print_diff(state_path, &before, &serde_json::to_string_pretty(&state)?);
    }

    let output_backend = match &options.output {
        Some(path) => LocalBackend::with_path(path.clone()).with_backup(false),
        None => backend,
    };
    if modified || options.output.is_some() {
        output_backend.write_state(&state).await?;
        println!(
            "{} Wrote {} to {}",
            "✓".green(),
            pluralize(report.modification_count(), "reference"),
            output_backend.describe()
        );
    } else {
        println!("No references to write.");
    }

    if let Some(path) = &options.declarations {
        let document = declarations_document(&report);
        let content = serde_json::to_string_pretty(&document)?;
        fs::write(path, content).map_err(|source| CliError::Write {
            path: path.clone(),
            source,
        })?;
        println!("{} Wrote data declarations to {}", "✓".green(), path.display());
    }

    if !report.errors.is_empty() {
        return Err(CliError::Unresolved(pluralize(report.errors.len(), "resource")));
    }
    Ok(())
}

async fn run_render(state_path: &Path) -> CliResult<()> {
    let backend = LocalBackend::with_path(state_path.to_path_buf());
    let state = backend.require_state().await?;
    let tokens = state.references()?;

    if tokens.is_empty() {
        println!("No references in {}.", backend.describe());
        return Ok(());
    }
    for token in tokens {
        println!(
            "{}.{} = {}",
            token.address.cyan(),
            token.path,
            token.reference.expression().bold()
        );
    }
    Ok(())
}

fn print_report(report: &ResolutionReport) {
    for resolution in &report.resolutions {
        for warning in &resolution.warnings {
            eprintln!("{} {}", "Warning:".yellow().bold(), warning);
        }
    }
    for error in &report.errors {
        eprintln!("{} {}", "Error:".red().bold(), error);
    }

    for resolution in report.resolutions.iter().filter(|r| r.modifications > 0) {
        println!(
            "  {} {}: {}",
            "~".yellow(),
            resolution.resource,
            pluralize(resolution.modifications, "reference")
        );
    }
}

/// Terraform JSON configuration declaring every data block the references read
fn declarations_document(report: &ResolutionReport) -> Value {
    let pseudo = pseudo_parameter_declarations()
        .into_iter()
        .filter(|d| report.data_blocks.contains(&d.address()));

    let mut data: Map<String, Value> = Map::new();
    for declaration in pseudo.chain(report.data_sources.iter().cloned()) {
        insert_declaration(&mut data, &declaration);
    }

    let mut document = Map::new();
    document.insert("data".to_string(), Value::Object(data));
    Value::Object(document)
}

fn insert_declaration(data: &mut Map<String, Value>, declaration: &DataSourceDeclaration) {
    let arguments: Map<String, Value> = declaration
        .arguments
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    let blocks = data
        .entry(declaration.data_type.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(blocks) = blocks {
        blocks.insert(declaration.name.clone(), Value::Object(arguments));
    }
}

fn pluralize(count: usize, noun: &str) -> String {
    match count {
        1 => format!("1 {}", noun),
        n => format!("{} {}s", n, noun),
    }
}

fn print_diff(path: &Path, original: &str, resolved: &str) {
    println!("{}", format!("--- {}", path.display()).red());
    println!("{}", format!("+++ {} (resolved)", path.display()).green());

    let diff = TextDiff::from_lines(original, resolved);
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-".red(),
            ChangeTag::Insert => "+".green(),
            ChangeTag::Equal => continue,
        };
        print!("{}{}", sign, change);
    }
}
