//! T2WML CLI
//!
//! Usage:
//!   t2wml generate --sheet <CSV> --mapping <YAML> [--settings <TOML>]
//!   t2wml annotate --sheet <CSV> --annotation <JSON> [--evaluate]
//!   t2wml grammar

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use t2wml::{
    generate_yaml, Annotation, CachingProvider, CalendarPolicy, DictionaryProvider, KnowledgeGraph,
    MemorySheet, Session, Settings, StatementMapping,
};

#[derive(Parser)]
#[command(name = "t2wml")]
#[command(about = "Turn spreadsheet cells into knowledge graph statements")]
struct Cli {
    /// Settings file (TOML format)
    #[arg(short, long, global = true)]
    settings: Option<PathBuf>,

    /// Override the Ethiopian calendar policy
    #[arg(long, global = true, value_enum)]
    calendar: Option<CalendarPolicy>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a mapping over a sheet and print statements as JSON
    Generate {
        /// Sheet to read (CSV)
        #[arg(long)]
        sheet: PathBuf,
        /// Mapping document (YAML)
        #[arg(short, long)]
        mapping: PathBuf,
    },
    /// Infer a mapping from an annotation and print it
    Annotate {
        /// Sheet the annotation was drawn on (CSV)
        #[arg(long)]
        sheet: PathBuf,
        /// Annotation document (JSON)
        #[arg(short, long)]
        annotation: PathBuf,
        /// Also evaluate the generated mapping and print the statements
        #[arg(short, long)]
        evaluate: bool,
    },
    /// Show the expression language reference
    Grammar,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Command::Grammar = cli.command {
        print_grammar();
        return;
    }

    let mut settings = match &cli.settings {
        Some(path) => match Settings::from_file(path) {
            Ok(s) => s,
            Err(e) => fail(&format!("Error loading settings '{}': {}", path.display(), e)),
        },
        None => Settings::default(),
    };
    if let Some(policy) = cli.calendar {
        settings.generation.calendar_policy = policy;
    }

    let provider = CachingProvider::new(DictionaryProvider::new());
    if let Err(e) = settings.register_properties(&provider) {
        fail(&format!("Error registering properties: {}", e));
    }

    match &cli.command {
        Command::Generate { sheet, mapping } => {
            let sheet = load_sheet(sheet);
            let mapping = match StatementMapping::from_file(mapping) {
                Ok(m) => m,
                Err(e) => fail(&format!("Error loading mapping '{}': {}", mapping.display(), e)),
            };
            let session = Session::new(&sheet, &settings.items, &provider)
                .with_relations(&settings.items)
                .with_config(settings.generation.clone());
            print_graph(&mapping, &session);
        }
        Command::Annotate {
            sheet,
            annotation,
            evaluate,
        } => {
            let sheet = load_sheet(sheet);
            let source = read_file(annotation);
            let mut annotation = match Annotation::from_json(&source) {
                Ok(a) => a,
                Err(e) => fail(&format!("Error in annotation: {}", e)),
            };
            let yaml = match generate_yaml(&mut annotation, &settings.generation) {
                Ok(yaml) => yaml,
                Err(e) => fail(&format!("Error: {}", e)),
            };
            println!("{}", yaml);

            if *evaluate {
                let mapping = match StatementMapping::from_yaml(&yaml) {
                    Ok(m) => m,
                    Err(e) => fail(&format!("Generated mapping is incomplete: {}", e)),
                };
                let session = Session::new(&sheet, &settings.items, &provider)
                    .with_relations(&settings.items)
                    .with_config(settings.generation.clone());
                print_graph(&mapping, &session);
            }
        }
        Command::Grammar => {}
    }
}

fn print_graph(mapping: &StatementMapping, session: &Session<'_>) {
    let graph = match KnowledgeGraph::generate(mapping, session) {
        Ok(g) => g,
        Err(e) => fail(&format!("Error: {}", e)),
    };
    match graph.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => fail(&format!("Error serializing statements: {}", e)),
    }
}

fn load_sheet(path: &Path) -> MemorySheet {
    match MemorySheet::from_csv_file(path) {
        Ok(sheet) => sheet,
        Err(e) => fail(&format!("Error loading sheet '{}': {}", path.display(), e)),
    }
}

fn read_file(path: &Path) -> String {
    match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail(&format!("Error reading file '{}': {}", path.display(), e)),
    }
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn print_grammar() {
    println!(
        r#"T2WML EXPRESSION LANGUAGE
=========================

FIELDS
------
Q30                 Literal value
=value[B, $row]     Expression (leading '=')
/=5                 Literal that starts with '=' (prints "=5")

CELL ACCESS
-----------
value[col, row]             Cell text (columns are letters or numbers, 1-indexed)
item[col, row]              Entity looked up for the cell text
item[col, row, "context"]   Entity looked up within a context
value[B:D, $row]            Range (row-major)

VARIABLES
---------
$row $col       Cell being evaluated
$qrow $qcol     Cell of a qualifier region
$n              Searched: 0, 1, 2, ... until the expression is true
$end            Last column or row of the sheet
$sheet          Sheet name
$filename       Source file name
$left $right $top $bottom   Region boundaries (inside region definitions)

OPERATORS
---------
+ - * /   == != < <= > >=   and or not   cond -> value

FUNCTIONS
---------
contains starts_with ends_with instance_of      (true if any cell of a range matches)
substring regex replace_regex split_index extract_date
make_numeric strip lower upper title str
concat(values..., separator)

EXAMPLE
-------
value[A, $row - $n] != "" -> value[A, $row - $n]
    nearest non-empty cell above in column A"#
    );
}
