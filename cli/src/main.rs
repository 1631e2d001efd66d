mod test_runner;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};

use clap::{Parser, Subcommand};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use emboss::source::normalize;
use emboss::{DirectoryResolver, ImportResolver, TemplateError, TemplateSource};
use renderer::{Config, Emboss, Value};

#[derive(Parser)]
#[command(name = "emboss", version, about = "Emboss template compiler")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Log more (repeatable). RUST_LOG is respected.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile a template and render it against a data file
    Render(RenderArgs),

    /// Compile only (exit 0 if valid)
    Check(TemplateArgs),

    /// Print the block tree of a template
    Tree(TemplateArgs),

    /// Run .test.emboss test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct TemplateArgs {
    /// Template source file
    file: PathBuf,

    /// Directory imported templates are looked up in (default: the file's directory)
    #[arg(short, long)]
    templates: Option<PathBuf>,

    /// Template id used in error messages (default: the file stem)
    #[arg(long)]
    id: Option<String>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override a configuration key, e.g. `--set strict_scoping=false`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Let loop and context bindings leak into sibling content
    #[arg(long)]
    no_strict_scoping: bool,
}

#[derive(clap::Args)]
struct RenderArgs {
    #[command(flatten)]
    template: TemplateArgs,

    /// JSON or TOML (by extension) data context
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Write output here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.emboss file or directory containing them
    path: PathBuf,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let color_choice = if cli.no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    match cli.command {
        Command::Render(args) => do_render(args, color_choice),
        Command::Check(args) => {
            let session = Session::open(&args);
            if let Err(error) = session.emboss.compile(&session.source, Some(&session.id)) {
                session.report(&error, color_choice);
                process::exit(1);
            }
            eprintln!("ok: {} compiled successfully", args.file.display());
        }
        Command::Tree(args) => {
            let session = Session::open(&args);
            match session.emboss.parse(&session.source, Some(&session.id)) {
                Ok(forest) => print!("{}", forest.outline()),
                Err(error) => {
                    session.report(&error, color_choice);
                    process::exit(1);
                }
            }
        }
        Command::Test(args) => {
            if args.list_categories {
                test_runner::list_categories(&args.path);
                return;
            }
            let exit_code = test_runner::run_tests(&args.path, cli.no_color, &args.category);
            process::exit(exit_code);
        }
    }
}

fn do_render(args: RenderArgs, color_choice: ColorChoice) {
    let session = Session::open(&args.template);

    let data = match &args.data {
        Some(path) => match load_data(path) {
            Ok(data) => Some(data),
            Err(message) => fail(&message),
        },
        None => None,
    };

    let compiled = match session.emboss.compile(&session.source, Some(&session.id)) {
        Ok(compiled) => compiled,
        Err(error) => {
            session.report(&error, color_choice);
            process::exit(1);
        }
    };

    let output = match compiled.render(data.as_ref()) {
        Ok(output) => output,
        Err(error) => {
            session.report(&error, color_choice);
            process::exit(1);
        }
    };

    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, output) {
                fail(&format!("cannot write '{}': {}", path.display(), e));
            }
        }
        None => print!("{}", output),
    }
}

/// One template file plus everything needed to compile it and report
/// errors against the files involved.
struct Session {
    id: String,
    path: PathBuf,
    source: String,
    emboss: Emboss,
    imported: Arc<Mutex<BTreeMap<String, String>>>,
}

impl Session {
    fn open(args: &TemplateArgs) -> Session {
        let source = match std::fs::read_to_string(&args.file) {
            Ok(s) => s,
            Err(e) => fail(&format!("cannot read '{}': {}", args.file.display(), e)),
        };

        let mut config = match &args.config {
            Some(path) => Config::load_from_path(path).unwrap_or_else(|e| fail(&e.to_string())),
            None => Config::default(),
        };
        for entry in &args.overrides {
            let Some((key, value)) = entry.split_once('=') else {
                fail(&format!("--set expects KEY=VALUE, got '{}'", entry));
            };
            if let Err(e) = config.set(key.trim(), value) {
                fail(&e.to_string());
            }
        }
        if args.no_strict_scoping {
            config.strict_scoping = false;
        }

        let id = args.id.clone().unwrap_or_else(|| {
            args.file
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("template")
                .to_string()
        });
        let templates = args.templates.clone().unwrap_or_else(|| {
            args.file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        log::debug!("resolving imports of '{}' from {}", id, templates.display());

        let imported = Arc::new(Mutex::new(BTreeMap::new()));
        let resolver = Recording {
            inner: DirectoryResolver::new(templates),
            seen: Arc::clone(&imported),
        };

        Session {
            id,
            path: args.file.clone(),
            source,
            emboss: Emboss::with_config(config).with_resolver(resolver),
            imported,
        }
    }

    /// Print `error` as a diagnostic against the template it occurred in.
    fn report(&self, error: &TemplateError, color_choice: ColorChoice) {
        let mut files = SimpleFiles::new();
        let file_id = match error.template_id.as_deref() {
            Some(id) if id != self.id => {
                let imported = self.imported.lock().unwrap_or_else(PoisonError::into_inner);
                match imported.get(id) {
                    Some(text) => files.add(id.to_string(), normalize(text)),
                    None => files.add(id.to_string(), String::new()),
                }
            }
            _ => files.add(self.path.display().to_string(), normalize(&self.source)),
        };

        let writer = StandardStream::stderr(color_choice);
        let config = term::Config::default();
        let diagnostic = error.to_diagnostic(file_id);
        if term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic).is_err() {
            eprintln!("error: {}", error);
        }
    }
}

/// Directory lookup that keeps a copy of every source it hands out, so
/// diagnostics can point into imported templates.
struct Recording {
    inner: DirectoryResolver,
    seen: Arc<Mutex<BTreeMap<String, String>>>,
}

impl ImportResolver for Recording {
    fn resolve(&self, id: &str) -> Option<TemplateSource> {
        let source = self.inner.resolve(id)?;
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.insert(source.id.clone(), source.text.clone());
        Some(source)
    }
}

/// Read a data context: `.toml` files as TOML, anything else as JSON.
fn load_data(path: &Path) -> Result<Value, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read '{}': {}", path.display(), e))?;
    if path.extension().and_then(|e| e.to_str()) == Some("toml") {
        let table: toml::Value =
            toml::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(Value::from(table))
    } else {
        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| format!("{}: {}", path.display(), e))?;
        Ok(Value::from(json))
    }
}

fn fail(message: &str) -> ! {
    eprintln!("error: {}", message);
    process::exit(1);
}
