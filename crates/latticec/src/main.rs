//! The Lattice object-graph builder CLI.
//!
//! Provides the `latticec` command with the following subcommands:
//!
//! - `latticec build <file.ltn>` - Construct the object graph and emit it as JSON
//! - `latticec check <file.ltn>` - Construct the graph, report errors, emit nothing
//!
//! Options:
//! - `--schema` - Schema file (TOML); the built-in demo schema when absent
//! - `--output` - Write the graph JSON to a file instead of stdout
//! - `--json` - Output diagnostics as JSON (one object per line)

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use lattice_common::LineIndex;
use lattice_writer::diagnostics::{error_code, render_diagnostic};
use lattice_writer::{ObjectWriter, WriteError, WriteErrorKind};

mod schema;
mod script;

#[derive(Parser)]
#[command(name = "latticec", version, about = "The Lattice object-graph builder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Construct the object graph from a node script and emit it as JSON
    Build {
        /// Path to the .ltn node script
        file: PathBuf,

        /// Schema file (TOML); the built-in demo schema when absent
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Write the graph JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output diagnostics as JSON (one object per line) instead of human-readable format
        #[arg(long)]
        json: bool,
    },
    /// Construct the graph and report errors without emitting it
    Check {
        /// Path to the .ltn node script
        file: PathBuf,

        /// Schema file (TOML); the built-in demo schema when absent
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Output diagnostics as JSON (one object per line) instead of human-readable format
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let (file, schema_path, output, json, emit) = match cli.command {
        Commands::Build { file, schema, output, json } => (file, schema, output, json, true),
        Commands::Check { file, schema, json } => (file, schema, None, json, false),
    };

    if let Err(e) = run(&file, schema_path.as_deref(), output.as_deref(), json, emit) {
        if json {
            // In JSON mode, emit the final error as JSON too.
            let msg = serde_json::json!({
                "code": "C0001",
                "severity": "error",
                "message": e,
                "file": file.display().to_string(),
                "spans": [],
            });
            eprintln!("{}", msg);
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

/// Execute the pipeline: load schema -> parse script -> write nodes -> dump.
fn run(
    file: &Path,
    schema_path: Option<&Path>,
    output: Option<&Path>,
    json: bool,
    emit: bool,
) -> Result<(), String> {
    let source = std::fs::read_to_string(file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;

    let loaded = match schema_path {
        Some(path) => schema::from_file(path)?,
        None => schema::built_in(),
    };

    let nodes = match script::parse(&source, &loaded.schema, &loaded.default_namespace) {
        Ok(nodes) => nodes,
        Err(err) => {
            report_script_error(&err, &source, file, json);
            return Err("Parsing failed due to errors above.".to_string());
        }
    };

    let mut runtime = loaded.runtime();
    let mut writer = ObjectWriter::new(&loaded.schema, &mut runtime);
    let result = writer
        .write_all(nodes)
        .and_then(|()| writer.close());
    let root = match result {
        Ok(root) => root,
        Err(err) => {
            report_write_error(&err, &source, file, json);
            return Err("Construction failed due to errors above.".to_string());
        }
    };

    if emit {
        let graph = runtime.dump(&root);
        let rendered = serde_json::to_string_pretty(&graph)
            .map_err(|e| format!("Failed to serialize graph: {}", e))?;
        match output {
            Some(path) => {
                std::fs::write(path, rendered)
                    .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
                eprintln!("  Built: {}", path.display());
            }
            None => println!("{}", rendered),
        }
    } else {
        eprintln!("  Checked: {}", file.display());
    }

    Ok(())
}

/// Report a script parse error.
///
/// When `json` is true, outputs one JSON object to stderr. Otherwise,
/// outputs a human-readable ariadne diagnostic.
fn report_script_error(err: &script::ScriptError, source: &str, path: &Path, json: bool) {
    let file_name = path.display().to_string();
    let start = err.span.start as usize;
    let end = (err.span.end as usize).max(start + 1);
    if json {
        let index = LineIndex::new(source);
        let (line, _) = index.line_col(err.span.start);
        let json_diag = serde_json::json!({
            "code": "P0001",
            "severity": "error",
            "message": format!("Script error: {}", err.message),
            "file": file_name,
            "spans": [{
                "start": start,
                "end": end,
                "line": line,
                "label": err.message,
            }],
        });
        eprintln!("{}", json_diag);
    } else {
        use ariadne::{Config, Label, Report, ReportKind, Source};
        let config = Config::default().with_color(false);
        let _ = Report::<std::ops::Range<usize>>::build(ReportKind::Error, start..end)
            .with_message("Script error")
            .with_config(config)
            .with_label(Label::new(start..end).with_message(&err.message))
            .finish()
            .eprint(Source::from(source));
    }
}

/// Report a construction error.
///
/// The unresolved-references aggregate gets one JSON span per dangling
/// reference; everything else gets the error's own span.
fn report_write_error(err: &WriteError, source: &str, path: &Path, json: bool) {
    let file_name = path.display().to_string();
    if !json {
        eprint!("{}", render_diagnostic(err, source, &file_name));
        return;
    }
    let index = LineIndex::new(source);
    let span_entry = |span: lattice_common::Span, label: String| {
        let start = span.start as usize;
        let end = (span.end as usize).max(start + 1);
        let (line, _) = index.line_col(span.start);
        serde_json::json!({ "start": start, "end": end, "line": line, "label": label })
    };
    let spans = match &err.kind {
        WriteErrorKind::UnresolvedReferences { refs } => refs
            .iter()
            .map(|r| span_entry(r.span, format!("`{}` never defined", r.names.join("`, `"))))
            .collect::<Vec<_>>(),
        other => vec![span_entry(err.span, other.to_string())],
    };
    let json_diag = serde_json::json!({
        "code": error_code(&err.kind),
        "severity": "error",
        "message": err.to_string(),
        "file": file_name,
        "spans": spans,
    });
    eprintln!("{}", json_diag);
}
