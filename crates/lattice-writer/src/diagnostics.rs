//! Ariadne-based diagnostic rendering for write errors.
//!
//! Renders `WriteError` values into formatted, labeled error messages over
//! the markup source. Output is terse, with one label per source position
//! involved; the aggregate unresolved-references error gets one label per
//! dangling reference.

use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

use crate::error::{WriteError, WriteErrorKind};
use lattice_common::Span;

// ── Error Codes ────────────────────────────────────────────────────────

/// Assign a unique error code to each WriteError kind.
pub fn error_code(kind: &WriteErrorKind) -> &'static str {
    match kind {
        WriteErrorKind::UnexpectedNode { .. } => "E0101",
        WriteErrorKind::DuplicateMember { .. } => "E0102",
        WriteErrorKind::DuplicateName { .. } => "E0103",
        WriteErrorKind::NoConstructor { .. } => "E0104",
        WriteErrorKind::DirectiveMisuse { .. } => "E0105",
        WriteErrorKind::UnsettableMember { .. } => "E0106",
        WriteErrorKind::Conversion { .. } => "E0107",
        WriteErrorKind::Runtime { .. } => "E0108",
        WriteErrorKind::UnresolvedReferences { .. } => "E0201",
    }
}

fn span_to_range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

// ── Main Rendering Function ────────────────────────────────────────────

/// Render a write error into a formatted diagnostic string using ariadne.
///
/// The output is colorless for consistent test snapshots.
pub fn render_diagnostic(error: &WriteError, source: &str, _filename: &str) -> String {
    let config = Config::default().with_color(false);
    let source_len = source.len();

    // Clamp a range to be valid and non-empty within source bounds.
    let clamp = |r: Range<usize>| -> Range<usize> {
        let s = r.start.min(source_len);
        let e = r.end.min(source_len).max(s);
        if s == e {
            s..e.saturating_add(1).min(source_len)
        } else {
            s..e
        }
    };

    let code = error_code(&error.kind);
    let span = clamp(span_to_range(error.span));

    let report = match &error.kind {
        WriteErrorKind::UnresolvedReferences { refs } => {
            let mut builder = Report::build(ReportKind::Error, span.clone())
                .with_code(code)
                .with_message(format!("{} unresolved forward reference(s)", refs.len()))
                .with_config(config);
            for r in refs {
                let range = clamp(span_to_range(r.span));
                builder.add_label(
                    Label::new(range)
                        .with_message(format!("`{}` never defined", r.names.join("`, `")))
                        .with_color(Color::Red),
                );
            }
            builder.set_help("every referenced name must be registered somewhere in the document");
            builder.finish()
        }
        WriteErrorKind::DuplicateMember { ty, member } => Report::build(ReportKind::Error, span.clone())
            .with_code(code)
            .with_message(format!("member `{member}` assigned twice on `{ty}`"))
            .with_config(config)
            .with_label(
                Label::new(span.clone())
                    .with_message("second assignment here")
                    .with_color(Color::Red),
            )
            .finish(),
        WriteErrorKind::DuplicateName { name } => Report::build(ReportKind::Error, span.clone())
            .with_code(code)
            .with_message(format!("name `{name}` registered twice"))
            .with_config(config)
            .with_label(
                Label::new(span.clone())
                    .with_message("second registration here")
                    .with_color(Color::Red),
            )
            .with_help("names are document-wide; pick a different one")
            .finish(),
        WriteErrorKind::NoConstructor { ty, reason } => Report::build(ReportKind::Error, span.clone())
            .with_code(code)
            .with_message(format!("cannot construct `{ty}`"))
            .with_config(config)
            .with_label(
                Label::new(span.clone())
                    .with_message(reason.clone())
                    .with_color(Color::Red),
            )
            .finish(),
        other => Report::build(ReportKind::Error, span.clone())
            .with_code(code)
            .with_message(other.to_string())
            .with_config(config)
            .with_label(
                Label::new(span.clone())
                    .with_message("here")
                    .with_color(Color::Red),
            )
            .finish(),
    };

    // Render to buffer without colors.
    let mut buf = Vec::new();
    let cache = Source::from(source);
    report.write(cache, &mut buf).expect("failed to write diagnostic");
    String::from_utf8(buf).expect("diagnostic output should be valid UTF-8")
}
