//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, IsTerminal, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
///
/// - `table`: uses the `Tabled` derive to build a pretty table
/// - `json` / `json-compact`: serializes the original data via serde
/// - `yaml`: serializes via serde_yaml
/// - `plain`: calls `id_fn` on each item to emit one identifier per line
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Ok(render_table(&rows))
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(data.iter().map(&id_fn).collect::<Vec<_>>().join("\n")),
    }
}

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses `detail_fn`, since detail views are key/value
/// tables rather than one row per item.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(id_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

/// Two-column `Field │ Value` table for detail views.
pub fn render_fields<'a>(fields: impl IntoIterator<Item = (&'a str, String)>) -> String {
    #[derive(Tabled)]
    struct FieldRow {
        #[tabled(rename = "Field")]
        field: String,
        #[tabled(rename = "Value")]
        value: String,
    }

    let rows: Vec<FieldRow> = fields
        .into_iter()
        .map(|(field, value)| FieldRow {
            field: field.to_owned(),
            value,
        })
        .collect();
    render_table(&rows)
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(rendered)
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[derive(serde::Serialize)]
    struct Item {
        sn: String,
    }

    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Serial")]
        sn: String,
    }

    fn items() -> Vec<Item> {
        vec![
            Item { sn: "R331ZEB4ZEAL0528".into() },
            Item { sn: "HW52ZDH4SF123456".into() },
        ]
    }

    #[test]
    fn plain_lists_one_identifier_per_line() {
        let out = render_list(
            OutputFormat::Plain,
            &items(),
            |i| ItemRow { sn: i.sn.clone() },
            |i| i.sn.clone(),
        )
        .unwrap();
        assert_eq!(out, "R331ZEB4ZEAL0528\nHW52ZDH4SF123456");
    }

    #[test]
    fn table_has_header_and_rows() {
        let out = render_list(
            OutputFormat::Table,
            &items(),
            |i| ItemRow { sn: i.sn.clone() },
            |i| i.sn.clone(),
        )
        .unwrap();
        assert!(out.contains("Serial"));
        assert!(out.contains("HW52ZDH4SF123456"));
    }

    #[test]
    fn compact_json_is_single_line() {
        let out = render_list(
            OutputFormat::JsonCompact,
            &items(),
            |i| ItemRow { sn: i.sn.clone() },
            |i| i.sn.clone(),
        )
        .unwrap();
        assert_eq!(
            out,
            r#"[{"sn":"R331ZEB4ZEAL0528"},{"sn":"HW52ZDH4SF123456"}]"#
        );
    }

    #[test]
    fn fields_render_as_two_columns() {
        let out = render_fields([("Battery", "87%".to_string())]);
        assert!(out.contains("Field"));
        assert!(out.contains("87%"));
    }
}
