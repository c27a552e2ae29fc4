use super::args::*;
use serde_json::Value;
use sqlroute_core::config::{load_config, write_sample_config};
use sqlroute_core::model::Row;
use sqlroute_core::{RouteError, Router};

pub mod ask;
pub mod doctor;
pub mod history;
pub mod schema;
pub mod train;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const ROUTE_ERROR: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Ask(args) => ask::run(args).await,
        Command::History(args) => history::run(args),
        Command::Train(args) => train::cmd_train(args),
        Command::Import(args) => train::cmd_import(args),
        Command::Schema(args) => schema::run(args),
        Command::Doctor(args) => doctor::run(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if write_sample_config(&args.config)? {
        eprintln!("created {}", args.config.display());
    } else {
        eprintln!("note: {} already exists", args.config.display());
    }
    Ok(exit_codes::OK)
}

/// Loads config and wires the router. Any failure here is a startup error.
pub(crate) fn open_router(cfg: &ConfigArgs) -> anyhow::Result<Router> {
    let config = load_config(&cfg.config, cfg.strict)
        .map_err(|e| anyhow::anyhow!("config error: {}", e))?;
    Ok(Router::from_config(&config)?)
}

pub(crate) fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn report_route_error(err: &RouteError, format: OutputFormat) -> anyhow::Result<i32> {
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "error": err.to_json() }))?,
        OutputFormat::Text => eprintln!("error [{}]: {}", err.kind.code(), err.message),
    }
    Ok(exit_codes::ROUTE_ERROR)
}

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pipe-separated table with a header row taken from the first row's keys.
pub(crate) fn render_rows(rows: &[Row]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    let headers: Vec<&String> = first.keys().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|r| {
            headers
                .iter()
                .map(|h| r.get(h.as_str()).map(cell_text).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(h.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |vals: Vec<&str>| -> String {
        vals.iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = line(headers.iter().map(|h| h.as_str()).collect());
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    out.push('\n');
    for row in &cells {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_aligned_table() {
        let rows: Vec<Row> = vec![
            json!({"id": 1, "name": "Alice"}).as_object().cloned().unwrap(),
            json!({"id": 22, "name": null}).as_object().cloned().unwrap(),
        ];
        let text = render_rows(&rows);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "id | name");
        assert_eq!(lines[1], "---+------");
        assert_eq!(lines[2], "1  | Alice");
        assert_eq!(lines[3], "22 | NULL");
    }

    #[test]
    fn no_rows_renders_nothing() {
        assert_eq!(render_rows(&[]), "");
    }
}
