use super::{exit_codes, open_router, print_json, report_route_error};
use crate::cli::args::{OutputFormat, SchemaArgs};
use serde_json::{json, Map, Value};

pub fn run(args: SchemaArgs) -> anyhow::Result<i32> {
    let router = open_router(&args.cfg)?;
    if args.refresh {
        if let Err(e) = router.schema().force_refresh() {
            return report_route_error(&e, args.format);
        }
    }

    match args.format {
        OutputFormat::Text => print!("{}", router.schema_description()),
        OutputFormat::Json => {
            let snapshot = router.schema().snapshot();
            let tabular = router.executor().tabular();
            let mut datasets = Map::new();
            for name in tabular.dataset_names() {
                let entry = match tabular.columns(&name) {
                    Ok(cols) => json!(cols),
                    Err(e) => json!({ "error": e.to_json() }),
                };
                datasets.insert(name, entry);
            }
            print_json(&json!({
                "version": snapshot.version,
                "refreshed_at": snapshot.refreshed_at,
                "tables": snapshot.tables,
                "datasets": Value::Object(datasets),
            }))?;
        }
    }
    Ok(exit_codes::OK)
}
