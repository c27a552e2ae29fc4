use super::{exit_codes, print_json};
use crate::cli::args::{DoctorArgs, OutputFormat};
use serde::Serialize;
use sqlroute_core::config::{load_config, ProviderKind, RouterConfig};
use sqlroute_core::schema::{SchemaProvider, SqliteSchemaSource};
use sqlroute_core::storage::Store;
use sqlroute_core::tabular::TabularProvider;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Serialize)]
struct Check {
    name: String,
    ok: bool,
    detail: String,
}

impl Check {
    fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    version: &'static str,
    config_path: String,
    healthy: bool,
    checks: Vec<Check>,
}

pub fn run(args: DoctorArgs) -> anyhow::Result<i32> {
    let mut checks = Vec::new();
    let config_ok = match load_config(&args.cfg.config, args.cfg.strict) {
        Ok(cfg) => {
            checks.push(Check::pass("config", "valid"));
            checks.extend(inspect(&cfg));
            true
        }
        Err(e) => {
            checks.push(Check::fail("config", e.to_string()));
            false
        }
    };

    let report = DoctorReport {
        version: env!("CARGO_PKG_VERSION"),
        config_path: args.cfg.config.display().to_string(),
        healthy: checks.iter().all(|c| c.ok),
        checks,
    };

    match args.format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!("sqlroute doctor (v{})", report.version);
            println!("config: {}", report.config_path);
            for c in &report.checks {
                println!("[{}] {}: {}", if c.ok { "ok" } else { "!!" }, c.name, c.detail);
            }
        }
    }

    Ok(if !config_ok {
        exit_codes::CONFIG_ERROR
    } else if report.healthy {
        exit_codes::OK
    } else {
        exit_codes::ROUTE_ERROR
    })
}

fn inspect(cfg: &RouterConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    let store_path = Path::new(&cfg.store);
    if !store_path.exists() {
        checks.push(Check::pass("store", format!("{} (created on first use)", cfg.store)));
    } else {
        let stats = Store::open(store_path).and_then(|s| {
            s.init_schema()?;
            s.stats_best_effort()
        });
        checks.push(match stats {
            Ok(s) => Check::pass(
                "store",
                format!("{} interactions ({} trained)", s.interactions, s.trained),
            ),
            Err(e) => Check::fail("store", format!("{:#}", e)),
        });
    }

    let source = Arc::new(SqliteSchemaSource::new(&cfg.database));
    checks.push(
        match SchemaProvider::initialize(source, cfg.schema_refresh_interval()) {
            Ok(p) => Check::pass("database", format!("{} tables", p.snapshot().tables.len())),
            Err(e) => Check::fail("database", e.message),
        },
    );

    let tabular = TabularProvider::new(cfg.dataset_paths(), cfg.executor.dataset_cache_entries);
    for name in tabular.dataset_names() {
        let label = format!("dataset {}", name);
        checks.push(match tabular.columns(&name) {
            Ok(cols) => Check::pass(label, format!("{} columns", cols.len())),
            Err(e) => Check::fail(label, e.message),
        });
    }

    let provider = cfg.translator.provider;
    checks.push(if provider == ProviderKind::Fake || cfg.api_key().is_some() {
        Check::pass(
            "translator",
            format!("{} ({})", provider.as_str(), cfg.translator.model_name()),
        )
    } else {
        Check::fail(
            "translator",
            format!("{} needs ${}", provider.as_str(), cfg.translator.api_key_env),
        )
    });

    checks
}
