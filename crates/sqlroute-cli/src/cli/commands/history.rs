use super::{exit_codes, open_router, print_json, report_route_error};
use crate::cli::args::{HistoryArgs, OutputFormat};

pub fn run(args: HistoryArgs) -> anyhow::Result<i32> {
    let router = open_router(&args.cfg)?;
    let interactions = match router.history() {
        Ok(rows) => rows,
        Err(e) => return report_route_error(&e, args.format),
    };

    match args.format {
        OutputFormat::Json => print_json(&interactions)?,
        OutputFormat::Text => {
            if interactions.is_empty() {
                eprintln!("no interactions recorded");
            }
            for i in &interactions {
                println!(
                    "#{} [{}] {}",
                    i.id,
                    i.source.as_str(),
                    i.created_at.to_rfc3339()
                );
                println!("  Q:   {}", i.question);
                println!("  SQL: {}", i.sql);
            }
        }
    }
    Ok(exit_codes::OK)
}
