use super::{exit_codes, open_router, print_json, render_rows, report_route_error};
use crate::cli::args::{AskArgs, OutputFormat};
use sqlroute_core::model::{Answer, SqlOrigin, NO_RECORDS_MESSAGE};

pub async fn run(args: AskArgs) -> anyhow::Result<i32> {
    let router = open_router(&args.cfg)?;

    let answer = match router.ask(&args.question).await {
        Ok(a) => a,
        Err(e) => return report_route_error(&e, args.format),
    };

    match args.format {
        OutputFormat::Json => print_json(&answer)?,
        OutputFormat::Text => print!("{}", render_answer(&answer)),
    }
    Ok(exit_codes::OK)
}

fn render_answer(answer: &Answer) -> String {
    let origin = match (answer.origin, answer.similarity) {
        (SqlOrigin::Memory, Some(score)) => format!("memory, similarity {:.2}", score),
        (SqlOrigin::Memory, None) => "memory".to_string(),
        (SqlOrigin::Translator, _) => "translator".to_string(),
    };
    let mut out = format!("-- {} ({}, {})\n", answer.sql, answer.target.as_str(), origin);
    if answer.outcome.is_empty() {
        out.push_str(NO_RECORDS_MESSAGE);
        out.push('\n');
    } else {
        let rows = answer.outcome.rows();
        out.push_str(&render_rows(rows));
        out.push_str(&format!("({} row{})\n", rows.len(), if rows.len() == 1 { "" } else { "s" }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlroute_core::model::{QueryOutcome, Target};

    #[test]
    fn empty_answer_prints_notice() {
        let answer = Answer {
            question: "refunds?".into(),
            sql: "SELECT * FROM refunds".into(),
            target: Target::Relational,
            origin: SqlOrigin::Memory,
            similarity: Some(0.97),
            outcome: QueryOutcome::Empty,
            recorded: false,
        };
        assert_eq!(
            render_answer(&answer),
            "-- SELECT * FROM refunds (relational, memory, similarity 0.97)\nNo records found.\n"
        );
    }
}
