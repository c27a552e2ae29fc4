//! Prompt text for SQL generation.

pub const TASK_MARKER: &str = "Now, generate a plain SQL query for the following task:";

const PREAMBLE: &str = "You are an expert SQL developer with complete knowledge of SQL joins, \
aggregates, filtering, and complex queries. You will receive an input task, and your job is to \
provide only the plain SQL query with no additional formatting, explanations, or comments.";

const EXAMPLES: &[(&str, &str)] = &[
    ("List all users.", "SELECT * FROM users;"),
    (
        "Find all orders with an amount greater than 100.",
        "SELECT * FROM orders WHERE amount > 100;",
    ),
    (
        "Retrieve the name and email of users who have placed an order for 'Laptop'.",
        "SELECT users.name, users.email FROM users JOIN orders ON users.id = orders.user_id \
         WHERE orders.product_name = 'Laptop';",
    ),
];

const RULES: &[&str] = &[
    "Do not include backticks or triple backticks.",
    "Provide the SQL query only, with no comments or extra formatting.",
    "Stick to valid SQL syntax for the given schema.",
    "The output must be a single-line SQL query.",
    "CSV datasets are queried as tables with the same name.",
];

/// Builds the generation prompt. `schema` is the rendered table and dataset
/// listing; the task is always the last line.
pub fn build_prompt(question: &str, schema: &str) -> String {
    let mut out = String::with_capacity(1024 + schema.len() + question.len());
    out.push_str(PREAMBLE);
    out.push_str("\n\n### Database Schema:\n");
    if schema.trim().is_empty() {
        out.push_str("(no tables available)\n");
    } else {
        out.push_str(schema.trim_end());
        out.push('\n');
    }

    out.push_str("\n### Examples:\n");
    for (task, sql) in EXAMPLES {
        out.push_str(&format!("Task: {}\nOutput: {}\n\n", task, sql));
    }

    out.push_str("### Important Rules:\n");
    for (i, rule) in RULES.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, rule));
    }

    out.push('\n');
    out.push_str(TASK_MARKER);
    out.push(' ');
    out.push_str(question.trim());
    out
}

/// The question embedded by [`build_prompt`], or the whole prompt when the
/// marker is absent.
pub fn extract_task(prompt: &str) -> &str {
    match prompt.rfind(TASK_MARKER) {
        Some(at) => prompt[at + TASK_MARKER.len()..].trim(),
        None => prompt.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_ends_with_task() {
        let p = build_prompt("sales by product", "TABLE users (id, name)\nCSV sales (product)\n");
        assert!(p.contains("TABLE users (id, name)"));
        assert!(p.contains("Output: SELECT * FROM users;"));
        assert!(p.ends_with("task: sales by product"));
        assert_eq!(extract_task(&p), "sales by product");
    }

    #[test]
    fn extract_without_marker() {
        assert_eq!(extract_task("  plain question "), "plain question");
    }
}
