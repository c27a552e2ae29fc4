//! Identifier-aware substitution of dataset names in SQL text.
//!
//! The statement is tokenized (not parsed), so any SQL the evaluator accepts
//! survives the round trip. Only table references in FROM lists are
//! considered; columns, aliases, string literals, comments and qualified
//! members (`t.sales`) are left alone.

use anyhow::Context;
use sqlparser::dialect::SQLiteDialect;
use sqlparser::keywords::Keyword;
use sqlparser::tokenizer::{Token, Tokenizer, Word};
use std::collections::{BTreeMap, BTreeSet};

pub const ALIAS_PREFIX: &str = "ds_";

pub fn alias_for(dataset: &str) -> String {
    format!("{}{}", ALIAS_PREFIX, dataset)
}

pub(crate) fn tokenize(sql: &str) -> anyhow::Result<Vec<Token>> {
    let dialect = SQLiteDialect {};
    Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize()
        .context("failed to tokenize SQL")
}

fn is_trivia(t: &Token) -> bool {
    matches!(t, Token::Whitespace(_))
}

fn starts_from_list(w: &Word) -> bool {
    w.quote_style.is_none() && matches!(w.keyword, Keyword::FROM | Keyword::JOIN)
}

fn ends_from_list(w: &Word) -> bool {
    w.quote_style.is_none()
        && matches!(
            w.keyword,
            Keyword::WHERE
                | Keyword::GROUP
                | Keyword::HAVING
                | Keyword::ORDER
                | Keyword::LIMIT
                | Keyword::UNION
                | Keyword::EXCEPT
                | Keyword::INTERSECT
                | Keyword::WINDOW
                | Keyword::SELECT
                | Keyword::VALUES
        )
}

/// Indexes of word tokens that name a table in a FROM list: the word right
/// after `FROM`, `JOIN`, or a top-level comma of the FROM list. Column
/// names, output aliases and schema-qualified names are never included.
fn table_positions(tokens: &[Token]) -> Vec<usize> {
    let significant: Vec<usize> = (0..tokens.len())
        .filter(|&i| !is_trivia(&tokens[i]))
        .collect();

    let mut out = Vec::new();
    // one entry per open parenthesis level: inside a FROM list or not
    let mut in_from = vec![false];
    let mut expect_table = false;

    for (n, &i) in significant.iter().enumerate() {
        let expecting = std::mem::take(&mut expect_table);
        match &tokens[i] {
            Token::LParen => in_from.push(false),
            Token::RParen => {
                if in_from.len() > 1 {
                    in_from.pop();
                }
            }
            Token::Comma => expect_table = in_from.last().copied().unwrap_or(false),
            Token::Word(_) if expecting => {
                let qualified = matches!(
                    significant.get(n + 1).map(|&j| &tokens[j]),
                    Some(Token::Period)
                );
                if !qualified {
                    out.push(i);
                }
            }
            Token::Word(w) if starts_from_list(w) => {
                if let Some(level) = in_from.last_mut() {
                    *level = true;
                }
                expect_table = true;
            }
            Token::Word(w) if ends_from_list(w) => {
                if let Some(level) = in_from.last_mut() {
                    *level = false;
                }
            }
            _ => {}
        }
    }
    out
}

fn matches_name(w: &Word, name: &str) -> bool {
    match w.quote_style {
        Some(_) => w.value == name,
        None => w.value.eq_ignore_ascii_case(name),
    }
}

/// Dataset names from `known` that `sql` reads as tables.
pub fn referenced_names(sql: &str, known: &BTreeSet<String>) -> anyhow::Result<BTreeSet<String>> {
    let tokens = tokenize(sql)?;
    let mut found = BTreeSet::new();
    for i in table_positions(&tokens) {
        if let Token::Word(w) = &tokens[i] {
            if let Some(name) = known.iter().find(|n| matches_name(w, n)) {
                found.insert(name.clone());
            }
        }
    }
    Ok(found)
}

/// Renames table references found in `renames` and renders the statement
/// back to text. Everything else keeps its original spelling.
pub fn rewrite_identifiers(sql: &str, renames: &BTreeMap<String, String>) -> anyhow::Result<String> {
    let mut tokens = tokenize(sql)?;
    for i in table_positions(&tokens) {
        let replacement = match &tokens[i] {
            Token::Word(w) => renames
                .iter()
                .find(|(from, _)| matches_name(w, from))
                .map(|(_, to)| Word {
                    value: to.clone(),
                    quote_style: w.quote_style,
                    keyword: Keyword::NoKeyword,
                }),
            _ => None,
        };
        if let Some(word) = replacement {
            tokens[i] = Token::Word(word);
        }
    }
    Ok(tokens.iter().map(|t| t.to_string()).collect())
}

/// Drops trailing semicolons and whitespace; the evaluator runs one statement.
pub fn strip_terminator(sql: &str) -> &str {
    let mut s = sql.trim_end();
    while let Some(rest) = s.strip_suffix(';') {
        s = rest.trim_end();
    }
    s
}
