//! Query term compilation / 查询词编译
//!
//! Raw user input is never handed to the FTS engine as-is: stray quotes,
//! parentheses or column filters are MATCH syntax and would error (or
//! worse, do something surprising). Terms are reduced to alphanumeric
//! tokens and each token is quoted, which FTS treats as a literal.

/// Compile raw user input into a safe FTS5 MATCH expression
/// / 将原始用户输入编译为安全的FTS5匹配表达式
///
/// Returns `None` when nothing searchable remains.
pub fn fts_match_expr(term: &str) -> Option<String> {
    let tokens: Vec<String> = term
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect();

    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}
