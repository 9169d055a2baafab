//! Structural checks over a tokenized query
//!
//! This is not a full KQL grammar. It catches the mistakes a model tends to
//! make when writing queries: unbalanced brackets, broken pipelines, unknown
//! or misspelled tabular operators and operators missing their required
//! clauses.

use super::diagnostic::{Diagnostic, ValidationReport};
use super::lexer::{Bracket, Token, TokenKind, tokenize};

/// Operators that may follow a `|`
const TABULAR_OPERATORS: &[&str] = &[
    "as",
    "consume",
    "count",
    "distinct",
    "evaluate",
    "extend",
    "facet",
    "filter",
    "find",
    "fork",
    "getschema",
    "graph-match",
    "graph-merge",
    "graph-to-table",
    "invoke",
    "join",
    "limit",
    "lookup",
    "make-graph",
    "make-series",
    "mv-apply",
    "mv-expand",
    "order",
    "parse",
    "parse-kv",
    "parse-where",
    "partition",
    "project",
    "project-away",
    "project-keep",
    "project-rename",
    "project-reorder",
    "reduce",
    "render",
    "sample",
    "sample-distinct",
    "scan",
    "search",
    "serialize",
    "sort",
    "summarize",
    "take",
    "top",
    "top-hitters",
    "top-nested",
    "union",
    "where",
];

/// Operators that are meaningless without arguments
const NEEDS_ARGUMENTS: &[&str] = &[
    "as",
    "distinct",
    "evaluate",
    "extend",
    "facet",
    "filter",
    "fork",
    "invoke",
    "make-series",
    "mv-apply",
    "mv-expand",
    "parse",
    "parse-kv",
    "parse-where",
    "partition",
    "project",
    "project-away",
    "project-keep",
    "project-rename",
    "project-reorder",
    "render",
    "sample",
    "sample-distinct",
    "summarize",
    "top-hitters",
    "top-nested",
    "union",
    "where",
];

/// Statements whose bodies are not pipelines
const OPAQUE_STATEMENTS: &[&str] = &["set", "declare", "alias", "restrict", "pattern"];

/// Check a query and collect every problem found
pub fn validate(query: &str) -> ValidationReport {
    let (tokens, mut diagnostics) = tokenize(query);

    if tokens.is_empty() {
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::new(Default::default(), "Query is empty"));
        }
        return ValidationReport::new(diagnostics);
    }

    let mut checker = Checker {
        diagnostics,
        balanced: true,
    };
    checker.check_brackets(&tokens);
    checker.check_statements(&tokens);

    ValidationReport::new(checker.diagnostics)
}

struct Checker {
    diagnostics: Vec<Diagnostic>,
    balanced: bool,
}

/// Split on a separator kind at bracket depth zero. Each part carries the
/// separator that ended it, `None` for the final part.
fn split_top_level(tokens: &[Token], separator: TokenKind) -> Vec<(&[Token], Option<&Token>)> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            kind if kind == separator && depth == 0 => {
                parts.push((&tokens[start..i], Some(token)));
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push((&tokens[start..], None));
    parts
}

fn has_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> bool {
    let mut depth = 0usize;
    for token in tokens {
        match token.kind {
            TokenKind::Open(_) => depth += 1,
            TokenKind::Close(_) => depth = depth.saturating_sub(1),
            _ if depth == 0 && pred(token) => return true,
            _ => {}
        }
    }
    false
}

/// Top-level `(...)` and `{...}` groups as (bracket, inner tokens)
fn groups(tokens: &[Token]) -> Vec<(Bracket, &[Token])> {
    let mut found = Vec::new();
    let mut depth = 0usize;
    let mut open: Option<(Bracket, usize)> = None;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Open(bracket) => {
                if depth == 0 {
                    open = Some((bracket, i));
                }
                depth += 1;
            }
            TokenKind::Close(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0
                    && let Some((bracket, start)) = open.take()
                    && bracket != Bracket::Square
                {
                    found.push((bracket, &tokens[start + 1..i]));
                }
            }
            _ => {}
        }
    }
    found
}

impl Checker {
    fn report(&mut self, token: &Token, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic::new(token.position, message));
    }

    fn check_brackets(&mut self, tokens: &[Token]) {
        let mut stack: Vec<(Bracket, &Token)> = Vec::new();

        for token in tokens {
            match token.kind {
                TokenKind::Open(bracket) => stack.push((bracket, token)),
                TokenKind::Close(bracket) => match stack.pop() {
                    Some((open, _)) if open == bracket => {}
                    Some((open, opener)) => {
                        self.balanced = false;
                        self.report(
                            token,
                            format!(
                                "Mismatched '{}': expected '{}' to close '{}' opened at {}",
                                bracket.close_char(),
                                open.close_char(),
                                open.open_char(),
                                opener.position
                            ),
                        );
                    }
                    None => {
                        self.balanced = false;
                        self.report(token, format!("Unexpected closing '{}'", bracket.close_char()));
                    }
                },
                _ => {}
            }
        }

        for (bracket, opener) in stack {
            self.balanced = false;
            self.report(opener, format!("Unclosed '{}'", bracket.open_char()));
        }
    }

    fn check_statements(&mut self, tokens: &[Token]) {
        for (statement, separator) in split_top_level(tokens, TokenKind::Semicolon) {
            if statement.is_empty() {
                // a trailing ';' leaves an empty final part, which is fine
                if let Some(semicolon) = separator {
                    self.report(semicolon, "Empty statement before ';'");
                }
                continue;
            }
            self.check_statement(statement);
        }
    }

    fn check_statement(&mut self, tokens: &[Token]) {
        let first = &tokens[0];

        // control commands (.show tables) are outside the query language
        if first.kind == TokenKind::Dot {
            return;
        }
        if OPAQUE_STATEMENTS.iter().any(|kw| first.is_keyword(kw)) {
            return;
        }

        if first.is_keyword("let") {
            self.check_let(tokens);
            return;
        }

        self.check_pipeline(tokens);
    }

    fn check_let(&mut self, tokens: &[Token]) {
        let name = tokens.get(1).filter(|t| t.kind == TokenKind::Identifier);
        let assign = tokens.get(2).filter(|t| t.is_operator("="));

        let (Some(name), Some(_)) = (name, assign) else {
            self.report(&tokens[0], "Expected 'let <name> = <expression>'");
            return;
        };

        let value = &tokens[3..];
        if value.is_empty() {
            self.report(name, format!("let statement for '{}' has no value", name.text));
            return;
        }
        self.check_pipeline(value);
    }

    fn check_pipeline(&mut self, tokens: &[Token]) {
        let stages = split_top_level(tokens, TokenKind::Pipe);
        let last = stages.len() - 1;

        for (i, (stage, pipe)) in stages.iter().enumerate() {
            if i == 0 {
                if stage.is_empty()
                    && let Some(pipe) = pipe
                {
                    self.report(pipe, "Expected a table or expression before '|'");
                }
                continue;
            }

            // the pipe that introduces this stage ended the previous one
            let Some(introducer) = stages[i - 1].1 else {
                continue;
            };

            if stage.is_empty() {
                if i == last {
                    self.report(introducer, "Query cannot end with '|'");
                } else {
                    self.report(introducer, "Empty pipeline stage between '|' operators");
                }
                continue;
            }

            self.check_operator(stage);
        }

        if self.balanced {
            self.check_groups(tokens);
        }
    }

    /// Recurse into subqueries and function bodies
    fn check_groups(&mut self, tokens: &[Token]) {
        for (bracket, inner) in groups(tokens) {
            if inner.is_empty() {
                continue;
            }
            match bracket {
                Bracket::Brace => self.check_statements(inner),
                _ if has_top_level(inner, |t| t.kind == TokenKind::Pipe) => self.check_pipeline(inner),
                _ => self.check_groups(inner),
            }
        }
    }

    fn check_operator(&mut self, stage: &[Token]) {
        let op = &stage[0];
        if op.kind != TokenKind::Identifier {
            self.report(op, format!("Expected a tabular operator after '|' but found '{}'", op.text));
            return;
        }

        let name = op.text.to_lowercase();
        if !TABULAR_OPERATORS.contains(&name.as_str()) {
            self.report(op, format!("Unknown tabular operator '{}'", op.text));
            return;
        }

        let args = &stage[1..];
        if args.is_empty() && NEEDS_ARGUMENTS.contains(&name.as_str()) {
            self.report(op, format!("'{}' requires arguments", name));
            return;
        }

        match name.as_str() {
            "sort" | "order" => {
                if !args.first().is_some_and(|t| t.is_keyword("by")) {
                    self.report(op, format!("Expected 'by' after '{}'", name));
                }
            }
            "take" | "limit" => {
                if args.is_empty() {
                    self.report(op, format!("'{}' requires a row count", name));
                }
            }
            "top" => {
                if args.is_empty() {
                    self.report(op, "'top' requires a row count");
                } else if !has_top_level(args, |t| t.is_keyword("by")) {
                    self.report(op, "'top' requires a 'by' clause");
                }
            }
            "join" | "lookup" => {
                if !has_top_level(args, |t| t.is_keyword("on")) {
                    self.report(op, format!("'{}' requires an 'on' clause", name));
                }
            }
            "summarize" => {
                if let Some(by) = args.last().filter(|t| t.is_keyword("by")) {
                    self.report(by, "'summarize ... by' requires at least one grouping column");
                }
            }
            _ => {}
        }
    }
}
