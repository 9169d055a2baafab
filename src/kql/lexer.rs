//! Tokenizer for Kusto Query Language text
//!
//! Produces a flat token list plus diagnostics for problems that are visible
//! at the character level (unterminated strings, stray characters).

use super::diagnostic::{Diagnostic, Position};

/// Operators spelled with a hyphen, lexed as one identifier
const HYPHENATED: &[&str] = &[
    "graph-match",
    "graph-merge",
    "graph-to-table",
    "make-graph",
    "make-series",
    "mv-apply",
    "mv-expand",
    "parse-kv",
    "parse-where",
    "project-away",
    "project-keep",
    "project-rename",
    "project-reorder",
    "sample-distinct",
    "top-hitters",
    "top-nested",
];

const TWO_CHAR_OPERATORS: &[&str] = &["==", "!=", "=~", "!~", "<=", ">=", "<>", "=>", ".."];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bracket {
    Paren,
    Square,
    Brace,
}

impl Bracket {
    pub fn open_char(self) -> char {
        match self {
            Bracket::Paren => '(',
            Bracket::Square => '[',
            Bracket::Brace => '{',
        }
    }

    pub fn close_char(self) -> char {
        match self {
            Bracket::Paren => ')',
            Bracket::Square => ']',
            Bracket::Brace => '}',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    Pipe,
    Semicolon,
    Comma,
    Dot,
    Open(Bracket),
    Close(Bracket),
    Operator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub position: Position,
}

impl Token {
    /// Case-insensitive keyword test
    pub fn is_keyword(&self, keyword: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text.eq_ignore_ascii_case(keyword)
    }

    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

/// Split query text into tokens
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<Diagnostic>) {
    let mut lexer = Lexer::new(source);
    lexer.run();
    (lexer.tokens, lexer.diagnostics)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    tokens: Vec<Token>,
    diagnostics: Vec<Diagnostic>,
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl Lexer {
    fn new(source: &str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            tokens: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars().enumerate().all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn push(&mut self, kind: TokenKind, text: String, position: Position) {
        self.tokens.push(Token { kind, text, position });
    }

    fn single(&mut self, kind: TokenKind, start: Position) {
        if let Some(c) = self.bump() {
            self.push(kind, c.to_string(), start);
        }
    }

    fn run(&mut self) {
        while let Some(c) = self.peek() {
            let start = self.position();
            match c {
                c if c.is_whitespace() => {
                    self.bump();
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                '\'' | '"' => self.string(start, false),
                '@' if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.bump();
                    self.string(start, true);
                }
                '`' if self.starts_with("```") => self.multiline_string(start),
                'h' | 'H' if matches!(self.peek_at(1), Some('\'' | '"')) => {
                    self.bump();
                    self.string(start, false);
                }
                c if is_ident_start(c) => self.identifier(start),
                c if c.is_ascii_digit() => self.number(start),
                '.' if self.peek_at(1).is_some_and(|n| n.is_ascii_digit()) => self.number(start),
                '|' => self.single(TokenKind::Pipe, start),
                ';' => self.single(TokenKind::Semicolon, start),
                ',' => self.single(TokenKind::Comma, start),
                '.' if self.peek_at(1) != Some('.') => self.single(TokenKind::Dot, start),
                '(' => self.single(TokenKind::Open(Bracket::Paren), start),
                '[' => self.single(TokenKind::Open(Bracket::Square), start),
                '{' => self.single(TokenKind::Open(Bracket::Brace), start),
                ')' => self.single(TokenKind::Close(Bracket::Paren), start),
                ']' => self.single(TokenKind::Close(Bracket::Square), start),
                '}' => self.single(TokenKind::Close(Bracket::Brace), start),
                '=' | '!' | '<' | '>' | '~' | '+' | '-' | '*' | '/' | '%' | ':' | '?' | '.' => self.operator(start),
                other => {
                    self.bump();
                    self.diagnostics
                        .push(Diagnostic::new(start, format!("Unexpected character '{}'", other)));
                }
            }
        }
    }

    fn identifier(&mut self, start: Position) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if !(is_ident_continue(c) || (text.is_empty() && c == '$')) {
                break;
            }
            text.push(c);
            self.bump();
        }

        // mv-expand, project-away, ...
        if self.peek() == Some('-') {
            let word: String = self.chars[self.pos + 1..]
                .iter()
                .take_while(|c| c.is_alphabetic())
                .collect();
            let candidate = format!("{}-{}", text, word);
            if !word.is_empty() && HYPHENATED.contains(&candidate.to_lowercase().as_str()) {
                for _ in 0..=word.chars().count() {
                    self.bump();
                }
                text = candidate;
            }
        }

        self.push(TokenKind::Identifier, text, start);
    }

    fn number(&mut self, start: Position) {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            let fraction_dot = c == '.'
                && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())
                && !text.contains('.');
            // digits, hex, exponents and timespan suffixes such as 5m, 1.5h, 10ms
            if c.is_ascii_alphanumeric() || fraction_dot {
                text.push(c);
                self.bump();
            } else {
                break;
            }
        }
        self.push(TokenKind::Number, text, start);
    }

    fn string(&mut self, start: Position, verbatim: bool) {
        let Some(quote) = self.bump() else {
            return;
        };
        let mut text = String::from(quote);

        loop {
            match self.peek() {
                None | Some('\n') => {
                    self.diagnostics
                        .push(Diagnostic::new(start, "Unterminated string literal"));
                    break;
                }
                Some('\\') if !verbatim => {
                    text.push('\\');
                    self.bump();
                    if let Some(escaped) = self.peek()
                        && escaped != '\n'
                    {
                        text.push(escaped);
                        self.bump();
                    }
                }
                Some(c) if c == quote => {
                    text.push(c);
                    self.bump();
                    // @"" doubles the quote to escape it
                    if verbatim && self.peek() == Some(quote) {
                        text.push(quote);
                        self.bump();
                        continue;
                    }
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }

        self.push(TokenKind::String, text, start);
    }

    fn multiline_string(&mut self, start: Position) {
        for _ in 0..3 {
            self.bump();
        }
        let mut text = String::from("```");
        loop {
            if self.starts_with("```") {
                for _ in 0..3 {
                    self.bump();
                }
                text.push_str("```");
                break;
            }
            match self.bump() {
                Some(c) => text.push(c),
                None => {
                    self.diagnostics
                        .push(Diagnostic::new(start, "Unterminated multi-line string literal"));
                    break;
                }
            }
        }
        self.push(TokenKind::String, text, start);
    }

    fn operator(&mut self, start: Position) {
        let pair: String = [self.peek(), self.peek_at(1)].iter().flatten().collect();
        if TWO_CHAR_OPERATORS.contains(&pair.as_str()) {
            self.bump();
            self.bump();
            self.push(TokenKind::Operator, pair, start);
        } else {
            self.single(TokenKind::Operator, start);
        }
    }
}
