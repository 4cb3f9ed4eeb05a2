//! Decoder for pipeline specs written in DOT notation.
//!
//! Supported subset:
//! - an optional `[strict] digraph [id] { ... }` wrapper; a bare statement
//!   list is read as the body of an anonymous digraph
//! - node statements `name [key=value key2="value" ...]`
//! - edge chains `a -> b -> c [attrs]` (edge attributes are ignored)
//! - `graph`/`node`/`edge` default-attribute statements and `key=value`
//!   graph attributes, both ignored
//! - `//`, `/* */` and `#` comments; `;` and `,` separators are optional
//!
//! Subgraphs, undirected graphs, ports and HTML strings are rejected.

use std::collections::BTreeMap;

use tracing::debug;

use crate::dag::{GraphBuilder, TaskGraph};
use crate::EngineError;

/// Decode DOT text into a [`TaskGraph`].
///
/// # Errors
/// [`EngineError::Decode`] for malformed text, plus every validation error of
/// [`GraphBuilder::build`].
pub fn decode(text: &str) -> Result<TaskGraph, EngineError> {
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        builder: GraphBuilder::new(),
    };
    parser.graph()?;
    let graph = parser.builder.build()?;

    debug!(nodes = graph.node_count(), edges = graph.edge_count(), "decoded pipeline graph");
    Ok(graph)
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    /// Unquoted identifier or numeral.
    Ident(String),
    /// Double-quoted string with escapes resolved.
    Quoted(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Equals,
    Semi,
    Comma,
    Arrow,
    UndirectedEdge,
    Colon,
    Eof,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => format!("'{s}'"),
            Tok::Quoted(s) => format!("\"{s}\""),
            Tok::LBrace => "'{'".into(),
            Tok::RBrace => "'}'".into(),
            Tok::LBracket => "'['".into(),
            Tok::RBracket => "']'".into(),
            Tok::Equals => "'='".into(),
            Tok::Semi => "';'".into(),
            Tok::Comma => "','".into(),
            Tok::Arrow => "'->'".into(),
            Tok::UndirectedEdge => "'--'".into(),
            Tok::Colon => "':'".into(),
            Tok::Eof => "end of input".into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    line: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '.'
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Decode {
            line: self.line,
            message: message.into(),
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next();
        if c == Some('\n') {
            self.line += 1;
        }
        c
    }

    fn tokenize(mut self) -> Result<Vec<Token>, EngineError> {
        let mut tokens = Vec::new();

        while let Some(&c) = self.chars.peek() {
            let line = self.line;
            let tok = match c {
                c if c.is_whitespace() => {
                    self.bump();
                    continue;
                }
                '#' => {
                    self.skip_line();
                    continue;
                }
                '/' => {
                    self.bump();
                    match self.bump() {
                        Some('/') => self.skip_line(),
                        Some('*') => self.skip_block_comment()?,
                        _ => return Err(self.error("unexpected '/'")),
                    }
                    continue;
                }
                '"' => {
                    self.bump();
                    Tok::Quoted(self.quoted()?)
                }
                '-' => {
                    self.bump();
                    match self.chars.peek() {
                        Some('>') => {
                            self.bump();
                            Tok::Arrow
                        }
                        Some('-') => {
                            self.bump();
                            Tok::UndirectedEdge
                        }
                        Some(&d) if d.is_ascii_digit() || d == '.' => {
                            let mut ident = String::from("-");
                            ident.push_str(&self.ident());
                            Tok::Ident(ident)
                        }
                        _ => return Err(self.error("unexpected '-'")),
                    }
                }
                '{' | '}' | '[' | ']' | '=' | ';' | ',' | ':' => {
                    self.bump();
                    match c {
                        '{' => Tok::LBrace,
                        '}' => Tok::RBrace,
                        '[' => Tok::LBracket,
                        ']' => Tok::RBracket,
                        '=' => Tok::Equals,
                        ';' => Tok::Semi,
                        ',' => Tok::Comma,
                        _ => Tok::Colon,
                    }
                }
                '<' => return Err(self.error("HTML strings are not supported")),
                c if is_ident_char(c) => Tok::Ident(self.ident()),
                other => return Err(self.error(format!("unexpected character '{other}'"))),
            };
            tokens.push(Token { tok, line });
        }

        tokens.push(Token {
            tok: Tok::Eof,
            line: self.line,
        });
        Ok(tokens)
    }

    fn ident(&mut self) -> String {
        let mut ident = String::new();
        while let Some(&c) = self.chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            ident.push(c);
            self.bump();
        }
        ident
    }

    /// Body of a quoted string; the opening quote is already consumed.
    /// `\"` and `\\` are escapes and a backslash-newline is a continuation.
    /// Any other backslash pair is kept as written.
    fn quoted(&mut self) -> Result<String, EngineError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated string")),
                Some('"') => return Ok(out),
                Some('\\') => match self.bump() {
                    None => return Err(self.error("unterminated string")),
                    Some('"') => out.push('"'),
                    Some('\\') => out.push('\\'),
                    Some('\n') => {}
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                },
                Some(c) => out.push(c),
            }
        }
    }

    fn skip_line(&mut self) {
        while let Some(&c) = self.chars.peek() {
            if c == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn skip_block_comment(&mut self) -> Result<(), EngineError> {
        let mut star = false;
        loop {
            match self.bump() {
                None => return Err(self.error("unterminated comment")),
                Some('/') if star => return Ok(()),
                Some(c) => star = c == '*',
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    builder: GraphBuilder,
}

fn keyword(tok: &Tok, word: &str) -> bool {
    matches!(tok, Tok::Ident(s) if s.eq_ignore_ascii_case(word))
}

impl Parser {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)].tok
    }

    fn line(&self) -> usize {
        self.tokens[self.pos.min(self.tokens.len() - 1)].line
    }

    fn next(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Decode {
            line: self.line(),
            message: message.into(),
        }
    }

    fn unexpected(&self, wanted: &str) -> EngineError {
        self.error(format!("expected {wanted}, found {}", self.peek().describe()))
    }

    fn expect(&mut self, want: Tok) -> Result<(), EngineError> {
        if *self.peek() == want {
            self.next();
            Ok(())
        } else {
            Err(self.unexpected(&want.describe()))
        }
    }

    fn id(&mut self) -> Result<String, EngineError> {
        match self.peek().clone() {
            Tok::Ident(s) | Tok::Quoted(s) => {
                self.next();
                Ok(s)
            }
            _ => Err(self.unexpected("an identifier")),
        }
    }

    fn graph(&mut self) -> Result<(), EngineError> {
        if keyword(self.peek(), "strict") {
            self.next();
        }

        if keyword(self.peek(), "graph") && !matches!(self.peek_at(1), Tok::LBracket) {
            return Err(self.error("undirected graphs are not supported, use 'digraph'"));
        }

        if keyword(self.peek(), "digraph") {
            self.next();
            if matches!(self.peek(), Tok::Ident(_) | Tok::Quoted(_)) {
                self.id()?;
            }
            self.expect(Tok::LBrace)?;
            self.statements(Tok::RBrace)?;
            self.expect(Tok::RBrace)?;
        } else {
            self.statements(Tok::Eof)?;
        }

        self.expect(Tok::Eof)
    }

    fn statements(&mut self, end: Tok) -> Result<(), EngineError> {
        while *self.peek() != end {
            if *self.peek() == Tok::Eof {
                return Err(self.unexpected(&end.describe()));
            }
            self.statement()?;
            while matches!(self.peek(), Tok::Semi | Tok::Comma) {
                self.next();
            }
        }
        Ok(())
    }

    fn statement(&mut self) -> Result<(), EngineError> {
        let tok = self.peek().clone();

        if keyword(&tok, "subgraph") || tok == Tok::LBrace {
            return Err(self.error("subgraphs are not supported"));
        }
        if ["graph", "node", "edge"].iter().any(|w| keyword(&tok, w))
            && matches!(self.peek_at(1), Tok::LBracket)
        {
            self.next();
            self.attributes()?;
            return Ok(());
        }

        let line = self.line();
        let name = self.id()?;

        match self.peek() {
            Tok::Equals => {
                self.next();
                self.id()?;
                Ok(())
            }
            Tok::Arrow => self.edge_chain(name),
            Tok::UndirectedEdge => Err(self.error("undirected edges are not supported, use '->'")),
            Tok::Colon => Err(self.error("node ports are not supported")),
            _ => {
                let attributes = self.attributes()?;
                self.builder.node(name, attributes).map_err(|e| match e {
                    EngineError::DuplicateNode(name) => EngineError::Decode {
                        line,
                        message: format!("duplicate node name '{name}'"),
                    },
                    other => other,
                })?;
                Ok(())
            }
        }
    }

    fn edge_chain(&mut self, first: String) -> Result<(), EngineError> {
        let mut from = first;
        while *self.peek() == Tok::Arrow {
            self.next();
            let to = self.id()?;
            if *self.peek() == Tok::Colon {
                return Err(self.error("node ports are not supported"));
            }
            self.builder.edge(from, to.clone());
            from = to;
        }
        self.attributes()?;
        Ok(())
    }

    /// Zero or more `[k=v ...]` lists, merged; later keys win.
    fn attributes(&mut self) -> Result<BTreeMap<String, String>, EngineError> {
        let mut attributes = BTreeMap::new();

        while *self.peek() == Tok::LBracket {
            self.next();
            while *self.peek() != Tok::RBracket {
                let key = self.id()?;
                self.expect(Tok::Equals)?;
                let value = self.id()?;
                attributes.insert(key, value);
                while matches!(self.peek(), Tok::Semi | Tok::Comma) {
                    self.next();
                }
            }
            self.expect(Tok::RBracket)?;
        }

        Ok(attributes)
    }
}
