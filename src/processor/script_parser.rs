//! Single-pass recursive-descent parser that resolves names and emits
//! bytecode while it recognises the source.
//
//  Grammar:
//
//      program      ::= funcdecl* EOF
//      funcdecl     ::= '(' IDENT params? '->' body ')'
//      params       ::= IDENT (',' IDENT)*
//      body         ::= statement*
//      statement    ::= declaration | assign_or_call | print | return | flow
//      declaration  ::= 'decl' IDENT '=' or ';'
//      assign_or_call ::= IDENT ( '=' or | '(' args? ')' ) ';'
//      args         ::= or (',' or)*
//      print        ::= 'print' IDENT ';'
//      return       ::= 'ret' or ';'
//      flow         ::= ('if' | 'while') '(' or '->' body ')'
//      or           ::= and ('or' and)*
//      and          ::= rel ('and' rel)*
//      rel          ::= add (('<' | '>') add)*
//      add          ::= mul (('+' | '-') mul)*
//      mul          ::= value (('*' | '/') value)*
//      value        ::= IDENT ('(' args? ')')? | NUMBER | '(' or ')'

use super::Compilation;
use super::bytecode::{FunctionInfo, Instruction};
use super::context::CompileContext;
use super::lexer::{LexError, Lexer, Token, TokenKind};
use super::scope::{Entry, EntryKind, ScopeChain};
use crate::model::{Diagnostic, ErrorKind};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Flow {
    If,
    While,
}

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    ctx: CompileContext,
    scopes: ScopeChain,
    code: Vec<Instruction>,
    label_count: usize,
    /// Next free local slot of the function being compiled.
    next_slot: usize,
    functions: Vec<FunctionInfo>,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(src),
            current: Token {
                text: "",
                kind: TokenKind::EndOfInput,
                line: 1,
                column: 1,
            },
            ctx: CompileContext::new(),
            scopes: ScopeChain::new(),
            code: Vec::new(),
            label_count: 0,
            next_slot: 0,
            functions: Vec::new(),
        };
        parser.advance();
        parser
    }

    pub fn parse(mut self) -> Compilation {
        self.program();
        log::debug!(
            "parsed: {} instructions, {} labels, {} functions, {} diagnostics",
            self.code.len(),
            self.label_count,
            self.functions.len(),
            self.ctx.diagnostics().len()
        );
        Compilation {
            instructions: self.code,
            label_count: self.label_count,
            functions: self.functions,
            diagnostics: self.ctx.into_diagnostics(),
        }
    }

    // ── token handling ───────────────────────────────────────────────

    /// Moves to the next valid token, recording lexical errors on the way.
    fn advance(&mut self) {
        loop {
            match self.lexer.next() {
                Some(Ok(token)) => {
                    self.current = token;
                    return;
                }
                Some(Err(e)) => self.lexical_error(&e),
                None => return,
            }
        }
    }

    fn at(&self, lexeme: &str) -> bool {
        self.current.is(lexeme)
    }

    fn at_end(&self) -> bool {
        self.current.kind == TokenKind::EndOfInput
    }

    /// On mismatch the offending token stays current.
    fn expect_lexeme(&mut self, lexeme: &str) {
        if !self.at(lexeme) {
            self.syntax_error(format!("expected '{lexeme}', found {}", self.current));
        }
        if !self.ctx.is_panicking() {
            self.advance();
        }
    }

    fn expect_kind(&mut self, kind: TokenKind) {
        if self.current.kind != kind {
            self.syntax_error(format!(
                "expected {}, found {}",
                describe_kind(kind),
                self.current
            ));
        }
        if !self.ctx.is_panicking() {
            self.advance();
        }
    }

    /// Skips to just after the next ';', or up to the next 'if'/'while'.
    fn synchronize(&mut self) {
        while !self.at_end() {
            if self.at("if") || self.at("while") {
                break;
            }
            if self.at(";") {
                self.advance();
                break;
            }
            self.advance();
        }
        self.ctx.clear_panic();
    }

    // ── diagnostics ──────────────────────────────────────────────────

    fn syntax_error(&mut self, message: String) {
        let token = self.current;
        self.ctx.record_error(Diagnostic::new(
            ErrorKind::Syntax,
            message,
            token.text,
            token.line,
            token.column,
        ));
    }

    fn semantic_error(&mut self, token: Token<'a>, message: String) {
        self.ctx.record_error(Diagnostic::new(
            ErrorKind::Semantic,
            message,
            token.text,
            token.line,
            token.column,
        ));
    }

    fn lexical_error(&mut self, e: &LexError) {
        let fragment = e.found.map(String::from).unwrap_or_default();
        self.ctx.record_error(Diagnostic::new(
            ErrorKind::Lexical,
            e.to_string(),
            fragment,
            e.line,
            e.column,
        ));
    }

    // ── symbols & code ───────────────────────────────────────────────

    fn emit(&mut self, ins: Instruction) {
        if !self.ctx.has_error() {
            self.code.push(ins);
        }
    }

    fn new_label(&mut self) -> usize {
        self.label_count += 1;
        self.label_count - 1
    }

    fn new_slot(&mut self) -> usize {
        self.next_slot += 1;
        self.next_slot - 1
    }

    fn declare(&mut self, token: Token<'a>, kind: EntryKind, slot: usize, arity: usize) {
        if let Err(e) = self.scopes.declare(token.text, kind, slot, arity) {
            self.semantic_error(token, e.to_string());
        }
    }

    /// Looks a name up unless a syntax error already made resolution unreliable.
    fn resolve(&mut self, token: Token<'a>, kind: EntryKind) -> Option<Entry> {
        if self.ctx.has_syntax_error() {
            return None;
        }
        match self.scopes.lookup(token.text, kind) {
            Ok(entry) => Some(entry.clone()),
            Err(e) => {
                self.semantic_error(token, e.to_string());
                None
            }
        }
    }

    // ── declarations ─────────────────────────────────────────────────

    fn program(&mut self) {
        self.scopes.push_scope();
        while !self.at_end() {
            self.next_slot = 0;
            self.function_declaration();
        }
        self.scopes.pop_scope();
        self.expect_kind(TokenKind::EndOfInput);
    }

    fn function_declaration(&mut self) {
        self.expect_lexeme("(");

        let name = self.current;
        // allocated before the body so the function can call itself
        let label = self.new_label();
        self.expect_kind(TokenKind::Identifier);

        let params = self.parameters();

        if !self.ctx.has_syntax_error() && name.kind == TokenKind::Identifier {
            self.declare(name, EntryKind::Function, label, params.len());
            self.functions.push(FunctionInfo {
                name: name.text.to_string(),
                label,
                arity: params.len(),
            });
        }
        self.emit(Instruction::Label(label));

        let opened = !self.ctx.has_syntax_error();
        if opened {
            self.scopes.push_scope();
        }
        for param in params {
            let slot = self.new_slot();
            if opened {
                self.declare(param, EntryKind::Variable, slot, 0);
            }
        }

        self.expect_lexeme("->");
        self.body();
        self.expect_lexeme(")");

        self.emit(Instruction::RetNone);
        if opened {
            self.scopes.pop_scope();
        }
    }

    fn parameters(&mut self) -> Vec<Token<'a>> {
        let mut params = Vec::new();
        if self.current.kind != TokenKind::Identifier {
            return params;
        }
        params.push(self.current);
        self.expect_kind(TokenKind::Identifier);

        while self.at(",") {
            if self.ctx.is_panicking() {
                break;
            }
            self.expect_lexeme(",");
            if self.current.kind == TokenKind::Identifier {
                params.push(self.current);
            }
            self.expect_kind(TokenKind::Identifier);
        }
        params
    }

    fn body(&mut self) {
        if self.ctx.is_panicking() {
            self.synchronize();
        }
        while !self.at(")") && !self.at_end() {
            self.statement();
            if self.ctx.is_panicking() {
                self.synchronize();
            }
        }
    }

    // ── statements ───────────────────────────────────────────────────

    fn statement(&mut self) {
        match (self.current.kind, self.current.text) {
            (TokenKind::Keyword, "decl") => self.declaration(),
            (TokenKind::Identifier, _) => self.assign_or_call(),
            (TokenKind::Keyword, "print") => self.print_statement(),
            (TokenKind::Keyword, "ret") => self.return_statement(),
            (TokenKind::Keyword, "if") => self.flow(Flow::If),
            (TokenKind::Keyword, "while") => self.flow(Flow::While),
            _ => self.syntax_error(format!("expected a statement, found {}", self.current)),
        }
    }

    fn declaration(&mut self) {
        self.expect_lexeme("decl");

        let name = self.current;
        let slot = self.new_slot();
        if !self.ctx.has_syntax_error() && name.kind == TokenKind::Identifier {
            self.declare(name, EntryKind::Variable, slot, 0);
        }
        self.expect_kind(TokenKind::Identifier);
        self.emit(Instruction::Decl(slot));

        self.expect_lexeme("=");
        self.or_expr();
        self.emit(Instruction::PushAddr(slot));
        self.emit(Instruction::SetEqual);
        self.expect_lexeme(";");
    }

    fn assign_or_call(&mut self) {
        let name = self.current;
        self.expect_kind(TokenKind::Identifier);

        if self.at("=") {
            let target = self.resolve(name, EntryKind::Variable);
            self.expect_lexeme("=");
            self.or_expr();
            if let Some(entry) = target {
                self.emit(Instruction::PushAddr(entry.slot));
                self.emit(Instruction::SetEqual);
            }
            self.expect_lexeme(";");
        } else if self.at("(") {
            self.call(name);
            self.expect_lexeme(";");
        } else {
            self.syntax_error(format!(
                "expected '=' or '(' after '{}', found {}",
                name.text, self.current
            ));
        }
    }

    fn print_statement(&mut self) {
        self.expect_lexeme("print");

        let name = self.current;
        let target = if name.kind == TokenKind::Identifier {
            self.resolve(name, EntryKind::Variable)
        } else {
            None
        };
        self.expect_kind(TokenKind::Identifier);
        if let Some(entry) = target {
            self.emit(Instruction::PushLocal(entry.slot));
            self.emit(Instruction::Print);
        }
        self.expect_lexeme(";");
    }

    fn return_statement(&mut self) {
        self.expect_lexeme("ret");
        self.or_expr();
        self.expect_lexeme(";");
        self.emit(Instruction::RetVal);
    }

    fn flow(&mut self, flow: Flow) {
        self.advance();

        let opened = !self.ctx.has_syntax_error();
        if opened {
            self.scopes.push_scope();
        }
        self.expect_lexeme("(");

        match flow {
            Flow::If => {
                let end = self.new_label();
                self.or_expr();
                self.emit(Instruction::Jmpf(end));
                self.expect_lexeme("->");
                self.body();
                self.emit(Instruction::Label(end));
            }
            Flow::While => {
                let head = self.new_label();
                let exit = self.new_label();
                self.emit(Instruction::Label(head));
                self.or_expr();
                self.emit(Instruction::Jmpf(exit));
                self.expect_lexeme("->");
                self.body();
                self.emit(Instruction::Jmp(head));
                self.emit(Instruction::Label(exit));
            }
        }

        self.expect_lexeme(")");
        if opened {
            self.scopes.pop_scope();
        }
    }

    // ── expressions ──────────────────────────────────────────────────

    /// Parses `operand (op operand)*`, emitting each operator after both sides.
    fn binary(&mut self, operators: &[(&str, Instruction)], operand: fn(&mut Self)) {
        operand(self);
        while let Some(ins) = self.operator_at(operators) {
            if self.ctx.is_panicking() {
                break;
            }
            self.advance();
            operand(self);
            self.emit(ins);
        }
    }

    fn operator_at(&self, operators: &[(&str, Instruction)]) -> Option<Instruction> {
        operators
            .iter()
            .find(|(lexeme, _)| self.at(lexeme))
            .map(|&(_, ins)| ins)
    }

    fn or_expr(&mut self) {
        self.binary(&[("or", Instruction::Or)], Self::and_expr);
    }

    fn and_expr(&mut self) {
        self.binary(&[("and", Instruction::And)], Self::relational);
    }

    fn relational(&mut self) {
        self.binary(
            &[("<", Instruction::LessThan), (">", Instruction::MoreThan)],
            Self::additive,
        );
    }

    fn additive(&mut self) {
        self.binary(
            &[("+", Instruction::Plus), ("-", Instruction::Minus)],
            Self::multiplicative,
        );
    }

    fn multiplicative(&mut self) {
        self.binary(
            &[("*", Instruction::Multiply), ("/", Instruction::Divide)],
            Self::value,
        );
    }

    fn value(&mut self) {
        // nothing is consumed while panicking
        if self.ctx.is_panicking() {
            return;
        }

        let token = self.current;
        match token.kind {
            TokenKind::Identifier => {
                self.advance();
                if self.at("(") {
                    self.call(token);
                } else if let Some(entry) = self.resolve(token, EntryKind::Variable) {
                    self.emit(Instruction::PushLocal(entry.slot));
                }
            }
            TokenKind::UnsignedInt | TokenKind::Real => {
                match token.text.parse::<f64>() {
                    Ok(v) => self.emit(Instruction::PushValue(v)),
                    Err(e) => self.ctx.record_error(Diagnostic::new(
                        ErrorKind::Lexical,
                        format!("malformed number: {e}"),
                        token.text,
                        token.line,
                        token.column,
                    )),
                }
                self.advance();
            }
            _ if self.at("(") => {
                self.advance();
                self.or_expr();
                self.expect_lexeme(")");
            }
            _ => self.syntax_error(format!("expected a value, found {token}")),
        }
    }

    /// Call site: resolve, parse arguments, check arity, emit `call`.
    ///
    /// On an arity mismatch the argument code is rolled back so the call site
    /// emits nothing.
    fn call(&mut self, name: Token<'a>) {
        let target = self.resolve(name, EntryKind::Function);
        let mark = self.code.len();
        let argc = self.arguments();

        let Some(entry) = target else { return };
        if self.ctx.has_syntax_error() {
            return;
        }
        if entry.arity != argc {
            self.code.truncate(mark);
            self.semantic_error(
                name,
                format!(
                    "incorrect number of arguments: '{}' takes {}, got {}",
                    name.text, entry.arity, argc
                ),
            );
            return;
        }
        self.emit(Instruction::Call {
            label: entry.slot,
            argc,
        });
    }

    fn arguments(&mut self) -> usize {
        self.expect_lexeme("(");

        let mut argc = 0;
        let starts_value = self.current.kind == TokenKind::Identifier
            || self.current.is_number()
            || self.at("(");
        if starts_value {
            self.argument();
            argc += 1;
            while self.at(",") {
                if self.ctx.is_panicking() {
                    break;
                }
                self.expect_lexeme(",");
                self.argument();
                argc += 1;
            }
        }

        self.expect_lexeme(")");
        argc
    }

    fn argument(&mut self) {
        self.or_expr();
        self.emit(Instruction::Param);
    }
}

fn describe_kind(kind: TokenKind) -> &'static str {
    match kind {
        TokenKind::Keyword => "a keyword",
        TokenKind::Identifier => "an identifier",
        TokenKind::UnsignedInt => "an integer",
        TokenKind::Real => "a real number",
        TokenKind::Delimiter => "a delimiter",
        TokenKind::Arrow => "'->'",
        TokenKind::EndOfInput => "end of input",
    }
}
