//! Recursive-descent parser for the ES5 grammar.
//!
//! Statements are parsed by keyword dispatch; expressions use precedence
//! climbing. Automatic semicolon insertion follows the ES5 rules: a missing
//! semicolon is inserted before a `}`, at end of input, or after a line
//! terminator, and the restricted productions (`return`, `break`,
//! `continue`, `throw`, postfix `++`/`--`) refuse to continue across a
//! newline.

use crate::ast::{
    AssignOp, Ast, BinaryOp, CatchClause, Declarator, Literal, LogicalOp, Node, SwitchCase,
    UnaryOp, UpdateOp,
};
use crate::error::ParseError;
use crate::lexer::{Keyword, Lexer, Token, TokenKind};
use core_types::NodeId;

/// Parses a complete program into the arena, returning the Program node id.
pub fn parse_program(ast: &mut Ast, source: &str) -> Result<NodeId, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(ast, tokens);
    parser.parse_program()
}

/// Parses a single expression starting at `offset` bytes into `source`.
///
/// Returns the expression node and the byte offset just past it. Used by
/// the host-exposed `parseExpressionAt` utility.
pub fn parse_expression_at(
    ast: &mut Ast,
    source: &str,
    offset: usize,
) -> Result<(NodeId, usize), ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let start = tokens
        .iter()
        .position(|t| t.start >= offset)
        .unwrap_or(tokens.len().saturating_sub(1));
    let mut parser = Parser::new(ast, tokens[start..].to_vec());
    let expr = parser.parse_assignment(false)?;
    let end = parser.previous_end();
    Ok((expr, end))
}

/// The parser over a token stream.
pub struct Parser<'a> {
    ast: &'a mut Ast,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    /// Creates a parser feeding nodes into the given arena.
    pub fn new(ast: &'a mut Ast, tokens: Vec<Token>) -> Self {
        Parser { ast, tokens, pos: 0 }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    fn peek_ahead(&self, n: usize) -> &TokenKind {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error_here(format!("expected {}", what)))
        }
    }

    fn error_here(&self, message: String) -> ParseError {
        let t = self.peek();
        ParseError::new(message, t.line, t.column)
    }

    fn previous_end(&self) -> usize {
        if self.pos == 0 {
            0
        } else {
            self.tokens[self.pos - 1].end
        }
    }

    /// True when a semicolon may be inserted before the current token.
    fn can_insert_semicolon(&self) -> bool {
        let t = self.peek();
        t.newline_before || matches!(t.kind, TokenKind::RBrace | TokenKind::Eof)
    }

    fn consume_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon) || self.can_insert_semicolon() {
            Ok(())
        } else {
            Err(self.error_here("expected ';'".to_string()))
        }
    }

    /// Parses statements until end of input and wraps them in a Program.
    pub fn parse_program(&mut self) -> Result<NodeId, ParseError> {
        let mut body = Vec::new();
        while !self.at(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        Ok(self.ast.push(Node::Program { body }))
    }

    fn parse_statement(&mut self) -> Result<NodeId, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(self.ast.push(Node::EmptyStatement))
            }
            TokenKind::Keyword(kw) => match kw {
                Keyword::Var => {
                    let decl = self.parse_var_declaration(true)?;
                    self.consume_semicolon()?;
                    Ok(decl)
                }
                Keyword::Function => self.parse_function_declaration(),
                Keyword::If => self.parse_if(),
                Keyword::While => self.parse_while(),
                Keyword::Do => self.parse_do_while(),
                Keyword::For => self.parse_for(),
                Keyword::Return => self.parse_return(),
                Keyword::Break => self.parse_break_continue(true),
                Keyword::Continue => self.parse_break_continue(false),
                Keyword::Throw => self.parse_throw(),
                Keyword::Try => self.parse_try(),
                Keyword::Switch => self.parse_switch(),
                Keyword::With => self.parse_with(),
                Keyword::Debugger => {
                    self.advance();
                    self.consume_semicolon()?;
                    Ok(self.ast.push(Node::DebuggerStatement))
                }
                _ => self.parse_expression_statement(),
            },
            TokenKind::Ident(label) if *self.peek_ahead(1) == TokenKind::Colon => {
                self.advance();
                self.advance();
                let body = self.parse_statement()?;
                Ok(self.ast.push(Node::LabeledStatement { label, body }))
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_block(&mut self) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.ast.push(Node::BlockStatement { body }))
    }

    /// Parses `var a = x, b, c = y` without the trailing semicolon.
    fn parse_var_declaration(&mut self, allow_in: bool) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::Keyword(Keyword::Var), "'var'")?;
        let mut declarations = Vec::new();
        loop {
            let name = self.parse_identifier_name()?;
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.parse_assignment(!allow_in)?)
            } else {
                None
            };
            declarations.push(Declarator { name, init });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(self.ast.push(Node::VariableDeclaration { declarations }))
    }

    fn parse_identifier_name(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => Err(self.error_here("expected identifier".to_string())),
        }
    }

    fn parse_function_declaration(&mut self) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::Keyword(Keyword::Function), "'function'")?;
        let name = self.parse_identifier_name()?;
        let function = self.parse_function_rest(Some(name))?;
        Ok(self.ast.push(Node::FunctionDeclaration { function }))
    }

    /// Parses the parameter list and body; the `function` keyword (and an
    /// optional name) have already been consumed.
    fn parse_function_rest(&mut self, name: Option<String>) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                params.push(self.parse_identifier_name()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut body = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            body.push(self.parse_statement()?);
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.ast.push(Node::Function { name, params, body }))
    }

    fn parse_if(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        let consequent = self.parse_statement()?;
        let alternate = if self.eat(&TokenKind::Keyword(Keyword::Else)) {
            Some(self.parse_statement()?)
        } else {
            None
        };
        Ok(self.ast.push(Node::IfStatement {
            test,
            consequent,
            alternate,
        }))
    }

    fn parse_while(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_statement()?;
        Ok(self.ast.push(Node::WhileStatement { test, body }))
    }

    fn parse_do_while(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        let body = self.parse_statement()?;
        self.expect(&TokenKind::Keyword(Keyword::While), "'while'")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let test = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        // The semicolon after do-while is always optional.
        self.eat(&TokenKind::Semicolon);
        Ok(self.ast.push(Node::DoWhileStatement { body, test }))
    }

    fn parse_for(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;

        let init = if self.at(&TokenKind::Semicolon) {
            None
        } else if self.at(&TokenKind::Keyword(Keyword::Var)) {
            let decl = self.parse_var_declaration(false)?;
            if self.at(&TokenKind::Keyword(Keyword::In)) {
                let single = match self.ast.node(decl) {
                    Node::VariableDeclaration { declarations } => declarations.len() == 1,
                    _ => false,
                };
                if !single {
                    return Err(
                        self.error_here("for-in target must declare one variable".to_string())
                    );
                }
                return self.parse_for_in_rest(decl);
            }
            Some(decl)
        } else {
            let expr = self.parse_expression(true)?;
            if self.at(&TokenKind::Keyword(Keyword::In)) {
                if !self.is_reference(expr) {
                    return Err(self.error_here("invalid for-in target".to_string()));
                }
                return self.parse_for_in_rest(expr);
            }
            Some(expr)
        };

        self.expect(&TokenKind::Semicolon, "';'")?;
        let test = if self.at(&TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(&TokenKind::Semicolon, "';'")?;
        let update = if self.at(&TokenKind::RParen) {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_statement()?;
        Ok(self.ast.push(Node::ForStatement {
            init,
            test,
            update,
            body,
        }))
    }

    fn parse_for_in_rest(&mut self, left: NodeId) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::Keyword(Keyword::In), "'in'")?;
        let right = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_statement()?;
        Ok(self.ast.push(Node::ForInStatement { left, right, body }))
    }

    fn parse_return(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        let argument = if self.at(&TokenKind::Semicolon) || self.can_insert_semicolon() {
            None
        } else {
            Some(self.parse_expression(false)?)
        };
        self.consume_semicolon()?;
        Ok(self.ast.push(Node::ReturnStatement { argument }))
    }

    fn parse_break_continue(&mut self, is_break: bool) -> Result<NodeId, ParseError> {
        self.advance();
        let label = match self.peek_kind().clone() {
            TokenKind::Ident(name) if !self.peek().newline_before => {
                self.advance();
                Some(name)
            }
            _ => None,
        };
        self.consume_semicolon()?;
        Ok(self.ast.push(if is_break {
            Node::BreakStatement { label }
        } else {
            Node::ContinueStatement { label }
        }))
    }

    fn parse_throw(&mut self) -> Result<NodeId, ParseError> {
        let token = self.advance();
        if self.peek().newline_before {
            return Err(ParseError::new(
                "newline after throw",
                token.line,
                token.column,
            ));
        }
        let argument = self.parse_expression(false)?;
        self.consume_semicolon()?;
        Ok(self.ast.push(Node::ThrowStatement { argument }))
    }

    fn parse_try(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        let block = self.parse_block()?;
        let handler = if self.eat(&TokenKind::Keyword(Keyword::Catch)) {
            self.expect(&TokenKind::LParen, "'('")?;
            let param = self.parse_identifier_name()?;
            self.expect(&TokenKind::RParen, "')'")?;
            let body = self.parse_block()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat(&TokenKind::Keyword(Keyword::Finally)) {
            Some(self.parse_block()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(self.error_here("missing catch or finally".to_string()));
        }
        Ok(self.ast.push(Node::TryStatement {
            block,
            handler,
            finalizer,
        }))
    }

    fn parse_switch(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let discriminant = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut cases = Vec::new();
        let mut saw_default = false;
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let test = if self.eat(&TokenKind::Keyword(Keyword::Case)) {
                Some(self.parse_expression(false)?)
            } else if self.at(&TokenKind::Keyword(Keyword::Default)) {
                if saw_default {
                    return Err(self.error_here("multiple default clauses".to_string()));
                }
                saw_default = true;
                self.advance();
                None
            } else {
                return Err(self.error_here("expected 'case' or 'default'".to_string()));
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let mut consequent = Vec::new();
            while !self.at(&TokenKind::RBrace)
                && !self.at(&TokenKind::Keyword(Keyword::Case))
                && !self.at(&TokenKind::Keyword(Keyword::Default))
                && !self.at(&TokenKind::Eof)
            {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.ast.push(Node::SwitchStatement {
            discriminant,
            cases,
        }))
    }

    fn parse_with(&mut self) -> Result<NodeId, ParseError> {
        self.advance();
        self.expect(&TokenKind::LParen, "'('")?;
        let object = self.parse_expression(false)?;
        self.expect(&TokenKind::RParen, "')'")?;
        let body = self.parse_statement()?;
        Ok(self.ast.push(Node::WithStatement { object, body }))
    }

    fn parse_expression_statement(&mut self) -> Result<NodeId, ParseError> {
        let expression = self.parse_expression(false)?;
        self.consume_semicolon()?;
        Ok(self.ast.push(Node::ExpressionStatement { expression }))
    }

    /// Parses a full (comma) expression. `no_in` excludes the `in` operator,
    /// as required inside a classic for-statement head.
    pub fn parse_expression(&mut self, no_in: bool) -> Result<NodeId, ParseError> {
        let first = self.parse_assignment(no_in)?;
        if !self.at(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat(&TokenKind::Comma) {
            expressions.push(self.parse_assignment(no_in)?);
        }
        Ok(self.ast.push(Node::SequenceExpression { expressions }))
    }

    fn assign_op(kind: &TokenKind) -> Option<AssignOp> {
        Some(match kind {
            TokenKind::Assign => AssignOp::Assign,
            TokenKind::PlusAssign => AssignOp::Add,
            TokenKind::MinusAssign => AssignOp::Sub,
            TokenKind::StarAssign => AssignOp::Mul,
            TokenKind::SlashAssign => AssignOp::Div,
            TokenKind::PercentAssign => AssignOp::Mod,
            TokenKind::ShlAssign => AssignOp::Shl,
            TokenKind::ShrAssign => AssignOp::Shr,
            TokenKind::UShrAssign => AssignOp::UShr,
            TokenKind::OrAssign => AssignOp::BitOr,
            TokenKind::XorAssign => AssignOp::BitXor,
            TokenKind::AndAssign => AssignOp::BitAnd,
            _ => return None,
        })
    }

    fn is_reference(&self, node: NodeId) -> bool {
        matches!(
            self.ast.node(node),
            Node::Identifier { .. } | Node::MemberExpression { .. }
        )
    }

    /// Parses an assignment expression (right-associative).
    pub fn parse_assignment(&mut self, no_in: bool) -> Result<NodeId, ParseError> {
        let left = self.parse_conditional(no_in)?;
        if let Some(operator) = Self::assign_op(self.peek_kind()) {
            if !self.is_reference(left) {
                return Err(self.error_here("invalid assignment target".to_string()));
            }
            self.advance();
            let right = self.parse_assignment(no_in)?;
            return Ok(self.ast.push(Node::AssignmentExpression {
                operator,
                left,
                right,
            }));
        }
        Ok(left)
    }

    fn parse_conditional(&mut self, no_in: bool) -> Result<NodeId, ParseError> {
        let test = self.parse_binary(1, no_in)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assignment(false)?;
        self.expect(&TokenKind::Colon, "':'")?;
        let alternate = self.parse_assignment(no_in)?;
        Ok(self.ast.push(Node::ConditionalExpression {
            test,
            consequent,
            alternate,
        }))
    }

    /// Binary operator precedence; logical operators participate in the same
    /// climb but build LogicalExpression nodes.
    fn binary_prec(kind: &TokenKind, no_in: bool) -> Option<(u8, Result<BinaryOp, LogicalOp>)> {
        Some(match kind {
            TokenKind::OrOr => (1, Err(LogicalOp::Or)),
            TokenKind::AndAnd => (2, Err(LogicalOp::And)),
            TokenKind::BitOr => (3, Ok(BinaryOp::BitOr)),
            TokenKind::BitXor => (4, Ok(BinaryOp::BitXor)),
            TokenKind::BitAnd => (5, Ok(BinaryOp::BitAnd)),
            TokenKind::EqEq => (6, Ok(BinaryOp::Eq)),
            TokenKind::NotEq => (6, Ok(BinaryOp::NotEq)),
            TokenKind::EqEqEq => (6, Ok(BinaryOp::StrictEq)),
            TokenKind::NotEqEq => (6, Ok(BinaryOp::StrictNotEq)),
            TokenKind::Lt => (7, Ok(BinaryOp::Lt)),
            TokenKind::LtEq => (7, Ok(BinaryOp::LtEq)),
            TokenKind::Gt => (7, Ok(BinaryOp::Gt)),
            TokenKind::GtEq => (7, Ok(BinaryOp::GtEq)),
            TokenKind::Keyword(Keyword::Instanceof) => (7, Ok(BinaryOp::Instanceof)),
            TokenKind::Keyword(Keyword::In) if !no_in => (7, Ok(BinaryOp::In)),
            TokenKind::Shl => (8, Ok(BinaryOp::Shl)),
            TokenKind::Shr => (8, Ok(BinaryOp::Shr)),
            TokenKind::UShr => (8, Ok(BinaryOp::UShr)),
            TokenKind::Plus => (9, Ok(BinaryOp::Add)),
            TokenKind::Minus => (9, Ok(BinaryOp::Sub)),
            TokenKind::Star => (10, Ok(BinaryOp::Mul)),
            TokenKind::Slash => (10, Ok(BinaryOp::Div)),
            TokenKind::Percent => (10, Ok(BinaryOp::Mod)),
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8, no_in: bool) -> Result<NodeId, ParseError> {
        let mut left = self.parse_unary(no_in)?;
        while let Some((prec, op)) = Self::binary_prec(self.peek_kind(), no_in) {
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1, no_in)?;
            left = self.ast.push(match op {
                Ok(operator) => Node::BinaryExpression {
                    operator,
                    left,
                    right,
                },
                Err(operator) => Node::LogicalExpression {
                    operator,
                    left,
                    right,
                },
            });
        }
        Ok(left)
    }

    fn parse_unary(&mut self, no_in: bool) -> Result<NodeId, ParseError> {
        let operator = match self.peek_kind() {
            TokenKind::Minus => Some(UnaryOp::Minus),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Not => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Keyword(Keyword::Typeof) => Some(UnaryOp::Typeof),
            TokenKind::Keyword(Keyword::Void) => Some(UnaryOp::Void),
            TokenKind::Keyword(Keyword::Delete) => Some(UnaryOp::Delete),
            _ => None,
        };
        if let Some(operator) = operator {
            self.advance();
            let argument = self.parse_unary(no_in)?;
            return Ok(self.ast.push(Node::UnaryExpression { operator, argument }));
        }
        if matches!(self.peek_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let operator = if self.advance().kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            let argument = self.parse_unary(no_in)?;
            if !self.is_reference(argument) {
                return Err(self.error_here("invalid update target".to_string()));
            }
            return Ok(self.ast.push(Node::UpdateExpression {
                operator,
                prefix: true,
                argument,
            }));
        }
        self.parse_postfix(no_in)
    }

    fn parse_postfix(&mut self, _no_in: bool) -> Result<NodeId, ParseError> {
        let argument = self.parse_left_hand_side(true)?;
        // Postfix operators are a restricted production: no newline allowed.
        if matches!(self.peek_kind(), TokenKind::PlusPlus | TokenKind::MinusMinus)
            && !self.peek().newline_before
        {
            if !self.is_reference(argument) {
                return Err(self.error_here("invalid update target".to_string()));
            }
            let operator = if self.advance().kind == TokenKind::PlusPlus {
                UpdateOp::Increment
            } else {
                UpdateOp::Decrement
            };
            return Ok(self.ast.push(Node::UpdateExpression {
                operator,
                prefix: false,
                argument,
            }));
        }
        Ok(argument)
    }

    fn parse_left_hand_side(&mut self, allow_call: bool) -> Result<NodeId, ParseError> {
        let mut expr = if self.at(&TokenKind::Keyword(Keyword::New)) {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.advance();
                    let name = self.parse_property_name()?;
                    let property = self.ast.push(Node::Identifier { name });
                    expr = self.ast.push(Node::MemberExpression {
                        object: expr,
                        property,
                        computed: false,
                    });
                }
                TokenKind::LBracket => {
                    self.advance();
                    let property = self.parse_expression(false)?;
                    self.expect(&TokenKind::RBracket, "']'")?;
                    expr = self.ast.push(Node::MemberExpression {
                        object: expr,
                        property,
                        computed: true,
                    });
                }
                TokenKind::LParen if allow_call => {
                    let arguments = self.parse_arguments()?;
                    expr = self.ast.push(Node::CallExpression {
                        callee: expr,
                        arguments,
                    });
                }
                _ => return Ok(expr),
            }
        }
    }

    /// After a dot, any identifier or keyword is a valid property name.
    fn parse_property_name(&mut self) -> Result<String, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            TokenKind::Keyword(kw) => {
                self.advance();
                Ok(keyword_text(kw).to_string())
            }
            _ => Err(self.error_here("expected property name".to_string())),
        }
    }

    fn parse_new(&mut self) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::Keyword(Keyword::New), "'new'")?;
        let callee = self.parse_left_hand_side(false)?;
        let arguments = if self.at(&TokenKind::LParen) {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(self.ast.push(Node::NewExpression { callee, arguments }))
    }

    fn parse_arguments(&mut self) -> Result<Vec<NodeId>, ParseError> {
        self.expect(&TokenKind::LParen, "'('")?;
        let mut arguments = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                arguments.push(self.parse_assignment(false)?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> Result<NodeId, ParseError> {
        match self.peek_kind().clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(self.ast.push(Node::Identifier { name }))
            }
            TokenKind::Number(n) => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::Number(n),
                }))
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::String(s),
                }))
            }
            TokenKind::Regex { pattern, flags } => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::Regex { pattern, flags },
                }))
            }
            TokenKind::Keyword(Keyword::True) => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::Boolean(true),
                }))
            }
            TokenKind::Keyword(Keyword::False) => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::Boolean(false),
                }))
            }
            TokenKind::Keyword(Keyword::Null) => {
                self.advance();
                Ok(self.ast.push(Node::Literal {
                    value: Literal::Null,
                }))
            }
            TokenKind::Keyword(Keyword::This) => {
                self.advance();
                Ok(self.ast.push(Node::ThisExpression))
            }
            TokenKind::Keyword(Keyword::Function) => {
                self.advance();
                let name = match self.peek_kind().clone() {
                    TokenKind::Ident(name) => {
                        self.advance();
                        Some(name)
                    }
                    _ => None,
                };
                self.parse_function_rest(name)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expression(false)?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            _ => Err(self.error_here("unexpected token".to_string())),
        }
    }

    fn parse_array_literal(&mut self) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::LBracket, "'['")?;
        let mut elements = Vec::new();
        while !self.at(&TokenKind::RBracket) && !self.at(&TokenKind::Eof) {
            if self.eat(&TokenKind::Comma) {
                elements.push(None); // elision hole
                continue;
            }
            elements.push(Some(self.parse_assignment(false)?));
            if !self.at(&TokenKind::RBracket) {
                self.expect(&TokenKind::Comma, "','")?;
            }
        }
        self.expect(&TokenKind::RBracket, "']'")?;
        Ok(self.ast.push(Node::ArrayExpression { elements }))
    }

    fn parse_object_literal(&mut self) -> Result<NodeId, ParseError> {
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut properties = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let key = match self.peek_kind().clone() {
                TokenKind::Ident(name) => {
                    self.advance();
                    name
                }
                TokenKind::String(s) => {
                    self.advance();
                    s
                }
                TokenKind::Number(n) => {
                    self.advance();
                    core_types::number_to_string(n)
                }
                TokenKind::Keyword(kw) => {
                    self.advance();
                    keyword_text(kw).to_string()
                }
                _ => return Err(self.error_here("expected property key".to_string())),
            };
            self.expect(&TokenKind::Colon, "':'")?;
            let value = self.parse_assignment(false)?;
            properties.push((key, value));
            if !self.at(&TokenKind::RBrace) {
                self.expect(&TokenKind::Comma, "','")?;
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(self.ast.push(Node::ObjectExpression { properties }))
    }
}

fn keyword_text(kw: Keyword) -> &'static str {
    match kw {
        Keyword::Var => "var",
        Keyword::Function => "function",
        Keyword::Return => "return",
        Keyword::If => "if",
        Keyword::Else => "else",
        Keyword::While => "while",
        Keyword::Do => "do",
        Keyword::For => "for",
        Keyword::Break => "break",
        Keyword::Continue => "continue",
        Keyword::New => "new",
        Keyword::This => "this",
        Keyword::True => "true",
        Keyword::False => "false",
        Keyword::Null => "null",
        Keyword::Typeof => "typeof",
        Keyword::Void => "void",
        Keyword::Delete => "delete",
        Keyword::Instanceof => "instanceof",
        Keyword::In => "in",
        Keyword::Try => "try",
        Keyword::Catch => "catch",
        Keyword::Finally => "finally",
        Keyword::Throw => "throw",
        Keyword::Switch => "switch",
        Keyword::Case => "case",
        Keyword::Default => "default",
        Keyword::With => "with",
        Keyword::Debugger => "debugger",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> (Ast, NodeId) {
        let mut ast = Ast::new();
        let program = parse_program(&mut ast, src).unwrap();
        (ast, program)
    }

    fn program_body(ast: &Ast, program: NodeId) -> Vec<NodeId> {
        match ast.node(program) {
            Node::Program { body } => body.clone(),
            other => panic!("expected program, got {:?}", other),
        }
    }

    #[test]
    fn test_var_statement() {
        let (ast, program) = parse("var x = 1, y;");
        let body = program_body(&ast, program);
        assert_eq!(body.len(), 1);
        match ast.node(body[0]) {
            Node::VariableDeclaration { declarations } => {
                assert_eq!(declarations.len(), 2);
                assert_eq!(declarations[0].name, "x");
                assert!(declarations[0].init.is_some());
                assert_eq!(declarations[1].name, "y");
                assert!(declarations[1].init.is_none());
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 parses as 1 + (2 * 3)
        let (ast, program) = parse("1 + 2 * 3;");
        let body = program_body(&ast, program);
        let expr = match ast.node(body[0]) {
            Node::ExpressionStatement { expression } => *expression,
            other => panic!("unexpected node {:?}", other),
        };
        match ast.node(expr) {
            Node::BinaryExpression {
                operator: BinaryOp::Add,
                right,
                ..
            } => match ast.node(*right) {
                Node::BinaryExpression {
                    operator: BinaryOp::Mul,
                    ..
                } => {}
                other => panic!("expected multiplication, got {:?}", other),
            },
            other => panic!("expected addition, got {:?}", other),
        }
    }

    #[test]
    fn test_assignment_right_associative() {
        let (ast, program) = parse("a = b = 1;");
        let body = program_body(&ast, program);
        let expr = match ast.node(body[0]) {
            Node::ExpressionStatement { expression } => *expression,
            _ => unreachable!(),
        };
        match ast.node(expr) {
            Node::AssignmentExpression { right, .. } => {
                assert!(matches!(
                    ast.node(*right),
                    Node::AssignmentExpression { .. }
                ));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_for_in_with_var() {
        let (ast, program) = parse("for (var k in o) {}");
        let body = program_body(&ast, program);
        assert!(matches!(ast.node(body[0]), Node::ForInStatement { .. }));
    }

    #[test]
    fn test_for_classic_with_in_expression() {
        // The no-in restriction only applies to the head's init part.
        let (ast, program) = parse("for (var i = 0; 'x' in o; i++) {}");
        let body = program_body(&ast, program);
        assert!(matches!(ast.node(body[0]), Node::ForStatement { .. }));
    }

    #[test]
    fn test_new_member_call_chain() {
        let (ast, program) = parse("new a.b(1).c(2);");
        let body = program_body(&ast, program);
        let expr = match ast.node(body[0]) {
            Node::ExpressionStatement { expression } => *expression,
            _ => unreachable!(),
        };
        // Outermost is the .c(2) call on the construction result.
        match ast.node(expr) {
            Node::CallExpression { callee, .. } => match ast.node(*callee) {
                Node::MemberExpression { object, .. } => {
                    assert!(matches!(ast.node(*object), Node::NewExpression { .. }));
                }
                other => panic!("unexpected node {:?}", other),
            },
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_asi_inserts_semicolons() {
        let (ast, program) = parse("var a = 1\nvar b = 2\nb");
        assert_eq!(program_body(&ast, program).len(), 3);
    }

    #[test]
    fn test_asi_restricted_return() {
        let (ast, program) = parse("function f() { return\n1; }");
        let body = program_body(&ast, program);
        let func = match ast.node(body[0]) {
            Node::FunctionDeclaration { function } => *function,
            _ => unreachable!(),
        };
        match ast.node(func) {
            Node::Function { body, .. } => {
                // return and the orphaned expression statement
                assert_eq!(body.len(), 2);
                assert!(matches!(
                    ast.node(body[0]),
                    Node::ReturnStatement { argument: None }
                ));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_labeled_statement() {
        let (ast, program) = parse("outer: for (;;) { break outer; }");
        let body = program_body(&ast, program);
        match ast.node(body[0]) {
            Node::LabeledStatement { label, .. } => assert_eq!(label, "outer"),
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_try_requires_handler_or_finalizer() {
        let mut ast = Ast::new();
        assert!(parse_program(&mut ast, "try {}").is_err());
        assert!(parse_program(&mut ast, "try {} catch (e) {}").is_ok());
        assert!(parse_program(&mut ast, "try {} finally {}").is_ok());
    }

    #[test]
    fn test_object_literal_keys() {
        let (ast, program) = parse("var o = { a: 1, 'b c': 2, 3: 4, default: 5 };");
        let body = program_body(&ast, program);
        let init = match ast.node(body[0]) {
            Node::VariableDeclaration { declarations } => declarations[0].init.unwrap(),
            _ => unreachable!(),
        };
        match ast.node(init) {
            Node::ObjectExpression { properties } => {
                let keys: Vec<&str> = properties.iter().map(|(k, _)| k.as_str()).collect();
                assert_eq!(keys, vec!["a", "b c", "3", "default"]);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_array_holes_and_trailing_comma() {
        let (ast, program) = parse("var a = [1, , 3, ];");
        let body = program_body(&ast, program);
        let init = match ast.node(body[0]) {
            Node::VariableDeclaration { declarations } => declarations[0].init.unwrap(),
            _ => unreachable!(),
        };
        match ast.node(init) {
            Node::ArrayExpression { elements } => {
                assert_eq!(elements.len(), 3);
                assert!(elements[0].is_some());
                assert!(elements[1].is_none());
                assert!(elements[2].is_some());
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn test_parse_expression_at() {
        let mut ast = Ast::new();
        let src = "ignored; 1 + 2 * 3";
        let (expr, end) = parse_expression_at(&mut ast, src, 9).unwrap();
        assert!(matches!(ast.node(expr), Node::BinaryExpression { .. }));
        assert_eq!(end, src.len());
    }

    #[test]
    fn test_syntax_errors() {
        let mut ast = Ast::new();
        assert!(parse_program(&mut ast, "var = 3;").is_err());
        assert!(parse_program(&mut ast, "if (a {}").is_err());
        assert!(parse_program(&mut ast, "1 = 2;").is_err());
    }
}
