use std::sync::Arc;

use crate::{
    ast::{BinaryOp, Expr, ExprKind, StatementOp, UnaryOp},
    diagnostics::{Diagnostic, DiagnosticKind, SourceSpan},
    lexer::{Keyword, Lexer, Token, TokenKind},
};

/// Lexes and parses a whole script into its top-level expressions.
pub fn parse_script(source: &str) -> Result<Vec<Expr>, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser::new(tokens).parse_script()
}

/// Parses exactly one expression, rejecting trailing statements.
pub fn parse_expression(source: &str) -> Result<Expr, Diagnostic> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser::new(tokens);
    let expr = parser.parse_expression()?;
    parser.consume_optional_semicolon();
    if !parser.check(TokenKind::Eof) {
        let token = parser.advance();
        return Err(parser.error(&token, "expected end of input"));
    }
    Ok(expr)
}

type ParseFn = fn(&mut Parser) -> Result<Expr, Diagnostic>;

struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, current: 0 }
    }

    fn parse_script(&mut self) -> Result<Vec<Expr>, Diagnostic> {
        self.parse_statements(TokenKind::Eof)
    }

    fn parse_statements(&mut self, terminator: TokenKind) -> Result<Vec<Expr>, Diagnostic> {
        let mut items = Vec::new();
        loop {
            while self.matches(TokenKind::Semicolon) {}
            if self.check(terminator) {
                break;
            }
            if self.check(TokenKind::Eof) {
                let token = self.advance();
                return Err(self.error(&token, "expected `}` to close block"));
            }
            items.push(self.parse_expression()?);
            if !self.matches(TokenKind::Semicolon) && !self.check(terminator) {
                let token = self.advance();
                return Err(self.error(&token, "expected `;` between expressions"));
            }
        }
        Ok(items)
    }

    fn parse_expression(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, Diagnostic> {
        let target = self.parse_ternary()?;
        if self.matches(TokenKind::Assign) {
            let value = self.parse_assignment()?;
            return Ok(binary(BinaryOp::Assign, target, value));
        }
        Ok(target)
    }

    fn parse_ternary(&mut self) -> Result<Expr, Diagnostic> {
        let condition = self.parse_null_coalesce()?;
        if !self.matches(TokenKind::Question) {
            return Ok(condition);
        }
        let then_branch = self.parse_assignment()?;
        if self.matches(TokenKind::Colon) {
            let else_branch = self.parse_assignment()?;
            let span = condition.span.to(else_branch.span);
            return Ok(Expr::new(
                ExprKind::TernaryConditional {
                    condition: Box::new(condition),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                span,
            ));
        }
        Ok(binary(BinaryOp::Conditional, condition, then_branch))
    }

    fn parse_null_coalesce(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[(TokenKind::DoubleQuestion, BinaryOp::NullCoalesce)],
            Parser::parse_or,
        )
    }

    fn parse_or(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(&[(TokenKind::DoublePipe, BinaryOp::Or)], Parser::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[(TokenKind::DoubleAmpersand, BinaryOp::And)],
            Parser::parse_equality,
        )
    }

    fn parse_equality(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[
                (TokenKind::EqualEqual, BinaryOp::Equal),
                (TokenKind::BangEqual, BinaryOp::NotEqual),
            ],
            Parser::parse_comparison,
        )
    }

    fn parse_comparison(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[
                (TokenKind::LessEqual, BinaryOp::LessEqual),
                (TokenKind::GreaterEqual, BinaryOp::GreaterEqual),
                (TokenKind::Less, BinaryOp::Less),
                (TokenKind::Greater, BinaryOp::Greater),
            ],
            Parser::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[
                (TokenKind::Plus, BinaryOp::Add),
                (TokenKind::Minus, BinaryOp::Sub),
            ],
            Parser::parse_factor,
        )
    }

    fn parse_factor(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_left_assoc(
            &[
                (TokenKind::Star, BinaryOp::Mul),
                (TokenKind::Slash, BinaryOp::Div),
            ],
            Parser::parse_unary,
        )
    }

    fn parse_left_assoc(
        &mut self,
        operators: &[(TokenKind, BinaryOp)],
        next: ParseFn,
    ) -> Result<Expr, Diagnostic> {
        let mut expr = next(self)?;
        while let Some(op) = operators
            .iter()
            .find(|(kind, _)| self.check(*kind))
            .map(|(_, op)| *op)
        {
            self.advance();
            let right = next(self)?;
            expr = binary(op, expr, right);
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = if self.matches(TokenKind::Minus) {
            UnaryOp::Negate
        } else if self.matches(TokenKind::Bang) {
            UnaryOp::Not
        } else {
            return self.parse_postfix(true);
        };
        let operator = self.previous().span;
        let operand = self.parse_unary()?;
        let span = operator.to(operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                expr: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_postfix(&mut self, allow_arrow: bool) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.matches(TokenKind::LParen) {
                let mut args = Vec::new();
                if !self.check(TokenKind::RParen) {
                    loop {
                        args.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let paren = self.consume(TokenKind::RParen, "expected `)` after arguments")?;
                let span = expr.span.to(paren.span);
                expr = Expr::new(
                    ExprKind::Call {
                        function: Box::new(expr),
                        args,
                    },
                    span,
                );
            } else if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let bracket = self.consume(TokenKind::RBracket, "expected `]` after index")?;
                let span = expr.span.to(bracket.span);
                expr = Expr::new(
                    ExprKind::ArrayAccess {
                        array: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.matches(TokenKind::Dot) {
                let ident = self.consume(TokenKind::Identifier, "expected property after `.`")?;
                let span = expr.span.to(ident.span);
                expr = Expr::new(
                    ExprKind::Access {
                        object: Box::new(expr),
                        property: ident.text().to_string(),
                    },
                    span,
                );
            } else if allow_arrow && self.matches(TokenKind::Arrow) {
                let target = self.parse_postfix(false)?;
                expr = binary(BinaryOp::Arrow, expr, target);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let token = self.advance();
        let kind = match token.kind {
            TokenKind::Number => {
                let value = token.text().parse::<f64>().map_err(|_| {
                    self.error(&token, &format!("invalid number literal `{}`", token.text()))
                })?;
                ExprKind::DoubleLiteral(value)
            }
            TokenKind::String => ExprKind::StringLiteral(token.text().to_string()),
            TokenKind::Identifier => ExprKind::Identifier(token.text().to_string()),
            TokenKind::Keyword(Keyword::True) => ExprKind::DoubleLiteral(1.0),
            TokenKind::Keyword(Keyword::False) => ExprKind::DoubleLiteral(0.0),
            TokenKind::Keyword(Keyword::Break) => ExprKind::Statement(StatementOp::Break),
            TokenKind::Keyword(Keyword::Continue) => ExprKind::Statement(StatementOp::Continue),
            TokenKind::Keyword(Keyword::Return) => {
                let value = self.parse_expression()?;
                let span = token.span.to(value.span);
                return Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Return,
                        expr: Box::new(value),
                    },
                    span,
                ));
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                let rparen = self.consume(TokenKind::RParen, "expected `)` after expression")?;
                return Ok(Expr::new(inner.kind, token.span.to(rparen.span)));
            }
            TokenKind::LBrace => {
                let statements = self.parse_statements(TokenKind::RBrace)?;
                let rbrace = self.consume(TokenKind::RBrace, "expected `}` to close block")?;
                return Ok(Expr::new(
                    ExprKind::ExecutionScope(Arc::from(statements)),
                    token.span.to(rbrace.span),
                ));
            }
            TokenKind::LBracket => {
                let mut elements = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        elements.push(self.parse_expression()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let rbracket =
                    self.consume(TokenKind::RBracket, "expected `]` after array literal")?;
                return Ok(Expr::new(
                    ExprKind::ArrayLiteral(elements),
                    token.span.to(rbracket.span),
                ));
            }
            TokenKind::Eof => return Err(self.error(&token, "unexpected end of expression")),
            _ => return Err(self.error(&token, "unexpected token in expression")),
        };
        Ok(Expr::new(kind, token.span))
    }

    fn consume_optional_semicolon(&mut self) {
        let _ = self.matches(TokenKind::Semicolon);
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> Result<Token, Diagnostic> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(self.error(&token, message))
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.current += 1;
        }
        token
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn peek(&self) -> &Token {
        // the lexer always terminates the stream with `Eof`
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn error(&self, token: &Token, message: &str) -> Diagnostic {
        Diagnostic::new(DiagnosticKind::Parser, message.to_string()).with_span(token.span)
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    let span = left.span.to(right.span);
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        span,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render(source: &str) -> Vec<String> {
        parse_script(source)
            .expect("parse should succeed")
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn respects_operator_precedence() {
        assert_eq!(render("1 + 2 * 3"), vec!["(1.0 + (2.0 * 3.0))"]);
        assert_eq!(
            render("1 < 2 && 2 < 3 || !0"),
            vec!["(((1.0 < 2.0) && (2.0 < 3.0)) || !0.0)"]
        );
        assert_eq!(render("a ?? b || c"), vec!["(a ?? (b || c))"]);
        assert_eq!(render("1 - 2 - 3"), vec!["((1.0 - 2.0) - 3.0)"]);
        assert_eq!(render("-a.b * 2"), vec!["(-a.b * 2.0)"]);
    }

    #[test]
    fn parses_assignment_ternary_and_conditional() {
        assert_eq!(render("temp.x = temp.y = 2"), vec!["(temp.x = (temp.y = 2.0))"]);
        assert_eq!(
            render("true ? (temp.a = 1) : (temp.a = 2)"),
            vec!["(1.0 ? (temp.a = 1.0) : (temp.a = 2.0))"]
        );
        assert_eq!(render("q.ready ? 5"), vec!["(q.ready ? 5.0)"]);
    }

    #[test]
    fn parses_postfix_chains_and_arrow() {
        assert_eq!(
            render("math.max(1, v.list[2]).x"),
            vec!["math.max(1.0, v.list[2.0]).x"]
        );
        assert_eq!(
            render("v.other -> q.health > 5"),
            vec!["((v.other -> q.health) > 5.0)"]
        );
    }

    #[test]
    fn parses_statement_lists_and_blocks() {
        assert_eq!(
            render("temp.x = 5; temp.x;"),
            vec!["(temp.x = 5.0)", "temp.x"]
        );
        assert_eq!(
            render("loop(3, { temp.c = temp.c + 1; break; });"),
            vec!["loop(3.0, { (temp.c = (temp.c + 1.0)); break; })"]
        );
        assert_eq!(render("return [1, 'a', false]"), vec!["return [1.0, 'a', 0.0]"]);
        assert!(render(";;").is_empty());
    }

    #[test]
    fn reports_structural_errors_with_offsets() {
        let err = parse_script("1 +").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::Parser);
        assert_eq!(err.offset(), Some(3));

        let err = parse_script("1 2").unwrap_err();
        assert_eq!(err.message, "expected `;` between expressions");
        assert_eq!(err.offset(), Some(2));

        let err = parse_script("{ temp.x = 1;").unwrap_err();
        assert_eq!(err.message, "expected `}` to close block");

        let err = parse_script("math.(1)").unwrap_err();
        assert_eq!(err.message, "expected property after `.`");
    }

    #[test]
    fn single_expression_rejects_trailing_input() {
        assert!(parse_expression("1 + 1;").is_ok());
        assert!(parse_expression("1; 2").is_err());
    }
}
