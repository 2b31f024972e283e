//! Query text parser
//!
//! Accepts the boolean query subset used throughout this crate:
//!
//! - `||` / `or`, `&&` / `and`, `!` / `not`, parentheses
//! - comparisons `FIELD op literal` with `== != < <= > >= =~ !~`
//! - literals: quoted strings (`\'` and `\\` escapes), numbers, `null`
//! - functions `namespace:name(arg, ...)`
//! - markers `((_Label_ = true) && (child))`, `((_Drop_ = 'reason') && (child))`
//!
//! Redundant parentheses are not kept as `Reference` nodes.

use super::errors::{ParseError, ParseResult};
use super::marker::{MarkerKind, MarkerPayload};
use super::node::{CompareOp, ExprNode, FunctionArg, Literal};

/// Parses query text into a tree
pub fn parse(text: &str) -> ParseResult<ExprNode> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?.into_node()?;
    if let Some(tok) = parser.peek() {
        return Err(ParseError::UnexpectedToken {
            position: tok.position,
            found: tok.kind.describe(),
            expected: "end of query".into(),
        });
    }
    Ok(node)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Str(String),
    Num(String),
    Null,
    True,
    AndOp,
    OrOp,
    NotOp,
    LParen,
    RParen,
    Comma,
    Colon,
    Assign,
    Op(CompareOp),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) | TokenKind::Num(s) => s.clone(),
            TokenKind::Str(s) => format!("'{}'", s),
            TokenKind::Null => "null".into(),
            TokenKind::True => "true".into(),
            TokenKind::AndOp => "&&".into(),
            TokenKind::OrOp => "||".into(),
            TokenKind::NotOp => "!".into(),
            TokenKind::LParen => "(".into(),
            TokenKind::RParen => ")".into(),
            TokenKind::Comma => ",".into(),
            TokenKind::Colon => ":".into(),
            TokenKind::Assign => "=".into(),
            TokenKind::Op(op) => op.symbol().into(),
        }
    }
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

fn tokenize(text: &str) -> ParseResult<Vec<Token>> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let kind = match two.as_str() {
            "&&" => Some(TokenKind::AndOp),
            "||" => Some(TokenKind::OrOp),
            "==" => Some(TokenKind::Op(CompareOp::Eq)),
            "!=" => Some(TokenKind::Op(CompareOp::Ne)),
            "<=" => Some(TokenKind::Op(CompareOp::Le)),
            ">=" => Some(TokenKind::Op(CompareOp::Ge)),
            "=~" => Some(TokenKind::Op(CompareOp::Regex)),
            "!~" => Some(TokenKind::Op(CompareOp::NotRegex)),
            _ => None,
        };
        if let Some(kind) = kind {
            tokens.push(Token { kind, position: start });
            i += 2;
            continue;
        }

        let kind = match c {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            ',' => Some(TokenKind::Comma),
            ':' => Some(TokenKind::Colon),
            '!' => Some(TokenKind::NotOp),
            '=' => Some(TokenKind::Assign),
            '<' => Some(TokenKind::Op(CompareOp::Lt)),
            '>' => Some(TokenKind::Op(CompareOp::Gt)),
            _ => None,
        };
        if let Some(kind) = kind {
            tokens.push(Token { kind, position: start });
            i += 1;
            continue;
        }

        if c == '\'' || c == '"' {
            let (value, next) = read_string(&chars, i)?;
            tokens.push(Token {
                kind: TokenKind::Str(value),
                position: start,
            });
            i = next;
            continue;
        }

        let negative_number = c == '-' && chars.get(i + 1).is_some_and(|d| d.is_ascii_digit());
        if c.is_ascii_digit() || negative_number {
            let mut end = i + 1;
            while end < chars.len()
                && (chars[end].is_ascii_digit() || matches!(chars[end], '.' | 'e' | 'E'))
            {
                end += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Num(chars[i..end].iter().collect()),
                position: start,
            });
            i = end;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let mut end = i + 1;
            while end < chars.len() && (chars[end].is_alphanumeric() || matches!(chars[end], '_' | '.')) {
                end += 1;
            }
            let word: String = chars[i..end].iter().collect();
            let kind = match word.to_ascii_lowercase().as_str() {
                "and" => TokenKind::AndOp,
                "or" => TokenKind::OrOp,
                "not" => TokenKind::NotOp,
                "null" => TokenKind::Null,
                "true" => TokenKind::True,
                _ => TokenKind::Ident(word),
            };
            tokens.push(Token { kind, position: start });
            i = end;
            continue;
        }

        return Err(ParseError::UnexpectedToken {
            position: start,
            found: c.to_string(),
            expected: "query token".into(),
        });
    }

    Ok(tokens)
}

/// Reads a quoted string starting at `start`, returning the value and the
/// index after the closing quote
fn read_string(chars: &[char], start: usize) -> ParseResult<(String, usize)> {
    let quote = chars[start];
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            match chars.get(i + 1) {
                Some(&next) if next == quote || next == '\\' => {
                    value.push(next);
                    i += 2;
                }
                // any other escape is kept verbatim, regex escapes rely on it
                Some(&next) => {
                    value.push('\\');
                    value.push(next);
                    i += 2;
                }
                None => return Err(ParseError::UnterminatedString(start)),
            }
        } else if c == quote {
            return Ok((value, i + 1));
        } else {
            value.push(c);
            i += 1;
        }
    }
    Err(ParseError::UnterminatedString(start))
}

/// Either a real node or a marker assignment awaiting its child
enum Operand {
    Node(ExprNode),
    Assignment { label: String, value: Literal },
}

impl Operand {
    fn into_node(self) -> ParseResult<ExprNode> {
        match self {
            Operand::Node(node) => Ok(node),
            Operand::Assignment { label, .. } => Err(ParseError::InvalidMarker(format!(
                "assignment to '{}' must be the first operand of a conjunction",
                label
            ))),
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<&TokenKind> {
        self.peek().map(|t| &t.kind)
    }

    fn next(&mut self, expected: &str) -> ParseResult<Token> {
        let tok = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEnd(expected.to_string()))?;
        self.pos += 1;
        Ok(tok)
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<()> {
        let tok = self.next(expected)?;
        if tok.kind == kind {
            Ok(())
        } else {
            Err(unexpected(&tok, expected))
        }
    }

    fn parse_or(&mut self) -> ParseResult<Operand> {
        let first = self.parse_and()?;
        if self.peek_kind() != Some(&TokenKind::OrOp) {
            return Ok(first);
        }
        let mut children = vec![first.into_node()?];
        while self.peek_kind() == Some(&TokenKind::OrOp) {
            self.pos += 1;
            children.push(self.parse_and()?.into_node()?);
        }
        Ok(Operand::Node(ExprNode::or(children)))
    }

    fn parse_and(&mut self) -> ParseResult<Operand> {
        let mut operands = vec![self.parse_unary()?];
        while self.peek_kind() == Some(&TokenKind::AndOp) {
            self.pos += 1;
            operands.push(self.parse_unary()?);
        }
        if operands.len() == 1 {
            return Ok(operands.remove(0));
        }

        if let Operand::Assignment { .. } = operands[0] {
            if operands.len() != 2 {
                return Err(ParseError::InvalidMarker(
                    "a marker must be conjoined with exactly one child".into(),
                ));
            }
            let child = operands.remove(1).into_node()?;
            let Operand::Assignment { label, value } = operands.remove(0) else {
                return Err(ParseError::InvalidMarker("missing marker assignment".into()));
            };
            return Ok(Operand::Node(build_marker(&label, value, child)?));
        }

        let children = operands
            .into_iter()
            .map(Operand::into_node)
            .collect::<ParseResult<Vec<_>>>()?;
        Ok(Operand::Node(ExprNode::and(children)))
    }

    fn parse_unary(&mut self) -> ParseResult<Operand> {
        if self.peek_kind() == Some(&TokenKind::NotOp) {
            self.pos += 1;
            let child = self.parse_unary()?.into_node()?;
            return Ok(Operand::Node(ExprNode::not(child)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> ParseResult<Operand> {
        let tok = self.next("expression")?;
        match tok.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) => match self.peek_kind() {
                Some(TokenKind::Colon) => {
                    self.pos += 1;
                    self.parse_function(name).map(Operand::Node)
                }
                Some(TokenKind::Assign) => {
                    self.pos += 1;
                    let value_tok = self.next("marker value")?;
                    let value = match value_tok.kind {
                        TokenKind::True => Literal::String("true".into()),
                        TokenKind::Str(s) => Literal::String(s),
                        _ => return Err(unexpected(&value_tok, "true or quoted reason")),
                    };
                    Ok(Operand::Assignment { label: name, value })
                }
                Some(TokenKind::Op(_)) => {
                    let op_tok = self.next("operator")?;
                    let TokenKind::Op(op) = op_tok.kind else {
                        return Err(unexpected(&op_tok, "operator"));
                    };
                    let literal = self.parse_literal()?;
                    Ok(Operand::Node(ExprNode::compare(op, name, literal)))
                }
                _ => match self.peek() {
                    Some(next) => Err(unexpected(next, "operator")),
                    None => Err(ParseError::UnexpectedEnd("operator".into())),
                },
            },
            _ => Err(unexpected(&tok, "field, function or '('")),
        }
    }

    fn parse_literal(&mut self) -> ParseResult<Literal> {
        let tok = self.next("literal")?;
        match tok.kind {
            TokenKind::Str(s) => Ok(Literal::String(s)),
            TokenKind::Num(n) => Ok(Literal::Number(n)),
            TokenKind::Null => Ok(Literal::Null),
            _ => Err(unexpected(&tok, "literal")),
        }
    }

    fn parse_function(&mut self, namespace: String) -> ParseResult<ExprNode> {
        let name_tok = self.next("function name")?;
        let TokenKind::Ident(name) = name_tok.kind else {
            return Err(unexpected(&name_tok, "function name"));
        };
        self.expect(TokenKind::LParen, "'('")?;

        let mut args = Vec::new();
        if self.peek_kind() == Some(&TokenKind::RParen) {
            self.pos += 1;
        } else {
            loop {
                let tok = self.next("function argument")?;
                let arg = match tok.kind {
                    TokenKind::Ident(id) if is_field_name(&id) => FunctionArg::Field(id),
                    TokenKind::Ident(id) => FunctionArg::Identifier(id),
                    TokenKind::Str(s) => FunctionArg::Literal(Literal::String(s)),
                    TokenKind::Num(n) => FunctionArg::Literal(Literal::Number(n)),
                    TokenKind::Null => FunctionArg::Literal(Literal::Null),
                    _ => return Err(unexpected(&tok, "function argument")),
                };
                args.push(arg);
                let sep = self.next("',' or ')'")?;
                match sep.kind {
                    TokenKind::Comma => continue,
                    TokenKind::RParen => break,
                    _ => return Err(unexpected(&sep, "',' or ')'")),
                }
            }
        }

        Ok(ExprNode::Function {
            namespace,
            name,
            args,
        })
    }
}

/// Field names are upper case; other identifiers are plain function inputs
pub(crate) fn is_field_name(id: &str) -> bool {
    id.chars().any(|c| c.is_ascii_uppercase())
        && id
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '.')
}

fn build_marker(label: &str, value: Literal, child: ExprNode) -> ParseResult<ExprNode> {
    let kind = MarkerKind::from_label(label)
        .ok_or_else(|| ParseError::InvalidMarker(format!("unknown marker '{}'", label)))?;
    let text = value.text().unwrap_or_default().to_string();
    match kind {
        MarkerKind::Drop => {
            let query = child.to_query();
            Ok(ExprNode::Marker {
                kind,
                payload: MarkerPayload::Dropped {
                    reason: text,
                    query,
                },
                child: Box::new(child),
            })
        }
        _ if text == "true" => Ok(ExprNode::marker(kind, child)),
        _ => Err(ParseError::InvalidMarker(format!(
            "marker '{}' only accepts true",
            label
        ))),
    }
}

fn unexpected(tok: &Token, expected: &str) -> ParseError {
    ParseError::UnexpectedToken {
        position: tok.position,
        found: tok.kind.describe(),
        expected: expected.to_string(),
    }
}
