//! Tokenizer and recursive-descent parser for filter text.
//!
//! Grammar (keywords are case-insensitive):
//!
//! ```text
//! or_expr  := and_expr (("OR" | "||") and_expr)*
//! and_expr := unary (("AND" | "&&") unary)*
//! unary    := ("NOT" | "!") unary | primary
//! primary  := "(" or_expr ")"
//!           | path op literal
//!           | path ["NOT"] "IN" "(" literal ("," literal)* ")"
//! op       := "=" | "==" | "!=" | "<>" | "<" | "<=" | ">" | ">="
//! literal  := integer | float | 'string' | "string" | true | false
//! ```
//!
//! Parentheses nest at most [`MAX_NESTING`] deep.

use crate::error::FilterError;

use super::{CompareOp, Expr, Literal};

/// Deepest parenthesis nesting accepted in filter text.
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Literal),
    Op(CompareOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Literal(lit) => format!("literal {}", lit),
            Token::Op(op) => format!("operator '{}'", op),
            Token::And => "AND".to_string(),
            Token::Or => "OR".to_string(),
            Token::Not => "NOT".to_string(),
            Token::In => "IN".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::Comma => "','".to_string(),
        }
    }
}

fn syntax(position: usize, message: impl Into<String>) -> FilterError {
    FilterError::Syntax {
        position,
        message: message.into(),
    }
}

/// Split filter text into `(position, token)` pairs.
fn tokenize(text: &str) -> Result<Vec<(usize, Token)>, FilterError> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, width) = match (c, next) {
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('=', Some('=')) => (Token::Op(CompareOp::Eq), 2),
            ('=', _) => (Token::Op(CompareOp::Eq), 1),
            ('!', Some('=')) => (Token::Op(CompareOp::Ne), 2),
            ('!', _) => (Token::Not, 1),
            ('<', Some('>')) => (Token::Op(CompareOp::Ne), 2),
            ('<', Some('=')) => (Token::Op(CompareOp::Le), 2),
            ('<', _) => (Token::Op(CompareOp::Lt), 1),
            ('>', Some('=')) => (Token::Op(CompareOp::Ge), 2),
            ('>', _) => (Token::Op(CompareOp::Gt), 1),
            ('\'' | '"', _) => {
                let (value, consumed) = lex_string(&chars, i)?;
                tokens.push((pos, Token::Literal(Literal::String(value))));
                i += consumed;
                continue;
            }
            (c, _) if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let (literal, consumed) = lex_number(&chars, i)?;
                tokens.push((pos, Token::Literal(literal)));
                i += consumed;
                continue;
            }
            (c, _) if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() {
                    let c = chars[i].1;
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let word: String = chars[start..i].iter().map(|(_, c)| c).collect();
                tokens.push((pos, keyword_or_ident(word)));
                continue;
            }
            (c, _) => return Err(syntax(pos, format!("unexpected character '{}'", c))),
        };
        tokens.push((pos, token));
        i += width;
    }

    Ok(tokens)
}

fn keyword_or_ident(word: String) -> Token {
    match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "true" => Token::Literal(Literal::Boolean(true)),
        "false" => Token::Literal(Literal::Boolean(false)),
        _ => Token::Ident(word),
    }
}

/// Lex a quoted string starting at `chars[start]`. Backslash escapes the
/// next character.
fn lex_string(chars: &[(usize, char)], start: usize) -> Result<(String, usize), FilterError> {
    let (pos, quote) = chars[start];
    let mut value = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i].1 {
            '\\' => {
                let Some((_, escaped)) = chars.get(i + 1) else {
                    break;
                };
                value.push(*escaped);
                i += 2;
            }
            c if c == quote => return Ok((value, i + 1 - start)),
            c => {
                value.push(c);
                i += 1;
            }
        }
    }
    Err(syntax(pos, "unterminated string literal"))
}

fn lex_number(chars: &[(usize, char)], start: usize) -> Result<(Literal, usize), FilterError> {
    let pos = chars[start].0;
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c.is_ascii_digit() || c == '.' || c == 'e' || c == 'E' {
            i += 1;
        } else if (c == '-' || c == '+') && matches!(chars[i - 1].1, 'e' | 'E') {
            i += 1;
        } else {
            break;
        }
    }
    let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
    let literal = if let Ok(v) = text.parse::<i64>() {
        Literal::Integer(v)
    } else if let Ok(v) = text.parse::<f64>() {
        Literal::Real(v)
    } else {
        return Err(syntax(pos, format!("invalid number '{}'", text)));
    };
    Ok((literal, i - start))
}

fn flatten(mut terms: Vec<Expr>, join: fn(Vec<Expr>) -> Expr) -> Expr {
    if terms.len() == 1 {
        terms.remove(0)
    } else {
        join(terms)
    }
}

/// Recursive-descent parser over the token list.
pub(super) struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    pub(super) fn new(text: &str) -> Result<Self, FilterError> {
        Ok(Self {
            tokens: tokenize(text)?,
            pos: 0,
            end: text.len(),
            depth: 0,
        })
    }

    /// Parse a complete expression; returns `None` when there are no tokens.
    pub(super) fn parse(mut self) -> Result<Option<Expr>, FilterError> {
        if self.tokens.is_empty() {
            return Ok(None);
        }
        let expr = self.parse_or()?;
        if let Some((pos, token)) = self.tokens.get(self.pos) {
            return Err(syntax(*pos, format!("unexpected {}", token.describe())));
        }
        Ok(Some(expr))
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |(p, _)| *p)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), FilterError> {
        let position = self.position();
        match self.advance() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(syntax(
                position,
                format!("expected {}, found {}", expected.describe(), token.describe()),
            )),
            None => Err(syntax(
                position,
                format!("expected {}, found end of input", expected.describe()),
            )),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(flatten(terms, Expr::Or))
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut terms = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(flatten(terms, Expr::And))
    }

    /// Runs of NOT collapse by parity.
    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        let mut negated = false;
        while self.peek() == Some(&Token::Not) {
            self.advance();
            negated = !negated;
        }
        let expr = self.parse_primary()?;
        Ok(if negated { Expr::Not(Box::new(expr)) } else { expr })
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        let position = self.position();
        match self.advance() {
            Some(Token::LParen) => {
                if self.depth == MAX_NESTING {
                    return Err(syntax(
                        position,
                        format!("parentheses nested deeper than {}", MAX_NESTING),
                    ));
                }
                self.depth += 1;
                let expr = self.parse_or()?;
                self.depth -= 1;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(path)) => self.parse_predicate(path),
            Some(token) => Err(syntax(
                position,
                format!("expected field name or '(', found {}", token.describe()),
            )),
            None => Err(syntax(position, "unexpected end of input")),
        }
    }

    fn parse_predicate(&mut self, path: String) -> Result<Expr, FilterError> {
        if path.split('.').any(str::is_empty) {
            return Err(syntax(self.position(), format!("invalid field path '{}'", path)));
        }
        let position = self.position();
        match self.advance() {
            Some(Token::Op(op)) => {
                let literal = self.parse_literal()?;
                Ok(Expr::Compare { path, op, literal })
            }
            Some(Token::In) => Ok(Expr::In {
                path,
                literals: self.parse_literal_list()?,
            }),
            Some(Token::Not) => {
                self.expect(Token::In)?;
                let literals = self.parse_literal_list()?;
                Ok(Expr::Not(Box::new(Expr::In { path, literals })))
            }
            Some(token) => Err(syntax(
                position,
                format!("expected comparison operator or IN, found {}", token.describe()),
            )),
            None => Err(syntax(position, "expected comparison operator or IN")),
        }
    }

    fn parse_literal(&mut self) -> Result<Literal, FilterError> {
        let position = self.position();
        match self.advance() {
            Some(Token::Literal(literal)) => Ok(literal),
            Some(token) => Err(syntax(
                position,
                format!("expected literal, found {}", token.describe()),
            )),
            None => Err(syntax(position, "expected literal, found end of input")),
        }
    }

    fn parse_literal_list(&mut self) -> Result<Vec<Literal>, FilterError> {
        self.expect(Token::LParen)?;
        let mut literals = vec![self.parse_literal()?];
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            literals.push(self.parse_literal()?);
        }
        self.expect(Token::RParen)?;
        Ok(literals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Option<Expr>, FilterError> {
        Parser::new(text)?.parse()
    }

    #[test]
    fn test_tokenize_operators() {
        let tokens: Vec<Token> = tokenize("a>=1 AND b<>'x' || !c")
            .unwrap()
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".into()),
                Token::Op(CompareOp::Ge),
                Token::Literal(Literal::Integer(1)),
                Token::And,
                Token::Ident("b".into()),
                Token::Op(CompareOp::Ne),
                Token::Literal(Literal::String("x".into())),
                Token::Or,
                Token::Not,
                Token::Ident("c".into()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let tokens: Vec<Token> = tokenize("-3 2.5 1e3")
            .unwrap()
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(
            tokens,
            vec![
                Token::Literal(Literal::Integer(-3)),
                Token::Literal(Literal::Real(2.5)),
                Token::Literal(Literal::Real(1000.0)),
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#"name = "say \"hi\"""#).unwrap();
        assert_eq!(tokens[2].1, Token::Literal(Literal::String("say \"hi\"".into())));
    }

    #[test]
    fn test_precedence() {
        // AND binds tighter than OR
        let expr = parse("a = 1 OR b = 2 AND c = 3").unwrap().unwrap();
        match expr {
            Expr::Or(terms) => {
                assert_eq!(terms.len(), 2);
                assert!(matches!(terms[0], Expr::Compare { .. }));
                assert!(matches!(&terms[1], Expr::And(inner) if inner.len() == 2));
            }
            other => panic!("expected OR, got {:?}", other),
        }
    }

    #[test]
    fn test_chains_are_flat() {
        let text = vec!["a = 1"; 5000].join(" AND ");
        match parse(&text).unwrap().unwrap() {
            Expr::And(terms) => assert_eq!(terms.len(), 5000),
            other => panic!("expected AND, got {:?}", other),
        }
    }

    #[test]
    fn test_not_in() {
        let expr = parse("state NOT IN ('CA', 'NY')").unwrap().unwrap();
        assert!(matches!(expr, Expr::Not(ref inner) if matches!(**inner, Expr::In { .. })));
    }

    #[test]
    fn test_empty_is_none() {
        assert!(parse("   ").unwrap().is_none());
    }

    #[test]
    fn test_error_positions() {
        let err = parse("age >").unwrap_err();
        assert_eq!(
            err,
            FilterError::Syntax {
                position: 5,
                message: "expected literal, found end of input".into()
            }
        );

        let FilterError::Syntax { position, .. } = parse("age > 3 )").unwrap_err();
        assert_eq!(position, 8);

        let FilterError::Syntax { position, .. } = parse("name = 'open").unwrap_err();
        assert_eq!(position, 7);

        let FilterError::Syntax { position, .. } = parse("a = 1 # b").unwrap_err();
        assert_eq!(position, 6);
    }

    #[test]
    fn test_nesting_limit() {
        let at_limit = format!("{}a = 1{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert!(parse(&at_limit).unwrap().is_some());

        let deep = format!("{}a = 1{}", "(".repeat(10_000), ")".repeat(10_000));
        let FilterError::Syntax { position, message } = parse(&deep).unwrap_err();
        assert_eq!(position, MAX_NESTING);
        assert!(message.contains("nested"), "{message}");

        let unbalanced = "(".repeat(200_000);
        assert!(parse(&unbalanced).is_err());
    }

    #[test]
    fn test_not_chain_collapses() {
        let even = format!("{}a = 1", "NOT ".repeat(100_000));
        assert!(matches!(parse(&even).unwrap(), Some(Expr::Compare { .. })));

        let odd = format!("{}a = 1", "!".repeat(100_001));
        assert!(matches!(parse(&odd).unwrap(), Some(Expr::Not(_))));
    }

    #[test]
    fn test_rejects_missing_operand() {
        assert!(parse("a = 1 AND").is_err());
        assert!(parse("(a = 1").is_err());
        assert!(parse("a IN ()").is_err());
        assert!(parse("= 3").is_err());
        assert!(parse("a..b = 3").is_err());
    }
}
