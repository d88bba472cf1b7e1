//! Boolean mini-language used by the application's search layer.
//!
//! Queries combine numbered constraint references with `AND`, `OR`, `NOT`
//! and parentheses, e.g. `#1 AND (#2 OR NOT #3)`. Constraints are matched
//! elsewhere; this module only builds and evaluates the boolean tree.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

#[derive(Clone, Debug, PartialEq)]
pub struct QueryError {
    pub message: String,
}

impl QueryError {
    fn new(message: impl Into<String>) -> Self {
        QueryError {
            message: message.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for QueryError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryToken {
    And,
    Or,
    Not,
    LParen,
    RParen,
    /// `#n`, a 1-based reference to a search constraint.
    Number(usize),
    Eot,
}

pub struct QueryLexer<'a> {
    query: &'a str,
    chars: Peekable<Chars<'a>>,
}

impl<'a> QueryLexer<'a> {
    pub fn new(query: &'a str) -> Self {
        QueryLexer {
            query,
            chars: query.chars().peekable(),
        }
    }

    pub fn next_token(&mut self) -> Result<QueryToken, QueryError> {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
        let c = match self.chars.next() {
            Some(c) => c,
            None => return Ok(QueryToken::Eot),
        };
        match c {
            '#' => {
                let mut buffer = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit()) {
                    match self.chars.next() {
                        Some(d) => buffer.push(d),
                        None => break,
                    }
                }
                let n: usize = buffer.parse().map_err(|_| {
                    QueryError::new("[Query error] Invalid query number after '#'")
                })?;
                Ok(QueryToken::Number(n))
            }
            'A' | 'a' => {
                if self.eat('N') && self.eat('D') {
                    Ok(QueryToken::And)
                } else {
                    Err(QueryError::new(
                        "[Query error] Invalid token. Did you mean 'AND'?",
                    ))
                }
            }
            'O' | 'o' => {
                if self.eat('R') {
                    Ok(QueryToken::Or)
                } else {
                    Err(QueryError::new(
                        "[Query error] Invalid token. Did you mean 'OR'?",
                    ))
                }
            }
            'N' | 'n' => {
                if self.eat('O') && self.eat('T') {
                    Ok(QueryToken::Not)
                } else {
                    Err(QueryError::new(
                        "[Query error] Invalid token. Did you mean 'NOT'?",
                    ))
                }
            }
            '(' => Ok(QueryToken::LParen),
            ')' => Ok(QueryToken::RParen),
            _ => Err(QueryError::new(format!(
                "[Query error] Invalid query string \"{}\"",
                self.query
            ))),
        }
    }

    /// Consume the next character if it matches `upper` case-insensitively.
    fn eat(&mut self, upper: char) -> bool {
        match self.chars.peek() {
            Some(c) if c.to_ascii_uppercase() == upper => {
                self.chars.next();
                true
            }
            _ => false,
        }
    }
}

/// A parsed query, evaluated against per-constraint match results.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryNode {
    Or(Box<QueryNode>, Box<QueryNode>),
    And(Box<QueryNode>, Box<QueryNode>),
    Not(Box<QueryNode>),
    Constraint(usize),
}

impl QueryNode {
    /// Evaluate the tree; `matches[i]` is the result of constraint `#(i+1)`.
    /// A constraint number out of range evaluates to false.
    pub fn eval(&self, matches: &[bool]) -> bool {
        match self {
            QueryNode::Or(lhs, rhs) => lhs.eval(matches) || rhs.eval(matches),
            QueryNode::And(lhs, rhs) => lhs.eval(matches) && rhs.eval(matches),
            QueryNode::Not(operand) => !operand.eval(matches),
            QueryNode::Constraint(n) => {
                n.checked_sub(1).and_then(|i| matches.get(i)).copied() == Some(true)
            }
        }
    }
}

/// Recursive descent over `or → and → not → primary`, so `NOT` binds
/// tightest and `OR` loosest.
pub struct QueryParser<'a> {
    lexer: QueryLexer<'a>,
    token: QueryToken,
}

impl<'a> QueryParser<'a> {
    pub fn new(query: &'a str) -> Result<Self, QueryError> {
        let mut lexer = QueryLexer::new(query);
        let token = lexer.next_token()?;
        Ok(QueryParser { lexer, token })
    }

    pub fn parse(mut self) -> Result<QueryNode, QueryError> {
        let node = self.parse_or()?;
        if self.token != QueryToken::Eot {
            return Err(QueryError::new(
                "[Query error] Invalid token: expected end of query",
            ));
        }
        Ok(node)
    }

    fn advance(&mut self) -> Result<(), QueryError> {
        self.token = self.lexer.next_token()?;
        Ok(())
    }

    fn parse_or(&mut self) -> Result<QueryNode, QueryError> {
        let mut node = self.parse_and()?;
        while self.token == QueryToken::Or {
            self.advance()?;
            let rhs = self.parse_and()?;
            node = QueryNode::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<QueryNode, QueryError> {
        let mut node = self.parse_not()?;
        while self.token == QueryToken::And {
            self.advance()?;
            let rhs = self.parse_not()?;
            node = QueryNode::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<QueryNode, QueryError> {
        if self.token == QueryToken::Not {
            self.advance()?;
            let operand = self.parse_not()?;
            return Ok(QueryNode::Not(Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<QueryNode, QueryError> {
        match self.token {
            QueryToken::Number(n) => {
                self.advance()?;
                Ok(QueryNode::Constraint(n))
            }
            QueryToken::LParen => {
                self.advance()?;
                let node = self.parse_or()?;
                if self.token != QueryToken::RParen {
                    return Err(QueryError::new("[Query error] Invalid token: expected ')'"));
                }
                self.advance()?;
                Ok(node)
            }
            _ => Err(QueryError::new(
                "[Query error] Invalid token: expected a constraint or '('",
            )),
        }
    }
}

/// Parse a query string into a boolean tree.
pub fn parse_query(query: &str) -> Result<QueryNode, QueryError> {
    QueryParser::new(query)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens() {
        let mut lexer = QueryLexer::new("#1 AND (#2 or NOT #3)");
        let mut tokens = Vec::new();
        loop {
            let t = lexer.next_token().unwrap();
            tokens.push(t);
            if t == QueryToken::Eot {
                break;
            }
        }
        assert_eq!(
            tokens,
            vec![
                QueryToken::Number(1),
                QueryToken::And,
                QueryToken::LParen,
                QueryToken::Number(2),
                QueryToken::Or,
                QueryToken::Not,
                QueryToken::Number(3),
                QueryToken::RParen,
                QueryToken::Eot,
            ]
        );
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let node = parse_query("#1 OR #2 AND #3").unwrap();
        // AND nested inside OR's right-hand side
        assert_eq!(
            node,
            QueryNode::Or(
                Box::new(QueryNode::Constraint(1)),
                Box::new(QueryNode::And(
                    Box::new(QueryNode::Constraint(2)),
                    Box::new(QueryNode::Constraint(3)),
                )),
            )
        );
        assert!(node.eval(&[true, false, false]));
        assert!(node.eval(&[false, true, true]));
        assert!(!node.eval(&[false, true, false]));
    }

    #[test]
    fn test_not_binds_tightest() {
        let node = parse_query("NOT #1 AND #2").unwrap();
        assert!(node.eval(&[false, true]));
        assert!(!node.eval(&[true, true]));
    }

    #[test]
    fn test_parens_override() {
        let node = parse_query("#1 AND (#2 OR NOT #3)").unwrap();
        assert!(node.eval(&[true, false, false]));
        assert!(!node.eval(&[false, true, false]));
        assert!(node.eval(&[true, true, true]));
    }

    #[test]
    fn test_bare_hash_rejected() {
        let err = parse_query("#").unwrap_err();
        assert!(err.message.contains("Invalid query number"));
    }

    #[test]
    fn test_unbalanced_parens_rejected() {
        let err = parse_query("(#1 AND #2").unwrap_err();
        assert!(err.message.contains("expected ')'"));
    }

    #[test]
    fn test_misspelled_keyword_rejected() {
        let err = parse_query("#1 ADN #2").unwrap_err();
        assert!(err.message.contains("Did you mean 'AND'?"));
    }

    #[test]
    fn test_out_of_range_constraint_is_false() {
        let node = parse_query("#5").unwrap();
        assert!(!node.eval(&[true, true]));
    }
}
