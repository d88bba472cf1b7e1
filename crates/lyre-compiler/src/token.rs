use std::fmt;

/// Source location of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
}

/// A token with its source location.
#[derive(Clone, Debug, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub span: Span,
}

/// All tokens of the language.
///
/// End of line is a token: statements are newline-terminated, and the
/// parser skips runs of `Eol` where a separator is expected.
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    // --- Keywords ---
    And,
    As,
    Assert,
    Break,
    Class,
    Continue,
    Debug,
    Do,
    Downto,
    Else,
    Elsif,
    End,
    Explicit,
    False,
    Field,
    For,
    Foreach,
    Function,
    If,
    In,
    Inherits,
    Local,
    Method,
    Nan,
    Not,
    Null,
    Option,
    Or,
    Pass,
    Print,
    Ref,
    Repeat,
    Return,
    Step,
    Super,
    Then,
    This,
    Throw,
    To,
    True,
    Until,
    While,

    // --- Literals ---
    Integer(i64),
    Float(f64),
    Str(String),
    Ident(String),

    // --- Operators ---
    OpAssign,        // =
    OpAssignPlus,    // +=
    OpAssignMinus,   // -=
    OpAssignStar,    // *=
    OpAssignSlash,   // /=
    OpAssignMod,     // %=
    OpAssignConcat,  // &=
    OpAssignPower,   // ^=
    OpEqual,         // ==
    OpNotEqual,      // !=
    OpLess,          // <
    OpLessEqual,     // <=
    OpGreater,       // >
    OpGreaterEqual,  // >=
    OpCompare,       // <=>
    OpPlus,          // +
    OpMinus,         // -
    OpStar,          // *
    OpSlash,         // /
    OpMod,           // %
    OpPower,         // ^
    OpConcat,        // &
    OpAt,            // @

    // --- Punctuation ---
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semi,

    /// End of line, a statement separator.
    Eol,
    /// End of text.
    Eot,
}

impl Token {
    /// Try to match a keyword from an identifier string.
    pub fn keyword_from_str(s: &str) -> Option<Token> {
        match s {
            "and" => Some(Token::And),
            "as" => Some(Token::As),
            "assert" => Some(Token::Assert),
            "break" => Some(Token::Break),
            "class" => Some(Token::Class),
            "continue" => Some(Token::Continue),
            "debug" => Some(Token::Debug),
            "do" => Some(Token::Do),
            "downto" => Some(Token::Downto),
            "else" => Some(Token::Else),
            "elsif" => Some(Token::Elsif),
            "end" => Some(Token::End),
            "explicit" => Some(Token::Explicit),
            "false" => Some(Token::False),
            "field" => Some(Token::Field),
            "for" => Some(Token::For),
            "foreach" => Some(Token::Foreach),
            "function" => Some(Token::Function),
            "if" => Some(Token::If),
            "in" => Some(Token::In),
            "inherits" => Some(Token::Inherits),
            "local" => Some(Token::Local),
            "method" => Some(Token::Method),
            "nan" => Some(Token::Nan),
            "not" => Some(Token::Not),
            "null" => Some(Token::Null),
            "option" => Some(Token::Option),
            "or" => Some(Token::Or),
            "pass" => Some(Token::Pass),
            "print" => Some(Token::Print),
            "ref" => Some(Token::Ref),
            "repeat" => Some(Token::Repeat),
            "return" => Some(Token::Return),
            "step" => Some(Token::Step),
            "super" => Some(Token::Super),
            "then" => Some(Token::Then),
            "this" => Some(Token::This),
            "throw" => Some(Token::Throw),
            "to" => Some(Token::To),
            "true" => Some(Token::True),
            "until" => Some(Token::Until),
            "while" => Some(Token::While),
            _ => None,
        }
    }

    /// True for tokens that may end a statement.
    pub fn is_separator(&self) -> bool {
        matches!(self, Token::Eol | Token::Semi | Token::Eot)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::And => write!(f, "and"),
            Token::As => write!(f, "as"),
            Token::Assert => write!(f, "assert"),
            Token::Break => write!(f, "break"),
            Token::Class => write!(f, "class"),
            Token::Continue => write!(f, "continue"),
            Token::Debug => write!(f, "debug"),
            Token::Do => write!(f, "do"),
            Token::Downto => write!(f, "downto"),
            Token::Else => write!(f, "else"),
            Token::Elsif => write!(f, "elsif"),
            Token::End => write!(f, "end"),
            Token::Explicit => write!(f, "explicit"),
            Token::False => write!(f, "false"),
            Token::Field => write!(f, "field"),
            Token::For => write!(f, "for"),
            Token::Foreach => write!(f, "foreach"),
            Token::Function => write!(f, "function"),
            Token::If => write!(f, "if"),
            Token::In => write!(f, "in"),
            Token::Inherits => write!(f, "inherits"),
            Token::Local => write!(f, "local"),
            Token::Method => write!(f, "method"),
            Token::Nan => write!(f, "nan"),
            Token::Not => write!(f, "not"),
            Token::Null => write!(f, "null"),
            Token::Option => write!(f, "option"),
            Token::Or => write!(f, "or"),
            Token::Pass => write!(f, "pass"),
            Token::Print => write!(f, "print"),
            Token::Ref => write!(f, "ref"),
            Token::Repeat => write!(f, "repeat"),
            Token::Return => write!(f, "return"),
            Token::Step => write!(f, "step"),
            Token::Super => write!(f, "super"),
            Token::Then => write!(f, "then"),
            Token::This => write!(f, "this"),
            Token::Throw => write!(f, "throw"),
            Token::To => write!(f, "to"),
            Token::True => write!(f, "true"),
            Token::Until => write!(f, "until"),
            Token::While => write!(f, "while"),
            Token::Integer(i) => write!(f, "{i}"),
            Token::Float(x) => write!(f, "{x}"),
            Token::Str(_) => write!(f, "<string>"),
            Token::Ident(name) => write!(f, "{name}"),
            Token::OpAssign => write!(f, "="),
            Token::OpAssignPlus => write!(f, "+="),
            Token::OpAssignMinus => write!(f, "-="),
            Token::OpAssignStar => write!(f, "*="),
            Token::OpAssignSlash => write!(f, "/="),
            Token::OpAssignMod => write!(f, "%="),
            Token::OpAssignConcat => write!(f, "&="),
            Token::OpAssignPower => write!(f, "^="),
            Token::OpEqual => write!(f, "=="),
            Token::OpNotEqual => write!(f, "!="),
            Token::OpLess => write!(f, "<"),
            Token::OpLessEqual => write!(f, "<="),
            Token::OpGreater => write!(f, ">"),
            Token::OpGreaterEqual => write!(f, ">="),
            Token::OpCompare => write!(f, "<=>"),
            Token::OpPlus => write!(f, "+"),
            Token::OpMinus => write!(f, "-"),
            Token::OpStar => write!(f, "*"),
            Token::OpSlash => write!(f, "/"),
            Token::OpMod => write!(f, "%"),
            Token::OpPower => write!(f, "^"),
            Token::OpConcat => write!(f, "&"),
            Token::OpAt => write!(f, "@"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Comma => write!(f, ","),
            Token::Dot => write!(f, "."),
            Token::Colon => write!(f, ":"),
            Token::Semi => write!(f, ";"),
            Token::Eol => write!(f, "<eol>"),
            Token::Eot => write!(f, "<eot>"),
        }
    }
}
