use std::fmt;

/// All token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Illegal,
    Eof,

    // Identifiers and literals
    Ident,
    Number,
    Str,
    Command,
    At,
    Null,
    CurrentArgs,

    // Operators
    Tilde,
    Bang,
    Assign,
    Plus,
    Minus,
    Asterisk,
    Slash,
    Exponent,
    Modulo,
    CompPlus,
    CompMinus,
    CompAsterisk,
    CompSlash,
    CompExponent,
    CompModulo,
    Range,

    // Logical operators
    And,
    Or,

    BitAnd,
    BitXor,
    RShift,
    LShift,
    Pipe,

    Lt,
    LtEq,
    Gt,
    GtEq,
    CombinedComp,

    Eq,
    NotEq,

    // Delimiters
    Comma,
    Semicolon,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Dot,
    Question,

    // Keywords
    Function,
    True,
    False,
    If,
    Else,
    Return,
    While,
    For,
    In,
    NotIn,
    Break,
    Continue,
    Defer,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
            TokenKind::Ident => "IDENT",
            TokenKind::Number => "NUMBER",
            TokenKind::Str => "STRING",
            TokenKind::Command => "COMMAND",
            TokenKind::At => "@",
            TokenKind::Null => "NULL",
            TokenKind::CurrentArgs => "...",
            TokenKind::Tilde => "~",
            TokenKind::Bang => "!",
            TokenKind::Assign => "=",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Asterisk => "*",
            TokenKind::Slash => "/",
            TokenKind::Exponent => "**",
            TokenKind::Modulo => "%",
            TokenKind::CompPlus => "+=",
            TokenKind::CompMinus => "-=",
            TokenKind::CompAsterisk => "*=",
            TokenKind::CompSlash => "/=",
            TokenKind::CompExponent => "**=",
            TokenKind::CompModulo => "%=",
            TokenKind::Range => "..",
            TokenKind::And => "&&",
            TokenKind::Or => "||",
            TokenKind::BitAnd => "&",
            TokenKind::BitXor => "^",
            TokenKind::RShift => ">>",
            TokenKind::LShift => "<<",
            TokenKind::Pipe => "|",
            TokenKind::Lt => "<",
            TokenKind::LtEq => "<=",
            TokenKind::Gt => ">",
            TokenKind::GtEq => ">=",
            TokenKind::CombinedComp => "<=>",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Comma => ",",
            TokenKind::Semicolon => ";",
            TokenKind::Colon => ":",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Dot => ".",
            TokenKind::Question => "?",
            TokenKind::Function => "f",
            TokenKind::True => "doğru",
            TokenKind::False => "yanlış",
            TokenKind::If => "eğer",
            TokenKind::Else => "yoksa",
            TokenKind::Return => "dön",
            TokenKind::While => "iken",
            TokenKind::For => "döngü",
            TokenKind::In => "in",
            TokenKind::NotIn => "!in",
            TokenKind::Break => "dur",
            TokenKind::Continue => "devam",
            TokenKind::Defer => "bekle",
        };
        write!(f, "{}", s)
    }
}

/// A token with its kind, character offset into the source, and literal text.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub position: usize,
    pub literal: String,
}

impl Token {
    pub fn new(kind: TokenKind, position: usize, literal: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            literal: literal.into(),
        }
    }
}

impl Default for Token {
    fn default() -> Self {
        Token::new(TokenKind::Eof, 0, "")
    }
}

/// Keyword table. Identifiers not found here lex as plain identifiers.
pub fn lookup_ident(ident: &str) -> TokenKind {
    match ident {
        "f" => TokenKind::Function,
        "doğru" | "Doğru" => TokenKind::True,
        "yanlış" | "Yanlış" => TokenKind::False,
        "eğer" => TokenKind::If,
        "yoksa" => TokenKind::Else,
        "dön" => TokenKind::Return,
        "iken" => TokenKind::While,
        "döngü" => TokenKind::For,
        "in" => TokenKind::In,
        "null" => TokenKind::Null,
        "dur" => TokenKind::Break,
        "devam" => TokenKind::Continue,
        "bekle" => TokenKind::Defer,
        _ => TokenKind::Ident,
    }
}

/// Suffix abbreviations usable on number literals, eg. 1k or 20m.
pub fn number_abbreviation(suffix: char) -> Option<f64> {
    match suffix.to_ascii_lowercase() {
        'k' => Some(1_000.0),
        'm' => Some(1_000_000.0),
        'b' => Some(1_000_000_000.0),
        't' => Some(1_000_000_000_000.0),
        _ => None,
    }
}

/// Separator allowed inside number literals, eg. 1_000_000.
pub const NUMBER_SEPARATOR: char = '_';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(lookup_ident("f"), TokenKind::Function);
        assert_eq!(lookup_ident("dön"), TokenKind::Return);
        assert_eq!(lookup_ident("iken"), TokenKind::While);
        assert_eq!(lookup_ident("döngü"), TokenKind::For);
        assert_eq!(lookup_ident("bekle"), TokenKind::Defer);
        assert_eq!(lookup_ident("null"), TokenKind::Null);
        assert_eq!(lookup_ident("toplam"), TokenKind::Ident);
    }

    #[test]
    fn test_boolean_keywords_accept_both_spellings() {
        assert_eq!(lookup_ident("doğru"), TokenKind::True);
        assert_eq!(lookup_ident("Doğru"), TokenKind::True);
        assert_eq!(lookup_ident("yanlış"), TokenKind::False);
        assert_eq!(lookup_ident("Yanlış"), TokenKind::False);
    }

    #[test]
    fn test_number_abbreviations() {
        assert_eq!(number_abbreviation('k'), Some(1_000.0));
        assert_eq!(number_abbreviation('M'), Some(1_000_000.0));
        assert_eq!(number_abbreviation('x'), None);
    }
}
