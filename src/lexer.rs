use crate::token::{lookup_ident, number_abbreviation, Token, TokenKind, NUMBER_SEPARATOR};

/// Character-by-character scanner over a decoded character array.
///
/// Tokens are produced on demand through [`Lexer::next_token`]. The lexer
/// precomputes a line map so any character offset can be rendered back as
/// `(line, column, line text)` for error messages.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    read_position: usize,
    ch: char,
    line_map: Vec<(usize, usize)>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let mut lexer = Lexer {
            input: input.chars().collect(),
            position: 0,
            read_position: 0,
            ch: '\0',
            line_map: Vec::new(),
        };
        lexer.build_line_map();
        lexer.read_char();
        lexer
    }

    fn build_line_map(&mut self) {
        let mut begin = 0;
        let mut idx = 0;
        for (i, &ch) in self.input.iter().enumerate() {
            idx = i;
            if ch == '\n' {
                self.line_map.push((begin, idx));
                begin = idx + 1;
            }
        }
        self.line_map.push((begin, idx + 1));
    }

    pub fn current_position(&self) -> usize {
        self.position
    }

    fn line_position(&self, pos: usize) -> (usize, usize, usize) {
        let mut idx = 0;
        let mut begin = 0;
        let mut end = 0;
        for (i, &(b, e)) in self.line_map.iter().enumerate() {
            idx = i;
            begin = b;
            end = e;
            if pos >= begin && pos <= end {
                break;
            }
        }
        (idx + 1, begin, end)
    }

    /// 1-based line number, 1-based column within the line, and the line's text.
    pub fn error_line(&self, pos: usize) -> (usize, usize, String) {
        let (line_num, begin, end) = self.line_position(pos);
        let text: String = self.input[begin..end.min(self.input.len())].iter().collect();
        let column = pos.saturating_sub(begin) + 1;
        (line_num, column, text)
    }

    fn new_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.position, self.ch.to_string())
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let tok = match self.ch {
            '=' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::Eq, position, "==")
                } else {
                    self.new_token(TokenKind::Assign)
                }
            }
            '+' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::CompPlus, position, "+=")
                } else {
                    self.new_token(TokenKind::Plus)
                }
            }
            '-' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::CompMinus, position, "-=")
                } else {
                    self.new_token(TokenKind::Minus)
                }
            }
            '%' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::CompModulo, position, "%=")
                } else {
                    self.new_token(TokenKind::Modulo)
                }
            }
            '!' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::NotEq, position, "!=")
                } else if self.peek_chars(3) == "in " {
                    // `!in` needs the trailing space so `!inside` stays a
                    // bang followed by an identifier.
                    let position = self.position;
                    self.read_char();
                    self.read_char();
                    Token::new(TokenKind::NotIn, position, "!in")
                } else {
                    self.new_token(TokenKind::Bang)
                }
            }
            '/' => {
                if self.peek_char() == '/' {
                    self.read_line();
                    self.read_char();
                    return self.next_token();
                } else if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::CompSlash, position, "/=")
                } else {
                    self.new_token(TokenKind::Slash)
                }
            }
            '#' => {
                self.read_line();
                self.read_char();
                return self.next_token();
            }
            '&' => {
                if self.peek_char() == '&' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::And, position, "&&")
                } else {
                    self.new_token(TokenKind::BitAnd)
                }
            }
            '^' => self.new_token(TokenKind::BitXor),
            '@' => self.new_token(TokenKind::At),
            '*' => {
                if self.peek_char() == '*' {
                    let position = self.position;
                    self.read_char();
                    if self.peek_char() == '=' {
                        self.read_char();
                        Token::new(TokenKind::CompExponent, position, "**=")
                    } else {
                        Token::new(TokenKind::Exponent, position, "**")
                    }
                } else if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::CompAsterisk, position, "*=")
                } else {
                    self.new_token(TokenKind::Asterisk)
                }
            }
            '<' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    if self.peek_char() == '>' {
                        self.read_char();
                        Token::new(TokenKind::CombinedComp, position, "<=>")
                    } else {
                        Token::new(TokenKind::LtEq, position, "<=")
                    }
                } else if self.peek_char() == '<' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::LShift, position, "<<")
                } else {
                    self.new_token(TokenKind::Lt)
                }
            }
            '>' => {
                if self.peek_char() == '=' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::GtEq, position, ">=")
                } else if self.peek_char() == '>' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::RShift, position, ">>")
                } else {
                    self.new_token(TokenKind::Gt)
                }
            }
            ';' => self.new_token(TokenKind::Semicolon),
            ':' => self.new_token(TokenKind::Colon),
            ',' => self.new_token(TokenKind::Comma),
            '.' => {
                let position = self.position;
                if self.peek_char() == '.' {
                    self.read_char();
                    if self.peek_char() == '.' {
                        self.read_char();
                        Token::new(TokenKind::CurrentArgs, position, "...")
                    } else {
                        Token::new(TokenKind::Range, position, "..")
                    }
                } else {
                    self.new_token(TokenKind::Dot)
                }
            }
            '?' => self.new_token(TokenKind::Question),
            '|' => {
                if self.peek_char() == '|' {
                    let position = self.position;
                    self.read_char();
                    Token::new(TokenKind::Or, position, "||")
                } else {
                    self.new_token(TokenKind::Pipe)
                }
            }
            '{' => self.new_token(TokenKind::LBrace),
            '}' => self.new_token(TokenKind::RBrace),
            '~' => self.new_token(TokenKind::Tilde),
            '(' => self.new_token(TokenKind::LParen),
            ')' => self.new_token(TokenKind::RParen),
            '"' => {
                let position = self.position;
                let literal = self.read_string('"');
                Token::new(TokenKind::Str, position, literal)
            }
            '\'' => {
                let position = self.position;
                let literal = self.read_string('\'');
                Token::new(TokenKind::Str, position, literal)
            }
            '`' => {
                let position = self.position;
                let literal = self.read_string('`');
                Token::new(TokenKind::Command, position, literal)
            }
            '$' => {
                if self.peek_char() == '(' {
                    let position = self.position;
                    let literal = self.read_command();
                    Token::new(TokenKind::Command, position, literal)
                } else {
                    let position = self.position;
                    let literal = self.read_line();
                    Token::new(TokenKind::Illegal, position, literal)
                }
            }
            '[' => self.new_token(TokenKind::LBracket),
            ']' => self.new_token(TokenKind::RBracket),
            '\0' => Token::new(TokenKind::Eof, self.position, ""),
            ch if is_letter(ch) => {
                let position = self.position;
                let literal = self.read_identifier();
                let kind = lookup_ident(&literal);
                return Token::new(kind, position, literal);
            }
            ch if ch.is_ascii_digit() => {
                let position = self.position;
                let (literal, kind) = self.read_number();
                return Token::new(kind, position, literal);
            }
            _ => self.new_token(TokenKind::Illegal),
        };

        self.read_char();
        tok
    }

    fn skip_whitespace(&mut self) {
        while self.ch == ' ' || self.ch == '\t' || self.ch == '\n' || self.ch == '\r' {
            self.read_char();
        }
    }

    fn read_char(&mut self) {
        if self.read_position >= self.input.len() {
            self.ch = '\0';
        } else {
            self.ch = self.input[self.read_position];
        }
        self.position = self.read_position;
        self.read_position += 1;
    }

    /// Reset to the start of the input and re-scan until `pos` is reached.
    pub fn rewind(&mut self, pos: usize) {
        self.ch = self.input.first().copied().unwrap_or('\0');
        self.position = 0;
        self.read_position = 1;

        while self.position < pos {
            self.next_token();
        }
    }

    fn peek_char(&self) -> char {
        if self.read_position >= self.input.len() {
            '\0'
        } else {
            self.input[self.read_position]
        }
    }

    /// Look backwards `steps` characters, for escape disambiguation in strings.
    fn prev_char(&self, steps: usize) -> char {
        if self.read_position < steps {
            return '\0';
        }
        let prev_position = self.read_position - steps;
        if prev_position < 1 || prev_position >= self.input.len() {
            return '\0';
        }
        self.input[prev_position]
    }

    fn peek_chars(&self, amount: usize) -> String {
        if self.read_position + amount >= self.input.len() {
            return String::new();
        }
        self.input[self.read_position..self.read_position + amount]
            .iter()
            .collect()
    }

    fn read_identifier(&mut self) -> String {
        let position = self.position;
        while is_letter(self.ch) || self.ch.is_numeric() {
            self.read_char();
        }
        self.input[position..self.position].iter().collect()
    }

    /// Reads a number literal. Supports one decimal point, an exponent, a
    /// single suffix abbreviation (k/m/b/t) and underscore separators.
    /// A second dot or a dangling exponent yields an illegal token.
    fn read_number(&mut self) -> (String, TokenKind) {
        let position = self.position;
        let mut has_dot = false;
        let mut has_exponent = false;

        while is_char_allowed_in_number(self.ch) {
            // A sign only belongs to the number inside an exponent;
            // everywhere else it terminates the literal.
            if (self.ch == '+' || self.ch == '-') && !has_exponent {
                let literal: String = self.input[position..self.position].iter().collect();
                return (literal, TokenKind::Number);
            }

            if self.ch == 'e' {
                has_exponent = true;
            }

            // A suffix abbreviation ends the literal.
            if number_abbreviation(self.ch).is_some() {
                self.read_char();
                let literal: String = self.input[position..self.position].iter().collect();
                return (literal, TokenKind::Number);
            }

            // `1..5` is a range over 1, and `1.x` terminates at the dot.
            if self.ch == '.' && (self.peek_char() == '.' || !self.peek_char().is_ascii_digit()) {
                let literal: String = self.input[position..self.position].iter().collect();
                return (literal, TokenKind::Number);
            }

            if self.ch == '.' {
                if has_dot {
                    let literal: String =
                        self.input[position..=self.position.min(self.input.len() - 1)].iter().collect();
                    return (literal, TokenKind::Illegal);
                }
                has_dot = true;
            }
            self.read_char();
        }

        // A trailing `e` is not a valid exponent.
        if self.position > 0 && self.position - 1 < self.input.len() && self.input[self.position - 1] == 'e' {
            let literal: String = self.input[position..self.position].iter().collect();
            return (literal, TokenKind::Illegal);
        }

        let literal: String = self.input[position..self.position]
            .iter()
            .filter(|&&c| c != NUMBER_SEPARATOR)
            .collect();
        (literal, TokenKind::Number)
    }

    /// Reads a quoted string literal, resolving escapes.
    ///
    /// Escaped quotes and doubled backslashes are valid in every flavor;
    /// \n, \r and \t are only translated inside double quotes.
    fn read_string(&mut self, quote: char) -> String {
        let mut chars = String::new();
        let esc = '\\';
        let mut double_escape = false;
        loop {
            self.read_char();

            if self.ch == esc && self.peek_char() == esc {
                chars.push(esc);
                self.read_char();
                if self.peek_char() == quote {
                    double_escape = true;
                } else {
                    chars.push(esc);
                }
                continue;
            }

            if self.ch == esc && self.peek_char() == quote {
                chars.push(quote);
                self.read_char();
                continue;
            }

            if quote == '"' {
                if self.ch == esc && self.peek_char() == 'n' {
                    chars.push('\n');
                    self.read_char();
                    continue;
                } else if self.ch == esc && self.peek_char() == 'r' {
                    chars.push('\r');
                    self.read_char();
                    continue;
                } else if self.ch == esc && self.peek_char() == 't' {
                    chars.push('\t');
                    self.read_char();
                    continue;
                }
            }

            if (self.ch == quote && (self.prev_char(2) != esc || double_escape)) || self.ch == '\0'
            {
                break;
            }
            chars.push(self.ch);
            double_escape = false;
        }
        chars
    }

    fn read_line(&mut self) -> String {
        let position = self.position;
        loop {
            self.read_char();
            if self.ch == '\n' || self.ch == '\r' || self.ch == '\0' {
                break;
            }
        }
        self.input[position..self.position].iter().collect()
    }

    /// Reads a `$(command)` form until end of line. A trailing semicolon is
    /// stripped and the lexer steps one character back so the next token
    /// starts from whatever followed the command.
    fn read_command(&mut self) -> String {
        let start = self.position + 2;
        let mut subtract = 1;
        loop {
            self.read_char();

            if self.ch == '\n' || self.ch == '\r' || self.ch == '\0' {
                if self.prev_char(2) == ';' {
                    subtract = 2;
                }
                break;
            }
        }
        let end = self.position.saturating_sub(subtract);
        let ret: String = if start <= end {
            self.input[start..end].iter().collect()
        } else {
            String::new()
        };

        if subtract == 2 {
            self.position -= 1;
            self.read_position = self.position;
        }

        ret
    }
}

fn is_letter(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_char_allowed_in_number(c: char) -> bool {
    let low = c.to_ascii_lowercase();
    low.is_ascii_digit()
        || low == '.'
        || low == '+'
        || low == '-'
        || c == 'e'
        || low == NUMBER_SEPARATOR
        || number_abbreviation(low).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn test_keywords() {
        let expected = vec![
            TokenKind::Function,
            TokenKind::True,
            TokenKind::False,
            TokenKind::If,
            TokenKind::Else,
            TokenKind::Return,
            TokenKind::While,
            TokenKind::For,
            TokenKind::In,
            TokenKind::Break,
            TokenKind::Continue,
            TokenKind::Defer,
            TokenKind::Eof,
        ];
        assert_eq!(
            kinds("f doğru yanlış eğer yoksa dön iken döngü in dur devam bekle"),
            expected
        );
    }

    #[test]
    fn test_multi_char_operators() {
        let expected = vec![
            TokenKind::Eq,
            TokenKind::NotEq,
            TokenKind::LtEq,
            TokenKind::GtEq,
            TokenKind::CombinedComp,
            TokenKind::LShift,
            TokenKind::RShift,
            TokenKind::Exponent,
            TokenKind::CompPlus,
            TokenKind::CompMinus,
            TokenKind::CompAsterisk,
            TokenKind::CompSlash,
            TokenKind::CompModulo,
            TokenKind::CompExponent,
            TokenKind::And,
            TokenKind::Or,
            TokenKind::Range,
            TokenKind::CurrentArgs,
            TokenKind::Eof,
        ];
        assert_eq!(
            kinds("== != <= >= <=> << >> ** += -= *= /= %= **= && || .. ..."),
            expected
        );
    }

    #[test]
    fn test_not_in_requires_space() {
        assert_eq!(
            kinds("1 !in [1]"),
            vec![
                TokenKind::Number,
                TokenKind::NotIn,
                TokenKind::LBracket,
                TokenKind::Number,
                TokenKind::RBracket,
                TokenKind::Eof
            ]
        );
        // Without the space `!inx` is a bang and an identifier.
        assert_eq!(
            kinds("!inx"),
            vec![TokenKind::Bang, TokenKind::Ident, TokenKind::Eof]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            kinds("1 // yorum\n2 # yorum\n3"),
            vec![
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_numbers() {
        let mut lexer = Lexer::new("12 1.5 1_000_000 10k 2.5m 1e3 1e-3");
        let literals: Vec<(String, TokenKind)> = (0..7)
            .map(|_| {
                let t = lexer.next_token();
                (t.literal, t.kind)
            })
            .collect();
        assert_eq!(literals[0], ("12".to_string(), TokenKind::Number));
        assert_eq!(literals[1], ("1.5".to_string(), TokenKind::Number));
        assert_eq!(literals[2], ("1000000".to_string(), TokenKind::Number));
        assert_eq!(literals[3], ("10k".to_string(), TokenKind::Number));
        assert_eq!(literals[4], ("2.5m".to_string(), TokenKind::Number));
        assert_eq!(literals[5], ("1e3".to_string(), TokenKind::Number));
        assert_eq!(literals[6], ("1e-3".to_string(), TokenKind::Number));
    }

    #[test]
    fn test_illegal_numbers() {
        let mut lexer = Lexer::new("1.2.3");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Illegal);

        let mut lexer = Lexer::new("10e");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Illegal);
    }

    #[test]
    fn test_number_then_range() {
        assert_eq!(
            kinds("1..5"),
            vec![
                TokenKind::Number,
                TokenKind::Range,
                TokenKind::Number,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_strings() {
        let mut lexer = Lexer::new(r#""merhaba" 'dünya' "a\nb" "q\"q""#);
        assert_eq!(lexer.next_token().literal, "merhaba");
        assert_eq!(lexer.next_token().literal, "dünya");
        assert_eq!(lexer.next_token().literal, "a\nb");
        assert_eq!(lexer.next_token().literal, "q\"q");
    }

    #[test]
    fn test_single_quote_keeps_escapes_raw() {
        let mut lexer = Lexer::new(r"'a\nb'");
        assert_eq!(lexer.next_token().literal, "a\\nb");
    }

    #[test]
    fn test_backtick_command() {
        let mut lexer = Lexer::new("`ls -la`");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Command);
        assert_eq!(tok.literal, "ls -la");
    }

    #[test]
    fn test_dollar_command() {
        let mut lexer = Lexer::new("$(echo selam)\n1");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Command);
        assert_eq!(tok.literal, "echo selam");
        assert_eq!(lexer.next_token().kind, TokenKind::Number);
    }

    #[test]
    fn test_dollar_command_semicolon_rewinds() {
        let mut lexer = Lexer::new("$(echo selam);\n1");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Command);
        assert_eq!(tok.literal, "echo selam");
        assert_eq!(lexer.next_token().kind, TokenKind::Semicolon);
        assert_eq!(lexer.next_token().kind, TokenKind::Number);
    }

    #[test]
    fn test_bare_dollar_is_illegal() {
        let mut lexer = Lexer::new("$x");
        assert_eq!(lexer.next_token().kind, TokenKind::Illegal);
    }

    #[test]
    fn test_error_line() {
        let lexer = Lexer::new("a = 1\nb = 2\nc = 3");
        let (line, column, text) = lexer.error_line(6);
        assert_eq!(line, 2);
        assert_eq!(column, 1);
        assert_eq!(text, "b = 2");
    }

    #[test]
    fn test_rewind_reproduces_token_stream() {
        let input = "a = [1, 2]; eğer a { eko(\"ok\") } yoksa { eko(1.5k) }";
        let mut lexer = Lexer::new(input);
        let mut first = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.kind == TokenKind::Eof;
            first.push(tok);
            if done {
                break;
            }
        }
        lexer.rewind(0);
        let mut second = Vec::new();
        loop {
            let tok = lexer.next_token();
            let done = tok.kind == TokenKind::Eof;
            second.push(tok);
            if done {
                break;
            }
        }
        assert_eq!(first, second);
    }

    #[test]
    fn test_unicode_identifiers() {
        let mut lexer = Lexer::new("sayı = 1");
        let tok = lexer.next_token();
        assert_eq!(tok.kind, TokenKind::Ident);
        assert_eq!(tok.literal, "sayı");
    }
}
