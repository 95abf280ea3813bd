//! ES5 lexer - tokenizes source code into tokens.
//!
//! The lexer scans the whole input eagerly. Whether a `/` starts a regular
//! expression literal or a division operator is decided from the previous
//! significant token, which is sufficient for the ES5 grammar.

use crate::error::ParseError;

/// ES5 keywords recognized by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    /// var keyword
    Var,
    /// function keyword
    Function,
    /// return keyword
    Return,
    /// if keyword
    If,
    /// else keyword
    Else,
    /// while keyword
    While,
    /// do keyword
    Do,
    /// for keyword
    For,
    /// break keyword
    Break,
    /// continue keyword
    Continue,
    /// new keyword
    New,
    /// this keyword
    This,
    /// true literal
    True,
    /// false literal
    False,
    /// null literal
    Null,
    /// typeof keyword
    Typeof,
    /// void keyword
    Void,
    /// delete keyword
    Delete,
    /// instanceof keyword
    Instanceof,
    /// in keyword
    In,
    /// try keyword
    Try,
    /// catch keyword
    Catch,
    /// finally keyword
    Finally,
    /// throw keyword
    Throw,
    /// switch keyword
    Switch,
    /// case keyword
    Case,
    /// default keyword
    Default,
    /// with keyword
    With,
    /// debugger keyword
    Debugger,
}

fn keyword_for(word: &str) -> Option<Keyword> {
    Some(match word {
        "var" => Keyword::Var,
        "function" => Keyword::Function,
        "return" => Keyword::Return,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "do" => Keyword::Do,
        "for" => Keyword::For,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "new" => Keyword::New,
        "this" => Keyword::This,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        "typeof" => Keyword::Typeof,
        "void" => Keyword::Void,
        "delete" => Keyword::Delete,
        "instanceof" => Keyword::Instanceof,
        "in" => Keyword::In,
        "try" => Keyword::Try,
        "catch" => Keyword::Catch,
        "finally" => Keyword::Finally,
        "throw" => Keyword::Throw,
        "switch" => Keyword::Switch,
        "case" => Keyword::Case,
        "default" => Keyword::Default,
        "with" => Keyword::With,
        "debugger" => Keyword::Debugger,
        _ => return None,
    })
}

/// The kind of a token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Identifier (variable or property name)
    Ident(String),
    /// Keyword
    Keyword(Keyword),
    /// Numeric literal
    Number(f64),
    /// String literal, already unescaped
    String(String),
    /// Regular expression literal
    Regex {
        /// Pattern between the slashes
        pattern: String,
        /// Trailing flags
        flags: String,
    },

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semicolon,
    /// `,`
    Comma,
    /// `.`
    Dot,
    /// `:`
    Colon,
    /// `?`
    Question,

    /// `=`
    Assign,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `+=`
    PlusAssign,
    /// `-=`
    MinusAssign,
    /// `*=`
    StarAssign,
    /// `/=`
    SlashAssign,
    /// `%=`
    PercentAssign,

    /// `==`
    EqEq,
    /// `!=`
    NotEq,
    /// `===`
    EqEqEq,
    /// `!==`
    NotEqEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,

    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Not,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
    /// `~`
    Tilde,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `>>>`
    UShr,
    /// `&=`
    AndAssign,
    /// `|=`
    OrAssign,
    /// `^=`
    XorAssign,
    /// `<<=`
    ShlAssign,
    /// `>>=`
    ShrAssign,
    /// `>>>=`
    UShrAssign,

    /// End of input
    Eof,
}

/// A token with its source position.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was scanned
    pub kind: TokenKind,
    /// 1-based line of the first character
    pub line: u32,
    /// 1-based column of the first character
    pub column: u32,
    /// Byte offset of the first character
    pub start: usize,
    /// Byte offset one past the last character
    pub end: usize,
    /// True when a line terminator appeared between this token and the
    /// previous one; drives automatic semicolon insertion
    pub newline_before: bool,
}

/// Lexer over a source string.
pub struct Lexer {
    chars: Vec<char>,
    /// Byte offset for each char index, plus the final length
    offsets: Vec<usize>,
    source_len: usize,
    pos: usize,
    line: u32,
    column: u32,
    newline_pending: bool,
    /// Kind of the previous significant token; decides regex vs division
    prev: Option<TokenKind>,
}

impl Lexer {
    /// Creates a lexer for the given source.
    pub fn new(source: &str) -> Self {
        let mut chars = Vec::new();
        let mut offsets = Vec::new();
        for (off, ch) in source.char_indices() {
            offsets.push(off);
            chars.push(ch);
        }
        Lexer {
            chars,
            offsets,
            source_len: source.len(),
            pos: 0,
            line: 1,
            column: 1,
            newline_pending: false,
            prev: None,
        }
    }

    /// Tokenizes the whole input, ending with an `Eof` token.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token()?;
            let done = token.kind == TokenKind::Eof;
            if !matches!(token.kind, TokenKind::Eof) {
                self.prev = Some(token.kind.clone());
            }
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn byte_offset(&self) -> usize {
        if self.pos < self.offsets.len() {
            self.offsets[self.pos]
        } else {
            self.source_len
        }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars[self.pos]
    }

    fn peek_next(&self) -> Option<char> {
        self.chars.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.pos];
        self.pos += 1;
        if is_line_terminator(c) {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        c
    }

    fn match_char(&mut self, expected: char) -> bool {
        if !self.is_at_end() && self.peek() == expected {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.line, self.column)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            if self.is_at_end() {
                return Ok(());
            }
            let c = self.peek();
            if is_line_terminator(c) {
                self.newline_pending = true;
                self.advance();
            } else if c.is_whitespace() {
                self.advance();
            } else if c == '/' && self.peek_next() == Some('/') {
                while !self.is_at_end() && !is_line_terminator(self.peek()) {
                    self.advance();
                }
            } else if c == '/' && self.peek_next() == Some('*') {
                self.advance();
                self.advance();
                loop {
                    if self.is_at_end() {
                        return Err(self.error("unterminated block comment"));
                    }
                    if is_line_terminator(self.peek()) {
                        self.newline_pending = true;
                    }
                    if self.advance() == '*' && self.match_char('/') {
                        break;
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    fn scan_token(&mut self) -> Result<Token, ParseError> {
        self.skip_whitespace_and_comments()?;
        let newline_before = self.newline_pending;
        self.newline_pending = false;

        let line = self.line;
        let column = self.column;
        let start = self.byte_offset();

        let make = |kind: TokenKind, lexer: &Lexer| Token {
            kind,
            line,
            column,
            start,
            end: lexer.byte_offset(),
            newline_before,
        };

        if self.is_at_end() {
            return Ok(make(TokenKind::Eof, self));
        }

        let c = self.advance();
        let kind = match c {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '?' => TokenKind::Question,
            '~' => TokenKind::Tilde,
            '.' => {
                if !self.is_at_end() && self.peek().is_ascii_digit() {
                    return Ok(make(self.scan_number('.')?, self));
                }
                TokenKind::Dot
            }
            '=' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        TokenKind::EqEqEq
                    } else {
                        TokenKind::EqEq
                    }
                } else {
                    TokenKind::Assign
                }
            }
            '!' => {
                if self.match_char('=') {
                    if self.match_char('=') {
                        TokenKind::NotEqEq
                    } else {
                        TokenKind::NotEq
                    }
                } else {
                    TokenKind::Not
                }
            }
            '<' => {
                if self.match_char('<') {
                    if self.match_char('=') {
                        TokenKind::ShlAssign
                    } else {
                        TokenKind::Shl
                    }
                } else if self.match_char('=') {
                    TokenKind::LtEq
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.match_char('>') {
                    if self.match_char('>') {
                        if self.match_char('=') {
                            TokenKind::UShrAssign
                        } else {
                            TokenKind::UShr
                        }
                    } else if self.match_char('=') {
                        TokenKind::ShrAssign
                    } else {
                        TokenKind::Shr
                    }
                } else if self.match_char('=') {
                    TokenKind::GtEq
                } else {
                    TokenKind::Gt
                }
            }
            '+' => {
                if self.match_char('+') {
                    TokenKind::PlusPlus
                } else if self.match_char('=') {
                    TokenKind::PlusAssign
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.match_char('-') {
                    TokenKind::MinusMinus
                } else if self.match_char('=') {
                    TokenKind::MinusAssign
                } else {
                    TokenKind::Minus
                }
            }
            '*' => {
                if self.match_char('=') {
                    TokenKind::StarAssign
                } else {
                    TokenKind::Star
                }
            }
            '%' => {
                if self.match_char('=') {
                    TokenKind::PercentAssign
                } else {
                    TokenKind::Percent
                }
            }
            '&' => {
                if self.match_char('&') {
                    TokenKind::AndAnd
                } else if self.match_char('=') {
                    TokenKind::AndAssign
                } else {
                    TokenKind::BitAnd
                }
            }
            '|' => {
                if self.match_char('|') {
                    TokenKind::OrOr
                } else if self.match_char('=') {
                    TokenKind::OrAssign
                } else {
                    TokenKind::BitOr
                }
            }
            '^' => {
                if self.match_char('=') {
                    TokenKind::XorAssign
                } else {
                    TokenKind::BitXor
                }
            }
            '/' => {
                if self.regex_allowed() {
                    self.scan_regex()?
                } else if self.match_char('=') {
                    TokenKind::SlashAssign
                } else {
                    TokenKind::Slash
                }
            }
            '"' | '\'' => self.scan_string(c)?,
            c if c.is_ascii_digit() => self.scan_number(c)?,
            c if is_ident_start(c) => {
                let mut word = String::new();
                word.push(c);
                while !self.is_at_end() && is_ident_part(self.peek()) {
                    word.push(self.advance());
                }
                match keyword_for(&word) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident(word),
                }
            }
            other => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        Ok(make(kind, self))
    }

    /// A `/` starts a regex literal unless the previous token could end an
    /// operand.
    fn regex_allowed(&self) -> bool {
        match &self.prev {
            None => true,
            Some(kind) => !matches!(
                kind,
                TokenKind::Ident(_)
                    | TokenKind::Number(_)
                    | TokenKind::String(_)
                    | TokenKind::Regex { .. }
                    | TokenKind::RParen
                    | TokenKind::RBracket
                    | TokenKind::PlusPlus
                    | TokenKind::MinusMinus
                    | TokenKind::Keyword(Keyword::This)
                    | TokenKind::Keyword(Keyword::True)
                    | TokenKind::Keyword(Keyword::False)
                    | TokenKind::Keyword(Keyword::Null)
            ),
        }
    }

    fn scan_regex(&mut self) -> Result<TokenKind, ParseError> {
        let mut pattern = String::new();
        let mut in_class = false;
        loop {
            if self.is_at_end() || is_line_terminator(self.peek()) {
                return Err(self.error("unterminated regular expression"));
            }
            let c = self.advance();
            match c {
                '\\' => {
                    pattern.push(c);
                    if self.is_at_end() || is_line_terminator(self.peek()) {
                        return Err(self.error("unterminated regular expression"));
                    }
                    pattern.push(self.advance());
                }
                '[' => {
                    in_class = true;
                    pattern.push(c);
                }
                ']' => {
                    in_class = false;
                    pattern.push(c);
                }
                '/' if !in_class => break,
                _ => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while !self.is_at_end() && is_ident_part(self.peek()) {
            flags.push(self.advance());
        }
        Ok(TokenKind::Regex { pattern, flags })
    }

    fn scan_string(&mut self, quote: char) -> Result<TokenKind, ParseError> {
        let mut value = String::new();
        loop {
            if self.is_at_end() {
                return Err(self.error("unterminated string literal"));
            }
            let c = self.advance();
            if c == quote {
                break;
            }
            if is_line_terminator(c) {
                return Err(self.error("unterminated string literal"));
            }
            if c != '\\' {
                value.push(c);
                continue;
            }
            if self.is_at_end() {
                return Err(self.error("unterminated string literal"));
            }
            let esc = self.advance();
            match esc {
                'n' => value.push('\n'),
                't' => value.push('\t'),
                'r' => value.push('\r'),
                'b' => value.push('\u{8}'),
                'f' => value.push('\u{c}'),
                'v' => value.push('\u{b}'),
                '0' if !self.next_is_digit() => value.push('\0'),
                'x' => {
                    let code = self.scan_hex_digits(2)?;
                    value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                'u' => {
                    let code = self.scan_hex_digits(4)?;
                    value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                }
                c if is_line_terminator(c) => {} // line continuation
                other => value.push(other),
            }
        }
        Ok(TokenKind::String(value))
    }

    fn next_is_digit(&self) -> bool {
        !self.is_at_end() && self.peek().is_ascii_digit()
    }

    fn scan_hex_digits(&mut self, count: usize) -> Result<u32, ParseError> {
        let mut code = 0u32;
        for _ in 0..count {
            if self.is_at_end() {
                return Err(self.error("bad escape sequence"));
            }
            let c = self.advance();
            let digit = c.to_digit(16).ok_or_else(|| {
                ParseError::new("bad escape sequence", self.line, self.column)
            })?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn scan_number(&mut self, first: char) -> Result<TokenKind, ParseError> {
        let mut text = String::new();
        text.push(first);

        if first == '0' && !self.is_at_end() && matches!(self.peek(), 'x' | 'X') {
            self.advance();
            let mut hex = String::new();
            while !self.is_at_end() && self.peek().is_ascii_hexdigit() {
                hex.push(self.advance());
            }
            if hex.is_empty() {
                return Err(self.error("missing hexadecimal digits"));
            }
            let value = u64::from_str_radix(&hex, 16)
                .map_err(|_| ParseError::new("bad hexadecimal literal", self.line, self.column))?;
            return Ok(TokenKind::Number(value as f64));
        }

        while !self.is_at_end() && self.peek().is_ascii_digit() {
            text.push(self.advance());
        }
        if first != '.' && !self.is_at_end() && self.peek() == '.' {
            text.push(self.advance());
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }
        if !self.is_at_end() && matches!(self.peek(), 'e' | 'E') {
            text.push(self.advance());
            if !self.is_at_end() && matches!(self.peek(), '+' | '-') {
                text.push(self.advance());
            }
            if self.is_at_end() || !self.peek().is_ascii_digit() {
                return Err(self.error("missing exponent digits"));
            }
            while !self.is_at_end() && self.peek().is_ascii_digit() {
                text.push(self.advance());
            }
        }
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| ParseError::new("bad numeric literal", self.line, self.column))
    }
}

fn is_line_terminator(c: char) -> bool {
    matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
}

fn is_ident_start(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphabetic()
}

fn is_ident_part(c: char) -> bool {
    c == '$' || c == '_' || c.is_alphanumeric()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_punctuators() {
        assert_eq!(
            kinds("a >>>= b"),
            vec![
                TokenKind::Ident("a".to_string()),
                TokenKind::UShrAssign,
                TokenKind::Ident("b".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            kinds("var varx"),
            vec![
                TokenKind::Keyword(Keyword::Var),
                TokenKind::Ident("varx".to_string()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("42")[0], TokenKind::Number(42.0));
        assert_eq!(kinds("3.5e2")[0], TokenKind::Number(350.0));
        assert_eq!(kinds("0xff")[0], TokenKind::Number(255.0));
        assert_eq!(kinds(".25")[0], TokenKind::Number(0.25));
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            kinds(r#" "a\nb" "#)[0],
            TokenKind::String("a\nb".to_string())
        );
        assert_eq!(
            kinds(r"'\x41B'")[0],
            TokenKind::String("AB".to_string())
        );
    }

    #[test]
    fn test_regex_vs_division() {
        // After an operand, `/` is division.
        assert_eq!(kinds("a / b")[1], TokenKind::Slash);
        // At expression position, `/` starts a regex literal.
        assert_eq!(
            kinds("a = /ab+c/gi")[2],
            TokenKind::Regex {
                pattern: "ab+c".to_string(),
                flags: "gi".to_string(),
            }
        );
        // A `/` inside a character class does not terminate the literal.
        assert_eq!(
            kinds("= /[/]/")[1],
            TokenKind::Regex {
                pattern: "[/]".to_string(),
                flags: String::new(),
            }
        );
    }

    #[test]
    fn test_comments_and_newline_flag() {
        let tokens = Lexer::new("a // note\nb /* c */ d").tokenize().unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Ident("a".to_string()));
        assert!(tokens[1].newline_before);
        assert_eq!(tokens[1].kind, TokenKind::Ident("b".to_string()));
        assert!(!tokens[2].newline_before);
        assert_eq!(tokens[2].kind, TokenKind::Ident("d".to_string()));
    }

    #[test]
    fn test_unterminated_string_errors() {
        assert!(Lexer::new("'abc").tokenize().is_err());
        assert!(Lexer::new("\"ab\nc\"").tokenize().is_err());
    }

    #[test]
    fn test_positions() {
        let tokens = Lexer::new("a\n  b").tokenize().unwrap();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 3));
    }
}
