// YARA tokenizer.
//
// Converts source text into the token stream that backs all later editing
// and printing. Tokens keep their written spelling (radix, suffixes,
// escapes) so output reproduces the input exactly, token for token.

mod cursor;

use cursor::Cursor;
use yar_common::literal::LiteralValue;
use yar_common::token::integer_function_from_str;
use yar_common::{keyword_from_str, Error, Literal, Location, Result, Token, TokenKind, TokenStream};

/// Tracks what the lexer is currently inside of.
#[derive(Debug, Clone, Copy, PartialEq)]
enum LexerState {
    /// Ordinary tokenization.
    Normal,
    /// Inside a hex string body (`{ 01 ?? [2-4] }`).
    HexString,
}

/// The YARA lexer. Fills a [`TokenStream`] from source text.
///
/// A small state stack switches between normal and hex-string tokenization;
/// one token of lookbehind (the last significant kind) disambiguates regexps
/// from comments, include paths from plain strings, and hex-string bodies
/// from rule bodies.
pub struct Lexer<'src> {
    cursor: Cursor<'src>,
    stream: TokenStream,
    state_stack: Vec<LexerState>,
    /// Kind of the last non-trivia token emitted.
    last_significant: Option<TokenKind>,
    /// Whether we are lexing inside a `strings:` section.
    in_strings_section: bool,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            cursor: Cursor::new(source),
            stream: TokenStream::new(),
            state_stack: vec![LexerState::Normal],
            last_significant: None,
            in_strings_section: false,
        }
    }

    /// Tokenize the entire source into a stream.
    pub fn tokenize(source: &str) -> Result<TokenStream> {
        let mut lexer = Lexer::new(source);
        while !lexer.cursor.is_eof() {
            lexer.next_token()?;
        }
        Ok(lexer.stream)
    }

    fn state(&self) -> LexerState {
        *self.state_stack.last().expect("state stack never empties")
    }

    fn next_token(&mut self) -> Result<()> {
        self.skip_blanks();
        if self.cursor.is_eof() {
            return Ok(());
        }
        match self.state() {
            LexerState::Normal => self.lex_normal(),
            LexerState::HexString => self.lex_hex(),
        }
    }

    /// Skip spaces and tabs; newlines are tokens, not blanks.
    fn skip_blanks(&mut self) {
        self.cursor.eat_while(|c| c == ' ' || c == '\t');
    }

    // ── Emission helpers ───────────────────────────────────────────────

    fn emit(&mut self, kind: TokenKind, value: Option<Literal>, location: Location) {
        self.stream.push_back(Token::new(kind, value, location));
        if !kind.is_trivia() {
            self.last_significant = Some(kind);
            match kind {
                TokenKind::StringsKw => self.in_strings_section = true,
                TokenKind::MetaKw | TokenKind::ConditionKw | TokenKind::RBrace => {
                    self.in_strings_section = false
                }
                _ => {}
            }
        }
    }

    /// Consume one character and emit a fixed-text token.
    fn single(&mut self, kind: TokenKind) {
        let location = self.cursor.location();
        self.cursor.advance();
        self.emit(kind, None, location);
    }

    /// Consume two characters and emit a fixed-text token.
    fn double(&mut self, kind: TokenKind) {
        let location = self.cursor.location();
        self.cursor.advance();
        self.cursor.advance();
        self.emit(kind, None, location);
    }

    // ── Normal mode ────────────────────────────────────────────────────

    fn lex_normal(&mut self) -> Result<()> {
        let location = self.cursor.location();
        let c = self.cursor.peek().expect("checked for eof");

        match c {
            '\n' => {
                self.cursor.advance();
                self.emit(TokenKind::Newline, None, location);
            }
            '\r' => {
                self.cursor.advance();
                if self.cursor.peek() == Some('\n') {
                    self.cursor.advance();
                }
                self.emit(TokenKind::Newline, None, location);
            }

            '{' => {
                // `= {` inside a strings section opens a hex string body.
                if self.in_strings_section && self.last_significant == Some(TokenKind::Assign) {
                    self.single(TokenKind::HexStart);
                    self.state_stack.push(LexerState::HexString);
                } else {
                    self.single(TokenKind::LBrace);
                }
            }
            '}' => self.single(TokenKind::RBrace),
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            ':' => self.single(TokenKind::Colon),
            ',' => self.single(TokenKind::Comma),
            '+' => self.single(TokenKind::Plus),
            '-' => self.single(TokenKind::Minus),
            '*' => self.single(TokenKind::Star),
            '\\' => self.single(TokenKind::Backslash),
            '%' => self.single(TokenKind::Percent),
            '&' => self.single(TokenKind::BitAnd),
            '|' => self.single(TokenKind::BitOr),
            '^' => self.single(TokenKind::BitXor),
            '~' => self.single(TokenKind::BitNot),

            '.' => {
                if self.cursor.peek_next() == Some('.') {
                    self.double(TokenKind::DotDot);
                } else {
                    self.single(TokenKind::Dot);
                }
            }
            '=' => {
                if self.cursor.peek_next() == Some('=') {
                    self.double(TokenKind::Eq);
                } else {
                    self.single(TokenKind::Assign);
                }
            }
            '<' => match self.cursor.peek_next() {
                Some('=') => self.double(TokenKind::Le),
                Some('<') => self.double(TokenKind::Shl),
                _ => self.single(TokenKind::Lt),
            },
            '>' => match self.cursor.peek_next() {
                Some('=') => self.double(TokenKind::Ge),
                Some('>') => self.double(TokenKind::Shr),
                _ => self.single(TokenKind::Gt),
            },
            '!' => {
                if self.cursor.peek_next() == Some('=') {
                    self.double(TokenKind::Neq);
                } else {
                    self.lex_string_reference('!', TokenKind::StringLength)?;
                }
            }
            '$' => self.lex_string_reference('$', TokenKind::StringId)?,
            '#' => self.lex_string_reference('#', TokenKind::StringCount)?,
            '@' => self.lex_string_reference('@', TokenKind::StringOffset)?,

            '"' => self.lex_string(location)?,
            '/' => self.lex_slash(location)?,
            '0'..='9' => self.lex_number(location)?,
            c if is_ident_start(c) => self.lex_ident(location),

            other => {
                return Err(Error::lex(
                    location,
                    format!("unexpected character {other:?}"),
                ))
            }
        }
        Ok(())
    }

    // ── Identifiers and keywords ───────────────────────────────────────

    fn lex_ident(&mut self, location: Location) {
        let start = self.cursor.pos();
        self.cursor.eat_while(is_ident_continue);
        let text = self.cursor.slice(start, self.cursor.pos());
        if let Some(kind) = keyword_from_str(text) {
            self.emit(kind, None, location);
        } else if integer_function_from_str(text) {
            self.emit(
                TokenKind::IntegerFunction,
                Some(Literal::from(text)),
                location,
            );
        } else {
            self.emit(TokenKind::Ident, Some(Literal::from(text)), location);
        }
    }

    /// `$name`, `$name*`, `#name`, `@name`, `!name`, and the bare sigils
    /// used inside `for` bodies.
    fn lex_string_reference(&mut self, sigil: char, kind: TokenKind) -> Result<()> {
        let location = self.cursor.location();
        let start = self.cursor.pos();
        self.cursor.advance(); // sigil
        self.cursor.eat_while(is_ident_continue);
        let mut kind = kind;
        if sigil == '$' && self.cursor.peek() == Some('*') {
            self.cursor.advance();
            kind = TokenKind::StringWildcard;
        }
        let text = self.cursor.slice(start, self.cursor.pos());
        self.emit(kind, Some(Literal::from(text)), location);
        Ok(())
    }

    // ── Strings, regexps, comments ─────────────────────────────────────

    fn lex_string(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();
        self.cursor.advance(); // opening quote
        let mut value = String::new();
        loop {
            match self.cursor.peek() {
                None | Some('\n') => {
                    return Err(Error::lex(location, "unterminated string literal"))
                }
                Some('"') => {
                    self.cursor.advance();
                    break;
                }
                Some('\\') => {
                    self.cursor.advance();
                    let escape_loc = self.cursor.location();
                    match self.cursor.advance() {
                        Some('"') => value.push('"'),
                        Some('\\') => value.push('\\'),
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('r') => value.push('\r'),
                        Some('x') => {
                            let hi = self.cursor.advance();
                            let lo = self.cursor.advance();
                            let byte = match (
                                hi.and_then(|c| c.to_digit(16)),
                                lo.and_then(|c| c.to_digit(16)),
                            ) {
                                (Some(h), Some(l)) => (h * 16 + l) as u8,
                                _ => {
                                    return Err(Error::lex(
                                        escape_loc,
                                        "invalid \\x escape in string literal",
                                    ))
                                }
                            };
                            value.push(byte as char);
                        }
                        Some(other) => {
                            return Err(Error::lex(
                                escape_loc,
                                format!("invalid escape sequence \\{other}"),
                            ))
                        }
                        None => return Err(Error::lex(location, "unterminated string literal")),
                    }
                }
                Some(_) => {
                    let c = self.cursor.advance().expect("peeked");
                    value.push(c);
                }
            }
        }
        let verbatim = self.cursor.slice(start, self.cursor.pos());
        let kind = if self.last_significant == Some(TokenKind::IncludeKw) {
            TokenKind::IncludePath
        } else {
            TokenKind::StringLit
        };
        self.emit(
            kind,
            Some(Literal::with_format(LiteralValue::String(value), verbatim)),
            location,
        );
        Ok(())
    }

    /// `//` and `/* */` comments, or a regexp when the previous significant
    /// token admits one (`=` in a strings section, `matches`).
    fn lex_slash(&mut self, location: Location) -> Result<()> {
        match self.cursor.peek_next() {
            Some('/') => self.lex_line_comment(location),
            Some('*') => self.lex_block_comment(location),
            _ => {
                let regexp_position = matches!(
                    self.last_significant,
                    Some(TokenKind::Assign) | Some(TokenKind::MatchesKw)
                );
                if regexp_position {
                    self.lex_regexp(location)
                } else {
                    Err(Error::lex(location, "unexpected character '/'"))
                }
            }
        }
    }

    fn lex_line_comment(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();
        self.cursor.eat_while(|c| c != '\n');
        let text = self.cursor.slice(start, self.cursor.pos());
        self.emit(TokenKind::CommentLine, Some(Literal::from(text)), location);
        Ok(())
    }

    fn lex_block_comment(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();
        self.cursor.advance(); // '/'
        self.cursor.advance(); // '*'
        loop {
            match self.cursor.peek() {
                None => return Err(Error::lex(location, "unterminated block comment")),
                Some('*') if self.cursor.peek_next() == Some('/') => {
                    self.cursor.advance();
                    self.cursor.advance();
                    break;
                }
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }
        let text = self.cursor.slice(start, self.cursor.pos());
        self.emit(TokenKind::CommentBlock, Some(Literal::from(text)), location);
        Ok(())
    }

    fn lex_regexp(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();
        self.cursor.advance(); // opening '/'
        let pattern_start = self.cursor.pos();
        loop {
            match self.cursor.peek() {
                None | Some('\n') => {
                    return Err(Error::lex(location, "unterminated regular expression"))
                }
                Some('\\') => {
                    self.cursor.advance();
                    self.cursor.advance();
                }
                Some('/') => break,
                Some(_) => {
                    self.cursor.advance();
                }
            }
        }
        let pattern = self.cursor.slice(pattern_start, self.cursor.pos()).to_string();
        self.cursor.advance(); // closing '/'
        self.cursor.eat_while(|c| c == 'i' || c == 's');
        let verbatim = self.cursor.slice(start, self.cursor.pos());
        self.emit(
            TokenKind::Regexp,
            Some(Literal::with_format(LiteralValue::String(pattern), verbatim)),
            location,
        );
        Ok(())
    }

    // ── Numbers ────────────────────────────────────────────────────────

    fn lex_number(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();

        if self.cursor.peek() == Some('0')
            && matches!(self.cursor.peek_next(), Some('x') | Some('o'))
        {
            let radix = if self.cursor.peek_next() == Some('x') { 16 } else { 8 };
            self.cursor.advance();
            self.cursor.advance();
            let digits_start = self.cursor.pos();
            self.cursor.eat_while(|c| c.is_digit(radix));
            let digits = self.cursor.slice(digits_start, self.cursor.pos());
            let verbatim = self.cursor.slice(start, self.cursor.pos());
            if digits.is_empty() {
                return Err(Error::lex(location, format!("invalid integer literal {verbatim}")));
            }
            let value = u64::from_str_radix(digits, radix)
                .map_err(|_| Error::integer_overflow(location, verbatim))?;
            self.emit(
                TokenKind::IntLit,
                Some(Literal::with_format(LiteralValue::Uint(value), verbatim)),
                location,
            );
            return Ok(());
        }

        self.cursor.eat_while(|c| c.is_ascii_digit());

        // A fractional part makes this a double; `..` stays a range.
        if self.cursor.peek() == Some('.')
            && self.cursor.peek_next().is_some_and(|c| c.is_ascii_digit())
        {
            self.cursor.advance();
            self.cursor.eat_while(|c| c.is_ascii_digit());
            let verbatim = self.cursor.slice(start, self.cursor.pos());
            let value: f64 = verbatim
                .parse()
                .map_err(|_| Error::lex(location, format!("invalid double literal {verbatim}")))?;
            self.emit(
                TokenKind::DoubleLit,
                Some(Literal::with_format(LiteralValue::Double(value), verbatim)),
                location,
            );
            return Ok(());
        }

        let digits = self.cursor.slice(start, self.cursor.pos()).to_string();
        let multiplier: i64 = match (self.cursor.peek(), self.cursor.peek_next()) {
            (Some('K'), Some('B')) => {
                self.cursor.advance();
                self.cursor.advance();
                1024
            }
            (Some('M'), Some('B')) => {
                self.cursor.advance();
                self.cursor.advance();
                1024 * 1024
            }
            _ => 1,
        };
        let verbatim = self.cursor.slice(start, self.cursor.pos());
        let base: i64 = digits
            .parse()
            .map_err(|_| Error::integer_overflow(location, verbatim))?;
        let value = base
            .checked_mul(multiplier)
            .ok_or_else(|| Error::integer_overflow(location, verbatim))?;
        let literal = if multiplier == 1 {
            Literal::new(LiteralValue::Int(value))
        } else {
            Literal::with_format(LiteralValue::Int(value), verbatim)
        };
        self.emit(TokenKind::IntLit, Some(literal), location);
        Ok(())
    }

    // ── Hex string mode ────────────────────────────────────────────────

    fn lex_hex(&mut self) -> Result<()> {
        let location = self.cursor.location();
        let c = self.cursor.peek().expect("checked for eof");
        match c {
            '\n' => {
                self.cursor.advance();
                self.emit(TokenKind::Newline, None, location);
            }
            '}' => {
                self.single(TokenKind::HexEnd);
                self.state_stack.pop();
            }
            '(' => self.single(TokenKind::HexAltStart),
            ')' => self.single(TokenKind::HexAltEnd),
            '|' => self.single(TokenKind::HexAlt),
            '[' => self.lex_hex_jump(location)?,
            '/' => self.lex_slash(location)?,
            c if c.is_ascii_hexdigit() || c == '?' => {
                let start = self.cursor.pos();
                self.cursor.advance();
                let second = self.cursor.peek();
                if !second.is_some_and(|c| c.is_ascii_hexdigit() || c == '?') {
                    return Err(Error::lex(location, "hex string bytes come in pairs"));
                }
                self.cursor.advance();
                let text = self.cursor.slice(start, self.cursor.pos());
                self.emit(TokenKind::HexByte, Some(Literal::from(text)), location);
            }
            other => {
                return Err(Error::lex(
                    location,
                    format!("unexpected character {other:?} in hex string"),
                ))
            }
        }
        Ok(())
    }

    /// `[n]`, `[n-m]`, `[n-]`, `[-m]`, `[-]` captured as one token; bounds
    /// are validated here and decoded again by the parser.
    fn lex_hex_jump(&mut self, location: Location) -> Result<()> {
        let start = self.cursor.pos();
        self.cursor.advance(); // '['
        self.cursor
            .eat_while(|c| c.is_ascii_digit() || c == '-' || c == ' ');
        if self.cursor.peek() != Some(']') {
            return Err(Error::lex(location, "unterminated hex string jump"));
        }
        self.cursor.advance();
        let text = self.cursor.slice(start, self.cursor.pos());
        let inner = &text[1..text.len() - 1];
        let trimmed: String = inner.chars().filter(|c| *c != ' ').collect();
        let valid = match trimmed.split_once('-') {
            Some((lo, hi)) => {
                (lo.is_empty() || lo.bytes().all(|b| b.is_ascii_digit()))
                    && (hi.is_empty() || hi.bytes().all(|b| b.is_ascii_digit()))
            }
            None => !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()),
        };
        if !valid {
            return Err(Error::lex(location, format!("invalid hex string jump {text}")));
        }
        self.emit(TokenKind::HexJump, Some(Literal::from(text)), location);
        Ok(())
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
