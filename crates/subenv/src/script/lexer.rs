//! Tokenizer for the script language.

use crate::interpreter::Failure;

/// Deepest bracket nesting the parser will accept.
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Assign,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    /// Statement separator: newline or `;` outside brackets.
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

pub fn syntax_error(message: impl Into<String>, line: usize, column: usize) -> Failure {
    Failure::new("SyntaxError", message).with_trace(format!("  at line {line}, column {column}"))
}

pub fn tokenize(src: &str) -> Result<Vec<Token>, Failure> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut depth = 0usize;
    let mut line = 1;
    let mut line_start = 0;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let column = i - line_start + 1;
        let push = |tokens: &mut Vec<Token>, tok: Tok| {
            tokens.push(Token { tok, line, column });
        };

        match c {
            '\n' => {
                if depth == 0 {
                    push(&mut tokens, Tok::End);
                }
                i += 1;
                line += 1;
                line_start = i;
            }
            ' ' | '\t' | '\r' => i += 1,
            '#' => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ';' => {
                push(&mut tokens, Tok::End);
                i += 1;
            }
            '"' | '\'' => {
                let (s, next) = lex_string(&chars, i, line, column)?;
                push(&mut tokens, Tok::Str(s));
                i = next;
            }
            '0'..='9' => {
                let (tok, next) = lex_number(&chars, i, line, column)?;
                push(&mut tokens, tok);
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                push(&mut tokens, Tok::Ident(chars[start..i].iter().collect()));
            }
            _ => {
                let next = chars.get(i + 1).copied();
                let (tok, width) = match (c, next) {
                    ('=', Some('=')) => (Tok::Eq, 2),
                    ('!', Some('=')) => (Tok::Ne, 2),
                    ('<', Some('=')) => (Tok::Le, 2),
                    ('>', Some('=')) => (Tok::Ge, 2),
                    ('/', Some('/')) => (Tok::SlashSlash, 2),
                    ('=', _) => (Tok::Assign, 1),
                    ('<', _) => (Tok::Lt, 1),
                    ('>', _) => (Tok::Gt, 1),
                    ('+', _) => (Tok::Plus, 1),
                    ('-', _) => (Tok::Minus, 1),
                    ('*', _) => (Tok::Star, 1),
                    ('/', _) => (Tok::Slash, 1),
                    ('%', _) => (Tok::Percent, 1),
                    (',', _) => (Tok::Comma, 1),
                    (':', _) => (Tok::Colon, 1),
                    ('.', _) => (Tok::Dot, 1),
                    ('(', _) => (Tok::LParen, 1),
                    ('[', _) => (Tok::LBracket, 1),
                    ('{', _) => (Tok::LBrace, 1),
                    (')', _) => (Tok::RParen, 1),
                    (']', _) => (Tok::RBracket, 1),
                    ('}', _) => (Tok::RBrace, 1),
                    _ => {
                        return Err(syntax_error(
                            format!("invalid character '{c}'"),
                            line,
                            column,
                        ));
                    }
                };
                match tok {
                    Tok::LParen | Tok::LBracket | Tok::LBrace => {
                        depth += 1;
                        if depth > MAX_NESTING {
                            return Err(syntax_error("too many nested brackets", line, column));
                        }
                    }
                    Tok::RParen | Tok::RBracket | Tok::RBrace => depth = depth.saturating_sub(1),
                    _ => {}
                }
                push(&mut tokens, tok);
                i += width;
            }
        }
    }

    tokens.push(Token {
        tok: Tok::End,
        line,
        column: i - line_start + 1,
    });
    Ok(tokens)
}

fn lex_string(
    chars: &[char],
    start: usize,
    line: usize,
    column: usize,
) -> Result<(String, usize), Failure> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            c if c == quote => return Ok((out, i + 1)),
            '\n' => break,
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .copied()
                    .ok_or_else(|| syntax_error("unterminated string literal", line, column))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .filter(|_| hex.len() == 4)
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                syntax_error(format!("invalid \\u escape '{hex}'"), line, column)
                            })?;
                        out.push(code);
                        i += 4;
                    }
                    other => out.push(other),
                }
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(syntax_error("unterminated string literal", line, column))
}

fn lex_number(
    chars: &[char],
    start: usize,
    line: usize,
    column: usize,
) -> Result<(Tok, usize), Failure> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
        i += 1;
    }
    if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
    let tok = if is_float {
        text.parse::<f64>().map(Tok::Float).ok()
    } else {
        text.parse::<i64>().map(Tok::Int).ok()
    };
    let tok = tok.ok_or_else(|| syntax_error(format!("invalid number '{text}'"), line, column))?;
    Ok((tok, i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(src: &str) -> Vec<Tok> {
        tokenize(src).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn operators_and_literals() {
        assert_eq!(
            toks("x = 1.5 // 2 != 'a'"),
            vec![
                Tok::Ident("x".into()),
                Tok::Assign,
                Tok::Float(1.5),
                Tok::SlashSlash,
                Tok::Int(2),
                Tok::Ne,
                Tok::Str("a".into()),
                Tok::End,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_do_not_end_statements() {
        assert_eq!(
            toks("[1,\n 2]\ny"),
            vec![
                Tok::LBracket,
                Tok::Int(1),
                Tok::Comma,
                Tok::Int(2),
                Tok::RBracket,
                Tok::End,
                Tok::Ident("y".into()),
                Tok::End,
            ]
        );
    }

    #[test]
    fn comments_and_escapes() {
        assert_eq!(
            toks("\"a\\n\\u0041\" # trailing"),
            vec![Tok::Str("a\nA".into()), Tok::End]
        );
    }

    #[test]
    fn tracks_lines() {
        let tokens = tokenize("a\n  b").unwrap();
        assert_eq!(tokens[2].line, 2);
        assert_eq!(tokens[2].column, 3);
    }

    #[test]
    fn reports_unterminated_string() {
        let err = tokenize("x = 'abc").unwrap_err();
        assert_eq!(err.kind, "SyntaxError");
        assert!(err.trace.contains("line 1"), "{}", err.trace);
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = "[".repeat(MAX_NESTING + 1);
        assert_eq!(tokenize(&deep).unwrap_err().message, "too many nested brackets");
    }

    #[test]
    fn integer_overflow_is_a_syntax_error() {
        assert!(tokenize("99999999999999999999").is_err());
    }
}
