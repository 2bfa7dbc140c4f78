//! Line tokenizer for the command language
//!
//! Whitespace-separated words with double-quoted strings. `//` and `#`
//! start a comment outside quotes.

/// One token with its quoting preserved, so `"5"` stays a string literal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub quoted: bool,
}

impl Token {
    fn word(text: String) -> Self {
        Token {
            text,
            quoted: false,
        }
    }

    fn quoted(text: String) -> Self {
        Token { text, quoted: true }
    }
}

/// Tokenize one source line. `Err` carries a message for parse reporting.
pub fn tokenize(line: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = line.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ch if ch.is_whitespace() => {
                chars.next();
            }
            '#' => break,
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    break;
                }
                return Err("unexpected '/'".to_string());
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                for ch in chars.by_ref() {
                    if ch == '"' {
                        closed = true;
                        break;
                    }
                    text.push(ch);
                }
                if !closed {
                    return Err("unterminated string".to_string());
                }
                tokens.push(Token::quoted(text));
            }
            _ => {
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_whitespace() || ch == '"' {
                        break;
                    }
                    text.push(ch);
                    chars.next();
                }
                tokens.push(Token::word(text));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words_and_strings() {
        let tokens = tokenize(r#"say "hello there" 0x40 5"#).unwrap();
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[0], Token::word("say".into()));
        assert_eq!(tokens[1], Token::quoted("hello there".into()));
        assert_eq!(tokens[2], Token::word("0x40".into()));
        assert_eq!(tokens[3], Token::word("5".into()));
    }

    #[test]
    fn comments_are_stripped() {
        assert!(tokenize("# a comment").unwrap().is_empty());
        let tokens = tokenize("pause 500 // wait a bit").unwrap();
        assert_eq!(tokens.len(), 2);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        assert!(tokenize(r#"say "oops"#).is_err());
    }
}
