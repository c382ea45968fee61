//! Quote-aware command tokenizer.
//!
//! Splits on whitespace outside quotes. Quote characters are kept in the
//! emitted tokens so the validator can see whether an argument was fully
//! wrapped; [`unquote`] removes them afterwards to produce the final argv.
//!
//! The only escape recognised is a backslash directly before a quote
//! character, which makes that quote literal. Every other backslash is an
//! ordinary character.

/// Tokenizer state while walking the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// Splits `input` into raw tokens, quotes preserved.
///
/// An unterminated quote runs to the end of the input.
///
/// # Examples
///
/// ```
/// use warden::sandbox::tokenizer::tokenize;
///
/// let tokens = tokenize(r#"git commit -m "fix the parser""#);
/// assert_eq!(tokens, vec!["git", "commit", "-m", "\"fix the parser\""]);
/// ```
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote = Quote::None;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if is_quote(next) {
                    current.push(c);
                    current.push(next);
                    chars.next();
                    in_token = true;
                    continue;
                }
            }
            current.push(c);
            in_token = true;
            continue;
        }

        match quote {
            Quote::None => {
                if c.is_whitespace() {
                    if in_token {
                        tokens.push(std::mem::take(&mut current));
                        in_token = false;
                    }
                    continue;
                }
                if c == '\'' {
                    quote = Quote::Single;
                } else if c == '"' {
                    quote = Quote::Double;
                }
                current.push(c);
                in_token = true;
            }
            Quote::Single => {
                if c == '\'' {
                    quote = Quote::None;
                }
                current.push(c);
            }
            Quote::Double => {
                if c == '"' {
                    quote = Quote::None;
                }
                current.push(c);
            }
        }
    }

    if in_token {
        tokens.push(current);
    }
    tokens
}

/// Returns `true` if `token` starts and ends with the same quote character.
#[must_use]
pub fn is_fully_quoted(token: &str) -> bool {
    let mut chars = token.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) => is_quote(first) && first == last,
        _ => false,
    }
}

/// Removes quoting from a raw token, yielding the literal argument.
///
/// Applies the same rules as [`tokenize`]: delimiting quotes are dropped and
/// `\'` / `\"` become a literal quote.
#[must_use]
pub fn unquote(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut quote = Quote::None;
    let mut chars = token.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                if is_quote(next) {
                    out.push(next);
                    chars.next();
                    continue;
                }
            }
            out.push(c);
            continue;
        }

        match (quote, c) {
            (Quote::None, '\'') => quote = Quote::Single,
            (Quote::None, '"') => quote = Quote::Double,
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            _ => out.push(c),
        }
    }
    out
}
