use logos::Logos;
use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token<'a> {
    pub kind: TokenKind,
    pub span: Range<usize>,
    pub slice: &'a str,
}

pub(crate) fn tokenize(s: &str) -> Vec<Token<'_>> {
    TokenKind::lexer(s)
        .spanned()
        .map(|(kind, span)| Token {
            kind,
            slice: &s[span.clone()],
            span,
        })
        .collect()
}

#[derive(Logos, Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum TokenKind {
    #[regex(r"([0-9]+(\.[0-9]+)?)|(\.[0-9]+)")]
    Number,

    // Count, 'd', then numeric faces or a one letter denomination, then any
    // modifier suffix. Split apart by `DieTerm::from_notation`.
    #[regex(r"[0-9]*[dD]([0-9]+|[a-zA-Z])[a-zA-Z0-9<>=]*", priority = 10)]
    Dice,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,
    #[regex(r"@[a-zA-Z0-9_.]+")]
    DataRef,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[regex(r"\}[a-zA-Z0-9<>=]*")]
    RightBrace,
    #[token(",")]
    Comma,

    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,

    #[regex(r"\[[^\]]+\]")]
    Flavor,
    #[token("[]")]
    ErrEmptyFlavor,

    #[regex(r"[ \t\r\n]+", logos::skip)]
    #[error]
    Error,
}

impl TokenKind {
    pub const OPERATORS: &'static [Self] =
        &[Self::Plus, Self::Minus, Self::Star, Self::Slash, Self::Percent];

    pub fn as_str(&self) -> &'static str {
        use TokenKind::*;

        match self {
            Number => "<number>",
            Dice => "<dice>",
            Ident => "<identifier>",
            DataRef => "<data reference>",
            LeftParen => "'('",
            RightParen => "')'",
            LeftBrace => "'{'",
            RightBrace => "'}'",
            Comma => "','",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Percent => "'%'",
            Flavor => "<flavor>",
            ErrEmptyFlavor | Error => "<error>",
        }
    }

    pub fn is_operator(&self) -> bool {
        Self::OPERATORS.contains(self)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &str) -> Vec<TokenKind> {
        tokenize(s).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_dice_and_numbers() {
        use TokenKind::*;
        assert_eq!(kinds("2d6 + 4"), vec![Dice, Plus, Number]);
        assert_eq!(kinds("d20kh1"), vec![Dice]);
        assert_eq!(kinds("4dF"), vec![Dice]);
        assert_eq!(kinds("2.5*.5"), vec![Number, Star, Number]);
        assert_eq!(kinds("8d6cs>=5"), vec![Dice]);
    }

    #[test]
    fn test_lex_groups() {
        use TokenKind::*;
        assert_eq!(
            kinds("floor((1d4)d6 / 2)"),
            vec![Ident, LeftParen, LeftParen, Dice, RightParen, Dice, Slash, Number, RightParen]
        );
        assert_eq!(
            kinds("{1d20, 1d20}kh"),
            vec![LeftBrace, Dice, Comma, Dice, RightBrace]
        );
        assert_eq!(tokenize("{1, 2}kh").last().map(|t| t.slice), Some("}kh"));
    }

    #[test]
    fn test_lex_flavor_and_refs() {
        use TokenKind::*;
        assert_eq!(
            kinds("1d8[slashing] + @abilities.str.mod"),
            vec![Dice, Flavor, Plus, DataRef]
        );
        assert_eq!(kinds("1d8[]"), vec![Dice, ErrEmptyFlavor]);
        assert_eq!(kinds("1d8[a + (b]"), vec![Dice, Flavor]);
        assert_eq!(kinds("2 & 3"), vec![Number, Error, Number]);
    }
}
