use super::error::{FormulaError, FormulaErrorKind};
use super::lexer::{tokenize, Token, TokenKind};
use super::modifier::{parse_modifiers, Modifier};
use crate::common::*;
use crate::roll::dice::{DieCount, DieTerm};
use crate::roll::math::MathFunction;
use crate::roll::tree::*;
use crate::roll::Number;
use std::ops::Range;
use tracing::debug;

type PResult<T> = Result<T, FormulaError>;

/// A term together with the source text it was parsed from. `body_end`
/// excludes any trailing flavor.
#[derive(Debug, Clone)]
struct Spanned {
    term: RollTerm,
    span: Range<usize>,
    body_end: usize,
}

impl Spanned {
    fn new(term: RollTerm, span: Range<usize>) -> Self {
        Self {
            term,
            body_end: span.end,
            span,
        }
    }

    fn detached(term: RollTerm) -> Self {
        Self::new(term, 0..0)
    }
}

fn unwrap_terms(terms: Vec<Spanned>) -> Vec<RollTerm> {
    terms.into_iter().map(|t| t.term).collect()
}

pub(crate) struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token<'a>>,
    pos: usize,
}

impl<'a> Parser<'a> {
    const OPERAND: &'static str = "<term>";

    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            tokens: tokenize(source),
            pos: 0,
        }
    }

    pub fn parse(mut self) -> PResult<Vec<RollTerm>> {
        let terms = self.parse_sequence(&[])?;
        debug!(formula = self.source, terms = terms.len(), "parsed formula");
        Ok(unwrap_terms(terms))
    }

    fn peek(&self) -> Option<&Token<'a>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn advance(&mut self) -> Option<Token<'a>> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error<T>(&self, kind: FormulaErrorKind, span: Range<usize>) -> PResult<T> {
        Err(FormulaError::new(kind, span, self.source))
    }

    /// Where the next token starts, or the end of the source.
    fn here(&self) -> Range<usize> {
        self.peek()
            .map_or(self.source.len()..self.source.len(), |t| t.span.clone())
    }

    /// Parses terms until one of `terminators` (left unconsumed) or the end
    /// of input.
    fn parse_sequence(&mut self, terminators: &[TokenKind]) -> PResult<Vec<Spanned>> {
        let mut terms: Vec<Spanned> = Vec::new();

        while let Some(kind) = self.peek_kind() {
            if terminators.contains(&kind) {
                break;
            }
            let token = match self.advance() {
                Some(token) => token,
                None => break,
            };

            match token.kind {
                TokenKind::LeftParen => terms.push(self.split_parentheses(token)?),
                TokenKind::LeftBrace => terms.push(self.split_pools(token)?),
                TokenKind::Ident => terms.push(self.parse_identifier(token)?),
                TokenKind::Number | TokenKind::Dice | TokenKind::DataRef => {
                    terms.push(self.classify_string_term(token)?)
                }
                kind if kind.is_operator() => {
                    let term = self.split_operators(&terms, token)?;
                    terms.push(term);
                }
                TokenKind::Flavor => self.attach_flavor(&mut terms, token)?,
                TokenKind::RightParen => return self.error(FormulaErrorKind::Unbalanced(')'), token.span),
                TokenKind::RightBrace => return self.error(FormulaErrorKind::Unbalanced('}'), token.span),
                TokenKind::Comma => {
                    return self.error(
                        FormulaErrorKind::UnexpectedToken {
                            expected: vec!["<operator>", Self::OPERAND],
                        },
                        token.span,
                    )
                }
                TokenKind::ErrEmptyFlavor => return self.error(FormulaErrorKind::EmptyFlavor, token.span),
                _ => return self.error(FormulaErrorKind::UnexpectedCharacter, token.span),
            }
        }

        let terms = simplify(terms, Some(self.source))?;
        if let Err((kind, i)) = check_alternation(terms.iter().map(|t| &t.term)) {
            return self.error(kind, terms[i].span.clone());
        }
        Ok(terms)
    }

    fn expect_close(&mut self, kind: TokenKind, open: &Token<'a>, opener: char) -> PResult<Token<'a>> {
        match self.advance() {
            Some(token) if token.kind == kind => Ok(token),
            _ => self.error(FormulaErrorKind::Unbalanced(opener), open.span.clone()),
        }
    }

    fn split_parentheses(&mut self, open: Token<'a>) -> PResult<Spanned> {
        let inner = self.parse_sequence(&[TokenKind::RightParen])?;
        let close = self.expect_close(TokenKind::RightParen, &open, '(')?;
        if inner.is_empty() {
            return self.error(
                FormulaErrorKind::UnexpectedToken {
                    expected: vec![Self::OPERAND],
                },
                close.span,
            );
        }

        let group = ParentheticalTerm::new(unwrap_terms(inner));
        let span = open.span.start..close.span.end;

        // `(1d4)d6`: the group supplies the count of an adjacent die
        let next = self
            .peek()
            .filter(|t| {
                t.kind == TokenKind::Dice
                    && t.span.start == close.span.end
                    && t.slice.starts_with(&['d', 'D'][..])
            })
            .cloned();
        if let Some(next) = next {
            match DieTerm::from_notation(next.slice) {
                Ok(Some(mut die)) => {
                    self.pos += 1;
                    die.number = DieCount::Intermediate(Box::new(group));
                    return Ok(Spanned::new(die.into(), span.start..next.span.end));
                }
                Ok(None) => {}
                Err(kind) => return self.error(kind, next.span),
            }
        }

        Ok(Spanned::new(group.into(), span))
    }

    fn parse_identifier(&mut self, name: Token<'a>) -> PResult<Spanned> {
        let is_call = self.peek().map_or(false, |t| {
            t.kind == TokenKind::LeftParen && t.span.start == name.span.end
        });
        if !is_call {
            return self.classify_string_term(name);
        }

        let function: MathFunction = match name.slice.parse() {
            Ok(function) => function,
            Err(()) => {
                return self.error(
                    FormulaErrorKind::UnknownFunction(name.slice.to_string()),
                    name.span,
                )
            }
        };
        let open = match self.advance() {
            Some(open) => open,
            None => return self.error(FormulaErrorKind::Unbalanced('('), name.span),
        };

        let mut args = Vec::new();
        let close = if self.peek_kind() == Some(TokenKind::RightParen) {
            self.expect_close(TokenKind::RightParen, &open, '(')?
        } else {
            loop {
                let arg = self.parse_sequence(&[TokenKind::Comma, TokenKind::RightParen])?;
                if arg.is_empty() && self.peek().is_some() {
                    return self.error(
                        FormulaErrorKind::UnexpectedToken {
                            expected: vec![Self::OPERAND],
                        },
                        self.here(),
                    );
                }
                args.push(unwrap_terms(arg));
                match self.advance() {
                    Some(t) if t.kind == TokenKind::Comma => continue,
                    Some(t) if t.kind == TokenKind::RightParen => break t,
                    _ => return self.error(FormulaErrorKind::Unbalanced('('), open.span.clone()),
                }
            }
        };

        let span = name.span.start..close.span.end;
        if !function.arity().accepts(args.len()) {
            return self.error(
                FormulaErrorKind::FunctionArity {
                    expected: function.arity().to_string(),
                    found: args.len(),
                },
                span,
            );
        }

        Ok(Spanned::new(FunctionTerm::new(function, args).into(), span))
    }

    fn split_pools(&mut self, open: Token<'a>) -> PResult<Spanned> {
        let mut members = Vec::new();
        let close = loop {
            let member = self.parse_sequence(&[TokenKind::Comma, TokenKind::RightBrace])?;
            let next = match self.advance() {
                Some(next) => next,
                None => return self.error(FormulaErrorKind::Unbalanced('{'), open.span.clone()),
            };
            if member.is_empty() {
                return self.error(
                    FormulaErrorKind::UnexpectedToken {
                        expected: vec![Self::OPERAND],
                    },
                    next.span,
                );
            }
            members.push(unwrap_terms(member));
            match next.kind {
                TokenKind::Comma => continue,
                _ => break next,
            }
        };

        let suffix = &close.slice[1..];
        let modifiers = match parse_modifiers(suffix) {
            Ok(modifiers) => modifiers,
            Err(_) => {
                return self.error(
                    FormulaErrorKind::InvalidModifier(suffix.to_string()),
                    close.span,
                )
            }
        };
        if let Some(bad) = modifiers.iter().find(|m| !pool_accepts(m)) {
            return self.error(FormulaErrorKind::InvalidModifier(bad.to_string()), close.span);
        }

        let terms = match NonEmpty::try_from_vec(members) {
            Ok(terms) => terms,
            Err(_) => return self.error(FormulaErrorKind::InvalidDie, open.span),
        };
        let span = open.span.start..close.span.end;
        Ok(Spanned::new(PoolTerm::new(terms, modifiers).into(), span))
    }

    /// A sign at the start of a sequence or after another operator is unary.
    /// A unary sign directly before a number folds into it.
    fn split_operators(&mut self, terms: &[Spanned], token: Token<'a>) -> PResult<Spanned> {
        let unary = terms.last().map_or(true, |t| t.term.is_operator());
        let operator = match Operator::from_symbol(token.slice, unary) {
            Some(operator) => operator,
            None => return self.error(FormulaErrorKind::MissingOperand, token.span),
        };

        if let Operator::Unary(op) = operator {
            let number = self
                .peek()
                .filter(|t| t.kind == TokenKind::Number)
                .cloned();
            if let Some(number) = number {
                self.pos += 1;
                let value = self.parse_number(&number)?;
                let value = match op {
                    UnaryOperator::Neg => -value,
                    UnaryOperator::Pos => value,
                };
                let span = token.span.start..number.span.end;
                return Ok(Spanned::new(NumericTerm::new(value).into(), span));
            }
        }

        Ok(Spanned::new(OperatorTerm::new(operator).into(), token.span))
    }

    fn attach_flavor(&self, terms: &mut [Spanned], token: Token<'a>) -> PResult<()> {
        let text = &token.slice[1..token.slice.len() - 1];
        match terms.last_mut() {
            Some(last) if !last.term.is_operator() => {
                let options = last.term.options_mut();
                options.flavor = Some(match options.flavor.take() {
                    Some(flavor) => format!("{} {}", flavor, text),
                    None => text.to_string(),
                });
                last.span.end = token.span.end;
                Ok(())
            }
            _ => self.error(FormulaErrorKind::DanglingFlavor, token.span),
        }
    }

    fn parse_number(&self, token: &Token<'a>) -> PResult<Number> {
        match parse_number(token.slice) {
            Some(number) => Ok(number),
            None => self.error(FormulaErrorKind::UnexpectedCharacter, token.span.clone()),
        }
    }

    fn classify_string_term(&self, token: Token<'a>) -> PResult<Spanned> {
        let term: RollTerm = match token.kind {
            TokenKind::Number => NumericTerm::new(self.parse_number(&token)?).into(),
            TokenKind::Dice => match DieTerm::from_notation(token.slice) {
                Ok(Some(die)) => die.into(),
                Ok(None) => StringTerm::new(token.slice).into(),
                Err(kind) => return self.error(kind, token.span),
            },
            _ => StringTerm::new(token.slice).into(),
        };
        Ok(Spanned::new(term, token.span))
    }
}

fn parse_number(s: &str) -> Option<Number> {
    s.parse::<Int>()
        .map(Number::Int)
        .or_else(|_| s.parse::<Float>().map(Number::Float))
        .ok()
}

fn pool_accepts(modifier: &Modifier) -> bool {
    match modifier {
        Modifier::CountSuccesses(target) | Modifier::CountFailures(target) => target.is_some(),
        m => m.applies_to_pool(),
    }
}

/// Checks that operands and binary operators alternate. On failure returns
/// the offending term's index.
fn check_alternation<'t>(
    terms: impl IntoIterator<Item = &'t RollTerm>,
) -> Result<(), (FormulaErrorKind, usize)> {
    let mut expect_operand = true;
    let mut last = None;
    for (i, term) in terms.into_iter().enumerate() {
        match term {
            RollTerm::Operator(op) if op.operator.is_unary() => {
                if !expect_operand {
                    return Err((FormulaErrorKind::MissingOperator, i));
                }
            }
            RollTerm::Operator(_) => {
                if expect_operand {
                    return Err((FormulaErrorKind::MissingOperand, i));
                }
                expect_operand = true;
            }
            _ => {
                if !expect_operand {
                    return Err((FormulaErrorKind::MissingOperator, i));
                }
                expect_operand = false;
            }
        }
        last = Some(i);
    }
    match last {
        Some(i) if expect_operand => Err((FormulaErrorKind::MissingOperand, i)),
        _ => Ok(()),
    }
}

/// Checks the shape of a term sequence that was not produced by the parser,
/// including every nested sequence.
pub fn check_terms(terms: &[RollTerm]) -> Result<(), FormulaError> {
    check_alternation(terms)
        .map_err(|(kind, i)| FormulaError::detached(kind, terms[i].formula()))?;

    for term in terms {
        match term {
            RollTerm::Parenthetical(p) => check_terms(&p.terms)?,
            RollTerm::Pool(pool) => pool.terms.iter().try_for_each(|t| check_terms(t))?,
            RollTerm::Function(f) => f.args.iter().try_for_each(|t| check_terms(t))?,
            RollTerm::Die(die) => {
                if let DieCount::Intermediate(count) = &die.number {
                    check_terms(&count.terms)?;
                }
            }
            RollTerm::Numeric(_) | RollTerm::Operator(_) | RollTerm::String(_) => {}
        }
    }
    Ok(())
}

/// Merges string terms with the non-operator terms they touch, then
/// reclassifies the merged text. Running it twice changes nothing.
pub fn simplify_terms(terms: Vec<RollTerm>) -> PResult<Vec<RollTerm>> {
    let terms = simplify(terms.into_iter().map(Spanned::detached).collect(), None)?;
    Ok(unwrap_terms(terms))
}

/// With a `source` merged terms keep the text they were parsed from,
/// otherwise their formulas are joined.
fn simplify(terms: Vec<Spanned>, source: Option<&str>) -> PResult<Vec<Spanned>> {
    let mut out: Vec<Spanned> = Vec::with_capacity(terms.len());
    for term in terms {
        match out.pop() {
            Some(prev) if should_merge(&prev.term, &term.term) => {
                out.push(merge(prev, term, source)?)
            }
            Some(prev) => {
                out.push(prev);
                out.push(term);
            }
            None => out.push(term),
        }
    }
    Ok(out)
}

fn should_merge(prev: &RollTerm, next: &RollTerm) -> bool {
    let string = matches!(prev, RollTerm::String(_)) || matches!(next, RollTerm::String(_));
    string && !prev.is_operator() && !next.is_operator()
}

fn merge(prev: Spanned, next: Spanned, source: Option<&str>) -> PResult<Spanned> {
    let text = match source.and_then(|s| s.get(prev.span.start..next.body_end)) {
        Some(text) => text.to_string(),
        None => join_formulas(&prev.term, &next.term),
    };
    let flavor = next
        .term
        .options()
        .flavor
        .clone()
        .or_else(|| prev.term.options().flavor.clone());

    let mut term = match (reclassify(&text), source) {
        (Ok(term), _) => term,
        (Err(kind), Some(source)) => {
            return Err(FormulaError::new(kind, prev.span.start..next.body_end, source))
        }
        (Err(kind), None) => return Err(FormulaError::detached(kind, text)),
    };
    term.options_mut().flavor = flavor;
    Ok(Spanned {
        term,
        span: prev.span.start..next.span.end,
        body_end: next.body_end,
    })
}

/// Joins two formulas, separated by a space unless together they read as a
/// single token such as `2` and `d6`.
fn join_formulas(prev: &RollTerm, next: &RollTerm) -> String {
    let (prev, next) = (prev.formula(), next.expression());
    let joined = format!("{}{}", prev, next);
    if tokenize(&joined).len() == 1 {
        joined
    } else {
        format!("{} {}", prev, next)
    }
}

/// A die or number if `text` is exactly one, else a string. Die notation
/// that does not parse is an error.
fn reclassify(text: &str) -> Result<RollTerm, FormulaErrorKind> {
    let tokens = tokenize(text);
    if let [token] = tokens.as_slice() {
        if token.span == (0..text.len()) {
            match token.kind {
                TokenKind::Dice => {
                    if let Some(die) = DieTerm::from_notation(token.slice)? {
                        return Ok(die.into());
                    }
                }
                TokenKind::Number => {
                    if let Some(number) = parse_number(token.slice) {
                        return Ok(NumericTerm::new(number).into());
                    }
                }
                _ => {}
            }
        }
    }
    Ok(StringTerm::new(text).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roll::dice::Denomination;

    fn parse(s: &str) -> Vec<RollTerm> {
        Parser::new(s).parse().unwrap()
    }

    fn parse_err(s: &str) -> FormulaErrorKind {
        Parser::new(s).parse().unwrap_err().kind
    }

    fn kinds(s: &str) -> Vec<TermKind> {
        parse(s).iter().map(RollTerm::kind).collect()
    }

    #[test]
    fn test_parse_simple() {
        use TermKind::*;
        assert_eq!(kinds("2d6 + 4"), vec![Die, Operator, Numeric]);
        assert_eq!(kinds("1d20 + @mod"), vec![Die, Operator, String]);
        assert!(kinds("").is_empty());
        assert_eq!(get_formula(&parse("2d6+4")), "2d6 + 4");
    }

    #[test]
    fn test_parse_unary() {
        let terms = parse("-2 * -(1d4)");
        assert_eq!(terms[0], RollTerm::from(NumericTerm::new(-2)));
        assert_eq!(terms[2], RollTerm::from(OperatorTerm::unary(UnaryOperator::Neg)));
        assert_eq!(terms.len(), 4);
        assert_eq!(parse_err("* 2"), FormulaErrorKind::MissingOperand);
        assert_eq!(parse_err("2 +"), FormulaErrorKind::MissingOperand);
    }

    #[test]
    fn test_parse_groups() {
        let terms = parse("(1d4)d6 + floor(7 / 2)");
        let die = terms[0].as_die().unwrap();
        assert!(matches!(die.number, DieCount::Intermediate(_)));
        assert_eq!(die.faces, Denomination::standard(6));
        assert!(matches!(&terms[2], RollTerm::Function(f) if f.function == MathFunction::Floor));
        assert_eq!(get_formula(&terms), "(1d4)d6 + floor(7 / 2)");

        assert_eq!(kinds("(2) * 3"), vec![TermKind::Parenthetical, TermKind::Operator, TermKind::Numeric]);
        assert_eq!(get_formula(&parse("max(1,2, 3)")), "max(1, 2, 3)");
    }

    #[test]
    fn test_parse_pool() {
        let terms = parse("{1d20, 1d20 + 2}kh");
        match &terms[0] {
            RollTerm::Pool(pool) => {
                assert_eq!(pool.terms.len(), 2);
                assert_eq!(pool.modifiers, vec![Modifier::Keep { highest: true, count: 1 }]);
            }
            other => panic!("expected pool, got {:?}", other),
        }
        assert_eq!(get_formula(&terms), "{1d20, 1d20 + 2}kh1");
        assert!(matches!(parse_err("{1d6, 2d6}r1"), FormulaErrorKind::InvalidModifier(_)));
        assert!(matches!(parse_err("{1d6, 2d6}cs"), FormulaErrorKind::InvalidModifier(_)));
        assert!(parse("{3d6, 2d8}cs>=4").len() == 1);
    }

    #[test]
    fn test_parse_flavor() {
        let terms = parse("1d8[slashing] + 2[fire][magic]");
        assert_eq!(terms[0].flavor(), Some("slashing"));
        assert_eq!(terms[2].flavor(), Some("fire magic"));
        assert_eq!(parse_err("[fire] 1d6"), FormulaErrorKind::DanglingFlavor);
        assert_eq!(parse_err("1d6 + [fire]"), FormulaErrorKind::DanglingFlavor);
        assert_eq!(parse_err("1d6[]"), FormulaErrorKind::EmptyFlavor);
    }

    #[test]
    fn test_parse_errors() {
        let err = Parser::new("2 * (1 + 3").parse().unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::Unbalanced('('));
        assert_eq!(err.span, 4..5);
        assert_eq!(parse_err("1 + 2)"), FormulaErrorKind::Unbalanced(')'));
        assert_eq!(parse_err("{1, 2"), FormulaErrorKind::Unbalanced('{'));
        assert_eq!(parse_err("2 & 3"), FormulaErrorKind::UnexpectedCharacter);
        assert_eq!(parse_err("2 3"), FormulaErrorKind::MissingOperator);
        assert!(matches!(parse_err("()"), FormulaErrorKind::UnexpectedToken { .. }));
        assert!(matches!(parse_err("1, 2"), FormulaErrorKind::UnexpectedToken { .. }));
        assert_eq!(parse_err("eval(1)"), FormulaErrorKind::UnknownFunction("eval".into()));
        assert!(matches!(
            parse_err("pow(2)"),
            FormulaErrorKind::FunctionArity { found: 1, .. }
        ));
        assert_eq!(parse_err("2d0"), FormulaErrorKind::InvalidDie);
        assert!(matches!(parse_err("2d6zz"), FormulaErrorKind::InvalidModifier(_)));
    }

    #[test]
    fn test_simplify_merges_strings() {
        // a word next to a group is not a call
        let terms = parse("foo (2)");
        assert_eq!(terms, vec![RollTerm::from(StringTerm::new("foo (2)"))]);

        let terms = simplify_terms(vec![
            NumericTerm::new(2).into(),
            StringTerm::new("d6").into(),
        ])
        .unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].kind(), TermKind::Die);
        assert_eq!(simplify_terms(terms.clone()).unwrap(), terms);

        let terms = simplify_terms(vec![
            StringTerm::new("foo").into(),
            ParentheticalTerm::new(vec![NumericTerm::new(2).into()]).into(),
        ])
        .unwrap();
        assert_eq!(terms, vec![RollTerm::from(StringTerm::new("foo (2)"))]);
    }

    #[test]
    fn test_simplify_rejects_bad_dice() {
        let err = simplify_terms(vec![NumericTerm::new(2).into(), StringTerm::new("d0").into()])
            .unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::InvalidDie);
        assert_eq!(err.slice, "2d0");
    }

    #[test]
    fn test_merged_strings_keep_source_text() {
        for formula in ["foo (2)", "F{1}.1", "D 1F", "D*D[<]0F", "-2 bar[x] (3)", "a[x] b c"] {
            let terms = parse(formula);
            let rebuilt = get_formula(&terms);
            assert_eq!(parse(&rebuilt), terms, "{} rebuilt as {}", formula, rebuilt);
        }
        assert_eq!(get_formula(&parse("D*D[<]0F")), "D * D[<]0F[<]");
    }

    #[test]
    fn test_get_formula_separates_words_from_groups() {
        let terms = vec![
            StringTerm::new("foo").into(),
            ParentheticalTerm::new(vec![NumericTerm::new(2).into()]).into(),
        ];
        assert_eq!(get_formula(&terms), "foo (2)");
    }

    #[test]
    fn test_check_terms() {
        assert!(check_terms(&parse("1d6 + (2 * 3)")).is_ok());
        let err = check_terms(&[NumericTerm::new(1).into(), NumericTerm::new(2).into()]).unwrap_err();
        assert_eq!(err.kind, FormulaErrorKind::MissingOperator);
        assert_eq!(err.slice, "2");
        let nested = ParentheticalTerm::new(vec![OperatorTerm::binary(BinaryOperator::Add).into()]);
        assert!(check_terms(&[nested.into()]).is_err());
    }
}
