use super::dice::{Denomination, DiceResult, DieTerm};
use super::tree::*;
use super::visit::{AcceptTerm, VisitTerm};
use super::{RResult, Roll, RollError};

fn with_flavor(s: String, flavor: Option<&str>) -> String {
    match flavor {
        Some(flavor) => format!("{}[{}]", s, flavor),
        None => s,
    }
}

pub trait Stringify {
    fn stringify<A: AcceptTerm>(&mut self, a: &A) -> RResult<String> {
        a.accept(self)
    }

    fn str_roll(&mut self, roll: &Roll) -> RResult<String> {
        let terms = self.str_terms(roll.terms())?;
        let total = roll.total().ok_or(RollError::NotEvaluated)?;
        Ok(format!("{} = {}", terms, total))
    }

    fn str_terms(&mut self, terms: &[RollTerm]) -> RResult<String> {
        terms.iter().map(|t| self.stringify(t)).collect()
    }

    fn str_die(&mut self, die: &DieTerm) -> RResult<String> {
        let head = with_flavor(die.expression(), die.flavor());
        if die.results.is_empty() {
            return Ok(head);
        }
        let results = die
            .results
            .iter()
            .map(|r| self.str_result(r, die.faces))
            .collect::<RResult<Vec<_>>>()?
            .join(", ");
        Ok(format!("{} ({})", head, results))
    }

    fn str_result(&mut self, result: &DiceResult, _faces: Denomination) -> RResult<String> {
        let mut ret = result.result.to_string();
        if result.exploded {
            ret.push('!');
        }
        Ok(ret)
    }

    fn str_numeric(&mut self, x: &NumericTerm) -> RResult<String> {
        Ok(x.formula())
    }

    fn str_operator(&mut self, x: &OperatorTerm) -> RResult<String> {
        Ok(x.expression())
    }

    fn str_parenthetical(&mut self, x: &ParentheticalTerm) -> RResult<String> {
        let inner = self.str_terms(&x.terms)?;
        Ok(with_flavor(format!("({})", inner), x.flavor()))
    }

    fn str_pool(&mut self, pool: &PoolTerm) -> RResult<String> {
        let members = pool
            .terms
            .iter()
            .enumerate()
            .map(|(i, member)| self.str_pool_member(member, pool.results.get(i)))
            .collect::<RResult<Vec<_>>>()?
            .join(", ");
        let modifiers: String = pool.modifiers.iter().map(ToString::to_string).collect();
        Ok(with_flavor(format!("{{{}}}{}", members, modifiers), pool.flavor()))
    }

    fn str_pool_member(&mut self, member: &[RollTerm], _result: Option<&DiceResult>) -> RResult<String> {
        self.str_terms(member)
    }

    fn str_function(&mut self, x: &FunctionTerm) -> RResult<String> {
        let args = x
            .args
            .iter()
            .map(|arg| self.str_terms(arg))
            .collect::<RResult<Vec<_>>>()?
            .join(", ");
        Ok(with_flavor(format!("{}({})", x.function, args), x.flavor()))
    }

    fn str_string(&mut self, x: &StringTerm) -> RResult<String> {
        Ok(x.formula())
    }
}

/// Plain text, e.g. `2d6 (3, 4) + 4 = 11`.
#[derive(Default)]
pub struct SimpleStringifier;

impl SimpleStringifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stringify<A: AcceptTerm>(&mut self, roll: &A) -> RResult<String> {
        Stringify::stringify(self, roll)
    }
}

impl Stringify for SimpleStringifier {}

/// Markdown with discarded results struck through and extreme faces in bold.
#[derive(Default)]
pub struct MarkdownStringifier {
    in_dropped: bool,
}

impl MarkdownStringifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn reset(&mut self) {
        self.in_dropped = false;
    }

    pub fn stringify<A: AcceptTerm>(&mut self, roll: &A) -> RResult<String> {
        self.reset();
        Stringify::stringify(self, roll)
    }

    fn strike(&self, s: String, active: bool) -> String {
        if !active && !self.in_dropped {
            format!("~~{}~~", s)
        } else {
            s
        }
    }
}

impl Stringify for MarkdownStringifier {
    fn str_roll(&mut self, roll: &Roll) -> RResult<String> {
        let terms = self.str_terms(roll.terms())?;
        let total = roll.total().ok_or(RollError::NotEvaluated)?;
        Ok(format!("{} = `{}`", terms, total))
    }

    fn str_result(&mut self, result: &DiceResult, faces: Denomination) -> RResult<String> {
        let value = result.result;
        let mut ret = value.to_string();
        if result.exploded {
            ret.push('!');
        }
        let extreme = matches!(faces, Denomination::Standard(_))
            && (value.as_int() == faces.min() || value.as_int() == faces.max());
        if extreme {
            ret = format!("**{}**", ret);
        }
        Ok(self.strike(ret, result.active))
    }

    fn str_pool_member(&mut self, member: &[RollTerm], result: Option<&DiceResult>) -> RResult<String> {
        let active = result.map_or(true, |r| r.active);
        if active || self.in_dropped {
            return self.str_terms(member);
        }
        self.in_dropped = true;
        let inside = self.str_terms(member);
        self.in_dropped = false;
        Ok(format!("~~{}~~", inside?))
    }
}

impl<S: ?Sized> VisitTerm for S
where
    S: Stringify,
{
    type Output = RResult<String>;

    fn visit_roll(&mut self, x: &Roll) -> Self::Output {
        self.str_roll(x)
    }

    fn visit_die(&mut self, x: &DieTerm) -> Self::Output {
        self.str_die(x)
    }

    fn visit_numeric(&mut self, x: &NumericTerm) -> Self::Output {
        self.str_numeric(x)
    }

    fn visit_operator(&mut self, x: &OperatorTerm) -> Self::Output {
        self.str_operator(x)
    }

    fn visit_parenthetical(&mut self, x: &ParentheticalTerm) -> Self::Output {
        self.str_parenthetical(x)
    }

    fn visit_pool(&mut self, x: &PoolTerm) -> Self::Output {
        self.str_pool(x)
    }

    fn visit_function(&mut self, x: &FunctionTerm) -> Self::Output {
        self.str_function(x)
    }

    fn visit_string(&mut self, x: &StringTerm) -> Self::Output {
        self.str_string(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NonZeroUInt;
    use crate::roll::roller::StepRoller;
    use crate::roll::{EvaluationOptions, RollContext};

    macro_rules! check {
        ($cls:ident, $input:expr, $expected:expr) => {
            let mut str = $cls::default();
            let mut roll = Roll::new($input, serde_json::json!({})).unwrap();
            let roller = StepRoller::new(NonZeroUInt::new(10).unwrap(), 1);
            roll.evaluate_sync_with(&mut RollContext::new_bounded(1000, roller), EvaluationOptions::default())
                .unwrap();
            let actual = $cls::stringify(&mut str, &roll).unwrap();
            assert_eq!(&actual, $expected);
        };
    }

    #[test]
    fn test_simple_stringify() {
        check!(SimpleStringifier, "2 + 3", "2 + 3 = 5");
        check!(SimpleStringifier, "2d20", "2d20 (10, 11) = 21");
        check!(SimpleStringifier, "2d20kh1", "2d20kh1 (10, 11) = 11");
        check!(SimpleStringifier, "1d8[fire] + 2", "1d8[fire] (2) + 2 = 4");
        check!(SimpleStringifier, "floor(1d20 / 3)", "floor(1d20 (10) / 3) = 3");
    }

    #[test]
    fn test_markdown_stringify() {
        check!(MarkdownStringifier, "2 + 3", "2 + 3 = `5`");
        check!(MarkdownStringifier, "2d20kh1", "2d20kh1 (~~10~~, 11) = `11`");
        check!(MarkdownStringifier, "3d6", "3d6 (4, 5, **6**) = `15`");
        check!(
            MarkdownStringifier,
            "{1d20, 1d20 + 5}kh1",
            "{~~1d20 (10)~~, 1d20 (11) + 5}kh1 = `16`"
        );
    }

    #[test]
    fn test_unevaluated_roll() {
        let roll = Roll::new("1d6", serde_json::json!({})).unwrap();
        assert!(matches!(
            SimpleStringifier::new().stringify(&roll),
            Err(RollError::NotEvaluated)
        ));
        assert_eq!(SimpleStringifier::new().stringify(&roll.terms()[0]).unwrap(), "1d6");
    }
}
