use super::dice::DieTerm;
use super::tree::*;
use super::Roll;

pub trait VisitTerm {
    type Output;

    fn visit<A: AcceptTerm>(&mut self, a: &A) -> Self::Output {
        a.accept(self)
    }

    fn visit_roll(&mut self, x: &Roll) -> Self::Output;

    fn visit_die(&mut self, x: &DieTerm) -> Self::Output;

    fn visit_numeric(&mut self, x: &NumericTerm) -> Self::Output;

    fn visit_operator(&mut self, x: &OperatorTerm) -> Self::Output;

    fn visit_parenthetical(&mut self, x: &ParentheticalTerm) -> Self::Output;

    fn visit_pool(&mut self, x: &PoolTerm) -> Self::Output;

    fn visit_function(&mut self, x: &FunctionTerm) -> Self::Output;

    fn visit_string(&mut self, x: &StringTerm) -> Self::Output;
}

#[enum_dispatch::enum_dispatch]
pub trait AcceptTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output;
}

impl AcceptTerm for Roll {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_roll(self)
    }
}

impl AcceptTerm for DieTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_die(self)
    }
}

impl AcceptTerm for NumericTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_numeric(self)
    }
}

impl AcceptTerm for OperatorTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_operator(self)
    }
}

impl AcceptTerm for ParentheticalTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_parenthetical(self)
    }
}

impl AcceptTerm for PoolTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_pool(self)
    }
}

impl AcceptTerm for FunctionTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_function(self)
    }
}

impl AcceptTerm for StringTerm {
    fn accept<V: VisitTerm + ?Sized>(&self, v: &mut V) -> V::Output {
        v.visit_string(self)
    }
}
