//! Symbolic estimand expressions
//!
//! An identified causal effect is a closed expression over observed-variable
//! distributions; no do-operator remains. The expression is a small tree:
//!
//! - [`Expr::Probability`]: conditional probability leaf `P(y | t, z)`
//! - [`Expr::Expectation`]: conditional expectation leaf `E[y | t, z]`
//! - [`Expr::Marginal`]: sum over bound variables `Σ_{z} ...`
//! - [`Expr::Product`]: product of factors
//! - [`Expr::Quotient`]: ratio of expressions, needed when the general
//!   identification algorithm conditions a compound distribution
//!
//! The same tree serves programmatic consumers (the estimation layer walks
//! it) and human readers (the `Display` impl renders `Σ_{u} P(y|t,u)·P(u)`).

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A node in the symbolic estimand expression tree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    /// Conditional probability `P(target | given)`
    Probability { target: Vec<String>, given: Vec<String> },
    /// Conditional expectation `E[target | given]`
    Expectation { target: Vec<String>, given: Vec<String> },
    /// Sum over the bound variables `over`
    Marginal { over: Vec<String>, inner: Box<Expr> },
    /// Product of factors
    Product(Vec<Expr>),
    /// Ratio of two expressions
    Quotient { numerator: Box<Expr>, denominator: Box<Expr> },
}

impl Expr {
    /// Probability leaf with sorted argument lists.
    pub fn probability(
        target: impl IntoIterator<Item = String>,
        given: impl IntoIterator<Item = String>,
    ) -> Expr {
        Expr::Probability {
            target: sorted(target),
            given: sorted(given),
        }
    }

    /// Expectation leaf with sorted argument lists.
    pub fn expectation(
        target: impl IntoIterator<Item = String>,
        given: impl IntoIterator<Item = String>,
    ) -> Expr {
        Expr::Expectation {
            target: sorted(target),
            given: sorted(given),
        }
    }

    /// Marginal over `over`; collapses to `inner` when nothing is bound
    /// and merges directly nested marginals.
    pub fn marginal(over: impl IntoIterator<Item = String>, inner: Expr) -> Expr {
        let mut over: BTreeSet<String> = over.into_iter().collect();
        if over.is_empty() {
            return inner;
        }
        let inner = match inner {
            Expr::Marginal {
                over: nested,
                inner,
            } => {
                over.extend(nested);
                *inner
            }
            other => other,
        };
        Expr::Marginal {
            over: over.into_iter().collect(),
            inner: Box::new(inner),
        }
    }

    /// Product of factors; collapses singleton products.
    pub fn product(factors: Vec<Expr>) -> Expr {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Expr::Product(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        if flat.len() == 1 {
            flat.into_iter().next().expect("singleton product")
        } else {
            Expr::Product(flat)
        }
    }

    /// Ratio of two expressions.
    pub fn quotient(numerator: Expr, denominator: Expr) -> Expr {
        Expr::Quotient {
            numerator: Box::new(numerator),
            denominator: Box::new(denominator),
        }
    }

    /// Variables this expression conditions on, excluding variables bound
    /// by an enclosing or internal marginal.
    pub fn free_conditioning(&self) -> BTreeSet<String> {
        let mut given = BTreeSet::new();
        let mut bound = BTreeSet::new();
        self.collect(&mut given, &mut bound);
        given.difference(&bound).cloned().collect()
    }

    fn collect(&self, given: &mut BTreeSet<String>, bound: &mut BTreeSet<String>) {
        match self {
            Expr::Probability { given: g, .. } | Expr::Expectation { given: g, .. } => {
                given.extend(g.iter().cloned());
            }
            Expr::Marginal { over, inner } => {
                bound.extend(over.iter().cloned());
                inner.collect(given, bound);
            }
            Expr::Product(factors) => {
                for factor in factors {
                    factor.collect(given, bound);
                }
            }
            Expr::Quotient {
                numerator,
                denominator,
            } => {
                numerator.collect(given, bound);
                denominator.collect(given, bound);
            }
        }
    }

    /// Rewrite probability leaves over `outcome` variables into
    /// expectation leaves, the form regression-style estimators consume.
    pub fn expectation_form(&self, outcome: &BTreeSet<String>) -> Expr {
        match self {
            Expr::Probability { target, given }
                if target.iter().all(|t| outcome.contains(t)) =>
            {
                Expr::Expectation {
                    target: target.clone(),
                    given: given.clone(),
                }
            }
            Expr::Probability { .. } | Expr::Expectation { .. } => self.clone(),
            Expr::Marginal { over, inner } => Expr::Marginal {
                over: over.clone(),
                inner: Box::new(inner.expectation_form(outcome)),
            },
            Expr::Product(factors) => Expr::Product(
                factors
                    .iter()
                    .map(|f| f.expectation_form(outcome))
                    .collect(),
            ),
            Expr::Quotient {
                numerator,
                denominator,
            } => Expr::Quotient {
                numerator: Box::new(numerator.expectation_form(outcome)),
                denominator: Box::new(denominator.expectation_form(outcome)),
            },
        }
    }

    fn is_atomic(&self) -> bool {
        matches!(self, Expr::Probability { .. } | Expr::Expectation { .. })
    }

    fn fmt_operand(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_atomic() {
            write!(f, "{}", self)
        } else {
            write!(f, "({})", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Probability { target, given } => {
                if given.is_empty() {
                    write!(f, "P({})", target.join(","))
                } else {
                    write!(f, "P({}|{})", target.join(","), given.join(","))
                }
            }
            Expr::Expectation { target, given } => {
                if given.is_empty() {
                    write!(f, "E[{}]", target.join(","))
                } else {
                    write!(f, "E[{}|{}]", target.join(","), given.join(","))
                }
            }
            Expr::Marginal { over, inner } => {
                write!(f, "Σ_{{{}}} {}", over.join(","), inner)
            }
            Expr::Product(factors) => {
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "·")?;
                    }
                    factor.fmt_operand(f)?;
                }
                Ok(())
            }
            Expr::Quotient {
                numerator,
                denominator,
            } => {
                numerator.fmt_operand(f)?;
                write!(f, " / ")?;
                denominator.fmt_operand(f)
            }
        }
    }
}

/// A fully identified estimand: the expression plus the set of observed
/// variables it conditions on. Immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Estimand {
    /// Symbolic expression over observed-variable distributions
    pub expression: Expr,
    /// Free conditioning variables of the expression
    pub conditioning: BTreeSet<String>,
}

impl Estimand {
    /// Wrap an expression, deriving its conditioning set.
    pub fn new(expression: Expr) -> Self {
        let conditioning = expression.free_conditioning();
        Estimand {
            expression,
            conditioning,
        }
    }

    /// Human-readable rendering of the expression.
    pub fn render(&self) -> String {
        self.expression.to_string()
    }

    /// Estimand with outcome probabilities rewritten as expectations.
    pub fn expectation_form(&self, outcome: &BTreeSet<String>) -> Estimand {
        Estimand::new(self.expression.expectation_form(outcome))
    }
}

impl fmt::Display for Estimand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

fn sorted(vars: impl IntoIterator<Item = String>) -> Vec<String> {
    let set: BTreeSet<String> = vars.into_iter().collect();
    set.into_iter().collect()
}
