use crate::error::CaseError;
use crate::sparse::push_block;

use anyhow::Result;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;
use std::ops::Range;

/// Named set of optimization variables.
#[derive(Debug, Clone)]
pub struct VarBlock {
    pub name: String,
    /// Initial value.
    pub v0: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    offset: usize,
}

impl VarBlock {
    pub fn len(&self) -> usize {
        self.v0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.v0.is_empty()
    }

    /// Index of the first variable in the full optimization vector.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.len()
    }
}

/// Nonlinear constraint rows are either `h(x) = 0` or `g(x) <= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NonlinearKind {
    Equality,
    Inequality,
}

#[derive(Clone)]
pub enum Constraint {
    /// `l <= A * x[vars] <= u`, where the columns of `a` follow the
    /// listed variable blocks in order.
    Linear {
        a: CSR<usize, f64>,
        l: Vec<f64>,
        u: Vec<f64>,
        vars: Vec<String>,
    },
    /// Rows evaluated by a callback.
    Nonlinear { n: usize, kind: NonlinearKind },
}

// `CSR` does not implement `Debug`, so the matrix is shown by its shape.
impl std::fmt::Debug for Constraint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Constraint::Linear { a, l, u, vars } => f
                .debug_struct("Linear")
                .field("a", &format_args!("CSR({}x{}, nnz={})", a.rows(), a.cols(), a.nnz()))
                .field("l", l)
                .field("u", u)
                .field("vars", vars)
                .finish(),
            Constraint::Nonlinear { n, kind } => f
                .debug_struct("Nonlinear")
                .field("n", n)
                .field("kind", kind)
                .finish(),
        }
    }
}

impl Constraint {
    pub fn rows(&self) -> usize {
        match self {
            Constraint::Linear { l, .. } => l.len(),
            Constraint::Nonlinear { n, .. } => *n,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstraintBlock {
    pub name: String,
    pub constraint: Constraint,
    offset: usize,
}

impl ConstraintBlock {
    /// Index of the first row among constraints of the same kind.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.constraint.rows()
    }
}

/// Variables and constraints of an optimal power flow problem.
///
/// Blocks are appended in order and each is assigned an offset equal to
/// the total size of the blocks of the same kind added before it.
#[derive(Debug, Clone, Default)]
pub struct OpfModel {
    vars: Vec<VarBlock>,
    constraints: Vec<ConstraintBlock>,
    nx: usize,
    n_lin: usize,
    n_eq: usize,
    n_ineq: usize,
}

impl OpfModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_name(kind: &'static str, exists: bool, name: &str) -> Result<(), CaseError> {
        if exists {
            let err = CaseError::DuplicateName {
                kind,
                name: name.to_string(),
            };
            log::error!("{}", err);
            return Err(err);
        }
        Ok(())
    }

    /// Adds a block of variables. Infinite bounds mean unbounded.
    pub fn add_var(
        &mut self,
        name: &str,
        v0: Vec<f64>,
        lower: Vec<f64>,
        upper: Vec<f64>,
    ) -> Result<(), CaseError> {
        Self::check_name("variable", self.has_var(name), name)?;
        check_len(&format!("{} lower", name), v0.len(), lower.len())?;
        check_len(&format!("{} upper", name), v0.len(), upper.len())?;

        log::trace!("var {}: {} at {}", name, v0.len(), self.nx);
        let offset = self.nx;
        self.nx += v0.len();
        self.vars.push(VarBlock {
            name: name.to_string(),
            v0,
            lower,
            upper,
            offset,
        });
        Ok(())
    }

    /// Adds a block of constraints. The variable blocks referenced by a
    /// linear constraint must already exist.
    pub fn add_constraint(&mut self, name: &str, constraint: Constraint) -> Result<(), CaseError> {
        Self::check_name("constraint", self.constraint(name).is_some(), name)?;

        let offset = match &constraint {
            Constraint::Linear { a, l, u, vars } => {
                let n = l.len();
                check_len(&format!("{} rows", name), n, a.rows())?;
                check_len(&format!("{} upper", name), n, u.len())?;
                let mut nv = 0;
                for v in vars {
                    nv += self.var(v)?.len();
                }
                check_len(&format!("{} columns", name), nv, a.cols())?;

                let offset = self.n_lin;
                self.n_lin += n;
                offset
            }
            Constraint::Nonlinear { n, kind } => match kind {
                NonlinearKind::Equality => {
                    let offset = self.n_eq;
                    self.n_eq += n;
                    offset
                }
                NonlinearKind::Inequality => {
                    let offset = self.n_ineq;
                    self.n_ineq += n;
                    offset
                }
            },
        };
        log::trace!("constraint {}: {} at {}", name, constraint.rows(), offset);

        self.constraints.push(ConstraintBlock {
            name: name.to_string(),
            constraint,
            offset,
        });
        Ok(())
    }

    pub fn var(&self, name: &str) -> Result<&VarBlock, CaseError> {
        self.vars
            .iter()
            .find(|v| v.name == name)
            .ok_or_else(|| CaseError::UnknownVariable(name.to_string()))
    }

    pub fn has_var(&self, name: &str) -> bool {
        self.vars.iter().any(|v| v.name == name)
    }

    pub fn constraint(&self, name: &str) -> Option<&ConstraintBlock> {
        self.constraints.iter().find(|c| c.name == name)
    }

    /// Slice of `x` belonging to the named variable block.
    pub fn values<'a>(&self, name: &str, x: &'a [f64]) -> Result<&'a [f64], CaseError> {
        let v = self.var(name)?;
        Ok(&x[v.range()])
    }

    /// Slice of `values`, indexed like the rows of the named constraint
    /// block's kind, belonging to that block. Empty if there is no such
    /// block.
    pub fn rows<'a>(&self, name: &str, values: &'a [f64]) -> &'a [f64] {
        match self.constraint(name) {
            Some(c) => &values[c.range()],
            None => &[],
        }
    }

    /// Total number of variables.
    pub fn nx(&self) -> usize {
        self.nx
    }

    /// Number of linear constraint rows.
    pub fn n_lin(&self) -> usize {
        self.n_lin
    }

    /// Number of nonlinear equality rows.
    pub fn n_eq(&self) -> usize {
        self.n_eq
    }

    /// Number of nonlinear inequality rows.
    pub fn n_ineq(&self) -> usize {
        self.n_ineq
    }

    /// Initial values and bounds of the full optimization vector.
    pub fn params_var(&self) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let mut v0 = Vec::with_capacity(self.nx);
        let mut lower = Vec::with_capacity(self.nx);
        let mut upper = Vec::with_capacity(self.nx);
        for v in &self.vars {
            v0.extend_from_slice(&v.v0);
            lower.extend_from_slice(&v.lower);
            upper.extend_from_slice(&v.upper);
        }
        (v0, lower, upper)
    }

    /// Assembles all linear constraints into `l <= A * x <= u`.
    pub fn linear_constraints(&self) -> Result<(CSR<usize, f64>, Vec<f64>, Vec<f64>), CaseError> {
        let mut a_mat = Coo::with_size(self.n_lin, self.nx);
        let mut l = Vec::with_capacity(self.n_lin);
        let mut u = Vec::with_capacity(self.n_lin);

        for c in &self.constraints {
            if let Constraint::Linear {
                a,
                l: lc,
                u: uc,
                vars,
            } = &c.constraint
            {
                // place each column group at its variable block offset
                let mut col = 0;
                for name in vars {
                    let v = self.var(name)?;
                    for i in 0..a.rows() {
                        for k in a.rowptr()[i]..a.rowptr()[i + 1] {
                            let j = a.colidx()[k];
                            if j >= col && j < col + v.len() {
                                a_mat.push(c.offset + i, v.offset + j - col, a.values()[k]);
                            }
                        }
                    }
                    col += v.len();
                }
                l.extend_from_slice(lc);
                u.extend_from_slice(uc);
            }
        }
        Ok((a_mat.to_csr(), l, u))
    }
}

fn check_len(name: &str, expected: usize, actual: usize) -> Result<(), CaseError> {
    if expected != actual {
        let err = CaseError::DimensionMismatch {
            name: name.to_string(),
            expected,
            actual,
        };
        log::error!("{}", err);
        return Err(err);
    }
    Ok(())
}

/// Builds a CSR matrix from `(row, col, value)` triplets.
pub(crate) fn from_triplets(
    rows: usize,
    cols: usize,
    triplets: impl IntoIterator<Item = (usize, usize, f64)>,
) -> CSR<usize, f64> {
    let mut m = Coo::with_size(rows, cols);
    for (i, j, v) in triplets {
        m.push(i, j, v);
    }
    m.to_csr()
}

/// Horizontally concatenates matrices with the same number of rows.
pub(crate) fn hstack(blocks: &[&CSR<usize, f64>]) -> CSR<usize, f64> {
    let rows = blocks.first().map(|b| b.rows()).unwrap_or_default();
    let cols = blocks.iter().map(|b| b.cols()).sum();
    let mut m = Coo::with_size(rows, cols);
    let mut c0 = 0;
    for b in blocks {
        push_block(&mut m, b, 0, c0);
        c0 += b.cols();
    }
    m.to_csr()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    const INF: f64 = f64::INFINITY;

    fn model() -> Result<OpfModel> {
        let mut om = OpfModel::new();
        om.add_var("Va", vec![0.0; 3], vec![-INF; 3], vec![INF; 3])?;
        om.add_var("Pg", vec![0.5; 2], vec![0.0; 2], vec![1.0; 2])?;
        Ok(om)
    }

    #[test]
    fn offsets() -> Result<()> {
        let mut om = model()?;
        assert_eq!(om.nx(), 5);
        assert_eq!(om.var("Pg")?.offset(), 3);
        assert_eq!(om.var("Pg")?.range(), 3..5);

        let a = from_triplets(1, 2, [(0, 0, 1.0), (0, 1, 1.0)]);
        om.add_constraint(
            "sum",
            Constraint::Linear {
                a,
                l: vec![1.0],
                u: vec![1.0],
                vars: vec!["Pg".into()],
            },
        )?;
        om.add_constraint(
            "mis",
            Constraint::Nonlinear {
                n: 3,
                kind: NonlinearKind::Equality,
            },
        )?;
        om.add_constraint(
            "flow",
            Constraint::Nonlinear {
                n: 2,
                kind: NonlinearKind::Inequality,
            },
        )?;
        om.add_constraint(
            "mis2",
            Constraint::Nonlinear {
                n: 3,
                kind: NonlinearKind::Equality,
            },
        )?;
        assert_eq!(om.n_lin(), 1);
        assert_eq!(om.n_eq(), 6);
        assert_eq!(om.n_ineq(), 2);
        assert_eq!(om.constraint("mis2").map(|c| c.offset()), Some(3));
        assert_eq!(om.constraint("flow").map(|c| c.offset()), Some(0));

        let (v0, lower, upper) = om.params_var();
        assert_eq!(v0, vec![0.0, 0.0, 0.0, 0.5, 0.5]);
        assert_eq!(lower[3..], [0.0, 0.0]);
        assert_eq!(upper[..3], [INF; 3]);
        Ok(())
    }

    #[test]
    fn linear_constraints_placed_by_block() -> Result<()> {
        let mut om = model()?;
        om.add_var("y", vec![0.0], vec![-INF], vec![INF])?;

        // rows on [Pg, y] then a row on [Va]
        let a1 = from_triplets(1, 3, [(0, 0, 2.0), (0, 1, 3.0), (0, 2, -1.0)]);
        om.add_constraint(
            "ycon",
            Constraint::Linear {
                a: a1,
                l: vec![-INF],
                u: vec![4.0],
                vars: vec!["Pg".into(), "y".into()],
            },
        )?;
        let a2 = from_triplets(2, 3, [(0, 0, 1.0), (0, 1, -1.0), (1, 2, 5.0)]);
        om.add_constraint(
            "ang",
            Constraint::Linear {
                a: a2,
                l: vec![-1.0, -2.0],
                u: vec![1.0, 2.0],
                vars: vec!["Va".into()],
            },
        )?;

        let (a, l, u) = om.linear_constraints()?;
        assert_eq!((a.rows(), a.cols()), (3, 6));
        let x = [1.0, 2.0, 3.0, 10.0, 20.0, 100.0];
        let ax: Vec<f64> = &a * &x[..];
        assert_eq!(ax, vec![2.0 * 10.0 + 3.0 * 20.0 - 100.0, 1.0 - 2.0, 15.0]);
        assert_eq!(l, vec![-INF, -1.0, -2.0]);
        assert_eq!(u, vec![4.0, 1.0, 2.0]);

        assert_eq!(om.rows("ang", &[7.0, 8.0, 9.0]), &[8.0, 9.0]);
        assert_eq!(om.values("y", &x)?, &[100.0]);
        Ok(())
    }

    #[test]
    fn empty_block() -> Result<()> {
        let mut om = model()?;
        om.add_constraint(
            "ang",
            Constraint::Linear {
                a: CSR::with_size(0, 3),
                l: vec![],
                u: vec![],
                vars: vec!["Va".into()],
            },
        )?;
        let (a, l, _) = om.linear_constraints()?;
        assert_eq!(a.rows(), 0);
        assert!(l.is_empty());
        Ok(())
    }

    #[test]
    fn duplicate_name() -> Result<()> {
        let mut om = model()?;
        let err = om
            .add_var("Pg", vec![0.0], vec![0.0], vec![1.0])
            .unwrap_err();
        assert_eq!(
            err,
            CaseError::DuplicateName {
                kind: "variable",
                name: "Pg".into()
            }
        );
        assert_eq!(om.nx(), 5);

        let c = || Constraint::Nonlinear {
            n: 1,
            kind: NonlinearKind::Equality,
        };
        om.add_constraint("mis", c())?;
        assert!(matches!(
            om.add_constraint("mis", c()),
            Err(CaseError::DuplicateName { .. })
        ));
        Ok(())
    }

    #[test]
    fn unknown_variable_and_dimensions() -> Result<()> {
        let mut om = model()?;
        let result = om.add_constraint(
            "bad",
            Constraint::Linear {
                a: CSR::with_size(1, 2),
                l: vec![0.0],
                u: vec![0.0],
                vars: vec!["Qg".into()],
            },
        );
        assert_eq!(result.unwrap_err(), CaseError::UnknownVariable("Qg".into()));

        let result = om.add_constraint(
            "bad",
            Constraint::Linear {
                a: CSR::with_size(1, 2),
                l: vec![0.0],
                u: vec![0.0],
                vars: vec!["Va".into()],
            },
        );
        assert!(matches!(result, Err(CaseError::DimensionMismatch { .. })));

        let result = om.add_var("Qg", vec![0.0; 2], vec![0.0], vec![1.0; 2]);
        assert!(matches!(result, Err(CaseError::DimensionMismatch { .. })));
        Ok(())
    }
}
