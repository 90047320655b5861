// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Autodiff Tape
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Reverse-mode automatic differentiation over 2-D matrices.
//!
//! Every value is an `Array2<f64>` of shape (rows, cols); scalars are (1, 1).
//! Nodes are appended in creation order, so node indices are already a
//! topological order. Backward rules are themselves expressed as tape ops,
//! which makes gradients differentiable: the integrator differentiates the
//! Hamiltonian during the forward pass and training differentiates through it.

use ndarray::{s, Array2, Axis};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Process-unique identifier of a learnable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(usize);

impl ParamId {
    pub fn fresh() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        ParamId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum Op {
    Leaf,
    Add(usize, usize),
    Sub(usize, usize),
    Mul(usize, usize),
    Scale(usize, f64),
    AddScalar(usize, f64),
    MatMul(usize, usize),
    Transpose(usize),
    Tanh(usize),
    Sigmoid(usize),
    Exp(usize),
    Ln(usize),
    Recip(usize),
    /// (1, m) column sums of an (n, m) input.
    SumRows(usize),
    /// (1, m) input repeated to n rows.
    BroadcastRows(usize, usize),
    SumAll(usize),
    /// (1, 1) input repeated to the given shape.
    BroadcastScalar(usize, (usize, usize)),
    /// Columns `start..end` of the input.
    SliceCols(usize, usize, usize),
    /// Input placed at column `start` of a zero matrix `total` columns wide.
    PadCols(usize, usize, usize),
    ConcatCols(Vec<usize>),
}

impl Op {
    fn parents(&self) -> Vec<usize> {
        match self {
            Op::Leaf => Vec::new(),
            Op::Add(a, b) | Op::Sub(a, b) | Op::Mul(a, b) | Op::MatMul(a, b) => vec![*a, *b],
            Op::Scale(a, _)
            | Op::AddScalar(a, _)
            | Op::Transpose(a)
            | Op::Tanh(a)
            | Op::Sigmoid(a)
            | Op::Exp(a)
            | Op::Ln(a)
            | Op::Recip(a)
            | Op::SumRows(a)
            | Op::BroadcastRows(a, _)
            | Op::SumAll(a)
            | Op::BroadcastScalar(a, _)
            | Op::SliceCols(a, _, _)
            | Op::PadCols(a, _, _) => vec![*a],
            Op::ConcatCols(parts) => parts.clone(),
        }
    }
}

struct Node {
    value: Array2<f64>,
    op: Op,
}

/// Computation record for one forward (and backward) pass.
#[derive(Default)]
pub struct Tape {
    nodes: RefCell<Vec<Node>>,
    params: RefCell<HashMap<ParamId, usize>>,
}

/// Handle to a node on a [`Tape`].
#[derive(Clone, Copy)]
pub struct Var<'t> {
    tape: &'t Tape,
    index: usize,
}

impl fmt::Debug for Var<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("index", &self.index)
            .field("shape", &self.shape())
            .finish()
    }
}

fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

fn evaluate(nodes: &[Node], op: &Op) -> Array2<f64> {
    let v = |i: usize| &nodes[i].value;
    match op {
        Op::Leaf => unreachable!("leaves carry their own value"),
        Op::Add(a, b) => v(*a) + v(*b),
        Op::Sub(a, b) => v(*a) - v(*b),
        Op::Mul(a, b) => v(*a) * v(*b),
        Op::Scale(a, c) => v(*a) * *c,
        Op::AddScalar(a, c) => v(*a) + *c,
        Op::MatMul(a, b) => v(*a).dot(v(*b)),
        Op::Transpose(a) => v(*a).t().to_owned(),
        Op::Tanh(a) => v(*a).mapv(f64::tanh),
        Op::Sigmoid(a) => v(*a).mapv(sigmoid),
        Op::Exp(a) => v(*a).mapv(f64::exp),
        Op::Ln(a) => v(*a).mapv(f64::ln),
        Op::Recip(a) => v(*a).mapv(|x| 1.0 / x),
        Op::SumRows(a) => v(*a).sum_axis(Axis(0)).insert_axis(Axis(0)),
        Op::BroadcastRows(a, n) => {
            let row = v(*a);
            Array2::from_shape_fn((*n, row.ncols()), |(_, j)| row[[0, j]])
        }
        Op::SumAll(a) => Array2::from_elem((1, 1), v(*a).sum()),
        Op::BroadcastScalar(a, shape) => Array2::from_elem(*shape, v(*a)[[0, 0]]),
        Op::SliceCols(a, start, end) => v(*a).slice(s![.., *start..*end]).to_owned(),
        Op::PadCols(a, start, total) => {
            let x = v(*a);
            let mut out = Array2::zeros((x.nrows(), *total));
            out.slice_mut(s![.., *start..*start + x.ncols()]).assign(x);
            out
        }
        Op::ConcatCols(parts) => {
            let rows = v(parts[0]).nrows();
            let total: usize = parts.iter().map(|&p| v(p).ncols()).sum();
            let mut out = Array2::zeros((rows, total));
            let mut offset = 0;
            for &p in parts {
                let x = v(p);
                out.slice_mut(s![.., offset..offset + x.ncols()]).assign(x);
                offset += x.ncols();
            }
            out
        }
    }
}

impl Tape {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record an input matrix.
    pub fn leaf(&self, value: Array2<f64>) -> Var<'_> {
        self.push(value, Op::Leaf)
    }

    /// Record a (1, 1) constant.
    pub fn scalar(&self, value: f64) -> Var<'_> {
        self.leaf(Array2::from_elem((1, 1), value))
    }

    /// Bind a parameter to this tape. Repeated calls return the same node.
    pub fn param(&self, id: ParamId, value: &Array2<f64>) -> Var<'_> {
        if let Some(index) = self.params.borrow().get(&id).copied() {
            return Var { tape: self, index };
        }
        let var = self.leaf(value.clone());
        self.params.borrow_mut().insert(id, var.index);
        var
    }

    /// Node previously bound for a parameter, if any.
    pub fn bound_param(&self, id: ParamId) -> Option<Var<'_>> {
        self.params
            .borrow()
            .get(&id)
            .map(|&index| Var { tape: self, index })
    }

    /// Concatenate matrices with equal row counts along the column axis.
    pub fn concat_cols<'t>(&'t self, parts: &[Var<'t>]) -> Var<'t> {
        assert!(!parts.is_empty(), "concat_cols needs at least one input");
        let rows = parts[0].shape().0;
        for part in parts {
            assert_eq!(part.shape().0, rows, "concat_cols row mismatch");
        }
        self.record(Op::ConcatCols(parts.iter().map(|p| p.index).collect()))
    }

    fn push(&self, value: Array2<f64>, op: Op) -> Var<'_> {
        let mut nodes = self.nodes.borrow_mut();
        nodes.push(Node { value, op });
        Var {
            tape: self,
            index: nodes.len() - 1,
        }
    }

    fn record(&self, op: Op) -> Var<'_> {
        let value = evaluate(&self.nodes.borrow(), &op);
        self.push(value, op)
    }

    fn var(&self, index: usize) -> Var<'_> {
        Var { tape: self, index }
    }

    fn shape_of(&self, index: usize) -> (usize, usize) {
        self.nodes.borrow()[index].value.dim()
    }

    /// Gradients of the scalar `output` with respect to `wrt`, recorded as new
    /// tape nodes so that they can be differentiated again.
    ///
    /// Inputs that `output` does not depend on receive a zero matrix.
    pub fn grad<'t>(&'t self, output: Var<'t>, wrt: &[Var<'t>]) -> Vec<Var<'t>> {
        assert!(
            std::ptr::eq(output.tape, self),
            "grad output belongs to another tape"
        );
        assert_eq!(output.shape(), (1, 1), "grad requires a (1, 1) output");

        let n = output.index + 1;
        let floor = wrt.iter().map(|v| v.index).min().unwrap_or(n);

        // A node is relevant when it lies on a path from one of `wrt`.
        let mut relevant = vec![false; n];
        {
            let nodes = self.nodes.borrow();
            for v in wrt {
                if v.index < n {
                    relevant[v.index] = true;
                }
            }
            for i in floor..n {
                if !relevant[i] {
                    relevant[i] = nodes[i].op.parents().iter().any(|&p| relevant[p]);
                }
            }
        }

        let mut adjoints: Vec<Option<Var<'t>>> = vec![None; n];
        if relevant[output.index] {
            adjoints[output.index] = Some(self.scalar(1.0));
        }
        for i in (floor..n).rev() {
            if !relevant[i] {
                continue;
            }
            let Some(g) = adjoints[i] else {
                continue;
            };
            for (parent, contribution) in self.adjoint_contributions(i, g, &relevant) {
                adjoints[parent] = Some(match adjoints[parent] {
                    Some(acc) => acc + contribution,
                    None => contribution,
                });
            }
        }

        wrt.iter()
            .map(|v| {
                adjoints
                    .get(v.index)
                    .copied()
                    .flatten()
                    .unwrap_or_else(|| self.leaf(Array2::zeros(v.shape())))
            })
            .collect()
    }

    /// Value-only gradients.
    pub fn gradients<'t>(&'t self, output: Var<'t>, wrt: &[Var<'t>]) -> Vec<Array2<f64>> {
        self.grad(output, wrt)
            .into_iter()
            .map(|g| g.value())
            .collect()
    }

    fn adjoint_contributions<'t>(
        &'t self,
        index: usize,
        g: Var<'t>,
        relevant: &[bool],
    ) -> Vec<(usize, Var<'t>)> {
        let op = self.nodes.borrow()[index].op.clone();
        let y = self.var(index);
        let want = |i: usize| relevant[i];
        let mut out = Vec::with_capacity(2);

        match op {
            Op::Leaf => {}
            Op::Add(a, b) => {
                if want(a) {
                    out.push((a, g));
                }
                if want(b) {
                    out.push((b, g));
                }
            }
            Op::Sub(a, b) => {
                if want(a) {
                    out.push((a, g));
                }
                if want(b) {
                    out.push((b, -g));
                }
            }
            Op::Mul(a, b) => {
                if want(a) {
                    out.push((a, g * self.var(b)));
                }
                if want(b) {
                    out.push((b, g * self.var(a)));
                }
            }
            Op::Scale(a, c) => {
                if want(a) {
                    out.push((a, g.scale(c)));
                }
            }
            Op::AddScalar(a, _) => {
                if want(a) {
                    out.push((a, g));
                }
            }
            Op::MatMul(a, b) => {
                if want(a) {
                    out.push((a, g.matmul(self.var(b).t())));
                }
                if want(b) {
                    out.push((b, self.var(a).t().matmul(g)));
                }
            }
            Op::Transpose(a) => {
                if want(a) {
                    out.push((a, g.t()));
                }
            }
            Op::Tanh(a) => {
                if want(a) {
                    out.push((a, g * (-(y * y)).add_scalar(1.0)));
                }
            }
            Op::Sigmoid(a) => {
                if want(a) {
                    out.push((a, g * (y * (-y).add_scalar(1.0))));
                }
            }
            Op::Exp(a) => {
                if want(a) {
                    out.push((a, g * y));
                }
            }
            Op::Ln(a) => {
                if want(a) {
                    out.push((a, g * self.var(a).recip()));
                }
            }
            Op::Recip(a) => {
                if want(a) {
                    out.push((a, -(g * (y * y))));
                }
            }
            Op::SumRows(a) => {
                if want(a) {
                    let rows = self.shape_of(a).0;
                    out.push((a, g.broadcast_rows(rows)));
                }
            }
            Op::BroadcastRows(a, _) => {
                if want(a) {
                    out.push((a, g.sum_rows()));
                }
            }
            Op::SumAll(a) => {
                if want(a) {
                    out.push((a, g.broadcast_scalar(self.shape_of(a))));
                }
            }
            Op::BroadcastScalar(a, _) => {
                if want(a) {
                    out.push((a, g.sum_all()));
                }
            }
            Op::SliceCols(a, start, _) => {
                if want(a) {
                    let total = self.shape_of(a).1;
                    out.push((a, g.pad_cols(start, total)));
                }
            }
            Op::PadCols(a, start, _) => {
                if want(a) {
                    let width = self.shape_of(a).1;
                    out.push((a, g.slice_cols(start, start + width)));
                }
            }
            Op::ConcatCols(parts) => {
                let mut offset = 0;
                for p in parts {
                    let width = self.shape_of(p).1;
                    if want(p) {
                        out.push((p, g.slice_cols(offset, offset + width)));
                    }
                    offset += width;
                }
            }
        }
        out
    }
}

impl<'t> Var<'t> {
    pub fn tape(&self) -> &'t Tape {
        self.tape
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn value(&self) -> Array2<f64> {
        self.tape.nodes.borrow()[self.index].value.clone()
    }

    pub fn shape(&self) -> (usize, usize) {
        self.tape.shape_of(self.index)
    }

    /// Element (0, 0); meaningful for (1, 1) results such as losses.
    pub fn item(&self) -> f64 {
        self.tape.nodes.borrow()[self.index].value[[0, 0]]
    }

    /// Copy of the current value as a fresh leaf, cutting the gradient path.
    pub fn detach(&self) -> Var<'t> {
        self.tape.leaf(self.value())
    }

    fn same_tape(&self, other: &Var<'t>) {
        assert!(
            std::ptr::eq(self.tape, other.tape),
            "operands belong to different tapes"
        );
    }

    fn same_shape(&self, other: &Var<'t>, op: &str) {
        self.same_tape(other);
        let (a, b) = (self.shape(), other.shape());
        assert_eq!(a, b, "{op}: shape mismatch {a:?} vs {b:?}");
    }

    pub fn scale(self, c: f64) -> Var<'t> {
        self.tape.record(Op::Scale(self.index, c))
    }

    pub fn add_scalar(self, c: f64) -> Var<'t> {
        self.tape.record(Op::AddScalar(self.index, c))
    }

    pub fn matmul(self, other: Var<'t>) -> Var<'t> {
        self.same_tape(&other);
        let (a, b) = (self.shape(), other.shape());
        assert_eq!(a.1, b.0, "matmul: [{}x{}] @ [{}x{}]", a.0, a.1, b.0, b.1);
        self.tape.record(Op::MatMul(self.index, other.index))
    }

    pub fn t(self) -> Var<'t> {
        self.tape.record(Op::Transpose(self.index))
    }

    pub fn tanh(self) -> Var<'t> {
        self.tape.record(Op::Tanh(self.index))
    }

    pub fn sigmoid(self) -> Var<'t> {
        self.tape.record(Op::Sigmoid(self.index))
    }

    pub fn exp(self) -> Var<'t> {
        self.tape.record(Op::Exp(self.index))
    }

    pub fn ln(self) -> Var<'t> {
        self.tape.record(Op::Ln(self.index))
    }

    pub fn recip(self) -> Var<'t> {
        self.tape.record(Op::Recip(self.index))
    }

    pub fn square(self) -> Var<'t> {
        self * self
    }

    pub fn sum_rows(self) -> Var<'t> {
        self.tape.record(Op::SumRows(self.index))
    }

    pub fn broadcast_rows(self, rows: usize) -> Var<'t> {
        assert_eq!(self.shape().0, 1, "broadcast_rows expects a single row");
        self.tape.record(Op::BroadcastRows(self.index, rows))
    }

    /// Add a (1, cols) row vector to every row.
    pub fn add_row(self, row: Var<'t>) -> Var<'t> {
        let rows = self.shape().0;
        self + row.broadcast_rows(rows)
    }

    pub fn sum_all(self) -> Var<'t> {
        self.tape.record(Op::SumAll(self.index))
    }

    pub fn mean(self) -> Var<'t> {
        let (r, c) = self.shape();
        self.sum_all().scale(1.0 / (r * c).max(1) as f64)
    }

    pub fn broadcast_scalar(self, shape: (usize, usize)) -> Var<'t> {
        assert_eq!(self.shape(), (1, 1), "broadcast_scalar expects a (1, 1) input");
        self.tape.record(Op::BroadcastScalar(self.index, shape))
    }

    pub fn slice_cols(self, start: usize, end: usize) -> Var<'t> {
        let cols = self.shape().1;
        assert!(
            start <= end && end <= cols,
            "slice_cols: {start}..{end} out of 0..{cols}"
        );
        self.tape.record(Op::SliceCols(self.index, start, end))
    }

    pub fn pad_cols(self, start: usize, total: usize) -> Var<'t> {
        let cols = self.shape().1;
        assert!(
            start + cols <= total,
            "pad_cols: {cols} columns at {start} exceed {total}"
        );
        self.tape.record(Op::PadCols(self.index, start, total))
    }
}

impl<'t> std::ops::Add for Var<'t> {
    type Output = Var<'t>;

    fn add(self, rhs: Var<'t>) -> Var<'t> {
        self.same_shape(&rhs, "add");
        self.tape.record(Op::Add(self.index, rhs.index))
    }
}

impl<'t> std::ops::Sub for Var<'t> {
    type Output = Var<'t>;

    fn sub(self, rhs: Var<'t>) -> Var<'t> {
        self.same_shape(&rhs, "sub");
        self.tape.record(Op::Sub(self.index, rhs.index))
    }
}

impl<'t> std::ops::Mul for Var<'t> {
    type Output = Var<'t>;

    fn mul(self, rhs: Var<'t>) -> Var<'t> {
        self.same_shape(&rhs, "mul");
        self.tape.record(Op::Mul(self.index, rhs.index))
    }
}

impl<'t> std::ops::Neg for Var<'t> {
    type Output = Var<'t>;

    fn neg(self) -> Var<'t> {
        self.scale(-1.0)
    }
}
