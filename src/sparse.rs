use sparsetools::Scalar;
use sparsetools::coo::Coo;
use sparsetools::csr::CSR;

/// Iterates over the stored entries of a CSR matrix as `(row, col, value)`.
pub(crate) fn entries<T: Scalar>(m: &CSR<usize, T>) -> impl Iterator<Item = (usize, usize, T)> + '_ {
    let (rowptr, colidx, values) = (m.rowptr(), m.colidx(), m.values());
    (0..m.rows()).flat_map(move |i| (rowptr[i]..rowptr[i + 1]).map(move |k| (i, colidx[k], values[k])))
}

/// Iterates over the stored entries of row `i` as `(col, value)`.
pub(crate) fn row<T: Scalar>(m: &CSR<usize, T>, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
    let (rowptr, colidx, values) = (m.rowptr(), m.colidx(), m.values());
    (rowptr[i]..rowptr[i + 1]).map(move |k| (colidx[k], values[k]))
}

/// Adds the entries of `m`, offset by `(r0, c0)`, to `coo`.
pub(crate) fn push_block<T: Scalar>(coo: &mut Coo<usize, T>, m: &CSR<usize, T>, r0: usize, c0: usize) {
    for (i, j, v) in entries(m) {
        if !v.is_zero() {
            coo.push(r0 + i, c0 + j, v);
        }
    }
}

/// Adds the transpose of `m`, offset by `(r0, c0)`, to `coo`.
pub(crate) fn push_block_t<T: Scalar>(
    coo: &mut Coo<usize, T>,
    m: &CSR<usize, T>,
    r0: usize,
    c0: usize,
) {
    for (i, j, v) in entries(m) {
        if !v.is_zero() {
            coo.push(r0 + j, c0 + i, v);
        }
    }
}

/// `m' * x` for a real matrix.
pub(crate) fn mul_t(m: &CSR<usize, f64>, x: &[f64]) -> Vec<f64> {
    let mut y = vec![0.0; m.cols()];
    for (i, j, v) in entries(m) {
        y[j] += v * x[i];
    }
    y
}

/// Rows of `m` selected by `rows`, in that order.
pub(crate) fn select_rows<T: Scalar>(m: &CSR<usize, T>, rows: &[usize]) -> CSR<usize, T> {
    let mut s = Coo::with_size(rows.len(), m.cols());
    for (k, &i) in rows.iter().enumerate() {
        for (j, v) in row(m, i) {
            s.push(k, j, v);
        }
    }
    s.to_csr()
}

/// Stacks `a` on top of `b`. Both must have the same number of columns.
pub(crate) fn vstack<T: Scalar>(a: &CSR<usize, T>, b: &CSR<usize, T>) -> CSR<usize, T> {
    let mut s = Coo::with_size(a.rows() + b.rows(), a.cols().max(b.cols()));
    push_block(&mut s, a, 0, 0);
    push_block(&mut s, b, a.rows(), 0);
    s.to_csr()
}
