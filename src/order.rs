/// Mapping between the external case and its internal form, which
/// holds only connected buses, in-service branches and in-service
/// generators, consecutively indexed.
#[derive(Clone, Debug, Default)]
pub struct Order {
    pub bus: IndexOrder,
    pub gen: IndexOrder,
    pub branch: IndexOrder,
}

#[derive(Clone, Debug, Default)]
pub struct IndexOrder {
    /// External index to internal index, `None` if the element is out.
    pub e2i: Vec<Option<usize>>,
    /// Internal index to external index.
    pub i2e: Vec<usize>,
}

impl IndexOrder {
    pub(crate) fn new(n: usize, on: impl Fn(usize) -> bool) -> Self {
        let mut e2i = vec![None; n];
        let mut i2e = Vec::with_capacity(n);
        for (i, e2i) in e2i.iter_mut().enumerate() {
            if on(i) {
                *e2i = Some(i2e.len());
                i2e.push(i);
            }
        }
        Self { e2i, i2e }
    }

    pub fn len(&self) -> usize {
        self.i2e.len()
    }

    pub fn is_empty(&self) -> bool {
        self.i2e.is_empty()
    }
}
