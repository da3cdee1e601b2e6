/// Exact floating-point sum kept as non-overlapping partials (Shewchuk).
///
/// [`ExactSum::value`] is the correctly rounded total of every value added,
/// so it is the same for any addition or merge order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExactSum {
    // Increasing magnitude, pairwise non-overlapping.
    partials: Vec<f64>,
}

impl ExactSum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `None` if `value` is not finite or the running total leaves
    /// the finite range.
    pub fn checked_add(&self, value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let mut partials = Vec::with_capacity(self.partials.len() + 1);
        let mut x = value;
        for &p in &self.partials {
            let (big, small) = if x.abs() < p.abs() { (p, x) } else { (x, p) };
            let hi = big + small;
            if !hi.is_finite() {
                return None;
            }
            let lo = small - (hi - big);
            if lo != 0.0 {
                partials.push(lo);
            }
            x = hi;
        }
        partials.push(x);
        Some(Self { partials })
    }

    pub fn checked_merge(&self, other: &ExactSum) -> Option<Self> {
        other
            .partials
            .iter()
            .try_fold(self.clone(), |acc, &p| acc.checked_add(p))
    }

    /// The total, rounded half-to-even once.
    pub fn value(&self) -> f64 {
        let p = &self.partials;
        let Some(mut n) = p.len().checked_sub(1) else {
            return 0.0;
        };
        let mut hi = p[n];
        let mut lo = 0.0;
        while n > 0 {
            let x = hi;
            n -= 1;
            let y = p[n];
            hi = x + y;
            lo = y - (hi - x);
            if lo != 0.0 {
                break;
            }
        }
        // The remaining partials may push a halfway `lo` over the rounding
        // boundary.
        if n > 0 && ((lo < 0.0 && p[n - 1] < 0.0) || (lo > 0.0 && p[n - 1] > 0.0)) {
            let y = lo * 2.0;
            let x = hi + y;
            if y == x - hi {
                hi = x;
            }
        }
        hi
    }
}
