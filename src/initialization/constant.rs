use super::ParamGen;

/// Fills tables with one repeated value, at most `limit` entries in total.
#[derive(Debug, Clone, Copy)]
pub struct ConstParamGen {
    value: f32,
    remaining: usize,
}

impl ConstParamGen {
    pub fn new(value: f32, limit: usize) -> Self {
        Self {
            value,
            remaining: limit,
        }
    }
}

impl ParamGen for ConstParamGen {
    fn fill(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.remaining);
        out[..n].fill(self.value);
        self.remaining -= n;
        n
    }
}
