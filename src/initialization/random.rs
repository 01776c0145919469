use std::{cell::RefCell, rc::Rc};

use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use super::{ParamGen, Result};

/// Fills tables with draws from `distribution`, at most `limit` entries in total.
///
/// The rng is shared, so the tables of a run are drawn from one seeded stream
/// in the order they are generated.
pub struct RandParamGen<R: Rng, D: Distribution<f32>> {
    rng: Rc<RefCell<R>>,
    distribution: D,
    remaining: usize,
}

impl<R: Rng, D: Distribution<f32>> RandParamGen<R, D> {
    pub fn new(rng: Rc<RefCell<R>>, distribution: D, limit: usize) -> Self {
        Self {
            rng,
            distribution,
            remaining: limit,
        }
    }
}

impl<R: Rng> RandParamGen<R, Uniform<f32>> {
    /// Draws from `[low, high)`.
    ///
    /// # Returns
    /// An error unless `low < high`.
    pub fn uniform(rng: Rc<RefCell<R>>, limit: usize, low: f32, high: f32) -> Result<Self> {
        Ok(Self::new(rng, Uniform::new(low, high)?, limit))
    }
}

impl<R: Rng> RandParamGen<R, Normal<f32>> {
    /// Draws from `N(mean, std_dev²)`.
    ///
    /// # Returns
    /// An error if `std_dev` is not finite.
    pub fn normal(rng: Rc<RefCell<R>>, limit: usize, mean: f32, std_dev: f32) -> Result<Self> {
        Ok(Self::new(rng, Normal::new(mean, std_dev)?, limit))
    }

    /// Embedding rows of width `dim`, drawn from `N(0, 1 / dim)` so a row has
    /// unit expected norm.
    pub fn embedding(rng: Rc<RefCell<R>>, limit: usize, dim: usize) -> Result<Self> {
        let std_dev = (1. / dim.max(1) as f32).sqrt();
        Self::normal(rng, limit, 0., std_dev)
    }
}

impl<R: Rng, D: Distribution<f32>> ParamGen for RandParamGen<R, D> {
    fn fill(&mut self, out: &mut [f32]) -> usize {
        let n = out.len().min(self.remaining);
        self.remaining -= n;

        let mut rng = self.rng.borrow_mut();
        for value in &mut out[..n] {
            *value = self.distribution.sample(&mut *rng);
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::initialization::RandErr;

    fn seeded_rng() -> Rc<RefCell<StdRng>> {
        Rc::new(RefCell::new(StdRng::seed_from_u64(42)))
    }

    #[test]
    fn stops_at_the_limit() {
        let mut param_gen = RandParamGen::normal(seeded_rng(), 10, 0., 1.).unwrap();
        let mut rows = [0.; 7];

        assert_eq!(param_gen.fill(&mut rows), 7);
        assert_eq!(param_gen.fill(&mut rows), 3);
        assert_eq!(param_gen.fill(&mut rows), 0);
    }

    #[test]
    fn uniform_respects_bounds() {
        let mut param_gen = RandParamGen::uniform(seeded_rng(), 100, -0.5, 0.5).unwrap();
        let mut table = [1.; 100];

        param_gen.fill(&mut table);
        assert!(table.iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn embedding_rows_have_unit_scale() {
        let dim = 64;
        let mut param_gen = RandParamGen::embedding(seeded_rng(), 1000 * dim, dim).unwrap();
        let mut table = vec![0.; 1000 * dim];
        param_gen.fill(&mut table);

        let mean_sq_norm = table
            .chunks(dim)
            .map(|row| row.iter().map(|v| v * v).sum::<f32>())
            .sum::<f32>()
            / 1000.;
        assert!((mean_sq_norm - 1.).abs() < 0.1, "{mean_sq_norm}");
    }

    #[test]
    fn shared_rng_yields_distinct_tables() {
        let rng = seeded_rng();
        let mut first = [0.; 16];
        let mut second = [0.; 16];

        RandParamGen::normal(rng.clone(), 16, 0., 1.).unwrap().fill(&mut first);
        RandParamGen::normal(rng, 16, 0., 1.).unwrap().fill(&mut second);
        assert_ne!(first, second);
    }

    #[test]
    fn invalid_distribution() {
        assert!(matches!(
            RandParamGen::normal(seeded_rng(), 10, 0., f32::NAN),
            Err(RandErr::Normal(_))
        ));
        assert!(matches!(
            RandParamGen::uniform(seeded_rng(), 10, 1., 1.),
            Err(RandErr::Uniform(_))
        ));
    }
}
