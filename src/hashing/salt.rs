use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

/// The `(a, b)` pair of the affine map applied before mixing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Salt {
    pub a: u32,
    pub b: u32,
}

impl Salt {
    /// Salts of the reference three-row sketch.
    pub const REFERENCE: [Salt; 3] = [
        Salt::new(994443, 609478),
        Salt::new(4113759, 2949676),
        Salt::new(9171025, 2171464),
    ];

    pub const fn new(a: u32, b: u32) -> Self {
        Self { a, b }
    }

    fn random<R: Rng>(rng: &mut R) -> Self {
        Self {
            a: rng.random::<u32>() | 1,
            b: rng.random(),
        }
    }
}

/// Where a structure draws its salts from at construction time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaltSource {
    /// The reference salts, then rows drawn from a generator seeded with `0`.
    #[default]
    Reference,
    /// Every row drawn from a generator seeded with the given value.
    Seeded(u64),
}

impl SaltSource {
    /// Produces one salt per row.
    ///
    /// # Arguments
    /// * `rows` - The amount of hash rows.
    ///
    /// # Returns
    /// The salts, identical for identical `(self, rows)`.
    pub fn salts(&self, rows: usize) -> Vec<Salt> {
        match *self {
            SaltSource::Reference => {
                let mut rng = StdRng::seed_from_u64(0);
                (0..rows)
                    .map(|row| match Salt::REFERENCE.get(row) {
                        Some(&salt) => salt,
                        None => Salt::random(&mut rng),
                    })
                    .collect()
            }
            SaltSource::Seeded(seed) => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..rows).map(|_| Salt::random(&mut rng)).collect()
            }
        }
    }
}
