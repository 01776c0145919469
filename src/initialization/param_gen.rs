/// Produces the initial values of a parameter table, row-major.
pub trait ParamGen {
    /// Writes the next values of the table into `out`.
    ///
    /// # Arguments
    /// * `out` - The entries to initialize.
    ///
    /// # Returns
    /// How many entries were written, less than `out.len()` once the
    /// generator runs dry.
    fn fill(&mut self, out: &mut [f32]) -> usize;
}
