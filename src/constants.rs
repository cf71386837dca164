pub const DEFAULT_ITERATIONS_PER_FEATURE: usize = 1000;
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const KEY_DELIMITER: char = '_';
pub const FOI_INTACT: &str = "f";
pub const FOI_REPLACED: &str = "t";
pub const PROG_FRAC_SAMPLING_CREATION: f64 = 0.5;
pub const PROG_FRAC_PERTURB_ROWS: f64 = 0.5;
