mod generator;
mod mutex;
#[cfg(test)]
mod tests;

pub use generator::*;
pub use mutex::*;
