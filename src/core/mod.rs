pub mod builder;
pub mod errors;
pub mod event;
pub mod execution;
pub mod instance;
pub mod io;
pub mod model;
pub mod spatial;
pub mod types;
pub mod values;

#[cfg(test)]
mod tests;
