pub mod assemble;
pub mod compose;
pub mod context;
pub mod error;
pub mod outlet;
pub mod references;
pub mod step_forward_agent;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;
