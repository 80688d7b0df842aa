pub mod engine;
pub mod playbook;
pub mod report;
pub mod result_aggregator;
