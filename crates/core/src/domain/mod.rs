pub mod browse;
pub mod contract;
pub mod report;
