pub mod algebra;
pub mod app;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod graph;
pub mod memo;
pub mod orthology;
pub mod output;
pub mod records;
pub mod redundancy;
pub mod similarity;
pub mod store;
pub mod taxonomy;
