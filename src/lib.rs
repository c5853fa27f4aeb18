pub mod aggregate;
pub mod app;
pub mod archive;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod normalize;
pub mod ontology;
pub mod output;
pub mod package;
pub mod samples;
