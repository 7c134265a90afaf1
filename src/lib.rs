//! Instructor tooling for the CLIP distant viewing workshop.
//!
//! - [`colab`]: turn local notebooks into Google Colab notebooks
//! - [`download`]: fetch collection images listed in a metadata catalog
//! - [`embeddings`]: precompute CLIP image embeddings into an `.npz` archive

pub mod cli;
pub mod clip;
pub mod colab;
pub mod config;
pub mod download;
pub mod embeddings;
pub mod logging;
