//! # revdoc
//!
//! Front end for version-aware document retrieval. The pipeline itself
//! lives in `revdoc_core`; this crate supplies what it leaves to the
//! application:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`intake`] | Files and directories → uploads |
//! | [`extract`] | DOCX/PPTX/XLSX/PDF/text loader |
//! | [`embedding`] | OpenAI, Ollama, hash, and local embedders |
//! | [`resolve`] | `revdoc resolve` |
//! | [`ask`] | `revdoc ask` and `revdoc chat` |

pub mod ask;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod intake;
pub mod logging;
pub mod resolve;
