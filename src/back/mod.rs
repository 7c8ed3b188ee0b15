//! Code-generation backends. Only the SPIR-V path is in scope for this
//! crate; see `spv`'s module docs for the full pipeline.

pub mod spv;
