//! HLSL → SPIR-V shader code generator.
//!
//! The crate's input is a pre-typed [`ast::TranslationUnit`] handed down by
//! an external parser/type-checker (out of scope here); its output is a
//! SPIR-V word stream produced by [`back::spv::translate`].
#![allow(clippy::new_without_default)]
#![deny(clippy::panic)]

pub mod arena;
pub mod ast;
pub mod back;
pub mod diagnostic;

pub use crate::arena::{Arena, Handle};

use std::{collections::HashMap, collections::HashSet, hash::BuildHasherDefault};

/// Hash map that is faster but not resilient to DoS attacks.
pub type FastHashMap<K, T> = HashMap<K, T, BuildHasherDefault<fxhash::FxHasher>>;
/// Hash set that is faster but not resilient to DoS attacks.
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<fxhash::FxHasher>>;
