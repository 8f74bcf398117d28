//! Knowledge base lookup.
//!
//! A deterministic keyword-overlap matcher that answers FAQ-shaped questions
//! without calling the model. It is a coarse heuristic, not semantic
//! understanding: expect both false positives and false negatives.

pub mod matcher;
