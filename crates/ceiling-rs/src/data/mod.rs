//! Probe payloads: sized filler text, needle documents, and answer checks.

pub mod comprehension;
pub mod generator;

pub use comprehension::{ComprehensionChecker, ComprehensionVerdict};
pub use generator::{
    DEFAULT_NEEDLE_ANSWER, DEFAULT_NEEDLE_FACT, NeedleDocument, NeedlePosition, TestDataGenerator,
};
