//! Decoding ARM and Thumb instructions.
//!
//! Only the families the translator handles are decoded. Anything
//! else decodes to None, and is left for the interpreter.

mod arm;
mod thumb;

pub use arm::decode_arm;
pub use thumb::decode_thumb;
