//! Runtime value types shared by the model, the trace and the draw engine.

pub mod array;

pub use array::{Array, broadcast_shapes};
