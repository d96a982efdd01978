//! # sygnal-core
//!
//! Minimal tensor engine and module trait for sygnal.
//! CPU-only and forward-only: dense f32 kernels over flat row-major slices.

pub mod dtype;
pub mod device;
pub mod storage;
pub mod shape;
pub mod tensor;
pub mod error;
pub mod module;
pub mod ops;

pub use dtype::DType;
pub use device::Device;
pub use storage::Storage;
pub use shape::Shape;
pub use tensor::Tensor;
pub use error::SygnalError;
pub use module::Module;

pub type Result<T> = std::result::Result<T, SygnalError>;
