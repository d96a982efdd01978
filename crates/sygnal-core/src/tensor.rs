use std::fmt;

use smallvec::SmallVec;

use crate::device::Device;
use crate::dtype::DType;
use crate::error::SygnalError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A multi-dimensional array, the exchange type at the public boundary.
///
/// CPU-only, no autograd. Models keep parameters as raw `Vec<f32>` and wrap
/// inputs/outputs in tensors. Transpose is a zero-copy view.
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 4]>,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor from f32 data with the given shape.
    ///
    /// Panics if `data.len()` does not match the shape; see [`Tensor::from_vec`]
    /// for the fallible variant.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "Shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        Self::from_storage(Storage::from_f32(data), s)
    }

    /// Take ownership of `data` as a tensor of the given shape.
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != data.len() {
            return Err(SygnalError::ElementCount {
                expected: s.numel(),
                got: data.len(),
                shape: shape.to_vec(),
            });
        }
        Ok(Self::from_storage(Storage::from_f32_vec(data), s))
    }

    /// Create an i64 tensor (token indices, lengths).
    pub fn from_i64(data: &[i64], shape: &[usize]) -> Result<Self> {
        let s = Shape::new(shape);
        if s.numel() != data.len() {
            return Err(SygnalError::ElementCount {
                expected: s.numel(),
                got: data.len(),
                shape: shape.to_vec(),
            });
        }
        Ok(Self::from_storage(Storage::from_i64(data), s))
    }

    /// Rebuild a contiguous tensor from native-endian bytes.
    pub fn from_bytes(dtype: DType, shape: &[usize], bytes: &[u8]) -> Result<Self> {
        let s = Shape::new(shape);
        let storage = Storage::from_bytes(dtype, s.numel(), bytes)?;
        Ok(Self::from_storage(storage, s))
    }

    fn from_storage(storage: Storage, shape: Shape) -> Self {
        let strides = shape.contiguous_strides();
        Self {
            storage,
            shape,
            strides,
            offset: 0,
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dims(&self) -> &[usize] {
        self.shape.dims()
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    pub fn device(&self) -> Device {
        self.storage.device()
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Whether this tensor is contiguous in memory (row-major).
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides() && self.offset == 0
    }

    // =========================================================================
    // Data access
    // =========================================================================

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_f32_slice()
    }

    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_i64_slice()
    }

    /// Native-endian bytes of a contiguous tensor.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.is_contiguous().then(|| self.storage.as_bytes())
    }

    /// Contiguous f32 data or an error naming the offending dtype.
    pub fn f32_data(&self) -> Result<&[f32]> {
        if self.dtype() != DType::F32 {
            return Err(SygnalError::DTypeMismatch {
                expected: DType::F32,
                got: self.dtype(),
            });
        }
        self.as_f32_slice().ok_or_else(|| {
            SygnalError::StorageError("tensor is not contiguous (call .contiguous() first)".into())
        })
    }

    /// Copy the logical (row-major) f32 contents out.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let c = self.contiguous()?;
        c.f32_data().map(<[f32]>::to_vec)
    }

    pub fn get_f32(&self, flat_index: usize) -> Option<f32> {
        let slice = self.storage.as_f32_slice()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if flat_index >= self.numel() {
            return None;
        }
        let mut remaining = flat_index;
        let mut physical = self.offset;
        for (i, &cs) in self.shape.contiguous_strides().iter().enumerate() {
            physical += (remaining / cs) * self.strides[i];
            remaining %= cs;
        }
        Some(physical)
    }

    // =========================================================================
    // Views
    // =========================================================================

    pub fn transpose(&self) -> Result<Tensor> {
        let new_shape = self.shape.transpose().ok_or(SygnalError::InvalidAxis {
            axis: 1,
            ndim: self.ndim(),
        })?;
        let ndim = self.ndim();
        let mut new_strides = self.strides.clone();
        new_strides.swap(ndim - 2, ndim - 1);
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            strides: new_strides,
            offset: self.offset,
        })
    }

    /// Return a contiguous copy of this tensor if it isn't already contiguous.
    pub fn contiguous(&self) -> Result<Tensor> {
        if self.is_contiguous() {
            return Ok(self.clone());
        }
        if self.dtype() != DType::F32 {
            return Err(SygnalError::UnsupportedDType(self.dtype()));
        }
        let data = (0..self.numel())
            .map(|i| {
                self.get_f32(i).ok_or_else(|| {
                    SygnalError::StorageError(format!("view index {i} out of bounds"))
                })
            })
            .collect::<Result<Vec<f32>>>()?;
        Tensor::from_vec(data, self.shape.dims())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={}, contiguous={})",
            self.shape,
            self.dtype(),
            self.device(),
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_f32_slice() {
            Some(data) if self.numel() <= 20 => {
                write!(f, "tensor({:?}, shape={})", data, self.shape)
            }
            Some(data) if !data.is_empty() => write!(
                f,
                "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                data[0],
                data[1],
                data[data.len() - 1],
                self.shape
            ),
            _ => write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype()),
        }
    }
}
