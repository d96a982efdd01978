use std::sync::Arc;

use crate::{DType, Device, Result, SygnalError};

/// Typed element buffer. Kept typed so slice views are always aligned.
#[derive(Debug, Clone)]
enum Buffer {
    F32(Vec<f32>),
    I64(Vec<i64>),
}

/// Backing storage for tensor data (CPU only).
///
/// Cloning shares the buffer; tensors never mutate storage in place.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<Buffer>,
}

impl Storage {
    /// Rebuild storage from native-endian bytes.
    pub fn from_bytes(dtype: DType, numel: usize, bytes: &[u8]) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(SygnalError::StorageError(format!(
                "Expected {} bytes for {} elements of {}, got {}",
                expected,
                numel,
                dtype,
                bytes.len()
            )));
        }
        let buffer = match dtype {
            DType::F32 => Buffer::F32(bytemuck::pod_collect_to_vec(bytes)),
            DType::I64 => Buffer::I64(bytemuck::pod_collect_to_vec(bytes)),
        };
        Ok(Self { data: Arc::new(buffer) })
    }

    pub fn from_f32(data: &[f32]) -> Self {
        Self::from_f32_vec(data.to_vec())
    }

    pub fn from_f32_vec(data: Vec<f32>) -> Self {
        Self { data: Arc::new(Buffer::F32(data)) }
    }

    pub fn from_i64(data: &[i64]) -> Self {
        Self { data: Arc::new(Buffer::I64(data.to_vec())) }
    }

    pub fn dtype(&self) -> DType {
        match *self.data {
            Buffer::F32(_) => DType::F32,
            Buffer::I64(_) => DType::I64,
        }
    }

    pub fn device(&self) -> Device {
        Device::Cpu
    }

    pub fn numel(&self) -> usize {
        match &*self.data {
            Buffer::F32(v) => v.len(),
            Buffer::I64(v) => v.len(),
        }
    }

    pub fn nbytes(&self) -> usize {
        self.dtype().storage_bytes(self.numel())
    }

    /// Native-endian byte view of the buffer.
    pub fn as_bytes(&self) -> &[u8] {
        match &*self.data {
            Buffer::F32(v) => bytemuck::cast_slice(v),
            Buffer::I64(v) => bytemuck::cast_slice(v),
        }
    }

    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        match &*self.data {
            Buffer::F32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        match &*self.data {
            Buffer::I64(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip_f32() {
        let s = Storage::from_f32(&[1.0, -2.5, 3.25]);
        assert_eq!(s.nbytes(), 12);
        let back = Storage::from_bytes(DType::F32, 3, s.as_bytes()).unwrap();
        assert_eq!(back.as_f32_slice().unwrap(), &[1.0, -2.5, 3.25]);
    }

    #[test]
    fn test_bytes_roundtrip_i64() {
        let s = Storage::from_i64(&[7, -3]);
        assert_eq!(s.nbytes(), 16);
        let back = Storage::from_bytes(DType::I64, 2, s.as_bytes()).unwrap();
        assert_eq!(back.as_i64_slice().unwrap(), &[7, -3]);
    }

    #[test]
    fn test_from_bytes_wrong_len() {
        let err = Storage::from_bytes(DType::I64, 2, &[0u8; 12]);
        assert!(err.is_err());
    }

    #[test]
    fn test_typed_views() {
        let s = Storage::from_i64(&[3, 4]);
        assert_eq!(s.dtype(), DType::I64);
        assert!(s.as_f32_slice().is_none());
        assert_eq!(s.as_i64_slice().unwrap(), &[3, 4]);
    }
}
