//! Fixed-width numeric buffers with an optional multi-dimensional shape.

use std::fmt;
use std::str::FromStr;

use crate::protocol::{Error, Result};

/// Element kind of a typed buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// `u8`
    Uint8,
    /// `i8`
    Int8,
    /// `u16`
    Uint16,
    /// `i16`
    Int16,
    /// `u32`
    Uint32,
    /// `i32`
    Int32,
    /// `f32`
    Float32,
    /// `f64`
    Float64,
}

impl DType {
    /// Width of one element in bytes
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Uint8 | Self::Int8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Uint32 | Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uint8 => "uint8",
            Self::Int8 => "int8",
            Self::Uint16 => "uint16",
            Self::Int16 => "int16",
            Self::Uint32 => "uint32",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "uint8" | "bool" => Self::Uint8,
            "int8" => Self::Int8,
            "uint16" => Self::Uint16,
            "int16" => Self::Int16,
            "uint32" => Self::Uint32,
            "int32" => Self::Int32,
            "float32" => Self::Float32,
            "float64" => Self::Float64,
            other => return Err(Error::UnsupportedData(format!("dtype {other:?}"))),
        })
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive element of a [`TypedBuffer`]
pub(crate) trait Element: Copy + Default + PartialEq + 'static {
    const SIZE: usize;

    fn from_f64(value: f64) -> Self;
    fn to_f64(self) -> f64;
    fn write_le(self, out: &mut Vec<u8>);
    fn read(bytes: &[u8], big_endian: bool) -> Self;
}

macro_rules! impl_element {
    ($($ty:ty),*) => {
        $(
            impl Element for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_lossless)]
                fn from_f64(value: f64) -> Self {
                    value as $ty
                }

                #[allow(clippy::cast_lossless, clippy::cast_precision_loss)]
                fn to_f64(self) -> f64 {
                    self as f64
                }

                fn write_le(self, out: &mut Vec<u8>) {
                    out.extend_from_slice(&self.to_le_bytes());
                }

                fn read(bytes: &[u8], big_endian: bool) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    if big_endian {
                        <$ty>::from_be_bytes(raw)
                    } else {
                        <$ty>::from_le_bytes(raw)
                    }
                }
            }
        )*
    };
}

impl_element!(u8, i8, u16, i16, u32, i32, f32, f64);

/// Growable buffer of one fixed element kind
#[derive(Debug, Clone, PartialEq)]
pub enum TypedBuffer {
    /// `u8` elements
    Uint8(Vec<u8>),
    /// `i8` elements
    Int8(Vec<i8>),
    /// `u16` elements
    Uint16(Vec<u16>),
    /// `i16` elements
    Int16(Vec<i16>),
    /// `u32` elements
    Uint32(Vec<u32>),
    /// `i32` elements
    Int32(Vec<i32>),
    /// `f32` elements
    Float32(Vec<f32>),
    /// `f64` elements
    Float64(Vec<f64>),
}

/// Run `$body` with `$v` bound to the inner `Vec` of any variant.
macro_rules! dispatch {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            TypedBuffer::Uint8($v) => $body,
            TypedBuffer::Int8($v) => $body,
            TypedBuffer::Uint16($v) => $body,
            TypedBuffer::Int16($v) => $body,
            TypedBuffer::Uint32($v) => $body,
            TypedBuffer::Int32($v) => $body,
            TypedBuffer::Float32($v) => $body,
            TypedBuffer::Float64($v) => $body,
        }
    };
}

/// Like `dispatch!`, rewrapping the resulting `Vec` in the same variant.
macro_rules! map_same {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            TypedBuffer::Uint8($v) => TypedBuffer::Uint8($body),
            TypedBuffer::Int8($v) => TypedBuffer::Int8($body),
            TypedBuffer::Uint16($v) => TypedBuffer::Uint16($body),
            TypedBuffer::Int16($v) => TypedBuffer::Int16($body),
            TypedBuffer::Uint32($v) => TypedBuffer::Uint32($body),
            TypedBuffer::Int32($v) => TypedBuffer::Int32($body),
            TypedBuffer::Float32($v) => TypedBuffer::Float32($body),
            TypedBuffer::Float64($v) => TypedBuffer::Float64($body),
        }
    };
}

pub(crate) use map_same;

impl TypedBuffer {
    /// Buffer of `dtype` holding `values` cast to the element kind
    #[must_use]
    pub fn from_f64(dtype: DType, values: &[f64]) -> Self {
        fn cast<T: Element>(values: &[f64]) -> Vec<T> {
            values.iter().map(|&v| T::from_f64(v)).collect()
        }

        match dtype {
            DType::Uint8 => Self::Uint8(cast(values)),
            DType::Int8 => Self::Int8(cast(values)),
            DType::Uint16 => Self::Uint16(cast(values)),
            DType::Int16 => Self::Int16(cast(values)),
            DType::Uint32 => Self::Uint32(cast(values)),
            DType::Int32 => Self::Int32(cast(values)),
            DType::Float32 => Self::Float32(cast(values)),
            DType::Float64 => Self::Float64(cast(values)),
        }
    }

    /// Decode raw bytes as elements of `dtype`
    pub fn from_bytes(dtype: DType, bytes: &[u8], big_endian: bool) -> Result<Self> {
        fn read<T: Element>(bytes: &[u8], big_endian: bool) -> Vec<T> {
            bytes
                .chunks_exact(T::SIZE)
                .map(|chunk| T::read(chunk, big_endian))
                .collect()
        }

        if bytes.len() % dtype.size() != 0 {
            return Err(Error::UnsupportedData(format!(
                "{} bytes is not a whole number of {dtype} elements",
                bytes.len()
            )));
        }

        Ok(match dtype {
            DType::Uint8 => Self::Uint8(read(bytes, big_endian)),
            DType::Int8 => Self::Int8(read(bytes, big_endian)),
            DType::Uint16 => Self::Uint16(read(bytes, big_endian)),
            DType::Int16 => Self::Int16(read(bytes, big_endian)),
            DType::Uint32 => Self::Uint32(read(bytes, big_endian)),
            DType::Int32 => Self::Int32(read(bytes, big_endian)),
            DType::Float32 => Self::Float32(read(bytes, big_endian)),
            DType::Float64 => Self::Float64(read(bytes, big_endian)),
        })
    }

    /// Element kind
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::Uint8(_) => DType::Uint8,
            Self::Int8(_) => DType::Int8,
            Self::Uint16(_) => DType::Uint16,
            Self::Int16(_) => DType::Int16,
            Self::Uint32(_) => DType::Uint32,
            Self::Int32(_) => DType::Int32,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
        }
    }

    /// Number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        dispatch!(self, v => v.len())
    }

    /// Whether the buffer holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` widened to `f64`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<f64> {
        dispatch!(self, v => v.get(index).map(|x| x.to_f64()))
    }

    /// Overwrite the element at `index`, casting to the element kind.
    ///
    /// Out-of-range indices are ignored; callers bounds-check first.
    pub fn set(&mut self, index: usize, value: f64) {
        dispatch!(self, v => {
            if let Some(slot) = v.get_mut(index) {
                *slot = Element::from_f64(value);
            }
        });
    }

    /// All elements widened to `f64`
    #[must_use]
    pub fn to_f64_vec(&self) -> Vec<f64> {
        dispatch!(self, v => v.iter().map(|x| x.to_f64()).collect())
    }

    /// Elements cast to `T`
    pub(crate) fn cast_vec<T: Element>(&self) -> Vec<T> {
        dispatch!(self, v => v.iter().map(|x| T::from_f64(x.to_f64())).collect())
    }

    /// Same elements cast to `dtype`
    #[must_use]
    pub fn cast(&self, dtype: DType) -> Self {
        if self.dtype() == dtype {
            return self.clone();
        }
        Self::from_f64(dtype, &self.to_f64_vec())
    }

    /// Little-endian byte image
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.dtype().size());
        dispatch!(self, v => v.iter().for_each(|x| x.write_le(&mut out)));
        out
    }
}

/// Typed buffer interpreted through a row-major shape
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    buffer: TypedBuffer,
    shape: Vec<usize>,
}

impl NdArray {
    /// One-dimensional array over `buffer`
    #[must_use]
    pub fn new(buffer: TypedBuffer) -> Self {
        let shape = vec![buffer.len()];
        Self { buffer, shape }
    }

    /// Array over `buffer` with an explicit shape
    pub fn with_shape(buffer: TypedBuffer, shape: Vec<usize>) -> Result<Self> {
        let cells: usize = shape.iter().product();
        if cells != buffer.len() {
            return Err(Error::UnsupportedData(format!(
                "shape {shape:?} does not cover {} elements",
                buffer.len()
            )));
        }
        Ok(Self { buffer, shape })
    }

    /// One-dimensional `f64` array, mostly for tests and literals
    #[must_use]
    pub fn from_f64(dtype: DType, values: &[f64]) -> Self {
        Self::new(TypedBuffer::from_f64(dtype, values))
    }

    /// Element kind
    #[must_use]
    pub const fn dtype(&self) -> DType {
        self.buffer.dtype()
    }

    /// Declared shape
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Number of dimensions
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Flat element count
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the array holds no elements
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Underlying buffer
    #[must_use]
    pub const fn buffer(&self) -> &TypedBuffer {
        &self.buffer
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut TypedBuffer {
        &mut self.buffer
    }

    /// Take the buffer, dropping the shape
    #[must_use]
    pub fn into_buffer(self) -> TypedBuffer {
        self.buffer
    }
}
