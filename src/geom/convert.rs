//! Conversion between point lists and packed numeric buffers.

use super::Point3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("flat buffer length {0} is not a multiple of 3")]
    NotTriples(usize),
    #[error("unsupported numeric element type `{0}` for point data")]
    UnsupportedElementType(&'static str),
}

/// A packed numeric array as handed over by external collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericBuffer {
    F64(Vec<f64>),
    F32(Vec<f32>),
    I64(Vec<i64>),
    I32(Vec<i32>),
    U8(Vec<u8>),
    Bool(Vec<bool>),
}

impl NumericBuffer {
    #[must_use]
    pub fn element_type(&self) -> &'static str {
        match self {
            Self::F64(_) => "f64",
            Self::F32(_) => "f32",
            Self::I64(_) => "i64",
            Self::I32(_) => "i32",
            Self::U8(_) => "u8",
            Self::Bool(_) => "bool",
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::F64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U8(v) => v.len(),
            Self::Bool(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Widen to `f64`. Byte and boolean buffers are masks, not coordinates.
    pub fn to_f64(&self) -> Result<Vec<f64>, ConvertError> {
        match self {
            Self::F64(v) => Ok(v.clone()),
            Self::F32(v) => Ok(v.iter().map(|&x| f64::from(x)).collect()),
            Self::I64(v) => Ok(v.iter().map(|&x| x as f64).collect()),
            Self::I32(v) => Ok(v.iter().map(|&x| f64::from(x)).collect()),
            Self::U8(_) | Self::Bool(_) => {
                Err(ConvertError::UnsupportedElementType(self.element_type()))
            }
        }
    }
}

/// `[x0, y0, z0, x1, ...]` from a point list.
#[must_use]
pub fn points_to_flat(points: &[Point3]) -> Vec<f64> {
    points.iter().flat_map(|p| p.to_array()).collect()
}

pub fn points_from_flat(flat: &[f64]) -> Result<Vec<Point3>, ConvertError> {
    if flat.len() % 3 != 0 {
        return Err(ConvertError::NotTriples(flat.len()));
    }
    Ok(flat
        .chunks_exact(3)
        .map(|c| Point3::new(c[0], c[1], c[2]))
        .collect())
}

pub fn points_from_buffer(buffer: &NumericBuffer) -> Result<Vec<Point3>, ConvertError> {
    points_from_flat(&buffer.to_f64()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_round_trip() {
        let points = vec![Point3::new(1.0, 2.0, 3.0), Point3::new(-1.0, 0.5, 8.0)];
        let flat = points_to_flat(&points);
        assert_eq!(flat, vec![1.0, 2.0, 3.0, -1.0, 0.5, 8.0]);
        assert_eq!(points_from_flat(&flat).unwrap(), points);
    }

    #[test]
    fn integer_buffers_widen() {
        let buffer = NumericBuffer::I32(vec![1, 2, 3]);
        assert_eq!(
            points_from_buffer(&buffer).unwrap(),
            vec![Point3::new(1.0, 2.0, 3.0)]
        );
    }

    #[test]
    fn rejects_mask_buffers_and_ragged_lengths() {
        assert_eq!(
            points_from_buffer(&NumericBuffer::U8(vec![0, 1, 2])),
            Err(ConvertError::UnsupportedElementType("u8"))
        );
        assert_eq!(
            points_from_flat(&[1.0, 2.0]),
            Err(ConvertError::NotTriples(2))
        );
    }
}
