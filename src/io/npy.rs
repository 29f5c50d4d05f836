//! NumPy `.npy` array reader.
//!
//! ```text
//! "\x93NUMPY"   – magic
//! UINT8 UINT8   – format version (major, minor)
//! UINT16|UINT32 – header length (UINT16 for v1, UINT32 for v2/v3), little endian
//! header        – python dict literal: {'descr': '<f8', 'fortran_order': False, 'shape': (5, 4), }
//! data          – prod(shape) elements of `descr`
//! ```
//!
//! Numeric dtypes of any width and byte order are widened to `f64` and returned
//! in row-major order regardless of `fortran_order`.

use std::path::Path;

use crate::error::{InputError, InputResult};
use crate::io::{logged, read_bytes};

const MAGIC: &[u8] = b"\x93NUMPY";

/// A dense array read from a `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    /// Array dimensions; empty for a 0-dimensional (scalar) array.
    pub shape: Vec<usize>,
    /// Elements in row-major order.
    pub data: Vec<f64>,
}

impl NpyArray {
    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }
}

/// Load a `.npy` file.
///
/// # Errors
///
/// Returns [`InputError::FileNotFound`] if `path` does not exist and
/// [`InputError::InvalidContent`] if the header or data are malformed or the
/// dtype is not numeric.
pub fn load_npy<P: AsRef<Path>>(path: P) -> InputResult<NpyArray> {
    let path = path.as_ref();
    let bytes = read_bytes(path)?;
    parse_npy(&bytes).map_err(|message| logged(InputError::invalid_content(path, message)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    kind: char,
    size: usize,
    little_endian: bool,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, String> {
        let mut chars = descr.chars();
        let order = chars.next().ok_or("empty dtype descriptor")?;
        let little_endian = match order {
            '<' | '|' | '=' => cfg!(target_endian = "little") || order == '<',
            '>' => false,
            _ => return Err(format!("unsupported dtype descriptor '{descr}'")),
        };
        let kind = chars.next().ok_or("truncated dtype descriptor")?;
        let size: usize = chars
            .as_str()
            .parse()
            .map_err(|_| format!("unsupported dtype descriptor '{descr}'"))?;

        match (kind, size) {
            ('f', 4 | 8) | ('i' | 'u', 1 | 2 | 4 | 8) | ('b', 1) => Ok(Self {
                kind,
                size,
                little_endian,
            }),
            _ => Err(format!("unsupported dtype '{descr}'")),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn read(&self, chunk: &[u8]) -> f64 {
        // Normalize to little endian in a zero-extended scratch word
        let mut b = [0u8; 8];
        b[..self.size].copy_from_slice(chunk);
        if !self.little_endian {
            b[..self.size].reverse();
        }

        match (self.kind, self.size) {
            ('f', 4) => f64::from(f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ('f', _) => f64::from_le_bytes(b),
            ('i', 1) => f64::from(b[0] as i8),
            ('i', 2) => f64::from(i16::from_le_bytes([b[0], b[1]])),
            ('i', 4) => f64::from(i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            ('i', _) => i64::from_le_bytes(b) as f64,
            ('b', _) => f64::from(u8::from(b[0] != 0)),
            // Unsigned; zero extension already done above
            _ => u64::from_le_bytes(b) as f64,
        }
    }
}

/// Parse the bytes of a `.npy` file.
pub(crate) fn parse_npy(bytes: &[u8]) -> Result<NpyArray, String> {
    if bytes.len() < 10 || &bytes[..MAGIC.len()] != MAGIC {
        return Err("missing NumPy magic string".to_owned());
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (usize::from(u16::from_le_bytes([bytes[8], bytes[9]])), 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header length".to_owned());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        v => return Err(format!("unsupported .npy format version {v}")),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err("truncated header".to_owned());
    }
    let header = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|e| format!("header is not valid text: {e}"))?;

    let dtype = Dtype::parse(&header_string(header, "descr")?)?;
    let fortran_order = header_bool(header, "fortran_order")?;
    let shape = header_shape(header)?;

    let count = shape
        .iter()
        .try_fold(1_usize, |acc, n| acc.checked_mul(*n))
        .ok_or_else(|| format!("shape {shape:?} is too large"))?;
    let nbytes = count
        .checked_mul(dtype.size)
        .ok_or_else(|| format!("shape {shape:?} is too large"))?;
    let payload = &bytes[data_start..];
    if payload.len() < nbytes {
        return Err(format!(
            "truncated data: expected {nbytes} bytes, found {}",
            payload.len()
        ));
    }

    let mut data: Vec<f64> = payload
        .chunks_exact(dtype.size)
        .take(count)
        .map(|chunk| dtype.read(chunk))
        .collect();

    if fortran_order && shape.len() == 2 {
        let (rows, cols) = (shape[0], shape[1]);
        let mut row_major = vec![0.0; count];
        for j in 0..cols {
            for i in 0..rows {
                row_major[i * cols + j] = data[j * rows + i];
            }
        }
        data = row_major;
    } else if fortran_order && shape.len() > 2 {
        return Err(
            "Fortran-ordered arrays with more than 2 dimensions are not supported".to_owned(),
        );
    }

    Ok(NpyArray { shape, data })
}

/// Find the text following `'key':` in the header dict.
fn header_value<'a>(header: &'a str, key: &str) -> Result<&'a str, String> {
    let pattern = format!("'{key}'");
    let start = header
        .find(&pattern)
        .ok_or_else(|| format!("header has no '{key}' entry"))?;
    let rest = &header[start + pattern.len()..];
    let colon = rest
        .find(':')
        .ok_or_else(|| format!("header entry '{key}' has no value"))?;
    Ok(rest[colon + 1..].trim_start())
}

fn header_string(header: &str, key: &str) -> Result<String, String> {
    let value = header_value(header, key)?;
    let quote = value
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| format!("header entry '{key}' is not a string"))?;
    let body = &value[1..];
    let end = body
        .find(quote)
        .ok_or_else(|| format!("header entry '{key}' is unterminated"))?;
    Ok(body[..end].to_owned())
}

fn header_bool(header: &str, key: &str) -> Result<bool, String> {
    let value = header_value(header, key)?;
    if value.starts_with("True") {
        Ok(true)
    } else if value.starts_with("False") {
        Ok(false)
    } else {
        Err(format!("header entry '{key}' is not a boolean"))
    }
}

fn header_shape(header: &str) -> Result<Vec<usize>, String> {
    let value = header_value(header, "shape")?;
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.find(')').map(|end| &v[..end]))
        .ok_or("header entry 'shape' is not a tuple")?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| format!("invalid shape entry '{s}': {e}")))
        .collect()
}
