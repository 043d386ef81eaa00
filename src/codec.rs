use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use thiserror::Error;

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

#[derive(Debug, Clone, Error)]
pub enum NpyError {
    #[error("invalid base64 payload: {0}")]
    Base64(String),
    #[error("not an NPY container (bad magic)")]
    BadMagic,
    #[error("unsupported NPY version {0}.{1}")]
    UnsupportedVersion(u8, u8),
    #[error("malformed NPY header: {0}")]
    BadHeader(String),
    #[error("unsupported dtype `{0}`")]
    UnsupportedDtype(String),
    #[error("payload truncated: expected {expected} data bytes, found {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Decode a Base64 string carrying an NPY container into an `f32` array.
pub fn decode_base64_npy(text: &str) -> Result<ArrayD<f32>, NpyError> {
    let bytes = BASE64
        .decode(text.trim())
        .map_err(|err| NpyError::Base64(err.to_string()))?;
    parse_npy(&bytes)
}

/// Parse an NPY v1/v2/v3 container. All numeric dtypes are widened to `f32`.
///
/// Pickled object arrays (`|O`) are rejected: they cannot be decoded outside
/// Python and every payload the service emits is numeric.
pub fn parse_npy(bytes: &[u8]) -> Result<ArrayD<f32>, NpyError> {
    if bytes.len() < 8 || &bytes[..6] != NPY_MAGIC {
        return Err(NpyError::BadMagic);
    }
    let (major, minor) = (bytes[6], bytes[7]);

    let (header_len, header_start): (usize, usize) = match major {
        1 => {
            if bytes.len() < 10 {
                return Err(NpyError::BadHeader("truncated header length".into()));
            }
            (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10)
        }
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(NpyError::BadHeader("truncated header length".into()));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        _ => return Err(NpyError::UnsupportedVersion(major, minor)),
    };

    let header_end = header_start
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| NpyError::BadHeader("header exceeds payload".into()))?;
    let header = std::str::from_utf8(&bytes[header_start..header_end])
        .map_err(|err| NpyError::BadHeader(err.to_string()))?;

    let descr = str_field(header, "descr")?;
    let fortran_order = bool_field(header, "fortran_order")?;
    let shape = shape_field(header)?;
    let dtype = DType::parse(&descr)?;

    let count = shape
        .iter()
        .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| NpyError::BadHeader("shape overflows usize".into()))?;
    let expected = count
        .checked_mul(dtype.item_size())
        .ok_or_else(|| NpyError::BadHeader("data size overflows usize".into()))?;

    let data = &bytes[header_end..];
    if data.len() < expected {
        return Err(NpyError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    let values = dtype.widen(&data[..expected]);

    let array = if fortran_order {
        ArrayD::from_shape_vec(IxDyn(&shape).f(), values)
    } else {
        ArrayD::from_shape_vec(IxDyn(&shape), values)
    };
    array.map_err(|err| NpyError::BadHeader(err.to_string()))
}

#[derive(Debug, Clone, Copy)]
enum DType {
    F4,
    F8,
    I1,
    I2,
    I4,
    I8,
    U1,
    U2,
    U4,
    U8,
    Bool,
}

impl DType {
    fn parse(descr: &str) -> Result<Self, NpyError> {
        // Byte order '<' (little-endian), '|' (not applicable) and '=' (native,
        // assumed little-endian) are accepted; big-endian payloads are not.
        let dtype = match descr {
            "<f4" | "=f4" => Self::F4,
            "<f8" | "=f8" => Self::F8,
            "|i1" | "<i1" => Self::I1,
            "<i2" | "=i2" => Self::I2,
            "<i4" | "=i4" => Self::I4,
            "<i8" | "=i8" => Self::I8,
            "|u1" | "<u1" => Self::U1,
            "<u2" | "=u2" => Self::U2,
            "<u4" | "=u4" => Self::U4,
            "<u8" | "=u8" => Self::U8,
            "|b1" => Self::Bool,
            other => return Err(NpyError::UnsupportedDtype(other.to_string())),
        };
        Ok(dtype)
    }

    fn item_size(self) -> usize {
        match self {
            Self::I1 | Self::U1 | Self::Bool => 1,
            Self::I2 | Self::U2 => 2,
            Self::F4 | Self::I4 | Self::U4 => 4,
            Self::F8 | Self::I8 | Self::U8 => 8,
        }
    }

    fn widen(self, data: &[u8]) -> Vec<f32> {
        match self {
            Self::F4 => data
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Self::F8 => data
                .chunks_exact(8)
                .map(|c| {
                    f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            Self::I1 => data.iter().map(|&b| b as i8 as f32).collect(),
            Self::I2 => data
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as f32)
                .collect(),
            Self::I4 => data
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            Self::I8 => data
                .chunks_exact(8)
                .map(|c| {
                    i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            Self::U1 => data.iter().map(|&b| b as f32).collect(),
            Self::U2 => data
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as f32)
                .collect(),
            Self::U4 => data
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            Self::U8 => data
                .chunks_exact(8)
                .map(|c| {
                    u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]) as f32
                })
                .collect(),
            Self::Bool => data
                .iter()
                .map(|&b| if b != 0 { 1.0 } else { 0.0 })
                .collect(),
        }
    }
}

fn field<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    // The header is a Python dict literal; numpy always writes single-quoted
    // keys, e.g. {'descr': '<f4', 'fortran_order': False, 'shape': (155, 4), }
    for quote in ['\'', '"'] {
        let pattern = format!("{quote}{key}{quote}:");
        if let Some(pos) = header.find(&pattern) {
            return Ok(header[pos + pattern.len()..].trim_start());
        }
    }
    Err(NpyError::BadHeader(format!("missing field `{key}`")))
}

fn str_field(header: &str, key: &str) -> Result<String, NpyError> {
    let rest = field(header, key)?;
    let mut chars = rest.chars();
    let quote = chars
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| NpyError::BadHeader(format!("field `{key}` is not a string")))?;
    let value: String = chars.take_while(|c| *c != quote).collect();
    Ok(value)
}

fn bool_field(header: &str, key: &str) -> Result<bool, NpyError> {
    let rest = field(header, key)?;
    if rest.starts_with("True") {
        Ok(true)
    } else if rest.starts_with("False") {
        Ok(false)
    } else {
        Err(NpyError::BadHeader(format!("field `{key}` is not a bool")))
    }
}

fn shape_field(header: &str) -> Result<Vec<usize>, NpyError> {
    let rest = field(header, "shape")?;
    let rest = rest
        .strip_prefix('(')
        .ok_or_else(|| NpyError::BadHeader("shape is not a tuple".into()))?;
    let inner = rest
        .split(')')
        .next()
        .ok_or_else(|| NpyError::BadHeader("unterminated shape tuple".into()))?;

    let mut shape = Vec::new();
    for part in inner.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let dim = part
            .parse::<usize>()
            .map_err(|err| NpyError::BadHeader(format!("bad shape dimension `{part}`: {err}")))?;
        shape.push(dim);
    }
    Ok(shape)
}
