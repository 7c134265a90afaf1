//! Reading and writing NumPy unicode (`<U`) arrays.
//!
//! `ndarray-npy` covers the numeric arrays in the archive, but has no string
//! dtype. Filenames and the model name are stored the way NumPy itself
//! stores `str` arrays: fixed-width UCS-4, little endian, NUL padded.

use std::io::{Read, Write};
use thiserror::Error;

const MAGIC: &[u8] = b"\x93NUMPY";
/// Header block (magic + version + length + dict) is padded to this.
const ALIGN: usize = 64;

#[derive(Debug, Error)]
pub enum NpyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not an .npy file")]
    BadMagic,

    #[error("unsupported .npy format version {0}.{1}")]
    Version(u8, u8),

    #[error("malformed .npy header: {0}")]
    Header(String),

    #[error("expected a little-endian unicode array, found dtype {0}")]
    Dtype(String),

    #[error("invalid code point {0:#x}")]
    CodePoint(u32),
}

fn header_dict(width: usize, shape: &str) -> String {
    format!("{{'descr': '<U{width}', 'fortran_order': False, 'shape': {shape}, }}")
}

fn write_header<W: Write>(writer: &mut W, dict: &str) -> Result<(), NpyError> {
    // magic(6) + version(2) + header length(2)
    let prefix = MAGIC.len() + 2 + 2;
    let unpadded = prefix + dict.len() + 1;
    let padding = (ALIGN - unpadded % ALIGN) % ALIGN;
    let header_len = dict.len() + padding + 1;

    let header_len = u16::try_from(header_len)
        .map_err(|_| NpyError::Header(format!("header of {header_len} bytes is too long")))?;

    writer.write_all(MAGIC)?;
    writer.write_all(&[1, 0])?;
    writer.write_all(&header_len.to_le_bytes())?;
    writer.write_all(dict.as_bytes())?;
    writer.write_all(&vec![b' '; padding])?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn write_data<W: Write>(writer: &mut W, values: &[&str], width: usize) -> Result<(), NpyError> {
    let mut buf = Vec::with_capacity(values.len() * width * 4);
    for value in values {
        let mut count = 0;
        for c in value.chars() {
            buf.extend_from_slice(&(c as u32).to_le_bytes());
            count += 1;
        }
        buf.resize(buf.len() + (width - count) * 4, 0);
    }
    writer.write_all(&buf)?;
    Ok(())
}

fn width_of(values: &[&str]) -> usize {
    values.iter().map(|v| v.chars().count()).max().unwrap_or(0).max(1)
}

/// Write a one-dimensional string array.
pub fn write_str_array<W: Write, S: AsRef<str>>(
    mut writer: W,
    values: &[S],
) -> Result<(), NpyError> {
    let values: Vec<&str> = values.iter().map(|v| v.as_ref()).collect();
    let width = width_of(&values);

    write_header(&mut writer, &header_dict(width, &format!("({},)", values.len())))?;
    write_data(&mut writer, &values, width)
}

/// Write a zero-dimensional string array (a NumPy `str` scalar).
pub fn write_str_scalar<W: Write>(mut writer: W, value: &str) -> Result<(), NpyError> {
    let width = width_of(&[value]);

    write_header(&mut writer, &header_dict(width, "()"))?;
    write_data(&mut writer, &[value], width)
}

/// Pull the quoted value following `'key': ` out of the header dict.
fn dict_field<'a>(header: &'a str, key: &str) -> Result<&'a str, NpyError> {
    let pattern = format!("'{key}':");
    let start = header
        .find(&pattern)
        .ok_or_else(|| NpyError::Header(format!("missing {key}")))?
        + pattern.len();
    Ok(header[start..].trim_start())
}

fn parse_descr(header: &str) -> Result<usize, NpyError> {
    let rest = dict_field(header, "descr")?;
    let descr = rest
        .strip_prefix('\'')
        .and_then(|r| r.split('\'').next())
        .ok_or_else(|| NpyError::Header("descr is not a string".to_string()))?;

    descr
        .strip_prefix("<U")
        .and_then(|w| w.parse::<usize>().ok())
        .ok_or_else(|| NpyError::Dtype(descr.to_string()))
}

fn parse_shape(header: &str) -> Result<Vec<usize>, NpyError> {
    let rest = dict_field(header, "shape")?;
    let inner = rest
        .strip_prefix('(')
        .and_then(|r| r.split(')').next())
        .ok_or_else(|| NpyError::Header("shape is not a tuple".to_string()))?;

    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| NpyError::Header(format!("bad dimension {s:?}")))
        })
        .collect()
}

/// Read a string array of any shape, flattened in storage order. A scalar
/// comes back as a single element.
pub fn read_str_array<R: Read>(mut reader: R) -> Result<Vec<String>, NpyError> {
    let mut magic = [0u8; 6];
    reader.read_exact(&mut magic)?;
    if magic != MAGIC {
        return Err(NpyError::BadMagic);
    }

    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut len = [0u8; 2];
            reader.read_exact(&mut len)?;
            u16::from_le_bytes(len) as usize
        }
        2 | 3 => {
            let mut len = [0u8; 4];
            reader.read_exact(&mut len)?;
            u32::from_le_bytes(len) as usize
        }
        _ => return Err(NpyError::Version(version[0], version[1])),
    };

    let mut header = vec![0u8; header_len];
    reader.read_exact(&mut header)?;
    let header = String::from_utf8_lossy(&header);

    let width = parse_descr(&header)?;
    let count: usize = parse_shape(&header)?.iter().product();

    if width == 0 {
        return Ok(vec![String::new(); count]);
    }

    let mut data = vec![0u8; count * width * 4];
    reader.read_exact(&mut data)?;

    let mut values = Vec::with_capacity(count);
    for item in data.chunks_exact(width * 4) {
        let mut value = String::new();
        for unit in item.chunks_exact(4) {
            let code = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
            if code == 0 {
                break;
            }
            value.push(char::from_u32(code).ok_or(NpyError::CodePoint(code))?);
        }
        values.push(value);
    }

    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_aligned() {
        let mut buf = Vec::new();
        write_str_array(&mut buf, &["a.jpg", "sub/bb.jpg"]).unwrap();

        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % ALIGN, 0);
        assert_eq!(buf[10 + header_len - 1], b'\n');

        let header = std::str::from_utf8(&buf[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<U10', 'fortran_order': False, 'shape': (2,), }"));
        assert_eq!(buf.len(), 10 + header_len + 2 * 10 * 4);
    }

    #[test]
    fn test_scalar_and_non_ascii() {
        let mut buf = Vec::new();
        write_str_scalar(&mut buf, "ViT-B/32").unwrap();
        assert_eq!(read_str_array(buf.as_slice()).unwrap(), vec!["ViT-B/32"]);

        let mut buf = Vec::new();
        write_str_array(&mut buf, &["Hélène_Schjerfbeck_1.jpg", "", "x"]).unwrap();
        assert_eq!(
            read_str_array(buf.as_slice()).unwrap(),
            vec!["Hélène_Schjerfbeck_1.jpg", "", "x"]
        );
    }

    #[test]
    fn test_rejects_numeric_dtype() {
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&[1, 0]);
        let dict = "{'descr': '<f4', 'fortran_order': False, 'shape': (2,), }\n";
        buf.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        buf.extend_from_slice(dict.as_bytes());

        assert!(matches!(read_str_array(buf.as_slice()), Err(NpyError::Dtype(d)) if d == "<f4"));
    }

    #[test]
    fn test_rejects_bad_magic() {
        assert!(matches!(
            read_str_array(&b"PK\x03\x04garbage"[..]),
            Err(NpyError::BadMagic)
        ));
    }
}
