//! Per-layer parameter storage as NumPy `.npy` files.
//!
//! Layer `k` (1-based) of model `name` lives in two files under the model
//! directory: `best_layer{k}_weights{name}.npy` and
//! `best_layer{k}_biases{name}.npy`.

use ndarray::{Array2, ArrayD, ArrayView2, Ix2, IxDyn, ShapeBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
/// Header (magic + version + length + dict) is padded to this boundary.
const NPY_ALIGN: usize = 64;
const NPY_V1_PREAMBLE: usize = 10;

#[derive(Error, Debug)]
pub enum WeightError {
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed array file {}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },
    #[error("{name}: expected shape {expected:?}, found {actual:?}")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Location and naming convention of a model's parameter files.
#[derive(Debug, Clone)]
pub struct WeightStore {
    dir: PathBuf,
    model_name: String,
}

impl WeightStore {
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            model_name: model_name.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn weights_path(&self, layer: usize) -> PathBuf {
        self.dir
            .join(format!("best_layer{layer}_weights{}.npy", self.model_name))
    }

    pub fn biases_path(&self, layer: usize) -> PathBuf {
        self.dir
            .join(format!("best_layer{layer}_biases{}.npy", self.model_name))
    }

    /// Read the weight matrix and bias row of layer `layer` (1-based).
    ///
    /// A 1-D bias array of length n is returned as a (1, n) row.
    pub fn load_layer(&self, layer: usize) -> Result<(Array2<f32>, Array2<f32>), WeightError> {
        let weights_path = self.weights_path(layer);
        let weights = into_matrix(read_npy(&weights_path)?, &weights_path)?;

        let biases_path = self.biases_path(layer);
        let biases = into_matrix(read_npy(&biases_path)?, &biases_path)?;

        tracing::debug!(
            layer,
            weights = ?weights.dim(),
            biases = ?biases.dim(),
            "layer parameters read"
        );
        Ok((weights, biases))
    }

    /// Write the parameters of layer `layer` (1-based), creating the directory if needed.
    pub fn save_layer(
        &self,
        layer: usize,
        weights: ArrayView2<'_, f32>,
        biases: ArrayView2<'_, f32>,
    ) -> Result<(), WeightError> {
        fs::create_dir_all(&self.dir).map_err(|source| WeightError::Io {
            path: self.dir.clone(),
            source,
        })?;
        write_npy(&self.weights_path(layer), weights)?;
        write_npy(&self.biases_path(layer), biases)?;
        Ok(())
    }
}

/// Read a little- or big-endian `f4`/`f8` array of any rank.
pub fn read_npy(path: &Path) -> Result<ArrayD<f32>, WeightError> {
    let bytes = fs::read(path).map_err(|source| WeightError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    decode_npy(&bytes).map_err(|reason| WeightError::Format {
        path: path.to_path_buf(),
        reason,
    })
}

/// Write a 2-D array as a version 1.0 `<f8` C-order `.npy` file.
pub fn write_npy(path: &Path, array: ArrayView2<'_, f32>) -> Result<(), WeightError> {
    fs::write(path, encode_npy(array)).map_err(|source| WeightError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn into_matrix(array: ArrayD<f32>, path: &Path) -> Result<Array2<f32>, WeightError> {
    let shape = array.shape().to_vec();
    let array = match shape.as_slice() {
        [n] => array
            .into_shape_with_order(IxDyn(&[1, *n]))
            .map_err(|e| format_error(path, e.to_string()))?,
        [_, _] => array,
        _ => {
            let reason = format!("expected a 1-D or 2-D array, found shape {shape:?}");
            return Err(format_error(path, reason));
        }
    };
    array
        .into_dimensionality::<Ix2>()
        .map_err(|e| format_error(path, e.to_string()))
}

fn format_error(path: &Path, reason: String) -> WeightError {
    WeightError::Format {
        path: path.to_path_buf(),
        reason,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F4 { big_endian: bool },
    F8 { big_endian: bool },
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, String> {
        let mut chars = descr.chars();
        let big_endian = match chars.next() {
            Some('<' | '=' | '|') => false,
            Some('>') => true,
            _ => return Err(format!("unsupported byte order in dtype '{descr}'")),
        };
        match chars.as_str() {
            "f4" => Ok(Dtype::F4 { big_endian }),
            "f8" => Ok(Dtype::F8 { big_endian }),
            _ => Err(format!("unsupported dtype '{descr}' (only f4/f8)")),
        }
    }

    fn size(self) -> usize {
        match self {
            Dtype::F4 { .. } => 4,
            Dtype::F8 { .. } => 8,
        }
    }

    fn decode(self, chunk: &[u8]) -> f32 {
        match self {
            Dtype::F4 { big_endian } => {
                let mut buf = [0u8; 4];
                buf.copy_from_slice(chunk);
                if big_endian { f32::from_be_bytes(buf) } else { f32::from_le_bytes(buf) }
            }
            Dtype::F8 { big_endian } => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(chunk);
                let v = if big_endian { f64::from_be_bytes(buf) } else { f64::from_le_bytes(buf) };
                v as f32
            }
        }
    }
}

struct NpyHeader {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn decode_npy(bytes: &[u8]) -> Result<ArrayD<f32>, String> {
    if bytes.len() < NPY_V1_PREAMBLE || &bytes[..NPY_MAGIC.len()] != NPY_MAGIC {
        return Err("missing NUMPY magic".to_string());
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, NPY_V1_PREAMBLE),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("truncated header length".to_string());
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            (len, 12)
        }
        other => return Err(format!("unsupported format version {other}")),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err("truncated header".to_string());
    }
    let header_text = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|e| format!("header is not text: {e}"))?;
    let header = parse_header(header_text)?;

    let needed = header
        .shape
        .iter()
        .try_fold(header.dtype.size(), |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| format!("shape {:?} is too large", header.shape))?;
    let data = &bytes[data_start..];
    if data.len() < needed {
        return Err(format!("expected {needed} data bytes, found {}", data.len()));
    }

    let values: Vec<f32> = data[..needed]
        .chunks_exact(header.dtype.size())
        .map(|chunk| header.dtype.decode(chunk))
        .collect();

    ArrayD::from_shape_vec(IxDyn(&header.shape).set_f(header.fortran_order), values)
        .map_err(|e| e.to_string())
}

fn parse_header(text: &str) -> Result<NpyHeader, String> {
    let descr = dict_value(text, "descr").ok_or("header has no 'descr'")?;
    let descr = descr
        .strip_prefix(is_quote)
        .and_then(|rest| rest.split(is_quote).next())
        .ok_or("malformed 'descr'")?;
    let dtype = Dtype::parse(descr)?;

    let fortran = dict_value(text, "fortran_order").ok_or("header has no 'fortran_order'")?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err("malformed 'fortran_order'".to_string());
    };

    let shape = dict_value(text, "shape").ok_or("header has no 'shape'")?;
    let inner = shape
        .strip_prefix('(')
        .and_then(|rest| rest.split(')').next())
        .ok_or("malformed 'shape'")?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|dim| !dim.is_empty())
        .map(|dim| dim.parse::<usize>().map_err(|e| format!("bad dimension '{dim}': {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NpyHeader {
        dtype,
        fortran_order,
        shape,
    })
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// Text following `'key':` in the header dict, with leading whitespace removed.
fn dict_value<'a>(text: &'a str, key: &str) -> Option<&'a str> {
    [format!("'{key}':"), format!("\"{key}\":")]
        .iter()
        .find_map(|pattern| text.find(pattern.as_str()).map(|i| &text[i + pattern.len()..]))
        .map(str::trim_start)
}

fn encode_npy(array: ArrayView2<'_, f32>) -> Vec<u8> {
    let (rows, cols) = array.dim();
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({rows}, {cols}), }}"
    );
    // Pad with spaces so that magic + version + length + header + '\n' is aligned.
    let unpadded = NPY_V1_PREAMBLE + header.len() + 1;
    let padding = (NPY_ALIGN - unpadded % NPY_ALIGN) % NPY_ALIGN;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(NPY_V1_PREAMBLE + header.len() + rows * cols * 8);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for &v in array.iter() {
        out.extend_from_slice(&(v as f64).to_le_bytes());
    }
    out
}
