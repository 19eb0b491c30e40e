//! Tensor and inference payload types
//!
//! These types follow the open inference protocol (v2): a request carries a
//! list of named input tensors, each with a shape, a datatype and flattened
//! row-major data. Both the REST and the gRPC data planes convert their wire
//! representation into these types before dispatching to a model.

use crate::error::{Result, ServerError};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Tensor element datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Int8,
    Int16,
    Int32,
    Int64,
    Fp32,
    Fp64,
    Bytes,
}

impl DataType {
    /// Protocol name of the datatype
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Uint8 => "UINT8",
            DataType::Uint16 => "UINT16",
            DataType::Uint32 => "UINT32",
            DataType::Uint64 => "UINT64",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Fp32 => "FP32",
            DataType::Fp64 => "FP64",
            DataType::Bytes => "BYTES",
        }
    }

    /// Width of one element in raw little-endian encoding, `None` for BYTES
    pub fn element_size(&self) -> Option<usize> {
        match self {
            DataType::Bool | DataType::Uint8 | DataType::Int8 => Some(1),
            DataType::Uint16 | DataType::Int16 => Some(2),
            DataType::Uint32 | DataType::Int32 | DataType::Fp32 => Some(4),
            DataType::Uint64 | DataType::Int64 | DataType::Fp64 => Some(8),
            DataType::Bytes => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "BOOL" => Ok(DataType::Bool),
            "UINT8" => Ok(DataType::Uint8),
            "UINT16" => Ok(DataType::Uint16),
            "UINT32" => Ok(DataType::Uint32),
            "UINT64" => Ok(DataType::Uint64),
            "INT8" => Ok(DataType::Int8),
            "INT16" => Ok(DataType::Int16),
            "INT32" => Ok(DataType::Int32),
            "INT64" => Ok(DataType::Int64),
            "FP32" => Ok(DataType::Fp32),
            "FP64" => Ok(DataType::Fp64),
            "BYTES" => Ok(DataType::Bytes),
            other => Err(ServerError::InvalidInput(format!(
                "unsupported datatype {}",
                other
            ))),
        }
    }
}

/// Flattened tensor contents
///
/// Narrow integer types share the 32-bit variants, mirroring how the gRPC
/// `InferTensorContents` message stores them.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    Bool(Vec<bool>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Uint32(Vec<u32>),
    Uint64(Vec<u64>),
    Fp32(Vec<f32>),
    Fp64(Vec<f64>),
    Bytes(Vec<Vec<u8>>),
}

impl TensorData {
    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            TensorData::Bool(v) => v.len(),
            TensorData::Int32(v) => v.len(),
            TensorData::Int64(v) => v.len(),
            TensorData::Uint32(v) => v.len(),
            TensorData::Uint64(v) => v.len(),
            TensorData::Fp32(v) => v.len(),
            TensorData::Fp64(v) => v.len(),
            TensorData::Bytes(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether these contents can carry elements of `datatype`
    pub fn matches(&self, datatype: DataType) -> bool {
        matches!(
            (self, datatype),
            (TensorData::Bool(_), DataType::Bool)
                | (
                    TensorData::Int32(_),
                    DataType::Int8 | DataType::Int16 | DataType::Int32
                )
                | (TensorData::Int64(_), DataType::Int64)
                | (
                    TensorData::Uint32(_),
                    DataType::Uint8 | DataType::Uint16 | DataType::Uint32
                )
                | (TensorData::Uint64(_), DataType::Uint64)
                | (TensorData::Fp32(_), DataType::Fp32)
                | (TensorData::Fp64(_), DataType::Fp64)
                | (TensorData::Bytes(_), DataType::Bytes)
        )
    }

    /// Numeric contents widened to `f64`, `None` for BOOL and BYTES
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            TensorData::Int32(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
            TensorData::Int64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            TensorData::Uint32(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
            TensorData::Uint64(v) => Some(v.iter().map(|x| *x as f64).collect()),
            TensorData::Fp32(v) => Some(v.iter().map(|x| f64::from(*x)).collect()),
            TensorData::Fp64(v) => Some(v.clone()),
            TensorData::Bool(_) | TensorData::Bytes(_) => None,
        }
    }

    /// Parse JSON data (possibly nested) for the given datatype
    pub fn from_json(datatype: DataType, value: &Value) -> Result<Self> {
        let mut flat = Vec::new();
        flatten_json(value, &mut flat);

        fn each<T>(
            flat: &[&Value],
            datatype: DataType,
            f: impl Fn(&Value) -> Option<T>,
        ) -> Result<Vec<T>> {
            flat.iter()
                .map(|&v| {
                    f(v).ok_or_else(|| {
                        ServerError::InvalidInput(format!(
                            "element {} is not a valid {}",
                            v, datatype
                        ))
                    })
                })
                .collect()
        }

        let data = match datatype {
            DataType::Bool => TensorData::Bool(each(&flat, datatype, Value::as_bool)?),
            DataType::Int8 | DataType::Int16 | DataType::Int32 => {
                TensorData::Int32(each(&flat, datatype, |v| {
                    v.as_i64().and_then(|x| i32::try_from(x).ok())
                })?)
            }
            DataType::Int64 => TensorData::Int64(each(&flat, datatype, Value::as_i64)?),
            DataType::Uint8 | DataType::Uint16 | DataType::Uint32 => {
                TensorData::Uint32(each(&flat, datatype, |v| {
                    v.as_u64().and_then(|x| u32::try_from(x).ok())
                })?)
            }
            DataType::Uint64 => TensorData::Uint64(each(&flat, datatype, Value::as_u64)?),
            DataType::Fp32 => {
                TensorData::Fp32(each(&flat, datatype, |v| v.as_f64().map(|x| x as f32))?)
            }
            DataType::Fp64 => TensorData::Fp64(each(&flat, datatype, Value::as_f64)?),
            DataType::Bytes => TensorData::Bytes(each(&flat, datatype, |v| {
                v.as_str().map(|s| s.as_bytes().to_vec())
            })?),
        };
        Ok(data)
    }

    /// Flat JSON array of the contents; BYTES elements become strings
    pub fn to_json(&self) -> Value {
        match self {
            TensorData::Bool(v) => Value::from(v.clone()),
            TensorData::Int32(v) => Value::from(v.clone()),
            TensorData::Int64(v) => Value::from(v.clone()),
            TensorData::Uint32(v) => Value::from(v.clone()),
            TensorData::Uint64(v) => Value::from(v.clone()),
            TensorData::Fp32(v) => Value::from(v.clone()),
            TensorData::Fp64(v) => Value::from(v.clone()),
            TensorData::Bytes(v) => Value::Array(
                v.iter()
                    .map(|b| Value::String(String::from_utf8_lossy(b).into_owned()))
                    .collect(),
            ),
        }
    }

    /// Decode little-endian raw contents
    ///
    /// BYTES elements are framed by a 4-byte little-endian length prefix.
    pub fn from_raw(datatype: DataType, raw: &[u8]) -> Result<Self> {
        let Some(width) = datatype.element_size() else {
            return decode_length_prefixed(raw).map(TensorData::Bytes);
        };
        if raw.len() % width != 0 {
            return Err(ServerError::InvalidInput(format!(
                "raw content of {} bytes is not a multiple of the {} element size {}",
                raw.len(),
                datatype,
                width
            )));
        }

        let chunks = raw.chunks_exact(width);
        let data = match datatype {
            DataType::Bool => TensorData::Bool(raw.iter().map(|b| *b != 0).collect()),
            DataType::Int8 => TensorData::Int32(raw.iter().map(|b| i32::from(*b as i8)).collect()),
            DataType::Int16 => TensorData::Int32(
                chunks
                    .map(|c| i32::from(i16::from_le_bytes([c[0], c[1]])))
                    .collect(),
            ),
            DataType::Int32 => TensorData::Int32(
                chunks
                    .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Int64 => TensorData::Int64(chunks.map(|c| i64::from_le_bytes(eight(c))).collect()),
            DataType::Uint8 => TensorData::Uint32(raw.iter().map(|b| u32::from(*b)).collect()),
            DataType::Uint16 => TensorData::Uint32(
                chunks
                    .map(|c| u32::from(u16::from_le_bytes([c[0], c[1]])))
                    .collect(),
            ),
            DataType::Uint32 => TensorData::Uint32(
                chunks
                    .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Uint64 => TensorData::Uint64(chunks.map(|c| u64::from_le_bytes(eight(c))).collect()),
            DataType::Fp32 => TensorData::Fp32(
                chunks
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            DataType::Fp64 => TensorData::Fp64(chunks.map(|c| f64::from_le_bytes(eight(c))).collect()),
            DataType::Bytes => unreachable!("BYTES has no fixed element size"),
        };
        Ok(data)
    }
}

fn eight(c: &[u8]) -> [u8; 8] {
    [c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]
}

fn decode_length_prefixed(mut raw: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    while !raw.is_empty() {
        if raw.len() < 4 {
            return Err(ServerError::InvalidInput(
                "truncated BYTES length prefix".to_string(),
            ));
        }
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        raw = &raw[4..];
        if raw.len() < len {
            return Err(ServerError::InvalidInput(
                "BYTES element exceeds raw content".to_string(),
            ));
        }
        out.push(raw[..len].to_vec());
        raw = &raw[len..];
    }
    Ok(out)
}

fn flatten_json<'a>(value: &'a Value, out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => items.iter().for_each(|v| flatten_json(v, out)),
        other => out.push(other),
    }
}

impl Serialize for TensorData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Wire shape of a tensor before its data is typed by `datatype`
#[derive(Deserialize)]
struct RawTensor {
    name: String,
    shape: Vec<i64>,
    datatype: DataType,
    #[serde(default)]
    parameters: HashMap<String, Value>,
    data: Value,
}

/// Named input tensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTensor")]
pub struct InferInput {
    pub name: String,
    pub shape: Vec<i64>,
    pub datatype: DataType,
    pub data: TensorData,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,
}

impl TryFrom<RawTensor> for InferInput {
    type Error = ServerError;

    fn try_from(raw: RawTensor) -> Result<Self> {
        let data = TensorData::from_json(raw.datatype, &raw.data)?;
        let input = InferInput {
            name: raw.name,
            shape: raw.shape,
            datatype: raw.datatype,
            data,
            parameters: raw.parameters,
        };
        Ok(input)
    }
}

impl InferInput {
    pub fn new(name: impl Into<String>, shape: Vec<i64>, data: TensorData) -> Self {
        let datatype = default_datatype(&data);
        Self {
            name: name.into(),
            shape,
            datatype,
            data,
            parameters: HashMap::new(),
        }
    }

    /// Check datatype/content agreement and that the shape matches the
    /// element count
    pub fn validate(&self) -> Result<()> {
        validate_tensor(&self.name, &self.shape, self.datatype, &self.data)
    }
}

/// Named output tensor
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferOutput {
    pub name: String,
    pub shape: Vec<i64>,
    pub datatype: DataType,
    pub data: TensorData,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,
}

impl InferOutput {
    pub fn new(name: impl Into<String>, shape: Vec<i64>, data: TensorData) -> Self {
        let datatype = default_datatype(&data);
        Self {
            name: name.into(),
            shape,
            datatype,
            data,
            parameters: HashMap::new(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_tensor(&self.name, &self.shape, self.datatype, &self.data)
    }
}

fn default_datatype(data: &TensorData) -> DataType {
    match data {
        TensorData::Bool(_) => DataType::Bool,
        TensorData::Int32(_) => DataType::Int32,
        TensorData::Int64(_) => DataType::Int64,
        TensorData::Uint32(_) => DataType::Uint32,
        TensorData::Uint64(_) => DataType::Uint64,
        TensorData::Fp32(_) => DataType::Fp32,
        TensorData::Fp64(_) => DataType::Fp64,
        TensorData::Bytes(_) => DataType::Bytes,
    }
}

fn validate_tensor(name: &str, shape: &[i64], datatype: DataType, data: &TensorData) -> Result<()> {
    if !data.matches(datatype) {
        return Err(ServerError::InvalidInput(format!(
            "tensor {} declares {} but carries different contents",
            name, datatype
        )));
    }
    if shape.iter().any(|d| *d < 0) {
        return Err(ServerError::InvalidInput(format!(
            "tensor {} has a negative dimension in shape {:?}",
            name, shape
        )));
    }
    let expected = shape
        .iter()
        .try_fold(1i64, |acc, d| acc.checked_mul(*d))
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            ServerError::InvalidInput(format!(
                "tensor {} has shape {:?} whose element count overflows",
                name, shape
            ))
        })?;
    if expected != data.len() {
        return Err(ServerError::InvalidInput(format!(
            "tensor {} has shape {:?} ({} elements) but {} elements of data",
            name,
            shape,
            expected,
            data.len()
        )));
    }
    Ok(())
}

/// Inference request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Filled from the route or RPC, not from the body
    #[serde(default)]
    pub model_name: String,
    pub inputs: Vec<InferInput>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,
}

impl InferRequest {
    pub fn new(model_name: impl Into<String>, inputs: Vec<InferInput>) -> Self {
        Self {
            id: None,
            model_name: model_name.into(),
            inputs,
            parameters: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(ServerError::InvalidInput(
                "request carries no inputs".to_string(),
            ));
        }
        self.inputs.iter().try_for_each(InferInput::validate)
    }
}

/// Inference response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferResponse {
    pub id: String,
    pub model_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub outputs: Vec<InferOutput>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,
}

impl InferResponse {
    /// Build a response, generating an id when the request had none
    pub fn new(model_name: impl Into<String>, id: Option<String>, outputs: Vec<InferOutput>) -> Self {
        Self {
            id: id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            model_name: model_name.into(),
            model_version: None,
            outputs,
            parameters: HashMap::new(),
        }
    }
}
