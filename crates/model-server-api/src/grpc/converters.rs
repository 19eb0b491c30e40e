//! Type converters between protobuf and domain types
//!
//! This module provides conversion functions between the generated protobuf
//! messages of the inference service and the core tensor types.

use super::proto::{
    self, infer_parameter::ParameterChoice, model_infer_request::InferInputTensor,
    model_infer_response::InferOutputTensor, model_metadata_response,
};
use model_server_core::{
    DataType, InferInput, InferOutput, InferRequest, InferResponse, ModelMetadata, Result,
    ServerError, TensorData, TensorMetadata,
};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Parameters
// ============================================================================

fn parameter_to_json(param: proto::InferParameter) -> Value {
    match param.parameter_choice {
        Some(ParameterChoice::BoolParam(b)) => Value::Bool(b),
        Some(ParameterChoice::Int64Param(i)) => Value::from(i),
        Some(ParameterChoice::StringParam(s)) => Value::String(s),
        Some(ParameterChoice::DoubleParam(d)) => Value::from(d),
        None => Value::Null,
    }
}

fn parameter_from_json(value: &Value) -> Option<proto::InferParameter> {
    let choice = match value {
        Value::Bool(b) => ParameterChoice::BoolParam(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ParameterChoice::Int64Param(i),
            None => ParameterChoice::DoubleParam(n.as_f64()?),
        },
        Value::String(s) => ParameterChoice::StringParam(s.clone()),
        // arrays, objects and null have no protobuf representation
        _ => return None,
    };
    Some(proto::InferParameter {
        parameter_choice: Some(choice),
    })
}

fn parameters_to_json(params: HashMap<String, proto::InferParameter>) -> HashMap<String, Value> {
    params
        .into_iter()
        .map(|(k, v)| (k, parameter_to_json(v)))
        .collect()
}

fn parameters_from_json(params: &HashMap<String, Value>) -> HashMap<String, proto::InferParameter> {
    params
        .iter()
        .filter_map(|(k, v)| parameter_from_json(v).map(|p| (k.clone(), p)))
        .collect()
}

// ============================================================================
// Tensor Contents
// ============================================================================

/// Select the typed contents field matching `datatype`
pub fn tensor_data_from_contents(
    datatype: DataType,
    contents: proto::InferTensorContents,
) -> TensorData {
    match datatype {
        DataType::Bool => TensorData::Bool(contents.bool_contents),
        DataType::Int8 | DataType::Int16 | DataType::Int32 => {
            TensorData::Int32(contents.int_contents)
        }
        DataType::Int64 => TensorData::Int64(contents.int64_contents),
        DataType::Uint8 | DataType::Uint16 | DataType::Uint32 => {
            TensorData::Uint32(contents.uint_contents)
        }
        DataType::Uint64 => TensorData::Uint64(contents.uint64_contents),
        DataType::Fp32 => TensorData::Fp32(contents.fp32_contents),
        DataType::Fp64 => TensorData::Fp64(contents.fp64_contents),
        DataType::Bytes => TensorData::Bytes(contents.bytes_contents),
    }
}

pub fn tensor_data_to_contents(data: TensorData) -> proto::InferTensorContents {
    let mut contents = proto::InferTensorContents::default();
    match data {
        TensorData::Bool(v) => contents.bool_contents = v,
        TensorData::Int32(v) => contents.int_contents = v,
        TensorData::Int64(v) => contents.int64_contents = v,
        TensorData::Uint32(v) => contents.uint_contents = v,
        TensorData::Uint64(v) => contents.uint64_contents = v,
        TensorData::Fp32(v) => contents.fp32_contents = v,
        TensorData::Fp64(v) => contents.fp64_contents = v,
        TensorData::Bytes(v) => contents.bytes_contents = v,
    }
    contents
}

// ============================================================================
// Requests and Responses
// ============================================================================

/// Convert a `ModelInferRequest` into a domain request
///
/// When `raw_input_contents` is present it must hold one entry per input and
/// takes precedence over the typed contents.
pub fn infer_request_from_proto(req: proto::ModelInferRequest) -> Result<InferRequest> {
    let use_raw = !req.raw_input_contents.is_empty();
    if use_raw && req.raw_input_contents.len() != req.inputs.len() {
        return Err(ServerError::InvalidInput(format!(
            "raw_input_contents has {} entries for {} inputs",
            req.raw_input_contents.len(),
            req.inputs.len()
        )));
    }

    let mut raw = req.raw_input_contents.into_iter();
    let inputs = req
        .inputs
        .into_iter()
        .map(|tensor: InferInputTensor| {
            let datatype: DataType = tensor.datatype.parse()?;
            let data = match raw.next() {
                Some(bytes) if use_raw => TensorData::from_raw(datatype, &bytes)?,
                _ => tensor_data_from_contents(datatype, tensor.contents.unwrap_or_default()),
            };
            Ok(InferInput {
                name: tensor.name,
                shape: tensor.shape,
                datatype,
                data,
                parameters: parameters_to_json(tensor.parameters),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(InferRequest {
        id: (!req.id.is_empty()).then_some(req.id),
        model_name: req.model_name,
        inputs,
        parameters: parameters_to_json(req.parameters),
    })
}

fn output_to_proto(output: InferOutput) -> InferOutputTensor {
    InferOutputTensor {
        name: output.name,
        datatype: output.datatype.as_str().to_string(),
        shape: output.shape,
        parameters: parameters_from_json(&output.parameters),
        contents: Some(tensor_data_to_contents(output.data)),
    }
}

pub fn infer_response_to_proto(response: InferResponse) -> proto::ModelInferResponse {
    proto::ModelInferResponse {
        model_name: response.model_name,
        model_version: response.model_version.unwrap_or_default(),
        id: response.id,
        parameters: parameters_from_json(&response.parameters),
        outputs: response.outputs.into_iter().map(output_to_proto).collect(),
        raw_output_contents: Vec::new(),
    }
}

/// Convert a `ModelInferResponse` back into a domain response (client side)
pub fn infer_response_from_proto(resp: proto::ModelInferResponse) -> Result<InferResponse> {
    let outputs = resp
        .outputs
        .into_iter()
        .map(|tensor| {
            let datatype: DataType = tensor.datatype.parse()?;
            Ok(InferOutput {
                name: tensor.name,
                shape: tensor.shape,
                datatype,
                data: tensor_data_from_contents(datatype, tensor.contents.unwrap_or_default()),
                parameters: parameters_to_json(tensor.parameters),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(InferResponse {
        id: resp.id,
        model_name: resp.model_name,
        model_version: (!resp.model_version.is_empty()).then_some(resp.model_version),
        outputs,
        parameters: parameters_to_json(resp.parameters),
    })
}

/// Convert a domain request into a `ModelInferRequest` (client side)
pub fn infer_request_to_proto(request: InferRequest) -> proto::ModelInferRequest {
    proto::ModelInferRequest {
        model_name: request.model_name,
        model_version: String::new(),
        id: request.id.unwrap_or_default(),
        parameters: parameters_from_json(&request.parameters),
        inputs: request
            .inputs
            .into_iter()
            .map(|input| InferInputTensor {
                name: input.name,
                datatype: input.datatype.as_str().to_string(),
                shape: input.shape,
                parameters: parameters_from_json(&input.parameters),
                contents: Some(tensor_data_to_contents(input.data)),
            })
            .collect(),
        outputs: Vec::new(),
        raw_input_contents: Vec::new(),
    }
}

fn tensor_metadata_to_proto(tensor: TensorMetadata) -> model_metadata_response::TensorMetadata {
    model_metadata_response::TensorMetadata {
        name: tensor.name,
        datatype: tensor.datatype.as_str().to_string(),
        shape: tensor.shape,
    }
}

impl From<ModelMetadata> for proto::ModelMetadataResponse {
    fn from(metadata: ModelMetadata) -> Self {
        proto::ModelMetadataResponse {
            name: metadata.name,
            versions: metadata.versions,
            platform: metadata.platform,
            inputs: metadata.inputs.into_iter().map(tensor_metadata_to_proto).collect(),
            outputs: metadata.outputs.into_iter().map(tensor_metadata_to_proto).collect(),
        }
    }
}
