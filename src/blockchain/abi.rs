//! ABI binding: parse JSON ABIs, coerce loosely typed parameters, encode
//! calls and constructor arguments, decode return values.
//!
//! Parameters arrive as `{type, value}` pairs with string values. Integers
//! are decimal or `0x`-hex and must fit their declared width. Byte strings
//! are `0x`-hex or base64 (padding optional); hex always needs the prefix,
//! and unprefixed input made only of hex digits is refused as ambiguous.
//! Arrays and tuples are JSON arrays.

use alloy::dyn_abi::{DynSolType, DynSolValue, FunctionExt, JsonAbiExt, Specifier};
use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::{Address, B256, I256, U256};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AbiError {
    #[error("Invalid ABI: {0}")]
    Parse(String),

    #[error("ABI is required for this operation")]
    MissingAbi,

    #[error("Method '{0}' not found in ABI")]
    UnknownMethod(String),

    #[error("Method '{method}' expects {expected} params, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("Param {index} ({ty}): {message}")]
    InvalidParam {
        index: usize,
        ty: String,
        message: String,
    },

    #[error("Invalid binary field '{field}': {message}")]
    InvalidBinary { field: &'static str, message: String },

    #[error("ABI encoding failed: {0}")]
    Encode(String),

    #[error("ABI decoding failed: {0}")]
    Decode(String),
}

pub type AbiResult<T> = Result<T, AbiError>;

/// One positional argument as supplied by callers and the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub value: Value,
}

/// Parse a JSON ABI given as plain JSON or base64-encoded JSON.
pub fn parse_abi(raw: &str) -> AbiResult<JsonAbi> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AbiError::MissingAbi);
    }
    match serde_json::from_str::<JsonAbi>(raw) {
        Ok(abi) => Ok(abi),
        Err(json_err) => {
            let decoded = decode_base64(raw).map_err(|_| AbiError::Parse(json_err.to_string()))?;
            serde_json::from_slice::<JsonAbi>(&decoded).map_err(|e| AbiError::Parse(e.to_string()))
        }
    }
}

/// Decode a binary field given as `0x`-hex or base64.
pub fn decode_binary(field: &'static str, raw: &str) -> AbiResult<Vec<u8>> {
    let raw = raw.trim();
    let result = if raw.starts_with("0x") || raw.starts_with("0X") {
        hex::decode(&raw[2..]).map_err(|e| e.to_string())
    } else if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        Err(format!(
            "'{}' reads as both hex and base64; prefix hex with 0x or pad base64 with '='",
            raw
        ))
    } else {
        decode_base64(raw)
    };
    result.map_err(|message| AbiError::InvalidBinary { field, message })
}

/// Decode contract bytecode (hex, `0x` optional).
pub fn decode_bytecode(raw: &str) -> AbiResult<Vec<u8>> {
    let raw = raw.trim();
    let body = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    if body.is_empty() {
        return Err(AbiError::InvalidBinary {
            field: "byteCode",
            message: "empty bytecode".into(),
        });
    }
    hex::decode(body).map_err(|e| AbiError::InvalidBinary {
        field: "byteCode",
        message: e.to_string(),
    })
}

fn decode_base64(raw: &str) -> Result<Vec<u8>, String> {
    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(raw.trim_end_matches('='))
        .map_err(|e| e.to_string())
}

/// Find the overload of `method` taking `arity` inputs.
pub fn find_function<'a>(abi: &'a JsonAbi, method: &str, arity: usize) -> AbiResult<&'a Function> {
    let overloads = abi
        .function(method)
        .ok_or_else(|| AbiError::UnknownMethod(method.to_string()))?;
    overloads
        .iter()
        .find(|f| f.inputs.len() == arity)
        .ok_or_else(|| AbiError::ArgumentCount {
            method: method.to_string(),
            expected: overloads[0].inputs.len(),
            actual: arity,
        })
}

/// Selector plus encoded arguments for `method(params...)`.
pub fn encode_call(abi: &JsonAbi, method: &str, params: &[AbiParam]) -> AbiResult<(Function, Vec<u8>)> {
    let function = find_function(abi, method, params.len())?;
    let values = coerce_inputs(
        function.inputs.iter().map(|p| p.resolve()),
        params,
    )?;
    let data = function
        .abi_encode_input(&values)
        .map_err(|e| AbiError::Encode(e.to_string()))?;
    Ok((function.clone(), data))
}

/// Bytecode followed by the encoded constructor arguments.
pub fn encode_deploy(abi: &JsonAbi, bytecode: &str, params: &[AbiParam]) -> AbiResult<Vec<u8>> {
    let mut code = decode_bytecode(bytecode)?;
    match abi.constructor() {
        Some(constructor) => {
            if constructor.inputs.len() != params.len() {
                return Err(AbiError::ArgumentCount {
                    method: "constructor".into(),
                    expected: constructor.inputs.len(),
                    actual: params.len(),
                });
            }
            let values = coerce_inputs(constructor.inputs.iter().map(|p| p.resolve()), params)?;
            let args = constructor
                .abi_encode_input(&values)
                .map_err(|e| AbiError::Encode(e.to_string()))?;
            code.extend_from_slice(&args);
        }
        None if !params.is_empty() => {
            return Err(AbiError::ArgumentCount {
                method: "constructor".into(),
                expected: 0,
                actual: params.len(),
            })
        }
        None => {}
    }
    Ok(code)
}

/// Decode `eth_call` return data to JSON. One output yields a bare value,
/// several yield an array.
pub fn decode_output(function: &Function, data: &[u8]) -> AbiResult<Value> {
    let values = function
        .abi_decode_output(data)
        .map_err(|e| AbiError::Decode(e.to_string()))?;
    let mut json: Vec<Value> = values.iter().map(to_json).collect();
    Ok(if json.len() == 1 {
        json.remove(0)
    } else {
        Value::Array(json)
    })
}

fn coerce_inputs<I, E>(types: I, params: &[AbiParam]) -> AbiResult<Vec<DynSolValue>>
where
    I: Iterator<Item = Result<DynSolType, E>>,
    E: std::fmt::Display,
{
    types
        .zip(params)
        .enumerate()
        .map(|(index, (ty, param))| {
            let ty = ty.map_err(|e| AbiError::InvalidParam {
                index,
                ty: param.ty.clone(),
                message: e.to_string(),
            })?;
            coerce_value(&ty, &param.value).map_err(|message| AbiError::InvalidParam {
                index,
                ty: ty.sol_type_name().into_owned(),
                message,
            })
        })
        .collect()
}

/// Convert a loosely typed JSON value into a Solidity value of type `ty`.
pub fn coerce_value(ty: &DynSolType, value: &Value) -> Result<DynSolValue, String> {
    match ty {
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(DynSolValue::Bool(true)),
                "false" | "0" => Ok(DynSolValue::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            other => Err(format!("expected boolean, got {}", other)),
        },
        DynSolType::Uint(bits) => {
            let text = scalar_text(value)?;
            let n = text
                .parse::<U256>()
                .map_err(|e| format!("'{}' is not an unsigned integer: {}", text, e))?;
            if n.bit_len() > *bits {
                return Err(format!("{} does not fit uint{}", n, bits));
            }
            Ok(DynSolValue::Uint(n, *bits))
        }
        DynSolType::Int(bits) => {
            let text = scalar_text(value)?;
            let n = parse_signed(&text)?;
            if !fits_signed(n, *bits) {
                return Err(format!("{} does not fit int{}", n, bits));
            }
            Ok(DynSolValue::Int(n, *bits))
        }
        DynSolType::Address => {
            let text = scalar_text(value)?;
            let address = text
                .parse::<Address>()
                .map_err(|e| format!("'{}' is not an address: {}", text, e))?;
            Ok(DynSolValue::Address(address))
        }
        DynSolType::String => Ok(DynSolValue::String(scalar_text(value)?)),
        DynSolType::Bytes => {
            let bytes = decode_binary("value", &scalar_text(value)?).map_err(|e| e.to_string())?;
            Ok(DynSolValue::Bytes(bytes))
        }
        DynSolType::FixedBytes(size) => {
            let bytes = decode_binary("value", &scalar_text(value)?).map_err(|e| e.to_string())?;
            if bytes.len() > *size {
                return Err(format!("{} bytes do not fit bytes{}", bytes.len(), size));
            }
            let mut word = B256::ZERO;
            word[..bytes.len()].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Array(inner) => {
            let items = array_items(value)?;
            let values = items
                .iter()
                .map(|item| coerce_value(inner, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Array(values))
        }
        DynSolType::FixedArray(inner, len) => {
            let items = array_items(value)?;
            if items.len() != *len {
                return Err(format!("expected {} elements, got {}", len, items.len()));
            }
            let values = items
                .iter()
                .map(|item| coerce_value(inner, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::FixedArray(values))
        }
        DynSolType::Tuple(components) => {
            let items = array_items(value)?;
            if items.len() != components.len() {
                return Err(format!(
                    "expected {} tuple fields, got {}",
                    components.len(),
                    items.len()
                ));
            }
            let values = components
                .iter()
                .zip(&items)
                .map(|(ty, item)| coerce_value(ty, item))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DynSolValue::Tuple(values))
        }
        other => ty_fallback(other, value),
    }
}

fn ty_fallback(ty: &DynSolType, value: &Value) -> Result<DynSolValue, String> {
    let text = scalar_text(value)?;
    ty.coerce_str(&text).map_err(|e| e.to_string())
}

fn scalar_text(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Err("missing value".into()),
        other => Err(format!("expected a scalar, got {}", other)),
    }
}

/// Arrays may be given as JSON arrays or as a string holding a JSON array.
fn array_items(value: &Value) -> Result<Vec<Value>, String> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(format!("'{}' is not a JSON array", s)),
        },
        other => Err(format!("expected an array, got {}", other)),
    }
}

fn parse_signed(text: &str) -> Result<I256, String> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = digits
        .parse::<U256>()
        .map_err(|e| format!("'{}' is not an integer: {}", text, e))?;
    let n = I256::try_from(magnitude).map_err(|e| format!("'{}' overflows int256: {}", text, e))?;
    Ok(if negative { -n } else { n })
}

/// Two's-complement range check: -2^(bits-1) <= n < 2^(bits-1).
fn fits_signed(n: I256, bits: usize) -> bool {
    if bits == 0 || bits >= 256 {
        return bits == 256;
    }
    let limit = U256::from(1u8) << (bits - 1);
    let magnitude = n.unsigned_abs();
    if n.is_negative() {
        magnitude <= limit
    } else {
        magnitude < limit
    }
}

/// Render a decoded value as JSON. Integers become decimal strings.
pub fn to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Int(n, _) => Value::String(n.to_string()),
        DynSolValue::Uint(n, _) => Value::String(n.to_string()),
        DynSolValue::Address(a) => Value::String(a.to_checksum(None)),
        DynSolValue::FixedBytes(word, size) => Value::String(format!("0x{}", hex::encode(&word[..*size]))),
        DynSolValue::Bytes(bytes) => Value::String(format!("0x{}", hex::encode(bytes))),
        DynSolValue::String(s) => Value::String(s.clone()),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(to_json).collect())
        }
        other => Value::String(format!("0x{}", hex::encode(other.abi_encode()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORAGE_ABI: &str = r#"[
        {"type":"constructor","inputs":[{"name":"initial","type":"uint256"}],"stateMutability":"nonpayable"},
        {"type":"function","name":"store","inputs":[{"name":"num","type":"uint256"}],"outputs":[],"stateMutability":"nonpayable"},
        {"type":"function","name":"retrieve","inputs":[],"outputs":[{"name":"","type":"uint256"}],"stateMutability":"view"},
        {"type":"function","name":"tag","inputs":[{"name":"id","type":"bytes32"},{"name":"who","type":"address"},{"name":"flags","type":"bool[]"}],"outputs":[],"stateMutability":"nonpayable"}
    ]"#;

    fn param(ty: &str, value: Value) -> AbiParam {
        AbiParam { ty: ty.into(), value }
    }

    #[test]
    fn test_parse_abi_plain_and_base64() {
        let plain = parse_abi(STORAGE_ABI).unwrap();
        let encoded = base64::engine::general_purpose::STANDARD.encode(STORAGE_ABI);
        let decoded = parse_abi(&encoded).unwrap();
        assert_eq!(plain, decoded);
        assert!(matches!(parse_abi("  "), Err(AbiError::MissingAbi)));
        assert!(matches!(parse_abi("{nope"), Err(AbiError::Parse(_))));
    }

    #[test]
    fn test_encode_call_selector_and_args() {
        let abi = parse_abi(STORAGE_ABI).unwrap();
        let (_, data) = encode_call(&abi, "store", &[param("uint256", Value::from("42"))]).unwrap();
        // store(uint256)
        assert_eq!(&data[..4], &hex::decode("6057361d").unwrap()[..]);
        assert_eq!(data.len(), 36);
        assert_eq!(data[35], 42);
    }

    #[test]
    fn test_encode_call_errors() {
        let abi = parse_abi(STORAGE_ABI).unwrap();
        assert!(matches!(
            encode_call(&abi, "missing", &[]),
            Err(AbiError::UnknownMethod(_))
        ));
        assert!(matches!(
            encode_call(&abi, "store", &[]),
            Err(AbiError::ArgumentCount { expected: 1, actual: 0, .. })
        ));
        assert!(matches!(
            encode_call(&abi, "store", &[param("uint256", Value::from("abc"))]),
            Err(AbiError::InvalidParam { index: 0, .. })
        ));
    }

    #[test]
    fn test_coerce_mixed_params() {
        let abi = parse_abi(STORAGE_ABI).unwrap();
        let id = base64::engine::general_purpose::STANDARD_NO_PAD.encode([7u8; 4]);
        let params = [
            param("bytes32", Value::from(id)),
            param("address", Value::from("0x000000000000000000000000000000000000dEaD")),
            param("bool[]", serde_json::json!(["true", false])),
        ];
        let (_, data) = encode_call(&abi, "tag", &params).unwrap();
        assert_eq!(&data[4..8], &[7, 7, 7, 7]);
        assert_eq!(&data[8..36], &[0u8; 28]);
    }

    #[test]
    fn test_encode_deploy_appends_constructor_args() {
        let abi = parse_abi(STORAGE_ABI).unwrap();
        let code = encode_deploy(&abi, "0x6080", &[param("uint256", Value::from(5))]).unwrap();
        assert_eq!(&code[..2], &[0x60, 0x80]);
        assert_eq!(code.len(), 2 + 32);
        assert_eq!(code[33], 5);

        assert!(matches!(
            encode_deploy(&abi, "0x6080", &[]),
            Err(AbiError::ArgumentCount { .. })
        ));
        assert!(matches!(
            encode_deploy(&abi, "zz", &[param("uint256", Value::from(5))]),
            Err(AbiError::InvalidBinary { field: "byteCode", .. })
        ));
    }

    #[test]
    fn test_decode_output() {
        let abi = parse_abi(STORAGE_ABI).unwrap();
        let function = find_function(&abi, "retrieve", 0).unwrap();
        let mut data = [0u8; 32];
        data[31] = 9;
        assert_eq!(decode_output(function, &data).unwrap(), Value::from("9"));
        assert!(decode_output(function, &[1, 2]).is_err());
    }

    #[test]
    fn test_signed_and_binary_helpers() {
        assert_eq!(
            coerce_value(&DynSolType::Int(256), &Value::from("-3")).unwrap(),
            DynSolValue::Int(I256::from_dec_str("-3").unwrap(), 256)
        );
        assert_eq!(decode_binary("data", "0x0102").unwrap(), vec![1, 2]);
        assert_eq!(decode_binary("data", "AQI=").unwrap(), vec![1, 2]);
        assert_eq!(decode_binary("data", "AQI").unwrap(), vec![1, 2]);
        assert!(decode_binary("data", "0xzz").is_err());
    }

    #[test]
    fn test_unprefixed_hex_is_ambiguous() {
        assert!(matches!(
            decode_binary("data", "abcd"),
            Err(AbiError::InvalidBinary { field: "data", .. })
        ));
        assert!(decode_binary("data", "0102").is_err());
        assert_eq!(decode_binary("data", "0xabcd").unwrap(), vec![0xab, 0xcd]);
        // Padding disambiguates base64 made of hex-looking characters.
        assert_eq!(decode_binary("data", "ABCD==").unwrap().len(), 3);
        assert!(decode_binary("data", "").unwrap().is_empty());
    }

    #[test]
    fn test_integers_must_fit_declared_width() {
        let uint = |bits, v: &str| coerce_value(&DynSolType::Uint(bits), &Value::from(v));
        let int = |bits, v: &str| coerce_value(&DynSolType::Int(bits), &Value::from(v));

        assert!(uint(8, "255").is_ok());
        assert!(uint(8, "300").unwrap_err().contains("does not fit uint8"));
        assert!(uint(256, "0xffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff").is_ok());

        assert!(int(8, "127").is_ok());
        assert!(int(8, "-128").is_ok());
        assert!(int(8, "128").unwrap_err().contains("does not fit int8"));
        assert!(int(8, "-129").is_err());
        assert!(int(256, "-3").is_ok());

        let abi = parse_abi(STORAGE_ABI).unwrap();
        let small = r#"[{"type":"function","name":"set","inputs":[{"name":"v","type":"uint8"}],"outputs":[],"stateMutability":"nonpayable"}]"#;
        let small = parse_abi(small).unwrap();
        assert!(matches!(
            encode_call(&small, "set", &[param("uint8", Value::from("300"))]),
            Err(AbiError::InvalidParam { index: 0, .. })
        ));
        assert!(encode_call(&abi, "store", &[param("uint256", Value::from("300"))]).is_ok());
    }
}
