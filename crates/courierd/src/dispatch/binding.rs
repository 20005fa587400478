//! Binds payload entries to declared operation parameters.

use std::any::Any;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

use courier_wire::document::{self, Document};

use crate::registry::{OperationDescriptor, ParamDecoder};

use super::call::BoundArguments;
use super::errors::ApiError;

const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Reads every declared parameter from `payload`.
///
/// Absent and null values are the same thing. Nullable parameters bind to
/// `None`; required ones fail with `MissingParameter`.
pub(crate) fn bind(
    descriptor: &OperationDescriptor,
    payload: Option<&Document>,
) -> Result<BoundArguments, ApiError> {
    let mut arguments = BoundArguments::default();
    for param in descriptor.params() {
        let value = payload
            .and_then(|payload| document::field(payload, param.name()))
            .filter(|value| !matches!(value, Document::Null));
        let Some(value) = value else {
            if param.is_nullable() {
                arguments.insert(param.name(), None);
                continue;
            }
            return Err(ApiError::missing_parameter(param.name(), param.type_name()));
        };
        let bound = match param.decoder() {
            ParamDecoder::Bytes => {
                decode_bytes(value).map(|bytes| Box::new(bytes) as Box<dyn Any + Send>)
            }
            ParamDecoder::Typed(decode) => decode(value),
        }
        .map_err(|detail| ApiError::invalid_parameter_format(param.name(), detail))?;
        arguments.insert(param.name(), Some(bound));
    }
    Ok(arguments)
}

/// Accepts a byte string, standard or URL-safe base64 text, or a list of
/// byte values.
fn decode_bytes(value: &Document) -> Result<Vec<u8>, String> {
    match value {
        Document::Bytes(bytes) => Ok(bytes.clone()),
        Document::Text(text) => STANDARD.decode(text).or_else(|standard| {
            URL_SAFE_LENIENT
                .decode(text)
                .map_err(|_| format!("expected base64 text: {standard}"))
        }),
        Document::Array(items) => items
            .iter()
            .map(|item| match item {
                Document::Integer(integer) => u8::try_from(i128::from(*integer))
                    .map_err(|_| format!("byte value {} is out of range", i128::from(*integer))),
                _ => Err("expected a list of byte values".to_owned()),
            })
            .collect(),
        _ => Err("expected a byte string or base64 text".to_owned()),
    }
}
