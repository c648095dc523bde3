use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use data_url::DataUrl;

use super::GridError;

/// Encode bytes as a `data:<mime>;base64,...` URI
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// Decode a data URI into its `type/subtype` and payload.
///
/// Parsing follows the WHATWG data: URL rules, so unpadded or line-wrapped
/// base64 and percent-encoded bodies are accepted.
pub fn decode(uri: &str) -> Result<(String, Vec<u8>), GridError> {
    let fail = |reason: String| GridError::FileReadFailure {
        origin: "data URI".to_string(),
        reason,
    };

    let url = DataUrl::process(uri).map_err(|e| fail(format!("{:?}", e)))?;
    let mime = url.mime_type();
    let mime = format!("{}/{}", mime.type_, mime.subtype);

    let (bytes, _) = url
        .decode_to_vec()
        .map_err(|e| fail(format!("invalid base64 ({:?})", e)))?;

    Ok((mime, bytes))
}
