use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hpath_model::{Config, SharedParams};
use std::collections::BTreeMap;

use crate::api::{SubmissionRequest, UploadedScenario};
use crate::error::{ConfigError, SubmitError};

/// Marker separating the media type of a data URL from its payload.
const BASE64_MARKER: &str = "base64,";

/// Decode and validate one uploaded scenario.
///
/// The upload carries a TOML document of engine parameters encoded as a base64 data URL. Failing
/// to decode or parse the document is a [ConfigError::Decode] or [ConfigError::Parse], a readable
/// document with unusable values is a [ConfigError::Invalid].
pub fn parse_upload(
    upload: &UploadedScenario,
    shared: &SharedParams,
) -> Result<Config, ConfigError> {
    log::debug!(
        "Reading scenario {} from {} ({})",
        upload.sc_name,
        upload.file_name,
        upload.decode_len_str
    );

    let decode_error = |reason: String| ConfigError::Decode {
        scenario: upload.sc_name.clone(),
        file_name: upload.file_name.clone(),
        reason,
    };
    let invalid = |reason: String| ConfigError::Invalid {
        scenario: upload.sc_name.clone(),
        file_name: upload.file_name.clone(),
        reason,
    };

    let payload = match upload.file_base64.split_once(BASE64_MARKER) {
        Some((_, payload)) => payload,
        None => return Err(decode_error("the upload is not a base64 data URL".to_string())),
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|e| decode_error(format!("invalid base64 payload: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| decode_error(format!("the file is not UTF-8 text: {e}")))?;

    let table: toml::Table = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        scenario: upload.sc_name.clone(),
        file_name: upload.file_name.clone(),
        source,
    })?;

    if upload.sc_name.trim().is_empty() {
        return Err(invalid("the scenario name is empty".to_string()));
    }
    if table.is_empty() {
        return Err(invalid("the file defines no engine parameters".to_string()));
    }

    let mut params = BTreeMap::new();
    for (key, value) in table {
        check_value(&key, &value).map_err(invalid)?;
        let value = serde_json::to_value(&value)
            .map_err(|e| invalid(format!("parameter `{key}` cannot be represented: {e}")))?;
        params.insert(key, value);
    }

    let config = Config::new(
        upload.sc_name.trim().to_string(),
        upload.file_name.clone(),
        shared,
        params,
    );
    log::info!(
        "Scenario {} is valid ({} parameters, fingerprint {})",
        config.name,
        config.params.len(),
        config.fingerprint()
    );

    Ok(config)
}

/// Engine parameters are durations, counts, rates and probabilities, none of which may be
/// negative.
fn check_value(path: &str, value: &toml::Value) -> Result<(), String> {
    match value {
        toml::Value::Integer(n) if *n < 0 => Err(format!("parameter `{path}` is negative ({n})")),
        toml::Value::Float(f) if !f.is_finite() => {
            Err(format!("parameter `{path}` is not a finite number"))
        }
        toml::Value::Float(f) if *f < 0.0 => Err(format!("parameter `{path}` is negative ({f})")),
        toml::Value::Array(values) => values
            .iter()
            .enumerate()
            .try_for_each(|(i, v)| check_value(&format!("{path}[{i}]"), v)),
        toml::Value::Table(table) => table
            .iter()
            .try_for_each(|(k, v)| check_value(&format!("{path}.{k}"), v)),
        _ => Ok(()),
    }
}

/// Validate a whole submission.
///
/// Every scenario is checked on its own and every failure is reported, but a single failure
/// rejects the submission so that nothing from it is ever queued.
pub fn parse_submission(request: &SubmissionRequest) -> Result<Vec<Config>, SubmitError> {
    request.params.validate()?;
    if request.scenarios.is_empty() {
        return Err(SubmitError::Empty);
    }

    let mut configs = Vec::with_capacity(request.scenarios.len());
    let mut errors = Vec::new();
    for upload in &request.scenarios {
        match parse_upload(upload, &request.params) {
            Ok(config) => configs.push(config),
            Err(e) => {
                log::error!("{e}");
                errors.push(e);
            }
        }
    }

    if errors.is_empty() {
        Ok(configs)
    } else {
        Err(SubmitError::Config(errors))
    }
}

/// Encode a document as the data URL a browser upload produces.
pub fn to_data_url(contents: &str) -> String {
    format!("data:application/toml;{BASE64_MARKER}{}", BASE64.encode(contents))
}
