// URI resolution for references found inside manifests.

use url::Url;

use crate::hls::HlsError;

/// True when `uri` carries its own scheme and host
pub fn is_absolute(uri: &str) -> bool {
    Url::parse(uri).is_ok_and(|u| u.has_host())
}

/// Makes `uri` absolute relative to the manifest it was read from.
///
/// Absolute URIs are returned unchanged. Relative ones are appended to the
/// directory of the manifest path with exactly one `/` between them; the
/// manifest's query string is not carried over.
pub fn resolve(uri: &str, manifest_uri: &str) -> Result<String, HlsError> {
    let uri = uri.trim();
    if is_absolute(uri) {
        return Ok(uri.to_string());
    }

    let base = Url::parse(manifest_uri).map_err(|e| {
        HlsError::ManifestFormat(format!("Invalid manifest URL {manifest_uri}: {e}"))
    })?;
    let host = base.host_str().ok_or_else(|| {
        HlsError::ManifestFormat(format!("Manifest URL {manifest_uri} has no host"))
    })?;

    if let Some(rest) = uri.strip_prefix("//") {
        return Ok(format!("{}://{rest}", base.scheme()));
    }

    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = base.path();
    let dir = path.rfind('/').map_or("", |pos| &path[..pos]);

    Ok(format!(
        "{}://{authority}{dir}/{}",
        base.scheme(),
        uri.trim_start_matches('/')
    ))
}
