use bytes::Bytes;
use object_store::{path::Path as ObjectPath, ObjectStoreExt};
use uuid::Uuid;

use super::{core::AppState, errors::ApiError};

const MAX_OBJECT_NAME_CHARS: usize = 160;
const MAX_FILENAME_CHARS: usize = 64;

/// Store an uploaded image and return its durable public URL. Object names
/// are collision resistant: a fresh UUID prefixed to the sanitized client
/// filename.
pub(crate) async fn store_image(
    state: &AppState,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<String, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::ImageRequired);
    }
    if bytes.len() > state.runtime.max_image_bytes {
        return Err(ApiError::PayloadTooLarge);
    }

    let object_name = unique_image_name(filename);
    let path = ObjectPath::from(object_name.clone());
    state
        .image_store
        .put(&path, Bytes::from(bytes).into())
        .await
        .map_err(|error| {
            tracing::error!(event = "image.store", %object_name, %error);
            ApiError::Internal
        })?;

    Ok(format!(
        "{}/images/{object_name}",
        state.runtime.public_base_url
    ))
}

/// Fetch stored image bytes with a sniffed content type for the
/// `/images/{name}` route.
pub(crate) async fn load_image(
    state: &AppState,
    object_name: &str,
) -> Result<(Vec<u8>, String), ApiError> {
    if !is_valid_object_name(object_name) {
        return Err(ApiError::NotFound);
    }

    let path = ObjectPath::from(object_name.to_owned());
    let result = state
        .image_store
        .get(&path)
        .await
        .map_err(|_| ApiError::NotFound)?;
    let bytes = result.bytes().await.map_err(|_| ApiError::Internal)?;

    let content_type = infer::get(&bytes).map_or_else(
        || mime::APPLICATION_OCTET_STREAM.to_string(),
        |kind| kind.mime_type().to_owned(),
    );
    Ok((bytes.to_vec(), content_type))
}

pub(crate) fn unique_image_name(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(MAX_FILENAME_CHARS)
        .collect();
    let sanitized = sanitized.trim_matches('.');
    let sanitized = if sanitized.is_empty() { "image" } else { sanitized };
    format!("{}_{sanitized}", Uuid::new_v4())
}

fn is_valid_object_name(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_OBJECT_NAME_CHARS
        && !value.starts_with('.')
        && !value.contains("..")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

#[cfg(test)]
mod tests {
    use super::{is_valid_object_name, unique_image_name};

    #[test]
    fn object_names_are_unique_and_sanitized() {
        let first = unique_image_name("logo.png");
        let second = unique_image_name("logo.png");
        assert_ne!(first, second);
        assert!(first.ends_with("_logo.png"));

        let hostile = unique_image_name("../../etc/passwd");
        assert!(!hostile.contains('/'));
        assert!(hostile.ends_with("_etcpasswd"));

        let empty = unique_image_name("§§§");
        assert!(empty.ends_with("_image"));
    }

    #[test]
    fn object_name_validation_rejects_traversal() {
        assert!(is_valid_object_name("abc123_logo.png"));
        assert!(!is_valid_object_name(""));
        assert!(!is_valid_object_name("a/b.png"));
        assert!(!is_valid_object_name("..secret"));
        assert!(!is_valid_object_name(&"x".repeat(200)));
    }
}
