//! Embedded client asset serving.

use axum::{
    body::Body,
    extract::Path,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use include_dir::{Dir, include_dir};

static CLIENT_ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Serve an embedded client asset (the reconciler script).
pub async fn serve(Path(path): Path<String>) -> Response {
    let Some(file) = CLIENT_ASSETS.get_file(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from(Bytes::from_static(file.contents())),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciler_script_is_embedded() {
        let file = CLIENT_ASSETS
            .get_file("ajax_load.js")
            .expect("ajax_load.js bundled");
        let source = file.contents_utf8().expect("utf8 script");
        assert!(source.contains("ajax-load-insertions"));
        assert!(source.contains("ajax_load_insertions"));
    }
}
