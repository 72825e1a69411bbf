//! HTTP request handlers for partwise server

use std::convert::Infallible;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Body;
use hyper::header::{
    HeaderMap, HeaderValue, ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, LOCATION, SERVER,
};
use hyper::{Method, Request, Response, StatusCode};
use partwise_core::{ObjectKey, UploadError, UploadErrorKind};
use partwise_engine::{ObjectStore, Uploader};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::io::StreamReader;
use tracing::{debug, error, info, warn};

pub type ResponseBody = Full<Bytes>;

/// Orchestrator shared by every connection
pub type SharedUploader = Arc<Uploader<Arc<dyn ObjectStore>>>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Field carrying the file in `multipart/form-data` uploads
pub const FILE_FIELD: &str = "file";

/// Where browser form uploads land after success
pub const CONFIRMATION_PATH: &str = "/confirmation";

const UPLOAD_PAGE: &str = include_str!("../static/upload.html");
const CONFIRMATION_PAGE: &str = include_str!("../static/confirmation.html");

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Upload(err) => match err.kind() {
                UploadErrorKind::Read | UploadErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
                UploadErrorKind::InvalidState => StatusCode::CONFLICT,
                UploadErrorKind::Initiation
                | UploadErrorKind::PartUpload
                | UploadErrorKind::Completion
                | UploadErrorKind::Abort => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::NotFound => "not_found",
            ApiError::Upload(err) => match err.kind() {
                UploadErrorKind::Initiation => "initiation",
                UploadErrorKind::Read => "read",
                UploadErrorKind::PartUpload => "part_upload",
                UploadErrorKind::Completion => "completion",
                UploadErrorKind::Abort => "abort",
                UploadErrorKind::InvalidState => "invalid_state",
                UploadErrorKind::InvalidInput => "invalid_input",
            },
        }
    }

    fn into_response(self) -> Response<ResponseBody> {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Upload request failed");
        } else {
            warn!(error = %self, "Upload request rejected");
        }

        json_response(
            status,
            &json!({
                "error": self.to_string(),
                "kind": self.kind(),
            }),
        )
    }
}

/// Main request handler
pub async fn handle_request<B>(
    req: Request<B>,
    uploader: SharedUploader,
) -> Result<Response<ResponseBody>, Infallible>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    debug!("Handling {} {}", method, path);

    let result = match (&method, path.as_str()) {
        (&Method::GET, "/") => Ok(html_response(UPLOAD_PAGE)),
        (&Method::GET, CONFIRMATION_PATH) => Ok(html_response(CONFIRMATION_PAGE)),
        (&Method::GET, "/health") => Ok(handle_health(&uploader)),
        (&Method::POST, "/upload") => handle_form_upload(req, &uploader).await,
        (&Method::PUT, p) if p.starts_with("/objects/") => {
            handle_put_object(req, &uploader, &p["/objects/".len()..]).await
        }
        _ => Err(ApiError::NotFound),
    };

    let response = result.unwrap_or_else(ApiError::into_response);
    info!("{} {} -> {}", method, path, response.status());
    Ok(response)
}

fn handle_health(uploader: &SharedUploader) -> Response<ResponseBody> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "service": "partwise",
            "part_size": uploader.config().part_size,
        }),
    )
}

/// `POST /upload`: the `file` field of a form, stored under its file name.
///
/// Browsers get a `303 See Other` to the confirmation page, API clients the
/// JSON object reference.
async fn handle_form_upload<B>(
    req: Request<B>,
    uploader: &SharedUploader,
) -> Result<Response<ResponseBody>, ApiError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let wants_html = prefers_html(req.headers());
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let boundary = multer::parse_boundary(content_type).map_err(|e| {
        ApiError::BadRequest(format!("Expected multipart/form-data with boundary: {}", e))
    })?;

    let mut multipart = multer::Multipart::new(req.into_body().into_data_stream(), boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to parse multipart field: {}", e)))?
    {
        // Other fields are skipped unread
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("File field has no file name".into()))?;
        let key = ObjectKey::new(&file_name)?;

        debug!(key = %key, "Streaming form upload");
        let source = StreamReader::new(Box::pin(field.map_err(io::Error::other)));
        let reference = uploader.upload_stream(source, key).await?;

        if wants_html {
            info!(key = %reference.key, "Form upload stored, redirecting to confirmation");
            return Ok(see_other(CONFIRMATION_PATH));
        }
        return Ok(json_response(StatusCode::CREATED, &reference));
    }

    Err(ApiError::BadRequest(format!(
        "Missing multipart file field '{}'",
        FILE_FIELD
    )))
}

/// `PUT /objects/{key}`: the raw request body, stored under the
/// percent-decoded path.
///
/// `Content-Length`, when present, is the declared size; chunked bodies are
/// read to the end.
async fn handle_put_object<B>(
    req: Request<B>,
    uploader: &SharedUploader,
    raw_key: &str,
) -> Result<Response<ResponseBody>, ApiError>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    let decoded = percent_decode_str(raw_key)
        .decode_utf8()
        .map_err(|_| ApiError::BadRequest("Object key is not valid UTF-8".into()))?;
    let key = ObjectKey::new(&decoded)?;
    let declared_size = content_length(&req)?;

    let body = req.into_body().into_data_stream().map_err(io::Error::other);
    let source = StreamReader::new(Box::pin(body));

    let reference = match declared_size {
        Some(size) => uploader.upload(source, size, key).await?,
        None => uploader.upload_stream(source, key).await?,
    };

    Ok(json_response(StatusCode::CREATED, &reference))
}

fn content_length<B>(req: &Request<B>) -> Result<Option<u64>, ApiError> {
    let Some(value) = req.headers().get(CONTENT_LENGTH) else {
        return Ok(None);
    };

    value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Some)
        .ok_or_else(|| ApiError::BadRequest("Invalid Content-Length header".into()))
}

/// Whether the client asked for HTML, as browsers submitting a form do
fn prefers_html(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn html_response(page: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::from_static(page.as_bytes())));
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(SERVER, server_header());
    response
}

fn see_other(location: &'static str) -> Response<ResponseBody> {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SEE_OTHER;
    let headers = response.headers_mut();
    headers.insert(LOCATION, HeaderValue::from_static(location));
    headers.insert(SERVER, server_header());
    response
}

fn server_header() -> HeaderValue {
    HeaderValue::from_static(concat!("partwise/", env!("CARGO_PKG_VERSION")))
}

/// JSON response with the server's standard headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let (status, payload) = match serde_json::to_vec(body) {
        Ok(payload) => (status, payload),
        Err(e) => {
            error!("Failed to encode response body: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":"Internal server error"}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(payload)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(SERVER, server_header());
    response
}
