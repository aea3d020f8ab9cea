use http::StatusCode;

/// Domain errors that know how to present themselves over HTTP
///
/// Each feature crate implements this for its own error type; the server
/// and the streaming envelope render it without depending on axum.
pub trait HttpError: std::error::Error {
    /// HTTP status code for this error
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error type (e.g. `authentication_error`)
    fn error_type(&self) -> &str;

    /// Message safe to expose to API consumers
    fn client_message(&self) -> String;
}
