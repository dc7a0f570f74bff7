//! Label extraction for outgoing requests and responses.

use http::{Method, StatusCode};

/// `code` label value for calls that failed without a response.
pub const ERROR_CODE: &str = "error";

/// `event` label value on the first-byte histogram.
pub const FIRST_RESPONSE_BYTE_EVENT: &str = "got_first_response_byte";

/// A request whose HTTP method can be observed.
pub trait HttpRequest {
    fn http_method(&self) -> &Method;
}

/// A response whose HTTP status can be observed.
pub trait HttpResponse {
    fn http_status(&self) -> StatusCode;
}

impl<B> HttpRequest for http::Request<B> {
    fn http_method(&self) -> &Method {
        self.method()
    }
}

impl<B> HttpResponse for http::Response<B> {
    fn http_status(&self) -> StatusCode {
        self.status()
    }
}

impl HttpRequest for reqwest::Request {
    fn http_method(&self) -> &Method {
        self.method()
    }
}

impl HttpResponse for reqwest::Response {
    fn http_status(&self) -> StatusCode {
        self.status()
    }
}

/// Lower-cased method name, e.g. `get`.
pub fn method_label(method: &Method) -> String {
    method.as_str().to_ascii_lowercase()
}

/// Decimal status code, e.g. `404`.
pub fn code_label(status: StatusCode) -> String {
    status.as_str().to_owned()
}
