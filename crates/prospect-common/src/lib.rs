pub mod fs_utils;
pub mod http;
pub mod testing;

pub use http::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};
