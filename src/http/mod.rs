pub mod client;
pub mod error;
pub mod interceptor;
pub mod method;
pub mod request;
pub mod response;
pub mod transport;

pub use client::{ClientDefaults, HttpClient, build_url};
pub use error::{RequestError, TransportError};
pub use interceptor::{DefaultHeaders, LogRequests, LogResponses, RequestInterceptor, ResponseInterceptor};
pub use method::HttpMethod;
pub use request::{
    FormPart, FormValue, Headers, Params, RequestBody, RequestConfig, merge_headers, set_header,
};
pub use response::{RequestResult, ResponseData};
pub use transport::{OutgoingBody, ReqwestTransport, Transport, TransportRequest, TransportResponse};
