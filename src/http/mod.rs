//! HTTP frontend: incremental parser, Basic-auth gate, response builder,
//! and the connection acceptor.

pub mod auth;
pub mod parser;
pub mod response;
pub mod server;

pub use auth::{AuthDecision, BasicCredentials, check_basic_auth};
pub use parser::{
    HttpParseError, HttpParser, HttpRequest, MAX_CONTENT_LENGTH, MAX_HEADER_LINE, ParseStatus,
};
pub use response::{HttpResponse, ResponseBody, ResponseBuilder, SOAP_CONTENT_TYPE};
pub use server::{HttpServer, HttpServerConfig, MAX_WORKERS, RECV_TIMEOUT, ServerState};
