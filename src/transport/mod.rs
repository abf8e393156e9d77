mod http_transport;

pub use http_transport::{credential_header, HttpTransport};
