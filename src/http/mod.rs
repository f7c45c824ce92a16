pub(crate) mod response;
pub mod mock_transport;
pub mod transport;

pub use mock_transport::{MockResponse, MockTransport};
pub use response::HttpResponse;
pub use transport::{HttpTransport, ReqwestTransport};
