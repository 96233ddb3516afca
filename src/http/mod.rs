pub mod orderedheaders;
pub mod rawresponse;
pub mod requestbody;
pub mod response;

// Re-exports for convenience
pub use orderedheaders::{OrderedHeaderMap, ResponseHeaders};
pub use rawresponse::{RawExchange, ResponseBlob};
pub use requestbody::RequestBody;
pub use response::{HttpResponse, TextErrors};
