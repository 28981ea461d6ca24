pub mod error;
pub mod event;
pub mod fetch;
pub mod observation;
pub mod timing;

pub use error::InterceptError;
pub use event::{
    EventListener, EventRequest, EventTransport, InterceptedEventRequest, InterceptedEvents,
    ReqwestEventRequest, ReqwestEventTransport, RequestEvent,
};
pub use fetch::{
    FetchRequest, FetchTransport, HasStatus, InterceptedFetch, RequestOptions, ReqwestTransport,
};
pub use observation::{DEFAULT_METHOD, Observation, ObservationSink, SourceKind};
pub use timing::{
    BatchCallback, NoTimingFeed, ObserverHandle, ResourceTimingCollector, ResourceTimingEntry,
    ResourceTimingFeed, TimingBuffer,
};
