// Event-style request interface (open, listen, send) and its interception
// decorator.

use crate::fetch::ReqwestTransport;
use crate::observation::{DEFAULT_METHOD, Observation, ObservationSink, SourceKind};
use reqwest::Client;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Completion event fired at the end of an event-style call.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestEvent {
    /// The call completed with a response; `status` is the final status.
    Load { status: u16 },
    /// The call failed at the transport level.
    Error { message: Option<String> },
}

impl RequestEvent {
    /// Final status carried by the event, 0 for failures.
    pub fn status(&self) -> u16 {
        match self {
            RequestEvent::Load { status } => *status,
            RequestEvent::Error { .. } => 0,
        }
    }
}

pub type EventListener = Box<dyn FnMut(&RequestEvent) + Send + 'static>;

/// A single event-style call object.
pub trait EventRequest {
    fn open(&mut self, method: &str, url: &str);

    fn add_event_listener(&mut self, listener: EventListener);

    fn send(&mut self, body: Option<Vec<u8>>);
}

/// Factory for event-style call objects.
pub trait EventTransport {
    type Request: EventRequest;

    fn create(&self) -> Self::Request;
}

/// Decorator factory: every object it creates reports its completion to the
/// sink.
pub struct InterceptedEvents<T, S> {
    inner: T,
    sink: S,
}

impl<T, S> InterceptedEvents<T, S> {
    pub fn new(inner: T, sink: S) -> Self {
        Self { inner, sink }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }
}

impl<T, S> EventTransport for InterceptedEvents<T, S>
where
    T: EventTransport,
    S: ObservationSink + Clone + 'static,
{
    type Request = InterceptedEventRequest<T::Request, S>;

    fn create(&self) -> Self::Request {
        InterceptedEventRequest::new(self.inner.create(), self.sink.clone())
    }
}

/// Wrapped call object. Derefs to the original so type-specific methods stay
/// reachable.
pub struct InterceptedEventRequest<R, S> {
    inner: R,
    sink: S,
    method: Option<String>,
    url: Option<String>,
}

impl<R, S> InterceptedEventRequest<R, S> {
    pub fn new(inner: R, sink: S) -> Self {
        Self {
            inner,
            sink,
            method: None,
            url: None,
        }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, S> EventRequest for InterceptedEventRequest<R, S>
where
    R: EventRequest,
    S: ObservationSink + Clone + 'static,
{
    fn open(&mut self, method: &str, url: &str) {
        self.method = Some(method.to_string());
        self.url = Some(url.to_string());
        self.inner.open(method, url);
    }

    fn add_event_listener(&mut self, listener: EventListener) {
        self.inner.add_event_listener(listener);
    }

    fn send(&mut self, body: Option<Vec<u8>>) {
        if let Some(url) = self.url.clone() {
            let method = self
                .method
                .clone()
                .unwrap_or_else(|| DEFAULT_METHOD.to_string());
            let sink = self.sink.clone();
            let started = Instant::now();
            let mut settled = false;

            self.inner.add_event_listener(Box::new(move |event: &RequestEvent| {
                // one record per send, even if the object fires twice
                if settled {
                    return;
                }
                settled = true;

                if !sink.is_recording() {
                    debug!("Monitoring off, not recording {} {}", method, url);
                    return;
                }

                let observation = match event {
                    RequestEvent::Load { status } => {
                        let mut observation =
                            Observation::new(url.clone(), method.clone(), SourceKind::EventRequest);
                        observation.status = *status;
                        observation
                    }
                    RequestEvent::Error { message } => Observation::with_error(
                        url.clone(),
                        method.clone(),
                        SourceKind::EventRequest,
                        message.clone().unwrap_or_else(|| "Request failed".to_string()),
                    ),
                };
                sink.observe(observation.finished(started));
            }));
        }

        self.inner.send(body);
    }
}

impl<R, S> Deref for InterceptedEventRequest<R, S> {
    type Target = R;

    fn deref(&self) -> &R {
        &self.inner
    }
}

impl<R, S> DerefMut for InterceptedEventRequest<R, S> {
    fn deref_mut(&mut self) -> &mut R {
        &mut self.inner
    }
}

/// `reqwest`-backed event-style transport. Calls run as tokio tasks and fire
/// their listeners from the task when they settle.
#[derive(Clone, Debug)]
pub struct ReqwestEventTransport {
    client: Client,
}

impl ReqwestEventTransport {
    pub fn new(transport: &ReqwestTransport) -> Self {
        Self {
            client: transport.client().clone(),
        }
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

impl EventTransport for ReqwestEventTransport {
    type Request = ReqwestEventRequest;

    fn create(&self) -> ReqwestEventRequest {
        ReqwestEventRequest {
            client: self.client.clone(),
            method: DEFAULT_METHOD.to_string(),
            url: None,
            headers: Vec::new(),
            listeners: Vec::new(),
            status: Arc::new(AtomicU16::new(0)),
            completion: None,
        }
    }
}

pub struct ReqwestEventRequest {
    client: Client,
    method: String,
    url: Option<String>,
    headers: Vec<(String, String)>,
    listeners: Vec<EventListener>,
    status: Arc<AtomicU16>,
    completion: Option<JoinHandle<()>>,
}

impl ReqwestEventRequest {
    pub fn set_request_header(&mut self, name: &str, value: &str) {
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Final status, 0 until a response arrives or when the call failed.
    pub fn status(&self) -> u16 {
        self.status.load(Ordering::SeqCst)
    }

    /// Handle of the in-flight task, if `send` spawned one. Awaiting it waits
    /// until every listener has fired.
    pub fn take_completion(&mut self) -> Option<JoinHandle<()>> {
        self.completion.take()
    }

    fn fire(listeners: &mut [EventListener], event: &RequestEvent) {
        for listener in listeners.iter_mut() {
            listener(event);
        }
    }
}

impl EventRequest for ReqwestEventRequest {
    fn open(&mut self, method: &str, url: &str) {
        self.method = method.to_string();
        self.url = Some(url.to_string());
    }

    fn add_event_listener(&mut self, listener: EventListener) {
        self.listeners.push(listener);
    }

    fn send(&mut self, body: Option<Vec<u8>>) {
        let mut listeners = std::mem::take(&mut self.listeners);

        let Some(url) = self.url.clone() else {
            let event = RequestEvent::Error {
                message: Some("Request was not opened".to_string()),
            };
            Self::fire(&mut listeners, &event);
            return;
        };

        let builder = match ReqwestTransport::build_request(
            &self.client,
            &self.method,
            &url,
            &self.headers,
            body,
        ) {
            Ok(builder) => builder,
            Err(e) => {
                let event = RequestEvent::Error {
                    message: Some(e.to_string()),
                };
                Self::fire(&mut listeners, &event);
                return;
            }
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available to send {} {}", self.method, url);
            let event = RequestEvent::Error {
                message: Some("No async runtime available".to_string()),
            };
            Self::fire(&mut listeners, &event);
            return;
        };

        let status = self.status.clone();
        debug!("Sending {} {}", self.method, url);
        self.completion = Some(runtime.spawn(async move {
            let event = match builder.send().await {
                Ok(response) => {
                    let code = response.status().as_u16();
                    status.store(code, Ordering::SeqCst);
                    RequestEvent::Load { status: code }
                }
                Err(e) => RequestEvent::Error {
                    message: Some(e.to_string()),
                },
            };
            Self::fire(&mut listeners, &event);
        }));
    }
}
