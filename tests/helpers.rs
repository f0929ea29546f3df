// Shared test helpers: an in-memory broker and a scripted browser page.
//
// Both implement the same traits as the production adapters, so the consumer,
// the queue client, and the analyzer run unmodified against them.

#![allow(dead_code)] // Each test file uses a different subset

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream_shim::ReceiverStream;

use sso_landscape::browser::{
    BrowserLauncher, CapturedRequest, ElementInfo, FrameInfo, LaunchOptions, Navigation, Page,
    NAVCRED_CALLS_EXPR, WEBAUTHN_AVAILABLE_EXPR,
};
use sso_landscape::error_handling::{BrowserError, QueueError};
use sso_landscape::queue::{
    Acknowledger, BrokerConnector, BrokerSession, Delivery, DeliveryStream, OutgoingMessage,
};

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Acked,
    Rejected { requeue: bool },
}

struct MemoryAcker {
    tag: u64,
    settlements: Arc<Mutex<Vec<(u64, Settlement)>>>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> Result<(), QueueError> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.tag, Settlement::Acked));
        Ok(())
    }

    async fn reject(&self, requeue: bool) -> Result<(), QueueError> {
        self.settlements
            .lock()
            .unwrap()
            .push((self.tag, Settlement::Rejected { requeue }));
        Ok(())
    }
}

/// A broker holding messages in memory.
///
/// `push` feeds the currently open consumer. `close_stream` ends it, which is
/// how tests simulate a lost connection.
#[derive(Default)]
pub struct MemoryBroker {
    pub connects: AtomicUsize,
    pub declared: Mutex<Vec<String>>,
    pub published: Mutex<Vec<(String, OutgoingMessage)>>,
    pub settlements: Arc<Mutex<Vec<(u64, Settlement)>>>,
    pub refuse_connections: AtomicBool,
    next_tag: AtomicUsize,
    consumer: Mutex<Option<mpsc::UnboundedSender<Result<Delivery, QueueError>>>>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Delivers a message to the open consumer and returns its tag.
    pub fn push(&self, body: &str, reply_to: Option<&str>) -> u64 {
        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let delivery = Delivery {
            body: body.as_bytes().to_vec(),
            reply_to: reply_to.map(str::to_string),
            correlation_id: Some(format!("corr-{}", tag)),
            acker: Box::new(MemoryAcker {
                tag,
                settlements: Arc::clone(&self.settlements),
            }),
        };
        let consumer = self.consumer.lock().unwrap();
        consumer
            .as_ref()
            .expect("no consumer attached")
            .send(Ok(delivery))
            .expect("consumer stream dropped");
        tag
    }

    pub fn has_consumer(&self) -> bool {
        self.consumer.lock().unwrap().is_some()
    }

    pub fn close_stream(&self) {
        self.consumer.lock().unwrap().take();
    }

    pub fn settlement(&self, tag: u64) -> Option<Settlement> {
        self.settlements
            .lock()
            .unwrap()
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, s)| *s)
    }
}

/// Connector handing out sessions of a shared [`MemoryBroker`].
pub struct MemoryConnector(pub Arc<MemoryBroker>);

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn BrokerSession>, QueueError> {
        if self.0.refuse_connections.load(Ordering::SeqCst) {
            return Err(QueueError::Connection("connection refused".to_string()));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            broker: Arc::clone(&self.0),
            open: AtomicBool::new(true),
        }))
    }
}

struct MemorySession {
    broker: Arc<MemoryBroker>,
    open: AtomicBool,
}

#[async_trait]
impl BrokerSession for MemorySession {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn declare_queue(&self, queue: &str) -> Result<(), QueueError> {
        self.broker.declared.lock().unwrap().push(queue.to_string());
        Ok(())
    }

    async fn publish(&self, queue: &str, message: &OutgoingMessage) -> Result<(), QueueError> {
        self.broker
            .published
            .lock()
            .unwrap()
            .push((queue.to_string(), message.clone()));
        Ok(())
    }

    async fn set_prefetch(&self, _count: u16) -> Result<(), QueueError> {
        Ok(())
    }

    async fn consume(&self, _queue: &str, _consumer_tag: &str) -> Result<DeliveryStream, QueueError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.broker.consumer.lock().unwrap() = Some(tx);
        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Minimal `Stream` over an unbounded receiver.
mod tokio_stream_shim {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::Stream;
    use tokio::sync::mpsc::UnboundedReceiver;

    pub struct ReceiverStream<T>(UnboundedReceiver<T>);

    impl<T> ReceiverStream<T> {
        pub fn new(rx: UnboundedReceiver<T>) -> Self {
            Self(rx)
        }
    }

    impl<T> Stream for ReceiverStream<T> {
        type Item = T;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
            self.0.poll_recv(cx)
        }
    }
}

/// Polls `condition` until it holds or a few seconds pass.
pub async fn wait_until(condition: impl FnMut() -> bool) -> bool {
    wait_until_for(std::time::Duration::from_secs(3), condition).await
}

/// Polls `condition` every 10ms until it holds or `limit` passes.
pub async fn wait_until_for(limit: std::time::Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    condition()
}

// ---------------------------------------------------------------------------
// Browser
// ---------------------------------------------------------------------------

/// One scripted URL.
#[derive(Debug, Clone)]
pub struct FakeSite {
    pub final_url: Option<String>,
    pub status: Option<u16>,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub html: String,
    pub frames: Option<Vec<FrameInfo>>,
    pub clickables: Vec<ElementInfo>,
    pub requests: Vec<CapturedRequest>,
    /// Issued only when the page is reloaded
    pub reload_requests: Vec<CapturedRequest>,
    /// URL of the popup a click opens
    pub click_popup: Option<String>,
    /// URL the page moves to when clicked without a popup
    pub click_navigates_to: Option<String>,
    pub navcred_calls: Value,
    pub webauthn: bool,
}

impl FakeSite {
    pub fn html(html: &str) -> Self {
        Self {
            final_url: None,
            status: Some(200),
            title: Some("Test".to_string()),
            content_type: Some("text/html".to_string()),
            html: html.to_string(),
            frames: None,
            clickables: Vec::new(),
            requests: Vec::new(),
            reload_requests: Vec::new(),
            click_popup: None,
            click_navigates_to: None,
            navcred_calls: Value::Array(Vec::new()),
            webauthn: false,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn redirecting_to(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_button(mut self, text: &str) -> Self {
        self.clickables.push(ElementInfo {
            tag: "button".to_string(),
            text: text.to_string(),
            visible: true,
            ..Default::default()
        });
        self
    }

    pub fn with_request(mut self, url: &str) -> Self {
        self.requests.push(CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            post_data: None,
        });
        self
    }

    pub fn with_post_request(mut self, url: &str, body: &str) -> Self {
        self.requests.push(CapturedRequest {
            url: url.to_string(),
            method: "POST".to_string(),
            post_data: Some(body.to_string()),
        });
        self
    }

    pub fn with_reload_request(mut self, url: &str) -> Self {
        self.reload_requests.push(CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            post_data: None,
        });
        self
    }

    pub fn opening_popup(mut self, url: &str) -> Self {
        self.click_popup = Some(url.to_string());
        self
    }

    pub fn navigating_on_click(mut self, url: &str) -> Self {
        self.click_navigates_to = Some(url.to_string());
        self
    }

    pub fn with_navcred_calls(mut self, calls: Value) -> Self {
        self.navcred_calls = calls;
        self
    }
}

#[derive(Default)]
struct PageState {
    current: Option<String>,
    capturing: bool,
    captured: Vec<CapturedRequest>,
}

/// Scripted page shared between the launcher and the test.
#[derive(Default)]
pub struct FakeBrowser {
    sites: Mutex<HashMap<String, FakeSite>>,
    state: Mutex<PageState>,
    pub navigations: Mutex<Vec<String>>,
    pub reloads: AtomicUsize,
    pub clicks: Mutex<Vec<(f64, f64)>>,
    pub init_scripts: Mutex<Vec<String>>,
    pub launches: AtomicUsize,
    pub closed: AtomicBool,
}

impl FakeBrowser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn site(&self, url: &str, site: FakeSite) {
        self.sites.lock().unwrap().insert(url.to_string(), site);
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    fn lookup(&self, url: &str) -> Option<FakeSite> {
        let sites = self.sites.lock().unwrap();
        sites
            .get(url)
            .or_else(|| sites.get(&format!("{}/", url)))
            .or_else(|| sites.get(url.trim_end_matches('/')))
            .cloned()
    }

    fn current(&self) -> Option<FakeSite> {
        let current = self.state.lock().unwrap().current.clone()?;
        self.lookup(&current)
    }

    pub fn clicks(&self) -> Vec<(f64, f64)> {
        self.clicks.lock().unwrap().clone()
    }

    fn load(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.load_as(url, false)
    }

    fn load_as(&self, url: &str, reload: bool) -> Result<Navigation, BrowserError> {
        if url == "about:blank" {
            self.state.lock().unwrap().current = Some(url.to_string());
            return Ok(Navigation {
                url: url.to_string(),
                status: None,
            });
        }
        let Some(site) = self.lookup(url) else {
            return Err(BrowserError::Navigation("net::ERR_NAME_NOT_RESOLVED".to_string()));
        };
        let final_url = site.final_url.clone().unwrap_or_else(|| url.to_string());
        let mut state = self.state.lock().unwrap();
        state.current = Some(url.to_string());
        if state.capturing {
            state.captured.extend(site.requests.iter().cloned());
            if reload {
                state.captured.extend(site.reload_requests.iter().cloned());
            }
        }
        Ok(Navigation {
            url: final_url,
            status: site.status,
        })
    }
}

/// Launcher returning pages backed by one [`FakeBrowser`].
pub struct FakeLauncher(pub Arc<FakeBrowser>);

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Page>, BrowserError> {
        self.0.launches.fetch_add(1, Ordering::SeqCst);
        *self.0.init_scripts.lock().unwrap() = options.init_scripts.clone();
        Ok(Box::new(FakePage(Arc::clone(&self.0))))
    }
}

pub struct FakePage(Arc<FakeBrowser>);

#[async_trait]
impl Page for FakePage {
    async fn navigate(&self, url: &str) -> Result<Navigation, BrowserError> {
        self.0.navigations.lock().unwrap().push(url.to_string());
        self.0.load(url)
    }

    async fn reload(&self) -> Result<Navigation, BrowserError> {
        self.0.reloads.fetch_add(1, Ordering::SeqCst);
        let current = self.0.state.lock().unwrap().current.clone();
        match current {
            Some(url) => self.0.load_as(&url, true),
            None => Err(BrowserError::Navigation("nothing to reload".to_string())),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<Value, BrowserError> {
        let site = self.0.current();
        Ok(match expression {
            NAVCRED_CALLS_EXPR => site.map(|s| s.navcred_calls).unwrap_or(Value::Array(Vec::new())),
            WEBAUTHN_AVAILABLE_EXPR => Value::Bool(site.is_some_and(|s| s.webauthn)),
            _ => Value::Null,
        })
    }

    async fn query_selector_all(&self, _selector: &str) -> Result<Vec<ElementInfo>, BrowserError> {
        Ok(self.0.current().map(|s| s.clickables).unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, BrowserError> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn content(&self) -> Result<String, BrowserError> {
        Ok(self.0.current().map(|s| s.html).unwrap_or_default())
    }

    async fn url(&self) -> Result<String, BrowserError> {
        Ok(self
            .0
            .state
            .lock()
            .unwrap()
            .current
            .clone()
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn title(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.0.current().and_then(|s| s.title))
    }

    async fn content_type(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.0.current().and_then(|s| s.content_type))
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>, BrowserError> {
        let url = self.url().await?;
        Ok(match self.0.current() {
            Some(FakeSite {
                frames: Some(frames),
                ..
            }) => frames,
            Some(site) => vec![FrameInfo {
                url,
                html: Some(site.html),
                content_type: site.content_type,
            }],
            None => Vec::new(),
        })
    }

    async fn add_init_script(&self, source: &str) -> Result<(), BrowserError> {
        self.0.init_scripts.lock().unwrap().push(source.to_string());
        Ok(())
    }

    async fn start_request_capture(&self) -> Result<(), BrowserError> {
        let mut state = self.0.state.lock().unwrap();
        state.captured.clear();
        state.capturing = true;
        Ok(())
    }

    async fn take_captured_requests(&self) -> Vec<CapturedRequest> {
        let mut state = self.0.state.lock().unwrap();
        state.capturing = false;
        std::mem::take(&mut state.captured)
    }

    async fn click_at(&self, x: f64, y: f64, _popup_timeout: Duration) -> Result<bool, BrowserError> {
        self.0.clicks.lock().unwrap().push((x, y));
        let Some(site) = self.0.current() else {
            return Ok(false);
        };
        if let Some(popup) = site.click_popup {
            let popup_site = self.0.lookup(&popup);
            let mut state = self.0.state.lock().unwrap();
            if state.capturing {
                state.captured.push(CapturedRequest {
                    url: popup,
                    method: "GET".to_string(),
                    post_data: None,
                });
                if let Some(popup_site) = popup_site {
                    state.captured.extend(popup_site.requests);
                }
            }
            return Ok(true);
        }
        if let Some(target) = site.click_navigates_to {
            self.0.load(&target)?;
        }
        Ok(false)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.0.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
