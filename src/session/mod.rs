//! Page session
//!
//! One task per open page drives the pipeline: it loads the page's
//! annotations, drains the scheduler in batches with a yield in between,
//! and reacts to host messages, store changes, mutations and visibility
//! reports. All of it runs on a single task, so batches never overlap.
//! Dropping every [`SessionHandle`] (or calling [`SessionHandle::shutdown`])
//! ends the task and releases its subscriptions.

mod messages;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::anchor::ResolutionChain;
use crate::annotations::{Annotation, AnnotationStore, StoreChange};
use crate::config::AnchorConfig;
use crate::dom::{parse_xhtml, Document, SharedDocument};
use crate::highlight::Painter;
use crate::page_url::normalize_url;
use crate::scheduler::{BatchReport, Scheduler};
use crate::watcher::{IntersectionEntry, MutationWatcher, VisibilityWatcher};

pub use messages::{Ack, HostMessage, SessionEvent};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Page session has ended")]
    Closed,
}

/// Commands sent from handles to the session task
#[derive(Debug)]
enum Command {
    Message {
        message: HostMessage,
        reply: oneshot::Sender<Ack>,
    },
    Intersections(Vec<IntersectionEntry>),
    Shutdown,
}

/// Cloneable handle to a running page session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl SessionHandle {
    /// Deliver a host message and wait for its acknowledgement
    pub async fn send(&self, message: HostMessage) -> Result<Ack, SessionError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Message { message, reply })
            .map_err(|_| SessionError::Closed)?;
        response.await.map_err(|_| SessionError::Closed)
    }

    /// Highlight a just-created annotation; true if it was painted right away
    pub async fn new_annotation(&self, annotation: Annotation) -> Result<bool, SessionError> {
        Ok(self.send(HostMessage::NewAnnotation { annotation }).await?.success)
    }

    /// Scroll to an annotation; false means it will be scrolled to once painted
    pub async fn scroll_to_annotation(&self, id: &str) -> Result<bool, SessionError> {
        let message = HostMessage::ScrollToAnnotation {
            annotation_id: id.to_string(),
        };
        Ok(self.send(message).await?.success)
    }

    /// Forward viewport intersection changes
    pub fn report_intersections(&self, entries: Vec<IntersectionEntry>) -> Result<(), SessionError> {
        self.commands
            .send(Command::Intersections(entries))
            .map_err(|_| SessionError::Closed)
    }

    /// Ask the session to stop
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }
}

/// The resolution pipeline for one page load
pub struct PageSession {
    page_url: String,
    doc: SharedDocument,
    store: Arc<dyn AnnotationStore>,
    chain: ResolutionChain,
    painter: Painter,
    scheduler: Scheduler,
    config: AnchorConfig,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedSender<SessionEvent>,
    next_drain: Option<Instant>,
}

impl PageSession {
    pub fn new(
        page_url: &str,
        doc: SharedDocument,
        store: Arc<dyn AnnotationStore>,
        chain: ResolutionChain,
        config: AnchorConfig,
    ) -> (Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let session = Self {
            page_url: page_url.to_string(),
            doc,
            store,
            chain,
            painter: Painter::new(config.painter.clone()),
            scheduler: Scheduler::new(config.scheduler.clone()),
            config,
            commands: command_rx,
            events: event_tx,
            next_drain: None,
        };
        let handle = SessionHandle {
            commands: command_tx,
        };
        (session, handle, event_rx)
    }

    /// Parse a page snapshot and set up a session over it
    pub fn from_markup(
        page_url: &str,
        markup: &str,
        store: Arc<dyn AnnotationStore>,
        chain: ResolutionChain,
        config: AnchorConfig,
    ) -> crate::Result<(Self, SessionHandle, mpsc::UnboundedReceiver<SessionEvent>)> {
        let doc = parse_xhtml(markup)?.into_shared();
        Ok(Self::new(page_url, doc, store, chain, config))
    }

    /// The document this session decorates
    pub fn document(&self) -> SharedDocument {
        self.doc.clone()
    }

    /// Run the session on its own task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Starting annotation session for {}", normalize_url(&self.page_url));

        // Subscribe before loading so no change slips in between
        let (mut mutations, mut visibility) = {
            let mut doc = self.doc.lock();
            let mutations = MutationWatcher::new(doc.observe(), &self.config.watcher);
            let mut visibility = VisibilityWatcher::new(&self.config.watcher);
            visibility.observe_document(&doc);
            (mutations, visibility)
        };
        let mut store_changes = self.store.subscribe();
        let mut store_open = true;

        self.scheduler.begin_loading(&self.page_url);
        let annotations = match self.store.get(&self.page_url).await {
            Ok(annotations) => annotations,
            Err(e) => {
                warn!("Failed to load annotations for {}: {}", self.page_url, e);
                self.emit(SessionEvent::StorageFault {
                    message: e.to_string(),
                });
                Vec::new()
            }
        };
        self.scheduler.prioritize(annotations);
        if self.scheduler.is_draining() {
            self.next_drain = Some(Instant::now());
        } else {
            self.emit_settled();
        }

        loop {
            let drain_at = self.next_drain.unwrap_or_else(Instant::now);
            let throttle_at = mutations.deadline().unwrap_or_else(Instant::now);
            let throttled = mutations.deadline().is_some();
            let drain_due = self.next_drain.is_some();

            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Message { message, reply }) => {
                        let ack = self.handle_message(message, &mut mutations, &mut visibility);
                        let _ = reply.send(ack);
                    }
                    Some(Command::Intersections(entries)) => {
                        self.on_intersections(&entries, &visibility);
                    }
                    Some(Command::Shutdown) | None => break,
                },

                Some(record) = mutations.next_record() => {
                    let doc = self.doc.clone();
                    let doc = doc.lock();
                    let mut records = vec![record];
                    records.extend(mutations.take_records());
                    visibility.track(&doc, &records);
                    mutations.note(&doc, &records, self.scheduler.queue_len() > 0);
                }

                _ = sleep_until(throttle_at), if throttled => {
                    mutations.fire();
                    if self.scheduler.resume() {
                        self.next_drain = Some(Instant::now());
                    }
                }

                _ = sleep_until(drain_at), if drain_due => {
                    self.next_drain = None;
                    self.drain(&mut mutations, &mut visibility);
                }

                change = store_changes.recv(), if store_open => match change {
                    Ok(change) => self.on_store_change(change, &mut mutations, &mut visibility),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Missed {} annotation store changes", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => store_open = false,
                },
            }
        }

        info!("Annotation session for {} ended", normalize_url(&self.page_url));
    }

    fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn emit_settled(&self) {
        self.emit(SessionEvent::Settled {
            highlighted: self.scheduler.highlighted_count(),
            dropped: self.scheduler.dropped().len(),
        });
    }

    /// Edit the document while hiding the edit's own mutations from the
    /// watchers. Host mutations queued before the edit are still seen.
    fn edit_document<R>(
        &mut self,
        mutations: &mut MutationWatcher,
        visibility: &mut VisibilityWatcher,
        edit: impl FnOnce(&mut Self, &mut Document) -> R,
    ) -> R {
        let shared = self.doc.clone();
        let mut doc = shared.lock();

        let pending = mutations.take_records();
        visibility.track(&doc, &pending);
        mutations.note(&doc, &pending, self.scheduler.queue_len() > 0);

        let result = edit(self, &mut doc);
        mutations.take_records();
        result
    }

    fn drain(&mut self, mutations: &mut MutationWatcher, visibility: &mut VisibilityWatcher) {
        let report = self.edit_document(mutations, visibility, |session, doc| {
            session
                .scheduler
                .drain_batch(doc, &session.chain, &session.painter)
        });
        self.after_batch(report);
    }

    fn after_batch(&mut self, report: BatchReport) {
        for highlighted in &report.highlighted {
            debug!("Highlighted {} via {}", highlighted.id, highlighted.strategy);
            self.emit(SessionEvent::Highlighted {
                annotation_id: highlighted.id.clone(),
                strategy: highlighted.strategy.to_string(),
            });
        }
        for id in &report.dropped {
            self.emit(SessionEvent::Dropped {
                annotation_id: id.clone(),
            });
        }
        if let Some(id) = &report.scrolled_to {
            self.schedule_flash_clear(id.clone());
        }

        if report.settled {
            self.next_drain = None;
            self.emit_settled();
        } else if self.scheduler.is_draining() {
            let delay = if report.made_progress() {
                self.config.scheduler.batch_yield_ms
            } else {
                self.config.scheduler.retry_delay_ms
            };
            let at = Instant::now() + Duration::from_millis(delay);
            // Keep an earlier wake-up if one is already set
            self.next_drain = Some(self.next_drain.map_or(at, |existing| existing.min(at)));
        }
    }

    fn handle_message(
        &mut self,
        message: HostMessage,
        mutations: &mut MutationWatcher,
        visibility: &mut VisibilityWatcher,
    ) -> Ack {
        match message {
            HostMessage::NewAnnotation { annotation } => {
                if !annotation.belongs_to(&self.page_url) {
                    debug!("Ignoring annotation {} for another page", annotation.id);
                    return Ack::deferred();
                }
                let id = annotation.id.clone();
                if self.scheduler.is_highlighted(&id) {
                    return Ack::done();
                }
                if !self.scheduler.enqueue_new(annotation) {
                    return Ack::deferred();
                }
                self.drain(mutations, visibility);
                if self.scheduler.is_highlighted(&id) {
                    Ack::done()
                } else {
                    Ack::deferred()
                }
            }
            HostMessage::ScrollToAnnotation { annotation_id } => {
                let found = {
                    let mut doc = self.doc.lock();
                    self.painter.scroll_to(&mut doc, &annotation_id)
                };
                if found {
                    self.schedule_flash_clear(annotation_id);
                    Ack::done()
                } else {
                    debug!("Deferring scroll to {} until it is painted", annotation_id);
                    self.scheduler.set_scroll_target(&annotation_id);
                    Ack::deferred()
                }
            }
        }
    }

    fn on_intersections(&mut self, entries: &[IntersectionEntry], visibility: &VisibilityWatcher) {
        let ids = {
            let doc = self.doc.lock();
            visibility.visible_annotations(&doc, &self.painter, entries)
        };
        for id in ids {
            if self.scheduler.boost(&id, self.config.watcher.visibility_boost) {
                debug!("Boosted {} as it came into view", id);
            }
        }
    }

    fn on_store_change(
        &mut self,
        change: StoreChange,
        mutations: &mut MutationWatcher,
        visibility: &mut VisibilityWatcher,
    ) {
        let removed: Vec<String> = change
            .removed_ids()
            .into_iter()
            .filter(|id| self.scheduler.knows(id))
            .map(str::to_string)
            .collect();
        if !removed.is_empty() {
            self.edit_document(mutations, visibility, |session, doc| {
                for id in &removed {
                    session.scheduler.forget(id);
                    session.painter.remove(doc, id);
                }
            });
            for id in removed {
                self.emit(SessionEvent::Removed { annotation_id: id });
            }
        }

        let mut queued = false;
        for annotation in change.added() {
            if annotation.belongs_to(&self.page_url) && !self.scheduler.knows(&annotation.id) {
                queued |= self.scheduler.enqueue_new(annotation.clone());
            }
        }
        if queued {
            self.next_drain = Some(Instant::now());
        }
    }

    fn schedule_flash_clear(&self, id: String) {
        let doc = self.doc.clone();
        let painter = self.painter.clone();
        let duration = Duration::from_millis(self.config.painter.flash_duration_ms);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            painter.clear_flash(&mut doc.lock(), &id);
        });
    }
}
