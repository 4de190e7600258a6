//! Annotation processing scheduler
//!
//! One scheduler exists per page load. It moves through
//! `Idle → Loading → Prioritizing → Draining → Settled`, resolving and
//! painting annotations in prioritized batches. Failures are retried up to
//! the configured cap and then dropped; one failure never affects another
//! item.

mod queue;

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::anchor::ResolutionChain;
use crate::annotations::Annotation;
use crate::config::SchedulerConfig;
use crate::dom::Document;
use crate::highlight::Painter;
use crate::page_url::{fragment_target, normalize_url};

pub use queue::{QueueItem, WorkQueue};

/// Priority of annotations that arrive after the page was loaded
pub const NEW_ANNOTATION_PRIORITY: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Prioritizing,
    Draining,
    Settled,
}

/// An annotation painted during a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    pub id: String,
    /// Resolution strategy that located it
    pub strategy: &'static str,
}

/// What one batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub highlighted: Vec<Highlighted>,
    /// Failed this time, still queued
    pub retried: Vec<String>,
    /// Failed for the last time
    pub dropped: Vec<String>,
    /// Scroll target brought into view during this batch
    pub scrolled_to: Option<String>,
    /// The queue ran empty
    pub settled: bool,
}

impl BatchReport {
    /// Whether anything was painted
    pub fn made_progress(&self) -> bool {
        !self.highlighted.is_empty()
    }
}

pub struct Scheduler {
    config: SchedulerConfig,
    phase: Phase,
    page_url: Option<String>,
    queue: WorkQueue,
    highlighted: HashSet<String>,
    dropped: Vec<String>,
    scroll_target: Option<String>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            page_url: None,
            queue: WorkQueue::new(),
            highlighted: HashSet::new(),
            dropped: Vec::new(),
            scroll_target: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_draining(&self) -> bool {
        self.phase == Phase::Draining
    }

    /// Normalized URL of the page being processed
    pub fn page_url(&self) -> Option<&str> {
        self.page_url.as_deref()
    }

    /// Enter `Loading` for `page_url`; the fragment is a candidate scroll
    /// target until [`prioritize`](Self::prioritize) confirms it.
    pub fn begin_loading(&mut self, page_url: &str) {
        self.page_url = Some(normalize_url(page_url));
        self.scroll_target = fragment_target(page_url);
        self.phase = Phase::Loading;
        debug!("Loading annotations for {}", normalize_url(page_url));
    }

    /// Queue the page's stored annotations and start draining
    pub fn prioritize(&mut self, annotations: Vec<Annotation>) {
        self.phase = Phase::Prioritizing;
        let page_url = self.page_url.clone().unwrap_or_default();

        for annotation in annotations {
            if !annotation.belongs_to(&page_url) || self.knows(&annotation.id) {
                continue;
            }
            let priority = if self.scroll_target.as_deref() == Some(annotation.id.as_str()) {
                self.config.scroll_target_boost
            } else {
                0
            };
            self.queue.push(QueueItem::new(annotation, priority));
        }

        // A fragment that names no annotation here belongs to the page
        if let Some(target) = self.scroll_target.take() {
            if self.queue.contains(&target) {
                self.scroll_target = Some(target);
            } else {
                debug!("Fragment {} is not an annotation on this page", target);
            }
        }

        if self.queue.is_empty() {
            self.phase = Phase::Settled;
        } else {
            debug!("Queued {} annotations", self.queue.len());
            self.phase = Phase::Draining;
        }
    }

    /// Whether `id` is queued or already painted
    pub fn knows(&self, id: &str) -> bool {
        self.queue.contains(id) || self.highlighted.contains(id)
    }

    /// Queue an annotation created after load at maximum priority.
    ///
    /// Returns false while idle or when the annotation is already painted.
    pub fn enqueue_new(&mut self, annotation: Annotation) -> bool {
        if self.phase == Phase::Idle || self.highlighted.contains(&annotation.id) {
            return false;
        }
        if !self.queue.raise(&annotation.id, NEW_ANNOTATION_PRIORITY) {
            self.queue
                .push_front(QueueItem::new(annotation, NEW_ANNOTATION_PRIORITY));
        }
        if matches!(self.phase, Phase::Draining | Phase::Settled) {
            self.phase = Phase::Draining;
        }
        true
    }

    /// Add to a queued item's priority. False if it is not queued.
    pub fn boost(&mut self, id: &str, amount: u64) -> bool {
        self.queue.boost(id, amount)
    }

    /// Make `id` the pending scroll target and move it up the queue
    pub fn set_scroll_target(&mut self, id: &str) {
        self.scroll_target = Some(id.to_string());
        self.queue.boost(id, self.config.scroll_target_boost);
    }

    pub fn scroll_target(&self) -> Option<&str> {
        self.scroll_target.as_deref()
    }

    /// Stop tracking a deleted annotation
    pub fn forget(&mut self, id: &str) -> bool {
        let queued = self.queue.remove(id).is_some();
        let painted = self.highlighted.remove(id);
        if self.scroll_target.as_deref() == Some(id) {
            self.scroll_target = None;
        }
        queued || painted
    }

    /// Go back to draining after the page changed, if work is left
    pub fn resume(&mut self) -> bool {
        if self.phase == Phase::Settled && !self.queue.is_empty() {
            self.phase = Phase::Draining;
        }
        self.is_draining()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn priority_of(&self, id: &str) -> Option<u64> {
        self.queue.get(id).map(|item| item.priority)
    }

    pub fn attempts_of(&self, id: &str) -> Option<u32> {
        self.queue.get(id).map(|item| item.attempts)
    }

    pub fn is_highlighted(&self, id: &str) -> bool {
        self.highlighted.contains(id)
    }

    pub fn highlighted_count(&self) -> usize {
        self.highlighted.len()
    }

    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    /// Resolve and paint the next batch
    pub fn drain_batch(
        &mut self,
        doc: &mut Document,
        chain: &ResolutionChain,
        painter: &Painter,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        if self.phase != Phase::Draining {
            return report;
        }

        for mut item in self.queue.pop_batch(self.config.batch_size) {
            let id = item.annotation.id.clone();

            let painted = match chain.resolve(doc, &item.annotation) {
                Some(resolution) => {
                    let outcome = painter.apply(doc, &resolution.target, &id);
                    if outcome.is_applied() {
                        Some(resolution.strategy)
                    } else {
                        debug!("Resolved {} via {} but could not paint: {:?}", id, resolution.strategy, outcome);
                        None
                    }
                }
                None => None,
            };

            match painted {
                Some(strategy) => {
                    self.highlighted.insert(id.clone());
                    if self.scroll_target.as_deref() == Some(id.as_str()) && painter.scroll_to(doc, &id) {
                        self.scroll_target = None;
                        report.scrolled_to = Some(id.clone());
                    }
                    report.highlighted.push(Highlighted { id, strategy });
                }
                None => {
                    item.attempts += 1;
                    if item.attempts >= self.config.max_attempts {
                        warn!("Dropping annotation {} after {} attempts", id, item.attempts);
                        self.dropped.push(id.clone());
                        report.dropped.push(id);
                    } else {
                        report.retried.push(id);
                        self.queue.push(item);
                    }
                }
            }
        }

        if self.queue.is_empty() {
            self.settle(doc, painter, &mut report);
        }
        report
    }

    fn settle(&mut self, doc: &mut Document, painter: &Painter, report: &mut BatchReport) {
        self.phase = Phase::Settled;
        report.settled = true;
        if let Some(target) = self.scroll_target.take() {
            if painter.scroll_to(doc, &target) {
                report.scrolled_to = Some(target);
            } else {
                debug!("Giving up on scroll target {}", target);
            }
        }
        debug!(
            "Settled with {} highlighted, {} dropped",
            self.highlighted.len(),
            self.dropped.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::TextAnchor;
    use crate::dom::parse_xhtml;

    const PAGE: &str = "https://ex.com/a";

    fn config(batch_size: usize, max_attempts: u32) -> SchedulerConfig {
        SchedulerConfig {
            batch_size,
            max_attempts,
            ..Default::default()
        }
    }

    fn text(url: &str, exact: &str) -> Annotation {
        Annotation::new_text(url, TextAnchor::from_text(exact))
    }

    fn loaded(config: SchedulerConfig, url: &str, annotations: Vec<Annotation>) -> Scheduler {
        let mut scheduler = Scheduler::new(config);
        scheduler.begin_loading(url);
        scheduler.prioritize(annotations);
        scheduler
    }

    #[test]
    fn test_lifecycle() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        assert_eq!(scheduler.phase(), Phase::Idle);

        scheduler.begin_loading(PAGE);
        assert_eq!(scheduler.phase(), Phase::Loading);

        scheduler.prioritize(vec![text(PAGE, "hello world")]);
        assert_eq!(scheduler.phase(), Phase::Draining);

        let mut doc = parse_xhtml("<body><p>hello world</p></body>").unwrap();
        let report = scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert_eq!(report.highlighted.len(), 1);
        assert_eq!(report.highlighted[0].strategy, "text-search");
        assert!(report.settled);
        assert_eq!(scheduler.phase(), Phase::Settled);
    }

    #[test]
    fn test_page_scoped_across_fragments() {
        let scheduler = loaded(
            SchedulerConfig::default(),
            "https://ex.com/a",
            vec![
                text("https://ex.com/a#frag1", "one"),
                text("https://ex.com/b", "other page"),
                text("https://ex.com/a#frag2", "two"),
            ],
        );
        assert_eq!(scheduler.queue_len(), 2);
    }

    #[test]
    fn test_batch_size() {
        let annotations: Vec<Annotation> = (0..25).map(|i| text(PAGE, &format!("missing {i}"))).collect();
        let mut scheduler = loaded(config(10, 5), PAGE, annotations);
        let mut doc = parse_xhtml("<body><p>nothing</p></body>").unwrap();

        let report = scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert_eq!(report.retried.len(), 10);
        assert_eq!(scheduler.queue_len(), 25);
    }

    #[test]
    fn test_bounded_retry() {
        let missing = text(PAGE, "not on the page");
        let id = missing.id.clone();
        let mut scheduler = loaded(config(10, 3), PAGE, vec![missing]);
        let mut doc = parse_xhtml("<body><p>hello world</p></body>").unwrap();
        let chain = ResolutionChain::default();
        let painter = Painter::default();

        for expected in 1..3 {
            let report = scheduler.drain_batch(&mut doc, &chain, &painter);
            assert_eq!(report.retried, vec![id.clone()]);
            assert_eq!(scheduler.attempts_of(&id), Some(expected));
        }

        let report = scheduler.drain_batch(&mut doc, &chain, &painter);
        assert_eq!(report.dropped, vec![id.clone()]);
        assert!(report.settled);
        assert_eq!(scheduler.attempts_of(&id), None);
        assert_eq!(scheduler.dropped(), &[id]);

        // Nothing left to drain
        assert_eq!(scheduler.drain_batch(&mut doc, &chain, &painter), BatchReport::default());
    }

    #[test]
    fn test_priority_only_grows() {
        let first = text(PAGE, "missing one");
        let second = text(PAGE, "missing two");
        let (a, b) = (first.id.clone(), second.id.clone());
        let resent = second.clone();
        let mut scheduler = loaded(config(10, 5), PAGE, vec![first, second]);

        assert!(scheduler.boost(&a, 50));
        assert!(scheduler.boost(&a, 50));
        assert_eq!(scheduler.priority_of(&a), Some(100));

        // A failed attempt keeps the priority it had
        let mut doc = parse_xhtml("<body><p>text</p></body>").unwrap();
        scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert_eq!(scheduler.priority_of(&a), Some(100));
        assert_eq!(scheduler.priority_of(&b), Some(0));

        // Re-sending a queued annotation raises it to the top
        assert!(scheduler.enqueue_new(resent));
        assert_eq!(scheduler.queue_len(), 2);
        assert_eq!(scheduler.priority_of(&b), Some(NEW_ANNOTATION_PRIORITY));
        assert!(scheduler.boost(&b, 1));
        assert_eq!(scheduler.priority_of(&b), Some(u64::MAX));
    }

    #[test]
    fn test_url_fragment_scroll_target_goes_first() {
        let filler: Vec<Annotation> = (0..3).map(|i| text(PAGE, &format!("para {i}"))).collect();
        let target = text(PAGE, "the target");
        let target_id = target.id.clone();
        let mut annotations = filler;
        annotations.push(target);

        let url = format!("{PAGE}#{target_id}");
        let mut scheduler = loaded(config(1, 5), &url, annotations);
        assert_eq!(scheduler.scroll_target(), Some(target_id.as_str()));
        assert_eq!(scheduler.priority_of(&target_id), Some(1000));

        let mut doc = parse_xhtml(
            "<body><p>para 0</p><p>para 1</p><p>para 2</p><p>and the target here</p></body>",
        )
        .unwrap();
        let report = scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert_eq!(report.highlighted[0].id, target_id);
        assert_eq!(report.scrolled_to.as_deref(), Some(target_id.as_str()));
        assert_eq!(scheduler.scroll_target(), None);

        let span = doc.get_element_by_id(&target_id).unwrap();
        assert_eq!(doc.last_scroll().unwrap().node, span);
    }

    #[test]
    fn test_new_annotations_jump_the_queue() {
        let mut scheduler = Scheduler::new(SchedulerConfig::default());
        assert!(!scheduler.enqueue_new(text(PAGE, "too early")));

        let mut scheduler = loaded(config(1, 5), PAGE, vec![text(PAGE, "old one")]);
        let fresh = text(PAGE, "fresh one");
        let fresh_id = fresh.id.clone();
        assert!(scheduler.enqueue_new(fresh));
        assert_eq!(scheduler.priority_of(&fresh_id), Some(NEW_ANNOTATION_PRIORITY));

        let mut doc = parse_xhtml("<body><p>old one</p><p>fresh one</p></body>").unwrap();
        let report = scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert_eq!(report.highlighted[0].id, fresh_id);
    }

    #[test]
    fn test_settled_scheduler_resumes_for_new_work() {
        let mut scheduler = loaded(SchedulerConfig::default(), PAGE, Vec::new());
        assert_eq!(scheduler.phase(), Phase::Settled);
        assert!(!scheduler.resume());

        let late = text(PAGE, "late text");
        let late_id = late.id.clone();
        assert!(scheduler.enqueue_new(late.clone()));
        assert_eq!(scheduler.phase(), Phase::Draining);

        let mut doc = parse_xhtml("<body><p>some late text</p></body>").unwrap();
        scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert!(scheduler.is_highlighted(&late_id));

        // Already painted: a repeated notification is ignored
        assert!(!scheduler.enqueue_new(late));
        assert_eq!(scheduler.phase(), Phase::Settled);
    }

    #[test]
    fn test_forget_removes_queued_and_painted() {
        let queued = text(PAGE, "never found");
        let queued_id = queued.id.clone();
        let mut scheduler = loaded(SchedulerConfig::default(), PAGE, vec![queued]);

        assert!(scheduler.forget(&queued_id));
        assert!(!scheduler.knows(&queued_id));
        assert!(!scheduler.forget(&queued_id));
    }

    #[test]
    fn test_page_fragment_is_not_a_scroll_target() {
        let annotation = text(PAGE, "hello world");
        let mut scheduler = loaded(SchedulerConfig::default(), &format!("{PAGE}#intro"), vec![annotation]);
        assert_eq!(scheduler.scroll_target(), None);

        let mut doc = parse_xhtml(r#"<body><h2 id="intro">Intro</h2><p>hello world</p></body>"#).unwrap();
        let report = scheduler.drain_batch(&mut doc, &ResolutionChain::default(), &Painter::default());
        assert!(report.settled);
        assert_eq!(report.scrolled_to, None);
        assert!(doc.last_scroll().is_none());

        let heading = doc.elements_by_tag("h2")[0];
        assert!(!doc.has_class(heading, "highlight-flash"));
    }
}
