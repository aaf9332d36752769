use anyhow::Result;
use std::collections::HashSet;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::page::{ElementId, Page};
use crate::capture::registry::SourceRegistry;
use crate::capture::utils::{self, ExportOrder};
use crate::error::CaptureError;
use crate::event::{CaptureOrigin, MutationBatch, MutationRecord, SourceCaptured};

/// Called after every successful insertion with the new capture and the
/// registry as it stands.
pub type ProgressHook = Box<dyn FnMut(&SourceCaptured, &SourceRegistry)>;

/// Collects every source ever observed on the targets matched at
/// initialization.
///
/// The session owns its registry and the set of subscribed elements. Targets
/// that appear after [`CaptureSession::initialize`] are never picked up.
pub struct CaptureSession {
    selector: String,
    attribute: String,
    registry: SourceRegistry,
    subscriptions: HashSet<ElementId>,
    progress: Option<ProgressHook>,
}

impl CaptureSession {
    /// Queries `page` once for `selector`, records each match's current
    /// `attribute` and subscribes to later changes of that attribute.
    pub fn initialize<P: Page + ?Sized>(
        page: &P,
        selector: &str,
        attribute: &str,
        progress: Option<ProgressHook>,
    ) -> Result<Self, CaptureError> {
        let targets = page.query_selector_all(selector)?;
        info!("Selector `{}` matched {} targets", selector, targets.len());

        let mut session = Self {
            selector: selector.to_string(),
            attribute: attribute.to_string(),
            registry: SourceRegistry::new(),
            subscriptions: HashSet::with_capacity(targets.len()),
            progress,
        };

        for element in targets {
            match page.resolved_source(element, attribute) {
                Some(source) => {
                    session.record(element, &source, CaptureOrigin::Initial);
                }
                None => debug!("Target {} has no {}, skipping", element, attribute),
            }
            session.subscriptions.insert(element);
        }

        info!(
            "Capture session ready: {} sources, {} subscriptions",
            session.registry.len(),
            session.subscriptions.len()
        );
        Ok(session)
    }

    /// Records a new value seen on a subscribed element.
    ///
    /// Returns `true` if the registry grew.
    pub fn on_source_changed(&mut self, element: ElementId, new_source: &str) -> bool {
        self.record(element, new_source, CaptureOrigin::Mutation)
    }

    fn record(&mut self, element: ElementId, source: &str, origin: CaptureOrigin) -> bool {
        if source.is_empty() {
            debug!("Empty source on {}, skipping", element);
            return false;
        }
        if !self.registry.insert(source) {
            debug!("Already captured {}", source);
            return false;
        }

        let event = SourceCaptured::new(source.to_string(), element, origin, self.registry.len());
        if let Some(progress) = self.progress.as_mut() {
            progress(&event, &self.registry);
        }
        true
    }

    /// Handles one delivered batch. Values are read back from `page`, so the
    /// batch must already be reflected there.
    ///
    /// Returns the number of new sources.
    pub fn handle_batch<P: Page + ?Sized>(&mut self, page: &P, batch: &[MutationRecord]) -> usize {
        let mut added = 0;
        for record in batch {
            if !record.is_attribute(&self.attribute) {
                debug!("Ignoring {:?} record on {}", record.kind, record.target);
                continue;
            }
            if !self.is_subscribed(record.target) {
                debug!("Ignoring record on unsubscribed {}", record.target);
                continue;
            }

            if let Some(source) = page.resolved_source(record.target, &self.attribute) {
                if self.on_source_changed(record.target, &source) {
                    added += 1;
                }
            }
        }
        added
    }

    /// Consumes batches until the stream closes or `cancel_token` fires.
    ///
    /// Each batch is applied to `page` in full before it is handled, so an
    /// element changed twice within one batch contributes only its final
    /// value. Returns the number of batches handled.
    pub async fn run<P: Page + ?Sized>(
        &mut self,
        page: &mut P,
        mut receiver: Receiver<MutationBatch>,
        cancel_token: CancellationToken,
    ) -> usize {
        let mut handled = 0;

        loop {
            tokio::select! {
                batch = receiver.recv() => {
                    let Some(batch) = batch else {
                        info!("Notification stream closed after {} batches", handled);
                        break;
                    };

                    for record in &batch {
                        if let Err(e) = page.apply(record) {
                            warn!("Failed to apply record: {}", e);
                        }
                    }
                    let added = self.handle_batch(page, &batch);
                    handled += 1;
                    debug!("Batch {}: {} records, {} new sources", handled, batch.len(), added);
                }
                _ = cancel_token.cancelled() => {
                    info!("Capture cancelled after {} batches", handled);
                    break;
                }
            }
        }

        handled
    }

    /// Ordered copy of the registry. The registry itself is left untouched.
    pub fn export(&self, order: ExportOrder) -> Vec<String> {
        utils::ordered(self.registry.as_slice(), order)
    }

    pub fn export_json(&self, order: ExportOrder, pretty: bool) -> Result<String> {
        utils::to_json(&self.export(order), pretty)
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn is_subscribed(&self, element: ElementId) -> bool {
        self.subscriptions.contains(&element)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}
