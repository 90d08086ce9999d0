//! Inbound want-list handling
//!
//! [`Responder::handle`] decodes one inbound message, resolves every entry
//! against a [`BlockSource`], runs the response policy and streams the
//! answers back as one or more size-bounded messages.

use std::mem;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::block_source::BlockSource;
use crate::connection::{Connection, SendContext, MAX_FRAME_SIZE};
use crate::entry::Entry;
use crate::message::Message;
use crate::protocol::{ProtocolError, ProtocolVersion};
use crate::response::{respond, Candidate, Resolution};
use crate::telemetry::{
    Telemetry, TelemetryError, METRIC_ACTIVE_REQUESTS, METRIC_HANDLE_DURATION, METRIC_REQUESTS,
    METRIC_SENT_BLOCKS, METRIC_SENT_MESSAGES, METRIC_SENT_PRESENCES, METRIC_SOURCE_ERRORS,
    METRIC_TOTAL_ENTRIES,
};
use crate::wire::WantType;

#[derive(Error, Debug)]
pub enum ResponderError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// What one call to [`Responder::handle`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResponseSummary {
    pub entries: usize,
    pub cancelled: usize,
    pub blocks: usize,
    pub presences: usize,
    pub messages: usize,
}

pub struct Responder<S: ?Sized> {
    source: Arc<S>,
    telemetry: Telemetry,
    max_message_size: usize,
}

impl<S> Responder<S>
where
    S: BlockSource + ?Sized,
{
    pub fn new(source: Arc<S>, telemetry: Telemetry) -> Self {
        Self {
            source,
            telemetry,
            max_message_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Answer one encoded inbound message received on `protocol`.
    ///
    /// A message that fails to decode is rejected before anything is sent.
    pub async fn handle<C>(
        &self,
        encoded: &[u8],
        protocol: ProtocolVersion,
        connection: &C,
    ) -> Result<ResponseSummary, ResponderError>
    where
        C: Connection + ?Sized,
    {
        let start = Instant::now();
        note(
            self.telemetry
                .increase_label_count(METRIC_REQUESTS, &[protocol.as_str()], 1),
        );
        note(self.telemetry.increase_gauge(METRIC_ACTIVE_REQUESTS, 1));

        let result = self.process(encoded, protocol, connection).await;

        note(self.telemetry.decrease_gauge(METRIC_ACTIVE_REQUESTS, 1));
        note(
            self.telemetry
                .record_duration(METRIC_HANDLE_DURATION, start.elapsed()),
        );

        match &result {
            Ok(summary) => debug!(
                "Handled {} message: {} entries, {} blocks, {} presences in {} messages",
                protocol, summary.entries, summary.blocks, summary.presences, summary.messages
            ),
            Err(e) => warn!("Rejected {} message: {}", protocol, e),
        }
        result
    }

    async fn process<C>(
        &self,
        encoded: &[u8],
        protocol: ProtocolVersion,
        connection: &C,
    ) -> Result<ResponseSummary, ResponderError>
    where
        C: Connection + ?Sized,
    {
        let inbound = Message::decode(encoded, protocol)?;
        let context = SendContext::new(protocol, connection);
        let mut summary = ResponseSummary {
            entries: inbound.wantlist().len(),
            ..Default::default()
        };
        note(
            self.telemetry
                .increase_count(METRIC_TOTAL_ENTRIES, summary.entries as u64),
        );

        let mut current = Message::default();
        for entry in &inbound.wantlist().entries {
            if entry.cancel() {
                summary.cancelled += 1;
                continue;
            }

            let candidate = self.resolve(entry).await;
            let Some(response) = respond(&candidate, protocol) else {
                continue;
            };

            let size = response.payload_size();
            if current.has_responses() && !current.fits(&response, size, self.max_message_size) {
                let full = mem::take(&mut current);
                self.flush(full, &context, &mut summary).await?;
            }
            current.append(response, size);
        }
        self.flush(current, &context, &mut summary).await?;

        Ok(summary)
    }

    async fn resolve(&self, entry: &Entry) -> Candidate {
        let mut candidate = Candidate::new(entry.clone());
        let key = candidate.key();

        let resolution = match entry.want_type() {
            WantType::Block => self
                .source
                .fetch(&key)
                .await
                .map(|data| data.map_or(Resolution::NotFound, Resolution::Content)),
            WantType::Have => self
                .source
                .query(&key)
                .await
                .map(|held| if held { Resolution::Present } else { Resolution::NotFound }),
        };

        match resolution {
            Ok(resolution) => {
                trace!("Resolved {} as {:?}", key, resolution_kind(&resolution));
                candidate.resolution = Some(resolution);
            }
            Err(e) => {
                warn!("Block source failed for {}: {}", key, e);
                note(self.telemetry.increase_count(METRIC_SOURCE_ERRORS, 1));
            }
        }
        candidate
    }

    async fn flush<C>(
        &self,
        message: Message,
        context: &SendContext<'_, C>,
        summary: &mut ResponseSummary,
    ) -> Result<(), ResponderError>
    where
        C: Connection + ?Sized,
    {
        let blocks = message.blocks().len();
        let presences = message.block_presences().len();

        if message.send(context).await? {
            summary.blocks += blocks;
            summary.presences += presences;
            summary.messages += 1;
            note(self.telemetry.increase_count(METRIC_SENT_BLOCKS, blocks as u64));
            note(
                self.telemetry
                    .increase_count(METRIC_SENT_PRESENCES, presences as u64),
            );
            note(self.telemetry.increase_count(METRIC_SENT_MESSAGES, 1));
        }
        Ok(())
    }
}

fn resolution_kind(resolution: &Resolution) -> &'static str {
    match resolution {
        Resolution::Content(_) => "content",
        Resolution::Present => "present",
        Resolution::NotFound => "not found",
    }
}

/// Telemetry is best effort; a missing metric never fails a request.
fn note(result: Result<(), TelemetryError>) {
    if let Err(e) = result {
        debug!("Telemetry: {}", e);
    }
}
