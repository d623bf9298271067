//! Enqueueing messages

use std::sync::Arc;

use chrono::{DateTime, Utc};
use postroom_common::{
    Signal,
    address::Address,
    clock::Clock,
    message::{Attachment, Message, MessageError, Priority, Status},
};
use postroom_dispatch::{
    DeliveryEvent, DispatchError, EventKind, ProcessReport, QueueProcessor,
};
use postroom_store::{MessageStore, StoreError};
use thiserror::Error;

/// Errors raised while accepting a message.
#[derive(Debug, Error)]
pub enum MailError {
    /// The draft violates an enqueue constraint.
    #[error("Invalid message: {0}")]
    Invalid(#[from] MessageError),

    /// The store refused the record.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Builder for an outbound message.
#[derive(Debug, Clone)]
pub struct Draft {
    from: Address,
    to: Vec<Address>,
    cc: Vec<Address>,
    bcc: Vec<Address>,
    subject: String,
    body: String,
    html_body: Option<String>,
    attachments: Vec<Attachment>,
    scheduled_time: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    priority: Option<Priority>,
    backend_alias: String,
}

impl Draft {
    #[must_use]
    pub fn new(from: Address) -> Self {
        Self {
            from,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            body: String::new(),
            html_body: None,
            attachments: Vec::new(),
            scheduled_time: None,
            expires_at: None,
            priority: None,
            backend_alias: String::new(),
        }
    }

    #[must_use]
    pub fn to(mut self, address: Address) -> Self {
        self.to.push(address);
        self
    }

    #[must_use]
    pub fn cc(mut self, address: Address) -> Self {
        self.cc.push(address);
        self
    }

    #[must_use]
    pub fn bcc(mut self, address: Address) -> Self {
        self.bcc.push(address);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn html_body(mut self, html: impl Into<String>) -> Self {
        self.html_body = Some(html.into());
        self
    }

    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Earliest send time. Unset means immediately eligible.
    #[must_use]
    pub const fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_time = Some(at);
        self
    }

    /// The message will not be sent at or after this instant.
    #[must_use]
    pub const fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Deliver through this registered backend instead of the default.
    #[must_use]
    pub fn via_backend(mut self, alias: impl Into<String>) -> Self {
        self.backend_alias = alias.into();
        self
    }
}

/// The producer- and worker-facing surface of one postroom process.
///
/// Wraps the queue engine together with the enqueue path, sharing its
/// store, backend registry, event bus, and clock.
#[derive(Debug)]
pub struct Mailer {
    processor: QueueProcessor,
    clock: Arc<dyn Clock>,
    message_id_fqdn: Option<String>,
}

impl Mailer {
    #[must_use]
    pub const fn new(
        processor: QueueProcessor,
        clock: Arc<dyn Clock>,
        message_id_fqdn: Option<String>,
    ) -> Self {
        Self {
            processor,
            clock,
            message_id_fqdn,
        }
    }

    /// Accept a draft into the queue.
    ///
    /// Messages with [`Priority::Now`] bypass the queue entirely: they are
    /// dispatched synchronously before this call returns and settle
    /// straight to `Sent` or `Failed`, never participating in the dequeue
    /// protocol (and never being requeued).
    ///
    /// # Errors
    /// On validation failures or store faults; never for the delivery
    /// result of a `Now` message (inspect the returned record's status).
    pub async fn queue(&self, draft: Draft) -> Result<Message, MailError> {
        let now = self.clock.now();

        let mut message = Message::new(draft.from, draft.to, now);
        message.cc = draft.cc;
        message.bcc = draft.bcc;
        message.subject = draft.subject;
        message.body = draft.body;
        message.html_body = draft.html_body;
        message.attachments = draft.attachments;
        message.scheduled_time = draft.scheduled_time;
        message.expires_at = draft.expires_at;
        message.priority = draft
            .priority
            .unwrap_or(self.processor.config().default_priority);
        message.backend_alias = draft.backend_alias;
        message.message_id = self
            .message_id_fqdn
            .as_ref()
            .map(|fqdn| format!("<{}@{fqdn}>", message.id));

        message.validate()?;

        if message.priority == Priority::Now {
            return self.dispatch_now(message).await;
        }

        self.store().insert(&message).await?;

        Ok(message)
    }

    /// The synchronous path for `Now` messages: insert already claimed,
    /// attempt once, settle terminally.
    async fn dispatch_now(&self, mut message: Message) -> Result<Message, MailError> {
        let now = self.clock.now();
        message.status = Status::Sending;
        message.claimed_at = Some(now);
        self.store().insert(&message).await?;

        let outcome = self.processor.executor().attempt(&message).await;
        let settled_at = self.clock.now();

        message.claimed_at = None;
        let kind = if outcome.is_delivered() {
            message.status = Status::Sent;
            EventKind::Sent
        } else {
            message.status = Status::Failed;
            EventKind::Failed
        };

        // Commit before publishing, as everywhere else
        self.store().update(&message).await?;

        self.processor.events().publish(&DeliveryEvent {
            kind,
            message_id: message.id.clone(),
            retries: 0,
            error: outcome.error().map(str::to_string),
            occurred_at: settled_at,
        });

        Ok(message)
    }

    /// Claim and drain one batch. See [`QueueProcessor::process_queue`].
    ///
    /// # Errors
    /// On store or configuration faults only.
    pub async fn process_queue(&self) -> Result<ProcessReport, DispatchError> {
        self.processor.process_queue().await
    }

    /// Drain the queue batch by batch. See
    /// [`QueueProcessor::process_until_done`].
    ///
    /// # Errors
    /// On store or configuration faults only.
    pub async fn process_until_done(&self) -> Result<ProcessReport, DispatchError> {
        self.processor.process_until_done().await
    }

    /// Run the worker loop until shutdown. See [`QueueProcessor::serve`].
    ///
    /// # Errors
    /// On channel breakage.
    pub async fn serve(
        &self,
        shutdown: tokio::sync::broadcast::Receiver<Signal>,
    ) -> Result<(), DispatchError> {
        self.processor.serve(shutdown).await
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn MessageStore> {
        self.processor.store()
    }
}
