//! Outbound notification delivery for approval events.
//!
//! The workflow decides *whether* and *where* a notification goes; this
//! crate only renders and delivers it:
//! - **Webhook** (`dispatcher`) - Adaptive Card payloads posted to a
//!   Teams / Power Automate workflow URL
//! - **Email** (`email`) - plain-text messages handed to a pluggable
//!   transport
//!
//! Delivery failures are logged and swallowed. An approval transition that
//! already committed must never be rolled back because a webhook endpoint
//! was down.

pub mod dispatcher;
pub mod email;

pub use dispatcher::HttpNotificationDispatcher;
pub use email::{
    EmailError, EmailMessage, EmailTransport, LogOnlyEmailTransport, RecordingEmailTransport,
};
