//! Renders approval events into outbound messages and delivers them over
//! the channel the workflow selected.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use signoff_core::{Channel, Notification, NotificationDispatcher, NotificationEvent, Order};

use crate::email::{EmailError, EmailMessage, EmailTransport};

/// Upper bound on one webhook delivery attempt.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
enum DispatchError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("webhook endpoint returned status {0}")]
    WebhookStatus(u16),
    #[error(transparent)]
    Email(#[from] EmailError),
}

pub struct HttpNotificationDispatcher<E> {
    http: reqwest::Client,
    email: E,
}

impl<E: EmailTransport> HttpNotificationDispatcher<E> {
    pub fn new(email: E) -> Self {
        Self { http: reqwest::Client::new(), email }
    }

    async fn post_webhook(&self, url: &str, event: &NotificationEvent) -> Result<(), DispatchError> {
        let payload = webhook_payload(event);
        let response = self
            .http
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await?;

        // Power Automate returns 202 Accepted on success.
        match response.status().as_u16() {
            200 | 202 => Ok(()),
            status => Err(DispatchError::WebhookStatus(status)),
        }
    }

    async fn send_email(&self, to: &str, event: &NotificationEvent) -> Result<(), DispatchError> {
        let message = email_message(to, event);
        self.email.deliver(&message).await?;
        Ok(())
    }
}

#[async_trait]
impl<E: EmailTransport> NotificationDispatcher for HttpNotificationDispatcher<E> {
    async fn dispatch(&self, notification: Notification) {
        let Notification { channel, event } = notification;
        let order_id = event_order(&event).id.to_string();

        let outcome = match &channel {
            Channel::None => {
                debug!(order = %order_id, "no notification channel selected");
                return;
            }
            Channel::Webhook(url) => self.post_webhook(url, &event).await,
            Channel::Email(address) => self.send_email(address, &event).await,
        };

        match outcome {
            Ok(()) => info!(order = %order_id, "notification delivered"),
            Err(error) => {
                warn!(order = %order_id, %error, "notification delivery failed")
            }
        }
    }
}

fn event_order(event: &NotificationEvent) -> &Order {
    match event {
        NotificationEvent::ApprovalRequested { order, .. } => order,
        NotificationEvent::ApprovalDecided { order, .. } => order,
    }
}

fn supplier_display(order: &Order) -> &str {
    order.supplier.as_deref().unwrap_or("N/A")
}

fn total_display(order: &Order) -> String {
    match order.total {
        Some(total) => total.to_string(),
        None => "N/A".to_string(),
    }
}

/// Adaptive Card payload in the shape Power Automate workflow webhooks
/// expect: a `message` wrapping one card attachment.
fn webhook_payload(event: &NotificationEvent) -> Value {
    let order = event_order(event);
    let title = match event {
        NotificationEvent::ApprovalRequested { .. } => "PO Approval Request",
        NotificationEvent::ApprovalDecided { approved: true, .. } => "PO Approved",
        NotificationEvent::ApprovalDecided { approved: false, .. } => "PO Rejected",
    };

    json!({
        "type": "message",
        "attachments": [
            {
                "contentType": "application/vnd.microsoft.card.adaptive",
                "contentUrl": null,
                "content": {
                    "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                    "type": "AdaptiveCard",
                    "version": "1.4",
                    "body": [
                        {
                            "type": "TextBlock",
                            "text": title,
                            "weight": "Bolder",
                            "size": "Medium"
                        },
                        {
                            "type": "FactSet",
                            "facts": [
                                { "title": "Order:", "value": order.reference },
                                { "title": "Supplier:", "value": supplier_display(order) },
                                { "title": "Total:", "value": total_display(order) }
                            ]
                        }
                    ]
                }
            }
        ]
    })
}

fn email_message(to: &str, event: &NotificationEvent) -> EmailMessage {
    match event {
        NotificationEvent::ApprovalRequested { order, request, target } => {
            let approver_name =
                target.as_ref().map(|user| user.display_name.as_str()).unwrap_or("Approver");
            let notes_section = if request.notes.is_empty() {
                String::new()
            } else {
                format!("\nNotes from requester:\n{}", request.notes)
            };

            EmailMessage {
                to: to.to_string(),
                subject: format!("[Signoff] Approval Required: {}", order.reference),
                body: format!(
                    "Hi {approver_name},\n\n\
                     {requester} has requested your approval for Purchase Order {reference}.\n\n\
                     Order Details:\n\
                     - Reference: {reference}\n\
                     - Supplier: {supplier}\n\
                     - Total Value: {total}{notes_section}\n\n\
                     ---\n\
                     This is an automated message from Signoff.\n",
                    requester = request.requested_by.display_name,
                    reference = order.reference,
                    supplier = supplier_display(order),
                    total = total_display(order),
                ),
            }
        }
        NotificationEvent::ApprovalDecided { order, request, approved } => {
            let decision_word = if *approved { "Approved" } else { "Rejected" };
            let approver_name = request
                .actual_approver
                .as_ref()
                .map(|user| user.display_name.as_str())
                .unwrap_or("Unknown");
            let notes_section = if request.notes.is_empty() {
                String::new()
            } else {
                format!("\nNotes:\n{}", request.notes)
            };

            EmailMessage {
                to: to.to_string(),
                subject: format!("[Signoff] PO {} - {decision_word}", order.reference),
                body: format!(
                    "Hi {requester},\n\n\
                     Your approval request for Purchase Order {reference} has been {decision_lower}.\n\n\
                     Order Details:\n\
                     - Reference: {reference}\n\
                     - Supplier: {supplier}\n\
                     - Total Value: {total}\n\
                     - Decision: {decision_word}\n\
                     - Decided by: {approver_name}{notes_section}\n\n\
                     ---\n\
                     This is an automated message from Signoff.\n",
                    requester = request.requested_by.display_name,
                    reference = order.reference,
                    decision_lower = decision_word.to_lowercase(),
                    supplier = supplier_display(order),
                    total = total_display(order),
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use signoff_core::{
        ApprovalRequest, ApprovalStatus, Channel, Notification, NotificationDispatcher,
        NotificationEvent, Order, OrderId, OrderStatus, UserId, UserRef,
    };

    use crate::email::{EmailError, EmailMessage, EmailTransport, RecordingEmailTransport};

    use super::{email_message, webhook_payload, HttpNotificationDispatcher};

    fn order() -> Order {
        Order {
            id: OrderId("17".to_string()),
            reference: "PO-0017".to_string(),
            supplier: Some("Acme Fasteners".to_string()),
            total: Some(Decimal::new(12_500, 0)),
            status: OrderStatus::Pending,
        }
    }

    fn request(notes: &str) -> ApprovalRequest {
        ApprovalRequest {
            level: 1,
            status: ApprovalStatus::Pending,
            requested_by: UserRef::new(UserId(1), "Bob Builder"),
            requested_approver: Some(UserRef::new(UserId(3), "Alice Senior")),
            actual_approver: None,
            requested_at: Utc::now(),
            decided_at: None,
            notes: notes.to_string(),
        }
    }

    #[test]
    fn webhook_payload_is_an_adaptive_card_with_order_facts() {
        let event = NotificationEvent::ApprovalRequested {
            order: order(),
            request: request(""),
            target: None,
        };

        let payload = webhook_payload(&event);
        assert_eq!(payload["type"], "message");

        let attachment = &payload["attachments"][0];
        assert_eq!(attachment["contentType"], "application/vnd.microsoft.card.adaptive");
        assert_eq!(attachment["content"]["body"][0]["text"], "PO Approval Request");

        let facts = &attachment["content"]["body"][1]["facts"];
        assert_eq!(facts[0]["value"], "PO-0017");
        assert_eq!(facts[1]["value"], "Acme Fasteners");
        assert_eq!(facts[2]["value"], "12500");
    }

    #[test]
    fn webhook_payload_falls_back_for_missing_supplier_and_total() {
        let mut bare = order();
        bare.supplier = None;
        bare.total = None;
        let event = NotificationEvent::ApprovalRequested {
            order: bare,
            request: request(""),
            target: None,
        };

        let facts = &webhook_payload(&event)["attachments"][0]["content"]["body"][1]["facts"];
        assert_eq!(facts[1]["value"], "N/A");
        assert_eq!(facts[2]["value"], "N/A");
    }

    #[test]
    fn request_email_names_the_target_and_includes_notes() {
        let event = NotificationEvent::ApprovalRequested {
            order: order(),
            request: request("urgent restock"),
            target: Some(UserRef::new(UserId(3), "Alice Senior")),
        };

        let message = email_message("alice@example.com", &event);
        assert_eq!(message.to, "alice@example.com");
        assert_eq!(message.subject, "[Signoff] Approval Required: PO-0017");
        assert!(message.body.starts_with("Hi Alice Senior,"));
        assert!(message.body.contains("Bob Builder has requested your approval"));
        assert!(message.body.contains("Notes from requester:\nurgent restock"));
    }

    #[test]
    fn untargeted_request_email_uses_generic_greeting() {
        let event = NotificationEvent::ApprovalRequested {
            order: order(),
            request: request(""),
            target: None,
        };

        let message = email_message("team@example.com", &event);
        assert!(message.body.starts_with("Hi Approver,"));
        assert!(!message.body.contains("Notes from requester"));
    }

    #[test]
    fn decision_email_reports_rejection_and_decider() {
        let mut decided = request("urgent restock\ntoo expensive this quarter");
        decided.status = ApprovalStatus::Rejected;
        decided.actual_approver = Some(UserRef::new(UserId(3), "Alice Senior"));
        decided.decided_at = Some(Utc::now());

        let event = NotificationEvent::ApprovalDecided {
            order: order(),
            request: decided,
            approved: false,
        };

        let message = email_message("bob@example.com", &event);
        assert_eq!(message.subject, "[Signoff] PO PO-0017 - Rejected");
        assert!(message.body.contains("has been rejected"));
        assert!(message.body.contains("Decided by: Alice Senior"));
        assert!(message.body.contains("too expensive this quarter"));
    }

    #[tokio::test]
    async fn email_channel_hands_the_message_to_the_transport() {
        let transport = RecordingEmailTransport::default();
        let dispatcher = HttpNotificationDispatcher::new(transport.clone());

        dispatcher
            .dispatch(Notification {
                channel: Channel::Email("alice@example.com".to_string()),
                event: NotificationEvent::ApprovalRequested {
                    order: order(),
                    request: request(""),
                    target: Some(UserRef::new(UserId(3), "Alice Senior")),
                },
            })
            .await;

        let delivered = transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].to, "alice@example.com");
    }

    #[tokio::test]
    async fn no_channel_skips_delivery_entirely() {
        let transport = RecordingEmailTransport::default();
        let dispatcher = HttpNotificationDispatcher::new(transport.clone());

        dispatcher
            .dispatch(Notification {
                channel: Channel::None,
                event: NotificationEvent::ApprovalRequested {
                    order: order(),
                    request: request(""),
                    target: None,
                },
            })
            .await;

        assert!(transport.delivered().is_empty());
    }

    struct FailingTransport;

    #[async_trait::async_trait]
    impl EmailTransport for FailingTransport {
        async fn deliver(&self, _message: &EmailMessage) -> Result<(), EmailError> {
            Err(EmailError("relay unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn transport_failures_are_swallowed() {
        let dispatcher = HttpNotificationDispatcher::new(FailingTransport);

        // Must return normally; the workflow never sees delivery errors.
        dispatcher
            .dispatch(Notification {
                channel: Channel::Email("bob@example.com".to_string()),
                event: NotificationEvent::ApprovalDecided {
                    order: order(),
                    request: request(""),
                    approved: true,
                },
            })
            .await;
    }
}
