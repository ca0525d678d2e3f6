//! Bus handlers: each decodes one delivery, calls a service and maps the
//! outcome onto a settlement.
//!
//! | service error                 | settlement                          |
//! |-------------------------------|-------------------------------------|
//! | none                          | ack                                 |
//! | not found                     | ack, with a warning                 |
//! | validation, invalid transition| rejected (dead-lettered)            |
//! | conflict, transient           | retried, then dead-lettered         |
//! | internal                      | rejected (dead-lettered)            |

use tracing::{Span, warn};

use medchain_events::{Delivery, HandlerError};

use crate::services::{ErrorKind, ServiceResult};

pub mod purchasing;
pub mod suppliers;

pub use purchasing::{ExternalSignalHandler, StockSignalHandler, SupplierRequestHandler};
pub use suppliers::{OrderAuditHandler, OrderGeneratedHandler};

/// Map a service outcome onto the handler result that settles `delivery`.
pub(crate) fn settle<T>(
    log: &Span,
    delivery: &Delivery,
    result: ServiceResult<T>,
) -> Result<(), HandlerError> {
    let Err(err) = result else {
        return Ok(());
    };
    match err.kind() {
        ErrorKind::NotFound => {
            warn!(
                parent: log,
                queue = %delivery.queue,
                message_id = %delivery.message_id,
                error = %err,
                "referenced record not found; message acknowledged"
            );
            Ok(())
        }
        // An optimistic-concurrency loss: the retry reloads fresh state.
        ErrorKind::Conflict | ErrorKind::Transient => Err(HandlerError::Transient(err.to_string())),
        ErrorKind::Validation | ErrorKind::InvalidTransition | ErrorKind::Internal => {
            Err(HandlerError::Rejected(err.to_string()))
        }
    }
}

/// Warn about and acknowledge an event type the handler does not act on.
pub(crate) fn ignore(log: &Span, delivery: &Delivery, event_type: &str) -> Result<(), HandlerError> {
    warn!(
        parent: log,
        queue = %delivery.queue,
        message_id = %delivery.message_id,
        event_type,
        "unexpected event type ignored"
    );
    Ok(())
}
