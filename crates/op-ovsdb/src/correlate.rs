//! Result correlation: turn a positional result array into one [`Outcome`]

use tracing::{debug, error, warn};

use crate::error::Result;
use crate::operation::OperationResult;
use crate::outcome::{Outcome, StatusCode};
use crate::transact::TransactBuilder;

/// Attach `results` to the operations of `tx` by position and derive the
/// outcome of the whole batch.
///
/// - the first result with a non-blank error fails the batch, but every
///   result is still attached so callers can inspect them
/// - a result array longer than the operation list is a protocol anomaly,
///   reported from the trailing entry
/// - on success, `insert_index` picks the insert whose committed uuid goes
///   into the outcome; a missing uuid still counts as success because the
///   row was committed
pub fn correlate(
    tx: &mut TransactBuilder,
    results: Vec<OperationResult>,
    insert_index: Option<usize>,
) -> Outcome {
    let op_count = tx.len();
    let result_count = results.len();
    let inserted = insert_index.and_then(|i| results.get(i)).and_then(|r| r.uuid.clone());
    let trailing = (result_count > op_count)
        .then(|| results.last().cloned())
        .flatten();

    let mut failure: Option<Outcome> = None;
    for (index, result) in results.into_iter().enumerate().take(op_count) {
        if result.has_error() && failure.is_none() {
            let op = &tx.operations()[index];
            warn!(
                "OVSDB {} on {} (op {}) failed: {}",
                op.kind(),
                op.table(),
                index,
                result.error_message()
            );
            failure = Some(Outcome::failure(
                StatusCode::OperationFailed,
                result.error_message(),
            ));
        }
        tx.attach_result(index, result);
    }

    if let Some(extra) = trailing {
        error!(
            "OVSDB returned {} results for {} operations on {}; trailing error: {}",
            result_count,
            op_count,
            tx.db_name(),
            extra.error_message()
        );
        return Outcome::failure(StatusCode::ProtocolAnomaly, extra.error_message());
    }

    if let Some(failure) = failure {
        return failure;
    }

    match inserted {
        Some(uuid) => {
            debug!("OVSDB transaction on {} committed row {}", tx.db_name(), uuid);
            Outcome::success_with_uuid(uuid)
        }
        None => {
            if let Some(index) = insert_index {
                debug!(
                    "No uuid at result {} of {} (results: {})",
                    index,
                    tx.db_name(),
                    result_count
                );
            }
            Outcome::success()
        }
    }
}

/// Like [`correlate`], but starting from the transport's answer. A transport
/// failure becomes `ServiceUnavailable` or `InternalError`, never an empty
/// success.
pub fn correlate_response(
    tx: &mut TransactBuilder,
    response: Result<Vec<OperationResult>>,
    insert_index: Option<usize>,
) -> Outcome {
    match response {
        Ok(results) => correlate(tx, results, insert_index),
        Err(e) => {
            error!("OVSDB transaction on {} not completed: {}", tx.db_name(), e);
            let outcome = Outcome::from(e);
            if outcome.code() == StatusCode::ServiceUnavailable {
                outcome
            } else {
                Outcome::failure(
                    StatusCode::InternalError,
                    outcome.description().unwrap_or_default(),
                )
            }
        }
    }
}
