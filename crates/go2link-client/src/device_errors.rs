//! Device error stream
//!
//! The robot pushes its active error list as an untopiced `errors` frame on
//! connect and `add_error` frames as new errors are raised.

use std::sync::Arc;
use tracing::warn;

use go2link_core::topics::kind;
use go2link_core::{classify, decode_error_report, Classification, DeviceErrorRecord};

use crate::pubsub::PubSub;

/// Subscribe to the robot's error reports. Every decoded record is
/// classified and handed to `callback`; critical ones are also logged.
///
/// Returns the subscription ids (one per report type).
pub async fn subscribe_device_errors<F>(pubsub: &PubSub, callback: F) -> Vec<u32>
where
    F: Fn(&DeviceErrorRecord, &Classification) + Send + Sync + 'static,
{
    let callback = Arc::new(callback);
    let mut ids = Vec::with_capacity(2);

    for report in [kind::ERRORS, kind::ADD_ERROR] {
        let callback = Arc::clone(&callback);
        let id = pubsub
            .subscribe(report, move |data| {
                for record in decode_error_report(data) {
                    match record {
                        Ok(record) => {
                            let classification = classify(&record);
                            if classification.critical {
                                warn!(
                                    source = record.source,
                                    code = %record.code_hex(),
                                    "{}",
                                    classification
                                );
                            }
                            callback(&record, &classification);
                        }
                        Err(e) => warn!("Malformed {} entry: {}", report, e),
                    }
                }
            })
            .await;
        ids.push(id);
    }

    ids
}
