//! Subscription listeners.

use futures::StreamExt;

use crate::bridge::{Offer, TriggerSender, observed_text};
use crate::cloud::ChangeStream;
use crate::error::Result;

/// Offer every status change to the trigger bridge.
///
/// Ends when the stream ends or the bridge is gone. A stream error is returned.
pub async fn forward_status(mut changes: ChangeStream, sender: TriggerSender) -> Result<()> {
    while let Some(change) = changes.next().await {
        let change = change?;
        if !change.is_root() {
            log::debug!("Ignoring nested status change at {}", change.path);
            continue;
        }

        let observed = observed_text(&change.data);
        match sender.offer(observed.as_deref()) {
            Offer::Ignored => log::debug!("Status {:?} ignored", observed),
            Offer::Queued => log::info!("Status {:?} queued a task", observed),
            Offer::Deferred => {
                log::info!("Status {:?} deferred until the running task ends", observed)
            }
            Offer::Closed => {
                log::info!("Trigger bridge gone, stopping status listener");
                return Ok(());
            }
        }
    }
    log::warn!("Status subscription ended");
    Ok(())
}

/// Log changes under the reserved servo key. Nothing acts on them.
pub async fn watch_reserved(mut changes: ChangeStream, key: String) -> Result<()> {
    while let Some(change) = changes.next().await {
        match change {
            Ok(change) => log::debug!("{}{} = {}", key, change.path, change.data),
            Err(e) => {
                log::warn!("Subscription to {} failed: {}", key, e);
                return Err(e);
            }
        }
    }
    Ok(())
}
