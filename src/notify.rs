//! Delivery of budget alerts to the notification collaborator.
//!
//! The engine's job ends at producing an [AlertEvent]. A [Notifier] decides
//! how the event reaches the owner.

use std::io::Write;

use crate::{Error, budget::AlertEvent};

/// Receives budget alerts that are due for delivery.
pub trait Notifier {
    /// Deliver `event`.
    ///
    /// # Errors
    /// Returns [Error::NotificationFailed] if the event could not be delivered.
    /// The alert is then not marked as delivered and will be retried.
    fn notify(&mut self, event: &AlertEvent) -> Result<(), Error>;
}

/// Collects events in memory.
impl Notifier for Vec<AlertEvent> {
    fn notify(&mut self, event: &AlertEvent) -> Result<(), Error> {
        self.push(event.clone());
        Ok(())
    }
}

/// Logs each alert as a `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&mut self, event: &AlertEvent) -> Result<(), Error> {
        tracing::warn!(
            owner = %event.owner_id,
            account_id = event.account_id,
            band = %event.band,
            percent_used = %event.percent_used,
            period_end = %event.period_end,
            "budget alert"
        );
        Ok(())
    }
}

/// Writes each alert as one line of JSON.
#[derive(Debug)]
pub struct JsonLinesNotifier<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesNotifier<W> {
    /// Write alerts to `writer`.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Get the writer back.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Notifier for JsonLinesNotifier<W> {
    fn notify(&mut self, event: &AlertEvent) -> Result<(), Error> {
        serde_json::to_writer(&mut self.writer, event)
            .map_err(|error| Error::NotificationFailed(error.to_string()))?;
        writeln!(self.writer)
            .and_then(|_| self.writer.flush())
            .map_err(|error| Error::NotificationFailed(error.to_string()))
    }
}
