use log::{info, warn};
use thiserror_no_std::Error;

use super::{Endpoint, Transport, TransportError};
use crate::codec::{self, CodecError, JsonBuffer};
use crate::storage::ReadingStore;
use crate::timebase::{TimeSync, Timebase, Uptime};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    #[error("transport failure: {0}")]
    Transport(TransportError),
    #[error("protocol failure: {0}")]
    Codec(CodecError),
    #[error("collector answered with status {0}")]
    Rejected(u16),
}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<CodecError> for SyncError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

/// Runs the collector exchanges over a connected transport
///
/// Every operation reports plain success or failure; a failure never touches
/// retained state, so it is retried on a later wake.
pub struct SyncClient<'t, T> {
    transport: &'t mut T,
    buffer: JsonBuffer,
}

impl<'t, T: Transport> SyncClient<'t, T> {
    pub fn new(transport: &'t mut T) -> Self {
        Self {
            transport,
            buffer: JsonBuffer::new(),
        }
    }

    /// Pull the collector's time and re-anchor `timebase` on success.
    pub async fn sync_base_time(&mut self, timebase: &mut Timebase, uptime: &impl Uptime) -> bool {
        match self.fetch_time().await {
            Ok(sync) => {
                timebase.apply_sync(sync, uptime);
                true
            }
            Err(e) => {
                warn!("Time sync failed: {}", e);
                false
            }
        }
    }

    /// Announce this device to the collector.
    pub async fn register_device(&mut self) -> bool {
        match self.post(Endpoint::Register, &[]).await {
            Ok(()) => {
                info!("Device registered");
                true
            }
            Err(e) => {
                warn!("Registration failed: {}", e);
                false
            }
        }
    }

    /// Send every buffered reading; the store is cleared only once the
    /// collector acknowledged the batch.
    pub async fn upload_readings(&mut self, store: &mut ReadingStore, now: u64) -> bool {
        match self.push_batch(store, now).await {
            Ok(()) => {
                info!("Uploaded {} readings", store.len());
                store.clear();
                true
            }
            Err(e) => {
                warn!("Upload of {} readings failed: {}", store.len(), e);
                false
            }
        }
    }

    async fn fetch_time(&mut self) -> Result<TimeSync, SyncError> {
        let response = self.buffer.space();
        let (status, len) = self.transport.get(Endpoint::Time, response).await?;
        if !status.is_success() {
            return Err(SyncError::Rejected(status.0));
        }

        let body = response.get(..len).ok_or(TransportError::ResponseTooLarge)?;
        Ok(codec::decode_time_sync(body)?)
    }

    async fn push_batch(&mut self, store: &ReadingStore, now: u64) -> Result<(), SyncError> {
        let body = codec::encode_readings(store, now, &mut self.buffer)?;
        let status = self.transport.post(Endpoint::Readings, body).await?;
        if !status.is_success() {
            return Err(SyncError::Rejected(status.0));
        }
        Ok(())
    }

    async fn post(&mut self, endpoint: Endpoint, body: &[u8]) -> Result<(), SyncError> {
        let status = self.transport.post(endpoint, body).await?;
        if !status.is_success() {
            return Err(SyncError::Rejected(status.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;

    use super::*;
    use crate::storage::Reading;
    use crate::test_support::{FakeCollector, FakeUptime, Reply};

    fn filled(count: u64) -> ReadingStore {
        let mut store = ReadingStore::new();
        for i in 0..count {
            store.push(Reading::new(100 + i, 50.0, 20.0, 3.9));
        }
        store
    }

    #[test]
    fn time_sync_applies_collector_time() {
        let mut collector = FakeCollector::new(5_000, 8_600);
        let mut timebase = Timebase::new();
        let uptime = FakeUptime::new(3);

        let ok = block_on(SyncClient::new(&mut collector).sync_base_time(&mut timebase, &uptime));

        assert!(ok);
        assert_eq!(timebase.current_time(&uptime), 5_000);
        assert_eq!(timebase.next_sync(), 8_600);
    }

    #[test]
    fn failed_time_sync_leaves_timebase_untouched() {
        let uptime = FakeUptime::new(0);
        for reply in [
            Reply::Status(503),
            Reply::Fail(TransportError::Timeout),
            Reply::Body(b"{\"next_sync\":1}"),
            Reply::Body(b"not json"),
        ] {
            let mut collector = FakeCollector::new(5_000, 8_600);
            collector.time_reply = reply;
            let mut timebase = Timebase::new();

            let ok =
                block_on(SyncClient::new(&mut collector).sync_base_time(&mut timebase, &uptime));

            assert!(!ok, "{reply:?}");
            assert_eq!(timebase, Timebase::new(), "{reply:?}");
        }
    }

    #[test]
    fn registration_needs_a_2xx() {
        let mut collector = FakeCollector::new(0, 0);
        assert!(block_on(SyncClient::new(&mut collector).register_device()));

        collector.register_reply = Reply::Status(403);
        assert!(!block_on(SyncClient::new(&mut collector).register_device()));

        collector.register_reply = Reply::Fail(TransportError::Unreachable);
        assert!(!block_on(SyncClient::new(&mut collector).register_device()));
    }

    #[test]
    fn upload_clears_only_on_acknowledgment() {
        let mut collector = FakeCollector::new(0, 0);
        collector.readings_reply = Reply::Fail(TransportError::Io);
        let mut store = filled(5);

        assert!(!block_on(SyncClient::new(&mut collector).upload_readings(&mut store, 200)));
        assert_eq!(store.len(), 5);

        collector.readings_reply = Reply::Status(204);
        assert!(block_on(SyncClient::new(&mut collector).upload_readings(&mut store, 201)));
        assert!(store.is_empty());

        let sent = &collector.received[1];
        assert_eq!(sent.now, 201);
        assert!(sent.timestamps.iter().copied().eq(100..105));
    }
}
