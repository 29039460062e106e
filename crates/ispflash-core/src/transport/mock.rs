//! Mock transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::traits::{Transport, TransportError};

#[derive(Debug, Default)]
struct MockState {
    /// Queued responses returned on read, in order.
    responses: VecDeque<Vec<u8>>,
    /// Captured writes.
    writes: Vec<Vec<u8>>,
    /// Captured read requests (header, length).
    reads: Vec<(Vec<u8>, usize)>,
    /// Captured settle delays.
    settles: Vec<Duration>,
    /// Writes starting with one of these prefixes fail.
    failing_prefixes: Vec<Vec<u8>>,
    disconnected: bool,
}

/// Mock transport for unit testing protocol and state machine logic.
///
/// Clones share state, so a test can keep a handle after moving the
/// transport into a session. Settle delays are recorded, never slept.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a raw response to be returned on the next read.
    pub fn queue_response(&self, bytes: &[u8]) {
        self.lock().responses.push_back(bytes.to_vec());
    }

    /// Queue a one-byte status response.
    pub fn queue_status(&self, status: u8) {
        self.queue_response(&[status]);
    }

    /// Queue the same status `count` times.
    pub fn queue_status_n(&self, status: u8, count: usize) {
        for _ in 0..count {
            self.queue_status(status);
        }
    }

    /// Queue a little-endian 16-bit register value.
    pub fn queue_word(&self, word: u16) {
        self.queue_response(&word.to_le_bytes());
    }

    /// Make every write whose frame starts with `prefix` fail.
    pub fn fail_writes_starting_with(&self, prefix: &[u8]) {
        self.lock().failing_prefixes.push(prefix.to_vec());
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Get all captured read requests.
    pub fn get_reads(&self) -> Vec<(Vec<u8>, usize)> {
        self.lock().reads.clone()
    }

    /// Get all captured settle delays.
    pub fn get_settles(&self) -> Vec<Duration> {
        self.lock().settles.clone()
    }

    /// Count captured writes equal to `frame`.
    pub fn count_writes(&self, frame: &[u8]) -> usize {
        self.lock()
            .writes
            .iter()
            .filter(|w| w.as_slice() == frame)
            .count()
    }

    /// Number of queued responses not yet consumed.
    pub fn pending_responses(&self) -> usize {
        self.lock().responses.len()
    }

    /// Clear captured writes and reads.
    pub fn clear_log(&self) {
        let mut state = self.lock();
        state.writes.clear();
        state.reads.clear();
        state.settles.clear();
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        self.lock().disconnected = false;
    }
}

impl Transport for MockTransport {
    fn write(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.writes.push(frame.to_vec());
        if state
            .failing_prefixes
            .iter()
            .any(|prefix| frame.starts_with(prefix))
        {
            return Err(TransportError::WriteFailed("injected failure".into()));
        }
        Ok(())
    }

    fn read(&mut self, header: &[u8], len: usize) -> Result<Vec<u8>, TransportError> {
        if len == 0 {
            return Ok(Vec::new());
        }
        let mut state = self.lock();
        if state.disconnected {
            return Err(TransportError::Disconnected);
        }
        state.reads.push((header.to_vec(), len));
        let mut response = state
            .responses
            .pop_front()
            .ok_or(TransportError::Timeout { timeout_ms: 3000 })?;
        if response.len() < len {
            return Err(TransportError::ShortTransfer {
                expected: len,
                actual: response.len(),
            });
        }
        response.truncate(len);
        Ok(response)
    }

    fn settle(&mut self, delay: Duration) {
        self.lock().settles.push(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_response_queue() {
        let mut mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.queue_word(0x1EA5);

        assert_eq!(mock.read(&[0x3A, 0x31], 1).unwrap(), vec![0x11]);
        assert_eq!(mock.read(&[0x11, 0x03], 2).unwrap(), vec![0xA5, 0x1E]);

        // Queue is empty now
        assert!(mock.read(&[0x3A, 0x31], 1).is_err());
        assert_eq!(mock.get_reads().len(), 3);
    }

    #[test]
    fn test_mock_write_capture() {
        let mut mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_zero_length_read_consumes_nothing() {
        let mut mock = MockTransport::new();
        mock.queue_status(0x11);
        assert!(mock.read(&[0x3A, 0x31], 0).unwrap().is_empty());
        assert_eq!(mock.pending_responses(), 1);
        assert!(mock.get_reads().is_empty());
    }

    #[test]
    fn test_mock_injected_write_failure() {
        let mut mock = MockTransport::new();
        mock.fail_writes_starting_with(&[0x3A, 0x33, 0x08]);
        assert!(mock.write(&[0x3A, 0x33, 0x07]).is_ok());
        assert!(mock.write(&[0x3A, 0x33, 0x08]).is_err());
        assert_eq!(mock.count_writes(&[0x3A, 0x33, 0x08]), 1);
    }

    #[test]
    fn test_mock_disconnect() {
        let mut mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.write(b"test").is_err());
        mock.reconnect();
        assert!(mock.write(b"test").is_ok());
    }

    #[test]
    fn test_mock_settle_is_recorded() {
        let mut mock = MockTransport::new();
        mock.settle(Duration::from_millis(5));
        assert_eq!(mock.get_settles(), vec![Duration::from_millis(5)]);

        mock.clear_log();
        assert!(mock.get_settles().is_empty());
    }
}
