//! Device session - owns the transport for setup and update calls.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::config::SessionConfig;
use crate::error::{Phase, UpdateError};
use crate::events::{TracingObserver, UpdateEvent, UpdateObserver};
use crate::lock::{Mode, ModeLock};
use crate::payload::FirmwareImage;
use crate::protocol::{Command, CommandCodec, ProtocolFamily};
use crate::retry::Wait;
use crate::state::TransferStateMachine;
use crate::state::handlers::{opcode, register};
use crate::transport::Transport;

/// One physical device, one protocol family.
///
/// The session is the only writer of the device mode; mode changes happen
/// inside a [`ModeLock`].
pub struct DeviceSession<T: Transport> {
    transport: T,
    codec: CommandCodec,
    config: SessionConfig,
    observer: Arc<dyn UpdateObserver>,
    mode: Mode,
    version: Option<String>,
    // Image address being streamed, for error context.
    address: Option<usize>,
}

impl<T: Transport> DeviceSession<T> {
    /// Create a new session with the default tracing observer.
    pub fn new(transport: T, config: SessionConfig) -> Result<Self, UpdateError> {
        Self::with_observer(transport, config, Arc::new(TracingObserver))
    }

    /// Create a new session with a custom observer.
    pub fn with_observer(
        transport: T,
        config: SessionConfig,
        observer: Arc<dyn UpdateObserver>,
    ) -> Result<Self, UpdateError> {
        config.validate()?;
        Ok(Self {
            transport,
            codec: CommandCodec::from(config.family),
            config,
            observer,
            mode: Mode::Normal,
            version: None,
            address: None,
        })
    }

    pub fn family(&self) -> ProtocolFamily {
        self.config.family
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Last version read from the device.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Read the running firmware version.
    #[instrument(skip(self), fields(family = %self.config.family))]
    pub fn setup(&mut self) -> Result<String, UpdateError> {
        let version = match self.family() {
            ProtocolFamily::Opcode => ModeLock::enter(self)?.run(opcode::read_version)?,
            ProtocolFamily::Register => register::read_info(self)?,
        };
        self.report_version(version.clone());
        Ok(version)
    }

    /// Parse `data` as this family's firmware container and check it
    /// against the configured flash size.
    pub fn parse_image(&self, data: Vec<u8>) -> Result<FirmwareImage, UpdateError> {
        let image = FirmwareImage::parse(self.family(), data)?;
        if let Some(page_count) = self.config.ic_page_count {
            image.check_capacity(page_count)?;
        }
        Ok(image)
    }

    /// Write `firmware` to the device.
    ///
    /// The image is validated before the device is touched.
    #[instrument(skip(self, firmware), fields(family = %self.config.family, len = firmware.len()))]
    pub fn install(&mut self, firmware: &[u8]) -> Result<(), UpdateError> {
        let image = self.parse_image(firmware.to_vec())?;
        self.install_image(&image)
    }

    /// Write a parsed image to the device.
    pub fn install_image(&mut self, image: &FirmwareImage) -> Result<(), UpdateError> {
        let mut machine = TransferStateMachine::new(image, self.config.block_size() as usize)?;
        info!(
            start = image.iap_address(),
            len = image.len(),
            chunks = machine.total_chunks(),
            "Starting update"
        );

        ModeLock::enter(self)?.run(|session| machine.run(session))?;
        self.emit(UpdateEvent::Complete);
        Ok(())
    }

    pub(crate) fn emit(&self, event: UpdateEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        let from = self.mode;
        self.mode = mode;
        self.emit(UpdateEvent::ModeChanged { from, to: mode });
    }

    pub(crate) fn report_version(&mut self, version: String) {
        self.emit(UpdateEvent::VersionReported {
            version: version.clone(),
        });
        self.version = Some(version);
    }

    pub(crate) fn address(&self) -> Option<usize> {
        self.address
    }

    pub(crate) fn set_address(&mut self, address: Option<usize>) {
        self.address = address;
    }

    pub(crate) fn settle(&mut self, delay: Duration) {
        self.transport.settle(delay);
    }

    /// Encode and write `cmd`, then wait `settle`.
    pub(crate) fn write_command(
        &mut self,
        phase: Phase,
        cmd: &Command<'_>,
        settle: Duration,
    ) -> Result<(), UpdateError> {
        let frame = self.codec.encode_write(cmd);
        self.write_frame(phase, &frame, settle)
    }

    /// Write a pre-encoded frame, then wait `settle`.
    pub(crate) fn write_frame(
        &mut self,
        phase: Phase,
        frame: &[u8],
        settle: Duration,
    ) -> Result<(), UpdateError> {
        let target = &frame[..frame.len().min(2)];
        debug!(phase = %phase, len = frame.len(), target = %format!("{:02X?}", target), "Write");
        self.transport
            .write(frame)
            .map_err(|e| UpdateError::transport(phase, e))?;
        self.transport.settle(settle);
        Ok(())
    }

    /// Read `len` bytes from the location `cmd` addresses.
    pub(crate) fn read_bytes(
        &mut self,
        phase: Phase,
        cmd: &Command<'_>,
        len: usize,
    ) -> Result<Vec<u8>, UpdateError> {
        let header = self.codec.encode_read(cmd);
        let data = self
            .transport
            .read(&header, len)
            .map_err(|e| UpdateError::transport(phase, e))?;
        debug!(phase = %phase, len = data.len(), target = %format!("{:02X?}", header), "Read");
        Ok(data)
    }
}

impl<T: Transport> Wait for DeviceSession<T> {
    fn wait(&mut self, delay: Duration) {
        self.transport.settle(delay);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingObserver;
    use crate::payload::calc_checksum;
    use crate::protocol::StatusFault;
    use crate::protocol::constants::*;
    use crate::retry::RetryPolicy;
    use crate::state::TransferState;
    use crate::transport::MockTransport;

    const DETACH: [u8; 3] = [0x6A, 0x31, 0x03];
    const ENABLE_ISP: [u8; 4] = [0x3A, 0x33, 0x01, 0x01];
    const REQUEST_IDENTITY: [u8; 4] = [0x3A, 0x33, 0x02, 0x01];
    const BEGIN_UPDATE: [u8; 5] = [0x3A, 0x33, 0x05, 0x00, 0x1E];
    const FINISH: [u8; 3] = [0x3A, 0x33, 0x06];
    const EXIT: [u8; 3] = [0x3A, 0x33, 0x07];
    const ATTACH: [u8; 3] = [0x3A, 0x33, 0x08];

    const IAP_RESET: [u8; 4] = [0x14, 0x03, 0xF0, 0xF0];
    const ENABLE_REPORT: [u8; 4] = [0x14, 0x03, 0x00, 0x08];
    const PASSWORD: [u8; 4] = [0x11, 0x03, 0xA5, 0x1E];

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    fn opcode_session(
        mock: &MockTransport,
    ) -> (DeviceSession<MockTransport>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let config = SessionConfig::new(ProtocolFamily::Opcode);
        let session = DeviceSession::with_observer(mock.clone(), config, observer.clone()).unwrap();
        (session, observer)
    }

    fn touchpad_config() -> SessionConfig {
        SessionConfig::new(ProtocolFamily::Register)
    }

    fn register_session(
        mock: &MockTransport,
        config: SessionConfig,
    ) -> (DeviceSession<MockTransport>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let session = DeviceSession::with_observer(mock.clone(), config, observer.clone()).unwrap();
        (session, observer)
    }

    /// Responses for an opcode update up to and including identity
    /// verification; the device asks for 4 bytes at 0x10.
    fn queue_opcode_handshake(mock: &MockTransport) {
        mock.queue_status(0x11); // detach
        mock.queue_status(0x11); // enable ISP
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x10, 0x04]);
        mock.queue_status(0x11); // identity accepted
    }

    /// 512-byte touchpad image: IAP start at 0x100, module id 0x00A7.
    fn touchpad_image() -> Vec<u8> {
        let mut data = pattern(512);
        data[0x106..0x108].copy_from_slice(&0x0080u16.to_le_bytes());
        data[0x100..0x102].copy_from_slice(&0x0090u16.to_le_bytes());
        data[0x120..0x122].copy_from_slice(&0x00A7u16.to_le_bytes());
        data
    }

    fn queue_register_handshake(mock: &MockTransport) {
        mock.queue_word(ETP_I2C_MAIN_MODE_ON); // still in main mode
        mock.queue_word(0x0000); // left main mode
        mock.queue_word(ETP_I2C_IAP_PASSWORD); // password echo
        mock.queue_word(0x0000); // no error flags
        mock.queue_word(0x00A7); // module id
        mock.queue_word(0x0205); // firmware version
    }

    #[test]
    fn test_opcode_update_happy_path() {
        let mock = MockTransport::new();
        let image = pattern(64);
        queue_opcode_handshake(&mock);
        mock.queue_status_n(0x11, 3); // one per chunk
        mock.queue_status(0x11); // commit
        mock.queue_status(0x11); // exit
        let (mut session, observer) = opcode_session(&mock);

        session.install(&image).unwrap();

        let mut verify = vec![0x3A, 0x33, 0x03];
        verify.extend_from_slice(&image[0x10..0x14]);
        let mut expected: Vec<Vec<u8>> = vec![
            DETACH.to_vec(),
            ENABLE_ISP.to_vec(),
            REQUEST_IDENTITY.to_vec(),
            verify,
            BEGIN_UPDATE.to_vec(),
        ];
        for block in image.chunks(30) {
            let mut frame = vec![0x3A, 0x34];
            frame.extend_from_slice(block);
            expected.push(frame);
        }
        expected.extend([FINISH.to_vec(), EXIT.to_vec(), ATTACH.to_vec()]);
        assert_eq!(mock.get_writes(), expected);

        assert_eq!(mock.pending_responses(), 0);
        assert_eq!(session.mode(), Mode::Normal);
        assert_eq!(observer.progress(), vec![(0, 2), (1, 2), (2, 2)]);
        assert!(observer.events().contains(&UpdateEvent::Complete));
        assert!(mock.get_settles().contains(&IDENTITY_RESPONSE_DELAY));
    }

    #[test]
    fn test_opcode_reads_use_status_header() {
        let mock = MockTransport::new();
        queue_opcode_handshake(&mock);
        mock.queue_status_n(0x11, 3);
        let (mut session, _) = opcode_session(&mock);

        session.install(&pattern(30)).unwrap();

        let reads = mock.get_reads();
        assert!(reads.iter().all(|(header, _)| header == &[0x3A, 0x31]));
        assert!(reads.contains(&(vec![0x3A, 0x31], IDENTITY_RESPONSE_LEN)));
    }

    #[test]
    fn test_opcode_streaming_rejected_exits_once() {
        let mock = MockTransport::new();
        queue_opcode_handshake(&mock);
        mock.queue_status(0xBB); // first streaming poll
        let (mut session, observer) = opcode_session(&mock);

        let err = session.install(&pattern(300)).unwrap_err();

        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::Streaming,
                status: 0xBB,
                address: Some(0),
                fault: StatusFault::Rejected,
            }
        ));
        assert_eq!(mock.count_writes(&ATTACH), 1);
        assert_eq!(mock.count_writes(&EXIT), 0);
        assert!(mock.get_writes().iter().all(|w| !w.starts_with(&[0x3A, 0x34])));
        assert_eq!(session.mode(), Mode::Normal);
        assert!(observer.progress().is_empty());
        assert!(observer.events().iter().any(|e| matches!(
            e,
            UpdateEvent::PhaseChanged {
                to: TransferState::Aborted,
                ..
            }
        )));
    }

    #[test]
    fn test_opcode_detach_waits_for_accepted() {
        let mock = MockTransport::new();
        mock.queue_status_n(0x00, 5); // not yet detached
        mock.queue_status(0x11); // detach
        mock.queue_status(0x11); // enable ISP
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x00, 0x02]);
        mock.queue_status_n(0x11, 4); // identity, one chunk, commit, exit
        let (mut session, _) = opcode_session(&mock);

        session.install(&pattern(20)).unwrap();

        let poll_delay = Duration::from_millis(3);
        let waits = mock.get_settles().iter().filter(|d| **d == poll_delay).count();
        assert_eq!(waits, 5);
        assert_eq!(mock.count_writes(&DETACH), 1);
    }

    #[test]
    fn test_opcode_detach_timeout() {
        let mock = MockTransport::new();
        mock.queue_status_n(0x00, 4);
        let mut config = SessionConfig::new(ProtocolFamily::Opcode);
        config.detach_poll = Some(RetryPolicy::new(4, 3));
        let mut session =
            DeviceSession::with_observer(mock.clone(), config, Arc::new(RecordingObserver::new()))
                .unwrap();

        let err = session.install(&pattern(20)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::TimeoutExhausted {
                phase: Phase::Detach,
                attempts: 4,
                last_status: Some(0x00),
            }
        ));
        assert_eq!(mock.get_writes(), vec![DETACH.to_vec()]);
        assert_eq!(session.mode(), Mode::Normal);
    }

    #[test]
    fn test_opcode_any_status_but_rejected_proceeds() {
        let mock = MockTransport::new();
        mock.queue_status(0x11); // detach
        mock.queue_status(0x00); // enable ISP
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x00, 0x02]);
        mock.queue_status(0x42); // identity
        mock.queue_status_n(0x00, 2); // two chunks
        mock.queue_status(0xFF); // commit
        mock.queue_status(0x01); // exit
        let (mut session, observer) = opcode_session(&mock);

        session.install(&pattern(40)).unwrap();

        assert_eq!(mock.pending_responses(), 0);
        assert_eq!(mock.count_writes(&EXIT), 1);
        assert_eq!(mock.count_writes(&ATTACH), 1);
        assert_eq!(observer.progress(), vec![(0, 1), (1, 1)]);
        let poll_delay = Duration::from_millis(3);
        assert!(!mock.get_settles().contains(&poll_delay));
    }

    #[test]
    fn test_opcode_identity_fills_packet() {
        let mock = MockTransport::new();
        let image = pattern(64);
        mock.queue_status(0x11);
        mock.queue_status(0x11);
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x08, 0x1F]);
        mock.queue_status_n(0x11, 6); // identity, three chunks, commit, exit
        let (mut session, _) = opcode_session(&mock);

        session.install(&image).unwrap();

        let mut verify = vec![0x3A, 0x33, 0x03];
        verify.extend_from_slice(&image[0x08..0x08 + 31]);
        assert_eq!(mock.count_writes(&verify), 1);
    }

    #[test]
    fn test_opcode_identity_longer_than_packet() {
        let mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.queue_status(0x11);
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x00, 0x20]);
        let (mut session, _) = opcode_session(&mock);

        let err = session.install(&pattern(64)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::VerifyIdentity,
                address: Some(0),
                fault: StatusFault::IdentityOutOfRange { length: 32 },
                ..
            }
        ));
        assert!(mock.get_writes().iter().all(|w| !w.starts_with(&[0x3A, 0x33, 0x03])));
        assert_eq!(mock.count_writes(&ATTACH), 1);
    }

    #[test]
    fn test_opcode_identity_not_accepted() {
        let mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.queue_status(0x11);
        mock.queue_response(&[0x22, 0x00, 0x00, 0x00, 0x00, 0x04]);
        let (mut session, _) = opcode_session(&mock);

        let err = session.install(&pattern(64)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::VerifyIdentity,
                status: 0x22,
                fault: StatusFault::NotAccepted,
                ..
            }
        ));
        assert_eq!(mock.count_writes(&ATTACH), 1);
    }

    #[test]
    fn test_opcode_identity_outside_image() {
        let mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.queue_status(0x11);
        mock.queue_response(&[0x11, 0x00, 0x00, 0x00, 0x3E, 0x04]);
        let (mut session, _) = opcode_session(&mock);

        let err = session.install(&pattern(64)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::VerifyIdentity,
                address: Some(0x3E),
                fault: StatusFault::IdentityOutOfRange { length: 4 },
                ..
            }
        ));
    }

    #[test]
    fn test_opcode_release_failure_keeps_original() {
        let mock = MockTransport::new();
        queue_opcode_handshake(&mock);
        mock.queue_status(0xBB);
        mock.fail_writes_starting_with(&ATTACH);
        let (mut session, _) = opcode_session(&mock);

        let err = session.install(&pattern(64)).unwrap_err();
        let UpdateError::Release { original, release } = err else {
            panic!("expected combined release error");
        };
        assert!(matches!(
            *original,
            UpdateError::ProtocolStatus {
                phase: Phase::Streaming,
                ..
            }
        ));
        assert_eq!(release.phase(), Some(Phase::Attach));
        assert_eq!(mock.count_writes(&ATTACH), 1);
    }

    #[test]
    fn test_opcode_transport_error_not_retried() {
        let mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.fail_writes_starting_with(&ENABLE_ISP);
        let (mut session, _) = opcode_session(&mock);

        let err = session.install(&pattern(64)).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::Transport {
                phase: Phase::EnableIsp,
                ..
            }
        ));
        assert_eq!(mock.count_writes(&ENABLE_ISP), 1);
        assert_eq!(mock.count_writes(&ATTACH), 1);
    }

    #[test]
    fn test_opcode_setup_reads_version() {
        let mock = MockTransport::new();
        mock.queue_status(0x11);
        mock.queue_response(&[0x00, 1, 23, 0, 0, 0, 0]);
        let (mut session, observer) = opcode_session(&mock);

        assert_eq!(session.setup().unwrap(), "1.23");
        assert_eq!(session.version(), Some("1.23"));
        assert_eq!(
            mock.get_writes(),
            vec![DETACH.to_vec(), vec![0x3A, 0x33, 0x04], ATTACH.to_vec()]
        );
        assert!(mock.get_reads().contains(&(vec![0x3A, 0x00], VERSION_RESPONSE_LEN)));
        assert!(mock.get_settles().contains(&VERSION_RESPONSE_DELAY));
        assert!(observer.events().contains(&UpdateEvent::VersionReported {
            version: "1.23".into()
        }));
    }

    #[test]
    fn test_register_update_happy_path() {
        let mock = MockTransport::new();
        let data = touchpad_image();
        queue_register_handshake(&mock);
        mock.queue_word(0x0000);
        mock.queue_word(0x0000);
        mock.queue_word(0x0000);
        mock.queue_word(0x0000);
        mock.queue_word(calc_checksum(&data[0x100..]));
        let (mut session, observer) = register_session(&mock, touchpad_config());

        session.install(&data).unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes[0], IAP_RESET.to_vec());
        assert_eq!(writes[1], PASSWORD.to_vec());
        for (i, page) in data[0x100..].chunks(FW_PAGE_SIZE).enumerate() {
            let frame = &writes[2 + i];
            assert_eq!(&frame[..2], &[0x01, 0x06]);
            assert_eq!(&frame[2..2 + FW_PAGE_SIZE], page);
            assert_eq!(&frame[2 + FW_PAGE_SIZE..], &calc_checksum(page).to_le_bytes());
        }
        assert_eq!(&writes[6..], &[IAP_RESET.to_vec(), ENABLE_REPORT.to_vec()]);

        assert_eq!(mock.pending_responses(), 0);
        assert_eq!(session.version(), Some("2.5"));
        assert_eq!(session.mode(), Mode::Normal);
        assert_eq!(observer.progress(), vec![(0, 3), (1, 3), (2, 3), (3, 3)]);
        assert!(mock.get_settles().contains(&ETP_DELAY_PAGE));
    }

    #[test]
    fn test_register_checksum_mismatch() {
        let mock = MockTransport::new();
        let data = touchpad_image();
        let expected = calc_checksum(&data[0x100..]);
        queue_register_handshake(&mock);
        for _ in 0..4 {
            mock.queue_word(0x0000);
        }
        mock.queue_word(expected.wrapping_add(1));
        let (mut session, _) = register_session(&mock, touchpad_config());

        let err = session.install(&data).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::Commit,
                fault: StatusFault::Checksum { expected: e },
                ..
            } if e == expected
        ));
        assert_eq!(mock.count_writes(&IAP_RESET), 2);
        assert_eq!(mock.count_writes(&ENABLE_REPORT), 1);
    }

    #[test]
    fn test_register_page_error_aborts() {
        let mock = MockTransport::new();
        queue_register_handshake(&mock);
        mock.queue_word(0x0000);
        mock.queue_word(ETP_FW_IAP_PAGE_ERR);
        let (mut session, _) = register_session(&mock, touchpad_config());

        let err = session.install(&touchpad_image()).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::Streaming,
                address: Some(0x140),
                fault: StatusFault::PageError,
                ..
            }
        ));
        assert_eq!(mock.count_writes(&ENABLE_REPORT), 1);
    }

    #[test]
    fn test_register_module_mismatch() {
        let mock = MockTransport::new();
        mock.queue_word(0x0000);
        mock.queue_word(ETP_I2C_IAP_PASSWORD);
        mock.queue_word(0x0000);
        mock.queue_word(0x0042);
        let (mut session, _) = register_session(&mock, touchpad_config());

        let err = session.install(&touchpad_image()).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::VerifyIdentity,
                status: 0x0042,
                fault: StatusFault::ModuleMismatch { expected: 0x00A7 },
                ..
            }
        ));
    }

    #[test]
    fn test_register_password_rejected() {
        let mock = MockTransport::new();
        mock.queue_word(0x0000);
        mock.queue_word(0x0000);
        let (mut session, _) = register_session(&mock, touchpad_config());

        let err = session.install(&touchpad_image()).unwrap_err();
        assert!(matches!(
            err,
            UpdateError::ProtocolStatus {
                phase: Phase::EnableIsp,
                fault: StatusFault::PasswordCheck,
                ..
            }
        ));
    }

    #[test]
    fn test_register_setup_without_lock() {
        let mock = MockTransport::new();
        mock.queue_word(0x0103);
        mock.queue_word(0x00A7);
        mock.queue_word(0x0004);
        let (mut session, _) = register_session(&mock, touchpad_config());

        assert_eq!(session.setup().unwrap(), "1.3");
        assert!(mock.get_writes().is_empty());
        let headers: Vec<_> = mock.get_reads().into_iter().map(|(h, _)| h).collect();
        assert_eq!(
            headers,
            vec![vec![0x02, 0x01], vec![0x01, 0x01], vec![0x11, 0x01]]
        );
    }

    #[test]
    fn test_bad_image_touches_nothing() {
        let mock = MockTransport::new();
        let mut data = vec![0u8; 2048];
        data[0x106..0x108].copy_from_slice(&0x0500u16.to_le_bytes());
        let (mut session, _) = register_session(&mock, touchpad_config());

        let err = session.install(&data).unwrap_err();
        assert!(matches!(err, UpdateError::FileFormat(_)));
        assert!(mock.get_writes().is_empty());
        assert!(mock.get_reads().is_empty());
        assert_eq!(session.mode(), Mode::Normal);
    }

    #[test]
    fn test_page_count_bounds_image() {
        let mock = MockTransport::new();
        let mut config = SessionConfig::new(ProtocolFamily::Register);
        config.apply_quirk("ElantpIcPageCount", "4").unwrap();
        let (mut session, _) = register_session(&mock, config);

        let err = session.install(&touchpad_image()).unwrap_err();
        assert!(matches!(err, UpdateError::FileFormat(_)));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SessionConfig::new(ProtocolFamily::Opcode);
        config.block_size = Some(32);
        let result = DeviceSession::new(MockTransport::new(), config);
        assert!(matches!(result, Err(UpdateError::Config(_))));
    }
}
