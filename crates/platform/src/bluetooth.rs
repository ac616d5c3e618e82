//! Short-range wireless stack abstraction
//!
//! The logger exposes one GATT service with four characteristics. The stack
//! owns the radio; the transfer task only polls it.

/// Maximum payload of a single characteristic value.
pub const CHARACTERISTIC_CAPACITY: usize = 110;

/// 6-byte address of a connected central.
pub type PeerAddress = [u8; 6];

/// Value held by a characteristic.
pub type CharacteristicValue = heapless::Vec<u8, CHARACTERISTIC_CAPACITY>;

/// File-transfer service UUID.
pub const SERVICE_UUID: &str = "12345678-1234-5678-1234-56789abcdef0";

/// Characteristics of the file-transfer service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Characteristic {
    /// Client writes the name of the file it wants.
    FileRequest,
    /// Device notifies file content in chunks.
    FileChunk,
    /// Device publishes its checksum; client writes back what it computed.
    Checksum,
    /// Device publishes status strings.
    Status,
}

impl Characteristic {
    /// Every characteristic, in registration order.
    pub const ALL: [Self; 4] = [Self::FileRequest, Self::FileChunk, Self::Checksum, Self::Status];

    /// GATT UUID of this characteristic.
    pub fn uuid(self) -> &'static str {
        match self {
            Self::FileRequest => "12345678-1234-5678-1234-56789abcdef2",
            Self::FileChunk => "12345678-1234-5678-1234-56789abcdef3",
            Self::Checksum => "12345678-1234-5678-1234-56789abcdef4",
            Self::Status => "12345678-1234-5678-1234-56789abcdef5",
        }
    }

    /// Short name for log output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileRequest => "file-request",
            Self::FileChunk => "file-chunk",
            Self::Checksum => "checksum",
            Self::Status => "status",
        }
    }
}

/// Wireless stack trait
pub trait WirelessStack {
    /// Error type
    type Error: core::fmt::Debug;

    /// Start advertising the file-transfer service under `name`.
    async fn advertise(&mut self, name: &str) -> Result<(), Self::Error>;

    /// Stop advertising.
    async fn stop_advertise(&mut self) -> Result<(), Self::Error>;

    /// Address of the connected central, if any.
    fn central(&mut self) -> Option<PeerAddress>;

    /// Whether the client wrote `characteristic` since the last call.
    /// Reading clears the indication.
    fn written(&mut self, characteristic: Characteristic) -> bool;

    /// Current value of `characteristic`.
    fn value(&mut self, characteristic: Characteristic) -> CharacteristicValue;

    /// Set `characteristic` and notify the client.
    async fn write_value(
        &mut self,
        characteristic: Characteristic,
        bytes: &[u8],
    ) -> Result<(), Self::Error>;
}
