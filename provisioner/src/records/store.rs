//! Record store interface

use crate::errors::ProvisionError;
use crate::records::record::DeviceRecord;

/// Read-only lookup of device records.
///
/// Lookups while disconnected fail with [`ProvisionError::NotConnected`]
/// rather than returning an empty result. A lookup that finds nothing
/// returns `Ok(None)`.
pub trait RecordStore: Send {
    /// Open the store. Connecting an already connected store succeeds.
    /// On failure the reason is available from [`RecordStore::last_error`].
    fn connect(&mut self) -> bool;

    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Look a record up by its device id
    fn get_by_primary_id(&mut self, device_id: &str)
        -> Result<Option<DeviceRecord>, ProvisionError>;

    /// Resolve a hardware identifier (MAC address or serial number) to a
    /// device id, then look that record up
    fn get_by_secondary_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Option<DeviceRecord>, ProvisionError>;

    /// All device ids, in ascending order
    fn list_device_ids(&mut self) -> Result<Vec<String>, ProvisionError>;

    /// Description of the most recent failure, empty if none
    fn last_error(&self) -> String;
}
