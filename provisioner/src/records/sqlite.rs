//! SQLite-backed record store

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::{debug, error, info, warn};

use crate::errors::ProvisionError;
use crate::records::record::{parse_components, DeviceRecord};
use crate::records::store::RecordStore;
use crate::utils::normalize_mac;

const SELECT_DEVICE: &str = "SELECT device_id, thing_name, iot_endpoint, aws_region, \
     root_ca_path, certificate_pem, private_key_pem, role_alias, role_alias_endpoint, \
     nucleus_version, deployment_group, initial_components, proxy_url, mqtt_port, custom_domain \
     FROM device_config WHERE device_id = ?1 LIMIT 1";

const SELECT_IDENTIFIER: &str = "SELECT device_id FROM device_identifiers \
     WHERE mac_address = ?1 OR serial_number = ?1 \
     OR (?2 <> '' AND lower(replace(mac_address, ':', '')) = ?2) LIMIT 1";

const SELECT_DEVICE_IDS: &str = "SELECT device_id FROM device_config ORDER BY device_id";

/// Record store reading the `device_config` and `device_identifiers` tables
#[derive(Debug)]
pub struct SqliteRecordStore {
    path: PathBuf,
    conn: Option<Connection>,
    last_error: String,
}

impl SqliteRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
            last_error: String::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn conn(&self) -> Result<&Connection, ProvisionError> {
        self.conn.as_ref().ok_or(ProvisionError::NotConnected)
    }

    fn fail(&mut self, err: ProvisionError) -> ProvisionError {
        self.last_error = err.to_string();
        error!("{}", self.last_error);
        err
    }

    fn open(&self) -> Result<Connection, ProvisionError> {
        if !self.path.is_file() {
            return Err(ProvisionError::DatabaseError(format!(
                "database file not found: {}",
                self.path.display()
            )));
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        // Opening is lazy; touching the schema rejects files that are not databases
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(conn)
    }
}

impl RecordStore for SqliteRecordStore {
    fn connect(&mut self) -> bool {
        if self.conn.is_some() {
            return true;
        }
        match self.open() {
            Ok(conn) => {
                info!("Connected to database: {}", self.path.display());
                self.conn = Some(conn);
                self.last_error.clear();
                true
            }
            Err(e) => {
                self.fail(e);
                false
            }
        }
    }

    fn disconnect(&mut self) {
        if self.conn.take().is_some() {
            debug!("Disconnected from database: {}", self.path.display());
        }
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn get_by_primary_id(
        &mut self,
        device_id: &str,
    ) -> Result<Option<DeviceRecord>, ProvisionError> {
        let result = self.conn().and_then(|conn| {
            conn.query_row(SELECT_DEVICE, params![device_id], device_from_row)
                .optional()
                .map_err(ProvisionError::from)
        });
        match result {
            Ok(Some(record)) => {
                info!("Retrieved configuration for device: {}", device_id);
                Ok(Some(record))
            }
            Ok(None) => {
                warn!("No configuration found for device: {}", device_id);
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn get_by_secondary_identifier(
        &mut self,
        identifier: &str,
    ) -> Result<Option<DeviceRecord>, ProvisionError> {
        let normalized = normalize_mac(identifier).to_lowercase();
        let result = self.conn().and_then(|conn| {
            conn.query_row(
                SELECT_IDENTIFIER,
                params![identifier, normalized],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(ProvisionError::from)
        });
        match result {
            Ok(Some(device_id)) => {
                debug!("Identifier {} resolves to device {}", identifier, device_id);
                self.get_by_primary_id(&device_id)
            }
            Ok(None) => {
                warn!("No device found for identifier: {}", identifier);
                Ok(None)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn list_device_ids(&mut self) -> Result<Vec<String>, ProvisionError> {
        let result = self.conn().and_then(|conn| {
            let mut stmt = conn.prepare(SELECT_DEVICE_IDS)?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(ids)
        });
        result.map_err(|e| self.fail(e))
    }

    fn last_error(&self) -> String {
        self.last_error.clone()
    }
}

fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<String> {
    Ok(row.get::<_, Option<String>>(idx)?.unwrap_or_default())
}

fn optional_text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(row
        .get::<_, Option<String>>(idx)?
        .filter(|value| !value.is_empty()))
}

fn device_from_row(row: &Row<'_>) -> rusqlite::Result<DeviceRecord> {
    let device_id = text(row, 0)?;
    let mqtt_port = match row.get::<_, Option<i64>>(13)? {
        Some(port) => match u16::try_from(port) {
            Ok(port) if port > 0 => Some(port),
            _ => {
                warn!("Ignoring invalid MQTT port {} for device {}", port, device_id);
                None
            }
        },
        None => None,
    };

    Ok(DeviceRecord {
        identity_name: text(row, 1)?,
        endpoint: text(row, 2)?,
        region: text(row, 3)?,
        root_ca: text(row, 4)?,
        certificate_pem: text(row, 5)?,
        private_key_pem: text(row, 6)?,
        credential_role: text(row, 7)?,
        credential_role_endpoint: text(row, 8)?,
        runtime_version: optional_text(row, 9)?,
        group: optional_text(row, 10)?,
        initial_components: parse_components(&text(row, 11)?),
        proxy_url: optional_text(row, 12)?,
        mqtt_port,
        custom_domain: optional_text(row, 14)?,
        device_id,
    })
}
