//! Decoded client info record

use std::fs;

use crate::error::{ProtectError, ProtectResult};
use crate::layout::{self, Field, TABLES, Table, XOR_FILTER_LEN};
use crate::settings::Settings;

/// Checksums of the companion files, 0 means "not stamped"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileChecksums {
    pub client: u32,
    pub plugin: u32,
}

/// The opaque customisation tables, kept as one block of `TABLES.len` bytes
#[derive(Clone, PartialEq, Eq)]
pub struct CustomTables {
    bytes: Vec<u8>,
}

impl CustomTables {
    pub fn from_bytes(bytes: &[u8]) -> ProtectResult<Self> {
        if bytes.len() != TABLES.len {
            return Err(ProtectError::RecordSize {
                expected: TABLES.len,
                actual: bytes.len(),
            });
        }
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn get(&self, table: Table) -> &[u8] {
        &self.bytes[table.region().range()]
    }

    /// Copies `data` into the table, dropping excess bytes and zero-filling the rest
    pub fn set(&mut self, table: Table, data: &[u8]) {
        let region = &mut self.bytes[table.region().range()];
        let n = data.len().min(region.len());
        if data.len() > region.len() {
            tracing::warn!(
                "{} data is {} bytes, truncated to {}",
                table.name(),
                data.len(),
                region.len()
            );
        }
        region[..n].copy_from_slice(&data[..n]);
        region[n..].fill(0);
    }
}

impl Default for CustomTables {
    fn default() -> Self {
        Self {
            bytes: vec![0; TABLES.len],
        }
    }
}

impl std::fmt::Debug for CustomTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let used = self.bytes.iter().filter(|&&b| b != 0).count();
        f.debug_struct("CustomTables")
            .field("len", &self.bytes.len())
            .field("non_zero", &used)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigRecord {
    pub customer_name: String,
    pub launcher_type: u8,
    pub launcher_name: String,
    pub ip_address: String,
    pub ip_address_port: u16,
    pub client_serial: String,
    pub client_version: String,
    pub multi_instance_block: u8,
    pub window_name: String,
    pub screenshot_path: String,
    pub disable_resets: u8,
    pub disable_grand_resets: u8,
    pub client_name: String,
    pub plugin_name: String,
    pub client_checksum: u32,
    pub plugin_checksum: u32,
    pub reconnect_time: u32,
    pub health_bar_type: u8,
    pub enable_move_list: u8,
    pub enable_special_characters: u8,
    pub xor_filter: [u8; XOR_FILTER_LEN],
    pub tables: CustomTables,
}

impl Default for ConfigRecord {
    fn default() -> Self {
        Self {
            customer_name: String::new(),
            launcher_type: 0,
            launcher_name: String::new(),
            ip_address: String::new(),
            ip_address_port: 0,
            client_serial: String::new(),
            client_version: String::new(),
            multi_instance_block: 0,
            window_name: String::new(),
            screenshot_path: String::new(),
            disable_resets: 0,
            disable_grand_resets: 0,
            client_name: String::new(),
            plugin_name: String::new(),
            client_checksum: 0,
            plugin_checksum: 0,
            reconnect_time: 0,
            health_bar_type: 0,
            enable_move_list: 0,
            enable_special_characters: 0,
            xor_filter: [0; XOR_FILTER_LEN],
            tables: CustomTables::default(),
        }
    }
}

impl ConfigRecord {
    /// Builds a record from parsed settings and the companion file checksums.
    ///
    /// Table blobs named in the settings are read here; a missing blob file
    /// is an error, an unnamed table stays zeroed.
    pub fn from_settings(settings: &Settings, checksums: FileChecksums) -> ProtectResult<Self> {
        let mut tables = CustomTables::default();
        for table in Table::ALL {
            if let Some(path) = settings.tables.source(table) {
                let data = fs::read(path).map_err(|e| ProtectError::io(path, e))?;
                tracing::debug!("loaded {} ({} bytes)", table.name(), data.len());
                tables.set(table, &data);
            }
        }

        Ok(Self {
            customer_name: settings.licence.customer_name.clone(),
            launcher_type: settings.launcher.launcher_type,
            launcher_name: settings.launcher.launcher_name.clone(),
            ip_address: settings.connection.ip_address.clone(),
            ip_address_port: settings.connection.ip_address_port,
            client_serial: settings.connection.client_serial.clone(),
            client_version: settings.connection.client_version.clone(),
            multi_instance_block: settings.client_info.block_multi_instance,
            window_name: settings.client_info.window_name.clone(),
            screenshot_path: settings.client_info.screen_shot_path.clone(),
            disable_resets: settings.client_info.disable_resets,
            disable_grand_resets: settings.client_info.disable_grand_resets,
            client_name: settings.check_crc.client_name.clone(),
            plugin_name: settings.check_crc.plugin_name.clone(),
            client_checksum: checksums.client,
            plugin_checksum: checksums.plugin,
            reconnect_time: settings.systems.reconnect_time,
            health_bar_type: settings.systems.health_bar_type,
            enable_move_list: settings.systems.enable_move_list,
            enable_special_characters: settings.systems.enable_special_characters,
            xor_filter: settings.xor_filter(),
            tables,
        })
    }

    /// Serializes every field into its slot of a zeroed `RECORD_LEN` buffer
    pub(crate) fn write_fields(&self, buf: &mut [u8]) {
        put_str(buf, layout::CUSTOMER_NAME, &self.customer_name);
        buf[layout::LAUNCHER_TYPE.offset] = self.launcher_type;
        put_str(buf, layout::LAUNCHER_NAME, &self.launcher_name);
        put_str(buf, layout::IP_ADDRESS, &self.ip_address);
        buf[layout::IP_ADDRESS_PORT.range()].copy_from_slice(&self.ip_address_port.to_le_bytes());
        put_str(buf, layout::CLIENT_SERIAL, &self.client_serial);
        put_str(buf, layout::CLIENT_VERSION, &self.client_version);
        buf[layout::MULTI_INSTANCE_BLOCK.offset] = self.multi_instance_block;
        put_str(buf, layout::WINDOW_NAME, &self.window_name);
        put_str(buf, layout::SCREENSHOT_PATH, &self.screenshot_path);
        buf[layout::DISABLE_RESETS.offset] = self.disable_resets;
        buf[layout::DISABLE_GRAND_RESETS.offset] = self.disable_grand_resets;
        put_str(buf, layout::CLIENT_NAME, &self.client_name);
        put_str(buf, layout::PLUGIN_NAME, &self.plugin_name);
        put_u32(buf, layout::CLIENT_CHECKSUM, self.client_checksum);
        put_u32(buf, layout::PLUGIN_CHECKSUM, self.plugin_checksum);
        put_u32(buf, layout::RECONNECT_TIME, self.reconnect_time);
        buf[layout::HEALTH_BAR_TYPE.offset] = self.health_bar_type;
        buf[layout::ENABLE_MOVE_LIST.offset] = self.enable_move_list;
        buf[layout::ENABLE_SPECIAL_CHARACTERS.offset] = self.enable_special_characters;
        buf[layout::XOR_FILTER.range()].copy_from_slice(&self.xor_filter);
        buf[TABLES.range()].copy_from_slice(self.tables.as_bytes());
    }

    /// Reads every field back from a plain `RECORD_LEN` buffer
    pub(crate) fn read_fields(buf: &[u8]) -> ProtectResult<Self> {
        let mut xor_filter = [0u8; XOR_FILTER_LEN];
        xor_filter.copy_from_slice(&buf[layout::XOR_FILTER.range()]);

        Ok(Self {
            customer_name: get_str(buf, layout::CUSTOMER_NAME),
            launcher_type: buf[layout::LAUNCHER_TYPE.offset],
            launcher_name: get_str(buf, layout::LAUNCHER_NAME),
            ip_address: get_str(buf, layout::IP_ADDRESS),
            ip_address_port: u16::from_le_bytes([
                buf[layout::IP_ADDRESS_PORT.offset],
                buf[layout::IP_ADDRESS_PORT.offset + 1],
            ]),
            client_serial: get_str(buf, layout::CLIENT_SERIAL),
            client_version: get_str(buf, layout::CLIENT_VERSION),
            multi_instance_block: buf[layout::MULTI_INSTANCE_BLOCK.offset],
            window_name: get_str(buf, layout::WINDOW_NAME),
            screenshot_path: get_str(buf, layout::SCREENSHOT_PATH),
            disable_resets: buf[layout::DISABLE_RESETS.offset],
            disable_grand_resets: buf[layout::DISABLE_GRAND_RESETS.offset],
            client_name: get_str(buf, layout::CLIENT_NAME),
            plugin_name: get_str(buf, layout::PLUGIN_NAME),
            client_checksum: get_u32(buf, layout::CLIENT_CHECKSUM),
            plugin_checksum: get_u32(buf, layout::PLUGIN_CHECKSUM),
            reconnect_time: get_u32(buf, layout::RECONNECT_TIME),
            health_bar_type: buf[layout::HEALTH_BAR_TYPE.offset],
            enable_move_list: buf[layout::ENABLE_MOVE_LIST.offset],
            enable_special_characters: buf[layout::ENABLE_SPECIAL_CHARACTERS.offset],
            xor_filter,
            tables: CustomTables::from_bytes(&buf[TABLES.range()])?,
        })
    }

    /// The record as it reads back after encoding: strings cut to capacity
    pub fn truncated(&self) -> Self {
        let mut buf = vec![0u8; layout::RECORD_LEN];
        self.write_fields(&mut buf);
        // read_fields only fails on a wrongly sized tables block, which
        // write_fields cannot produce
        Self::read_fields(&buf).unwrap_or_else(|_| self.clone())
    }
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char
fn fit_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Fixed-size C string: at most `len - 1` bytes, always NUL terminated
fn put_str(buf: &mut [u8], field: Field, value: &str) {
    let slot = &mut buf[field.range()];
    let text = fit_str(value, field.len - 1);
    slot[..text.len()].copy_from_slice(text.as_bytes());
    slot[text.len()..].fill(0);
}

fn get_str(buf: &[u8], field: Field) -> String {
    let slot = &buf[field.range()];
    let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
    String::from_utf8_lossy(&slot[..end]).into_owned()
}

fn put_u32(buf: &mut [u8], field: Field, value: u32) {
    buf[field.range()].copy_from_slice(&value.to_le_bytes());
}

fn get_u32(buf: &[u8], field: Field) -> u32 {
    let b = &buf[field.range()];
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}
