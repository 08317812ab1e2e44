//! Human-edited encoder settings (`MainInfo.toml`)

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ProtectError, ProtectResult};
use crate::layout::{Table, XOR_FILTER_LEN};

/// Packet filter key used when `connection.xor_filter` is missing or malformed
pub const DEFAULT_XOR_FILTER: [u8; XOR_FILTER_LEN] = [
    0xE7, 0x6D, 0x3A, 0x89, 0xBC, 0xB2, 0x9F, 0x73, 0x23, 0xA8, 0xFE, 0xB6, 0x49, 0x5D, 0x39, 0x5D,
    0x8A, 0xCB, 0x63, 0x8D, 0xEA, 0x7D, 0x2B, 0x5F, 0xC3, 0xB1, 0xE9, 0x83, 0x29, 0x51, 0xE8, 0x56,
];

pub const DEFAULT_LAUNCHER_NAME: &str = "XTLauncherExecutable";
pub const DEFAULT_PORT: u16 = 44405;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub licence: Licence,
    pub launcher: Launcher,
    pub connection: Connection,
    pub client_info: ClientInfo,
    pub check_crc: CheckCrc,
    pub systems: Systems,
    pub tables: Tables,
    pub output: Output,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Licence {
    pub customer_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Launcher {
    /// 0 = none, 1 = named mutex, 2 = window title
    pub launcher_type: u8,
    pub launcher_name: String,
}

impl Default for Launcher {
    fn default() -> Self {
        Self {
            launcher_type: 0,
            launcher_name: DEFAULT_LAUNCHER_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Connection {
    pub ip_address: String,
    pub ip_address_port: u16,
    pub client_serial: String,
    pub client_version: String,
    /// 32 hex byte tokens, separators are free-form
    pub xor_filter: String,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            ip_address: String::new(),
            ip_address_port: DEFAULT_PORT,
            client_serial: String::new(),
            client_version: String::new(),
            xor_filter: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientInfo {
    pub block_multi_instance: u8,
    pub window_name: String,
    pub screen_shot_path: String,
    pub disable_resets: u8,
    pub disable_grand_resets: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckCrc {
    pub client_name: String,
    pub plugin_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Systems {
    pub reconnect_time: u32,
    pub health_bar_type: u8,
    pub enable_move_list: u8,
    pub enable_special_characters: u8,
}

/// Raw table blobs, one optional file per table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tables {
    pub map_manager: Option<PathBuf>,
    pub custom_glow: Option<PathBuf>,
    pub custom_item: Option<PathBuf>,
    pub custom_bow: Option<PathBuf>,
    pub custom_wing: Option<PathBuf>,
    pub item_option: Option<PathBuf>,
    pub custom_monster: Option<PathBuf>,
    pub item_position: Option<PathBuf>,
    pub map_fog: Option<PathBuf>,
}

impl Tables {
    pub fn source(&self, table: Table) -> Option<&Path> {
        let path = match table {
            Table::MapManager => &self.map_manager,
            Table::CustomGlow => &self.custom_glow,
            Table::CustomItem => &self.custom_item,
            Table::CustomBow => &self.custom_bow,
            Table::CustomWing => &self.custom_wing,
            Table::ItemOption => &self.item_option,
            Table::CustomMonster => &self.custom_monster,
            Table::ItemPosition => &self.item_position,
            Table::MapFog => &self.map_fog,
        };
        path.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    /// Directory the companion files are resolved against
    pub client_dir: PathBuf,
    pub record_path: PathBuf,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            client_dir: PathBuf::from("Client"),
            record_path: ["Client", "Data", "Local", "ClientInfo.bmd"].iter().collect(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> ProtectResult<Self> {
        toml::from_str(content).map_err(|e| ProtectError::Configuration(format!("{e}")))
    }

    pub fn load(path: &Path) -> ProtectResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ProtectError::io(path, e))?;
        let mut settings = Self::from_toml_str(&content)?;
        settings.resolve_relative_to(path.parent().unwrap_or(Path::new("")));
        Ok(settings)
    }

    pub fn to_toml_string(&self) -> ProtectResult<String> {
        toml::to_string_pretty(self).map_err(|e| ProtectError::Configuration(format!("{e}")))
    }

    /// Packet filter key from the settings, or the default one
    pub fn xor_filter(&self) -> [u8; XOR_FILTER_LEN] {
        match parse_xor_filter(&self.connection.xor_filter) {
            Some(filter) => filter,
            None => {
                if !self.connection.xor_filter.trim().is_empty() {
                    tracing::warn!("xor_filter is malformed, using the default filter");
                }
                DEFAULT_XOR_FILTER
            }
        }
    }

    /// Anchors relative paths at the directory holding the settings file
    fn resolve_relative_to(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }

        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        anchor(&mut self.output.client_dir);
        anchor(&mut self.output.record_path);
        for path in [
            &mut self.tables.map_manager,
            &mut self.tables.custom_glow,
            &mut self.tables.custom_item,
            &mut self.tables.custom_bow,
            &mut self.tables.custom_wing,
            &mut self.tables.item_option,
            &mut self.tables.custom_monster,
            &mut self.tables.item_position,
            &mut self.tables.map_fog,
        ]
        .into_iter()
        .flatten()
        {
            anchor(path);
        }
    }
}

/// Parses exactly 32 hex byte tokens.
///
/// Anything that is not a hex digit separates tokens, an optional `0x`
/// prefix is accepted, values above 0xFF reject the whole filter. Tokens
/// after the 32nd are ignored.
pub fn parse_xor_filter(text: &str) -> Option<[u8; XOR_FILTER_LEN]> {
    let mut filter = [0u8; XOR_FILTER_LEN];
    let mut count = 0;
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() && count < XOR_FILTER_LEN {
        if !bytes[i].is_ascii_hexdigit() {
            i += 1;
            continue;
        }

        if bytes[i] == b'0'
            && matches!(bytes.get(i + 1), Some(b'x') | Some(b'X'))
            && bytes.get(i + 2).is_some_and(|b| b.is_ascii_hexdigit())
        {
            i += 2;
        }

        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
            i += 1;
        }

        let value = u32::from_str_radix(&text[start..i], 16).ok()?;
        filter[count] = u8::try_from(value).ok()?;
        count += 1;
    }

    (count == XOR_FILTER_LEN).then_some(filter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter_text(filter: &[u8]) -> String {
        filter
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.launcher.launcher_name, "XTLauncherExecutable");
        assert_eq!(settings.connection.ip_address_port, 44405);
        assert_eq!(settings.output.client_dir, PathBuf::from("Client"));
        assert_eq!(settings.xor_filter(), DEFAULT_XOR_FILTER);
    }

    #[test]
    fn test_parse_sections() {
        let settings = Settings::from_toml_str(
            r#"
            [licence]
            customer_name = "Acme"

            [launcher]
            launcher_type = 1

            [connection]
            ip_address = "192.168.0.10"
            client_serial = "k1Pk2jcET48mxL3b"

            [check_crc]
            client_name = "client.bin"

            [systems]
            reconnect_time = 30
            "#,
        )
        .unwrap();

        assert_eq!(settings.licence.customer_name, "Acme");
        assert_eq!(settings.launcher.launcher_type, 1);
        // untouched keys keep their defaults
        assert_eq!(settings.launcher.launcher_name, DEFAULT_LAUNCHER_NAME);
        assert_eq!(settings.connection.ip_address, "192.168.0.10");
        assert_eq!(settings.check_crc.client_name, "client.bin");
        assert_eq!(settings.systems.reconnect_time, 30);
    }

    #[test]
    fn test_out_of_range_value_is_configuration_error() {
        let err = Settings::from_toml_str("[launcher]\nlauncher_type = 300\n").unwrap_err();
        assert!(matches!(err, ProtectError::Configuration(_)));
    }

    #[test]
    fn test_parse_xor_filter_various_separators() {
        let mut text = filter_text(&DEFAULT_XOR_FILTER).replace(' ', ",");
        assert_eq!(parse_xor_filter(&text), Some(DEFAULT_XOR_FILTER));

        text = DEFAULT_XOR_FILTER
            .iter()
            .map(|b| format!("0x{:02x}", b))
            .collect::<Vec<_>>()
            .join(", ");
        assert_eq!(parse_xor_filter(&text), Some(DEFAULT_XOR_FILTER));
    }

    #[test]
    fn test_parse_xor_filter_rejects_bad_input() {
        // too few tokens
        assert_eq!(parse_xor_filter("01 02 03"), None);
        // value out of byte range
        let mut tokens: Vec<String> = (0..32).map(|_| "01".to_string()).collect();
        tokens[5] = "1FF".to_string();
        assert_eq!(parse_xor_filter(&tokens.join(" ")), None);
        assert_eq!(parse_xor_filter(""), None);
    }

    #[test]
    fn test_parse_xor_filter_ignores_extra_tokens() {
        let mut filter = [0u8; XOR_FILTER_LEN];
        for (i, b) in filter.iter_mut().enumerate() {
            *b = i as u8;
        }
        let text = format!("{} FF FF", filter_text(&filter));
        assert_eq!(parse_xor_filter(&text), Some(filter));
    }

    #[test]
    fn test_malformed_filter_falls_back_to_default() {
        let settings = Settings::from_toml_str("[connection]\nxor_filter = \"AA BB\"\n").unwrap();
        assert_eq!(settings.xor_filter(), DEFAULT_XOR_FILTER);
    }

    #[test]
    fn test_load_resolves_paths_next_to_settings() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("MainInfo.toml");
        fs::write(&path, "[tables]\nmap_fog = \"MapFog.bin\"\n").unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.output.client_dir, dir.path().join("Client"));
        assert_eq!(
            settings.tables.source(Table::MapFog),
            Some(dir.path().join("MapFog.bin").as_path())
        );
        assert_eq!(settings.tables.source(Table::MapManager), None);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut settings = Settings::default();
        settings.licence.customer_name = "Acme".to_string();
        settings.tables.custom_item = Some(PathBuf::from("CustomItem.bin"));

        let text = settings.to_toml_string().unwrap();
        assert_eq!(Settings::from_toml_str(&text).unwrap(), settings);
    }
}
