//! Fixed binary layout of the client info record
//!
//! Offsets follow the client's in-memory struct: fields in declaration order,
//! u16 aligned to 2, u32 and the custom tables aligned to 4. Integers are
//! little endian. There is no header, magic or version in the file, so the
//! encoder and the runtime must agree on this table out of band.

/// A byte range inside the record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub len: usize,
}

impl Field {
    const fn first(len: usize) -> Self {
        Self { offset: 0, len }
    }

    /// Field placed right after `prev`, padded up to `align`
    const fn after(prev: Field, len: usize, align: usize) -> Self {
        let end = prev.offset + prev.len;
        let offset = (end + align - 1) / align * align;
        Self { offset, len }
    }

    pub const fn end(&self) -> usize {
        self.offset + self.len
    }

    pub fn range(&self) -> std::ops::Range<usize> {
        self.offset..self.end()
    }
}

pub const CUSTOMER_NAME: Field = Field::first(32);
pub const LAUNCHER_TYPE: Field = Field::after(CUSTOMER_NAME, 1, 1);
pub const LAUNCHER_NAME: Field = Field::after(LAUNCHER_TYPE, 32, 1);
pub const IP_ADDRESS: Field = Field::after(LAUNCHER_NAME, 32, 1);
pub const IP_ADDRESS_PORT: Field = Field::after(IP_ADDRESS, 2, 2);
pub const CLIENT_SERIAL: Field = Field::after(IP_ADDRESS_PORT, 17, 1);
pub const CLIENT_VERSION: Field = Field::after(CLIENT_SERIAL, 8, 1);
pub const MULTI_INSTANCE_BLOCK: Field = Field::after(CLIENT_VERSION, 1, 1);
pub const WINDOW_NAME: Field = Field::after(MULTI_INSTANCE_BLOCK, 128, 1);
pub const SCREENSHOT_PATH: Field = Field::after(WINDOW_NAME, 256, 1);
pub const DISABLE_RESETS: Field = Field::after(SCREENSHOT_PATH, 1, 1);
pub const DISABLE_GRAND_RESETS: Field = Field::after(DISABLE_RESETS, 1, 1);
pub const CLIENT_NAME: Field = Field::after(DISABLE_GRAND_RESETS, 128, 1);
pub const PLUGIN_NAME: Field = Field::after(CLIENT_NAME, 128, 1);
pub const CLIENT_CHECKSUM: Field = Field::after(PLUGIN_NAME, 4, 4);
pub const PLUGIN_CHECKSUM: Field = Field::after(CLIENT_CHECKSUM, 4, 4);
pub const RECONNECT_TIME: Field = Field::after(PLUGIN_CHECKSUM, 4, 4);
pub const HEALTH_BAR_TYPE: Field = Field::after(RECONNECT_TIME, 1, 1);
pub const ENABLE_MOVE_LIST: Field = Field::after(HEALTH_BAR_TYPE, 1, 1);
pub const ENABLE_SPECIAL_CHARACTERS: Field = Field::after(ENABLE_MOVE_LIST, 1, 1);
pub const XOR_FILTER: Field = Field::after(ENABLE_SPECIAL_CHARACTERS, 32, 1);

pub const XOR_FILTER_LEN: usize = XOR_FILTER.len;

pub const MAX_MAPS: usize = 100;
pub const MAX_ITEM: usize = 7680;
pub const MAX_CUSTOM_BOW: usize = 100;
pub const MAX_CUSTOM_WING: usize = 100;
pub const MAX_ITEM_OPTION_INFO: usize = 1000;
pub const MAX_MONSTER: usize = 512;

/// Opaque customisation tables appended after the scalar fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    MapManager,
    CustomGlow,
    CustomItem,
    CustomBow,
    CustomWing,
    ItemOption,
    CustomMonster,
    ItemPosition,
    MapFog,
}

impl Table {
    pub const ALL: [Table; 9] = [
        Table::MapManager,
        Table::CustomGlow,
        Table::CustomItem,
        Table::CustomBow,
        Table::CustomWing,
        Table::ItemOption,
        Table::CustomMonster,
        Table::ItemPosition,
        Table::MapFog,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::MapManager => "MapManager",
            Table::CustomGlow => "CustomGlow",
            Table::CustomItem => "CustomItem",
            Table::CustomBow => "CustomBow",
            Table::CustomWing => "CustomWing",
            Table::ItemOption => "ItemOption",
            Table::CustomMonster => "CustomMonster",
            Table::ItemPosition => "ItemPosition",
            Table::MapFog => "MapFog",
        }
    }

    /// (entry count, entry size in bytes)
    const fn shape(self) -> (usize, usize) {
        match self {
            Table::MapManager => (MAX_MAPS, 16),
            Table::CustomGlow => (MAX_ITEM, 16),
            Table::CustomItem => (MAX_ITEM, 44),
            Table::CustomBow => (MAX_CUSTOM_BOW, 12),
            Table::CustomWing => (MAX_CUSTOM_WING, 24),
            Table::ItemOption => (MAX_ITEM_OPTION_INFO, 24),
            Table::CustomMonster => (MAX_MONSTER, 40),
            Table::ItemPosition => (MAX_ITEM, 28),
            Table::MapFog => (MAX_MAPS, 8),
        }
    }

    pub const fn len(self) -> usize {
        let (count, entry) = self.shape();
        count * entry
    }

    /// Region of this table relative to the start of the tables block
    pub fn region(self) -> Field {
        let mut offset = 0;
        for table in Table::ALL {
            if table == self {
                break;
            }
            offset += table.len();
        }
        Field {
            offset,
            len: self.len(),
        }
    }
}

const fn tables_len() -> usize {
    let mut total = 0;
    let mut i = 0;
    while i < Table::ALL.len() {
        total += Table::ALL[i].len();
        i += 1;
    }
    total
}

pub const TABLES: Field = Field::after(XOR_FILTER, tables_len(), 4);

/// Total size of an encoded record
pub const RECORD_LEN: usize = TABLES.end();
