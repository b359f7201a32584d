//! Route entries describe spatial routes; this dialect's route subtypes
//! carry no payload beyond the common header.

use binread::{
    io::{Read, Seek, SeekFrom},
    BinRead,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entry::{EntryId, MsbEntry};
use crate::error::MsbError;
use crate::export::{align_writer, Reservations};
use crate::record::{expect_positive, expect_zero, read_record, Record};
use crate::strings::{read_utf16, write_utf16};

/// Route subtype tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum RouteType {
    MufflingPortalLink = 3,
    MufflingBoxLink = 4,
    Other = 0xFFFFFFFF,
}

impl RouteType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            3 => Some(Self::MufflingPortalLink),
            4 => Some(Self::MufflingBoxLink),
            0xFFFFFFFF => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(BinRead, Debug)]
struct RouteHeader {
    name_offset: i64,
    unk08: i32,
    unk0c: i32,
    route_subtype: u32,
    subtype_index: i32,
    subtype_data_offset: i64,
}

impl Record for RouteHeader {
    const NAME: &'static str = "RouteHeader";
    const SIZE: u32 = 0x20;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_positive(Self::NAME, "name_offset", offset, self.name_offset)?;
        // No route subtype carries data.
        expect_zero(
            Self::NAME,
            "subtype_data_offset",
            offset,
            self.subtype_data_offset,
        )?;
        Ok(())
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<LittleEndian>(self.name_offset)?;
        writer.write_i32::<LittleEndian>(self.unk08)?;
        writer.write_i32::<LittleEndian>(self.unk0c)?;
        writer.write_u32::<LittleEndian>(self.route_subtype)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        writer.write_i64::<LittleEndian>(self.subtype_data_offset)?;
        Ok(())
    }
}

/// A spatial route.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Route {
    id: EntryId,
    pub name: String,
    pub route_type: RouteType,
    pub unk08: i32,
    pub unk0c: i32,
}

impl Route {
    pub fn new(route_type: RouteType, name: impl Into<String>) -> Self {
        Self {
            id: EntryId::fresh(),
            name: name.into(),
            route_type,
            unk08: 0,
            unk0c: 0,
        }
    }
}

impl MsbEntry for Route {
    const PARAM_NAME: &'static str = "ROUTE_PARAM_ST";

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn subtype_tag(&self) -> u32 {
        self.route_type as u32
    }

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let start = reader.stream_position()?;
        let header: RouteHeader = read_record(reader)?;

        let route_type = RouteType::from_raw(header.route_subtype).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown route subtype tag {:#x}", header.route_subtype),
            )
        })?;

        reader.seek(SeekFrom::Start(start + header.name_offset as u64))?;
        let name = read_utf16(reader)?;

        Ok(Self {
            id: EntryId::fresh(),
            name,
            route_type,
            unk08: header.unk08,
            unk0c: header.unk0c,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError> {
        let start = writer.stream_position()?;
        let mut reservations = Reservations::new();
        reservations.reserve_record::<RouteHeader, _>(writer)?;

        let name_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.name)?;

        align_writer(writer, 8)?;

        reservations.fill_record(
            writer,
            &RouteHeader {
                name_offset,
                unk08: self.unk08,
                unk0c: self.unk0c,
                route_subtype: self.route_type as u32,
                subtype_index,
                subtype_data_offset: 0,
            },
        )?;
        reservations.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn route_round_trip() {
        let mut route = Route::new(RouteType::MufflingBoxLink, "muffling box link");
        route.unk08 = 7;
        route.unk0c = -2;

        let mut writer = Cursor::new(Vec::new());
        route.write(&mut writer, 4).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Route::read(&mut reader).unwrap();
        assert_eq!(route.name, read_back.name);
        assert_eq!(RouteType::MufflingBoxLink, read_back.route_type);
        assert_eq!(7, read_back.unk08);
        assert_eq!(-2, read_back.unk0c);
    }
}
