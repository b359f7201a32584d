//! # msb_lib
//!
//! msb_lib is a library for safe and efficient reading and writing of the
//! MapStudio MSB map format used by a family of action RPG games.
//!
//! An MSB file declares every entity that composes a game map: model
//! references, placed parts, scripted events, functional regions, and
//! spatial routes. Entries reference each other on disk by signed indices
//! into their entry params; in memory those links are [MsbRef] values that
//! survive list edits and are converted back to indices on write.
//!
//! ## Getting Started
//! ### Reading
//!```no_run
//!# fn main() -> Result<(), msb_lib::MsbError> {
//!let msb = msb_lib::Msb::from_file("m10_00_00_00.msb")?;
//!for part in &msb.parts.entries {
//!    println!("{}", part.name);
//!}
//!# Ok(())
//!# }
//!```
//! ### Editing and writing
//!```no_run
//!# fn main() -> Result<(), msb_lib::MsbError> {
//!use msb_lib::{Model, ModelType};
//!
//!let mut msb = msb_lib::Msb::from_file("m10_00_00_00.msb")?;
//!msb.models.entries.push(Model::new(ModelType::MapPiece, "m000100"));
//!msb.write_to_file("m10_00_00_00_new.msb")?;
//!# Ok(())
//!# }
//!```
//! Writing reorders each param into canonical order (grouped by subtype
//! tag) and re-derives every reference index from the live object graph,
//! so removing an entry that is still referenced fails instead of
//! silently writing a stale index.
pub mod entries;

mod entry;
pub use entry::{EntryId, MsbEntry, MsbRef, MsbRefPair};

mod error;
pub use error::MsbError;

mod param;
pub use param::{MsbParam, MSB_PARAM_VERSION};

mod vectors;
pub use vectors::Vector3;

mod export;
mod record;
mod strings;

pub use entries::event::{Event, EventData, EventType, GeneratorData};
pub use entries::model::{Model, ModelType};
pub use entries::part::{CharacterData, ConnectCollisionData, Part, PartData, PartType};
pub use entries::region::{
    CompositeChildren, ConnectionData, GroupDefeatRewardData, HorseRideOverrideType, Region,
    RegionData, RegionType, SoundData,
};
pub use entries::route::{Route, RouteType};
pub use entries::shape::{Shape, ShapeType};

use binread::{
    io::{Read, Seek},
    BinRead, BinReaderExt,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use entry::entry_keys;
use export::{align_writer, write_buffered};
use record::{expect_eq, expect_zero, read_record, write_record, Record};
use strings::{read_utf16, write_utf16};

/// The file format version this dialect reads and writes.
pub const MSB_VERSION: u32 = 1;

#[derive(BinRead, Debug)]
#[br(magic = b"MSB\0")]
struct MsbHeader {
    byte_order: u32,
    bit_big_endian: u32,
    wide_offsets: u32,
    version: u32,
}

impl Default for MsbHeader {
    fn default() -> Self {
        Self {
            byte_order: 0,
            bit_big_endian: 0,
            wide_offsets: 1,
            version: MSB_VERSION,
        }
    }
}

impl Record for MsbHeader {
    const NAME: &'static str = "MsbHeader";
    // Includes the 4 magic bytes.
    const SIZE: u32 = 0x14;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_zero(Self::NAME, "byte_order", offset, self.byte_order as i64)?;
        expect_zero(
            Self::NAME,
            "bit_big_endian",
            offset,
            self.bit_big_endian as i64,
        )?;
        expect_eq(
            Self::NAME,
            "wide_offsets",
            offset,
            1,
            self.wide_offsets as i64,
        )?;
        expect_eq(
            Self::NAME,
            "version",
            offset,
            MSB_VERSION as i64,
            self.version as i64,
        )?;
        Ok(())
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(b"MSB\0")?;
        writer.write_u32::<LittleEndian>(self.byte_order)?;
        writer.write_u32::<LittleEndian>(self.bit_big_endian)?;
        writer.write_u32::<LittleEndian>(self.wide_offsets)?;
        writer.write_u32::<LittleEndian>(self.version)?;
        Ok(())
    }
}

/// A MapStudio map definition: the five entry params of one map.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default)]
pub struct Msb {
    pub models: MsbParam<Model>,
    pub events: MsbParam<Event>,
    pub parts: MsbParam<Part>,
    pub regions: MsbParam<Region>,
    pub routes: MsbParam<Route>,
}

impl Msb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tries to read an MSB from `path`.
    /// The entire file is buffered for performance.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MsbError> {
        let path = path.as_ref();
        let bytes = fs::read(path).map_err(|e| MsbError::from(e).in_file(path, "read"))?;
        let mut reader = Cursor::new(bytes);
        Self::read(&mut reader).map_err(|e| e.in_file(path, "read"))
    }

    /// Tries to read an MSB from `reader`.
    /// For best performance when opening from a file, use
    /// [from_file](Msb::from_file) instead.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let _header: MsbHeader = read_record(reader)?;

        let models = MsbParam::read(reader)?;
        let events = MsbParam::read(reader)?;
        let parts = MsbParam::read(reader)?;
        let regions = MsbParam::read(reader)?;
        let routes = MsbParam::read(reader)?;
        read_terminator(reader)?;

        let mut msb = Self {
            models,
            events,
            parts,
            regions,
            routes,
        };
        msb.resolve_references()?;
        Ok(msb)
    }

    /// Serializes the map to `writer`.
    ///
    /// Entries are first reordered into canonical write order and every
    /// live reference is converted to indices against that order. A
    /// reference to an entry no longer in the map fails the whole write
    /// before any byte is emitted.
    pub fn write<W: Write + Seek>(&mut self, writer: &mut W) -> Result<(), MsbError> {
        self.models.sort_canonical();
        self.events.sort_canonical();
        self.parts.sort_canonical();
        self.regions.sort_canonical();
        self.routes.sort_canonical();
        self.sync_indices()?;

        write_record(writer, &MsbHeader::default())?;
        self.models.write(writer)?;
        self.events.write(writer)?;
        self.parts.write(writer)?;
        self.regions.write(writer)?;
        self.routes.write(writer)?;
        write_terminator(writer)?;
        Ok(())
    }

    /// Serializes the map to `path`.
    /// The entire file is buffered, so a failed write leaves no file
    /// behind rather than a truncated one.
    pub fn write_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), MsbError> {
        let path = path.as_ref();
        let mut file =
            fs::File::create(path).map_err(|e| MsbError::from(e).in_file(path, "write"))?;
        write_buffered(&mut file, |cursor| self.write(cursor))
            .map_err(|e| e.in_file(path, "write"))
    }

    /// Second read pass: promote every on-disk index to a live reference.
    fn resolve_references(&mut self) -> Result<(), MsbError> {
        let model_keys = entry_keys(&self.models.entries);
        let part_keys = entry_keys(&self.parts.entries);
        let region_keys = entry_keys(&self.regions.entries);

        for event in &mut self.events.entries {
            event.resolve_refs(&part_keys, &region_keys)?;
        }
        for part in &mut self.parts.entries {
            part.resolve_refs(&model_keys, &part_keys)?;
        }
        for region in &mut self.regions.entries {
            region.resolve_refs(&region_keys, &part_keys)?;
        }
        Ok(())
    }

    /// First write pass: convert every live reference back to indices.
    fn sync_indices(&mut self) -> Result<(), MsbError> {
        let model_keys = entry_keys(&self.models.entries);
        let part_keys = entry_keys(&self.parts.entries);
        let region_keys = entry_keys(&self.regions.entries);

        for event in &mut self.events.entries {
            event.sync_indices(&part_keys, &region_keys)?;
        }
        for part in &mut self.parts.entries {
            part.sync_indices(&model_keys, &part_keys)?;
        }
        for region in &mut self.regions.entries {
            region.sync_indices(&region_keys, &part_keys)?;
        }
        Ok(())
    }
}

/// The sentinel param that terminates the param sequence: an empty table
/// whose name is the empty string.
fn read_terminator<R: Read + Seek>(reader: &mut R) -> Result<(), MsbError> {
    let offset = reader.stream_position()?;
    let _version = reader.read_le::<u32>()?;
    let entry_count = reader.read_le::<u32>()?;
    if entry_count != 0 {
        return Err(MsbError::format(offset, "terminator param must be empty"));
    }
    let name_offset = reader.read_le::<u64>()?;
    reader.seek(binread::io::SeekFrom::Start(name_offset))?;
    let name = read_utf16(reader)?;
    if !name.is_empty() {
        return Err(MsbError::format(
            name_offset,
            format!("terminator param name must be empty, found {name:?}"),
        ));
    }
    Ok(())
}

fn write_terminator<W: Write + Seek>(writer: &mut W) -> Result<(), MsbError> {
    writer.write_u32::<LittleEndian>(0)?;
    writer.write_u32::<LittleEndian>(0)?;
    let name_offset = writer.stream_position()? + 8;
    writer.write_u64::<LittleEndian>(name_offset)?;
    write_utf16(writer, "")?;
    align_writer(writer, 8)?;
    Ok(())
}
