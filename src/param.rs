use binread::{
    io::{Read, Seek, SeekFrom},
    BinReaderExt,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entry::MsbEntry;
use crate::error::MsbError;
use crate::export::{align_writer, round_up, Reservations};
use crate::strings::{read_utf16, write_utf16};

/// Version stamped into freshly created entry params.
pub const MSB_PARAM_VERSION: u32 = 75;

/// An ordered list of entries of one supertype.
///
/// On disk: `u32 version`, `u32 entry_count`, `entry_count + 1` 64 bit
/// offsets (the last one points at the param name string that terminates
/// the table), then the entry bodies.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug)]
pub struct MsbParam<T: MsbEntry> {
    pub version: u32,
    pub entries: Vec<T>,
}

impl<T: MsbEntry> Default for MsbParam<T> {
    fn default() -> Self {
        Self {
            version: MSB_PARAM_VERSION,
            entries: Vec::new(),
        }
    }
}

impl<T: MsbEntry> MsbParam<T> {
    /// The first entry named `name`, if any.
    pub fn find(&self, name: &str) -> Option<&T> {
        self.entries.iter().find(|e| e.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut T> {
        self.entries.iter_mut().find(|e| e.name() == name)
    }

    pub(crate) fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let table_offset = reader.stream_position()?;
        let version = reader.read_le::<u32>()?;
        let entry_count = reader.read_le::<u32>()?;

        let mut entry_offsets = Vec::with_capacity(entry_count as usize);
        for _ in 0..entry_count {
            entry_offsets.push(reader.read_le::<u64>()?);
        }
        let name_offset = reader.read_le::<u64>()?;

        let mut entries = Vec::with_capacity(entry_count as usize);
        for offset in entry_offsets {
            if offset == 0 {
                return Err(MsbError::format(table_offset, "entry offset must not be 0"));
            }
            reader.seek(SeekFrom::Start(offset))?;
            entries.push(T::read(reader)?);
        }

        reader.seek(SeekFrom::Start(name_offset))?;
        let param_name = read_utf16(reader)?;
        if param_name != T::PARAM_NAME {
            return Err(MsbError::format(
                name_offset,
                format!("expected param name {:?}, found {param_name:?}", T::PARAM_NAME),
            ));
        }

        // The name string is the last data in the param; skip its alignment
        // padding to land on the next param.
        let pos = reader.stream_position()?;
        reader.seek(SeekFrom::Start(round_up(pos, 8)))?;

        Ok(Self { version, entries })
    }

    /// Serializes the param. Entries must already be in canonical order;
    /// [Msb::write](crate::Msb::write) sorts before any param is written.
    pub(crate) fn write<W: Write + Seek>(&self, writer: &mut W) -> Result<(), MsbError> {
        writer.write_u32::<LittleEndian>(self.version)?;
        writer.write_u32::<LittleEndian>(self.entries.len() as u32)?;

        let mut reservations = Reservations::new();
        reservations.reserve(writer, "entry_offsets", (self.entries.len() as u32 + 1) * 8)?;

        let mut offsets = Vec::with_capacity(self.entries.len() + 1);
        let mut previous_tag = None;
        let mut subtype_index = 0i32;
        for entry in &self.entries {
            if previous_tag != Some(entry.subtype_tag()) {
                previous_tag = Some(entry.subtype_tag());
                subtype_index = 0;
            }
            align_writer(writer, 8)?;
            offsets.push(writer.stream_position()?);
            entry.write(writer, subtype_index)?;
            subtype_index += 1;
        }

        offsets.push(writer.stream_position()?);
        write_utf16(writer, T::PARAM_NAME)?;
        align_writer(writer, 8)?;

        let mut table = Vec::with_capacity(offsets.len() * 8);
        for offset in &offsets {
            table.extend_from_slice(&offset.to_le_bytes());
        }
        reservations.fill(writer, "entry_offsets", &table)?;
        reservations.finish()
    }

    /// Stable-sorts entries into canonical write order: grouped by subtype
    /// tag, ascending, keeping insertion order within a subtype.
    pub(crate) fn sort_canonical(&mut self) {
        self.entries.sort_by_key(|e| e.subtype_tag());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::model::{Model, ModelType};
    use std::io::Cursor;

    fn param_of(models: Vec<Model>) -> MsbParam<Model> {
        MsbParam {
            version: MSB_PARAM_VERSION,
            entries: models,
        }
    }

    #[test]
    fn param_round_trip() {
        let mut param = param_of(vec![
            Model::new(ModelType::MapPiece, "m000000"),
            Model::new(ModelType::Character, "c1000"),
        ]);
        param.sort_canonical();

        let mut writer = Cursor::new(Vec::new());
        param.write(&mut writer).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = MsbParam::<Model>::read(&mut reader).unwrap();
        assert_eq!(2, read_back.entries.len());
        assert_eq!("m000000", read_back.entries[0].name);
        assert_eq!("c1000", read_back.entries[1].name);
    }

    #[test]
    fn canonical_order_groups_by_subtype_tag() {
        let mut param = param_of(vec![
            Model::new(ModelType::Asset, "AEG001_001"),
            Model::new(ModelType::MapPiece, "m000001"),
            Model::new(ModelType::Character, "c1000"),
            Model::new(ModelType::MapPiece, "m000000"),
        ]);
        param.sort_canonical();

        let names: Vec<&str> = param.entries.iter().map(|e| e.name.as_str()).collect();
        // Grouped by ascending tag, stable within a subtype.
        assert_eq!(vec!["m000001", "m000000", "c1000", "AEG001_001"], names);
    }

    #[test]
    fn read_rejects_wrong_param_name() {
        let param = param_of(vec![]);
        let mut writer = Cursor::new(Vec::new());
        param.write(&mut writer).unwrap();

        // An empty Model param is a valid empty param of any supertype
        // except for its name string.
        let mut reader = Cursor::new(writer.into_inner());
        let result = MsbParam::<crate::entries::route::Route>::read(&mut reader);
        assert!(matches!(result, Err(MsbError::Format { .. })));
    }

    #[test]
    fn read_lands_on_next_param() {
        let param = param_of(vec![Model::new(ModelType::MapPiece, "m000000")]);
        let mut writer = Cursor::new(Vec::new());
        param.write(&mut writer).unwrap();
        let end = writer.position();
        writer.write_u32::<LittleEndian>(0xDEAD).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        MsbParam::<Model>::read(&mut reader).unwrap();
        assert_eq!(end, reader.position());
    }
}
