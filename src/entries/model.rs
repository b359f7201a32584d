//! Model entries declare the geometry, character, and asset models that
//! parts instantiate.

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

/// Model subtype tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ModelType {
    MapPiece = 0,
    Character = 2,
    /// Used for the equipment-supporting player model only.
    Player = 4,
    /// Used for both collision and connect collision parts.
    Collision = 5,
    Asset = 10,
}

impl ModelType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::MapPiece),
            2 => Some(Self::Character),
            4 => Some(Self::Player),
            5 => Some(Self::Collision),
            10 => Some(Self::Asset),
            _ => None,
        }
    }
}

#[derive(BinRead, Debug)]
struct ModelHeader {
    name_offset: i64,
    model_subtype: u32,
    subtype_index: i32,
    sib_path_offset: i64,
    instance_count: i32,
    unk1c: i32,
    subtype_data_offset: i64,
}

impl Record for ModelHeader {
    const NAME: &'static str = "ModelHeader";
    const SIZE: u32 = 0x28;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_positive(Self::NAME, "name_offset", offset, self.name_offset)?;
        expect_positive(Self::NAME, "sib_path_offset", offset, self.sib_path_offset)?;
        // Models never carry subtype data.
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
        writer.write_u32::<LittleEndian>(self.model_subtype)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        writer.write_i64::<LittleEndian>(self.sib_path_offset)?;
        writer.write_i32::<LittleEndian>(self.instance_count)?;
        writer.write_i32::<LittleEndian>(self.unk1c)?;
        writer.write_i64::<LittleEndian>(self.subtype_data_offset)?;
        Ok(())
    }
}

/// A model declaration. Parts reference models by supertype index.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Model {
    id: EntryId,
    pub name: String,
    pub model_type: ModelType,
    /// External asset (SIB) path for this model.
    pub sib_path: String,
    pub instance_count: i32,
    pub unk1c: i32,
}

impl Model {
    pub fn new(model_type: ModelType, name: impl Into<String>) -> Self {
        Self {
            id: EntryId::fresh(),
            name: name.into(),
            model_type,
            sib_path: String::new(),
            instance_count: 0,
            unk1c: 0,
        }
    }
}

impl MsbEntry for Model {
    const PARAM_NAME: &'static str = "MODEL_PARAM_ST";

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn subtype_tag(&self) -> u32 {
        self.model_type as u32
    }

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let start = reader.stream_position()?;
        let header: ModelHeader = read_record(reader)?;

        let model_type = ModelType::from_raw(header.model_subtype).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown model subtype tag {:#x}", header.model_subtype),
            )
        })?;

        reader.seek(SeekFrom::Start(start + header.name_offset as u64))?;
        let name = read_utf16(reader)?;

        reader.seek(SeekFrom::Start(start + header.sib_path_offset as u64))?;
        let sib_path = read_utf16(reader)?;

        Ok(Self {
            id: EntryId::fresh(),
            name,
            model_type,
            sib_path,
            instance_count: header.instance_count,
            unk1c: header.unk1c,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError> {
        let start = writer.stream_position()?;
        let mut reservations = Reservations::new();
        reservations.reserve_record::<ModelHeader, _>(writer)?;

        let name_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.name)?;

        let sib_path_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.sib_path)?;

        align_writer(writer, 8)?;

        reservations.fill_record(
            writer,
            &ModelHeader {
                name_offset,
                model_subtype: self.model_type as u32,
                subtype_index,
                sib_path_offset,
                instance_count: self.instance_count,
                unk1c: self.unk1c,
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

    fn hex_bytes(hex: &str) -> Vec<u8> {
        // Remove any whitespace used to make the tests more readable.
        let no_whitespace: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
        hex::decode(no_whitespace).unwrap()
    }

    // One MapPiece model named "m000000" with an empty sib path, starting
    // at offset 0: header, name, sib path, then alignment to 8.
    fn map_piece_bytes() -> Vec<u8> {
        hex_bytes(
            "28000000 00000000 00000000 00000000
             38000000 00000000 00000000 00000000
             00000000 00000000
             6D003000 30003000 30003000 30000000
             0000 000000000000",
        )
    }

    #[test]
    fn read_map_piece() {
        let mut reader = Cursor::new(map_piece_bytes());
        let model = Model::read(&mut reader).unwrap();
        assert_eq!("m000000", model.name);
        assert_eq!(ModelType::MapPiece, model.model_type);
        assert_eq!("", model.sib_path);
        assert_eq!(0, model.instance_count);
    }

    #[test]
    fn write_map_piece() {
        let model = Model::new(ModelType::MapPiece, "m000000");
        let mut writer = Cursor::new(Vec::new());
        model.write(&mut writer, 0).unwrap();
        assert_eq!(map_piece_bytes(), writer.into_inner());
    }

    #[test]
    fn read_rejects_nonzero_subtype_data_offset() {
        let mut bytes = map_piece_bytes();
        bytes[0x20] = 0x40;
        let mut reader = Cursor::new(bytes);
        let result = Model::read(&mut reader);
        assert!(matches!(
            result,
            Err(MsbError::Validation {
                record: "ModelHeader",
                field: "subtype_data_offset",
                ..
            })
        ));
    }

    #[test]
    fn read_rejects_unknown_subtype_tag() {
        let mut bytes = map_piece_bytes();
        bytes[0x08] = 0x07;
        let mut reader = Cursor::new(bytes);
        let result = Model::read(&mut reader);
        assert!(matches!(result, Err(MsbError::Format { .. })));
    }

    #[test]
    fn character_model_round_trip() {
        let mut model = Model::new(ModelType::Character, "c1000");
        model.sib_path = "N:\\GR\\data\\Model\\chr\\c1000\\sib\\c1000.sib".to_string();
        model.instance_count = 3;

        let mut writer = Cursor::new(Vec::new());
        model.write(&mut writer, 2).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Model::read(&mut reader).unwrap();
        assert_eq!(model.name, read_back.name);
        assert_eq!(model.model_type, read_back.model_type);
        assert_eq!(model.sib_path, read_back.sib_path);
        assert_eq!(model.instance_count, read_back.instance_count);
    }
}
