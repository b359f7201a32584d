//! Part entries are the placed instances of a map: geometry pieces,
//! characters, collision, and the connections between maps.

use binread::{
    io::{Read, Seek, SeekFrom},
    BinRead, BinReaderExt, BinResult, ReadOptions,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entries::model::Model;
use crate::entry::{EntryId, EntryKey, MsbEntry, MsbRef};
use crate::error::MsbError;
use crate::export::{align_writer, write_zeroes, Reservations};
use crate::record::{expect_non_negative, expect_positive, expect_zero, read_record, Record};
use crate::strings::{read_utf16, write_utf16};
use crate::vectors::Vector3;

/// Part subtype tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum PartType {
    MapPiece = 0,
    Character = 2,
    Player = 4,
    Collision = 5,
    DummyAsset = 9,
    DummyCharacter = 10,
    ConnectCollision = 11,
    Asset = 13,
    Other = 0xFFFFFFFF,
}

impl PartType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::MapPiece),
            2 => Some(Self::Character),
            4 => Some(Self::Player),
            5 => Some(Self::Collision),
            9 => Some(Self::DummyAsset),
            10 => Some(Self::DummyCharacter),
            11 => Some(Self::ConnectCollision),
            13 => Some(Self::Asset),
            0xFFFFFFFF => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(BinRead, Debug)]
struct PartHeader {
    name_offset: i64,
    part_subtype: u32,
    subtype_index: i32,
    model_index: i32,
    pad14: i32,
    sib_path_offset: i64,
    translate: Vector3,
    rotate: Vector3,
    scale: Vector3,
    unk44: i32,
    common_data_offset: i64,
    subtype_data_offset: i64,
}

impl Record for PartHeader {
    const NAME: &'static str = "PartHeader";
    const SIZE: u32 = 0x58;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_positive(Self::NAME, "name_offset", offset, self.name_offset)?;
        expect_zero(Self::NAME, "pad14", offset, self.pad14 as i64)?;
        expect_positive(Self::NAME, "sib_path_offset", offset, self.sib_path_offset)?;
        expect_positive(
            Self::NAME,
            "common_data_offset",
            offset,
            self.common_data_offset,
        )?;
        expect_non_negative(
            Self::NAME,
            "subtype_data_offset",
            offset,
            self.subtype_data_offset,
        )?;
        Ok(())
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<LittleEndian>(self.name_offset)?;
        writer.write_u32::<LittleEndian>(self.part_subtype)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        writer.write_i32::<LittleEndian>(self.model_index)?;
        writer.write_i32::<LittleEndian>(self.pad14)?;
        writer.write_i64::<LittleEndian>(self.sib_path_offset)?;
        self.translate.put(writer)?;
        self.rotate.put(writer)?;
        self.scale.put(writer)?;
        writer.write_i32::<LittleEndian>(self.unk44)?;
        writer.write_i64::<LittleEndian>(self.common_data_offset)?;
        writer.write_i64::<LittleEndian>(self.subtype_data_offset)?;
        Ok(())
    }
}

/// AI and dialogue bindings shared by character-like parts.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, Default, PartialEq)]
pub struct CharacterData {
    pub think_param_id: i32,
    pub npc_param_id: i32,
    pub talk_id: i32,
    pub chara_init_id: i32,
    #[br(pad_after = 4)]
    pub unk10: i32,
}

impl CharacterData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i32::<LittleEndian>(self.think_param_id)?;
        writer.write_i32::<LittleEndian>(self.npc_param_id)?;
        writer.write_i32::<LittleEndian>(self.talk_id)?;
        writer.write_i32::<LittleEndian>(self.chara_init_id)?;
        writer.write_i32::<LittleEndian>(self.unk10)?;
        write_zeroes(writer, 4)?;
        Ok(())
    }
}

/// The link from a connect collision to its host collision and target map.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectCollisionData {
    /// The collision part this connection activates over.
    pub collision: MsbRef<Part>,
    /// Target map reference, e.g. `[10, 0, 0, 0]` for m10_00_00_00.
    pub target_map_id: [i8; 4],
}

impl BinRead for ConnectCollisionData {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let collision = MsbRef::read_options(reader, options, ())?;
        let mut target_map_id = [0i8; 4];
        for byte in target_map_id.iter_mut() {
            *byte = i8::read_options(reader, options, ())?;
        }
        Ok(Self {
            collision,
            target_map_id,
        })
    }
}

impl ConnectCollisionData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        self.collision.put(writer)?;
        for byte in &self.target_map_id {
            writer.write_i8(*byte)?;
        }
        Ok(())
    }
}

/// Per-subtype part payload. The variant selects the subtype tag.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(import(tag: u32))]
pub enum PartData {
    #[br(pre_assert(tag == PartType::MapPiece as u32))]
    MapPiece,

    #[br(pre_assert(tag == PartType::Character as u32))]
    Character(CharacterData),

    #[br(pre_assert(tag == PartType::Player as u32))]
    Player,

    #[br(pre_assert(tag == PartType::Collision as u32))]
    Collision {
        #[br(pad_after = 3)]
        hit_filter_id: u8,
        play_region_id: i32,
    },

    #[br(pre_assert(tag == PartType::DummyAsset as u32))]
    DummyAsset,

    #[br(pre_assert(tag == PartType::DummyCharacter as u32))]
    DummyCharacter(CharacterData),

    #[br(pre_assert(tag == PartType::ConnectCollision as u32))]
    ConnectCollision(ConnectCollisionData),

    #[br(pre_assert(tag == PartType::Asset as u32))]
    Asset {
        unk00: i16,
        unk02: i16,
        unk04: i32,
    },

    #[br(pre_assert(tag == PartType::Other as u32))]
    Other,
}

impl PartData {
    pub fn part_type(&self) -> PartType {
        match self {
            PartData::MapPiece => PartType::MapPiece,
            PartData::Character(_) => PartType::Character,
            PartData::Player => PartType::Player,
            PartData::Collision { .. } => PartType::Collision,
            PartData::DummyAsset => PartType::DummyAsset,
            PartData::DummyCharacter(_) => PartType::DummyCharacter,
            PartData::ConnectCollision(_) => PartType::ConnectCollision,
            PartData::Asset { .. } => PartType::Asset,
            PartData::Other => PartType::Other,
        }
    }

    /// Variants with no subtype data block; their headers store a zero
    /// subtype data offset.
    fn dataless(part_type: PartType) -> Option<PartData> {
        match part_type {
            PartType::MapPiece => Some(PartData::MapPiece),
            PartType::Player => Some(PartData::Player),
            PartType::DummyAsset => Some(PartData::DummyAsset),
            PartType::Other => Some(PartData::Other),
            _ => None,
        }
    }

    fn has_block(&self) -> bool {
        Self::dataless(self.part_type()).is_none()
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            PartData::Character(character) | PartData::DummyCharacter(character) => {
                character.put(writer)?
            }
            PartData::Collision {
                hit_filter_id,
                play_region_id,
            } => {
                writer.write_u8(*hit_filter_id)?;
                write_zeroes(writer, 3)?;
                writer.write_i32::<LittleEndian>(*play_region_id)?;
            }
            PartData::ConnectCollision(connect) => connect.put(writer)?,
            PartData::Asset {
                unk00,
                unk02,
                unk04,
            } => {
                writer.write_i16::<LittleEndian>(*unk00)?;
                writer.write_i16::<LittleEndian>(*unk02)?;
                writer.write_i32::<LittleEndian>(*unk04)?;
            }
            PartData::MapPiece | PartData::Player | PartData::DummyAsset | PartData::Other => {}
        }
        Ok(())
    }
}

/// A placed map instance.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Part {
    id: EntryId,
    pub name: String,
    /// The model this part instantiates.
    pub model: MsbRef<Model>,
    /// External placement (SIB) path for this part.
    pub sib_path: String,
    pub translate: Vector3,
    pub rotate: Vector3,
    pub scale: Vector3,
    pub unk44: i32,
    pub entity_id: u32,
    pub unk04: u8,
    pub unk08: i32,
    pub data: PartData,
}

impl Part {
    pub fn new(name: impl Into<String>, data: PartData) -> Self {
        Self {
            id: EntryId::fresh(),
            name: name.into(),
            model: MsbRef::null(),
            sib_path: String::new(),
            translate: Vector3::default(),
            rotate: Vector3::default(),
            scale: Vector3::new(1.0, 1.0, 1.0),
            unk44: 0,
            entity_id: 0,
            unk04: 0,
            unk08: 0,
            data,
        }
    }

    pub fn part_type(&self) -> PartType {
        self.data.part_type()
    }

    pub(crate) fn resolve_refs(
        &mut self,
        models: &[EntryKey],
        parts: &[EntryKey],
    ) -> Result<(), MsbError> {
        self.model.resolve(models)?;
        if let PartData::ConnectCollision(connect) = &mut self.data {
            connect.collision.resolve(parts)?;
        }
        Ok(())
    }

    pub(crate) fn sync_indices(
        &mut self,
        models: &[EntryKey],
        parts: &[EntryKey],
    ) -> Result<(), MsbError> {
        let name = self.name.clone();
        self.model.sync(&name, models)?;
        if let PartData::ConnectCollision(connect) = &mut self.data {
            connect.collision.sync(&name, parts)?;
        }
        Ok(())
    }
}

impl MsbEntry for Part {
    const PARAM_NAME: &'static str = "PARTS_PARAM_ST";

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn subtype_tag(&self) -> u32 {
        self.part_type() as u32
    }

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let start = reader.stream_position()?;
        let header: PartHeader = read_record(reader)?;

        let part_type = PartType::from_raw(header.part_subtype).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown part subtype tag {:#x}", header.part_subtype),
            )
        })?;

        reader.seek(SeekFrom::Start(start + header.name_offset as u64))?;
        let name = read_utf16(reader)?;

        reader.seek(SeekFrom::Start(start + header.sib_path_offset as u64))?;
        let sib_path = read_utf16(reader)?;

        reader.seek(SeekFrom::Start(start + header.common_data_offset as u64))?;
        let entity_id = reader.read_le::<u32>()?;
        let unk04 = reader.read_le::<u8>()?;
        reader.seek(SeekFrom::Current(3))?;
        let unk08 = reader.read_le::<i32>()?;

        let data = match PartData::dataless(part_type) {
            Some(data) if header.subtype_data_offset == 0 => data,
            Some(_) => {
                return Err(MsbError::format(
                    start,
                    format!("unexpected subtype data for {part_type:?} part"),
                ));
            }
            None if header.subtype_data_offset == 0 => {
                return Err(MsbError::format(
                    start,
                    format!("missing subtype data for {part_type:?} part"),
                ));
            }
            None => {
                reader.seek(SeekFrom::Start(start + header.subtype_data_offset as u64))?;
                reader.read_le_args::<PartData>((header.part_subtype,))?
            }
        };

        Ok(Self {
            id: EntryId::fresh(),
            name,
            model: MsbRef::from_index(header.model_index),
            sib_path,
            translate: header.translate,
            rotate: header.rotate,
            scale: header.scale,
            unk44: header.unk44,
            entity_id,
            unk04,
            unk08,
            data,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError> {
        let start = writer.stream_position()?;
        let mut reservations = Reservations::new();
        reservations.reserve_record::<PartHeader, _>(writer)?;

        let name_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.name)?;

        let sib_path_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.sib_path)?;
        align_writer(writer, 4)?;

        let common_data_offset = (writer.stream_position()? - start) as i64;
        writer.write_u32::<LittleEndian>(self.entity_id)?;
        writer.write_u8(self.unk04)?;
        write_zeroes(writer, 3)?;
        writer.write_i32::<LittleEndian>(self.unk08)?;
        write_zeroes(writer, 4)?;

        let subtype_data_offset = if self.data.has_block() {
            align_writer(writer, 8)?;
            let offset = (writer.stream_position()? - start) as i64;
            self.data.put(writer)?;
            offset
        } else {
            0
        };

        align_writer(writer, 8)?;

        reservations.fill_record(
            writer,
            &PartHeader {
                name_offset,
                part_subtype: self.subtype_tag(),
                subtype_index,
                model_index: self.model.raw_index(),
                pad14: 0,
                sib_path_offset,
                translate: self.translate,
                rotate: self.rotate,
                scale: self.scale,
                unk44: self.unk44,
                common_data_offset,
                subtype_data_offset,
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
    fn character_part_round_trip() {
        let mut part = Part::new(
            "c1000_0000",
            PartData::Character(CharacterData {
                think_param_id: 100000,
                npc_param_id: 10000000,
                talk_id: 1000,
                ..CharacterData::default()
            }),
        );
        part.translate = Vector3::new(10.0, -2.5, 103.25);
        part.rotate = Vector3::new(0.0, 1.5, 0.0);
        part.entity_id = 1041360100;
        part.sib_path = "N:\\GR\\data\\Model\\map\\m10_00_00_00\\sib\\layout.SIB".to_string();

        let mut writer = Cursor::new(Vec::new());
        part.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Part::read(&mut reader).unwrap();
        assert_eq!(part.name, read_back.name);
        assert_eq!(part.sib_path, read_back.sib_path);
        assert_eq!(part.translate, read_back.translate);
        assert_eq!(part.rotate, read_back.rotate);
        assert_eq!(part.scale, read_back.scale);
        assert_eq!(part.entity_id, read_back.entity_id);
        assert_eq!(part.data, read_back.data);
    }

    #[test]
    fn connect_collision_round_trip() {
        let part = Part::new(
            "h000000_0001",
            PartData::ConnectCollision(ConnectCollisionData {
                collision: MsbRef::null(),
                target_map_id: [10, 0, 0, 0],
            }),
        );

        let mut writer = Cursor::new(Vec::new());
        part.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Part::read(&mut reader).unwrap();
        match read_back.data {
            PartData::ConnectCollision(connect) => {
                assert_eq!([10, 0, 0, 0], connect.target_map_id);
                assert!(!connect.collision.is_set());
            }
            other => panic!("expected connect collision data, got {other:?}"),
        }
    }

    #[test]
    fn map_piece_has_no_subtype_block() {
        let part = Part::new("m000000_0000", PartData::MapPiece);

        let mut writer = Cursor::new(Vec::new());
        part.write(&mut writer, 0).unwrap();
        let bytes = writer.into_inner();

        // subtype_data_offset sits at 0x50 in the header.
        assert_eq!(&[0u8; 8][..], &bytes[0x50..0x58]);
    }
}
