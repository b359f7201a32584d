//! Event entries script map behavior: treasure, enemy generators, object
//! actions, and the rest of this dialect's event table.

use binread::{
    io::{Read, Seek, SeekFrom},
    BinRead, BinReaderExt, BinResult, ReadOptions,
};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::Write;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::entries::part::Part;
use crate::entries::region::Region;
use crate::entry::{EntryId, EntryKey, MsbEntry, MsbRef, MsbRefPair};
use crate::error::MsbError;
use crate::export::{align_writer, write_zeroes, Reservations};
use crate::record::{expect_non_negative, expect_positive, expect_zero, read_record, Record};
use crate::strings::{read_utf16, write_utf16};

/// Event subtype tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventType {
    Treasure = 4,
    Generator = 5,
    ObjAct = 7,
    PatrolInfo = 20,
    Mount = 21,
    RetryPoint = 24,
    Other = 0xFFFFFFFF,
}

impl EventType {
    pub(crate) fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            4 => Some(Self::Treasure),
            5 => Some(Self::Generator),
            7 => Some(Self::ObjAct),
            20 => Some(Self::PatrolInfo),
            21 => Some(Self::Mount),
            24 => Some(Self::RetryPoint),
            0xFFFFFFFF => Some(Self::Other),
            _ => None,
        }
    }
}

#[derive(BinRead, Debug)]
struct EventHeader {
    name_offset: i64,
    event_subtype: u32,
    subtype_index: i32,
    unk10: i32,
    pad14: i32,
    common_data_offset: i64,
    subtype_data_offset: i64,
}

impl Record for EventHeader {
    const NAME: &'static str = "EventHeader";
    const SIZE: u32 = 0x28;

    fn validate(&self, offset: u64) -> Result<(), MsbError> {
        expect_positive(Self::NAME, "name_offset", offset, self.name_offset)?;
        expect_zero(Self::NAME, "pad14", offset, self.pad14 as i64)?;
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
        writer.write_u32::<LittleEndian>(self.event_subtype)?;
        writer.write_i32::<LittleEndian>(self.subtype_index)?;
        writer.write_i32::<LittleEndian>(self.unk10)?;
        writer.write_i32::<LittleEndian>(self.pad14)?;
        writer.write_i64::<LittleEndian>(self.common_data_offset)?;
        writer.write_i64::<LittleEndian>(self.subtype_data_offset)?;
        Ok(())
    }
}

/// Spawn state for one enemy generator.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorData {
    pub max_num: u8,
    pub gen_type: i8,
    pub limit_num: i16,
    pub min_gen_num: i16,
    pub max_gen_num: i16,
    pub min_interval: f32,
    pub max_interval: f32,
    pub initial_spawn_count: u8,
    pub spawn_regions: [MsbRef<Region>; 8],
}

impl Default for GeneratorData {
    fn default() -> Self {
        Self {
            max_num: 1,
            gen_type: 0,
            limit_num: -1,
            min_gen_num: 1,
            max_gen_num: 1,
            min_interval: 0.0,
            max_interval: 0.0,
            initial_spawn_count: 1,
            spawn_regions: std::array::from_fn(|_| MsbRef::null()),
        }
    }
}

impl BinRead for GeneratorData {
    type Args = ();

    fn read_options<R: Read + Seek>(
        reader: &mut R,
        options: &ReadOptions,
        _args: Self::Args,
    ) -> BinResult<Self> {
        let max_num = u8::read_options(reader, options, ())?;
        let gen_type = i8::read_options(reader, options, ())?;
        let limit_num = i16::read_options(reader, options, ())?;
        let min_gen_num = i16::read_options(reader, options, ())?;
        let max_gen_num = i16::read_options(reader, options, ())?;
        let min_interval = f32::read_options(reader, options, ())?;
        let max_interval = f32::read_options(reader, options, ())?;
        let initial_spawn_count = u8::read_options(reader, options, ())?;
        reader.seek(SeekFrom::Current(3))?;

        let mut spawn_regions: [MsbRef<Region>; 8] = std::array::from_fn(|_| MsbRef::null());
        for region in spawn_regions.iter_mut() {
            *region = MsbRef::read_options(reader, options, ())?;
        }
        reader.seek(SeekFrom::Current(12))?;

        Ok(Self {
            max_num,
            gen_type,
            limit_num,
            min_gen_num,
            max_gen_num,
            min_interval,
            max_interval,
            initial_spawn_count,
            spawn_regions,
        })
    }
}

impl GeneratorData {
    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_u8(self.max_num)?;
        writer.write_i8(self.gen_type)?;
        writer.write_i16::<LittleEndian>(self.limit_num)?;
        writer.write_i16::<LittleEndian>(self.min_gen_num)?;
        writer.write_i16::<LittleEndian>(self.max_gen_num)?;
        writer.write_f32::<LittleEndian>(self.min_interval)?;
        writer.write_f32::<LittleEndian>(self.max_interval)?;
        writer.write_u8(self.initial_spawn_count)?;
        write_zeroes(writer, 3)?;
        for region in &self.spawn_regions {
            region.put(writer)?;
        }
        write_zeroes(writer, 12)?;
        Ok(())
    }
}

/// Per-subtype event payload. The variant selects the subtype tag.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(BinRead, Debug, Clone, PartialEq)]
#[br(import(tag: u32))]
pub enum EventData {
    #[br(pre_assert(tag == EventType::Treasure as u32))]
    Treasure {
        #[br(pad_after = 4)]
        treasure_part: MsbRef<Part>,
        item_lot_id: i32,
        action_button_id: i32,
        pickup_anim_id: i32,
        in_chest: u8,
        #[br(pad_after = 2)]
        starts_disabled: u8,
    },

    #[br(pre_assert(tag == EventType::Generator as u32))]
    Generator(GeneratorData),

    #[br(pre_assert(tag == EventType::ObjAct as u32))]
    ObjAct {
        obj_act_entity_id: u32,
        obj_act_part: MsbRef<Part>,
        obj_act_param_id: i32,
        #[br(pad_after = 3)]
        state_type: u8,
        #[br(pad_after = 4)]
        event_flag_id: u32,
    },

    #[br(pre_assert(tag == EventType::PatrolInfo as u32))]
    PatrolInfo {
        #[br(pad_after = 4)]
        unk00: i32,
    },

    #[br(pre_assert(tag == EventType::Mount as u32))]
    Mount {
        rider_part: MsbRef<Part>,
        mount_part: MsbRef<Part>,
    },

    #[br(pre_assert(tag == EventType::RetryPoint as u32))]
    RetryPoint {
        retry_part: MsbRef<Part>,
        event_flag_id: u32,
        #[br(pad_after = 4)]
        unk08: f32,
        retry_region: MsbRefPair<Region>,
    },

    #[br(pre_assert(tag == EventType::Other as u32))]
    Other,
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::Treasure { .. } => EventType::Treasure,
            EventData::Generator(_) => EventType::Generator,
            EventData::ObjAct { .. } => EventType::ObjAct,
            EventData::PatrolInfo { .. } => EventType::PatrolInfo,
            EventData::Mount { .. } => EventType::Mount,
            EventData::RetryPoint { .. } => EventType::RetryPoint,
            EventData::Other => EventType::Other,
        }
    }

    /// Variants with no subtype data block; their headers store a zero
    /// subtype data offset.
    fn dataless(event_type: EventType) -> Option<EventData> {
        match event_type {
            EventType::Other => Some(EventData::Other),
            _ => None,
        }
    }

    fn has_block(&self) -> bool {
        Self::dataless(self.event_type()).is_none()
    }

    fn put<W: Write + Seek>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            EventData::Treasure {
                treasure_part,
                item_lot_id,
                action_button_id,
                pickup_anim_id,
                in_chest,
                starts_disabled,
            } => {
                treasure_part.put(writer)?;
                write_zeroes(writer, 4)?;
                writer.write_i32::<LittleEndian>(*item_lot_id)?;
                writer.write_i32::<LittleEndian>(*action_button_id)?;
                writer.write_i32::<LittleEndian>(*pickup_anim_id)?;
                writer.write_u8(*in_chest)?;
                writer.write_u8(*starts_disabled)?;
                write_zeroes(writer, 2)?;
            }
            EventData::Generator(generator) => generator.put(writer)?,
            EventData::ObjAct {
                obj_act_entity_id,
                obj_act_part,
                obj_act_param_id,
                state_type,
                event_flag_id,
            } => {
                writer.write_u32::<LittleEndian>(*obj_act_entity_id)?;
                obj_act_part.put(writer)?;
                writer.write_i32::<LittleEndian>(*obj_act_param_id)?;
                writer.write_u8(*state_type)?;
                write_zeroes(writer, 3)?;
                writer.write_u32::<LittleEndian>(*event_flag_id)?;
                write_zeroes(writer, 4)?;
            }
            EventData::PatrolInfo { unk00 } => {
                writer.write_i32::<LittleEndian>(*unk00)?;
                write_zeroes(writer, 4)?;
            }
            EventData::Mount {
                rider_part,
                mount_part,
            } => {
                rider_part.put(writer)?;
                mount_part.put(writer)?;
            }
            EventData::RetryPoint {
                retry_part,
                event_flag_id,
                unk08,
                retry_region,
            } => {
                retry_part.put(writer)?;
                writer.write_u32::<LittleEndian>(*event_flag_id)?;
                writer.write_f32::<LittleEndian>(*unk08)?;
                write_zeroes(writer, 4)?;
                retry_region.put(writer)?;
            }
            EventData::Other => {}
        }
        Ok(())
    }
}

/// A scripted map event.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Event {
    id: EntryId,
    pub name: String,
    pub unk10: i32,
    pub entity_id: u32,
    /// The part this event acts on, if any.
    pub part: MsbRef<Part>,
    /// The region this event acts in, if any.
    pub region: MsbRef<Region>,
    pub unk0c: i32,
    pub data: EventData,
}

impl Event {
    pub fn new(name: impl Into<String>, data: EventData) -> Self {
        Self {
            id: EntryId::fresh(),
            name: name.into(),
            unk10: 0,
            entity_id: 0,
            part: MsbRef::null(),
            region: MsbRef::null(),
            unk0c: 0,
            data,
        }
    }

    pub fn event_type(&self) -> EventType {
        self.data.event_type()
    }

    pub(crate) fn resolve_refs(
        &mut self,
        parts: &[EntryKey],
        regions: &[EntryKey],
    ) -> Result<(), MsbError> {
        self.part.resolve(parts)?;
        self.region.resolve(regions)?;
        match &mut self.data {
            EventData::Treasure { treasure_part, .. } => treasure_part.resolve(parts)?,
            EventData::Generator(generator) => {
                for region in generator.spawn_regions.iter_mut() {
                    region.resolve(regions)?;
                }
            }
            EventData::ObjAct { obj_act_part, .. } => obj_act_part.resolve(parts)?,
            EventData::Mount {
                rider_part,
                mount_part,
            } => {
                rider_part.resolve(parts)?;
                mount_part.resolve(parts)?;
            }
            EventData::RetryPoint {
                retry_part,
                retry_region,
                ..
            } => {
                retry_part.resolve(parts)?;
                retry_region.resolve(regions)?;
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn sync_indices(
        &mut self,
        parts: &[EntryKey],
        regions: &[EntryKey],
    ) -> Result<(), MsbError> {
        let name = self.name.clone();
        self.part.sync(&name, parts)?;
        self.region.sync(&name, regions)?;
        match &mut self.data {
            EventData::Treasure { treasure_part, .. } => treasure_part.sync(&name, parts)?,
            EventData::Generator(generator) => {
                for region in generator.spawn_regions.iter_mut() {
                    region.sync(&name, regions)?;
                }
            }
            EventData::ObjAct { obj_act_part, .. } => obj_act_part.sync(&name, parts)?,
            EventData::Mount {
                rider_part,
                mount_part,
            } => {
                rider_part.sync(&name, parts)?;
                mount_part.sync(&name, parts)?;
            }
            EventData::RetryPoint {
                retry_part,
                retry_region,
                ..
            } => {
                retry_part.sync(&name, parts)?;
                retry_region.sync(&name, regions)?;
            }
            _ => {}
        }
        Ok(())
    }
}

impl MsbEntry for Event {
    const PARAM_NAME: &'static str = "EVENT_PARAM_ST";

    fn name(&self) -> &str {
        &self.name
    }

    fn id(&self) -> EntryId {
        self.id
    }

    fn subtype_tag(&self) -> u32 {
        self.event_type() as u32
    }

    fn read<R: Read + Seek>(reader: &mut R) -> Result<Self, MsbError> {
        let start = reader.stream_position()?;
        let header: EventHeader = read_record(reader)?;

        let event_type = EventType::from_raw(header.event_subtype).ok_or_else(|| {
            MsbError::format(
                start,
                format!("unknown event subtype tag {:#x}", header.event_subtype),
            )
        })?;

        reader.seek(SeekFrom::Start(start + header.name_offset as u64))?;
        let name = read_utf16(reader)?;

        reader.seek(SeekFrom::Start(start + header.common_data_offset as u64))?;
        let entity_id = reader.read_le::<u32>()?;
        let part = reader.read_le::<MsbRef<Part>>()?;
        let region = reader.read_le::<MsbRef<Region>>()?;
        let unk0c = reader.read_le::<i32>()?;

        let data = match EventData::dataless(event_type) {
            Some(data) if header.subtype_data_offset == 0 => data,
            Some(_) => {
                return Err(MsbError::format(
                    start,
                    format!("unexpected subtype data for {event_type:?} event"),
                ));
            }
            None if header.subtype_data_offset == 0 => {
                return Err(MsbError::format(
                    start,
                    format!("missing subtype data for {event_type:?} event"),
                ));
            }
            None => {
                reader.seek(SeekFrom::Start(start + header.subtype_data_offset as u64))?;
                reader.read_le_args::<EventData>((header.event_subtype,))?
            }
        };

        Ok(Self {
            id: EntryId::fresh(),
            name,
            unk10: header.unk10,
            entity_id,
            part,
            region,
            unk0c,
            data,
        })
    }

    fn write<W: Write + Seek>(&self, writer: &mut W, subtype_index: i32) -> Result<(), MsbError> {
        let start = writer.stream_position()?;
        let mut reservations = Reservations::new();
        reservations.reserve_record::<EventHeader, _>(writer)?;

        let name_offset = (writer.stream_position()? - start) as i64;
        write_utf16(writer, &self.name)?;
        align_writer(writer, 4)?;

        let common_data_offset = (writer.stream_position()? - start) as i64;
        writer.write_u32::<LittleEndian>(self.entity_id)?;
        self.part.put(writer)?;
        self.region.put(writer)?;
        writer.write_i32::<LittleEndian>(self.unk0c)?;

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
            &EventHeader {
                name_offset,
                event_subtype: self.subtype_tag(),
                subtype_index,
                unk10: self.unk10,
                pad14: 0,
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
    fn treasure_event_round_trip() {
        let mut event = Event::new(
            "gold chest",
            EventData::Treasure {
                treasure_part: MsbRef::null(),
                item_lot_id: 100200,
                action_button_id: 401,
                pickup_anim_id: 60070,
                in_chest: 1,
                starts_disabled: 0,
            },
        );
        event.entity_id = 1041370000;
        event.unk10 = -1;

        let mut writer = Cursor::new(Vec::new());
        event.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Event::read(&mut reader).unwrap();
        assert_eq!(event.name, read_back.name);
        assert_eq!(event.entity_id, read_back.entity_id);
        assert_eq!(-1, read_back.unk10);
        assert_eq!(event.data, read_back.data);
    }

    #[test]
    fn dataless_event_writes_zero_subtype_offset() {
        let event = Event::new("other", EventData::Other);

        let mut writer = Cursor::new(Vec::new());
        event.write(&mut writer, 0).unwrap();
        let bytes = writer.into_inner();

        // subtype_data_offset sits at 0x20 in the header.
        assert_eq!(&[0u8; 8][..], &bytes[0x20..0x28]);

        let mut reader = Cursor::new(bytes);
        let read_back = Event::read(&mut reader).unwrap();
        assert_eq!(EventType::Other, read_back.event_type());
    }

    #[test]
    fn generator_event_round_trip() {
        let generator = GeneratorData {
            max_num: 3,
            min_interval: 12.5,
            max_interval: 30.0,
            ..GeneratorData::default()
        };
        let event = Event::new("generator", EventData::Generator(generator));

        let mut writer = Cursor::new(Vec::new());
        event.write(&mut writer, 0).unwrap();

        let mut reader = Cursor::new(writer.into_inner());
        let read_back = Event::read(&mut reader).unwrap();
        match read_back.data {
            EventData::Generator(generator) => {
                assert_eq!(3, generator.max_num);
                assert_eq!(12.5, generator.min_interval);
                assert_eq!(30.0, generator.max_interval);
                assert!(generator.spawn_regions.iter().all(|r| !r.is_set()));
            }
            other => panic!("expected generator data, got {other:?}"),
        }
    }
}
